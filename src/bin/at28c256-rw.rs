#[macro_use]
extern crate clap;
#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;

extern crate at28c256_rw;
use at28c256_rw::*;

use std::fs;
use std::io::{
	self,
	Write,
};
use std::process::exit;
use std::time::Duration;

use at28c256_rw::bus::SimulatedChip;
use at28c256_rw::programmer::{
	Programmer,
	StderrProgress,
	WriteTestOptions,
};
use at28c256_rw::transport::{
	CaminoLink,
	SerialConfig,
	SerialPort,
	Transport,
};

fn get_param<T>(matches: &clap::ArgMatches, name: &str) -> AResult<T>
where
	T: std::str::FromStr,
	failure::Error: From<<T as std::str::FromStr>::Err>,
{
	let param = match matches.value_of(name) {
		Some(p) => p,
		None => bail!("missing parameter {}", name),
	};
	param.parse::<T>().map_err(|e| {
		let e = failure::Error::from(e);
		let msg = format!("invalid parameter {}: {}", name, e);
		e.context(msg).into()
	})
}

/// decimal, or with 0x / 0o / 0b prefix
fn parse_number(s: &str) -> AResult<usize> {
	let s = s.trim();
	let (digits, radix) = match s.get(..2) {
		Some("0x") | Some("0X") => (&s[2..], 16),
		Some("0o") | Some("0O") => (&s[2..], 8),
		Some("0b") | Some("0B") => (&s[2..], 2),
		_ => (s, 10),
	};
	usize::from_str_radix(digits, radix).map_err(|e| format_err!("invalid number {:?}: {}", s, e))
}

/// `[START:]STOP`; the whole device without a specifier
fn parse_range(range: Option<&str>) -> AResult<(usize, usize)> {
	let range = match range {
		None => return Ok((0, EEPROM_SIZE)),
		Some(range) => range,
	};
	let parts: Vec<&str> = range.split(':').collect();
	match parts.len() {
		1 => Ok((0, parse_number(parts[0])?)),
		2 => Ok((parse_number(parts[0])?, parse_number(parts[1])?)),
		_ => bail!("address range invalid syntax: must match [START:]STOP"),
	}
}

fn open_programmer(matches: &clap::ArgMatches) -> AResult<Programmer<Box<dyn Transport>>> {
	if matches.is_present("simulate") {
		info!("using simulated programmer");
		let link = transport::simulated_link(SimulatedChip::new())?;
		// the simulated device finishes queued writes before answering again
		return Ok(Programmer::new(Box::new(link) as Box<dyn Transport>).with_write_settle(Duration::from_secs(0)));
	}

	let config = SerialConfig {
		path: get_param(matches, "port")?,
		baud: get_param(matches, "baud")?,
		..SerialConfig::default()
	};
	info!("connecting to programmer on {} ({} baud)", config.path, config.baud);
	debug!("serial config: {:?}", config);
	let port = SerialPort::open(&config).map_err(|e| format_err!("opening {}: {}", config.path, e))?;
	let link = CaminoLink::connect(port)?;
	info!("programmer connected");
	Ok(Programmer::new(Box::new(link) as Box<dyn Transport>))
}

fn main_app(matches: &clap::ArgMatches) -> AResult<()> {
	let mut programmer = open_programmer(matches)?;

	if let Some(path) = matches.value_of("download") {
		let image = programmer.download(&mut StderrProgress)?;
		fs::write(path, &image).map_err(|e| format_err!("writing {}: {}", path, e))?;
		info!("downloaded 0x{:04x} bytes to {}", image.len(), path);
	} else if let Some(path) = matches.value_of("upload") {
		let image = fs::read(path).map_err(|e| format_err!("reading {}: {}", path, e))?;
		let report = programmer.upload(&image, &mut StderrProgress)?;
		if !report.is_ok() {
			for mismatch in &report.mismatches {
				error!("verification failed at {}", mismatch);
			}
			bail!("{}", report);
		}
		info!("uploaded and verified {}", path);
	} else if matches.is_present("hexdump") {
		let (start, stop) = parse_range(matches.value_of("hexdump"))?;
		let stdout = io::stdout();
		let mut out = stdout.lock();
		programmer.hexdump(&mut out, start, stop, matches.is_present("hexdump_all"))?;
		out.flush()?;
	} else if matches.is_present("write_tests") {
		let read_wait = get_param::<f64>(matches, "read_wait_time")?;
		ensure!(read_wait >= 0.0 && read_wait.is_finite(), "invalid read wait time {}", read_wait);
		let options = WriteTestOptions {
			trials: get_param(matches, "write_tests")?,
			read_wait: Duration::from_millis((read_wait * 1000.0) as u64),
			double_read: matches.is_present("double_read"),
			hexdump_tests: matches.is_present("hexdump_tests"),
			hexdump_all: matches.is_present("hexdump_all"),
		};
		println!("Running write tests: Use -vv for more verbose output.");
		let stdout = io::stdout();
		let report = programmer.write_test(&options, &mut stdout.lock())?;
		println!("Done! {}.", report);
	} else {
		bail!("no mode selected");
	}

	Ok(())
}

fn main() {
	let matches = clap_app!(@app (app_from_crate!())
		(about: "Read out and write to AT28C256 EEPROMs. Uploaded files must be exactly 0x8000 bytes in length.")
		(@group mode +required =>
			(@arg download: -D --download [OUTFILE] "Download the EEPROM and store in OUTFILE")
			(@arg upload: -U --upload [INFILE] "Upload INFILE to the EEPROM and verify it")
			(@arg hexdump: -H --hexdump [RANGE] min_values(0)
				"Hexdump addresses [START:]STOP (START inclusive, STOP exclusive); whole EEPROM by default")
			(@arg write_tests: -T --("run-write-tests") [N]
				"WARNING: DATA LOSS POSSIBLE. Write the first 256 bytes N times with test patterns and report the error rate")
		)
		(@arg hexdump_all: -a --("hexdump-all") "Show repeated hexdump lines instead of a single '*'")
		(@arg hexdump_tests: -s --("hexdump-tests") "Hexdump the data read back in each write test trial")
		(@arg read_wait_time: -w --("read-wait-time") [S] default_value("1")
			"Seconds to wait between writing and reading back test data")
		(@arg double_read: -d --("double-read") "Read test data twice, using the second result")
		(@arg port: -p --port [PORT] default_value("/dev/ttyUSB0") "Serial port of the programmer")
		(@arg baud: -b --baud [BAUD] default_value("115200") "Serial baud rate")
		(@arg simulate: --simulate "Use an in-process simulated programmer and chip")
		(@arg verbose: -v +multiple "More log output (-v debug, -vv trace)")
	).get_matches();

	let filter = match matches.occurrences_of("verbose") {
		0 => "info",
		1 => "debug",
		_ => "trace",
	};
	env_logger::from_env(env_logger::Env::default().default_filter_or(filter)).init();

	if let Err(e) = main_app(&matches) {
		error!("Error: {}", e);
		exit(1);
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn numbers() {
		assert_eq!(parse_number("0x8000").unwrap(), 0x8000);
		assert_eq!(parse_number("0o17").unwrap(), 0o17);
		assert_eq!(parse_number("0b101").unwrap(), 5);
		assert_eq!(parse_number("256").unwrap(), 256);
		assert!(parse_number("0xzz").is_err());
	}

	#[test]
	fn ranges() {
		assert_eq!(parse_range(None).unwrap(), (0, 0x8000));
		assert_eq!(parse_range(Some("0x100")).unwrap(), (0, 0x100));
		assert_eq!(parse_range(Some("0x10:0x20")).unwrap(), (0x10, 0x20));
		assert!(parse_range(Some("1:2:3")).is_err());
	}
}
