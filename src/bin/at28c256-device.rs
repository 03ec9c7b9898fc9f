#[macro_use]
extern crate clap;
#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;

extern crate at28c256_rw;
use at28c256_rw::*;

use std::io::{
	Read,
	Write,
};
use std::process::exit;
use std::sync::Arc;
use std::sync::atomic::{
	AtomicBool,
	Ordering,
};
use std::thread;

use at28c256_rw::bus::{
	PinMap,
	SysfsPins,
};
use at28c256_rw::device::DeviceController;
use at28c256_rw::transport::{
	CaminoServer,
	SerialConfig,
	SerialPort,
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

/// comma separated GPIO numbers, least significant bit first
fn get_pin_list(matches: &clap::ArgMatches, name: &str) -> AResult<Vec<u32>> {
	let param = match matches.value_of(name) {
		Some(p) => p,
		None => bail!("missing parameter {}", name),
	};
	param.split(',')
		.map(|pin| pin.trim().parse::<u32>().map_err(|e| format_err!("invalid pin {:?} in {}: {}", pin, name, e)))
		.collect()
}

// the "interrupt" side: every complete frame is dispatched right here
fn receive(mut port: SerialPort, device: &DeviceController<SysfsPins>) -> AResult<()> {
	let mut server = CaminoServer::new();
	let mut buf = [0u8; 64];
	loop {
		// 0 bytes: read timeout, nothing arrived
		let n = port.read(&mut buf)?;
		for &b in &buf[..n] {
			if let Some(response) = server.feed(b, device) {
				port.write_all(&response)?;
				port.flush()?;
			}
		}
	}
}

fn main_app(matches: &clap::ArgMatches) -> AResult<()> {
	let map = PinMap {
		address: get_pin_list(matches, "address_pins")?,
		data: get_pin_list(matches, "data_pins")?,
		chip_enable: get_param(matches, "ce_pin")?,
		output_enable: get_param(matches, "oe_pin")?,
		write_enable: get_param(matches, "we_pin")?,
	};
	let pins = SysfsPins::open(&map)?;
	let device = Arc::new(DeviceController::new(pins));

	let config = SerialConfig {
		path: get_param(matches, "port")?,
		baud: get_param(matches, "baud")?,
		..SerialConfig::default()
	};
	let port = SerialPort::open(&config).map_err(|e| format_err!("opening {}: {}", config.path, e))?;
	info!("serving on {} ({} baud)", config.path, config.baud);

	let stop = Arc::new(AtomicBool::new(false));
	let receiver = {
		let device = device.clone();
		let stop = stop.clone();
		thread::Builder::new().name("receiver".into()).spawn(move || {
			let result = receive(port, &device);
			stop.store(true, Ordering::Release);
			result
		})?
	};

	device.run_idle(&stop);

	match receiver.join() {
		Ok(result) => result,
		Err(_) => bail!("receiver thread panicked"),
	}
}

fn main() {
	let matches = clap_app!(@app (app_from_crate!())
		(about: "AT28C256 programmer firmware on Linux GPIOs, serving the camino protocol on a serial port")
		(@arg address_pins: --("address-pins") <PINS> "GPIO numbers of A0..A14, comma separated")
		(@arg data_pins: --("data-pins") <PINS> "GPIO numbers of D0..D7, comma separated")
		(@arg ce_pin: --("ce-pin") <PIN> "GPIO number of /CE")
		(@arg oe_pin: --("oe-pin") <PIN> "GPIO number of /OE")
		(@arg we_pin: --("we-pin") <PIN> "GPIO number of /WE")
		(@arg port: -p --port [PORT] default_value("/dev/ttyS0") "Serial port to serve on")
		(@arg baud: -b --baud [BAUD] default_value("115200") "Serial baud rate")
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
