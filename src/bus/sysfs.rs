use std::fs;
use std::io::{
	self,
	Write,
};
use std::os::unix::fs::FileExt;
use std::path::{
	Path,
	PathBuf,
};

use super::{
	Control,
	Direction,
	Pins,
};

const GPIO_ROOT: &str = "/sys/class/gpio";

/// GPIO numbers (as known to the kernel) of the lines wired to the chip.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PinMap {
	/// A0..A14
	pub address: Vec<u32>,
	/// D0..D7
	pub data: Vec<u32>,
	pub chip_enable: u32,
	pub output_enable: u32,
	pub write_enable: u32,
}

impl PinMap {
	pub fn validate(&self) -> crate::AResult<()> {
		ensure!(self.address.len() == 15, "need 15 address pins, got {}", self.address.len());
		ensure!(self.data.len() == 8, "need 8 data pins, got {}", self.data.len());
		let mut all: Vec<u32> = self.address.iter()
			.chain(self.data.iter())
			.chain([self.chip_enable, self.output_enable, self.write_enable].iter())
			.cloned()
			.collect();
		all.sort();
		for pair in all.windows(2) {
			ensure!(pair[0] != pair[1], "GPIO {} assigned twice", pair[0]);
		}
		Ok(())
	}
}

struct GpioLine {
	number: u32,
	value: fs::File,
}

impl GpioLine {
	fn line_file(number: u32, name: &str) -> PathBuf {
		Path::new(GPIO_ROOT).join(format!("gpio{}", number)).join(name)
	}

	fn open(number: u32, direction: &str) -> crate::AResult<Self> {
		with_context!(("GPIO {}: setup", number), {
			if !Path::new(GPIO_ROOT).join(format!("gpio{}", number)).exists() {
				// need to write in one syscall for export
				fs::OpenOptions::new().write(true).open(Path::new(GPIO_ROOT).join("export"))?
					.write_all(number.to_string().as_bytes())?;
			}
			let mut line = GpioLine {
				number,
				value: fs::OpenOptions::new().read(true).write(true).open(Self::line_file(number, "value"))?,
			};
			line.set_direction(direction)?;
			Ok(line)
		})
	}

	fn set_direction(&mut self, direction: &str) -> io::Result<()> {
		fs::OpenOptions::new().write(true).open(Self::line_file(self.number, "direction"))?
			.write_all(direction.as_bytes())
	}

	fn set(&self, high: bool) {
		let level: &[u8] = if high { b"1" } else { b"0" };
		self.value.write_at(level, 0).expect("GPIO value write must not fail");
	}

	fn get(&self) -> bool {
		let mut buf = [0u8];
		self.value.read_at(&mut buf, 0).expect("GPIO value read must not fail");
		buf[0] == b'1'
	}
}

/// Bus pins on a Linux board through the sysfs GPIO interface.
pub struct SysfsPins {
	address: Vec<GpioLine>,
	data: Vec<GpioLine>,
	chip_enable: GpioLine,
	output_enable: GpioLine,
	write_enable: GpioLine,
}

impl SysfsPins {
	pub fn open(map: &PinMap) -> crate::AResult<Self> {
		map.validate()?;
		// control lines come up released ("high") before anything else is touched
		let pins = SysfsPins {
			chip_enable: GpioLine::open(map.chip_enable, "high")?,
			output_enable: GpioLine::open(map.output_enable, "high")?,
			write_enable: GpioLine::open(map.write_enable, "high")?,
			address: map.address.iter().map(|&n| GpioLine::open(n, "low")).collect::<crate::AResult<_>>()?,
			data: map.data.iter().map(|&n| GpioLine::open(n, "in")).collect::<crate::AResult<_>>()?,
		};
		debug!("opened GPIO bus: {:?}", map);
		Ok(pins)
	}
}

impl Pins for SysfsPins {
	fn set_address(&mut self, address: u16) {
		for (bit, line) in self.address.iter().enumerate() {
			line.set(0 != address & (1 << bit));
		}
	}

	fn set_data_direction(&mut self, direction: Direction) {
		let direction = match direction {
			Direction::Input => "in",
			Direction::Output => "out",
		};
		for line in self.data.iter_mut() {
			line.set_direction(direction).expect("GPIO direction switch must not fail");
		}
	}

	fn drive_data(&mut self, data: u8) {
		for (bit, line) in self.data.iter().enumerate() {
			line.set(0 != data & (1 << bit));
		}
	}

	fn read_data_line(&mut self, line: u8) -> bool {
		self.data[line as usize].get()
	}

	fn set_control(&mut self, control: Control) {
		// active low
		self.chip_enable.set(!control.chip_enable);
		self.output_enable.set(!control.output_enable);
		self.write_enable.set(!control.write_enable);
	}
}
