//! Parallel bus of an AT28C256: 15 address lines, 8 data lines that switch
//! direction, and the (active low) CE/OE/WE control lines.

use std::thread;
use std::time::{
	Duration,
	Instant,
};

mod sim;
mod sysfs;

pub use self::sim::SimulatedChip;
pub use self::sysfs::{
	PinMap,
	SysfsPins,
};

/// Time for the data lines to settle after turning them around.
pub const DIRECTION_SETTLE: Duration = Duration::from_micros(1);

pub fn reliable_sleep(mut duration: Duration) {
	loop {
		let now = Instant::now();
		thread::sleep(duration);
		let elapsed = now.elapsed();
		if elapsed >= duration {
			return;
		}
		duration -= elapsed;
	}
}

/// Direction of the data lines as seen from the programmer.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Direction {
	Input,
	Output,
}

/// Control line state; `true` means the signal is asserted (pin driven low).
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct Control {
	pub chip_enable: bool,
	pub output_enable: bool,
	pub write_enable: bool,
}

impl Control {
	/// chip selected, nothing driving the data lines
	pub fn idle() -> Self {
		Control {
			chip_enable: true,
			output_enable: false,
			write_enable: false,
		}
	}

	/// chip selected and driving the data lines
	pub fn read() -> Self {
		Control {
			output_enable: true,
			..Control::idle()
		}
	}

	pub fn with_write_enable(self, write_enable: bool) -> Self {
		Control {
			write_enable,
			..self
		}
	}
}

pub trait Pins {
	fn set_address(&mut self, address: u16);
	fn set_data_direction(&mut self, direction: Direction);
	fn drive_data(&mut self, data: u8);
	// data line 0 is the least significant bit
	fn read_data_line(&mut self, line: u8) -> bool;
	fn set_control(&mut self, control: Control);

	// delay for (at least) `duration`
	fn delay(&mut self, duration: Duration) {
		reliable_sleep(duration);
	}
}

impl<'a, P: ?Sized + Pins> Pins for &'a mut P {
	fn set_address(&mut self, address: u16) {
		P::set_address(*self, address)
	}
	fn set_data_direction(&mut self, direction: Direction) {
		P::set_data_direction(*self, direction)
	}
	fn drive_data(&mut self, data: u8) {
		P::drive_data(*self, data)
	}
	fn read_data_line(&mut self, line: u8) -> bool {
		P::read_data_line(*self, line)
	}
	fn set_control(&mut self, control: Control) {
		P::set_control(*self, control)
	}
	fn delay(&mut self, duration: Duration) {
		P::delay(*self, duration)
	}
}

/// Owns the pins and remembers the data direction, so switching to the
/// direction the lines already have costs nothing.
///
/// Nothing is validated here: addresses must already be in range.
pub struct Bus<P: Pins> {
	pins: P,
	direction: Direction,
}

impl<P: Pins> Bus<P> {
	pub fn new(mut pins: P) -> Self {
		pins.set_data_direction(Direction::Input);
		pins.set_control(Control::idle());
		Bus {
			pins,
			direction: Direction::Input,
		}
	}

	pub fn pins(&self) -> &P {
		&self.pins
	}

	pub fn pins_mut(&mut self) -> &mut P {
		&mut self.pins
	}

	pub fn into_pins(self) -> P {
		self.pins
	}

	pub fn direction(&self) -> Direction {
		self.direction
	}

	pub fn set_address(&mut self, address: u16) {
		self.pins.set_address(address);
	}

	pub fn set_direction(&mut self, direction: Direction) {
		if self.direction == direction {
			return;
		}
		trace!("data lines: {:?} -> {:?}", self.direction, direction);
		self.pins.set_data_direction(direction);
		self.direction = direction;
		self.pins.delay(DIRECTION_SETTLE);
	}

	pub fn drive(&mut self, data: u8) {
		self.pins.drive_data(data);
	}

	pub fn sample_line(&mut self, line: u8) -> bool {
		self.pins.read_data_line(line)
	}

	pub fn set_control(&mut self, control: Control) {
		self.pins.set_control(control);
	}

	pub fn delay(&mut self, duration: Duration) {
		self.pins.delay(duration);
	}
}
