//! Timed read/write cycles for the AT28C256.
//!
//! Timing (datasheet minimums):
//! - read: address to valid data 350ns
//! - byte write: WE low for 1ms, then 10ms write cycle before the next access
//! - page write: WE low/high 50ns per byte, one commit of up to 10ms per page

use std::time::Duration;

use crate::bus::{
	Bus,
	Control,
	Direction,
	Pins,
};

pub const READ_ACCESS_TIME: Duration = Duration::from_nanos(350);
pub const WRITE_PULSE_WIDTH: Duration = Duration::from_millis(1);
pub const WRITE_CYCLE_TIME: Duration = Duration::from_millis(10);
pub const PAGE_PULSE_WIDTH: Duration = Duration::from_nanos(50);
pub const PAGE_COMMIT_TIME: Duration = Duration::from_millis(10);

pub struct Eeprom<P: Pins> {
	bus: Bus<P>,
}

impl<P: Pins> Eeprom<P> {
	pub fn new(pins: P) -> Self {
		Eeprom {
			bus: Bus::new(pins),
		}
	}

	pub fn bus(&self) -> &Bus<P> {
		&self.bus
	}

	pub fn pins(&self) -> &P {
		self.bus.pins()
	}

	pub fn pins_mut(&mut self) -> &mut P {
		self.bus.pins_mut()
	}

	pub fn into_pins(self) -> P {
		self.bus.into_pins()
	}

	/// Read a single byte; `address` must be in range.
	pub fn read_byte(&mut self, address: u16) -> u8 {
		self.bus.set_control(Control::read());
		self.bus.set_direction(Direction::Input);
		self.bus.set_address(address);
		self.bus.delay(READ_ACCESS_TIME);

		let mut result = 0u8;
		for line in (0..8).rev() {
			if self.bus.sample_line(line) {
				result |= 1 << line;
			}
		}
		result
	}

	/// Sequential single byte reads starting at `address`.
	pub fn read_into(&mut self, address: u16, target: &mut [u8]) {
		for (offset, t) in target.iter_mut().enumerate() {
			*t = self.read_byte(address + offset as u16);
		}
	}

	/// Write a single byte and wait for the write cycle to complete.
	///
	/// Runs in a critical section: an interrupt between setting the address
	/// and releasing WE could glitch the address lines and hit another cell.
	pub fn write_byte(&mut self, address: u16, data: u8) {
		critical_section::with(|_| {
			self.bus.set_control(Control::idle());
			self.bus.set_address(address);
			self.bus.set_direction(Direction::Output);
			self.bus.drive(data);

			self.bus.set_control(Control::idle().with_write_enable(true));
			self.bus.delay(WRITE_PULSE_WIDTH);
			self.bus.set_control(Control::idle());

			self.bus.delay(WRITE_CYCLE_TIME);
		});
	}

	/// Write a full page; the chip buffers the bytes and commits them at
	/// once, so there is only one commit wait for all of them.
	pub fn write_page(&mut self, address: u16, data: &[u8; crate::PAGE_SIZE]) {
		debug_assert_eq!(0, address as usize % crate::PAGE_SIZE, "page write at unaligned address");

		critical_section::with(|_| {
			self.bus.set_control(Control::idle());
			self.bus.set_direction(Direction::Output);

			for (offset, &byte) in data.iter().enumerate() {
				self.bus.set_address(address + offset as u16);
				self.bus.drive(byte);
				self.bus.set_control(Control::idle().with_write_enable(true));
				self.bus.delay(PAGE_PULSE_WIDTH);
				self.bus.set_control(Control::idle());
				self.bus.delay(PAGE_PULSE_WIDTH);
			}

			self.bus.delay(PAGE_COMMIT_TIME);
		});
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::bus::SimulatedChip;

	fn long_delays(chip: &SimulatedChip) -> Vec<Duration> {
		chip.delays().iter().cloned().filter(|d| *d >= Duration::from_millis(1)).collect()
	}

	#[test]
	fn write_then_read() {
		let mut ee = Eeprom::new(SimulatedChip::new());
		for &(address, value) in [(0x0000, 0x00), (0x0001, 0x5a), (0x4000, 0xa5), (0x7fff, 0x12)].iter() {
			ee.write_byte(address, value);
			assert_eq!(ee.read_byte(address), value, "readback at 0x{:04x}", address);
		}
	}

	#[test]
	fn single_write_timing() {
		let mut ee = Eeprom::new(SimulatedChip::new());
		ee.pins_mut().clear_log();
		ee.write_byte(0x0123, 0x77);
		assert_eq!(ee.pins().write_pulses(), 1);
		assert_eq!(ee.pins().commits(), &[(0x0123, 0x77)][..]);
		assert_eq!(long_delays(ee.pins()), vec![WRITE_PULSE_WIDTH, WRITE_CYCLE_TIME]);
	}

	#[test]
	fn read_samples_after_access_time() {
		let mut contents = vec![0u8; crate::EEPROM_SIZE];
		contents[0x0abc] = 0b1010_0110;
		let mut ee = Eeprom::new(SimulatedChip::with_contents(&contents));
		ee.pins_mut().clear_log();
		assert_eq!(ee.read_byte(0x0abc), 0b1010_0110);
		assert_eq!(ee.pins().delays(), &[READ_ACCESS_TIME][..]);
		assert_eq!(ee.bus().direction(), Direction::Input);
	}

	#[test]
	fn page_write_commits_once() {
		let mut ee = Eeprom::new(SimulatedChip::new());
		let mut page = [0u8; crate::PAGE_SIZE];
		for (i, b) in page.iter_mut().enumerate() {
			*b = (i * 3) as u8;
		}
		ee.pins_mut().clear_log();
		ee.write_page(0x0140, &page);

		assert_eq!(ee.pins().write_pulses(), crate::PAGE_SIZE);
		assert_eq!(long_delays(ee.pins()), vec![PAGE_COMMIT_TIME]);
		let expected: Vec<(u16, u8)> = page.iter().enumerate().map(|(i, &b)| (0x0140 + i as u16, b)).collect();
		assert_eq!(ee.pins().commits(), &expected[..]);

		let mut readback = [0u8; crate::PAGE_SIZE];
		ee.read_into(0x0140, &mut readback);
		assert_eq!(&readback[..], &page[..]);
	}

	#[test]
	fn direction_only_switches_when_needed() {
		let mut ee = Eeprom::new(SimulatedChip::new());
		ee.pins_mut().clear_log();
		ee.read_byte(0);
		ee.read_byte(1);
		assert_eq!(ee.pins().direction_switches(), 0);
		ee.write_byte(2, 2);
		ee.write_byte(3, 3);
		assert_eq!(ee.pins().direction_switches(), 1);
		ee.read_byte(2);
		assert_eq!(ee.pins().direction_switches(), 2);
	}
}
