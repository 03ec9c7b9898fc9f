use std::collections::HashMap;
use std::time::Duration;

use super::{
	Control,
	Direction,
	Pins,
};

/// In-memory AT28C256 wired directly to a set of `Pins`.
///
/// Data is latched on the rising WE edge while OE is released, the chip
/// drives the data lines while OE is asserted. Delays are recorded instead
/// of slept, so tests can check the timing structure of a cycle.
pub struct SimulatedChip {
	memory: Vec<u8>,
	address: u16,
	direction: Direction,
	data_out: u8,
	control: Control,
	stuck: HashMap<u16, u8>,
	commits: Vec<(u16, u8)>,
	write_pulses: usize,
	direction_switches: usize,
	delays: Vec<Duration>,
}

impl SimulatedChip {
	/// erased chip (all 0xff)
	pub fn new() -> Self {
		Self::with_contents(&[0xff; crate::EEPROM_SIZE])
	}

	pub fn with_contents(contents: &[u8]) -> Self {
		assert_eq!(contents.len(), crate::EEPROM_SIZE);
		SimulatedChip {
			memory: contents.to_vec(),
			address: 0,
			direction: Direction::Input,
			data_out: 0,
			control: Control {
				chip_enable: false,
				output_enable: false,
				write_enable: false,
			},
			stuck: HashMap::new(),
			commits: Vec::new(),
			write_pulses: 0,
			direction_switches: 0,
			delays: Vec::new(),
		}
	}

	pub fn contents(&self) -> &[u8] {
		&self.memory
	}

	/// flip `mask` bits whenever `address` is read (the stored value is untouched)
	pub fn stick_bits(&mut self, address: u16, mask: u8) {
		self.stuck.insert(address & crate::MAX_ADDRESS, mask);
	}

	/// latched writes, in the order the chip saw them
	pub fn commits(&self) -> &[(u16, u8)] {
		&self.commits
	}

	pub fn write_pulses(&self) -> usize {
		self.write_pulses
	}

	pub fn direction_switches(&self) -> usize {
		self.direction_switches
	}

	pub fn delays(&self) -> &[Duration] {
		&self.delays
	}

	pub fn clear_log(&mut self) {
		self.commits.clear();
		self.write_pulses = 0;
		self.direction_switches = 0;
		self.delays.clear();
	}

	fn output(&self) -> Option<u8> {
		let c = self.control;
		if !c.chip_enable || !c.output_enable || c.write_enable {
			return None;
		}
		let value = self.memory[self.address as usize];
		Some(value ^ self.stuck.get(&self.address).cloned().unwrap_or(0))
	}
}

impl Default for SimulatedChip {
	fn default() -> Self {
		Self::new()
	}
}

impl Pins for SimulatedChip {
	fn set_address(&mut self, address: u16) {
		self.address = address & crate::MAX_ADDRESS;
	}

	fn set_data_direction(&mut self, direction: Direction) {
		self.direction = direction;
		self.direction_switches += 1;
	}

	fn drive_data(&mut self, data: u8) {
		self.data_out = data;
	}

	fn read_data_line(&mut self, line: u8) -> bool {
		match (self.direction, self.output()) {
			(Direction::Input, Some(value)) => 0 != value & (1 << line),
			// our own output, or floating (pulled up)
			(Direction::Output, _) => 0 != self.data_out & (1 << line),
			(Direction::Input, None) => true,
		}
	}

	fn set_control(&mut self, control: Control) {
		let previous = self.control;
		self.control = control;
		if !control.chip_enable {
			return;
		}
		if !previous.write_enable && control.write_enable {
			self.write_pulses += 1;
		}
		if previous.write_enable && !control.write_enable && !control.output_enable {
			// data is latched on the rising WE edge
			let data = match self.direction {
				Direction::Output => self.data_out,
				Direction::Input => 0xff,
			};
			self.memory[self.address as usize] = data;
			self.commits.push((self.address, data));
		}
	}

	fn delay(&mut self, duration: Duration) {
		self.delays.push(duration);
	}
}
