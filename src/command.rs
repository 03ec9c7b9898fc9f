//! Command table shared by the device dispatcher and the host.

use std::fmt;

/// Commands in device table order; the index is the command byte on the wire.
///
/// `num_calls` and `get_nth_call` always sit at 0 and 1 so a host can
/// discover the rest of the table by name.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Command {
	NumCalls,
	GetNthCall,
	Echo,
	Read,
	Write,
	ReadPage,
	WritePage,
	Hexdump16,
	Hexdump32,
}

impl Command {
	pub const ALL: [Command; 9] = [
		Command::NumCalls,
		Command::GetNthCall,
		Command::Echo,
		Command::Read,
		Command::Write,
		Command::ReadPage,
		Command::WritePage,
		Command::Hexdump16,
		Command::Hexdump32,
	];

	/// The memory access commands a programmer firmware must provide.
	pub const MEMORY: [Command; 6] = [
		Command::Read,
		Command::Write,
		Command::ReadPage,
		Command::WritePage,
		Command::Hexdump16,
		Command::Hexdump32,
	];

	pub fn name(self) -> &'static str {
		match self {
			Command::NumCalls => "num_calls",
			Command::GetNthCall => "get_nth_call",
			Command::Echo => "echo",
			Command::Read => "read",
			Command::Write => "write",
			Command::ReadPage => "read_page",
			Command::WritePage => "write_page",
			Command::Hexdump16 => "hexdump16",
			Command::Hexdump32 => "hexdump32",
		}
	}

	pub fn from_name(name: &str) -> Option<Command> {
		Command::ALL.iter().cloned().find(|c| c.name() == name)
	}

	pub fn index(self) -> u8 {
		Command::ALL.iter().position(|&c| c == self).expect("every command is in the table") as u8
	}

	pub fn from_index(index: u8) -> Option<Command> {
		Command::ALL.get(index as usize).cloned()
	}
}

impl fmt::Display for Command {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.write_str(self.name())
	}
}

/// Result of dispatching a single command.
///
/// Every malformed request is rejected explicitly, with a reason.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Response {
	Empty,
	Data(Vec<u8>),
	Rejected(String),
}

/// Addresses travel low byte first.
pub fn encode_address(address: u16) -> [u8; 2] {
	[address as u8, (address >> 8) as u8]
}

pub fn decode_address(raw: [u8; 2]) -> u16 {
	(raw[0] as u16) | (raw[1] as u16) << 8
}

fn is_printable(byte: u8) -> bool {
	byte >= 0x20 && byte < 0x7f
}

/// One hexdump row: `aaaa  xx xx xx xx xx xx xx xx  xx xx xx xx xx xx xx xx  |................|`
///
/// `None` cells are blanked (used for the partial first/last rows of a
/// range); leading blanks push the ascii column to the right, trailing ones
/// shorten it.
pub fn format_row_cells(address: usize, cells: &[Option<u8>]) -> String {
	assert_eq!(cells.len(), 16);
	let mut row = format!("{:04x} ", address);
	for (i, cell) in cells.iter().enumerate() {
		if 0 == i % 8 {
			row.push(' ');
		}
		match cell {
			Some(b) => row.push_str(&format!("{:02x} ", b)),
			None => row.push_str("   "),
		}
	}
	row.push(' ');
	for _ in cells.iter().take_while(|c| c.is_none()) {
		row.push(' ');
	}
	row.push('|');
	for b in cells.iter().filter_map(|c| *c) {
		row.push(if is_printable(b) { b as char } else { '.' });
	}
	row.push('|');
	row
}

pub fn format_row(address: usize, data: &[u8]) -> String {
	let cells: Vec<Option<u8>> = data.iter().cloned().map(Some).collect();
	format_row_cells(address, &cells)
}
