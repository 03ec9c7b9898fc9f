//! Host side: validated single commands and the whole-device operations
//! built on them.

use std::fmt;
use std::thread;
use std::time::Duration;

use crate::command::{
	Command,
	encode_address,
};
use crate::error::{
	ProgrammerError,
	check_address,
	check_alignment,
};
use crate::transport::Transport;
use crate::{
	EEPROM_SIZE,
	PAGE_SIZE,
};

mod hexdump;
mod write_test;

pub use self::hexdump::write_hexdump;
pub use self::write_test::{
	WRITE_TEST_LENGTH,
	WRITE_TEST_PATTERNS,
	WriteTestOptions,
	WriteTestReport,
};

/// Pause after each page write before the programmer accepts the next
/// command; 5ms turned out too short on real hardware.
pub const DEFAULT_WRITE_SETTLE: Duration = Duration::from_millis(10);

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Stage {
	Writing,
	Verifying,
	Reading,
}

impl fmt::Display for Stage {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.write_str(match self {
			Stage::Writing => "Writing",
			Stage::Verifying => "Verifying",
			Stage::Reading => "Reading",
		})
	}
}

/// Receives progress of the whole-device operations, once per page.
pub trait Progress {
	fn update(&mut self, stage: Stage, address: usize, completed: usize, total: usize);

	fn finish(&mut self, _stage: Stage) {
	}
}

pub struct NoProgress;

impl Progress for NoProgress {
	fn update(&mut self, _stage: Stage, _address: usize, _completed: usize, _total: usize) {
	}
}

/// Single status line on stderr, rewritten in place.
pub struct StderrProgress;

impl Progress for StderrProgress {
	fn update(&mut self, stage: Stage, address: usize, completed: usize, total: usize) {
		eprint!("\r{}... [0x{:04x}] {:.2}%", stage, address, 100.0 * completed as f64 / total as f64);
	}

	fn finish(&mut self, _stage: Stage) {
		eprintln!();
	}
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Mismatch {
	pub address: usize,
	pub expected: u8,
	pub actual: u8,
}

impl fmt::Display for Mismatch {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "0x{:04x}: expected {:02x}, got {:02x}", self.address, self.expected, self.actual)
	}
}

/// Outcome of comparing the device against an image; every differing byte
/// is listed.
#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct VerifyReport {
	pub mismatches: Vec<Mismatch>,
}

impl VerifyReport {
	pub fn is_ok(&self) -> bool {
		self.mismatches.is_empty()
	}
}

impl fmt::Display for VerifyReport {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self.mismatches.len() {
			0 => write!(f, "verification passed"),
			n => write!(f, "verification failed: {} mismatching bytes, first at 0x{:04x}", n, self.mismatches[0].address),
		}
	}
}

fn check_image(image: &[u8]) -> Result<(), ProgrammerError> {
	if image.len() != EEPROM_SIZE {
		return Err(ProgrammerError::ImageSize {
			expected: EEPROM_SIZE,
			actual: image.len(),
		});
	}
	Ok(())
}

pub struct Programmer<T: Transport> {
	transport: T,
	write_settle: Duration,
}

impl<T: Transport> Programmer<T> {
	pub fn new(transport: T) -> Self {
		Programmer {
			transport,
			write_settle: DEFAULT_WRITE_SETTLE,
		}
	}

	pub fn with_write_settle(mut self, write_settle: Duration) -> Self {
		self.write_settle = write_settle;
		self
	}

	pub fn write_settle(&self) -> Duration {
		self.write_settle
	}

	pub fn transport(&self) -> &T {
		&self.transport
	}

	pub fn transport_mut(&mut self) -> &mut T {
		&mut self.transport
	}

	pub fn into_transport(self) -> T {
		self.transport
	}

	fn expect_data(&mut self, command: Command, payload: &[u8], len: usize) -> crate::AResult<Vec<u8>> {
		match self.transport.call(command, payload)? {
			Some(data) => {
				if data.len() != len {
					return Err(ProgrammerError::Framing(format!(
						"{}: expected {} bytes, got {}", command, len, data.len()
					)).into());
				}
				Ok(data)
			},
			None => Err(ProgrammerError::Framing(format!("{}: expected {} bytes, got none", command, len)).into()),
		}
	}

	fn expect_empty(&mut self, command: Command, payload: &[u8]) -> crate::AResult<()> {
		match self.transport.call(command, payload)? {
			None => Ok(()),
			Some(data) => Err(ProgrammerError::Framing(format!(
				"{}: unexpected {} byte response", command, data.len()
			)).into()),
		}
	}

	fn expect_text(&mut self, command: Command, payload: &[u8]) -> crate::AResult<String> {
		let data = self.transport.call(command, payload)?
			.ok_or_else(|| ProgrammerError::Framing(format!("{}: expected text, got none", command)))?;
		Ok(String::from_utf8(data)?)
	}

	pub fn echo(&mut self, data: &[u8]) -> crate::AResult<Vec<u8>> {
		Ok(self.transport.call(Command::Echo, data)?.unwrap_or_default())
	}

	pub fn read(&mut self, address: usize) -> crate::AResult<u8> {
		let address = check_address(address)?;
		let data = self.expect_data(Command::Read, &encode_address(address), 1)?;
		Ok(data[0])
	}

	/// Queues a single byte write; the device needs ~10ms before it can
	/// take the next write.
	pub fn write(&mut self, address: usize, data: u8) -> crate::AResult<()> {
		let address = check_address(address)?;
		let a = encode_address(address);
		self.expect_empty(Command::Write, &[a[0], a[1], data])
	}

	pub fn read_page(&mut self, address: usize) -> crate::AResult<Vec<u8>> {
		let address = check_address(address)?;
		check_alignment(address, PAGE_SIZE as u16)?;
		self.expect_data(Command::ReadPage, &encode_address(address), PAGE_SIZE)
	}

	/// Queues a page write and waits the configured settle time.
	pub fn write_page(&mut self, address: usize, data: &[u8]) -> crate::AResult<()> {
		let address = check_address(address)?;
		check_alignment(address, PAGE_SIZE as u16)?;
		ensure!(data.len() == PAGE_SIZE, "page data must be {} bytes, got {}", PAGE_SIZE, data.len());

		let mut payload = Vec::with_capacity(2 + PAGE_SIZE);
		payload.extend_from_slice(&encode_address(address));
		payload.extend_from_slice(data);
		self.expect_empty(Command::WritePage, &payload)?;

		if self.write_settle > Duration::from_secs(0) {
			thread::sleep(self.write_settle);
		}
		Ok(())
	}

	pub fn hexdump16(&mut self, address: usize) -> crate::AResult<String> {
		let address = check_address(address)?;
		check_alignment(address, 16)?;
		self.expect_text(Command::Hexdump16, &encode_address(address))
	}

	pub fn hexdump32(&mut self, address: usize) -> crate::AResult<String> {
		let address = check_address(address)?;
		check_alignment(address, 32)?;
		self.expect_text(Command::Hexdump32, &encode_address(address))
	}

	/// Write a full image page by page, then read everything back and
	/// compare.
	///
	/// A wrong sized image fails before the device is touched. Mismatches
	/// don't abort; they are all collected in the report.
	pub fn upload(&mut self, image: &[u8], progress: &mut dyn Progress) -> crate::AResult<VerifyReport> {
		check_image(image)?;

		for (page, data) in image.chunks(PAGE_SIZE).enumerate() {
			let address = page * PAGE_SIZE;
			with_context!(("writing page at 0x{:04x}", address), self.write_page(address, data))?;
			progress.update(Stage::Writing, address, address + PAGE_SIZE, EEPROM_SIZE);
		}
		progress.finish(Stage::Writing);
		info!("wrote {} pages", EEPROM_SIZE / PAGE_SIZE);

		self.verify(image, progress)
	}

	pub fn verify(&mut self, image: &[u8], progress: &mut dyn Progress) -> crate::AResult<VerifyReport> {
		check_image(image)?;

		let mut report = VerifyReport::default();
		for (page, expected) in image.chunks(PAGE_SIZE).enumerate() {
			let address = page * PAGE_SIZE;
			let actual = with_context!(("verifying page at 0x{:04x}", address), self.read_page(address))?;
			for (offset, (&expected, &actual)) in expected.iter().zip(actual.iter()).enumerate() {
				if expected != actual {
					let mismatch = Mismatch {
						address: address + offset,
						expected,
						actual,
					};
					debug!("mismatch at {}", mismatch);
					report.mismatches.push(mismatch);
				}
			}
			progress.update(Stage::Verifying, address, address + PAGE_SIZE, EEPROM_SIZE);
		}
		progress.finish(Stage::Verifying);
		Ok(report)
	}

	/// Read the whole device. On failure no partial image is returned; the
	/// error tells how far the download got.
	pub fn download(&mut self, progress: &mut dyn Progress) -> crate::AResult<Vec<u8>> {
		let image = self.read_range(0, EEPROM_SIZE, progress)?;
		progress.finish(Stage::Reading);
		Ok(image)
	}

	/// Read the page aligned range `[start, stop)`.
	pub fn read_range(&mut self, start: usize, stop: usize, progress: &mut dyn Progress) -> crate::AResult<Vec<u8>> {
		ensure!(start < stop && stop <= EEPROM_SIZE, "invalid range 0x{:04x}-0x{:04x}", start, stop);
		ensure!(0 == start % PAGE_SIZE && 0 == stop % PAGE_SIZE, "range 0x{:04x}-0x{:04x} not page aligned", start, stop);

		let mut data = Vec::with_capacity(stop - start);
		for address in (start..stop).step_by(PAGE_SIZE) {
			let page = with_context!(
				("reading page at 0x{:04x} ({} bytes read before)", address, data.len()),
				self.read_page(address)
			)?;
			data.extend_from_slice(&page);
			progress.update(Stage::Reading, address, address + PAGE_SIZE - start, stop - start);
		}
		Ok(data)
	}

	/// Print `[start, stop)` as hexdump rows, reading the device page by page.
	pub fn hexdump<W: std::io::Write>(&mut self, out: &mut W, start: usize, stop: usize, hexdump_all: bool) -> crate::AResult<()> {
		write_hexdump(out, start, stop, hexdump_all, |address| self.read_page(address))
	}
}
