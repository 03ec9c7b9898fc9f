use std::fmt;
use std::io;
use std::thread;
use std::time::Duration;

use super::{
	Programmer,
	write_hexdump,
};
use crate::transport::Transport;
use crate::PAGE_SIZE;

/// Each trial fills the first 256 bytes with one of these, repeated.
pub const WRITE_TEST_PATTERNS: [[u8; 4]; 8] = [
	[0xa5, 0xa5, 0xa5, 0xa5],
	[0x00, 0xfa, 0xca, 0xde],
	[0xc0, 0xff, 0xee, 0x00],
	[0xde, 0xad, 0xbe, 0xef],
	[0xbe, 0xef, 0xde, 0xad],
	[0xca, 0xfe, 0xd0, 0x0d],
	[0xba, 0xaa, 0xaa, 0xad],
	[0x8b, 0xad, 0xf0, 0x0d],
];

pub const WRITE_TEST_LENGTH: usize = 4 * PAGE_SIZE;

#[derive(Clone, Debug)]
pub struct WriteTestOptions {
	pub trials: usize,
	/// pause between writing and reading back
	pub read_wait: Duration,
	/// read everything twice, keep the second result
	pub double_read: bool,
	/// hexdump each trial's read back
	pub hexdump_tests: bool,
	pub hexdump_all: bool,
}

impl Default for WriteTestOptions {
	fn default() -> Self {
		WriteTestOptions {
			trials: 8,
			read_wait: Duration::from_secs(1),
			double_read: false,
			hexdump_tests: false,
			hexdump_all: false,
		}
	}
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct WriteTestReport {
	pub trials: usize,
	pub errors: usize,
	pub total: usize,
}

impl WriteTestReport {
	pub fn percent(&self) -> f64 {
		if 0 == self.total {
			return 0.0;
		}
		100.0 * self.errors as f64 / self.total as f64
	}
}

impl fmt::Display for WriteTestReport {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{:.2}% ({}/{}) errors avg over {} trials", self.percent(), self.errors, self.total, self.trials)
	}
}

fn pattern_hex(pattern: &[u8; 4]) -> String {
	pattern.iter().map(|b| format!("{:02x}", b)).collect::<Vec<_>>().join(" ")
}

impl<T: Transport> Programmer<T> {
	fn read_test_area(&mut self) -> crate::AResult<Vec<u8>> {
		let mut data = Vec::with_capacity(WRITE_TEST_LENGTH);
		for address in (0..WRITE_TEST_LENGTH).step_by(PAGE_SIZE) {
			data.extend_from_slice(&self.read_page(address)?);
		}
		Ok(data)
	}

	/// Repeatedly overwrite the first four pages with test patterns and count
	/// the bytes that don't read back as written. Destroys their contents.
	///
	/// Every bad byte is logged with the bits that flipped.
	pub fn write_test<W: io::Write + ?Sized>(&mut self, options: &WriteTestOptions, out: &mut W) -> crate::AResult<WriteTestReport> {
		let estimate = options.trials as f64 * (options.read_wait.as_millis() as f64 / 1000.0 + 0.2);
		info!("running {} write test trials; this should take ~{:.0} min {:.0} s", options.trials, (estimate / 60.0).floor(), estimate % 60.0);
		debug!("write test options: {:?}", options);

		let mut errors = 0;
		for trial in 0..options.trials {
			let pattern = &WRITE_TEST_PATTERNS[trial % WRITE_TEST_PATTERNS.len()];
			debug!("trial {}/{} with pattern {}", trial + 1, options.trials, pattern_hex(pattern));

			let page: Vec<u8> = (0..PAGE_SIZE).map(|i| pattern[i % 4]).collect();
			for address in (0..WRITE_TEST_LENGTH).step_by(PAGE_SIZE) {
				with_context!(("trial {}: writing page at 0x{:04x}", trial + 1, address), self.write_page(address, &page))?;
			}

			if options.read_wait > Duration::from_secs(0) {
				thread::sleep(options.read_wait);
			}

			if options.double_read {
				with_context!(("trial {}: first read", trial + 1), self.read_test_area())?;
			}
			let data = with_context!(("trial {}: reading back", trial + 1), self.read_test_area())?;

			if options.hexdump_tests {
				write_hexdump(out, 0, WRITE_TEST_LENGTH, options.hexdump_all, |address| {
					Ok(data[address..address + PAGE_SIZE].to_vec())
				})?;
				writeln!(out, "=------------------------------------------------------------------------=")?;
			}

			for (address, &got) in data.iter().enumerate() {
				let expected = pattern[address % 4];
				if got != expected {
					errors += 1;
					error!(
						"[pattern: {}] {:04x}: expected {:02x}, got {:02x} ({:08b} flipped)",
						pattern_hex(pattern), address, expected, got, got ^ expected
					);
				}
			}
		}

		Ok(WriteTestReport {
			trials: options.trials,
			errors,
			total: options.trials * WRITE_TEST_LENGTH,
		})
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn report_format() {
		let report = WriteTestReport { trials: 8, errors: 8, total: 8 * 256 };
		assert_eq!(report.to_string(), "0.39% (8/2048) errors avg over 8 trials");
		let report = WriteTestReport { trials: 0, errors: 0, total: 0 };
		assert_eq!(report.percent(), 0.0);
	}

	#[test]
	fn patterns() {
		assert_eq!(pattern_hex(&WRITE_TEST_PATTERNS[3]), "de ad be ef");
		assert_eq!(WRITE_TEST_LENGTH, 256);
	}
}
