use crate::command::Command;

/// Failures callers may want to tell apart; everything else is a plain
/// `failure::Error` with context.
#[derive(Debug, Fail)]
pub enum ProgrammerError {
	#[fail(display = "address 0x{:04x} out of range 0x0000-0x7fff", _0)]
	InvalidAddress(usize),
	#[fail(display = "address 0x{:04x} must be divisible by {}", address, alignment)]
	Misaligned {
		address: u16,
		alignment: u16,
	},
	#[fail(display = "image length must be exactly {} (0x{:x}); got {} (0x{:x})", expected, expected, actual, actual)]
	ImageSize {
		expected: usize,
		actual: usize,
	},
	#[fail(display = "device rejected {}: {}", command, reason)]
	Rejected {
		command: Command,
		reason: String,
	},
	#[fail(display = "nothing sent when a response to {} was expected", command)]
	TransportTimeout {
		command: Command,
	},
	#[fail(display = "framing error: {}", _0)]
	Framing(String),
}

/// Look for a `ProgrammerError` anywhere in the cause chain (errors usually
/// get wrapped by `with_context!`).
pub fn find_error(e: &failure::Error) -> Option<&ProgrammerError> {
	e.iter_chain().filter_map(|cause| cause.downcast_ref::<ProgrammerError>()).next()
}

pub(crate) fn check_address(address: usize) -> Result<u16, ProgrammerError> {
	if address > crate::MAX_ADDRESS as usize {
		return Err(ProgrammerError::InvalidAddress(address));
	}
	Ok(address as u16)
}

pub(crate) fn check_alignment(address: u16, alignment: u16) -> Result<(), ProgrammerError> {
	if 0 != address % alignment {
		return Err(ProgrammerError::Misaligned { address, alignment });
	}
	Ok(())
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn address_checks() {
		assert_eq!(check_address(0).unwrap(), 0);
		assert_eq!(check_address(0x7fff).unwrap(), 0x7fff);
		assert!(check_address(0x8000).is_err());
		assert!(check_alignment(0x0040, 64).is_ok());
		assert!(check_alignment(0x0050, 64).is_err());
		assert!(check_alignment(0x0050, 16).is_ok());
	}

	#[test]
	fn find_through_context() {
		let e: failure::Error = ProgrammerError::TransportTimeout { command: Command::Read }.into();
		let e: failure::Error = e.context("reading at 0x0000".to_string()).into();
		match find_error(&e) {
			Some(ProgrammerError::TransportTimeout { command: Command::Read }) => (),
			other => panic!("unexpected error in chain: {:?}", other),
		}
	}
}
