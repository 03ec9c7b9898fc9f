#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;

macro_rules! with_context {
	(( $fmt:tt $($t:tt)* ), $e:expr) => {{
		use failure::Error;

		match (|| { $e })() {
			Ok(v) => Ok(v),
			Err(e) => {
				let e: Error = e;
				let msg = format!(concat!($fmt, ": {}") $($t)*, e);
				Err(Error::from(e.context(msg)))
			}
		}
	}};

	($msg:expr, $e:expr) => {
		with_context!(("{}", $msg), $e)
	};
}

pub type AResult<T> = Result<T, failure::Error>;

/// Highest address of the 15-bit address space
pub const MAX_ADDRESS: u16 = 0x7fff;
/// Number of bytes the EEPROM stores
pub const EEPROM_SIZE: usize = MAX_ADDRESS as usize + 1;
/// Bytes the chip buffers for a single page commit
pub const PAGE_SIZE: usize = 64;

pub mod bus;
pub mod command;
pub mod device;
pub mod error;
pub mod programmer;
pub mod protocol;
pub mod transport;

pub use self::error::{
	ProgrammerError,
	find_error,
};
