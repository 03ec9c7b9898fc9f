//! Host <-> programmer link: the camino framing over a byte stream.

use std::io;
use std::sync::Arc;

use crate::bus::SimulatedChip;
use crate::command::Command;
use crate::device::DeviceController;

mod camino;
mod serial;
mod simulated;

pub use self::camino::{
	CaminoLink,
	CaminoServer,
	MAX_DATA_LENGTH,
	SEND_ATTEMPTS,
	encode_request,
	encode_response,
};

pub use self::serial::{
	SerialConfig,
	SerialPort,
};

pub use self::simulated::SimulatedPort;

/// Sends one named command and waits for its response: `None` for a
/// response without payload.
///
/// Device side rejections and missing responses come back as
/// `ProgrammerError::Rejected` and `ProgrammerError::TransportTimeout`.
pub trait Transport {
	fn call(&mut self, command: Command, payload: &[u8]) -> crate::AResult<Option<Vec<u8>>>;
}

impl<'a, T: ?Sized + Transport> Transport for &'a mut T {
	fn call(&mut self, command: Command, payload: &[u8]) -> crate::AResult<Option<Vec<u8>>> {
		T::call(*self, command, payload)
	}
}

impl<T: ?Sized + Transport> Transport for Box<T> {
	fn call(&mut self, command: Command, payload: &[u8]) -> crate::AResult<Option<Vec<u8>>> {
		T::call(&mut **self, command, payload)
	}
}

/// Byte stream with a bounded wait: a `read` returning 0 bytes means
/// nothing arrived in time.
pub trait Port: io::Read + io::Write {
	// drop anything received but not read yet
	fn discard_input(&mut self) -> io::Result<()> {
		Ok(())
	}
}

/// Host link to a firmware instance running in-process on a simulated chip.
pub fn simulated_link(chip: SimulatedChip) -> crate::AResult<CaminoLink<SimulatedPort<SimulatedChip>>> {
	let device = Arc::new(DeviceController::new(chip));
	CaminoLink::connect(SimulatedPort::new(device))
}
