use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

use super::{
	CaminoServer,
	Port,
};
use crate::bus::Pins;
use crate::device::DeviceController;

/// In-process stand-in for a serial line to the programmer firmware.
///
/// Written bytes go straight into a `CaminoServer`; queued writes are
/// executed after each response, as the firmware idle loop would between
/// two host commands.
pub struct SimulatedPort<P: Pins> {
	device: Arc<DeviceController<P>>,
	server: CaminoServer,
	outbound: VecDeque<u8>,
}

impl<P: Pins> SimulatedPort<P> {
	pub fn new(device: Arc<DeviceController<P>>) -> Self {
		SimulatedPort {
			device,
			server: CaminoServer::new(),
			outbound: VecDeque::new(),
		}
	}

	pub fn device(&self) -> &Arc<DeviceController<P>> {
		&self.device
	}
}

impl<P: Pins> io::Read for SimulatedPort<P> {
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		let mut n = 0;
		while n < buf.len() {
			match self.outbound.pop_front() {
				Some(b) => buf[n] = b,
				None => break,
			}
			n += 1;
		}
		Ok(n)
	}
}

impl<P: Pins> io::Write for SimulatedPort<P> {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		for &b in buf {
			if let Some(response) = self.server.feed(b, &*self.device) {
				self.outbound.extend(response);
				while self.device.run_pending_job() {}
			}
		}
		Ok(buf.len())
	}

	fn flush(&mut self) -> io::Result<()> {
		Ok(())
	}
}

impl<P: Pins> Port for SimulatedPort<P> {
	fn discard_input(&mut self) -> io::Result<()> {
		self.outbound.clear();
		Ok(())
	}
}
