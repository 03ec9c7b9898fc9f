//! Firmware side: command dispatcher and idle-loop executor around one
//! EEPROM bus.

use std::cell::RefCell;
use std::sync::atomic::{
	AtomicBool,
	Ordering,
};
use std::thread;

use critical_section::Mutex;

use crate::bus::Pins;
use crate::command::{
	self,
	Command,
	Response,
};
use crate::protocol::Eeprom;

mod queue;

pub use self::queue::{
	JobQueue,
	WriteJob,
};

type HandlerResult = Result<Option<Vec<u8>>, String>;

/// The programmer firmware: owns the bus and the queue of pending writes.
///
/// `dispatch` is what runs when a command arrives (interrupt context on a
/// microcontroller, a receiver thread on a hosted target); `run_pending_job`
/// and `run_idle` are the main loop. Both only need `&self`, so the
/// controller can be shared (e.g. in an `Arc`).
pub struct DeviceController<P: Pins> {
	eeprom: Mutex<RefCell<Eeprom<P>>>,
	queue: JobQueue,
}

impl<P: Pins> DeviceController<P> {
	pub fn new(pins: P) -> Self {
		DeviceController {
			eeprom: Mutex::new(RefCell::new(Eeprom::new(pins))),
			queue: JobQueue::new(),
		}
	}

	// the bus is only touched inside a critical section, so a command
	// handler never interleaves with a write cycle of the idle loop
	fn with_eeprom<F, R>(&self, f: F) -> R
	where
		F: FnOnce(&mut Eeprom<P>) -> R,
	{
		critical_section::with(|cs| f(&mut self.eeprom.borrow(cs).borrow_mut()))
	}

	pub fn with_pins<F, R>(&self, f: F) -> R
	where
		F: FnOnce(&mut P) -> R,
	{
		self.with_eeprom(|ee| f(ee.pins_mut()))
	}

	pub fn into_pins(self) -> P {
		self.eeprom.into_inner().into_inner().into_pins()
	}

	pub fn pending_jobs(&self) -> usize {
		self.queue.len()
	}

	/// Handle one command. Never waits for queued writes.
	pub fn dispatch(&self, command: Command, payload: &[u8]) -> Response {
		let result = match command {
			Command::NumCalls => self.num_calls(payload),
			Command::GetNthCall => self.get_nth_call(payload),
			Command::Echo => Ok(Some(payload.to_vec())),
			Command::Read => self.read(payload),
			Command::Write => self.write(payload),
			Command::ReadPage => self.read_page(payload),
			Command::WritePage => self.write_page(payload),
			Command::Hexdump16 => self.hexdump(payload, 1),
			Command::Hexdump32 => self.hexdump(payload, 2),
		};
		match result {
			Ok(None) => Response::Empty,
			Ok(Some(data)) => Response::Data(data),
			Err(reason) => {
				debug!("rejected {}: {}", command, reason);
				Response::Rejected(reason)
			},
		}
	}

	/// One idle loop step: execute the oldest pending job, if any.
	///
	/// The job leaves the queue before the write starts and is never put
	/// back.
	pub fn run_pending_job(&self) -> bool {
		let job = match self.queue.pop() {
			None => return false,
			Some(job) => job,
		};
		trace!("executing {:?}", job);
		self.with_eeprom(|ee| job.execute(ee));
		true
	}

	/// Run pending jobs until `stop` is set.
	pub fn run_idle(&self, stop: &AtomicBool) {
		while !stop.load(Ordering::Acquire) {
			if !self.run_pending_job() {
				thread::yield_now();
			}
		}
	}

	fn num_calls(&self, payload: &[u8]) -> HandlerResult {
		expect_len(payload, 0)?;
		Ok(Some(vec![Command::ALL.len() as u8]))
	}

	fn get_nth_call(&self, payload: &[u8]) -> HandlerResult {
		expect_len(payload, 1)?;
		match Command::from_index(payload[0]) {
			Some(c) => Ok(Some(c.name().as_bytes().to_vec())),
			None => Err(format!("no command with index {}", payload[0])),
		}
	}

	fn read(&self, payload: &[u8]) -> HandlerResult {
		let address = request_address(payload, 2, 1)?;
		Ok(Some(vec![self.with_eeprom(|ee| ee.read_byte(address))]))
	}

	fn write(&self, payload: &[u8]) -> HandlerResult {
		let address = request_address(payload, 3, 1)?;
		self.queue.push(WriteJob::Single {
			address,
			data: payload[2],
		});
		Ok(None)
	}

	fn read_page(&self, payload: &[u8]) -> HandlerResult {
		let address = request_address(payload, 2, crate::PAGE_SIZE as u16)?;
		let mut page = vec![0u8; crate::PAGE_SIZE];
		self.with_eeprom(|ee| ee.read_into(address, &mut page));
		Ok(Some(page))
	}

	fn write_page(&self, payload: &[u8]) -> HandlerResult {
		let address = request_address(payload, 2 + crate::PAGE_SIZE, crate::PAGE_SIZE as u16)?;
		let job = WriteJob::page(address, &payload[2..]).ok_or_else(|| "invalid page".to_string())?;
		self.queue.push(job);
		Ok(None)
	}

	fn hexdump(&self, payload: &[u8], rows: usize) -> HandlerResult {
		let address = request_address(payload, 2, 16 * rows as u16)?;
		let mut data = vec![0u8; 16 * rows];
		self.with_eeprom(|ee| ee.read_into(address, &mut data));
		let text: Vec<String> = data.chunks(16).enumerate()
			.map(|(i, row)| command::format_row(address as usize + 16 * i, row))
			.collect();
		Ok(Some(text.join("\n").into_bytes()))
	}
}

fn expect_len(payload: &[u8], len: usize) -> Result<(), String> {
	if payload.len() != len {
		return Err(format!("expected {} payload bytes, got {}", len, payload.len()));
	}
	Ok(())
}

// checks payload length, address range and alignment
fn request_address(payload: &[u8], len: usize, alignment: u16) -> Result<u16, String> {
	expect_len(payload, len)?;
	let address = command::decode_address([payload[0], payload[1]]);
	if address > crate::MAX_ADDRESS {
		return Err(format!("address 0x{:04x} out of range", address));
	}
	if 0 != address % alignment {
		return Err(format!("address 0x{:04x} must be divisible by {}", address, alignment));
	}
	Ok(address)
}
