use std::cell::RefCell;
use std::collections::VecDeque;

use critical_section::Mutex;

use crate::bus::Pins;
use crate::protocol::Eeprom;

/// A write accepted by the dispatcher but not yet executed.
///
/// Page data is an owned copy: the request buffer it came from gets reused
/// for the next command.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum WriteJob {
	Single {
		address: u16,
		data: u8,
	},
	Page {
		address: u16,
		data: Box<[u8; crate::PAGE_SIZE]>,
	},
}

impl WriteJob {
	/// `address` must be page aligned and `data` exactly one page long.
	pub fn page(address: u16, data: &[u8]) -> Option<Self> {
		if 0 != address as usize % crate::PAGE_SIZE || data.len() != crate::PAGE_SIZE {
			return None;
		}
		let mut page = Box::new([0u8; crate::PAGE_SIZE]);
		page.copy_from_slice(data);
		Some(WriteJob::Page {
			address,
			data: page,
		})
	}

	pub fn address(&self) -> u16 {
		match *self {
			WriteJob::Single { address, .. } => address,
			WriteJob::Page { address, .. } => address,
		}
	}

	/// Run the write cycle(s); the job (and its payload) is gone afterwards.
	pub fn execute<P: Pins>(self, eeprom: &mut Eeprom<P>) {
		match self {
			WriteJob::Single { address, data } => eeprom.write_byte(address, data),
			WriteJob::Page { address, data } => eeprom.write_page(address, &data),
		}
	}
}

/// FIFO of pending writes, shared between the dispatcher (producer, runs
/// when a command arrives) and the idle loop (consumer).
///
/// Only push and pop happen inside the critical section; no bus access.
pub struct JobQueue {
	jobs: Mutex<RefCell<VecDeque<WriteJob>>>,
}

impl JobQueue {
	pub fn new() -> Self {
		JobQueue {
			jobs: Mutex::new(RefCell::new(VecDeque::new())),
		}
	}

	pub fn push(&self, job: WriteJob) {
		critical_section::with(|cs| {
			self.jobs.borrow(cs).borrow_mut().push_back(job);
		});
	}

	pub fn pop(&self) -> Option<WriteJob> {
		critical_section::with(|cs| {
			self.jobs.borrow(cs).borrow_mut().pop_front()
		})
	}

	pub fn len(&self) -> usize {
		critical_section::with(|cs| {
			self.jobs.borrow(cs).borrow().len()
		})
	}

	pub fn is_empty(&self) -> bool {
		0 == self.len()
	}
}

impl Default for JobQueue {
	fn default() -> Self {
		Self::new()
	}
}
