//! camino framing
//!
//! Request:  `aa 55 <device> <command> <len> <data...> <checksum>`
//! Response: `a9 a9` (no data), `ac ac <len> <data...> <checksum>` (data),
//! `b8 b8` (resend request) or `ae ae <len> <reason...> <checksum>` (rejected).
//!
//! Checksums are the byte sum (mod 256) of everything after the header.

use std::collections::HashMap;
use std::io;
use std::iter;

use super::{
	Port,
	Transport,
};
use crate::bus::Pins;
use crate::command::{
	Command,
	Response,
};
use crate::device::DeviceController;
use crate::error::ProgrammerError;

pub const MAX_DATA_LENGTH: usize = 250;
pub const SEND_ATTEMPTS: usize = 3;

const DEVICE_ADDRESS: u8 = 0;

const COMMAND_HEADER_BYTE_1: u8 = 0xaa;
const COMMAND_HEADER_BYTE_2: u8 = 0x55;

const RESPONSE_HEADER_WITH_NO_DATA: u8 = 0xa9;
const RESPONSE_HEADER_WITH_DATA: u8 = 0xac;
const RESPONSE_HEADER_RESEND_REQUEST: u8 = 0xb8;
const RESPONSE_HEADER_REJECTED: u8 = 0xae;

fn checksum<'a, I>(bytes: I) -> u8
where
	I: IntoIterator<Item = &'a u8>,
{
	bytes.into_iter().fold(0u8, |sum, &b| sum.wrapping_add(b))
}

pub fn encode_request(device: u8, command: u8, payload: &[u8]) -> crate::AResult<Vec<u8>> {
	if payload.len() > MAX_DATA_LENGTH {
		return Err(ProgrammerError::Framing(format!(
			"data length ({}) larger than max ({})", payload.len(), MAX_DATA_LENGTH
		)).into());
	}
	let mut packet = Vec::with_capacity(payload.len() + 6);
	packet.extend_from_slice(&[COMMAND_HEADER_BYTE_1, COMMAND_HEADER_BYTE_2, device, command, payload.len() as u8]);
	packet.extend_from_slice(payload);
	let sum = checksum(&packet[2..]);
	packet.push(sum);
	Ok(packet)
}

fn data_frame(header: u8, data: &[u8]) -> Vec<u8> {
	let data = &data[..data.len().min(MAX_DATA_LENGTH)];
	let len = data.len() as u8;
	let mut frame = Vec::with_capacity(data.len() + 4);
	frame.extend_from_slice(&[header, header, len]);
	frame.extend_from_slice(data);
	frame.push(checksum(iter::once(&len).chain(data.iter())));
	frame
}

pub fn encode_response(response: &Response) -> Vec<u8> {
	match response {
		Response::Empty => vec![RESPONSE_HEADER_WITH_NO_DATA, RESPONSE_HEADER_WITH_NO_DATA],
		Response::Data(data) => data_frame(RESPONSE_HEADER_WITH_DATA, data),
		Response::Rejected(reason) => data_frame(RESPONSE_HEADER_REJECTED, reason.as_bytes()),
	}
}

#[derive(Clone, PartialEq, Eq, Debug)]
enum Frame {
	Empty,
	Data(Vec<u8>),
	Resend,
	Rejected(String),
}

/// Host end of the link.
pub struct CaminoLink<S: Port> {
	port: S,
	indices: HashMap<Command, u8>,
}

impl<S: Port> CaminoLink<S> {
	/// Wrap `port` and ask the device for its command table.
	pub fn connect(port: S) -> crate::AResult<Self> {
		let mut link = CaminoLink {
			port,
			indices: HashMap::new(),
		};
		link.indices.insert(Command::NumCalls, 0);
		link.indices.insert(Command::GetNthCall, 1);
		with_context!("discovering device commands", link.discover())?;
		Ok(link)
	}

	pub fn port(&self) -> &S {
		&self.port
	}

	pub fn port_mut(&mut self) -> &mut S {
		&mut self.port
	}

	pub fn into_port(self) -> S {
		self.port
	}

	fn discover(&mut self) -> crate::AResult<()> {
		let count = match self.call(Command::NumCalls, &[])? {
			Some(ref d) if !d.is_empty() && d.len() <= 2 => {
				// little endian integer
				d.iter().rev().fold(0usize, |n, &b| n << 8 | b as usize)
			},
			other => bail!("unexpected num_calls response {:?}", other),
		};
		ensure!(count <= 0x100, "device claims {} commands", count);
		info!("device provides {} commands", count);

		for index in 2..count {
			let index = index as u8;
			let name = match self.call(Command::GetNthCall, &[index])? {
				Some(d) => String::from_utf8_lossy(&d).into_owned(),
				None => bail!("no name for command {}", index),
			};
			match Command::from_name(&name) {
				Some(command) => {
					debug!("command {}: {}", index, name);
					self.indices.insert(command, index);
				},
				None => debug!("ignoring unknown device command {}: {:?}", index, name),
			}
		}

		for command in Command::MEMORY.iter() {
			ensure!(self.indices.contains_key(command), "device doesn't provide command {}", command);
		}
		Ok(())
	}

	fn read_byte(&mut self, command: Command) -> crate::AResult<u8> {
		let mut buf = [0u8];
		loop {
			match self.port.read(&mut buf) {
				Ok(0) => return Err(ProgrammerError::TransportTimeout { command }.into()),
				Ok(_) => return Ok(buf[0]),
				Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
				Err(ref e) if e.kind() == io::ErrorKind::TimedOut || e.kind() == io::ErrorKind::WouldBlock => {
					return Err(ProgrammerError::TransportTimeout { command }.into());
				},
				Err(e) => return Err(e.into()),
			}
		}
	}

	fn read_payload(&mut self, command: Command) -> crate::AResult<Vec<u8>> {
		let len = self.read_byte(command)?;
		let mut data = Vec::with_capacity(len as usize);
		for _ in 0..len {
			data.push(self.read_byte(command)?);
		}
		let received = self.read_byte(command)?;
		let expected = checksum(iter::once(&len).chain(data.iter()));
		if received != expected {
			return Err(ProgrammerError::Framing(format!("invalid checksum: {} vs {}", expected, received)).into());
		}
		Ok(data)
	}

	fn read_frame(&mut self, command: Command) -> crate::AResult<Frame> {
		let header_1 = self.read_byte(command)?;
		let header_2 = self.read_byte(command)?;
		if header_1 != header_2 {
			return Err(ProgrammerError::Framing(format!(
				"mismatched header bytes: 0x{:02x} vs 0x{:02x}", header_1, header_2
			)).into());
		}
		match header_1 {
			RESPONSE_HEADER_WITH_NO_DATA => Ok(Frame::Empty),
			RESPONSE_HEADER_WITH_DATA => Ok(Frame::Data(self.read_payload(command)?)),
			RESPONSE_HEADER_RESEND_REQUEST => Ok(Frame::Resend),
			RESPONSE_HEADER_REJECTED => {
				let reason = self.read_payload(command)?;
				Ok(Frame::Rejected(String::from_utf8_lossy(&reason).into_owned()))
			},
			h => Err(ProgrammerError::Framing(format!("unexpected header value: 0x{:02x}", h)).into()),
		}
	}

	// only a device side resend request triggers another attempt; a missing
	// or broken response fails right away
	fn send(&mut self, command: Command, index: u8, payload: &[u8]) -> crate::AResult<Option<Vec<u8>>> {
		let packet = encode_request(DEVICE_ADDRESS, index, payload)?;
		for attempt in 1..=SEND_ATTEMPTS {
			self.port.discard_input()?;
			self.port.write_all(&packet)?;
			self.port.flush()?;
			match self.read_frame(command)? {
				Frame::Empty => return Ok(None),
				Frame::Data(data) => return Ok(Some(data)),
				Frame::Rejected(reason) => return Err(ProgrammerError::Rejected { command, reason }.into()),
				Frame::Resend => warn!("{}: device requested resend (attempt {}/{})", command, attempt, SEND_ATTEMPTS),
			}
		}
		Err(ProgrammerError::Framing(format!(
			"all {} consecutive attempts to send {} were refused", SEND_ATTEMPTS, command
		)).into())
	}
}

impl<S: Port> Transport for CaminoLink<S> {
	fn call(&mut self, command: Command, payload: &[u8]) -> crate::AResult<Option<Vec<u8>>> {
		let index = match self.indices.get(&command) {
			Some(&index) => index,
			None => bail!("device doesn't provide command {}", command),
		};
		trace!("-> {} {:02x?}", command, payload);
		self.send(command, index, payload)
	}
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum State {
	Header1,
	Header2,
	Address,
	Command,
	Length,
	Data,
	Checksum,
}

/// Device end of the link: fed one received byte at a time, produces the
/// bytes to send back once a frame is complete.
///
/// The request buffer is reused for every frame.
pub struct CaminoServer {
	state: State,
	address: u8,
	command: u8,
	length: usize,
	checksum: u8,
	data: Vec<u8>,
}

impl CaminoServer {
	pub fn new() -> Self {
		CaminoServer {
			state: State::Header1,
			address: 0,
			command: 0,
			length: 0,
			checksum: 0,
			data: Vec::with_capacity(MAX_DATA_LENGTH),
		}
	}

	pub fn feed<P: Pins>(&mut self, byte: u8, device: &DeviceController<P>) -> Option<Vec<u8>> {
		match self.state {
			State::Header1 => {
				if byte == COMMAND_HEADER_BYTE_1 {
					self.state = State::Header2;
				}
			},
			State::Header2 => {
				self.state = match byte {
					COMMAND_HEADER_BYTE_2 => State::Address,
					COMMAND_HEADER_BYTE_1 => State::Header2,
					_ => State::Header1,
				};
			},
			State::Address => {
				self.address = byte;
				self.checksum = byte;
				self.state = State::Command;
			},
			State::Command => {
				self.command = byte;
				self.checksum = self.checksum.wrapping_add(byte);
				self.state = State::Length;
			},
			State::Length => {
				if byte as usize > MAX_DATA_LENGTH {
					warn!("frame length {} too large", byte);
					self.state = State::Header1;
					return Some(vec![RESPONSE_HEADER_RESEND_REQUEST, RESPONSE_HEADER_RESEND_REQUEST]);
				}
				self.length = byte as usize;
				self.checksum = self.checksum.wrapping_add(byte);
				self.data.clear();
				self.state = if 0 == self.length { State::Checksum } else { State::Data };
			},
			State::Data => {
				self.data.push(byte);
				self.checksum = self.checksum.wrapping_add(byte);
				if self.data.len() == self.length {
					self.state = State::Checksum;
				}
			},
			State::Checksum => {
				self.state = State::Header1;
				return self.complete(byte, device);
			},
		}
		None
	}

	fn complete<P: Pins>(&mut self, received: u8, device: &DeviceController<P>) -> Option<Vec<u8>> {
		if received != self.checksum {
			warn!("invalid checksum: {} vs {}", self.checksum, received);
			return Some(vec![RESPONSE_HEADER_RESEND_REQUEST, RESPONSE_HEADER_RESEND_REQUEST]);
		}
		if self.address != DEVICE_ADDRESS {
			trace!("ignoring frame for device {}", self.address);
			return None;
		}
		let response = match Command::from_index(self.command) {
			Some(command) => {
				trace!("<- {} {:02x?}", command, self.data);
				device.dispatch(command, &self.data)
			},
			None => Response::Rejected(format!("unknown command {}", self.command)),
		};
		Some(encode_response(&response))
	}
}

impl Default for CaminoServer {
	fn default() -> Self {
		Self::new()
	}
}
