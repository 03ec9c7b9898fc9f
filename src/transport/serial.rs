use std::ffi::CString;
use std::fs;
use std::io::{
	self,
	Read,
	Write,
};
use std::mem;
use std::os::unix::io::{
	AsRawFd,
	FromRawFd,
};
use std::time::Duration;

use libc::{
	CLOCAL,
	CREAD,
	O_CLOEXEC,
	O_NOCTTY,
	O_RDWR,
	TCIFLUSH,
	TCIOFLUSH,
	TCSANOW,
	VMIN,
	VTIME,
	cfmakeraw,
	cfsetispeed,
	cfsetospeed,
	open,
	speed_t,
	tcdrain,
	tcflush,
	tcgetattr,
	tcsetattr,
	termios,
};

use super::Port;

#[derive(Clone, Debug)]
pub struct SerialConfig {
	pub path: String,
	pub baud: u32,
	/// how long a read waits for the next byte; rounded to tenths of a second
	pub timeout: Duration,
}

impl Default for SerialConfig {
	fn default() -> Self {
		SerialConfig {
			path: "/dev/ttyUSB0".into(),
			baud: 115200,
			timeout: Duration::from_secs(1),
		}
	}
}

fn baud_constant(baud: u32) -> Option<speed_t> {
	Some(match baud {
		1200 => libc::B1200,
		2400 => libc::B2400,
		4800 => libc::B4800,
		9600 => libc::B9600,
		19200 => libc::B19200,
		38400 => libc::B38400,
		57600 => libc::B57600,
		115200 => libc::B115200,
		230400 => libc::B230400,
		460800 => libc::B460800,
		500000 => libc::B500000,
		921600 => libc::B921600,
		1000000 => libc::B1000000,
		_ => return None,
	})
}

// VTIME counts deciseconds in a single byte
fn timeout_deciseconds(timeout: Duration) -> u8 {
	let ds = (timeout.as_secs() * 10) + (timeout.subsec_millis() as u64 + 99) / 100;
	ds.max(1).min(255) as u8
}

fn check(res: libc::c_int) -> io::Result<()> {
	if -1 == res {
		Err(io::Error::last_os_error())
	} else {
		Ok(())
	}
}

/// Raw 8N1 tty; a read returns 0 bytes once the configured timeout passes
/// without input.
#[derive(Debug)]
pub struct SerialPort {
	file: fs::File,
	path: String,
}

impl SerialPort {
	pub fn open(config: &SerialConfig) -> io::Result<SerialPort> {
		let speed = match baud_constant(config.baud) {
			Some(speed) => speed,
			None => return Err(io::Error::new(
				io::ErrorKind::InvalidInput,
				format!("unsupported baud rate {}", config.baud),
			)),
		};

		let path = CString::new(config.path.clone())?;
		let fd = unsafe { open(path.as_ptr(), O_RDWR | O_NOCTTY | O_CLOEXEC) };
		if -1 == fd {
			return Err(io::Error::last_os_error());
		}
		// closes fd on all error paths below
		let file = unsafe { fs::File::from_raw_fd(fd) };

		unsafe {
			let mut tio: termios = mem::zeroed();
			check(tcgetattr(fd, &mut tio))?;
			cfmakeraw(&mut tio);
			tio.c_cflag |= CLOCAL | CREAD;
			tio.c_cc[VMIN] = 0;
			tio.c_cc[VTIME] = timeout_deciseconds(config.timeout);
			check(cfsetispeed(&mut tio, speed))?;
			check(cfsetospeed(&mut tio, speed))?;
			check(tcsetattr(fd, TCSANOW, &tio))?;
			check(tcflush(fd, TCIOFLUSH))?;
		}

		debug!("opened {} at {} baud", config.path, config.baud);
		Ok(SerialPort {
			file,
			path: config.path.clone(),
		})
	}

	pub fn path(&self) -> &str {
		&self.path
	}
}

impl Read for SerialPort {
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		loop {
			match self.file.read(buf) {
				Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
				r => return r,
			}
		}
	}
}

impl Write for SerialPort {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		self.file.write(buf)
	}

	fn flush(&mut self) -> io::Result<()> {
		check(unsafe { tcdrain(self.file.as_raw_fd()) })
	}
}

impl Port for SerialPort {
	fn discard_input(&mut self) -> io::Result<()> {
		check(unsafe { tcflush(self.file.as_raw_fd(), TCIFLUSH) })
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn baud_rates() {
		assert_eq!(baud_constant(115200), Some(libc::B115200));
		assert_eq!(baud_constant(9600), Some(libc::B9600));
		assert_eq!(baud_constant(12345), None);
	}

	#[test]
	fn timeouts() {
		assert_eq!(timeout_deciseconds(Duration::from_secs(1)), 10);
		assert_eq!(timeout_deciseconds(Duration::from_millis(150)), 2);
		assert_eq!(timeout_deciseconds(Duration::from_millis(0)), 1);
		assert_eq!(timeout_deciseconds(Duration::from_secs(60)), 255);
	}

	#[test]
	fn open_missing_device() {
		let config = SerialConfig {
			path: "/nonexistent/ttyUSB0".into(),
			..SerialConfig::default()
		};
		assert!(SerialPort::open(&config).is_err());
	}
}
