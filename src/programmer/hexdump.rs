use std::io;

use crate::command::format_row_cells;
use crate::{
	EEPROM_SIZE,
	PAGE_SIZE,
};

const ROW_SIZE: usize = 16;

fn round_down(value: usize, to: usize) -> usize {
	value / to * to
}

fn round_up(value: usize, to: usize) -> usize {
	(value + to - 1) / to * to
}

/// Write `[start, stop)` as hexdump rows, fetching whole pages through
/// `read_page`.
///
/// Unless `hexdump_all` is set, a run of rows equal to the row before is
/// shown as a single `*`. Rows cut by an unaligned `start` or `stop` are
/// printed with the bytes outside the range blanked and never collapse.
/// The last line is always `stop`.
pub fn write_hexdump<W, F>(out: &mut W, start: usize, stop: usize, hexdump_all: bool, mut read_page: F) -> crate::AResult<()>
where
	W: io::Write + ?Sized,
	F: FnMut(usize) -> crate::AResult<Vec<u8>>,
{
	ensure!(start < stop, "start (0x{:04x}) must be less than stop (0x{:04x})", start, stop);
	ensure!(stop <= EEPROM_SIZE, "stop (0x{:04x}) must not exceed 0x{:04x}", stop, EEPROM_SIZE);

	let first_row = round_down(start, ROW_SIZE);
	let end_row = round_up(stop, ROW_SIZE);

	// previous row and whether it was cut
	let mut previous: Option<(Vec<u8>, bool)> = None;
	let mut within_star = false;

	for page_address in (round_down(first_row, PAGE_SIZE)..round_up(end_row, PAGE_SIZE)).step_by(PAGE_SIZE) {
		let page = read_page(page_address)?;
		ensure!(page.len() == PAGE_SIZE, "page at 0x{:04x}: got {} bytes", page_address, page.len());

		for (index, row) in page.chunks(ROW_SIZE).enumerate() {
			let row_address = page_address + index * ROW_SIZE;
			if row_address < first_row || row_address >= end_row {
				continue;
			}

			let partial = row_address < start || row_address + ROW_SIZE > stop;
			let repeated = !partial && !hexdump_all && match previous {
				Some((ref data, false)) => data[..] == row[..],
				_ => false,
			};

			if repeated {
				if !within_star {
					writeln!(out, "*")?;
					within_star = true;
				}
			} else {
				within_star = false;
				let cells: Vec<Option<u8>> = row.iter().enumerate().map(|(i, &b)| {
					let address = row_address + i;
					if address >= start && address < stop { Some(b) } else { None }
				}).collect();
				writeln!(out, "{}", format_row_cells(row_address.max(start), &cells))?;
			}

			previous = Some((row.to_vec(), partial));
		}
	}

	writeln!(out, "{:04x}", stop)?;
	Ok(())
}
