extern crate at28c256_rw;
extern crate proptest;

use std::time::Duration;

use proptest::prelude::*;

use at28c256_rw::bus::SimulatedChip;
use at28c256_rw::command::{
	Command,
	encode_address,
	format_row,
};
use at28c256_rw::programmer::{
	NoProgress,
	Programmer,
	WriteTestOptions,
};
use at28c256_rw::transport::{
	CaminoLink,
	SimulatedPort,
	Transport,
	simulated_link,
};
use at28c256_rw::{
	EEPROM_SIZE,
	ProgrammerError,
	find_error,
};

type SimulatedProgrammer = Programmer<CaminoLink<SimulatedPort<SimulatedChip>>>;

fn programmer(chip: SimulatedChip) -> SimulatedProgrammer {
	Programmer::new(simulated_link(chip).unwrap()).with_write_settle(Duration::from_secs(0))
}

fn with_chip<F, R>(p: &SimulatedProgrammer, f: F) -> R
where
	F: FnOnce(&mut SimulatedChip) -> R,
{
	p.transport().port().device().with_pins(f)
}

fn quick_tests(trials: usize) -> WriteTestOptions {
	WriteTestOptions {
		trials,
		read_wait: Duration::from_secs(0),
		..WriteTestOptions::default()
	}
}

#[test]
fn wrong_size_upload_writes_nothing() {
	let mut p = programmer(SimulatedChip::new());
	for len in &[0, EEPROM_SIZE - 1, EEPROM_SIZE + 1] {
		let e = p.upload(&vec![0u8; *len], &mut NoProgress).unwrap_err();
		match find_error(&e) {
			Some(ProgrammerError::ImageSize { .. }) => (),
			other => panic!("unexpected error {:?}", other),
		}
	}
	assert_eq!(with_chip(&p, |chip| chip.write_pulses()), 0);
}

proptest! {
	#![proptest_config(ProptestConfig::with_cases(4))]

	#[test]
	fn upload_verifies(image in proptest::collection::vec(any::<u8>(), EEPROM_SIZE)) {
		let mut p = programmer(SimulatedChip::new());
		let report = p.upload(&image, &mut NoProgress).unwrap();
		prop_assert!(report.is_ok(), "{}", report);
		prop_assert!(with_chip(&p, |chip| chip.contents() == &image[..]));
	}

	#[test]
	fn stuck_bit_is_the_only_mismatch(
		image in proptest::collection::vec(any::<u8>(), EEPROM_SIZE),
		address in 0usize..EEPROM_SIZE,
		bit in 0u8..8
	) {
		let mut chip = SimulatedChip::new();
		chip.stick_bits(address as u16, 1 << bit);
		let mut p = programmer(chip);
		let report = p.upload(&image, &mut NoProgress).unwrap();
		prop_assert_eq!(report.mismatches.len(), 1);
		let mismatch = report.mismatches[0];
		prop_assert_eq!(mismatch.address, address);
		prop_assert_eq!(mismatch.expected, image[address]);
		prop_assert_eq!(mismatch.actual, image[address] ^ (1 << bit));
	}
}

#[test]
fn download_reads_everything() {
	let image: Vec<u8> = (0..EEPROM_SIZE).map(|a| (a ^ (a >> 8)) as u8).collect();
	let mut p = programmer(SimulatedChip::with_contents(&image));
	assert_eq!(p.download(&mut NoProgress).unwrap(), image);
	assert_eq!(with_chip(&p, |chip| chip.write_pulses()), 0);
}

#[test]
fn single_byte_access() {
	let mut p = programmer(SimulatedChip::new());
	p.write(0x0010, 0x12).unwrap();
	p.write(0x0020, 0x34).unwrap();
	assert_eq!(p.read(0x0010).unwrap(), 0x12);
	assert_eq!(p.read(0x0020).unwrap(), 0x34);
	assert_eq!(with_chip(&p, |chip| chip.commits().to_vec()), vec![(0x0010, 0x12), (0x0020, 0x34)]);
}

#[test]
fn uniform_device_hexdump() {
	let mut p = programmer(SimulatedChip::with_contents(&vec![0x51; EEPROM_SIZE]));
	let mut out = Vec::new();
	p.hexdump(&mut out, 0, EEPROM_SIZE, false).unwrap();
	let expected = format!("{}\n*\n8000\n", format_row(0, &[0x51; 16]));
	assert_eq!(String::from_utf8(out).unwrap(), expected);

	let mut out = Vec::new();
	p.hexdump(&mut out, 0, 0x40, true).unwrap();
	assert_eq!(String::from_utf8(out).unwrap().lines().count(), 5);
}

#[test]
fn device_side_hexdump() {
	let image: Vec<u8> = (0..EEPROM_SIZE).map(|a| a as u8).collect();
	let mut p = programmer(SimulatedChip::with_contents(&image));
	assert_eq!(p.hexdump16(0x0120).unwrap(), format_row(0x0120, &image[0x0120..0x0130]));
	assert_eq!(
		p.hexdump32(0x0140).unwrap(),
		format!("{}\n{}", format_row(0x0140, &image[0x0140..0x0150]), format_row(0x0150, &image[0x0150..0x0160]))
	);
}

#[test]
fn device_rejects_misaligned_pages() {
	let mut p = programmer(SimulatedChip::new());
	// bypass host side checks
	let e = p.transport_mut().call(Command::ReadPage, &encode_address(0x0001)).unwrap_err();
	match find_error(&e) {
		Some(ProgrammerError::Rejected { command: Command::ReadPage, .. }) => (),
		other => panic!("unexpected error {:?}", other),
	}
	let mut payload = encode_address(0x0020).to_vec();
	payload.extend_from_slice(&[0u8; 64]);
	assert!(p.transport_mut().call(Command::WritePage, &payload).is_err());
	assert!(p.transport_mut().call(Command::Hexdump32, &encode_address(0x0010)).is_err());
	assert_eq!(with_chip(&p, |chip| chip.write_pulses()), 0);

	// the link is still usable afterwards
	assert_eq!(p.echo(b"still here").unwrap(), b"still here".to_vec());
}

#[test]
fn write_test_on_clean_device() {
	let mut p = programmer(SimulatedChip::new());
	let mut out = Vec::new();
	let report = p.write_test(&quick_tests(8), &mut out).unwrap();
	assert_eq!(report.errors, 0);
	assert_eq!(report.total, 8 * 256);
	assert_eq!(report.percent(), 0.0);
	assert!(out.is_empty());
	// last trial used the last pattern
	assert_eq!(with_chip(&p, |chip| chip.contents()[..4].to_vec()), vec![0x8b, 0xad, 0xf0, 0x0d]);
}

#[test]
fn write_test_counts_flipped_bits() {
	let mut chip = SimulatedChip::new();
	chip.stick_bits(0x0042, 0x80);
	let mut p = programmer(chip);
	let mut out = Vec::new();
	let mut options = quick_tests(5);
	options.double_read = true;
	options.hexdump_tests = true;
	let report = p.write_test(&options, &mut out).unwrap();
	assert_eq!(report.errors, 5);
	assert_eq!(report.to_string(), "0.39% (5/1280) errors avg over 5 trials");
	let out = String::from_utf8(out).unwrap();
	assert_eq!(out.matches("=---").count(), 5);
	assert_eq!(out.matches("\n0100\n").count(), 5);
}
