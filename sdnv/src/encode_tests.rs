use super::*;
use hex_literal::hex;

fn write_ok(value: u64, index: usize, width: usize, expected: &[u8]) -> usize {
    let mut block = vec![0u8; expected.len() + index];
    let mut flags = Flags::default();
    let next = write(
        &mut block,
        Field::with_value(value, index, width),
        &mut flags,
    );
    assert!(!flags.any(), "unexpected flags {flags:?} for {value}");
    assert_eq!(&block[index..], expected);
    next
}

#[test]
fn minimum_width() {
    assert_eq!(write_ok(0, 0, 0, &hex!("00")), 1);
    assert_eq!(write_ok(127, 0, 0, &hex!("7F")), 1);
    assert_eq!(write_ok(128, 0, 0, &hex!("8100")), 2);
    assert_eq!(write_ok(1234, 0, 0, &hex!("8952")), 2);
    assert_eq!(write_ok(u64::MAX, 0, 0, &hex!("81FFFFFFFFFFFFFFFF7F")), 10);
}

#[test]
fn frozen_width_pads_left() {
    assert_eq!(write_ok(5, 0, 4, &hex!("80808005")), 4);
    assert_eq!(write_ok(1234, 0, 3, &hex!("808952")), 3);
}

#[test]
fn write_at_offset() {
    let mut block = [0u8; 6];
    let mut flags = Flags::default();
    let next = write(&mut block, Field::with_value(1234, 3, 0), &mut flags);
    assert!(!flags.any());
    assert_eq!(next, 5);
    assert_eq!(&block, &hex!("000000895200"));
}

#[test]
fn fixed_width_overflow_truncates() {
    let mut block = [0u8; 1];
    let mut flags = Flags::default();
    let next = write(&mut block, Field::with_value(300, 0, 1), &mut flags);
    assert!(flags.overflow);
    assert_eq!(next, 1);
    // the truncated low seven bits are still written
    assert_eq!(block[0], (300 & 0x7F) as u8);
}

#[test]
fn no_room() {
    let mut block = [0u8; 1];
    let mut flags = Flags::default();
    write(&mut block, Field::with_value(1234, 0, 0), &mut flags);
    assert!(flags.incomplete);
    assert_eq!(block[0], 0);
}

#[test]
fn round_trip_preserves_value_iff_it_fits() {
    for width in 1..=4usize {
        for value in [0u64, 1, 127, 128, 300, 16383, 16384, 1 << 27] {
            let mut block = [0u8; 8];
            let mut flags = Flags::default();
            write(&mut block, Field::with_value(value, 0, width), &mut flags);
            let mut out = Field::new(0, width);
            read(&block, &mut out, &mut flags);
            if value <= max_value(width) {
                assert!(!flags.overflow);
                assert_eq!(out.value, value, "width {width} value {value}");
            } else {
                assert!(flags.overflow);
                assert_eq!(out.value, value & max_value(width));
            }
        }
    }
}

#[test]
fn mask_truncates_to_width() {
    let mut field = Field::with_value(300, 0, 1);
    field.mask();
    assert_eq!(field.value, 300 & 0x7F);

    // width zero leaves the value untouched
    let mut field = Field::with_value(u64::MAX, 0, 0);
    field.mask();
    assert_eq!(field.value, u64::MAX);
}
