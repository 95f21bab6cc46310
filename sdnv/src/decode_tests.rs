use super::*;
use hex_literal::hex;

fn read_ok(data: &[u8], index: usize, width: usize) -> (u64, usize) {
    let mut field = Field::new(index, width);
    let mut flags = Flags::default();
    let next = read(data, &mut field, &mut flags);
    assert!(!flags.any(), "unexpected flags {flags:?} for {data:02X?}");
    (field.value, next)
}

#[test]
fn single_byte() {
    assert_eq!(read_ok(&hex!("00"), 0, 0), (0, 1));
    assert_eq!(read_ok(&hex!("01"), 0, 0), (1, 1));
    assert_eq!(read_ok(&hex!("7F"), 0, 0), (127, 1));
}

#[test]
fn multi_byte() {
    // 128 is the first value needing a continuation byte
    assert_eq!(read_ok(&hex!("8100"), 0, 0), (128, 2));
    // the RFC 5050 worked example
    assert_eq!(read_ok(&hex!("8952"), 0, 0), (1234, 2));
    assert_eq!(read_ok(&hex!("87EE41"), 0, 0), (128833, 3));
}

#[test]
fn offset_start() {
    // parse begins at field.index, not at the start of the block
    assert_eq!(read_ok(&hex!("FFFF8952"), 2, 0), (1234, 4));
}

#[test]
fn fixed_width_with_padding() {
    // zero continuation bytes pad a frozen-width field on the left
    assert_eq!(read_ok(&hex!("80808005"), 0, 4), (5, 4));
    // the terminator still ends the field early inside the width cap
    assert_eq!(read_ok(&hex!("057F7F7F"), 0, 4), (5, 1));
}

#[test]
fn incomplete() {
    let mut field = Field::new(0, 0);
    let mut flags = Flags::default();
    let next = read(&hex!("8080"), &mut field, &mut flags);
    assert!(flags.incomplete);
    assert!(!flags.overflow);
    assert_eq!(next, 2);

    // an empty block cannot hold a field at all
    let mut flags = Flags::default();
    let mut field = Field::new(0, 0);
    assert_eq!(read(&[], &mut field, &mut flags), 0);
    assert!(flags.incomplete);
}

#[test]
fn incomplete_fixed_width() {
    // width cap exhausted before a terminating byte
    let mut field = Field::new(0, 2);
    let mut flags = Flags::default();
    let next = read(&hex!("808005"), &mut field, &mut flags);
    assert!(flags.incomplete);
    assert_eq!(next, 2);
}

#[test]
fn max_value_round() {
    // u64::MAX is ten bytes: 0x81 then eight 0xFF then 0x7F
    let data = hex!("81FFFFFFFFFFFFFFFF7F");
    assert_eq!(read_ok(&data, 0, 0), (u64::MAX, 10));
}

#[test]
fn overflow() {
    // eleven payload-bearing bytes shift value bits past 64
    let data = hex!("FFFFFFFFFFFFFFFFFFFF7F");
    let mut field = Field::new(0, 0);
    let mut flags = Flags::default();
    let next = read(&data, &mut field, &mut flags);
    assert!(flags.overflow);
    assert_eq!(next, data.len());
}
