use super::*;
use block_flags::BlockFlags;
use block_type::BlockType;
use super::crc::CipherSuite;

/// Security result type for an integrity signature.
pub const INTEGRITY_SIGNATURE: u8 = 1;

/// A Bundle Integrity Block carrying a CRC over the payload block.
#[derive(Debug, Default, Clone)]
pub struct IntegrityBlock {
    pub bf: sdnv::Field,
    pub blklen: sdnv::Field,
    pub security_target_count: sdnv::Field,
    pub security_target_type: u8,
    pub cipher_suite_id: sdnv::Field,
    pub cipher_suite_flags: sdnv::Field,
    pub compound_length: sdnv::Field,
    pub security_result_type: u8,
    pub security_result_length: sdnv::Field,
    /// The CRC itself; a CRC16 occupies the low bits.
    pub security_result: u32,
}

/// Frozen-width layout for originated integrity blocks.  The security
/// result is rewritten in place for every fragment, so everything up to it
/// keeps a fixed width.
pub(crate) const TEMPLATE: IntegrityBlock = IntegrityBlock {
    bf: sdnv::Field::new(1, 1),
    blklen: sdnv::Field::new(2, 4),
    security_target_count: sdnv::Field::with_value(1, 6, 1),
    security_target_type: 0x01,
    cipher_suite_id: sdnv::Field::new(8, 1),
    cipher_suite_flags: sdnv::Field::new(9, 1),
    compound_length: sdnv::Field::new(10, 1),
    security_result_type: INTEGRITY_SIGNATURE,
    security_result_length: sdnv::Field::new(12, 1),
    security_result: 0,
};

fn read_result(buffer: &[u8], at: usize, len: usize) -> Option<u32> {
    match len {
        2 => Some(u16::from_be_bytes(buffer.get(at..at + 2)?.try_into().ok()?) as u32),
        4 => Some(u32::from_be_bytes(buffer.get(at..at + 4)?.try_into().ok()?)),
        _ => None,
    }
}

fn write_result(buffer: &mut [u8], at: usize, suite: CipherSuite, crc: u32) {
    match suite {
        CipherSuite::CRC16_X25 => {
            buffer[at..at + 2].copy_from_slice(&(crc as u16).to_be_bytes())
        }
        CipherSuite::CRC32_CASTAGNOLI => buffer[at..at + 4].copy_from_slice(&crc.to_be_bytes()),
    }
}

/// Parses a BIB, returning the total size of the block.
pub fn read(
    buffer: &[u8],
    bib: &mut IntegrityBlock,
    update_indices: bool,
    flags: &mut Flags,
) -> Result<usize, Error> {
    let mut sf = sdnv::Flags::default();

    if buffer.is_empty() || buffer[0] != u8::from(BlockType::PayloadIntegrity) {
        return raise(flags, Error::Parse("integrity block"));
    }

    let mut at;
    if update_indices {
        let mut step = |f: &mut sdnv::Field, at: usize| {
            f.index = at;
            f.width = 0;
            let next = sdnv::read(buffer, f, &mut sf);
            f.width = next.saturating_sub(at);
            next
        };

        at = step(&mut bib.bf, 1);
        at = step(&mut bib.blklen, at);
        at = step(&mut bib.security_target_count, at);

        if at + 1 > buffer.len() {
            return raise(flags, Error::Parse("integrity block"));
        }
        bib.security_target_type = buffer[at];

        at = step(&mut bib.cipher_suite_id, at + 1);
        at = step(&mut bib.cipher_suite_flags, at);
        at = step(&mut bib.compound_length, at);

        if at + 1 > buffer.len() {
            return raise(flags, Error::Parse("integrity block"));
        }
        bib.security_result_type = buffer[at];

        at = step(&mut bib.security_result_length, at + 1);
    } else {
        sdnv::read(buffer, &mut bib.bf, &mut sf);
        sdnv::read(buffer, &mut bib.blklen, &mut sf);
        at = sdnv::read(buffer, &mut bib.security_target_count, &mut sf);

        if at + 1 > buffer.len() {
            return raise(flags, Error::Parse("integrity block"));
        }
        bib.security_target_type = buffer[at];

        sdnv::read(buffer, &mut bib.cipher_suite_id, &mut sf);
        sdnv::read(buffer, &mut bib.cipher_suite_flags, &mut sf);
        at = sdnv::read(buffer, &mut bib.compound_length, &mut sf);

        if at + 1 > buffer.len() {
            return raise(flags, Error::Parse("integrity block"));
        }
        bib.security_result_type = buffer[at];

        at = sdnv::read(buffer, &mut bib.security_result_length, &mut sf);
    }

    if sf.any() {
        flags.set(sf.into());
        return raise(flags, Error::Parse("integrity block"));
    }

    if bib.security_target_type != u8::from(BlockType::Payload) {
        return raise(
            flags,
            Error::InvalidBibTargetType(bib.security_target_type),
        );
    }
    if bib.security_result_type != INTEGRITY_SIGNATURE {
        return raise(
            flags,
            Error::InvalidBibResultType(bib.security_result_type),
        );
    }
    let suite = match CipherSuite::from_id(bib.cipher_suite_id.value) {
        Ok(suite) => suite,
        Err(e) => return raise(flags, e),
    };
    if bib.security_result_length.value as usize != suite.result_len() {
        return raise(flags, Error::Parse("integrity block"));
    }

    match read_result(buffer, at, suite.result_len()) {
        Some(crc) => bib.security_result = crc,
        None => return raise(flags, Error::Parse("integrity block")),
    }
    Ok(at + suite.result_len())
}

/// Serializes a BIB, returning the number of bytes written.  The security
/// result is whatever `bib.security_result` holds; [`update`] recomputes
/// it per payload fragment.
pub fn write(
    buffer: &mut [u8],
    bib: &mut IntegrityBlock,
    update_indices: bool,
    flags: &mut Flags,
) -> Result<usize, Error> {
    let mut sf = sdnv::Flags::default();

    if buffer.is_empty() {
        return raise(flags, Error::Parse("integrity block"));
    }
    if bib.security_target_type != u8::from(BlockType::Payload) {
        return raise(
            flags,
            Error::InvalidBibTargetType(bib.security_target_type),
        );
    }
    if bib.security_result_type != INTEGRITY_SIGNATURE {
        return raise(
            flags,
            Error::InvalidBibResultType(bib.security_result_type),
        );
    }
    let suite = match CipherSuite::from_id(bib.cipher_suite_id.value) {
        Ok(suite) => suite,
        Err(e) => return raise(flags, e),
    };

    bib.compound_length.value = suite.compound_len();
    bib.security_result_length.value = suite.result_len() as u64;
    bib.bf.value = u64::from(BlockFlags {
        replicate_in_fragments: true,
        ..BlockFlags::from(bib.bf.value)
    });

    buffer[0] = BlockType::PayloadIntegrity.into();

    fn step(buffer: &mut [u8], sf: &mut sdnv::Flags, f: &mut sdnv::Field, at: usize) -> usize {
        f.index = at;
        f.width = 0;
        let next = sdnv::write(buffer, *f, sf);
        f.width = next.saturating_sub(at);
        next
    }

    let mut at;
    if update_indices {
        at = step(buffer, &mut sf, &mut bib.bf, 1);
        at = step(buffer, &mut sf, &mut bib.blklen, at);
        at = step(buffer, &mut sf, &mut bib.security_target_count, at);

        if at + 1 > buffer.len() {
            return raise(flags, Error::Parse("integrity block"));
        }
        buffer[at] = bib.security_target_type;

        at = step(buffer, &mut sf, &mut bib.cipher_suite_id, at + 1);
        at = step(buffer, &mut sf, &mut bib.cipher_suite_flags, at);
        at = step(buffer, &mut sf, &mut bib.compound_length, at);

        if at + 1 > buffer.len() {
            return raise(flags, Error::Parse("integrity block"));
        }
        buffer[at] = bib.security_result_type;

        at = step(buffer, &mut sf, &mut bib.security_result_length, at + 1);
    } else {
        sdnv::write(buffer, bib.bf, &mut sf);
        at = sdnv::write(buffer, bib.security_target_count, &mut sf);

        if at + 1 > buffer.len() {
            return raise(flags, Error::Parse("integrity block"));
        }
        buffer[at] = bib.security_target_type;

        sdnv::write(buffer, bib.cipher_suite_id, &mut sf);
        sdnv::write(buffer, bib.cipher_suite_flags, &mut sf);
        at = sdnv::write(buffer, bib.compound_length, &mut sf);

        if at + 1 > buffer.len() {
            return raise(flags, Error::Parse("integrity block"));
        }
        buffer[at] = bib.security_result_type;

        at = sdnv::write(buffer, bib.security_result_length, &mut sf);
    }

    if at + suite.result_len() > buffer.len() {
        return raise(flags, Error::Parse("integrity block"));
    }
    write_result(buffer, at, suite, bib.security_result);
    let total = at + suite.result_len();

    // Jam the block length
    bib.blklen.value = (total - bib.security_target_count.index) as u64;
    sdnv::write(buffer, bib.blklen, &mut sf);

    if sf.any() {
        flags.set(sf.into());
        return raise(flags, Error::Parse("integrity block"));
    }
    Ok(total)
}

/// Recomputes the CRC over a payload fragment and rewrites the security
/// result in place at its pre-laid-out offset.
pub fn update(
    buffer: &mut [u8],
    payload: &[u8],
    bib: &mut IntegrityBlock,
    flags: &mut Flags,
) -> Result<(), Error> {
    let suite = match CipherSuite::from_id(bib.cipher_suite_id.value) {
        Ok(suite) => suite,
        Err(e) => return raise(flags, e),
    };

    let at = bib.security_result_length.index + bib.security_result_length.width;
    if at + suite.result_len() > buffer.len() {
        return raise(flags, Error::Parse("integrity block"));
    }

    bib.security_result = suite.digest(payload);
    write_result(buffer, at, suite, bib.security_result);
    Ok(())
}

/// Recomputes the CRC over a received payload and compares it with the
/// security result carried by the block.
pub fn verify(payload: &[u8], bib: &IntegrityBlock, flags: &mut Flags) -> Result<(), Error> {
    let suite = match CipherSuite::from_id(bib.cipher_suite_id.value) {
        Ok(suite) => suite,
        Err(e) => return raise(flags, e),
    };

    let actual = suite.digest(payload);
    if actual != bib.security_result {
        return raise(
            flags,
            Error::IntegrityCheck {
                expected: bib.security_result,
                actual,
            },
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(suite: CipherSuite) -> IntegrityBlock {
        let mut bib = TEMPLATE;
        bib.cipher_suite_id.value = suite.id();
        bib
    }

    #[test]
    fn write_update_read_verify() {
        for suite in [CipherSuite::CRC16_X25, CipherSuite::CRC32_CASTAGNOLI] {
            let mut buffer = [0u8; 32];
            let mut flags = Flags::default();
            let mut bib = template(suite);
            let len = write(&mut buffer, &mut bib, false, &mut flags).unwrap();
            assert_eq!(len, 13 + suite.result_len());

            update(&mut buffer, b"HELLO", &mut bib, &mut flags).unwrap();

            let mut out = IntegrityBlock::default();
            let parsed = read(&buffer[..len], &mut out, true, &mut flags).unwrap();
            assert_eq!(parsed, len);
            assert_eq!(out.security_result, suite.digest(b"HELLO"));
            verify(b"HELLO", &out, &mut flags).unwrap();
            assert!(flags.is_empty());
        }
    }

    #[test]
    fn verify_detects_corruption() {
        let mut buffer = [0u8; 32];
        let mut flags = Flags::default();
        let mut bib = template(CipherSuite::CRC32_CASTAGNOLI);
        write(&mut buffer, &mut bib, false, &mut flags).unwrap();
        update(&mut buffer, b"HELLO", &mut bib, &mut flags).unwrap();

        let err = verify(b"HELLP", &bib, &mut flags).unwrap_err();
        assert!(matches!(err, Error::IntegrityCheck { .. }));
        assert!(flags.contains(Flags::FAILED_INTEGRITY_CHECK));
    }

    #[test]
    fn rejects_unknown_suite() {
        let mut buffer = [0u8; 32];
        let mut flags = Flags::default();
        let mut bib = template(CipherSuite::CRC16_X25);
        let len = write(&mut buffer, &mut bib, false, &mut flags).unwrap();
        // overwrite the cipher suite id byte
        buffer[8] = 9;

        let mut out = IntegrityBlock::default();
        let err = read(&buffer[..len], &mut out, true, &mut flags).unwrap_err();
        assert!(matches!(err, Error::InvalidCipherSuite(9)));
        assert!(flags.contains(Flags::INVALID_CIPHER_SUITE));
    }

    #[test]
    fn rejects_wrong_target_type() {
        let mut buffer = [0u8; 32];
        let mut flags = Flags::default();
        let mut bib = template(CipherSuite::CRC16_X25);
        let len = write(&mut buffer, &mut bib, false, &mut flags).unwrap();
        // overwrite the security target type byte
        buffer[7] = 0x0A;

        let mut out = IntegrityBlock::default();
        let err = read(&buffer[..len], &mut out, true, &mut flags).unwrap_err();
        assert!(matches!(err, Error::InvalidBibTargetType(0x0A)));
        assert!(flags.contains(Flags::INVALID_BIB_TARGET_TYPE));
    }
}
