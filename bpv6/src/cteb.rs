use super::*;
use block_flags::BlockFlags;
use block_type::BlockType;

/// A Custody Transfer Enhancement Block: the custody id under which the
/// current custodian holds the bundle, plus the custodian's endpoint.
#[derive(Debug, Default, Clone)]
pub struct CustodyBlock {
    pub bf: sdnv::Field,
    pub blklen: sdnv::Field,
    pub cid: sdnv::Field,
    pub custodian: Eid,
}

/// Frozen-width layout for originated custody blocks.  The custody id
/// width is fixed so the id can be stamped in place at transmit time.
pub(crate) const TEMPLATE: CustodyBlock = CustodyBlock {
    bf: sdnv::Field::new(1, 1),
    blklen: sdnv::Field::new(2, 1),
    cid: sdnv::Field::new(3, 4),
    custodian: Eid::NULL,
};

/// Parses a CTEB, returning the total size of the block.
pub fn read(
    buffer: &[u8],
    cteb: &mut CustodyBlock,
    update_indices: bool,
    flags: &mut Flags,
) -> Result<usize, Error> {
    let mut sf = sdnv::Flags::default();

    if buffer.is_empty() || buffer[0] != u8::from(BlockType::CustodyTransfer) {
        return raise(flags, Error::Parse("custody transfer block"));
    }

    let eid_start;
    if update_indices {
        cteb.bf = sdnv::Field::new(1, 0);
        let mut next = sdnv::read(buffer, &mut cteb.bf, &mut sf);
        cteb.bf.width = next.saturating_sub(cteb.bf.index);

        cteb.blklen = sdnv::Field::new(next, 0);
        next = sdnv::read(buffer, &mut cteb.blklen, &mut sf);
        cteb.blklen.width = next.saturating_sub(cteb.blklen.index);

        cteb.cid = sdnv::Field::new(next, 0);
        eid_start = sdnv::read(buffer, &mut cteb.cid, &mut sf);
        cteb.cid.width = eid_start.saturating_sub(cteb.cid.index);
    } else {
        sdnv::read(buffer, &mut cteb.bf, &mut sf);
        sdnv::read(buffer, &mut cteb.blklen, &mut sf);
        eid_start = sdnv::read(buffer, &mut cteb.cid, &mut sf);
    }

    if sf.any() {
        flags.set(sf.into());
        return raise(flags, Error::Parse("custody transfer block"));
    }

    // The custodian EID string occupies the rest of the block
    let blklen_end = cteb.blklen.index + cteb.blklen.width;
    let total = blklen_end + cteb.blklen.value as usize;
    if total < eid_start || total > buffer.len() {
        return raise(flags, Error::Parse("custody transfer block"));
    }
    let Ok(eid) = std::str::from_utf8(&buffer[eid_start..total]) else {
        return raise(flags, Error::Parse("custodian EID"));
    };
    match eid.parse() {
        Ok(custodian) => cteb.custodian = custodian,
        Err(e) => return raise(flags, Error::InvalidEid(e)),
    }

    Ok(total)
}

/// Serializes a CTEB, returning the number of bytes written.
pub fn write(
    buffer: &mut [u8],
    cteb: &mut CustodyBlock,
    update_indices: bool,
    flags: &mut Flags,
) -> Result<usize, Error> {
    let mut sf = sdnv::Flags::default();

    if buffer.is_empty() {
        return raise(flags, Error::Parse("custody transfer block"));
    }
    buffer[0] = BlockType::CustodyTransfer.into();

    cteb.bf.value = u64::from(BlockFlags {
        replicate_in_fragments: true,
        ..BlockFlags::from(cteb.bf.value)
    });

    let eid_start;
    if update_indices {
        cteb.bf.index = 1;
        cteb.bf.width = 0;
        let mut next = sdnv::write(buffer, cteb.bf, &mut sf);
        cteb.bf.width = next.saturating_sub(cteb.bf.index);

        cteb.blklen.index = next;
        cteb.blklen.width = 0;
        next = sdnv::write(buffer, cteb.blklen, &mut sf);
        cteb.blklen.width = next.saturating_sub(cteb.blklen.index);

        cteb.cid.index = next;
        cteb.cid.width = 0;
        eid_start = sdnv::write(buffer, cteb.cid, &mut sf);
        cteb.cid.width = eid_start.saturating_sub(cteb.cid.index);
    } else {
        sdnv::write(buffer, cteb.bf, &mut sf);
        sdnv::write(buffer, cteb.blklen, &mut sf);
        eid_start = sdnv::write(buffer, cteb.cid, &mut sf);
    }

    let eid = cteb.custodian.to_string();
    let total = eid_start + eid.len();
    if total > buffer.len() {
        return raise(flags, Error::Parse("custody transfer block"));
    }
    buffer[eid_start..total].copy_from_slice(eid.as_bytes());

    // Jam the block length
    cteb.blklen.value = (total - (cteb.blklen.index + cteb.blklen.width)) as u64;
    sdnv::write(buffer, cteb.blklen, &mut sf);

    if sf.any() {
        flags.set(sf.into());
        return raise(flags, Error::Parse("custody transfer block"));
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_read_round_trip() {
        let mut buffer = [0u8; 64];
        let mut flags = Flags::default();
        let mut cteb = TEMPLATE;
        cteb.cid.value = 42;
        cteb.custodian = Eid::new(10, 1);
        let len = write(&mut buffer, &mut cteb, false, &mut flags).unwrap();
        // type + bf + blklen + frozen cid + "ipn:10.1"
        assert_eq!(len, 7 + 8);

        let mut out = CustodyBlock::default();
        let parsed = read(&buffer[..len], &mut out, true, &mut flags).unwrap();
        assert_eq!(parsed, len);
        assert_eq!(out.cid.value, 42);
        assert_eq!(out.custodian, Eid::new(10, 1));
        assert!(BlockFlags::from(out.bf.value).replicate_in_fragments);
        assert!(flags.is_empty());
    }

    #[test]
    fn custody_id_stamps_in_place() {
        let mut buffer = [0u8; 64];
        let mut flags = Flags::default();
        let mut cteb = TEMPLATE;
        cteb.custodian = Eid::new(10, 1);
        let len = write(&mut buffer, &mut cteb, false, &mut flags).unwrap();

        // rewrite the frozen-width custody id without re-encoding the block
        let mut cid = cteb.cid;
        cid.value = 999;
        let mut sf = sdnv::Flags::default();
        sdnv::write(&mut buffer, cid, &mut sf);
        assert!(!sf.any());

        let mut out = CustodyBlock::default();
        let parsed = read(&buffer[..len], &mut out, true, &mut flags).unwrap();
        assert_eq!(parsed, len);
        assert_eq!(out.cid.value, 999);
        assert_eq!(out.custodian, Eid::new(10, 1));
    }

    #[test]
    fn bad_custodian_fails() {
        let mut buffer = [0u8; 64];
        let mut flags = Flags::default();
        let mut cteb = TEMPLATE;
        cteb.custodian = Eid::new(10, 1);
        let len = write(&mut buffer, &mut cteb, false, &mut flags).unwrap();
        // corrupt the EID string
        buffer[len - 1] = b'x';

        let mut out = CustodyBlock::default();
        assert!(read(&buffer[..len], &mut out, true, &mut flags).is_err());
        assert!(flags.contains(Flags::FAILED_TO_PARSE));
    }

    #[test]
    fn wrong_type_fails() {
        let mut flags = Flags::default();
        let mut out = CustodyBlock::default();
        assert!(read(&[0x01, 0x00], &mut out, true, &mut flags).is_err());
    }
}
