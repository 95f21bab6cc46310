use super::*;
use pcf::{CosClass, ProcessingFlags};

/// Bundle protocol version carried in the first byte of every bundle.
pub const VERSION: u8 = 6;

/// A BPv6 primary block: decoded field values together with the offset and
/// width of every SDNV, so individual fields can be rewritten in place
/// after the block has been laid out.
#[derive(Debug, Default, Copy, Clone)]
pub struct PrimaryBlock {
    pub version: u8,
    pub flags: ProcessingFlags,
    pub pcf: sdnv::Field,
    pub blklen: sdnv::Field,
    pub dstnode: sdnv::Field,
    pub dstserv: sdnv::Field,
    pub srcnode: sdnv::Field,
    pub srcserv: sdnv::Field,
    pub rptnode: sdnv::Field,
    pub rptserv: sdnv::Field,
    pub cstnode: sdnv::Field,
    pub cstserv: sdnv::Field,
    pub createsec: sdnv::Field,
    pub createseq: sdnv::Field,
    pub lifetime: sdnv::Field,
    pub dictlen: sdnv::Field,
    pub fragoffset: sdnv::Field,
    pub paylen: sdnv::Field,
}

/// Frozen-width layout used for originated bundles.
///
/// Widths are fixed so send-time edits (creation timestamp, sequence,
/// fragment offset, total payload length, the fragmentation bit in the
/// pcf) never shift downstream block offsets.  The fragment fields are
/// always reserved, which is what allows fragmentation to be decided per
/// payload rather than per channel.
pub(crate) const TEMPLATE: PrimaryBlock = PrimaryBlock {
    version: VERSION,
    flags: ProcessingFlags {
        is_fragment: false,
        is_admin_record: false,
        allow_fragmentation: false,
        custody_requested: true,
        app_ack_requested: false,
        class_of_service: CosClass::Normal,
        unrecognised: 0,
    },
    pcf: sdnv::Field::new(1, 3),
    blklen: sdnv::Field::new(4, 1),
    dstnode: sdnv::Field::new(5, 4),
    dstserv: sdnv::Field::new(9, 2),
    srcnode: sdnv::Field::new(11, 4),
    srcserv: sdnv::Field::new(15, 2),
    rptnode: sdnv::Field::new(17, 4),
    rptserv: sdnv::Field::new(21, 2),
    cstnode: sdnv::Field::new(23, 4),
    cstserv: sdnv::Field::new(27, 2),
    createsec: sdnv::Field::new(29, 6),
    createseq: sdnv::Field::new(35, 2),
    lifetime: sdnv::Field::new(37, 6),
    dictlen: sdnv::Field::new(43, 1),
    fragoffset: sdnv::Field::new(44, 4),
    paylen: sdnv::Field::new(48, 4),
};

/// Parses a primary block, returning the total size of the block.
///
/// With `update_indices` the layout is recomputed as the buffer is walked
/// and the observed width of each field is recorded, freezing it for later
/// in-place rewrites.  Otherwise the indices and widths already in `pri`
/// are authoritative.  The block length field delimits the block, so
/// fields this parser does not consume (reserved fragment fields) are
/// skipped.
pub fn read(
    buffer: &[u8],
    pri: &mut PrimaryBlock,
    update_indices: bool,
    flags: &mut Flags,
) -> Result<usize, Error> {
    let mut sf = sdnv::Flags::default();

    if buffer.is_empty() {
        return raise(flags, Error::Parse("primary block"));
    }
    pri.version = buffer[0];
    if pri.version != VERSION {
        return raise(flags, Error::Noncompliant("unsupported bundle protocol version"));
    }

    if update_indices {
        let mut step = |f: &mut sdnv::Field, at: usize| {
            *f = sdnv::Field::new(at, 0);
            let next = sdnv::read(buffer, f, &mut sf);
            f.width = next.saturating_sub(at);
            next
        };

        let mut at = step(&mut pri.pcf, 1);
        at = step(&mut pri.blklen, at);
        at = step(&mut pri.dstnode, at);
        at = step(&mut pri.dstserv, at);
        at = step(&mut pri.srcnode, at);
        at = step(&mut pri.srcserv, at);
        at = step(&mut pri.rptnode, at);
        at = step(&mut pri.rptserv, at);
        at = step(&mut pri.cstnode, at);
        at = step(&mut pri.cstserv, at);
        at = step(&mut pri.createsec, at);
        at = step(&mut pri.createseq, at);
        at = step(&mut pri.lifetime, at);
        at = step(&mut pri.dictlen, at);

        if ProcessingFlags::from(pri.pcf.value).is_fragment {
            at = step(&mut pri.fragoffset, at);
            step(&mut pri.paylen, at);
        } else {
            pri.fragoffset = sdnv::Field::default();
            pri.paylen = sdnv::Field::default();
        }
    } else {
        sdnv::read(buffer, &mut pri.pcf, &mut sf);
        sdnv::read(buffer, &mut pri.blklen, &mut sf);
        sdnv::read(buffer, &mut pri.dstnode, &mut sf);
        sdnv::read(buffer, &mut pri.dstserv, &mut sf);
        sdnv::read(buffer, &mut pri.srcnode, &mut sf);
        sdnv::read(buffer, &mut pri.srcserv, &mut sf);
        sdnv::read(buffer, &mut pri.rptnode, &mut sf);
        sdnv::read(buffer, &mut pri.rptserv, &mut sf);
        sdnv::read(buffer, &mut pri.cstnode, &mut sf);
        sdnv::read(buffer, &mut pri.cstserv, &mut sf);
        sdnv::read(buffer, &mut pri.createsec, &mut sf);
        sdnv::read(buffer, &mut pri.createseq, &mut sf);
        sdnv::read(buffer, &mut pri.lifetime, &mut sf);
        sdnv::read(buffer, &mut pri.dictlen, &mut sf);

        if ProcessingFlags::from(pri.pcf.value).is_fragment {
            sdnv::read(buffer, &mut pri.fragoffset, &mut sf);
            sdnv::read(buffer, &mut pri.paylen, &mut sf);
        }
    }
    pri.flags = ProcessingFlags::from(pri.pcf.value);

    if sf.any() {
        flags.set(sf.into());
        return raise(flags, Error::Parse("primary block"));
    }

    if pri.dictlen.value != 0 {
        return raise(flags, Error::Noncompliant("eid dictionaries are not supported"));
    }

    let total = pri.blklen.index + pri.blklen.width + pri.blklen.value as usize;
    if total > buffer.len() {
        return raise(flags, Error::Parse("primary block"));
    }
    Ok(total)
}

/// Serializes a primary block, returning the number of bytes written.
///
/// The block length is back-patched once the end of the block is known.
/// The fragment fields are written whenever the layout reserves room for
/// them, so a non-fragmented header can still be turned into a fragmented
/// one in place.
pub fn write(
    buffer: &mut [u8],
    pri: &mut PrimaryBlock,
    update_indices: bool,
    flags: &mut Flags,
) -> Result<usize, Error> {
    let mut sf = sdnv::Flags::default();

    if buffer.is_empty() {
        return raise(flags, Error::Parse("primary block"));
    }
    buffer[0] = VERSION;
    pri.version = VERSION;
    pri.pcf.value = u64::from(pri.flags);

    let end;
    if update_indices {
        let mut step = |f: &mut sdnv::Field, at: usize| {
            f.index = at;
            f.width = 0;
            let next = sdnv::write(buffer, *f, &mut sf);
            f.width = next.saturating_sub(at);
            next
        };

        let mut at = step(&mut pri.pcf, 1);
        at = step(&mut pri.blklen, at);
        at = step(&mut pri.dstnode, at);
        at = step(&mut pri.dstserv, at);
        at = step(&mut pri.srcnode, at);
        at = step(&mut pri.srcserv, at);
        at = step(&mut pri.rptnode, at);
        at = step(&mut pri.rptserv, at);
        at = step(&mut pri.cstnode, at);
        at = step(&mut pri.cstserv, at);
        at = step(&mut pri.createsec, at);
        at = step(&mut pri.createseq, at);
        at = step(&mut pri.lifetime, at);
        at = step(&mut pri.dictlen, at);

        if pri.flags.is_fragment || pri.flags.allow_fragmentation {
            at = step(&mut pri.fragoffset, at);
            at = step(&mut pri.paylen, at);
        }
        end = at;
    } else {
        sdnv::write(buffer, pri.pcf, &mut sf);
        sdnv::write(buffer, pri.dstnode, &mut sf);
        sdnv::write(buffer, pri.dstserv, &mut sf);
        sdnv::write(buffer, pri.srcnode, &mut sf);
        sdnv::write(buffer, pri.srcserv, &mut sf);
        sdnv::write(buffer, pri.rptnode, &mut sf);
        sdnv::write(buffer, pri.rptserv, &mut sf);
        sdnv::write(buffer, pri.cstnode, &mut sf);
        sdnv::write(buffer, pri.cstserv, &mut sf);
        sdnv::write(buffer, pri.createsec, &mut sf);
        sdnv::write(buffer, pri.createseq, &mut sf);
        sdnv::write(buffer, pri.lifetime, &mut sf);
        let mut at = sdnv::write(buffer, pri.dictlen, &mut sf);

        if pri.fragoffset.index != 0 {
            sdnv::write(buffer, pri.fragoffset, &mut sf);
            at = sdnv::write(buffer, pri.paylen, &mut sf);
        }
        end = at;
    }

    // Jam the block length now that the end of the block is known
    pri.blklen.value = (end - (pri.blklen.index + pri.blklen.width)) as u64;
    sdnv::write(buffer, pri.blklen, &mut sf);

    if sf.any() {
        flags.set(sf.into());
        return raise(flags, Error::Parse("primary block"));
    }
    Ok(end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> PrimaryBlock {
        let mut pri = TEMPLATE;
        pri.dstnode.value = 20;
        pri.dstserv.value = 2;
        pri.srcnode.value = 10;
        pri.srcserv.value = 1;
        pri.cstnode.value = 10;
        pri.cstserv.value = 1;
        pri.createsec.value = 100;
        pri.createseq.value = 7;
        pri.lifetime.value = 3600;
        pri
    }

    #[test]
    fn template_layout_is_stable() {
        let mut buffer = [0u8; 128];
        let mut flags = Flags::default();
        let mut pri = template();
        let len = write(&mut buffer, &mut pri, false, &mut flags).unwrap();
        // the frozen template always reserves the fragment fields
        assert_eq!(len, 52);
        assert_eq!(pri.blklen.value, 47);
        assert!(flags.is_empty());
    }

    #[test]
    fn write_read_round_trip() {
        let mut buffer = [0u8; 128];
        let mut flags = Flags::default();
        let mut pri = template();
        let len = write(&mut buffer, &mut pri, false, &mut flags).unwrap();

        let mut out = PrimaryBlock::default();
        let parsed = read(&buffer[..len], &mut out, true, &mut flags).unwrap();
        assert_eq!(parsed, len);
        assert_eq!(out.version, VERSION);
        assert_eq!(out.dstnode.value, 20);
        assert_eq!(out.dstserv.value, 2);
        assert_eq!(out.srcnode.value, 10);
        assert_eq!(out.srcserv.value, 1);
        assert_eq!(out.createsec.value, 100);
        assert_eq!(out.createseq.value, 7);
        assert_eq!(out.lifetime.value, 3600);
        assert_eq!(out.dictlen.value, 0);
        assert!(out.flags.custody_requested);
        assert!(!out.flags.is_fragment);
        assert!(flags.is_empty());
    }

    #[test]
    fn fragment_fields_round_trip() {
        let mut buffer = [0u8; 128];
        let mut flags = Flags::default();
        let mut pri = template();
        pri.flags.is_fragment = true;
        pri.fragoffset.value = 3;
        pri.paylen.value = 7;
        let len = write(&mut buffer, &mut pri, false, &mut flags).unwrap();

        let mut out = PrimaryBlock::default();
        read(&buffer[..len], &mut out, true, &mut flags).unwrap();
        assert!(out.flags.is_fragment);
        assert_eq!(out.fragoffset.value, 3);
        assert_eq!(out.paylen.value, 7);
    }

    #[test]
    fn in_place_rewrite_keeps_layout() {
        let mut buffer = [0u8; 128];
        let mut flags = Flags::default();
        let mut pri = template();
        let len = write(&mut buffer, &mut pri, false, &mut flags).unwrap();

        // stamp a new creation timestamp through the frozen-width field
        pri.createsec.value = 12345;
        let mut sf = sdnv::Flags::default();
        sdnv::write(&mut buffer, pri.createsec, &mut sf);
        assert!(!sf.any());

        let mut out = PrimaryBlock::default();
        let parsed = read(&buffer[..len], &mut out, true, &mut flags).unwrap();
        assert_eq!(parsed, len);
        assert_eq!(out.createsec.value, 12345);
        assert_eq!(out.createseq.value, 7);
    }

    #[test]
    fn rejects_wrong_version() {
        let mut buffer = [0u8; 128];
        let mut flags = Flags::default();
        let mut pri = template();
        let len = write(&mut buffer, &mut pri, false, &mut flags).unwrap();
        buffer[0] = 7;

        let mut out = PrimaryBlock::default();
        let err = read(&buffer[..len], &mut out, true, &mut flags).unwrap_err();
        assert!(matches!(err, Error::Noncompliant(_)));
        assert!(flags.contains(Flags::NONCOMPLIANT));
    }

    #[test]
    fn rejects_dictionary() {
        let mut buffer = [0u8; 128];
        let mut flags = Flags::default();
        let mut pri = template();
        pri.dictlen.value = 4;
        let len = write(&mut buffer, &mut pri, false, &mut flags).unwrap();

        let mut out = PrimaryBlock::default();
        let err = read(&buffer[..len], &mut out, true, &mut flags).unwrap_err();
        assert!(matches!(err, Error::Noncompliant(_)));
    }

    #[test]
    fn truncated_block_fails() {
        let mut buffer = [0u8; 128];
        let mut flags = Flags::default();
        let mut pri = template();
        let len = write(&mut buffer, &mut pri, false, &mut flags).unwrap();

        let mut out = PrimaryBlock::default();
        let err = read(&buffer[..len - 10], &mut out, true, &mut flags).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
        assert!(flags.contains(Flags::FAILED_TO_PARSE));
    }
}
