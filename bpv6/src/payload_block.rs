use super::*;
use block_flags::BlockFlags;
use block_type::BlockType;

/// The payload block header.  The payload bytes themselves are never
/// owned here: reading returns a borrowed view into the source buffer, and
/// writing only lays out the header (the caller appends the bytes).
#[derive(Debug, Default, Copy, Clone)]
pub struct PayloadBlock {
    pub bf: sdnv::Field,
    pub blklen: sdnv::Field,
    pub paysize: u64,
}

/// Frozen-width layout for originated payload blocks.  The block length
/// width is fixed so each fragment's length can be rewritten without
/// moving the payload offset.
pub(crate) const TEMPLATE: PayloadBlock = PayloadBlock {
    bf: sdnv::Field::new(1, 1),
    blklen: sdnv::Field::new(2, 4),
    paysize: 0,
};

/// Parses a payload block header, returning the header size and a
/// borrowed view of the payload bytes.
///
/// The view borrows from `buffer`; the caller must keep the source buffer
/// alive until the payload has been consumed or copied.
pub fn read<'a>(
    buffer: &'a [u8],
    pay: &mut PayloadBlock,
    update_indices: bool,
    flags: &mut Flags,
) -> Result<(usize, &'a [u8]), Error> {
    let mut sf = sdnv::Flags::default();

    if buffer.is_empty() || buffer[0] != u8::from(BlockType::Payload) {
        return raise(flags, Error::Parse("payload block"));
    }

    let header_len;
    if update_indices {
        pay.bf = sdnv::Field::new(1, 0);
        let next = sdnv::read(buffer, &mut pay.bf, &mut sf);
        pay.bf.width = next.saturating_sub(pay.bf.index);

        pay.blklen = sdnv::Field::new(next, 0);
        header_len = sdnv::read(buffer, &mut pay.blklen, &mut sf);
        pay.blklen.width = header_len.saturating_sub(pay.blklen.index);
    } else {
        sdnv::read(buffer, &mut pay.bf, &mut sf);
        header_len = sdnv::read(buffer, &mut pay.blklen, &mut sf);
    }

    if sf.any() {
        flags.set(sf.into());
        return raise(flags, Error::Parse("payload block"));
    }

    pay.paysize = pay.blklen.value;
    let end = header_len + pay.paysize as usize;
    if end > buffer.len() {
        return raise(flags, Error::Parse("payload block"));
    }
    Ok((header_len, &buffer[header_len..end]))
}

/// Serializes a payload block header for `pay.paysize` bytes of payload,
/// returning the header size.
pub fn write(
    buffer: &mut [u8],
    pay: &mut PayloadBlock,
    update_indices: bool,
    flags: &mut Flags,
) -> Result<usize, Error> {
    let mut sf = sdnv::Flags::default();

    if buffer.is_empty() {
        return raise(flags, Error::Parse("payload block"));
    }
    buffer[0] = BlockType::Payload.into();

    pay.bf.value = u64::from(BlockFlags {
        last_block: true,
        ..BlockFlags::from(pay.bf.value)
    });
    pay.blklen.value = pay.paysize;

    let header_len;
    if update_indices {
        pay.bf.index = 1;
        pay.bf.width = 0;
        let next = sdnv::write(buffer, pay.bf, &mut sf);
        pay.bf.width = next.saturating_sub(pay.bf.index);

        pay.blklen.index = next;
        pay.blklen.width = 0;
        header_len = sdnv::write(buffer, pay.blklen, &mut sf);
        pay.blklen.width = header_len.saturating_sub(pay.blklen.index);
    } else {
        sdnv::write(buffer, pay.bf, &mut sf);
        header_len = sdnv::write(buffer, pay.blklen, &mut sf);
    }

    if sf.any() {
        flags.set(sf.into());
        return raise(flags, Error::Parse("payload block"));
    }
    Ok(header_len)
}
