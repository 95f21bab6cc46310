use super::*;

/// Administrative record types, carried in the high nibble of the first
/// payload byte (the low nibble holds record flags).
pub const STATUS_REC_TYPE: u8 = 0x10;
pub const CS_REC_TYPE: u8 = 0x20;
pub const ACS_REC_TYPE: u8 = 0x40;

/// Aggregate custody signal status: custody transfer succeeded.
const ACS_ACK_MASK: u8 = 0x80;

/// Source of acknowledged custody-id ranges drained while encoding a
/// signal.  Ranges must come back in ascending order, disjoint and
/// maximally coalesced.
pub trait RangeSource {
    /// The lowest pending range, if any.
    fn first(&self) -> Option<(u64, u64)>;
    /// Drops the range last returned by [`first`](RangeSource::first).
    fn pop_first(&mut self);
}

/// Encodes an aggregate custody signal record from `ranges` into `rec`,
/// returning the record size.
///
/// The fill sequence is SDNV pairs: the first fill's left edge is
/// absolute, each later left edge is the gap from the previous fill's
/// right edge, and every fill carries its length.  Encoding stops once
/// `max_fills` SDNV values have been written or the buffer is full; any
/// unconsumed ranges stay behind for the next record.
pub fn write(
    rec: &mut [u8],
    max_fills: usize,
    ranges: &mut dyn RangeSource,
    flags: &mut Flags,
) -> Result<usize, Error> {
    if rec.len() < 2 {
        return raise(flags, Error::Api("custody signal record buffer too small"));
    }
    rec[0] = ACS_REC_TYPE;
    rec[1] = ACS_ACK_MASK;

    let mut index = 2;
    let mut fills = 0;
    let mut prev_end: Option<u64> = None;

    while let Some((lo, hi)) = ranges.first() {
        let edge = match prev_end {
            None => lo,
            Some(end) => lo - end,
        };
        let length = hi - lo + 1;

        if fills + 2 > max_fills
            || index + sdnv::width_of(edge) + sdnv::width_of(length) > rec.len()
        {
            tracing::debug!("custody signal truncated, remainder left pending");
            break;
        }

        let mut sf = sdnv::Flags::default();
        index = sdnv::write(rec, sdnv::Field::with_value(edge, index, 0), &mut sf);
        index = sdnv::write(rec, sdnv::Field::with_value(length, index, 0), &mut sf);
        if sf.any() {
            flags.set(sf.into());
            return raise(flags, Error::Parse("custody signal fill"));
        }

        fills += 2;
        prev_end = Some(hi);
        ranges.pop_first();
    }

    Ok(index)
}

/// Decodes an aggregate custody signal record, invoking `remove` once per
/// acknowledged custody id in ascending order.  Returns the number of
/// acknowledgements.
pub fn read(
    rec: &[u8],
    remove: &mut dyn FnMut(u64, &mut Flags),
    flags: &mut Flags,
) -> Result<usize, Error> {
    if rec.len() < 2 {
        return raise(flags, Error::Parse("custody signal record"));
    }
    if rec[0] != ACS_REC_TYPE {
        return raise(flags, Error::UnknownRecord(rec[0]));
    }

    let mut num_acks = 0;
    let mut index = 2;
    let mut prev_end = 0u64;
    let mut first = true;

    while index < rec.len() {
        let mut sf = sdnv::Flags::default();
        let mut edge = sdnv::Field::new(index, 0);
        index = sdnv::read(rec, &mut edge, &mut sf);
        let mut length = sdnv::Field::new(index, 0);
        index = sdnv::read(rec, &mut length, &mut sf);
        if sf.any() || length.value == 0 {
            flags.set(sf.into());
            return raise(flags, Error::Parse("custody signal fill"));
        }

        let start = if first {
            Some(edge.value)
        } else {
            prev_end.checked_add(edge.value)
        };
        let end = start.and_then(|start| start.checked_add(length.value));
        let (Some(start), Some(end)) = (start, end) else {
            return raise(flags, Error::Parse("custody signal fill"));
        };
        for cid in start..end {
            remove(cid, flags);
            num_acks += 1;
        }
        prev_end = end - 1;
        first = false;
    }

    Ok(num_acks)
}
