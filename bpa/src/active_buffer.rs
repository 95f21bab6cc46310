use super::*;
use storage::{Sid, SID_VACANT};
use thiserror::Error;

/// A bundle awaiting custody acknowledgement.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct ActiveBundle {
    /// Where the serialized bundle lives; [`SID_VACANT`] marks an empty slot.
    pub sid: Sid,
    /// Absolute time at which the bundle becomes eligible for retransmit.
    pub retx: u64,
    /// Custody id assigned at transmit time.
    pub cid: u64,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("custody id is already active")]
    Duplicate,

    #[error("no active bundle holds that custody id")]
    NotFound,

    #[error("no active bundles pending")]
    Timeout,
}

/// Fixed-size circular buffer of active bundles indexed by custody id.
///
/// Slot `cid % size` holds the bundle with that custody id, giving O(1)
/// add, remove, and lookup while bounding memory.  Callers must size the
/// buffer to at least the worst-case outstanding custody window; a
/// collision between live custody ids replaces the older entry.
#[derive(Debug)]
pub struct ActiveBuffer {
    table: Vec<ActiveBundle>,
    num_entries: usize,
    oldest_cid: u64,
    newest_cid: u64,
}

impl ActiveBuffer {
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "active buffer must have at least one slot");
        Self {
            table: vec![ActiveBundle::default(); size],
            num_entries: 0,
            oldest_cid: 0,
            newest_cid: 0,
        }
    }

    /// Stores an active bundle in its custody-id slot.
    ///
    /// Without `overwrite`, re-adding a custody id that already occupies
    /// its slot reports a duplicate, and a successful add advances the
    /// newest-cid watermark.  With `overwrite` the slot is replaced in
    /// place (used to restamp retransmit times).
    pub fn add(&mut self, bundle: ActiveBundle, overwrite: bool) -> Result<(), Error> {
        let ati = (bundle.cid % self.table.len() as u64) as usize;
        let slot = &mut self.table[ati];
        if !overwrite && slot.sid != SID_VACANT && slot.cid == bundle.cid {
            return Err(Error::Duplicate);
        }

        // occupancy only grows when a vacant slot fills
        if slot.sid == SID_VACANT {
            self.num_entries += 1;
        }
        *slot = bundle;
        if !overwrite {
            self.newest_cid = bundle.cid + 1;
        }
        Ok(())
    }

    /// The oldest occupied slot, skipping past vacated custody ids.
    pub fn next(&mut self) -> Result<ActiveBundle, Error> {
        while self.oldest_cid != self.newest_cid {
            let ati = (self.oldest_cid % self.table.len() as u64) as usize;
            if self.table[ati].sid == SID_VACANT {
                self.oldest_cid += 1;
            } else {
                return Ok(self.table[ati]);
            }
        }
        Err(Error::Timeout)
    }

    /// Clears the slot for `cid` iff it currently holds that custody id.
    pub fn remove(&mut self, cid: u64) -> Result<ActiveBundle, Error> {
        let ati = (cid % self.table.len() as u64) as usize;
        let slot = &mut self.table[ati];
        if slot.sid != SID_VACANT && slot.cid == cid {
            let bundle = *slot;
            slot.sid = SID_VACANT;
            self.num_entries -= 1;
            return Ok(bundle);
        }
        Err(Error::NotFound)
    }

    /// True when the slot for `cid` is vacant.
    pub fn available(&self, cid: u64) -> bool {
        self.table[(cid % self.table.len() as u64) as usize].sid == SID_VACANT
    }

    pub fn count(&self) -> usize {
        self.num_entries
    }

    pub fn oldest_cid(&self) -> u64 {
        self.oldest_cid
    }

    pub fn newest_cid(&self) -> u64 {
        self.newest_cid
    }

    #[cfg(test)]
    fn occupied(&self) -> usize {
        self.table.iter().filter(|slot| slot.sid != SID_VACANT).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active(cid: u64) -> ActiveBundle {
        ActiveBundle {
            sid: cid + 100,
            retx: 0,
            cid,
        }
    }

    #[test]
    fn duplicate_add_is_rejected() {
        let mut buffer = ActiveBuffer::new(16);
        buffer.add(active(7), false).unwrap();
        assert_eq!(buffer.add(active(7), false), Err(Error::Duplicate));
        // the occupancy count moved exactly once
        assert_eq!(buffer.count(), 1);
        assert_eq!(buffer.count(), buffer.occupied());
    }

    #[test]
    fn overwrite_replaces_in_place() {
        let mut buffer = ActiveBuffer::new(16);
        buffer.add(active(7), false).unwrap();

        let mut updated = active(7);
        updated.retx = 99;
        buffer.add(updated, true).unwrap();
        assert_eq!(buffer.count(), 1);
        assert_eq!(buffer.next().unwrap().retx, 99);
    }

    #[test]
    fn next_skips_vacated_slots() {
        let mut buffer = ActiveBuffer::new(16);
        for cid in 0..5 {
            buffer.add(active(cid), false).unwrap();
        }
        buffer.remove(0).unwrap();
        buffer.remove(1).unwrap();
        assert_eq!(buffer.next().unwrap().cid, 2);
        assert_eq!(buffer.oldest_cid(), 2);

        for cid in 2..5 {
            buffer.remove(cid).unwrap();
        }
        assert_eq!(buffer.next(), Err(Error::Timeout));
        assert_eq!(buffer.count(), 0);
    }

    #[test]
    fn remove_checks_occupancy() {
        let mut buffer = ActiveBuffer::new(16);
        buffer.add(active(3), false).unwrap();
        assert_eq!(buffer.remove(4), Err(Error::NotFound));
        // same slot, different custody id
        assert_eq!(buffer.remove(19), Err(Error::NotFound));
        assert_eq!(buffer.remove(3).unwrap().sid, 103);
        assert_eq!(buffer.remove(3), Err(Error::NotFound));
    }

    #[test]
    fn occupancy_invariant_holds_under_churn() {
        let mut buffer = ActiveBuffer::new(8);
        for cid in 0..32 {
            let _ = buffer.add(active(cid), false);
            if cid % 3 == 0 {
                let _ = buffer.remove(cid);
            }
            assert_eq!(buffer.count(), buffer.occupied());
            assert!(buffer.oldest_cid() <= buffer.newest_cid());
        }
    }

    #[test]
    fn available_tracks_slot_state() {
        let mut buffer = ActiveBuffer::new(8);
        assert!(buffer.available(5));
        buffer.add(active(5), false).unwrap();
        assert!(!buffer.available(5));
        // a colliding custody id maps to the same slot
        assert!(!buffer.available(13));
    }
}
