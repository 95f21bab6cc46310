use super::*;
use active_buffer::ActiveBundle;
use storage::{Sid, SID_VACANT};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("storage id is already mapped")]
    Duplicate,

    #[error("storage id map is full")]
    Full,

    #[error("no entry for that storage id")]
    NotFound,
}

/// Fixed-capacity robin-hood hash map from storage id to active bundle.
///
/// Supports O(1) lookup of an active bundle when the custody id is not
/// known, such as evicting tracking state for a bundle the storage layer
/// has expired.  Collisions resolve by displacement: an inserted entry
/// steals the slot of any resident closer to its home, bounding the
/// spread of probe distances; the maximum distance seen caps every
/// lookup.  Capacity is fixed at creation and keeping the load factor
/// at or below 0.75 is the caller's responsibility.
#[derive(Debug)]
pub struct SidMap {
    slots: Vec<Option<(usize, ActiveBundle)>>,
    count: usize,
    max_probe: usize,
}

impl SidMap {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "sid map must have at least one slot");
        Self {
            slots: vec![None; capacity],
            count: 0,
            max_probe: 0,
        }
    }

    fn home(&self, sid: Sid) -> usize {
        // Fibonacci scramble spreads consecutive storage ids
        (sid.wrapping_mul(0x9E37_79B9_7F4A_7C15) % self.slots.len() as u64) as usize
    }

    /// Inserts an entry keyed by `bundle.sid`.
    pub fn insert(&mut self, bundle: ActiveBundle) -> Result<(), Error> {
        if bundle.sid == SID_VACANT {
            return Err(Error::NotFound);
        }
        if self.count == self.slots.len() {
            return Err(Error::Full);
        }
        if self.get(bundle.sid).is_some() {
            return Err(Error::Duplicate);
        }

        let mut probe = 0;
        let mut entry = (self.home(bundle.sid), bundle);
        loop {
            let len = self.slots.len();
            let at = (entry.0 + probe) % len;
            match &mut self.slots[at] {
                slot @ None => {
                    self.max_probe = self.max_probe.max(probe);
                    *slot = Some(entry);
                    self.count += 1;
                    return Ok(());
                }
                Some(resident) => {
                    // rob the rich: displace a resident closer to home
                    let resident_probe = (at + len - resident.0) % len;
                    if resident_probe < probe {
                        self.max_probe = self.max_probe.max(probe);
                        std::mem::swap(resident, &mut entry);
                        probe = resident_probe;
                    }
                    probe += 1;
                }
            }
        }
    }

    pub fn get(&self, sid: Sid) -> Option<&ActiveBundle> {
        let home = self.home(sid);
        for probe in 0..=self.max_probe {
            let at = (home + probe) % self.slots.len();
            match &self.slots[at] {
                Some((_, bundle)) if bundle.sid == sid => return Some(bundle),
                _ => {}
            }
        }
        None
    }

    /// Removes and returns the entry for `sid`, back-shifting the
    /// displaced cluster behind it.
    pub fn remove(&mut self, sid: Sid) -> Result<ActiveBundle, Error> {
        let home = self.home(sid);
        let len = self.slots.len();

        let mut at = None;
        for probe in 0..=self.max_probe {
            let i = (home + probe) % len;
            if matches!(&self.slots[i], Some((_, bundle)) if bundle.sid == sid) {
                at = Some(i);
                break;
            }
        }
        let Some(mut at) = at else {
            return Err(Error::NotFound);
        };

        let (_, removed) = self.slots[at].take().unwrap();
        self.count -= 1;

        // back-shift until a vacancy or an entry already at home
        loop {
            let next = (at + 1) % len;
            match self.slots[next] {
                Some((home, _)) if home != next => {
                    self.slots[at] = self.slots[next].take();
                    at = next;
                }
                _ => break,
            }
        }
        Ok(removed)
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Longest probe sequence any lookup may need.
    pub fn max_probe(&self) -> usize {
        self.max_probe
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(sid: Sid) -> ActiveBundle {
        ActiveBundle {
            sid,
            retx: sid * 2,
            cid: sid * 3,
        }
    }

    #[test]
    fn insert_get_remove() {
        let mut map = SidMap::new(16);
        for sid in 1..=8 {
            map.insert(entry(sid)).unwrap();
        }
        assert_eq!(map.count(), 8);
        for sid in 1..=8 {
            assert_eq!(map.get(sid), Some(&entry(sid)));
        }
        assert_eq!(map.get(99), None);

        assert_eq!(map.remove(5).unwrap(), entry(5));
        assert_eq!(map.get(5), None);
        assert_eq!(map.remove(5), Err(Error::NotFound));
        assert_eq!(map.count(), 7);
        for sid in [1, 2, 3, 4, 6, 7, 8] {
            assert_eq!(map.get(sid), Some(&entry(sid)), "sid {sid} lost");
        }
    }

    #[test]
    fn duplicate_and_full() {
        let mut map = SidMap::new(4);
        for sid in 1..=4 {
            map.insert(entry(sid)).unwrap();
        }
        assert_eq!(map.insert(entry(1)), Err(Error::Duplicate));
        assert_eq!(map.insert(entry(9)), Err(Error::Full));
    }

    #[test]
    fn survives_collision_churn() {
        // a small table forces displacement chains
        let mut map = SidMap::new(8);
        for sid in 1..=6 {
            map.insert(entry(sid)).unwrap();
        }
        for sid in [2, 4, 6] {
            map.remove(sid).unwrap();
        }
        for sid in [10, 12, 14] {
            map.insert(entry(sid)).unwrap();
        }
        for sid in [1, 3, 5, 10, 12, 14] {
            assert_eq!(map.get(sid), Some(&entry(sid)), "sid {sid} lost");
        }
        assert!(map.max_probe() < 8);
    }
}
