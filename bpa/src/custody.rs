use super::*;
use active_buffer::{ActiveBuffer, ActiveBundle};
use bpv6::Eid;
use range_tree::RangeTree;
use sid_map::SidMap;
use storage::Sid;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("custody window is full")]
    WindowFull,

    #[error(transparent)]
    Active(#[from] active_buffer::Error),

    #[error(transparent)]
    Ranges(#[from] range_tree::Error),

    #[error(transparent)]
    Map(#[from] sid_map::Error),
}

/// Sender-side custody state: which transmitted bundles still await an
/// aggregate custody signal, indexed both by custody id (the circular
/// buffer) and by storage id (the hash map, for paths where the custody
/// id is not known).
#[derive(Debug)]
pub struct CustodyTracker {
    active: ActiveBuffer,
    by_sid: SidMap,
    next_cid: u64,
}

impl CustodyTracker {
    pub fn new(window: usize) -> Self {
        Self {
            active: ActiveBuffer::new(window),
            // twice the window keeps the load factor comfortably low
            by_sid: SidMap::new(window * 2),
            next_cid: 0,
        }
    }

    /// Assigns the next custody id to a stored bundle and starts tracking
    /// it.  Fails when the custody window has wrapped onto an entry that
    /// is still awaiting acknowledgement.
    pub fn track(&mut self, sid: Sid, retx: u64) -> Result<u64, Error> {
        let cid = self.next_cid;
        if !self.active.available(cid) {
            return Err(Error::WindowFull);
        }
        let bundle = ActiveBundle { sid, retx, cid };
        self.active.add(bundle, false)?;
        self.by_sid.insert(bundle)?;
        self.next_cid += 1;
        Ok(cid)
    }

    /// Clears tracking for an acknowledged custody id.
    pub fn acknowledge(&mut self, cid: u64) -> Result<ActiveBundle, Error> {
        let bundle = self.active.remove(cid)?;
        let _ = self.by_sid.remove(bundle.sid);
        Ok(bundle)
    }

    /// Clears tracking by storage id, for when the storage layer retires
    /// a bundle (expiry, administrative delete) before it is acknowledged.
    pub fn evict(&mut self, sid: Sid) -> Result<ActiveBundle, Error> {
        let bundle = self.by_sid.remove(sid)?;
        self.active.remove(bundle.cid)?;
        Ok(bundle)
    }

    /// The oldest bundle still awaiting acknowledgement.
    pub fn oldest(&mut self) -> Option<ActiveBundle> {
        self.active.next().ok()
    }

    /// Restamps a tracked bundle in place (retransmit timer updates).
    pub fn touch(&mut self, bundle: ActiveBundle) -> Result<(), Error> {
        self.active.add(bundle, true)?;
        let _ = self.by_sid.remove(bundle.sid);
        self.by_sid.insert(bundle)?;
        Ok(())
    }

    pub fn lookup(&self, sid: Sid) -> Option<&ActiveBundle> {
        self.by_sid.get(sid)
    }

    pub fn count(&self) -> usize {
        self.active.count()
    }
}

/// Receiver-side aggregation of custody acknowledgements, bound to one
/// custodian at a time.  Acknowledged custody ids accumulate in the range
/// tree until a flush drains them into a custody signal record.
#[derive(Debug)]
pub struct Aggregator {
    custodian: Option<Eid>,
    ranges: RangeTree,
    last_flush: u64,
    rate: u64,
}

impl Aggregator {
    pub fn new(capacity: usize, rate: u64) -> Self {
        Self {
            custodian: None,
            ranges: RangeTree::with_capacity(capacity),
            last_flush: 0,
            rate,
        }
    }

    pub fn custodian(&self) -> Option<Eid> {
        self.custodian
    }

    /// Pending fills belong to a different custodian and must be flushed
    /// before this one can be recorded.
    pub fn needs_rebind(&self, custodian: Eid) -> bool {
        self.custodian != Some(custodian)
    }

    pub fn bind(&mut self, custodian: Eid, sysnow: u64) {
        self.custodian = Some(custodian);
        self.last_flush = sysnow;
    }

    pub fn insert(&mut self, cid: u64) -> Result<(), range_tree::Error> {
        self.ranges.insert(cid)
    }

    /// The periodic flush interval has elapsed with fills pending.
    pub fn due(&self, sysnow: u64) -> bool {
        !self.ranges.is_empty() && sysnow >= self.last_flush + self.rate
    }

    pub fn mark_flushed(&mut self, sysnow: u64) {
        self.last_flush = sysnow;
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn ranges_mut(&mut self) -> &mut RangeTree {
        &mut self.ranges
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_assigns_sequential_cids() {
        let mut tracker = CustodyTracker::new(8);
        for expected in 0..5 {
            let cid = tracker.track(100 + expected, 0).unwrap();
            assert_eq!(cid, expected);
        }
        assert_eq!(tracker.count(), 5);
        assert_eq!(tracker.lookup(102).unwrap().cid, 2);
    }

    #[test]
    fn acknowledge_clears_both_indexes() {
        let mut tracker = CustodyTracker::new(8);
        let cid = tracker.track(100, 0).unwrap();
        let bundle = tracker.acknowledge(cid).unwrap();
        assert_eq!(bundle.sid, 100);
        assert_eq!(tracker.count(), 0);
        assert!(tracker.lookup(100).is_none());
        assert!(matches!(
            tracker.acknowledge(cid),
            Err(Error::Active(active_buffer::Error::NotFound))
        ));
    }

    #[test]
    fn evict_by_storage_id() {
        let mut tracker = CustodyTracker::new(8);
        tracker.track(100, 0).unwrap();
        tracker.track(101, 0).unwrap();
        let bundle = tracker.evict(100).unwrap();
        assert_eq!(bundle.cid, 0);
        assert_eq!(tracker.count(), 1);
        assert_eq!(tracker.oldest().unwrap().sid, 101);
    }

    #[test]
    fn window_wraps_onto_unacknowledged_entries() {
        let mut tracker = CustodyTracker::new(2);
        tracker.track(100, 0).unwrap();
        tracker.track(101, 0).unwrap();
        assert!(matches!(tracker.track(102, 0), Err(Error::WindowFull)));

        // acknowledging the colliding slot reopens the window
        tracker.acknowledge(0).unwrap();
        assert_eq!(tracker.track(102, 0).unwrap(), 2);
    }

    #[test]
    fn touch_restamps_retransmit_time() {
        let mut tracker = CustodyTracker::new(8);
        tracker.track(100, 10).unwrap();
        let mut bundle = tracker.oldest().unwrap();
        bundle.retx = 99;
        tracker.touch(bundle).unwrap();
        assert_eq!(tracker.oldest().unwrap().retx, 99);
        assert_eq!(tracker.lookup(100).unwrap().retx, 99);
        assert_eq!(tracker.count(), 1);
    }

    #[test]
    fn aggregator_binds_and_flushes() {
        let mut agg = Aggregator::new(8, 5);
        assert!(agg.needs_rebind(Eid::new(10, 1)));
        agg.bind(Eid::new(10, 1), 100);
        assert!(!agg.needs_rebind(Eid::new(10, 1)));
        assert!(agg.needs_rebind(Eid::new(30, 3)));

        agg.insert(0).unwrap();
        agg.insert(1).unwrap();
        assert!(!agg.due(104));
        assert!(agg.due(105));
        agg.mark_flushed(105);
        assert!(!agg.due(106));
    }
}
