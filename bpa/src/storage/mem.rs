use super::*;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// RAM-backed bundle store: a FIFO transmit queue over a table of stored
/// bundles that stay addressable by storage id until relinquished.
pub struct MemStore {
    inner: Mutex<Inner>,
    space: Condvar,
    available: Condvar,
    capacity: usize,
}

struct Inner {
    queue: VecDeque<Sid>,
    items: HashMap<Sid, BundleImage>,
    next_sid: Sid,
}

impl MemStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                items: HashMap::new(),
                next_sid: 1,
            }),
            space: Condvar::new(),
            available: Condvar::new(),
            capacity,
        }
    }

    /// Waits on `cond`; false when the caller should give up.
    fn wait(cond: &Condvar, guard: &mut MutexGuard<Inner>, timeout: Timeout) -> bool {
        match timeout {
            Timeout::Immediate => false,
            Timeout::Infinite => {
                cond.wait(guard);
                true
            }
            Timeout::Millis(ms) => !cond
                .wait_for(guard, Duration::from_millis(ms as u64))
                .timed_out(),
        }
    }
}

impl BundleStore for MemStore {
    fn enqueue(&self, image: BundleImage, timeout: Timeout) -> Result<Sid, Error> {
        let mut inner = self.inner.lock();
        while inner.items.len() >= self.capacity {
            match timeout {
                Timeout::Immediate => return Err(Error::Full),
                _ => {
                    if !Self::wait(&self.space, &mut inner, timeout) {
                        return Err(Error::Timeout);
                    }
                }
            }
        }
        let sid = inner.next_sid;
        inner.next_sid += 1;
        inner.items.insert(sid, image);
        inner.queue.push_back(sid);
        drop(inner);
        self.available.notify_one();
        Ok(sid)
    }

    fn dequeue(&self, timeout: Timeout) -> Result<(Sid, BundleImage), Error> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(sid) = inner.queue.pop_front() {
                let image = inner.items.get(&sid).cloned().ok_or(Error::NotFound(sid))?;
                return Ok((sid, image));
            }
            if !Self::wait(&self.available, &mut inner, timeout) {
                return Err(Error::Timeout);
            }
        }
    }

    fn retrieve(&self, sid: Sid) -> Result<BundleImage, Error> {
        self.inner
            .lock()
            .items
            .get(&sid)
            .cloned()
            .ok_or(Error::NotFound(sid))
    }

    fn release(&self, _sid: Sid) -> Result<(), Error> {
        // images are copied out, nothing to unpin
        Ok(())
    }

    fn relinquish(&self, sid: Sid) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        inner.items.remove(&sid).ok_or(Error::NotFound(sid))?;
        inner.queue.retain(|queued| *queued != sid);
        drop(inner);
        self.space.notify_one();
        Ok(())
    }

    fn count(&self) -> usize {
        self.inner.lock().items.len()
    }
}
