use super::*;
use bpv6::dtn_time::Clock;
use bpv6::{Attributes, Bundle, Delivery, Eid, Flags, Reception, Route};
use bytes::Bytes;
use custody::{Aggregator, CustodyTracker};
use parking_lot::Mutex;
use std::sync::Arc;
use storage::{BundleImage, BundleStore, Sid, Timeout};
use thiserror::Error;

/// Per-channel configuration: bundle policy plus custody engine sizing.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub attributes: Attributes,
    /// Slots in the outstanding-custody window.
    pub custody_window: usize,
    /// Node capacity of the acknowledged-custody range tree.
    pub range_capacity: usize,
    /// Seconds between periodic acknowledgement flushes.
    pub dacs_rate: u64,
    /// Seconds before an unacknowledged custody bundle may retransmit.
    pub retransmit_timeout: u64,
    /// Maximum SDNV fill values per custody signal record.
    pub max_fills: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            attributes: Attributes::default(),
            custody_window: 512,
            range_capacity: 64,
            dacs_rate: 5,
            retransmit_timeout: 10,
            max_fills: 64,
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Protocol(#[from] bpv6::Error),

    #[error(transparent)]
    Storage(#[from] storage::Error),

    #[error(transparent)]
    Custody(#[from] custody::Error),
}

/// What a received octet stream turned into.
#[derive(Debug)]
pub enum Intake<'a> {
    /// A payload for the local application.
    Delivered(Delivery<'a>),
    /// The bundle was rebuilt and stored for forwarding.
    Forwarded,
    /// An aggregate custody signal was consumed; this many custody ids
    /// were acknowledged.
    Acknowledged(usize),
    /// The bundle's lifetime had already elapsed.
    Expired,
}

struct State {
    bundle: Bundle,
    /// Prebuilt administrative-record bundle for emitting custody signals.
    dacs: Bundle,
    tracker: CustodyTracker,
    aggregator: Aggregator,
    clock: Box<dyn Clock + Send>,
    flags: Flags,
    config: ChannelConfig,
}

/// One bundle channel: a local/destination pairing with its own custody
/// engine, storage glue, and lock.  All operations run synchronously on
/// the caller's thread.
pub struct Channel {
    state: Mutex<State>,
    store: Arc<dyn BundleStore>,
}

fn dacs_attributes(attributes: &Attributes) -> Attributes {
    Attributes {
        admin_record: true,
        request_custody: false,
        integrity_check: false,
        allow_fragmentation: false,
        ..attributes.clone()
    }
}

impl Channel {
    pub fn new(
        route: Route,
        config: ChannelConfig,
        store: Arc<dyn BundleStore>,
        clock: Box<dyn Clock + Send>,
    ) -> Result<Self, Error> {
        let mut flags = Flags::default();
        let mut bundle = Bundle::new(route, config.attributes.clone());
        bundle.populate(&mut flags)?;

        // rebuilt with a real destination when a custodian binds
        let dacs = Bundle::new(
            Route::new(route.local, Eid::NULL),
            dacs_attributes(&config.attributes),
        );

        Ok(Self {
            state: Mutex::new(State {
                bundle,
                dacs,
                tracker: CustodyTracker::new(config.custody_window),
                aggregator: Aggregator::new(config.range_capacity, config.dacs_rate),
                clock,
                flags,
                config,
            }),
            store,
        })
    }

    /// Stores an application payload as one or more bundles.
    pub fn send(&self, payload: &[u8], timeout: Timeout) -> Result<(), Error> {
        let mut state = self.state.lock();
        let State { bundle, clock, flags, .. } = &mut *state;
        if !bundle.prebuilt() {
            // the header was last used for a forwarded bundle
            bundle.populate(flags)?;
        }
        let store = &self.store;
        bundle.send(
            payload,
            clock.as_mut(),
            &mut |fragment: bpv6::Fragment| {
                store
                    .enqueue(BundleImage::from_fragment(&fragment), timeout)
                    .map(|_| ())
            },
            flags,
        )?;
        Ok(())
    }

    /// Dequeues the next stored bundle for the I/O layer, stamping and
    /// tracking a custody id when the bundle requested custody.
    pub fn transmit(&self, timeout: Timeout) -> Result<Bytes, Error> {
        let (sid, mut image) = self.store.dequeue(timeout)?;
        if image.cteboffset == 0 {
            // nothing will ever acknowledge it, so let it go now
            self.store.relinquish(sid)?;
            return Ok(Bytes::from(image.bytes));
        }

        let mut state = self.state.lock();
        let State { tracker, clock, flags, config, .. } = &mut *state;
        let sysnow = clock.now().unwrap_or_else(|_| {
            flags.set(Flags::UNRELIABLE_TIME);
            0
        });
        match tracker.track(sid, sysnow + config.retransmit_timeout) {
            Ok(cid) => image.update_custody_id(cid, flags)?,
            Err(e) => {
                // hand the bundle back rather than lose it
                drop(state);
                tracing::warn!("custody window full, re-queueing bundle");
                let _ = self.store.enqueue(image, Timeout::Immediate);
                return Err(e.into());
            }
        }
        Ok(Bytes::from(image.bytes))
    }

    /// The oldest custody bundle whose retransmit time has elapsed, with
    /// its timer restamped.
    pub fn retransmit(&self) -> Result<Option<Bytes>, Error> {
        let mut state = self.state.lock();
        let State { tracker, clock, flags, config, .. } = &mut *state;
        let Ok(sysnow) = clock.now() else {
            flags.set(Flags::UNRELIABLE_TIME);
            return Ok(None);
        };
        let Some(mut oldest) = tracker.oldest() else {
            return Ok(None);
        };
        if oldest.retx > sysnow {
            return Ok(None);
        }
        oldest.retx = sysnow + config.retransmit_timeout;
        tracker.touch(oldest)?;

        // the stored image still carries custody id zero; stamp the
        // assigned id on every load, first transmit or retransmit alike
        let mut image = self.store.retrieve(oldest.sid)?;
        image.update_custody_id(oldest.cid, flags)?;
        Ok(Some(Bytes::from(image.bytes)))
    }

    /// Parses a received octet stream and carries out its disposition:
    /// deliveries surface to the caller, forwards re-enter storage,
    /// custody signals drain the custody tracker, and custody requests
    /// are acknowledged towards their custodian.
    pub fn receive<'a>(&self, buffer: &'a [u8], timeout: Timeout) -> Result<Intake<'a>, Error> {
        let mut state = self.state.lock();
        let reception = {
            let State { bundle, clock, flags, .. } = &mut *state;
            bundle.receive(buffer, clock.as_mut(), flags)?
        };

        match reception {
            Reception::Expired => Ok(Intake::Expired),
            Reception::Accept(delivery) => {
                if let Some(custodian) = delivery.custody {
                    self.acknowledge_locked(&mut state, custodian.eid, custodian.cid, timeout)?;
                }
                Ok(Intake::Delivered(delivery))
            }
            Reception::Forward(delivery) => {
                {
                    let State { bundle, clock, flags, .. } = &mut *state;
                    let store = &self.store;
                    bundle.send(
                        delivery.data,
                        clock.as_mut(),
                        &mut |fragment: bpv6::Fragment| {
                            store
                                .enqueue(BundleImage::from_fragment(&fragment), timeout)
                                .map(|_| ())
                        },
                        flags,
                    )?;
                }
                if let Some(custodian) = delivery.custody {
                    self.acknowledge_locked(&mut state, custodian.eid, custodian.cid, timeout)?;
                }
                Ok(Intake::Forwarded)
            }
            Reception::Acknowledgment { record, .. } => {
                let count = self.ingest_acknowledgment_locked(&mut state, record.data)?;
                Ok(Intake::Acknowledged(count))
            }
        }
    }

    /// Emits pending custody signal records towards the bound custodian
    /// until none remain.  Returns the number of records stored.
    pub fn flush_acknowledgments(&self, timeout: Timeout) -> Result<usize, Error> {
        let mut state = self.state.lock();
        self.flush_locked(&mut state, timeout)
    }

    /// Drops custody tracking for a stored bundle the storage layer has
    /// retired, freeing its storage.
    pub fn evict(&self, sid: Sid) -> Result<(), Error> {
        self.state.lock().tracker.evict(sid)?;
        self.store.relinquish(sid)?;
        Ok(())
    }

    /// Outstanding custody bundles awaiting acknowledgement.
    pub fn pending_custody(&self) -> usize {
        self.state.lock().tracker.count()
    }

    /// The anomaly flags accumulated by this channel so far.
    pub fn flags(&self) -> Flags {
        self.state.lock().flags
    }

    pub fn store(&self) -> &Arc<dyn BundleStore> {
        &self.store
    }

    fn acknowledge_locked(
        &self,
        state: &mut State,
        custodian: Eid,
        cid: u64,
        timeout: Timeout,
    ) -> Result<(), Error> {
        if state.aggregator.needs_rebind(custodian) {
            self.flush_locked(state, timeout)?;
            let sysnow = state.clock.now().unwrap_or(0);
            state.aggregator.bind(custodian, sysnow);

            let mut route = state.bundle.route;
            route.destination = custodian;
            route.report_to = Eid::NULL;
            state.dacs = Bundle::new(route, dacs_attributes(&state.config.attributes));
            state.dacs.populate(&mut state.flags)?;
        }

        match state.aggregator.insert(cid) {
            Ok(()) => {}
            // an acknowledgement can arrive twice; the record stands
            Err(range_tree::Error::Duplicate) => {}
            Err(range_tree::Error::Full) => {
                self.flush_locked(state, timeout)?;
                state.aggregator.insert(cid).map_err(custody::Error::from)?;
            }
        }

        let sysnow = state.clock.now().unwrap_or(0);
        if state.aggregator.due(sysnow) {
            self.flush_locked(state, timeout)?;
        }
        Ok(())
    }

    fn flush_locked(&self, state: &mut State, timeout: Timeout) -> Result<usize, Error> {
        let mut records = 0;
        let State { dacs, aggregator, clock, flags, config, .. } = &mut *state;
        while !aggregator.is_empty() {
            let mut record = [0u8; bpv6::bundle::HDR_BUF_SIZE];
            let len = bpv6::dacs::write(
                &mut record,
                config.max_fills,
                aggregator.ranges_mut(),
                flags,
            )?;

            let store = &self.store;
            dacs.send(
                &record[..len],
                clock.as_mut(),
                &mut |fragment: bpv6::Fragment| {
                    store
                        .enqueue(BundleImage::from_fragment(&fragment), timeout)
                        .map(|_| ())
                },
                flags,
            )?;
            records += 1;
        }
        let sysnow = clock.now().unwrap_or(0);
        aggregator.mark_flushed(sysnow);
        Ok(records)
    }

    fn ingest_acknowledgment_locked(
        &self,
        state: &mut State,
        record: &[u8],
    ) -> Result<usize, Error> {
        let State { tracker, flags, .. } = &mut *state;
        let store = &self.store;
        let count = bpv6::dacs::read(
            record,
            &mut |cid, flags| match tracker.acknowledge(cid) {
                Ok(bundle) => {
                    if let Err(e) = store.relinquish(bundle.sid) {
                        flags.set(Flags::STORE_FAILURE);
                        tracing::warn!("failed to free acknowledged bundle: {e}");
                    }
                }
                Err(_) => {
                    tracing::debug!("acknowledgement for unknown custody id {cid}");
                }
            },
            flags,
        )?;
        Ok(count)
    }
}
