use super::*;
use bpv6::sdnv;
use thiserror::Error;

pub mod flash_sim;
pub mod mem;

/// An opaque storage id.  Zero is reserved as the vacant sentinel.
pub type Sid = u64;

/// Sentinel storage id marking an empty active-table slot.
pub const SID_VACANT: Sid = 0;

/// Blocking-wait policy for storage operations: block forever, give up
/// immediately, or wait up to a bound in milliseconds.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Timeout {
    Infinite,
    Immediate,
    Millis(u32),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("storage operation timed out")]
    Timeout,

    #[error("no stored bundle with storage id {0}")]
    NotFound(Sid),

    #[error("storage service is full")]
    Full,

    #[error("storage device failure: {0}")]
    Device(&'static str),
}

/// A serialized bundle plus the layout needed to stamp its custody id at
/// transmit time without re-encoding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleImage {
    /// Absolute expiration time; storage may garbage-collect past it.
    pub exprtime: u64,
    /// Offset of the CTEB in `bytes`; zero when custody was not requested.
    pub cteboffset: usize,
    /// Custody id field layout, relative to `cteboffset`.
    pub cidfield: sdnv::Field,
    /// The bundle carries an administrative record.
    pub is_record: bool,
    /// Header and payload, concatenated.
    pub bytes: Vec<u8>,
}

impl BundleImage {
    /// Captures a laid-out fragment from the bundle engine.
    pub fn from_fragment(fragment: &bpv6::Fragment) -> Self {
        Self {
            exprtime: fragment.exprtime,
            cteboffset: fragment.cteboffset,
            cidfield: fragment.cidfield,
            is_record: fragment.is_record,
            bytes: [fragment.header, fragment.payload].concat(),
        }
    }

    /// Rewrites the custody id in the stored bytes in place.
    pub fn update_custody_id(
        &mut self,
        cid: u64,
        flags: &mut bpv6::Flags,
    ) -> Result<(), bpv6::Error> {
        bpv6::bundle::stamp_custody_id(
            &mut self.bytes,
            self.cteboffset,
            &mut self.cidfield,
            cid,
            flags,
        )
    }
}

/// A bundle storage service.
///
/// `enqueue`/`dequeue` move bundles through the channel's transmit queue;
/// `retrieve` fetches by storage id without dequeuing (retransmission);
/// `release` drops any transient reference the caller held; `relinquish`
/// frees the bundle permanently.  Timeouts follow [`Timeout`] semantics.
pub trait BundleStore: Send + Sync {
    fn enqueue(&self, image: BundleImage, timeout: Timeout) -> Result<Sid, Error>;

    fn dequeue(&self, timeout: Timeout) -> Result<(Sid, BundleImage), Error>;

    fn retrieve(&self, sid: Sid) -> Result<BundleImage, Error>;

    fn release(&self, sid: Sid) -> Result<(), Error>;

    fn relinquish(&self, sid: Sid) -> Result<(), Error>;

    fn count(&self) -> usize;
}
