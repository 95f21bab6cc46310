/*!
The bundle agent core sitting above the [`quill-bpv6`](bpv6) protocol
codec: custody tracking (the active-bundle circular buffer, the
acknowledged-custody range tree, and the storage-id map), storage adapter
traits with RAM and flash-simulator backends, and the per-channel
orchestration that ties bundle lifecycle, custody, and storage together.

Everything here is synchronous: each operation runs to completion on the
caller's thread, blocking only in storage waits, and channels are guarded
by their own locks.
*/

pub use quill_bpv6 as bpv6;

pub mod active_buffer;
pub mod channel;
pub mod custody;
pub mod range_tree;
pub mod sid_map;
pub mod storage;

pub use channel::{Channel, ChannelConfig, Intake};
pub use storage::{BundleStore, Sid, Timeout, SID_VACANT};
