/*!
A Rust implementation of the Bundle Protocol Version 6 (BPv6) wire format
and bundle lifecycle, as defined in
[RFC 5050](https://www.rfc-editor.org/rfc/rfc5050.html), with the custody
transfer enhancement block of aggregate custody signalling
([RFC 7122](https://www.rfc-editor.org/rfc/rfc7122.html)) and CRC payload
integrity.

The crate is a protocol core: it turns application payloads and routing
attributes into wire-format bundles, parses and verifies incoming bundles,
and encodes/decodes the aggregate custody signal administrative record.  It
does not own sockets or storage; callers supply a [`dtn_time::Clock`] and a
store callback and move octet streams themselves.

# Key Modules

- [`bundle`]: the [`Bundle`](bundle::Bundle) struct and its build/send/
  receive lifecycle.
- [`eid`]: CBHE/IPN endpoint identifiers and channel routes.
- [`dacs`]: the aggregate custody signal record codec.
- [`primary_block`], [`cteb`], [`bib`], [`payload_block`]: the individual
  block codecs.
*/

pub use quill_sdnv as sdnv;

pub mod bib;
pub mod block_flags;
pub mod block_type;
pub mod bundle;
pub mod crc;
pub mod cteb;
pub mod dacs;
pub mod dtn_time;
pub mod eid;
pub mod payload_block;
pub mod pcf;
pub mod primary_block;

mod error;

pub use bundle::{Attributes, Bundle, Custodian, Delivery, Fragment, Reception};
pub use eid::{Eid, Route};
pub use error::{Error, Flags};
pub use pcf::CosClass;

pub(crate) use error::raise;
