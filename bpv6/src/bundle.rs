use super::*;
use bib::IntegrityBlock;
use block_flags::BlockFlags;
use block_type::BlockType;
use super::crc::CipherSuite;
use cteb::CustodyBlock;
use dtn_time::{
    Clock, DtnTime, BEST_EFFORT_LIFETIME, TTL_CREATION_TIME, UNKNOWN_CREATION_TIME,
};
use payload_block::PayloadBlock;
use pcf::{CosClass, ProcessingFlags};
use primary_block::PrimaryBlock;

/// Fixed size of the serialized header buffer.
pub const HDR_BUF_SIZE: usize = 128;

/// Bound on the exclude-region list built while walking extension blocks.
const NUM_EXCLUDE_REGIONS: usize = 16;

/// Per-channel bundle policy.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Attributes {
    /// Seconds from creation until the bundle expires.
    pub lifetime: u64,
    pub request_custody: bool,
    pub integrity_check: bool,
    pub allow_fragmentation: bool,
    /// Payloads on this channel are administrative records.
    pub admin_record: bool,
    /// Never expire received bundles, regardless of their lifetime.
    pub ignore_expiration: bool,
    pub class_of_service: CosClass,
    pub cipher_suite: CipherSuite,
    /// Largest bundle (header plus payload) this channel may emit.
    pub max_length: usize,
}

impl Default for Attributes {
    fn default() -> Self {
        Self {
            lifetime: 86_400,
            request_custody: true,
            integrity_check: true,
            allow_fragmentation: false,
            admin_record: false,
            ignore_expiration: false,
            class_of_service: CosClass::Normal,
            cipher_suite: CipherSuite::CRC16_X25,
            max_length: 4096,
        }
    }
}

/// The serialized header state of a bundle, mutated in place between sends.
#[derive(Debug, Clone)]
pub struct BundleData {
    /// Absolute time at which the bundle expires.
    pub exprtime: DtnTime,
    /// Copy of the custody id field, for in-place custody id updates.
    pub cidfield: sdnv::Field,
    /// Offset of the CTEB within `header`; zero when custody is not requested.
    pub cteboffset: usize,
    /// Offset of the BIB within `header`; zero when integrity is not requested.
    pub biboffset: usize,
    /// Offset of the payload block within `header`.
    pub payoffset: usize,
    /// Bytes of `header` in use.
    pub headersize: usize,
    /// Total size of the last emitted bundle (header plus payload).
    pub bundlesize: usize,
    pub header: [u8; HDR_BUF_SIZE],
}

impl Default for BundleData {
    fn default() -> Self {
        Self {
            exprtime: 0,
            cidfield: sdnv::Field::default(),
            cteboffset: 0,
            biboffset: 0,
            payoffset: 0,
            headersize: 0,
            bundlesize: 0,
            header: [0; HDR_BUF_SIZE],
        }
    }
}

#[derive(Debug, Default, Clone)]
struct Blocks {
    primary: PrimaryBlock,
    custody: CustodyBlock,
    integrity: IntegrityBlock,
    payload: PayloadBlock,
}

/// Custody information surfaced to the caller when a received bundle
/// requested custody transfer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Custodian {
    pub eid: Eid,
    pub cid: u64,
}

/// A payload handed back to the caller by [`Bundle::receive`].
#[derive(Debug)]
pub struct Delivery<'a> {
    pub exprtime: DtnTime,
    /// The source requested an application acknowledgement.
    pub ack_app: bool,
    pub data: &'a [u8],
    pub custody: Option<Custodian>,
}

/// Successor action requested from the caller once a bundle has parsed
/// cleanly.  These are not errors; the bundle was well formed and the
/// caller decides what happens next.
#[derive(Debug)]
pub enum Reception<'a> {
    /// A payload destined for the local endpoint.
    Accept(Delivery<'a>),
    /// The bundle has been rebuilt for forwarding; send its payload.
    Forward(Delivery<'a>),
    /// An aggregate custody signal for the custody engine.
    Acknowledgment {
        custodian: Eid,
        record: Delivery<'a>,
    },
    /// The bundle's lifetime has already elapsed.
    Expired,
}

/// One laid-out bundle handed to the send callback for storage.
#[derive(Debug)]
pub struct Fragment<'a> {
    pub is_record: bool,
    pub header: &'a [u8],
    pub payload: &'a [u8],
    pub exprtime: DtnTime,
    /// Offset of the CTEB in `header`; zero when custody was not requested.
    pub cteboffset: usize,
    /// Custody id field layout, for stamping the id at transmit time.
    pub cidfield: sdnv::Field,
}

/// A BPv6 bundle: addressing, policy, and the mutable serialized header
/// that successive sends restamp in place.
#[derive(Debug, Clone)]
pub struct Bundle {
    pub route: Route,
    pub attributes: Attributes,
    pub data: BundleData,
    prebuilt: bool,
    blocks: Blocks,
}

/// Saturating expiration arithmetic with sentinel pass-through.
fn expiration_time(createsec: u64, lifetime: u64, flags: &mut Flags) -> DtnTime {
    match createsec {
        UNKNOWN_CREATION_TIME => UNKNOWN_CREATION_TIME,
        TTL_CREATION_TIME => TTL_CREATION_TIME,
        createsec => createsec.checked_add(lifetime).unwrap_or_else(|| {
            flags.set(Flags::SDNV_OVERFLOW);
            tracing::warn!("calculation of bundle expiration time rolled over");
            sdnv::MAX_ENCODED_VALUE
        }),
    }
}

/// Rewrites the custody id SDNV of a laid-out header in place.
pub fn stamp_custody_id(
    header: &mut [u8],
    cteboffset: usize,
    cidfield: &mut sdnv::Field,
    cid: u64,
    flags: &mut Flags,
) -> Result<(), Error> {
    if cteboffset == 0 || cteboffset >= header.len() {
        return raise(flags, Error::Api("bundle has no custody block"));
    }
    cidfield.value = cid;
    cidfield.mask();
    let mut sf = sdnv::Flags::default();
    sdnv::write(&mut header[cteboffset..], *cidfield, &mut sf);
    if sf.any() {
        flags.set(sf.into());
        return raise(flags, Error::Parse("custody id field"));
    }
    Ok(())
}

impl Bundle {
    pub fn new(route: Route, attributes: Attributes) -> Self {
        Self {
            route,
            attributes,
            data: BundleData::default(),
            prebuilt: false,
            blocks: Blocks::default(),
        }
    }

    /// The header was synthesized locally (as opposed to parsed from a
    /// forwarded bundle) and gets stamped with fresh timestamps on send.
    pub fn prebuilt(&self) -> bool {
        self.prebuilt
    }

    /// Lays out the header for originated traffic.
    pub fn populate(&mut self, flags: &mut Flags) -> Result<(), Error> {
        self.build(None, &[], flags)
    }

    /// Lays out the bundle header: primary block, then CTEB if custody is
    /// requested, then BIB if integrity is requested, then any forwarded
    /// extension regions, then the payload block header.
    fn build(
        &mut self,
        pri: Option<PrimaryBlock>,
        hdr_buf: &[u8],
        flags: &mut Flags,
    ) -> Result<(), Error> {
        self.data = BundleData::default();
        let custody_service = self.route.local.service;

        match pri {
            Some(pri) => {
                // Forwarding: the parsed primary block is authoritative
                self.blocks.primary = pri;
                self.prebuilt = false;
            }
            None => {
                let mut pri = primary_block::TEMPLATE;
                pri.dstnode.value = self.route.destination.node as u64;
                pri.dstserv.value = self.route.destination.service as u64;
                pri.srcnode.value = self.route.local.node as u64;
                pri.srcserv.value = self.route.local.service as u64;
                pri.rptnode.value = self.route.report_to.node as u64;
                pri.rptserv.value = self.route.report_to.service as u64;
                if self.attributes.request_custody {
                    pri.cstnode.value = self.route.local.node as u64;
                    pri.cstserv.value = custody_service as u64;
                } else {
                    pri.cstnode.value = 0;
                    pri.cstserv.value = 0;
                }
                pri.lifetime.value = self.attributes.lifetime;
                pri.flags = ProcessingFlags {
                    is_fragment: false,
                    is_admin_record: self.attributes.admin_record,
                    allow_fragmentation: self.attributes.allow_fragmentation,
                    custody_requested: self.attributes.request_custody,
                    app_ack_requested: false,
                    class_of_service: self.attributes.class_of_service,
                    unrecognised: 0,
                };
                self.blocks.primary = pri;
                self.prebuilt = true;
            }
        }

        let mut hdr_index =
            primary_block::write(&mut self.data.header, &mut self.blocks.primary, false, flags)?;

        if self.blocks.primary.flags.custody_requested {
            let mut custody = cteb::TEMPLATE;
            custody.cid.value = 0;
            custody.custodian = Eid::new(self.route.local.node, custody_service);

            self.data.cteboffset = hdr_index;
            let written = cteb::write(
                &mut self.data.header[hdr_index..],
                &mut custody,
                false,
                flags,
            )?;
            self.data.cidfield = custody.cid;
            self.blocks.custody = custody;
            hdr_index += written;
        } else {
            self.data.cteboffset = 0;
        }

        if self.attributes.integrity_check {
            let mut integrity = bib::TEMPLATE;
            integrity.cipher_suite_id.value = self.attributes.cipher_suite.id();

            self.data.biboffset = hdr_index;
            let written = bib::write(
                &mut self.data.header[hdr_index..],
                &mut integrity,
                false,
                flags,
            )?;
            self.blocks.integrity = integrity;
            hdr_index += written;
        } else {
            self.data.biboffset = 0;
        }

        // Copy the non-excluded regions of a forwarded header
        if !hdr_buf.is_empty() {
            if hdr_index + hdr_buf.len() >= HDR_BUF_SIZE {
                return raise(
                    flags,
                    Error::BundleTooLarge {
                        size: hdr_index + hdr_buf.len(),
                        max: HDR_BUF_SIZE,
                    },
                );
            }
            self.data.header[hdr_index..hdr_index + hdr_buf.len()].copy_from_slice(hdr_buf);
            hdr_index += hdr_buf.len();
        }

        // Lay out the payload block header now so the header size is known
        // before the first send
        self.blocks.payload = payload_block::TEMPLATE;
        self.data.payoffset = hdr_index;
        let written = payload_block::write(
            &mut self.data.header[hdr_index..],
            &mut self.blocks.payload,
            false,
            flags,
        )?;
        self.data.headersize = hdr_index + written;
        Ok(())
    }

    /// Stores `payload` as one or more bundles through the `store`
    /// callback, fragmenting if the payload exceeds what the channel's
    /// maximum bundle length leaves after the header.
    pub fn send<E>(
        &mut self,
        payload: &[u8],
        clock: &mut dyn Clock,
        store: &mut dyn FnMut(Fragment) -> Result<(), E>,
        flags: &mut Flags,
    ) -> Result<(), Error>
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        self.blocks.payload.paysize = payload.len() as u64;

        let max_paysize = self.attributes.max_length as i64 - self.data.headersize as i64;
        if max_paysize <= 0 {
            return raise(
                flags,
                Error::BundleTooLarge {
                    size: self.data.headersize,
                    max: self.attributes.max_length,
                },
            );
        }
        let max_paysize = max_paysize as usize;
        if payload.len() > max_paysize {
            if !self.attributes.allow_fragmentation {
                return raise(
                    flags,
                    Error::BundleTooLarge {
                        size: payload.len(),
                        max: max_paysize,
                    },
                );
            }
            if self.blocks.primary.fragoffset.width == 0 {
                // a forwarded header that never reserved fragment fields
                return raise(
                    flags,
                    Error::BundleTooLarge {
                        size: payload.len(),
                        max: max_paysize,
                    },
                );
            }
            if !self.blocks.primary.flags.is_fragment {
                // turn on fragmentation with an in-place pcf rewrite
                self.blocks.primary.flags.is_fragment = true;
                self.blocks.primary.pcf.value = u64::from(self.blocks.primary.flags);
                let mut sf = sdnv::Flags::default();
                sdnv::write(&mut self.data.header, self.blocks.primary.pcf, &mut sf);
                flags.set(sf.into());
            }
        }

        // Stamp the creation timestamp of originated bundles
        let mut lifetime = self.blocks.primary.lifetime;
        if self.prebuilt {
            let mut sf = sdnv::Flags::default();
            match clock.now() {
                Ok(sysnow) => self.blocks.primary.createsec.value = sysnow,
                Err(_) => {
                    flags.set(Flags::UNRELIABLE_TIME);
                    tracing::warn!("unreliable time detected");
                    self.blocks.primary.createsec.value = UNKNOWN_CREATION_TIME;

                    // Hardcoded lifetime protects against unintended
                    // expiration at receivers with good clocks
                    lifetime.value = BEST_EFFORT_LIFETIME;
                    sdnv::write(&mut self.data.header, lifetime, &mut sf);
                }
            }
            sdnv::write(&mut self.data.header, self.blocks.primary.createsec, &mut sf);
            sdnv::write(&mut self.data.header, self.blocks.primary.createseq, &mut sf);
            flags.set(sf.into());
        }

        self.data.exprtime =
            expiration_time(self.blocks.primary.createsec.value, lifetime.value, flags);

        // Emit fragments in payload order
        let mut payload_offset = 0;
        while payload_offset < payload.len() {
            let fragment =
                &payload[payload_offset..payload.len().min(payload_offset + max_paysize)];

            if self.blocks.primary.flags.is_fragment {
                self.blocks.primary.fragoffset.value = payload_offset as u64;
                self.blocks.primary.paylen.value = payload.len() as u64;
                let mut sf = sdnv::Flags::default();
                sdnv::write(&mut self.data.header, self.blocks.primary.fragoffset, &mut sf);
                sdnv::write(&mut self.data.header, self.blocks.primary.paylen, &mut sf);
                flags.set(sf.into());
            }

            if self.data.biboffset != 0 {
                bib::update(
                    &mut self.data.header[self.data.biboffset..],
                    fragment,
                    &mut self.blocks.integrity,
                    flags,
                )?;
            }

            self.blocks.payload.paysize = fragment.len() as u64;
            let written = payload_block::write(
                &mut self.data.header[self.data.payoffset..],
                &mut self.blocks.payload,
                false,
                flags,
            )?;
            self.data.headersize = self.data.payoffset + written;
            self.data.bundlesize = self.data.headersize + fragment.len();

            if let Err(e) = store(Fragment {
                is_record: self.blocks.primary.flags.is_admin_record,
                header: &self.data.header[..self.data.headersize],
                payload: fragment,
                exprtime: self.data.exprtime,
                cteboffset: self.data.cteboffset,
                cidfield: self.data.cidfield,
            }) {
                return raise(flags, Error::Store(e.into()));
            }

            payload_offset += fragment.len();
        }

        // The sequence only advances once every fragment is safely stored
        if self.prebuilt {
            self.blocks.primary.createseq.value += 1;
            self.blocks.primary.createseq.mask();
        }
        Ok(())
    }

    /// Parses a received bundle and decides its disposition.
    ///
    /// The input buffer is never modified; forwarded-without-processing
    /// flag updates for carried-through unknown blocks are applied to the
    /// rebuilt header copy instead.
    pub fn receive<'a>(
        &mut self,
        buffer: &'a [u8],
        clock: &mut dyn Clock,
        flags: &mut Flags,
    ) -> Result<Reception<'a>, Error> {
        let mut exclude = [0usize; NUM_EXCLUDE_REGIONS];
        let mut ei = 0;
        let mut patches: Vec<(usize, sdnv::Field)> = Vec::new();

        // Primary block
        let mut pri = PrimaryBlock::default();
        exclude[ei] = 0;
        ei += 1;
        let mut index = primary_block::read(buffer, &mut pri, true, flags)?;
        exclude[ei] = index;
        ei += 1;

        // Expiration
        let exprtime = expiration_time(pri.createsec.value, pri.lifetime.value, flags);
        let (sysnow, unreliable) = match clock.now() {
            Ok(sysnow) => (sysnow, false),
            Err(_) => {
                flags.set(Flags::UNRELIABLE_TIME);
                tracing::warn!("unreliable time detected");
                (0, true)
            }
        };
        if self.is_expired(sysnow, exprtime, unreliable) {
            return Ok(Reception::Expired);
        }

        // Walk the remaining blocks
        let mut custody: Option<CustodyBlock> = None;
        let mut integrity: Option<IntegrityBlock> = None;

        while index < buffer.len() {
            if ei >= NUM_EXCLUDE_REGIONS - 2 {
                return raise(flags, Error::Noncompliant("too many extension blocks"));
            }

            match BlockType::from(buffer[index]) {
                BlockType::PayloadIntegrity => {
                    exclude[ei] = index;
                    ei += 1;
                    let mut blk = IntegrityBlock::default();
                    index += bib::read(&buffer[index..], &mut blk, true, flags)?;
                    integrity = Some(blk);
                    exclude[ei] = index;
                    ei += 1;
                }
                BlockType::CustodyTransfer => {
                    // Consumed here; a forwarded bundle gets a fresh CTEB
                    // naming the new custodian
                    exclude[ei] = index;
                    ei += 1;
                    let mut blk = CustodyBlock::default();
                    index += cteb::read(&buffer[index..], &mut blk, true, flags)?;
                    custody = Some(blk);
                    exclude[ei] = index;
                    ei += 1;
                }
                BlockType::Unrecognised(blk_type) => {
                    let start = index;
                    let mut bf = sdnv::Field::new(1, 0);
                    let mut blklen = sdnv::Field::default();
                    let mut sf = sdnv::Flags::default();
                    blklen.index = sdnv::read(&buffer[start..], &mut bf, &mut sf);
                    bf.width = blklen.index.saturating_sub(1);
                    let data_index = sdnv::read(&buffer[start..], &mut blklen, &mut sf);
                    if sf.any() {
                        flags.set(sf.into());
                        return raise(flags, Error::Parse("extension block"));
                    }
                    index = start + data_index + blklen.value as usize;
                    if index > buffer.len() {
                        return raise(flags, Error::Parse("extension block"));
                    }

                    flags.set(Flags::INCOMPLETE);
                    tracing::debug!("unrecognised extension block of type {blk_type} skipped");

                    let blk_flags = BlockFlags::from(bf.value);
                    if blk_flags.notify_if_unprocessed {
                        // No status reports are emitted
                        flags.set(Flags::NONCOMPLIANT);
                        tracing::warn!("request to notify on unprocessed extension block ignored");
                    }
                    if blk_flags.delete_bundle_if_unprocessed {
                        return raise(flags, Error::Dropped("bundle with unrecognised block"));
                    }
                    if blk_flags.drop_if_unprocessed {
                        exclude[ei] = start;
                        ei += 1;
                        exclude[ei] = index;
                        ei += 1;
                    } else {
                        // Carried through on forward, marked as forwarded
                        // without processing in the rebuilt copy
                        let mut patched = bf;
                        patched.value = u64::from(BlockFlags {
                            forwarded_unprocessed: true,
                            ..blk_flags
                        });
                        patches.push((start, patched));
                    }
                }
                BlockType::Payload => {
                    exclude[ei] = index;
                    ei += 1;
                    let mut pay = PayloadBlock::default();
                    let (header_len, payload) =
                        payload_block::read(&buffer[index..], &mut pay, true, flags)?;
                    index += header_len;
                    exclude[ei] = index + pay.paysize as usize;
                    ei += 1;

                    if let Some(blk) = &integrity {
                        bib::verify(payload, blk, flags)?;
                    }
                    if pri.flags.is_admin_record && pay.paysize < 2 {
                        return raise(flags, Error::Parse("administrative record payload"));
                    }

                    return self.dispatch(
                        buffer, pri, payload, exprtime, &exclude[..ei], &patches, custody, flags,
                    );
                }
            }
        }

        raise(flags, Error::Noncompliant("bundle has no payload block"))
    }

    /// The disposition of a fully parsed bundle.
    #[allow(clippy::too_many_arguments)]
    fn dispatch<'a>(
        &mut self,
        buffer: &'a [u8],
        mut pri: PrimaryBlock,
        payload: &'a [u8],
        exprtime: DtnTime,
        exclude: &[usize],
        patches: &[(usize, sdnv::Field)],
        custody: Option<CustodyBlock>,
        flags: &mut Flags,
    ) -> Result<Reception<'a>, Error> {
        let custodian = |custody: &Option<CustodyBlock>| {
            custody.as_ref().map(|cteb| Custodian {
                eid: cteb.custodian,
                cid: cteb.cid.value,
            })
        };

        // Forward: this is not the destination node
        if pri.dstnode.value != self.route.local.node as u64 {
            if pri.flags.custody_requested {
                pri.rptnode.value = 0;
                pri.rptserv.value = 0;
                pri.cstnode.value = self.route.local.node as u64;
                pri.cstserv.value = self.route.local.service as u64;
            }

            // Concatenate the non-excluded header regions, applying the
            // forwarded-without-processing flag deltas to the copy
            let mut hdr_buf = [0u8; HDR_BUF_SIZE];
            let mut hdr_index = 0;
            let mut i = 1;
            while i + 1 < exclude.len() {
                let (start, stop) = (exclude[i], exclude[i + 1]);
                let count = stop - start;
                if hdr_index + count >= HDR_BUF_SIZE {
                    return raise(
                        flags,
                        Error::BundleTooLarge {
                            size: hdr_index + count,
                            max: HDR_BUF_SIZE,
                        },
                    );
                }
                hdr_buf[hdr_index..hdr_index + count].copy_from_slice(&buffer[start..stop]);

                for (blk_start, field) in patches {
                    if (start..stop).contains(blk_start) {
                        let mut sf = sdnv::Flags::default();
                        sdnv::write(
                            &mut hdr_buf[hdr_index + (blk_start - start)..],
                            *field,
                            &mut sf,
                        );
                        flags.set(sf.into());
                    }
                }
                hdr_index += count;
                i += 2;
            }

            let custody_requested = pri.flags.custody_requested;
            self.build(Some(pri), &hdr_buf[..hdr_index], flags)?;

            let custody_info = if custody_requested {
                match custodian(&custody) {
                    Some(info) => Some(info),
                    None => return raise(flags, Error::Noncompliant("only aggregate custody supported")),
                }
            } else {
                None
            };
            return Ok(Reception::Forward(Delivery {
                exprtime,
                ack_app: pri.flags.app_ack_requested,
                data: payload,
                custody: custody_info,
            }));
        }

        // Wrong channel: right node, some other service
        if pri.dstserv.value != 0 && pri.dstserv.value != self.route.local.service as u64 {
            return raise(
                flags,
                Error::RouteNeeded {
                    destination: pri.dstserv.value,
                    local: self.route.local.service as u64,
                },
            );
        }

        // Administrative record
        if pri.flags.is_admin_record {
            return match payload[0] {
                dacs::ACS_REC_TYPE => Ok(Reception::Acknowledgment {
                    custodian: Eid::new(pri.cstnode.value as u32, pri.cstserv.value as u32),
                    record: Delivery {
                        exprtime,
                        ack_app: pri.flags.app_ack_requested,
                        data: payload,
                        custody: None,
                    },
                }),
                dacs::CS_REC_TYPE => {
                    raise(flags, Error::Noncompliant("custody signal bundles are not supported"))
                }
                dacs::STATUS_REC_TYPE => {
                    raise(flags, Error::Noncompliant("status report bundles are not supported"))
                }
                rec_type => raise(flags, Error::UnknownRecord(rec_type)),
            };
        }

        // A user payload for the local endpoint
        let custody_info = if pri.flags.custody_requested {
            match custodian(&custody) {
                Some(info) => Some(info),
                None => {
                    return raise(
                        flags,
                        Error::Noncompliant(
                            "bundle requesting custody, but only aggregate custody supported",
                        ),
                    )
                }
            }
        } else {
            None
        };
        Ok(Reception::Accept(Delivery {
            exprtime,
            ack_app: pri.flags.app_ack_requested,
            data: payload,
            custody: custody_info,
        }))
    }

    /// Rewrites the stored custody id through the frozen-width cid field.
    pub fn update_custody_id(&mut self, cid: u64, flags: &mut Flags) -> Result<(), Error> {
        let data = &mut self.data;
        stamp_custody_id(&mut data.header, data.cteboffset, &mut data.cidfield, cid, flags)
    }

    /// A bundle is expired only when the clock is trustworthy, expiration
    /// is not being ignored, and the expiration time is a real time.
    pub fn is_expired(&self, sysnow: DtnTime, exprtime: DtnTime, unreliable: bool) -> bool {
        !unreliable
            && !self.attributes.ignore_expiration
            && exprtime != UNKNOWN_CREATION_TIME
            && exprtime != TTL_CREATION_TIME
            && sysnow >= exprtime
    }
}

/// Parses only the primary block of a raw bundle and returns its
/// addressing, source mapped to local.
pub fn route_info(buffer: &[u8]) -> Result<Route, Error> {
    let mut flags = Flags::default();
    let mut pri = PrimaryBlock::default();
    primary_block::read(buffer, &mut pri, true, &mut flags)?;
    Ok(Route {
        local: Eid::new(pri.srcnode.value as u32, pri.srcserv.value as u32),
        destination: Eid::new(pri.dstnode.value as u32, pri.dstserv.value as u32),
        report_to: Eid::new(pri.rptnode.value as u32, pri.rptserv.value as u32),
    })
}

/// Renders a human-readable multi-line summary of a raw bundle.
pub fn describe(buffer: &[u8], flags: &mut Flags) -> Result<String, Error> {
    use std::fmt::Write;

    flags.set(Flags::DIAGNOSTIC);

    let mut out = String::new();
    let mut pri = PrimaryBlock::default();
    let mut index = primary_block::read(buffer, &mut pri, true, flags)?;

    let _ = writeln!(out, "bundle of size {}, version {}", buffer.len(), pri.version);
    let _ = writeln!(
        out,
        "  flags: admin={} frag={} allow-frag={} custody={} ack-app={} cos={:?}",
        pri.flags.is_admin_record,
        pri.flags.is_fragment,
        pri.flags.allow_fragmentation,
        pri.flags.custody_requested,
        pri.flags.app_ack_requested,
        pri.flags.class_of_service,
    );
    let _ = writeln!(
        out,
        "  destination {}  source {}  report-to {}  custodian {}",
        Eid::new(pri.dstnode.value as u32, pri.dstserv.value as u32),
        Eid::new(pri.srcnode.value as u32, pri.srcserv.value as u32),
        Eid::new(pri.rptnode.value as u32, pri.rptserv.value as u32),
        Eid::new(pri.cstnode.value as u32, pri.cstserv.value as u32),
    );
    let _ = writeln!(
        out,
        "  created {}.{}  lifetime {}",
        pri.createsec.value, pri.createseq.value, pri.lifetime.value
    );
    if pri.flags.is_fragment {
        let _ = writeln!(
            out,
            "  fragment offset {} of total {}",
            pri.fragoffset.value, pri.paylen.value
        );
    }

    while index < buffer.len() {
        match BlockType::from(buffer[index]) {
            BlockType::CustodyTransfer => {
                let mut blk = CustodyBlock::default();
                index += cteb::read(&buffer[index..], &mut blk, true, flags)?;
                let _ = writeln!(
                    out,
                    "  cteb: custody id {} custodian {}",
                    blk.cid.value, blk.custodian
                );
            }
            BlockType::PayloadIntegrity => {
                let mut blk = IntegrityBlock::default();
                index += bib::read(&buffer[index..], &mut blk, true, flags)?;
                let _ = writeln!(
                    out,
                    "  bib: cipher suite {} crc {:#x}",
                    blk.cipher_suite_id.value, blk.security_result
                );
            }
            BlockType::Payload => {
                let mut pay = PayloadBlock::default();
                let (header_len, payload) =
                    payload_block::read(&buffer[index..], &mut pay, true, flags)?;
                index += header_len + payload.len();
                let _ = write!(out, "  payload ({} bytes):", payload.len());
                for byte in payload {
                    let _ = write!(out, " {byte:02X}");
                }
                let _ = writeln!(out);
            }
            BlockType::Unrecognised(blk_type) => {
                let mut bf = sdnv::Field::new(1, 0);
                let mut blklen = sdnv::Field::default();
                let mut sf = sdnv::Flags::default();
                blklen.index = sdnv::read(&buffer[index..], &mut bf, &mut sf);
                let data_index = sdnv::read(&buffer[index..], &mut blklen, &mut sf);
                if sf.any() {
                    flags.set(sf.into());
                    return raise(flags, Error::Parse("extension block"));
                }
                let _ = writeln!(
                    out,
                    "  extension block type {blk_type:#04X} flags {:#x} length {}",
                    bf.value, blklen.value
                );
                index += data_index + blklen.value as usize;
            }
        }
    }

    Ok(out)
}
