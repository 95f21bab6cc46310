use super::*;
use thiserror::Error;

/// Anomaly flag word accumulated across engine operations.
///
/// Each bit classifies an anomaly seen while processing a bundle.  The word
/// is carried alongside every operation and remains visible to the caller
/// after the call returns, whether or not the operation also failed: some
/// bits (unreliable time, SDNV overflow during expiration arithmetic) mark
/// conditions the engine degrades through rather than errors.
#[derive(Default, Copy, Clone, PartialEq, Eq)]
pub struct Flags(u32);

impl Flags {
    pub const NONCOMPLIANT: Flags = Flags(1 << 0);
    pub const DROPPED: Flags = Flags(1 << 1);
    pub const BUNDLE_TOO_LARGE: Flags = Flags(1 << 2);
    pub const UNKNOWN_RECORD: Flags = Flags(1 << 3);
    pub const INVALID_CIPHER_SUITE: Flags = Flags(1 << 4);
    pub const INVALID_BIB_RESULT_TYPE: Flags = Flags(1 << 5);
    pub const INVALID_BIB_TARGET_TYPE: Flags = Flags(1 << 6);
    pub const FAILED_TO_PARSE: Flags = Flags(1 << 7);
    pub const API_ERROR: Flags = Flags(1 << 8);
    pub const SDNV_OVERFLOW: Flags = Flags(1 << 9);
    pub const SDNV_INCOMPLETE: Flags = Flags(1 << 10);
    pub const UNRELIABLE_TIME: Flags = Flags(1 << 11);
    pub const STORE_FAILURE: Flags = Flags(1 << 12);
    pub const FAILED_INTEGRITY_CHECK: Flags = Flags(1 << 13);
    pub const ROUTE_NEEDED: Flags = Flags(1 << 14);
    pub const INCOMPLETE: Flags = Flags(1 << 15);
    pub const DIAGNOSTIC: Flags = Flags(1 << 16);

    pub const fn empty() -> Self {
        Flags(0)
    }

    pub fn set(&mut self, other: Flags) {
        self.0 |= other.0;
    }

    pub fn contains(&self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn bits(&self) -> u32 {
        self.0
    }
}

impl From<sdnv::Flags> for Flags {
    fn from(f: sdnv::Flags) -> Self {
        let mut flags = Flags::empty();
        if f.overflow {
            flags.set(Flags::SDNV_OVERFLOW);
        }
        if f.incomplete {
            flags.set(Flags::SDNV_INCOMPLETE);
        }
        flags
    }
}

impl std::fmt::Debug for Flags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const NAMES: &[(Flags, &str)] = &[
            (Flags::NONCOMPLIANT, "NONCOMPLIANT"),
            (Flags::DROPPED, "DROPPED"),
            (Flags::BUNDLE_TOO_LARGE, "BUNDLE_TOO_LARGE"),
            (Flags::UNKNOWN_RECORD, "UNKNOWN_RECORD"),
            (Flags::INVALID_CIPHER_SUITE, "INVALID_CIPHER_SUITE"),
            (Flags::INVALID_BIB_RESULT_TYPE, "INVALID_BIB_RESULT_TYPE"),
            (Flags::INVALID_BIB_TARGET_TYPE, "INVALID_BIB_TARGET_TYPE"),
            (Flags::FAILED_TO_PARSE, "FAILED_TO_PARSE"),
            (Flags::API_ERROR, "API_ERROR"),
            (Flags::SDNV_OVERFLOW, "SDNV_OVERFLOW"),
            (Flags::SDNV_INCOMPLETE, "SDNV_INCOMPLETE"),
            (Flags::UNRELIABLE_TIME, "UNRELIABLE_TIME"),
            (Flags::STORE_FAILURE, "STORE_FAILURE"),
            (Flags::FAILED_INTEGRITY_CHECK, "FAILED_INTEGRITY_CHECK"),
            (Flags::ROUTE_NEEDED, "ROUTE_NEEDED"),
            (Flags::INCOMPLETE, "INCOMPLETE"),
            (Flags::DIAGNOSTIC, "DIAGNOSTIC"),
        ];

        let mut first = true;
        for (flag, name) in NAMES {
            if self.contains(*flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("(none)")?;
        }
        Ok(())
    }
}

/// The primary error type for the `bpv6` crate.
///
/// Every variant corresponds to one category of the anomaly flag word; see
/// [`Error::flag`].  The dispositions a well-formed bundle can produce are
/// not errors; they are the [`Reception`](bundle::Reception) variants.
#[derive(Error, Debug)]
pub enum Error {
    #[error("noncompliant bundle: {0}")]
    Noncompliant(&'static str),

    #[error("bundle dropped: {0}")]
    Dropped(&'static str),

    #[error("bundle too large ({size} > {max})")]
    BundleTooLarge { size: usize, max: usize },

    #[error("unknown administrative record type {0:#04x}")]
    UnknownRecord(u8),

    #[error("invalid BIB cipher suite id {0}")]
    InvalidCipherSuite(u64),

    #[error("invalid BIB security result type {0}")]
    InvalidBibResultType(u8),

    #[error("invalid BIB security target type {0}")]
    InvalidBibTargetType(u8),

    #[error("failed to parse {0}")]
    Parse(&'static str),

    #[error("API misuse: {0}")]
    Api(&'static str),

    #[error("failed integrity check (expected {expected:#x}, actual {actual:#x})")]
    IntegrityCheck { expected: u32, actual: u32 },

    #[error("wrong channel to process bundle ({destination}, {local})")]
    RouteNeeded { destination: u64, local: u64 },

    #[error("failed to store bundle in storage system")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error(transparent)]
    InvalidEid(#[from] eid::EidError),
}

impl Error {
    /// The flag bit this error's category sets in the anomaly word.
    pub fn flag(&self) -> Flags {
        match self {
            Error::Noncompliant(_) => Flags::NONCOMPLIANT,
            Error::Dropped(_) => Flags::DROPPED,
            Error::BundleTooLarge { .. } => Flags::BUNDLE_TOO_LARGE,
            Error::UnknownRecord(_) => Flags::UNKNOWN_RECORD,
            Error::InvalidCipherSuite(_) => Flags::INVALID_CIPHER_SUITE,
            Error::InvalidBibResultType(_) => Flags::INVALID_BIB_RESULT_TYPE,
            Error::InvalidBibTargetType(_) => Flags::INVALID_BIB_TARGET_TYPE,
            Error::Parse(_) | Error::InvalidEid(_) => Flags::FAILED_TO_PARSE,
            Error::Api(_) => Flags::API_ERROR,
            Error::IntegrityCheck { .. } => Flags::FAILED_INTEGRITY_CHECK,
            Error::RouteNeeded { .. } => Flags::ROUTE_NEEDED,
            Error::Store(_) => Flags::STORE_FAILURE,
        }
    }
}

/// Records the error's flag bit, logs it, and returns it as `Err`.
pub(crate) fn raise<T>(flags: &mut Flags, err: Error) -> Result<T, Error> {
    flags.set(err.flag());
    tracing::warn!("{err}");
    Err(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_accumulate() {
        let mut flags = Flags::default();
        assert!(flags.is_empty());
        flags.set(Flags::SDNV_OVERFLOW);
        flags.set(Flags::UNRELIABLE_TIME);
        assert!(flags.contains(Flags::SDNV_OVERFLOW));
        assert!(flags.contains(Flags::UNRELIABLE_TIME));
        assert!(!flags.contains(Flags::DROPPED));
        assert_eq!(format!("{flags:?}"), "SDNV_OVERFLOW|UNRELIABLE_TIME");
    }

    #[test]
    fn raise_sets_category_bit() {
        let mut flags = Flags::default();
        let err = raise::<()>(&mut flags, Error::Parse("primary block")).unwrap_err();
        assert!(flags.contains(Flags::FAILED_TO_PARSE));
        assert!(matches!(err, Error::Parse("primary block")));
    }
}
