/// Class of service carried at bits 7–8 of the processing control flags.
#[derive(
    Debug, Default, Copy, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize,
)]
pub enum CosClass {
    Bulk,
    #[default]
    Normal,
    Expedited,
    Extended,
}

impl From<CosClass> for u64 {
    fn from(value: CosClass) -> Self {
        match value {
            CosClass::Bulk => 0,
            CosClass::Normal => 1,
            CosClass::Expedited => 2,
            CosClass::Extended => 3,
        }
    }
}

impl From<u64> for CosClass {
    fn from(value: u64) -> Self {
        match value {
            0 => CosClass::Bulk,
            1 => CosClass::Normal,
            2 => CosClass::Expedited,
            _ => CosClass::Extended,
        }
    }
}

const FRAGMENT: u64 = 1 << 0;
const ADMIN_RECORD: u64 = 1 << 1;
const NO_FRAGMENT: u64 = 1 << 2;
const CUSTODY_REQUEST: u64 = 1 << 3;
const APP_ACK_REQUEST: u64 = 1 << 5;
const COS_MASK: u64 = 0x3 << 7;
const COS_SHIFT: u64 = 7;

/// Primary block processing control flags (RFC 5050 §4.2), unpacked.
///
/// `allow_fragmentation` is the inverse of the on-wire must-not-fragment
/// bit.  Unrecognised bits round-trip through `unrecognised`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ProcessingFlags {
    pub is_fragment: bool,
    pub is_admin_record: bool,
    pub allow_fragmentation: bool,
    pub custody_requested: bool,
    pub app_ack_requested: bool,
    pub class_of_service: CosClass,
    pub unrecognised: u64,
}

impl Default for ProcessingFlags {
    fn default() -> Self {
        Self {
            is_fragment: false,
            is_admin_record: false,
            allow_fragmentation: false,
            custody_requested: false,
            app_ack_requested: false,
            class_of_service: CosClass::Normal,
            unrecognised: 0,
        }
    }
}

impl From<ProcessingFlags> for u64 {
    fn from(value: ProcessingFlags) -> Self {
        let mut pcf = value.unrecognised;
        if value.is_fragment {
            pcf |= FRAGMENT;
        }
        if value.is_admin_record {
            pcf |= ADMIN_RECORD;
        }
        if !value.allow_fragmentation {
            pcf |= NO_FRAGMENT;
        }
        if value.custody_requested {
            pcf |= CUSTODY_REQUEST;
        }
        if value.app_ack_requested {
            pcf |= APP_ACK_REQUEST;
        }
        pcf | ((u64::from(value.class_of_service) << COS_SHIFT) & COS_MASK)
    }
}

impl From<u64> for ProcessingFlags {
    fn from(value: u64) -> Self {
        Self {
            is_fragment: value & FRAGMENT != 0,
            is_admin_record: value & ADMIN_RECORD != 0,
            allow_fragmentation: value & NO_FRAGMENT == 0,
            custody_requested: value & CUSTODY_REQUEST != 0,
            app_ack_requested: value & APP_ACK_REQUEST != 0,
            class_of_service: CosClass::from((value & COS_MASK) >> COS_SHIFT),
            unrecognised: value
                & !(FRAGMENT
                    | ADMIN_RECORD
                    | NO_FRAGMENT
                    | CUSTODY_REQUEST
                    | APP_ACK_REQUEST
                    | COS_MASK),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        for pcf in 0..0x400u64 {
            assert_eq!(u64::from(ProcessingFlags::from(pcf)), pcf, "pcf {pcf:#x}");
        }
    }

    #[test]
    fn packing() {
        let flags = ProcessingFlags {
            is_fragment: true,
            custody_requested: true,
            class_of_service: CosClass::Expedited,
            ..Default::default()
        };
        // fragment | no-fragment | custody | cos=2
        assert_eq!(u64::from(flags), 0x01 | 0x04 | 0x08 | (2 << 7));
    }

    #[test]
    fn cos_clamps_high_values() {
        assert_eq!(CosClass::from(3), CosClass::Extended);
        assert_eq!(CosClass::from(7), CosClass::Extended);
    }
}
