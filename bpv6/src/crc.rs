use super::*;

const X25: ::crc::Crc<u16> = ::crc::Crc::<u16>::new(&::crc::CRC_16_IBM_SDLC);
const CASTAGNOLI: ::crc::Crc<u32> = ::crc::Crc::<u32>::new(&::crc::CRC_32_ISCSI);

/// The BIB cipher suites supported for payload integrity.
#[allow(non_camel_case_types)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CipherSuite {
    CRC16_X25,
    CRC32_CASTAGNOLI,
}

impl CipherSuite {
    /// Resolves an on-wire cipher suite id.
    pub fn from_id(id: u64) -> Result<Self, Error> {
        match id {
            1 => Ok(Self::CRC16_X25),
            2 => Ok(Self::CRC32_CASTAGNOLI),
            id => Err(Error::InvalidCipherSuite(id)),
        }
    }

    pub fn id(self) -> u64 {
        match self {
            Self::CRC16_X25 => 1,
            Self::CRC32_CASTAGNOLI => 2,
        }
    }

    /// Width of the security result in bytes.
    pub fn result_len(self) -> usize {
        match self {
            Self::CRC16_X25 => 2,
            Self::CRC32_CASTAGNOLI => 4,
        }
    }

    /// Length of the (result type, result length, result) compound.
    pub fn compound_len(self) -> u64 {
        match self {
            Self::CRC16_X25 => 4,
            Self::CRC32_CASTAGNOLI => 6,
        }
    }

    /// Computes the CRC over `data`; a CRC16 occupies the low bits.
    pub fn digest(self, data: &[u8]) -> u32 {
        match self {
            Self::CRC16_X25 => X25.checksum(data) as u32,
            Self::CRC32_CASTAGNOLI => CASTAGNOLI.checksum(data),
        }
    }
}
