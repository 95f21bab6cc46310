/// BPv6 block type codes.  The primary block has no type byte; the payload
/// and extension block codes are the canonical assignments used by the
/// BPv6 community (CTEB from the custody transfer enhancement draft, BIB
/// from bundle security).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BlockType {
    Payload,
    CustodyTransfer,
    PayloadIntegrity,
    Unrecognised(u8),
}

impl From<BlockType> for u8 {
    fn from(value: BlockType) -> Self {
        match value {
            BlockType::Payload => 0x01,
            BlockType::CustodyTransfer => 0x0A,
            BlockType::PayloadIntegrity => 0x0D,
            BlockType::Unrecognised(v) => v,
        }
    }
}

impl From<u8> for BlockType {
    fn from(value: u8) -> Self {
        match value {
            0x01 => BlockType::Payload,
            0x0A => BlockType::CustodyTransfer,
            0x0D => BlockType::PayloadIntegrity,
            value => BlockType::Unrecognised(value),
        }
    }
}
