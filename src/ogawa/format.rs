//! Ogawa format constants and child-offset helpers.

/// Magic bytes at the start of an Ogawa file.
pub const OGAWA_MAGIC: &[u8; 5] = b"Ogawa";

/// Header layout: magic, frozen flag, u16 version, u64 root group position.
pub const HEADER_SIZE: usize = 16;
pub const FROZEN_OFFSET: usize = 5;
pub const VERSION_OFFSET: usize = 6;
pub const ROOT_POS_OFFSET: usize = 8;

/// Frozen flag of a finished archive; 0 while a writer still has it open.
pub const FROZEN_FLAG: u8 = 0xFF;

/// Bit marking a child offset as data. Groups have it clear.
pub const TYPE_FLAG_MASK: u64 = 1 << 63;

#[inline]
pub const fn is_group_offset(offset: u64) -> bool {
    offset & TYPE_FLAG_MASK == 0
}

#[inline]
pub const fn is_data_offset(offset: u64) -> bool {
    !is_group_offset(offset)
}

/// File position a child offset points at.
#[inline]
pub const fn extract_offset(offset: u64) -> u64 {
    offset & !TYPE_FLAG_MASK
}
