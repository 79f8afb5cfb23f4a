//! Token bytes used by the node codec.

pub const LIST_EMPTY: u8 = 0;
pub const LIST_8: u8 = 248;
pub const LIST_16: u8 = 249;
pub const BINARY_8: u8 = 252;
pub const BINARY_20: u8 = 253;
