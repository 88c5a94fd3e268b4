//! Wrapping 32-bit frame identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier assigned to each encoded frame in send order.
///
/// Frame ids wrap around at `u32::MAX`, so ordering is only meaningful between
/// ids less than 2^31 apart and is computed from the signed difference. The
/// type deliberately does not implement `Ord`.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameId(u32);

impl FrameId {
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u32 {
        self.0
    }

    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    pub const fn prev(self) -> Self {
        Self(self.0.wrapping_sub(1))
    }

    pub const fn wrapping_add(self, n: u32) -> Self {
        Self(self.0.wrapping_add(n))
    }

    /// Signed distance from `other` to `self`.
    ///
    /// Positive when `self` was assigned after `other`.
    pub const fn distance_from(self, other: FrameId) -> i32 {
        self.0.wrapping_sub(other.0) as i32
    }

    pub const fn is_newer_than(self, other: FrameId) -> bool {
        self.distance_from(other) > 0
    }

    pub const fn is_older_than(self, other: FrameId) -> bool {
        self.distance_from(other) < 0
    }
}

impl From<u32> for FrameId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<FrameId> for u32 {
    fn from(id: FrameId) -> Self {
        id.0
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
