//! Checksum utilities for IodMap
//!
//! All integrity checks use a 64-bit CRC (ECMA-182 polynomial). Which
//! classes of data are protected is selected per request by an
//! [`IntegrityScope`] bitmask.

use crc::{CRC_64_ECMA_182, Crc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;

static CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_ECMA_182);

/// Compute the CRC-64 of a buffer
#[inline]
#[must_use]
pub fn compute_crc64(data: &[u8]) -> u64 {
    CRC64.checksum(data)
}

/// Quick CRC-64 verification
#[inline]
#[must_use]
pub fn verify_crc64(data: &[u8], expected: u64) -> bool {
    compute_crc64(data) == expected
}

/// Streaming CRC-64 over several slices
pub fn crc64_of_parts<'a>(parts: impl IntoIterator<Item = &'a [u8]>) -> u64 {
    let mut digest = CRC64.digest();
    for part in parts {
        digest.update(part);
    }
    digest.finalize()
}

/// Bitmask selecting which data receives checksum protection
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntegrityScope(u32);

impl IntegrityScope {
    /// No integrity checks
    pub const NONE: Self = Self(0);
    /// Checksum raw data crossing the bulk transfer channel
    pub const TRANSFER: Self = Self(0x1);
    /// Checksum data and metadata at rest in the object store
    pub const STORAGE: Self = Self(0x2);
    /// Every class of check
    pub const ALL: Self = Self(0x3);

    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits & Self::ALL.0)
    }

    #[must_use]
    pub const fn bits(&self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl BitOr for IntegrityScope {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for IntegrityScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.contains(Self::TRANSFER) {
            names.push("TRANSFER");
        }
        if self.contains(Self::STORAGE) {
            names.push("STORAGE");
        }
        if names.is_empty() {
            names.push("NONE");
        }
        write!(f, "IntegrityScope({})", names.join("|"))
    }
}

/// Checksum pair stored alongside a key-value entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvChecksum {
    pub key: u64,
    pub value: u64,
}

impl KvChecksum {
    /// Compute the pair for a key and value
    #[must_use]
    pub fn compute(key: &[u8], value: &[u8]) -> Self {
        Self {
            key: compute_crc64(key),
            value: compute_crc64(value),
        }
    }

    /// True when either side differs from `other`
    #[must_use]
    pub const fn mismatches(&self, other: &Self) -> bool {
        self.key != other.key || self.value != other.value
    }
}
