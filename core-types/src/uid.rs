// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Deterministic 128-bit identifiers for committed allocations.

use std::{fmt, str::FromStr};

use blake3::Hasher;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub const UID_LEN: usize = 16;

/// Digest of (page, rect, proof hash). Unique as long as each proof hash settles once.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AllocationUid([u8; UID_LEN]);

impl AllocationUid {
    pub fn derive(page: u16, x: u32, y: u32, w: u32, h: u32, proof_hash: &str) -> Self {
        let mut builder = UidBuilder::new(b"allocation_uid.v1");
        builder
            .write_u16(page)
            .write_u32(x)
            .write_u32(y)
            .write_u32(w)
            .write_u32(h)
            .write_str(proof_hash);
        Self(builder.finish())
    }

    pub fn from_bytes(bytes: [u8; UID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; UID_LEN] {
        &self.0
    }
}

impl fmt::Display for AllocationUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseUidError;

impl fmt::Display for ParseUidError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected {} hex characters", UID_LEN * 2)
    }
}

impl std::error::Error for ParseUidError {}

impl FromStr for AllocationUid {
    type Err = ParseUidError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let raw = value.as_bytes();
        if raw.len() != UID_LEN * 2 {
            return Err(ParseUidError);
        }
        let mut bytes = [0u8; UID_LEN];
        for (idx, pair) in raw.chunks_exact(2).enumerate() {
            let hi = hex_val(pair[0]).ok_or(ParseUidError)?;
            let lo = hex_val(pair[1]).ok_or(ParseUidError)?;
            bytes[idx] = (hi << 4) | lo;
        }
        Ok(Self(bytes))
    }
}

fn hex_val(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

impl Serialize for AllocationUid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AllocationUid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

struct UidBuilder {
    hasher: Hasher,
}

impl UidBuilder {
    fn new(domain: &[u8]) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(&(domain.len() as u32).to_le_bytes());
        hasher.update(domain);
        Self { hasher }
    }

    fn write_str(&mut self, value: &str) -> &mut Self {
        self.hasher.update(&(value.len() as u32).to_le_bytes());
        self.hasher.update(value.as_bytes());
        self
    }

    fn write_u16(&mut self, value: u16) -> &mut Self {
        self.hasher.update(&value.to_le_bytes());
        self
    }

    fn write_u32(&mut self, value: u32) -> &mut Self {
        self.hasher.update(&value.to_le_bytes());
        self
    }

    fn finish(&self) -> [u8; UID_LEN] {
        let hash = self.hasher.finalize();
        let mut bytes = [0u8; UID_LEN];
        bytes.copy_from_slice(&hash.as_bytes()[..UID_LEN]);
        bytes
    }
}
