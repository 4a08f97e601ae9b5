// Copyright 2022 houseme
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Bit layout of a Snowflake id.
//!
//! ```text
//! +------+-----------------+-----------+----------+
//! | sign | timestamp delta | worker id | sequence |
//! +------+-----------------+-----------+----------+
//!   1bit   timestamp_bits    worker_bits  sequence_bits
//! ```
//!
//! The sign bit is always 0, so every id is a non-negative `i64` as well.

use crate::clock::TimeUnit;
use crate::error::Error;
use chrono::{DateTime, Utc};

/// Total width of an id.
pub const TOTAL_BITS: u8 = 64;
/// Width of the sign section, always zero.
pub const SIGN_BITS: u8 = 1;

/// Bit widths of the sections of an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BitLayout {
    timestamp_bits: u8,
    worker_bits: u8,
    sequence_bits: u8,
}

impl Default for BitLayout {
    fn default() -> Self {
        BitLayout::MILLIS
    }
}

impl BitLayout {
    /// 41 bits of milliseconds, 10 bits of worker id, 12 bits of sequence.
    pub const MILLIS: BitLayout = BitLayout::from_parts(41, 10, 12);
    /// 29 bits of seconds (about 17 years), 21 bits of worker id, 13 bits of
    /// sequence (8191 ids per second per worker).
    pub const SECONDS: BitLayout = BitLayout::from_parts(29, 21, 13);
    /// A wide timestamp with a 256 worker space and a 32 id sequence.
    pub const COMPACT: BitLayout = BitLayout::from_parts(50, 8, 5);

    pub(crate) const fn from_parts(timestamp_bits: u8, worker_bits: u8, sequence_bits: u8) -> Self {
        Self {
            timestamp_bits,
            worker_bits,
            sequence_bits,
        }
    }

    /// Creates a layout, checking that the sections fill exactly 64 bits.
    pub fn new(timestamp_bits: u8, worker_bits: u8, sequence_bits: u8) -> Result<Self, Error> {
        let total = u16::from(SIGN_BITS)
            + u16::from(timestamp_bits)
            + u16::from(worker_bits)
            + u16::from(sequence_bits);
        if total != u16::from(TOTAL_BITS) || timestamp_bits == 0 {
            return Err(Error::InvalidBitLength(
                timestamp_bits,
                worker_bits,
                sequence_bits,
            ));
        }
        Ok(Self::from_parts(timestamp_bits, worker_bits, sequence_bits))
    }

    /// Re-checks a layout that did not come through [`BitLayout::new`], such
    /// as one read from a configuration file.
    pub fn validate(&self) -> Result<Self, Error> {
        Self::new(self.timestamp_bits, self.worker_bits, self.sequence_bits)
    }

    pub fn timestamp_bits(&self) -> u8 {
        self.timestamp_bits
    }

    pub fn worker_bits(&self) -> u8 {
        self.worker_bits
    }

    pub fn sequence_bits(&self) -> u8 {
        self.sequence_bits
    }

    /// Largest timestamp delta that fits; bounds the usable lifetime.
    pub fn max_timestamp_delta(&self) -> u64 {
        mask(self.timestamp_bits)
    }

    pub fn max_worker_id(&self) -> u64 {
        mask(self.worker_bits)
    }

    pub fn max_sequence(&self) -> u64 {
        mask(self.sequence_bits)
    }

    fn timestamp_shift(&self) -> u8 {
        self.worker_bits + self.sequence_bits
    }

    /// Packs the three sections into an id.
    ///
    /// Values wider than their section are masked; callers validate ranges.
    pub fn encode(&self, timestamp_delta: u64, worker_id: u64, sequence: u64) -> u64 {
        (timestamp_delta & self.max_timestamp_delta()) << self.timestamp_shift()
            | (worker_id & self.max_worker_id()) << self.sequence_bits
            | (sequence & self.max_sequence())
    }

    /// Break an id up into its parts.
    pub fn decode(&self, id: u64) -> DecomposedSnowflake {
        DecomposedSnowflake {
            id,
            msb: id >> (TOTAL_BITS - 1),
            time: (id >> self.timestamp_shift()) & self.max_timestamp_delta(),
            worker_id: (id >> self.sequence_bits) & self.max_worker_id(),
            sequence: id & self.max_sequence(),
        }
    }

    /// The last instant representable with this layout from `epoch`.
    pub fn max_use_time(&self, epoch: DateTime<Utc>, unit: TimeUnit) -> Option<DateTime<Utc>> {
        let max_units = i64::try_from(self.max_timestamp_delta()).ok()?;
        let millis = epoch
            .timestamp_millis()
            .checked_add(unit.to_millis(max_units))?;
        DateTime::from_timestamp_millis(millis)
    }
}

fn mask(bits: u8) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// DecomposedSnowflake is the parts of a Snowflake ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecomposedSnowflake {
    pub id: u64,
    pub msb: u64,
    /// Timestamp delta from the epoch, in the generator's time unit.
    pub time: u64,
    pub worker_id: u64,
    pub sequence: u64,
}

impl DecomposedSnowflake {
    /// Returns the parts as a `(time, worker_id, sequence)` tuple.
    pub fn parts(&self) -> (u64, u64, u64) {
        (self.time, self.worker_id, self.sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_presets_fill_64_bits() {
        for layout in [BitLayout::MILLIS, BitLayout::SECONDS, BitLayout::COMPACT] {
            let rebuilt = BitLayout::new(
                layout.timestamp_bits(),
                layout.worker_bits(),
                layout.sequence_bits(),
            )
            .unwrap();
            assert_eq!(rebuilt, layout);
        }
    }

    #[test]
    fn test_invalid_bit_length() {
        assert!(matches!(
            BitLayout::new(41, 10, 13),
            Err(Error::InvalidBitLength(41, 10, 13))
        ));
        assert!(matches!(
            BitLayout::new(0, 50, 13),
            Err(Error::InvalidBitLength(..))
        ));
    }

    #[test]
    fn test_round_trip_at_extremes() {
        for layout in [
            BitLayout::MILLIS,
            BitLayout::SECONDS,
            BitLayout::COMPACT,
            BitLayout::new(62, 0, 1).unwrap(),
            BitLayout::new(1, 31, 31).unwrap(),
        ] {
            let ts = [0, 1, layout.max_timestamp_delta() / 2, layout.max_timestamp_delta()];
            let ws = [0, layout.max_worker_id() / 3, layout.max_worker_id()];
            let ss = [0, 1, layout.max_sequence()];
            for &t in &ts {
                for &w in &ws {
                    for &s in &ss {
                        let id = layout.encode(t, w, s);
                        let parts = layout.decode(id);
                        assert_eq!(parts.parts(), (t, w, s), "layout {:?}", layout);
                        assert_eq!(parts.msb, 0);
                        assert!(i64::try_from(id).is_ok());
                    }
                }
            }
        }
    }

    #[test]
    fn test_encode_matches_shift_formula() {
        let layout = BitLayout::MILLIS;
        let id = layout.encode(5, 3, 7);
        assert_eq!(id, (5 << 22) | (3 << 12) | 7);
    }

    #[test]
    fn test_ordering_follows_time_then_sequence() {
        let layout = BitLayout::SECONDS;
        let a = layout.encode(100, layout.max_worker_id(), layout.max_sequence());
        let b = layout.encode(101, 0, 0);
        assert!(a < b);
        assert!(layout.encode(100, 4, 1) < layout.encode(100, 4, 2));
    }

    #[test]
    fn test_max_use_time() {
        let epoch = Utc.with_ymd_and_hms(2019, 12, 1, 0, 0, 0).unwrap();
        let max = BitLayout::SECONDS
            .max_use_time(epoch, TimeUnit::Second)
            .unwrap();
        // 2^29 - 1 seconds is a little over 17 years.
        assert_eq!(max.timestamp() - epoch.timestamp(), (1 << 29) - 1);
        assert!(max > Utc.with_ymd_and_hms(2036, 12, 1, 0, 0, 0).unwrap());
    }
}
