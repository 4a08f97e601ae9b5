// Copyright 2022 houseme
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use chrono::{DateTime, Utc};
use std::sync::Arc;

/// A source of wall-clock time in milliseconds since the Unix epoch.
///
/// The generator reads time only through this trait, so a mocked clock can
/// be plugged in to exercise rollback and exhaustion paths.
pub trait Clock: Send + Sync {
    /// Returns the current time in milliseconds since 1970-01-01T00:00:00Z.
    fn now_millis(&self) -> i64;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now_millis(&self) -> i64 {
        (**self).now_millis()
    }
}

/// Granularity of the timestamp section of an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TimeUnit {
    #[default]
    Millisecond,
    /// 10 msec, as used by Sonyflake.
    TenMilliseconds,
    Second,
}

impl TimeUnit {
    /// Length of one unit in milliseconds.
    pub const fn as_millis(self) -> i64 {
        match self {
            TimeUnit::Millisecond => 1,
            TimeUnit::TenMilliseconds => 10,
            TimeUnit::Second => 1_000,
        }
    }

    /// Number of whole units between the Unix epoch and `millis`.
    pub fn from_millis(self, millis: i64) -> i64 {
        millis.div_euclid(self.as_millis())
    }

    /// Number of whole units between the Unix epoch and `time`.
    pub fn from_datetime(self, time: DateTime<Utc>) -> i64 {
        self.from_millis(time.timestamp_millis())
    }

    /// Converts a unit count back to milliseconds since the Unix epoch.
    pub fn to_millis(self, units: i64) -> i64 {
        units.saturating_mul(self.as_millis())
    }
}
