// Copyright 2022 houseme
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::Snowflake;
use crate::clock::{Clock, SystemClock, TimeUnit};
use crate::error::{BoxDynError, Error};
use crate::layout::BitLayout;
use crate::snowflake::{Internals, SharedSnowflake};
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::{Arc, Mutex};

/// Default epoch, 2017-01-01T00:00:00Z.
pub const DEFAULT_EPOCH_MILLIS: i64 = 1_483_228_800_000;

/// Epoch of the delta-seconds layout, 2019-12-01T00:00:00Z.
pub const SECONDS_EPOCH_MILLIS: i64 = 1_575_158_400_000;

/// The default epoch as a `DateTime`.
pub fn default_epoch() -> DateTime<Utc> {
    DateTime::UNIX_EPOCH + TimeDelta::milliseconds(DEFAULT_EPOCH_MILLIS)
}

/// The epoch of the delta-seconds layout as a `DateTime`.
pub fn seconds_epoch() -> DateTime<Utc> {
    DateTime::UNIX_EPOCH + TimeDelta::milliseconds(SECONDS_EPOCH_MILLIS)
}

/// A builder for building the ['Snowflake'] generator.
///
/// [`Snowflake`]: struct.Snowflake.html
pub struct Builder<'a> {
    start_time: Option<DateTime<Utc>>,
    time_unit: TimeUnit,
    worker_id: Option<&'a dyn Fn() -> Result<u64, BoxDynError>>,
    check_worker_id: Option<&'a dyn Fn(u64) -> bool>,
    clock: Option<Box<dyn Clock>>,
    bit_len_time: u8,
    bit_len_worker_id: u8,
    bit_len_sequence: u8,
}

impl<'a> Default for Builder<'a> {
    fn default() -> Self {
        Builder::new()
    }
}

impl<'a> Builder<'a> {
    /// Construct a new builder for the build of ['Snowflake'].
    ///
    /// [`Snowflake`]: struct.Snowflake.html
    pub fn new() -> Self {
        let layout = BitLayout::default();
        Self {
            start_time: None,
            time_unit: TimeUnit::default(),
            worker_id: None,
            check_worker_id: None,
            clock: None,
            bit_len_time: layout.timestamp_bits(),
            bit_len_worker_id: layout.worker_bits(),
            bit_len_sequence: layout.sequence_bits(),
        }
    }

    /// Set the start time.
    /// If the time is set later than the current time, 'finalize' will fail.
    pub fn start_time(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = Some(start_time);
        self
    }

    /// Set the granularity of the timestamp section.
    pub fn time_unit(mut self, time_unit: TimeUnit) -> Self {
        self.time_unit = time_unit;
        self
    }

    /// Set the worker ID.
    /// If the provided closure returns an error, 'finalize' will fail.
    pub fn worker_id(mut self, worker_id: &'a dyn Fn() -> Result<u64, BoxDynError>) -> Self {
        self.worker_id = Some(worker_id);
        self
    }

    /// Set up a function to check the worker ID.
    /// If the function returns 'false', 'finalize' will fail.
    pub fn check_worker_id(mut self, check_worker_id: &'a dyn Fn(u64) -> bool) -> Self {
        self.check_worker_id = Some(check_worker_id);
        self
    }

    /// Replace the system clock.
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Box::new(clock));
        self
    }

    /// Set all three bit lengths from a layout.
    pub fn layout(self, layout: BitLayout) -> Self {
        self.bit_len_time(layout.timestamp_bits())
            .bit_len_worker_id(layout.worker_bits())
            .bit_len_sequence(layout.sequence_bits())
    }

    /// Set the bit length of the timestamp section.
    pub fn bit_len_time(mut self, bit_len_time: u8) -> Self {
        self.bit_len_time = bit_len_time;
        self
    }

    /// Set the bit length of the worker ID section.
    pub fn bit_len_worker_id(mut self, bit_len_worker_id: u8) -> Self {
        self.bit_len_worker_id = bit_len_worker_id;
        self
    }

    /// Sets the bit length of the sequence section.
    pub fn bit_len_sequence(mut self, bit_len_sequence: u8) -> Self {
        self.bit_len_sequence = bit_len_sequence;
        self
    }

    /// Finish building and create a Snowflake instance.
    /// This method will return an error if any of the configured functions return an error or if validation fails.
    pub fn finalize(self) -> Result<Snowflake, Error> {
        let layout = BitLayout::new(
            self.bit_len_time,
            self.bit_len_worker_id,
            self.bit_len_sequence,
        )?;

        let clock = self.clock.unwrap_or_else(|| Box::new(SystemClock));

        let start_time = match self.start_time {
            Some(start_time) => {
                if start_time.timestamp_millis() > clock.now_millis() {
                    return Err(Error::StartTimeAheadOfCurrentTime(start_time));
                }
                start_time
            }
            None => default_epoch(),
        };

        let worker_id_mask = layout.max_worker_id();
        let worker_id = if let Some(worker_id_fn) = self.worker_id {
            worker_id_fn().map_err(Error::WorkerIdFailed)?
        } else {
            #[cfg(feature = "ip-fallback")]
            {
                match get_id_from_ip() {
                    Some(id) => id & worker_id_mask,
                    None => return Err(Error::NoPrivateIp),
                }
            }
            #[cfg(not(feature = "ip-fallback"))]
            {
                return Err(Error::WorkerIdFailed(
                    "Worker ID not provided and `ip-fallback` feature is disabled".into(),
                ));
            }
        };

        if worker_id > worker_id_mask {
            return Err(Error::WorkerIdFailed(
                format!(
                    "Worker ID {} is greater than the max allowed value {}",
                    worker_id, worker_id_mask
                )
                .into(),
            ));
        }

        if let Some(check_worker_id) = self.check_worker_id
            && !check_worker_id(worker_id)
        {
            return Err(Error::CheckWorkerIdFailed);
        }

        let shared = Arc::new(SharedSnowflake {
            start_time: self.time_unit.from_datetime(start_time),
            time_unit: self.time_unit,
            layout,
            worker_id,
            clock,
            internals: Mutex::new(Internals::default()),
        });
        let snowflake = Snowflake::new_inner(shared);

        tracing::info!(
            worker_id,
            time_bits = layout.timestamp_bits(),
            worker_bits = layout.worker_bits(),
            sequence_bits = layout.sequence_bits(),
            time_unit = ?self.time_unit,
            start_time = %start_time,
            max_use_time = ?snowflake.max_use_time(),
            "initialized snowflake generator"
        );
        Ok(snowflake)
    }
}

/// Get the worker ID from the low bits of the private IP address (v4 or v6).
#[cfg(feature = "ip-fallback")]
fn get_id_from_ip() -> Option<u64> {
    use std::net::IpAddr;

    match crate::worker::private_ip()? {
        IpAddr::V4(ipv4) => {
            // IPv4: Use bytes 3 and 4
            let octets = ipv4.octets();
            Some(u64::from(u16::from_be_bytes([octets[2], octets[3]])))
        }
        IpAddr::V6(ipv6) => {
            // IPv6: Use the last two 16-bit segments
            let segments = ipv6.segments();
            Some(u64::from(segments[6]) << 16 | u64::from(segments[7]))
        }
    }
}
