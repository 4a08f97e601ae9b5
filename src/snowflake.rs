// Copyright 2022 houseme
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::builder::Builder;
use crate::clock::{Clock, TimeUnit};
use crate::error::*;
use crate::layout::{BitLayout, DecomposedSnowflake};
use chrono::{DateTime, Utc};
use std::{
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

/// Yields before the rollover wait starts sleeping.
const SPIN_YIELDS: u32 = 16;
/// Upper bound of a single backoff sleep.
const MAX_BACKOFF: Duration = Duration::from_millis(1);

/// Internals of Snowflake.
/// This struct is not exposed to the public.
#[derive(Debug)]
pub(crate) struct Internals {
    /// Last issued timestamp delta, -1 before the first id.
    pub(crate) elapsed_time: i64,
    pub(crate) sequence: u64,
}

impl Default for Internals {
    fn default() -> Self {
        Self {
            elapsed_time: -1,
            sequence: 0,
        }
    }
}

/// SharedSnowflake is shared between Snowflake instances.
/// This struct is not exposed to the public.
pub(crate) struct SharedSnowflake {
    /// Epoch in time units.
    pub(crate) start_time: i64,
    pub(crate) time_unit: TimeUnit,
    pub(crate) layout: BitLayout,
    pub(crate) worker_id: u64,
    pub(crate) clock: Box<dyn Clock>,
    pub(crate) internals: Mutex<Internals>,
}

/// Snowflake is a distributed unique ID generator.
/// It is thread-safe and can be cloned to be used in multiple threads.
///
/// Every clone shares one state, so ids from all clones are strictly
/// increasing in issue order. Uniqueness across processes holds as long as
/// no two live generators share a worker id.
pub struct Snowflake(pub(crate) Arc<SharedSnowflake>);

impl Snowflake {
    /// Create a new Snowflake with the default configuration.
    /// For custom configuration see [`builder`].
    ///
    /// [`builder`]: struct.Snowflake.html#method.builder
    pub fn new() -> Result<Self, Error> {
        Builder::new().finalize()
    }

    /// Create a new [`Builder`] to construct a Snowflake.
    ///
    /// [`Builder`]: struct.Builder.html
    pub fn builder<'a>() -> Builder<'a> {
        Builder::new()
    }

    pub(crate) fn new_inner(shared: Arc<SharedSnowflake>) -> Self {
        Self(shared)
    }

    /// Generate the next unique id.
    ///
    /// Fails with [`Error::ClockMovedBackwards`] if the clock reads earlier
    /// than the last issued timestamp, and with [`Error::TimestampExhausted`]
    /// once the timestamp section overflows. Neither is retried.
    ///
    /// When the sequence of the current time unit is used up the call blocks
    /// until the clock reaches the next unit.
    pub fn next_id(&self) -> Result<u64, Error> {
        let mut internals = self.0.internals.lock().map_err(|_| Error::MutexPoisoned)?;

        let mut current = self.current_elapsed_time()?;
        if current < internals.elapsed_time || current < 0 {
            tracing::warn!(
                last = internals.elapsed_time,
                now = current,
                "clock moved backwards, refusing to generate id"
            );
            return Err(Error::ClockMovedBackwards {
                last: internals.elapsed_time,
                now: current,
            });
        }

        // State is only written once the new (time, sequence) pair is final.
        let mut sequence = 0;
        if current == internals.elapsed_time {
            sequence = (internals.sequence + 1) & self.0.layout.max_sequence();
            if sequence == 0 {
                current = self.wait_next_time(internals.elapsed_time)?;
            }
        }
        internals.elapsed_time = current;
        internals.sequence = sequence;

        Ok(self
            .0
            .layout
            .encode(current as u64, self.0.worker_id, sequence))
    }

    /// Reads the clock as a delta from the epoch, in time units.
    fn current_elapsed_time(&self) -> Result<i64, Error> {
        let now = self.0.time_unit.from_millis(self.0.clock.now_millis());
        let delta = now - self.0.start_time;
        let max = self.0.layout.max_timestamp_delta();
        if delta > 0 && delta as u64 > max {
            tracing::error!(delta, max, "timestamp bits exhausted, refusing to generate id");
            return Err(Error::TimestampExhausted { delta, max });
        }
        Ok(delta)
    }

    /// Blocks until the clock passes `last`, yielding first and then sleeping
    /// with a doubling backoff capped at [`MAX_BACKOFF`].
    fn wait_next_time(&self, last: i64) -> Result<i64, Error> {
        let mut attempts = 0u32;
        let mut backoff = Duration::from_micros(10);
        loop {
            let current = self.current_elapsed_time()?;
            if current > last {
                return Ok(current);
            }
            if current < last {
                tracing::warn!(last, now = current, "clock moved backwards while waiting");
                return Err(Error::ClockMovedBackwards { last, now: current });
            }
            if attempts < SPIN_YIELDS {
                attempts += 1;
                thread::yield_now();
            } else {
                tracing::trace!(?backoff, "sequence exhausted, waiting for next time unit");
                thread::sleep(backoff);
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }
    }

    /// The worker id embedded in every id of this generator.
    pub fn worker_id(&self) -> u64 {
        self.0.worker_id
    }

    pub fn layout(&self) -> BitLayout {
        self.0.layout
    }

    pub fn time_unit(&self) -> TimeUnit {
        self.0.time_unit
    }

    /// The configured epoch.
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.0.time_unit.to_millis(self.0.start_time))
    }

    /// The last instant this generator can represent.
    pub fn max_use_time(&self) -> Option<DateTime<Utc>> {
        self.0
            .layout
            .max_use_time(self.start_time()?, self.0.time_unit)
    }

    /// Break a Snowflake ID up into its parts.
    pub fn decompose(&self, id: u64) -> DecomposedSnowflake {
        self.0.layout.decode(id)
    }

    /// The instant encoded in `id`, truncated to the time unit.
    pub fn timestamp_of(&self, id: u64) -> Option<DateTime<Utc>> {
        let time = i64::try_from(self.decompose(id).time).ok()?;
        let units = self.0.start_time.checked_add(time)?;
        DateTime::from_timestamp_millis(self.0.time_unit.to_millis(units))
    }
}

/// Returns a new `Snowflake` referencing the same state as `self`.
/// This is used for concurrent use.
impl Clone for Snowflake {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl std::fmt::Debug for Snowflake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snowflake")
            .field("start_time", &self.0.start_time)
            .field("time_unit", &self.0.time_unit)
            .field("layout", &self.0.layout)
            .field("worker_id", &self.0.worker_id)
            .finish_non_exhaustive()
    }
}
