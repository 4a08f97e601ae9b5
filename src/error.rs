// Copyright 2022 houseme
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use chrono::{DateTime, Utc};
use std::error::Error as StdError;
use std::net::IpAddr;
use thiserror::Error;

/// Convenience type alias for boxed errors crossing the crate boundary
/// (worker id closures, shared store backends).
pub type BoxDynError = Box<dyn StdError + 'static + Send + Sync>;

/// The error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    #[error("start_time `{0}` is ahead of current time")]
    StartTimeAheadOfCurrentTime(DateTime<Utc>),
    #[error("worker_id returned an error: {0}")]
    WorkerIdFailed(#[source] BoxDynError),
    #[error("check_worker_id returned false")]
    CheckWorkerIdFailed,
    #[error("worker id {candidate} exceeds the max allowed value {max}, worker id space exhausted")]
    WorkerIdExhausted { candidate: i64, max: u64 },
    #[error("`{0}` is a loopback address and cannot identify a worker")]
    LoopbackAddress(IpAddr),
    #[error("could not find any private ip address")]
    NoPrivateIp,
    #[error("clock moved backwards, refusing to generate id (last: {last}, now: {now})")]
    ClockMovedBackwards { last: i64, now: i64 },
    #[error("timestamp bits exhausted: delta {delta} is over the limit {max}")]
    TimestampExhausted { delta: i64, max: u64 },
    #[error("invalid parameter: {0}")]
    Parameter(String),
    #[error("shared store returned an error: {0}")]
    Store(#[source] BoxDynError),
    #[error("mutex is poisoned (i.e. a panic happened while it was locked)")]
    MutexPoisoned,
    #[error(
        "invalid bit length configuration: sign(1) + time({0}) + worker({1}) + sequence({2}) must be 64"
    )]
    InvalidBitLength(u8, u8, u8),
}

impl Error {
    /// Returns `true` for conditions that will not resolve by retrying.
    ///
    /// Only [`Error::Parameter`] is recoverable: the caller can fix the
    /// request and try again.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Parameter(_))
    }
}
