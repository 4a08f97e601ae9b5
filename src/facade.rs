// Copyright 2022 houseme
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::config::Config;
use crate::counter::{
    CHANNEL_ID_INCR_KEY, DisplayBand, MCH_ID_INCR_KEY, NamespacedCounter, UID_INCR_KEY, normalize,
};
use crate::error::Error;
use crate::snowflake::Snowflake;
use crate::store::KvStore;
use crate::worker::{WorkerIdAllocator, WorkerIdentity};
use chrono::{DateTime, Utc};

/// The id generation context of one process.
///
/// Owns the process's [`Snowflake`] and the client of the shared store.
/// Unique ids and order numbers never touch the store; channel, merchant and
/// user ids increment a store counter on every call.
pub struct IdGeneration<S> {
    snowflake: Snowflake,
    counter: NamespacedCounter<S>,
    order_no_prefix_max_len: usize,
    order_no_suffix_max_len: usize,
}

/// A unique id broken into its fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedId {
    pub id: u64,
    pub timestamp: Option<DateTime<Utc>>,
    pub worker_id: u64,
    pub sequence: u64,
    /// Significant bits of the id.
    pub id_bits: u32,
}

impl<S: KvStore> IdGeneration<S> {
    /// Resolves this process's worker id through the store and builds the
    /// generator.
    ///
    /// Must complete before any id is served; an error here is fatal.
    pub fn bootstrap(store: S, identity: &WorkerIdentity, config: &Config) -> Result<Self, Error> {
        let layout = config.layout.validate()?;
        let worker_id = WorkerIdAllocator::new(&store, layout).allocate(identity)?;
        let snowflake = config.builder().worker_id(&|| Ok(worker_id)).finalize()?;
        Ok(Self::from_parts(store, snowflake, config))
    }

    /// Wraps an already built generator.
    pub fn from_parts(store: S, snowflake: Snowflake, config: &Config) -> Self {
        Self {
            snowflake,
            counter: NamespacedCounter::with_max_namespace_len(store, config.namespace_max_len),
            order_no_prefix_max_len: config.order_no_prefix_max_len,
            order_no_suffix_max_len: config.order_no_suffix_max_len,
        }
    }

    pub fn snowflake(&self) -> &Snowflake {
        &self.snowflake
    }

    pub fn store(&self) -> &S {
        self.counter.store()
    }

    /// A time-ordered id, unique across all workers.
    pub fn generate_unique_id(&self) -> Result<u64, Error> {
        self.snowflake.next_id()
    }

    /// An order number: `prefix + unique id + suffix`.
    ///
    /// Blank affixes are dropped, others are trimmed and must not exceed
    /// their configured maximum length.
    pub fn gen_order_no(&self, prefix: Option<&str>, suffix: Option<&str>) -> Result<String, Error> {
        let prefix = normalize(prefix).unwrap_or_default();
        let suffix = normalize(suffix).unwrap_or_default();
        check_len("order number prefix", prefix, self.order_no_prefix_max_len)?;
        check_len("order number suffix", suffix, self.order_no_suffix_max_len)?;

        let id = self.generate_unique_id()?;
        Ok(format!("{}{}{}", prefix, id, suffix))
    }

    /// An order number with only a suffix.
    pub fn gen_order_no_with_suffix(&self, suffix: Option<&str>) -> Result<String, Error> {
        self.gen_order_no(None, suffix)
    }

    /// An 8 digit channel id in 10000000-19999999.
    pub fn gen_channel_id(&self) -> Result<String, Error> {
        self.counter
            .next(CHANNEL_ID_INCR_KEY, DisplayBand::CHANNEL, None, false)
    }

    /// A merchant id in 20000000-29999999, counted per `suffix` namespace.
    /// With `append_suffix` the suffix is appended, giving 8 to 11 digits.
    pub fn gen_mch_id(&self, suffix: Option<&str>, append_suffix: bool) -> Result<String, Error> {
        self.counter
            .next(MCH_ID_INCR_KEY, DisplayBand::MERCHANT, suffix, append_suffix)
    }

    /// A merchant id with `suffix` appended.
    pub fn gen_mch_id_with_suffix(&self, suffix: Option<&str>) -> Result<String, Error> {
        self.gen_mch_id(suffix, true)
    }

    /// A user id in 300000000-399999999, counted per `suffix` namespace, with
    /// the suffix appended (9 to 12 digits).
    pub fn gen_uid(&self, suffix: Option<&str>) -> Result<String, Error> {
        self.counter
            .next(UID_INCR_KEY, DisplayBand::USER, suffix, true)
    }

    /// Breaks a unique id of this generator into its fields.
    pub fn parse_id(&self, id: u64) -> ParsedId {
        let parts = self.snowflake.decompose(id);
        ParsedId {
            id,
            timestamp: self.snowflake.timestamp_of(id),
            worker_id: parts.worker_id,
            sequence: parts.sequence,
            id_bits: u64::BITS - id.leading_zeros(),
        }
    }
}

fn check_len(what: &str, value: &str, max: usize) -> Result<(), Error> {
    let len = value.chars().count();
    if len > max {
        return Err(Error::Parameter(format!(
            "{} `{}` is {} characters long, the limit is {}",
            what, value, len, max
        )));
    }
    Ok(())
}
