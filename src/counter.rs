// Copyright 2022 houseme
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Short decimal business ids backed by shared counters.
//!
//! Each id type owns a decimal display band whose leading digit marks the
//! type (1 for channels, 2 for merchants, 3 for users). A namespace suffix
//! splits a counter into independent ranges; appended to the id, its digits
//! can drive downstream sharding.
//!
//! A namespace wraps around after `range` ids and starts reissuing display
//! ids from the bottom of its band. Nothing detects that reuse.

use crate::error::Error;
use crate::store::KvStore;

/// Default maximum length of a namespace suffix.
pub const DEFAULT_NAMESPACE_MAX_LEN: usize = 3;

pub const CHANNEL_ID_INCR_KEY: &str = "id:generator:channel_id_incr";
pub const MCH_ID_INCR_KEY: &str = "id:generator:mch_id_incr";
pub const UID_INCR_KEY: &str = "id:generator:uid_incr";

/// A fixed decimal range `[base, base + range)` raw counter values are
/// folded into.
///
/// `range` is at least 1 and at most `i64::MAX`, and the band never passes
/// `u64::MAX`, so folding cannot fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayBand {
    base: u64,
    range: u64,
}

impl DisplayBand {
    /// Channel ids, 10000000-19999999.
    pub const CHANNEL: DisplayBand = DisplayBand::from_parts(10_000_000, 10_000_000);
    /// Merchant ids, 20000000-29999999.
    pub const MERCHANT: DisplayBand = DisplayBand::from_parts(20_000_000, 10_000_000);
    /// User ids, 300000000-399999999.
    pub const USER: DisplayBand = DisplayBand::from_parts(300_000_000, 100_000_000);

    const fn from_parts(base: u64, range: u64) -> Self {
        Self { base, range }
    }

    pub fn new(base: u64, range: u64) -> Result<Self, Error> {
        if range == 0 || range > i64::MAX as u64 {
            return Err(Error::Parameter(format!(
                "display band range {} must be within 1..={}",
                range,
                i64::MAX
            )));
        }
        if base.checked_add(range - 1).is_none() {
            return Err(Error::Parameter(format!(
                "display band starting at {} with range {} overflows u64",
                base, range
            )));
        }
        Ok(Self::from_parts(base, range))
    }

    /// Lowest display id of the band.
    pub fn base(&self) -> u64 {
        self.base
    }

    /// Number of display ids in the band.
    pub fn range(&self) -> u64 {
        self.range
    }

    /// Maps a raw counter value into the band.
    pub fn fold(&self, raw: i64) -> u64 {
        // range <= i64::MAX and base + range - 1 <= u64::MAX
        self.base + raw.rem_euclid(self.range as i64) as u64
    }

    pub fn contains(&self, value: u64) -> bool {
        value >= self.base && value - self.base < self.range
    }
}

/// Issues namespaced ids. Every call performs one atomic increment on the
/// store; nothing is cached locally.
pub struct NamespacedCounter<S> {
    store: S,
    max_namespace_len: usize,
}

impl<S: KvStore> NamespacedCounter<S> {
    pub fn new(store: S) -> Self {
        Self::with_max_namespace_len(store, DEFAULT_NAMESPACE_MAX_LEN)
    }

    pub fn with_max_namespace_len(store: S, max_namespace_len: usize) -> Self {
        Self {
            store,
            max_namespace_len,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Issues the next id of `band` under `domain_key`.
    ///
    /// A blank `namespace` is ignored; otherwise it is trimmed, checked
    /// against the maximum length and used as an independent counter under
    /// `domain_key:namespace`. With `append` the namespace is concatenated to
    /// the decimal id.
    pub fn next(
        &self,
        domain_key: &str,
        band: DisplayBand,
        namespace: Option<&str>,
        append: bool,
    ) -> Result<String, Error> {
        let namespace = normalize(namespace);
        if let Some(ns) = namespace {
            let len = ns.chars().count();
            if len > self.max_namespace_len {
                return Err(Error::Parameter(format!(
                    "namespace `{}` is {} characters long, the limit is {}",
                    ns, len, self.max_namespace_len
                )));
            }
        }

        let key = match namespace {
            Some(ns) => format!("{}:{}", domain_key, ns),
            None => domain_key.to_owned(),
        };
        let raw = self.store.increment(&key, 1).map_err(Error::Store)?;
        let display_id = band.fold(raw);
        tracing::debug!(%key, raw, display_id, "issued namespaced id");

        match namespace {
            Some(ns) if append => Ok(format!("{}{}", display_id, ns)),
            _ => Ok(display_id.to_string()),
        }
    }
}

/// Trims `value`, mapping blank strings to `None`.
pub(crate) fn normalize(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
