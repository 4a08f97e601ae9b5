// Copyright 2022 houseme
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::builder::{Builder, default_epoch, seconds_epoch};
use crate::clock::TimeUnit;
use crate::counter::DEFAULT_NAMESPACE_MAX_LEN;
use crate::layout::BitLayout;
use chrono::{DateTime, Utc};

/// Default maximum length of order number prefixes and suffixes.
pub const DEFAULT_ORDER_NO_AFFIX_MAX_LEN: usize = 3;

/// Startup configuration of an [`IdGeneration`] context.
///
/// With the `serde` feature it can be deserialized from any format; missing
/// fields take their defaults.
///
/// [`IdGeneration`]: crate::IdGeneration
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    pub epoch: DateTime<Utc>,
    pub layout: BitLayout,
    pub time_unit: TimeUnit,
    pub order_no_prefix_max_len: usize,
    pub order_no_suffix_max_len: usize,
    pub namespace_max_len: usize,
}

impl Default for Config {
    /// Millisecond ids from 2017-01-01T00:00:00Z.
    fn default() -> Self {
        Self {
            epoch: default_epoch(),
            layout: BitLayout::MILLIS,
            time_unit: TimeUnit::Millisecond,
            order_no_prefix_max_len: DEFAULT_ORDER_NO_AFFIX_MAX_LEN,
            order_no_suffix_max_len: DEFAULT_ORDER_NO_AFFIX_MAX_LEN,
            namespace_max_len: DEFAULT_NAMESPACE_MAX_LEN,
        }
    }
}

impl Config {
    /// Delta-second ids (29/21/13 bits) from 2019-12-01T00:00:00Z.
    pub fn seconds() -> Self {
        Self {
            epoch: seconds_epoch(),
            layout: BitLayout::SECONDS,
            time_unit: TimeUnit::Second,
            ..Self::default()
        }
    }

    /// A generator builder carrying the epoch, layout and time unit.
    pub fn builder<'a>(&self) -> Builder<'a> {
        Builder::new()
            .start_time(self.epoch)
            .layout(self.layout)
            .time_unit(self.time_unit)
    }
}
