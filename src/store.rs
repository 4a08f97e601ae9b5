// Copyright 2022 houseme
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::error::{BoxDynError, Error};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Key prefix shared by every key this crate writes.
pub const KEY_PREFIX: &str = "id:generator:";

/// The shared key-value store used for worker id coordination and
/// namespaced counters.
///
/// Implementations are expected to be backed by a store shared between all
/// processes (e.g. Redis `GET`/`SET`/`INCRBY`). `increment` must be atomic.
pub trait KvStore: Send + Sync {
    /// Reads an integer value.
    fn get(&self, key: &str) -> Result<Option<i64>, BoxDynError>;

    /// Writes an integer value.
    fn set(&self, key: &str, value: i64) -> Result<(), BoxDynError>;

    /// Atomically adds `delta` and returns the new value. A missing key
    /// starts at 0.
    fn increment(&self, key: &str, delta: i64) -> Result<i64, BoxDynError>;
}

impl<S: KvStore + ?Sized> KvStore for &S {
    fn get(&self, key: &str) -> Result<Option<i64>, BoxDynError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: i64) -> Result<(), BoxDynError> {
        (**self).set(key, value)
    }

    fn increment(&self, key: &str, delta: i64) -> Result<i64, BoxDynError> {
        (**self).increment(key, delta)
    }
}

impl<S: KvStore + ?Sized> KvStore for Arc<S> {
    fn get(&self, key: &str) -> Result<Option<i64>, BoxDynError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: i64) -> Result<(), BoxDynError> {
        (**self).set(key, value)
    }

    fn increment(&self, key: &str, delta: i64) -> Result<i64, BoxDynError> {
        (**self).increment(key, delta)
    }
}

/// An in-process store.
///
/// Shares state between clones only, so it coordinates generators inside one
/// process; use a networked store across processes.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    values: Arc<Mutex<HashMap<String, i64>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held.
    pub fn len(&self) -> usize {
        self.values
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<i64>, BoxDynError> {
        let values = self.values.lock().map_err(|_| Error::MutexPoisoned)?;
        Ok(values.get(key).copied())
    }

    fn set(&self, key: &str, value: i64) -> Result<(), BoxDynError> {
        let mut values = self.values.lock().map_err(|_| Error::MutexPoisoned)?;
        values.insert(key.to_owned(), value);
        Ok(())
    }

    fn increment(&self, key: &str, delta: i64) -> Result<i64, BoxDynError> {
        let mut values = self.values.lock().map_err(|_| Error::MutexPoisoned)?;
        let value = values.entry(key.to_owned()).or_insert(0);
        *value = value
            .checked_add(delta)
            .ok_or_else(|| format!("increment of `{}` overflows", key))?;
        Ok(*value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_increment_starts_at_zero() -> Result<(), BoxDynError> {
        let store = MemoryStore::new();
        assert_eq!(store.get("k")?, None);
        assert_eq!(store.increment("k", 1)?, 1);
        assert_eq!(store.increment("k", 5)?, 6);
        assert_eq!(store.get("k")?, Some(6));
        Ok(())
    }

    #[test]
    fn test_set_overwrites() -> Result<(), BoxDynError> {
        let store = MemoryStore::new();
        store.set("k", 10)?;
        store.set("k", 3)?;
        assert_eq!(store.get("k")?, Some(3));
        assert_eq!(store.len(), 1);
        Ok(())
    }

    #[test]
    fn test_len_survives_poisoned_lock() -> Result<(), BoxDynError> {
        let store = MemoryStore::new();
        store.set("a", 1)?;
        store.set("b", 2)?;
        let poisoner = store.clone();
        let result = thread::spawn(move || {
            let _guard = poisoner.values.lock().unwrap();
            panic!("poison the store");
        })
        .join();
        assert!(result.is_err());
        assert!(store.values.is_poisoned());
        assert_eq!(store.len(), 2);
        assert!(!store.is_empty());
        Ok(())
    }

    #[test]
    fn test_increment_overflow_is_an_error() -> Result<(), BoxDynError> {
        let store = MemoryStore::new();
        store.set("k", i64::MAX)?;
        assert!(store.increment("k", 1).is_err());
        assert_eq!(store.get("k")?, Some(i64::MAX));
        Ok(())
    }

    #[test]
    fn test_concurrent_increment_is_atomic() {
        let store = MemoryStore::new();
        let children: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || {
                    for _ in 0..1_000 {
                        store.increment("k", 1).unwrap();
                    }
                })
            })
            .collect();
        for child in children {
            child.join().unwrap();
        }
        assert_eq!(store.get("k").unwrap(), Some(8_000));
    }
}
