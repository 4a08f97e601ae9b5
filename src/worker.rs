// Copyright 2022 houseme
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Store-coordinated worker id assignment.
//!
//! Every process derives an identity from its address, port and deployment
//! mode, and maps it to a worker id through the shared store exactly once at
//! startup. A restarted process with the same identity gets its old id back.

use crate::error::Error;
use crate::layout::BitLayout;
use crate::store::{KEY_PREFIX, KvStore};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;

/// Global counter handing out fresh worker ids.
pub const WORKER_ID_INCR_KEY: &str = "id:generator:mac_num_incr";

/// The network identity of a generator process.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkerIdentity {
    host: IpAddr,
    port: u16,
    containerized: bool,
}

impl WorkerIdentity {
    /// Creates an identity. Loopback addresses are rejected, since every
    /// machine would share them.
    pub fn new(host: IpAddr, port: u16, containerized: bool) -> Result<Self, Error> {
        if host.is_loopback() {
            return Err(Error::LoopbackAddress(host));
        }
        Ok(Self {
            host,
            port,
            containerized,
        })
    }

    /// Discovers the identity of this process.
    ///
    /// Inside a container the address is ephemeral, so `HOST_IP`/`HOST_PORT`
    /// (the host side of the port mapping) win when set. Otherwise the first
    /// private address of an up interface is used together with `port`.
    pub fn detect(port: u16) -> Result<Self, Error> {
        let containerized = is_containerized();
        if containerized {
            if let Some((host, host_port)) = host_mapping_from_env() {
                return Self::new(host, host_port, true);
            }
        }
        let host = private_ip().ok_or(Error::NoPrivateIp)?;
        Self::new(host, port, containerized)
    }

    pub fn host(&self) -> IpAddr {
        self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_containerized(&self) -> bool {
        self.containerized
    }

    /// The store key recording this identity's worker id.
    pub fn key(&self) -> String {
        format!("{}ip.{}", KEY_PREFIX, self)
    }
}

impl fmt::Display for WorkerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = if self.containerized {
            "container"
        } else {
            "actual"
        };
        write!(f, "{}.{}.{}", self.host, self.port, mode)
    }
}

/// Resolves worker ids against the shared store.
pub struct WorkerIdAllocator<S> {
    store: S,
    layout: BitLayout,
}

impl<S: KvStore> WorkerIdAllocator<S> {
    pub fn new(store: S, layout: BitLayout) -> Self {
        Self { store, layout }
    }

    /// Returns the worker id of `identity`, assigning a fresh one on first
    /// sight.
    ///
    /// Fails with [`Error::WorkerIdExhausted`] once the global counter passes
    /// the largest id the layout can hold. The process must not serve
    /// traffic after any error here.
    pub fn allocate(&self, identity: &WorkerIdentity) -> Result<u64, Error> {
        let key = identity.key();
        let max = self.layout.max_worker_id();

        if let Some(worker_id) = self.store.get(&key).map_err(Error::Store)? {
            let worker_id = self.check_capacity(worker_id)?;
            tracing::info!(%key, worker_id, "reusing worker id");
            return Ok(worker_id);
        }

        let candidate = self
            .store
            .increment(WORKER_ID_INCR_KEY, 1)
            .map_err(Error::Store)?;
        let worker_id = self.check_capacity(candidate)?;
        self.store.set(&key, candidate).map_err(Error::Store)?;
        tracing::info!(%key, worker_id, max, "allocated worker id");
        Ok(worker_id)
    }

    fn check_capacity(&self, candidate: i64) -> Result<u64, Error> {
        let max = self.layout.max_worker_id();
        match u64::try_from(candidate) {
            Ok(worker_id) if worker_id <= max => Ok(worker_id),
            _ => {
                tracing::error!(candidate, max, "worker id space exhausted");
                Err(Error::WorkerIdExhausted { candidate, max })
            }
        }
    }
}

fn is_containerized() -> bool {
    Path::new("/.dockerenv").exists() || std::env::var_os("KUBERNETES_SERVICE_HOST").is_some()
}

fn host_mapping_from_env() -> Option<(IpAddr, u16)> {
    let host = std::env::var("HOST_IP").ok()?.trim().parse().ok()?;
    let port = std::env::var("HOST_PORT").ok()?.trim().parse().ok()?;
    Some((host, port))
}

/// The first private address of an up, non-loopback interface, IPv4 first.
pub(crate) fn private_ip() -> Option<IpAddr> {
    let interfaces = pnet_datalink::interfaces();
    let interfaces = &interfaces;
    let candidates = move || {
        interfaces
            .iter()
            .filter(|iface| iface.is_up() && !iface.is_loopback() && !iface.ips.is_empty())
            .flat_map(|iface| iface.ips.iter())
            .map(|network| network.ip())
    };

    candidates()
        .find(|ip| matches!(ip, IpAddr::V4(ipv4) if is_private_ipv4(ipv4)))
        .or_else(|| candidates().find(|ip| matches!(ip, IpAddr::V6(ipv6) if is_private_ipv6(ipv6))))
}

fn is_private_ipv4(ip: &Ipv4Addr) -> bool {
    let octets = ip.octets();
    matches!(octets[0], 10)
        || (octets[0] == 172 && (16..=31).contains(&octets[1]))
        || (octets[0] == 192 && octets[1] == 168)
}

fn is_private_ipv6(ip: &Ipv6Addr) -> bool {
    // fc00::/7 (Unique Local Address)
    // fe80::/10 (Link-Local Address)
    (ip.segments()[0] & 0xfe00) == 0xfc00 || (ip.segments()[0] & 0xffc0) == 0xfe80
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxDynError;
    use crate::store::MemoryStore;

    fn identity(host: &str, port: u16) -> WorkerIdentity {
        WorkerIdentity::new(host.parse().unwrap(), port, false).unwrap()
    }

    #[test]
    fn test_identity_key() {
        let actual = identity("10.1.6.48", 8080);
        assert_eq!(actual.key(), "id:generator:ip.10.1.6.48.8080.actual");

        let container = WorkerIdentity::new("10.1.6.48".parse().unwrap(), 8080, true).unwrap();
        assert_eq!(container.key(), "id:generator:ip.10.1.6.48.8080.container");
    }

    #[test]
    fn test_loopback_rejected() {
        assert!(matches!(
            WorkerIdentity::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 80, false),
            Err(Error::LoopbackAddress(_))
        ));
        assert!(matches!(
            WorkerIdentity::new(IpAddr::V6(Ipv6Addr::LOCALHOST), 80, false),
            Err(Error::LoopbackAddress(_))
        ));
    }

    #[test]
    fn test_same_identity_same_worker_id() -> Result<(), BoxDynError> {
        let store = MemoryStore::new();
        let allocator = WorkerIdAllocator::new(&store, BitLayout::MILLIS);
        let first = allocator.allocate(&identity("10.0.0.1", 8080))?;
        let again = allocator.allocate(&identity("10.0.0.1", 8080))?;
        assert_eq!(first, again);
        assert_eq!(store.get(WORKER_ID_INCR_KEY)?, Some(1));
        Ok(())
    }

    #[test]
    fn test_different_identities_different_worker_ids() -> Result<(), BoxDynError> {
        let store = MemoryStore::new();
        let allocator = WorkerIdAllocator::new(&store, BitLayout::MILLIS);
        let a = allocator.allocate(&identity("10.0.0.1", 8080))?;
        let b = allocator.allocate(&identity("10.0.0.1", 8081))?;
        let c = allocator.allocate(&identity("10.0.0.2", 8080))?;
        let d = allocator.allocate(&WorkerIdentity::new("10.0.0.1".parse()?, 8080, true)?)?;
        let ids = [a, b, c, d];
        for (i, x) in ids.iter().enumerate() {
            for y in &ids[i + 1..] {
                assert_ne!(x, y);
            }
        }
        Ok(())
    }

    #[test]
    fn test_restart_reuses_record() -> Result<(), BoxDynError> {
        let store = MemoryStore::new();
        let id = WorkerIdAllocator::new(&store, BitLayout::MILLIS)
            .allocate(&identity("192.168.1.20", 9000))?;
        // A new allocator stands in for the restarted process.
        let restarted = WorkerIdAllocator::new(&store, BitLayout::MILLIS)
            .allocate(&identity("192.168.1.20", 9000))?;
        assert_eq!(id, restarted);
        Ok(())
    }

    #[test]
    fn test_worker_id_exhausted() -> Result<(), BoxDynError> {
        let store = MemoryStore::new();
        let layout = BitLayout::MILLIS;
        store.set(WORKER_ID_INCR_KEY, layout.max_worker_id() as i64 - 1)?;
        let allocator = WorkerIdAllocator::new(&store, layout);

        assert_eq!(
            allocator.allocate(&identity("10.0.0.1", 1))?,
            layout.max_worker_id()
        );
        let err = allocator.allocate(&identity("10.0.0.2", 1)).unwrap_err();
        assert!(matches!(
            err,
            Error::WorkerIdExhausted { candidate: 1024, max: 1023 }
        ));
        assert!(err.is_fatal());
        // No mapping is recorded for the rejected identity.
        assert_eq!(store.get(&identity("10.0.0.2", 1).key())?, None);
        Ok(())
    }

    #[test]
    fn test_stale_record_outside_layout() -> Result<(), BoxDynError> {
        let store = MemoryStore::new();
        let id = identity("10.0.0.9", 7000);
        store.set(&id.key(), 5_000)?;
        let allocator = WorkerIdAllocator::new(&store, BitLayout::MILLIS);
        assert!(matches!(
            allocator.allocate(&id),
            Err(Error::WorkerIdExhausted { candidate: 5_000, .. })
        ));
        Ok(())
    }

    #[test]
    fn test_private_ranges() {
        assert!(is_private_ipv4(&"10.1.2.3".parse().unwrap()));
        assert!(is_private_ipv4(&"172.20.0.1".parse().unwrap()));
        assert!(is_private_ipv4(&"192.168.0.1".parse().unwrap()));
        assert!(!is_private_ipv4(&"172.32.0.1".parse().unwrap()));
        assert!(!is_private_ipv4(&"8.8.8.8".parse().unwrap()));
        assert!(is_private_ipv6(&"fd00::1".parse().unwrap()));
        assert!(is_private_ipv6(&"fe80::1".parse().unwrap()));
        assert!(!is_private_ipv6(&"2001:db8::1".parse().unwrap()));
    }
}
