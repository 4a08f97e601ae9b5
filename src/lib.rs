//! A distributed unique ID generator inspired by [Twitter's Snowflake].
//!
//! Ids are 64-bit, time ordered, and packed as sign / timestamp delta /
//! worker id / sequence with configurable widths. Worker ids are handed out
//! once per process through a shared key-value store, so the hot path never
//! leaves the process. The same store backs short namespaced business ids
//! (channel, merchant and user numbers).
//!
//! ## Quickstart
//!
//! Add the following to your `Cargo.toml`:
//! ```toml
//! [dependencies]
//! snowflake_idgen = "0.1"
//! ```
//!
//! Use the library like this:
//!
//! ```
//! use snowflake_idgen::Snowflake;
//!
//! let sf = Snowflake::builder().worker_id(&|| Ok(1)).finalize().unwrap();
//! let next_id = sf.next_id().unwrap();
//! println!("{}", next_id);
//! ```
//!
//! ## Concurrent use
//!
//! Snowflake is threadSafe. `clone` it before moving to another thread:
//! ```
//! use snowflake_idgen::Snowflake;
//! use std::thread;
//!
//! let sf = Snowflake::builder().worker_id(&|| Ok(1)).finalize().unwrap();
//!
//! let mut children = Vec::new();
//! for _ in 0..10 {
//!     let thread_sf = sf.clone();
//!     children.push(thread::spawn(move || {
//!         println!("{}", thread_sf.next_id().unwrap());
//!     }));
//! }
//!
//! for child in children {
//!     child.join().unwrap();
//! }
//! ```
//!
//! ## Store-coordinated workers and business ids
//!
//! ```
//! use snowflake_idgen::{Config, IdGeneration, MemoryStore, WorkerIdentity};
//!
//! let identity = WorkerIdentity::new("10.1.6.48".parse().unwrap(), 8080, false).unwrap();
//! let ids = IdGeneration::bootstrap(MemoryStore::new(), &identity, &Config::default()).unwrap();
//!
//! let order_no = ids.gen_order_no(Some("AB"), Some("001")).unwrap();
//! assert!(order_no.starts_with("AB") && order_no.ends_with("001"));
//!
//! let mch_id = ids.gen_mch_id(Some("123"), true).unwrap();
//! assert_eq!(mch_id, "20000001123");
//! ```
//!
//! [Twitter's Snowflake]: https://blog.twitter.com/2010/announcing-snowflake

mod builder;
mod clock;
mod config;
mod counter;
mod error;
mod facade;
mod layout;
mod snowflake;
mod store;
mod worker;

pub use crate::snowflake::*;
pub use builder::*;
pub use clock::*;
pub use config::*;
pub use counter::{
    CHANNEL_ID_INCR_KEY, DEFAULT_NAMESPACE_MAX_LEN, DisplayBand, MCH_ID_INCR_KEY,
    NamespacedCounter, UID_INCR_KEY,
};
pub use error::*;
pub use facade::*;
pub use layout::*;
pub use store::*;
pub use worker::{WORKER_ID_INCR_KEY, WorkerIdAllocator, WorkerIdentity};
