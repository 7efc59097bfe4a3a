//! Per-key call deduplication.
//!
//! A [`Group`] makes sure at most one unit of work runs for a given key at a
//! time. Callers that arrive while a call is in flight wait for it and share
//! its value or failure instead of starting the work again. Nothing is kept
//! once the call has finished.
//!
//! ```
//! use std::{thread, time::Duration};
//!
//! use singleflight::Group;
//!
//! let group: Group<&str, u32, std::io::Error> = Group::new();
//! let handles: Vec<_> = (0..3)
//!     .map(|_| {
//!         let group = group.clone();
//!         thread::spawn(move || {
//!             group.execute("answer", || {
//!                 thread::sleep(Duration::from_millis(50));
//!                 Ok(42)
//!             })
//!         })
//!     })
//!     .collect();
//!
//! for handle in handles {
//!     assert_eq!(*handle.join().unwrap().unwrap(), 42);
//! }
//! ```
#[macro_use]
extern crate log;

mod call;
mod config;
mod error;
mod group;

pub use config::{GroupConfig, MAX_SHARD_AMOUNT};
pub use error::{Error, Result};
pub use group::Group;

pub use tokio_util::sync::CancellationToken;
