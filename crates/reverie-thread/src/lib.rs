//! Conversation tree reconstruction for Reverie.
//!
//! [`ThreadBuilder`] turns a flat list of entries linked by parent ids into
//! an ordered list of [`ThreadNode`]s, walking depth-first, breadth-first,
//! or whichever suits the thread's shape.
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use reverie_store::{Entry, EntryId};
//! use reverie_thread::{ThreadBuilder, ThreadConfig, TraversalMode};
//!
//! let at = |secs| Utc.timestamp_opt(secs, 0).unwrap();
//! let entries = vec![
//!     Entry::new("1", None, at(1)),
//!     Entry::new("2", Some(EntryId::from("1")), at(2)),
//! ];
//!
//! let nodes = ThreadBuilder::new(ThreadConfig::default()).build(&entries, Some(TraversalMode::Dfs));
//! assert_eq!(nodes[1].depth, 1);
//! ```

pub mod adaptive;
mod builder;
mod config;
mod index;
mod node;

pub use adaptive::ThreadShape;
pub use builder::ThreadBuilder;
pub use config::{AdaptiveThresholds, ThreadConfig, TraversalMode};
pub use node::{BuildObserver, BuildStats, ThreadNode};
