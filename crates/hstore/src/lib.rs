//! HStore - Alopex History Storage Engine
//!
//! An embedded, append-only time-series store for typed event samples. Each
//! local calendar day owns a record log plus two index files; events carry
//! versioned schemas that are restated in every day's log.
//!
//! # Components
//!
//! - [`format`]: on-disk records, tags and index entries
//! - [`HistoryStore`]: define, write, read and recover day file sets
//! - [`binned`]: per-bin count/mean/rms/min/max aggregation
//! - [`History`]: name based access through a configuration store
//!
//! # Example
//!
//! ```rust,ignore
//! use alopex_hstore::format::{Tag, TypeCode};
//! use alopex_hstore::store::ReadRequest;
//! use alopex_hstore::{HistoryConfig, HistoryStore};
//!
//! let mut store = HistoryStore::open(HistoryConfig::new("/data/history"))?;
//! store.define_event(1, "Temp", &[Tag::new("T", TypeCode::Float, 1)])?;
//! store.write_event(1, &21.5f32.to_le_bytes())?;
//!
//! let last_hour = store.read(&ReadRequest::new(1, "T"))?;
//! let binned = store.read_binned(&ReadRequest::new(1, "T"), 60)?;
//! ```

#![deny(missing_docs)]

pub mod binned;
pub mod config;
pub mod error;
pub mod facade;
pub mod format;
pub mod store;

pub use binned::{Bin, BinnedBuffer, BinnedResult};
pub use config::HistoryConfig;
pub use error::{FileOp, HistoryError, Result};
pub use facade::{ConfigStore, History, MemoryConfigStore, VarSpec};
pub use format::{EventDefinition, Tag, TypeCode};
pub use store::{HistoryStore, ReadRequest, Sample};
