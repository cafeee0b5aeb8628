//! # dawnkv
//!
//! An embedded key-value store kept in a single append-only file:
//! - Every write is a CRC-framed record appended to the log
//! - Reads are served from an in-memory index rebuilt by replaying the log
//! - Many threads and processes can share one file through advisory locks
//! - Compaction rewrites the log with only live entries and swaps it in atomically
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Engine                               │
//! │        (re-entrant mutex, critical sections, defaults)       │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │   Journal   │ replay ─▶│    Index    │
//!   │  (Append)   │          │  (BTreeMap) │
//!   └──────┬──────┘          └─────────────┘
//!          │
//!          ▼
//!   ┌─────────────┐
//!   │  Log file   │◀── flock (shared / exclusive), rename on compaction
//!   └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use dawnkv::Engine;
//!
//! # fn main() -> dawnkv::Result<()> {
//! let db: Engine<String, i64> = Engine::builder("counters.db")
//!     .default_value(0)
//!     .open()?;
//!
//! let key = "visits".to_string();
//! let visits = db.lock(|db| {
//!     let next = db.get(&key)?.unwrap_or_default() + 1;
//!     db.set(&key, next)?;
//!     Ok(next)
//! })?;
//! assert!(visits > 0);
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod journal;
pub mod index;
pub mod lock;
pub mod serializer;
pub mod defaults;
pub mod compaction;
pub mod engine;

pub(crate) mod flusher;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{DawnError, Result};
pub use config::{Config, SyncStrategy};
pub use compaction::CompactionOutcome;
pub use defaults::DefaultValue;
pub use engine::{Engine, EngineBuilder};
pub use serializer::{Bincode, Raw, Serializer};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of dawnkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
