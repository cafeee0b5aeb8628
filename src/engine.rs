//! Engine Module
//!
//! The storage engine that coordinates all components.
//!
//! ## Responsibilities
//! - Apply writes to the index immediately and buffer them for the log
//! - Flush the buffer under the exclusive file lock
//! - Replay records written by other handles and processes (`sync`)
//! - Run caller-supplied critical sections (`lock`)
//! - Compact and clear the log

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::compaction::{self, CompactionOutcome};
use crate::config::Config;
use crate::defaults::DefaultValue;
use crate::error::{DawnError, Result};
use crate::flusher::{Flush, Flusher};
use crate::index::{Index, IndexEntry};
use crate::journal::{Journal, Record, Replayed};
use crate::serializer::{Bincode, Serializer};

/// An open database file
///
/// ## Concurrency Model
///
/// - **Threads**: all state sits behind one re-entrant mutex. Every public
///   method takes it for its duration, and a thread already inside `lock`
///   can call back into the engine without deadlocking.
/// - **Processes** (and other `Engine`s on the same path): coordinate
///   through advisory locks on the file. Appends and critical sections are
///   exclusive, replays are shared.
/// - **Visibility**: reads only consult the in-memory index. An instance
///   sees its own writes at once and other writers' after `sync` (which
///   `lock` and `compact` run first).
pub struct Engine<K, V> {
    inner: Arc<Inner<K, V>>,

    /// Background flush thread, if configured
    flusher: Mutex<Option<Flusher>>,
}

struct Inner<K, V> {
    /// Engine configuration
    config: Config,

    /// Path of the log file
    path: PathBuf,

    /// Key/value encoding
    serializer: Box<dyn Serializer<K, V>>,

    /// What `get` yields for missing keys
    default: RwLock<DefaultValue<K, V>>,

    /// Journal + index; `RefCell` because the mutex is re-entrant
    state: ReentrantMutex<RefCell<State<V>>>,
}

struct State<V> {
    /// `None` once closed
    journal: Option<Journal>,

    /// In-memory view of the log
    index: Index<V>,
}

impl<V> State<V> {
    fn journal(&mut self) -> Result<&mut Journal> {
        self.journal.as_mut().ok_or(DawnError::Closed)
    }
}

// =============================================================================
// Construction
// =============================================================================

/// Builder for an Engine
pub struct EngineBuilder<K, V> {
    path: PathBuf,
    config: Config,
    serializer: Box<dyn Serializer<K, V>>,
    default: DefaultValue<K, V>,
}

impl<K, V> EngineBuilder<K, V> {
    /// Start a builder for types that need a custom serializer
    pub fn with_serializer<S>(path: impl AsRef<Path>, serializer: S) -> Self
    where
        S: Serializer<K, V> + 'static,
    {
        Self {
            path: path.as_ref().to_path_buf(),
            config: Config::default(),
            serializer: Box::new(serializer),
            default: DefaultValue::None,
        }
    }

    /// Replace the serializer
    pub fn serializer<S>(mut self, serializer: S) -> Self
    where
        S: Serializer<K, V> + 'static,
    {
        self.serializer = Box::new(serializer);
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Missing keys read as `value`
    pub fn default_value(mut self, value: V) -> Self {
        self.default = DefaultValue::Value(value);
        self
    }

    /// Missing keys read as `f(key)`
    pub fn default_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&K) -> V + Send + Sync + 'static,
    {
        self.default = DefaultValue::compute(f);
        self
    }

    /// Open or create the file and replay it
    pub fn open(self) -> Result<Engine<K, V>>
    where
        K: 'static,
        V: Clone + Send + Sync + 'static,
    {
        Engine::from_builder(self)
    }
}

impl<K, V> Engine<K, V>
where
    K: Serialize,
    V: Serialize + DeserializeOwned,
{
    /// Open or create a database at `path` with bincode encoding and defaults
    pub fn open(path: impl AsRef<Path>) -> Result<Self>
    where
        K: 'static,
        V: Clone + Send + Sync + 'static,
    {
        Self::builder(path).open()
    }

    /// Builder using bincode encoding
    pub fn builder(path: impl AsRef<Path>) -> EngineBuilder<K, V> {
        EngineBuilder::with_serializer(path, Bincode)
    }
}

impl<K, V> Engine<K, V>
where
    K: 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Open the journal, replay it, and start the flusher
    ///
    /// On startup:
    /// 1. Validate config
    /// 2. Open/create the log file (header written under the exclusive lock)
    /// 3. Replay the whole file into the index
    /// 4. Spawn the background flusher if an interval is set
    fn from_builder(builder: EngineBuilder<K, V>) -> Result<Self> {
        let EngineBuilder {
            path,
            config,
            serializer,
            default,
        } = builder;

        config.validate()?;
        let journal = Journal::open(&path, config.sync_strategy)?;

        let inner = Arc::new(Inner {
            config,
            path,
            serializer,
            default: RwLock::new(default),
            state: ReentrantMutex::new(RefCell::new(State {
                journal: Some(journal),
                index: Index::new(),
            })),
        });
        inner.sync()?;

        let flusher = match inner.config.flush_interval {
            Some(interval) => {
                let target: Arc<dyn Flush> = inner.clone();
                Some(Flusher::spawn(target, interval)?)
            }
            None => None,
        };

        let engine = Self {
            inner,
            flusher: Mutex::new(flusher),
        };
        tracing::debug!(
            path = %engine.inner.path.display(),
            keys = engine.len(),
            "opened database"
        );
        Ok(engine)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Get the value for `key`
    ///
    /// A miss consults the default policy. A computed default is stored like
    /// a `set` so later reads see the same value.
    pub fn get(&self, key: &K) -> Result<Option<V>> {
        let key_bytes = self.inner.serializer.key_for(key)?;
        let guard = self.inner.state.lock();

        {
            let state = guard.borrow();
            if state.journal.is_none() {
                return Err(DawnError::Closed);
            }
            if let Some(value) = state.index.get(&key_bytes) {
                return Ok(Some(value.clone()));
            }
        }

        // Resolve without holding any borrow; the default may call back in
        let Some(value) = self.default_for(key) else {
            return Ok(None);
        };

        let record = Record::put(key_bytes, self.inner.serializer.dump(&value)?);
        self.inner
            .apply(&mut guard.borrow_mut(), record, Some(value.clone()), false)?;
        Ok(Some(value))
    }

    /// Whether `key` has a live value (defaults are not consulted)
    pub fn contains_key(&self, key: &K) -> Result<bool> {
        let key_bytes = self.inner.serializer.key_for(key)?;
        let guard = self.inner.state.lock();
        let state = guard.borrow();
        if state.journal.is_none() {
            return Err(DawnError::Closed);
        }
        Ok(state.index.contains(&key_bytes))
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let guard = self.inner.state.lock();
        let len = guard.borrow().index.len();
        len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The default policy's value for `key`, without touching the index
    pub fn default_for(&self, key: &K) -> Option<V> {
        let policy = self.inner.default.read().clone();
        policy.resolve(key)
    }

    /// Replace the default policy
    pub fn set_default(&self, default: DefaultValue<K, V>) {
        *self.inner.default.write() = default;
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Set `key` to `value`; durable after the next flush
    pub fn set(&self, key: &K, value: V) -> Result<()> {
        self.write(key, Some(value), false).map(|_| ())
    }

    /// Set `key` to `value` and flush at once
    pub fn set_flush(&self, key: &K, value: V) -> Result<()> {
        self.write(key, Some(value), true).map(|_| ())
    }

    /// Delete `key`, returning its previous value
    pub fn delete(&self, key: &K) -> Result<Option<V>> {
        self.write(key, None, false)
    }

    /// Delete `key` and flush at once
    pub fn delete_flush(&self, key: &K) -> Result<Option<V>> {
        self.write(key, None, true)
    }

    /// Set many keys
    pub fn update<I>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        self.write_batch(entries, false)
    }

    /// Set many keys, then flush once
    pub fn update_flush<I>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        self.write_batch(entries, true)
    }

    fn write(&self, key: &K, value: Option<V>, flush: bool) -> Result<Option<V>> {
        let record = self.inner.encode(key, value.as_ref())?;
        let guard = self.inner.state.lock();
        let mut state = guard.borrow_mut();
        self.inner.apply(&mut state, record, value, flush)
    }

    fn write_batch<I>(&self, entries: I, flush: bool) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        // Encode everything first so a serializer error applies nothing
        let prepared = entries
            .into_iter()
            .map(|(key, value)| -> Result<(Record, V)> {
                Ok((self.inner.encode(&key, Some(&value))?, value))
            })
            .collect::<Result<Vec<_>>>()?;

        let guard = self.inner.state.lock();
        let mut state = guard.borrow_mut();
        for (record, value) in prepared {
            self.inner.apply(&mut state, record, Some(value), false)?;
        }
        if flush {
            state.journal()?.flush()?;
        }
        Ok(())
    }

    // =========================================================================
    // Log Synchronization
    // =========================================================================

    /// Write buffered records to the log
    pub fn flush(&self) -> Result<()> {
        let guard = self.inner.state.lock();
        let mut state = guard.borrow_mut();
        state.journal()?.flush()?;
        Ok(())
    }

    /// Flush, then replay everything other writers appended since the last sync
    pub fn sync(&self) -> Result<()> {
        self.inner.sync()
    }

    /// Run `f` as a critical section across threads and processes
    ///
    /// Takes the exclusive file lock, syncs, runs `f`, and flushes what `f`
    /// wrote if it succeeded. The lock is released however `f` exits.
    /// Calls made from inside `f` (including `compact`, `clear` and nested
    /// `lock`) run under the same lock.
    pub fn lock<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Self) -> Result<R>,
    {
        let guard = self.inner.state.lock();
        let _section = CriticalSection::enter(&guard)?;
        self.inner.sync_state(&mut guard.borrow_mut())?;

        let result = f(self)?;

        // `f` may have closed the engine
        if let Some(journal) = guard.borrow_mut().journal.as_mut() {
            journal.flush()?;
        }
        Ok(result)
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Rewrite the log with only live entries
    ///
    /// Without `force` the rewrite is skipped unless the superseded share of
    /// records reaches `Config::compaction_threshold`.
    pub fn compact(&self, force: bool) -> Result<CompactionOutcome> {
        let guard = self.inner.state.lock();
        let _section = CriticalSection::enter(&guard)?;
        let mut state = guard.borrow_mut();
        self.inner.sync_state(&mut state)?;

        let State { journal, index } = &mut *state;
        let journal = journal.as_mut().ok_or(DawnError::Closed)?;
        let outcome = compaction::compact(
            journal,
            index,
            |value| self.inner.serializer.dump(value),
            force,
            self.inner.config.compaction_threshold,
        )?;
        Ok(outcome)
    }

    /// Empty the database, for every instance on this path
    pub fn clear(&self) -> Result<()> {
        let guard = self.inner.state.lock();
        let _section = CriticalSection::enter(&guard)?;
        let mut state = guard.borrow_mut();

        let State { journal, index } = &mut *state;
        journal.as_mut().ok_or(DawnError::Closed)?.clear()?;
        index.clear();

        tracing::info!(path = %self.inner.path.display(), "cleared database");
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Size of the log file in bytes
    pub fn bytesize(&self) -> Result<u64> {
        let guard = self.inner.state.lock();
        let mut state = guard.borrow_mut();
        let size = state.journal()?.size()?;
        Ok(size)
    }

    /// Records in the current log file that this instance has replayed
    pub fn logsize(&self) -> Result<u64> {
        let guard = self.inner.state.lock();
        let mut state = guard.borrow_mut();
        let records = state.journal()?.records();
        Ok(records)
    }
}

impl<K, V> Engine<K, V> {
    /// Flush pending writes and close the file
    ///
    /// Every later operation fails with `Closed`; closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        if let Some(mut flusher) = self.flusher.lock().take() {
            flusher.stop();
        }

        let guard = self.inner.state.lock();
        let mut state = guard.borrow_mut();
        let Some(journal) = state.journal.take() else {
            return Ok(());
        };
        state.index.clear();
        journal.close()?;

        tracing::debug!(path = %self.inner.path.display(), "closed database");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        let guard = self.inner.state.lock();
        let closed = guard.borrow().journal.is_none();
        closed
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }
}

impl<K, V> Drop for Engine<K, V> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(path = %self.inner.path.display(), error = %e, "failed to close database");
        }
    }
}

// =============================================================================
// Internals
// =============================================================================

impl<K, V> Inner<K, V> {
    fn encode(&self, key: &K, value: Option<&V>) -> Result<Record> {
        let key = self.serializer.key_for(key)?;
        Ok(match value {
            Some(value) => Record::put(key, self.serializer.dump(value)?),
            None => Record::delete(key),
        })
    }

    /// Buffer `record` and apply `value` to the index
    fn apply(
        &self,
        state: &mut State<V>,
        record: Record,
        value: Option<V>,
        flush: bool,
    ) -> Result<Option<V>> {
        let State { journal, index } = state;
        let journal = journal.as_mut().ok_or(DawnError::Closed)?;
        journal.append(&record)?;

        let key = match record {
            Record::Put { key, .. } | Record::Delete { key } => key,
        };
        let previous = match value {
            Some(value) => index.put(key, value),
            None => index.delete(&key),
        };

        if flush || journal.buffered_bytes() >= self.config.buffer_limit {
            journal.flush()?;
        }
        Ok(previous)
    }

    fn sync(&self) -> Result<()> {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        self.sync_state(&mut state)
    }

    /// Flush own writes, then replay the log into the index
    fn sync_state(&self, state: &mut State<V>) -> Result<()> {
        let State { journal, index } = state;
        let journal = journal.as_mut().ok_or(DawnError::Closed)?;
        journal.flush()?;

        let serializer = &self.serializer;
        let replayed = journal.replay(|event| {
            match event {
                Replayed::Reset => index.clear(),
                Replayed::Record(Record::Put { key, value }) => {
                    index.replay(key, IndexEntry::Value(serializer.load(&value)?));
                }
                Replayed::Record(Record::Delete { key }) => {
                    index.replay(key, IndexEntry::Tombstone);
                }
            }
            Ok(())
        })?;

        if replayed > 0 {
            tracing::trace!(replayed, offset = journal.read_offset(), "synced index");
        }
        Ok(())
    }
}

impl<K, V> Flush for Inner<K, V>
where
    V: Send + Sync,
{
    /// Skips the tick while another thread is using the engine
    fn flush_pending(&self) -> Result<()> {
        let Some(guard) = self.state.try_lock() else {
            return Ok(());
        };
        let mut state = guard.borrow_mut();
        match state.journal.as_mut() {
            Some(journal) => journal.flush(),
            None => Ok(()),
        }
    }
}

/// Exclusive-lock scope that is left on drop, including on panic
struct CriticalSection<'a, V> {
    state: &'a RefCell<State<V>>,
}

impl<'a, V> CriticalSection<'a, V> {
    fn enter(state: &'a RefCell<State<V>>) -> Result<Self> {
        state.borrow_mut().journal()?.hold()?;
        Ok(Self { state })
    }
}

impl<V> Drop for CriticalSection<'_, V> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.try_borrow_mut() {
            if let Some(journal) = state.journal.as_mut() {
                journal.release();
            }
        }
    }
}
