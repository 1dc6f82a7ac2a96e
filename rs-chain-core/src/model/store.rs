use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use rand::Rng;

use serde::{Deserialize, Serialize};
use crate::chain::learner;
use crate::error::{ChainError, Result};
use crate::io::{get_filename, list_files, partition_path, read_lines, restore_partition, write_atomically, TABLE_EXTENSION};
use super::table::TransitionTable;
use super::transition::{Token, Transition};

/// Current on-disk schema version.
///
/// - 0: no file yet (or an unversioned file), migrated on open
/// - 1: `StoredTable` rows encoded with `postcard`
pub const SCHEMA_VERSION: u32 = 1;

/// Default number of learned messages between two writes of a partition.
pub const DEFAULT_FLUSH_EVERY: u32 = 16;

/// Persisted layout of one partition.
#[derive(Serialize, Deserialize, Debug)]
struct StoredTable {
	version: u32,
	rows: Vec<Transition>,
}

/// Normalizes a partition name. Channel names are case-insensitive, so
/// `#Rust` and `#rust` share one table.
pub fn partition_key(partition: &str) -> String {
	partition.to_lowercase()
}

/// An open partition: its table and where it lives on disk.
struct Partition {
	key: String,
	path: PathBuf,
	table: TransitionTable,
	/// Set when the table holds counts not yet written to disk.
	dirty: bool,
	/// Messages learned since the last successful write.
	unflushed: u32,
}

impl Partition {
	/// Opens a partition, reading its table if the file exists.
	fn open(data_dir: &Path, key: &str) -> Result<Self> {
		let path = partition_path(data_dir, key);
		let existed = path.exists();
		let stored = if existed {
			let bytes = fs::read(&path).map_err(|e| ChainError::storage(key, e))?;
			postcard::from_bytes::<StoredTable>(&bytes).map_err(|e| ChainError::storage(key, e))?
		} else {
			StoredTable { version: 0, rows: Vec::new() }
		};

		let found = stored.version;
		let stored = upgrade(key, stored)?;
		let partition = Self {
			key: key.to_owned(),
			path,
			table: TransitionTable::from_rows(stored.rows),
			// A migrated file must be written back with its new version
			dirty: existed && found != SCHEMA_VERSION,
			unflushed: 0,
		};
		log::info!("opened partition {} ({} transitions)", key, partition.table.len());
		Ok(partition)
	}

	/// Writes the table to disk if it changed since the last write.
	fn flush(&mut self) -> Result<()> {
		if !self.dirty {
			return Ok(());
		}
		let stored = StoredTable {
			version: SCHEMA_VERSION,
			rows: self.table.rows(),
		};
		let bytes = postcard::to_stdvec(&stored).map_err(|e| ChainError::storage(&self.key, e))?;
		write_atomically(&self.path, &bytes).map_err(|e| ChainError::storage(&self.key, e))?;
		self.dirty = false;
		self.unflushed = 0;
		log::debug!("flushed partition {} ({} transitions)", self.key, stored.rows.len());
		Ok(())
	}
}

/// Brings a stored table up to `SCHEMA_VERSION`, one version at a time.
fn upgrade(key: &str, mut stored: StoredTable) -> Result<StoredTable> {
	if stored.version > SCHEMA_VERSION {
		return Err(ChainError::storage(
			key,
			format!("schema version {} is newer than supported version {}", stored.version, SCHEMA_VERSION),
		));
	}
	if stored.version == 0 {
		// Unversioned rows already have the version 1 shape
		stored.version = 1;
	}
	Ok(stored)
}

/// Per-partition persistent store of transition counts.
///
/// Partitions are opened lazily on first access and cached. Every table sits
/// behind its own lock, so a read-modify-write of a count is atomic with
/// respect to other callers of the same partition, while distinct partitions
/// never contend.
///
/// Lock order is always: handle map, then partition. The handle map lock is
/// released before a partition lock is taken.
///
/// Learned messages are written in batches of `flush_every` per partition,
/// so a crash loses at most `flush_every - 1` messages of each partition.
/// `close` flushes and releases every handle; dropping the store does the same.
pub struct FrequencyStore {
	data_dir: PathBuf,
	flush_every: u32,
	handles: Mutex<HashMap<String, Arc<Mutex<Partition>>>>,
}

impl FrequencyStore {
	/// Opens a store rooted at `data_dir`, creating the directory if needed.
	pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
		let data_dir = data_dir.as_ref().to_path_buf();
		fs::create_dir_all(&data_dir)
			.map_err(|e| ChainError::storage(&data_dir.display().to_string(), e))?;
		Ok(Self {
			data_dir,
			flush_every: DEFAULT_FLUSH_EVERY,
			handles: Mutex::new(HashMap::new()),
		})
	}

	/// Sets how many learned messages a partition buffers before it is
	/// written. 1 writes after every message.
	pub fn with_flush_every(mut self, flush_every: u32) -> Self {
		self.flush_every = flush_every.max(1);
		self
	}

	pub fn data_dir(&self) -> &Path {
		&self.data_dir
	}

	pub fn flush_every(&self) -> u32 {
		self.flush_every
	}

	fn lock_handles(&self) -> Result<MutexGuard<'_, HashMap<String, Arc<Mutex<Partition>>>>> {
		self.handles
			.lock()
			.map_err(|_| ChainError::storage("*", "partition map lock poisoned"))
	}

	/// Returns the cached handle of a partition, opening it on first use.
	fn handle(&self, partition: &str) -> Result<Arc<Mutex<Partition>>> {
		let key = partition_key(partition);
		let mut handles = self.lock_handles()?;
		if let Some(handle) = handles.get(&key) {
			return Ok(Arc::clone(handle));
		}
		let handle = Arc::new(Mutex::new(Partition::open(&self.data_dir, &key)?));
		handles.insert(key, Arc::clone(&handle));
		Ok(handle)
	}

	/// Runs `f` with exclusive access to one partition.
	fn with_partition<T>(&self, partition: &str, f: impl FnOnce(&mut Partition) -> T) -> Result<T> {
		let handle = self.handle(partition)?;
		let mut guard = handle
			.lock()
			.map_err(|_| ChainError::storage(partition, "partition lock poisoned"))?;
		Ok(f(&mut *guard))
	}

	/// Records one observation of `predecessor → successor`.
	///
	/// Creates the row with a frequency of 0 if absent, then increments it.
	/// Returns the new frequency. The change is held in memory until the
	/// partition is flushed.
	pub fn record_transition(&self, partition: &str, predecessor: Token, successor: Token) -> Result<u64> {
		if !predecessor.is_valid() || !successor.is_valid() {
			return Err(ChainError::EmptyWord);
		}
		self.with_partition(partition, |p| {
			p.dirty = true;
			p.table.record(predecessor, successor)
		})
	}

	/// Samples a successor of `predecessor`, weighted by frequency.
	///
	/// `Ok(None)` means "no data": the predecessor has no recorded successor.
	pub fn sample_successor(&self, partition: &str, predecessor: &Token) -> Result<Option<Token>> {
		self.sample_successor_with(partition, predecessor, &mut rand::rng())
	}

	/// Same as [`sample_successor`](Self::sample_successor) with an explicit
	/// random source.
	pub fn sample_successor_with<R: Rng>(&self, partition: &str, predecessor: &Token, rng: &mut R) -> Result<Option<Token>> {
		self.with_partition(partition, |p| p.table.sample(predecessor, rng))
	}

	/// Current frequency of a pair, 0 if it was never observed.
	pub fn frequency(&self, partition: &str, predecessor: &Token, successor: &Token) -> Result<u64> {
		self.with_partition(partition, |p| p.table.frequency(predecessor, successor))
	}

	/// Snapshot of every row of a partition, ordered by predecessor then successor.
	pub fn transitions(&self, partition: &str) -> Result<Vec<Transition>> {
		self.with_partition(partition, |p| p.table.rows())
	}

	/// Writes a partition to disk if it has unsaved changes.
	pub fn flush(&self, partition: &str) -> Result<()> {
		self.with_partition(partition, Partition::flush)?
	}

	/// Writes every open partition to disk.
	///
	/// All partitions are attempted; the first failure is returned.
	pub fn flush_all(&self) -> Result<()> {
		let handles: Vec<Arc<Mutex<Partition>>> = self.lock_handles()?.values().cloned().collect();
		let mut first_error = None;
		for handle in handles {
			let result = match handle.lock() {
				Ok(mut partition) => partition.flush(),
				Err(_) => Err(ChainError::storage("*", "partition lock poisoned")),
			};
			if let Err(e) = result {
				log::warn!("{e}");
				first_error.get_or_insert(e);
			}
		}
		first_error.map_or(Ok(()), Err)
	}

	/// Counts one learned message and writes the partition once
	/// `flush_every` messages are pending.
	///
	/// A failed write keeps the messages pending, so the next call retries.
	pub fn message_learned(&self, partition: &str) -> Result<()> {
		let flush_every = self.flush_every;
		self.with_partition(partition, |p| {
			p.unflushed += 1;
			if p.unflushed >= flush_every {
				p.flush()
			} else {
				Ok(())
			}
		})?
	}

	/// Flushes and closes one partition. It is reopened on next access.
	pub fn retire(&self, partition: &str) -> Result<()> {
		let key = partition_key(partition);
		let handle = self.lock_handles()?.remove(&key);
		if let Some(handle) = handle {
			let mut guard = handle
				.lock()
				.map_err(|_| ChainError::storage(&key, "partition lock poisoned"))?;
			guard.flush()?;
			log::info!("retired partition {key}");
		}
		Ok(())
	}

	/// Flushes and releases every partition handle.
	///
	/// Handles are released even when a flush fails; the first failure is
	/// returned.
	pub fn close(&self) -> Result<()> {
		let result = self.flush_all();
		let released = match self.handles.lock() {
			Ok(mut handles) => handles.drain().count(),
			Err(poisoned) => poisoned.into_inner().drain().count(),
		};
		if released > 0 {
			log::info!("closed {released} partition(s)");
		}
		result
	}

	/// Names of the partitions that have a table on disk, sorted.
	///
	/// Each name opens the same partition when passed back to the store.
	/// Files whose name is not a valid encoding are skipped.
	pub fn partitions(&self) -> Result<Vec<String>> {
		let files = list_files(&self.data_dir, TABLE_EXTENSION)
			.map_err(|e| ChainError::storage(&self.data_dir.display().to_string(), e))?;
		let mut names = Vec::with_capacity(files.len());
		for file in &files {
			let stem = get_filename(file).map_err(|e| ChainError::storage(file, e))?;
			match restore_partition(&stem) {
				Some(name) => names.push(name),
				None => log::warn!("skipping table {file}: not a partition file name"),
			}
		}
		names.sort();
		Ok(names)
	}

	/// Learns every line of a plain-text corpus into a partition.
	///
	/// # Behavior
	/// - Splits lines into chunks (based on CPU cores * factor).
	/// - Spawns threads to build partial tables for each chunk.
	/// - Merges all partial tables, folds the result into the partition and
	///   flushes it.
	///
	/// Each line follows the learning rules of [`learner::transitions`].
	/// Returns the number of lines that contributed transitions.
	pub fn import_corpus<P: AsRef<Path>>(&self, partition: &str, corpus: P) -> Result<usize> {
		let lines = read_lines(corpus.as_ref()).map_err(|e| ChainError::storage(partition, e))?;
		if lines.is_empty() {
			return Ok(0);
		}

		let cpus = num_cpus::get();
		let factor = 8;
		let chunks = cpus * factor;
		let chunk_size = lines.len().div_ceil(chunks);

		let (tx, rx) = mpsc::channel();
		for chunk in lines.chunks(chunk_size) {
			let tx = tx.clone();
			let chunk: Vec<String> = chunk.to_vec();

			thread::spawn(move || {
				let mut partial = TransitionTable::new();
				let mut learned = 0;
				for line in chunk {
					let pairs = learner::transitions(&learner::tokenize(&line));
					if pairs.is_empty() {
						continue;
					}
					learned += 1;
					for (predecessor, successor) in pairs {
						partial.record(predecessor, successor);
					}
				}
				// The receiver outlives every sender, a failed send only means it gave up
				let _ = tx.send((partial, learned));
			});
		}
		drop(tx);

		let mut merged = TransitionTable::new();
		let mut learned = 0;
		for (partial, count) in rx.iter() {
			merged.merge(&partial);
			learned += count;
		}

		self.with_partition(partition, |p| {
			if !merged.is_empty() {
				p.table.merge(&merged);
				p.dirty = true;
			}
			p.flush()
		})??;

		log::info!("imported {} lines into {} ({} pairs)", learned, partition_key(partition), merged.len());
		Ok(learned)
	}
}

impl Drop for FrequencyStore {
	fn drop(&mut self) {
		if let Err(e) = self.close() {
			log::warn!("failed to flush partitions on shutdown: {e}");
		}
	}
}
