//! durable, time-indexed batch storage
//!
//! The store keeps every durable write as its own file inside a single
//! directory. Each file is named by the tick (see `time::to_ticks`) at which
//! it was written and holds an opaque payload, in practice a JSON array of
//! `Metric`. The on-disk structure looks like this:
//!
//! ```text
//! data-dir/
//!    16000000001234567
//!    16000000301234567
//!    16000000601234567
//! ```
//!
//! Reads are by lower bound on the key and return lazy `Batch` handles: the
//! payload of a batch is only pulled off disk when the caller asks for it, so
//! a large backlog costs a directory listing, not its full size in memory.
//!
//! The directory must be solely owned by a single store. Two writes landing
//! on the same tick overwrite one another, last write wins.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::{self, Clock};

/// The payload handed back for a batch whose file disappeared between
/// listing and loading. It decodes as an empty array of metrics.
pub const EMPTY_PAYLOAD: &[u8] = b"[]";

/// The batches matched by a read, ordered by write time.
pub type Batches = BTreeMap<DateTime<Utc>, Batch>;

/// A handle to one stored batch. Loading is deferred until `load` is called.
#[derive(Debug, Clone)]
pub struct Batch {
    path: PathBuf,
}

impl Batch {
    /// Read the payload of this batch from disk.
    ///
    /// If the batch was removed after it was listed -- pruned from under the
    /// reader, say -- the result is `EMPTY_PAYLOAD`, not an error.
    pub fn load(&self) -> io::Result<Vec<u8>> {
        match fs::read(&self.path) {
            Ok(payload) => Ok(payload),
            Err(ref e) if e.kind() == ErrorKind::NotFound => {
                trace!("[storage] batch {:?} vanished before load", self.path);
                Ok(EMPTY_PAYLOAD.to_vec())
            }
            Err(e) => Err(e),
        }
    }

    /// The on-disk location of this batch.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Append-only, time-indexed storage of serialized batches.
#[derive(Clone)]
pub struct FileStorage {
    root: PathBuf,
    clock: Arc<dyn Clock>,
}

impl FileStorage {
    /// Create a `FileStorage` rooted at `root`. The directory is created on
    /// first write.
    pub fn new<P>(root: P, clock: Arc<dyn Clock>) -> FileStorage
    where
        P: AsRef<Path>,
    {
        FileStorage {
            root: root.as_ref().to_path_buf(),
            clock: clock,
        }
    }

    /// The directory this store lives in.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Durably store `payload` as a new batch keyed by the current time,
    /// returning that key.
    ///
    /// The payload is written to a hidden sibling file first and then renamed
    /// into place, so a concurrent reader never sees a partial batch.
    /// Failures are returned to the caller untouched.
    pub fn write(&self, payload: &[u8]) -> io::Result<DateTime<Utc>> {
        fs::create_dir_all(&self.root)?;
        let now = self.clock.now();
        let key = time::to_ticks(&now);
        let tmp = self.root.join(format!(".{}.tmp", key));
        let dst = self.root.join(format!("{}", key));
        {
            let mut fp = fs::File::create(&tmp)?;
            fp.write_all(payload)?;
            fp.sync_all()?;
        }
        if let Err(e) = fs::rename(&tmp, &dst) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        trace!("[storage] wrote {} bytes to {:?}", payload.len(), dst);
        Ok(time::from_ticks(key).unwrap_or(now))
    }

    /// Every batch whose key is at or after `since`.
    pub fn read(&self, since: DateTime<Utc>) -> io::Result<Batches> {
        let lower = time::to_ticks(&since);
        self.select(|ticks| lower <= ticks)
    }

    /// Every batch whose key lies between `since` and `until`, both ends
    /// included.
    pub fn read_range(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> io::Result<Batches> {
        let lower = time::to_ticks(&since);
        let upper = time::to_ticks(&until);
        self.select(|ticks| lower <= ticks && ticks <= upper)
    }

    /// Every batch in the store.
    pub fn read_all(&self) -> io::Result<Batches> {
        self.select(|_| true)
    }

    /// Delete every batch whose key is strictly before `keep_after`,
    /// returning how many were removed.
    pub fn prune(&self, keep_after: DateTime<Utc>) -> io::Result<usize> {
        let upper = time::to_ticks(&keep_after);
        let mut removed = 0;
        for (_, batch) in self.select(|ticks| ticks < upper)? {
            match fs::remove_file(&batch.path) {
                Ok(()) => removed += 1,
                Err(ref e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        debug!("[storage] pruned {} batches older than {}", removed, keep_after);
        Ok(removed)
    }

    fn select<F>(&self, in_range: F) -> io::Result<Batches>
    where
        F: Fn(i64) -> bool,
    {
        let mut batches = Batches::new();
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(ref e) if e.kind() == ErrorKind::NotFound => return Ok(batches),
            Err(e) => return Err(e),
        };
        for entry in entries {
            let entry = entry?;
            let ticks = match entry.file_name().to_str().and_then(|n| n.parse::<i64>().ok()) {
                Some(ticks) => ticks,
                None => continue,
            };
            if !in_range(ticks) {
                continue;
            }
            if let Some(key) = time::from_ticks(ticks) {
                batches.insert(key, Batch { path: entry.path() });
            }
        }
        Ok(batches)
    }
}

#[cfg(test)]
mod test {
    extern crate tempdir;

    use super::*;
    use chrono::{Duration, TimeZone};
    use time::MockClock;

    fn setup(dir: &Path) -> (Arc<MockClock>, FileStorage) {
        let clock = Arc::new(MockClock::with_time(Utc.timestamp_opt(10_000, 0).unwrap()));
        let storage = FileStorage::new(dir.join("batches"), clock.clone());
        (clock, storage)
    }

    fn payloads(batches: &Batches) -> Vec<String> {
        batches
            .values()
            .map(|b| String::from_utf8(b.load().unwrap()).unwrap())
            .collect()
    }

    #[test]
    fn write_creates_one_file() {
        let dir = tempdir::TempDir::new("metrics-collector").unwrap();
        let (_clock, storage) = setup(dir.path());

        storage.write(b"0, 1, 2").unwrap();

        let files: Vec<_> = fs::read_dir(storage.root()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn read_single_entry() {
        let dir = tempdir::TempDir::new("metrics-collector").unwrap();
        let (clock, storage) = setup(dir.path());

        let key = storage.write(b"data1").unwrap();
        assert_eq!(key, clock.now());

        let batches = storage.read_all().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(payloads(&batches), vec!["data1"]);
        assert!(batches.contains_key(&key));
    }

    #[test]
    fn read_by_time() {
        let dir = tempdir::TempDir::new("metrics-collector").unwrap();
        let (clock, storage) = setup(dir.path());

        storage.write(b"data1").unwrap();
        let break1 = clock.now() + Duration::minutes(5);
        clock.advance(Duration::minutes(10));
        storage.write(b"data2").unwrap();

        assert_eq!(storage.read_all().unwrap().len(), 2);
        assert_eq!(payloads(&storage.read(break1).unwrap()), vec!["data2"]);

        let break2 = clock.now() + Duration::minutes(5);
        clock.advance(Duration::minutes(10));
        storage.write(b"data3").unwrap();

        assert_eq!(storage.read_all().unwrap().len(), 3);
        assert_eq!(
            payloads(&storage.read_range(break1, break2).unwrap()),
            vec!["data2"]
        );
        assert_eq!(
            payloads(&storage.read(break1).unwrap()),
            vec!["data2", "data3"]
        );
    }

    #[test]
    fn read_lower_bound_is_inclusive() {
        let dir = tempdir::TempDir::new("metrics-collector").unwrap();
        let (clock, storage) = setup(dir.path());

        let key = storage.write(b"data1").unwrap();
        assert_eq!(storage.read(key).unwrap().len(), 1);
        assert_eq!(
            storage.read(key + Duration::microseconds(1)).unwrap().len(),
            0
        );
        clock.advance(Duration::seconds(1));
        assert_eq!(storage.read(key - Duration::seconds(1)).unwrap().len(), 1);
    }

    #[test]
    fn read_many_in_key_order() {
        let dir = tempdir::TempDir::new("metrics-collector").unwrap();
        let (clock, storage) = setup(dir.path());

        let mut expected = Vec::new();
        for i in 0..10 {
            let data = format!("test data {}", i);
            storage.write(data.as_bytes()).unwrap();
            expected.push(data);
            clock.advance(Duration::minutes(10));
        }
        assert_eq!(payloads(&storage.read_all().unwrap()), expected);
    }

    #[test]
    fn same_key_last_write_wins() {
        let dir = tempdir::TempDir::new("metrics-collector").unwrap();
        let (_clock, storage) = setup(dir.path());

        storage.write(b"first").unwrap();
        storage.write(b"second").unwrap();
        assert_eq!(payloads(&storage.read_all().unwrap()), vec!["second"]);
    }

    #[test]
    fn missing_directory_reads_empty() {
        let dir = tempdir::TempDir::new("metrics-collector").unwrap();
        let (_clock, storage) = setup(dir.path());

        assert!(storage.read_all().unwrap().is_empty());
        assert!(storage.read(time::epoch()).unwrap().is_empty());
        assert_eq!(storage.prune(Utc::now()).unwrap(), 0);
    }

    #[test]
    fn vanished_batch_loads_as_empty_payload() {
        let dir = tempdir::TempDir::new("metrics-collector").unwrap();
        let (_clock, storage) = setup(dir.path());

        storage.write(b"data1").unwrap();
        let batches = storage.read_all().unwrap();
        for batch in batches.values() {
            fs::remove_file(batch.path()).unwrap();
        }
        assert_eq!(payloads(&batches), vec!["[]"]);
    }

    #[test]
    fn foreign_files_are_ignored() {
        let dir = tempdir::TempDir::new("metrics-collector").unwrap();
        let (_clock, storage) = setup(dir.path());

        storage.write(b"data1").unwrap();
        fs::write(storage.root().join("README"), b"not a batch").unwrap();
        fs::write(storage.root().join(".42.tmp"), b"half written").unwrap();

        assert_eq!(payloads(&storage.read_all().unwrap()), vec!["data1"]);
        assert_eq!(storage.prune(Utc::now()).unwrap(), 1);
        assert!(storage.root().join("README").exists());
    }

    #[test]
    fn remove_old() {
        let dir = tempdir::TempDir::new("metrics-collector").unwrap();
        let (clock, storage) = setup(dir.path());

        storage.write(b"data1").unwrap();
        let break1 = clock.now() + Duration::minutes(5);
        clock.advance(Duration::minutes(10));
        storage.write(b"data2").unwrap();

        assert_eq!(storage.read_all().unwrap().len(), 2);
        assert_eq!(storage.prune(break1).unwrap(), 1);
        assert_eq!(payloads(&storage.read_all().unwrap()), vec!["data2"]);

        let break2 = clock.now() + Duration::minutes(5);
        for data in &["data3", "data4", "data5"] {
            clock.advance(Duration::minutes(10));
            storage.write(data.as_bytes()).unwrap();
        }
        clock.advance(Duration::minutes(10));

        assert_eq!(storage.read_all().unwrap().len(), 4);
        assert_eq!(storage.prune(break2).unwrap(), 1);
        assert_eq!(
            payloads(&storage.read_all().unwrap()),
            vec!["data3", "data4", "data5"]
        );
        for since in &[time::epoch(), break1, break2] {
            for key in storage.read(*since).unwrap().keys() {
                assert!(*key >= break2);
            }
        }

        assert_eq!(storage.prune(clock.now()).unwrap(), 3);
        assert!(storage.read_all().unwrap().is_empty());
    }

    #[test]
    fn prune_keeps_batch_at_boundary() {
        let dir = tempdir::TempDir::new("metrics-collector").unwrap();
        let (_clock, storage) = setup(dir.path());

        let key = storage.write(b"data1").unwrap();
        assert_eq!(storage.prune(key).unwrap(), 0);
        assert_eq!(storage.read_all().unwrap().len(), 1);
    }
}
