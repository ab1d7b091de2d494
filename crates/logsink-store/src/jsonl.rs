// ABOUTME: Append-only JSONL file store holding one serialized LogEntry per line.
// ABOUTME: Queries scan the file linearly; deletes copy survivors to a temp file and rename it over the original.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use logsink_core::{LogEntry, MatchCriteria};

use crate::store::{LogStore, StoreError, run_blocking};

/// A JSONL-backed log store. All four operations run under one lock, so an
/// append can never land in a file that a concurrent delete is replacing.
pub struct JsonlStore {
    inner: Arc<Mutex<JsonlFile>>,
    io_timeout: Duration,
}

/// The file path plus the lazily opened append handle.
struct JsonlFile {
    path: PathBuf,
    writer: Option<File>,
}

impl JsonlStore {
    /// Create a store for `path`. Nothing is opened until the first operation.
    pub fn new(path: PathBuf, io_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(JsonlFile { path, writer: None })),
            io_timeout,
        }
    }

    /// Returns the path to the underlying JSONL file.
    pub fn path(&self) -> Result<PathBuf, StoreError> {
        Ok(lock(&self.inner)?.path.clone())
    }
}

#[async_trait]
impl LogStore for JsonlStore {
    async fn add(&self, entry: LogEntry) -> Result<(), StoreError> {
        let inner = Arc::clone(&self.inner);
        run_blocking(self.io_timeout, move || lock(&inner)?.append(&entry)).await
    }

    async fn find(&self, criteria: &MatchCriteria) -> Result<Vec<LogEntry>, StoreError> {
        let inner = Arc::clone(&self.inner);
        let criteria = criteria.clone();
        run_blocking(self.io_timeout, move || lock(&inner)?.scan(&criteria)).await
    }

    async fn remove(&self, criteria: &MatchCriteria) -> Result<usize, StoreError> {
        let inner = Arc::clone(&self.inner);
        let criteria = criteria.clone();
        run_blocking(self.io_timeout, move || lock(&inner)?.compact(&criteria)).await
    }

    async fn reset(&self) -> Result<(), StoreError> {
        let inner = Arc::clone(&self.inner);
        run_blocking(self.io_timeout, move || lock(&inner)?.truncate()).await
    }
}

fn lock(inner: &Mutex<JsonlFile>) -> Result<MutexGuard<'_, JsonlFile>, StoreError> {
    inner.lock().map_err(|_| StoreError::Poisoned)
}

impl JsonlFile {
    /// Append one entry as a JSON line and fsync it. The handle is opened on
    /// first use and kept for later appends; a failed write discards it.
    fn append(&mut self, entry: &LogEntry) -> Result<(), StoreError> {
        let json = serde_json::to_string(entry)?;

        let mut file = match self.writer.take() {
            Some(file) => file,
            None => self.open_writer()?,
        };
        writeln!(file, "{}", json)?;
        file.sync_all()?;

        self.writer = Some(file);
        Ok(())
    }

    fn open_writer(&self) -> io::Result<File> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(&self.path)
    }

    /// Open the file for reading. A file that was never written reads as empty.
    fn open_reader(&self) -> io::Result<Option<BufReader<File>>> {
        match File::open(&self.path) {
            Ok(file) => Ok(Some(BufReader::new(file))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Return every parseable entry matching `criteria`, in file order.
    /// Blank lines are ignored; lines that are not a valid entry (bad JSON,
    /// unknown level, invalid UTF-8) are logged and skipped.
    fn scan(&self, criteria: &MatchCriteria) -> Result<Vec<LogEntry>, StoreError> {
        let Some(mut reader) = self.open_reader()? else {
            return Ok(Vec::new());
        };

        let mut found = Vec::new();
        let mut line = Vec::new();
        let mut number = 0;
        while read_raw_line(&mut reader, &mut line)? {
            number += 1;
            if is_blank(&line) {
                continue;
            }
            match serde_json::from_slice::<LogEntry>(&line) {
                Ok(entry) if criteria.matches(&entry) => found.push(entry),
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!("skipping malformed line {} in {}: {}", number, self.path.display(), e);
                }
            }
        }

        Ok(found)
    }

    /// Remove matching entries by copying every other line into a temp file
    /// and renaming it over the original. On any failure the original is left
    /// untouched and the temp file is deleted.
    fn compact(&mut self, criteria: &MatchCriteria) -> Result<usize, StoreError> {
        let Some(reader) = self.open_reader()? else {
            return Ok(0);
        };
        self.rewrite(reader, criteria)
    }

    /// Copy the lines of `reader` that do not match `criteria` into
    /// `<path>.tmp`, then rename it over the file. Surviving lines are written
    /// back byte for byte, blank and unparseable ones included; only a missing
    /// final newline is added.
    fn rewrite<R: BufRead>(&mut self, mut reader: R, criteria: &MatchCriteria) -> Result<usize, StoreError> {
        let (tmp, file) = TempFile::create(temp_path(&self.path))?;
        let mut out = BufWriter::new(file);
        let mut removed = 0;
        let mut line = Vec::new();

        while read_raw_line(&mut reader, &mut line)? {
            // Unparseable lines never match, so they survive the rewrite.
            let is_match = serde_json::from_slice::<LogEntry>(&line)
                .map(|entry| criteria.matches(&entry))
                .unwrap_or(false);
            if is_match {
                removed += 1;
            } else {
                out.write_all(&line)?;
                out.write_all(b"\n")?;
            }
        }

        if removed == 0 {
            return Ok(0);
        }

        let file = out.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        drop(file);

        // The cached handle points at the inode about to be replaced.
        self.writer = None;
        tmp.commit(&self.path)?;
        sync_parent_dir(&self.path);

        Ok(removed)
    }

    /// Drop the append handle and delete the file.
    fn truncate(&mut self) -> Result<(), StoreError> {
        self.writer = None;
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Read the next line into `buf` as raw bytes, without its trailing newline.
/// Returns false at end of file.
fn read_raw_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<bool> {
    buf.clear();
    if reader.read_until(b'\n', buf)? == 0 {
        return Ok(false);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
    }
    Ok(true)
}

fn is_blank(line: &[u8]) -> bool {
    line.iter().all(u8::is_ascii_whitespace)
}

/// `<path>.tmp`, next to the original so the rename stays on one filesystem.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// Best-effort fsync of the parent directory so the rename is durable.
fn sync_parent_dir(path: &Path) {
    if let Some(parent) = path.parent()
        && let Ok(dir) = File::open(parent)
    {
        let _ = dir.sync_all();
    }
}

/// A temp file that deletes itself on drop unless it has been renamed into
/// place with [`TempFile::commit`].
struct TempFile {
    path: PathBuf,
    committed: bool,
}

impl TempFile {
    /// Create or truncate the file at `path`, returning the guard and the
    /// write handle.
    fn create(path: PathBuf) -> io::Result<(Self, File)> {
        let file = File::create(&path)?;
        Ok((
            Self {
                path,
                committed: false,
            },
            file,
        ))
    }

    /// Atomically rename over `target`. The write handle must be closed first.
    fn commit(mut self, target: &Path) -> io::Result<()> {
        fs::rename(&self.path, target)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Err(e) = fs::remove_file(&self.path)
            && e.kind() != io::ErrorKind::NotFound
        {
            tracing::warn!("failed to remove temp file {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DEFAULT_IO_TIMEOUT;
    use std::io::Read;
    use logsink_core::LogLevel;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> JsonlStore {
        JsonlStore::new(dir.path().join("logs.jsonl"), DEFAULT_IO_TIMEOUT)
    }

    fn six_entries() -> Vec<LogEntry> {
        vec![
            LogEntry::new(LogLevel::Info, "tservice1", "message1").with_labels(["label1"]).with_created(1),
            LogEntry::new(LogLevel::Info, "tservice1", "message2").with_labels(["label1"]).with_created(2),
            LogEntry::new(LogLevel::Debug, "tservice2", "message1").with_labels(["label1"]).with_created(3),
            LogEntry::new(LogLevel::Warn, "tservice2", "message2").with_labels(["label1"]).with_created(4),
            LogEntry::new(LogLevel::Error, "tservice1", "message1").with_labels(["label1"]).with_created(5),
            LogEntry::new(LogLevel::Trace, "tservice2", "message2").with_labels(["label2"]).with_created(6),
        ]
    }

    async fn populated(dir: &TempDir) -> JsonlStore {
        let store = store_in(dir);
        for entry in six_entries() {
            store.add(entry).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn add_and_find_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let entry = LogEntry::new(LogLevel::Warn, "svc", "disk \"low\"\nsecond line")
            .with_labels(["disk", "storage"])
            .with_created(1_700_000_000_123);

        store.add(entry.clone()).await.unwrap();

        let found = store.find(&MatchCriteria::default()).await.unwrap();
        assert_eq!(found, vec![entry]);
    }

    #[tokio::test]
    async fn find_on_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        assert!(store.find(&MatchCriteria::default()).await.unwrap().is_empty());
        assert_eq!(store.remove(&MatchCriteria::default()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn add_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("deeper").join("logs.jsonl");
        let store = JsonlStore::new(path.clone(), DEFAULT_IO_TIMEOUT);

        store.add(LogEntry::new(LogLevel::Info, "s", "m")).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn find_skips_malformed_and_blank_lines() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let entry = LogEntry::new(LogLevel::Info, "svc", "kept").with_created(9);
        store.add(entry.clone()).await.unwrap();

        let path = store.path().unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"logLevel":"NONE","message":"bad level"}}"#).unwrap();
        write!(file, r#"{{"logLevel":"INFO","mess"#).unwrap();
        drop(file);

        let found = store.find(&MatchCriteria::default()).await.unwrap();
        assert_eq!(found, vec![entry]);
    }

    #[tokio::test]
    async fn scenario_keywords_and_labels() {
        let dir = TempDir::new().unwrap();
        let store = populated(&dir).await;

        let by_keyword = MatchCriteria {
            keywords: vec!["1".into()],
            ..Default::default()
        };
        assert_eq!(store.find(&by_keyword).await.unwrap().len(), 3);

        let by_label = MatchCriteria {
            labels: vec!["label2".into()],
            ..Default::default()
        };
        assert_eq!(store.find(&by_label).await.unwrap().len(), 1);

        let remove_label1 = MatchCriteria {
            labels: vec!["label1".into()],
            ..Default::default()
        };
        assert_eq!(store.remove(&remove_label1).await.unwrap(), 5);
        assert_eq!(store.find(&MatchCriteria::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn find_preserves_file_order() {
        let dir = TempDir::new().unwrap();
        let store = populated(&dir).await;

        let created: Vec<i64> = store
            .find(&MatchCriteria::default())
            .await
            .unwrap()
            .iter()
            .map(|e| e.created)
            .collect();
        assert_eq!(created, vec![1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn find_uses_inclusive_time_bounds() {
        let dir = TempDir::new().unwrap();
        let store = populated(&dir).await;

        let window = MatchCriteria {
            start: 2,
            end: 4,
            ..Default::default()
        };
        assert_eq!(store.find(&window).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn remove_is_exact() {
        let dir = TempDir::new().unwrap();
        let store = populated(&dir).await;
        let criteria = MatchCriteria {
            origin_services: vec!["tservice2".into()],
            ..Default::default()
        };

        let removed = store.remove(&criteria).await.unwrap();
        assert_eq!(removed, 3);

        let rest = store.find(&MatchCriteria::default()).await.unwrap();
        assert_eq!(rest.len(), 3);
        assert!(rest.iter().all(|e| !criteria.matches(e)));
    }

    #[tokio::test]
    async fn remove_keeps_unparseable_lines_and_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let store = populated(&dir).await;
        let path = store.path().unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "not json").unwrap();
        drop(file);

        let removed = store.remove(&MatchCriteria::default()).await.unwrap();
        assert_eq!(removed, 6);

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "not json\n");
        assert!(!temp_path(&path).exists());
    }

    #[tokio::test]
    async fn add_after_remove_writes_to_replaced_file() {
        let dir = TempDir::new().unwrap();
        let store = populated(&dir).await;

        store
            .remove(&MatchCriteria {
                log_levels: vec![LogLevel::Info],
                ..Default::default()
            })
            .await
            .unwrap();
        let late = LogEntry::new(LogLevel::Info, "late", "after compaction").with_created(7);
        store.add(late.clone()).await.unwrap();

        let all = store.find(&MatchCriteria::default()).await.unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all.last(), Some(&late));
    }

    #[tokio::test]
    async fn remove_failure_leaves_original_untouched() {
        let dir = TempDir::new().unwrap();
        let store = populated(&dir).await;
        let path = store.path().unwrap();
        // A directory where the temp file should go makes creation fail.
        fs::create_dir(temp_path(&path)).unwrap();

        let result = store.remove(&MatchCriteria::default()).await;
        assert!(matches!(result, Err(StoreError::Io(_))));
        assert_eq!(store.find(&MatchCriteria::default()).await.unwrap().len(), 6);
        assert!(temp_path(&path).is_dir());
    }

    /// Fails every read, standing in for a disk error partway through a file.
    struct Unreadable;

    impl Read for Unreadable {
        fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::other("device went away"))
        }
    }

    #[tokio::test]
    async fn failed_rewrite_removes_temp_file_and_keeps_original() {
        let dir = TempDir::new().unwrap();
        let store = populated(&dir).await;
        let path = store.path().unwrap();
        let before = fs::read(&path).unwrap();

        // The read fails after the temp file exists and part of a line is buffered.
        let reader = BufReader::new(File::open(&path).unwrap().take(40).chain(Unreadable));
        let result = lock(&store.inner)
            .unwrap()
            .rewrite(reader, &MatchCriteria::default());

        assert!(matches!(result, Err(StoreError::Io(_))));
        assert!(!temp_path(&path).exists());
        assert_eq!(fs::read(&path).unwrap(), before);
        assert_eq!(store.find(&MatchCriteria::default()).await.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn invalid_utf8_line_is_skipped_by_find_and_kept_by_remove() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let first = LogEntry::new(LogLevel::Info, "s", "first").with_created(1);
        let second = LogEntry::new(LogLevel::Warn, "s", "second").with_created(2);

        store.add(first.clone()).await.unwrap();
        let path = store.path().unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"\xff\xfe garbage\n").unwrap();
        drop(file);
        store.add(second.clone()).await.unwrap();

        let found = store.find(&MatchCriteria::default()).await.unwrap();
        assert_eq!(found, vec![first, second.clone()]);

        let info_only = MatchCriteria {
            log_levels: vec![LogLevel::Info],
            ..Default::default()
        };
        assert_eq!(store.remove(&info_only).await.unwrap(), 1);

        let mut expected = b"\xff\xfe garbage\n".to_vec();
        expected.extend_from_slice(serde_json::to_string(&second).unwrap().as_bytes());
        expected.push(b'\n');
        assert_eq!(fs::read(&path).unwrap(), expected);
        assert_eq!(store.find(&MatchCriteria::default()).await.unwrap(), vec![second]);
    }

    #[tokio::test]
    async fn timed_out_add_still_lands() {
        let dir = TempDir::new().unwrap();
        let store = JsonlStore::new(dir.path().join("logs.jsonl"), Duration::from_millis(50));
        let entry = LogEntry::new(LogLevel::Info, "svc", "late").with_created(1);

        // Holding the lock stalls the blocking append past the timeout.
        let guard = lock(&store.inner).unwrap();
        let result = store.add(entry.clone()).await;
        assert!(matches!(result, Err(StoreError::Timeout(_))));
        drop(guard);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(store.find(&MatchCriteria::default()).await.unwrap(), vec![entry]);
    }

    #[tokio::test]
    async fn remove_copies_blank_lines_verbatim() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let gone = LogEntry::new(LogLevel::Error, "s", "gone").with_created(1);
        let kept = LogEntry::new(LogLevel::Debug, "s", "kept").with_created(2);

        store.add(gone).await.unwrap();
        let path = store.path().unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"\n  \n").unwrap();
        drop(file);
        store.add(kept.clone()).await.unwrap();

        let errors = MatchCriteria {
            log_levels: vec![LogLevel::Error],
            ..Default::default()
        };
        assert_eq!(store.remove(&errors).await.unwrap(), 1);

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, format!("\n  \n{}\n", serde_json::to_string(&kept).unwrap()));
    }

    #[test]
    fn temp_file_is_deleted_unless_committed() {
        let dir = TempDir::new().unwrap();
        let abandoned = dir.path().join("abandoned.tmp");
        let (tmp, mut file) = TempFile::create(abandoned.clone()).unwrap();
        writeln!(file, "partial").unwrap();
        drop(file);
        drop(tmp);
        assert!(!abandoned.exists());

        let kept = dir.path().join("kept.tmp");
        let target = dir.path().join("kept");
        let (tmp, mut file) = TempFile::create(kept.clone()).unwrap();
        writeln!(file, "done").unwrap();
        drop(file);
        tmp.commit(&target).unwrap();
        assert!(!kept.exists());
        assert_eq!(fs::read_to_string(&target).unwrap(), "done\n");
    }

    #[test]
    fn temp_path_appends_suffix() {
        assert_eq!(
            temp_path(Path::new("/var/log/logsink.jsonl")),
            PathBuf::from("/var/log/logsink.jsonl.tmp")
        );
    }

    #[tokio::test]
    async fn reset_deletes_everything() {
        let dir = TempDir::new().unwrap();
        let store = populated(&dir).await;

        store.reset().await.unwrap();
        assert!(!store.path().unwrap().exists());
        assert!(store.find(&MatchCriteria::default()).await.unwrap().is_empty());

        // Resetting twice is fine, and the next add recreates the file.
        store.reset().await.unwrap();
        store.add(LogEntry::new(LogLevel::Info, "s", "m")).await.unwrap();
        assert_eq!(store.find(&MatchCriteria::default()).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_adds_and_removes_lose_nothing() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(store_in(&dir));

        let mut tasks = Vec::new();
        for i in 0..40 {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                let entry = LogEntry::new(LogLevel::Info, "svc", format!("entry {}", i))
                    .with_labels(["keep"])
                    .with_created(i + 1);
                store.add(entry).await.unwrap();
                if i % 5 == 0 {
                    store.add(LogEntry::new(LogLevel::Debug, "svc", "drop me")).await.unwrap();
                    store
                        .remove(&MatchCriteria {
                            log_levels: vec![LogLevel::Debug],
                            ..Default::default()
                        })
                        .await
                        .unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let all = store.find(&MatchCriteria::default()).await.unwrap();
        assert_eq!(all.len(), 40);
        assert!(all.iter().all(|e| e.level == LogLevel::Info));
    }
}
