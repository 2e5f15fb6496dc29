// ============================================================
// Layer 4 — Sample Store
// ============================================================
// Append-only store of labelled samples.
//
// On disk the store is a JSON-lines log, one StoredSample per line:
//
//   {"seq":1,"features":{...},"target":22.5,"recorded_at":"..."}
//   {"seq":2,"features":{...},"target":18.0,"recorded_at":"..."}
//
// In memory it keeps every record behind an `Arc`, so a snapshot
// is a cheap copy of pointers taken under a read lock.
//
// Locking:
//   appender (Mutex)  — serialises this handle's appends and
//                       catch-ups: sequence numbering and the
//                       file write happen under it
//   log file (flock)  — exclusive while appending, shared while
//                       reading, so several handles (or several
//                       processes) can share one log and the
//                       log order is still the sequence order
//   samples  (RwLock) — held for writing only for the final
//                       `push`, after the record is fully built
//                       and written; snapshots never see half a
//                       record and never wait on disk I/O
//
// Why catch up before every append and snapshot?
//   Another handle on the same file may have appended since we
//   last looked. Reading from the last consumed byte offset keeps
//   the in-memory list (and the next sequence number) in step
//   with the log without replaying it from the start.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};

use crate::domain::error::LifecycleResult;
use crate::domain::sample::{Sample, StoredSample};

// ─── SampleWindow ─────────────────────────────────────────────────────────────
/// Optional recency and count filters for a snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SampleWindow {
    /// Only samples recorded within this age of "now"
    pub max_age:   Option<Duration>,
    /// Only the most recent N samples (applied after `max_age`)
    pub max_count: Option<usize>,
}

impl SampleWindow {
    /// No filtering: every stored sample.
    pub fn all() -> Self {
        Self::default()
    }
}

// ─── Snapshot ─────────────────────────────────────────────────────────────────
/// Immutable, ordered view of the store as of the moment it was taken.
///
/// Iterating is lazy and can be repeated any number of times.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    samples: Vec<Arc<StoredSample>>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples in append order.
    pub fn iter(&self) -> impl Iterator<Item = &StoredSample> + '_ {
        self.samples.iter().map(unshare)
    }

    /// Owned copies of the samples, for handing to a regressor.
    pub fn to_samples(&self) -> Vec<Sample> {
        self.iter().map(|s| s.sample.clone()).collect()
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item     = &'a StoredSample;
    type IntoIter = std::iter::Map<
        std::slice::Iter<'a, Arc<StoredSample>>,
        fn(&'a Arc<StoredSample>) -> &'a StoredSample,
    >;

    fn into_iter(self) -> Self::IntoIter {
        self.samples
            .iter()
            .map(unshare as fn(&'a Arc<StoredSample>) -> &'a StoredSample)
    }
}

fn unshare(sample: &Arc<StoredSample>) -> &StoredSample {
    sample
}

// ─── SampleStore ──────────────────────────────────────────────────────────────
struct Appender {
    next_seq: u64,
    log:      Option<LogFile>,
}

struct LogFile {
    file:     fd_lock::RwLock<File>,
    /// Bytes already replayed into memory; always at a line boundary
    consumed: u64,
    #[cfg(test)]
    fail_after: Option<usize>,
}

/// Durable (or in-memory) append-only sample log.
pub struct SampleStore {
    appender: Mutex<Appender>,
    samples:  RwLock<Vec<Arc<StoredSample>>>,
    path:     Option<PathBuf>,
}

impl SampleStore {
    /// A store that lives only as long as the process. Used in tests
    /// and by callers that persist samples elsewhere.
    pub fn in_memory() -> Self {
        Self {
            appender: Mutex::new(Appender { next_seq: 1, log: None }),
            samples:  RwLock::new(Vec::new()),
            path:     None,
        }
    }

    /// Open (or create) the log at `path` and replay existing records.
    ///
    /// Unreadable lines (e.g. a record cut short by a crash) are skipped
    /// with a warning; sequence numbering continues after the highest
    /// sequence number found.
    pub fn open(path: impl AsRef<Path>) -> LifecycleResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        let log = LogFile {
            file:     fd_lock::RwLock::new(file),
            consumed: 0,
            #[cfg(test)]
            fail_after: None,
        };
        let store = Self {
            appender: Mutex::new(Appender { next_seq: 1, log: Some(log) }),
            samples:  RwLock::new(Vec::new()),
            path:     Some(path),
        };

        {
            let mut appender = store.appender.lock();
            store.catch_up(&mut appender)?;
        }

        tracing::info!("Opened sample log '{}' with {} samples", store.display(), store.len());
        Ok(store)
    }

    /// Validate and append one sample; returns its sequence number.
    ///
    /// Nothing is stored if validation or the log write fails, and a
    /// failed write leaves no partial line in front of the next record.
    pub fn append(&self, sample: Sample) -> LifecycleResult<u64> {
        sample.validate()?;

        let mut guard = self.appender.lock();
        let appender  = &mut *guard;
        let Some(log) = appender.log.as_mut() else {
            let stored = StoredSample { seq: appender.next_seq, sample };
            appender.next_seq += 1;
            return Ok(self.push(stored));
        };

        #[cfg(test)]
        let fail_after = log.fail_after.take();
        #[cfg(not(test))]
        let fail_after = None;

        let mut file = log.file.write()?;
        let (records, consumed) = read_new_records(&file, log.consumed, self.display())?;
        self.absorb(records, &mut appender.next_seq);
        log.consumed = consumed;

        let len = file.metadata()?.len();
        let mut line = Vec::new();
        if len > consumed {
            tracing::warn!(
                "Discarding {} bytes of an unfinished record in '{}'",
                len - consumed,
                self.display()
            );
            line.push(b'\n');
        }
        let stored = StoredSample { seq: appender.next_seq, sample };
        serde_json::to_writer(&mut line, &stored)?;
        line.push(b'\n');

        if let Err(e) = write_line(&mut file, &line, fail_after) {
            // Cut the partial write off so the next record starts cleanly
            if let Err(trunc) = file.set_len(len) {
                tracing::warn!("Could not roll back '{}': {}", self.display(), trunc);
            }
            return Err(e.into());
        }
        log.consumed = len + line.len() as u64;
        drop(file);

        appender.next_seq += 1;
        Ok(self.push(stored))
    }

    /// Consistent view of the samples matching `window`, in append order.
    ///
    /// Picks up records appended through other handles on the same log.
    pub fn snapshot(&self, window: SampleWindow) -> Snapshot {
        {
            let mut appender = self.appender.lock();
            if let Err(e) = self.catch_up(&mut appender) {
                tracing::warn!("Could not read new samples from '{}': {}", self.display(), e);
            }
        }

        // An age too large to subtract from "now" means no cutoff
        let cutoff = window
            .max_age
            .and_then(|age| chrono::Duration::from_std(age).ok())
            .and_then(|age| Utc::now().checked_sub_signed(age));

        let mut selected: Vec<Arc<StoredSample>> = {
            let samples = self.samples.read();
            samples
                .iter()
                .filter(|s| cutoff.map_or(true, |c| s.sample.recorded_at >= c))
                .cloned()
                .collect()
        };

        if let Some(max) = window.max_count {
            let excess = selected.len().saturating_sub(max);
            selected.drain(..excess);
        }

        Snapshot { samples: selected }
    }

    /// Samples held in memory as of the last append or snapshot.
    pub fn len(&self) -> usize {
        self.samples.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Log location, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    // ─── Internals ────────────────────────────────────────────────────────────

    /// Read complete records written since the last catch-up.
    fn catch_up(&self, appender: &mut Appender) -> LifecycleResult<usize> {
        let Some(log) = appender.log.as_mut() else {
            return Ok(0);
        };
        let file = log.file.read()?;
        let (records, consumed) = read_new_records(&file, log.consumed, self.display())?;
        drop(file);

        log.consumed = consumed;
        Ok(self.absorb(records, &mut appender.next_seq))
    }

    fn absorb(&self, records: Vec<StoredSample>, next_seq: &mut u64) -> usize {
        let count = records.len();
        if count == 0 {
            return 0;
        }
        let mut samples = self.samples.write();
        for stored in records {
            *next_seq = (*next_seq).max(stored.seq + 1);
            samples.push(Arc::new(stored));
        }
        tracing::debug!("Caught up {} samples from '{}'", count, self.display());
        count
    }

    fn push(&self, stored: StoredSample) -> u64 {
        let seq = stored.seq;
        self.samples.write().push(Arc::new(stored));
        tracing::debug!("Appended sample #{}", seq);
        seq
    }

    fn display(&self) -> std::path::Display<'_> {
        self.path.as_deref().unwrap_or(Path::new("<memory>")).display()
    }

    /// Make the next file write stop after `bytes` bytes and fail.
    #[cfg(test)]
    fn fail_next_write_after(&self, bytes: usize) {
        if let Some(log) = self.appender.lock().log.as_mut() {
            log.fail_after = Some(bytes);
        }
    }
}

/// Parse the complete lines between `from` and the end of `file`.
///
/// Returns the records and the offset just past the last newline; an
/// unterminated tail is left for a later call (or for `append` to cut off).
fn read_new_records(
    mut file: &File,
    from: u64,
    path: std::path::Display<'_>,
) -> io::Result<(Vec<StoredSample>, u64)> {
    let len = file.metadata()?.len();
    if len <= from {
        return Ok((Vec::new(), from));
    }

    file.seek(SeekFrom::Start(from))?;
    let mut buf = Vec::new();
    file.take(len - from).read_to_end(&mut buf)?;

    let Some(last_newline) = buf.iter().rposition(|b| *b == b'\n') else {
        return Ok((Vec::new(), from));
    };

    let mut records = Vec::new();
    let mut offset  = from;
    for raw in buf[..last_newline].split(|b| *b == b'\n') {
        let at = offset;
        offset += raw.len() as u64 + 1;

        let text = String::from_utf8_lossy(raw);
        if text.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<StoredSample>(text.trim()) {
            Ok(stored) => match stored.sample.validate() {
                Ok(()) => records.push(stored),
                Err(e) => tracing::warn!(
                    "Skipping invalid sample at byte {} of '{}': {}",
                    at,
                    path,
                    e
                ),
            },
            Err(e) => tracing::warn!("Skipping unreadable record at byte {} of '{}': {}", at, path, e),
        }
    }

    Ok((records, from + last_newline as u64 + 1))
}

fn write_line(file: &mut File, line: &[u8], fail_after: Option<usize>) -> io::Result<()> {
    if let Some(n) = fail_after {
        file.write_all(&line[..n.min(line.len())])?;
        return Err(io::Error::new(io::ErrorKind::Other, "simulated write failure"));
    }
    file.write_all(line)?;
    file.flush()
}
