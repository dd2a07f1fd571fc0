//! Append-only CSV ledger keyed by `url`.
//!
//! The file is both the run's output and the resume state for the next run:
//! on open, the `url` column of an existing file becomes the done set. Rows
//! are only ever appended; the header is written once, when the file is new.

pub mod stats;

use crate::error::LedgerError;
use crate::models::{AnnotationRecord, ArticleRecord, SentimentRecord};
use chrono::Local;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

pub const KEY_COLUMN: &str = "url";

// ── Row trait ─────────────────────────────────────────────────────────────────

pub trait LedgerRow: Serialize + DeserializeOwned + Send + Sync {
    fn key(&self) -> &str;
}

impl LedgerRow for ArticleRecord {
    fn key(&self) -> &str {
        &self.url
    }
}

impl LedgerRow for AnnotationRecord {
    fn key(&self) -> &str {
        &self.url
    }
}

impl LedgerRow for SentimentRecord {
    fn key(&self) -> &str {
        &self.url
    }
}

// ── Ledger ────────────────────────────────────────────────────────────────────

struct Inner {
    writer: csv::Writer<File>,
    done: HashSet<String>,
}

pub struct Ledger<R> {
    path: PathBuf,
    inner: Mutex<Inner>,
    _row: PhantomData<fn(R)>,
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> LedgerError + '_ {
    move |source| LedgerError::Io {
        path: path.display().to_string(),
        source,
    }
}

impl<R: LedgerRow> Ledger<R> {
    /// Open for appending, loading the done set from any existing rows.
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err(parent))?;
        }

        let mut existing = path.metadata().map(|m| m.len() > 0).unwrap_or(false);
        if existing {
            existing = truncate_torn_tail(path)?;
        }
        let done = if existing { load_keys(path)? } else { HashSet::new() };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(io_err(path))?;

        let writer = csv::WriterBuilder::new()
            .has_headers(!existing)
            .from_writer(file);

        info!("Ledger {:?}: {} rows already present", path, done.len());
        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(Inner { writer, done }),
            _row: PhantomData,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner
            .lock()
            .map(|g| g.done.contains(key))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|g| g.done.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append one row and mark its key done, both under the same lock.
    /// Returns `false` without writing when the key is already present.
    pub fn append(&self, row: &R) -> Result<bool, LedgerError> {
        let mut guard = self.inner.lock().map_err(|_| LedgerError::Poisoned)?;
        if guard.done.contains(row.key()) {
            return Ok(false);
        }
        guard.writer.serialize(row)?;
        guard.writer.flush().map_err(io_err(&self.path))?;
        guard.done.insert(row.key().to_string());
        Ok(true)
    }
}

/// Cut the file back to the end of its last complete row. A row torn by a
/// crash, even inside a quoted field, must not swallow the next append.
/// Returns `false` when not even the header survived.
fn truncate_torn_tail(path: &Path) -> Result<bool, LedgerError> {
    let len = path.metadata().map_err(io_err(path))?.len();
    let ends_with_newline = last_byte(path, len).map_err(io_err(path))? == Some(b'\n');
    let terminated = |end: u64| end < len || ends_with_newline;

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(false)
        .from_path(path)?;

    let mut record = csv::ByteRecord::new();
    let mut width = None;
    let mut good_end = 0;
    while let Ok(true) = reader.read_byte_record(&mut record) {
        let end = reader.position().byte();
        let expected = *width.get_or_insert(record.len());
        if record.len() == expected && terminated(end) {
            good_end = end;
        }
    }

    if good_end < len {
        warn!(
            "Ledger {:?} ends with a torn row; truncating {} bytes",
            path,
            len - good_end
        );
        OpenOptions::new()
            .write(true)
            .open(path)
            .and_then(|f| f.set_len(good_end))
            .map_err(io_err(path))?;
    }
    Ok(good_end > 0)
}

fn last_byte(path: &Path, len: u64) -> std::io::Result<Option<u8>> {
    if len == 0 {
        return Ok(None);
    }
    let mut file = File::open(path)?;
    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    Ok(Some(last[0]))
}

// ── Readers ───────────────────────────────────────────────────────────────────

/// The `url` column of an existing ledger. Malformed rows are skipped.
pub fn load_keys(path: &Path) -> Result<HashSet<String>, LedgerError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    let idx = headers
        .iter()
        .position(|h| h == KEY_COLUMN)
        .ok_or_else(|| LedgerError::MissingKeyColumn(path.display().to_string()))?;

    let mut keys = HashSet::new();
    for (i, result) in reader.records().enumerate() {
        match result {
            // a torn row must not count as done
            Ok(record) if record.len() != headers.len() => {
                warn!("Row {} in {:?}: expected {} fields, found {}", i + 1, path, headers.len(), record.len());
            }
            Ok(record) => {
                if let Some(key) = record.get(idx).filter(|k| !k.is_empty()) {
                    keys.insert(key.to_string());
                }
            }
            Err(e) => warn!("Row {} in {:?}: {}", i + 1, path, e),
        }
    }
    Ok(keys)
}

/// Every well-formed row of a ledger file; a missing file reads as empty.
pub fn read_rows<R: LedgerRow>(path: &Path) -> Result<Vec<R>, LedgerError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)?;

    let mut rows = Vec::new();
    for (i, result) in reader.deserialize::<R>().enumerate() {
        match result {
            Ok(row) => rows.push(row),
            Err(e) => warn!("Row {} in {:?}: {}", i + 1, path, e),
        }
    }
    Ok(rows)
}

/// Move an existing ledger aside so a fresh run starts from an empty file.
pub fn archive_existing(path: &Path) -> Result<Option<PathBuf>, LedgerError> {
    if !path.exists() {
        return Ok(None);
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "ledger".to_string());
    let stamp = Local::now().format("%Y%m%d-%H%M%S");
    let backup = path.with_file_name(format!("{}.{}.bak.csv", stem, stamp));
    std::fs::rename(path, &backup).map_err(io_err(path))?;
    info!("Archived {:?} → {:?}", path, backup);
    Ok(Some(backup))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Arc;

    fn record(url: &str) -> ArticleRecord {
        ArticleRecord {
            url: url.into(),
            source_site: "example.com".into(),
            domain: "example".into(),
            body_text: "ein kurzer Text".into(),
            word_count: 3,
            paragraph_count: 5,
            ..Default::default()
        }
    }

    #[test]
    fn test_append_and_resume() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/articles.csv");

        {
            let ledger: Ledger<ArticleRecord> = Ledger::open(&path).unwrap();
            assert!(ledger.is_empty());
            assert!(ledger.append(&record("https://example.com/a.html")).unwrap());
            assert!(ledger.append(&record("https://example.com/b.html")).unwrap());
            assert!(!ledger.append(&record("https://example.com/a.html")).unwrap());
        }

        let ledger: Ledger<ArticleRecord> = Ledger::open(&path).unwrap();
        assert_eq!(ledger.len(), 2);
        assert!(ledger.contains("https://example.com/b.html"));
        assert!(ledger.append(&record("https://example.com/c.html")).unwrap());
        drop(ledger);

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("source_site").count(), 1, "header written once");

        let rows: Vec<ArticleRecord> = read_rows(&path).unwrap();
        let urls: Vec<&str> = rows.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec![
            "https://example.com/a.html",
            "https://example.com/b.html",
            "https://example.com/c.html",
        ]);
    }

    #[test]
    fn test_partial_last_row_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("articles.csv");
        {
            let ledger: Ledger<ArticleRecord> = Ledger::open(&path).unwrap();
            ledger.append(&record("https://example.com/a.html")).unwrap();
        }
        let mut f = OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b"https://example.com/torn.html,exa").unwrap();
        drop(f);

        let ledger: Ledger<ArticleRecord> = Ledger::open(&path).unwrap();
        ledger.append(&record("https://example.com/b.html")).unwrap();
        drop(ledger);

        let rows: Vec<ArticleRecord> = read_rows(&path).unwrap();
        let urls: Vec<&str> = rows.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["https://example.com/a.html", "https://example.com/b.html"]);
    }

    #[test]
    fn test_row_torn_inside_quoted_field_is_cut() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("articles.csv");
        {
            let ledger: Ledger<ArticleRecord> = Ledger::open(&path).unwrap();
            ledger.append(&record("https://example.com/a.html")).unwrap();
        }
        let mut f = OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b"https://example.com/torn.html,example.com,example,,,,\"Ein Text, mit").unwrap();
        drop(f);

        {
            let ledger: Ledger<ArticleRecord> = Ledger::open(&path).unwrap();
            assert_eq!(ledger.len(), 1);
            assert!(ledger.append(&record("https://example.com/b.html")).unwrap());
            assert!(ledger.append(&record("https://example.com/c.html")).unwrap());
        }

        let keys = load_keys(&path).unwrap();
        assert_eq!(keys.len(), 3);
        assert!(keys.contains("https://example.com/b.html"));
        assert!(!keys.contains("https://example.com/torn.html"));

        let rows: Vec<ArticleRecord> = read_rows(&path).unwrap();
        let urls: Vec<&str> = rows.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec![
            "https://example.com/a.html",
            "https://example.com/b.html",
            "https://example.com/c.html",
        ]);
    }

    #[test]
    fn test_torn_header_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("articles.csv");
        std::fs::write(&path, "url,source_si").unwrap();

        {
            let ledger: Ledger<ArticleRecord> = Ledger::open(&path).unwrap();
            assert!(ledger.is_empty());
            ledger.append(&record("https://example.com/a.html")).unwrap();
        }
        let rows: Vec<ArticleRecord> = read_rows(&path).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_concurrent_appends_keep_keys_unique() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("articles.csv");
        let ledger: Arc<Ledger<ArticleRecord>> = Arc::new(Ledger::open(&path).unwrap());

        // every thread races on the same 20 keys
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || {
                    for i in 0..20 {
                        ledger.append(&record(&format!("https://example.com/{}.html", i))).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(ledger.len(), 20);
        assert_eq!(load_keys(&path).unwrap().len(), 20);
        let rows: Vec<ArticleRecord> = read_rows(&path).unwrap();
        assert_eq!(rows.len(), 20);
    }

    #[test]
    fn test_missing_key_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "article_id,text\n1,hallo\n").unwrap();
        assert!(matches!(load_keys(&path), Err(LedgerError::MissingKeyColumn(_))));
    }

    #[test]
    fn test_archive_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("articles.csv");
        assert_eq!(archive_existing(&path).unwrap(), None);

        std::fs::write(&path, "url\nhttps://example.com/a.html\n").unwrap();
        let backup = archive_existing(&path).unwrap().unwrap();
        assert!(!path.exists());
        assert!(backup.exists());
    }
}
