//! On-disk format of the cache file.
//!
//! ```json
//! { "version": 1, "generator": "deltascan 0.3.0", "entries": { "src/a.rs": { ... } } }
//! ```
//!
//! The file may be gzip-compressed; readers detect that from the magic bytes, so a
//! compressed file loads even when compression has since been turned off.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use super::store::CacheEntry;
use crate::errors::{PipelineError, Result};

pub const FORMAT_VERSION: u32 = 1;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Serialize)]
struct CacheFileRef<'a> {
    version: u32,
    generator: &'a str,
    entries: &'a BTreeMap<String, CacheEntry>,
}

#[derive(Deserialize)]
struct RawCacheFile {
    version: u32,
    #[serde(default)]
    generator: String,
    #[serde(default)]
    entries: BTreeMap<String, serde_json::Value>,
}

/// What was found at the cache location
#[derive(Debug)]
pub enum LoadOutcome {
    Missing,
    Loaded {
        entries: BTreeMap<String, CacheEntry>,
        /// Entries whose shape could not be decoded
        dropped: usize,
    },
    VersionMismatch {
        found: u32,
    },
}

pub fn generator() -> String {
    format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

pub fn is_gzip(bytes: &[u8]) -> bool {
    bytes.starts_with(&GZIP_MAGIC)
}

/// Read and decode the cache file.
///
/// Undecodable files are `CacheCorruption`; individual bad entries are dropped.
pub fn read_cache_file(path: &Path) -> Result<LoadOutcome> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(LoadOutcome::Missing),
        Err(source) => {
            return Err(PipelineError::CacheIo {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let json = if is_gzip(&bytes) {
        let mut decoded = Vec::new();
        GzDecoder::new(bytes.as_slice())
            .read_to_end(&mut decoded)
            .map_err(|e| PipelineError::corruption(path, format!("gzip: {e}")))?;
        decoded
    } else {
        bytes
    };

    let raw: RawCacheFile = serde_json::from_slice(&json)
        .map_err(|e| PipelineError::corruption(path, e.to_string()))?;

    if raw.version != FORMAT_VERSION {
        return Ok(LoadOutcome::VersionMismatch { found: raw.version });
    }

    let total = raw.entries.len();
    let entries: BTreeMap<String, CacheEntry> = raw
        .entries
        .into_iter()
        .filter_map(|(key, value)| match serde_json::from_value::<CacheEntry>(value) {
            Ok(entry) => Some((key, entry)),
            Err(e) => {
                log::debug!("Dropping cache entry {}: {}", key, e);
                None
            }
        })
        .collect();
    let dropped = total - entries.len();

    log::debug!(
        "Read cache {} written by '{}' ({} entries, {} dropped)",
        path.display(),
        raw.generator,
        entries.len(),
        dropped
    );
    Ok(LoadOutcome::Loaded { entries, dropped })
}

/// Serialize entries and replace the cache file atomically.
pub fn write_cache_file(
    path: &Path,
    entries: &BTreeMap<String, CacheEntry>,
    compress: bool,
) -> Result<()> {
    let generator = generator();
    let document = CacheFileRef {
        version: FORMAT_VERSION,
        generator: &generator,
        entries,
    };
    let json = serde_json::to_vec(&document)?;

    let content = if compress {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&json).map_err(|e| io_error(path, e))?;
        encoder.finish().map_err(|e| io_error(path, e))?
    } else {
        json
    };

    write_file_atomically(path, &content)
}

fn io_error(path: &Path, source: std::io::Error) -> PipelineError {
    PipelineError::CacheIo {
        path: path.to_path_buf(),
        source,
    }
}

/// Create a temp path next to the target that will not collide with other writers
fn create_safe_temp_path(target_path: &Path) -> PathBuf {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    let counter = COUNTER.fetch_add(1, Ordering::SeqCst);

    let temp_name = format!(
        "{}.tmp.{}.{}.{}",
        target_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("cache"),
        std::process::id(),
        timestamp,
        counter
    );
    target_path.with_file_name(temp_name)
}

fn write_file_atomically(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        crate::io::ensure_dir(parent).map_err(|e| io_error(parent, e))?;
    }

    let temp_path = create_safe_temp_path(path);
    let written = fs::File::create(&temp_path)
        .and_then(|mut file| {
            file.write_all(content)?;
            file.sync_all()
        })
        .and_then(|_| fs::rename(&temp_path, path));

    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(io_error(path, e));
    }
    Ok(())
}
