//! The connection-tuning pragmas applied to every opened SQLite handle, and
//! the dynamic `cache_size` formula that adapts to both host memory and
//! observed query volume.

use std::sync::Once;

use sysinfo::System;

const MIN_CACHE_BYTES: u64 = 16 * 1024 * 1024;
const MAX_CACHE_BYTES: u64 = 256 * 1024 * 1024;
const LOW_MEMORY_THRESHOLD_BYTES: u64 = 160 * 1024 * 1024;

static LOW_MEMORY_WARNING: Once = Once::new();

/// Compute the `PRAGMA cache_size` value (negative = kibibytes, per SQLite
/// convention) for the given number of queries observed so far on this
/// connection.
///
/// Base size is 10% of free host memory, scaled by observed query volume
/// (`<100` queries: 0.5x, `100..1000`: 1.0x, `>=1000`: 1.5x) and clamped to
/// `[16 MiB, 256 MiB]`. When free memory can't be determined, or is below
/// 160 MiB, the minimum is used and a warning is logged exactly once per
/// process.
pub fn cache_size_kib(query_count: u64) -> i64 {
    let bytes = match probe_free_memory_bytes() {
        Some(free) if free >= LOW_MEMORY_THRESHOLD_BYTES => {
            let base = (free as f64) * 0.10;
            let scale = if query_count < 100 {
                0.5
            } else if query_count < 1000 {
                1.0
            } else {
                1.5
            };
            (base * scale) as u64
        }
        _ => {
            LOW_MEMORY_WARNING.call_once(|| {
                log::warn!(
                    "could not determine usable free host memory (or it is below 160MiB); \
                     falling back to the 16MiB cache_size minimum"
                );
            });
            MIN_CACHE_BYTES
        }
    }
    .clamp(MIN_CACHE_BYTES, MAX_CACHE_BYTES);

    -((bytes / 1024) as i64)
}

fn probe_free_memory_bytes() -> Option<u64> {
    let mut system = System::new();
    system.refresh_memory();
    match system.available_memory() {
        0 => None,
        bytes => Some(bytes),
    }
}

/// Connection-time configuration for the SQLite driver.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    pub busy_timeout_ms: u32,
    pub read_only: bool,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        SqliteConfig {
            busy_timeout_ms: 5_000,
            read_only: false,
        }
    }
}

/// Apply the full ambient pragma set to a freshly opened connection.
pub fn apply_pragmas(conn: &rusqlite::Connection, config: &SqliteConfig) -> rusqlite::Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "busy_timeout", config.busy_timeout_ms)?;
    conn.pragma_update(None, "foreign_keys", true)?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    conn.pragma_update(None, "auto_vacuum", "NONE")?;
    conn.pragma_update(None, "wal_autocheckpoint", 1000i64)?;
    conn.pragma_update(None, "cache_size", cache_size_kib(0))?;
    Ok(())
}

/// Re-tune `cache_size` once the query count crosses a scaling threshold.
pub fn retune_cache_if_needed(conn: &rusqlite::Connection, query_count: u64) -> rusqlite::Result<()> {
    if query_count == 100 || query_count == 1000 {
        conn.pragma_update(None, "cache_size", cache_size_kib(query_count))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_size_is_negative_kib_and_clamped() {
        let value = cache_size_kib(0);
        assert!(value < 0, "cache_size pragma must be negative (KiB convention)");
        let bytes = (-value) as u64 * 1024;
        assert!(bytes >= MIN_CACHE_BYTES);
        assert!(bytes <= MAX_CACHE_BYTES);
    }

    #[test]
    fn scale_grows_with_query_count() {
        let low = cache_size_kib(10);
        let mid = cache_size_kib(500);
        let high = cache_size_kib(5000);
        assert!(low.abs() <= mid.abs());
        assert!(mid.abs() <= high.abs());
    }
}
