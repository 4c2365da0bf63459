//! SQLite catalog cache
//!
//! A walk can be saved with [`write_cache`] and replayed later with
//! [`read_cache`] (`dchmod -i FILE`), so the expensive enumeration only has
//! to happen once for several passes over the same tree.

use super::{Catalog, EntryType, FileEntry};
use crate::error::{CatalogError, CatalogResult};
use crate::mode::ModeBits;
use rusqlite::{params, Connection, OpenFlags};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Current schema version; caches with any other version are rejected
pub const SCHEMA_VERSION: u32 = 1;

/// Entries are inserted in transactions of this many rows
const INSERT_BATCH: usize = 10_000;

/// Note: INTEGER PRIMARY KEY without AUTOINCREMENT avoids the sqlite_sequence overhead
const CREATE_ENTRIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS entries (
    id INTEGER PRIMARY KEY,
    path TEXT NOT NULL,
    entry_type INTEGER NOT NULL,  -- 0=file, 1=dir, 2=symlink, 3=other
    mode INTEGER NOT NULL,        -- Permission bits
    uid INTEGER NOT NULL,
    gid INTEGER NOT NULL,
    depth INTEGER NOT NULL
)
"#;

const CREATE_WALK_INFO_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS walk_info (
    key TEXT PRIMARY KEY,
    value TEXT
)
"#;

/// Created after the bulk insert, which is faster than maintaining it row by row
const CREATE_DEPTH_INDEX: &str = "CREATE INDEX IF NOT EXISTS idx_entries_depth ON entries(depth)";

const WRITE_PRAGMAS: &str = r#"
PRAGMA journal_mode = OFF;
PRAGMA synchronous = OFF;
PRAGMA cache_size = -64000;      -- 64MB cache
PRAGMA temp_store = MEMORY;
"#;

/// Metadata keys stored in `walk_info`
pub mod keys {
    /// Schema version of the cache
    pub const SCHEMA_VERSION: &str = "schema_version";

    /// Timestamp the cache was written (RFC 3339)
    pub const CREATED_AT: &str = "created_at";

    /// Number of entries in the cache
    pub const TOTAL_ENTRIES: &str = "total_entries";

    /// Walk roots, newline separated
    pub const ROOTS: &str = "roots";
}

/// Store walk metadata
pub fn set_walk_info(conn: &Connection, key: &str, value: &str) -> CatalogResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO walk_info (key, value) VALUES (?1, ?2)",
        [key, value],
    )?;
    Ok(())
}

/// Get walk metadata
pub fn get_walk_info(conn: &Connection, key: &str) -> CatalogResult<Option<String>> {
    let result = conn.query_row(
        "SELECT value FROM walk_info WHERE key = ?1",
        [key],
        |row| row.get(0),
    );

    match result {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write `catalog` to a fresh cache at `path`, replacing any existing file
pub fn write_cache(path: &Path, catalog: &Catalog, roots: &[PathBuf]) -> CatalogResult<()> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }

    let mut conn = Connection::open(path).map_err(|e| CatalogError::CreateFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    conn.execute_batch(WRITE_PRAGMAS)?;
    conn.execute(CREATE_ENTRIES_TABLE, [])?;
    conn.execute(CREATE_WALK_INFO_TABLE, [])?;

    for chunk in catalog.entries().chunks(INSERT_BATCH) {
        write_batch(&mut conn, chunk)?;
        debug!("Cached {} entries", chunk.len());
    }

    conn.execute(CREATE_DEPTH_INDEX, [])?;

    let roots = roots
        .iter()
        .map(|r| r.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("\n");

    set_walk_info(&conn, keys::SCHEMA_VERSION, &SCHEMA_VERSION.to_string())?;
    set_walk_info(&conn, keys::CREATED_AT, &chrono::Utc::now().to_rfc3339())?;
    set_walk_info(&conn, keys::TOTAL_ENTRIES, &catalog.len().to_string())?;
    set_walk_info(&conn, keys::ROOTS, &roots)?;

    info!(path = %path.display(), entries = catalog.len(), "Wrote catalog cache");
    Ok(())
}

fn write_batch(conn: &mut Connection, entries: &[FileEntry]) -> CatalogResult<()> {
    let tx = conn.transaction()?;

    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO entries (path, entry_type, mode, uid, gid, depth)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;

        for entry in entries {
            stmt.execute(params![
                entry.path.to_string_lossy(),
                entry.entry_type.as_db_int(),
                entry.mode.bits() as i64,
                entry.uid as i64,
                entry.gid as i64,
                entry.depth as i64,
            ])?;
        }
    }

    tx.commit()?;
    Ok(())
}

/// Read a cache written by [`write_cache`]
pub fn read_cache(path: &Path) -> CatalogResult<Catalog> {
    if !path.exists() {
        return Err(CatalogError::CacheNotFound {
            path: path.to_path_buf(),
        });
    }

    let invalid = |reason: String| CatalogError::InvalidCache {
        path: path.to_path_buf(),
        reason,
    };

    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .map_err(|e| invalid(e.to_string()))?;

    let version = get_walk_info(&conn, keys::SCHEMA_VERSION)
        .map_err(|e| invalid(e.to_string()))?
        .ok_or_else(|| invalid("missing schema version".to_string()))?;
    if version != SCHEMA_VERSION.to_string() {
        return Err(invalid(format!(
            "schema version {version}, expected {SCHEMA_VERSION}"
        )));
    }

    let mut stmt =
        conn.prepare("SELECT path, entry_type, mode, uid, gid, depth FROM entries ORDER BY id")?;

    let catalog = stmt
        .query_map([], |row| {
            let path: String = row.get(0)?;
            let entry_type: i64 = row.get(1)?;
            let mode: i64 = row.get(2)?;
            let uid: i64 = row.get(3)?;
            let gid: i64 = row.get(4)?;
            let depth: i64 = row.get(5)?;

            Ok(FileEntry {
                path: PathBuf::from(path),
                uid: uid as u32,
                gid: gid as u32,
                mode: ModeBits::from_mode(mode as u32),
                entry_type: EntryType::from_u8(entry_type as u8),
                depth: depth as u32,
            })
        })?
        .collect::<Result<Catalog, _>>()?;

    info!(path = %path.display(), entries = catalog.len(), "Read catalog cache");
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::test_support::entry;
    use tempfile::tempdir;

    #[test]
    fn test_cache_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("walk.db");

        let mut link = entry("/r/link", EntryType::Symlink, 1);
        link.mode = ModeBits::from_mode(0o777);
        link.gid = 42;
        let catalog = Catalog::from_entries(vec![
            entry("/r", EntryType::Directory, 0),
            link,
            entry("/r/a.txt", EntryType::Regular, 1),
        ]);

        write_cache(&path, &catalog, &[PathBuf::from("/r")]).unwrap();
        let read = read_cache(&path).unwrap();
        assert_eq!(read, catalog);
    }

    #[test]
    fn test_cache_metadata() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("walk.db");

        write_cache(&path, &Catalog::new(), &[PathBuf::from("/a"), PathBuf::from("/b")]).unwrap();

        let conn = Connection::open(&path).unwrap();
        assert_eq!(
            get_walk_info(&conn, keys::TOTAL_ENTRIES).unwrap(),
            Some("0".to_string())
        );
        assert_eq!(
            get_walk_info(&conn, keys::ROOTS).unwrap(),
            Some("/a\n/b".to_string())
        );
        assert_eq!(get_walk_info(&conn, "nonexistent").unwrap(), None);
    }

    #[test]
    fn test_overwrites_existing_cache() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("walk.db");

        let big = Catalog::from_entries(vec![
            entry("/a", EntryType::Directory, 0),
            entry("/a/b", EntryType::Regular, 1),
        ]);
        write_cache(&path, &big, &[]).unwrap();

        let small = Catalog::from_entries(vec![entry("/c", EntryType::Directory, 0)]);
        write_cache(&path, &small, &[]).unwrap();

        assert_eq!(read_cache(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_missing_cache() {
        let dir = tempdir().unwrap();
        let err = read_cache(&dir.path().join("nope.db")).unwrap_err();
        assert!(matches!(err, CatalogError::CacheNotFound { .. }));
    }

    #[test]
    fn test_rejects_rows_without_stat() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("walk.db");
        write_cache(&path, &Catalog::new(), &[]).unwrap();

        let conn = Connection::open(&path).unwrap();
        conn.execute("DROP TABLE entries", []).unwrap();
        conn.execute(
            "CREATE TABLE entries (id INTEGER PRIMARY KEY, path TEXT, entry_type INTEGER,
             mode INTEGER, uid INTEGER, gid INTEGER, depth INTEGER)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO entries (path, entry_type, depth) VALUES ('/r/a', 0, 1)",
            [],
        )
        .unwrap();
        drop(conn);

        assert!(read_cache(&path).is_err());
    }

    #[test]
    fn test_rejects_foreign_database() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("other.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute("CREATE TABLE something (x INTEGER)", []).unwrap();
        drop(conn);

        let err = read_cache(&path).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidCache { .. }));
    }
}
