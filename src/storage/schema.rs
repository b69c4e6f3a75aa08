//! DDL and identifier helpers for C2's per-index table family: `X`, `X_fts`,
//! `X_vocab`, `X_spatial`, and (legacy mode only) `X_id_map`.

use rusqlite::Connection;

use crate::error::{Error, Result};
use crate::spatial;
use crate::types::{FtsDetail, IndexOptions, SchemaMode};

/// Index names become SQL identifiers via string interpolation (no bind-parameter
/// form exists for table names), so they're restricted to a safe identifier charset
/// at every entry point that accepts one from a caller.
pub fn validate_index_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= 64
        && name.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!("invalid index name: {name:?}")))
    }
}

pub fn fts_table(index: &str) -> String {
    format!("{index}_fts")
}
pub fn vocab_table(index: &str) -> String {
    format!("{index}_vocab")
}
pub fn meta_table(index: &str) -> String {
    format!("{index}_meta")
}
pub fn id_map_table(index: &str) -> String {
    format!("{index}_id_map")
}

/// FNV-1a 64-bit hash, used to derive a stable numeric spatial key from a string id
/// in legacy mode (external mode uses the document's own integer primary key).
pub fn stable_numeric_id(s: &str) -> i64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in s.as_bytes() {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    (hash & 0x7fff_ffff_ffff_ffff) as i64
}

pub fn create_index(conn: &Connection, index: &str, options: &IndexOptions) -> Result<()> {
    validate_index_name(index)?;

    let mut options = options.clone();
    if options.schema_mode == SchemaMode::External && options.multi_column {
        log::warn!("index {index}: external-content mode is always single-column, ignoring multi_column=true");
        options.multi_column = false;
    }

    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {index} (
            doc_id INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT UNIQUE NOT NULL,
            content TEXT NOT NULL,
            body TEXT NOT NULL,
            metadata TEXT NOT NULL,
            language TEXT,
            type TEXT NOT NULL,
            timestamp INTEGER NOT NULL
        );"
    ))?;

    conn.execute_batch(&fts_create_sql(index, &options))?;

    conn.execute_batch(&format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS {vocab} USING fts5vocab('{fts}', 'row');",
        vocab = vocab_table(index),
        fts = fts_table(index),
    ))?;

    if options.spatial_enabled {
        let capability = spatial::detect_capability(conn);
        conn.execute_batch(&spatial::create_table_sql(index, capability))?;
    }

    if options.schema_mode == SchemaMode::Legacy {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                string_id TEXT PRIMARY KEY,
                numeric_id INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_{table}_numeric ON {table}(numeric_id);",
            table = id_map_table(index)
        ))?;
    }

    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {meta} (key TEXT PRIMARY KEY, value TEXT NOT NULL);",
        meta = meta_table(index)
    ))?;
    let options_json = serde_json::to_string(&options)?;
    conn.execute(
        &format!("INSERT OR REPLACE INTO {meta} (key, value) VALUES ('options', ?1)", meta = meta_table(index)),
        [options_json],
    )?;

    register_index(conn, index)?;
    Ok(())
}

fn fts_create_sql(index: &str, options: &IndexOptions) -> String {
    let fts = fts_table(index);
    let detail = options.fts_detail.as_sql();
    let prefix_clause = if options.prefix.is_empty() {
        String::new()
    } else {
        let sizes: Vec<String> = options.prefix.iter().map(|p| p.to_string()).collect();
        format!(", prefix='{}'", sizes.join(" "))
    };

    match options.schema_mode {
        SchemaMode::External => {
            format!(
                "CREATE VIRTUAL TABLE IF NOT EXISTS {fts} USING fts5(
                    body,
                    content='{index}',
                    content_rowid='doc_id',
                    detail={detail}{prefix_clause}
                );"
            )
        }
        SchemaMode::Legacy => {
            let columns: Vec<String> = if options.multi_column {
                options.fts_columns.clone()
            } else {
                vec!["body".to_string()]
            };
            format!(
                "CREATE VIRTUAL TABLE IF NOT EXISTS {fts} USING fts5(
                    string_id UNINDEXED,
                    {cols},
                    detail={detail}{prefix_clause}
                );",
                cols = columns.join(", ")
            )
        }
    }
}

fn register_index(conn: &Connection, index: &str) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS yetisearch_metadata (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        );",
    )?;
    let mut names = list_registered(conn)?;
    if !names.iter().any(|n| n == index) {
        names.push(index.to_string());
        let json = serde_json::to_string(&names)?;
        conn.execute(
            "INSERT INTO yetisearch_metadata (key, value, updated_at)
             VALUES ('indices', ?1, strftime('%s','now'))
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            [json],
        )?;
    }
    Ok(())
}

fn unregister_index(conn: &Connection, index: &str) -> Result<()> {
    let names: Vec<String> = list_registered(conn)?.into_iter().filter(|n| n != index).collect();
    let json = serde_json::to_string(&names)?;
    conn.execute(
        "INSERT INTO yetisearch_metadata (key, value, updated_at)
         VALUES ('indices', ?1, strftime('%s','now'))
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        [json],
    )?;
    Ok(())
}

pub fn list_registered(conn: &Connection) -> Result<Vec<String>> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS yetisearch_metadata (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        );",
    )?;
    let value: Option<String> = conn
        .query_row("SELECT value FROM yetisearch_metadata WHERE key = 'indices'", [], |r| r.get(0))
        .ok();
    match value {
        Some(json) => Ok(serde_json::from_str(&json)?),
        None => Ok(Vec::new()),
    }
}

pub fn index_exists(conn: &Connection, index: &str) -> Result<bool> {
    validate_index_name(index)?;
    Ok(list_registered(conn)?.iter().any(|n| n == index))
}

pub fn drop_index(conn: &Connection, index: &str) -> Result<()> {
    validate_index_name(index)?;
    conn.execute_batch(&format!(
        "DROP TABLE IF EXISTS {index};
         DROP TABLE IF EXISTS {fts};
         DROP TABLE IF EXISTS {vocab};
         DROP TABLE IF EXISTS {spatial};
         DROP TABLE IF EXISTS {id_map};
         DROP TABLE IF EXISTS {meta};",
        fts = fts_table(index),
        vocab = vocab_table(index),
        spatial = spatial::table_name(index),
        id_map = id_map_table(index),
        meta = meta_table(index),
    ))?;
    unregister_index(conn, index)?;
    Ok(())
}

pub fn load_options(conn: &Connection, index: &str) -> Result<IndexOptions> {
    validate_index_name(index)?;
    let meta = meta_table(index);
    let value: String = conn
        .query_row(&format!("SELECT value FROM {meta} WHERE key = 'options'"), [], |r| r.get(0))
        .map_err(|_| Error::InvalidInput(format!("index does not exist: {index}")))?;
    Ok(serde_json::from_str(&value)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unsafe_index_names() {
        assert!(validate_index_name("docs; DROP TABLE x").is_err());
        assert!(validate_index_name("1leading_digit").is_err());
        assert!(validate_index_name("docs").is_ok());
        assert!(validate_index_name("my_index_2").is_ok());
    }

    #[test]
    fn stable_numeric_id_is_deterministic() {
        assert_eq!(stable_numeric_id("doc-1"), stable_numeric_id("doc-1"));
        assert_ne!(stable_numeric_id("doc-1"), stable_numeric_id("doc-2"));
    }
}
