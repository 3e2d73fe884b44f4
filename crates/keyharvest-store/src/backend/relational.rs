//! DuckDB artifacts
//!
//! One database file per key with three tables:
//!
//! - `records (pos BIGINT, c0 .., cN ..)`: one row per record, typed columns
//! - `artifact_columns (position, name, kind)`: column names and kinds
//! - `artifact_meta (dedup_field, record_count)`
//!
//! Data columns are named positionally so arbitrary field names never have
//! to be quoted into SQL.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use duckdb::types::Value as Cell;
use duckdb::{AccessMode, Config, Connection, params};
use keyharvest_core::{Record, RecordSet, Value, ValueKind};

use super::column_kinds;
use crate::atomic::remove_if_exists;
use crate::error::CacheError;

const MAGIC: &[u8] = b"DUCK";

const SCHEMA: &str = "
    CREATE TABLE artifact_columns (position BIGINT, name VARCHAR, kind VARCHAR);
    CREATE TABLE artifact_meta (dedup_field VARCHAR, record_count BIGINT);
";

fn sql_type(kind: ValueKind) -> &'static str {
    match kind {
        ValueKind::Integer => "BIGINT",
        ValueKind::Float => "DOUBLE",
        ValueKind::Text | ValueKind::Timestamp | ValueKind::Mixed => "VARCHAR",
    }
}

pub(crate) fn read(path: &Path, dedup_field: &str) -> Result<Option<RecordSet>, CacheError> {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(CacheError::io(path, e)),
    };
    check_magic(path, &mut file)?;
    drop(file);

    // The file is a DuckDB database at this point; failing to open it is
    // an environment problem (lock held, unreadable block), not corruption.
    let unavailable = |e: duckdb::Error| CacheError::io(path, io::Error::other(e.to_string()));
    let config = Config::default()
        .access_mode(AccessMode::ReadOnly)
        .map_err(unavailable)?;
    let conn = Connection::open_with_flags(path, config).map_err(unavailable)?;
    let corrupt = |e: duckdb::Error| CacheError::corrupt(path, e);

    let mut stmt = conn
        .prepare("SELECT name, kind FROM artifact_columns ORDER BY position")
        .map_err(corrupt)?;
    let defs = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
        .map_err(corrupt)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(corrupt)?;

    let mut columns = Vec::with_capacity(defs.len());
    for (name, kind) in defs {
        let kind = ValueKind::from_name(&kind)
            .ok_or_else(|| CacheError::corrupt(path, format!("unknown column kind {kind:?}")))?;
        columns.push((name, kind));
    }

    let expected: i64 = conn
        .query_row("SELECT record_count FROM artifact_meta", [], |row| row.get(0))
        .map_err(corrupt)?;

    if expected < 0 {
        return Err(CacheError::corrupt(path, format!("negative record count {expected}")));
    }

    let mut set = RecordSet::with_columns(
        dedup_field,
        columns.iter().map(|(n, _)| n.clone()).collect(),
    );
    if columns.is_empty() {
        // Records without fields have no `records` table; the count is
        // all there is.
        for _ in 0..expected {
            set.push(Record::new());
        }
        return Ok(Some(set));
    }

    let select = (0..columns.len())
        .map(|i| format!("c{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let mut stmt = conn
        .prepare(&format!("SELECT {select} FROM records ORDER BY pos"))
        .map_err(corrupt)?;
    let width = columns.len();
    let rows = stmt
        .query_map([], |row| {
            (0..width)
                .map(|i| row.get::<_, Cell>(i))
                .collect::<Result<Vec<_>, _>>()
        })
        .map_err(corrupt)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(corrupt)?;

    if rows.len() as i64 != expected {
        return Err(CacheError::corrupt(
            path,
            format!("expected {expected} records, found {}", rows.len()),
        ));
    }

    for (idx, row) in rows.into_iter().enumerate() {
        let mut record = Record::new();
        for ((name, kind), cell) in columns.iter().zip(row) {
            let value = decode(*kind, cell)
                .map_err(|msg| CacheError::corrupt(path, format!("row {idx}: {msg}")))?;
            record.insert(name.as_str(), value);
        }
        set.push(record);
    }
    Ok(Some(set))
}

pub(crate) fn write(path: &Path, records: &RecordSet) -> Result<(), CacheError> {
    let encode_err = |e: duckdb::Error| CacheError::encode(path, e);
    let schema = column_kinds(records);

    let conn = Connection::open(path).map_err(encode_err)?;
    conn.execute_batch(SCHEMA).map_err(encode_err)?;
    conn.execute(
        "INSERT INTO artifact_meta VALUES (?, ?)",
        params![records.dedup_field(), records.len() as i64],
    )
    .map_err(encode_err)?;

    if !schema.is_empty() {
        let mut stmt = conn
            .prepare("INSERT INTO artifact_columns VALUES (?, ?, ?)")
            .map_err(encode_err)?;
        for (pos, (name, kind)) in schema.iter().enumerate() {
            stmt.execute(params![pos as i64, name, kind.name()])
                .map_err(encode_err)?;
        }

        let ddl = schema
            .iter()
            .enumerate()
            .map(|(i, (_, kind))| format!("c{i} {}", sql_type(*kind)))
            .collect::<Vec<_>>()
            .join(", ");
        conn.execute_batch(&format!("CREATE TABLE records (pos BIGINT, {ddl});"))
            .map_err(encode_err)?;

        let mut appender = conn.appender("records").map_err(encode_err)?;
        for (pos, record) in records.iter().enumerate() {
            let mut row = Vec::with_capacity(schema.len() + 1);
            row.push(Cell::BigInt(pos as i64));
            row.extend(schema.iter().map(|(name, kind)| encode(*kind, record.get(name))));
            appender
                .append_row(duckdb::appender_params_from_iter(&row))
                .map_err(encode_err)?;
        }
        appender.flush().map_err(encode_err)?;
    }

    conn.close().map_err(|(_, e)| encode_err(e))
}

/// Main header: 8-byte checksum followed by the `DUCK` magic.
fn check_magic(path: &Path, file: &mut File) -> Result<(), CacheError> {
    let mut header = [0u8; 12];
    match file.read_exact(&mut header) {
        Ok(()) if &header[8..] == MAGIC => Ok(()),
        Ok(()) => Err(CacheError::corrupt(path, "not a DuckDB database")),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            Err(CacheError::corrupt(path, "truncated DuckDB header"))
        }
        Err(e) => Err(CacheError::io(path, e)),
    }
}

/// DuckDB may leave a write-ahead log next to a database it wrote.
pub(crate) fn remove_wal(db: &Path) {
    let mut name = db.as_os_str().to_os_string();
    name.push(".wal");
    let wal = PathBuf::from(name);
    if let Err(e) = remove_if_exists(&wal) {
        log::warn!("could not remove {}: {e}", wal.display());
    }
}

fn encode(kind: ValueKind, value: &Value) -> Cell {
    match (kind, value) {
        (_, Value::Null) => Cell::Null,
        (ValueKind::Integer, Value::Integer(i)) => Cell::BigInt(*i),
        (ValueKind::Float, Value::Float(x)) => Cell::Double(*x),
        (kind, v) => Cell::Text(kind.encode(v)),
    }
}

fn decode(kind: ValueKind, cell: Cell) -> Result<Value, String> {
    match (kind, cell) {
        (_, Cell::Null) => Ok(Value::Null),
        (ValueKind::Integer, Cell::BigInt(i)) => Ok(Value::Integer(i)),
        (ValueKind::Float, Cell::Double(x)) => Ok(Value::Float(x)),
        (kind, Cell::Text(s)) => kind.decode(&s),
        (kind, other) => Err(format!("expected {kind} cell, found {other:?}")),
    }
}
