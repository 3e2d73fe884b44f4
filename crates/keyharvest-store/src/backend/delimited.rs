//! CSV artifacts
//!
//! Header cells are `name:kind`. A null cell is `\N`; any other cell that
//! starts with `\` gets one extra leading `\`. Records without any field
//! are written under the single header cell `\N:rows`, one empty row each.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use keyharvest_core::{Record, RecordSet, Value, ValueKind};

use super::column_kinds;
use crate::error::CacheError;

const NULL_CELL: &str = "\\N";
const FIELDLESS_HEADER: &str = "\\N:rows";

pub(crate) fn read(path: &Path, dedup_field: &str) -> Result<Option<RecordSet>, CacheError> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(CacheError::io(path, e)),
    };
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(io::BufReader::new(file));

    let header = reader
        .headers()
        .map_err(|e| csv_error(path, e, |m| CacheError::corrupt(path, m)))?
        .clone();
    if header.len() == 1 && &header[0] == FIELDLESS_HEADER {
        let mut set = RecordSet::new(dedup_field);
        for row in reader.records() {
            row.map_err(|e| csv_error(path, e, |m| CacheError::corrupt(path, m)))?;
            set.push(Record::new());
        }
        return Ok(Some(set));
    }

    let mut columns = Vec::with_capacity(header.len());
    for cell in &header {
        let (name, kind) = cell
            .rsplit_once(':')
            .ok_or_else(|| CacheError::corrupt(path, format!("header cell {cell:?} has no kind")))?;
        let kind = ValueKind::from_name(kind)
            .ok_or_else(|| CacheError::corrupt(path, format!("unknown column kind {kind:?}")))?;
        columns.push((name.to_string(), kind));
    }

    let mut set = RecordSet::with_columns(
        dedup_field,
        columns.iter().map(|(n, _)| n.clone()).collect(),
    );
    for (line, row) in reader.records().enumerate() {
        let row = row.map_err(|e| csv_error(path, e, |m| CacheError::corrupt(path, m)))?;
        let mut record = Record::new();
        for ((name, kind), cell) in columns.iter().zip(row.iter()) {
            let value = decode_cell(*kind, cell)
                .map_err(|msg| CacheError::corrupt(path, format!("row {}: {msg}", line + 1)))?;
            record.insert(name.as_str(), value);
        }
        set.push(record);
    }
    Ok(Some(set))
}

pub(crate) fn write(path: &Path, records: &RecordSet) -> Result<(), CacheError> {
    let file = File::create(path).map_err(|e| CacheError::io(path, e))?;
    let schema = column_kinds(records);
    if schema.is_empty() && records.is_empty() {
        return Ok(());
    }

    let encode_err = |e| csv_error(path, e, |m| CacheError::encode(path, m));
    let mut writer = csv::Writer::from_writer(BufWriter::new(file));
    if schema.is_empty() {
        writer.write_record([FIELDLESS_HEADER]).map_err(encode_err)?;
        for _ in records {
            writer.write_record([""]).map_err(encode_err)?;
        }
    } else {
        writer
            .write_record(schema.iter().map(|(name, kind)| format!("{name}:{}", kind.name())))
            .map_err(encode_err)?;
        for record in records {
            let row = schema
                .iter()
                .map(|(name, kind)| encode_cell(*kind, record.get(name)));
            writer.write_record(row).map_err(encode_err)?;
        }
    }

    let mut inner = writer
        .into_inner()
        .map_err(|e| CacheError::io(path, io::Error::other(e.to_string())))?;
    inner.flush().map_err(|e| CacheError::io(path, e))?;
    inner
        .get_ref()
        .sync_all()
        .map_err(|e| CacheError::io(path, e))
}

fn encode_cell(kind: ValueKind, value: &Value) -> String {
    if value.is_null() {
        return NULL_CELL.to_string();
    }
    let text = kind.encode(value);
    if text.starts_with('\\') {
        format!("\\{text}")
    } else {
        text
    }
}

fn decode_cell(kind: ValueKind, cell: &str) -> Result<Value, String> {
    if cell == NULL_CELL {
        return Ok(Value::Null);
    }
    kind.decode(cell.strip_prefix('\\').unwrap_or(cell))
}

/// I/O failures stay I/O; everything else is classified by `other`.
fn csv_error(path: &Path, e: csv::Error, other: impl FnOnce(String) -> CacheError) -> CacheError {
    let message = e.to_string();
    match e.into_kind() {
        csv::ErrorKind::Io(io) => CacheError::io(path, io),
        _ => other(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(set: &RecordSet) -> RecordSet {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.csv");
        write(&path, set).unwrap();
        read(&path, set.dedup_field()).unwrap().unwrap()
    }

    #[test]
    fn header_carries_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.csv");
        let set = RecordSet::from_records(
            "uri",
            [Record::new().with("uri", "at://1").with("likes", 4)],
        );
        write(&path, &set).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("uri:text,likes:int\n"));
    }

    #[test]
    fn null_and_backslash_text_survive() {
        let set = RecordSet::from_records(
            "uri",
            [
                Record::new().with("uri", "1").with("text", "\\N"),
                Record::new().with("uri", "2").with("text", Value::Null),
                Record::new().with("uri", "3").with("text", "\\\\x"),
                Record::new().with("uri", "4").with("text", ""),
            ],
        );
        assert_eq!(roundtrip(&set), set);
    }

    #[test]
    fn multiline_and_commas_survive() {
        let set = RecordSet::from_records(
            "uri",
            [Record::new().with("uri", "1").with("text", "a, \"b\"\nnext line")],
        );
        assert_eq!(roundtrip(&set), set);
    }

    #[test]
    fn column_name_with_colon() {
        let set = RecordSet::from_records("a:b", [Record::new().with("a:b", 1)]);
        assert_eq!(roundtrip(&set), set);
    }

    #[test]
    fn missing_file_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read(&dir.path().join("nope.csv"), "uri").unwrap().is_none());
    }

    #[test]
    fn empty_set_writes_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.csv");
        write(&path, &RecordSet::new("uri")).unwrap();
        assert_eq!(std::fs::read(&path).unwrap().len(), 0);
        let back = read(&path, "uri").unwrap().unwrap();
        assert!(back.is_empty());
        assert!(back.columns().is_empty());
    }

    #[test]
    fn fieldless_records_keep_their_count() {
        let set = RecordSet::from_records("uri", [Record::new(), Record::new()]);
        let back = roundtrip(&set);
        assert_eq!(back.len(), 2);
        assert_eq!(back, set);
    }

    #[test]
    fn bad_header_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.csv");
        std::fs::write(&path, "uri,text\n1,x\n").unwrap();
        assert!(read(&path, "uri").unwrap_err().is_corruption());
    }

    #[test]
    fn bad_cell_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.csv");
        std::fs::write(&path, "uri:int\nabc\n").unwrap();
        assert!(read(&path, "uri").unwrap_err().is_corruption());
    }

    #[test]
    fn ragged_row_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.csv");
        std::fs::write(&path, "uri:text,text:text\n1,x,extra\n").unwrap();
        assert!(read(&path, "uri").unwrap_err().is_corruption());
    }
}
