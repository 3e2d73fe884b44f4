//! JSON document artifacts

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use keyharvest_core::{Record, RecordSet, Value, ValueKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value as Json};

use super::column_kinds;
use crate::error::CacheError;

#[derive(Debug, Serialize, Deserialize)]
struct Document {
    dedup_field: String,
    columns: Vec<ColumnDef>,
    records: Vec<Map<String, Json>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ColumnDef {
    name: String,
    kind: String,
}

pub(crate) fn read(path: &Path, dedup_field: &str) -> Result<Option<RecordSet>, CacheError> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(CacheError::io(path, e)),
    };
    let doc: Document =
        serde_json::from_slice(&bytes).map_err(|e| CacheError::corrupt(path, e))?;

    let mut columns = Vec::with_capacity(doc.columns.len());
    for def in doc.columns {
        let kind = ValueKind::from_name(&def.kind).ok_or_else(|| {
            CacheError::corrupt(path, format!("unknown column kind {:?}", def.kind))
        })?;
        columns.push((def.name, kind));
    }

    let mut set = RecordSet::with_columns(
        dedup_field,
        columns.iter().map(|(n, _)| n.clone()).collect(),
    );
    for (idx, obj) in doc.records.into_iter().enumerate() {
        let mut record = Record::new();
        for (name, kind) in &columns {
            let value = decode(*kind, obj.get(name).unwrap_or(&Json::Null))
                .map_err(|msg| CacheError::corrupt(path, format!("record {idx}: {msg}")))?;
            record.insert(name.as_str(), value);
        }
        set.push(record);
    }
    Ok(Some(set))
}

pub(crate) fn write(path: &Path, records: &RecordSet) -> Result<(), CacheError> {
    let schema = column_kinds(records);
    let doc = Document {
        dedup_field: records.dedup_field().to_string(),
        columns: schema
            .iter()
            .map(|(name, kind)| ColumnDef {
                name: name.to_string(),
                kind: kind.name().to_string(),
            })
            .collect(),
        records: records
            .iter()
            .map(|r| {
                schema
                    .iter()
                    .map(|(name, kind)| (name.to_string(), encode(*kind, r.get(name))))
                    .collect()
            })
            .collect(),
    };

    let file = File::create(path).map_err(|e| CacheError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &doc).map_err(|e| CacheError::encode(path, e))?;
    writer.flush().map_err(|e| CacheError::io(path, e))?;
    writer
        .get_ref()
        .sync_all()
        .map_err(|e| CacheError::io(path, e))
}

fn encode(kind: ValueKind, value: &Value) -> Json {
    match (kind, value) {
        (_, Value::Null) => Json::Null,
        (ValueKind::Integer, Value::Integer(i)) => Json::from(*i),
        // Non-finite floats have no JSON number form.
        (ValueKind::Float, Value::Float(x)) => Number::from_f64(*x)
            .map(Json::Number)
            .unwrap_or_else(|| Json::String(x.to_string())),
        (kind, v) => Json::String(kind.encode(v)),
    }
}

fn decode(kind: ValueKind, json: &Json) -> Result<Value, String> {
    match (kind, json) {
        (_, Json::Null) => Ok(Value::Null),
        (ValueKind::Integer, Json::Number(n)) => n
            .as_i64()
            .map(Value::Integer)
            .ok_or_else(|| format!("{n} is not an integer")),
        (ValueKind::Float, Json::Number(n)) => n
            .as_f64()
            .map(Value::Float)
            .ok_or_else(|| format!("{n} is not a float")),
        (kind, Json::String(s)) => kind.decode(s),
        (kind, other) => Err(format!("expected {kind} value, found {other}")),
    }
}
