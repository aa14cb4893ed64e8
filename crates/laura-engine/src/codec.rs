//! The little-endian metadata codec, plus the document binary codec:
//! BSON's own tagged-variant wire format doubles as the document codec,
//! since it already covers the data model's value shape.

use bson::Document;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::EngineError;

// ── Document codec ──────────────────────────────────────────────

pub fn encode_document(doc: &Document) -> Result<Vec<u8>, EngineError> {
    Ok(bson::to_vec(doc)?)
}

pub fn decode_document(bytes: &[u8]) -> Result<Document, EngineError> {
    Ok(bson::from_slice(bytes)?)
}

pub fn encoded_size(doc: &Document) -> usize {
    bson::to_vec(doc).map(|v| v.len()).unwrap_or(0)
}

// ── Little-endian primitive helpers ─────────────────────────────

fn write_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn write_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn write_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn write_i64(buf: &mut Vec<u8>, v: i64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn write_f64(buf: &mut Vec<u8>, v: f64) {
    buf.extend_from_slice(&v.to_bits().to_le_bytes());
}

fn write_str(buf: &mut Vec<u8>, s: &str) {
    write_u16(buf, s.len() as u16);
    buf.extend_from_slice(s.as_bytes());
}

fn write_json_option(buf: &mut Vec<u8>, value: &Option<JsonValue>) -> Result<(), EngineError> {
    match value {
        None => buf.push(0),
        Some(v) => {
            buf.push(1);
            let json = serde_json::to_vec(v)
                .map_err(|e| EngineError::Serialization(e.to_string()))?;
            write_u16(buf, json.len() as u16);
            buf.extend_from_slice(&json);
        }
    }
    Ok(())
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, pos: 0 }
    }

    fn need(&self, n: usize) -> Result<(), EngineError> {
        if self.pos + n > self.bytes.len() {
            return Err(EngineError::Serialization("truncated metadata record".into()));
        }
        Ok(())
    }

    fn u16(&mut self) -> Result<u16, EngineError> {
        self.need(2)?;
        let v = u16::from_le_bytes(self.bytes[self.pos..self.pos + 2].try_into().unwrap());
        self.pos += 2;
        Ok(v)
    }

    fn u32(&mut self) -> Result<u32, EngineError> {
        self.need(4)?;
        let v = u32::from_le_bytes(self.bytes[self.pos..self.pos + 4].try_into().unwrap());
        self.pos += 4;
        Ok(v)
    }

    fn u64(&mut self) -> Result<u64, EngineError> {
        self.need(8)?;
        let v = u64::from_le_bytes(self.bytes[self.pos..self.pos + 8].try_into().unwrap());
        self.pos += 8;
        Ok(v)
    }

    fn i64(&mut self) -> Result<i64, EngineError> {
        self.need(8)?;
        let v = i64::from_le_bytes(self.bytes[self.pos..self.pos + 8].try_into().unwrap());
        self.pos += 8;
        Ok(v)
    }

    fn f64(&mut self) -> Result<f64, EngineError> {
        self.need(8)?;
        let bits = u64::from_le_bytes(self.bytes[self.pos..self.pos + 8].try_into().unwrap());
        self.pos += 8;
        Ok(f64::from_bits(bits))
    }

    fn byte(&mut self) -> Result<u8, EngineError> {
        self.need(1)?;
        let v = self.bytes[self.pos];
        self.pos += 1;
        Ok(v)
    }

    fn str(&mut self) -> Result<String, EngineError> {
        let len = self.u16()? as usize;
        self.need(len)?;
        let s = std::str::from_utf8(&self.bytes[self.pos..self.pos + len])
            .map_err(|e| EngineError::Serialization(e.to_string()))?
            .to_string();
        self.pos += len;
        Ok(s)
    }

    fn json_option(&mut self) -> Result<Option<JsonValue>, EngineError> {
        let present = self.byte()?;
        if present == 0 {
            return Ok(None);
        }
        let len = self.u16()? as usize;
        self.need(len)?;
        let value = serde_json::from_slice(&self.bytes[self.pos..self.pos + len])
            .map_err(|e| EngineError::Serialization(e.to_string()))?;
        self.pos += len;
        Ok(Some(value))
    }
}

// ── Collection metadata ──────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionOptions {
    pub capped: bool,
    pub max_size: u64,
    pub max_documents: u64,
}

impl Default for CollectionOptions {
    fn default() -> Self {
        CollectionOptions {
            capped: false,
            max_size: 0,
            max_documents: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionMetadata {
    pub id: u32,
    pub name: String,
    pub created_at_millis: i64,
    pub document_count: u64,
    pub data_size: u64,
    pub first_data_page: u32,
    pub schema: Option<JsonValue>,
    pub options: CollectionOptions,
}

pub fn encode_collection_metadata(meta: &CollectionMetadata) -> Result<Vec<u8>, EngineError> {
    let mut buf = Vec::new();
    write_u32(&mut buf, meta.id);
    write_str(&mut buf, &meta.name);
    write_i64(&mut buf, meta.created_at_millis);
    write_u64(&mut buf, meta.document_count);
    write_u64(&mut buf, meta.data_size);
    write_u32(&mut buf, meta.first_data_page);
    write_json_option(&mut buf, &meta.schema)?;
    let options_json = serde_json::to_value(&meta.options)
        .map_err(|e| EngineError::Serialization(e.to_string()))?;
    write_json_option(&mut buf, &Some(options_json))?;
    Ok(buf)
}

pub fn decode_collection_metadata(bytes: &[u8]) -> Result<CollectionMetadata, EngineError> {
    let mut r = Reader::new(bytes);
    let id = r.u32()?;
    let name = r.str()?;
    let created_at_millis = r.i64()?;
    let document_count = r.u64()?;
    let data_size = r.u64()?;
    let first_data_page = r.u32()?;
    let schema = r.json_option()?;
    let options = match r.json_option()? {
        Some(v) => serde_json::from_value(v)
            .map_err(|e| EngineError::Serialization(e.to_string()))?,
        None => CollectionOptions::default(),
    };
    Ok(CollectionMetadata {
        id,
        name,
        created_at_millis,
        document_count,
        data_size,
        first_data_page,
        schema,
        options,
    })
}

// ── Index metadata ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Ordered,
    Unique,
    Text,
    Ttl,
}

impl IndexKind {
    fn to_byte(self) -> u8 {
        match self {
            IndexKind::Ordered => 0,
            IndexKind::Unique => 1,
            IndexKind::Text => 2,
            IndexKind::Ttl => 3,
        }
    }

    fn from_byte(b: u8) -> Result<Self, EngineError> {
        match b {
            0 => Ok(IndexKind::Ordered),
            1 => Ok(IndexKind::Unique),
            2 => Ok(IndexKind::Text),
            3 => Ok(IndexKind::Ttl),
            other => Err(EngineError::Serialization(format!(
                "unknown index kind byte: {other}"
            ))),
        }
    }
}

const FLAG_UNIQUE: u16 = 1 << 0;
const FLAG_SPARSE: u16 = 1 << 1;
const FLAG_PARTIAL: u16 = 1 << 2;

#[derive(Debug, Clone, PartialEq)]
pub struct IndexMetadata {
    pub id: u32,
    pub collection_id: u32,
    pub name: String,
    pub kind: IndexKind,
    pub fields: Vec<String>,
    pub unique: bool,
    pub sparse: bool,
    pub partial: bool,
    pub partial_filter: Option<JsonValue>,
    pub root_page: u32,
    pub entry_count: u64,
    pub order: u16,
    pub ttl_seconds: Option<u64>,
    pub text_weights: Option<JsonValue>,
}

pub fn encode_index_metadata(meta: &IndexMetadata) -> Result<Vec<u8>, EngineError> {
    let mut buf = Vec::new();
    write_u32(&mut buf, meta.id);
    write_u32(&mut buf, meta.collection_id);
    write_str(&mut buf, &meta.name);
    buf.push(meta.kind.to_byte());
    let mut flags = 0u16;
    if meta.unique {
        flags |= FLAG_UNIQUE;
    }
    if meta.sparse {
        flags |= FLAG_SPARSE;
    }
    if meta.partial {
        flags |= FLAG_PARTIAL;
    }
    write_u16(&mut buf, flags);
    write_u16(&mut buf, meta.fields.len() as u16);
    for f in &meta.fields {
        write_str(&mut buf, f);
    }
    write_json_option(&mut buf, &meta.partial_filter)?;
    write_u32(&mut buf, meta.root_page);
    write_u64(&mut buf, meta.entry_count);
    write_u16(&mut buf, meta.order);
    match meta.ttl_seconds {
        Some(secs) => {
            buf.push(1);
            write_u64(&mut buf, secs);
        }
        None => buf.push(0),
    }
    write_json_option(&mut buf, &meta.text_weights)?;
    Ok(buf)
}

pub fn decode_index_metadata(bytes: &[u8]) -> Result<IndexMetadata, EngineError> {
    let mut r = Reader::new(bytes);
    let id = r.u32()?;
    let collection_id = r.u32()?;
    let name = r.str()?;
    let kind = IndexKind::from_byte(r.byte()?)?;
    let flags = r.u16()?;
    let field_count = r.u16()?;
    let mut fields = Vec::with_capacity(field_count as usize);
    for _ in 0..field_count {
        fields.push(r.str()?);
    }
    let partial_filter = r.json_option()?;
    let root_page = r.u32()?;
    let entry_count = r.u64()?;
    let order = r.u16()?;
    let ttl_seconds = match r.byte()? {
        1 => Some(r.u64()?),
        _ => None,
    };
    let text_weights = r.json_option()?;
    Ok(IndexMetadata {
        id,
        collection_id,
        name,
        kind,
        fields,
        unique: flags & FLAG_UNIQUE != 0,
        sparse: flags & FLAG_SPARSE != 0,
        partial: flags & FLAG_PARTIAL != 0,
        partial_filter,
        root_page,
        entry_count,
        order,
        ttl_seconds,
        text_weights,
    })
}

// ── Index statistics ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexStatistics {
    pub entry_count: u64,
    pub last_updated_millis: i64,
    pub avg_key_bytes: f64,
}

pub fn encode_index_statistics(stats: &IndexStatistics) -> Vec<u8> {
    let mut buf = Vec::new();
    write_u64(&mut buf, stats.entry_count);
    write_i64(&mut buf, stats.last_updated_millis);
    write_f64(&mut buf, stats.avg_key_bytes);
    buf
}

pub fn decode_index_statistics(bytes: &[u8]) -> Result<IndexStatistics, EngineError> {
    let mut r = Reader::new(bytes);
    Ok(IndexStatistics {
        entry_count: r.u64()?,
        last_updated_millis: r.i64()?,
        avg_key_bytes: r.f64()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn document_round_trip() {
        let d = doc! { "_id": "a", "n": 1 };
        let bytes = encode_document(&d).unwrap();
        let back = decode_document(&bytes).unwrap();
        assert_eq!(d, back);
    }

    #[test]
    fn collection_metadata_round_trip() {
        let meta = CollectionMetadata {
            id: 3,
            name: "users".into(),
            created_at_millis: 1_700_000_000_000,
            document_count: 42,
            data_size: 4096,
            first_data_page: 7,
            schema: Some(serde_json::json!({"type": "object"})),
            options: CollectionOptions {
                capped: true,
                max_size: 1024,
                max_documents: 10,
            },
        };
        let bytes = encode_collection_metadata(&meta).unwrap();
        let back = decode_collection_metadata(&bytes).unwrap();
        assert_eq!(meta, back);
    }

    #[test]
    fn collection_metadata_round_trip_without_schema() {
        let meta = CollectionMetadata {
            id: 1,
            name: "orders".into(),
            created_at_millis: 0,
            document_count: 0,
            data_size: 0,
            first_data_page: 1,
            schema: None,
            options: CollectionOptions::default(),
        };
        let bytes = encode_collection_metadata(&meta).unwrap();
        let back = decode_collection_metadata(&bytes).unwrap();
        assert_eq!(meta, back);
    }

    #[test]
    fn index_metadata_round_trip() {
        let meta = IndexMetadata {
            id: 1,
            collection_id: 2,
            name: "email".into(),
            kind: IndexKind::Unique,
            fields: vec!["email".into()],
            unique: true,
            sparse: false,
            partial: false,
            partial_filter: None,
            root_page: 5,
            entry_count: 100,
            order: 64,
            ttl_seconds: None,
            text_weights: None,
        };
        let bytes = encode_index_metadata(&meta).unwrap();
        let back = decode_index_metadata(&bytes).unwrap();
        assert_eq!(meta, back);
    }

    #[test]
    fn index_metadata_round_trip_ttl_and_partial() {
        let meta = IndexMetadata {
            id: 2,
            collection_id: 2,
            name: "createdAt_ttl".into(),
            kind: IndexKind::Ttl,
            fields: vec!["createdAt".into()],
            unique: false,
            sparse: true,
            partial: true,
            partial_filter: Some(serde_json::json!({"active": true})),
            root_page: 0,
            entry_count: 0,
            order: 64,
            ttl_seconds: Some(3600),
            text_weights: Some(serde_json::json!({"title": 2, "body": 1})),
        };
        let bytes = encode_index_metadata(&meta).unwrap();
        let back = decode_index_metadata(&bytes).unwrap();
        assert_eq!(meta, back);
    }

    #[test]
    fn index_statistics_round_trip() {
        let stats = IndexStatistics {
            entry_count: 10,
            last_updated_millis: 123,
            avg_key_bytes: 12.5,
        };
        let bytes = encode_index_statistics(&stats);
        let back = decode_index_statistics(&bytes).unwrap();
        assert_eq!(stats, back);
    }
}
