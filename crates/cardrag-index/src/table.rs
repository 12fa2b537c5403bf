//! LanceDB persistence for index entries.
//!
//! One table per index directory; rows carry the corpus ordinal so the
//! in-memory order survives a round trip regardless of storage order.

use arrow_array::{
    Array, BooleanArray, FixedSizeListArray, Float32Array, Int32Array, RecordBatch, RecordBatchIterator, StringArray, UInt32Array,
};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection};
use std::path::Path;
use std::sync::Arc;

use cardrag_core::{CardDocument, CardMetadata, IndexError};

use crate::schema::build_cards_schema;

/// One persisted document: its corpus position, the document and its vector.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub ordinal: usize,
    pub document: CardDocument,
    pub vector: Vec<f32>,
}

pub async fn open_db(dir: &Path) -> Result<Connection, IndexError> {
    connect(dir.to_string_lossy().as_ref()).execute().await.map_err(IndexError::storage)
}

/// Create `table` under `dir` holding every entry in a single batch.
pub async fn write_entries(dir: &Path, table: &str, entries: &[IndexEntry], dim: usize) -> Result<(), IndexError> {
    let conn = open_db(dir).await?;
    let record_batch = entries_to_record_batch(entries, dim)?;
    let schema = record_batch.schema();
    let reader = Box::new(RecordBatchIterator::new(vec![Ok(record_batch)].into_iter(), schema));
    conn.create_table(table, reader).execute().await.map_err(IndexError::storage)?;
    Ok(())
}

/// Read every row of `table`, sorted by ordinal.
pub async fn read_entries(dir: &Path, table: &str, expected: usize) -> Result<Vec<IndexEntry>, IndexError> {
    let conn = open_db(dir).await?;
    let names = conn.table_names().execute().await.map_err(IndexError::storage)?;
    if !names.contains(&table.to_string()) {
        return Err(IndexError::Storage(format!("table '{}' missing under {}", table, dir.display())));
    }
    let t = conn.open_table(table).execute().await.map_err(IndexError::storage)?;
    let mut stream = t.query().limit(expected.max(1)).execute().await.map_err(IndexError::storage)?;
    let mut entries = Vec::with_capacity(expected);
    while let Some(batch) = stream.try_next().await.map_err(IndexError::storage)? {
        entries.extend(record_batch_to_entries(&batch)?);
    }
    entries.sort_by_key(|e| e.ordinal);
    Ok(entries)
}

fn entries_to_record_batch(entries: &[IndexEntry], dim: usize) -> Result<RecordBatch, IndexError> {
    let dim = i32::try_from(dim).map_err(|_| IndexError::Build(format!("vector width {} too large", dim)))?;
    let schema = build_cards_schema(dim);
    let mut ordinals = Vec::new(); let mut names = Vec::new(); let mut banks = Vec::new(); let mut fees = Vec::new();
    let mut switches = Vec::new(); let mut switch_infos = Vec::new(); let mut starts = Vec::new(); let mut ends = Vec::new();
    let mut notes = Vec::new(); let mut contents = Vec::new(); let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::new();
    for e in entries {
        let m = &e.document.metadata;
        ordinals.push(i32::try_from(e.ordinal).map_err(|_| IndexError::Build(format!("ordinal {} too large", e.ordinal)))?);
        names.push(m.card_name.clone()); banks.push(m.bank.clone()); fees.push(m.annual_fee);
        switches.push(m.requires_app_switch); switch_infos.push(m.app_switch_info.clone());
        starts.push(m.start_date.clone()); ends.push(m.end_date.clone()); notes.push(m.notes.clone());
        contents.push(e.document.content.clone());
        vectors.push(Some(e.vector.iter().map(|&x| Some(x)).collect()));
    }
    let record_batch = RecordBatch::try_new(schema, vec![
        Arc::new(Int32Array::from(ordinals)),
        Arc::new(StringArray::from(names)),
        Arc::new(StringArray::from(banks)),
        Arc::new(UInt32Array::from(fees)),
        Arc::new(BooleanArray::from(switches)),
        Arc::new(StringArray::from(switch_infos)),
        Arc::new(StringArray::from(starts)),
        Arc::new(StringArray::from(ends)),
        Arc::new(StringArray::from(notes)),
        Arc::new(StringArray::from(contents)),
        Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors.into_iter(), dim)),
    ]).map_err(IndexError::storage)?;
    Ok(record_batch)
}

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T, IndexError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| IndexError::Storage(format!("cards.{} column missing or mistyped", name)))
}

fn record_batch_to_entries(batch: &RecordBatch) -> Result<Vec<IndexEntry>, IndexError> {
    let ordinals = column::<Int32Array>(batch, "ordinal")?;
    let names = column::<StringArray>(batch, "card_name")?;
    let banks = column::<StringArray>(batch, "bank")?;
    let fees = column::<UInt32Array>(batch, "annual_fee")?;
    let switches = column::<BooleanArray>(batch, "requires_app_switch")?;
    let switch_infos = column::<StringArray>(batch, "app_switch_info")?;
    let starts = column::<StringArray>(batch, "start_date")?;
    let ends = column::<StringArray>(batch, "end_date")?;
    let notes = column::<StringArray>(batch, "notes")?;
    let contents = column::<StringArray>(batch, "content")?;
    let vectors = column::<FixedSizeListArray>(batch, "vector")?;

    let mut out = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        if vectors.is_null(i) {
            return Err(IndexError::Storage(format!("row {} has no vector", i)));
        }
        let values = vectors.value(i);
        let floats = values
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| IndexError::Storage("vector items are not f32".to_string()))?;
        let ordinal = usize::try_from(ordinals.value(i)).map_err(|_| IndexError::Storage(format!("negative ordinal at row {}", i)))?;
        out.push(IndexEntry {
            ordinal,
            document: CardDocument {
                content: contents.value(i).to_string(),
                metadata: CardMetadata {
                    card_name: names.value(i).to_string(),
                    bank: banks.value(i).to_string(),
                    annual_fee: fees.value(i),
                    requires_app_switch: switches.value(i),
                    app_switch_info: switch_infos.value(i).to_string(),
                    start_date: starts.value(i).to_string(),
                    end_date: ends.value(i).to_string(),
                    notes: notes.value(i).to_string(),
                },
            },
            vector: floats.values().to_vec(),
        });
    }
    Ok(out)
}
