//! Loads pre-chunked records into a collection table.
//!
//! Chunking and ingestion policy live upstream; this only persists
//! `(record, embedding)` pairs so the store has something to search.

use anyhow::{ensure, Result};
use arrow_array::{FixedSizeListArray, RecordBatch, RecordBatchIterator, StringArray};
use lancedb::Connection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use docrag_core::types::Meta;

use crate::schema::build_collection_schema;
use crate::table::ensure_table;

/// One chunk as produced by the ingestion side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
	pub id: String,
	pub source_document_id: String,
	pub text: String,
	#[serde(default)]
	pub page_or_section: Option<String>,
	#[serde(default)]
	pub metadata: Meta,
}

pub struct CollectionWriter {
	conn: Connection,
	collection_id: String,
	dim: usize,
}

impl CollectionWriter {
	pub fn new(conn: Connection, collection_id: &str, dim: usize) -> Self {
		Self { conn, collection_id: collection_id.to_string(), dim }
	}

	/// Append records with their embeddings, creating the table on first use.
	pub async fn write(&self, records: &[ChunkRecord], embeddings: &[Vec<f32>]) -> Result<usize> {
		if records.is_empty() { return Ok(0); }
		ensure!(records.len() == embeddings.len(), "records and embeddings length must match ({} vs {})", records.len(), embeddings.len());
		for e in embeddings {
			ensure!(e.len() == self.dim, "dim mismatch: got {} expected {}", e.len(), self.dim);
		}
		let dim = i32::try_from(self.dim)?;
		let schema = build_collection_schema(dim);
		ensure_table(&self.conn, &self.collection_id, schema.clone()).await?;

		let batch = records_to_batch(records, embeddings, dim)?;
		let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
		self.conn.open_table(&self.collection_id).execute().await?.add(reader).execute().await?;
		tracing::debug!(collection = %self.collection_id, rows = records.len(), "wrote batch");
		Ok(records.len())
	}
}

fn records_to_batch(records: &[ChunkRecord], embeddings: &[Vec<f32>], dim: i32) -> Result<RecordBatch> {
	let mut ids = Vec::with_capacity(records.len());
	let mut doc_ids = Vec::with_capacity(records.len());
	let mut texts = Vec::with_capacity(records.len());
	let mut locations: Vec<Option<String>> = Vec::with_capacity(records.len());
	let mut metadata = Vec::with_capacity(records.len());
	let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::with_capacity(records.len());
	for (rec, emb) in records.iter().zip(embeddings) {
		ids.push(rec.id.clone());
		doc_ids.push(rec.source_document_id.clone());
		texts.push(rec.text.clone());
		locations.push(rec.page_or_section.clone());
		metadata.push(serde_json::to_string(&rec.metadata)?);
		vectors.push(Some(emb.iter().map(|&x| Some(x)).collect()));
	}
	let batch = RecordBatch::try_new(
		build_collection_schema(dim),
		vec![
			Arc::new(StringArray::from(ids)),
			Arc::new(StringArray::from(doc_ids)),
			Arc::new(StringArray::from(texts)),
			Arc::new(StringArray::from(locations)),
			Arc::new(StringArray::from(metadata)),
			Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors.into_iter(), dim)),
		],
	)?;
	Ok(batch)
}
