use anyhow::{anyhow, Result};
use arrow_array::{Array, Float32Array, RecordBatch, StringArray};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType};

use docrag_core::error::Error;
use docrag_core::traits::VectorStore;
use docrag_core::types::{Meta, VectorMatch};

use crate::table::{open_db, table_exists};

/// `VectorStore` over a LanceDB directory, one table per collection.
#[derive(Clone)]
pub struct LanceVectorStore {
	pub(crate) db: Connection,
}

impl LanceVectorStore {
	pub async fn open(uri: &str) -> Result<Self> {
		Ok(Self { db: open_db(uri).await? })
	}

	pub fn new(db: Connection) -> Self { Self { db } }

	pub fn connection(&self) -> &Connection { &self.db }
}

#[async_trait]
impl VectorStore for LanceVectorStore {
	async fn count(&self, collection_id: &str) -> Result<usize> {
		if !table_exists(&self.db, collection_id).await? { return Ok(0); }
		let table = self.db.open_table(collection_id).execute().await?;
		Ok(table.count_rows(None).await?)
	}

	async fn search(&self, collection_id: &str, vector: &[f32], k: usize) -> Result<Vec<VectorMatch>> {
		if !table_exists(&self.db, collection_id).await? {
			return Err(Error::NotFound(format!("collection '{collection_id}'")).into());
		}
		let table = self.db.open_table(collection_id).execute().await?;
		let mut stream = table
			.vector_search(vector.to_vec())?
			.distance_type(DistanceType::Cosine)
			.limit(k)
			.execute()
			.await?;
		let mut matches = Vec::new();
		while let Some(batch) = stream.try_next().await? {
			read_matches(&batch, &mut matches)?;
		}
		Ok(matches)
	}
}

fn string_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
	batch
		.column_by_name(name)
		.and_then(|c| c.as_any().downcast_ref::<StringArray>())
		.ok_or_else(|| anyhow!("missing {name} column"))
}

fn read_matches(batch: &RecordBatch, out: &mut Vec<VectorMatch>) -> Result<()> {
	let ids = string_col(batch, "id")?;
	let doc_ids = string_col(batch, "source_document_id")?;
	let texts = string_col(batch, "text")?;
	let locations = string_col(batch, "page_or_section")?;
	let metadata = string_col(batch, "metadata")?;
	let distances = batch
		.column_by_name("_distance")
		.and_then(|c| c.as_any().downcast_ref::<Float32Array>())
		.ok_or_else(|| anyhow!("missing _distance column"))?;
	for i in 0..batch.num_rows() {
		let meta = parse_metadata(ids.value(i), metadata.value(i));
		out.push(VectorMatch {
			id: ids.value(i).to_string(),
			distance: distances.value(i),
			source_document_id: doc_ids.value(i).to_string(),
			text: texts.value(i).to_string(),
			page_or_section: (!locations.is_null(i)).then(|| locations.value(i).to_string()),
			metadata: meta,
		});
	}
	Ok(())
}

fn parse_metadata(chunk_id: &str, raw: &str) -> Meta {
	match serde_json::from_str(raw) {
		Ok(meta) => meta,
		Err(e) => {
			tracing::warn!(chunk = chunk_id, error = %e, "malformed chunk metadata, using empty map");
			Meta::default()
		}
	}
}
