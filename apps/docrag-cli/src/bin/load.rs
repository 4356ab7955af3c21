use std::{env, fs, path::PathBuf};

use anyhow::{bail, Result};
use docrag_cli::{collect_jsonl, collection_id_for, init_tracing, lancedb_dir, read_records};
use docrag_core::config::Config;
use docrag_embed::get_default_embedder;
use docrag_vector::{table::open_db, CollectionWriter};
use indicatif::{ProgressBar, ProgressStyle};

const USAGE: &str = "Usage: docrag-load <dir-or-file.jsonl>... [--fresh] [--batch N]";

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = Config::load().map_err(|e| { eprintln!("Error loading config: {}", e); e })?;

    let args: Vec<String> = env::args().skip(1).collect();
    let mut inputs: Vec<PathBuf> = Vec::new();
    let mut fresh = false;
    let mut batch = 32usize;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--fresh" => fresh = true,
            "--batch" => {
                batch = match args.get(i + 1).and_then(|v| v.parse::<usize>().ok()) {
                    Some(n) if n > 0 => n,
                    _ => bail!("--batch requires a positive number\n{USAGE}"),
                };
                i += 1;
            }
            a if a.starts_with('-') => bail!("unknown flag {a}\n{USAGE}"),
            a => inputs.push(PathBuf::from(a)),
        }
        i += 1;
    }
    if inputs.is_empty() {
        bail!(USAGE);
    }

    let db_dir = lancedb_dir(&config);
    if fresh && db_dir.exists() {
        tracing::info!(dir = %db_dir.display(), "removing existing database");
        fs::remove_dir_all(&db_dir)?;
    }
    fs::create_dir_all(&db_dir)?;
    let conn = open_db(&db_dir.to_string_lossy()).await?;
    let embedder = get_default_embedder()?;

    let files: Vec<PathBuf> = inputs.iter().flat_map(|p| collect_jsonl(p)).collect();
    if files.is_empty() {
        bail!("no .jsonl files found");
    }
    let mut total = 0usize;
    for file in &files {
        let Some(collection) = collection_id_for(file) else { continue };
        let records = read_records(file)?;
        let pb = ProgressBar::new(records.len() as u64);
        pb.set_style(ProgressStyle::with_template("{msg:>24} [{bar:40}] {pos}/{len} ({eta})")?.progress_chars("=> "));
        pb.set_message(collection.clone());

        let writer = CollectionWriter::new(conn.clone(), &collection, embedder.dim());
        for part in records.chunks(batch) {
            let texts: Vec<String> = part.iter().map(|r| r.text.clone()).collect();
            let embeddings = embedder.embed_batch(&texts)?;
            total += writer.write(part, &embeddings).await?;
            pb.inc(part.len() as u64);
        }
        pb.finish();
        tracing::info!(collection = %collection, records = records.len(), "collection loaded");
    }
    println!("Loaded {} records into {} collection(s) at {}", total, files.len(), db_dir.display());
    Ok(())
}
