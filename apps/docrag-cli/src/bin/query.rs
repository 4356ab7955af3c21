use std::env;

use anyhow::{bail, Result};
use docrag_cli::{build_pipeline, init_tracing};
use docrag_core::config::Config;
use docrag_pipeline::AuxiliaryContext;

const USAGE: &str = "Usage: docrag-query <question> [--category ID]... [--user ID] [--rerank] [--json]";

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = Config::load().map_err(|e| { eprintln!("Error loading config: {}", e); e })?;
    let mut settings = config.retrieval_settings()?;

    let args: Vec<String> = env::args().skip(1).collect();
    let mut question: Option<String> = None;
    let mut categories: Vec<String> = Vec::new();
    let mut user = "local".to_string();
    let mut json = false;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--category" | "-c" => {
                let Some(c) = args.get(i + 1) else { bail!("--category requires a value\n{USAGE}") };
                categories.push(c.clone());
                i += 1;
            }
            "--user" => {
                let Some(u) = args.get(i + 1) else { bail!("--user requires a value\n{USAGE}") };
                user = u.clone();
                i += 1;
            }
            "--rerank" => settings.rerank_enabled = true,
            "--json" => json = true,
            a if a.starts_with('-') => bail!("unknown flag {a}\n{USAGE}"),
            a if question.is_none() => question = Some(a.to_string()),
            a => bail!("unexpected argument {a}\n{USAGE}"),
        }
        i += 1;
    }
    let Some(question) = question else { bail!(USAGE) };

    let pipeline = build_pipeline(&config, &settings).await?;
    let aux = AuxiliaryContext::new(user);
    let token = aux.cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    let bundle = pipeline.query(&question, &categories, &settings, &aux).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&bundle)?);
        return Ok(());
    }
    println!("{}", bundle.render());
    let m = &bundle.metrics;
    println!(
        "\n-- {} chunk(s) of {} candidate(s), {} collection(s) queried, {} failed, reranked={}, avg similarity {:.3}, {} ms",
        m.chunks_retrieved, m.candidates_considered, m.collections_queried, m.collections_failed, m.reranked, m.avg_similarity, m.latency_ms
    );
    for (n, c) in bundle.citations.iter().enumerate() {
        println!("   [{}] {} ({}) score={:.4} id={}", n + 1, c.document_name, c.collection_id, c.score, c.chunk_id);
    }
    Ok(())
}
