use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use episcope::analysis::runner::AnalysisRunner;
use episcope::llm::{HttpSummarizer, StaticSummarizer, Summarizer, TokenUsage};
use episcope::report::ProjectSummary;
use episcope::{
    CachingFetcher, EpiscopeConfig, IssueStore, ProjectData, RelationMap, StoreFetcher,
    TreeBuilder,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("episcope=info")),
        )
        .init();

    let roots: Vec<String> = std::env::args().skip(1).collect();
    if roots.is_empty() {
        eprintln!("Usage: episcope <ROOT-KEY> [<ROOT-KEY> ...]");
        std::process::exit(2);
    }

    let config = EpiscopeConfig::from_env();
    config.ensure_dirs()?;

    let usage = Arc::new(TokenUsage::new(Some(config.token_log_file())));
    let summarizer: Box<dyn Summarizer> = match config.llm_api_key {
        Some(_) => Box::new(HttpSummarizer::new(&config, Arc::clone(&usage))),
        None => {
            warn!("No LLM API key configured, narrative summaries are disabled");
            Box::new(StaticSummarizer::new(
                "LLM-Zusammenfassung nicht verfügbar (kein API-Schlüssel konfiguriert).",
            ))
        }
    };

    let store = IssueStore::open(&config);
    let fetcher = CachingFetcher::new(
        StoreFetcher::new(store.clone()),
        store.clone(),
        config.check_days,
        config.memo_size,
    );
    let builder = TreeBuilder::new(&fetcher, RelationMap::management())
        .include_rejected(config.include_rejected);
    let runner = AnalysisRunner::new(summarizer.as_ref());

    let mut failures = 0usize;
    for root in &roots {
        info!("Processing root issue {}", root);
        let built = match builder.build(root).await {
            Ok(built) => built,
            Err(e) => {
                error!("Skipping {}: {}", root, e);
                failures += 1;
                continue;
            }
        };

        let mut unresolved = built.missing.clone();
        unresolved.extend(fetcher.take_failures());
        if !unresolved.is_empty() {
            warn!(
                "{} issue(s) below {} could not be resolved",
                unresolved.len(),
                root
            );
            store.record_failures(&unresolved)?;
        }

        let mut data = ProjectData::from_built(root, built);
        if !data.is_valid() {
            error!("Skipping {}: traversal produced no nodes", root);
            failures += 1;
            continue;
        }

        let report = runner.run(&mut data, Utc::now()).await;
        let path = ProjectSummary::new(root.clone(), report).save(&config.summary_dir())?;
        info!("Finished {} ({})", root, path.display());
    }

    let (prompt_tokens, completion_tokens) = usage.totals();
    if prompt_tokens + completion_tokens > 0 {
        info!(
            "LLM token usage: {} prompt, {} completion",
            prompt_tokens, completion_tokens
        );
    }

    if failures == roots.len() {
        anyhow::bail!("all {} root issue(s) failed", failures);
    }
    Ok(())
}
