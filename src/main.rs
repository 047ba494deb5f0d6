//! ragquery - Main CLI Entry Point

use anyhow::{Context as _, Result};
use clap::Parser;
use colored::Colorize;
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::time::Duration;

use ragquery::cli::{Args, Commands, Verbosity};
use ragquery::config::{RagConfig, VectorStoreBackend};
use ragquery::pipeline::QueryPipeline;
use ragquery::server;
use ragquery::telemetry::init_tracing;
use ragquery::types::{Query, QueryResponse, RankedCandidate, StreamEvent};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let verbosity = args.verbosity();

    init_tracing(args.verbose, args.log_format.into());

    let mut config = RagConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    config.apply_overrides(args.settings.overrides());

    match args.command {
        Commands::Serve => run_server(config).await,
        Commands::Ask {
            question,
            stream,
            corpus,
            threshold,
            no_rerank,
        } => {
            if let Some(path) = corpus {
                config.vector_store.backend = VectorStoreBackend::Memory;
                config.vector_store.corpus_path = Some(path);
            }
            config.server.expose_error_details = true;

            let mut query = Query::new(question);
            if let Some(threshold) = threshold {
                query = query.with_threshold(threshold);
            }
            if no_rerank {
                query = query.with_rerank(false);
            }

            let pipeline = load_pipeline(&config, verbosity).await?;
            if stream {
                ask_streaming(&pipeline, query, verbosity).await
            } else {
                ask(&pipeline, query, verbosity).await
            }
        }
        Commands::Config => show_config(&config),
    }
}

async fn run_server(config: RagConfig) -> Result<()> {
    let pipeline = QueryPipeline::from_config(&config)
        .await
        .context("Failed to initialize query pipeline")?;

    tracing::info!(
        model = pipeline.model_id(),
        reranker = pipeline.reranker_available(),
        "pipeline ready"
    );

    server::serve(&config.server, pipeline).await?;
    Ok(())
}

async fn load_pipeline(config: &RagConfig, verbosity: Verbosity) -> Result<QueryPipeline> {
    let pb = verbosity.show_progress().then(|| {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message("Loading models...");
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    });

    let result = QueryPipeline::from_config(config).await;

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    result.context("Failed to initialize query pipeline")
}

async fn ask(pipeline: &QueryPipeline, query: Query, verbosity: Verbosity) -> Result<()> {
    let response = pipeline.execute_query(query).await;

    if !response.success {
        return Err(failure(&response));
    }

    if let Some(answer) = &response.answer {
        println!("{}", answer);
    }

    if verbosity.show_details() {
        if let Some(sources) = &response.sources {
            print_sources(sources);
        }
        if let Some(message) = &response.message {
            println!("{}", message.dimmed());
        }
    }
    Ok(())
}

async fn ask_streaming(pipeline: &QueryPipeline, query: Query, verbosity: Verbosity) -> Result<()> {
    let mut events = match pipeline.execute_query_stream(query).await {
        Ok(events) => events,
        Err(response) => return Err(failure(&response)),
    };

    let mut stdout = std::io::stdout();

    while let Some(event) = events.next().await {
        match event {
            StreamEvent::Sources(sources) => {
                if verbosity.show_details() {
                    print_sources(&sources);
                }
            }
            StreamEvent::Metadata(metadata) => {
                if verbosity.show_details() {
                    eprintln!(
                        "{} {} sources, threshold {}, reranker {}",
                        "▸".cyan(),
                        metadata.num_sources,
                        metadata.match_threshold,
                        metadata.reranker
                    );
                }
            }
            StreamEvent::Chunk(text) => {
                print!("{}", text);
                stdout.flush()?;
            }
            StreamEvent::Done(_) => {
                println!();
            }
            StreamEvent::Error(failure) => {
                println!();
                anyhow::bail!("{} ({})", failure.error, failure.kind);
            }
        }
    }
    Ok(())
}

fn print_sources(sources: &[RankedCandidate]) {
    if sources.is_empty() {
        eprintln!("{}", "No matching documents found".yellow());
        return;
    }

    eprintln!("{}", "Sources:".bold());
    for source in sources {
        let preview: String = source.content().chars().take(80).collect();
        eprintln!(
            "  {} {} {} {}",
            format!("[{}]", source.rank).cyan(),
            format!("{:.3}", source.relevance_score).green(),
            source.candidate.topic.dimmed(),
            preview.replace('\n', " ")
        );
    }
}

fn failure(response: &QueryResponse) -> anyhow::Error {
    let error = response.error.as_deref().unwrap_or("Unknown error");
    match &response.details {
        Some(details) => anyhow::anyhow!("{}: {}", error, details),
        None => anyhow::anyhow!("{}", error),
    }
}

fn show_config(config: &RagConfig) -> Result<()> {
    let mut shown = config.clone();
    if shown.vector_store.api_key.is_some() {
        shown.vector_store.api_key = Some("********".to_string());
    }
    if shown.reranker.api_key.is_some() {
        shown.reranker.api_key = Some("********".to_string());
    }

    let rendered = toml::to_string_pretty(&shown).context("Failed to render configuration")?;

    println!("{}", "Current configuration".bold());
    if let Some(path) = RagConfig::default_path() {
        println!("{} {}", "Default file:".dimmed(), path.display());
    }
    println!();
    println!("{}", rendered);
    Ok(())
}
