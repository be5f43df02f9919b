use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use inquire::error::InquireResult;

mod chunker;
mod cli;
mod config;
mod corpus;
mod qa;
mod retrieval;
#[cfg(test)]
mod tests;
mod web;

use chunker::SemanticChunker;
use config::Config;
use qa::{AnswerGenerator, ChatCompletionsGenerator};
use retrieval::{Embedder, EmbeddingModel, LoadOutcome, Retriever, VectorStore};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = cli::Args::parse();
    let config = Config::load_with(&config::default_base_path());

    match args.command {
        cli::Command::Prepare { input, output } => {
            let pages_path = input.map(PathBuf::from).unwrap_or_else(|| config.pages_path());
            let chunks_path = output.map(PathBuf::from).unwrap_or_else(|| config.chunks_path());

            let pages = corpus::load_pages(&pages_path)?;
            if pages.is_empty() {
                bail!("no pages in {:?}; nothing to prepare", pages_path);
            }

            let embedder = load_embedder(&config)?;
            let chunker = SemanticChunker::new(config.chunker_config(), embedder)?;
            let chunks = corpus::prepare_chunks(&pages, &chunker)?;

            if let Some(parent) = chunks_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            corpus::save_chunks(&chunks_path, &chunks)?;

            println!(
                "{} pages -> {} chunks ({:?})",
                pages.len(),
                chunks.len(),
                chunks_path
            );
            Ok(())
        }

        cli::Command::Build { data, yes } => {
            let chunks_path = data.map(PathBuf::from).unwrap_or_else(|| config.chunks_path());
            let chunks = corpus::load_chunks(&chunks_path)?;

            let embedder = load_embedder(&config)?;
            let mut store = VectorStore::new(embedder, config.metric(), config.index_dir());

            if store.stats().persisted && !yes {
                match inquire::prompt_confirmation(
                    "A persisted index already exists and will be replaced. Continue?",
                ) {
                    InquireResult::Ok(true) => {}
                    InquireResult::Ok(false) => return Ok(()),
                    InquireResult::Err(err) => bail!("An error occurred: {}", err),
                }
            }

            store.build(&chunks)?;
            store.persist()?;

            println!(
                "{}",
                serde_json::to_string_pretty(&store.stats()).unwrap()
            );
            Ok(())
        }

        cli::Command::Search { query, top_k } => {
            let store = open_store(&config)?;
            let results =
                Retriever::new(&store).search(&query, top_k.unwrap_or(config.index.top_k));
            println!("{}", serde_json::to_string_pretty(&results).unwrap());
            Ok(())
        }

        cli::Command::Ask {
            question,
            top_k,
            json,
        } => {
            let store = open_store(&config)?;
            let generator = ChatCompletionsGenerator::from_config(&config.llm)?;
            let top_k = top_k.unwrap_or(config.index.top_k);

            match question {
                Some(question) => {
                    let response = qa::answer_question(&store, &generator, &question, top_k);
                    if json {
                        println!("{}", serde_json::to_string_pretty(&response).unwrap());
                    } else {
                        print_answer(&response);
                    }
                    Ok(())
                }
                None => chat_loop(&store, &generator, &config, top_k),
            }
        }

        cli::Command::Stats {} => {
            let embedder = load_embedder(&config)?;
            let mut store = VectorStore::new(embedder, config.metric(), config.index_dir());
            match corpus::load_chunks(&config.chunks_path()) {
                Ok(chunks) => {
                    let _ = store.load(&chunks);
                }
                Err(err) => log::warn!("corpus unavailable: {err}"),
            }
            println!("{}", serde_json::to_string_pretty(&store.stats()).unwrap());
            Ok(())
        }

        cli::Command::Serve { addr } => {
            let store = open_store(&config)?;
            let generator: Option<Box<dyn AnswerGenerator>> =
                match ChatCompletionsGenerator::from_config(&config.llm) {
                    Ok(generator) => Some(Box::new(generator)),
                    Err(err) => {
                        log::warn!("answer generation disabled: {err}");
                        None
                    }
                };

            web::start_daemon(
                web::ServeState {
                    store,
                    config,
                    generator,
                },
                addr,
            );
            Ok(())
        }
    }
}

/// Initialize the embedding provider from config.
fn load_embedder(config: &Config) -> anyhow::Result<Arc<dyn Embedder>> {
    let model = EmbeddingModel::new(
        &config.embedding.model,
        PathBuf::from(config.base_path()),
        Some(Duration::from_secs(config.embedding.download_timeout_secs)),
    )?;
    Ok(Arc::new(model))
}

/// Load the corpus and the persisted index, or explain what to run first.
fn open_store(config: &Config) -> anyhow::Result<VectorStore> {
    let chunks = corpus::load_chunks(&config.chunks_path())
        .context("could not load the prepared corpus")?;

    let embedder = load_embedder(config)?;
    let mut store = VectorStore::new(embedder, config.metric(), config.index_dir());

    match store.load(&chunks) {
        LoadOutcome::Loaded { documents } => {
            log::debug!("index ready ({documents} documents)");
            Ok(store)
        }
        LoadOutcome::NotFound => {
            bail!("no index found - run `siteqa build` first")
        }
        LoadOutcome::Failed { reason } => {
            bail!("persisted index is unusable ({reason}) - run `siteqa build` to rebuild")
        }
    }
}

fn print_answer(response: &qa::QaResponse) {
    println!("{}", response.answer);
    println!();
    println!("Confidence: {:.1}%", response.confidence * 100.0);
    if response.sources_used > 0 {
        println!("Based on {} relevant sources", response.sources_used);
    }
}

/// Interactive chat mode: one question per line until quit.
fn chat_loop(
    store: &VectorStore,
    generator: &dyn AnswerGenerator,
    config: &Config,
    top_k: usize,
) -> anyhow::Result<()> {
    println!(
        "Ask anything about {} (type 'quit' to exit)",
        config.llm.site_name
    );

    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break; // EOF
        }
        let question = line.trim();

        if question.is_empty() {
            continue;
        }
        if matches!(question.to_lowercase().as_str(), "quit" | "exit" | "bye") {
            break;
        }

        let response = qa::answer_question(store, generator, question, top_k);
        println!();
        print_answer(&response);
        println!();
    }

    Ok(())
}
