use anyhow::{Context, Result};
use clap::ValueEnum;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::Config;
use crate::embeddings::{Embedder, HashedEmbedder, OllamaEmbedder};
use crate::generation::OllamaGenerator;
use crate::index::{FlatIndex, VectorIndex, cosine_similarity};
use crate::ingest::{Chunk, ingest_file};
use crate::pipeline::{RagPipeline, build_index, embed_options};
use crate::retriever::Retriever;
use crate::structured::{FieldSpec, StructuredOutput};

/// Number of leading embedding values shown by `embed`
const PREVIEW_VALUES: usize = 5;

/// Embedding backend selectable from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum EmbedderChoice {
    /// Ollama embedding model from the configuration
    #[default]
    Ollama,
    /// Offline bag-of-words hashing, no server needed
    Hashed,
}

/// How `search`, `ask` and `extract` print their results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Styled text for a terminal
    #[default]
    Text,
    /// Pretty-printed JSON on stdout
    Json,
}

/// Where `search` and `ask` get their index from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexSource {
    /// Ingest and embed this document now
    Document(PathBuf),
    /// Load a snapshot written by `index`
    Snapshot(PathBuf),
}

impl IndexSource {
    /// A document when given, otherwise the snapshot path or the configured default
    #[inline]
    pub fn resolve(
        document: Option<PathBuf>,
        snapshot: Option<PathBuf>,
        config: &Config,
    ) -> Self {
        match (document, snapshot) {
            (Some(document), _) => Self::Document(document),
            (None, Some(snapshot)) => Self::Snapshot(snapshot),
            (None, None) => Self::Snapshot(config.index_snapshot_path()),
        }
    }
}

#[inline]
pub fn make_embedder(choice: EmbedderChoice, config: &Config) -> Result<Box<dyn Embedder>> {
    Ok(match choice {
        EmbedderChoice::Ollama => Box::new(
            OllamaEmbedder::new(&config.ollama).context("Failed to create Ollama embedder")?,
        ),
        EmbedderChoice::Hashed => Box::new(HashedEmbedder::default()),
    })
}

/// Ingest a document, embed it and write an index snapshot
#[inline]
pub fn index_document(
    config: &Config,
    embedder: &dyn Embedder,
    source: &Path,
    output: Option<PathBuf>,
) -> Result<PathBuf> {
    let chunks = ingest_file(source, &config.chunking)
        .with_context(|| format!("Failed to ingest {}", source.display()))?;

    let index = embed_with_progress(config, embedder, chunks)?;
    let output = output.unwrap_or_else(|| config.index_snapshot_path());
    index
        .save(&output, embedder.model_name())
        .with_context(|| format!("Failed to save index to {}", output.display()))?;

    eprintln!(
        "{} Indexed {} chunks from {} ({} dimensions)",
        style("✓").green(),
        style(index.len()).cyan(),
        style(source.display()).cyan(),
        index.dimension().unwrap_or_default()
    );
    eprintln!("Index saved to: {}", style(output.display()).dim());

    Ok(output)
}

/// Build or load the index for a query
#[inline]
pub fn open_index(
    config: &Config,
    embedder: &dyn Embedder,
    source: &IndexSource,
) -> Result<FlatIndex> {
    match source {
        IndexSource::Document(path) => {
            let chunks = ingest_file(path, &config.chunking)
                .with_context(|| format!("Failed to ingest {}", path.display()))?;
            embed_with_progress(config, embedder, chunks)
        }
        IndexSource::Snapshot(path) => {
            FlatIndex::load(path, embedder.model_name()).with_context(|| {
                format!(
                    "Failed to load index snapshot {} (run `ollama-rag index <FILE>` first)",
                    path.display()
                )
            })
        }
    }
}

/// Print the chunks most similar to `query`
#[inline]
pub fn search(
    config: &Config,
    embedder: &dyn Embedder,
    source: &IndexSource,
    query: &str,
    top_k: Option<usize>,
    format: OutputFormat,
) -> Result<()> {
    let index = open_index(config, embedder, source)?;
    let hits = Retriever::new(embedder, &index)
        .retrieve(query, top_k.unwrap_or(config.retrieval.top_k))
        .context("Search failed")?;

    if format == OutputFormat::Json {
        println!(
            "{}",
            serde_json::to_string_pretty(&hits).context("Failed to serialize search hits")?
        );
        return Ok(());
    }

    if hits.is_empty() {
        println!("No chunks indexed.");
        return Ok(());
    }

    for (rank, hit) in hits.iter().enumerate() {
        println!(
            "{} {} {}",
            style(format!("#{}", rank + 1)).bold(),
            style(format!("chunk {}", hit.chunk.id)).cyan(),
            style(format!(
                "score {:.4} @ char {}",
                hit.score, hit.chunk.source_offset
            ))
            .dim()
        );
        println!("{}", hit.chunk.text.trim());
        println!();
    }

    Ok(())
}

/// Answer a question from the indexed document
///
/// With `dry_run` the assembled prompt is printed and no model is called.
#[inline]
pub fn ask(
    config: &Config,
    embedder: &dyn Embedder,
    source: &IndexSource,
    question: &str,
    top_k: Option<usize>,
    dry_run: bool,
    format: OutputFormat,
) -> Result<()> {
    let index = open_index(config, embedder, source)?;
    let generator = OllamaGenerator::new(&config.ollama, &config.generation)
        .context("Failed to create Ollama chat client")?;
    let pipeline = RagPipeline::from_index(embedder, generator, index, config)
        .with_top_k(top_k.unwrap_or(config.retrieval.top_k));

    if dry_run {
        let prepared = pipeline.prepare(question).context("Retrieval failed")?;
        println!("{}", prepared.prompt);
        return Ok(());
    }

    let answer = pipeline.ask(question).context("Failed to answer question")?;
    info!("Answer used {} source chunks", answer.sources.len());

    if format == OutputFormat::Json {
        println!(
            "{}",
            serde_json::to_string_pretty(&answer).context("Failed to serialize answer")?
        );
        return Ok(());
    }

    println!("{}", answer.text);
    if answer.is_unknown() {
        eprintln!(
            "{}",
            style("The indexed document does not contain the answer.").yellow()
        );
    }

    if !answer.sources.is_empty() {
        eprintln!();
        eprintln!("{}", style("Sources:").bold());
        for source in &answer.sources {
            eprintln!(
                "  chunk {} @ char {} (score {:.4})",
                style(source.id).cyan(),
                source.source_offset,
                source.score
            );
        }
    }

    Ok(())
}

/// Parse a `--field` argument of the form `name=description`
#[inline]
pub fn parse_field_spec(arg: &str) -> std::result::Result<FieldSpec, String> {
    let (name, description) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=DESCRIPTION, got '{arg}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("field name is empty in '{arg}'"));
    }
    Ok(FieldSpec::new(name, description.trim()))
}

/// Settings for [`extract`] beyond the question itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExtractOptions {
    pub top_k: Option<usize>,
    /// Give the model one chance to fix invalid JSON
    pub repair: bool,
    pub format: OutputFormat,
}

/// Answer a question as a JSON object with the requested fields
///
/// The object is printed on stdout. An answer that is still not valid JSON
/// after the optional repair round is reported on stderr and fails the
/// command.
#[inline]
pub fn extract(
    config: &Config,
    embedder: &dyn Embedder,
    source: &IndexSource,
    question: &str,
    fields: &[FieldSpec],
    options: ExtractOptions,
) -> Result<()> {
    let index = open_index(config, embedder, source)?;
    let generator = OllamaGenerator::new(&config.ollama, &config.generation)
        .context("Failed to create Ollama chat client")?;
    let pipeline = RagPipeline::from_index(embedder, generator, index, config)
        .with_top_k(options.top_k.unwrap_or(config.retrieval.top_k));

    let extraction = pipeline
        .extract::<serde_json::Map<String, serde_json::Value>>(question, fields, options.repair)
        .context("Failed to extract fields")?;

    let object = match require_fields(extraction.output, fields) {
        StructuredOutput::Parsed(object) => object,
        StructuredOutput::Invalid { reason, raw } => {
            eprintln!("{}", style("Model output:").bold());
            eprintln!("{raw}");
            anyhow::bail!("Model did not return the requested JSON: {reason}");
        }
    };

    if options.format == OutputFormat::Json {
        let report = serde_json::json!({
            "fields": object,
            "sources": extraction.sources,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize extraction")?
        );
        return Ok(());
    }

    for field in fields {
        let value = object.get(&field.name).map_or_else(String::new, |value| {
            value
                .as_str()
                .map_or_else(|| value.to_string(), str::to_string)
        });
        println!("{} {}", style(format!("{}:", field.name)).bold(), value);
    }
    if !extraction.sources.is_empty() {
        let ids: Vec<String> = extraction
            .sources
            .iter()
            .map(|source| source.id.to_string())
            .collect();
        eprintln!("{} {}", style("Source chunks:").dim(), ids.join(", "));
    }

    Ok(())
}

/// Reject parsed objects that leave out a requested key
fn require_fields(
    output: StructuredOutput<serde_json::Map<String, serde_json::Value>>,
    fields: &[FieldSpec],
) -> StructuredOutput<serde_json::Map<String, serde_json::Value>> {
    match output {
        StructuredOutput::Parsed(object) => {
            let missing: Vec<&str> = fields
                .iter()
                .filter(|field| !object.contains_key(&field.name))
                .map(|field| field.name.as_str())
                .collect();
            if missing.is_empty() {
                StructuredOutput::Parsed(object)
            } else {
                StructuredOutput::Invalid {
                    reason: format!("missing keys: {}", missing.join(", ")),
                    raw: serde_json::Value::Object(object).to_string(),
                }
            }
        }
        invalid @ StructuredOutput::Invalid { .. } => invalid,
    }
}

/// Show what the embedder makes of a query and, optionally, some documents
#[inline]
pub fn inspect_embeddings(
    embedder: &dyn Embedder,
    query: &str,
    documents: &[String],
) -> Result<()> {
    let query_vector = embedder.embed(query).context("Failed to embed query")?;

    println!(
        "{} {}",
        style("Model:").bold(),
        style(embedder.model_name()).cyan()
    );
    println!("{} {}", style("Dimension:").bold(), query_vector.len());
    println!(
        "{} {:?}",
        style("First values:").bold(),
        query_vector.iter().take(PREVIEW_VALUES).collect::<Vec<_>>()
    );

    if documents.is_empty() {
        return Ok(());
    }

    let document_vectors = embedder
        .embed_batch(documents)
        .context("Failed to embed documents")?;

    println!();
    println!("{}", style("Similarity to query:").bold());
    for (document, vector) in documents.iter().zip(&document_vectors) {
        println!(
            "  {:>7.4}  {}",
            cosine_similarity(&query_vector, vector),
            document
        );
    }

    Ok(())
}

fn embed_with_progress(
    config: &Config,
    embedder: &dyn Embedder,
    chunks: Vec<Chunk>,
) -> Result<FlatIndex> {
    let progress = progress_bar(chunks.len() as u64)?;
    let index = build_index(embedder, chunks, embed_options(config), progress.as_ref())
        .context("Failed to build index")?;

    if let Some(bar) = progress {
        bar.finish_and_clear();
    }
    Ok(index)
}

fn progress_bar(total: u64) -> Result<Option<ProgressBar>> {
    if !std::io::stderr().is_terminal() {
        return Ok(None);
    }

    let style = ProgressStyle::with_template(
        "{spinner:.green} Embedding [{bar:40.cyan/blue}] {pos}/{len} chunks ({eta})",
    )
    .context("Invalid progress bar template")?
    .progress_chars("=> ");

    let bar = ProgressBar::new(total);
    bar.set_style(style);
    Ok(Some(bar))
}
