use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use console::style;
use ollama_rag::RagError;
use ollama_rag::commands::{
    EmbedderChoice, ExtractOptions, IndexSource, OutputFormat, ask, extract, index_document,
    inspect_embeddings, make_embedder, parse_field_spec, search,
};
use ollama_rag::config::{Config, ConfigError, run_interactive_config, show_config};
use ollama_rag::structured::FieldSpec;

#[derive(Parser)]
#[command(name = "ollama-rag")]
#[command(about = "Answer questions about a text document with a local Ollama server")]
#[command(version)]
struct Cli {
    /// Embedding backend
    #[arg(long, value_enum, global = true, default_value_t = EmbedderChoice::Ollama)]
    embedder: EmbedderChoice,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama connection and retrieval settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Split and embed a document, then save the index
    Index {
        /// UTF-8 text file to index
        source: PathBuf,
        /// Where to write the index snapshot (defaults to the config directory)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Show the chunks most similar to a query
    Search {
        query: String,
        /// Index this document instead of loading a saved snapshot
        #[arg(long, short)]
        source: Option<PathBuf>,
        /// Saved index snapshot to search
        #[arg(long, conflicts_with = "source")]
        index: Option<PathBuf>,
        /// Number of chunks to show
        #[arg(long, short = 'k')]
        top_k: Option<usize>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Answer a question using the indexed document as context
    Ask {
        question: String,
        /// Index this document instead of loading a saved snapshot
        #[arg(long, short)]
        source: Option<PathBuf>,
        /// Saved index snapshot to answer from
        #[arg(long, conflicts_with = "source")]
        index: Option<PathBuf>,
        /// Number of chunks to put in the prompt
        #[arg(long, short = 'k')]
        top_k: Option<usize>,
        /// Print the prompt instead of calling the chat model
        #[arg(long)]
        dry_run: bool,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Answer a question as a JSON object with the given fields
    Extract {
        question: String,
        /// Field to fill, as NAME=DESCRIPTION (repeatable)
        #[arg(long = "field", short = 'f', required = true, value_parser = parse_field_spec)]
        fields: Vec<FieldSpec>,
        /// Index this document instead of loading a saved snapshot
        #[arg(long, short)]
        source: Option<PathBuf>,
        /// Saved index snapshot to answer from
        #[arg(long, conflicts_with = "source")]
        index: Option<PathBuf>,
        /// Number of chunks to put in the prompt
        #[arg(long, short = 'k')]
        top_k: Option<usize>,
        /// Fail on invalid JSON instead of asking the model to fix it
        #[arg(long)]
        no_repair: bool,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Print a query's embedding and its similarity to some documents
    Embed {
        query: String,
        /// Documents to compare against the query
        documents: Vec<String>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}: {:#}", style("error").red().bold(), error_kind(&e), e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                run_interactive_config()?;
            }
        }
        Commands::Index { source, output } => {
            let config = Config::load_default()?;
            let embedder = make_embedder(cli.embedder, &config)?;
            index_document(&config, embedder.as_ref(), &source, output)?;
        }
        Commands::Search {
            query,
            source,
            index,
            top_k,
            format,
        } => {
            let config = Config::load_default()?;
            let embedder = make_embedder(cli.embedder, &config)?;
            let source = IndexSource::resolve(source, index, &config);
            search(&config, embedder.as_ref(), &source, &query, top_k, format)?;
        }
        Commands::Ask {
            question,
            source,
            index,
            top_k,
            dry_run,
            format,
        } => {
            let config = Config::load_default()?;
            let embedder = make_embedder(cli.embedder, &config)?;
            let source = IndexSource::resolve(source, index, &config);
            ask(
                &config,
                embedder.as_ref(),
                &source,
                &question,
                top_k,
                dry_run,
                format,
            )?;
        }
        Commands::Extract {
            question,
            fields,
            source,
            index,
            top_k,
            no_repair,
            format,
        } => {
            let config = Config::load_default()?;
            let embedder = make_embedder(cli.embedder, &config)?;
            let source = IndexSource::resolve(source, index, &config);
            let options = ExtractOptions {
                top_k,
                repair: !no_repair,
                format,
            };
            extract(
                &config,
                embedder.as_ref(),
                &source,
                &question,
                &fields,
                options,
            )?;
        }
        Commands::Embed { query, documents } => {
            let config = Config::load_default()?;
            let embedder = make_embedder(cli.embedder, &config)?;
            inspect_embeddings(embedder.as_ref(), &query, &documents)?;
        }
    }

    Ok(())
}

/// Category label of the first library error in the chain
fn error_kind(error: &anyhow::Error) -> &'static str {
    error
        .chain()
        .find_map(|cause| {
            cause
                .downcast_ref::<RagError>()
                .map(RagError::kind)
                .or_else(|| {
                    cause
                        .downcast_ref::<ConfigError>()
                        .map(|_| "InvalidConfig")
                })
        })
        .unwrap_or("Error")
}
