// Retrieval-augmented question answering
// Wires ingestion, embedding, the index, prompt assembly and generation together

#[cfg(test)]
mod tests;

use indicatif::ProgressBar;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use tracing::{debug, info};

use crate::Result;
use crate::config::Config;
use crate::embeddings::{EmbedOptions, Embedder, embed_all};
use crate::generation::{GenerationRequest, Generator};
use crate::index::{FlatIndex, RetrievalResult, VectorIndex};
use crate::ingest::{Chunk, ingest_file};
use crate::prompt::{PromptAssembler, UNKNOWN_ANSWER};
use crate::retriever::Retriever;
use crate::structured::{FieldSpec, StructuredOutput, generate_structured};

/// Embed `chunks` and build a searchable index from them
///
/// Nothing is returned unless every chunk was embedded.
#[inline]
pub fn build_index<E: Embedder + ?Sized>(
    embedder: &E,
    chunks: Vec<Chunk>,
    options: EmbedOptions,
    progress: Option<&ProgressBar>,
) -> Result<FlatIndex> {
    let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
    let embeddings = embed_all(embedder, &texts, options, progress)?;
    let index = FlatIndex::build(chunks, embeddings)?;

    info!(
        "Built index of {} chunks with {} ({:?} dimensions)",
        index.len(),
        embedder.model_name(),
        index.dimension()
    );
    Ok(index)
}

/// Embedding batching and parallelism taken from the configuration
#[inline]
pub fn embed_options(config: &Config) -> EmbedOptions {
    EmbedOptions {
        batch_size: config.ollama.batch_size.max(1) as usize,
        workers: config.retrieval.embed_workers,
    }
}

/// Where an answer's supporting context came from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceRef {
    pub id: usize,
    pub source_offset: usize,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    /// Chunks that were put in the prompt, best match first
    pub sources: Vec<SourceRef>,
}

impl Answer {
    /// Whether the model declared the context insufficient
    #[inline]
    pub fn is_unknown(&self) -> bool {
        let text = self.text.trim().trim_matches('"');
        text.eq_ignore_ascii_case(UNKNOWN_ANSWER)
            || text.eq_ignore_ascii_case(UNKNOWN_ANSWER.trim_end_matches('.'))
    }
}

/// Structured answer to a question, with the chunks it was drawn from
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction<T> {
    pub output: StructuredOutput<T>,
    pub sources: Vec<SourceRef>,
}

/// Prompt built for a question, together with the chunks it was built from
#[derive(Debug, Clone)]
pub struct PreparedPrompt<'a> {
    pub prompt: String,
    pub hits: RetrievalResult<'a>,
}

impl PreparedPrompt<'_> {
    #[inline]
    pub fn sources(&self) -> Vec<SourceRef> {
        self.hits
            .iter()
            .map(|hit| SourceRef {
                id: hit.chunk.id,
                source_offset: hit.chunk.source_offset,
                score: hit.score,
            })
            .collect()
    }
}

/// Question answering over one indexed document
pub struct RagPipeline<E, G, I = FlatIndex> {
    embedder: E,
    generator: G,
    index: I,
    assembler: PromptAssembler,
    top_k: usize,
    temperature: f32,
}

impl<E, G> RagPipeline<E, G, FlatIndex>
where
    E: Embedder,
    G: Generator,
{
    /// Load, split and embed a document, then index it
    ///
    /// Fails without building anything if the source is missing, the
    /// configuration is invalid, or any chunk fails to embed.
    #[inline]
    pub fn from_source<P: AsRef<Path>>(
        path: P,
        config: &Config,
        embedder: E,
        generator: G,
    ) -> Result<Self> {
        config.validate()?;

        let chunks = ingest_file(path, &config.chunking)?;
        let index = build_index(&embedder, chunks, embed_options(config), None)?;

        Ok(Self::from_index(embedder, generator, index, config))
    }
}

impl<E, G, I> RagPipeline<E, G, I>
where
    E: Embedder,
    G: Generator,
    I: VectorIndex,
{
    /// Assemble a pipeline around an index that is already built
    #[inline]
    pub fn from_index(embedder: E, generator: G, index: I, config: &Config) -> Self {
        Self {
            embedder,
            generator,
            index,
            assembler: PromptAssembler::default(),
            top_k: config.retrieval.top_k,
            temperature: config.generation.temperature,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_assembler(mut self, assembler: PromptAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    #[inline]
    #[must_use]
    pub const fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    #[inline]
    #[must_use]
    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    #[inline]
    pub const fn index(&self) -> &I {
        &self.index
    }

    #[inline]
    pub const fn embedder(&self) -> &E {
        &self.embedder
    }

    #[inline]
    pub const fn generator(&self) -> &G {
        &self.generator
    }

    #[inline]
    pub const fn top_k(&self) -> usize {
        self.top_k
    }

    #[inline]
    pub const fn retriever(&self) -> Retriever<'_, E, I> {
        Retriever::new(&self.embedder, &self.index)
    }

    /// Retrieve context and build the prompt without calling the generator
    #[inline]
    pub fn prepare(&self, question: &str) -> Result<PreparedPrompt<'_>> {
        let hits = self.retriever().retrieve(question, self.top_k)?;
        let prompt = self
            .assembler
            .assemble(hits.iter().map(|hit| hit.chunk), question);

        debug!(
            "Prepared prompt of {} characters from {} chunks",
            prompt.chars().count(),
            hits.len()
        );
        Ok(PreparedPrompt { prompt, hits })
    }

    /// Answer a question from the indexed document
    #[inline]
    pub fn ask(&self, question: &str) -> Result<Answer> {
        let prepared = self.prepare(question)?;
        let request = GenerationRequest::new(&prepared.prompt).with_temperature(self.temperature);
        let text = self.generator.generate_with(&request)?;

        let answer = Answer {
            text: text.trim().to_string(),
            sources: prepared.sources(),
        };

        info!(
            "Answered from {} chunks{}",
            answer.sources.len(),
            if answer.is_unknown() {
                " (context insufficient)"
            } else {
                ""
            }
        );
        Ok(answer)
    }

    /// Answer a question as a JSON object with the given fields
    ///
    /// Retrieval and prompt assembly are the same as for [`RagPipeline::ask`];
    /// the model is asked for JSON and its reply is validated as `T`.
    #[inline]
    pub fn extract<T: DeserializeOwned>(
        &self,
        question: &str,
        fields: &[FieldSpec],
        repair: bool,
    ) -> Result<Extraction<T>> {
        let prepared = self.prepare(question)?;
        let output = generate_structured(
            &self.generator,
            &prepared.prompt,
            fields,
            Some(self.temperature),
            repair,
        )?;

        info!(
            "Extracted {} fields from {} chunks (parsed: {})",
            fields.len(),
            prepared.hits.len(),
            output.is_parsed()
        );
        Ok(Extraction {
            output,
            sources: prepared.sources(),
        })
    }
}
