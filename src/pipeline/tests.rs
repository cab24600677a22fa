use super::*;
use crate::RagError;
use crate::embeddings::HashedEmbedder;
use crate::ingest::split;
use std::fs;
use std::sync::Mutex;
use tempfile::TempDir;

const CAPITALS: &str = "Delhi is the capital of India.\n\n\
                        Washington is the capital of USA.\n\n\
                        Paris is the capital of France.";

/// Returns a fixed answer and remembers the prompts it was given
struct CannedGenerator {
    reply: String,
    prompts: Mutex<Vec<(String, Option<f32>)>>,
}

impl CannedGenerator {
    fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn last_prompt(&self) -> Option<(String, Option<f32>)> {
        self.prompts
            .lock()
            .expect("lock should not be poisoned")
            .last()
            .cloned()
    }
}

impl Generator for CannedGenerator {
    fn generate_with(&self, request: &GenerationRequest<'_>) -> Result<String> {
        self.prompts
            .lock()
            .expect("lock should not be poisoned")
            .push((request.prompt.to_string(), request.temperature));
        Ok(self.reply.clone())
    }
}

struct DownGenerator;

impl Generator for DownGenerator {
    fn generate_with(&self, _request: &GenerationRequest<'_>) -> Result<String> {
        Err(RagError::GenerationService(
            "HTTP 503: model is loading".to_string(),
        ))
    }
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.chunking.chunk_size = 40;
    config.chunking.overlap = 0;
    config.retrieval.top_k = 2;
    config
}

fn capitals_pipeline<G: Generator>(generator: G) -> RagPipeline<HashedEmbedder, G> {
    let embedder = HashedEmbedder::default();
    let chunks = split(CAPITALS, 40, 0).expect("should split");
    let index = build_index(&embedder, chunks, EmbedOptions::default(), None)
        .expect("should build index");
    RagPipeline::from_index(embedder, generator, index, &test_config())
}

#[test]
fn build_index_covers_every_chunk() {
    let embedder = HashedEmbedder::new(64).expect("should create embedder");
    let chunks = split(CAPITALS, 20, 4).expect("should split");
    let count = chunks.len();

    let index = build_index(
        &embedder,
        chunks,
        EmbedOptions {
            batch_size: 2,
            workers: 3,
        },
        None,
    )
    .expect("should build index");

    assert_eq!(index.len(), count);
    assert_eq!(index.dimension(), Some(64));
}

#[test]
fn embed_options_follow_config() {
    let mut config = Config::default();
    config.ollama.batch_size = 8;
    config.retrieval.embed_workers = 2;

    assert_eq!(
        embed_options(&config),
        EmbedOptions {
            batch_size: 8,
            workers: 2
        }
    );
}

#[test]
fn prepare_builds_grounded_prompt() {
    let pipeline = capitals_pipeline(CannedGenerator::new("unused"));

    let prepared = pipeline
        .prepare("What is the capital of France?")
        .expect("should prepare");

    assert_eq!(prepared.hits.len(), 2);
    assert!(prepared.hits[0].chunk.text.contains("Paris"));
    assert!(prepared.prompt.contains("Paris is the capital of France."));
    assert!(prepared.prompt.ends_with("What is the capital of France?\n"));
    assert!(pipeline.generator().last_prompt().is_none());
}

#[test]
fn ask_returns_answer_with_sources() {
    let pipeline = capitals_pipeline(CannedGenerator::new("  Paris.\n"));

    let answer = pipeline
        .ask("What is the capital of France?")
        .expect("should answer");

    assert_eq!(answer.text, "Paris.");
    assert!(!answer.is_unknown());
    assert_eq!(answer.sources.len(), 2);
    assert_eq!(answer.sources[0].id, 2);
    assert!(answer.sources[0].score >= answer.sources[1].score);

    let (prompt, temperature) = pipeline
        .generator()
        .last_prompt()
        .expect("generator should have been called");
    assert!(prompt.contains("Context:\nParis is the capital of France."));
    assert_eq!(temperature, Some(Config::default().generation.temperature));
}

#[test]
fn unknown_answer_is_detected() {
    let pipeline = capitals_pipeline(CannedGenerator::new("I don't know."));

    let answer = pipeline
        .ask("Who painted the Mona Lisa?")
        .expect("should answer");

    assert!(answer.is_unknown());
}

#[test]
fn unknown_detection_is_lenient_about_wrapping() {
    for text in ["\"I don't know.\"", "i don't know", " I DON'T KNOW. "] {
        let answer = Answer {
            text: text.to_string(),
            sources: Vec::new(),
        };
        assert!(answer.is_unknown(), "{text:?} should be unknown");
    }

    let answer = Answer {
        text: "I don't know much, but Paris.".to_string(),
        sources: Vec::new(),
    };
    assert!(!answer.is_unknown());
}

#[test]
fn generation_failure_yields_no_answer() {
    let pipeline = capitals_pipeline(DownGenerator);

    let error = pipeline
        .ask("What is the capital of France?")
        .expect_err("should fail");

    assert_eq!(error.kind(), "GenerationServiceError");
}

#[test]
fn pipeline_survives_failed_query() {
    let pipeline = capitals_pipeline(DownGenerator);
    assert!(pipeline.ask("first").is_err());

    let prepared = pipeline.prepare("capital of India").expect("should prepare");
    assert!(prepared.hits[0].chunk.text.contains("Delhi"));
}

#[test]
fn builder_overrides() {
    let pipeline = capitals_pipeline(CannedGenerator::new("ok"))
        .with_top_k(1)
        .with_temperature(0.0)
        .with_assembler(
            PromptAssembler::with_template("{context} | {question}").expect("valid template"),
        );

    let prepared = pipeline.prepare("India").expect("should prepare");
    assert_eq!(prepared.hits.len(), 1);
    assert_eq!(prepared.prompt, "Delhi is the capital of India. | India");

    pipeline.ask("India").expect("should answer");
    let (_, temperature) = pipeline
        .generator()
        .last_prompt()
        .expect("generator should have been called");
    assert_eq!(temperature, Some(0.0));
}

#[test]
fn from_source_indexes_file() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("capitals.txt");
    fs::write(&path, CAPITALS).expect("should write source");

    let pipeline = RagPipeline::from_source(
        &path,
        &test_config(),
        HashedEmbedder::default(),
        CannedGenerator::new("New Delhi"),
    )
    .expect("should build pipeline");

    assert_eq!(pipeline.index().len(), 3);
    assert_eq!(pipeline.top_k(), 2);
    let answer = pipeline.ask("capital of India").expect("should answer");
    assert_eq!(answer.sources[0].id, 0);
}

#[test]
fn from_source_missing_file() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    let result = RagPipeline::from_source(
        temp_dir.path().join("missing.txt"),
        &test_config(),
        HashedEmbedder::default(),
        CannedGenerator::new("unused"),
    );

    assert!(matches!(result, Err(RagError::SourceNotFound(_))));
}

#[test]
fn from_source_rejects_invalid_chunking() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("capitals.txt");
    fs::write(&path, CAPITALS).expect("should write source");
    let mut config = test_config();
    config.chunking.overlap = config.chunking.chunk_size;

    let result = RagPipeline::from_source(
        &path,
        &config,
        HashedEmbedder::default(),
        CannedGenerator::new("unused"),
    );

    assert!(matches!(result, Err(RagError::InvalidConfig(_))));
}

#[test]
fn empty_document_answers_from_no_context() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("empty.txt");
    fs::write(&path, "").expect("should write source");

    let pipeline = RagPipeline::from_source(
        &path,
        &test_config(),
        HashedEmbedder::default(),
        CannedGenerator::new("I don't know."),
    )
    .expect("should build pipeline");

    let answer = pipeline.ask("anything").expect("should answer");
    assert!(answer.sources.is_empty());
    assert!(answer.is_unknown());
}

#[derive(Debug, PartialEq, serde::Deserialize)]
struct CityAnswer {
    city: String,
}

#[test]
fn extract_parses_fenced_json_answer() {
    let pipeline = capitals_pipeline(CannedGenerator::new(
        "```json\n{\"city\": \"Paris\"}\n```",
    ));
    let fields = [FieldSpec::new("city", "name of the city")];

    let extraction = pipeline
        .extract::<CityAnswer>("capital of France", &fields, false)
        .expect("should extract");

    assert_eq!(
        extraction.output,
        StructuredOutput::Parsed(CityAnswer {
            city: "Paris".to_string()
        })
    );
    assert_eq!(extraction.sources[0].id, 2);

    let (prompt, temperature) = pipeline
        .generator()
        .last_prompt()
        .expect("generator should be called");
    assert!(prompt.contains("Paris is the capital of France."));
    assert!(prompt.contains("\"city\": name of the city"));
    assert_eq!(temperature, Some(test_config().generation.temperature));
}

#[test]
fn extract_without_repair_reports_invalid_answer() {
    let pipeline = capitals_pipeline(CannedGenerator::new("It is Paris."));
    let fields = [FieldSpec::new("city", "name of the city")];

    let extraction = pipeline
        .extract::<CityAnswer>("capital of France", &fields, false)
        .expect("service call should succeed");

    match extraction.output {
        StructuredOutput::Invalid { raw, .. } => assert_eq!(raw, "It is Paris."),
        StructuredOutput::Parsed(parsed) => panic!("unexpected parse: {parsed:?}"),
    }
}

#[test]
fn extract_propagates_generation_failure() {
    let pipeline = capitals_pipeline(DownGenerator);

    let result = pipeline.extract::<CityAnswer>(
        "capital of France",
        &[FieldSpec::new("city", "name of the city")],
        true,
    );

    assert!(matches!(result, Err(RagError::GenerationService(_))));
}

#[test]
fn answer_serializes_with_sources() {
    let pipeline = capitals_pipeline(CannedGenerator::new("Paris."));
    let answer = pipeline
        .ask("capital of France")
        .expect("should answer");

    let json = serde_json::to_value(&answer).expect("should serialize");

    assert_eq!(json["text"], "Paris.");
    assert_eq!(json["sources"][0]["id"], 2);
    assert!(json["sources"][0]["score"].is_number());
}
