//! JSON answers from free-form model output.
//!
//! Models asked for JSON still wrap it in Markdown fences or chatter around
//! it. [`parse_structured`] digs the object out before deserializing, and
//! [`generate_structured`] can give the model one chance to fix its answer.


use fancy_regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::Result;
use crate::generation::{GenerationRequest, Generator, ResponseFormat};
use crate::prompt::PromptTemplate;

static CODE_FENCE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?[ \t]*\r?\n?(.*?)```").expect("valid regex")
});

const REPAIR_TEMPLATE: &str = "The answer below was supposed to follow these instructions:
{instructions}

Answer:
{completion}

It could not be used because of this error:
{error}

Reply again with only a corrected answer that satisfies the instructions.";

/// One key the model must include in its JSON answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub description: String,
}

impl FieldSpec {
    #[inline]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Instructions describing the expected JSON object, for appending to a prompt
#[inline]
pub fn format_instructions(fields: &[FieldSpec]) -> String {
    let keys: Vec<String> = fields
        .iter()
        .map(|field| format!("  \"{}\": {}", field.name, field.description))
        .collect();

    format!(
        "Respond with a single JSON object and no other text. \
         The object must have exactly these keys:\n{}",
        keys.join("\n")
    )
}

/// Model output after validation against a target type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuredOutput<T> {
    Parsed(T),
    Invalid { reason: String, raw: String },
}

impl<T> StructuredOutput<T> {
    #[inline]
    pub const fn is_parsed(&self) -> bool {
        matches!(self, Self::Parsed(_))
    }

    #[inline]
    pub fn parsed(self) -> Option<T> {
        match self {
            Self::Parsed(value) => Some(value),
            Self::Invalid { .. } => None,
        }
    }
}

/// Deserialize the JSON object contained in `raw`
///
/// Looks inside the first fenced code block if there is one, otherwise takes
/// everything from the first `{` to the last `}`.
#[inline]
pub fn parse_structured<T: DeserializeOwned>(raw: &str) -> StructuredOutput<T> {
    match serde_json::from_str(extract_json(raw)) {
        Ok(value) => StructuredOutput::Parsed(value),
        Err(e) => StructuredOutput::Invalid {
            reason: e.to_string(),
            raw: raw.to_string(),
        },
    }
}

fn extract_json(raw: &str) -> &str {
    let body = match CODE_FENCE_REGEX.captures(raw) {
        Ok(Some(captures)) => captures.get(1).map_or(raw, |m| m.as_str()),
        _ => raw,
    };

    match (body.find('{'), body.rfind('}')) {
        (Some(start), Some(end)) if start < end => body.get(start..=end).unwrap_or(body),
        _ => body.trim(),
    }
}

/// Ask for a JSON answer with the given fields and validate it as `T`
///
/// With `repair` set, an invalid first answer is sent back once together
/// with the parse error; the second answer is returned whatever its state.
/// Service failures are errors, unusable answers are
/// [`StructuredOutput::Invalid`].
#[inline]
pub fn generate_structured<T, G>(
    generator: &G,
    prompt: &str,
    fields: &[FieldSpec],
    temperature: Option<f32>,
    repair: bool,
) -> Result<StructuredOutput<T>>
where
    T: DeserializeOwned,
    G: Generator + ?Sized,
{
    let instructions = format_instructions(fields);
    let full_prompt = format!("{prompt}\n\n{instructions}");
    let repair_template =
        PromptTemplate::parse(REPAIR_TEMPLATE)?.partial(&[("instructions", instructions.as_str())]);

    let first = generator.generate_with(&json_request(&full_prompt, temperature))?;
    let (reason, raw) = match parse_structured(&first) {
        StructuredOutput::Invalid { reason, raw } if repair => (reason, raw),
        output => return Ok(output),
    };

    warn!("Model returned unusable JSON ({}), asking it to repair", reason);

    let repair_prompt = repair_template.render(&[
        ("completion", raw.as_str()),
        ("error", reason.as_str()),
    ])?;
    let second = generator.generate_with(&json_request(&repair_prompt, temperature))?;
    let output = parse_structured(&second);

    debug!("Repair attempt parsed: {}", output.is_parsed());
    Ok(output)
}

fn json_request(prompt: &str, temperature: Option<f32>) -> GenerationRequest<'_> {
    GenerationRequest {
        prompt,
        temperature,
        format: ResponseFormat::Json,
    }
}
