#[cfg(test)]
mod tests;

use crate::ingest::Chunk;
use crate::{RagError, Result};

/// Answer the model is instructed to give when the context is insufficient
pub const UNKNOWN_ANSWER: &str = "I don't know.";

/// Default grounding instructions used by [`PromptAssembler`]
pub const RAG_TEMPLATE: &str = "You are an assistant that answers questions using ONLY the provided context.
If the answer is not contained in the context, say \"I don't know.\"

Context:
{context}

Question:
{question}
";

const CONTEXT_VARIABLE: &str = "context";
const QUESTION_VARIABLE: &str = "question";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Variable(String),
}

/// Text with `{name}` placeholders
///
/// `{{` and `}}` stand for literal braces. Substituted values are inserted
/// verbatim and never re-parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
}

impl PromptTemplate {
    /// Parse a template, rejecting unbalanced braces and empty or non-identifier names
    #[inline]
    pub fn parse(template: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.char_indices().peekable();

        while let Some((position, c)) = chars.next() {
            match c {
                '{' if chars.next_if(|&(_, next)| next == '{').is_some() => literal.push('{'),
                '}' if chars.next_if(|&(_, next)| next == '}').is_some() => literal.push('}'),
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for (_, next) in chars.by_ref() {
                        if next == '}' {
                            closed = true;
                            break;
                        }
                        name.push(next);
                    }

                    if !closed {
                        return Err(RagError::InvalidConfig(format!(
                            "unclosed placeholder at position {position}"
                        )));
                    }
                    if name.is_empty()
                        || !name.chars().all(|ch| ch.is_alphanumeric() || ch == '_')
                    {
                        return Err(RagError::InvalidConfig(format!(
                            "invalid placeholder name '{name}' at position {position}"
                        )));
                    }

                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Variable(name));
                }
                '}' => {
                    return Err(RagError::InvalidConfig(format!(
                        "unmatched '}}' at position {position}"
                    )));
                }
                _ => literal.push(c),
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self { segments })
    }

    /// Placeholder names in order of first appearance
    #[inline]
    pub fn variables(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for segment in &self.segments {
            if let Segment::Variable(name) = segment {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Fill some placeholders now and leave the rest for [`PromptTemplate::render`]
    #[inline]
    #[must_use]
    pub fn partial(&self, values: &[(&str, &str)]) -> Self {
        let mut segments: Vec<Segment> = Vec::with_capacity(self.segments.len());

        for segment in &self.segments {
            let resolved = match segment {
                Segment::Variable(name) => lookup(values, name)
                    .map_or_else(|| segment.clone(), |value| Segment::Literal(value.to_string())),
                Segment::Literal(_) => segment.clone(),
            };

            // Adjacent literals stay merged so equal templates compare equal
            if let Segment::Literal(text) = &resolved {
                if let Some(Segment::Literal(previous)) = segments.last_mut() {
                    previous.push_str(text);
                    continue;
                }
            }
            segments.push(resolved);
        }

        Self { segments }
    }

    /// Substitute every placeholder
    ///
    /// Fails with [`RagError::InvalidConfig`] naming the first placeholder
    /// without a value. Extra values are ignored.
    #[inline]
    pub fn render(&self, values: &[(&str, &str)]) -> Result<String> {
        let mut output = String::new();

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => output.push_str(text),
                Segment::Variable(name) => {
                    let value = lookup(values, name).ok_or_else(|| {
                        RagError::InvalidConfig(format!("missing value for placeholder '{name}'"))
                    })?;
                    output.push_str(value);
                }
            }
        }

        Ok(output)
    }
}

fn lookup<'v>(values: &[(&str, &'v str)], name: &str) -> Option<&'v str> {
    values
        .iter()
        .find(|(key, _)| *key == name)
        .map(|(_, value)| *value)
}

/// Builds grounded prompts from retrieved chunks and a question
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptAssembler {
    template: PromptTemplate,
}

impl Default for PromptAssembler {
    #[inline]
    fn default() -> Self {
        let (preamble, rest) = RAG_TEMPLATE
            .split_once("{context}")
            .unwrap_or((RAG_TEMPLATE, ""));
        let (between, tail) = rest.split_once("{question}").unwrap_or((rest, ""));

        Self {
            template: PromptTemplate {
                segments: vec![
                    Segment::Literal(preamble.to_string()),
                    Segment::Variable(CONTEXT_VARIABLE.to_string()),
                    Segment::Literal(between.to_string()),
                    Segment::Variable(QUESTION_VARIABLE.to_string()),
                    Segment::Literal(tail.to_string()),
                ],
            },
        }
    }
}

impl PromptAssembler {
    /// Use a custom template with exactly the `{context}` and `{question}` placeholders
    #[inline]
    pub fn with_template(template: &str) -> Result<Self> {
        let template = PromptTemplate::parse(template)?;

        let mut variables = template.variables();
        variables.sort_unstable();
        if variables != [CONTEXT_VARIABLE, QUESTION_VARIABLE] {
            return Err(RagError::InvalidConfig(format!(
                "prompt template must use exactly {{context}} and {{question}}, found {variables:?}"
            )));
        }

        Ok(Self { template })
    }

    #[inline]
    pub const fn template(&self) -> &PromptTemplate {
        &self.template
    }

    /// Render the prompt with chunk texts in the given order, separated by blank lines
    #[inline]
    pub fn assemble<'c, C>(&self, chunks: C, question: &str) -> String
    where
        C: IntoIterator<Item = &'c Chunk>,
    {
        let mut context = String::new();
        for chunk in chunks {
            if !context.is_empty() {
                context.push_str("\n\n");
            }
            context.push_str(chunk.text.trim());
        }

        let mut prompt = String::with_capacity(context.len() + question.len() + 256);
        for segment in &self.template.segments {
            match segment {
                Segment::Literal(text) => prompt.push_str(text),
                Segment::Variable(name) if name == CONTEXT_VARIABLE => prompt.push_str(&context),
                // with_template admits no other placeholder
                Segment::Variable(_) => prompt.push_str(question.trim()),
            }
        }

        prompt
    }
}
