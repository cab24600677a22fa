// Generation module
// Prompt in, completion out

pub mod ollama;


use crate::Result;

pub use ollama::OllamaGenerator;

/// Shape the model is asked to answer in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    #[default]
    Text,
    Json,
}

/// One completion request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationRequest<'a> {
    pub prompt: &'a str,
    /// Sampling temperature; `None` leaves the backend's configured value
    pub temperature: Option<f32>,
    pub format: ResponseFormat,
}

impl<'a> GenerationRequest<'a> {
    #[inline]
    pub const fn new(prompt: &'a str) -> Self {
        Self {
            prompt,
            temperature: None,
            format: ResponseFormat::Text,
        }
    }

    #[inline]
    #[must_use]
    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    #[inline]
    #[must_use]
    pub const fn with_format(mut self, format: ResponseFormat) -> Self {
        self.format = format;
        self
    }
}

/// Produces completion text for a prompt
pub trait Generator: Send + Sync {
    fn generate_with(&self, request: &GenerationRequest<'_>) -> Result<String>;

    #[inline]
    fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_with(&GenerationRequest::new(prompt))
    }
}

impl<G: Generator + ?Sized> Generator for &G {
    #[inline]
    fn generate_with(&self, request: &GenerationRequest<'_>) -> Result<String> {
        (**self).generate_with(request)
    }
}
