//! Structured extraction: getting JSON out of a free-text model.
//!
//! The pipeline only asks for "a JSON value answering this prompt". How the
//! model is coaxed into producing one lives here, behind
//! [`StructuredExtractor`]. [`FencedJsonExtractor`] seeds the assistant turn
//! with an opening ```` ```json ```` fence and stops generation at the
//! closing fence, so the completion is the bare JSON body.

use std::sync::Arc;

use async_trait::async_trait;
use jsonschema::JSONSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::error::EvalResult;
use crate::model::{Message, ModelCaller, ModelRequest, DEFAULT_MAX_TOKENS};

const JSON_FENCE_OPEN: &str = "```json";
const FENCE_CLOSE: &str = "```";

/// Model output that could not be turned into the requested structure.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("not valid JSON ({source}); raw output: {raw:?}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
        raw: String,
    },

    #[error("{kind} does not have the expected shape: {}", .errors.join("; "))]
    Schema {
        kind: &'static str,
        errors: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionRequest {
    pub prompt: String,
    pub system: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ExtractionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            temperature: 1.0,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[async_trait]
pub trait StructuredExtractor: Send + Sync {
    /// Ask the model and return its answer as parsed JSON.
    async fn extract(&self, request: ExtractionRequest) -> EvalResult<Value>;
}

/// Constrained completion over any [`ModelCaller`].
pub struct FencedJsonExtractor {
    caller: Arc<dyn ModelCaller>,
}

impl FencedJsonExtractor {
    pub fn new(caller: Arc<dyn ModelCaller>) -> Self {
        Self { caller }
    }

    fn model_request(request: &ExtractionRequest) -> ModelRequest {
        let mut model_request = ModelRequest::new(vec![
            Message::user(request.prompt.clone()),
            Message::assistant(JSON_FENCE_OPEN),
        ])
        .with_temperature(request.temperature)
        .with_stop_sequences([FENCE_CLOSE])
        .with_max_tokens(request.max_tokens);
        if let Some(system) = &request.system {
            model_request = model_request.with_system(system.clone());
        }
        model_request
    }
}

#[async_trait]
impl StructuredExtractor for FencedJsonExtractor {
    async fn extract(&self, request: ExtractionRequest) -> EvalResult<Value> {
        let text = self.caller.call(&Self::model_request(&request)).await?;
        Ok(parse_fenced_json(&text)?)
    }
}

/// Parse the body of a fenced completion.
///
/// Callers that ignore stop sequences may echo the closing fence; anything
/// from the first closing fence on is discarded.
pub fn parse_fenced_json(text: &str) -> Result<Value, ParseError> {
    let body = match text.find(FENCE_CLOSE) {
        Some(end) => &text[..end],
        None => text,
    };
    serde_json::from_str(body.trim()).map_err(|source| ParseError::InvalidJson {
        source,
        raw: text.to_string(),
    })
}

/// Validate `value` against a JSON schema, reporting every violation.
pub fn check_shape(kind: &'static str, schema: &Value, value: &Value) -> Result<(), ParseError> {
    let compiled = JSONSchema::compile(schema).map_err(|e| ParseError::Schema {
        kind,
        errors: vec![format!("invalid schema: {}", e)],
    })?;
    if let Err(errors) = compiled.validate(value) {
        let errors = errors
            .map(|e| {
                let path = e.instance_path.to_string();
                if path.is_empty() {
                    e.to_string()
                } else {
                    format!("{}: {}", path, e)
                }
            })
            .collect();
        return Err(ParseError::Schema { kind, errors });
    }
    Ok(())
}

/// Shape-check then deserialize an extracted value.
pub fn decode<T: DeserializeOwned>(
    kind: &'static str,
    schema: &Value,
    value: Value,
) -> Result<T, ParseError> {
    check_shape(kind, schema, &value)?;
    serde_json::from_value(value).map_err(|e| ParseError::Schema {
        kind,
        errors: vec![e.to_string()],
    })
}
