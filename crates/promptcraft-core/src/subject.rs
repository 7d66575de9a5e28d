use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::model::{Message, ModelCaller, ModelRequest, DEFAULT_MAX_TOKENS};
use crate::template::render;
use crate::types::{value_preview, PromptInputs};

/// The prompt under test: turns one test case's inputs into output text.
#[async_trait]
pub trait Subject: Send + Sync {
	async fn run(&self, inputs: &PromptInputs) -> Result<String>;
}

/// Wrap an async closure as a `Subject`.
pub fn from_async_fn<F, Fut>(f: F) -> Arc<dyn Subject>
where
	F: Send + Sync + 'static + Fn(PromptInputs) -> Fut,
	Fut: Future<Output = Result<String>> + Send + 'static,
{
	struct ClosureSubject<F> {
		f: F,
	}

	#[async_trait]
	impl<F, Fut> Subject for ClosureSubject<F>
	where
		F: Send + Sync + 'static + Fn(PromptInputs) -> Fut,
		Fut: Future<Output = Result<String>> + Send + 'static,
	{
		async fn run(&self, inputs: &PromptInputs) -> Result<String> {
			(self.f)(inputs.clone()).await
		}
	}

	Arc::new(ClosureSubject { f })
}

/// Wrap a synchronous closure as a `Subject`. Each call runs on the
/// blocking thread pool so a slow subject never stalls other workers.
pub fn from_fn<F>(f: F) -> Arc<dyn Subject>
where
	F: Fn(&PromptInputs) -> Result<String> + Send + Sync + 'static,
{
	struct BlockingSubject<F> {
		f: Arc<F>,
	}

	#[async_trait]
	impl<F> Subject for BlockingSubject<F>
	where
		F: Fn(&PromptInputs) -> Result<String> + Send + Sync + 'static,
	{
		async fn run(&self, inputs: &PromptInputs) -> Result<String> {
			let f = self.f.clone();
			let inputs = inputs.clone();
			tokio::task::spawn_blocking(move || f(&inputs)).await?
		}
	}

	Arc::new(BlockingSubject { f: Arc::new(f) })
}

/// Renders a prompt template with the case's inputs and returns the
/// model's reply verbatim.
pub struct PromptSubject {
	caller: Arc<dyn ModelCaller>,
	template: String,
	system: Option<String>,
	temperature: f32,
	max_tokens: u32,
}

impl PromptSubject {
	pub fn new(caller: Arc<dyn ModelCaller>, template: impl Into<String>) -> Self {
		Self {
			caller,
			template: template.into(),
			system: None,
			temperature: 1.0,
			max_tokens: DEFAULT_MAX_TOKENS,
		}
	}

	pub fn system(mut self, system: impl Into<String>) -> Self {
		self.system = Some(system.into());
		self
	}

	pub fn temperature(mut self, temperature: f32) -> Self {
		self.temperature = temperature;
		self
	}

	pub fn max_tokens(mut self, max_tokens: u32) -> Self {
		self.max_tokens = max_tokens;
		self
	}

	pub fn render_prompt(&self, inputs: &PromptInputs) -> String {
		render(&self.template, inputs.iter().map(|(k, v)| (k.clone(), value_preview(v))))
	}
}

#[async_trait]
impl Subject for PromptSubject {
	async fn run(&self, inputs: &PromptInputs) -> Result<String> {
		let mut request = ModelRequest::new(vec![Message::user(self.render_prompt(inputs))])
			.with_temperature(self.temperature)
			.with_max_tokens(self.max_tokens);
		if let Some(system) = &self.system {
			request = request.with_system(system.clone());
		}
		Ok(self.caller.call(&request).await?)
	}
}
