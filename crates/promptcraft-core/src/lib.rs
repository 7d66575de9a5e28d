//! promptcraft-core: automated evaluation for text-generation prompts.
//! Synthesize a dataset from a task description, run the prompt under test
//! on every case, and grade each output with a model judge.
//! See `demos/meal_plan.rs` for a quickstart.

pub mod config;
pub mod datasource;
pub mod error;
pub mod extract;
pub mod generator;
pub mod grader;
pub mod model;
pub mod progress;
pub mod report;
pub mod runner;
pub mod subject;
pub mod template;
pub mod testing;
pub mod types;

pub use config::{EvalConfig, ModelConfig, OutputConfig, PhaseConfig, SubjectConfig};
pub use datasource::{load_dataset, save_dataset, DataSource, JsonFileDataSource, VecDataSource};
pub use error::{EvalError, EvalResult};
pub use extract::{ExtractionRequest, FencedJsonExtractor, ParseError, StructuredExtractor};
pub use generator::DatasetGenerator;
pub use grader::{Grader, ModelGrader};
pub use model::{AnthropicCaller, Message, ModelCaller, ModelRequest, Role, TransportError};
pub use progress::{Milestone, ProgressTracker};
pub use report::generate_html_report;
pub use runner::{run_test_case, Evaluation, EvaluationBuilder};
pub use subject::{from_async_fn, from_fn, PromptSubject, Subject};
pub use template::render;
pub use types::{
	EvaluationResult, EvaluationRun, EvaluationSummary, GradeVerdict, InputSpec, PromptInputs, TestCase,
};
