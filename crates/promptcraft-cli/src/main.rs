mod http;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use promptcraft_core::{
	generate_html_report, AnthropicCaller, DatasetGenerator, EvalConfig, Evaluation,
	EvaluationResult, EvaluationRun, FencedJsonExtractor, ModelCaller, ModelGrader, PromptSubject,
	Subject, SubjectConfig,
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::http::http_subject;

#[derive(Debug, Parser)]
#[command(name = "promptcraft", about = "Generate test datasets and grade prompts with a model judge")]
struct Cli {
	/// Log filter used when RUST_LOG is not set
	#[arg(long, default_value = "info", global = true)]
	log_level: String,

	#[command(subcommand)]
	command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
	/// Synthesize a dataset and write it to the configured dataset file
	Generate(PipelineArgs),
	/// Generate a dataset (unless --skip-generation) and evaluate the prompt on it
	Run(RunArgs),
	/// Rebuild the HTML report from a result file
	Report(ReportArgs),
}

#[derive(Debug, Clone, Args)]
struct PipelineArgs {
	/// YAML evaluation config
	#[arg(long, default_value = "promptcraft.yaml")]
	config: PathBuf,

	/// Anthropic API key
	#[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
	api_key: String,

	/// Override the number of test cases to generate
	#[arg(long)]
	num_cases: Option<usize>,

	/// Override the number of units in flight
	#[arg(long)]
	concurrency: Option<usize>,
}

#[derive(Debug, Clone, Args)]
struct RunArgs {
	#[command(flatten)]
	pipeline: PipelineArgs,

	/// Evaluate the existing dataset file instead of generating a new one
	#[arg(long)]
	skip_generation: bool,
}

#[derive(Debug, Clone, Args)]
struct ReportArgs {
	/// Result file written by `run`
	#[arg(long, default_value = "output.json")]
	results: PathBuf,

	/// Where to write the HTML report
	#[arg(long, default_value = "output.html")]
	out: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	tracing_subscriber::registry()
		.with(fmt::layer())
		.with(env_filter(&cli.log_level))
		.init();

	match cli.command {
		Commands::Generate(args) => generate(args).await?,
		Commands::Run(args) => run(args).await?,
		Commands::Report(args) => report(args).await?,
	}
	Ok(())
}

/// RUST_LOG wins over `--log-level`.
fn env_filter(log_level: &str) -> EnvFilter {
	EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level))
}

async fn load_config(args: &PipelineArgs) -> Result<EvalConfig> {
	let mut config = EvalConfig::load(&args.config).await?;
	if let Some(n) = args.num_cases {
		config.num_cases = n;
	}
	if let Some(n) = args.concurrency {
		config.concurrency = n;
	}
	config.validate()?;
	Ok(config)
}

fn model_caller(config: &EvalConfig, api_key: &str) -> Arc<dyn ModelCaller> {
	Arc::new(
		AnthropicCaller::new(api_key)
			.with_model(&config.model.name)
			.with_api_base(&config.model.api_base),
	)
}

fn build_subject(config: &EvalConfig, caller: Arc<dyn ModelCaller>) -> Arc<dyn Subject> {
	match &config.subject {
		SubjectConfig::Prompt {
			template,
			system,
			temperature,
		} => {
			let mut subject = PromptSubject::new(caller, template.clone())
				.temperature(*temperature)
				.max_tokens(config.model.max_tokens);
			if let Some(system) = system {
				subject = subject.system(system.clone());
			}
			Arc::new(subject)
		}
		SubjectConfig::Http { url, method } => http_subject(url.clone(), method.clone()),
	}
}

async fn generate_dataset(config: &EvalConfig, caller: Arc<dyn ModelCaller>) -> Result<()> {
	let generator = DatasetGenerator::new(Arc::new(FencedJsonExtractor::new(caller)))
		.concurrency(config.concurrency)
		.continue_on_error(config.generation.continue_on_error);
	let dataset = generator
		.generate_dataset(
			&config.task_description,
			&config.input_spec,
			config.num_cases,
			&config.outputs.dataset,
		)
		.await
		.context("dataset generation failed")?;
	println!(
		"Generated {} of {} test cases into {}",
		dataset.len(),
		config.num_cases,
		config.outputs.dataset.display()
	);
	Ok(())
}

async fn generate(args: PipelineArgs) -> Result<()> {
	let config = load_config(&args).await?;
	let caller = model_caller(&config, &args.api_key);
	generate_dataset(&config, caller).await
}

async fn run(args: RunArgs) -> Result<()> {
	let config = load_config(&args.pipeline).await?;
	let caller = model_caller(&config, &args.pipeline.api_key);

	if args.skip_generation {
		tracing::info!(path = %config.outputs.dataset.display(), "using existing dataset");
	} else {
		generate_dataset(&config, caller.clone()).await?;
	}

	let grader = ModelGrader::new(Arc::new(FencedJsonExtractor::new(caller.clone())));
	let mut builder = Evaluation::builder()
		.dataset_file(&config.outputs.dataset)
		.subject(build_subject(&config, caller))
		.grader(Arc::new(grader))
		.concurrency(config.concurrency)
		.continue_on_error(config.evaluation.continue_on_error)
		.results_file(&config.outputs.results)
		.report_file(&config.outputs.report);
	if let Some(criteria) = &config.extra_criteria {
		builder = builder.extra_criteria(criteria.clone());
	}

	let run = builder.build()?.run().await.context("evaluation failed")?;
	println!("{}", run.summary_table());
	println!("Results written to {}", config.outputs.results.display());
	println!("Report written to {}", config.outputs.report.display());
	Ok(())
}

async fn report(args: ReportArgs) -> Result<()> {
	let content = tokio::fs::read_to_string(&args.results)
		.await
		.with_context(|| format!("failed to read {}", args.results.display()))?;
	let results: Vec<EvaluationResult> = serde_json::from_str(&content)
		.with_context(|| format!("{} is not a result file", args.results.display()))?;
	tokio::fs::write(&args.out, generate_html_report(&results))
		.await
		.with_context(|| format!("failed to write {}", args.out.display()))?;

	let run = EvaluationRun::new(results);
	println!("{}", run.summary_table());
	println!("Report written to {}", args.out.display());
	Ok(())
}
