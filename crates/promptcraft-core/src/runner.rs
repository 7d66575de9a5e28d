use std::path::PathBuf;
use std::sync::Arc;

use futures::stream::{self, StreamExt};

use crate::datasource::{write_file, write_json_pretty, DataSource, JsonFileDataSource};
use crate::error::{EvalError, EvalResult};
use crate::grader::Grader;
use crate::progress::ProgressTracker;
use crate::report::generate_html_report;
use crate::subject::Subject;
use crate::types::{EvaluationResult, EvaluationRun, TestCase};

pub struct EvaluationBuilder {
	data_source: Option<Arc<dyn DataSource>>,
	subject: Option<Arc<dyn Subject>>,
	grader: Option<Arc<dyn Grader>>,
	extra_criteria: Option<String>,
	concurrency: usize,
	continue_on_error: bool,
	results_file: Option<PathBuf>,
	report_file: Option<PathBuf>,
}

impl EvaluationBuilder {
	pub fn new() -> Self {
		Self {
			data_source: None,
			subject: None,
			grader: None,
			extra_criteria: None,
			concurrency: 3,
			continue_on_error: false,
			results_file: None,
			report_file: None,
		}
	}

	pub fn data_source(mut self, data_source: Arc<dyn DataSource>) -> Self {
		self.data_source = Some(data_source);
		self
	}

	/// Shorthand for a [`JsonFileDataSource`] over a generated dataset file.
	pub fn dataset_file(self, path: impl Into<PathBuf>) -> Self {
		self.data_source(Arc::new(JsonFileDataSource::new(path)))
	}

	pub fn subject(mut self, subject: Arc<dyn Subject>) -> Self {
		self.subject = Some(subject);
		self
	}

	pub fn grader(mut self, grader: Arc<dyn Grader>) -> Self {
		self.grader = Some(grader);
		self
	}

	/// Requirements every output must meet; any violation caps the score at 3.
	pub fn extra_criteria(mut self, criteria: impl Into<String>) -> Self {
		self.extra_criteria = Some(criteria.into());
		self
	}

	pub fn concurrency(mut self, n: usize) -> Self {
		self.concurrency = n.max(1);
		self
	}

	/// Skip failed cases instead of aborting the run (off by default).
	pub fn continue_on_error(mut self, enabled: bool) -> Self {
		self.continue_on_error = enabled;
		self
	}

	pub fn results_file(mut self, path: impl Into<PathBuf>) -> Self {
		self.results_file = Some(path.into());
		self
	}

	pub fn report_file(mut self, path: impl Into<PathBuf>) -> Self {
		self.report_file = Some(path.into());
		self
	}

	pub fn build(self) -> EvalResult<Evaluation> {
		Ok(Evaluation {
			data_source: self.data_source.ok_or_else(|| EvalError::Config("data_source must be set".into()))?,
			subject: self.subject.ok_or_else(|| EvalError::Config("subject must be set".into()))?,
			grader: self.grader.ok_or_else(|| EvalError::Config("grader must be set".into()))?,
			extra_criteria: self.extra_criteria,
			concurrency: self.concurrency,
			continue_on_error: self.continue_on_error,
			results_file: self.results_file,
			report_file: self.report_file,
		})
	}
}

impl Default for EvaluationBuilder {
	fn default() -> Self {
		Self::new()
	}
}

pub struct Evaluation {
	data_source: Arc<dyn DataSource>,
	subject: Arc<dyn Subject>,
	grader: Arc<dyn Grader>,
	extra_criteria: Option<String>,
	concurrency: usize,
	continue_on_error: bool,
	results_file: Option<PathBuf>,
	report_file: Option<PathBuf>,
}

impl Evaluation {
	pub fn builder() -> EvaluationBuilder {
		EvaluationBuilder::new()
	}

	/// Load the dataset, run and grade every case, then persist the result
	/// set and the HTML report. Files are only written once every case has
	/// finished, and a failed run leaves neither file behind.
	pub async fn run(&self) -> EvalResult<EvaluationRun> {
		let cases = self.data_source.load().await?;
		let results = self.run_cases(cases).await?;
		let run = EvaluationRun::new(results);
		tracing::info!(
			cases = run.summary.total,
			mean_score = run.summary.mean_score,
			pass_rate = run.summary.pass_rate,
			"Average score: {:.2}",
			run.summary.mean_score
		);

		self.persist(&run.results).await?;
		Ok(run)
	}

	async fn persist(&self, results: &[EvaluationResult]) -> EvalResult<()> {
		let report = self.report_file.as_ref().map(|path| (path, generate_html_report(results)));

		if let Some(path) = &self.results_file {
			write_json_pretty(path, results).await?;
		}
		if let Some((path, html)) = report {
			if let Err(err) = write_file(path, html).await {
				if let Some(results_path) = &self.results_file {
					if let Err(cleanup) = tokio::fs::remove_file(results_path).await {
						tracing::warn!(path = %results_path.display(), error = %cleanup, "failed to remove results file");
					}
				}
				return Err(err);
			}
		}
		Ok(())
	}

	async fn run_cases(&self, cases: Vec<TestCase>) -> EvalResult<Vec<EvaluationResult>> {
		let progress = ProgressTracker::new("Graded", cases.len());
		let progress = &progress;
		let subject = self.subject.as_ref();
		let grader = self.grader.as_ref();
		let extra_criteria = self.extra_criteria.as_deref();

		let mut pending = stream::iter(cases)
			.map(|case| async move {
				let scenario = case.scenario.clone();
				let result = run_test_case(case, subject, grader, extra_criteria).await;
				if result.is_ok() {
					progress.complete();
				}
				(scenario, result)
			})
			.buffer_unordered(self.concurrency);

		let mut results = Vec::new();
		while let Some((scenario, result)) = pending.next().await {
			match result {
				Ok(r) => results.push(r),
				Err(err) if self.continue_on_error => {
					tracing::warn!(scenario = %scenario, error = %err, "error evaluating test case, skipping");
				}
				Err(err) => return Err(err),
			}
		}
		Ok(results)
	}
}

/// Run the subject on one case and grade its output. Failures in either
/// step are returned to the caller untouched.
pub async fn run_test_case(
	test_case: TestCase,
	subject: &dyn Subject,
	grader: &dyn Grader,
	extra_criteria: Option<&str>,
) -> EvalResult<EvaluationResult> {
	let output = subject
		.run(&test_case.prompt_inputs)
		.await
		.map_err(EvalError::Subject)?;
	let verdict = grader.grade_output(&test_case, &output, extra_criteria).await?;
	Ok(EvaluationResult {
		output,
		test_case,
		score: verdict.score,
		reasoning: verdict.reasoning,
	})
}
