use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tabled::Tabled;

/// Minimum grader score that counts as a pass.
pub const PASS_THRESHOLD: u8 = 7;

/// Inputs handed to the prompt under test, keyed by input field name.
///
/// Key order follows the order the model (or the dataset file) produced them in.
pub type PromptInputs = Map<String, Value>;

/// Ordered mapping from input field name to a human readable description.
///
/// The field names are the only keys a generated [`TestCase`] may carry in
/// its `prompt_inputs`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InputSpec(Map<String, Value>);

impl InputSpec {
	pub fn new() -> Self {
		Self(Map::new())
	}

	/// Append a field. Re-declaring a name replaces its description in place.
	pub fn field(mut self, name: impl Into<String>, description: impl Into<String>) -> Self {
		self.0.insert(name.into(), Value::String(description.into()));
		self
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn contains(&self, name: &str) -> bool {
		self.0.contains_key(name)
	}

	pub fn names(&self) -> impl Iterator<Item = &str> {
		self.0.keys().map(String::as_str)
	}

	/// Field names paired with their descriptions, in declaration order.
	pub fn fields(&self) -> impl Iterator<Item = (&str, String)> {
		self.0.iter().map(|(k, v)| (k.as_str(), value_preview(v)))
	}
}

impl<K, V> FromIterator<(K, V)> for InputSpec
where
	K: Into<String>,
	V: Into<String>,
{
	fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
		iter.into_iter().fold(InputSpec::new(), |spec, (k, v)| spec.field(k, v))
	}
}

/// A concrete input set plus grading criteria for one evaluation scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
	pub prompt_inputs: PromptInputs,
	pub solution_criteria: Vec<String>,
	pub task_description: String,
	pub scenario: String,
}

impl TestCase {
	/// Look up an input as text. Non-string values are rendered as JSON.
	pub fn input(&self, name: &str) -> Option<String> {
		self.prompt_inputs.get(name).map(value_preview)
	}
}

/// Structured judgement returned by the grader for one output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeVerdict {
	pub strengths: Vec<String>,
	pub weaknesses: Vec<String>,
	pub reasoning: String,
	pub score: u8,
}

/// Outcome of running and grading a single test case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
	pub output: String,
	pub test_case: TestCase,
	pub score: u8,
	pub reasoning: String,
}

impl EvaluationResult {
	pub fn passed(&self) -> bool {
		self.score >= PASS_THRESHOLD
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSummary {
	pub total: usize,
	pub passed: usize,
	/// Percentage in `0.0..=100.0` of cases scoring at least [`PASS_THRESHOLD`].
	pub pass_rate: f64,
	pub mean_score: f64,
}

impl EvaluationSummary {
	pub fn from_results(results: &[EvaluationResult]) -> Self {
		let total = results.len();
		let passed = results.iter().filter(|r| r.passed()).count();
		EvaluationSummary {
			total,
			passed,
			pass_rate: pass_rate(results, PASS_THRESHOLD),
			mean_score: mean_score(results),
		}
	}
}

/// Arithmetic mean of the grader scores, `0.0` for an empty set.
pub fn mean_score(results: &[EvaluationResult]) -> f64 {
	if results.is_empty() {
		return 0.0;
	}
	let sum: u32 = results.iter().map(|r| u32::from(r.score)).sum();
	sum as f64 / results.len() as f64
}

/// Percentage of results whose score is at least `threshold`.
pub fn pass_rate(results: &[EvaluationResult], threshold: u8) -> f64 {
	if results.is_empty() {
		return 0.0;
	}
	let passed = results.iter().filter(|r| r.score >= threshold).count();
	100.0 * passed as f64 / results.len() as f64
}

/// Results of a whole evaluation run, in completion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationRun {
	pub results: Vec<EvaluationResult>,
	pub summary: EvaluationSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize, Tabled)]
struct SummaryRow {
	scenario: String,
	passed: String,
	score: u8,
	inputs: String,
	output: String,
	reasoning: String,
}

impl EvaluationRun {
	pub fn new(results: Vec<EvaluationResult>) -> Self {
		let summary = EvaluationSummary::from_results(&results);
		Self { results, summary }
	}

	pub fn summary_table(&self) -> String {
		use tabled::Table;
		let rows: Vec<SummaryRow> = self.results.iter().map(|r| {
			SummaryRow {
				scenario: truncate(r.test_case.scenario.clone(), 48),
				passed: if r.passed() { "✓" } else { " " }.to_string(),
				score: r.score,
				inputs: truncate(Value::Object(r.test_case.prompt_inputs.clone()).to_string(), 64),
				output: truncate(r.output.clone(), 64),
				reasoning: truncate(r.reasoning.clone(), 64),
			}
		}).collect();

		let table = Table::new(rows);
		let table_str = table.to_string();

		let summary_text = format!(
			"Total: {}  Passed: {}  Pass rate: {:.1}%  Mean score: {:.2} / 10",
			self.summary.total,
			self.summary.passed,
			self.summary.pass_rate,
			self.summary.mean_score
		);

		format!("{}\n\n{}\n", table_str, summary_text)
	}
}

/// Render a JSON value as display text: strings verbatim, everything else as JSON.
pub fn value_preview(v: &Value) -> String {
	match v {
		Value::String(s) => s.clone(),
		_ => v.to_string(),
	}
}

fn truncate(s: String, max_len: usize) -> String {
	let s = s.replace('\n', " ");
	if s.chars().count() <= max_len {
		return s;
	}
	let mut truncated = s.chars().take(max_len.saturating_sub(1)).collect::<String>();
	truncated.push('…');
	truncated
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn result_with_score(score: u8) -> EvaluationResult {
		EvaluationResult {
			output: "out".to_string(),
			test_case: TestCase {
				prompt_inputs: Map::new(),
				solution_criteria: vec!["criterion".to_string()],
				task_description: "task".to_string(),
				scenario: "scenario".to_string(),
			},
			score,
			reasoning: "because".to_string(),
		}
	}

	fn results(scores: &[u8]) -> Vec<EvaluationResult> {
		scores.iter().copied().map(result_with_score).collect()
	}

	#[test]
	fn mean_of_scores() {
		assert_eq!(mean_score(&results(&[10, 4, 7])), 7.0);
		assert_eq!(mean_score(&[]), 0.0);
	}

	#[test]
	fn pass_rate_counts_scores_at_or_above_threshold() {
		assert_eq!(pass_rate(&results(&[10, 4, 6, 8]), 7), 50.0);
		assert_eq!(pass_rate(&results(&[10, 4, 7, 8]), 7), 75.0);
		assert_eq!(pass_rate(&results(&[10, 4, 7, 8]), 8), 50.0);
		assert_eq!(pass_rate(&[], 7), 0.0);
	}

	#[test]
	fn summary_from_results() {
		let summary = EvaluationSummary::from_results(&results(&[9, 3, 7, 5]));
		assert_eq!(summary.total, 4);
		assert_eq!(summary.passed, 2);
		assert_eq!(summary.pass_rate, 50.0);
		assert_eq!(summary.mean_score, 6.0);
	}

	#[test]
	fn input_spec_keeps_declaration_order() {
		let spec: InputSpec = [("weight", "kg"), ("height", "cm"), ("goal", "text")]
			.into_iter()
			.collect();
		assert_eq!(spec.names().collect::<Vec<_>>(), vec!["weight", "height", "goal"]);

		let json = serde_json::to_string(&spec).unwrap();
		assert_eq!(json, r#"{"weight":"kg","height":"cm","goal":"text"}"#);
		let back: InputSpec = serde_json::from_str(&json).unwrap();
		assert_eq!(back, spec);
	}

	#[test]
	fn verdict_serializes_fields_in_rubric_order() {
		let verdict = GradeVerdict {
			strengths: vec!["clear".into()],
			weaknesses: vec!["short".into()],
			reasoning: "fine".into(),
			score: 8,
		};
		let json = serde_json::to_value(&verdict).unwrap();
		let keys: Vec<&String> = json.as_object().unwrap().keys().collect();
		assert_eq!(keys, vec!["strengths", "weaknesses", "reasoning", "score"]);
	}

	#[test]
	fn test_case_input_renders_non_strings() {
		let mut case = result_with_score(5).test_case;
		case.prompt_inputs.insert("height".into(), json!(180));
		case.prompt_inputs.insert("goal".into(), json!("bulk"));
		assert_eq!(case.input("height").as_deref(), Some("180"));
		assert_eq!(case.input("goal").as_deref(), Some("bulk"));
		assert_eq!(case.input("missing"), None);
	}

	#[test]
	fn summary_table_mentions_totals() {
		let run = EvaluationRun::new(results(&[8, 2]));
		let table = run.summary_table();
		assert!(table.contains("Total: 2"));
		assert!(table.contains("Pass rate: 50.0%"));
	}
}
