pub use promptcraft_types::{
	mean_score, pass_rate, value_preview, EvaluationResult, EvaluationRun, EvaluationSummary, GradeVerdict,
	InputSpec, PromptInputs, TestCase, PASS_THRESHOLD,
};
