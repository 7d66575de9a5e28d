//! Helpers for tests: threshold assertions over an evaluation run and
//! scripted stand-ins for the model and the judge.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use anyhow::Result;
use async_trait::async_trait;

use crate::error::EvalResult;
use crate::grader::Grader;
use crate::model::{ModelCaller, ModelRequest, TransportError};
use crate::types::{EvaluationRun, GradeVerdict, TestCase};

/// Helper to assert the mean grader score meets a threshold.
///
/// Use this in your `#[tokio::test]` functions.
///
/// # Example
/// ```ignore
/// #[tokio::test]
/// async fn test_my_prompt() -> anyhow::Result<()> {
///     let evaluation = Evaluation::builder()
///         .dataset_file("dataset.json")
///         .subject(subject)
///         .grader(grader)
///         .build()?;
///
///     let run = evaluation.run().await?;
///
///     // Require an average of at least 7 / 10
///     assert_mean_score(&run, 7.0)?;
///
///     Ok(())
/// }
/// ```
pub fn assert_mean_score(run: &EvaluationRun, min_mean_score: f64) -> Result<()> {
    if run.summary.mean_score < min_mean_score {
        anyhow::bail!(
            "Evaluation failed: mean score {:.2} is below threshold {:.2}\n{}",
            run.summary.mean_score,
            min_mean_score,
            run.summary_table()
        );
    }
    Ok(())
}

/// Helper to assert the pass rate (percent of cases scoring 7 or more) meets a threshold.
pub fn assert_pass_rate(run: &EvaluationRun, min_pass_rate: f64) -> Result<()> {
    if run.summary.pass_rate < min_pass_rate {
        anyhow::bail!(
            "Evaluation failed: pass rate {:.1}% is below threshold {:.1}%\n{}",
            run.summary.pass_rate,
            min_pass_rate,
            run.summary_table()
        );
    }
    Ok(())
}

type ResponseFn = dyn Fn(&ModelRequest) -> Result<String, TransportError> + Send + Sync;

enum Script {
    Queue(Mutex<VecDeque<String>>),
    Func(Box<ResponseFn>),
}

/// A [`ModelCaller`] that answers from a script and records every request.
pub struct ScriptedModel {
    script: Script,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    /// Answer calls with `responses` in order; once they run out every call
    /// fails with a transport error.
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Script::Queue(Mutex::new(responses.into_iter().map(Into::into).collect())),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer each call by inspecting the request. Use this when calls
    /// arrive concurrently and their order is not fixed.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&ModelRequest) -> Result<String, TransportError> + Send + Sync + 'static,
    {
        Self {
            script: Script::Func(Box::new(f)),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl ModelCaller for ScriptedModel {
    async fn call(&self, request: &ModelRequest) -> Result<String, TransportError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        match &self.script {
            Script::Queue(queue) => queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front()
                .ok_or_else(|| TransportError::Other("no scripted response left".into())),
            Script::Func(f) => f(request),
        }
    }
}

type VerdictFn = dyn Fn(&TestCase, &str) -> EvalResult<GradeVerdict> + Send + Sync;

/// A [`Grader`] backed by a closure instead of a model.
pub struct ScriptedGrader {
    f: Box<VerdictFn>,
}

impl ScriptedGrader {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&TestCase, &str) -> EvalResult<GradeVerdict> + Send + Sync + 'static,
    {
        Self { f: Box::new(f) }
    }
}

#[async_trait]
impl Grader for ScriptedGrader {
    async fn grade_output(
        &self,
        test_case: &TestCase,
        output: &str,
        _extra_criteria: Option<&str>,
    ) -> EvalResult<GradeVerdict> {
        (self.f)(test_case, output)
    }
}

/// A minimal verdict carrying only a score and reasoning.
pub fn verdict(score: u8, reasoning: impl Into<String>) -> GradeVerdict {
    GradeVerdict {
        strengths: vec!["meets the stated criteria".into()],
        weaknesses: vec!["none noted".into()],
        reasoning: reasoning.into(),
        score,
    }
}
