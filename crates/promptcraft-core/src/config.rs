use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::datasource::read_to_string;
use crate::error::{EvalError, EvalResult};
use crate::model::{DEFAULT_API_BASE, DEFAULT_MAX_TOKENS, DEFAULT_MODEL};
use crate::types::InputSpec;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalConfig {
    pub task_description: String,
    pub input_spec: InputSpec,
    #[serde(default = "default_num_cases")]
    pub num_cases: usize,
    #[serde(default)]
    pub extra_criteria: Option<String>,
    /// Upper bound on units in flight during each phase.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub generation: PhaseConfig,
    #[serde(default = "PhaseConfig::strict")]
    pub evaluation: PhaseConfig,
    #[serde(default)]
    pub outputs: OutputConfig,
    #[serde(default)]
    pub model: ModelConfig,
    pub subject: SubjectConfig,
}

fn default_num_cases() -> usize {
    1
}

fn default_concurrency() -> usize {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseConfig {
    #[serde(default = "default_true")]
    pub continue_on_error: bool,
}

fn default_true() -> bool {
    true
}

impl PhaseConfig {
    fn strict() -> Self {
        Self {
            continue_on_error: false,
        }
    }
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            continue_on_error: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_dataset_path")]
    pub dataset: PathBuf,
    #[serde(default = "default_results_path")]
    pub results: PathBuf,
    #[serde(default = "default_report_path")]
    pub report: PathBuf,
}

fn default_dataset_path() -> PathBuf {
    PathBuf::from("dataset.json")
}

fn default_results_path() -> PathBuf {
    PathBuf::from("output.json")
}

fn default_report_path() -> PathBuf {
    PathBuf::from("output.html")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dataset: default_dataset_path(),
            results: default_results_path(),
            report: default_report_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model_name")]
    pub name: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

fn default_model_name() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model_name(),
            max_tokens: default_max_tokens(),
            api_base: default_api_base(),
        }
    }
}

/// How the prompt under test is invoked for each case.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum SubjectConfig {
    /// Render `template` with the case's inputs and send it to the model.
    Prompt {
        template: String,
        #[serde(default)]
        system: Option<String>,
        #[serde(default = "default_temperature")]
        temperature: f32,
    },
    /// POST `{ "inputs": {...} }` to an endpoint serving the prompt.
    Http {
        url: String,
        #[serde(default = "default_http_method")]
        method: String,
    },
}

fn default_temperature() -> f32 {
    1.0
}

fn default_http_method() -> String {
    "POST".to_string()
}

impl EvalConfig {
    pub async fn load(path: impl AsRef<Path>) -> EvalResult<Self> {
        let path = path.as_ref().to_path_buf();
        let content = read_to_string(&path).await?;
        Self::from_yaml(&content).map_err(|e| match e {
            EvalError::Config(msg) => EvalError::Config(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    pub fn from_yaml(content: &str) -> EvalResult<Self> {
        let config: EvalConfig =
            serde_yaml::from_str(content).map_err(|e| EvalError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> EvalResult<()> {
        if self.task_description.trim().is_empty() {
            return Err(EvalError::Config("task_description must not be empty".into()));
        }
        if self.input_spec.is_empty() {
            return Err(EvalError::Config("input_spec must declare at least one input".into()));
        }
        if self.num_cases == 0 {
            return Err(EvalError::Config("num_cases must be positive".into()));
        }
        if self.concurrency == 0 {
            return Err(EvalError::Config("concurrency must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
task_description: Write a compact one day meal plan for a single athlete
input_spec:
  height: Athlete's height in cm
  weight: Athlete's weight in kg
  goal: Goal of the athlete
  restrictions: Dietary restrictions of the athlete
subject:
  type: prompt
  template: "Plan meals for {height}cm / {weight}kg, goal {goal}, avoiding {restrictions}"
"#;

    #[test]
    fn minimal_config_gets_defaults() {
        let config = EvalConfig::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.num_cases, 1);
        assert_eq!(config.concurrency, 3);
        assert!(config.generation.continue_on_error);
        assert!(!config.evaluation.continue_on_error);
        assert_eq!(config.outputs.dataset, PathBuf::from("dataset.json"));
        assert_eq!(config.outputs.results, PathBuf::from("output.json"));
        assert_eq!(config.outputs.report, PathBuf::from("output.html"));
        assert_eq!(config.model.name, DEFAULT_MODEL);
        assert!(config.extra_criteria.is_none());
        assert_eq!(
            config.input_spec.names().collect::<Vec<_>>(),
            vec!["height", "weight", "goal", "restrictions"]
        );
        match config.subject {
            SubjectConfig::Prompt { temperature, ref system, .. } => {
                assert_eq!(temperature, 1.0);
                assert!(system.is_none());
            }
            other => panic!("unexpected subject: {other:?}"),
        }
    }

    #[test]
    fn full_config() {
        let yaml = r#"
task_description: Summarize a support ticket
input_spec:
  ticket: Raw ticket text
num_cases: 5
concurrency: 2
extra_criteria: |
  The summary must be under 50 words
generation:
  continue_on_error: false
evaluation:
  continue_on_error: true
outputs:
  dataset: out/data.json
  results: out/results.json
  report: out/report.html
model:
  name: claude-3-5-sonnet-latest
  max_tokens: 2000
subject:
  type: http
  url: http://localhost:8080/summarize
"#;
        let config = EvalConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.num_cases, 5);
        assert_eq!(config.concurrency, 2);
        assert!(!config.generation.continue_on_error);
        assert!(config.evaluation.continue_on_error);
        assert_eq!(config.extra_criteria.as_deref(), Some("The summary must be under 50 words\n"));
        assert_eq!(config.outputs.report, PathBuf::from("out/report.html"));
        assert_eq!(config.model.max_tokens, 2000);
        assert_eq!(config.model.api_base, DEFAULT_API_BASE);
        match config.subject {
            SubjectConfig::Http { url, method } => {
                assert_eq!(url, "http://localhost:8080/summarize");
                assert_eq!(method, "POST");
            }
            other => panic!("unexpected subject: {other:?}"),
        }
    }

    #[test]
    fn zero_cases_rejected() {
        let yaml = MINIMAL.replace("subject:", "num_cases: 0\nsubject:");
        let err = EvalConfig::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("num_cases"));
    }

    #[test]
    fn zero_concurrency_rejected() {
        let yaml = MINIMAL.replace("subject:", "concurrency: 0\nsubject:");
        let err = EvalConfig::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("concurrency"));
    }

    #[test]
    fn empty_input_spec_rejected() {
        let yaml = r#"
task_description: t
input_spec: {}
subject:
  type: http
  url: http://localhost
"#;
        let err = EvalConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, EvalError::Config(_)));
    }

    #[test]
    fn missing_subject_rejected() {
        let yaml = "task_description: t\ninput_spec:\n  a: b\n";
        assert!(matches!(EvalConfig::from_yaml(yaml), Err(EvalError::Config(_))));
    }

    #[tokio::test]
    async fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eval.yaml");
        std::fs::write(&path, MINIMAL).unwrap();
        let config = EvalConfig::load(&path).await.unwrap();
        assert_eq!(config.input_spec.len(), 4);
    }
}
