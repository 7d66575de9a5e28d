//! Dataset synthesis: brainstorm distinct scenarios, then expand each one
//! into a full test case.

use std::path::Path;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::datasource::save_dataset;
use crate::error::{EvalError, EvalResult};
use crate::extract::{decode, ExtractionRequest, StructuredExtractor};
use crate::progress::ProgressTracker;
use crate::template::render;
use crate::types::{InputSpec, PromptInputs, TestCase};

const IDEAS_SYSTEM_PROMPT: &str =
    "You are a test scenario designer specialized in creating diverse, unique testing scenarios.";

const IDEAS_TEMPLATE: &str = r#"Generate {num_cases} unique, diverse ideas for testing a prompt that accomplishes this task:

<task_description>
{task_description}
</task_description>

The prompt will receive the following inputs
<prompt_inputs>
{prompt_inputs}
</prompt_inputs>

Each idea should represent a distinct scenario or example that tests different aspects of the task.

Output Format:
Provide your response as a structured JSON array where each item is a brief description of the idea.

Example:
```json
[
    "Testing with technical computer science terminology",
    "Testing with medical research findings",
    "Testing with complex mathematical concepts",
    ...
]
```

Ensure each idea is:
- Clearly distinct from the others
- Relevant to the task description
- Specific enough to guide generation of a full test case
- Quick to solve without requiring extensive computation or multi-step processing
- Solvable with no more than 400 tokens of output

Remember, only generate {num_cases} unique ideas"#;

const TEST_CASE_SYSTEM_PROMPT: &str =
    "You are a test case creator specializing in designing evaluation scenarios.";

const TEST_CASE_TEMPLATE: &str = r#"Generate a single detailed test case for a prompt evaluation based on:

<task_description>
{task_description}
</task_description>

<specific_idea>
{idea}
</specific_idea>

<allowed_input_keys>
{allowed_keys}
</allowed_input_keys>

Output Format:
```json
{{
    "prompt_inputs": {{
{example_prompt_inputs}
    }},
    "solution_criteria": ["criterion 1", "criterion 2", ...] // Concise list of criteria for evaluating the solution, 1 to 4 items
}}
```

IMPORTANT REQUIREMENTS:
- You MUST ONLY use these exact input keys in your prompt_inputs: {allowed_keys}
- Do NOT add any additional keys to prompt_inputs
- All keys listed in allowed_input_keys must be included in your response
- Make the test case realistic and practically useful
- Include measurable, concise solution criteria
- The solution criteria should ONLY address the direct requirements of the task description and the generated prompt_inputs
- Avoid over-specifying criteria with requirements that go beyond the core task
- Keep solution criteria simple, focused, and directly tied to the fundamental task
- The test case should be tailored to the specific idea provided
- Quick to solve without requiring extensive computation or multi-step processing
- Solvable with no more than 400 tokens of output
- DO NOT include any fields beyond those specified in the output format"#;

const MAX_CRITERIA: usize = 4;

fn ideas_schema() -> Value {
    json!({
        "type": "array",
        "minItems": 1,
        "items": { "type": "string", "minLength": 1 }
    })
}

fn test_case_schema() -> Value {
    json!({
        "type": "object",
        "required": ["prompt_inputs", "solution_criteria"],
        "properties": {
            "prompt_inputs": { "type": "object" },
            "solution_criteria": {
                "type": "array",
                "minItems": 1,
                "items": { "type": "string" }
            }
        }
    })
}

#[derive(Debug, Deserialize)]
struct GeneratedCase {
    prompt_inputs: Map<String, Value>,
    solution_criteria: Vec<String>,
}

pub struct DatasetGenerator {
    extractor: Arc<dyn StructuredExtractor>,
    concurrency: usize,
    continue_on_error: bool,
}

impl DatasetGenerator {
    pub fn new(extractor: Arc<dyn StructuredExtractor>) -> Self {
        Self {
            extractor,
            concurrency: 3,
            continue_on_error: true,
        }
    }

    /// Maximum number of test cases synthesized at once.
    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    /// Drop failed test cases (the default) instead of failing the whole dataset.
    pub fn continue_on_error(mut self, enabled: bool) -> Self {
        self.continue_on_error = enabled;
        self
    }

    pub async fn generate_unique_ideas(
        &self,
        task_description: &str,
        input_spec: &InputSpec,
        n: usize,
    ) -> EvalResult<Vec<String>> {
        let prompt_inputs = input_spec
            .fields()
            .map(|(name, description)| format!("\"{}\": str # {},", name, escape_newlines(&description)))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = render(
            IDEAS_TEMPLATE,
            [
                ("task_description", task_description.to_string()),
                ("num_cases", n.to_string()),
                ("prompt_inputs", prompt_inputs),
            ],
        );

        let value = self
            .extractor
            .extract(
                ExtractionRequest::new(prompt)
                    .with_system(IDEAS_SYSTEM_PROMPT)
                    .with_temperature(1.0),
            )
            .await?;
        let mut ideas: Vec<String> = decode("idea list", &ideas_schema(), value)?;

        if ideas.len() > n {
            tracing::warn!(requested = n, received = ideas.len(), "model returned extra ideas, keeping the first {}", n);
            ideas.truncate(n);
        } else if ideas.len() < n {
            tracing::warn!(requested = n, received = ideas.len(), "model returned fewer ideas than requested");
        }
        Ok(ideas)
    }

    pub async fn generate_test_case(
        &self,
        task_description: &str,
        idea: &str,
        input_spec: &InputSpec,
    ) -> EvalResult<TestCase> {
        let example_prompt_inputs = input_spec
            .fields()
            .map(|(name, description)| {
                format!("        \"{}\": \"EXAMPLE_VALUE\", // {}", name, escape_newlines(&description))
            })
            .collect::<Vec<_>>()
            .join("\n");
        let allowed_keys = input_spec
            .names()
            .map(|name| format!("\"{}\"", name))
            .collect::<Vec<_>>()
            .join(", ");

        let prompt = render(
            TEST_CASE_TEMPLATE,
            [
                ("task_description", task_description),
                ("idea", idea),
                ("allowed_keys", allowed_keys.as_str()),
                ("example_prompt_inputs", example_prompt_inputs.as_str()),
            ],
        );

        let value = self
            .extractor
            .extract(
                ExtractionRequest::new(prompt)
                    .with_system(TEST_CASE_SYSTEM_PROMPT)
                    .with_temperature(0.7),
            )
            .await?;
        let generated: GeneratedCase = decode("test case", &test_case_schema(), value)?;

        if generated.solution_criteria.len() > MAX_CRITERIA {
            tracing::warn!(
                criteria = generated.solution_criteria.len(),
                scenario = idea,
                "test case has more solution criteria than requested"
            );
        }

        Ok(TestCase {
            prompt_inputs: conform_inputs(generated.prompt_inputs, input_spec)?,
            solution_criteria: generated.solution_criteria,
            task_description: task_description.to_string(),
            scenario: idea.to_string(),
        })
    }

    /// Generate `n` ideas, expand them concurrently and write the surviving
    /// test cases to `output_file`.
    pub async fn generate_dataset(
        &self,
        task_description: &str,
        input_spec: &InputSpec,
        n: usize,
        output_file: impl AsRef<Path>,
    ) -> EvalResult<Vec<TestCase>> {
        let ideas = self.generate_unique_ideas(task_description, input_spec, n).await?;

        let progress = ProgressTracker::new("Generated", ideas.len());
        let progress = &progress;
        let mut pending = stream::iter(ideas)
            .map(|idea| async move {
                let result = self.generate_test_case(task_description, &idea, input_spec).await;
                if result.is_ok() {
                    progress.complete();
                }
                (idea, result)
            })
            .buffer_unordered(self.concurrency);

        let mut dataset = Vec::new();
        while let Some((idea, result)) = pending.next().await {
            match result {
                Ok(case) => dataset.push(case),
                Err(err) if self.continue_on_error => {
                    tracing::warn!(scenario = %idea, error = %err, "error generating test case, skipping");
                }
                Err(err) => return Err(err),
            }
        }

        save_dataset(output_file.as_ref(), &dataset).await?;
        tracing::info!(
            cases = dataset.len(),
            path = %output_file.as_ref().display(),
            "dataset written"
        );
        Ok(dataset)
    }
}

fn escape_newlines(s: &str) -> String {
    s.replace('\n', "\\n")
}

/// Enforce that the inputs carry exactly the declared keys, then normalise
/// values to text in declaration order.
fn conform_inputs(inputs: Map<String, Value>, input_spec: &InputSpec) -> EvalResult<PromptInputs> {
    let unexpected: Vec<String> = inputs
        .keys()
        .filter(|k| !input_spec.contains(k))
        .cloned()
        .collect();
    let missing: Vec<String> = input_spec
        .names()
        .filter(|name| !inputs.contains_key(*name))
        .map(str::to_string)
        .collect();
    if !unexpected.is_empty() || !missing.is_empty() {
        return Err(EvalError::SchemaViolation { unexpected, missing });
    }

    let mut inputs = inputs;
    let mut conformed = PromptInputs::new();
    for name in input_spec.names() {
        if let Some(value) = inputs.remove(name) {
            let text = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            conformed.insert(name.to_string(), Value::String(text));
        }
    }
    Ok(conformed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{FencedJsonExtractor, ParseError};
    use crate::model::TransportError;
    use crate::testing::ScriptedModel;

    fn spec() -> InputSpec {
        InputSpec::new()
            .field("height", "Athlete's height in cm")
            .field("weight", "Athlete's weight in kg")
    }

    fn generator(model: Arc<ScriptedModel>) -> DatasetGenerator {
        DatasetGenerator::new(Arc::new(FencedJsonExtractor::new(model)))
    }

    #[tokio::test]
    async fn ideas_prompt_lists_inputs_and_count() {
        let model = Arc::new(ScriptedModel::new([r#"["a", "b", "c"]"#]));
        let ideas = generator(model.clone())
            .generate_unique_ideas("Write a meal plan", &spec(), 3)
            .await
            .unwrap();
        assert_eq!(ideas, vec!["a", "b", "c"]);

        let request = &model.requests()[0];
        let prompt = &request.messages[0].content;
        assert!(prompt.starts_with("Generate 3 unique, diverse ideas"));
        assert!(prompt.contains("Remember, only generate 3 unique ideas"));
        assert!(prompt.contains("\"height\": str # Athlete's height in cm,"));
        assert!(prompt.contains("<task_description>\nWrite a meal plan\n</task_description>"));
        assert_eq!(request.system.as_deref(), Some(IDEAS_SYSTEM_PROMPT));
        assert_eq!(request.temperature, 1.0);
    }

    #[tokio::test]
    async fn extra_ideas_are_truncated() {
        let model = Arc::new(ScriptedModel::new([r#"["a", "b", "c", "d"]"#]));
        let ideas = generator(model).generate_unique_ideas("t", &spec(), 2).await.unwrap();
        assert_eq!(ideas, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn non_array_ideas_are_a_parse_error() {
        let model = Arc::new(ScriptedModel::new([r#"{"idea": "a"}"#]));
        let err = generator(model).generate_unique_ideas("t", &spec(), 1).await.unwrap_err();
        assert!(matches!(err, EvalError::Parse(ParseError::Schema { .. })));

        let model = Arc::new(ScriptedModel::new(["not json at all"]));
        let err = generator(model).generate_unique_ideas("t", &spec(), 1).await.unwrap_err();
        assert!(matches!(err, EvalError::Parse(ParseError::InvalidJson { .. })));
    }

    #[tokio::test]
    async fn test_case_gets_task_and_scenario_attached() {
        let model = Arc::new(ScriptedModel::new([r#"{
            "prompt_inputs": {"weight": 70, "height": "180"},
            "solution_criteria": ["Includes calories", "Lists portions"]
        }"#]));
        let case = generator(model.clone())
            .generate_test_case("Write a meal plan", "vegan athlete", &spec())
            .await
            .unwrap();

        assert_eq!(case.task_description, "Write a meal plan");
        assert_eq!(case.scenario, "vegan athlete");
        assert_eq!(case.solution_criteria, vec!["Includes calories", "Lists portions"]);
        let keys: Vec<&String> = case.prompt_inputs.keys().collect();
        assert_eq!(keys, vec!["height", "weight"]);
        assert_eq!(case.prompt_inputs["weight"], json!("70"));

        let request = &model.requests()[0];
        let prompt = &request.messages[0].content;
        assert!(prompt.contains("<allowed_input_keys>\n\"height\", \"weight\"\n</allowed_input_keys>"));
        assert!(prompt.contains("\"weight\": \"EXAMPLE_VALUE\", // Athlete's weight in kg"));
        assert!(prompt.contains("{\n    \"prompt_inputs\": {"));
        assert_eq!(request.temperature, 0.7);
    }

    #[tokio::test]
    async fn extra_input_key_is_a_schema_violation() {
        let model = Arc::new(ScriptedModel::new([r#"{
            "prompt_inputs": {"height": "180", "weight": "70", "age": "25"},
            "solution_criteria": ["ok"]
        }"#]));
        let err = generator(model)
            .generate_test_case("t", "idea", &spec())
            .await
            .unwrap_err();
        match err {
            EvalError::SchemaViolation { unexpected, missing } => {
                assert_eq!(unexpected, vec!["age"]);
                assert!(missing.is_empty());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_input_key_is_a_schema_violation() {
        let model = Arc::new(ScriptedModel::new([r#"{
            "prompt_inputs": {"height": "180"},
            "solution_criteria": ["ok"]
        }"#]));
        let err = generator(model)
            .generate_test_case("t", "idea", &spec())
            .await
            .unwrap_err();
        match err {
            EvalError::SchemaViolation { unexpected, missing } => {
                assert!(unexpected.is_empty());
                assert_eq!(missing, vec!["weight"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_criteria_is_a_parse_error() {
        let model = Arc::new(ScriptedModel::new([r#"{
            "prompt_inputs": {"height": "180", "weight": "70"},
            "solution_criteria": []
        }"#]));
        let err = generator(model)
            .generate_test_case("t", "idea", &spec())
            .await
            .unwrap_err();
        assert!(matches!(err, EvalError::Parse(_)));
    }

    #[tokio::test]
    async fn strict_generation_fails_on_first_error() {
        let model = Arc::new(ScriptedModel::from_fn(|request| {
            let prompt = &request.messages[0].content;
            if prompt.starts_with("Generate 2 unique") {
                Ok(r#"["good", "bad"]"#.to_string())
            } else if prompt.contains("<specific_idea>\nbad\n") {
                Err(TransportError::Other("rate limited".into()))
            } else {
                Ok(r#"{"prompt_inputs": {"height": "1", "weight": "2"}, "solution_criteria": ["x"]}"#.to_string())
            }
        }));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataset.json");
        let err = generator(model)
            .continue_on_error(false)
            .generate_dataset("t", &spec(), 2, &path)
            .await
            .unwrap_err();
        assert!(matches!(err, EvalError::Transport(_)));
        assert!(!path.exists());
    }
}
