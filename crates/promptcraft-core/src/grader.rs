use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::EvalResult;
use crate::extract::{decode, ExtractionRequest, StructuredExtractor};
use crate::template::render;
use crate::types::{value_preview, GradeVerdict, TestCase};

const EXTRA_CRITERIA_TEMPLATE: &str = r#"Mandatory Requirements - ANY VIOLATION MEANS AUTOMATIC FAILURE (score of 3 or lower):
<extra_important_criteria>
{extra_criteria}
</extra_important_criteria>"#;

const RUBRIC_TEMPLATE: &str = r#"Your task is to evaluate the following AI-generated solution with EXTREME RIGOR.

Original task description:
<task_description>
{task_description}
</task_description>

Original task inputs:
<task_inputs>
{{ {prompt_inputs} }}
</task_inputs>

Solution to Evaluate:
<solution>
{output}
</solution>

Criteria you should use to evaluate the solution:
<criteria>
{solution_criteria}
</criteria>

{extra_criteria_section}

Scoring Guidelines:
* Score 1-3: Solution fails to meet one or more MANDATORY requirements
* Score 4-6: Solution meets all mandatory requirements but has significant deficiencies in secondary criteria
* Score 7-8: Solution meets all mandatory requirements and most secondary criteria, with minor issues
* Score 9-10: Solution meets all mandatory and secondary criteria

IMPORTANT SCORING INSTRUCTIONS:
* Grade the output based ONLY on the listed criteria. Do not add your own extra requirements.
* If a solution meets all of the mandatory and secondary criteria give it a 10
* Don't complain that the solution "only" meets the mandatory and secondary criteria. Solutions shouldn't go above and beyond - they should meet the exact listed criteria.
* ANY violation of a mandatory requirement MUST result in a score of 3 or lower
* The full 1-10 scale should be utilized - don't hesitate to give low scores when warranted

Output Format
Provide your evaluation as a structured JSON object with the following fields, in this specific order:
- "strengths": An array of 1-3 key strengths
- "weaknesses": An array of 1-3 key areas for improvement
- "reasoning": A concise explanation of your overall assessment
- "score": A number between 1-10

Respond with JSON. Keep your response concise and direct."#;

fn verdict_schema() -> Value {
    json!({
        "type": "object",
        "required": ["strengths", "weaknesses", "reasoning", "score"],
        "properties": {
            "strengths": { "type": "array", "items": { "type": "string" } },
            "weaknesses": { "type": "array", "items": { "type": "string" } },
            "reasoning": { "type": "string" },
            "score": { "type": "integer", "minimum": 1, "maximum": 10 }
        }
    })
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    strengths: Vec<String>,
    weaknesses: Vec<String>,
    reasoning: String,
    // Integral floats such as `7.0` pass the schema but not a `u8` field.
    score: f64,
}

/// Scores one produced output against a test case's criteria.
#[async_trait]
pub trait Grader: Send + Sync {
    async fn grade_output(
        &self,
        test_case: &TestCase,
        output: &str,
        extra_criteria: Option<&str>,
    ) -> EvalResult<GradeVerdict>;
}

/// Model-based judge using a fixed 1-10 rubric at temperature 0.
pub struct ModelGrader {
    extractor: Arc<dyn StructuredExtractor>,
}

impl ModelGrader {
    pub fn new(extractor: Arc<dyn StructuredExtractor>) -> Self {
        Self { extractor }
    }
}

/// Build the judge prompt for one output.
pub fn rubric_prompt(test_case: &TestCase, output: &str, extra_criteria: Option<&str>) -> String {
    let prompt_inputs: String = test_case
        .prompt_inputs
        .iter()
        .map(|(key, value)| format!("\"{}\":\"{}\",\n", key, value_preview(value).replace('\n', "\\n")))
        .collect();

    let extra_criteria_section = match extra_criteria {
        Some(criteria) => render(EXTRA_CRITERIA_TEMPLATE, [("extra_criteria", criteria)]),
        None => String::new(),
    };

    render(
        RUBRIC_TEMPLATE,
        [
            ("task_description", test_case.task_description.clone()),
            ("prompt_inputs", prompt_inputs),
            ("output", output.to_string()),
            ("solution_criteria", test_case.solution_criteria.join("\n")),
            ("extra_criteria_section", extra_criteria_section),
        ],
    )
}

#[async_trait]
impl Grader for ModelGrader {
    async fn grade_output(
        &self,
        test_case: &TestCase,
        output: &str,
        extra_criteria: Option<&str>,
    ) -> EvalResult<GradeVerdict> {
        let prompt = rubric_prompt(test_case, output, extra_criteria);
        let value = self
            .extractor
            .extract(ExtractionRequest::new(prompt).with_temperature(0.0))
            .await?;
        let raw: RawVerdict = decode("grade verdict", &verdict_schema(), value)?;
        tracing::debug!(scenario = %test_case.scenario, score = raw.score, "graded output");

        Ok(GradeVerdict {
            strengths: raw.strengths,
            weaknesses: raw.weaknesses,
            reasoning: raw.reasoning,
            score: raw.score as u8,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvalError;
    use crate::extract::{FencedJsonExtractor, ParseError};
    use crate::testing::ScriptedModel;
    use serde_json::Map;

    fn case() -> TestCase {
        let mut prompt_inputs = Map::new();
        prompt_inputs.insert("goal".into(), json!("gain\nmuscle"));
        prompt_inputs.insert("restrictions".into(), json!("vegan"));
        TestCase {
            prompt_inputs,
            solution_criteria: vec!["States total calories".into(), "Only vegan foods".into()],
            task_description: "Write a one day meal plan".into(),
            scenario: "vegan bodybuilder".into(),
        }
    }

    fn grader(model: Arc<ScriptedModel>) -> ModelGrader {
        ModelGrader::new(Arc::new(FencedJsonExtractor::new(model)))
    }

    #[test]
    fn rubric_embeds_case_output_and_criteria() {
        let prompt = rubric_prompt(&case(), "Breakfast: {oats}", None);
        assert!(prompt.contains("<task_description>\nWrite a one day meal plan\n</task_description>"));
        assert!(prompt.contains("{ \"goal\":\"gain\\nmuscle\",\n\"restrictions\":\"vegan\",\n }"));
        assert!(prompt.contains("<solution>\nBreakfast: {oats}\n</solution>"));
        assert!(prompt.contains("<criteria>\nStates total calories\nOnly vegan foods\n</criteria>"));
        assert!(!prompt.contains("Mandatory Requirements"));
        assert!(prompt.contains("* Score 1-3: Solution fails to meet one or more MANDATORY requirements"));
    }

    #[test]
    fn rubric_marks_extra_criteria_mandatory() {
        let prompt = rubric_prompt(&case(), "out", Some("Must list portion sizes in grams"));
        assert!(prompt.contains("ANY VIOLATION MEANS AUTOMATIC FAILURE (score of 3 or lower)"));
        assert!(prompt.contains(
            "<extra_important_criteria>\nMust list portion sizes in grams\n</extra_important_criteria>"
        ));
    }

    #[tokio::test]
    async fn verdict_is_returned_unmodified() {
        let model = Arc::new(ScriptedModel::new([r#"{
            "strengths": ["Correct calories"],
            "weaknesses": ["Contains honey, violating the vegan mandatory requirement"],
            "reasoning": "Mandatory vegan requirement violated by honey.",
            "score": 2
        }"#]));
        let verdict = grader(model.clone())
            .grade_output(&case(), "Oats with honey", Some("Only vegan foods"))
            .await
            .unwrap();

        assert_eq!(verdict.score, 2);
        assert!(verdict.reasoning.contains("Mandatory"));
        assert!(verdict.weaknesses[0].contains("violating"));
        assert_eq!(verdict.strengths, vec!["Correct calories"]);

        let request = &model.requests()[0];
        assert_eq!(request.temperature, 0.0);
        assert!(request.system.is_none());
    }

    #[tokio::test]
    async fn integral_float_scores_are_accepted() {
        let model = Arc::new(ScriptedModel::new([
            r#"{"strengths": [], "weaknesses": [], "reasoning": "ok", "score": 7.0}"#,
        ]));
        let verdict = grader(model).grade_output(&case(), "x", None).await.unwrap();
        assert_eq!(verdict.score, 7);
    }

    #[tokio::test]
    async fn out_of_band_score_is_a_parse_error() {
        let model = Arc::new(ScriptedModel::new([
            r#"{"strengths": [], "weaknesses": [], "reasoning": "great", "score": 11}"#,
        ]));
        let err = grader(model).grade_output(&case(), "x", None).await.unwrap_err();
        assert!(matches!(err, EvalError::Parse(ParseError::Schema { .. })));
    }

    #[tokio::test]
    async fn malformed_verdict_is_a_parse_error() {
        let model = Arc::new(ScriptedModel::new([r#"{"score": 5, "reasoning": "#]));
        let err = grader(model).grade_output(&case(), "x", None).await.unwrap_err();
        assert!(matches!(err, EvalError::Parse(ParseError::InvalidJson { .. })));
    }
}
