// Example: evaluate a meal-planning prompt end to end with the library
//
// Generates a small dataset from a task description, runs the prompt under
// test on every case and grades each output with the model judge.
//
// To run from the workspace root:
//   ANTHROPIC_API_KEY=... cargo run -p promptcraft-core --example meal_plan

use std::sync::Arc;

use promptcraft_core::testing::assert_mean_score;
use promptcraft_core::*;

const TASK: &str = "Write a compact, concise 1 day meal plan for a single athlete";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let api_key = std::env::var("ANTHROPIC_API_KEY")?;
    let caller: Arc<dyn ModelCaller> = Arc::new(AnthropicCaller::new(api_key));
    let extractor = Arc::new(FencedJsonExtractor::new(caller.clone()));

    let input_spec = InputSpec::new()
        .field("height", "Athlete's height in cm")
        .field("weight", "Athlete's weight in kg")
        .field("goal", "Goal of the athlete")
        .field("restrictions", "Dietary restrictions of the athlete");

    let dataset = DatasetGenerator::new(extractor.clone())
        .concurrency(3)
        .generate_dataset(TASK, &input_spec, 3, "dataset.json")
        .await?;
    println!("Generated {} test cases", dataset.len());

    // The prompt under test: render the case's inputs into a template and
    // ask the model.
    let subject = PromptSubject::new(
        caller,
        "What should this person eat?\n\n\
         - Height: {height}\n\
         - Weight: {weight}\n\
         - Goal: {goal}\n\
         - Dietary restrictions: {restrictions}",
    );

    let run = Evaluation::builder()
        .dataset_file("dataset.json")
        .subject(Arc::new(subject))
        .grader(Arc::new(ModelGrader::new(extractor)))
        .extra_criteria(
            "The output should include:\n\
             - Daily caloric total\n\
             - Macronutrient breakdown\n\
             - Meals with exact foods, portions, and timing",
        )
        .results_file("output.json")
        .report_file("output.html")
        .build()?
        .run()
        .await?;

    println!("{}", run.summary_table());
    assert_mean_score(&run, 7.0)?;
    Ok(())
}
