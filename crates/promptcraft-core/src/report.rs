use crate::types::{value_preview, EvaluationResult, EvaluationSummary};

/// CSS class for a score badge: high from 8, low up to 5, medium between.
pub fn score_class(score: u8) -> &'static str {
    if score >= 8 {
        "score-high"
    } else if score <= 5 {
        "score-low"
    } else {
        "score-medium"
    }
}

pub fn generate_html_report(results: &[EvaluationResult]) -> String {
    let summary = EvaluationSummary::from_results(results);
    let mut rows = String::new();

    for result in results {
        let case = &result.test_case;
        let inputs_html = case
            .prompt_inputs
            .iter()
            .map(|(key, value)| {
                format!(
                    "<strong>{}:</strong> {}",
                    html_escape(key),
                    html_escape(&value_preview(value))
                )
            })
            .collect::<Vec<_>>()
            .join("<br>");
        let criteria_html = case
            .solution_criteria
            .iter()
            .map(|c| format!("• {}", html_escape(c)))
            .collect::<Vec<_>>()
            .join("<br>");

        rows.push_str(&format!(
            r#"
            <tr>
                <td>{}</td>
                <td class="prompt-inputs">{}</td>
                <td class="criteria">{}</td>
                <td class="output"><pre>{}</pre></td>
                <td class="score-col"><span class="score {}">{}</span></td>
                <td class="reasoning">{}</td>
            </tr>
            "#,
            html_escape(&case.scenario),
            inputs_html,
            criteria_html,
            html_escape(&result.output),
            score_class(result.score),
            result.score,
            html_escape(&result.reasoning)
        ));
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Prompt Evaluation Report</title>
    <style>
        * {{ box-sizing: border-box; }}
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, 'Helvetica Neue', Arial, sans-serif;
            margin: 0;
            padding: 20px;
            background: #f5f5f5;
            color: #333;
        }}
        .container {{
            max-width: 1400px;
            margin: 0 auto;
            background: white;
            padding: 30px;
            border-radius: 8px;
            box-shadow: 0 2px 8px rgba(0,0,0,0.1);
        }}
        h1 {{ margin: 0 0 10px 0; }}
        .timestamp {{ color: #6c757d; font-size: 14px; margin-bottom: 20px; }}
        .summary {{
            display: flex;
            gap: 20px;
            margin: 20px 0 30px 0;
            padding: 20px;
            background: #f8f9fa;
            border-radius: 6px;
        }}
        .summary-item {{ flex: 1; }}
        .summary-label {{
            font-size: 12px;
            color: #666;
            text-transform: uppercase;
            letter-spacing: 0.5px;
            margin-bottom: 5px;
        }}
        .summary-value {{ font-size: 28px; font-weight: 600; }}
        table {{ width: 100%; border-collapse: collapse; margin-top: 20px; }}
        th {{
            background: #343a40;
            color: white;
            padding: 12px;
            text-align: left;
            font-size: 13px;
            text-transform: uppercase;
            letter-spacing: 0.5px;
        }}
        td {{
            width: 20%;
            padding: 12px;
            border-bottom: 1px solid #dee2e6;
            vertical-align: top;
        }}
        tr:nth-child(even) {{ background: #f9f9f9; }}
        pre {{
            margin: 0;
            padding: 8px;
            background: #f8f9fa;
            border: 1px solid #ddd;
            border-radius: 4px;
            font-family: 'Consolas', 'Monaco', 'Courier New', monospace;
            font-size: 12px;
            white-space: pre-wrap;
            word-break: break-word;
        }}
        .score-col {{ width: 80px; }}
        .score {{
            font-weight: bold;
            padding: 5px 10px;
            border-radius: 3px;
            display: inline-block;
        }}
        .score-high {{ background: #c8e6c9; color: #2e7d32; }}
        .score-medium {{ background: #fff9c4; color: #f57f17; }}
        .score-low {{ background: #ffcdd2; color: #c62828; }}
    </style>
</head>
<body>
    <div class="container">
        <h1>Prompt Evaluation Report</h1>
        <div class="timestamp">Generated: {}</div>

        <div class="summary">
            <div class="summary-item">
                <div class="summary-label">Total Test Cases</div>
                <div class="summary-value">{}</div>
            </div>
            <div class="summary-item">
                <div class="summary-label">Average Score</div>
                <div class="summary-value">{:.1} / 10</div>
            </div>
            <div class="summary-item">
                <div class="summary-label">Pass Rate (≥7)</div>
                <div class="summary-value">{:.1}%</div>
            </div>
        </div>

        <table>
            <thead>
                <tr>
                    <th>Scenario</th>
                    <th>Prompt Inputs</th>
                    <th>Solution Criteria</th>
                    <th>Output</th>
                    <th>Score</th>
                    <th>Reasoning</th>
                </tr>
            </thead>
            <tbody>
                {}
            </tbody>
        </table>
    </div>
</body>
</html>"#,
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
        summary.total,
        summary.mean_score,
        summary.pass_rate,
        rows
    )
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
