use std::sync::Arc;

use anyhow::Context;
use promptcraft_core::{from_async_fn, PromptInputs, Subject};
use serde_json::{json, Value};

/// Subject that forwards each case's inputs to an HTTP endpoint serving the
/// prompt under test. POST sends `{ "inputs": {...} }`; GET passes the
/// inputs as a JSON-encoded `inputs` query parameter.
///
/// The endpoint may answer with plain text or with JSON carrying an
/// `output` string field.
pub fn http_subject(url: String, method: String) -> Arc<dyn Subject> {
	let client = reqwest::Client::new();
	let method = method.to_uppercase();
	from_async_fn(move |inputs: PromptInputs| {
		let client = client.clone();
		let url = url.clone();
		let method = method.clone();
		async move {
			let resp = match method.as_str() {
				"GET" => {
					let q = [("inputs", Value::Object(inputs).to_string())];
					client.get(&url).query(&q).send().await?
				}
				_ => client.post(&url).json(&json!({ "inputs": inputs })).send().await?,
			};
			let status = resp.status();
			let body = resp.text().await?;
			if !status.is_success() {
				anyhow::bail!("HTTP {}: {}", status.as_u16(), body);
			}
			extract_output(&body).with_context(|| format!("unusable response from {}", url))
		}
	})
}

fn extract_output(body: &str) -> anyhow::Result<String> {
	match serde_json::from_str::<Value>(body) {
		Ok(Value::Object(map)) => match map.get("output") {
			Some(Value::String(s)) => Ok(s.clone()),
			Some(other) => Ok(other.to_string()),
			None => anyhow::bail!("JSON response has no \"output\" field"),
		},
		Ok(Value::String(s)) => Ok(s),
		_ => Ok(body.to_string()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn plain_text_body_is_the_output() {
		assert_eq!(extract_output("Breakfast: oats").unwrap(), "Breakfast: oats");
	}

	#[test]
	fn json_output_field_is_read() {
		assert_eq!(extract_output(r#"{"output": "Lunch: rice"}"#).unwrap(), "Lunch: rice");
		assert_eq!(extract_output(r#""quoted""#).unwrap(), "quoted");
	}

	#[test]
	fn json_object_without_output_is_rejected() {
		assert!(extract_output(r#"{"result": "x"}"#).is_err());
	}
}
