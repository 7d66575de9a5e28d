use std::collections::HashMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // `{{` and `}}` are listed first so an escaped brace is consumed before
    // it can open or close a placeholder. They are left in place here and
    // collapsed over the whole output afterwards.
    PATTERN.get_or_init(|| Regex::new(r"\{\{|\}\}|\{([^{}]+)\}").expect("token pattern is valid"))
}

/// Substitute `{name}` placeholders with the matching variable.
///
/// Placeholders without a matching variable are kept verbatim, braces
/// included. Escaped `{{` and `}}` are never treated as placeholders.
/// Substituted values are not scanned for placeholders again, but once
/// substitution is done every `{{` and `}}` in the result collapses to a
/// literal `{` or `}`, including those inside substituted values.
pub fn render<I, K, V>(template: &str, variables: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: ToString,
{
    let variables: HashMap<String, String> = variables
        .into_iter()
        .map(|(k, v)| (k.into(), v.to_string()))
        .collect();

    let substituted = token_pattern().replace_all(template, |caps: &Captures<'_>| match caps.get(1) {
        Some(name) => variables
            .get(name.as_str())
            .cloned()
            .unwrap_or_else(|| caps[0].to_string()),
        None => caps[0].to_string(),
    });
    substituted.replace("{{", "{").replace("}}", "}")
}
