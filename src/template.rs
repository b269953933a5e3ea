//! `{{.Name}}` substitution against the request's variables.
//!
//! Unbound names render as the empty string. A template that cannot be parsed
//! is returned unchanged.

use std::collections::HashMap;

use serde_json::Value;

use crate::condition::stringify;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

pub fn render(template: &str, variables: &HashMap<String, Value>) -> String {
    if !template.contains(OPEN) {
        return String::from(template);
    }
    try_render(template, variables).unwrap_or_else(|| String::from(template))
}

fn try_render(template: &str, variables: &HashMap<String, Value>) -> Option<String> {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find(OPEN) {
        output.push_str(&rest[..start]);
        let after_open = &rest[start + OPEN.len()..];
        let end = after_open.find(CLOSE)?;
        let name = parse_reference(&after_open[..end])?;
        if let Some(value) = variables.get(name) {
            output.push_str(&stringify(value));
        }
        rest = &after_open[end + CLOSE.len()..];
    }
    output.push_str(rest);
    Some(output)
}

fn parse_reference(action: &str) -> Option<&str> {
    let name = action.trim().strip_prefix('.')?;
    let valid = !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_');
    valid.then_some(name)
}
