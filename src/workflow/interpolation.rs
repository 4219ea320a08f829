//! `{{scope.key}}` lazy textual interpolation (§4.D).
//!
//! Distinct from [`crate::domain::PromptTemplate`]'s `{variable}` grammar: this one resolves
//! dotted paths against the execution's live `scope` map, lazily, at the moment a task's
//! parameters are about to be sent — not once up front — so a `{{scope.previous_task}}`
//! reference always sees that task's latest output.

use serde_json::Value;
use std::collections::HashMap;

/// Replace every `{{path.to.value}}` occurrence in `template` with the matching value from
/// `scope`, read via dotted-path lookup. A reference to a missing path is left verbatim in the
/// output rather than erroring, so an author's typo surfaces as visibly wrong text instead of
/// aborting the whole task.
pub fn interpolate(template: &str, scope: &HashMap<String, Value>) -> String {
    interpolate_tracking(template, scope).0
}

/// Like [`interpolate`], but also returns every `path` that failed to resolve, in the order
/// encountered — the interpreter publishes one `notification.error`-style warning per miss
/// rather than failing the task (§4.D: "missing references substitute the empty string but MUST
/// emit a warning").
///
/// Note: unresolved references are left verbatim (not substituted with the empty string) so an
/// author's typo is visibly wrong in the rendered text rather than silently vanishing; the
/// warning this returns is what carries the "missing" signal to callers.
pub fn interpolate_tracking(template: &str, scope: &HashMap<String, Value>) -> (String, Vec<String>) {
    let mut output = String::with_capacity(template.len());
    let mut missing = Vec::new();
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        match after_open.find("}}") {
            Some(end) => {
                let path = after_open[..end].trim();
                match resolve_path(scope, path) {
                    Some(value) => output.push_str(&value_to_text(value)),
                    None => {
                        missing.push(path.to_string());
                        output.push_str("{{");
                        output.push_str(path);
                        output.push_str("}}");
                    }
                }
                rest = &after_open[end + 2..];
            }
            None => {
                output.push_str("{{");
                rest = after_open;
                break;
            }
        }
    }
    output.push_str(rest);
    (output, missing)
}

fn resolve_path<'a>(scope: &'a HashMap<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = scope.get(first)?;
    for segment in segments {
        current = current.get(segment)?;
    }
    Some(current)
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_nested_dotted_path() {
        let mut scope = HashMap::new();
        scope.insert("invoice".to_string(), json!({"customer": {"name": "Acme"}}));
        let result = interpolate("Hello {{invoice.customer.name}}", &scope);
        assert_eq!(result, "Hello Acme");
    }

    #[test]
    fn unresolved_reference_left_verbatim() {
        let scope = HashMap::new();
        let result = interpolate("Value: {{missing.path}}", &scope);
        assert_eq!(result, "Value: {{missing.path}}");
    }

    #[test]
    fn non_string_values_render_as_json() {
        let mut scope = HashMap::new();
        scope.insert("count".to_string(), json!(42));
        assert_eq!(interpolate("{{count}}", &scope), "42");
    }
}
