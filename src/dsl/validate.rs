//! Conversion of untrusted JSON into typed test definitions.
//!
//! Validation happens before any browser is launched, so a malformed step
//! never costs a browser session. Messages name the offending step index and
//! action.

use serde_json::{Map, Value};
use thiserror::Error;

use super::types::{TestDefinition, TestStep};

/// A test definition was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validate a complete `{test_name, steps}` object.
pub fn validate_test_definition(input: &Value) -> ValidationResult<TestDefinition> {
    let obj = input
        .as_object()
        .ok_or_else(|| ValidationError::new("Input must be an object"))?;

    let test_name = match obj.get("test_name").and_then(Value::as_str) {
        Some(name) if !name.trim().is_empty() => name.to_string(),
        _ => return Err(ValidationError::new("Missing or invalid 'test_name' property")),
    };

    let steps = obj
        .get("steps")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            ValidationError::new("Missing or invalid 'steps' property (must be an array)")
        })?;
    if steps.is_empty() {
        return Err(ValidationError::new("'steps' array cannot be empty"));
    }

    let steps = steps
        .iter()
        .enumerate()
        .map(|(index, step)| validate_step(step, index))
        .collect::<ValidationResult<Vec<_>>>()?;

    Ok(TestDefinition { test_name, steps })
}

/// Validate a test definition given as a JSON string.
pub fn parse_test_definition(json: &str) -> ValidationResult<TestDefinition> {
    let value: Value = serde_json::from_str(json)
        .map_err(|e| ValidationError::new(format!("Invalid JSON: {}", e)))?;
    validate_test_definition(&value)
}

/// Validate one step record.
pub fn validate_step(step: &Value, index: usize) -> ValidationResult<TestStep> {
    let s = step
        .as_object()
        .ok_or_else(|| ValidationError::new(format!("Step {}: must be an object", index)))?;

    let action = s.get("action").and_then(Value::as_str).ok_or_else(|| {
        ValidationError::new(format!("Step {}: missing or invalid 'action' property", index))
    })?;

    let fields = StepFields { s, index, action };

    let step = match action {
        "goto" => TestStep::Goto {
            url: fields.string("url")?,
        },
        "click" => TestStep::Click {
            selector: fields.string("selector")?,
        },
        "type" => TestStep::Type {
            selector: fields.string("selector")?,
            text: fields.string("text")?,
        },
        "wait_for" => TestStep::WaitFor {
            selector: fields.string("selector")?,
            timeout: fields.optional_millis("timeout")?,
        },
        "screenshot" => TestStep::Screenshot {
            name: fields.string("name")?,
        },
        "screenshot_element" => TestStep::ScreenshotElement {
            selector: fields.string("selector")?,
            name: fields.string("name")?,
            padding: s.get("padding").and_then(Value::as_f64),
        },
        "assert_text" => TestStep::AssertText {
            selector: fields.string("selector")?,
            text: fields.string("text")?,
        },
        "assert_visible" => TestStep::AssertVisible {
            selector: fields.string("selector")?,
        },
        "hover" => TestStep::Hover {
            selector: fields.string("selector")?,
        },
        "select" => TestStep::Select {
            selector: fields.string("selector")?,
            value: fields.string("value")?,
        },
        "press" => TestStep::Press {
            key: fields.string("key")?,
        },
        "wait" => match fields.optional_millis("duration")? {
            Some(duration) => TestStep::Wait { duration },
            None => {
                return Err(ValidationError::new(format!(
                    "Step {} (wait): missing 'duration' property (milliseconds)",
                    index
                )));
            }
        },
        other => {
            return Err(ValidationError::new(format!(
                "Step {}: unknown action '{}'",
                index, other
            )));
        }
    };

    Ok(step)
}

/// Field accessors for one step record.
struct StepFields<'a> {
    s: &'a Map<String, Value>,
    index: usize,
    action: &'a str,
}

impl StepFields<'_> {
    fn string(&self, field: &str) -> ValidationResult<String> {
        self.s
            .get(field)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                ValidationError::new(format!(
                    "Step {} ({}): missing '{}' property",
                    self.index, self.action, field
                ))
            })
    }

    /// Non-numeric values are treated as absent; negative ones are rejected.
    fn optional_millis(&self, field: &str) -> ValidationResult<Option<u64>> {
        match self.s.get(field).and_then(Value::as_f64) {
            None => Ok(None),
            Some(ms) if ms < 0.0 || !ms.is_finite() => Err(ValidationError::new(format!(
                "Step {} ({}): '{}' must be a non-negative number of milliseconds",
                self.index, self.action, field
            ))),
            Some(ms) => Ok(Some(ms.round() as u64)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_valid_definition() {
        let definition = validate_test_definition(&json!({
            "test_name": "login",
            "steps": [
                {"action": "goto", "url": "https://example.com"},
                {"action": "type", "selector": "#user", "text": "alice"},
                {"action": "wait_for", "selector": "#ok", "timeout": 500},
                {"action": "screenshot_element", "selector": "#box", "name": "box"},
                {"action": "wait", "duration": 100}
            ]
        }))
        .unwrap();

        assert_eq!(definition.test_name, "login");
        assert_eq!(definition.steps.len(), 5);
        assert_eq!(
            definition.steps[2],
            TestStep::WaitFor {
                selector: "#ok".to_string(),
                timeout: Some(500)
            }
        );
        assert_eq!(
            definition.steps[3],
            TestStep::ScreenshotElement {
                selector: "#box".to_string(),
                name: "box".to_string(),
                padding: None
            }
        );
    }

    #[test]
    fn test_rejects_blank_name_and_empty_steps() {
        let err = validate_test_definition(&json!({"test_name": "  ", "steps": []})).unwrap_err();
        assert_eq!(err.message(), "Missing or invalid 'test_name' property");

        let err = validate_test_definition(&json!({"test_name": "t", "steps": []})).unwrap_err();
        assert_eq!(err.message(), "'steps' array cannot be empty");

        let err = validate_test_definition(&json!({"test_name": "t", "steps": "nope"})).unwrap_err();
        assert_eq!(
            err.message(),
            "Missing or invalid 'steps' property (must be an array)"
        );

        let err = validate_test_definition(&json!([1, 2])).unwrap_err();
        assert_eq!(err.message(), "Input must be an object");
    }

    #[test]
    fn test_missing_field_names_step_and_action() {
        let err = validate_test_definition(&json!({
            "test_name": "t",
            "steps": [
                {"action": "goto", "url": "about:blank"},
                {"action": "type", "selector": "#q"}
            ]
        }))
        .unwrap_err();
        assert_eq!(err.message(), "Step 1 (type): missing 'text' property");
    }

    #[test]
    fn test_unknown_and_missing_action() {
        let err = validate_step(&json!({"action": "scroll"}), 0).unwrap_err();
        assert_eq!(err.message(), "Step 0: unknown action 'scroll'");

        let err = validate_step(&json!({"selector": "a"}), 3).unwrap_err();
        assert_eq!(err.message(), "Step 3: missing or invalid 'action' property");

        let err = validate_step(&json!("click"), 2).unwrap_err();
        assert_eq!(err.message(), "Step 2: must be an object");
    }

    #[test]
    fn test_wait_requires_non_negative_duration() {
        let err = validate_step(&json!({"action": "wait"}), 0).unwrap_err();
        assert_eq!(
            err.message(),
            "Step 0 (wait): missing 'duration' property (milliseconds)"
        );

        let err = validate_step(&json!({"action": "wait", "duration": -10}), 0).unwrap_err();
        assert!(err.message().contains("non-negative"));

        let step = validate_step(&json!({"action": "wait", "duration": 250}), 0).unwrap();
        assert_eq!(step, TestStep::Wait { duration: 250 });
    }

    #[test]
    fn test_non_numeric_optionals_are_dropped() {
        let step = validate_step(
            &json!({"action": "wait_for", "selector": "a", "timeout": "soon"}),
            0,
        )
        .unwrap();
        assert_eq!(
            step,
            TestStep::WaitFor {
                selector: "a".to_string(),
                timeout: None
            }
        );

        let step = validate_step(
            &json!({"action": "screenshot_element", "selector": "a", "name": "n", "padding": -5}),
            0,
        )
        .unwrap();
        assert_eq!(
            step,
            TestStep::ScreenshotElement {
                selector: "a".to_string(),
                name: "n".to_string(),
                padding: Some(-5.0)
            }
        );
    }

    #[test]
    fn test_parse_rejects_bad_json() {
        let err = parse_test_definition("{not json").unwrap_err();
        assert!(err.message().starts_with("Invalid JSON"));
    }
}
