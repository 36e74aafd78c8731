//! Types for test definitions and test run results.

use serde::{Deserialize, Serialize};

/// One DSL step, tagged by its `action` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TestStep {
    /// Navigate to a URL and wait for DOM content to load
    Goto { url: String },

    /// Click the element matching a CSS selector
    Click { selector: String },

    /// Replace the content of an input with `text`
    Type { selector: String, text: String },

    /// Wait for an element to appear (timeout in milliseconds)
    WaitFor {
        selector: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout: Option<u64>,
    },

    /// Capture the full page to `{name}.png`
    Screenshot { name: String },

    /// Capture one element, optionally with padding in pixels around it
    ScreenshotElement {
        selector: String,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        padding: Option<f64>,
    },

    /// Fail unless the element's text contains `text`
    AssertText { selector: String, text: String },

    /// Fail unless the element is visible right now
    AssertVisible { selector: String },

    Hover { selector: String },

    /// Choose the option with the given value in a `<select>`
    Select { selector: String, value: String },

    /// Press a key on whatever currently has focus
    Press { key: String },

    /// Sleep for `duration` milliseconds
    Wait { duration: u64 },
}

impl TestStep {
    /// The `action` discriminant as it appears in the DSL.
    pub fn action(&self) -> &'static str {
        match self {
            TestStep::Goto { .. } => "goto",
            TestStep::Click { .. } => "click",
            TestStep::Type { .. } => "type",
            TestStep::WaitFor { .. } => "wait_for",
            TestStep::Screenshot { .. } => "screenshot",
            TestStep::ScreenshotElement { .. } => "screenshot_element",
            TestStep::AssertText { .. } => "assert_text",
            TestStep::AssertVisible { .. } => "assert_visible",
            TestStep::Hover { .. } => "hover",
            TestStep::Select { .. } => "select",
            TestStep::Press { .. } => "press",
            TestStep::Wait { .. } => "wait",
        }
    }
}

/// Every action name the DSL accepts, in schema order.
pub const ACTIONS: [&str; 12] = [
    "goto",
    "click",
    "type",
    "wait_for",
    "wait",
    "screenshot",
    "screenshot_element",
    "assert_text",
    "assert_visible",
    "hover",
    "select",
    "press",
];

/// A named, non-empty sequence of steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestDefinition {
    /// Name of the test; also the prefix of the recording directory
    pub test_name: String,

    /// Steps to execute in order
    pub steps: Vec<TestStep>,
}

/// Result of a single attempted step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Zero-based position of the step
    pub step_index: usize,

    /// Action discriminant of the step
    pub action: String,

    pub success: bool,

    /// Failure message if the step failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Wall time spent on this step
    pub duration_ms: u64,
}

/// Result of a complete test run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub test_name: String,

    /// Whether every step succeeded
    pub success: bool,

    /// Steps attempted, including the failing one
    pub steps_executed: usize,

    /// Length of the input step sequence
    pub steps_total: usize,

    /// Per-step results in execution order
    pub step_results: Vec<StepResult>,

    /// Finalized session recording, if one was found
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_path: Option<String>,

    /// Screenshot files produced, in order
    pub screenshots: Vec<String>,

    /// Top-level failure message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub total_duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_step_deserializes_by_action_tag() {
        let step: TestStep = serde_json::from_str(
            r##"{"action": "screenshot_element", "selector": "#box", "name": "box", "padding": -5}"##,
        )
        .unwrap();
        assert_eq!(
            step,
            TestStep::ScreenshotElement {
                selector: "#box".to_string(),
                name: "box".to_string(),
                padding: Some(-5.0),
            }
        );
        assert_eq!(step.action(), "screenshot_element");
    }

    #[test]
    fn test_optional_fields_default_to_none() {
        let step: TestStep =
            serde_json::from_str(r#"{"action": "wait_for", "selector": ".ready"}"#).unwrap();
        assert_eq!(
            step,
            TestStep::WaitFor {
                selector: ".ready".to_string(),
                timeout: None,
            }
        );
    }

    #[test]
    fn test_action_names_cover_every_variant() {
        let steps = vec![
            TestStep::Goto { url: "about:blank".into() },
            TestStep::Click { selector: "a".into() },
            TestStep::Type { selector: "input".into(), text: "x".into() },
            TestStep::WaitFor { selector: "a".into(), timeout: None },
            TestStep::Wait { duration: 1 },
            TestStep::Screenshot { name: "s".into() },
            TestStep::ScreenshotElement { selector: "a".into(), name: "e".into(), padding: None },
            TestStep::AssertText { selector: "a".into(), text: "t".into() },
            TestStep::AssertVisible { selector: "a".into() },
            TestStep::Hover { selector: "a".into() },
            TestStep::Select { selector: "select".into(), value: "v".into() },
            TestStep::Press { key: "Enter".into() },
        ];
        let names: Vec<&str> = steps.iter().map(TestStep::action).collect();
        assert_eq!(names, ACTIONS.to_vec());
    }

    #[test]
    fn test_result_omits_absent_optionals() {
        let result = TestResult {
            test_name: "login".to_string(),
            success: true,
            steps_executed: 1,
            steps_total: 1,
            step_results: vec![StepResult {
                step_index: 0,
                action: "wait".to_string(),
                success: true,
                error: None,
                duration_ms: 3,
            }],
            video_path: None,
            screenshots: vec![],
            error: None,
            total_duration_ms: 5,
        };
        let value = serde_json::to_value(&result).unwrap();
        assert!(value.get("error").is_none());
        assert!(value.get("video_path").is_none());
        assert!(value["step_results"][0].get("error").is_none());
        assert_eq!(value["steps_total"], 1);
    }
}
