//! JSON schema describing the test definition input.

use serde_json::{Value, json};

use super::types::ACTIONS;

/// Schema for `{test_name, steps}` as accepted by [`super::validate_test_definition`].
pub fn input_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "test_name": {
                "type": "string",
                "description": "Name for this test run (used for video file naming)"
            },
            "steps": {
                "type": "array",
                "description": "Array of test steps in JSON DSL format",
                "items": {
                    "type": "object",
                    "properties": {
                        "action": {
                            "type": "string",
                            "enum": ACTIONS,
                            "description": "The action to perform"
                        },
                        "url": { "type": "string", "description": "URL to navigate to (for goto action)" },
                        "selector": { "type": "string", "description": "CSS selector for the element" },
                        "text": { "type": "string", "description": "Text to type or assert" },
                        "name": { "type": "string", "description": "Name for screenshot file" },
                        "value": { "type": "string", "description": "Value to select (for select action)" },
                        "key": { "type": "string", "description": "Key to press (for press action)" },
                        "timeout": { "type": "number", "description": "Timeout in milliseconds (for wait_for)" },
                        "duration": { "type": "number", "description": "Duration in milliseconds (for wait action)" },
                        "padding": {
                            "type": "number",
                            "description": "Padding in pixels around element (for screenshot_element, default: 10)"
                        }
                    },
                    "required": ["action"]
                }
            }
        },
        "required": ["test_name", "steps"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_lists_every_action() {
        let schema = input_schema();
        let actions = schema["properties"]["steps"]["items"]["properties"]["action"]["enum"]
            .as_array()
            .unwrap();
        assert_eq!(actions.len(), 12);
        assert!(actions.iter().any(|a| a == "screenshot_element"));
        assert_eq!(schema["required"], json!(["test_name", "steps"]));
    }
}
