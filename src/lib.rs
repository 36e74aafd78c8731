//! webqa - JSON-described browser tests with recorded evidence.
//!
//! This crate provides:
//! - A JSON DSL of twelve browser actions, with validation and a JSON schema
//! - A step interpreter that runs one test against one browser session
//! - Chromium over the DevTools protocol, with the session recorded as a GIF
//! - An in-process mock browser for tests
//! - Per-run recording directories with screenshots and metadata
//!
//! # Example
//!
//! ```rust,no_run
//! use webqa::browser::ChromeLauncher;
//! use webqa::dsl::parse_test_definition;
//! use webqa::interpreter::Interpreter;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let definition = parse_test_definition(
//!     r#"{"test_name": "smoke", "steps": [{"action": "goto", "url": "https://example.com"}]}"#,
//! )?;
//! let interpreter = Interpreter::new(ChromeLauncher::from_config());
//! let result = interpreter.execute_test(&definition).await;
//! println!("{}", serde_json::to_string_pretty(&result)?);
//! # Ok(())
//! # }
//! ```

pub mod browser;
pub mod config;
pub mod dsl;
pub mod interpreter;
pub mod session;

// Re-export DSL types
pub use dsl::{
    StepResult, TestDefinition, TestResult, TestStep, ValidationError, input_schema,
    parse_test_definition, validate_test_definition,
};

// Re-export the interpreter
pub use interpreter::{Interpreter, InterpreterConfig, SessionError, StepError};

// Re-export browser capabilities
pub use browser::{
    Browser, BrowserContext, BrowserError, BrowserLauncher, ChromeLauncher, MockLauncher, Page,
};

// Re-export session management
pub use session::{RecordingSession, list_sessions};
