pub mod schema;
pub mod types;
pub mod validate;

pub use schema::input_schema;
pub use types::{ACTIONS, StepResult, TestDefinition, TestResult, TestStep};
pub use validate::{
    ValidationError, ValidationResult, parse_test_definition, validate_step,
    validate_test_definition,
};
