pub mod model_invoker;
pub mod prompt_builder;
pub mod record_validator;
pub mod response_parser;

pub use model_invoker::{default_is_retryable, InvokeError, ModelInvoker, RetryPolicy};
pub use prompt_builder::PromptBuilder;
pub use record_validator::{validate_record, validate_records};
pub use response_parser::{extract_json_candidate, parse_model_output, repair_json};
