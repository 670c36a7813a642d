pub mod llm_client;
pub mod request;

pub use llm_client::{ModelClient, OpenAiClient};
pub use request::{ImageAttachment, ModelRequest, RequestPart};
