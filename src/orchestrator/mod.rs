pub mod batching;
pub mod extractor;
pub mod progress;

pub use batching::split_into_batches;
pub use extractor::{Extractor, RunStats};
pub use progress::{BatchProgress, ErrorPayload, ProgressEmitter, ProgressEvent};
