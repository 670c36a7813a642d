pub mod loaders;
pub mod page;
pub mod question;

pub use loaders::load_pages;
pub use page::{Batch, Page, PageKind};
pub use question::{AnswerLetter, BatchFailure, BatchResult, ExtractionOutcome, QuestionRecord};
