pub mod command;
pub mod document;

pub use command::{WriteOutcome, WriteResult};
pub use document::Document;
