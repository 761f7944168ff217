pub mod summarizer;
pub mod tokens;

pub use summarizer::{FailingSummarizer, HttpSummarizer, StaticSummarizer, Summarizer};
pub use tokens::TokenUsage;
