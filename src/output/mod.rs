//! Result persistence and reporting
//!
//! - `ResultSink` receives every freshly fetched result (`NullSink`, `JsonlSink`)
//! - Markdown reports summarise a finished crawl

mod jsonl;
mod markdown;
mod traits;

pub use jsonl::JsonlSink;
pub use markdown::{format_crawl_report, write_crawl_report};
pub use traits::{NullSink, OutputError, OutputResult, ResultSink};
