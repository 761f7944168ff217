//! Issue-tree analytics for agile portfolios.
//!
//! The pipeline builds a typed traversal over an issue hierarchy, aggregates
//! every issue's change history into one time-sorted stream and runs a set of
//! analyzers over it: status lifecycle, backlog cumulative flow, date drift
//! ("time creep") and scope breakdown. Results merge into one summary
//! document per root issue.

pub mod analysis;
pub mod core;
pub mod fetch;
pub mod llm;
pub mod report;
pub mod store;
pub mod tree;
pub mod utils;

/// Cached records younger than this many days are not re-fetched.
pub const DEFAULT_CHECK_DAYS: i64 = 14;
/// Capacity of the per-run in-memory issue memo.
pub const DEFAULT_MEMO_SIZE: usize = 512;
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_LLM_MODEL: &str = "o3-mini";

pub use crate::core::config::EpiscopeConfig;
pub use crate::core::error::{EpiscopeError, Result};
pub use crate::core::graph::IssueGraph;
pub use crate::core::models::{Issue, IssueType, RelationMap, RelationType};
pub use crate::fetch::{CachingFetcher, IssueFetcher, StoreFetcher};
pub use crate::store::IssueStore;
pub use crate::tree::provider::ProjectData;
pub use crate::tree::{BuiltTree, TraversalOrder, TreeBuilder};
