//! Rule-table classifiers
//!
//! Both classifiers are built once from configuration and are pure afterwards: the same input
//! always yields the same plan, and classification never fails. Every check on the rule tables
//! (pattern syntax, identifier allow-list, placeholder groups, query shape) happens at
//! construction.

mod content;
mod query;
mod template;

pub use content::ContentClassifier;
pub use query::QueryClassifier;
