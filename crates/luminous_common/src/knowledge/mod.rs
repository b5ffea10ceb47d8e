//! Knowledge Base
//!
//! NixOS facts the assistant answers from: solutions per intent, known
//! problems, best practices, concept explanations and the package search
//! cache. Answers come from stored rows, except configuration snippets
//! which are assembled from the packages asked for.

pub mod schema;
pub mod store;

pub use schema::*;
pub use store::*;
