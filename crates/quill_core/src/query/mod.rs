//! Query parsing, matching, mutation, and candidate planning.
//!
//! Raw query mappings are parsed once into an AST ([`ast::Query`]); the
//! matcher and the candidate planner consult the AST, never the raw
//! mapping. Update queries parse into an [`modify::UpdateSpec`].

pub mod ast;
pub mod matcher;
pub mod modify;
pub mod plan;
