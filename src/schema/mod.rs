//! The schema tree: column descriptors annotated with maximum repetition
//! and definition levels, plus the dotted-path parser that builds one.

mod parser;
mod tree;

pub use parser::parse_schema;
pub use tree::{Node, NodeId, Schema};
