#![forbid(unsafe_code)]
//! Shredding and assembly of nested records into and out of Dremel-style
//! columnar `(value, repetition_level, definition_level)` triples.
//!
//! The crate is a pure, synchronous, in-process transform: it does not read
//! or write any physical column format, perform compression, or plan
//! queries. Given a schema (a [`schema::Schema`]) and a stream of records
//! ([`serde_json::Value`]s), [`shred::shred_records`] produces one triple
//! stream per leaf column; given those streams and the same schema,
//! [`assemble::assemble_records`] reconstructs the records.

#[macro_use]
pub mod error;
pub mod assemble;
pub mod fsm;
pub mod schema;
pub mod shred;

pub use error::{Error, Result};
pub use schema::{NodeId, Schema};
