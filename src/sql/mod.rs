//! Relational layer
//!
//! This module provides:
//! - `types`: column data types and values
//! - `schema`: table and column definitions
//! - `statement`: typed prepared statements
//! - `executor`: statement binding and execution
//! - `engine`: the engine and transaction traits, and the KV-backed engine

pub mod engine;
pub mod executor;
pub mod schema;
pub mod statement;
pub mod types;
