//! hospital-db - a hospital scheduling store
//!
//! This crate provides:
//! - Pluggable key/value storage engines with MVCC transactions
//! - A small relational layer with typed, parameter-bound statements
//! - The hospital domain: administration, the booking coordinator,
//!   appointment expiry and reports

pub mod config;
pub mod error;
pub mod hospital;
pub mod sql;
pub mod storage;
