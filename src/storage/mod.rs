//! Byte-level storage: ordered key/value engines, the order-preserving key
//! codec, and MVCC transactions on top of them.

pub mod disk;
pub mod engine;
pub mod keycode;
pub mod memory;
pub mod mvcc;
