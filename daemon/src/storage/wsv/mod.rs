//! Typed world-state-view operations over the KV port.
//!
//! `command` holds the mutations, `query` the dual reads. Both work on
//! canonical text paths built by `paths`, so every record is addressable by
//! a prefix scan and the cache layer can reason about path families.

pub mod command;
pub mod paths;
pub mod query;
