//! Property-based tests

pub mod strategies;
