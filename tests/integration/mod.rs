//! Integration tests for the tree mutation and merge engine

mod merges;
mod moves;
mod nested_replaces;
mod store_persistence;
