//! Integration test crate for the courier dispatch system.
//!
//! This crate exists solely to run scenario tests that span the core,
//! schedule and agent crates. It has no public API - all functionality is
//! in the test modules.

#![forbid(unsafe_code)]
