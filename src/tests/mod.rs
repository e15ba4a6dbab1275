//! # End-to-End Test Suite
//!
//! Runs the whole pipeline (configuration, tile index, assignment, scheduling
//! and JSON encoding) against small fixtures written to temporary directories.

mod pipeline_tests;
