//! Test utilities for the image benchmark harness.
//!
//! This crate provides an in-process stand-in for the image-processing endpoint, generators for
//! input image trees, and logging for tests. See the modules for all available utilities.

pub mod fixtures;
pub mod server;
pub mod tracing;
