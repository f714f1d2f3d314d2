//! Sandbox executor adapters.

pub mod process;

pub use process::{parse_test_output, ProcessSandbox, TestCounts};
