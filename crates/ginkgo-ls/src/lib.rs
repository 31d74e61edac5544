// lib.rs: the server's modules, shared by the binary, benchmarks and
// integration tests.

pub mod backend;
pub mod config;
pub mod error;
pub mod outline;
pub mod perf;
pub mod pipeline;
pub mod runner;
pub mod state;
pub mod symbols;
pub mod tool;
pub mod tree;
pub mod view;

// Available in test builds and with the `test-support` feature.
#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
