//
// outline/mod.rs
//
// Structural outlines of Ginkgo test files
//

pub mod cache;
pub mod provider;
pub mod signature;

pub use cache::*;
pub use provider::*;
pub use signature::*;
