//
// tree/mod.rs
//
// Test node tree: identity, reconciliation and run state
//

pub mod key;
pub mod merge;
pub mod node;
mod run;

pub use key::*;
pub use merge::*;
pub use node::*;
