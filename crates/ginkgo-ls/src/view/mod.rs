//
// view/mod.rs
//
// Client-facing controllers: tree view, clicks, refresh and code lenses
//

pub mod clicks;
pub mod lens;
pub mod refresh;
pub mod tree_view;

pub use clicks::{ClickAction, ClickTarget, ClickTracker};
pub use lens::{affordances, InlineAffordance, RUN_FROM_LENS_COMMAND};
pub use refresh::{debounce, RefreshScheduler, RefreshTicket, RefreshTrigger};
pub use tree_view::*;
