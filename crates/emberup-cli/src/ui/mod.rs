//! Console output.

pub mod actor;
pub mod reporter;

pub use actor::{UiActor, UiEvent};
pub use reporter::ConsoleReporter;
