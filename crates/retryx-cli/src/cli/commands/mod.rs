//! CLI command handlers. Each command is in its own file.

mod completions;
mod contend;
mod report;
mod simulate;
mod timeouts;

pub use completions::run_completions;
pub use contend::run_contend;
pub use simulate::{run_simulate, Simulation};
pub use timeouts::run_timeouts;
