// Module declarations
pub mod join;
pub mod output;
pub mod parse;
pub mod plot;
pub mod process;
pub mod stats;
pub mod variants;

pub use crate::process::{run, run_with_writer, AnalysisError, Args, RunSummary};

#[cfg(test)]
mod tests;
