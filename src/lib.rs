pub mod aggregator;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod event;
pub mod execution;
pub mod logging;
pub mod report;
pub mod state;

pub use aggregator::{Aggregator, RunSummary};
pub use error::GotallyError;
pub use event::{Action, TestEvent, decode_line};
