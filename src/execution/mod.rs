// Execution module - subprocess driver and exit classification

pub mod driver;
pub mod exit;

pub use driver::{
    DriverConfig, PumpStats, Reporters, RunOutcome, drain_stderr, pump_lines, replay, run,
};
pub use exit::{EXIT_INTERRUPTED, ExitKind, ExitReport, ProcessExit, classify};
