//! Domain model: signals, accounts, and execution results.

mod account;
mod signal;

pub use account::Account;
pub use signal::{ExecutionResult, Signal, SignalKind, SignalRecord, SignalStatus};
