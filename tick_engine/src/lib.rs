pub mod config;
mod counters;
pub mod engine;
mod error;
pub mod error_fn;
pub mod fixed;
pub mod history;
pub mod pipeline;
pub mod queue;
mod runtime;
pub mod scoreboard;
pub mod stop;
mod watchdog;

pub use config::{CoreConfig, EngineConfig};
pub use counters::Counters;
pub use engine::{Engine, State};
pub use error::{EngineErr, ExitCode, Result};
pub use runtime::run_core;
pub use watchdog::{Progress, Watchdog};
