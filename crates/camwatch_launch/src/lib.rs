//! camwatch launcher
//!
//! Starts one `camwatch_node` process per camera in a cameras file and
//! supervises them:
//! - worker output is forwarded as `[<camera>] <line>` (stderr as
//!   `[<camera> ERROR] <line>`)
//! - each exit is reported once and the worker is not restarted
//! - Ctrl+C sends SIGTERM to every live worker
//!
//! Each worker receives its full configuration as a JSON `--worker-config`
//! argument.

pub mod cli;
pub mod plan;
pub mod runtime;

pub use cli::LaunchArgs;
pub use plan::{LaunchPlan, PlanError, WorkerLaunch};
pub use runtime::{
    ManagedProcess, Outcome, PollReport, ProcessConfig, ProcessError, ProcessEvent,
    ProcessStatus, Supervisor, SupervisorConfig, SupervisorError,
};
