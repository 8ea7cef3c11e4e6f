//! External process execution.
//!
//! Every piece of real work in a benchmark run (slide generation, reference
//! scoring) happens in a separate program. This module provides the seam
//! between the scheduler and those programs:
//!
//! ```text
//! CommandSpec + Deadline → ProcessRunner → ProcessOutput | ProcessError
//! ```
//!
//! [`TokioProcessRunner`] is the production implementation; tests inject
//! their own [`ProcessRunner`] to exercise scheduling without subprocesses.

pub mod deadline;
pub mod process;
pub mod result;

pub use deadline::Deadline;
pub use process::{CommandSpec, ProcessError, ProcessRunner, TokioProcessRunner};
pub use result::ProcessOutput;
