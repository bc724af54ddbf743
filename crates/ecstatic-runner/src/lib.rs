//! ECSTATIC Runner - external processes behind the core's runner seams
//!
//! Provides:
//! - [`ProcessJobRunner`]: runs the analyzer for one fuzzing job and parses its findings
//! - [`CommandReductionDriver`]: spawns the external delta-debugging reducer
//! - [`execute`]: the shared spawn / timeout / capture primitive

pub mod exec;
pub mod process;
pub mod reducer;

pub use exec::{execute, Invocation, ProcessOutput};
pub use process::{job_digest, ProcessJobRunner};
pub use reducer::{reducer_args, CommandReductionDriver};
