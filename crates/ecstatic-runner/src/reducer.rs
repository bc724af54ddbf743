//! Reduction driver that shells out to an external reducer.

use async_trait::async_trait;
use tracing::info;

use ecstatic_core::{ReducerCommand, ReductionDriver, ReductionRequest};

use crate::exec::{execute, Invocation};

/// Spawns the configured reducer once per predicate run.
pub struct CommandReductionDriver {
    command: ReducerCommand,
}

impl CommandReductionDriver {
    pub fn new(command: ReducerCommand) -> Self {
        Self { command }
    }
}

/// Reducer arguments after the command prefix:
/// `(--sources <s>)... --target <t> [--bs <build>] --vs <predicate> --logs <log> <extra>... --timeout <secs>`.
///
/// `--sources` takes one path and is repeated per source file.
pub fn reducer_args(command: &ReducerCommand, request: &ReductionRequest) -> Vec<String> {
    let mut args = Vec::new();
    for source in &request.sources {
        args.push("--sources".to_string());
        args.push(source.to_string_lossy().into_owned());
    }
    args.push("--target".to_string());
    args.push(request.target.to_string_lossy().into_owned());
    if let Some(build_script) = &request.build_script {
        args.push("--bs".to_string());
        args.push(build_script.to_string_lossy().into_owned());
    }
    args.push("--vs".to_string());
    args.push(request.predicate_script.to_string_lossy().into_owned());
    args.push("--logs".to_string());
    args.push(request.log_path.to_string_lossy().into_owned());
    args.extend(command.extra_args.iter().cloned());
    args.push("--timeout".to_string());
    args.push(command.candidate_timeout_secs.to_string());
    args
}

#[async_trait]
impl ReductionDriver for CommandReductionDriver {
    async fn reduce(&self, request: &ReductionRequest) -> anyhow::Result<()> {
        let Some((program, prefix)) = self.command.command.split_first() else {
            anyhow::bail!("reducer command is empty");
        };
        let mut args = prefix.to_vec();
        args.extend(reducer_args(&self.command, request));

        info!(
            program = %program,
            target = %request.target.display(),
            "starting reducer"
        );
        let env = Default::default();
        let output = execute(&Invocation {
            program,
            args: &args,
            env: &env,
            cwd: Some(&request.working_directory),
            timeout_secs: 0,
        })
        .await?;

        if !output.passed() {
            anyhow::bail!(
                "reducer exited with {}: {}",
                output.exit_code,
                output.stderr_tail(5)
            );
        }
        info!(duration_ms = output.duration_ms, "reducer finished");
        Ok(())
    }
}
