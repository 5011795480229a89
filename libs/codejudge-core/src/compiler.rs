/// Compiler - Turns Submitted Source into a Runnable Artifact
///
/// Runs once per submission against the source file in its workspace.
/// A compile that outlives its deadline is a compile failure, not an
/// internal error.

use crate::engine::{Artifact, CompileOutcome, ExecutionLimits};
use crate::error::Result;
use crate::runner::{run_process, ProcessSpec};
use crate::toolchain::toolchain;
use crate::workspace::Workspace;
use codejudge_common::{Language, RunResult};
use std::path::Path;
use std::time::Duration;

/// Compile with the locally installed toolchain
pub async fn compile_local(
    workspace: &Workspace,
    language: Language,
    deadline: Duration,
    limits: &ExecutionLimits,
) -> Result<CompileOutcome> {
    let tc = toolchain(language);

    let result = run_process(ProcessSpec {
        program: tc.compile.program,
        args: tc.compile.args(),
        cwd: workspace.path(),
        stdin: None,
        deadline,
        output_limit: limits.output_limit,
        kill_grace: limits.kill_grace,
    })
    .await?;

    Ok(interpret(workspace.path(), language, result, deadline))
}

/// Map a finished compiler process onto a compile outcome
pub(crate) fn interpret(
    dir: &Path,
    language: Language,
    result: RunResult,
    deadline: Duration,
) -> CompileOutcome {
    if result.timed_out {
        return CompileOutcome::Failed {
            diagnostics: format!("Compilation timed out after {}ms", deadline.as_millis()),
            timed_out: true,
        };
    }

    if result.exit_code != 0 {
        return CompileOutcome::Failed {
            diagnostics: diagnostics(&result),
            timed_out: false,
        };
    }

    CompileOutcome::Compiled(Artifact::new(dir.to_path_buf(), language))
}

/// Compilers disagree on which stream carries errors; keep both
fn diagnostics(result: &RunResult) -> String {
    let stderr = result.stderr.trim_end();
    let stdout = result.stdout.trim_end();

    let text = match (stderr.is_empty(), stdout.is_empty()) {
        (false, false) => format!("{}\n{}", stderr, stdout),
        (false, true) => stderr.to_string(),
        (true, false) => stdout.to_string(),
        (true, true) => format!("Compiler exited with status {}", result.exit_code),
    };

    if result.truncated {
        format!("{}\n[diagnostics truncated]", text)
    } else {
        text
    }
}
