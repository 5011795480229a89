/// Docker-based execution engine
///
/// **Docker Execution Rules:**
/// 1. Pulls the language image if it is not present
/// 2. Every compile and every run gets a fresh container:
///    - workspace bind-mounted at /workspace (working directory)
///    - network disabled
///    - CPU/memory limits enforced
///    - runs as the calling user so the host can delete what it writes
/// 3. Test input travels base64-encoded in TEST_INPUT and is piped into the
///    program's stdin by a `sh -c` wrapper
/// 4. Output is capped at the configured limit
/// 5. On deadline the container is killed and `timed_out` is reported
/// 6. The container is removed on every path

use crate::compiler;
use crate::engine::{Artifact, CompileOutcome, ExecutionEngine, ExecutionLimits};
use crate::error::{JudgeError, Result};
use crate::runner::{CappedBuffer, UNKNOWN_EXIT_CODE};
use crate::toolchain::toolchain;
use crate::workspace::Workspace;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use bollard::container::{
    Config as ContainerConfig, CreateContainerOptions, KillContainerOptions, LogOutput,
    LogsOptions, RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::HostConfig;
use bollard::Docker;
use codejudge_common::{Config, Language, RunResult};
use futures_util::stream::StreamExt;
use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};

const CONTAINER_WORKDIR: &str = "/workspace";
const INPUT_ENV: &str = "TEST_INPUT";

pub struct DockerEngine {
    docker: Docker,
    limits: ExecutionLimits,
    memory_limit_bytes: i64,
    nano_cpus: i64,
    images: HashMap<Language, String>,
}

/// What one container should do
struct ContainerJob<'a> {
    image: &'a str,
    host_dir: &'a Path,
    script: String,
    input: Option<&'a str>,
    deadline: Duration,
}

impl DockerEngine {
    pub fn from_config(config: &Config) -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()?;

        let images = Language::all_variants()
            .iter()
            .map(|lang| (*lang, image_for(*lang, |key| std::env::var(key).ok())))
            .collect();

        Ok(Self {
            docker,
            limits: ExecutionLimits::from_config(config),
            memory_limit_bytes: (config.docker_memory_limit_mb as i64) * 1024 * 1024,
            nano_cpus: (config.docker_cpu_limit * 1_000_000_000.0) as i64,
            images,
        })
    }

    fn image(&self, language: Language) -> &str {
        self.images
            .get(&language)
            .map(String::as_str)
            .unwrap_or_else(|| toolchain(language).image)
    }

    /// Ensure Docker image is available (pull if needed)
    async fn ensure_image(&self, image: &str) -> Result<()> {
        if self.docker.inspect_image(image).await.is_ok() {
            return Ok(());
        }

        tracing::info!(image, "Pulling image");
        let options = Some(CreateImageOptions {
            from_image: image,
            ..Default::default()
        });

        let mut stream = self.docker.create_image(options, None, None);
        while let Some(progress) = stream.next().await {
            progress?;
        }
        Ok(())
    }

    fn container_config(&self, job: &ContainerJob<'_>) -> ContainerConfig<String> {
        let mut env = vec!["HOME=/tmp".to_string()];
        if let Some(input) = job.input {
            env.push(format!("{}={}", INPUT_ENV, encode_input(input)));
        }

        ContainerConfig {
            image: Some(job.image.to_string()),
            cmd: Some(vec!["sh".to_string(), "-c".to_string(), job.script.clone()]),
            env: Some(env),
            working_dir: Some(CONTAINER_WORKDIR.to_string()),
            user: host_user(),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            network_disabled: Some(true),
            host_config: Some(HostConfig {
                binds: Some(vec![format!("{}:{}", job.host_dir.display(), CONTAINER_WORKDIR)]),
                memory: Some(self.memory_limit_bytes),
                nano_cpus: Some(self.nano_cpus),
                network_mode: Some("none".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Create, run and always remove one container
    async fn run_container(&self, job: ContainerJob<'_>) -> Result<RunResult> {
        self.ensure_image(job.image).await?;

        let name = format!("codejudge-{}", uuid::Uuid::new_v4());
        let container = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: name.as_str(),
                    platform: None,
                }),
                self.container_config(&job),
            )
            .await?;

        let result = self.drive_container(&container.id, job.deadline).await;

        let remove = self
            .docker
            .remove_container(
                &container.id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await;
        if let Err(e) = remove {
            tracing::error!(container = %container.id, error = %e, "Failed to remove container");
        }

        result
    }

    async fn drive_container(&self, id: &str, deadline: Duration) -> Result<RunResult> {
        let start = Instant::now();
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await?;

        let mut stdout = CappedBuffer::new(self.limits.output_limit);
        let mut stderr = CappedBuffer::new(self.limits.output_limit);

        let collect = async {
            let mut logs = self.docker.logs(
                id,
                Some(LogsOptions::<String> {
                    stdout: true,
                    stderr: true,
                    follow: true,
                    ..Default::default()
                }),
            );
            while let Some(chunk) = logs.next().await {
                match chunk {
                    Ok(LogOutput::StdOut { message }) => stdout.push(&message),
                    Ok(LogOutput::StdErr { message }) => stderr.push(&message),
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        };

        let timed_out = tokio::time::timeout(deadline, collect).await.is_err();
        if timed_out {
            let _ = self
                .docker
                .kill_container(id, None::<KillContainerOptions<String>>)
                .await;
        }

        let exit_code = self.exit_code(id).await?;
        let truncated = stdout.is_truncated() || stderr.is_truncated();

        Ok(RunResult {
            stdout: stdout.into_string(),
            stderr: stderr.into_string(),
            exit_code,
            timed_out,
            truncated,
            execution_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn exit_code(&self, id: &str) -> Result<i32> {
        let mut wait = self.docker.wait_container(
            id,
            Some(WaitContainerOptions {
                condition: "not-running",
            }),
        );

        let waited = tokio::time::timeout(self.limits.kill_grace * 4, wait.next()).await;
        match waited {
            Ok(Some(Ok(response))) => Ok(response.status_code as i32),
            // bollard reports a non-zero exit as an error carrying the code
            Ok(Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. }))) => {
                Ok(code as i32)
            }
            Ok(Some(Err(e))) => Err(JudgeError::Docker(e)),
            Ok(None) | Err(_) => Ok(UNKNOWN_EXIT_CODE),
        }
    }
}

#[async_trait]
impl ExecutionEngine for DockerEngine {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn compile(
        &self,
        workspace: &Workspace,
        language: Language,
        deadline: Duration,
    ) -> Result<CompileOutcome> {
        let result = self
            .run_container(ContainerJob {
                image: self.image(language),
                host_dir: workspace.path(),
                script: toolchain(language).compile.display(),
                input: None,
                deadline,
            })
            .await?;

        Ok(compiler::interpret(workspace.path(), language, result, deadline))
    }

    async fn run(&self, artifact: &Artifact, input: &str, deadline: Duration) -> Result<RunResult> {
        let language = artifact.language();
        self.run_container(ContainerJob {
            image: self.image(language),
            host_dir: artifact.dir(),
            script: stdin_script(&toolchain(language).run.display()),
            input: Some(input),
            deadline,
        })
        .await
    }
}

/// Image for `language`, overridable with JUDGE_DOCKER_IMAGE_<LANG>
fn image_for(language: Language, lookup: impl Fn(&str) -> Option<String>) -> String {
    let key = format!("JUDGE_DOCKER_IMAGE_{}", language.to_string().to_uppercase());
    lookup(&key)
        .filter(|image| !image.trim().is_empty())
        .unwrap_or_else(|| toolchain(language).image.to_string())
}

fn encode_input(input: &str) -> String {
    let mut payload = input.to_string();
    if !payload.ends_with('\n') {
        payload.push('\n');
    }
    general_purpose::STANDARD.encode(payload)
}

fn stdin_script(run: &str) -> String {
    format!("printf '%s' \"${}\" | base64 -d | {}", INPUT_ENV, run)
}

#[cfg(unix)]
fn host_user() -> Option<String> {
    let uid = nix::unistd::getuid();
    let gid = nix::unistd::getgid();
    Some(format!("{}:{}", uid, gid))
}

#[cfg(not(unix))]
fn host_user() -> Option<String> {
    None
}
