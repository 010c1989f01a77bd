//! Container fleet control
//!
//! Provides:
//! - The `ContainerFleet` capability consumed by waiters and the loader
//! - `DockerFleet`, driving the docker/podman CLI and the compose project

use async_trait::async_trait;
use std::path::Path;
use std::process::{Output, Stdio};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use routecheck_common::config::ComposeConfig;
use routecheck_common::{ContainerHandle, ContainerStatus};

/// List / exec / restart / remove over the test environment's containers.
///
/// Every call re-queries the runtime; no status is cached.
#[async_trait]
pub trait ContainerFleet: Send + Sync {
    /// All containers of the fleet, whatever their status
    async fn list(&self) -> Result<Vec<ContainerHandle>>;

    /// Run a one-shot shell command, returning combined output
    async fn exec(&self, container: &str, command: &str) -> Result<String>;

    /// Extract a tar archive into `target_path` inside the container
    async fn push_archive(&self, container: &str, target_path: &str, archive: Vec<u8>) -> Result<()>;

    async fn restart(&self, container: &str) -> Result<()>;

    async fn stop(&self, container: &str) -> Result<()>;

    async fn remove(&self, container: &str) -> Result<()>;

    /// First container whose name contains `fragment`
    async fn find(&self, fragment: &str) -> Result<Option<ContainerHandle>> {
        Ok(self.list().await?.into_iter().find(|c| c.name.contains(fragment)))
    }
}

/// Container runtime detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerRuntime {
    Docker,
    Podman,
}

impl ContainerRuntime {
    /// Detect available container runtime
    pub async fn detect() -> Option<Self> {
        // Docker first: compose files target it
        for runtime in [Self::Docker, Self::Podman] {
            let probe = Command::new(runtime.command())
                .arg("--version")
                .stdin(Stdio::null())
                .output()
                .await;
            if probe.is_ok() {
                return Some(runtime);
            }
        }
        None
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "docker" => Some(Self::Docker),
            "podman" => Some(Self::Podman),
            _ => None,
        }
    }

    /// Get the CLI command name
    pub fn command(&self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Podman => "podman",
        }
    }
}

/// Fleet of one compose project, driven through the runtime CLI
pub struct DockerFleet {
    runtime: ContainerRuntime,
    compose: ComposeConfig,
}

const PS_FORMAT: &str = "{{.ID}}\t{{.Names}}\t{{.State}}";

impl DockerFleet {
    /// Resolve the runtime, probing the CLIs when the config names none
    pub async fn new(compose: ComposeConfig) -> Result<Self> {
        let runtime = match compose.runtime.as_deref() {
            Some(name) => ContainerRuntime::from_name(name)
                .ok_or_else(|| Error::InvalidConfig(format!("unknown container runtime '{name}'")))?,
            None => ContainerRuntime::detect()
                .await
                .ok_or_else(|| Error::EnvironmentUnavailable("no container runtime available".into()))?,
        };
        Ok(Self { runtime, compose })
    }

    pub fn runtime(&self) -> ContainerRuntime {
        self.runtime
    }

    async fn run(&self, args: &[&str], stdin: Option<Vec<u8>>) -> Result<Output> {
        let cmd = self.runtime.command();
        debug!("{} {}", cmd, args.join(" "));

        let mut command = Command::new(cmd);
        command
            .args(args)
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command
            .spawn()
            .map_err(|e| Error::EnvironmentUnavailable(format!("failed to spawn {cmd}: {e}")))?;

        if let Some(bytes) = stdin {
            if let Some(mut pipe) = child.stdin.take() {
                pipe.write_all(&bytes).await?;
                pipe.shutdown().await?;
            }
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() && daemon_unreachable(&output.stderr) {
            return Err(Error::EnvironmentUnavailable(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(output)
    }

    async fn run_checked(&self, container: &str, args: &[&str], stdin: Option<Vec<u8>>) -> Result<Output> {
        let output = self.run(args, stdin).await?;
        if !output.status.success() {
            return Err(Error::ExecFailed {
                container: container.to_string(),
                command: args.join(" "),
                code: output.status.code(),
                output: combined(&output),
            });
        }
        Ok(output)
    }

    async fn compose(&self, args: &[&str]) -> Result<Output> {
        let mut command = Command::new(self.runtime.command());
        command.arg("compose").arg("-p").arg(&self.compose.project_name);
        for file in &self.compose.files {
            command.arg("-f").arg(file);
        }
        command
            .args(args)
            .current_dir(&self.compose.directory)
            .envs(&self.compose.env)
            .stdin(Stdio::null());

        info!("Run: {} compose {}", self.runtime.command(), args.join(" "));
        let output = command
            .output()
            .await
            .map_err(|e| Error::EnvironmentUnavailable(format!("failed to run compose: {e}")))?;
        if !output.status.success() && daemon_unreachable(&output.stderr) {
            return Err(Error::EnvironmentUnavailable(combined(&output)));
        }
        Ok(output)
    }

    /// Pull images; failure falls back to the images already present
    pub async fn pull(&self) -> Result<()> {
        let output = self.compose(&["pull"]).await?;
        if !output.status.success() {
            warn!(
                "Error occurred when pulling images, proceeding with available images: {}",
                combined(&output)
            );
        }
        Ok(())
    }

    /// Create and start services (all of them when `services` is empty)
    pub async fn up(&self, services: &[&str]) -> Result<()> {
        let mut args = vec!["up", "-d", "--remove-orphans"];
        args.extend_from_slice(services);
        self.compose_checked(&args).await
    }

    /// Stop and remove every container and volume of the project
    pub async fn down(&self) -> Result<()> {
        self.compose_checked(&["down", "-v", "--remove-orphans"]).await
    }

    async fn compose_checked(&self, args: &[&str]) -> Result<()> {
        let output = self.compose(args).await?;
        if !output.status.success() {
            return Err(Error::ExecFailed {
                container: self.compose.project_name.clone(),
                command: format!("compose {}", args.join(" ")),
                code: output.status.code(),
                output: combined(&output),
            });
        }
        Ok(())
    }

    pub fn compose_directory(&self) -> &Path {
        &self.compose.directory
    }
}

#[async_trait]
impl ContainerFleet for DockerFleet {
    async fn list(&self) -> Result<Vec<ContainerHandle>> {
        let output = self.run_checked("*", &["ps", "-a", "--format", PS_FORMAT], None).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout
            .lines()
            .filter_map(parse_ps_line)
            .filter(|c| c.name.contains(&self.compose.project_name))
            .collect())
    }

    async fn exec(&self, container: &str, command: &str) -> Result<String> {
        let output = self
            .run_checked(container, &["exec", container, "sh", "-c", command], None)
            .await?;
        Ok(combined(&output))
    }

    async fn push_archive(&self, container: &str, target_path: &str, archive: Vec<u8>) -> Result<()> {
        let dest = format!("{container}:{target_path}");
        self.run_checked(container, &["cp", "-", dest.as_str()], Some(archive)).await?;
        Ok(())
    }

    async fn restart(&self, container: &str) -> Result<()> {
        self.run_checked(container, &["restart", container], None).await?;
        Ok(())
    }

    async fn stop(&self, container: &str) -> Result<()> {
        self.run_checked(container, &["stop", container], None).await?;
        Ok(())
    }

    async fn remove(&self, container: &str) -> Result<()> {
        self.run_checked(container, &["rm", "-f", container], None).await?;
        Ok(())
    }
}

/// Parse one `ID\tNames\tState` line of `ps`
fn parse_ps_line(line: &str) -> Option<ContainerHandle> {
    let mut parts = line.trim().splitn(3, '\t');
    let id = parts.next()?.trim();
    let name = parts.next()?.trim();
    let state = parts.next().unwrap_or("").trim();
    if id.is_empty() || name.is_empty() {
        return None;
    }
    Some(ContainerHandle {
        id: id.to_string(),
        name: name.trim_start_matches('/').to_string(),
        status: ContainerStatus::parse(state),
    })
}

fn daemon_unreachable(stderr: &[u8]) -> bool {
    let text = String::from_utf8_lossy(stderr);
    text.contains("Cannot connect to the Docker daemon")
        || text.contains("Is the docker daemon running")
        || text.contains("unable to connect to Podman")
}

fn combined(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).to_string();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ps_line() {
        let c = parse_ps_line("3f2a\trouting-tyr_worker-1\trunning").unwrap();
        assert_eq!(c.id, "3f2a");
        assert_eq!(c.name, "routing-tyr_worker-1");
        assert_eq!(c.status, ContainerStatus::Running);

        let c = parse_ps_line("9b1c\t/kraken-fr-idf\texited\n").unwrap();
        assert_eq!(c.name, "kraken-fr-idf");
        assert_eq!(c.status, ContainerStatus::Exited);

        assert!(parse_ps_line("").is_none());
        assert!(parse_ps_line("onlyid").is_none());
    }

    #[test]
    fn test_daemon_unreachable() {
        assert!(daemon_unreachable(
            b"Cannot connect to the Docker daemon at unix:///var/run/docker.sock."
        ));
        assert!(!daemon_unreachable(b"Error: No such container: foo"));
    }

    #[test]
    fn test_runtime_from_name() {
        assert_eq!(ContainerRuntime::from_name("podman"), Some(ContainerRuntime::Podman));
        assert_eq!(ContainerRuntime::from_name("lxc"), None);
        assert_eq!(ContainerRuntime::Docker.command(), "docker");
    }

    #[tokio::test]
    async fn test_configured_runtime_skips_detection() {
        let compose = ComposeConfig {
            runtime: Some("podman".to_string()),
            ..ComposeConfig::default()
        };
        let fleet = DockerFleet::new(compose).await.unwrap();
        assert_eq!(fleet.runtime(), ContainerRuntime::Podman);

        let compose = ComposeConfig {
            runtime: Some("lxc".to_string()),
            ..ComposeConfig::default()
        };
        assert!(matches!(DockerFleet::new(compose).await, Err(Error::InvalidConfig(_))));
    }
}
