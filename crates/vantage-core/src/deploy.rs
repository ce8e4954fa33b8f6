//! Deployment execution
//!
//! Stages installation archives on the file-transfer source server,
//! then walks the install plans host by host over SSH. Hosts are
//! deployed sequentially; a failed step stops the remaining steps on
//! that host and the run continues with the next one.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use tracing::{error, info, warn};

use crate::config::DeployConfig;
use crate::inventory::{Inventory, Target};
use crate::packages::PackageSet;
use crate::plan::{InstallPlan, Step};
use crate::report::{DeployReport, HostReport, StagedArchive, StepOutcome, StepReport};
use crate::ssh::SshSession;

/// Executes a deployment against the configured fleet
#[derive(Debug)]
pub struct Deployer {
    config: DeployConfig,
    inventory: Inventory,
    packages: PackageSet,
    plans: Vec<InstallPlan>,
    overwrite: bool,
}

impl Deployer {
    pub fn new(
        config: DeployConfig,
        inventory: Inventory,
        packages: PackageSet,
        plans: Vec<InstallPlan>,
        overwrite: bool,
    ) -> Self {
        Self {
            config,
            inventory,
            packages,
            plans,
            overwrite,
        }
    }

    /// Stage archives, then run every plan on its hosts.
    pub fn run(&self) -> anyhow::Result<DeployReport> {
        let started_at = Utc::now();

        let staged = self.stage_archives()?;

        let mut hosts = Vec::new();
        for plan in &self.plans {
            for target in self.inventory.for_service(plan.service) {
                info!(host = %target.entry.ip, service = %plan.service, "Deploying service");
                let report = self.deploy_host(target, plan);
                if report.failed() {
                    error!(host = %report.ip, service = %report.service,
                        "Deployment failed on host, continuing with remaining hosts");
                }
                hosts.push(report);
            }
        }

        Ok(DeployReport {
            started_at,
            finished_at: Utc::now(),
            staged,
            hosts,
        })
    }

    /// Upload each archive to the source server's remote path as
    /// `<service>.tar.gz`, skipping archives already present unless
    /// overwrite is set.
    fn stage_archives(&self) -> anyhow::Result<Vec<StagedArchive>> {
        let source = &self.config.file_transfer.source_server;
        let auth = source.auth().with_context(|| {
            format!("No credentials for source server {}", source.ip)
        })?;
        let session = SshSession::connect(&source.ip, &source.ssh_user, &auth)
            .with_context(|| format!("Failed to reach source server {}", source.ip))?;

        let remote_dir = Path::new(&self.config.file_transfer.remote_path);
        if !session.exists(remote_dir)? {
            info!(path = %remote_dir.display(), "Creating remote staging directory");
            session.mkdir_all(remote_dir)?;
        }

        let mut staged = Vec::new();
        for package in self.packages.packages() {
            let remote_path = remote_dir.join(package.service.archive_file());
            let present = session.exists(&remote_path)?;
            if present && !self.overwrite {
                info!(service = %package.service, path = %remote_path.display(),
                    "Archive already staged, skipping upload");
                staged.push(StagedArchive {
                    service: package.service,
                    remote_path,
                    uploaded: false,
                });
                continue;
            }

            info!(service = %package.service, path = %remote_path.display(), "Staging archive");
            session
                .upload(&package.local_path, &remote_path, 0o644)
                .with_context(|| format!("Failed to stage {} archive", package.service))?;
            staged.push(StagedArchive {
                service: package.service,
                remote_path,
                uploaded: true,
            });
        }

        Ok(staged)
    }

    /// Execute one plan on one host.
    ///
    /// Connection and step failures are recorded in the report rather
    /// than propagated; the first failure stops the host.
    fn deploy_host(&self, target: &Target, plan: &InstallPlan) -> HostReport {
        let mut steps = Vec::new();

        let Some(auth) = target.entry.auth() else {
            steps.push(StepReport {
                description: "connect".to_string(),
                outcome: StepOutcome::Failed {
                    message: format!("no credentials for {}", target.entry.ip),
                },
            });
            return HostReport {
                ip: target.entry.ip.clone(),
                service: plan.service,
                steps,
            };
        };

        let session = match SshSession::connect(&target.entry.ip, &target.entry.ssh_user, &auth) {
            Ok(session) => session,
            Err(err) => {
                steps.push(StepReport {
                    description: "connect".to_string(),
                    outcome: StepOutcome::Failed {
                        message: format!("{err:#}"),
                    },
                });
                return HostReport {
                    ip: target.entry.ip.clone(),
                    service: plan.service,
                    steps,
                };
            }
        };

        let use_sudo = target.entry.ssh_user != "root";

        for step in &plan.steps {
            let outcome = self.run_step(&session, step, use_sudo);
            let failed = matches!(outcome, StepOutcome::Failed { .. });
            steps.push(StepReport {
                description: step.to_string(),
                outcome,
            });
            if failed {
                break;
            }
        }

        HostReport {
            ip: target.entry.ip.clone(),
            service: plan.service,
            steps,
        }
    }

    fn run_step(&self, session: &SshSession, step: &Step, use_sudo: bool) -> StepOutcome {
        match self.try_step(session, step, use_sudo) {
            Ok(outcome) => outcome,
            Err(err) => StepOutcome::Failed {
                message: format!("{err:#}"),
            },
        }
    }

    fn try_step(
        &self,
        session: &SshSession,
        step: &Step,
        use_sudo: bool,
    ) -> anyhow::Result<StepOutcome> {
        match step {
            Step::ProbeInstall {
                binary,
                archive,
                remote_archive,
                extract_to,
            } => {
                let probe = session.exec(&format!("which {binary}"))?;
                if probe.success() {
                    info!(host = %session.host(), binary, "Already installed, skipping extract");
                    return Ok(StepOutcome::Skipped);
                }
                session.upload(archive, remote_archive, 0o644)?;
                run_root(
                    session,
                    &format!(
                        "tar -xzf {} -C {}/",
                        quoted(remote_archive),
                        quoted(extract_to)
                    ),
                    use_sudo,
                )?;
                Ok(StepOutcome::Changed)
            }
            Step::Symlink { target, link } => {
                run_root(
                    session,
                    &format!("ln -sfn {} {}", quoted(target), quoted(link)),
                    use_sudo,
                )?;
                Ok(StepOutcome::Changed)
            }
            Step::EnsureDir { path, mode } => {
                run_root(
                    session,
                    &format!("mkdir -p {path} && chmod {mode:o} {path}", path = quoted(path)),
                    use_sudo,
                )?;
                Ok(StepOutcome::Changed)
            }
            Step::Upload {
                local,
                remote,
                mode,
            } => {
                let holding = holding_path(remote)?;
                session.upload(local, &holding, 0o644)?;
                move_into_place(session, &holding, remote, *mode, use_sudo)?;
                Ok(StepOutcome::Changed)
            }
            Step::WriteRemote {
                remote,
                content,
                mode,
            } => {
                let holding = holding_path(remote)?;
                session.upload_bytes(content.as_bytes(), &holding, 0o644)?;
                move_into_place(session, &holding, remote, *mode, use_sudo)?;
                Ok(StepOutcome::Changed)
            }
            Step::EnableUnit { unit } => {
                run_root(
                    session,
                    &format!(
                        "systemctl daemon-reload && systemctl enable {unit} && systemctl restart {unit}"
                    ),
                    use_sudo,
                )?;
                Ok(StepOutcome::Changed)
            }
        }
    }
}

/// Wrap a command for root execution.
///
/// Non-root users get non-interactive sudo; a password prompt means a
/// misconfigured host and fails the step instead of hanging.
fn root_command(command: &str, use_sudo: bool) -> String {
    if use_sudo {
        format!("sudo -n sh -c {}", shell_quote(command))
    } else {
        command.to_string()
    }
}

/// Single-quote a value for the remote shell, escaping embedded quotes.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn quoted(path: &Path) -> String {
    shell_quote(&path.to_string_lossy())
}

fn run_root(session: &SshSession, command: &str, use_sudo: bool) -> anyhow::Result<()> {
    let wrapped = root_command(command, use_sudo);
    let output = session.exec(&wrapped)?;
    if !output.success() {
        let stderr = output.stderr.trim();
        if !output.stdout.trim().is_empty() {
            warn!(host = %session.host(), stdout = %output.stdout.trim(), "Command output");
        }
        anyhow::bail!(
            "`{}` exited with status {}: {}",
            command,
            output.exit_status,
            stderr
        );
    }
    Ok(())
}

/// SCP cannot write into root-owned directories as an unprivileged
/// user, so uploads land in /tmp and are moved into place as root.
fn holding_path(remote: &Path) -> anyhow::Result<PathBuf> {
    let file_name = remote
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow::anyhow!("Remote path has no file name: {}", remote.display()))?;
    Ok(PathBuf::from(format!("/tmp/.vantage-{file_name}")))
}

fn move_into_place(
    session: &SshSession,
    holding: &Path,
    remote: &Path,
    mode: u32,
    use_sudo: bool,
) -> anyhow::Result<()> {
    run_root(
        session,
        &format!(
            "mv {holding} {remote} && chmod {mode:o} {remote}",
            holding = quoted(holding),
            remote = quoted(remote),
        ),
        use_sudo,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_user_runs_commands_bare() {
        assert_eq!(root_command("systemctl daemon-reload", false), "systemctl daemon-reload");
    }

    #[test]
    fn non_root_user_gets_non_interactive_sudo() {
        assert_eq!(
            root_command("mkdir -p /usr/local/prometheus", true),
            "sudo -n sh -c 'mkdir -p /usr/local/prometheus'"
        );
    }

    #[test]
    fn shell_quote_escapes_embedded_quotes() {
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(
            quoted(Path::new("/usr/local/archive dir")),
            "'/usr/local/archive dir'"
        );
    }

    #[test]
    fn sudo_wrapping_survives_quoted_paths() {
        let command = format!(
            "ln -sfn {} {}",
            quoted(Path::new("/usr/local/o'brien-1.0")),
            quoted(Path::new("/usr/local/obrien"))
        );
        let wrapped = root_command(&command, true);
        assert!(wrapped.starts_with("sudo -n sh -c '"));
        // The embedded quote is escaped rather than terminating the
        // sh -c argument early.
        assert!(wrapped.contains(r"'\''"));
        assert!(wrapped.ends_with('\''));
    }

    #[test]
    fn holding_path_uses_remote_file_name() {
        let holding = holding_path(Path::new("/etc/systemd/system/grafana.service")).unwrap();
        assert_eq!(holding, PathBuf::from("/tmp/.vantage-grafana.service"));
    }

    #[test]
    fn holding_path_rejects_bare_root() {
        assert!(holding_path(Path::new("/")).is_err());
    }
}
