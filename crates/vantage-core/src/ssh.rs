//! Remote shell sessions
//!
//! Thin wrapper around ssh2 used for everything that touches a remote
//! host: command execution, archive upload over SCP, and SFTP-based
//! existence checks and directory creation on the staging host.
//!
//! Host keys are not verified; the tool trusts hosts on first use.

use std::io::Read;
use std::net::{IpAddr, SocketAddr, TcpStream};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, ensure};
use ssh2::Session;
use tracing::debug;

const SSH_PORT: u16 = 22;
const SSH_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Authentication method for a remote host
#[derive(Debug, Clone)]
pub enum SshAuth {
    Password(String),
    Key(PathBuf),
}

/// Captured result of a remote command
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_status: i32,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }
}

/// An authenticated SSH session to one host
pub struct SshSession {
    session: Session,
    host: String,
    user: String,
}

impl SshSession {
    /// Connect to `host:22` and authenticate.
    pub fn connect(host: &str, user: &str, auth: &SshAuth) -> anyhow::Result<Self> {
        let ip: IpAddr = host
            .parse()
            .with_context(|| format!("Invalid host address: {}", host))?;
        let tcp = TcpStream::connect_timeout(&SocketAddr::new(ip, SSH_PORT), SSH_CONNECT_TIMEOUT)
            .with_context(|| format!("Failed to connect to {}:{}", host, SSH_PORT))?;

        let mut session = Session::new().context("Failed to create SSH session")?;
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .with_context(|| format!("SSH handshake with {} failed", host))?;

        match auth {
            SshAuth::Password(password) => session
                .userauth_password(user, password)
                .with_context(|| format!("Password auth failed for {}@{}", user, host))?,
            SshAuth::Key(key_path) => session
                .userauth_pubkey_file(user, None, key_path, None)
                .with_context(|| format!("Key auth failed for {}@{}", user, host))?,
        }
        ensure!(
            session.authenticated(),
            "Session to {}@{} not authenticated",
            user,
            host
        );

        debug!(host, user, "SSH session established");

        Ok(Self {
            session,
            host: host.to_string(),
            user: user.to_string(),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// Run a command and capture its output and exit status.
    ///
    /// A non-zero exit status is not an error here; callers decide.
    pub fn exec(&self, command: &str) -> anyhow::Result<ExecOutput> {
        let mut channel = self
            .session
            .channel_session()
            .with_context(|| format!("Failed to open channel to {}", self.host))?;
        channel
            .exec(command)
            .with_context(|| format!("Failed to run on {}: {}", self.host, command))?;

        let mut stdout = String::new();
        channel.read_to_string(&mut stdout)?;
        let mut stderr = String::new();
        channel.stderr().read_to_string(&mut stderr)?;

        channel.wait_close()?;
        let exit_status = channel.exit_status()?;

        debug!(host = %self.host, command, exit_status, "Remote command finished");

        Ok(ExecOutput {
            stdout,
            stderr,
            exit_status,
        })
    }

    /// Upload a local file over SCP.
    pub fn upload(&self, local: &Path, remote: &Path, mode: i32) -> anyhow::Result<()> {
        let size = std::fs::metadata(local)
            .with_context(|| format!("Failed to stat local file: {}", local.display()))?
            .len();
        let file = std::fs::File::open(local)
            .with_context(|| format!("Failed to open local file: {}", local.display()))?;
        self.upload_reader(file, size, remote, mode)
    }

    /// Upload in-memory content over SCP.
    pub fn upload_bytes(&self, content: &[u8], remote: &Path, mode: i32) -> anyhow::Result<()> {
        self.upload_reader(content, content.len() as u64, remote, mode)
    }

    fn upload_reader<R: Read>(
        &self,
        mut reader: R,
        size: u64,
        remote: &Path,
        mode: i32,
    ) -> anyhow::Result<()> {
        let mut remote_file = self
            .session
            .scp_send(remote, mode, size, None)
            .with_context(|| {
                format!("SCP to {}:{} failed to start", self.host, remote.display())
            })?;
        std::io::copy(&mut reader, &mut remote_file)
            .with_context(|| format!("SCP to {}:{} failed", self.host, remote.display()))?;
        remote_file.send_eof()?;
        remote_file.wait_eof()?;
        remote_file.wait_close()?;

        debug!(host = %self.host, remote = %remote.display(), size, "Uploaded file");

        Ok(())
    }

    /// Whether a remote path exists, via SFTP stat.
    pub fn exists(&self, remote: &Path) -> anyhow::Result<bool> {
        let sftp = self
            .session
            .sftp()
            .with_context(|| format!("Failed to open SFTP channel to {}", self.host))?;
        Ok(sftp.stat(remote).is_ok())
    }

    /// Create a remote directory and all missing parents, via SFTP.
    pub fn mkdir_all(&self, remote: &Path) -> anyhow::Result<()> {
        let sftp = self
            .session
            .sftp()
            .with_context(|| format!("Failed to open SFTP channel to {}", self.host))?;

        for dir in ancestor_dirs(remote)? {
            if sftp.stat(&dir).is_err() {
                sftp.mkdir(&dir, 0o755).with_context(|| {
                    format!(
                        "Failed to create remote directory {} on {}",
                        dir.display(),
                        self.host
                    )
                })?;
            }
        }

        Ok(())
    }
}

/// Every directory on the way to `remote`, shallowest first.
///
/// Remote paths are absolute; `..` and other non-normal components are
/// rejected.
fn ancestor_dirs(remote: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    let mut current = PathBuf::from("/");
    for component in remote.components() {
        use std::path::Component;
        match component {
            Component::RootDir => {}
            Component::Normal(part) => {
                current.push(part);
                dirs.push(current.clone());
            }
            other => anyhow::bail!(
                "Unsupported path component {:?} in remote path {}",
                other,
                remote.display()
            ),
        }
    }
    Ok(dirs)
}

impl std::fmt::Debug for SshSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshSession")
            .field("host", &self.host)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ancestor_dirs_lists_each_prefix() {
        let dirs = ancestor_dirs(Path::new("/opt/installation_packages/archives")).unwrap();
        assert_eq!(
            dirs,
            vec![
                PathBuf::from("/opt"),
                PathBuf::from("/opt/installation_packages"),
                PathBuf::from("/opt/installation_packages/archives"),
            ]
        );
    }

    #[test]
    fn ancestor_dirs_of_top_level_path() {
        let dirs = ancestor_dirs(Path::new("/opt")).unwrap();
        assert_eq!(dirs, vec![PathBuf::from("/opt")]);
    }

    #[test]
    fn ancestor_dirs_rejects_parent_components() {
        assert!(ancestor_dirs(Path::new("/opt/../etc")).is_err());
    }
}
