//! SFTP upload of approved artifacts via libssh2.

use std::io::Write;
use std::net::TcpStream;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use tracing::info;

use crate::channels::channel::{FileTransfer, remote_path};
use crate::config::SftpConfig;
use crate::error::TransferError;

/// Password-authenticated SFTP uploader. Opens one session per upload.
pub struct SftpTransfer {
    config: Arc<SftpConfig>,
}

impl SftpTransfer {
    pub fn new(config: SftpConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

#[async_trait]
impl FileTransfer for SftpTransfer {
    async fn upload(&self, local: &Path, remote_dir: &str) -> Result<String, TransferError> {
        let file_name = local
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| TransferError::LocalRead {
                path: local.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "no file name"),
            })?;
        let target = remote_path(remote_dir, file_name);

        let bytes = tokio::fs::read(local)
            .await
            .map_err(|source| TransferError::LocalRead {
                path: local.to_path_buf(),
                source,
            })?;

        let config = Arc::clone(&self.config);
        let remote = target.clone();
        tokio::task::spawn_blocking(move || upload_blocking(&config, &remote, &bytes))
            .await
            .map_err(|e| TransferError::Ssh(format!("upload task failed: {e}")))??;

        info!(host = %self.config.host, remote = %target, "Artifact uploaded");
        Ok(target)
    }
}

fn upload_blocking(config: &SftpConfig, remote: &str, bytes: &[u8]) -> Result<(), TransferError> {
    let tcp = TcpStream::connect((config.host.as_str(), config.port)).map_err(|e| {
        TransferError::Connect {
            host: config.host.clone(),
            port: config.port,
            reason: e.to_string(),
        }
    })?;

    let mut session = ssh2::Session::new().map_err(ssh_error)?;
    session.set_tcp_stream(tcp);
    session.handshake().map_err(ssh_error)?;
    session
        .userauth_password(&config.username, config.password.expose_secret())
        .map_err(ssh_error)?;

    let sftp = session.sftp().map_err(ssh_error)?;
    let write_error = |reason: String| TransferError::RemoteWrite {
        remote: remote.to_string(),
        reason,
    };
    let mut file = sftp
        .create(Path::new(remote))
        .map_err(|e| write_error(e.to_string()))?;
    file.write_all(bytes).map_err(|e| write_error(e.to_string()))?;
    file.flush().map_err(|e| write_error(e.to_string()))?;

    Ok(())
}

fn ssh_error(e: ssh2::Error) -> TransferError {
    TransferError::Ssh(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn config() -> SftpConfig {
        SftpConfig {
            host: "127.0.0.1".into(),
            port: 1,
            username: "relay".into(),
            password: SecretString::from("secret"),
        }
    }

    #[tokio::test]
    async fn missing_local_file_fails_before_connecting() {
        let transfer = SftpTransfer::new(config());
        let err = transfer
            .upload(Path::new("/nonexistent/dir/nordsvcp_20260314093005.csv"), "/inbound")
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::LocalRead { .. }));
    }

    #[tokio::test]
    async fn unreachable_host_is_connect_error() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("nordsvcp_20260314093005.csv");
        std::fs::write(&local, "SKU,UPC,EAN,QUANTITY_AVAILABLE,STATUS,\n").unwrap();

        let transfer = SftpTransfer::new(config());
        let err = transfer.upload(&local, "/inbound").await.unwrap_err();
        assert!(matches!(err, TransferError::Connect { port: 1, .. }));
    }
}
