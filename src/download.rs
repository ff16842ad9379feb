//! The download operation, delegated to an external downloader program.
use async_trait::async_trait;
use std::process::{ExitStatus, Stdio};
use thiserror::Error;

use crate::config::DownloadConfig;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited with {status}")]
    Failed { program: String, status: ExitStatus },
}

/// Downloads (or simulates downloading) the media behind a URL.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// With `simulate` set, the downloader resolves the URL without writing files.
    async fn download(&self, url: &str, simulate: bool) -> Result<(), DownloadError>;
}

/// Runs a youtube-dl compatible program once per URL.
///
/// The program's own output is passed through to the terminal.
#[derive(Debug, Clone)]
pub struct CommandDownloader {
    program: String,
    output_template: String,
    extra_args: Vec<String>,
}

impl CommandDownloader {
    pub fn new(config: &DownloadConfig) -> Self {
        Self {
            program: config.program.clone(),
            output_template: config.output_template.clone(),
            extra_args: config.extra_args.clone(),
        }
    }

    fn args(&self, url: &str, simulate: bool) -> Vec<String> {
        let mut args = vec!["-o".to_string(), self.output_template.clone()];
        args.extend(self.extra_args.iter().cloned());
        if simulate {
            args.push("--simulate".to_string());
        }
        // Keeps URLs starting with '-' from being read as options
        args.push("--".to_string());
        args.push(url.to_string());
        args
    }
}

#[async_trait]
impl Downloader for CommandDownloader {
    async fn download(&self, url: &str, simulate: bool) -> Result<(), DownloadError> {
        tracing::debug!(program = %self.program, url = %url, simulate, "Starting download");

        let status = tokio::process::Command::new(&self.program)
            .args(self.args(url, simulate))
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|source| DownloadError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !status.success() {
            return Err(DownloadError::Failed {
                program: self.program.clone(),
                status,
            });
        }

        tracing::info!(url = %url, simulate, "Download finished");
        Ok(())
    }
}
