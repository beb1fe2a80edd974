//! External transcoding step
//!
//! Clips are cut with ffmpeg using stream copy, so only the container is
//! rewritten. The [`Transcoder`] trait lets tests count invocations without
//! a real binary.

use crate::conversation::LimitMode;
use crate::limit::LimitPolicy;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from the transcoding step
#[derive(Error, Debug)]
pub enum TranscodeError {
    /// The executable could not be started
    #[error("ffmpeg is not configured ({program}): {source}")]
    ToolMissing {
        /// Configured program
        program: String,
        /// Spawn error
        source: std::io::Error,
    },
    /// The executable ran and failed
    #[error("ffmpeg failed ({status}): {stderr}")]
    Failed {
        /// Exit status description
        status: String,
        /// Diagnostic output, truncated
        stderr: String,
    },
}

/// Everything needed to cut one clip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeJob {
    /// Source stream URL
    pub input_url: String,
    /// File to write
    pub output: PathBuf,
    /// Start offset in seconds
    pub start_offset: u64,
    /// Duration or size cap
    pub limit: LimitPolicy,
    /// Request headers the media origin requires
    pub headers: Vec<(String, String)>,
}

/// Runs a [`TranscodeJob`]
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Produce `job.output` or fail
    async fn transcode(&self, job: &TranscodeJob) -> Result<(), TranscodeError>;
}

/// [`Transcoder`] backed by the ffmpeg executable
pub struct FfmpegTranscoder {
    program: String,
}

impl FfmpegTranscoder {
    /// Use `program` (a name on `PATH` or an absolute path)
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Command-line arguments for a job
    #[must_use]
    pub fn build_args(job: &TranscodeJob) -> Vec<String> {
        let mut args: Vec<String> = ["-y", "-nostdin", "-loglevel", "error"]
            .into_iter()
            .map(String::from)
            .collect();

        args.push("-ss".into());
        args.push(job.start_offset.to_string());
        if job.limit.mode == LimitMode::Time {
            args.push("-t".into());
            args.push(job.limit.value.to_string());
        }
        if !job.headers.is_empty() {
            let headers: String = job
                .headers
                .iter()
                .map(|(name, value)| format!("{name}: {value}\r\n"))
                .collect();
            args.push("-headers".into());
            args.push(headers);
        }
        args.push("-i".into());
        args.push(job.input_url.clone());
        args.push("-c".into());
        args.push("copy".into());
        if let Some(bytes) = job.limit.size_bytes() {
            args.push("-fs".into());
            args.push(bytes.to_string());
        }
        args.push(job.output.to_string_lossy().into_owned());
        args
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(&self, job: &TranscodeJob) -> Result<(), TranscodeError> {
        debug!(output = %job.output.display(), limit = ?job.limit, "Starting ffmpeg");

        let output = tokio::process::Command::new(&self.program)
            .args(Self::build_args(job))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| TranscodeError::ToolMissing {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(status = %output.status, "ffmpeg failed");
            return Err(TranscodeError::Failed {
                status: output.status.to_string(),
                stderr: crate::utils::truncate_str(stderr.trim(), 500),
            });
        }
        Ok(())
    }
}
