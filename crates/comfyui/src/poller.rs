//! Completion polling state machine.
//!
//! After submission the backend exposes job state only through its
//! history endpoint, so [`await_completion`] queries it on a fixed
//! interval until the job reaches a terminal state, the wall-clock
//! timeout elapses, or the caller cancels. One loop runs per inbound
//! request; loops for different jobs share nothing but the HTTP client.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::api::{ComfyUIApi, HistoryError};
use crate::history::{job_status, ArtifactRef, JobStatus, OutputError};
use crate::workflow::SlotBindings;

/// Tunable parameters for the polling loop.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay between consecutive history queries.
    pub interval: Duration,
    /// Wall-clock budget for the whole job.
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(120),
        }
    }
}

/// Terminal poll outcomes other than success.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    /// The wall-clock budget elapsed before the job finished. The job
    /// may still complete on the backend; its result is discarded.
    #[error("Generation timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },

    /// A single status query failed. Not retried: a flaky status
    /// endpoint mid-generation is indistinguishable from an outage.
    #[error("Status query failed: {0}")]
    Transport(String),

    /// The job finished but the bound output node produced nothing.
    #[error("Job finished without output from node {node_id}")]
    MissingOutput { node_id: String },

    /// The history payload or the output payload was unusable.
    #[error("Malformed status payload: {0}")]
    MalformedStatus(String),

    /// The backend recorded an execution error for the job.
    #[error("Generation failed: {reason}")]
    Failed { reason: String },

    /// The caller cancelled while the job was still in flight.
    #[error("Polling cancelled")]
    Cancelled,
}

/// Poll until the job produces its artifact or terminates otherwise.
///
/// The timeout is checked before every query, so a zero timeout never
/// issues one. A prompt id the backend has not registered yet counts
/// as pending rather than an error -- history can lag the submission.
/// A stored artifact is returned as a reference without fetching the
/// bytes; the follow-up `/view` fetch is the caller's step.
///
/// Cancellation is observed at both suspension points (the query and
/// the inter-poll sleep), so shutdown interrupts a pending sleep
/// instead of letting it run out.
pub async fn await_completion(
    api: &ComfyUIApi,
    prompt_id: &str,
    bindings: &SlotBindings,
    config: &PollConfig,
    cancel: &CancellationToken,
) -> Result<ArtifactRef, PollError> {
    let started = Instant::now();
    let mut polls: u32 = 0;

    loop {
        let elapsed = started.elapsed();
        if elapsed >= config.timeout {
            tracing::warn!(prompt_id = %prompt_id, ?elapsed, polls, "Generation timed out");
            return Err(PollError::Timeout { elapsed });
        }
        if cancel.is_cancelled() {
            return Err(PollError::Cancelled);
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(PollError::Cancelled),
            result = api.get_history(prompt_id) => result,
        };
        polls += 1;

        let history = match result {
            Ok(history) => history,
            Err(HistoryError::Malformed(e)) => {
                return Err(PollError::MalformedStatus(e.to_string()));
            }
            Err(e) => {
                tracing::warn!(prompt_id = %prompt_id, error = %e, "Status query failed");
                return Err(PollError::Transport(e.to_string()));
            }
        };

        match job_status(&history, prompt_id, bindings) {
            Ok(JobStatus::Succeeded(artifact)) => {
                tracing::info!(prompt_id = %prompt_id, ?elapsed, polls, "Generation completed");
                return Ok(artifact);
            }
            Ok(JobStatus::Failed(reason)) => {
                tracing::error!(prompt_id = %prompt_id, %reason, "Generation failed");
                return Err(PollError::Failed { reason });
            }
            Ok(JobStatus::Pending | JobStatus::Running) => {
                tracing::debug!(prompt_id = %prompt_id, polls, "Job still in flight");
            }
            Err(OutputError::MissingOutput { node_id }) => {
                return Err(PollError::MissingOutput { node_id });
            }
            Err(e @ OutputError::MalformedOutput { .. }) => {
                return Err(PollError::MalformedStatus(e.to_string()));
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(PollError::Cancelled),
            _ = tokio::time::sleep(config.interval) => {}
        }
    }
}
