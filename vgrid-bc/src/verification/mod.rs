//! Transcode result verification
//!
//! Wraps an external verifier in a bounded retry loop. Retryable attempts
//! are snapshotted with their score; once the attempt budget is spent,
//! every further failure also reports the best-scoring snapshot so the
//! caller can choose to accept it. A fatal error aborts the chain
//! immediately, and a pixel-count failure is checked before anything else
//! and is never eligible to become the best attempt.
//!
//! One [`SegmentVerifier`] instance tracks one manifest's attempt chain;
//! the dispatcher keeps it alive across retries of the same job.

use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use vgrid_common::net::TranscodeData;

/// Verification outcome reported by an external [`Verifier`].
#[derive(Debug, Clone, PartialEq)]
pub struct Results {
    /// Quality score; higher is better.
    pub score: f64,
    /// Per-rendition pixel counts, parallel to the transcode segments.
    pub pixels: Vec<i64>,
}

/// Verification failure taxonomy.
///
/// `Retryable` carries the verifier's partial results when it produced
/// any, so the retry loop can still rank the attempt by score.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VerifyError {
    #[error("pixel counts absent from verifier results")]
    PixelsAbsent,

    #[error("pixel count mismatch between verifier results and renditions")]
    PixelMismatch,

    #[error("retryable verification failure: {reason}")]
    Retryable {
        reason: String,
        results: Option<Results>,
    },

    #[error("fatal verification failure: {0}")]
    Fatal(String),

    #[error("verification failure: {0}")]
    Other(String),
}

impl VerifyError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, VerifyError::Retryable { .. })
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, VerifyError::Fatal(_))
    }
}

/// External verifier collaborator (reference-video scoring, etc.).
pub trait Verifier: Send + Sync {
    fn verify(&self, params: &Params) -> Result<Results, VerifyError>;
}

/// Retry policy for one manifest chain.
#[derive(Clone)]
pub struct Policy {
    /// `None` disables verification entirely.
    pub verifier: Option<Arc<dyn Verifier>>,
    /// Additional attempts allowed after the first.
    pub retries: usize,
}

/// Inputs of one verification attempt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    /// Job identity; correlates attempts of the same segment.
    pub manifest_id: String,
    /// Transcode output under verification. `None` skips the pixel check.
    pub results: Option<TranscodeData>,
}

/// A failed attempt, optionally carrying the best snapshot so far.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct VerifyFailure {
    pub error: VerifyError,
    /// Best-scoring retryable snapshot, populated once the retry budget
    /// is exhausted.
    pub best: Option<Params>,
}

struct Attempt {
    params: Params,
    score: f64,
}

/// Bounded retry loop around a [`Policy`].
pub struct SegmentVerifier {
    policy: Option<Policy>,
    attempts: Vec<Attempt>,
}

impl SegmentVerifier {
    pub fn new(policy: Option<Policy>) -> Self {
        Self {
            policy,
            attempts: Vec::new(),
        }
    }

    /// Run one verification attempt.
    ///
    /// Returns `Ok(None)` when verification is disabled, `Ok(Some(params))`
    /// on a clean pass, and otherwise the error together with the
    /// best-known snapshot once more than `retries` retryable attempts
    /// have been recorded.
    pub fn verify(&mut self, params: &Params) -> Result<Option<Params>, VerifyFailure> {
        let Some(policy) = &self.policy else {
            return Ok(None);
        };
        let Some(verifier) = &policy.verifier else {
            return Ok(None);
        };

        let error = match verifier.verify(params) {
            // The pixel check runs before any retry bookkeeping.
            Ok(results) => match check_pixels(&results, params) {
                Ok(()) => return Ok(Some(params.clone())),
                Err(e) => e,
            },
            Err(e) => e,
        };

        if error.is_fatal() {
            return Err(VerifyFailure { error, best: None });
        }

        if let VerifyError::Retryable { results, .. } = &error {
            let score = results.as_ref().map(|r| r.score).unwrap_or(f64::NEG_INFINITY);
            debug!(manifest_id = %params.manifest_id, score, "recording retryable verification attempt");
            self.attempts.push(Attempt {
                params: params.clone(),
                score,
            });
        }

        let best = if self.attempts.len() > policy.retries {
            self.best_attempt().map(|a| a.params.clone())
        } else {
            None
        };
        Err(VerifyFailure { error, best })
    }

    /// Strictly-higher score wins; ties keep the earlier attempt.
    fn best_attempt(&self) -> Option<&Attempt> {
        let mut best: Option<&Attempt> = None;
        for attempt in &self.attempts {
            match best {
                Some(current) if attempt.score <= current.score => {}
                _ => best = Some(attempt),
            }
        }
        best
    }
}

fn check_pixels(results: &Results, params: &Params) -> Result<(), VerifyError> {
    let Some(data) = &params.results else {
        return Ok(());
    };
    if results.pixels.len() != data.segments.len() {
        return Err(VerifyError::PixelsAbsent);
    }
    for (pixels, segment) in results.pixels.iter().zip(&data.segments) {
        if *pixels != segment.pixels {
            return Err(VerifyError::PixelMismatch);
        }
    }
    Ok(())
}
