// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Execution Core Errors
//!
//! `PipelineError` is the single error type shared by the domain and engine
//! crates. It merges the taxonomy from spec.md §7 (buffer/scheduling/windowing
//! failures) with general-purpose variants the engine still needs for
//! configuration, I/O, and serialization failures that aren't specific to the
//! streaming domain.
//!
//! Several variants are explicitly process-fatal per spec.md §7
//! (`InvalidSequence`, `DeadlineExceeded`): they are returned as errors rather
//! than panicking (see `SPEC_FULL.md` Open Question resolutions), but callers
//! at the query-manager boundary are expected to promote the owning QEP to
//! `ErrorState` rather than retry.

use thiserror::Error;

/// Errors surfaced by the execution core.
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    /// Buffer pool (or unpooled arena) has no memory available and the
    /// caller did not ask to block indefinitely.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// A source failed to start (spec.md §7: aborts query start).
    #[error("cannot open source: {0}")]
    CannotOpenSource(String),

    /// A sink failed to start.
    #[error("cannot open sink: {0}")]
    CannotOpenSink(String),

    /// A pipeline stage returned `Error` or panicked during `execute`.
    #[error("pipeline execution failed: {0}")]
    PipelineExecutionFailed(String),

    /// Two distinct buffers were observed with the same
    /// `(origin, sequence, chunk)` identity. Treated as a fatal bug.
    #[error("invalid sequence: {0}")]
    InvalidSequence(String),

    /// A stop/fail wait exceeded `termination.timeout`.
    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// Operator tree or window/join specification is ill-formed
    /// (rejected at `register` time).
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    /// Generic invalid-configuration catch-all (sizes, alignments, ids).
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("io error: {0}")]
    IoError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("timeout: {0}")]
    TimeoutError(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl PipelineError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    pub fn configuration_error(msg: impl Into<String>) -> Self {
        Self::ConfigurationError(msg.into())
    }

    pub fn resource_exhausted(msg: impl Into<String>) -> Self {
        Self::ResourceExhausted(msg.into())
    }

    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    /// True for errors a caller may reasonably retry (timeouts, transient
    /// resource exhaustion). `InvalidSequence` and `DeadlineExceeded` are
    /// deliberately excluded: both indicate the engine invariants have
    /// already been violated.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PipelineError::TimeoutError(_) | PipelineError::ResourceExhausted(_) | PipelineError::IoError(_)
        )
    }

    pub fn category(&self) -> &'static str {
        match self {
            PipelineError::ResourceExhausted(_) => "resource",
            PipelineError::CannotOpenSource(_) => "source",
            PipelineError::CannotOpenSink(_) => "sink",
            PipelineError::PipelineExecutionFailed(_) => "execution",
            PipelineError::InvalidSequence(_) => "sequence",
            PipelineError::DeadlineExceeded(_) => "termination",
            PipelineError::ConfigurationError(_) => "configuration",
            PipelineError::InvalidConfiguration(_) => "configuration",
            PipelineError::ValidationError(_) => "validation",
            PipelineError::IoError(_) => "io",
            PipelineError::SerializationError(_) => "serialization",
            PipelineError::TimeoutError(_) => "timeout",
            PipelineError::Cancelled(_) => "cancellation",
            PipelineError::InternalError(_) => "internal",
        }
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::IoError(err.to_string())
    }
}
