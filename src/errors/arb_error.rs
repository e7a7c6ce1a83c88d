//! Custom error types for the service

use thiserror::Error;
use crate::types::{DenyReason, ExecutionStatus};

#[derive(Error, Debug)]
pub enum ArbError {
    #[error("Upstream unavailable: {message}")]
    UpstreamUnavailable {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    #[error("Upstream rate limited")]
    UpstreamRateLimited {
        retry_after_secs: Option<u64>,
    },

    #[error("No provider mapping for symbol: {symbol}")]
    UnmappedSymbol {
        symbol: String,
    },

    #[error("Risk gate denied execution: {reason}")]
    RiskGateDenied {
        reason: DenyReason,
    },

    #[error("Execution failure: {message}")]
    ExecutionFailure {
        message: String,
    },

    #[error("Position not found: {id}")]
    PositionNotFound {
        id: String,
    },

    #[error("Execution {id} cannot transition out of {status:?}")]
    InvalidTransition {
        id: String,
        status: ExecutionStatus,
    },

    #[error("Storage error: {context}")]
    Storage {
        context: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Invalid request: {message}")]
    InvalidRequest {
        message: String,
    },
}

impl ArbError {
    /// Machine-readable code for the wire and the audit log.
    pub fn code(&self) -> &'static str {
        match self {
            ArbError::UpstreamUnavailable { .. } => "upstream_unavailable",
            ArbError::UpstreamRateLimited { .. } => "upstream_rate_limited",
            ArbError::UnmappedSymbol { .. } => "unmapped_symbol",
            ArbError::RiskGateDenied { .. } => "risk_gate_denied",
            ArbError::ExecutionFailure { .. } => "execution_failure",
            ArbError::PositionNotFound { .. } => "position_not_found",
            ArbError::InvalidTransition { .. } => "invalid_transition",
            ArbError::Storage { .. } => "storage_error",
            ArbError::InvalidRequest { .. } => "invalid_request",
        }
    }

    pub fn deny_reason(&self) -> Option<DenyReason> {
        match self {
            ArbError::RiskGateDenied { reason } => Some(*reason),
            _ => None,
        }
    }
}

pub type ArbResult<T> = Result<T, ArbError>;
