//! # Metrics
//!
//! Prometheus metrics for the variables service.
//!
//! ## Metrics Exposed
//!
//! - `variables_gateway_operations_total` - Secret gateway operations by operation and outcome
//! - `variables_gateway_operation_duration_seconds` - Duration of secret gateway operations
//! - `variables_restore_attempts_total` - Restore attempts (including retries)
//! - `variables_restore_failures_total` - Failed restore attempts
//! - `variables_restore_success_total` - Completed restores

use crate::error::GatewayError;
use anyhow::Result;
use prometheus::{HistogramVec, IntCounter, IntCounterVec, Registry};
use std::sync::LazyLock;
use std::time::Instant;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static GATEWAY_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "variables_gateway_operations_total",
            "Total number of secret gateway operations by operation and outcome",
        ),
        &["operation", "outcome"],
    )
    .expect("Failed to create GATEWAY_OPERATIONS_TOTAL metric - this should never happen")
});

static GATEWAY_OPERATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "variables_gateway_operation_duration_seconds",
            "Duration of secret gateway operations in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0]),
        &["operation"],
    )
    .expect("Failed to create GATEWAY_OPERATION_DURATION metric - this should never happen")
});

static RESTORE_ATTEMPTS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "variables_restore_attempts_total",
        "Total number of default variable restore attempts",
    )
    .expect("Failed to create RESTORE_ATTEMPTS_TOTAL metric - this should never happen")
});

static RESTORE_FAILURES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "variables_restore_failures_total",
        "Total number of failed default variable restore attempts",
    )
    .expect("Failed to create RESTORE_FAILURES_TOTAL metric - this should never happen")
});

static RESTORE_SUCCESS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "variables_restore_success_total",
        "Total number of completed default variable restores",
    )
    .expect("Failed to create RESTORE_SUCCESS_TOTAL metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Fails only when a metric is registered twice"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(GATEWAY_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(GATEWAY_OPERATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(RESTORE_ATTEMPTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RESTORE_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RESTORE_SUCCESS_TOTAL.clone()))?;

    Ok(())
}

/// Outcome label for a gateway result
#[must_use]
pub fn outcome_label<T>(result: &Result<T, GatewayError>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(GatewayError::NotFound { .. }) => "not_found",
        Err(GatewayError::Conflict { .. }) => "conflict",
        Err(GatewayError::Serialization(_)) => "serialization_error",
        Err(GatewayError::InvalidData { .. }) => "invalid_data",
        Err(GatewayError::Cancelled) => "cancelled",
        Err(GatewayError::Api { .. }) => "api_error",
    }
}

/// Record one gateway operation started at `start`
pub fn record_gateway_operation<T>(
    operation: &str,
    start: Instant,
    result: &Result<T, GatewayError>,
) {
    GATEWAY_OPERATIONS_TOTAL
        .with_label_values(&[operation, outcome_label(result)])
        .inc();
    GATEWAY_OPERATION_DURATION
        .with_label_values(&[operation])
        .observe(start.elapsed().as_secs_f64());
}

pub fn increment_restore_attempts() {
    RESTORE_ATTEMPTS_TOTAL.inc();
}

pub fn increment_restore_failures() {
    RESTORE_FAILURES_TOTAL.inc();
}

pub fn increment_restore_success() {
    RESTORE_SUCCESS_TOTAL.inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_labels() {
        let ok: Result<(), GatewayError> = Ok(());
        assert_eq!(outcome_label(&ok), "success");

        let missing: Result<(), GatewayError> = Err(GatewayError::NotFound {
            name: "vars".to_string(),
        });
        assert_eq!(outcome_label(&missing), "not_found");

        let api: Result<(), GatewayError> = Err(GatewayError::Api {
            status: Some(500),
            message: "boom".to_string(),
        });
        assert_eq!(outcome_label(&api), "api_error");
    }

    #[test]
    fn test_record_gateway_operation_counts() {
        let ok: Result<(), GatewayError> = Ok(());
        let before = GATEWAY_OPERATIONS_TOTAL
            .with_label_values(&["metrics_test", "success"])
            .get();
        record_gateway_operation("metrics_test", Instant::now(), &ok);
        let after = GATEWAY_OPERATIONS_TOTAL
            .with_label_values(&["metrics_test", "success"])
            .get();
        assert_eq!(after, before + 1);
    }
}
