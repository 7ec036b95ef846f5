//! Batch validation on the tokio runtime with bounded concurrency.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::info;

use super::{StructuralValidator, ValidationEngine, ValidationResult};
use crate::core::PerformanceConfig;
use crate::error::{FhirModelError, Result};
use crate::types::Instance;

/// Validates many instances concurrently, at most `max_concurrent` at a time.
///
/// Validation itself is synchronous and CPU-bound, so each item runs on the blocking pool.
#[derive(Debug, Clone)]
pub struct ParallelValidator {
    validator: Arc<StructuralValidator>,
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
}

impl ParallelValidator {
    pub fn new(validator: Arc<StructuralValidator>, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            validator,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    pub fn from_config(validator: Arc<StructuralValidator>, config: &PerformanceConfig) -> Self {
        Self::new(validator, config.max_concurrent_validations)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// One result per input, in input order. A failing item does not affect the others.
    pub async fn validate_batch(&self, instances: Vec<Instance>) -> Vec<Result<ValidationResult>> {
        let started = Instant::now();
        let total = instances.len();

        let tasks: Vec<_> = instances
            .into_iter()
            .map(|instance| {
                let validator = Arc::clone(&self.validator);
                let semaphore = Arc::clone(&self.semaphore);

                tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await.map_err(|e| {
                        FhirModelError::TaskFailed {
                            message: format!("Failed to acquire validation permit: {e}"),
                        }
                    })?;

                    tokio::task::spawn_blocking(move || validator.validate(&instance))
                        .await
                        .map_err(|e| FhirModelError::TaskFailed {
                            message: format!("Validation worker panicked: {e}"),
                        })?
                })
            })
            .collect();

        let results: Vec<Result<ValidationResult>> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|joined| {
                joined.unwrap_or_else(|e| {
                    Err(FhirModelError::TaskFailed {
                        message: format!("Validation task failed: {e}"),
                    })
                })
            })
            .collect();

        let invalid = results
            .iter()
            .filter(|r| !matches!(r, Ok(result) if result.is_valid))
            .count();
        info!(
            total,
            invalid,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Validated batch"
        );
        results
    }
}
