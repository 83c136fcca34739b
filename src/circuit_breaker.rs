use crate::errors::{ErrorKind, PipelineError};
use failsafe::{backoff, failure_policy, Config};
use std::time::Duration;

/// Circuit breaker type shared by the HTTP collaborators.
pub type ProviderCircuitBreaker = failsafe::StateMachine<
    failure_policy::ConsecutiveFailures<backoff::Exponential>,
    (),
>;

/// Creates a circuit breaker for collaborator calls to stop hammering a
/// service that keeps failing.
///
/// # Configuration
///
/// - **Failure threshold**: 5 consecutive failures triggers OPEN state.
/// - **Backoff**: Exponential backoff from 10s to 60s before attempting recovery.
///
/// # States
///
/// - **CLOSED**: Normal operation, requests pass through.
/// - **OPEN**: Too many failures, requests fail fast.
/// - **HALF_OPEN**: Testing if service recovered.
///
/// The breaker does not retry; an open circuit surfaces as a
/// [`PipelineError::Provider`] through [`breaker_error`].
pub fn create_provider_circuit_breaker() -> ProviderCircuitBreaker {
    let backoff_strategy = backoff::exponential(
        Duration::from_secs(10), // Initial delay
        Duration::from_secs(60), // Maximum delay
    );

    let failure_policy = failure_policy::consecutive_failures(5, backoff_strategy);

    Config::new().failure_policy(failure_policy).build()
}

/// Whether an error should count against the circuit.
///
/// "No data" and unparseable answers come from a healthy service, so only
/// transport-level failures trip the breaker.
pub fn counts_as_failure(err: &PipelineError) -> bool {
    matches!(err.kind(), ErrorKind::Provider | ErrorKind::Timeout)
}

/// Unwraps a breaker result into the pipeline taxonomy.
pub fn breaker_error(err: failsafe::Error<PipelineError>, collaborator: &str) -> PipelineError {
    match err {
        failsafe::Error::Inner(e) => e,
        failsafe::Error::Rejected => PipelineError::Provider(format!(
            "{} circuit is open after repeated failures",
            collaborator
        )),
    }
}
