use crate::error::{OrchestrationError, Result};
use std::time::Duration;

/// Operational knobs for the post-payment workflow. Defaults match the
/// production timings; every field can be overridden through `ORDERFLOW_*`
/// environment variables.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Vendor reminder fires this long after payment confirmation.
    pub vendor_reminder_delay: Duration,
    /// Vendor escalation fires this long after payment confirmation.
    pub vendor_escalation_delay: Duration,
    /// Rider search starts this long before the food is expected to be ready.
    pub rider_search_lead_time: Duration,
    /// Spacing between rider search retries.
    pub rider_search_retry_delay: Duration,
    /// Total rider search attempts before handing off to a human.
    pub rider_search_max_attempts: u32,
    /// Queue attempts for a vendor notification job (first inline attempt
    /// not included).
    pub vendor_notification_max_attempts: u32,
    /// Base of the vendor-notification exponential backoff.
    pub vendor_notification_backoff_base: Duration,
    /// Cap on the vendor-notification backoff.
    pub vendor_notification_backoff_max: Duration,
    /// Geofence radius for pickup/drop proximity transitions.
    pub geofence_radius_m: f64,
    /// Timeout applied to every best-effort external call.
    pub best_effort_timeout: Duration,
    /// Prep time assumed when the vendor accepts without giving one.
    pub default_prep_time_minutes: i64,
    /// Lifetime of customer<->rider masked numbers.
    pub masked_number_ttl: Duration,
    /// Queue worker poll interval.
    pub worker_poll_interval: Duration,
    /// Jobs leased per worker poll.
    pub worker_batch_size: i64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            vendor_reminder_delay: Duration::from_secs(5 * 60),
            vendor_escalation_delay: Duration::from_secs(10 * 60),
            rider_search_lead_time: Duration::from_secs(10 * 60),
            rider_search_retry_delay: Duration::from_secs(2 * 60),
            rider_search_max_attempts: 6,
            vendor_notification_max_attempts: 4,
            vendor_notification_backoff_base: Duration::from_secs(5),
            vendor_notification_backoff_max: Duration::from_secs(20),
            geofence_radius_m: 50.0,
            best_effort_timeout: Duration::from_secs(5),
            default_prep_time_minutes: 20,
            masked_number_ttl: Duration::from_secs(3 * 60 * 60),
            worker_poll_interval: Duration::from_secs(1),
            worker_batch_size: 10,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(secs) = env_u64("ORDERFLOW_VENDOR_REMINDER_SECS")? {
            config.vendor_reminder_delay = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("ORDERFLOW_VENDOR_ESCALATION_SECS")? {
            config.vendor_escalation_delay = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("ORDERFLOW_RIDER_SEARCH_RETRY_SECS")? {
            config.rider_search_retry_delay = Duration::from_secs(secs);
        }
        if let Some(attempts) = env_u64("ORDERFLOW_RIDER_SEARCH_MAX_ATTEMPTS")? {
            config.rider_search_max_attempts = attempts as u32;
        }
        if let Some(attempts) = env_u64("ORDERFLOW_NOTIFICATION_MAX_ATTEMPTS")? {
            config.vendor_notification_max_attempts = attempts as u32;
        }
        if let Some(radius) = env_f64("ORDERFLOW_GEOFENCE_RADIUS_M")? {
            config.geofence_radius_m = radius;
        }
        if let Some(secs) = env_u64("ORDERFLOW_BEST_EFFORT_TIMEOUT_SECS")? {
            config.best_effort_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

fn env_u64(key: &str) -> Result<Option<u64>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| OrchestrationError::configuration(format!("invalid {key}: {e}"))),
        Err(_) => Ok(None),
    }
}

fn env_f64(key: &str) -> Result<Option<f64>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| OrchestrationError::configuration(format!("invalid {key}: {e}"))),
        Err(_) => Ok(None),
    }
}
