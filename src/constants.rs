//! System constants: job type names, alert topics, and operational defaults
//! shared by the orchestrator and its processors.

/// Named job types consumed from the delayed job queue.
pub mod job_types {
    /// Nudge a silent vendor, fired at T+5min after payment confirmation.
    pub const VENDOR_REMINDER: &str = "vendor-reminder";
    /// Escalate a still-silent vendor at T+10min.
    pub const VENDOR_ESCALATION: &str = "vendor-escalation";
    /// Kick off the rider search shortly before food is ready.
    pub const RIDER_SEARCH: &str = "rider-search";
    /// Re-attempt a rider search that found nobody.
    pub const RIDER_SEARCH_RETRY: &str = "rider-search-retry";
    /// Re-attempt a vendor notification whose channels all failed.
    pub const RETRY_VENDOR_NOTIFICATION: &str = "retry-vendor-notification";
}

/// Topics attached to support alerts so ops tooling can route them.
pub mod alert_topics {
    pub const PAYMENT_FLOW_FAILURE: &str = "payment_flow_failure";
    pub const VENDOR_UNREACHABLE: &str = "vendor_unreachable";
    pub const VENDOR_NO_RESPONSE: &str = "vendor_no_response";
    pub const NO_RIDER_FOUND: &str = "no_rider_found";
    pub const REFUND_REQUESTED: &str = "refund_requested";
}

/// History `source` labels, one per writer.
pub mod sources {
    pub const ORCHESTRATOR: &str = "orchestrator";
    pub const TIMEOUT_PROCESSOR: &str = "timeout_processor";
}

/// Unique job keys, one per (order, job type) so webhook replays cannot
/// duplicate timers. Retry keys include the attempt so consecutive retries
/// are distinct while replays of the same attempt collapse.
pub mod job_keys {
    pub fn vendor_reminder(order_id: i64) -> String {
        format!("vendor-reminder:{order_id}")
    }

    pub fn vendor_escalation(order_id: i64) -> String {
        format!("vendor-escalation:{order_id}")
    }

    pub fn rider_search(order_id: i64) -> String {
        format!("rider-search:{order_id}")
    }

    pub fn rider_search_retry(order_id: i64, attempt: u32) -> String {
        format!("rider-search-retry:{order_id}:{attempt}")
    }

    pub fn vendor_notification(order_id: i64) -> String {
        format!("retry-vendor-notification:{order_id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_keys_are_per_order() {
        assert_ne!(job_keys::vendor_reminder(1), job_keys::vendor_reminder(2));
        assert_ne!(
            job_keys::vendor_reminder(1),
            job_keys::vendor_escalation(1)
        );
        assert_ne!(
            job_keys::rider_search_retry(1, 1),
            job_keys::rider_search_retry(1, 2)
        );
    }
}
