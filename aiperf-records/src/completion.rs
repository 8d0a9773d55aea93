//! Phase completion checking.

use aiperf_common::enums::CompletionReason;
use aiperf_common::models::ProcessingStats;

/// Everything the completion conditions can see.
#[derive(Debug, Clone, Copy)]
pub struct PhaseCompletionContext {
    pub processing_stats: ProcessingStats,
    pub final_request_count: Option<u64>,
    pub timeout_triggered: bool,
    pub expected_duration_sec: Option<f64>,
}

/// One way a phase can be considered complete.
pub trait PhaseCompletionCondition: Send + Sync {
    fn is_satisfied(&self, context: &PhaseCompletionContext) -> bool;

    fn reason(&self) -> CompletionReason;
}

/// Request-count benchmarks complete once every expected record arrived.
pub struct AllRequestsProcessedCondition;

impl PhaseCompletionCondition for AllRequestsProcessedCondition {
    fn is_satisfied(&self, context: &PhaseCompletionContext) -> bool {
        let is_request_count_based = context.expected_duration_sec.is_none();
        is_request_count_based
            && context
                .final_request_count
                .map(|expected| context.processing_stats.total_records() >= expected)
                .unwrap_or(false)
    }

    fn reason(&self) -> CompletionReason {
        CompletionReason::AllRequestsProcessed
    }
}

/// Duration benchmarks complete once the timing manager reports the timeout
/// and the final request count is known.
pub struct DurationTimeoutCondition;

impl PhaseCompletionCondition for DurationTimeoutCondition {
    fn is_satisfied(&self, context: &PhaseCompletionContext) -> bool {
        context.timeout_triggered && context.final_request_count.is_some()
    }

    fn reason(&self) -> CompletionReason {
        CompletionReason::DurationTimeout
    }
}

/// Checks an ordered list of completion conditions.
pub struct PhaseCompletionChecker {
    conditions: Vec<Box<dyn PhaseCompletionCondition>>,
}

impl PhaseCompletionChecker {
    pub fn new() -> Self {
        Self {
            conditions: vec![
                Box::new(AllRequestsProcessedCondition),
                Box::new(DurationTimeoutCondition),
            ],
        }
    }

    /// Add a custom condition, checked after the builtin ones.
    pub fn add_condition(&mut self, condition: Box<dyn PhaseCompletionCondition>) {
        self.conditions.push(condition);
    }

    /// `(true, reason)` for the first satisfied condition, else
    /// `(false, None)`.
    pub fn is_complete(
        &self,
        context: &PhaseCompletionContext,
    ) -> (bool, Option<CompletionReason>) {
        for condition in &self.conditions {
            if condition.is_satisfied(context) {
                return (true, Some(condition.reason()));
            }
        }
        (false, None)
    }
}

impl Default for PhaseCompletionChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(
        total_records: u64,
        final_request_count: Option<u64>,
        timeout_triggered: bool,
        expected_duration_sec: Option<f64>,
    ) -> PhaseCompletionContext {
        PhaseCompletionContext {
            processing_stats: ProcessingStats {
                processed: total_records,
                errors: 0,
                total_expected_requests: None,
            },
            final_request_count,
            timeout_triggered,
            expected_duration_sec,
        }
    }

    #[test]
    fn test_request_count_completion() {
        let checker = PhaseCompletionChecker::new();

        // Not complete before the final count is known.
        let (complete, reason) = checker.is_complete(&context(100, None, false, None));
        assert!(!complete);
        assert_eq!(reason, None);

        // Not complete below the final count.
        let (complete, _) = checker.is_complete(&context(3, Some(4), false, None));
        assert!(!complete);

        // Complete exactly at the count.
        let (complete, reason) = checker.is_complete(&context(4, Some(4), false, None));
        assert!(complete);
        assert_eq!(reason, Some(CompletionReason::AllRequestsProcessed));

        // Extra records still complete.
        let (complete, _) = checker.is_complete(&context(6, Some(4), false, None));
        assert!(complete);
    }

    #[test]
    fn test_duration_completion_requires_timeout_flag() {
        let checker = PhaseCompletionChecker::new();

        // A duration benchmark never completes on record counts alone.
        let (complete, _) = checker.is_complete(&context(1_000, Some(10), false, Some(5.0)));
        assert!(!complete);

        // Timeout without a final count is still not complete.
        let (complete, _) = checker.is_complete(&context(1_000, None, true, Some(5.0)));
        assert!(!complete);

        let (complete, reason) = checker.is_complete(&context(3, Some(10), true, Some(5.0)));
        assert!(complete);
        assert_eq!(reason, Some(CompletionReason::DurationTimeout));
    }
}
