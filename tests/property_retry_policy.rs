mod common;

use common::{exited, CountingCleanup};
use proptest::prelude::*;
use stablerun::domain::models::ValidatorResult;
use stablerun::services::{ReportAggregator, RetryPolicy};
use std::sync::Arc;
use std::time::Duration;

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

proptest! {
    /// Property: attempts never exceed the maximum and cleanup runs once
    /// between every pair of consecutive attempts.
    #[test]
    fn prop_attempts_bounded_and_cleanup_between(
        max_attempts in 1u32..8,
        outcomes in prop::collection::vec(any::<bool>(), 8),
    ) {
        let cleanup = Arc::new(CountingCleanup::default());
        let policy = RetryPolicy::new(max_attempts, Duration::ZERO, cleanup.clone());

        let run = block_on(policy.run_with_retry(|attempt| {
            let success = outcomes[(attempt - 1) as usize];
            async move { Ok::<_, anyhow::Error>(exited(i32::from(!success))) }
        }));

        prop_assert!(run.attempts.len() <= max_attempts as usize);
        prop_assert!(!run.attempts.is_empty());
        prop_assert_eq!(cleanup.runs(), run.attempts.len() - 1);

        // Terminal at the first success
        let first_success = outcomes
            .iter()
            .take(max_attempts as usize)
            .position(|&ok| ok);
        match first_success {
            Some(idx) => {
                prop_assert!(run.succeeded());
                prop_assert_eq!(run.attempts.len(), idx + 1);
            }
            None => {
                prop_assert!(run.exhausted());
                prop_assert_eq!(run.attempts.len(), max_attempts as usize);
            }
        }
    }

    /// Property: the overall exit code is 0 exactly when every result
    /// succeeded.
    #[test]
    fn prop_exit_code_zero_iff_all_succeed(
        flags in prop::collection::vec((any::<bool>(), any::<bool>(), any::<bool>()), 0..12),
    ) {
        let results: Vec<ValidatorResult> = flags
            .iter()
            .enumerate()
            .map(|(i, &(success, warn, timed_out))| {
                let name = format!("unit-{i}");
                let mut result = if success {
                    ValidatorResult::passed(name)
                } else {
                    ValidatorResult::failed(name, "failed")
                };
                if warn {
                    result = result.with_warning("warning");
                }
                result.timed_out = !success && timed_out;
                result
            })
            .collect();
        let all_succeeded = results.iter().all(|r| r.success);

        let report = ReportAggregator::aggregate(results);

        prop_assert_eq!(report.overall_exit_code == 0, all_succeeded);
        prop_assert_eq!(report.passed + report.warned + report.failed, flags.len());
    }
}
