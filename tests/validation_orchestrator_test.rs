mod common;

use common::{StubBehavior, StubValidator};
use proptest::prelude::*;
use stablerun::domain::models::ExecutionMode;
use stablerun::domain::ports::Validator;
use stablerun::services::{ValidationOrchestrator, ValidatorRegistry};
use std::sync::Arc;
use std::time::Duration;

fn registry(units: &[Arc<StubValidator>]) -> ValidatorRegistry {
    let mut registry = ValidatorRegistry::new();
    for unit in units {
        registry
            .register(Arc::clone(unit) as Arc<dyn Validator>)
            .unwrap();
    }
    registry
}

#[tokio::test]
async fn test_second_validator_error_does_not_affect_siblings() {
    common::setup_test_logging();
    let units = [
        Arc::new(StubValidator::new("env", StubBehavior::Pass)),
        Arc::new(StubValidator::new("routes", StubBehavior::Error("route table unreadable"))),
        Arc::new(StubValidator::new("schema", StubBehavior::PassWithWarning("slow query"))),
    ];

    let report = ValidationOrchestrator::new()
        .run(&registry(&units), ExecutionMode::Parallel)
        .await;

    assert_eq!(report.results.len(), 3);
    assert!(report.results[0].success);
    assert!(!report.results[1].success);
    assert_eq!(report.results[1].errors, vec!["route table unreadable".to_string()]);
    assert!(report.results[2].success);
    assert_eq!(report.results[2].warnings, vec!["slow query".to_string()]);
    assert_eq!((report.passed, report.warned, report.failed), (1, 1, 1));
    assert_eq!(report.overall_exit_code, 1);
}

#[tokio::test]
async fn test_panicking_validator_is_contained() {
    let units = [
        Arc::new(StubValidator::new("a", StubBehavior::Panic("unexpected state"))),
        Arc::new(StubValidator::new("b", StubBehavior::Pass)),
    ];

    let report = ValidationOrchestrator::new()
        .run(&registry(&units), ExecutionMode::Sequential)
        .await;

    assert_eq!(report.results.len(), 2);
    assert!(!report.results[0].success);
    assert!(report.results[0].errors[0].contains("unexpected state"));
    assert!(report.results[1].success);
}

#[tokio::test]
async fn test_parallel_units_overlap() {
    let units: Vec<_> = (0..4)
        .map(|i| {
            Arc::new(
                StubValidator::new(&format!("unit-{i}"), StubBehavior::Pass)
                    .delayed(Duration::from_millis(200)),
            )
        })
        .collect();

    let started = std::time::Instant::now();
    let report = ValidationOrchestrator::new()
        .run(&registry(&units), ExecutionMode::Parallel)
        .await;

    assert_eq!(report.overall_exit_code, 0);
    // Four 200ms units in sequence would take at least 800ms
    assert!(started.elapsed() < Duration::from_millis(700));
}

#[tokio::test]
async fn test_sequential_stop_on_first_failure() {
    let units = [
        Arc::new(StubValidator::new("a", StubBehavior::Pass)),
        Arc::new(StubValidator::new("b", StubBehavior::Fail("broken"))),
        Arc::new(StubValidator::new("c", StubBehavior::Pass)),
        Arc::new(StubValidator::new("d", StubBehavior::Pass)),
    ];

    let report = ValidationOrchestrator::new()
        .stop_on_first_failure(true)
        .run(&registry(&units), ExecutionMode::Sequential)
        .await;

    assert_eq!(report.results.len(), 2);
    assert_eq!(report.skipped, vec!["c".to_string(), "d".to_string()]);
    assert_eq!(units[2].calls(), 0);
    assert_eq!(units[3].calls(), 0);
    assert_eq!(report.overall_exit_code, 1);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Property: parallel report order is declaration order whatever the
    /// completion order.
    #[test]
    fn prop_parallel_order_is_declaration_order(
        delays in prop::collection::vec(0u64..40, 1..8),
    ) {
        let units: Vec<_> = delays
            .iter()
            .enumerate()
            .map(|(i, &ms)| {
                Arc::new(
                    StubValidator::new(&format!("unit-{i}"), StubBehavior::Pass)
                        .delayed(Duration::from_millis(ms)),
                )
            })
            .collect();
        let registry = registry(&units);

        let report = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(ValidationOrchestrator::new().run(&registry, ExecutionMode::Parallel));

        let names: Vec<String> = report.results.iter().map(|r| r.name.clone()).collect();
        prop_assert_eq!(names, registry.names());
    }
}
