//! End-to-end behavior of instrumented call sites, including the ways they
//! are allowed to be wrong.

use tally::{labels, Counter, LabelKind, Registry};

#[test]
fn test_misuse_is_loud_but_harmless() {
    let registry = Registry::new();
    let requests = Counter::grouped([("action", LabelKind::String)]);
    registry.register("requests", &requests).unwrap();

    // Correct access creates the cell.
    requests.cell(labels! { "action" => "get" }).increment(1.0);

    // Wrong label name: logged, dropped, no cell created.
    requests.cell(labels! { "unknown" => "x" }).increment(1.0);

    // Missing labels entirely: logged, dropped.
    requests.cell(()).increment(1.0);

    assert_eq!(registry.value_of("requests", ()), None);
    assert_eq!(registry.value_of("requests", labels! { "action" => "get" }), Some(1.0));
    assert_eq!(requests.as_metric().cells().len(), 1);
}

#[test]
fn test_panic_policy_surfaces_invalid_accesses() {
    let counter = Counter::grouped([("action", LabelKind::String)]);

    tally::set_panic_on_invalid_access(true);
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        counter.cell(labels! { "unknown" => "x" }).increment(1.0);
    }));
    tally::set_panic_on_invalid_access(false);

    assert!(result.is_err());

    // Back in the default mode the same access is just dropped.
    counter.cell(labels! { "unknown" => "x" }).increment(1.0);
    assert!(counter.as_metric().cells().is_empty());
}
