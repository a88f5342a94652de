use formflow_storage::conformance::run_conformance_suite;
use formflow_storage::MemoryStorage;

#[tokio::test]
async fn memory_storage_passes_conformance_suite() {
    let report = run_conformance_suite(|| async { MemoryStorage::new() }).await;
    assert_eq!(report.failed, 0, "{report}");
    assert!(report.total >= 25, "suite shrank unexpectedly: {report}");
}
