mod common;

use std::sync::atomic::Ordering;

use common::{core, fragment_event, raw_case, swe, t0, Harness};
use grid_merge_orchestrator::controller::{
    FragmentOutcome, OrchestratorSettings, TriggerOutcome, ValidationOutcome,
};
use grid_merge_orchestrator::domain::{
    ArtifactRef, FragmentKey, FragmentStatus, LifecycleKind, MergeKey, MergeStatus, ProcessId,
    RawCaseRef, SourceId, VerdictPolicy,
};
use grid_merge_orchestrator::error::OrchestratorError;
use grid_merge_orchestrator::repo::MergeStateStore;

fn single_trigger(outcome: FragmentOutcome) -> Option<TriggerOutcome> {
    match outcome {
        FragmentOutcome::Processed(mut per_process) => {
            assert_eq!(per_process.len(), 1, "expected exactly one matching process");
            per_process.remove(0).trigger
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

fn swe_key() -> MergeKey {
    MergeKey::new(ProcessId::from("SWE"), t0())
}

#[tokio::test]
async fn test_merge_waits_for_all_sources_then_runs_once() {
    let h = Harness::new(vec![swe()]);
    let orch = &h.orchestrator;

    let fr = orch.handle_fragment_event(&fragment_event("FR", t0(), "1D")).await.unwrap();
    assert_eq!(single_trigger(fr), Some(TriggerOutcome::Waiting { validated: 1, required: 3 }));

    let es = orch.handle_fragment_event(&fragment_event("ES", t0(), "1D")).await.unwrap();
    assert_eq!(single_trigger(es), Some(TriggerOutcome::Waiting { validated: 2, required: 3 }));
    assert_eq!(h.fakes.merge_runs(), 0);

    let pt = orch.handle_fragment_event(&fragment_event("PT", t0(), "1D")).await.unwrap();
    assert_eq!(
        single_trigger(pt),
        Some(TriggerOutcome::Merged { status: MergeStatus::LoadflowSucceeded })
    );
    assert_eq!(h.fakes.loadflow_runs.load(Ordering::SeqCst), 1);
    assert_eq!(h.fakes.balance_runs.load(Ordering::SeqCst), 0);

    let merge = h.store.get_merge(&swe_key()).await.unwrap().unwrap();
    assert_eq!(merge.status, Some(MergeStatus::LoadflowSucceeded));
    assert!(merge.is_launched());

    assert_eq!(h.events.count(LifecycleKind::FragmentAvailable), 3);
    assert_eq!(h.events.count(LifecycleKind::FragmentValidated), 3);
    let tail: Vec<_> = h.events.kinds().into_iter().rev().take(4).rev().collect();
    assert_eq!(
        tail,
        vec![
            LifecycleKind::MergeStarted,
            LifecycleKind::LoadflowStarted,
            LifecycleKind::LoadflowFinished,
            LifecycleKind::MergeFinished,
        ]
    );
    let finished = h.events.events().pop().unwrap();
    assert_eq!(finished.status.as_deref(), Some("LOADFLOW_SUCCEEDED"));
    assert_eq!(finished.business_process_tag, "1D");
}

#[tokio::test]
async fn test_redelivery_after_merge_does_not_rerun() {
    let h = Harness::new(vec![swe()]);
    for source in ["FR", "ES", "PT"] {
        h.orchestrator
            .handle_fragment_event(&fragment_event(source, t0(), "1D"))
            .await
            .unwrap();
    }
    assert_eq!(h.fakes.merge_runs(), 1);

    let again = h
        .orchestrator
        .handle_fragment_event(&fragment_event("FR", t0(), "1D"))
        .await
        .unwrap();
    assert_eq!(single_trigger(again), Some(TriggerOutcome::AlreadyLaunched));
    assert_eq!(h.fakes.merge_runs(), 1);
    assert_eq!(h.events.count(LifecycleKind::FragmentAvailable), 3);
    assert_eq!(h.events.count(LifecycleKind::MergeStarted), 1);

    let direct = h.orchestrator.evaluate(&ProcessId::from("SWE"), t0()).await.unwrap();
    assert_eq!(direct, TriggerOutcome::AlreadyLaunched);
}

#[tokio::test]
async fn test_unconfigured_source_is_ignored() {
    let h = Harness::new(vec![swe()]);
    let outcome = h
        .orchestrator
        .handle_fragment_event(&fragment_event("DE", t0(), "1D"))
        .await
        .unwrap();
    assert_eq!(outcome, FragmentOutcome::Unreferenced);
    assert_eq!(h.store.fragment_count(), 0);
    assert_eq!(h.fakes.fetches.load(Ordering::SeqCst), 0);
    assert!(h.events.events().is_empty());
}

#[tokio::test]
async fn test_missing_tag_and_lowercase_format() {
    let h = Harness::new(vec![swe()]);

    let untagged = h
        .orchestrator
        .handle_fragment_event(&fragment_event("FR", t0(), ""))
        .await
        .unwrap();
    assert!(matches!(untagged, FragmentOutcome::Rejected(_)));
    assert_eq!(h.store.fragment_count(), 0);

    let mut lowercase = fragment_event("FR", t0(), "1D");
    lowercase.artifact_format = "cgmes".to_string();
    let outcome = h.orchestrator.handle_fragment_event(&lowercase).await.unwrap();
    assert!(matches!(outcome, FragmentOutcome::Processed(_)));
}

#[tokio::test]
async fn test_rejected_fragment_then_corrected_resubmission() {
    let h = Harness::new(vec![swe()]);
    h.fakes.reject_case(&raw_case("ES", t0()));

    for source in ["FR", "ES", "PT"] {
        h.orchestrator
            .handle_fragment_event(&fragment_event(source, t0(), "1D"))
            .await
            .unwrap();
    }
    assert_eq!(h.fakes.merge_runs(), 0);
    let es_key = FragmentKey {
        process_id: ProcessId::from("SWE"),
        scenario_time: t0(),
        source_id: SourceId::from("ES"),
    };
    let es = h.store.get_fragment(&es_key).await.unwrap().unwrap();
    assert_eq!(es.status, FragmentStatus::ValidationFailed);

    h.fakes.accept_case(&raw_case("ES", t0()));
    let outcome = h
        .orchestrator
        .handle_fragment_event(&fragment_event("ES", t0(), "1D"))
        .await
        .unwrap();
    assert_eq!(
        single_trigger(outcome),
        Some(TriggerOutcome::Merged { status: MergeStatus::LoadflowSucceeded })
    );
    let es = h.store.get_fragment(&es_key).await.unwrap().unwrap();
    assert_eq!(es.status, FragmentStatus::ValidationSucceeded);
}

#[tokio::test]
async fn test_resubmission_rebinds_source_case() {
    let h = Harness::new(vec![swe()]);
    h.fakes.reject_case("ES-v1");
    let mut first = fragment_event("ES", t0(), "1D");
    first.raw_case_ref = RawCaseRef::from("ES-v1");
    h.orchestrator.handle_fragment_event(&first).await.unwrap();

    let mut second = fragment_event("ES", t0(), "1D");
    second.raw_case_ref = RawCaseRef::from("ES-v2");
    h.orchestrator.handle_fragment_event(&second).await.unwrap();

    let es = h
        .store
        .get_fragment(&swe_key().fragment(SourceId::from("ES")))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(es.status, FragmentStatus::ValidationSucceeded);
    assert_eq!(es.artifact_ref, Some(ArtifactRef::from("net:ES-v2")));
    assert_eq!(es.source_artifact_ref, Some(RawCaseRef::from("ES-v2")));
}

#[tokio::test]
async fn test_fetch_failure_keeps_fragment_available() {
    let h = Harness::new(vec![swe()]);
    h.fakes.fail_fetch(&raw_case("FR", t0()));

    let outcome = h
        .orchestrator
        .handle_fragment_event(&fragment_event("FR", t0(), "1D"))
        .await
        .unwrap();
    assert!(matches!(outcome, FragmentOutcome::FetchFailed { .. }));
    assert_eq!(h.fakes.validations.load(Ordering::SeqCst), 0);

    let view = h.orchestrator.get_merge(&ProcessId::from("SWE"), t0()).await.unwrap();
    assert_eq!(view.fragments.len(), 1);
    assert_eq!(view.fragments[0].status, FragmentStatus::Available);
    assert_eq!(view.merge.status, None);
}

#[tokio::test]
async fn test_shared_source_fetched_once_validated_per_process() {
    let h = Harness::new(vec![swe(), core()]);

    let outcome = h
        .orchestrator
        .handle_fragment_event(&fragment_event("FR", t0(), "1D"))
        .await
        .unwrap();
    let FragmentOutcome::Processed(per_process) = outcome else {
        panic!("expected processed outcome");
    };
    assert_eq!(per_process.len(), 2);
    assert!(per_process
        .iter()
        .all(|p| p.validation == ValidationOutcome::Recorded(FragmentStatus::ValidationSucceeded)));
    assert_eq!(h.fakes.fetches.load(Ordering::SeqCst), 1);
    assert_eq!(h.fakes.validations.load(Ordering::SeqCst), 2);
    assert_eq!(h.store.merge_count(), 2);
}

#[tokio::test]
async fn test_balancing_process_runs_balance_adjustment() {
    let h = Harness::new(vec![core()]);
    for source in ["FR", "DE", "BE", "NL"] {
        h.orchestrator
            .handle_fragment_event(&fragment_event(source, t0(), "1D"))
            .await
            .unwrap();
    }
    assert_eq!(h.fakes.balance_runs.load(Ordering::SeqCst), 1);
    assert_eq!(h.fakes.loadflow_runs.load(Ordering::SeqCst), 0);

    let merge = h
        .store
        .get_merge(&MergeKey::new(ProcessId::from("CORE"), t0()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(merge.status, Some(MergeStatus::BalanceAdjustmentSucceeded));
    assert_eq!(h.events.count(LifecycleKind::BalanceAdjustmentFinished), 1);
    assert_eq!(h.events.count(LifecycleKind::LoadflowStarted), 0);
}

#[tokio::test]
async fn test_verdict_policy_controls_failed_status() {
    for (policy, expected) in [
        (VerdictPolicy::Propagate, MergeStatus::LoadflowFailed),
        (VerdictPolicy::AlwaysSucceed, MergeStatus::LoadflowSucceeded),
    ] {
        let settings = OrchestratorSettings {
            verdict_policy: policy,
            ..OrchestratorSettings::default()
        };
        let h = Harness::with_settings(vec![swe()], settings);
        h.fakes.set_computation_fails(true);
        for source in ["FR", "ES", "PT"] {
            h.orchestrator
                .handle_fragment_event(&fragment_event(source, t0(), "1D"))
                .await
                .unwrap();
        }
        let merge = h.store.get_merge(&swe_key()).await.unwrap().unwrap();
        assert_eq!(merge.status, Some(expected), "policy {policy:?}");
    }
}

#[tokio::test]
async fn test_computation_error_is_recorded_not_raised() {
    let h = Harness::new(vec![swe()]);
    h.fakes.set_computation_errors(true);
    for source in ["FR", "ES"] {
        h.orchestrator
            .handle_fragment_event(&fragment_event(source, t0(), "1D"))
            .await
            .unwrap();
    }
    let last = h
        .orchestrator
        .handle_fragment_event(&fragment_event("PT", t0(), "1D"))
        .await
        .unwrap();
    assert_eq!(
        single_trigger(last),
        Some(TriggerOutcome::Merged { status: MergeStatus::LoadflowFailed })
    );
}

#[tokio::test]
async fn test_storage_outage_aborts_pipeline() {
    let h = Harness::new(vec![swe()]);
    h.store.set_unavailable(true);
    let err = h
        .orchestrator
        .handle_fragment_event(&fragment_event("FR", t0(), "1D"))
        .await
        .unwrap_err();
    assert!(err.is_storage());
    assert_eq!(h.fakes.fetches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_export_after_merge() {
    let h = Harness::new(vec![swe()]);
    let process = ProcessId::from("SWE");

    let err = h.orchestrator.export(&process, t0(), None).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::MergeNotFound(_)));

    for source in ["FR", "ES"] {
        h.orchestrator
            .handle_fragment_event(&fragment_event(source, t0(), "1D"))
            .await
            .unwrap();
    }
    let err = h.orchestrator.export(&process, t0(), None).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::MergeNotReady { validated: 2, required: 3, .. }));

    h.orchestrator
        .handle_fragment_event(&fragment_event("PT", t0(), "1D"))
        .await
        .unwrap();
    let exported = h.orchestrator.export(&process, t0(), Some("UCTE")).await.unwrap();
    assert_eq!(exported.file_name, "SWE_20240301T1030Z_1D.ucte");
    let body = String::from_utf8(exported.bytes).unwrap();
    let expected_refs = ["ES", "FR", "PT"]
        .iter()
        .map(|s| format!("net:{}", raw_case(s, t0())))
        .collect::<Vec<_>>()
        .join(",");
    assert_eq!(body, format!("SWE_20240301T1030Z_1D|UCTE|{expected_refs}"));
}

#[tokio::test]
async fn test_unknown_process_lookups() {
    let h = Harness::new(vec![swe()]);
    let err = h
        .orchestrator
        .list_merges(&ProcessId::from("NORDIC"))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::ProcessNotFound(_)));

    let err = h.orchestrator.get_merge(&ProcessId::from("SWE"), t0()).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::MergeNotFound(_)));
}
