//! Retention sweep as part of the reconciliation cycle.

mod common;

use chrono::Duration;
use serde_json::json;

use common::{b64, dispatched_job, gzip, tar_bytes, ScriptedClient, TestHarness};
use jobsync::db::artifact_repo;
use jobsync::JobStatus;

#[tokio::test]
async fn expired_job_is_removed_with_files_and_artifacts() {
    let harness = TestHarness::new();
    let client = ScriptedClient::new();
    let old = harness.insert_job(dispatched_job("rp-old"));
    harness
        .layout()
        .save_uploads(42, &old.id, [("target.fasta", b">t\nMKV".as_slice())])
        .unwrap();

    let archive = gzip(&tar_bytes(&[("ranked_0.pdb", b"ATOM"), ("scores.csv", b"a,b")]));
    client.respond(
        "rp-old",
        json!({"status": "COMPLETED", "output": {"archive_base64": b64(&archive)}}),
    );
    harness.cycle(&client).await.unwrap();
    assert_eq!(harness.job(&old.id).status, JobStatus::Completed);
    assert_eq!(harness.artifacts(&old.id).len(), 3);

    harness.clock.advance(Duration::days(6));
    let fresh = harness.insert_job(dispatched_job("rp-fresh"));
    client.respond("rp-fresh", json!({"status": "RUNNING"}));

    // Day 6: nothing has expired yet.
    let report = harness.cycle(&client).await.unwrap();
    assert_eq!(report.sweep.purged, 0);
    assert!(harness.job_exists(&old.id));

    harness.clock.advance(Duration::days(1) + Duration::seconds(5));
    let report = harness.cycle(&client).await.unwrap();

    assert_eq!(report.sweep.purged, 1);
    assert_eq!(report.commit.jobs_deleted, 1);
    assert!(!harness.job_exists(&old.id));
    assert!(harness.artifacts(&old.id).is_empty());
    assert!(!harness.layout().results_path(42, &old.id).exists());
    assert!(!harness.layout().uploads_path(42, &old.id).exists());

    assert!(harness.job_exists(&fresh.id));
    assert_eq!(harness.job(&fresh.id).status, JobStatus::Running);
    assert_eq!(artifact_repo::count_all(&harness.db).unwrap(), 0);
}

#[tokio::test]
async fn expired_job_without_files_is_still_purged() {
    let harness = TestHarness::new();
    let client = ScriptedClient::new();
    let job = harness.insert_job(common::pending_job("diffdock"));

    harness.clock.advance(harness.settings.retention() + Duration::seconds(1));
    let report = harness.cycle(&client).await.unwrap();

    assert_eq!(report.sweep.purged, 1);
    assert!(!harness.job_exists(&job.id));
}

#[tokio::test]
async fn sweep_is_discarded_when_the_cycle_fails() {
    let harness = TestHarness::new();
    let client = ScriptedClient::new();
    let expired = harness.insert_job(common::pending_job("alphafold"));
    harness.clock.advance(Duration::days(8));
    harness.insert_job(dispatched_job("rp-broken"));
    client.fail("rp-broken", "timed out");

    assert!(harness.cycle(&client).await.is_err());
    assert!(harness.job_exists(&expired.id));

    client.reset("rp-broken").respond("rp-broken", json!({"status": "QUEUED"}));
    harness.cycle(&client).await.unwrap();
    assert!(!harness.job_exists(&expired.id));
}
