//! Batch processing against in-memory job and object stores

mod common;

use common::{image_job, marker, Harness, CONTENT_BUCKET, MEDIA_BUCKET};
use media_worker::db::{JobStatus, JobStore, MediaJob};
use media_worker::provider::DEFAULT_PROVIDER_ID;
use media_worker::testing::{MemoryJobStore, StaticArtifactSource, StaticProvider};
use media_worker::WorkerConfig;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_ok;

#[tokio::test]
async fn test_item_stimulus_end_to_end() {
    let h = Harness::new();
    h.seed_course(
        "bio-101",
        &json!({
            "title": "Biology",
            "items": [{"id": 7, "groupId": 2}, {"id": 8, "groupId": 2}]
        }),
    );
    let job_id = h.enqueue(image_job("bio-101", Some(7), json!({})), 0).await;

    let report = assert_ok!(h.runner.run_batch(5).await);
    assert_eq!(report.processed, 1);
    let result = &report.results[0];
    assert_eq!(result.id, job_id);
    assert_eq!(result.status, JobStatus::Done);
    assert!(result.error.is_none());

    let url = result.result_url.clone().unwrap();
    assert!(url.starts_with("https://storage.test/course-media/courses/bio-101/items/7/"));
    assert!(url.ends_with(".png"));

    let course = h.course("bio-101");
    assert_eq!(
        course["items"][0]["stimulus"],
        json!({"type": "image", "url": &url, "alt": "Illustration for item 7"})
    );
    assert_eq!(course["items"][0]["groupId"], json!(2));
    assert!(course["items"][1].get("stimulus").is_none());

    let row = h.jobs.get(job_id).await.unwrap();
    assert_eq!(row.status, "done");
    assert_eq!(row.result_url.as_deref(), Some(url.as_str()));
    assert!(row.started_at.is_some());
    assert!(row.completed_at.is_some());

    let metadata = row.metadata.unwrap();
    assert_eq!(metadata["provider_id"], json!(DEFAULT_PROVIDER_ID));
    assert_eq!(metadata["attach"], json!("attached"));
    assert_eq!(metadata["target"]["type"], json!("item_stimulus"));

    assert_eq!(h.source.fetched(), vec![common::GENERATED_URL.to_string()]);
    let stored = h.objects.uploads_to(MEDIA_BUCKET);
    assert_eq!(stored.len(), 1);
    let artifact = h.objects.object(MEDIA_BUCKET, &stored[0]).unwrap();
    assert!(artifact.options.upsert);
    assert_eq!(artifact.options.content_type, "image/png");
    assert_eq!(artifact.options.cache_control.as_deref(), Some("max-age=31536000"));
}

#[tokio::test]
async fn test_enveloped_document_keeps_wrapper() {
    let h = Harness::new();
    h.seed_course(
        "c1",
        &json!({
            "format": "course-v2",
            "version": 3,
            "content": {"items": [{"id": 7}]}
        }),
    );
    h.enqueue(image_job("c1", Some(7), json!({})), 0).await;

    let report = assert_ok!(h.runner.run_batch(1).await);
    assert_eq!(report.results[0].status, JobStatus::Done);

    let course = h.course("c1");
    assert_eq!(course["format"], json!("course-v2"));
    assert_eq!(course["version"], json!(3));
    assert_eq!(course["content"]["items"][0]["stimulus"]["type"], json!("image"));
    assert!(course.get("items").is_none());
}

#[tokio::test]
async fn test_non_image_job_fails_without_io() {
    let h = Harness::new();
    h.seed_course("c1", &json!({"items": [{"id": 1}]}));
    let job_id = h
        .enqueue(MediaJob::pending("c1", Some(1), "audio", "a jingle"), 0)
        .await;

    let report = assert_ok!(h.runner.run_batch(5).await);
    let result = &report.results[0];
    assert_eq!(result.status, JobStatus::Failed);
    assert!(result.error.as_deref().unwrap().contains("audio"));
    assert!(result.result_url.is_none());

    assert_eq!(h.provider.calls(), 0);
    assert!(h.objects.uploads().is_empty());

    let row = h.jobs.get(job_id).await.unwrap();
    assert_eq!(row.status, "failed");
    assert!(row.completed_at.is_some());
    assert!(row.error.unwrap().contains("audio"));
}

#[tokio::test]
async fn test_malformed_target_fails_before_provider() {
    let h = Harness::new();
    h.seed_course("c1", &json!({"items": [{"id": 1}]}));
    h.enqueue(
        image_job(
            "c1",
            Some(1),
            json!({"targetRef": {"type": "item_stimulus", "itemId": -1}}),
        ),
        0,
    )
    .await;

    let report = assert_ok!(h.runner.run_batch(5).await);
    assert_eq!(report.results[0].status, JobStatus::Failed);
    assert!(report.results[0]
        .error
        .as_deref()
        .unwrap()
        .starts_with("Invalid target reference"));
    assert_eq!(h.provider.calls(), 0);
}

#[tokio::test]
async fn test_study_text_replaces_first_marker_only() {
    let h = Harness::new();
    h.seed_course(
        "c1",
        &json!({
            "studyTexts": [
                {"id": "s1", "content": "Intro [IMAGE:old] more [IMAGE:keep this]"},
                {"id": "s2", "content": "Other [IMAGE:untouched]"}
            ]
        }),
    );
    h.enqueue(
        image_job(
            "c1",
            None,
            json!({"targetRef": {"type": "study_text", "courseId": "c1", "sectionId": "s1"}}),
        ),
        0,
    )
    .await;

    let report = assert_ok!(h.runner.run_batch(5).await);
    let url = report.results[0].result_url.clone().unwrap();
    assert!(url.contains("/courses/c1/study-texts/s1/"));

    let course = h.course("c1");
    assert_eq!(
        course["studyTexts"][0]["content"],
        json!(format!("Intro {} more [IMAGE:keep this]", marker(&url)))
    );
    assert_eq!(course["studyTexts"][1]["content"], json!("Other [IMAGE:untouched]"));
}

#[tokio::test]
async fn test_study_text_marker_index() {
    let h = Harness::new();
    h.seed_course(
        "c1",
        &json!({"studyTexts": [{"id": "s1", "content": "[IMAGE:a] one [IMAGE:b] two [IMAGE:c]"}]}),
    );
    h.enqueue(
        image_job(
            "c1",
            None,
            json!({"targetRef": {"type": "study_text", "sectionId": "s1", "markerIndex": 1}}),
        ),
        0,
    )
    .await;

    let report = assert_ok!(h.runner.run_batch(5).await);
    let url = report.results[0].result_url.clone().unwrap();
    assert_eq!(
        h.course("c1")["studyTexts"][0]["content"],
        json!(format!("[IMAGE:a] one {} two [IMAGE:c]", marker(&url)))
    );
}

#[tokio::test]
async fn test_study_text_without_markers_appends() {
    let h = Harness::new();
    h.seed_course(
        "c1",
        &json!({"studyTexts": [{"id": "s1", "content": "Plain text, no markers"}]}),
    );
    h.enqueue(
        image_job(
            "c1",
            None,
            json!({"targetRef": {"type": "study_text", "sectionId": "s1"}}),
        ),
        0,
    )
    .await;

    let report = assert_ok!(h.runner.run_batch(5).await);
    let url = report.results[0].result_url.clone().unwrap();
    assert_eq!(
        h.course("c1")["studyTexts"][0]["content"],
        json!(format!("Plain text, no markers\n\n{}", marker(&url)))
    );
}

#[tokio::test]
async fn test_marker_index_out_of_range_leaves_document() {
    let h = Harness::new();
    let document = json!({"studyTexts": [{"id": "s1", "content": "Only [IMAGE:one]"}]});
    h.seed_course("c1", &document);
    let before = h.objects.bytes(CONTENT_BUCKET, "courses/c1/course.json").unwrap();
    let job_id = h
        .enqueue(
            image_job(
                "c1",
                None,
                json!({"targetRef": {"type": "study_text", "sectionId": "s1", "markerIndex": 4}}),
            ),
            0,
        )
        .await;

    let report = assert_ok!(h.runner.run_batch(5).await);
    assert_eq!(report.results[0].status, JobStatus::Done);

    let after = h.objects.bytes(CONTENT_BUCKET, "courses/c1/course.json").unwrap();
    assert_eq!(before, after);
    assert!(h.objects.uploads_to(CONTENT_BUCKET).is_empty());

    let row = h.jobs.get(job_id).await.unwrap();
    assert_eq!(row.metadata.unwrap()["attach"], json!("marker_not_found"));
}

#[tokio::test]
async fn test_missing_item_is_done_and_document_untouched() {
    let h = Harness::new();
    h.seed_course("c1", &json!({"items": [{"id": 1, "groupId": 2}]}));
    let before = h.objects.bytes(CONTENT_BUCKET, "courses/c1/course.json").unwrap();
    let job_id = h.enqueue(image_job("c1", Some(99), json!({})), 0).await;

    let report = assert_ok!(h.runner.run_batch(5).await);
    assert_eq!(report.results[0].status, JobStatus::Done);

    // The artifact is stored, the document is not rewritten
    assert_eq!(h.objects.uploads_to(MEDIA_BUCKET).len(), 1);
    assert!(h.objects.uploads_to(CONTENT_BUCKET).is_empty());
    let after = h.objects.bytes(CONTENT_BUCKET, "courses/c1/course.json").unwrap();
    assert_eq!(before, after);

    let row = h.jobs.get(job_id).await.unwrap();
    assert_eq!(row.status, "done");
    assert_eq!(row.metadata.unwrap()["attach"], json!("target_not_found"));
}

#[tokio::test]
async fn test_strict_targets_fail_missing_item() {
    let h = Harness::with(
        StaticProvider::new(DEFAULT_PROVIDER_ID, common::GENERATED_URL),
        StaticArtifactSource::png(),
        WorkerConfig::builder().strict_targets(true).build(),
    );
    h.seed_course("c1", &json!({"items": [{"id": 1}]}));
    h.enqueue(image_job("c1", Some(99), json!({})), 0).await;

    let report = assert_ok!(h.runner.run_batch(5).await);
    assert_eq!(report.results[0].status, JobStatus::Failed);
    assert!(report.results[0]
        .error
        .as_deref()
        .unwrap()
        .contains("target_not_found"));
}

#[tokio::test]
async fn test_failed_job_does_not_abort_batch() {
    let h = Harness::new();
    h.seed_course("c1", &json!({"items": [{"id": 1}, {"id": 2}]}));
    let bad = h
        .enqueue(MediaJob::pending("c1", Some(1), "video", "?"), 30)
        .await;
    let missing_doc = h.enqueue(image_job("nope", Some(1), json!({})), 20).await;
    let good = h.enqueue(image_job("c1", Some(2), json!({})), 10).await;

    let report = assert_ok!(h.runner.run_batch(10).await);
    assert_eq!(report.processed, 3);

    let statuses: Vec<_> = report.results.iter().map(|r| (r.id, r.status)).collect();
    assert_eq!(
        statuses,
        vec![
            (bad, JobStatus::Failed),
            (missing_doc, JobStatus::Failed),
            (good, JobStatus::Done),
        ]
    );
    assert!(report.results[1]
        .error
        .as_deref()
        .unwrap()
        .contains("Course document not found"));
}

#[tokio::test]
async fn test_batch_size_is_clamped() {
    let h = Harness::new();
    h.seed_course("c1", &json!({"items": [{"id": 1}]}));
    for i in 0..30 {
        h.enqueue(image_job("c1", Some(1), json!({})), 100 - i).await;
    }

    let report = assert_ok!(h.runner.run_batch(0).await);
    assert_eq!(report.processed, 1);

    let report = assert_ok!(h.runner.run_batch(100).await);
    assert_eq!(report.processed, 25);
    assert_eq!(assert_ok!(h.jobs.count_pending().await), 4);
}

#[tokio::test]
async fn test_empty_queue() {
    let h = Harness::new();
    let report = assert_ok!(h.runner.run_batch(5).await);
    assert_eq!(report.processed, 0);
    assert!(report.results.is_empty());
}

#[tokio::test]
async fn test_claim_error_on_first_claim_is_returned() {
    let h = Harness::new();
    h.enqueue(image_job("c1", Some(1), json!({})), 0).await;
    h.jobs.fail_claims(true);

    assert!(h.runner.run_batch(5).await.is_err());
    assert_eq!(h.provider.calls(), 0);
}

#[tokio::test]
async fn test_provider_timeout_fails_job() {
    let h = Harness::with(
        StaticProvider::new(DEFAULT_PROVIDER_ID, common::GENERATED_URL)
            .with_delay(Duration::from_secs(5)),
        StaticArtifactSource::png(),
        WorkerConfig::builder()
            .provider_timeout(Duration::from_millis(50))
            .build(),
    );
    h.seed_course("c1", &json!({"items": [{"id": 1}]}));
    h.enqueue(image_job("c1", Some(1), json!({})), 0).await;

    let report = assert_ok!(h.runner.run_batch(5).await);
    assert_eq!(report.results[0].status, JobStatus::Failed);
    assert!(report.results[0].error.as_deref().unwrap().contains("timed out"));
    assert!(h.objects.uploads().is_empty());
}

#[tokio::test]
async fn test_provider_error_and_unknown_provider() {
    let h = Harness::with(
        StaticProvider::failing(DEFAULT_PROVIDER_ID, "content policy violation"),
        StaticArtifactSource::png(),
        WorkerConfig::default(),
    );
    h.seed_course("c1", &json!({"items": [{"id": 1}]}));
    h.enqueue(image_job("c1", Some(1), json!({})), 20).await;
    h.enqueue(image_job("c1", Some(1), json!({"provider_id": "midjourney"})), 10)
        .await;

    let report = assert_ok!(h.runner.run_batch(5).await);
    assert_eq!(report.processed, 2);
    assert!(report.results[0]
        .error
        .as_deref()
        .unwrap()
        .contains("content policy violation"));
    assert_eq!(
        report.results[1].error.as_deref(),
        Some("Unknown media provider: midjourney")
    );
    assert!(h.objects.uploads().is_empty());
}

#[tokio::test]
async fn test_fetch_error_stores_nothing() {
    let h = Harness::with(
        StaticProvider::new(DEFAULT_PROVIDER_ID, common::GENERATED_URL),
        StaticArtifactSource::png().with_status(404),
        WorkerConfig::default(),
    );
    h.seed_course("c1", &json!({"items": [{"id": 1}]}));
    h.enqueue(image_job("c1", Some(1), json!({})), 0).await;

    let report = assert_ok!(h.runner.run_batch(5).await);
    assert_eq!(report.results[0].status, JobStatus::Failed);
    assert!(report.results[0].error.as_deref().unwrap().contains("404"));
    assert!(h.objects.uploads().is_empty());
}

#[tokio::test]
async fn test_concurrent_claims_are_disjoint() {
    let store = Arc::new(MemoryJobStore::new());
    for i in 0..40 {
        store
            .insert(MediaJob::pending("c1", Some(i), "image", "p"))
            .await;
    }

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            let mut claimed = Vec::new();
            while let Some(job) = store.claim_next_pending().await.unwrap() {
                claimed.push(job.id);
                tokio::task::yield_now().await;
            }
            claimed
        }));
    }

    let mut seen = HashSet::new();
    for handle in handles {
        for id in assert_ok!(handle.await) {
            assert!(seen.insert(id), "job {} claimed twice", id);
        }
    }
    assert_eq!(seen.len(), 40);
    assert_eq!(assert_ok!(store.count_pending().await), 0);
}

#[tokio::test]
async fn test_status_update_failure_does_not_stop_batch() {
    let h = Harness::new();
    h.seed_course("c1", &json!({"items": [{"id": 1}]}));
    let bad = h
        .enqueue(MediaJob::pending("c1", Some(1), "video", "?"), 20)
        .await;
    let good = h.enqueue(image_job("c1", Some(1), json!({})), 10).await;
    h.jobs.fail_updates(true);

    let report = assert_ok!(h.runner.run_batch(5).await);
    assert_eq!(report.processed, 2);
    assert_eq!(report.results[0].id, bad);
    assert_eq!(report.results[0].status, JobStatus::Failed);
    assert_eq!(
        report.results[0].error.as_deref(),
        Some("Unsupported media type: video")
    );
    assert_eq!(report.results[1].id, good);
    assert_eq!(report.results[1].status, JobStatus::Done);
    let url = report.results[1].result_url.clone().unwrap();

    // The artifact is attached even though the row could not be finalized
    assert_eq!(h.course("c1")["items"][0]["stimulus"]["url"], json!(&url));
    assert_eq!(h.jobs.get(good).await.unwrap().status, "processing");
    assert_eq!(h.jobs.get(bad).await.unwrap().status, "processing");
}

#[tokio::test]
async fn test_artifact_upload_failure_fails_job() {
    let h = Harness::new();
    let document = json!({"items": [{"id": 1}]});
    h.seed_course("c1", &document);
    h.objects.reject_uploads_to(MEDIA_BUCKET);
    let job_id = h.enqueue(image_job("c1", Some(1), json!({})), 0).await;

    let report = assert_ok!(h.runner.run_batch(5).await);
    assert_eq!(report.results[0].status, JobStatus::Failed);
    let error = report.results[0].error.clone().unwrap();
    assert!(error.starts_with("Storage error: upload to course-media/courses/c1/items/1/"));
    assert!(error.ends_with("rejected: bucket is read-only"));

    let row = h.jobs.get(job_id).await.unwrap();
    assert_eq!(row.status, "failed");
    assert_eq!(row.error.as_deref(), Some(error.as_str()));
    assert!(row.result_url.is_none());
    assert_eq!(h.course("c1"), document);
    assert!(h.objects.uploads().is_empty());
}

#[tokio::test]
async fn test_unparsable_document_fails_job() {
    let h = Harness::new();
    let path = common::document_path("c1");
    h.objects.put(CONTENT_BUCKET, &path, &b"{\"items\": [{\"id\": 1}"[..]);
    let job_id = h.enqueue(image_job("c1", Some(1), json!({})), 0).await;

    let report = assert_ok!(h.runner.run_batch(5).await);
    assert_eq!(report.results[0].status, JobStatus::Failed);
    assert!(report.results[0]
        .error
        .as_deref()
        .unwrap()
        .starts_with("Invalid course document: unparsable JSON"));
    assert_eq!(h.jobs.get(job_id).await.unwrap().status, "failed");

    // The document is never rewritten
    assert_eq!(
        h.objects.bytes(CONTENT_BUCKET, &path).unwrap(),
        &b"{\"items\": [{\"id\": 1}"[..]
    );
    assert!(h.objects.uploads_to(CONTENT_BUCKET).is_empty());
}

#[tokio::test]
async fn test_claim_error_mid_batch_returns_partial_report() {
    let h = Harness::new();
    h.seed_course("c1", &json!({"items": [{"id": 1}, {"id": 2}, {"id": 3}]}));
    let first = h.enqueue(image_job("c1", Some(1), json!({})), 30).await;
    let second = h.enqueue(image_job("c1", Some(2), json!({})), 20).await;
    let third = h.enqueue(image_job("c1", Some(3), json!({})), 10).await;
    h.jobs.fail_claims_after(2);

    let report = assert_ok!(h.runner.run_batch(5).await);
    assert_eq!(report.processed, 2);
    let ids: Vec<_> = report.results.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![first, second]);
    assert!(report.results.iter().all(|r| r.status == JobStatus::Done));
    assert_eq!(h.jobs.get(third).await.unwrap().status, "pending");
}

#[tokio::test]
async fn test_media_type_is_matched_exactly() {
    let h = Harness::new();
    h.seed_course("c1", &json!({"items": [{"id": 1}]}));
    h.enqueue(MediaJob::pending("c1", Some(1), "Image", "p"), 20)
        .await;
    h.enqueue(MediaJob::pending("c1", Some(1), " image", "p"), 10)
        .await;

    let report = assert_ok!(h.runner.run_batch(5).await);
    assert_eq!(
        report.results[0].error.as_deref(),
        Some("Unsupported media type: Image")
    );
    assert_eq!(
        report.results[1].error.as_deref(),
        Some("Unsupported media type:  image")
    );
    assert_eq!(h.provider.calls(), 0);
}
