use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vodsync_core::catalog::{CatalogClient, CatalogError, ServerConfig, VideoCatalog};
use vodsync_core::jobs::{
    build_from_template, wait_until_complete, JobClient, JobError, TemplateValues,
    TRANSCODE_JOB_TEMPLATE,
};

fn values() -> TemplateValues {
    TemplateValues {
        name: "example-mkv".into(),
        input_path: "/media/raw/example.mkv".into(),
        output_path: "/media/transcoded/example.mp4".into(),
        preset: "HQ 1080p30 Surround".into(),
    }
}

async fn job_client(server: &MockServer) -> JobClient {
    let api_url: Url = format!("{}/apis/batch/v1", server.uri()).parse().unwrap();
    JobClient::new(api_url, None).unwrap()
}

#[tokio::test]
async fn create_returns_the_scheduler_assigned_name() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/apis/batch/v1/namespaces/vodsync/jobs"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "apiVersion": "batch/v1",
            "kind": "Job",
            "metadata": { "name": "transcode-example-mkv", "namespace": "vodsync" },
            "status": { "succeeded": 0 }
        })))
        .mount(&server)
        .await;

    let client = job_client(&server).await;
    let job = build_from_template(TRANSCODE_JOB_TEMPLATE, &values()).unwrap();
    let name = client.create(&job).await.unwrap();
    assert_eq!(name, "transcode-example-mkv");
}

#[tokio::test]
async fn rejected_submission_carries_the_manifest() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/apis/batch/v1/namespaces/vodsync/jobs"))
        .respond_with(ResponseTemplate::new(422).set_body_string("spec invalid"))
        .mount(&server)
        .await;

    let client = job_client(&server).await;
    let job = build_from_template(TRANSCODE_JOB_TEMPLATE, &values()).unwrap();
    match client.create(&job).await.unwrap_err() {
        JobError::Submission {
            status,
            body,
            manifest,
        } => {
            assert_eq!(status.as_u16(), 422);
            assert!(body.contains("spec invalid"));
            assert!(manifest.contains("transcode-example-mkv"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn deleting_a_missing_job_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/apis/batch/v1/namespaces/vodsync/jobs/transcode-gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = job_client(&server).await;
    client.delete("transcode-gone", "vodsync").await.unwrap();
}

#[tokio::test]
async fn watch_reads_events_until_the_job_succeeds() {
    let server = MockServer::start().await;
    let running = json!({
        "type": "MODIFIED",
        "object": {
            "apiVersion": "batch/v1",
            "kind": "Job",
            "metadata": { "name": "transcode-example-mkv", "namespace": "vodsync" },
            "status": { "succeeded": 0, "active": 1 }
        }
    });
    let finished = json!({
        "type": "MODIFIED",
        "object": {
            "apiVersion": "batch/v1",
            "kind": "Job",
            "metadata": { "name": "transcode-example-mkv", "namespace": "vodsync" },
            "status": { "succeeded": 1 }
        }
    });
    let body = format!("{running}\n{finished}\n");
    Mock::given(method("GET"))
        .and(path("/apis/batch/v1/namespaces/vodsync/jobs"))
        .and(query_param("watch", "1"))
        .and(query_param("fieldSelector", "metadata.name=transcode-example-mkv"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body.into_bytes(), "application/json"))
        .mount(&server)
        .await;

    let client = job_client(&server).await;
    let (mut jobs, mut errs) = wait_until_complete(
        Arc::new(client),
        "vodsync",
        "transcode-example-mkv",
        CancellationToken::new(),
    );
    let job = jobs.recv().await.expect("completed job");
    assert_eq!(job.status.succeeded, 1);
    assert!(jobs.recv().await.is_none());
    assert!(errs.recv().await.is_none());
}

#[tokio::test]
async fn find_library_binds_the_matching_section() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/library/sections"))
        .and(header("X-Catalog-Token", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sections": [
                { "key": "1", "title": "TV" },
                { "key": "2", "title": "Movies" }
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/library/sections/2/all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "videos": [
                { "directory": "Movies", "filename": "example.mp4" }
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/library/sections/2/refresh"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = CatalogClient::new(ServerConfig {
        url: server.uri(),
        token: "secret".into(),
    })
    .unwrap();
    let library = client.find_library("Movies").await.unwrap();
    assert_eq!(library.key, "2");
    assert!(library.has_video("Movies", "example.mp4").await.unwrap());
    assert!(!library.has_video("Movies", "other.mp4").await.unwrap());
    library.update().await.unwrap();
}

#[tokio::test]
async fn find_library_reports_unknown_names() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/library/sections"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "sections": [] })))
        .mount(&server)
        .await;

    let client = CatalogClient::new(ServerConfig {
        url: server.uri(),
        token: "secret".into(),
    })
    .unwrap();
    match client.find_library("Music").await.unwrap_err() {
        CatalogError::LibraryNotFound(name) => assert_eq!(name, "Music"),
        other => panic!("unexpected error: {other}"),
    }
}
