use std::io;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tokio::io::AsyncBufReadExt;
use tokio_stream::wrappers::LinesStream;
use tokio_util::io::StreamReader;
use tracing::info;
use url::Url;

use super::watch::{JobEventSource, WatchError, WatchEvent};
use super::Job;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("scheduler rejected job ({status}): {body}\n{manifest}")]
    Submission {
        status: StatusCode,
        body: String,
        manifest: String,
    },
    #[error("cluster api error ({status}) at {url}")]
    Api { status: StatusCode, url: String },
}

pub type JobResult<T> = Result<T, JobError>;

/// Client for the scheduler's batch API: create and delete job resources,
/// and subscribe to the watch stream for a single named job.
#[derive(Debug, Clone)]
pub struct JobClient {
    client: Client,
    api_url: String,
    token: Option<String>,
}

impl JobClient {
    pub fn new(api_url: Url, token: Option<String>) -> JobResult<Self> {
        let client = Client::builder().user_agent("vodsync/0.1").build()?;
        Ok(Self {
            client,
            api_url: api_url.as_str().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn jobs_url(&self, namespace: &str) -> String {
        format!("{}/namespaces/{}/jobs", self.api_url, namespace)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Submits a job description to the scheduler. A rejection carries the
    /// serialized manifest so the operator can see what was turned away.
    /// Returns the scheduler-assigned name, which is treated as opaque.
    pub async fn create(&self, job: &Job) -> JobResult<String> {
        let url = self.jobs_url(&job.metadata.namespace);
        let request = self.authorize(self.client.post(&url)).json(job);
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let manifest = serde_yaml::to_string(job).unwrap_or_default();
            return Err(JobError::Submission {
                status,
                body,
                manifest,
            });
        }
        let created: Job = response.json().await?;
        let name = if created.metadata.name.is_empty() {
            job.metadata.name.clone()
        } else {
            created.metadata.name
        };
        info!(job = %name, "created job");
        Ok(name)
    }

    /// Best-effort deletion: a job that is already gone counts as deleted.
    pub async fn delete(&self, name: &str, namespace: &str) -> JobResult<()> {
        info!(job = %name, %namespace, "deleting job");
        let url = format!("{}/{}", self.jobs_url(namespace), name);
        let request = self.authorize(self.client.delete(&url));
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(JobError::Api { status, url })
    }
}

/// One line of the watch stream: a tagged event wrapping the job object.
#[derive(Debug, Deserialize)]
struct WireEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    object: serde_json::Value,
}

fn parse_event(line: &str) -> WatchEvent {
    match serde_json::from_str::<WireEvent>(line) {
        Ok(event) if event.kind == "ERROR" => WatchEvent::Error(event.object.to_string()),
        Ok(event) => WatchEvent::Update(event.object),
        Err(err) => WatchEvent::Error(format!("unparseable event: {err}")),
    }
}

#[async_trait]
impl JobEventSource for JobClient {
    async fn subscribe(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<BoxStream<'static, WatchEvent>, WatchError> {
        let url = self.jobs_url(namespace);
        let filter = format!("metadata.name={name}");
        let request = self
            .authorize(self.client.get(&url))
            .query(&[("watch", "1"), ("fieldSelector", filter.as_str())]);
        let subscribe_error = |detail: String| WatchError::Subscribe {
            namespace: namespace.to_string(),
            name: name.to_string(),
            detail,
        };
        let response = request
            .send()
            .await
            .map_err(|err| subscribe_error(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(subscribe_error(format!("status {status}")));
        }

        // The watch endpoint pushes newline-delimited JSON events for as long
        // as the subscription is held; dropping the stream releases it.
        let bytes = response
            .bytes_stream()
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err));
        let lines = LinesStream::new(StreamReader::new(bytes).lines());
        let events = lines.filter_map(|line| async move {
            match line {
                Ok(line) if line.trim().is_empty() => None,
                Ok(line) => Some(parse_event(&line)),
                Err(err) => Some(WatchEvent::Error(err.to_string())),
            }
        });
        Ok(events.boxed())
    }
}
