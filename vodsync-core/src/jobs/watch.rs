use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::Job;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("unable to watch jobs in {namespace} for metadata.name={name}: {detail}")]
    Subscribe {
        namespace: String,
        name: String,
        detail: String,
    },
    #[error("unreadable watch event: {0}")]
    Malformed(String),
    #[error("event stream closed before the job finished")]
    StreamClosed,
}

/// A single notification from the event subscription. Consumed exactly once
/// by the watcher; an `Error` does not end the watch.
#[derive(Debug)]
pub enum WatchEvent {
    Update(serde_json::Value),
    Error(String),
}

/// Opens a server-side-filtered event subscription for one named job.
/// `JobClient` implements this against the batch API; tests script it.
#[async_trait]
pub trait JobEventSource: Send + Sync {
    async fn subscribe(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<BoxStream<'static, WatchEvent>, WatchError>;
}

/// Watches the named job until it succeeds, the subscription fails, or the
/// caller cancels. The watch runs in its own task; the returned channels
/// both close when it terminates. Per invocation exactly one of these
/// happens: the finished job arrives on the first channel, a terminal error
/// arrives on the second, or cancellation ends the watch silently.
/// Unreadable events are reported on the error channel without ending the
/// watch. The subscription is dropped on every exit path.
pub fn wait_until_complete(
    source: Arc<dyn JobEventSource>,
    namespace: impl Into<String>,
    name: impl Into<String>,
    cancel: CancellationToken,
) -> (mpsc::Receiver<Job>, mpsc::Receiver<WatchError>) {
    let (job_tx, job_rx) = mpsc::channel(1);
    let (err_tx, err_rx) = mpsc::channel(1);
    let namespace = namespace.into();
    let name = name.into();

    tokio::spawn(async move {
        let mut events = match source.subscribe(&namespace, &name).await {
            Ok(events) => events,
            Err(err) => {
                let _ = err_tx.send(err).await;
                return;
            }
        };

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => return,
                event = events.next() => event,
            };
            match event {
                None => {
                    let _ = err_tx.send(WatchError::StreamClosed).await;
                    return;
                }
                Some(WatchEvent::Error(detail)) => {
                    report_transient(&err_tx, &cancel, WatchError::Malformed(detail)).await;
                }
                Some(WatchEvent::Update(object)) => {
                    match serde_json::from_value::<Job>(object) {
                        Err(err) => {
                            let malformed = WatchError::Malformed(err.to_string());
                            report_transient(&err_tx, &cancel, malformed).await;
                        }
                        Ok(job) if job.status.succeeded > 0 => {
                            let _ = job_tx.send(job).await;
                            return;
                        }
                        Ok(job) => {
                            debug!(
                                job = %job.metadata.name,
                                succeeded = job.status.succeeded,
                                detail = ?job.status.detail,
                                "job still running"
                            );
                        }
                    }
                }
            }
        }
    });

    (job_rx, err_rx)
}

/// Forwards a non-fatal error without wedging the watch: if the caller isn't
/// draining the error channel, cancellation still wins.
async fn report_transient(
    err_tx: &mpsc::Sender<WatchError>,
    cancel: &CancellationToken,
    err: WatchError,
) {
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = err_tx.send(err) => {}
    }
}
