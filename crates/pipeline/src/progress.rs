//! Streaming progress for a context request.
//!
//! [`ProgressStream::start`] spawns a producer that runs the aggregator and
//! feeds stage events into a bounded channel:
//!
//! ```text
//! {"status": "starting"}
//! {"status": "searching dem"}
//! {"status": "searching temperature"}
//! {"status": "searching ndvi"}
//! {"status": "searching landcover"}
//! {"summary": {...}}
//! ```
//!
//! Dropping the stream closes the channel; the producer sees it and drops
//! the in-flight pipelines with it.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use geocontext_core::AreaOfInterest;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::aggregator::{ContextAggregator, ProgressObserver};
use crate::result::ContextSummary;
use crate::sources::Source;

/// Where a request is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Starting,
    Searching(Source),
}

impl Stage {
    pub fn label(&self) -> String {
        match self {
            Self::Starting => "starting".to_string(),
            Self::Searching(source) => format!("searching {source}"),
        }
    }
}

/// One message of the progress stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Status(Stage),
    /// Final message on success.
    Summary(ContextSummary),
    /// Final message when the request itself was rejected.
    Failed(String),
}

impl ProgressEvent {
    pub fn is_final(&self) -> bool {
        !matches!(self, Self::Status(_))
    }
}

impl Serialize for ProgressEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            Self::Status(stage) => map.serialize_entry("status", &stage.label())?,
            Self::Summary(summary) => map.serialize_entry("summary", summary)?,
            Self::Failed(message) => map.serialize_entry("error", message)?,
        }
        map.end()
    }
}

/// Live progress of one context request.
pub struct ProgressStream {
    rx: mpsc::Receiver<ProgressEvent>,
    producer: JoinHandle<()>,
}

impl ProgressStream {
    /// Start generating the context for `aoi` on a background task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(aggregator: Arc<ContextAggregator>, aoi: AreaOfInterest, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let producer = tokio::spawn(produce(aggregator, aoi, tx));
        Self { rx, producer }
    }

    /// Whether the producer task has exited.
    pub fn is_finished(&self) -> bool {
        self.producer.is_finished()
    }
}

impl Stream for ProgressStream {
    type Item = ProgressEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<ProgressEvent>> {
        self.rx.poll_recv(cx)
    }
}

/// Forwards pipeline starts into the channel.
struct ChannelObserver {
    tx: mpsc::Sender<ProgressEvent>,
}

#[async_trait]
impl ProgressObserver for ChannelObserver {
    async fn searching(&self, source: Source) {
        // A closed channel is handled by the select in `produce`.
        let _ = self.tx.send(ProgressEvent::Status(Stage::Searching(source))).await;
    }
}

async fn produce(
    aggregator: Arc<ContextAggregator>,
    aoi: AreaOfInterest,
    tx: mpsc::Sender<ProgressEvent>,
) {
    tokio::select! {
        _ = tx.closed() => debug!("progress consumer went away, abandoning request"),
        _ = run(&aggregator, &aoi, &tx) => debug!("progress stream complete"),
    }
}

async fn run(
    aggregator: &ContextAggregator,
    aoi: &AreaOfInterest,
    tx: &mpsc::Sender<ProgressEvent>,
) {
    if tx.send(ProgressEvent::Status(Stage::Starting)).await.is_err() {
        return;
    }
    let observer = ChannelObserver { tx: tx.clone() };
    let last = match aggregator.generate_observed(aoi, &observer).await {
        Ok(summary) => ProgressEvent::Summary(summary),
        Err(e) => ProgressEvent::Failed(e.to_string()),
    };
    let _ = tx.send(last).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn events_serialize_as_single_key_objects() {
        let starting = serde_json::to_value(ProgressEvent::Status(Stage::Starting)).unwrap();
        assert_eq!(starting, json!({"status": "starting"}));

        let searching = ProgressEvent::Status(Stage::Searching(Source::Landcover));
        let searching = serde_json::to_value(searching).unwrap();
        assert_eq!(searching, json!({"status": "searching landcover"}));

        let summary = ProgressEvent::Summary(ContextSummary::default());
        let summary = serde_json::to_value(summary).unwrap();
        assert_eq!(
            summary,
            json!({"summary": {"dem": {}, "temperature": {}, "ndvi": {}, "landcover": {}}})
        );

        let failed = serde_json::to_value(ProgressEvent::Failed("bad".into())).unwrap();
        assert_eq!(failed, json!({"error": "bad"}));
        assert!(!ProgressEvent::Status(Stage::Starting).is_final());
    }
}
