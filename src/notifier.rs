//! Outbound lifecycle events.
//!
//! Notification happens after the state change it describes has been
//! committed. Publishing never blocks and never fails the caller; a lost
//! event is logged and dropped.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::config::NotifierConfig;
use crate::domain::LifecycleEvent;

pub trait LifecycleNotifier: Send + Sync {
    fn notify(&self, event: LifecycleEvent);
}

/// In-process fan-out over `tokio::sync::broadcast`
#[derive(Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<LifecycleEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl LifecycleNotifier for BroadcastNotifier {
    fn notify(&self, event: LifecycleEvent) {
        let kind = event.kind;
        if self.tx.send(event).is_err() {
            debug!(%kind, "no lifecycle subscribers, event dropped");
        }
    }
}

/// Posts each event as JSON to an external endpoint from a detached task
#[derive(Clone)]
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { url: url.into(), client })
    }
}

impl LifecycleNotifier for WebhookNotifier {
    fn notify(&self, event: LifecycleEvent) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(kind = %event.kind, "no runtime available, lifecycle webhook skipped");
            return;
        };
        let client = self.client.clone();
        let url = self.url.clone();
        handle.spawn(async move {
            let kind = event.kind;
            match client.post(&url).json(&event).send().await {
                Ok(resp) if resp.status().is_success() => {}
                Ok(resp) => warn!(%kind, status = %resp.status(), "lifecycle webhook rejected event"),
                Err(e) => warn!(%kind, error = %e, "lifecycle webhook delivery failed"),
            }
        });
    }
}

/// Delivers every event to each inner notifier in order
#[derive(Clone, Default)]
pub struct CompositeNotifier {
    sinks: Vec<Arc<dyn LifecycleNotifier>>,
}

impl CompositeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn LifecycleNotifier>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl LifecycleNotifier for CompositeNotifier {
    fn notify(&self, event: LifecycleEvent) {
        tracing::info!(
            kind = %event.kind,
            process_id = %event.process_id,
            scenario_time = %event.scenario_time,
            source_id = event.source_id.as_ref().map(|s| s.as_str()),
            status = event.status.as_deref(),
            "lifecycle event"
        );
        for sink in &self.sinks {
            sink.notify(event.clone());
        }
    }
}

/// Builds the configured notifier chain. The broadcast bus is always present
/// so API clients can stream events.
pub fn from_config(
    cfg: &NotifierConfig,
    bus: BroadcastNotifier,
) -> anyhow::Result<CompositeNotifier> {
    let mut composite = CompositeNotifier::new().with(Arc::new(bus));
    if let Some(url) = cfg.webhook_url.as_deref().filter(|u| !u.is_empty()) {
        composite = composite.with(Arc::new(WebhookNotifier::new(url, Duration::from_secs(10))?));
    }
    Ok(composite)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LifecycleKind, ProcessConfig, SourceId};
    use chrono::Utc;

    fn event(kind: LifecycleKind) -> LifecycleEvent {
        let process = ProcessConfig::new("SWE", vec![SourceId::from("FR")], false, "1D").unwrap();
        LifecycleEvent::new(kind, &process, Utc::now())
    }

    #[tokio::test]
    async fn test_broadcast_delivers_to_subscribers() {
        let bus = BroadcastNotifier::new(8);
        let mut rx = bus.subscribe();
        bus.notify(event(LifecycleKind::MergeStarted));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.kind, LifecycleKind::MergeStarted);
    }

    #[test]
    fn test_broadcast_without_subscribers_does_not_panic() {
        let bus = BroadcastNotifier::new(8);
        assert_eq!(bus.subscriber_count(), 0);
        bus.notify(event(LifecycleKind::MergeFinished));
    }

    #[test]
    fn test_webhook_outside_runtime_is_skipped() {
        let webhook = WebhookNotifier::new("http://127.0.0.1:9/hook", Duration::from_millis(10)).unwrap();
        webhook.notify(event(LifecycleKind::MergeStarted));
    }

    #[tokio::test]
    async fn test_composite_fans_out() {
        let first = BroadcastNotifier::new(8);
        let second = BroadcastNotifier::new(8);
        let mut rx1 = first.subscribe();
        let mut rx2 = second.subscribe();
        let composite = CompositeNotifier::new()
            .with(Arc::new(first))
            .with(Arc::new(second));

        composite.notify(event(LifecycleKind::LoadflowFinished));
        assert_eq!(rx1.recv().await.unwrap().kind, LifecycleKind::LoadflowFinished);
        assert_eq!(rx2.recv().await.unwrap().kind, LifecycleKind::LoadflowFinished);
    }

    #[test]
    fn test_from_config_adds_webhook_when_set() {
        let bus = BroadcastNotifier::new(8);
        let plain = from_config(&NotifierConfig::default(), bus.clone()).unwrap();
        assert_eq!(plain.len(), 1);

        let cfg = NotifierConfig {
            channel_capacity: 8,
            webhook_url: Some("http://localhost:9000/events".to_string()),
        };
        assert_eq!(from_config(&cfg, bus).unwrap().len(), 2);
    }
}
