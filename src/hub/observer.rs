//! Per-observer connection handling, independent of the transport.
//!
//! A connection is two halves running side by side: the write half drains the
//! observer's mailbox and sends keepalive pings when idle, the read half hands
//! inbound text to an [`InboundHandler`]. Whichever half stops first ends the
//! connection and the observer is unregistered.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::broadcast::{Hub, Observer, ObserverId};
use super::error::{HubError, TransportError};
use crate::config::HubConfig;

/// Outbound half of an observer transport.
#[async_trait]
pub trait FrameSink: Send {
    async fn send_text(&mut self, text: &str) -> Result<(), TransportError>;

    async fn send_ping(&mut self) -> Result<(), TransportError>;

    /// Best-effort close handshake.
    async fn close(&mut self) {}
}

/// Inbound half of an observer transport.
#[async_trait]
pub trait FrameSource: Send {
    /// Next text frame. `None` means the peer closed the connection.
    async fn next_text(&mut self) -> Option<Result<String, TransportError>>;
}

/// Receives inbound text from observers.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    async fn handle(&self, observer: ObserverId, text: String);
}

/// Timing for the write half.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    pub keepalive: Duration,
    pub write_timeout: Duration,
}

impl From<&HubConfig> for ConnectionSettings {
    fn from(config: &HubConfig) -> Self {
        Self {
            keepalive: config.keepalive(),
            write_timeout: config.write_timeout(),
        }
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self::from(&HubConfig::default())
    }
}

/// Why a connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disconnect {
    /// The hub closed the mailbox (dropped for lag, unregistered, or shut down).
    MailboxClosed,
    PeerClosed,
    Cancelled,
    Transport(TransportError),
}

/// Register with `hub` and run the connection until either side gives up or
/// `cancel` fires. The observer is always unregistered before returning.
pub async fn serve_connection<S, R>(
    hub: &Hub,
    mut sink: S,
    mut source: R,
    handler: Arc<dyn InboundHandler>,
    settings: ConnectionSettings,
    cancel: CancellationToken,
) -> Result<Disconnect, HubError>
where
    S: FrameSink,
    R: FrameSource,
{
    let mut observer = hub.register().await?;
    let id = observer.id();
    crate::debug_event!("observer", "connected", "{id}");

    let reason = tokio::select! {
        reason = write_half(&mut observer, &mut sink, settings) => reason,
        reason = read_half(id, &mut source, handler.as_ref()) => reason,
        _ = cancel.cancelled() => Disconnect::Cancelled,
    };

    if reason != Disconnect::PeerClosed {
        let _ = tokio::time::timeout(settings.write_timeout, sink.close()).await;
    }

    // Already gone if the hub stopped first
    match hub.unregister(id).await {
        Ok(()) | Err(HubError::Closed) => {}
        Err(e) => return Err(e),
    }

    crate::debug_event!("observer", "disconnected", "{id}: {reason:?}");
    Ok(reason)
}

async fn write_half<S: FrameSink>(
    observer: &mut Observer,
    sink: &mut S,
    settings: ConnectionSettings,
) -> Disconnect {
    let mut keepalive =
        tokio::time::interval_at(Instant::now() + settings.keepalive, settings.keepalive);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            frame = observer.recv() => {
                let Some(frame) = frame else {
                    return Disconnect::MailboxClosed;
                };
                if let Err(e) = bounded(settings.write_timeout, sink.send_text(&frame)).await {
                    return Disconnect::Transport(e);
                }
                keepalive.reset();
            }
            _ = keepalive.tick() => {
                if let Err(e) = bounded(settings.write_timeout, sink.send_ping()).await {
                    return Disconnect::Transport(e);
                }
            }
        }
    }
}

async fn read_half<R: FrameSource>(
    id: ObserverId,
    source: &mut R,
    handler: &dyn InboundHandler,
) -> Disconnect {
    loop {
        match source.next_text().await {
            Some(Ok(text)) => handler.handle(id, text).await,
            Some(Err(e)) => return Disconnect::Transport(e),
            None => return Disconnect::PeerClosed,
        }
    }
}

async fn bounded<F>(limit: Duration, op: F) -> Result<(), TransportError>
where
    F: Future<Output = Result<(), TransportError>>,
{
    tokio::time::timeout(limit, op)
        .await
        .map_err(|_| TransportError::Timeout(limit))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::HubEvent;
    use parking_lot::Mutex;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    #[derive(Debug, Clone, PartialEq)]
    enum Sent {
        Text(String),
        Ping,
    }

    struct FakeSink {
        sent: mpsc::UnboundedSender<Sent>,
        fail: bool,
    }

    #[async_trait]
    impl FrameSink for FakeSink {
        async fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
            if self.fail {
                return Err(TransportError::Failed("broken pipe".to_string()));
            }
            let _ = self.sent.send(Sent::Text(text.to_string()));
            Ok(())
        }

        async fn send_ping(&mut self) -> Result<(), TransportError> {
            let _ = self.sent.send(Sent::Ping);
            Ok(())
        }
    }

    struct FakeSource {
        inbound: mpsc::UnboundedReceiver<String>,
    }

    #[async_trait]
    impl FrameSource for FakeSource {
        async fn next_text(&mut self) -> Option<Result<String, TransportError>> {
            self.inbound.recv().await.map(Ok)
        }
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(ObserverId, String)>>,
    }

    #[async_trait]
    impl InboundHandler for Recorder {
        async fn handle(&self, observer: ObserverId, text: String) {
            self.seen.lock().push((observer, text));
        }
    }

    struct Harness {
        sent: mpsc::UnboundedReceiver<Sent>,
        inbound: mpsc::UnboundedSender<String>,
        task: tokio::task::JoinHandle<Result<Disconnect, HubError>>,
    }

    fn connect(
        hub: &Hub,
        handler: Arc<dyn InboundHandler>,
        settings: ConnectionSettings,
        fail: bool,
        cancel: CancellationToken,
    ) -> Harness {
        let (sent_tx, sent) = mpsc::unbounded_channel();
        let (inbound, inbound_rx) = mpsc::unbounded_channel();
        let hub = hub.clone();
        let task = tokio::spawn(async move {
            serve_connection(
                &hub,
                FakeSink { sent: sent_tx, fail },
                FakeSource { inbound: inbound_rx },
                handler,
                settings,
                cancel,
            )
            .await
        });
        Harness { sent, inbound, task }
    }

    fn quick() -> ConnectionSettings {
        ConnectionSettings {
            keepalive: Duration::from_secs(30),
            write_timeout: Duration::from_secs(1),
        }
    }

    async fn wait_for_observers(hub: &Hub, n: usize) {
        for _ in 0..100 {
            if hub.observer_count().await.unwrap() == n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {n} observers");
    }

    #[tokio::test]
    async fn test_frames_reach_the_sink_and_inbound_reaches_handler() {
        let (hub, _loop) = Hub::spawn(&HubConfig::default());
        let recorder = Arc::new(Recorder::default());
        let mut conn = connect(
            &hub,
            recorder.clone(),
            quick(),
            false,
            CancellationToken::new(),
        );
        wait_for_observers(&hub, 1).await;

        hub.broadcast(&HubEvent::tab_activated("t")).await.unwrap();
        let sent = timeout(Duration::from_secs(1), conn.sent.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sent, Sent::Text(r#"{"type":"tab_activated","id":"t"}"#.to_string()));

        conn.inbound.send("hello".to_string()).unwrap();
        drop(conn.inbound);

        let reason = timeout(Duration::from_secs(1), conn.task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(reason, Disconnect::PeerClosed);
        assert_eq!(recorder.seen.lock().len(), 1);
        assert_eq!(recorder.seen.lock()[0].1, "hello");
        assert_eq!(hub.observer_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_write_failure_unregisters() {
        let (hub, _loop) = Hub::spawn(&HubConfig::default());
        let conn = connect(
            &hub,
            Arc::new(Recorder::default()),
            quick(),
            true,
            CancellationToken::new(),
        );
        wait_for_observers(&hub, 1).await;

        hub.broadcast(&HubEvent::tabs_cleared()).await.unwrap();

        let reason = timeout(Duration::from_secs(1), conn.task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(matches!(reason, Disconnect::Transport(_)));
        assert_eq!(hub.observer_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_idle_connection_gets_pings() {
        let (hub, _loop) = Hub::spawn(&HubConfig::default());
        let settings = ConnectionSettings {
            keepalive: Duration::from_millis(40),
            write_timeout: Duration::from_secs(1),
        };
        let cancel = CancellationToken::new();
        let mut conn = connect(
            &hub,
            Arc::new(Recorder::default()),
            settings,
            false,
            cancel.clone(),
        );

        let first = timeout(Duration::from_secs(2), conn.sent.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first, Sent::Ping);

        cancel.cancel();
        let reason = timeout(Duration::from_secs(1), conn.task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(reason, Disconnect::Cancelled);
    }

    #[tokio::test]
    async fn test_hub_shutdown_ends_connection() {
        let (hub, _loop) = Hub::spawn(&HubConfig::default());
        let conn = connect(
            &hub,
            Arc::new(Recorder::default()),
            quick(),
            false,
            CancellationToken::new(),
        );
        wait_for_observers(&hub, 1).await;

        hub.shutdown();
        let reason = timeout(Duration::from_secs(1), conn.task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(reason, Disconnect::MailboxClosed);
    }
}
