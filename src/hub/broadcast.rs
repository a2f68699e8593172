//! The hub actor: one task owns the observer set and serves a single request queue.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::error::HubError;
use super::event::{EventKind, HubEvent};
use crate::config::HubConfig;

/// Identifier the hub assigns to each registered observer.
pub type ObserverId = u64;

/// A serialized event, shared between every mailbox it is delivered to.
pub type Frame = Arc<str>;

enum HubRequest {
    Register {
        id: ObserverId,
        mailbox: mpsc::Sender<Frame>,
    },
    Unregister {
        id: ObserverId,
    },
    Broadcast {
        kind: EventKind,
        frame: Frame,
    },
    Count {
        reply: oneshot::Sender<usize>,
    },
}

/// Handle for submitting requests to the hub. Cheap to clone.
///
/// Requests from any number of tasks are applied one at a time, in arrival order,
/// by the [`HubLoop`] that was created alongside this handle.
#[derive(Clone)]
pub struct Hub {
    requests: mpsc::Sender<HubRequest>,
    shutdown: CancellationToken,
    next_id: Arc<AtomicU64>,
    mailbox_capacity: usize,
}

/// The receiving side of a registration: outbound frames for one observer.
///
/// The mailbox closes when the hub unregisters the observer, drops it for falling
/// behind, or shuts down.
#[derive(Debug)]
pub struct Observer {
    id: ObserverId,
    mailbox: mpsc::Receiver<Frame>,
}

impl Observer {
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Next frame, or `None` once the hub has let go of this observer.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.mailbox.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Frame> {
        self.mailbox.try_recv().ok()
    }
}

impl Hub {
    pub fn new(config: &HubConfig) -> (Hub, HubLoop) {
        Self::with_capacity(config.mailbox_capacity, config.request_capacity)
    }

    pub fn with_capacity(mailbox_capacity: usize, request_capacity: usize) -> (Hub, HubLoop) {
        let (tx, rx) = mpsc::channel(request_capacity.max(1));
        let shutdown = CancellationToken::new();

        let hub = Hub {
            requests: tx,
            shutdown: shutdown.clone(),
            next_id: Arc::new(AtomicU64::new(1)),
            mailbox_capacity: mailbox_capacity.max(1),
        };
        let event_loop = HubLoop {
            requests: rx,
            shutdown,
            members: HashMap::new(),
        };
        (hub, event_loop)
    }

    /// Create a hub and run its loop on the current tokio runtime.
    pub fn spawn(config: &HubConfig) -> (Hub, JoinHandle<()>) {
        let (hub, event_loop) = Self::new(config);
        let handle = tokio::spawn(event_loop.run());
        (hub, handle)
    }

    /// Add a new observer. Frames broadcast after this request is processed are
    /// delivered to the returned mailbox.
    pub async fn register(&self) -> Result<Observer, HubError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.mailbox_capacity);
        self.submit(HubRequest::Register { id, mailbox: tx }).await?;
        Ok(Observer { id, mailbox: rx })
    }

    /// Remove an observer. Unknown IDs are ignored.
    pub async fn unregister(&self, id: ObserverId) -> Result<(), HubError> {
        self.submit(HubRequest::Unregister { id }).await
    }

    /// Serialize `event` once and queue it for every current observer.
    pub async fn broadcast(&self, event: &HubEvent) -> Result<(), HubError> {
        let frame: Frame = serde_json::to_string(event)?.into();
        self.submit(HubRequest::Broadcast {
            kind: event.kind,
            frame,
        })
        .await
    }

    /// Number of observers currently registered.
    pub async fn observer_count(&self) -> Result<usize, HubError> {
        let (reply, rx) = oneshot::channel();
        self.submit(HubRequest::Count { reply }).await?;
        rx.await.map_err(|_| HubError::Closed)
    }

    /// Stop the loop and close every observer mailbox.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    async fn submit(&self, request: HubRequest) -> Result<(), HubError> {
        if self.shutdown.is_cancelled() {
            return Err(HubError::Closed);
        }
        self.requests
            .send(request)
            .await
            .map_err(|_| HubError::Closed)
    }
}

/// Owns the observer set. Run it with [`HubLoop::run`] on its own task.
pub struct HubLoop {
    requests: mpsc::Receiver<HubRequest>,
    shutdown: CancellationToken,
    members: HashMap<ObserverId, mpsc::Sender<Frame>>,
}

impl HubLoop {
    pub async fn run(mut self) {
        crate::debug_event!("hub", "started");

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => break,

                request = self.requests.recv() => match request {
                    Some(request) => self.handle(request),
                    None => break,
                },
            }
        }

        // Dropping the senders closes every mailbox
        let closed = self.members.len();
        self.members.clear();
        self.requests.close();
        crate::log_event!("hub", "stopped", "closed {closed} observers");
    }

    fn handle(&mut self, request: HubRequest) {
        match request {
            HubRequest::Register { id, mailbox } => {
                self.members.insert(id, mailbox);
                crate::debug_event!(
                    "hub",
                    "registered",
                    "observer {id} ({} total)",
                    self.members.len()
                );
            }
            HubRequest::Unregister { id } => {
                if self.members.remove(&id).is_some() {
                    crate::debug_event!(
                        "hub",
                        "unregistered",
                        "observer {id} ({} left)",
                        self.members.len()
                    );
                }
            }
            HubRequest::Broadcast { kind, frame } => self.fan_out(kind, frame),
            HubRequest::Count { reply } => {
                let _ = reply.send(self.members.len());
            }
        }
    }

    /// Offer `frame` to every mailbox without waiting. Observers whose mailbox is
    /// full or already gone are removed before the next request is served.
    fn fan_out(&mut self, kind: EventKind, frame: Frame) {
        let mut dropped = Vec::new();

        for (id, mailbox) in &self.members {
            match mailbox.try_send(Frame::clone(&frame)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!("[hub] observer {id} is not keeping up, disconnecting");
                    dropped.push(*id);
                }
                Err(TrySendError::Closed(_)) => dropped.push(*id),
            }
        }

        for id in &dropped {
            self.members.remove(id);
        }

        crate::debug_event!(
            "hub",
            "broadcast",
            "{} to {} observers ({} dropped)",
            kind.as_str(),
            self.members.len(),
            dropped.len()
        );
    }
}
