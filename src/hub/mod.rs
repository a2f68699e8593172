//! Fan-out of tab events to connected browser views.
//!
//! ```text
//!  producers ──┐                      ┌── mailbox ── observer 1
//!  watcher  ───┼── request queue ── HubLoop ── mailbox ── observer 2
//!  observers ──┘   (FIFO, bounded)    └── mailbox ── observer N
//! ```
//!
//! The loop is the only owner of the observer set. A broadcast never waits on a
//! slow observer: if its mailbox is full it is dropped and its connection ends.

mod broadcast;
mod error;
mod event;
mod observer;

pub use broadcast::{Frame, Hub, HubLoop, Observer, ObserverId};
pub use error::{HubError, TransportError};
pub use event::{EventKind, HubEvent, ObserverCommand};
pub use observer::{
    ConnectionSettings, Disconnect, FrameSink, FrameSource, InboundHandler, serve_connection,
};
