//! Integrity signal detection.
//!
//! The monitor turns raw input-surface signals into timestamped
//! [`Infraction`]s and hands them to whoever holds the receiving end. It
//! carries no policy: whether a focus loss ends the exam is decided by the
//! session.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;

use crate::model::{Infraction, InfractionKind};

/// A raw signal observed on the input surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceSignal {
    Copy,
    Paste,
    WindowBlur,
    VisibilityChange { hidden: bool },
}

/// What the input surface must do with the original event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Let the event through.
    Allow,
    /// Drop the event; its content must not reach any answer.
    Suppress,
}

/// Watches the input surface and emits infractions.
pub struct IntegrityMonitor {
    enabled: AtomicBool,
    sink: mpsc::UnboundedSender<Infraction>,
}

/// Receiving end of an [`IntegrityMonitor`].
pub struct InfractionStream {
    rx: mpsc::UnboundedReceiver<Infraction>,
}

impl IntegrityMonitor {
    /// Create an enabled monitor and the stream its infractions arrive on.
    pub fn new() -> (Self, InfractionStream) {
        let (sink, rx) = mpsc::unbounded_channel();
        (
            Self {
                enabled: AtomicBool::new(true),
                sink,
            },
            InfractionStream { rx },
        )
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Observe one signal. Never blocks.
    pub fn observe(&self, signal: SurfaceSignal) -> Disposition {
        if !self.is_enabled() {
            return Disposition::Allow;
        }

        let (kind, disposition) = match signal {
            SurfaceSignal::Copy => (InfractionKind::Copy, Disposition::Allow),
            SurfaceSignal::Paste => (InfractionKind::Paste, Disposition::Suppress),
            SurfaceSignal::WindowBlur | SurfaceSignal::VisibilityChange { hidden: true } => {
                (InfractionKind::FocusLost, Disposition::Allow)
            }
            SurfaceSignal::VisibilityChange { hidden: false } => return Disposition::Allow,
        };

        tracing::debug!(%kind, "integrity signal observed");
        if self.sink.send(Infraction::now(kind)).is_err() {
            tracing::warn!(%kind, "infraction dropped, no session is listening");
        }
        disposition
    }
}

impl InfractionStream {
    /// Wait for the next infraction. `None` once the monitor is dropped.
    pub async fn recv(&mut self) -> Option<Infraction> {
        self.rx.recv().await
    }

    /// Take an infraction if one is already queued.
    pub fn try_recv(&mut self) -> Option<Infraction> {
        self.rx.try_recv().ok()
    }
}
