//! Lifecycle notifications.
//!
//! Contexts and the web layer announce lifecycle points on a [`SignalBus`].
//! Sending is fire-and-forget: a bus with no subscribers silently drops the
//! notification, and a lagging subscriber never slows the sender down.
//!
//! # Example
//!
//! ```
//! use sigil_core::signals::{Signal, SignalBus};
//!
//! let bus = SignalBus::default();
//! let mut rx = bus.subscribe();
//! bus.send("demo", Signal::RequestStarted);
//! let event = rx.try_recv().unwrap();
//! assert_eq!(event.signal, Signal::RequestStarted);
//! ```

use tokio::sync::broadcast;

/// Default number of undelivered notifications buffered per subscriber.
pub const DEFAULT_SIGNAL_CAPACITY: usize = 256;

/// A lifecycle point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// An application context was pushed.
    AppContextPushed,
    /// An application context is about to be popped.
    AppContextTearingDown,
    /// An application context was popped.
    AppContextPopped,
    /// Request handling started (request context active).
    RequestStarted,
    /// A response was produced and the session saved.
    RequestFinished {
        /// Response status code
        status: u16,
    },
    /// Handling produced a server error.
    GotRequestException {
        /// Short description of the failure
        message: String,
    },
    /// A request context is about to be popped.
    RequestTearingDown,
}

/// A signal tagged with the application that sent it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalEvent {
    /// Name of the sending application
    pub sender: String,
    /// The lifecycle point
    pub signal: Signal,
}

/// Broadcast sink for [`Signal`]s.
#[derive(Debug, Clone)]
pub struct SignalBus {
    sender: broadcast::Sender<SignalEvent>,
}

impl SignalBus {
    /// Create a bus buffering up to `capacity` notifications per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Announce `signal` on behalf of `sender`. Never fails.
    pub fn send(&self, sender: &str, signal: Signal) {
        tracing::trace!(sender, ?signal, "signal");
        // No receivers is the common case and not an error.
        let _ = self.sender.send(SignalEvent {
            sender: sender.to_string(),
            signal,
        });
    }

    /// Subscribe to all subsequent signals.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SignalEvent> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for SignalBus {
    fn default() -> Self {
        Self::new(DEFAULT_SIGNAL_CAPACITY)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_send_without_subscribers_is_silent() {
        let bus = SignalBus::default();
        assert_eq!(bus.receiver_count(), 0);
        bus.send("app", Signal::AppContextPushed);
    }

    #[test]
    fn test_subscribers_see_signals_in_order() {
        let bus = SignalBus::new(8);
        let mut rx = bus.subscribe();

        bus.send("app", Signal::RequestStarted);
        bus.send("app", Signal::RequestFinished { status: 200 });

        assert_eq!(rx.try_recv().unwrap().signal, Signal::RequestStarted);
        let finished = rx.try_recv().unwrap();
        assert_eq!(finished.sender, "app");
        assert_eq!(finished.signal, Signal::RequestFinished { status: 200 });
        assert!(rx.try_recv().is_err());
    }
}
