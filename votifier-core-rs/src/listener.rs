//! Vote listeners and the registry that fans votes out to them

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{DispatchError, DispatchFailure, ListenerError};
use crate::vote::Vote;

/// An in-process consumer of decoded votes.
///
/// Listeners are called synchronously on the blocking thread pool, one vote
/// at a time per connection. Blocking I/O is fine; a listener stuck forever
/// still pins a pool thread after shutdown.
pub trait VoteListener: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    fn on_vote(&self, vote: &Vote) -> Result<(), ListenerError>;
}

/// Handle returned by [`ListenerRegistry::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of delivering one vote to every listener
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Listeners that accepted the vote
    pub delivered: usize,
    pub failures: Vec<DispatchError>,
}

impl DispatchReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

type Entry = (ListenerId, Arc<dyn VoteListener>);

/// Ordered set of listeners shared by all connection handlers.
///
/// Dispatch works on a snapshot, so listeners can be added or removed while
/// votes are being delivered.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: RwLock<Vec<Entry>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listener at the end of the delivery order
    pub fn register(&self, listener: Arc<dyn VoteListener>) -> ListenerId {
        let id = ListenerId(Uuid::new_v4());
        debug!("Registered vote listener '{}' ({})", listener.name(), id);
        self.listeners.write().push((id, listener));
        id
    }

    /// Remove a listener, returns false if it was not registered
    pub fn deregister(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        before != listeners.len()
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Names of the registered listeners, in delivery order
    pub fn names(&self) -> Vec<String> {
        self.listeners
            .read()
            .iter()
            .map(|(_, l)| l.name().to_string())
            .collect()
    }

    fn snapshot(&self) -> Vec<Arc<dyn VoteListener>> {
        self.listeners.read().iter().map(|(_, l)| l.clone()).collect()
    }

    /// Deliver a vote to every listener in registration order.
    ///
    /// A listener that errors or panics is logged and skipped; the rest still
    /// receive the vote.
    pub fn dispatch(&self, vote: &Vote) -> DispatchReport {
        let mut report = DispatchReport::default();

        for listener in self.snapshot() {
            let result = panic::catch_unwind(AssertUnwindSafe(|| listener.on_vote(vote)));

            let failure = match result {
                Ok(Ok(())) => {
                    report.delivered += 1;
                    continue;
                }
                Ok(Err(e)) => DispatchFailure::Error(e),
                Err(payload) => DispatchFailure::Panic(panic_message(payload.as_ref())),
            };

            let err = DispatchError {
                listener: listener.name().to_string(),
                failure,
            };
            warn!("Vote dispatch: {}", err);
            report.failures.push(err);
        }

        report
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.names())
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Listener backed by a closure
pub struct FnListener<F> {
    name: String,
    f: F,
}

impl<F> FnListener<F>
where
    F: Fn(&Vote) -> Result<(), ListenerError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), f }
    }
}

impl<F> VoteListener for FnListener<F>
where
    F: Fn(&Vote) -> Result<(), ListenerError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn on_vote(&self, vote: &Vote) -> Result<(), ListenerError> {
        (self.f)(vote)
    }
}

/// Listener that forwards votes into a bounded channel.
///
/// Lets async consumers process votes on their own task. A full or closed
/// channel counts as a dispatch failure.
pub struct ChannelListener {
    name: String,
    tx: mpsc::Sender<Vote>,
}

impl ChannelListener {
    pub fn new(name: impl Into<String>, capacity: usize) -> (Self, mpsc::Receiver<Vote>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { name: name.into(), tx }, rx)
    }
}

impl VoteListener for ChannelListener {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_vote(&self, vote: &Vote) -> Result<(), ListenerError> {
        self.tx.try_send(vote.clone())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn vote(user: &str) -> Vote {
        Vote::new("ExampleService", user, "203.0.113.5", "1700000000").unwrap()
    }

    /// Records (listener index, vote) pairs into a shared log
    fn recorder(
        index: usize,
        log: Arc<Mutex<Vec<(usize, Vote)>>>,
    ) -> Arc<dyn VoteListener> {
        Arc::new(FnListener::new(format!("recorder-{}", index), move |v: &Vote| {
            log.lock().push((index, v.clone()));
            Ok(())
        }))
    }

    #[test]
    fn test_dispatch_in_registration_order() {
        let registry = ListenerRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            registry.register(recorder(i, log.clone()));
        }

        let v = vote("alice");
        let report = registry.dispatch(&v);
        assert_eq!(report.delivered, 5);
        assert!(report.is_clean());

        let log = log.lock();
        let order: Vec<usize> = log.iter().map(|(i, _)| *i).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
        assert!(log.iter().all(|(_, got)| *got == v));
    }

    #[test]
    fn test_empty_registry() {
        let registry = ListenerRegistry::new();
        let report = registry.dispatch(&vote("alice"));
        assert_eq!(report.delivered, 0);
        assert!(report.is_clean());
    }

    #[test]
    fn test_failing_listener_isolated() {
        let registry = ListenerRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        registry.register(recorder(0, log.clone()));
        registry.register(Arc::new(FnListener::new("broken", |_: &Vote| {
            Err("database unavailable".into())
        })));
        registry.register(Arc::new(FnListener::new("panicky", |_: &Vote| -> Result<(), ListenerError> {
            panic!("listener bug")
        })));
        registry.register(recorder(3, log.clone()));

        let report = registry.dispatch(&vote("bob"));
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].listener, "broken");
        assert!(matches!(report.failures[0].failure, DispatchFailure::Error(_)));
        assert_eq!(report.failures[1].listener, "panicky");
        assert!(
            matches!(&report.failures[1].failure, DispatchFailure::Panic(msg) if msg == "listener bug")
        );

        let order: Vec<usize> = log.lock().iter().map(|(i, _)| *i).collect();
        assert_eq!(order, vec![0, 3]);
    }

    #[test]
    fn test_deregister() {
        let registry = ListenerRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let first = registry.register(recorder(0, log.clone()));
        registry.register(recorder(1, log.clone()));

        assert!(registry.deregister(first));
        assert!(!registry.deregister(first));
        assert_eq!(registry.names(), vec!["recorder-1".to_string()]);

        registry.dispatch(&vote("carol"));
        let order: Vec<usize> = log.lock().iter().map(|(i, _)| *i).collect();
        assert_eq!(order, vec![1]);
    }

    #[test]
    fn test_register_during_dispatch() {
        let registry = Arc::new(ListenerRegistry::new());
        let inner = registry.clone();

        // Registering from inside a listener must not deadlock
        registry.register(Arc::new(FnListener::new("registrar", move |_: &Vote| {
            inner.register(Arc::new(FnListener::new("late", |_: &Vote| Ok(()))));
            Ok(())
        })));

        let report = registry.dispatch(&vote("dave"));
        assert_eq!(report.delivered, 1);
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_channel_listener() {
        let (listener, mut rx) = ChannelListener::new("channel", 1);
        let registry = ListenerRegistry::new();
        registry.register(Arc::new(listener));

        assert!(registry.dispatch(&vote("erin")).is_clean());
        // Channel full
        let report = registry.dispatch(&vote("frank"));
        assert_eq!(report.failures.len(), 1);

        assert_eq!(rx.recv().await.unwrap().username(), "erin");
    }
}
