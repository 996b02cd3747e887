use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::Mutex;
use votifier_core::{FnListener, KeyPair, ListenerRegistry, ReceiverConfig, Vote, VoteListener};

/// Key generation is slow, share one pair per test binary
pub fn keys() -> Arc<KeyPair> {
    static KEYS: OnceLock<Arc<KeyPair>> = OnceLock::new();
    KEYS.get_or_init(|| Arc::new(KeyPair::generate().unwrap())).clone()
}

pub fn config() -> ReceiverConfig {
    ReceiverConfig::new("127.0.0.1", 0)
        .with_version("2.7.3")
        .with_read_timeout(Duration::from_secs(2))
}

/// Registry with one listener collecting votes, tagged by listener index
pub fn collector(registry: &ListenerRegistry, index: usize, seen: Arc<Mutex<Vec<(usize, Vote)>>>) {
    let listener: Arc<dyn VoteListener> =
        Arc::new(FnListener::new(format!("collector-{}", index), move |v: &Vote| {
            seen.lock().push((index, v.clone()));
            Ok(())
        }));
    registry.register(listener);
}

pub fn alice() -> Vote {
    Vote::new("ExampleService", "alice", "203.0.113.5", "1700000000").unwrap()
}
