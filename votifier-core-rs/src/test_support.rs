//! Shared fixtures for unit tests

use std::sync::{Arc, OnceLock};

use crate::crypto::KeyPair;

/// One 2048-bit key pair per test binary; generating them is slow
pub(crate) fn shared_keys() -> Arc<KeyPair> {
    static KEYS: OnceLock<Arc<KeyPair>> = OnceLock::new();
    KEYS.get_or_init(|| Arc::new(KeyPair::generate().expect("key generation")))
        .clone()
}
