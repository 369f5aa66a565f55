use crate::flags::FlagOracle;
use crate::model::{Platform, StatusRecord};
use crate::store::{StatusHistoryStore, StoreError};
use async_trait::async_trait;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn flag_names(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("flag_{i}")).collect()
}

/// The value every test oracle reports for a flag and identity.
pub fn expected_flag_value(flag_name: &str, identity: &str) -> bool {
    // FNV-1a over "flag/identity"
    let hash = flag_name
        .bytes()
        .chain(std::iter::once(b'/'))
        .chain(identity.bytes())
        .fold(2_166_136_261u32, |acc, b| {
            (acc ^ b as u32).wrapping_mul(16_777_619)
        });
    (hash >> 16) % 2 == 0
}

#[derive(Clone, Debug)]
pub enum Latency {
    None,
    Fixed(Duration),
    Random { max_ms: u64 },
    SlowFlag { flag: String, delay: Duration },
}

/// Deterministic oracle with configurable per-call latency.
pub struct DelayedOracle {
    latency: Latency,
    pub calls: AtomicUsize,
    seen_identities: Mutex<Vec<String>>,
}

impl DelayedOracle {
    pub fn new(latency: Latency) -> Self {
        DelayedOracle {
            latency,
            calls: AtomicUsize::new(0),
            seen_identities: Mutex::new(Vec::new()),
        }
    }

    pub fn identities(&self) -> Vec<String> {
        self.seen_identities.lock().unwrap().clone()
    }
}

#[async_trait]
impl FlagOracle for DelayedOracle {
    async fn evaluate(&self, flag_name: &str, identity: &str) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_identities
            .lock()
            .unwrap()
            .push(identity.to_string());

        let delay = match &self.latency {
            Latency::None => Duration::ZERO,
            Latency::Fixed(delay) => *delay,
            Latency::Random { max_ms } => Duration::from_millis(fastrand::u64(0..=*max_ms)),
            Latency::SlowFlag { flag, delay } if flag == flag_name => *delay,
            Latency::SlowFlag { .. } => Duration::ZERO,
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        expected_flag_value(flag_name, identity)
    }
}

struct CancelGuard(Arc<AtomicBool>);

impl Drop for CancelGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Oracle where one flag takes `delay` and records whether it was cancelled.
pub struct SlowFlagOracle {
    slow_flag: String,
    delay: Duration,
    pub cancelled: Arc<AtomicBool>,
}

impl SlowFlagOracle {
    pub fn new(slow_flag: &str, delay: Duration) -> Self {
        SlowFlagOracle {
            slow_flag: slow_flag.to_string(),
            delay,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait]
impl FlagOracle for SlowFlagOracle {
    async fn evaluate(&self, flag_name: &str, identity: &str) -> bool {
        if flag_name == self.slow_flag {
            let guard = CancelGuard(self.cancelled.clone());
            tokio::time::sleep(self.delay).await;
            std::mem::forget(guard);
        }
        expected_flag_value(flag_name, identity)
    }
}

/// Oracle that panics while evaluating one flag.
pub struct PanickingOracle {
    flag: String,
}

impl PanickingOracle {
    pub fn new(flag: &str) -> Self {
        PanickingOracle {
            flag: flag.to_string(),
        }
    }
}

#[async_trait]
impl FlagOracle for PanickingOracle {
    async fn evaluate(&self, flag_name: &str, identity: &str) -> bool {
        if flag_name == self.flag {
            panic!("oracle exploded on {flag_name}");
        }
        expected_flag_value(flag_name, identity)
    }
}

/// Store whose every operation fails.
pub struct UnavailableStore;

#[async_trait]
impl StatusHistoryStore for UnavailableStore {
    async fn append(&self, _record: StatusRecord) -> Result<(), StoreError> {
        Err(io::Error::other("store unavailable").into())
    }

    async fn query_history(
        &self,
        _version: &str,
        _platform: Platform,
    ) -> Result<Vec<StatusRecord>, StoreError> {
        Err(io::Error::other("store unavailable").into())
    }
}
