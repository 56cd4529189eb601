//! Fake couriers and helpers shared by the queue integration tests
#![allow(dead_code)] // Not every test file uses every helper

use std::{
    collections::VecDeque,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use hermod_courier::{Courier, Couriers, DeliveryError, PermanentError, TemporaryError};
use hermod_queue::{Queue, QueueConfig, RetryPolicy};
use hermod_spool::MemoryBackingStore;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

/// How long to wait for background deliveries before failing a test
pub const DEADLINE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub from: String,
    pub to: String,
    pub data: Vec<u8>,
}

impl Delivery {
    pub fn new(from: &str, to: &str, data: &[u8]) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            data: data.to_vec(),
        }
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Outcome {
    #[default]
    Delivered,
    Temporary,
    Permanent,
}

impl Outcome {
    pub fn into_result(self, to: &str) -> Result<(), DeliveryError> {
        match self {
            Self::Delivered => Ok(()),
            Self::Temporary => {
                Err(TemporaryError::SmtpTemporary(format!("451 {to} try again later")).into())
            }
            Self::Permanent => {
                Err(PermanentError::InvalidRecipient(format!("550 {to} no such user")).into())
            }
        }
    }
}

/// Records every delivery and answers from a script
///
/// Scripted outcomes are used first, in order; after that every delivery
/// gets the fallback. When wrapping another courier, that courier decides
/// instead.
#[derive(Debug, Default)]
pub struct FakeCourier {
    deliveries: Mutex<Vec<Delivery>>,
    script: Mutex<VecDeque<Outcome>>,
    fallback: Outcome,
    inner: Option<Arc<dyn Courier>>,
}

impl FakeCourier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn always(outcome: Outcome) -> Arc<Self> {
        Arc::new(Self {
            fallback: outcome,
            ..Self::default()
        })
    }

    pub fn scripted(script: impl IntoIterator<Item = Outcome>, fallback: Outcome) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback,
            ..Self::default()
        })
    }

    pub fn wrapping(inner: Arc<dyn Courier>) -> Arc<Self> {
        Arc::new(Self {
            inner: Some(inner),
            ..Self::default()
        })
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.deliveries.lock().len()
    }
}

#[async_trait]
impl Courier for FakeCourier {
    async fn deliver(&self, from: &str, to: &str, data: &[u8]) -> Result<(), DeliveryError> {
        self.deliveries.lock().push(Delivery::new(from, to, data));

        if let Some(inner) = &self.inner {
            return inner.deliver(from, to, data).await;
        }

        let outcome = self.script.lock().pop_front().unwrap_or(self.fallback);
        outcome.into_result(to)
    }
}

/// A delivery waiting for the test to decide its outcome
#[derive(Debug)]
pub struct Request {
    pub delivery: Delivery,
    reply: oneshot::Sender<Outcome>,
}

impl Request {
    pub fn reply(self, outcome: Outcome) {
        let _ = self.reply.send(outcome);
    }
}

/// Hands each delivery to the test over a channel and blocks until the
/// test replies, so items stay in flight for as long as a test needs
#[derive(Debug)]
pub struct ChannelCourier {
    requests: mpsc::UnboundedSender<Request>,
}

impl ChannelCourier {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Request>) {
        let (requests, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { requests }), rx)
    }
}

#[async_trait]
impl Courier for ChannelCourier {
    async fn deliver(&self, from: &str, to: &str, data: &[u8]) -> Result<(), DeliveryError> {
        let (reply, outcome) = oneshot::channel();
        let request = Request {
            delivery: Delivery::new(from, to, data),
            reply,
        };

        if self.requests.send(request).is_err() {
            return Outcome::Temporary.into_result(to);
        }

        outcome.await.unwrap_or(Outcome::Temporary).into_result(to)
    }
}

/// Local domain `loco`, no retry jitter
pub fn config() -> QueueConfig {
    QueueConfig {
        local_domains: ["loco"].into_iter().collect(),
        retry: RetryPolicy {
            retry_jitter_factor: 0.0,
            ..RetryPolicy::default()
        },
        ..QueueConfig::default()
    }
}

pub fn couriers(
    local: Arc<dyn Courier>,
    remote: Arc<dyn Courier>,
    pipe: Arc<dyn Courier>,
) -> Couriers {
    Couriers {
        local,
        remote,
        pipe,
    }
}

/// A queue over a shared in-memory store
pub struct Harness {
    pub queue: Queue,
    pub store: MemoryBackingStore,
}

impl Harness {
    pub fn new(config: QueueConfig, couriers: Couriers) -> Self {
        Self::with_store(config, couriers, MemoryBackingStore::new())
    }

    pub fn with_store(config: QueueConfig, couriers: Couriers, store: MemoryBackingStore) -> Self {
        let queue = Queue::new(config, Arc::new(store.clone()), couriers);
        Self { queue, store }
    }
}

/// Wait for `check` to hold, failing the test after [`DEADLINE`]
pub async fn wait_until(check: impl Fn() -> bool) {
    let deadline = Instant::now() + DEADLINE;

    while !check() {
        assert!(Instant::now() < deadline, "condition not met within {DEADLINE:?}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// [`wait_until`] for conditions that need to await
pub async fn eventually(check: impl AsyncFn() -> bool) {
    let deadline = Instant::now() + DEADLINE;

    while !check().await {
        assert!(Instant::now() < deadline, "condition not met within {DEADLINE:?}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
