//! The delivery queue
//!
//! A [`Queue`] owns every accepted message until each of its recipients has
//! either been delivered or failed for good. Submissions are persisted
//! before `put` returns, every recipient is attempted on its own task, and
//! each change of recipient state is written back so that a restart
//! resumes where the queue left off.

pub mod cleanup;
mod item;
pub mod retry;

use std::{
    collections::HashMap,
    fmt::Write as _,
    future::Future,
    pin::Pin,
    sync::Arc,
    time::SystemTime,
};

use hermod_common::{
    ItemId, Message, Recipient, RecipientKind, RecipientStatus, Route, internal, outgoing,
};
use hermod_courier::Couriers;
use hermod_spool::{BackingStore, SpoolError};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use self::{
    cleanup::CleanupQueue,
    item::{Claim, Item, ItemState},
};
use crate::{Classifier, IdGenerator, QueueConfig, QueueError, dsn, error::Result};

#[derive(Debug, Default)]
struct Items {
    map: HashMap<ItemId, Arc<Item>>,
    /// Slots promised to submissions that are still being persisted
    reserved: usize,
}

/// A claim on one unit of capacity, returned if dropped before [`commit`]
///
/// [`commit`]: Reservation::commit
struct Reservation<'a> {
    items: &'a Mutex<Items>,
    held: bool,
}

impl<'a> Reservation<'a> {
    fn try_new(items: &'a Mutex<Items>, max_items: usize) -> Option<Self> {
        let mut guard = items.lock();
        if guard.map.len() + guard.reserved >= max_items {
            return None;
        }

        guard.reserved += 1;
        Some(Self { items, held: true })
    }

    /// Always succeeds. Only for a bounce, which takes over the slot of the
    /// resolved item it reports on as soon as that item is removed.
    fn overflow(items: &'a Mutex<Items>) -> Self {
        items.lock().reserved += 1;
        Self { items, held: true }
    }

    fn commit(mut self, item: Arc<Item>) {
        let mut guard = self.items.lock();
        guard.reserved = guard.reserved.saturating_sub(1);
        guard.map.insert(item.id.clone(), item);
        self.held = false;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.held {
            let mut guard = self.items.lock();
            guard.reserved = guard.reserved.saturating_sub(1);
        }
    }
}

/// What one scheduler pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub dispatched: usize,
    pub expired: usize,
    pub resolved: usize,
    pub persisted: usize,
    pub cleaned: usize,
}

/// What [`Queue::load`] found in the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub loaded: usize,
    pub finalized: usize,
    pub unreadable: usize,
    /// Left in the store because the queue was full
    pub deferred: usize,
}

#[derive(Debug, Default)]
struct Progress {
    persisted: bool,
    expired: usize,
    dispatched: usize,
    resolved: bool,
}

#[derive(Debug)]
struct Inner {
    config: QueueConfig,
    classifier: Classifier,
    ids: IdGenerator,
    store: Arc<dyn BackingStore>,
    couriers: Couriers,
    items: Mutex<Items>,
    cleanup: CleanupQueue,
}

/// Handle to a delivery queue; clones share the same queue
#[derive(Debug, Clone)]
pub struct Queue {
    inner: Arc<Inner>,
}

impl Queue {
    #[must_use]
    pub fn new(config: QueueConfig, store: Arc<dyn BackingStore>, couriers: Couriers) -> Self {
        let classifier = Classifier::new(config.local_domains.clone());

        Self {
            inner: Arc::new(Inner {
                config,
                classifier,
                ids: IdGenerator::new(),
                store,
                couriers,
                items: Mutex::new(Items::default()),
                cleanup: CleanupQueue::new(),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    /// Accept a message for delivery.
    ///
    /// The message is persisted before this returns; delivery to each
    /// recipient then starts in the background. A recipient address that
    /// cannot be parsed does not reject the message: that recipient is
    /// failed straight away and reported in the bounce.
    ///
    /// # Errors
    /// - [`QueueError::NoRecipients`] if `recipients` is empty
    /// - [`QueueError::QueueFull`] if the queue is at capacity
    /// - [`QueueError::Spool`] if the message could not be persisted
    #[tracing::instrument(level = "debug", skip(self, recipients, data), fields(from = %from))]
    pub async fn put<I, S>(
        &self,
        from: &str,
        recipients: I,
        data: impl Into<Arc<[u8]>>,
    ) -> Result<ItemId>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let recipients: Vec<Recipient> = recipients
            .into_iter()
            .map(|address| self.recipient(address.as_ref()))
            .collect();

        if recipients.is_empty() {
            return Err(QueueError::NoRecipients);
        }

        let reservation = Reservation::try_new(&self.inner.items, self.inner.config.max_items)
            .ok_or(QueueError::QueueFull)?;

        self.enqueue(from, recipients, data.into(), reservation).await
    }

    /// Persist a new item into a slot already reserved for it, then start
    /// delivering
    async fn enqueue(
        &self,
        from: &str,
        recipients: Vec<Recipient>,
        data: Arc<[u8]>,
        reservation: Reservation<'_>,
    ) -> Result<ItemId> {
        let count = recipients.len();
        let message = Message {
            id: self.inner.ids.next_id(),
            from: from.to_string(),
            created_at: SystemTime::now(),
            data,
            recipients,
        };

        self.inner.store.write(&message).await?;

        let item = Arc::new(Item::new(message));
        reservation.commit(Arc::clone(&item));

        internal!(
            level = INFO,
            "Queued {} from <{}> for {} recipient(s)",
            item.id,
            item.from,
            count
        );

        self.advance(&item, SystemTime::now()).await;

        Ok(item.id.clone())
    }

    fn recipient(&self, address: &str) -> Recipient {
        self.inner.classifier.classify(address).unwrap_or_else(|err| {
            warn!(address, "Rejecting recipient: {err}");

            Recipient {
                status: RecipientStatus::Failure,
                last_failure: Some(err.to_string()),
                ..Recipient::new(address, address, RecipientKind::Email(Route::Local))
            }
        })
    }

    /// Drop an item from the queue and delete its record.
    ///
    /// The queue calls this itself once an item is resolved. A record that
    /// cannot be deleted is retried from the scheduler rather than failing
    /// the removal.
    ///
    /// # Errors
    /// [`QueueError::NotFound`] if no such item is queued
    #[tracing::instrument(level = "debug", skip(self), fields(id = %id))]
    pub async fn remove(&self, id: &ItemId) -> Result<()> {
        let item = self
            .inner
            .items
            .lock()
            .map
            .remove(id)
            .ok_or_else(|| QueueError::NotFound(id.clone()))?;

        item.lock().await.removed = true;

        match self.inner.store.delete(id).await {
            Ok(()) => {}
            Err(SpoolError::NotFound(_)) => {
                warn!(%id, "Record was already gone when removing item");
            }
            Err(e) => {
                error!(%id, error = %e, "Failed to delete record, queued for cleanup");
                self.inner
                    .cleanup
                    .add_failed_deletion(id.clone(), SystemTime::now());
            }
        }

        debug!(%id, "Removed item");
        Ok(())
    }

    /// Bring previously persisted items back into the queue.
    ///
    /// Records are taken in id order, which is creation order, until the
    /// queue is full. Unreadable records are logged and left where they
    /// are. Items that were already fully resolved are finalized; the rest
    /// resume delivery.
    ///
    /// # Errors
    /// If the store cannot be listed
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn load(&self) -> Result<LoadSummary> {
        let ids = self.inner.store.list().await?;
        let mut summary = LoadSummary::default();
        let mut loaded = Vec::new();

        for (position, id) in ids.iter().enumerate() {
            if self.contains(id) {
                continue;
            }

            let Some(reservation) =
                Reservation::try_new(&self.inner.items, self.inner.config.max_items)
            else {
                summary.deferred = ids[position..]
                    .iter()
                    .filter(|id| !self.contains(id))
                    .count();
                warn!(
                    remaining = summary.deferred,
                    "Queue is full, leaving remaining records in the store"
                );
                break;
            };

            match self.inner.store.read(id).await {
                Ok(message) if message.id == *id => {
                    let item = Arc::new(Item::new(message));
                    reservation.commit(Arc::clone(&item));
                    loaded.push(item);
                }
                Ok(message) => {
                    error!(%id, found = %message.id, "Skipping record stored under the wrong id");
                    summary.unreadable += 1;
                }
                Err(e) => {
                    error!(%id, error = %e, "Skipping unreadable record");
                    summary.unreadable += 1;
                }
            }
        }

        summary.loaded = loaded.len();

        let now = SystemTime::now();
        for item in &loaded {
            if self.advance(item, now).await.resolved {
                summary.finalized += 1;
            }
        }

        internal!(
            level = INFO,
            "Loaded {} item(s) from the store ({} already resolved, {} unreadable, {} deferred)",
            summary.loaded,
            summary.finalized,
            summary.unreadable,
            summary.deferred
        );

        Ok(summary)
    }

    /// One scheduler pass at `now`.
    ///
    /// Rewrites records whose last write failed, fails the remaining
    /// recipients of expired items, dispatches recipients whose retry time
    /// has come, and retries failed record deletions.
    pub async fn tick(&self, now: SystemTime) -> TickSummary {
        let items: Vec<Arc<Item>> = self.inner.items.lock().map.values().cloned().collect();
        let mut summary = TickSummary::default();

        for item in &items {
            let progress = self.advance(item, now).await;

            summary.dispatched += progress.dispatched;
            summary.expired += progress.expired;
            summary.persisted += usize::from(progress.persisted);
            summary.resolved += usize::from(progress.resolved);
        }

        summary.cleaned = self
            .inner
            .cleanup
            .process(self.inner.store.as_ref(), now)
            .await;

        summary
    }

    /// Move an item along: catch up its record, expire it if it is too old,
    /// start attempts that are due, and finalize it once resolved.
    async fn advance(&self, item: &Arc<Item>, now: SystemTime) -> Progress {
        let mut progress = Progress::default();

        let (claims, resolved) = {
            let mut state = item.lock().await;
            if state.removed || state.resolved {
                return progress;
            }

            if state.dirty {
                progress.persisted = self.persist(item, &mut state).await;
            }

            if self.inner.config.retry.is_expired(item.created_at, now) {
                let reason = format!(
                    "Gave up after {}s in the queue",
                    self.inner.config.retry.give_up_after_secs
                );

                progress.expired = state.expire(&reason);
                if progress.expired > 0 {
                    warn!(
                        id = %item.id,
                        recipients = progress.expired,
                        "Item expired, failing remaining recipients"
                    );
                    self.persist(item, &mut state).await;
                }
            }

            let claims = state.claim_due(now);
            let resolved = state.take_resolved().then(|| item.snapshot(&state));

            (claims, resolved)
        };

        progress.dispatched = claims.len();
        for claim in claims {
            self.spawn_attempt(Arc::clone(item), claim);
        }

        if let Some(message) = resolved {
            progress.resolved = true;
            self.finalize(message).await;
        }

        progress
    }

    fn spawn_attempt(&self, item: Arc<Item>, claim: Claim) {
        let queue = self.clone();
        tokio::spawn(async move { queue.attempt(&item, claim).await });
    }

    /// Deliver to one recipient and record the outcome
    async fn attempt(&self, item: &Item, claim: Claim) {
        let courier = self.inner.couriers.for_kind(claim.kind);

        outgoing!(
            level = DEBUG,
            "Delivering {} to {} via the {} courier",
            item.id,
            claim.address,
            claim.kind
        );

        let result = courier.deliver(&item.from, &claim.address, &item.data).await;

        let resolved = {
            let mut state = item.lock().await;
            state.release(claim.index);

            if state.removed {
                debug!(id = %item.id, "Item was removed while delivering, dropping the result");
                return;
            }

            match &result {
                Ok(()) => {
                    outgoing!(level = INFO, "Delivered {} to {}", item.id, claim.address);
                }
                Err(err) => {
                    warn!(id = %item.id, to = %claim.address, error = %err, "Delivery failed");
                }
            }

            state.record_result(
                claim.index,
                result,
                &self.inner.config.retry,
                SystemTime::now(),
            );

            if let Some(recipient) = state.recipients.get(claim.index)
                && let Some(at) = recipient.next_retry_at
            {
                info!(
                    id = %item.id,
                    to = %claim.address,
                    attempts = recipient.attempts,
                    retry_in_secs = at.duration_since(SystemTime::now()).unwrap_or_default().as_secs(),
                    "Will retry delivery"
                );
            }

            self.persist(item, &mut state).await;

            state.take_resolved().then(|| item.snapshot(&state))
        };

        if let Some(message) = resolved {
            self.finalize(message).await;
        }
    }

    /// Write the item's current state, remembering a failure for the next
    /// scheduler pass
    async fn persist(&self, item: &Item, state: &mut ItemState) -> bool {
        match self.inner.store.write(&item.snapshot(state)).await {
            Ok(()) => {
                state.dirty = false;
                true
            }
            Err(e) => {
                error!(id = %item.id, error = %e, "Failed to persist item, will retry");
                state.dirty = true;
                false
            }
        }
    }

    /// Bounce if anything failed, then drop the resolved item
    async fn finalize(&self, message: Message) {
        let failed = message.failed().count();

        internal!(
            level = INFO,
            "Item {} resolved: {} delivered, {} failed",
            message.id,
            message.recipients.len() - failed,
            failed
        );

        if dsn::should_bounce(&message, &self.inner.config.dsn) {
            let bounce = dsn::build_bounce(&message, &self.inner.config.dsn, SystemTime::now());

            match self.submit_bounce(message.from.trim(), bounce).await {
                Ok(id) => info!(original = %message.id, bounce = %id, "Queued bounce"),
                Err(e) => {
                    error!(original = %message.id, error = %e, "Failed to queue bounce");
                }
            }
        }

        if let Err(e) = self.remove(&message.id).await {
            warn!(id = %message.id, error = %e, "Resolved item was already removed");
        }
    }

    /// Queue a bounce while the item it reports on still holds its slot.
    ///
    /// The bounce is admitted past `max_items` since the original is
    /// removed right after, so a full queue cannot swallow it. Enqueueing
    /// may finalize and bounce in turn, so the future is boxed to keep its
    /// type finite.
    fn submit_bounce<'a>(
        &'a self,
        to: &'a str,
        bounce: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = Result<ItemId>> + Send + 'a>> {
        let recipients = vec![self.recipient(to)];
        let reservation = Reservation::overflow(&self.inner.items);

        Box::pin(self.enqueue("", recipients, bounce.into(), reservation))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.items.lock().map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn contains(&self, id: &ItemId) -> bool {
        self.inner.items.lock().map.contains_key(id)
    }

    /// Number of records waiting for their deletion to be retried
    #[must_use]
    pub fn pending_cleanup(&self) -> usize {
        self.inner.cleanup.len()
    }

    /// Current state of one item
    pub async fn get(&self, id: &ItemId) -> Option<Message> {
        let item = self.inner.items.lock().map.get(id).cloned()?;
        let state = item.lock().await;

        Some(item.snapshot(&state))
    }

    /// Current state of every item, oldest first
    pub async fn snapshot(&self) -> Vec<Message> {
        let mut items: Vec<Arc<Item>> = self.inner.items.lock().map.values().cloned().collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));

        let mut messages = Vec::with_capacity(items.len());
        for item in items {
            let state = item.lock().await;
            messages.push(item.snapshot(&state));
        }

        messages
    }

    /// Human readable listing of every item and recipient
    pub async fn dump(&self) -> String {
        describe(&self.snapshot().await, SystemTime::now())
    }
}

/// Render queued messages the way `hermod list` and [`Queue::dump`] show them
#[must_use]
pub fn describe(messages: &[Message], now: SystemTime) -> String {
    let mut out = String::new();

    for message in messages {
        let age = now
            .duration_since(message.created_at)
            .unwrap_or_default()
            .as_secs();

        let _ = writeln!(
            out,
            "{} from <{}>, {} bytes, queued {age}s ago",
            message.id,
            message.from,
            message.data.len()
        );

        for recipient in &message.recipients {
            let _ = write!(
                out,
                "  {:<8} {:<6} {} (attempts: {})",
                recipient.status.to_string(),
                recipient.kind.to_string(),
                recipient.original_address.trim(),
                recipient.attempts
            );

            if let Some(at) = recipient.next_retry_at {
                let wait = at.duration_since(now).unwrap_or_default().as_secs();
                let _ = write!(out, ", next attempt in {wait}s");
            }
            if let Some(failure) = &recipient.last_failure {
                let _ = write!(out, ", last failure: {failure}");
            }

            out.push('\n');
        }
    }

    out
}
