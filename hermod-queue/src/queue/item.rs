use std::{sync::Arc, time::SystemTime};

use hermod_common::{ItemId, Message, Recipient, RecipientKind, RecipientStatus};
use hermod_courier::DeliveryError;
use tokio::sync::{Mutex, MutexGuard};

use crate::RetryPolicy;

/// One queued message while it is resident in memory
///
/// The envelope and payload never change. Everything that does lives in
/// [`ItemState`] behind an async mutex, which is held across the record
/// write so that updates to one item reach the store in order.
#[derive(Debug)]
pub(crate) struct Item {
    pub id: ItemId,
    pub from: String,
    pub created_at: SystemTime,
    pub data: Arc<[u8]>,
    state: Mutex<ItemState>,
}

#[derive(Debug)]
pub(crate) struct ItemState {
    pub recipients: Vec<Recipient>,
    /// Parallel to `recipients`: an attempt is currently running
    pub in_flight: Vec<bool>,
    /// The last record write failed; the store is behind memory
    pub dirty: bool,
    /// Every recipient is terminal and the item was handed off for removal
    pub resolved: bool,
    /// Removed from the queue; nothing may write its record again
    pub removed: bool,
}

/// A recipient handed to a delivery task
#[derive(Debug, Clone)]
pub(crate) struct Claim {
    pub index: usize,
    pub address: String,
    pub kind: RecipientKind,
}

impl Item {
    pub fn new(message: Message) -> Self {
        let in_flight = vec![false; message.recipients.len()];

        Self {
            id: message.id,
            from: message.from,
            created_at: message.created_at,
            data: message.data,
            state: Mutex::new(ItemState {
                recipients: message.recipients,
                in_flight,
                dirty: false,
                resolved: false,
                removed: false,
            }),
        }
    }

    pub async fn lock(&self) -> MutexGuard<'_, ItemState> {
        self.state.lock().await
    }

    /// The persisted form of this item in `state`
    pub fn snapshot(&self, state: &ItemState) -> Message {
        Message {
            id: self.id.clone(),
            from: self.from.clone(),
            created_at: self.created_at,
            data: Arc::clone(&self.data),
            recipients: state.recipients.clone(),
        }
    }
}

impl ItemState {
    /// Mark every recipient that is due at `now` as in flight
    pub fn claim_due(&mut self, now: SystemTime) -> Vec<Claim> {
        let mut claims = Vec::new();

        for (index, recipient) in self.recipients.iter().enumerate() {
            let due = recipient.next_retry_at.is_none_or(|at| at <= now);
            if recipient.is_terminal() || self.in_flight[index] || !due {
                continue;
            }

            self.in_flight[index] = true;
            claims.push(Claim {
                index,
                address: recipient.address.clone(),
                kind: recipient.kind,
            });
        }

        claims
    }

    pub fn release(&mut self, index: usize) {
        if let Some(flag) = self.in_flight.get_mut(index) {
            *flag = false;
        }
    }

    /// Fail every pending recipient that is not being attempted right now
    pub fn expire(&mut self, reason: &str) -> usize {
        let mut expired = 0;

        for (recipient, in_flight) in self.recipients.iter_mut().zip(&self.in_flight) {
            if recipient.is_terminal() || *in_flight {
                continue;
            }

            recipient.status = RecipientStatus::Failure;
            recipient.last_failure = Some(reason.to_string());
            recipient.next_retry_at = None;
            recipient.expired = true;
            expired += 1;
        }

        expired
    }

    /// Apply a courier's verdict to the recipient at `index`.
    ///
    /// Success and permanent failures are final. Any other failure leaves
    /// the recipient pending with a backoff, unless the policy's attempt
    /// limit has been reached.
    pub fn record_result(
        &mut self,
        index: usize,
        result: Result<(), DeliveryError>,
        policy: &RetryPolicy,
        now: SystemTime,
    ) {
        let Some(recipient) = self.recipients.get_mut(index) else {
            return;
        };
        if recipient.is_terminal() {
            return;
        }

        recipient.attempts = recipient.attempts.saturating_add(1);
        recipient.next_retry_at = None;

        match result {
            Ok(()) => recipient.status = RecipientStatus::Success,
            Err(err) if err.is_permanent() => {
                recipient.status = RecipientStatus::Failure;
                recipient.last_failure = Some(err.to_string());
            }
            Err(err) if policy.should_retry(recipient.attempts) => {
                recipient.last_failure = Some(err.to_string());
                recipient.next_retry_at =
                    Some(policy.calculate_next_retry(recipient.attempts, now));
            }
            Err(err) => {
                recipient.status = RecipientStatus::Failure;
                recipient.last_failure = Some(format!(
                    "{err} (gave up after {} attempts)",
                    recipient.attempts
                ));
            }
        }
    }

    /// True exactly once: the first time every recipient is terminal
    pub fn take_resolved(&mut self) -> bool {
        if self.resolved || !self.recipients.iter().all(Recipient::is_terminal) {
            return false;
        }

        self.resolved = true;
        true
    }
}
