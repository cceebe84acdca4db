use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A subscription recorded locally after the processor accepted it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Local key of the owning customer.
    pub customer: u32,
    pub name: String,
    /// The processor's subscription id.
    pub stripe_id: String,
    pub plan: String,
    pub quantity: u32,
    pub trial_ends_at: Option<DateTime<Utc>>,
    /// Unset until the subscription is canceled.
    pub ends_at: Option<DateTime<Utc>>,
}

impl Subscription {
    pub fn on_trial(&self, now: DateTime<Utc>) -> bool {
        self.trial_ends_at.is_some_and(|ends| ends > now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialEnd {
    /// End any trial immediately.
    Now,
    At(DateTime<Utc>),
}

/// Payload sent to the processor when creating a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRequest {
    pub plan: String,
    pub quantity: u32,
    pub trial_end: Option<TrialEnd>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSubscription {
    pub id: String,
    pub status: String,
}
