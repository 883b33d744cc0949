//! Subscription entitlement rules.

use crate::domain::model::{Subscription, SubscriptionStatus};
use chrono::{DateTime, Duration, Utc};

/// Days of continued access after a failed renewal.
pub const PAST_DUE_GRACE_DAYS: i64 = 3;

/// Whether the subscription currently grants access.
pub fn is_entitled(sub: &Subscription, now: DateTime<Utc>) -> bool {
    let end = sub.current_period_end;
    match sub.status {
        SubscriptionStatus::Trialing | SubscriptionStatus::Active => now < end,
        SubscriptionStatus::Canceled => sub.cancel_at_period_end && now < end,
        SubscriptionStatus::PastDue => now < end + Duration::days(PAST_DUE_GRACE_DAYS),
        SubscriptionStatus::Expired => false,
    }
}
