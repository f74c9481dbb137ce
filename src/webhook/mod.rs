//! Outbound webhooks.
//!
//! Both channels are fire-and-forget: one POST, no retry, and only a 2xx
//! response counts as delivered. Callers log failures and move on.

pub mod alarm;
pub mod mailing;

pub use alarm::{AlarmNotifier, LogOnlyNotifier, WebhookAlarmNotifier};
pub use mailing::{DisabledMailingList, MailingList, WebhookMailingList, is_valid_email};
