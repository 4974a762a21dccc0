//! Real-time change notification
//!
//! The local store publishes one [`ChangeEvent`](crate::shared::ChangeEvent)
//! per applied mutation through a [`ChangeBus`]; UI components subscribe per
//! entity type on mount and unsubscribe on unmount.

pub mod bus;

pub use bus::{ChangeBus, ChangeHandler, Delivery, SubscriptionHandle};
