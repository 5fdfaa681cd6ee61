// src/dispatch/mod.rs

//! Event delivery.
//!
//! - [`dispatcher`] expands a bitmask into named events and applies the
//!   posting policy: the delegate gets every event when one is set; the
//!   broadcast sink gets it when no delegate is set or when
//!   `always_post_notifications` is on.
//! - [`notification`] defines the broadcast payload, the sink trait and the
//!   `tokio::sync::broadcast` backed [`NotificationCenter`].

pub mod dispatcher;
pub mod notification;

pub use dispatcher::{Dispatcher, EventDelegate};
pub use notification::{
    DEFAULT_BROADCAST_CAPACITY, Notification, NotificationCenter, NotificationSink,
};
