//! AIDE event notifier
//!
//! Typed, fire-and-forget notifications (`ai.*`, `fs.diffValidated`,
//! `apply.progress`, `build.status`, `error`) fanned out to every live
//! subscriber. There is no replay and no delivery guarantee; within one
//! subscriber events arrive in emission order.
//!
//! ```rust,ignore
//! use aide_events::{EventNotifier, EventPayload};
//!
//! let notifier = EventNotifier::default();
//! let mut sub = notifier.subscribe();
//! notifier.emit(&correlation_id, EventPayload::completed(txn_id));
//! let event = sub.recv().await;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod event;
mod notifier;

pub use event::{BuildState, Event, EventPayload};
pub use notifier::{EventNotifier, Subscription, DEFAULT_SUBSCRIBER_BUFFER};
