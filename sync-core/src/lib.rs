//! # sync-core
//!
//! Pure logic for chatsync (no I/O, instant tests).
//!
//! This crate implements the merge policy, ordering rules and state machines
//! of the synchronization engine without any network or disk I/O.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. This enables:
//! - Instant unit tests (no mocks, no async)
//! - Deterministic behavior (same input → same output)
//! - Easy reasoning about state transitions
//!
//! The actual I/O (remote calls, local store, event stream) is performed by
//! `sync-client`, which interprets the actions produced here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod generation;
pub mod ordering;
pub mod plan;
pub mod sections;
pub mod subscription;

pub use generation::{FetchGenerations, FetchKey, Ticket};
pub use ordering::{compare_by_activity, is_newer, is_sorted_by_activity, newest_message, sort_channels};
pub use plan::{plan_event, plan_send_confirmed, plan_user_delete, SyncAction};
pub use sections::{group_by_day, DaySection};
pub use subscription::{ReconnectPolicy, SubscriptionAction, SubscriptionEvent, SubscriptionState};
