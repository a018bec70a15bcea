//! Realtime Merge Engine.
//!
//! Turns change-feed events into store updates. See [`merge`] for the
//! per-event rules.

pub mod event;
pub mod merge;
pub mod parked;
pub mod reconcile;
pub mod subscription;

pub use event::{Change, ChangeEvent, ChangeKind, MergeError};
pub use merge::{IgnoreReason, MergeOutcome, apply_change, fold, fold_deliverable, overlay};
pub use parked::ParkedEvents;
pub use reconcile::reconcile_order;
pub use subscription::{BoardFeed, Subscription};
