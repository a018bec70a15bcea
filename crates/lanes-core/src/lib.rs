//! lanes-core library.
//!
//! The client-side core of a kanban board: an ordered entity model, a
//! realtime merge engine, a drag reorder engine and an optimistic mutation
//! gateway, tied together by [`board::Board`].
//!
//! # Conventions
//!
//! - **Errors**: `thiserror` enums per concern, folded into
//!   [`error::BoardError`]; every error maps to a stable
//!   [`error::ErrorCode`].
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod board;
pub mod config;
pub mod drag;
pub mod error;
pub mod gateway;
pub mod graph;
pub mod model;
pub mod priority;
pub mod realtime;
pub mod storage;
pub mod store;
pub mod tools;

pub use board::Board;
pub use error::{BoardError, ErrorCode};
pub use store::BoardStore;
