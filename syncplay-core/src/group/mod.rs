//! The per-group coordinator: state machine, membership, and dispatch.

pub mod controller;
pub mod state;

pub use controller::GroupController;
pub use state::{GroupStateKind, Visibility};
