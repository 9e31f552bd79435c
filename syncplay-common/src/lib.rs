//! # syncplay-common
//!
//! Small primitives shared by the SyncPlay coordinator: a centralized
//! clock abstraction and tick/millisecond conversions.

pub mod error;
pub mod ticks;
pub mod time;

pub use error::{Error, Result};
pub use time::{Clock, SystemClock};
