//! Foundation layer: shared primitives grouped for the layered architecture.

pub mod constants;
pub mod error;
pub mod types;
pub mod util;

pub use constants::*;
pub use error::*;
pub use types::*;
pub use util::duration::IsoDuration;
pub use util::time::{now_nanos, now_utc};
