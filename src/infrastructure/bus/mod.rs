//! Message bus seam: the signing protocol and the vote ledger ride on topics of an external broker.

pub mod memory;
pub mod traits;

pub use memory::MemoryBus;
pub use traits::*;
