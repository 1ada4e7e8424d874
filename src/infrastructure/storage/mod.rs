#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
#[cfg(any(test, feature = "test-utils"))]
pub use memory::MemoryStorage;
pub mod rocks;
pub mod traits;

pub use rocks::RocksStorage;
pub use traits::*;
