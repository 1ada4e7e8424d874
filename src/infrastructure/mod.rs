//! Infrastructure layer: I/O and external integrations.

pub mod auth;
pub mod bus;
pub mod codec;
pub mod config;
pub mod logging;
pub mod rpc;
pub mod storage;
