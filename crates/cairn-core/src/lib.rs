//! CAIRN core primitives: digest algorithms, content-addressed keys, the
//! shared error taxonomy, retry policy, and replayable byte sources.

#![deny(unsafe_code)]

pub mod digest;
pub mod error;
pub mod retry;
pub mod source;

/// Version of the core library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
