//! Bht module
//!
//! The verification engine: lazily populated levels of hash entries,
//! verified bottom-up against a trusted root digest and memoised per entry.

mod core;
mod digest;
mod populate;
mod verify;


// Re-export public API
pub use self::core::Bht;
