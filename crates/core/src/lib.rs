//! Shared primitives for the shanty audio-queue service.
//!
//! Pure types and functions with no I/O, used by every other crate.

pub mod error;
pub mod humanize;
pub mod reference;
pub mod types;
