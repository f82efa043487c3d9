//! Concrete implementations of the traits in [`crate::traits`].
//!
//! # Available Implementations
//!
//! - `mock`: Test doubles for desktop development
//!
//! The production switch lives in [`crate::switch`] and the broker client in
//! `services::mqtt` (requires the `mqtt` feature).

pub mod mock;

pub use mock::*;
