//! Utility types used throughout the Harrow toolkit.
//!
//! This module provides:
//! - [`Rng`] - Seedable random number generation

mod rng;

pub use self::rng::Rng;
