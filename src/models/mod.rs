//! Bundled demo models

pub mod die_hard;
pub mod token_ring;

pub use die_hard::{DieHard, Jugs};
pub use token_ring::{Ring, TokenRing, PEAK_REQUESTS_SLOT};
