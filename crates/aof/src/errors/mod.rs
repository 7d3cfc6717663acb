//! Error handling for the persistence layer
//!
//! Every failure is returned as a typed [`AofError`] carrying a
//! [`RecoveryHint`]; nothing in this crate terminates the process.

mod recovery;
mod types;

pub use types::*;
