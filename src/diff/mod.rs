//! Reconciliation of existing and desired records into ordered changes.

mod change;
mod compare;
mod engine;

pub use change::{Change, Verb};
pub use engine::Differ;
