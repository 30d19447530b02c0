//! Rule based validation of desired records, run before any change is
//! planned.

mod auditor;
mod rejectif;

pub use auditor::*;
pub use rejectif::*;
