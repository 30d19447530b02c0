use std::fmt;

use crate::common::Result;

type Thunk<'a> = Box<dyn FnOnce() -> Result<()> + Send + 'a>;

/// A planned change: a message for the operator plus, unless it is purely
/// informational, the operation that performs it.
pub struct Correction<'a> {
    pub msg: String,
    f: Option<Thunk<'a>>,
}

impl<'a> Correction<'a> {
    pub fn new(msg: impl Into<String>, f: impl FnOnce() -> Result<()> + Send + 'a) -> Self {
        Self {
            msg: msg.into(),
            f: Some(Box::new(f)),
        }
    }

    /// A correction that only reports something and changes nothing.
    pub fn report(msg: impl Into<String>) -> Self {
        Self {
            msg: msg.into(),
            f: None,
        }
    }

    pub fn is_report(&self) -> bool {
        self.f.is_none()
    }

    /// Performs the correction. Reports succeed without doing anything.
    pub fn run(self) -> Result<()> {
        match self.f {
            Some(f) => f(),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Correction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Correction")
            .field("msg", &self.msg)
            .field("report", &self.is_report())
            .finish()
    }
}
