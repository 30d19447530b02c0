mod correction;
mod domain;
mod normalize;
mod record;
mod records;
mod rtype;
mod target;
pub mod txt;

pub use correction::*;
pub use domain::*;
pub use normalize::*;
pub use record::*;
pub use records::*;
pub use rtype::*;
pub use target::qualify;
