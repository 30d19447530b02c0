mod dsl;
mod formats;
mod parser;
mod pretty;
mod sorting;
mod tokenizer;

pub use dsl::{parse_dsl, parse_dsl_file};
pub use formats::*;
pub use parser::*;
pub use pretty::{most_common_ttl, write_zone_file, PrettyZone};
pub use sorting::*;
