//! Compile JSON schemas into reusable validators.
//!
//! A schema is compiled once with [`compile`]; the resulting [`Validator`]
//! checks any number of instances and can also [build][`Validator::build`]
//! values from the defaults the schema declares.

mod compile;
mod defaults;
mod equal;
mod format;
mod keyword;
mod options;
mod resolve;
mod validate;

pub use compile::SetupError;
pub use defaults::BuildOptions;
pub use equal::{equal, find_index, unique};
pub use format::{Format, FormatRegistry};
pub use keyword::Keyword;
pub use options::Options;
pub use resolve::{resolve_pointer, PointerError, ResolveError};
pub use validate::{compile, ValidationError, Validator};
