//! Argument tokenizing and binding.
//!
//! Argument text (whatever follows the matched trigger) is split by
//! [`tokenize`], then [`bind`] walks the descriptor's parameters in order and
//! converts tokens through the [`ResolverRegistry`]. The result is a
//! [`BoundArgs`] queue that the handler's value extractors drain.

mod binder;
mod resolver;
mod tokenize;
mod value;

pub use binder::bind;
pub use resolver::{ArgResolver, ResolverRegistry};
pub use tokenize::tokenize;
pub use value::{ArgValue, BoundArgs, FromArgValue};
