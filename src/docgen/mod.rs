//! Component documentation support.
//!
//! The docgen parsers themselves live in the bundler; this module resolves
//! the module requests they follow so component sources can be attached to
//! index entries.

mod resolve;

pub use resolve::{RESOLVE_EXTENSIONS, ResolveError, lookup_module};
