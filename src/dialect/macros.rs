//! Dialect dispatch macro.
//!
//! Expands to a `match` over every `AnyDialect` variant so that forwarding methods
//! stay one line each.

/// Forward an expression to whichever dialect an `AnyDialect` holds.
///
/// # Example
///
/// ```ignore
/// dispatch_dialect!(self, d => d.quote_identifier(name))
/// ```
#[macro_export]
macro_rules! dispatch_dialect {
    ($dialect:expr, $d:ident => $body:expr) => {
        match $dialect {
            $crate::dialect::AnyDialect::Sqlite($d) => $body,
            $crate::dialect::AnyDialect::SqliteProvider($d) => $body,
            $crate::dialect::AnyDialect::MySql($d) => $body,
        }
    };
}

pub use dispatch_dialect;
