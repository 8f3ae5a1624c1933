//! `impl` blocks of the registry store traits for [`Database`](super::Database),
//! one file per registry.

mod identity;
mod reputation;
mod validation;
