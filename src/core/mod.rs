//! Core dataflow logic — registry, path expansion, resolution, parsing.

pub mod driver;
pub mod engine;
pub mod error;
pub mod expander;
pub mod namespace;
pub mod parser;
pub mod registry;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;
