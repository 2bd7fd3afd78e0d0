//! Name registration and resolution for hosted components.

pub(crate) mod factory;
pub(crate) mod symbols;

pub use factory::{Component, ComponentArgs, ComponentFactory, ComponentRegistry};
pub use symbols::{Registration, SymbolTable, basename_with_generation, name_from_basename};
