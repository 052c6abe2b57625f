//! Cross-reference graph: definition index, reference resolution and
//! context expansion over a built generation.
pub mod definitions;
pub mod expander;
pub mod resolver;
