//! Dynamic fields: a declared base expands at runtime into concrete variants named by
//! the base's [`grammar::NameGrammar`], one per variable part.

pub mod field;
pub mod grammar;
pub mod inventory;
pub mod resolve;
