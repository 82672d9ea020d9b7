//! dynbit maps models onto a [Redb](https://github.com/cberner/redb) backed key/value store
//! with Redis like field types: strings, per instance hash slots, hashes, sets, lists and
//! sorted sets.
//!
//! On top of static fields it provides dynamic fields, where one declaration expands at
//! runtime into a family of concrete fields (`tags_{movie}`), and relation fields whose
//! reverse collections are derived from equality indexes on the forward side.
//!

pub mod collection;
pub mod db;
pub mod dynamic;
pub mod error;
pub mod field;
pub mod logger;
pub mod model;
pub mod related;
pub mod settings;
pub mod storage;

pub use chrono;
pub use inventory;
pub use once_cell;
pub use rand;
pub use redb;
pub use serde;

pub use collection::Collection;
pub use db::Db;
pub use dynamic::grammar::NameGrammar;
pub use error::AppError;
pub use field::command::{Command, Reply};
pub use field::kind::FieldKind;
pub use field::{Field, FieldDescriptor, Relation};
pub use logger::LogLevel;
pub use model::builder::{FieldDecl, ModelBuilder, PkSpec, SELF};
pub use model::instance::Instance;
pub use model::registry::{ModelInfo, Registry, RegistryBuilder, ReverseRef};
pub use model::value::FieldValue;
pub use model::{Model, ModelDef};
pub use related::dynamic::DynamicReverseCollection;
pub use related::{ReverseCollection, ReverseStrategy};
pub use settings::AppConfig;
pub use storage::Storage;
