//! Compiles DQQL filter expressions into PostgreSQL queries over a tagged entity store.
//!
//! A filter such as `equip->ahu and temp > 72.5` selects entities by the tags they carry,
//! the typed values of those tags, and the entities those values reference. Compilation
//! yields one query returning every matching entity visible to the requesting user.
//!
//! ```no_run
//! use dqql_db::{CompilerConfig, FilterQueryBuilder, TagProjection, Tenant};
//!
//! let config = CompilerConfig::load("dqql.toml")?;
//! let query = FilterQueryBuilder::new(&config)
//!     .compile("site and temp > 72.5", Tenant::new(1, 7), &TagProjection::None)?;
//! let (sql, values) = query.build();
//! # Ok::<(), miette::Report>(())
//! ```

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod value_type;

pub mod hierarchy;
pub mod comparison;
pub mod name_query;
pub mod path_query;
pub mod expr_to_query;
pub mod security;

pub mod config;
pub mod query_builder;
pub mod sea_query_extra;
pub mod sql_common;

pub use config::{CompilerConfig, ConfigError, ValueTable, ValueTableRegistry};
pub use expr_to_query::CompileError;
pub use hierarchy::AncestorSource;
pub use parser::{parse, ParseError};
pub use query_builder::{
    CompiledQuery, ErrorKind, FilterQueryBuilder, QueryBuilderError, TagProjection,
};
pub use security::Tenant;
pub use sql_common::DbSchema;
pub use value_type::TypeError;
