// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Single-file relational storage engine.
//!
//! One fixed-block-size file holds everything: a header, a free-block
//! list, four system tables describing the schema, and every user table's
//! rows in chains of record blocks. The engine exposes a small relational
//! API — create/drop table, insert, update, delete, and select with joins
//! and filters — to a host that parses SQL (or anything else) into the
//! command objects of [`command`].
//!
//! ```no_run
//! use modestdb::{ColumnDefinition, ColumnType, Registry, SelectCommand, Value};
//!
//! let registry = Registry::new();
//! let db = registry.create("movies.db", 4096)?;
//! db.new_table(
//! 	"movies",
//! 	&[
//! 		ColumnDefinition::new("id_movie", ColumnType::Integer).primary_key(),
//! 		ColumnDefinition::new("title", ColumnType::Char(32)),
//! 	],
//! )?;
//! db.insert("movies", &[("id_movie", Value::Integer(1)), ("title", Value::Char(b"Avengers".to_vec()))])?;
//! let rows = db.select(&SelectCommand::all("movies"))?;
//! assert_eq!(rows.len(), 1);
//! # Ok::<(), modestdb::Error>(())
//! ```

mod catalog;
mod command;
mod database;
mod error;
mod ops;
mod store;
mod table;

pub use self::{
	catalog::{MAX_CHAR, MAX_NAME},
	command::{ColumnDefinition, Expression, JoinClause, SelectCommand, UpdateCommand},
	database::{Database, Registry},
	error::{Error, Result},
	ops::{join, join_by_attribute, merge_tuples, projection, selection, Set, Tuple},
	table::{Column, Constraints, Table},
};

pub use rowcodec::{ColumnType, Value};
