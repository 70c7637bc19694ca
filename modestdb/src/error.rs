// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::{error, fmt, result};

use rowcodec::Value;

/// Engine error.
///
/// Value-level validation always happens before any block is written, so a
/// constraint variant implies the operation left no trace on disk. A
/// `Storage` error surfaced mid-operation may leave partial writes behind;
/// crash safety is out of scope.
#[derive(Debug)]
pub enum Error {
	/// Underlying block-file failure.
	Storage(blockfile::Error),
	/// No table with this name.
	UnknownTable(String),
	/// Table has no column with this name.
	UnknownColumn(String, String),
	/// A table with this name already exists.
	DuplicateTable(String),
	/// The definition lists this column name twice.
	DuplicateColumn(String, String),
	/// Value does not fit the column's declared type (column, expected, got).
	TypeMismatch(String, &'static str, &'static str),
	/// Char payload longer than the column's width (column, max).
	CharTooLong(String, usize),
	/// The table's record does not fit a block body.
	RecordTooLarge(String),
	/// NULL arrived at a NOT NULL column without a default.
	NotNullViolation(String),
	/// Inserted primary-key value already present (column, value).
	DuplicatePrimaryKey(String, Value),
	/// A host-supplied expression failed or returned the wrong type.
	Expression(String),
}

/// Engine result.
pub type Result<T> = result::Result<T, Error>;

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Error::Storage(err) => write!(f, "storage error: {}", err),
			Error::UnknownTable(table) => write!(f, "unknown table {}", table),
			Error::UnknownColumn(table, column) => write!(f, "table {} has no column {}", table, column),
			Error::DuplicateTable(table) => write!(f, "table {} already exists", table),
			Error::DuplicateColumn(table, column) => write!(f, "duplicate column {} in table {}", column, table),
			Error::TypeMismatch(column, expected, got) => {
				write!(f, "column {} expects {}, got {}", column, expected, got)
			}
			Error::CharTooLong(column, max) => write!(f, "char value for {} exceeds {} bytes", column, max),
			Error::RecordTooLarge(table) => write!(f, "record of table {} does not fit a block", table),
			Error::NotNullViolation(column) => write!(f, "column {} is NOT NULL", column),
			Error::DuplicatePrimaryKey(column, value) => {
				write!(f, "duplicate primary key {} for column {}", value, column)
			}
			Error::Expression(reason) => write!(f, "expression error: {}", reason),
		}
	}
}

impl error::Error for Error {
	fn source(&self) -> Option<&(dyn error::Error + 'static)> {
		match self {
			Error::Storage(err) => Some(err),
			_ => None,
		}
	}
}

impl From<blockfile::Error> for Error {
	fn from(err: blockfile::Error) -> Error {
		Error::Storage(err)
	}
}
