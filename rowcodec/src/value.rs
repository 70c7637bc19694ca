// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Typed cell values and their fixed-width encodings.

use std::fmt;

use bytes::{Buf, BufMut};

/// A column's declared type. `Char` carries its fixed byte width.
///
/// The numeric tag stored in the catalog follows the declaration order
/// below, starting at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
	Integer,
	Float,
	Datetime,
	Boolean,
	Char(usize),
}

impl ColumnType {
	/// Catalog tag of this type.
	pub fn type_id(self) -> u8 {
		match self {
			ColumnType::Integer => 0,
			ColumnType::Float => 1,
			ColumnType::Datetime => 2,
			ColumnType::Boolean => 3,
			ColumnType::Char(_) => 4,
		}
	}

	/// Rebuilds a type from its catalog tag and size cell.
	pub fn from_parts(type_id: u8, size: usize) -> Option<ColumnType> {
		match type_id {
			0 => Some(ColumnType::Integer),
			1 => Some(ColumnType::Float),
			2 => Some(ColumnType::Datetime),
			3 => Some(ColumnType::Boolean),
			4 => Some(ColumnType::Char(size)),
			_ => None,
		}
	}

	/// Encoded width of a cell of this type, in bytes.
	pub fn width(self) -> usize {
		match self {
			ColumnType::Integer | ColumnType::Float | ColumnType::Datetime => 8,
			ColumnType::Boolean => 1,
			ColumnType::Char(size) => size,
		}
	}

	pub fn name(self) -> &'static str {
		match self {
			ColumnType::Integer => "INTEGER",
			ColumnType::Float => "FLOAT",
			ColumnType::Datetime => "DATETIME",
			ColumnType::Boolean => "BOOLEAN",
			ColumnType::Char(_) => "CHAR",
		}
	}
}

/// A single cell value.
///
/// `Datetime` is an opaque epoch tick; the engine never interprets it.
/// `Char` holds the logical bytes with trailing NULs already stripped.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
	Integer(i64),
	Float(f64),
	Datetime(i64),
	Boolean(bool),
	Char(Vec<u8>),
	Null,
}

impl Value {
	pub fn is_null(&self) -> bool {
		matches!(self, Value::Null)
	}

	/// Name of the value's runtime type, for diagnostics.
	pub fn type_name(&self) -> &'static str {
		match self {
			Value::Integer(_) => "INTEGER",
			Value::Float(_) => "FLOAT",
			Value::Datetime(_) => "DATETIME",
			Value::Boolean(_) => "BOOLEAN",
			Value::Char(_) => "CHAR",
			Value::Null => "NULL",
		}
	}

	/// Appends the fixed-width encoding of this value as a cell of type
	/// `ty`. `Null` encodes as all zeroes; the null bitmap is what makes a
	/// cell NULL, not its payload.
	///
	/// Panics if the value does not match `ty` or a char payload exceeds
	/// the declared width. Callers coerce first.
	pub fn encode(&self, ty: ColumnType, out: &mut impl BufMut) {
		match (ty, self) {
			(ColumnType::Integer, Value::Integer(v)) => out.put_i64_le(*v),
			(ColumnType::Float, Value::Float(v)) => out.put_u64_le(v.to_bits()),
			(ColumnType::Datetime, Value::Datetime(v)) => out.put_i64_le(*v),
			(ColumnType::Boolean, Value::Boolean(v)) => out.put_u8(*v as u8),
			(ColumnType::Char(size), Value::Char(bytes)) => {
				assert!(bytes.len() <= size, "char payload exceeds declared width");
				out.put_slice(bytes);
				out.put_bytes(0, size - bytes.len());
			}
			(_, Value::Null) => out.put_bytes(0, ty.width()),
			(ty, value) => panic!("cell value {} does not fit column type {}", value.type_name(), ty.name()),
		}
	}

	/// Decodes a cell of type `ty` from its exact-width slice. Trailing
	/// NULs of char cells are stripped.
	pub fn decode(ty: ColumnType, mut cell: &[u8]) -> Value {
		assert_eq!(cell.len(), ty.width(), "cell slice does not match column width");
		match ty {
			ColumnType::Integer => Value::Integer(cell.get_i64_le()),
			ColumnType::Float => Value::Float(f64::from_bits(cell.get_u64_le())),
			ColumnType::Datetime => Value::Datetime(cell.get_i64_le()),
			ColumnType::Boolean => Value::Boolean(cell.get_u8() != 0),
			ColumnType::Char(_) => {
				let logical = cell.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
				Value::Char(cell[..logical].to_vec())
			}
		}
	}
}

impl fmt::Display for Value {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Value::Integer(v) => write!(f, "{}", v),
			Value::Float(v) => write!(f, "{}", v),
			Value::Datetime(v) => write!(f, "{}", v),
			Value::Boolean(v) => write!(f, "{}", v),
			Value::Char(bytes) => write!(f, "{}", String::from_utf8_lossy(bytes)),
			Value::Null => write!(f, "NULL"),
		}
	}
}
