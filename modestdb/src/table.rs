// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! In-memory table and column descriptors.

use rowcodec::{ColumnType, RecordLayout};

/// The 5-bit constraint mask stored in a column's `COLUMN_CONSTRAINTS` cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Constraints(u8);

impl Constraints {
	pub const PRIMARY_KEY: Constraints = Constraints(1);
	pub const FOREIGN_KEY: Constraints = Constraints(1 << 1);
	pub const AUTOINCREMENT: Constraints = Constraints(1 << 2);
	pub const NOT_NULL: Constraints = Constraints(1 << 3);
	pub const DEFAULT_VALUE: Constraints = Constraints(1 << 4);

	pub fn none() -> Constraints {
		Constraints(0)
	}

	pub fn from_bits(bits: u8) -> Constraints {
		Constraints(bits & 0x1f)
	}

	pub fn bits(self) -> u8 {
		self.0
	}

	#[must_use]
	pub fn with(self, other: Constraints) -> Constraints {
		Constraints(self.0 | other.0)
	}

	pub fn has(self, other: Constraints) -> bool {
		self.0 & other.0 != 0
	}
}

/// One column of a table. Columns carry their owning table's id rather
/// than a back-pointer; qualified names are derived by the table.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
	pub id: i64,
	pub table_id: i64,
	/// Dense position within the table, `0..k`; doubles as the record
	/// cell index and the null-bitmap bit index.
	pub position: i64,
	pub kind: ColumnType,
	/// Last value handed out by AUTOINCREMENT; written through to the
	/// catalog on every increment.
	pub counter: i64,
	pub constraints: Constraints,
	/// `VALUE_ID` of the stored default, 0 when the column has none.
	pub default_id: i64,
	pub name: String,
}

impl Column {
	pub fn not_null(&self) -> bool {
		self.constraints.has(Constraints::NOT_NULL)
	}

	pub fn autoincrement(&self) -> bool {
		self.constraints.has(Constraints::AUTOINCREMENT)
	}

	pub fn primary_key(&self) -> bool {
		self.constraints.has(Constraints::PRIMARY_KEY)
	}

	pub fn has_default(&self) -> bool {
		self.constraints.has(Constraints::DEFAULT_VALUE)
	}
}

/// In-memory view of one table: identity, storage root, and the columns
/// ordered by position. The column order is the record layout.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
	pub id: i64,
	/// Normalized (upper-case) name.
	pub name: String,
	/// Address of the first block of the table's record chain.
	pub first_block: u64,
	pub columns: Vec<Column>,
}

impl Table {
	/// The record layout shared by every row of this table.
	pub fn layout(&self) -> RecordLayout {
		RecordLayout::new(self.columns.iter().map(|c| c.kind).collect())
	}

	/// Finds a column by its normalized bare name.
	pub fn column(&self, name: &str) -> Option<(usize, &Column)> {
		self.columns.iter().enumerate().find(|(_, c)| c.name == name)
	}

	/// The `TABLE.COLUMN` key this column gets in scanned tuples.
	pub fn qualified(&self, column: &Column) -> String {
		format!("{}.{}", self.name, column.name)
	}
}
