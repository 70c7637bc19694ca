// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The catalog: four built-in system tables describing user tables,
//! their columns, and literal default values.
//!
//! The catalog stores its rows through the same record-block protocol as
//! user data; only its own schemas are hard-coded, built in memory at
//! startup. The four record blocks sit at addresses 2 to 5, right after
//! the header block.

use blockfile::BlockFile;
use rowcodec::{ColumnType, Value};

use crate::{
	ops::join_by_attribute,
	store::{scan, RecordChain},
	table::{Column, Constraints, Table},
	Error, Result,
};

pub(crate) const SYS_TABLES_ID: i64 = 0;
pub(crate) const SYS_COLUMNS_ID: i64 = 1;
pub(crate) const SYS_DEFAULT_NUMERICS_ID: i64 = 2;
pub(crate) const SYS_DEFAULT_CHARS_ID: i64 = 3;

pub(crate) const SYS_TABLES_BLOCK: u64 = 2;
pub(crate) const SYS_COLUMNS_BLOCK: u64 = 3;
pub(crate) const SYS_DEFAULT_NUMERICS_BLOCK: u64 = 4;
pub(crate) const SYS_DEFAULT_CHARS_BLOCK: u64 = 5;

/// Longest table or column name, in bytes.
pub const MAX_NAME: usize = 60;

/// Widest char payload the default-value store holds.
pub const MAX_CHAR: usize = 255;

/// Cell index of `COLUMN_COUNTER` within a `SYS_COLUMNS` row.
const COUNTER_CELL: usize = 5;

fn sys_column(table_id: i64, id: i64, kind: ColumnType, name: &str) -> Column {
	Column {
		id,
		table_id,
		position: id,
		kind,
		counter: 0,
		constraints: Constraints::none(),
		default_id: 0,
		name: name.into(),
	}
}

pub(crate) fn sys_tables() -> Table {
	let column = |id, kind, name| sys_column(SYS_TABLES_ID, id, kind, name);
	Table {
		id: SYS_TABLES_ID,
		name: "SYS_TABLES".into(),
		first_block: SYS_TABLES_BLOCK,
		columns: vec![
			column(0, ColumnType::Integer, "TABLE_ID"),
			column(1, ColumnType::Integer, "FIRST_RECORD_BLOCK"),
			column(2, ColumnType::Char(MAX_NAME), "TABLE_NAME"),
		],
	}
}

pub(crate) fn sys_columns() -> Table {
	let column = |id, kind, name| sys_column(SYS_COLUMNS_ID, id, kind, name);
	Table {
		id: SYS_COLUMNS_ID,
		name: "SYS_COLUMNS".into(),
		first_block: SYS_COLUMNS_BLOCK,
		columns: vec![
			column(0, ColumnType::Integer, "COLUMN_ID"),
			column(1, ColumnType::Integer, "TABLE_ID"),
			column(2, ColumnType::Integer, "COLUMN_POSITION"),
			column(3, ColumnType::Integer, "COLUMN_TYPE"),
			column(4, ColumnType::Integer, "COLUMN_SIZE"),
			column(5, ColumnType::Integer, "COLUMN_COUNTER"),
			column(6, ColumnType::Integer, "COLUMN_CONSTRAINTS"),
			column(7, ColumnType::Integer, "DEFAULT_CONSTRAINT_ID"),
			column(8, ColumnType::Char(MAX_NAME), "COLUMN_NAME"),
		],
	}
}

pub(crate) fn sys_default_numerics() -> Table {
	let column = |id, kind, name| sys_column(SYS_DEFAULT_NUMERICS_ID, id, kind, name);
	Table {
		id: SYS_DEFAULT_NUMERICS_ID,
		name: "SYS_DEFAULT_NUMERICS".into(),
		first_block: SYS_DEFAULT_NUMERICS_BLOCK,
		columns: vec![column(0, ColumnType::Integer, "VALUE_ID"), column(1, ColumnType::Integer, "VALUE")],
	}
}

pub(crate) fn sys_default_chars() -> Table {
	let column = |id, kind, name| sys_column(SYS_DEFAULT_CHARS_ID, id, kind, name);
	Table {
		id: SYS_DEFAULT_CHARS_ID,
		name: "SYS_DEFAULT_CHARS".into(),
		first_block: SYS_DEFAULT_CHARS_BLOCK,
		columns: vec![column(0, ColumnType::Integer, "VALUE_ID"), column(1, ColumnType::Char(MAX_CHAR), "VALUE")],
	}
}

/// The system tables in creation order; their record blocks are allocated
/// in this order at database birth.
pub(crate) fn all() -> [Table; 4] {
	[sys_tables(), sys_columns(), sys_default_numerics(), sys_default_chars()]
}

/// The catalog row describing a user table.
pub(crate) fn table_row(table: &Table) -> Vec<Value> {
	vec![
		Value::Integer(table.id),
		Value::Integer(table.first_block as i64),
		Value::Char(table.name.clone().into_bytes()),
	]
}

/// The catalog row describing one user-table column.
pub(crate) fn column_row(column: &Column) -> Vec<Value> {
	vec![
		Value::Integer(column.id),
		Value::Integer(column.table_id),
		Value::Integer(column.position),
		Value::Integer(column.kind.type_id() as i64),
		Value::Integer(column.kind.width() as i64),
		Value::Integer(column.counter),
		Value::Integer(column.constraints.bits() as i64),
		Value::Integer(column.default_id),
		Value::Char(column.name.clone().into_bytes()),
	]
}

/// Rehydrates the user-table descriptors: scans `SYS_TABLES` and
/// `SYS_COLUMNS`, equi-joins them on `TABLE_ID`, groups the columns per
/// table, and sorts each group by position.
pub(crate) fn load_tables(file: &BlockFile) -> Result<Vec<Table>> {
	let table_rows = scan(file, &sys_tables())?;
	let column_rows = scan(file, &sys_columns())?;
	let joined = join_by_attribute(&table_rows, &column_rows, "SYS_TABLES.TABLE_ID", "SYS_COLUMNS.TABLE_ID");

	let mut tables = Vec::with_capacity(table_rows.len());
	for row in &table_rows {
		tables.push(Table {
			id: int(row.get("SYS_TABLES.TABLE_ID"))?,
			name: chars(row.get("SYS_TABLES.TABLE_NAME"))?,
			first_block: int(row.get("SYS_TABLES.FIRST_RECORD_BLOCK"))? as u64,
			columns: Vec::new(),
		});
	}

	for row in &joined {
		let table_id = int(row.get("SYS_TABLES.TABLE_ID"))?;
		let table = tables.iter_mut().find(|t| t.id == table_id).ok_or_else(corrupt)?;
		let type_id = int(row.get("SYS_COLUMNS.COLUMN_TYPE"))?;
		let size = int(row.get("SYS_COLUMNS.COLUMN_SIZE"))?;
		table.columns.push(Column {
			id: int(row.get("SYS_COLUMNS.COLUMN_ID"))?,
			table_id,
			position: int(row.get("SYS_COLUMNS.COLUMN_POSITION"))?,
			kind: ColumnType::from_parts(type_id as u8, size as usize).ok_or_else(corrupt)?,
			counter: int(row.get("SYS_COLUMNS.COLUMN_COUNTER"))?,
			constraints: Constraints::from_bits(int(row.get("SYS_COLUMNS.COLUMN_CONSTRAINTS"))? as u8),
			default_id: int(row.get("SYS_COLUMNS.DEFAULT_CONSTRAINT_ID"))?,
			name: chars(row.get("SYS_COLUMNS.COLUMN_NAME"))?,
		});
	}

	for table in &mut tables {
		table.columns.sort_by_key(|column| column.position);
	}
	Ok(tables)
}

/// Stores a literal default in the numeric or char value table, returning
/// the `VALUE_ID` the owning column will reference. Non-char values are
/// stored as their 64-bit pattern.
pub(crate) fn insert_default(file: &BlockFile, value: &Value) -> Result<i64> {
	let (table, id, cell) = match value {
		Value::Char(_) => {
			let id = file.header().default_char_count as i64 + 1;
			(sys_default_chars(), id, value.clone())
		}
		other => {
			let id = file.header().default_numeric_count as i64 + 1;
			(sys_default_numerics(), id, Value::Integer(numeric_bits(other)))
		}
	};

	let layout = table.layout();
	RecordChain::new(file, &layout, table.first_block).insert(&layout.encode(&[Value::Integer(id), cell]))?;
	file.update_header(|h| match value {
		Value::Char(_) => h.default_char_count = id as u64,
		_ => h.default_numeric_count = id as u64,
	})?;
	Ok(id)
}

fn numeric_bits(value: &Value) -> i64 {
	match value {
		Value::Integer(v) | Value::Datetime(v) => *v,
		Value::Float(v) => v.to_bits() as i64,
		Value::Boolean(v) => *v as i64,
		Value::Char(_) | Value::Null => unreachable!("only scalar defaults reach the numeric store"),
	}
}

/// Loads a column's stored default, reinterpreting the catalog cell per
/// the column's declared type.
pub(crate) fn default_value(file: &BlockFile, column: &Column) -> Result<Value> {
	if let ColumnType::Char(_) = column.kind {
		let table = sys_default_chars();
		let layout = table.layout();
		for cells in RecordChain::new(file, &layout, table.first_block).rows()? {
			if cells[0] == Value::Integer(column.default_id) {
				return Ok(cells[1].clone());
			}
		}
		return Err(corrupt());
	}

	let table = sys_default_numerics();
	let layout = table.layout();
	for cells in RecordChain::new(file, &layout, table.first_block).rows()? {
		if cells[0] != Value::Integer(column.default_id) {
			continue;
		}
		let bits = match cells[1] {
			Value::Integer(bits) => bits,
			_ => return Err(corrupt()),
		};
		return Ok(match column.kind {
			ColumnType::Integer => Value::Integer(bits),
			ColumnType::Datetime => Value::Datetime(bits),
			ColumnType::Float => Value::Float(f64::from_bits(bits as u64)),
			ColumnType::Boolean => Value::Boolean(bits != 0),
			ColumnType::Char(_) => unreachable!("char defaults live in the char store"),
		});
	}
	Err(corrupt())
}

/// Writes an autoincrement counter through to its `SYS_COLUMNS` row.
pub(crate) fn persist_counter(file: &BlockFile, column_id: i64, counter: i64) -> Result<()> {
	let table = sys_columns();
	let layout = table.layout();
	let chain = RecordChain::new(file, &layout, table.first_block);
	for addr in chain.addresses()? {
		let mut block = chain.read(addr)?;
		let mut dirty = false;
		for slot in 0..block.slots() {
			if block.is_free(slot) {
				continue;
			}
			if let Some(cells) = layout.decode(block.record(slot)) {
				if cells[0] == Value::Integer(column_id) {
					layout.write_cell(block.record_mut(slot), COUNTER_CELL, &Value::Integer(counter));
					dirty = true;
				}
			}
		}
		if dirty {
			chain.write(addr, &block)?;
		}
	}
	Ok(())
}

/// Frees the catalog rows of a dropped table: its `SYS_TABLES` row and
/// every `SYS_COLUMNS` row carrying its id.
pub(crate) fn delete_table_rows(file: &BlockFile, table_id: i64) -> Result<()> {
	strip(file, &sys_tables(), 0, table_id)?;
	strip(file, &sys_columns(), 1, table_id)
}

fn strip(file: &BlockFile, table: &Table, id_cell: usize, table_id: i64) -> Result<()> {
	let layout = table.layout();
	let chain = RecordChain::new(file, &layout, table.first_block);
	for addr in chain.addresses()? {
		let mut block = chain.read(addr)?;
		for slot in 0..block.slots() {
			if block.is_free(slot) {
				continue;
			}
			if let Some(cells) = layout.decode(block.record(slot)) {
				if cells[id_cell] == Value::Integer(table_id) {
					rowcodec::RecordLayout::mark_free(block.record_mut(slot));
				}
			}
		}
		chain.write(addr, &block)?;
	}
	Ok(())
}

/// A catalog row that fails to decode as its own schema.
fn corrupt() -> Error {
	Error::Storage(blockfile::Error::InvalidFile)
}

fn int(cell: Option<&Value>) -> Result<i64> {
	match cell {
		Some(Value::Integer(v)) => Ok(*v),
		_ => Err(corrupt()),
	}
}

fn chars(cell: Option<&Value>) -> Result<String> {
	match cell {
		Some(Value::Char(bytes)) => Ok(String::from_utf8_lossy(bytes).into_owned()),
		_ => Err(corrupt()),
	}
}
