// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The engine proper: databases, the handle registry, and the DML and DDL
//! operations the command dispatcher calls into.

use std::{
	collections::{BTreeMap, HashMap},
	path::{Path, PathBuf},
	sync::{Arc, Weak},
};

use blockfile::BlockFile;
use log::debug;
use parking_lot::{Mutex, RwLock};
use rowcodec::{ColumnType, RecordLayout, Value};

use crate::{
	catalog,
	command::{ColumnDefinition, Expression, SelectCommand, UpdateCommand},
	ops::{self, Set},
	store::{scan, tuple_of, RecordBlockBuf, RecordChain},
	table::{Column, Constraints, Table},
	Error, Result,
};

/// An open database: one block file and the in-memory descriptors of its
/// user tables.
///
/// Every engine operation takes the descriptor lock for its whole
/// duration: readers share it, mutating operations are exclusive. There
/// are no suspension points inside an operation. Dropping the last handle
/// closes the underlying file.
pub struct Database {
	path: PathBuf,
	file: BlockFile,
	tables: RwLock<Vec<Table>>,
}

impl Database {
	/// Creates a database file: a header block followed by one record
	/// block per system table, at addresses 2 to 5.
	pub fn create<P: AsRef<Path>>(path: P, block_size: u32) -> Result<Database> {
		let path = path.as_ref();
		let file = BlockFile::create(path, block_size)?;
		for table in catalog::all() {
			let addr = file.alloc()?;
			debug_assert_eq!(addr, table.first_block);
			RecordChain::new(&file, &table.layout(), table.first_block).init_first()?;
		}
		debug!(target: "modestdb", "created database {}", path.display());
		Ok(Database { path: path.to_owned(), file, tables: RwLock::new(Vec::new()) })
	}

	/// Opens an existing database file and rehydrates its table
	/// descriptors from the catalog.
	pub fn load<P: AsRef<Path>>(path: P) -> Result<Database> {
		let path = path.as_ref();
		let file = BlockFile::open(path)?;
		let tables = catalog::load_tables(&file)?;
		debug!(target: "modestdb", "loaded database {} ({} user tables)", path.display(), tables.len());
		Ok(Database { path: path.to_owned(), file, tables: RwLock::new(tables) })
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn block_size(&self) -> u32 {
		self.file.block_size()
	}

	/// Snapshot of the storage header: block and free counts plus the
	/// catalog id generators.
	pub fn header(&self) -> blockfile::Header {
		self.file.header()
	}

	/// Descriptors of every user table. The system tables are engine
	/// internals and not listed.
	pub fn all_tables(&self) -> Vec<Table> {
		self.tables.read().clone()
	}

	/// Descriptor of one user table.
	pub fn find_table(&self, name: &str) -> Result<Table> {
		Ok(lookup(&self.tables.read(), name)?.clone())
	}

	/// Creates a user table: catalog rows for the table and each column,
	/// stored defaults, and a fresh all-free record block. Everything is
	/// validated before the first write.
	pub fn new_table(&self, name: &str, definitions: &[ColumnDefinition]) -> Result<()> {
		let mut tables = self.tables.write();
		let name = normalize_name(name)?;
		if tables.iter().any(|t| t.name == name) || catalog::all().iter().any(|t| t.name == name) {
			return Err(Error::DuplicateTable(name));
		}

		let mut names: Vec<String> = Vec::with_capacity(definitions.len());
		let mut defaults: Vec<Option<Value>> = Vec::with_capacity(definitions.len());
		for def in definitions {
			let column = normalize_name(&def.name)?;
			if names.contains(&column) {
				return Err(Error::DuplicateColumn(name, column));
			}
			if def.autoincrement && def.kind != ColumnType::Integer {
				return Err(Error::TypeMismatch(column, ColumnType::Integer.name(), def.kind.name()));
			}
			let default = match &def.default {
				Some(value) if value.is_null() => {
					return Err(Error::TypeMismatch(column, def.kind.name(), value.type_name()))
				}
				Some(value) => {
					let coerced = coerce(&column, def.kind, value.clone())?;
					if let Value::Char(bytes) = &coerced {
						if bytes.len() > catalog::MAX_CHAR {
							return Err(Error::CharTooLong(column, catalog::MAX_CHAR));
						}
					}
					Some(coerced)
				}
				None => None,
			};
			names.push(column);
			defaults.push(default);
		}

		let layout = RecordLayout::new(definitions.iter().map(|def| def.kind).collect());
		if layout.record_size() > self.file.block_size() as usize - 8 {
			return Err(Error::RecordTooLarge(name));
		}

		// validation done; allocate storage and write the catalog
		let first = self.file.alloc()?;
		let header = self.file.header();
		let table_id = header.table_count as i64 + 1;
		let mut column_count = header.column_count;

		let mut columns = Vec::with_capacity(definitions.len());
		for (position, ((def, column), default)) in
			definitions.iter().zip(names).zip(defaults).enumerate()
		{
			column_count += 1;
			let mut constraints = Constraints::none();
			if def.primary_key {
				constraints = constraints.with(Constraints::PRIMARY_KEY);
			}
			if def.foreign_key {
				constraints = constraints.with(Constraints::FOREIGN_KEY);
			}
			if def.autoincrement {
				constraints = constraints.with(Constraints::AUTOINCREMENT);
			}
			if !def.nullable {
				constraints = constraints.with(Constraints::NOT_NULL);
			}
			let default_id = match default {
				Some(value) => {
					constraints = constraints.with(Constraints::DEFAULT_VALUE);
					catalog::insert_default(&self.file, &value)?
				}
				None => 0,
			};
			columns.push(Column {
				id: column_count as i64,
				table_id,
				position: position as i64,
				kind: def.kind,
				counter: 0,
				constraints,
				default_id,
				name: column,
			});
		}

		let table = Table { id: table_id, name, first_block: first, columns };

		let sys_tables = catalog::sys_tables();
		let layout = sys_tables.layout();
		RecordChain::new(&self.file, &layout, sys_tables.first_block)
			.insert(&layout.encode(&catalog::table_row(&table)))?;

		let sys_columns = catalog::sys_columns();
		let layout = sys_columns.layout();
		let chain = RecordChain::new(&self.file, &layout, sys_columns.first_block);
		for column in &table.columns {
			chain.insert(&layout.encode(&catalog::column_row(column)))?;
		}

		self.file.update_header(|h| {
			h.table_count = table_id as u64;
			h.column_count = column_count;
		})?;

		RecordChain::new(&self.file, &table.layout(), first).init_first()?;
		debug!(target: "modestdb", "created table {} ({} columns)", table.name, table.columns.len());
		tables.push(table);
		Ok(())
	}

	/// Drops a user table: its catalog rows are freed and its record
	/// chain returned to the free list. Ids are never reused.
	pub fn drop_table(&self, name: &str) -> Result<()> {
		let mut tables = self.tables.write();
		let name = normalize_name(name)?;
		let index = tables
			.iter()
			.position(|t| t.name == name)
			.ok_or_else(|| Error::UnknownTable(name.clone()))?;

		let table = tables[index].clone();
		catalog::delete_table_rows(&self.file, table.id)?;
		RecordChain::new(&self.file, &table.layout(), table.first_block).free_all()?;
		tables.remove(index);
		debug!(target: "modestdb", "dropped table {}", name);
		Ok(())
	}

	/// Inserts one row. Missing columns fall back to the autoincrement
	/// counter, the declared default, or NULL, in that order of
	/// applicability; values are validated before anything is written.
	pub fn insert(&self, table: &str, values: &[(&str, Value)]) -> Result<()> {
		let mut tables = self.tables.write();
		let name = normalize_name(table)?;
		let index = tables
			.iter()
			.position(|t| t.name == name)
			.ok_or(Error::UnknownTable(name))?;
		let table = &mut tables[index];

		let mut provided: BTreeMap<String, Value> = BTreeMap::new();
		for (key, value) in values {
			let key = normalize_name(key)?;
			if table.column(&key).is_none() {
				return Err(Error::UnknownColumn(table.name.clone(), key));
			}
			provided.insert(key, value.clone());
		}

		let mut cells = Vec::with_capacity(table.columns.len());
		let mut bumped = Vec::new();
		for (position, column) in table.columns.iter().enumerate() {
			let cell = match provided.remove(&column.name) {
				Some(value) => coerce(&column.name, column.kind, value)?,
				None if column.autoincrement() => {
					let next = column.counter + 1;
					bumped.push((position, column.id, next));
					Value::Integer(next)
				}
				None if column.has_default() => catalog::default_value(&self.file, column)?,
				None => Value::Null,
			};
			if cell.is_null() && column.not_null() {
				return Err(Error::NotNullViolation(column.name.clone()));
			}
			cells.push(cell);
		}

		if let Some((position, key)) = table
			.columns
			.iter()
			.position(|c| c.primary_key())
			.map(|i| (i, table.columns[i].name.clone()))
		{
			let value = cells[position].clone();
			if !value.is_null() {
				let layout = table.layout();
				for row in RecordChain::new(&self.file, &layout, table.first_block).rows()? {
					if row[position] == value {
						return Err(Error::DuplicatePrimaryKey(key, value));
					}
				}
			}
		}

		let layout = table.layout();
		RecordChain::new(&self.file, &layout, table.first_block).insert(&layout.encode(&cells))?;

		for (position, column_id, counter) in bumped {
			catalog::persist_counter(&self.file, column_id, counter)?;
			table.columns[position].counter = counter;
		}
		Ok(())
	}

	/// Deletes matching rows (all rows without a predicate), returning
	/// the count. Slots are flagged free in place; the chain keeps its
	/// blocks.
	pub fn delete(&self, table: &str, predicate: Option<&dyn Expression>) -> Result<usize> {
		let tables = self.tables.write();
		let table = lookup(&tables, table)?;
		let layout = table.layout();
		let chain = RecordChain::new(&self.file, &layout, table.first_block);

		let mut deleted = 0;
		for addr in chain.addresses()? {
			let mut block = chain.read(addr)?;
			for slot in 0..block.slots() {
				if block.is_free(slot) {
					continue;
				}
				let matches = match predicate {
					Some(predicate) => {
						let cells = match layout.decode(block.record(slot)) {
							Some(cells) => cells,
							None => continue,
						};
						ops::predicate_holds(predicate, &tuple_of(table, cells))?
					}
					None => true,
				};
				if matches {
					RecordLayout::mark_free(block.record_mut(slot));
					deleted += 1;
				}
			}
			chain.write(addr, &block)?;
		}
		Ok(deleted)
	}

	/// Updates matching rows, returning the count. Every affected row is
	/// evaluated and coerced before the first block is rewritten, so a
	/// bad assignment leaves the table untouched.
	pub fn update(&self, cmd: &UpdateCommand) -> Result<usize> {
		let tables = self.tables.write();
		let table = lookup(&tables, &cmd.table)?;
		let layout = table.layout();

		let mut targets = Vec::with_capacity(cmd.assignments.len());
		for (name, expr) in &cmd.assignments {
			let column = normalize_name(name)?;
			let (position, column) = table
				.column(&column)
				.ok_or_else(|| Error::UnknownColumn(table.name.clone(), column))?;
			targets.push((position, column, expr));
		}

		let chain = RecordChain::new(&self.file, &layout, table.first_block);
		let mut blocks: Vec<(u64, RecordBlockBuf, Vec<(usize, Vec<(usize, Value)>)>)> = Vec::new();
		let mut updated = 0;

		for addr in chain.addresses()? {
			let block = chain.read(addr)?;
			let mut patches = Vec::new();
			for slot in 0..block.slots() {
				if block.is_free(slot) {
					continue;
				}
				let cells = match layout.decode(block.record(slot)) {
					Some(cells) => cells,
					None => continue,
				};
				let row = tuple_of(table, cells);
				let matches = match &cmd.predicate {
					Some(predicate) => ops::predicate_holds(predicate.as_ref(), &row)?,
					None => true,
				};
				if !matches {
					continue;
				}
				let mut patch = Vec::with_capacity(targets.len());
				for (position, column, expr) in &targets {
					let value = coerce(&column.name, column.kind, expr.evaluate(&row)?)?;
					if value.is_null() && column.not_null() {
						return Err(Error::NotNullViolation(column.name.clone()));
					}
					patch.push((*position, value));
				}
				patches.push((slot, patch));
				updated += 1;
			}
			blocks.push((addr, block, patches));
		}

		for (addr, mut block, patches) in blocks {
			for (slot, patch) in patches {
				for (position, value) in patch {
					layout.write_cell(block.record_mut(slot), position, &value);
				}
			}
			chain.write(addr, &block)?;
		}
		Ok(updated)
	}

	/// Runs a SELECT: scan the source, fold the joins in order, apply the
	/// WHERE predicate, project.
	pub fn select(&self, cmd: &SelectCommand) -> Result<Set> {
		let tables = self.tables.read();
		let table = lookup(&tables, &cmd.table)?;

		let mut set = scan(&self.file, table)?;
		for join in &cmd.joins {
			let target = lookup(&tables, &join.table)?;
			let target_set = scan(&self.file, target)?;
			set = ops::join(&set, &target_set, join.filter.as_deref())?;
		}
		if let Some(predicate) = &cmd.predicate {
			set = ops::selection(set, predicate.as_ref())?;
		}
		Ok(ops::projection(set, &cmd.columns))
	}
}

/// Deduplicates open database handles by canonical path, so repeated
/// loads of one file share a handle. Entries are weak: the registry never
/// keeps a database alive, and dropping the last `Arc` closes the file.
#[derive(Default)]
pub struct Registry {
	databases: Mutex<HashMap<PathBuf, Weak<Database>>>,
}

impl Registry {
	pub fn new() -> Registry {
		Registry::default()
	}

	/// Creates a database file and registers the handle.
	pub fn create<P: AsRef<Path>>(&self, path: P, block_size: u32) -> Result<Arc<Database>> {
		let db = Arc::new(Database::create(path.as_ref(), block_size)?);
		let canonical = canonicalize(path.as_ref())?;
		self.databases.lock().insert(canonical, Arc::downgrade(&db));
		Ok(db)
	}

	/// Opens a database, sharing the live handle when the same file is
	/// already open through this registry.
	pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<Arc<Database>> {
		let canonical = canonicalize(path.as_ref())?;
		let mut databases = self.databases.lock();
		if let Some(db) = databases.get(&canonical).and_then(Weak::upgrade) {
			return Ok(db);
		}
		databases.retain(|_, db| db.strong_count() > 0);

		let db = Arc::new(Database::load(&canonical)?);
		databases.insert(canonical, Arc::downgrade(&db));
		Ok(db)
	}
}

fn canonicalize(path: &Path) -> Result<PathBuf> {
	path.canonicalize().map_err(|err| Error::Storage(blockfile::Error::Io(err)))
}

fn lookup<'a>(tables: &'a [Table], name: &str) -> Result<&'a Table> {
	let name = normalize_name(name)?;
	tables.iter().find(|t| t.name == name).ok_or(Error::UnknownTable(name))
}

/// Upper-cases a table or column name, bounding its length.
fn normalize_name(name: &str) -> Result<String> {
	if name.len() > catalog::MAX_NAME {
		return Err(Error::CharTooLong(name.into(), catalog::MAX_NAME));
	}
	Ok(name.to_ascii_uppercase())
}

/// Checks a host-supplied value against a column's declared type,
/// per-type: integers for INTEGER, epoch ticks (either representation)
/// for DATETIME, doubles for FLOAT, booleans for BOOLEAN, and strings of
/// at most the declared width for CHAR. NULL passes; nullability is the
/// caller's check.
fn coerce(column: &str, kind: ColumnType, value: Value) -> Result<Value> {
	match (kind, value) {
		(_, Value::Null) => Ok(Value::Null),
		(ColumnType::Integer, value @ Value::Integer(_)) => Ok(value),
		(ColumnType::Datetime, value @ Value::Datetime(_)) => Ok(value),
		(ColumnType::Datetime, Value::Integer(tick)) => Ok(Value::Datetime(tick)),
		(ColumnType::Float, value @ Value::Float(_)) => Ok(value),
		(ColumnType::Boolean, value @ Value::Boolean(_)) => Ok(value),
		(ColumnType::Char(size), Value::Char(bytes)) => {
			if bytes.len() > size {
				return Err(Error::CharTooLong(column.into(), size));
			}
			Ok(Value::Char(bytes))
		}
		(kind, value) => Err(Error::TypeMismatch(column.into(), kind.name(), value.type_name())),
	}
}
