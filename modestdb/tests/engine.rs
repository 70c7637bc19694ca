// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::{path::PathBuf, sync::Arc};

use modestdb::{
	ColumnDefinition, ColumnType, Database, Error, Expression, JoinClause, Registry, Result, SelectCommand, Tuple,
	UpdateCommand, Value,
};
use tempfile::TempDir;

fn scratch() -> (TempDir, PathBuf) {
	let dir = TempDir::new().unwrap();
	let path = dir.path().join("test.db");
	(dir, path)
}

fn chars(s: &str) -> Value {
	Value::Char(s.as_bytes().to_vec())
}

fn movies_table(db: &Database) {
	db.new_table(
		"MOVIES",
		&[
			ColumnDefinition::new("ID_MOVIE", ColumnType::Integer),
			ColumnDefinition::new("TITLE", ColumnType::Char(32)),
		],
	)
	.unwrap();
}

fn col_eq_int(key: &'static str, want: i64) -> Box<dyn Expression> {
	Box::new(move |row: &Tuple| -> Result<Value> {
		Ok(Value::Boolean(row.lookup(key) == Some(&Value::Integer(want))))
	})
}

fn cols_eq(a: &'static str, b: &'static str) -> Box<dyn Expression> {
	Box::new(move |row: &Tuple| -> Result<Value> { Ok(Value::Boolean(row.lookup(a) == row.lookup(b))) })
}

fn literal(value: Value) -> Box<dyn Expression> {
	Box::new(move |_: &Tuple| -> Result<Value> { Ok(value.clone()) })
}

#[test]
fn create_then_reopen_is_empty() {
	let (_dir, path) = scratch();
	{
		let db = Database::create(&path, 4096).unwrap();
		assert!(db.all_tables().is_empty());
		assert_eq!(db.header().block_count, 5);
	}

	// header plus the four catalog blocks
	let raw = std::fs::read(&path).unwrap();
	assert_eq!(raw.len(), 5 * 4096);
	assert_eq!(&raw[..4], &[0x25, 0xF6, 0x09, 0x87]);

	let db = Database::load(&path).unwrap();
	assert!(db.all_tables().is_empty());
	assert_eq!(db.block_size(), 4096);
}

#[test]
fn bogus_files_are_rejected() {
	let (_dir, path) = scratch();
	assert!(matches!(Database::create(&path, 1000), Err(Error::Storage(blockfile::Error::InvalidBlockSize(1000)))));

	std::fs::write(&path, vec![0u8; 8192]).unwrap();
	assert!(matches!(Database::load(&path), Err(Error::Storage(blockfile::Error::InvalidFile))));
}

#[test]
fn single_row_round_trips() {
	let (_dir, path) = scratch();
	let db = Database::create(&path, 4096).unwrap();
	movies_table(&db);

	db.insert("MOVIES", &[("ID_MOVIE", Value::Integer(1)), ("TITLE", chars("Avengers"))]).unwrap();

	let rows = db.select(&SelectCommand::all("MOVIES")).unwrap();
	assert_eq!(rows.len(), 1);
	assert_eq!(rows[0].get("MOVIES.ID_MOVIE"), Some(&Value::Integer(1)));
	// no trailing NULs survive the char cell
	assert_eq!(rows[0].get("MOVIES.TITLE"), Some(&chars("Avengers")));
}

#[test]
fn delete_frees_slots_but_not_blocks() {
	let (_dir, path) = scratch();
	let db = Database::create(&path, 4096).unwrap();
	movies_table(&db);

	for id in 1..=3 {
		db.insert("MOVIES", &[("ID_MOVIE", Value::Integer(id)), ("TITLE", chars("x"))]).unwrap();
	}
	let blocks_before = db.header().block_count;

	assert_eq!(db.delete("MOVIES", None).unwrap(), 3);
	assert!(db.select(&SelectCommand::all("MOVIES")).unwrap().is_empty());

	db.insert("MOVIES", &[("ID_MOVIE", Value::Integer(9)), ("TITLE", chars("back"))]).unwrap();
	assert_eq!(db.header().block_count, blocks_before);

	// the new row landed in the first slot of the same record block
	let first_block = db.find_table("MOVIES").unwrap().first_block;
	let raw = std::fs::read(&path).unwrap();
	let record = &raw[(first_block as usize - 1) * 4096 + 8..];
	assert_ne!(&record[..4], &rowcodec::FREE_FLAG.to_le_bytes());
	assert_eq!(&record[5..13], &9i64.to_le_bytes());
}

#[test]
fn freed_slots_are_reused_leftmost_first() {
	let (_dir, path) = scratch();
	let db = Database::create(&path, 4096).unwrap();
	movies_table(&db);

	for id in 1..=3 {
		db.insert("MOVIES", &[("ID_MOVIE", Value::Integer(id)), ("TITLE", chars("x"))]).unwrap();
	}
	assert_eq!(db.delete("MOVIES", Some(&*col_eq_int("MOVIES.ID_MOVIE", 2))).unwrap(), 1);
	db.insert("MOVIES", &[("ID_MOVIE", Value::Integer(4)), ("TITLE", chars("x"))]).unwrap();

	// scan order shows the new row sitting in the freed middle slot
	let ids: Vec<_> = db
		.select(&SelectCommand::all("MOVIES"))
		.unwrap()
		.iter()
		.map(|row| row.get("MOVIES.ID_MOVIE").cloned().unwrap())
		.collect();
	assert_eq!(ids, vec![Value::Integer(1), Value::Integer(4), Value::Integer(3)]);
}

#[test]
fn dropped_tables_return_their_blocks() {
	let (_dir, path) = scratch();
	let db = Database::create(&path, 4096).unwrap();

	db.new_table("FIRST", &[ColumnDefinition::new("A", ColumnType::Integer)]).unwrap();
	let reusable = db.find_table("FIRST").unwrap().first_block;
	assert_eq!(reusable, 6);

	db.drop_table("FIRST").unwrap();
	assert_eq!(db.header().free_block_count, 1);
	assert!(matches!(db.find_table("FIRST"), Err(Error::UnknownTable(_))));

	// the next table pops the freed block instead of growing the file
	db.new_table("SECOND", &[ColumnDefinition::new("B", ColumnType::Integer)]).unwrap();
	assert_eq!(db.find_table("SECOND").unwrap().first_block, reusable);
	assert_eq!(db.header().block_count, 6);
	assert_eq!(db.header().free_block_count, 0);
}

#[test]
fn join_and_projection() {
	let (_dir, path) = scratch();
	let db = Database::create(&path, 4096).unwrap();

	db.new_table(
		"T",
		&[ColumnDefinition::new("TID", ColumnType::Integer), ColumnDefinition::new("NAME", ColumnType::Char(10))],
	)
	.unwrap();
	db.new_table(
		"C",
		&[ColumnDefinition::new("CID", ColumnType::Integer), ColumnDefinition::new("TID", ColumnType::Integer)],
	)
	.unwrap();

	db.insert("T", &[("TID", Value::Integer(1)), ("NAME", chars("a"))]).unwrap();
	db.insert("T", &[("TID", Value::Integer(2)), ("NAME", chars("b"))]).unwrap();
	db.insert("C", &[("CID", Value::Integer(10)), ("TID", Value::Integer(1))]).unwrap();
	db.insert("C", &[("CID", Value::Integer(11)), ("TID", Value::Integer(1))]).unwrap();
	db.insert("C", &[("CID", Value::Integer(12)), ("TID", Value::Integer(2))]).unwrap();

	let rows = db
		.select(&SelectCommand {
			table: "T".into(),
			joins: vec![JoinClause { table: "C".into(), filter: Some(cols_eq("T.TID", "C.TID")) }],
			columns: vec!["T.NAME".into(), "C.CID".into()],
			predicate: None,
		})
		.unwrap();

	let pairs: Vec<_> = rows
		.iter()
		.map(|row| (row.get("T.NAME").cloned().unwrap(), row.get("C.CID").cloned().unwrap()))
		.collect();
	assert_eq!(
		pairs,
		vec![
			(chars("a"), Value::Integer(10)),
			(chars("a"), Value::Integer(11)),
			(chars("b"), Value::Integer(12)),
		]
	);
	// projection stripped everything else
	assert_eq!(rows[0].len(), 2);
}

#[test]
fn where_predicate_filters_rows() {
	let (_dir, path) = scratch();
	let db = Database::create(&path, 4096).unwrap();
	movies_table(&db);

	for id in 1..=5 {
		db.insert("MOVIES", &[("ID_MOVIE", Value::Integer(id)), ("TITLE", chars("x"))]).unwrap();
	}

	let mut cmd = SelectCommand::all("MOVIES");
	cmd.predicate = Some(col_eq_int("MOVIES.ID_MOVIE", 4));
	let rows = db.select(&cmd).unwrap();
	assert_eq!(rows.len(), 1);
	assert_eq!(rows[0].get("MOVIES.ID_MOVIE"), Some(&Value::Integer(4)));
}

#[test]
fn inserted_nulls_read_back_as_nulls() {
	let (_dir, path) = scratch();
	let db = Database::create(&path, 4096).unwrap();
	movies_table(&db);

	db.insert("MOVIES", &[("ID_MOVIE", Value::Integer(1)), ("TITLE", Value::Null)]).unwrap();

	let rows = db.select(&SelectCommand::all("MOVIES")).unwrap();
	assert_eq!(rows[0].get("MOVIES.TITLE"), Some(&Value::Null));

	// and the on-disk null bitmap has bit 1 set
	let first_block = db.find_table("MOVIES").unwrap().first_block;
	let raw = std::fs::read(&path).unwrap();
	let record = &raw[(first_block as usize - 1) * 4096 + 8..];
	assert_eq!(record[4], 0b0000_0010);
}

#[test]
fn unspecified_columns_fall_back_to_defaults_then_null() {
	let (_dir, path) = scratch();
	let db = Database::create(&path, 4096).unwrap();

	db.new_table(
		"SETTINGS",
		&[
			ColumnDefinition::new("ID", ColumnType::Integer),
			ColumnDefinition::new("RETRIES", ColumnType::Integer).not_null().default(Value::Integer(3)),
			ColumnDefinition::new("LABEL", ColumnType::Char(20)).default(chars("none")),
			ColumnDefinition::new("RATIO", ColumnType::Float).default(Value::Float(0.5)),
			ColumnDefinition::new("ACTIVE", ColumnType::Boolean).default(Value::Boolean(true)),
			ColumnDefinition::new("NOTE", ColumnType::Char(20)),
		],
	)
	.unwrap();

	db.insert("SETTINGS", &[("ID", Value::Integer(1))]).unwrap();

	let rows = db.select(&SelectCommand::all("SETTINGS")).unwrap();
	let row = &rows[0];
	assert_eq!(row.get("SETTINGS.RETRIES"), Some(&Value::Integer(3)));
	assert_eq!(row.get("SETTINGS.LABEL"), Some(&chars("none")));
	assert_eq!(row.get("SETTINGS.RATIO"), Some(&Value::Float(0.5)));
	assert_eq!(row.get("SETTINGS.ACTIVE"), Some(&Value::Boolean(true)));
	assert_eq!(row.get("SETTINGS.NOTE"), Some(&Value::Null));
}

#[test]
fn schema_survives_reopen() {
	let (_dir, path) = scratch();
	let original = {
		let db = Database::create(&path, 4096).unwrap();
		db.new_table(
			"USERS",
			&[
				ColumnDefinition::new("ID", ColumnType::Integer).primary_key().autoincrement().not_null(),
				ColumnDefinition::new("NAME", ColumnType::Char(40)).not_null(),
				ColumnDefinition::new("KARMA", ColumnType::Integer).default(Value::Integer(7)),
				ColumnDefinition::new("JOINED", ColumnType::Datetime),
				ColumnDefinition::new("VERIFIED", ColumnType::Boolean).default(Value::Boolean(false)),
			],
		)
		.unwrap();
		db.find_table("USERS").unwrap()
	};

	let db = Database::load(&path).unwrap();
	let reloaded = db.find_table("USERS").unwrap();
	assert_eq!(reloaded, original);
	assert_eq!(db.all_tables().len(), 1);

	// order and attributes, spelled out
	let names: Vec<_> = reloaded.columns.iter().map(|c| c.name.as_str()).collect();
	assert_eq!(names, vec!["ID", "NAME", "KARMA", "JOINED", "VERIFIED"]);
	assert!(reloaded.columns[0].primary_key());
	assert!(reloaded.columns[0].autoincrement());
	assert!(reloaded.columns[1].not_null());
	assert!(reloaded.columns[2].has_default());
	assert_eq!(reloaded.columns[3].kind, ColumnType::Datetime);
}

#[test]
fn autoincrement_counters_survive_reopen() {
	let (_dir, path) = scratch();
	{
		let db = Database::create(&path, 4096).unwrap();
		db.new_table(
			"EVENTS",
			&[
				ColumnDefinition::new("ID", ColumnType::Integer).autoincrement(),
				ColumnDefinition::new("KIND", ColumnType::Char(10)),
			],
		)
		.unwrap();
		db.insert("EVENTS", &[("KIND", chars("boot"))]).unwrap();
		db.insert("EVENTS", &[("KIND", chars("tick"))]).unwrap();
	}

	let db = Database::load(&path).unwrap();
	db.insert("EVENTS", &[("KIND", chars("halt"))]).unwrap();

	let ids: Vec<_> = db
		.select(&SelectCommand::all("EVENTS"))
		.unwrap()
		.iter()
		.map(|row| row.get("EVENTS.ID").cloned().unwrap())
		.collect();
	assert_eq!(ids, vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]);
}

#[test]
fn inserts_chain_new_blocks_when_full() {
	let (_dir, path) = scratch();
	let db = Database::create(&path, 4096).unwrap();
	db.new_table(
		"WIDE",
		&[ColumnDefinition::new("ID", ColumnType::Integer), ColumnDefinition::new("PAD", ColumnType::Char(500))],
	)
	.unwrap();

	// record is 4 + 1 + 8 + 500 = 513 bytes; (4096 - 8) / 513 = 7 per block
	let per_block = (4096 - 8) / 513;
	let total = per_block * 2 + 1;
	for id in 0..total {
		db.insert("WIDE", &[("ID", Value::Integer(id as i64))]).unwrap();
	}

	// two extra blocks were chained on
	assert_eq!(db.header().block_count, 6 + 2);
	assert_eq!(db.select(&SelectCommand::all("WIDE")).unwrap().len(), total);

	// record conservation through deletes
	assert_eq!(db.delete("WIDE", Some(&*col_eq_int("WIDE.ID", 0))).unwrap(), 1);
	assert_eq!(db.select(&SelectCommand::all("WIDE")).unwrap().len(), total - 1);
	assert_eq!(db.header().block_count, 6 + 2);
}

#[test]
fn update_rewrites_matching_rows_in_place() {
	let (_dir, path) = scratch();
	let db = Database::create(&path, 4096).unwrap();
	movies_table(&db);

	for id in 1..=3 {
		db.insert("MOVIES", &[("ID_MOVIE", Value::Integer(id)), ("TITLE", chars("old"))]).unwrap();
	}

	let updated = db
		.update(&UpdateCommand {
			table: "MOVIES".into(),
			assignments: vec![("TITLE".into(), literal(chars("new")))],
			predicate: Some(col_eq_int("MOVIES.ID_MOVIE", 2)),
		})
		.unwrap();
	assert_eq!(updated, 1);

	let titles: Vec<_> = db
		.select(&SelectCommand::all("MOVIES"))
		.unwrap()
		.iter()
		.map(|row| row.get("MOVIES.TITLE").cloned().unwrap())
		.collect();
	assert_eq!(titles, vec![chars("old"), chars("new"), chars("old")]);
}

#[test]
fn update_can_null_a_nullable_column() {
	let (_dir, path) = scratch();
	let db = Database::create(&path, 4096).unwrap();
	movies_table(&db);
	db.insert("MOVIES", &[("ID_MOVIE", Value::Integer(1)), ("TITLE", chars("gone"))]).unwrap();

	db.update(&UpdateCommand {
		table: "MOVIES".into(),
		assignments: vec![("TITLE".into(), literal(Value::Null))],
		predicate: None,
	})
	.unwrap();

	let rows = db.select(&SelectCommand::all("MOVIES")).unwrap();
	assert_eq!(rows[0].get("MOVIES.TITLE"), Some(&Value::Null));
}

#[test]
fn update_to_null_on_not_null_column_changes_nothing() {
	let (_dir, path) = scratch();
	let db = Database::create(&path, 4096).unwrap();
	db.new_table(
		"STRICT",
		&[
			ColumnDefinition::new("ID", ColumnType::Integer),
			ColumnDefinition::new("NAME", ColumnType::Char(10)).not_null(),
		],
	)
	.unwrap();
	db.insert("STRICT", &[("ID", Value::Integer(1)), ("NAME", chars("keep"))]).unwrap();
	db.insert("STRICT", &[("ID", Value::Integer(2)), ("NAME", chars("also"))]).unwrap();

	let result = db.update(&UpdateCommand {
		table: "STRICT".into(),
		assignments: vec![("NAME".into(), literal(Value::Null))],
		predicate: None,
	});
	assert!(matches!(result, Err(Error::NotNullViolation(column)) if column == "NAME"));

	// the violation aborted before any block was rewritten
	let names: Vec<_> = db
		.select(&SelectCommand::all("STRICT"))
		.unwrap()
		.iter()
		.map(|row| row.get("STRICT.NAME").cloned().unwrap())
		.collect();
	assert_eq!(names, vec![chars("keep"), chars("also")]);
}

#[test]
fn constraint_violations_abort_cleanly() {
	let (_dir, path) = scratch();
	let db = Database::create(&path, 4096).unwrap();
	db.new_table(
		"STRICT",
		&[
			ColumnDefinition::new("ID", ColumnType::Integer).primary_key().not_null(),
			ColumnDefinition::new("NAME", ColumnType::Char(4)).not_null(),
		],
	)
	.unwrap();

	// missing NOT NULL value without a default
	assert!(matches!(
		db.insert("STRICT", &[("ID", Value::Integer(1))]),
		Err(Error::NotNullViolation(column)) if column == "NAME"
	));
	// explicit NULL is no better
	assert!(matches!(
		db.insert("STRICT", &[("ID", Value::Integer(1)), ("NAME", Value::Null)]),
		Err(Error::NotNullViolation(_))
	));
	// wrong type
	assert!(matches!(
		db.insert("STRICT", &[("ID", Value::Boolean(true)), ("NAME", chars("ok"))]),
		Err(Error::TypeMismatch(_, "INTEGER", "BOOLEAN"))
	));
	// char wider than the column
	assert!(matches!(
		db.insert("STRICT", &[("ID", Value::Integer(1)), ("NAME", chars("too wide"))]),
		Err(Error::CharTooLong(_, 4))
	));
	// unknown column
	assert!(matches!(
		db.insert("STRICT", &[("NOPE", Value::Integer(1))]),
		Err(Error::UnknownColumn(_, column)) if column == "NOPE"
	));

	// nothing landed
	assert!(db.select(&SelectCommand::all("STRICT")).unwrap().is_empty());

	// primary keys must be unique
	db.insert("STRICT", &[("ID", Value::Integer(1)), ("NAME", chars("one"))]).unwrap();
	assert!(matches!(
		db.insert("STRICT", &[("ID", Value::Integer(1)), ("NAME", chars("two"))]),
		Err(Error::DuplicatePrimaryKey(column, Value::Integer(1))) if column == "ID"
	));
}

#[test]
fn table_level_mistakes_are_rejected() {
	let (_dir, path) = scratch();
	let db = Database::create(&path, 4096).unwrap();
	movies_table(&db);

	// duplicate table, case-insensitively
	assert!(matches!(
		db.new_table("movies", &[ColumnDefinition::new("A", ColumnType::Integer)]),
		Err(Error::DuplicateTable(_))
	));
	// duplicate column within one definition
	assert!(matches!(
		db.new_table(
			"OTHER",
			&[ColumnDefinition::new("A", ColumnType::Integer), ColumnDefinition::new("a", ColumnType::Float)],
		),
		Err(Error::DuplicateColumn(_, _))
	));
	// a record that cannot fit one block body
	assert!(matches!(
		db.new_table("HUGE", &[ColumnDefinition::new("BLOB", ColumnType::Char(4084))]),
		Err(Error::RecordTooLarge(_))
	));
	// unknown tables surface as such
	assert!(matches!(db.select(&SelectCommand::all("NOWHERE")), Err(Error::UnknownTable(_))));
	assert!(matches!(db.delete("NOWHERE", None), Err(Error::UnknownTable(_))));
	assert!(matches!(db.drop_table("NOWHERE"), Err(Error::UnknownTable(_))));
	// system tables are not addressable
	assert!(matches!(db.find_table("SYS_TABLES"), Err(Error::UnknownTable(_))));

	// the failed definitions left no trace
	assert_eq!(db.all_tables().len(), 1);
}

#[test]
fn names_are_case_insensitive() {
	let (_dir, path) = scratch();
	let db = Database::create(&path, 4096).unwrap();
	movies_table(&db);

	db.insert("movies", &[("id_movie", Value::Integer(1)), ("title", chars("x"))]).unwrap();
	let rows = db.select(&SelectCommand::all("movies")).unwrap();
	assert_eq!(rows.len(), 1);
	assert_eq!(db.find_table("Movies").unwrap().name, "MOVIES");
}

#[test]
fn registry_shares_one_handle_per_path() {
	let (_dir, path) = scratch();
	let registry = Registry::new();

	let db = registry.create(&path, 4096).unwrap();
	let again = registry.load(&path).unwrap();
	assert!(Arc::ptr_eq(&db, &again));

	// dropping every handle closes the file; the next load reopens it
	drop(db);
	drop(again);
	let reopened = registry.load(&path).unwrap();
	assert!(reopened.all_tables().is_empty());
}

#[test]
fn expression_failures_become_errors() {
	let (_dir, path) = scratch();
	let db = Database::create(&path, 4096).unwrap();
	movies_table(&db);
	db.insert("MOVIES", &[("ID_MOVIE", Value::Integer(1)), ("TITLE", chars("x"))]).unwrap();

	// a predicate returning a scalar is a type error, not a panic
	let mut cmd = SelectCommand::all("MOVIES");
	cmd.predicate = Some(literal(Value::Integer(1)));
	assert!(matches!(db.select(&cmd), Err(Error::Expression(_))));

	// and evaluation failures propagate
	let mut cmd = SelectCommand::all("MOVIES");
	cmd.predicate = Some(Box::new(|_: &Tuple| -> Result<Value> {
		Err(Error::Expression("missing symbol".into()))
	}));
	assert!(matches!(db.select(&cmd), Err(Error::Expression(_))));
}
