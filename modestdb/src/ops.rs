// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Relational operators over in-memory tuple sets.
//!
//! Operators are pure and order-preserving; duplicates are never
//! eliminated. Sets are plain vectors, tuples map qualified column names
//! to values.

use std::collections::BTreeMap;

use rowcodec::Value;

use crate::{command::Expression, Error, Result};

/// A scanned row: qualified column name (`TABLE.COLUMN`) to value. A NULL
/// cell is a present key holding `Value::Null`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tuple(BTreeMap<String, Value>);

impl Tuple {
	pub fn new() -> Tuple {
		Tuple(BTreeMap::new())
	}

	pub fn insert(&mut self, key: impl Into<String>, value: Value) {
		self.0.insert(key.into(), value);
	}

	/// Value under exactly this key.
	pub fn get(&self, key: &str) -> Option<&Value> {
		self.0.get(key)
	}

	/// Resolves a possibly bare column name to the stored key: an exact
	/// match wins, otherwise a unique `.name` suffix match.
	pub fn resolve(&self, name: &str) -> Option<&str> {
		if let Some((key, _)) = self.0.get_key_value(name) {
			return Some(key);
		}
		let suffix = format!(".{}", name);
		let mut matches = self.0.keys().filter(|key| key.ends_with(&suffix));
		match (matches.next(), matches.next()) {
			(Some(key), None) => Some(key),
			_ => None,
		}
	}

	/// Value under an exact or unambiguous bare name.
	pub fn lookup(&self, name: &str) -> Option<&Value> {
		self.resolve(name).map(|key| &self.0[key])
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn keys(&self) -> impl Iterator<Item = &str> {
		self.0.keys().map(String::as_str)
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
		self.0.iter().map(|(k, v)| (k.as_str(), v))
	}

	fn restrict(self, keys: &[String]) -> Tuple {
		let keep: Vec<String> = keys.iter().filter_map(|name| self.resolve(name).map(str::to_owned)).collect();
		Tuple(self.0.into_iter().filter(|(key, _)| keep.iter().any(|k| k == key)).collect())
	}
}

impl FromIterator<(String, Value)> for Tuple {
	fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Tuple {
		Tuple(iter.into_iter().collect())
	}
}

/// An ordered multiset of tuples; what operators take and return.
pub type Set = Vec<Tuple>;

/// σ — keeps the tuples the predicate holds for.
pub fn selection(input: Set, predicate: &dyn Expression) -> Result<Set> {
	let mut out = Vec::with_capacity(input.len());
	for tuple in input {
		if predicate_holds(predicate, &tuple)? {
			out.push(tuple);
		}
	}
	Ok(out)
}

/// π — restricts every tuple to the requested keys; `*` keeps everything.
pub fn projection(input: Set, keys: &[String]) -> Set {
	if keys.iter().any(|key| key == "*") {
		return input;
	}
	input.into_iter().map(|tuple| tuple.restrict(keys)).collect()
}

/// ⋈ — cartesian product filtered by `theta` (cross join when absent).
/// Tuples merge element-wise, the right side winning on key conflicts.
pub fn join(left: &Set, right: &Set, theta: Option<&dyn Expression>) -> Result<Set> {
	let mut out = Vec::new();
	for l in left {
		for r in right {
			let merged = merge_tuples(l, r);
			match theta {
				Some(theta) => {
					if predicate_holds(theta, &merged)? {
						out.push(merged);
					}
				}
				None => out.push(merged),
			}
		}
	}
	Ok(out)
}

/// Equi-join sugar: `join` with `theta = (a == b)`. NULL matches nothing,
/// including another NULL.
pub fn join_by_attribute(left: &Set, right: &Set, a: &str, b: &str) -> Set {
	let mut out = Vec::new();
	for l in left {
		for r in right {
			let merged = merge_tuples(l, r);
			let equal = match (merged.lookup(a), merged.lookup(b)) {
				(Some(x), Some(y)) if !x.is_null() && !y.is_null() => x == y,
				_ => false,
			};
			if equal {
				out.push(merged);
			}
		}
	}
	out
}

/// A new tuple holding every key of either side; `b` wins on conflicts.
pub fn merge_tuples(a: &Tuple, b: &Tuple) -> Tuple {
	let mut merged = a.0.clone();
	for (key, value) in &b.0 {
		merged.insert(key.clone(), value.clone());
	}
	Tuple(merged)
}

/// Evaluates a predicate, insisting on a boolean result.
pub(crate) fn predicate_holds(predicate: &dyn Expression, row: &Tuple) -> Result<bool> {
	match predicate.evaluate(row)? {
		Value::Boolean(holds) => Ok(holds),
		other => Err(Error::Expression(format!("predicate returned {}, expected BOOLEAN", other.type_name()))),
	}
}
