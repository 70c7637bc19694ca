// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Record layout: free flag, null bitmap, packed fixed-width cells.

use bytes::BufMut;

use crate::{Bitmap, ColumnType, Value};

/// Sentinel in a record's first four bytes marking the slot as free.
pub const FREE_FLAG: u32 = 0x3314_b318;

const FLAG_LEN: usize = 4;

/// The fixed layout shared by every record of one table: the ordered column
/// types. All records of the table have the same size, so record blocks can
/// pack them back to back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLayout {
	types: Vec<ColumnType>,
	record_size: usize,
}

impl RecordLayout {
	pub fn new(types: Vec<ColumnType>) -> RecordLayout {
		let cells: usize = types.iter().map(|ty| ty.width()).sum();
		let record_size = FLAG_LEN + Bitmap::byte_len(types.len()) + cells;
		RecordLayout { types, record_size }
	}

	pub fn types(&self) -> &[ColumnType] {
		&self.types
	}

	pub fn column_count(&self) -> usize {
		self.types.len()
	}

	pub fn bitmap_len(&self) -> usize {
		Bitmap::byte_len(self.types.len())
	}

	/// Total encoded size of one record.
	pub fn record_size(&self) -> usize {
		self.record_size
	}

	fn cell_offset(&self, idx: usize) -> usize {
		FLAG_LEN + self.bitmap_len() + self.types[..idx].iter().map(|ty| ty.width()).sum::<usize>()
	}

	/// Encodes a live record. `cells` must carry one coerced value per
	/// column, in position order.
	pub fn encode(&self, cells: &[Value]) -> Vec<u8> {
		assert_eq!(cells.len(), self.types.len(), "cell count does not match layout");

		let mut nulls = Bitmap::with_bits(self.types.len());
		for (i, cell) in cells.iter().enumerate() {
			if cell.is_null() {
				nulls.set(i);
			}
		}

		let mut out = Vec::with_capacity(self.record_size);
		out.put_u32_le(0);
		out.put_slice(nulls.as_bytes());
		for (cell, ty) in cells.iter().zip(&self.types) {
			cell.encode(*ty, &mut out);
		}
		out
	}

	/// An encoded free slot: the sentinel followed by zeroes.
	pub fn free_record(&self) -> Vec<u8> {
		let mut out = vec![0; self.record_size];
		Self::mark_free(&mut out);
		out
	}

	pub fn is_free(record: &[u8]) -> bool {
		record[..FLAG_LEN] == FREE_FLAG.to_le_bytes()
	}

	pub fn mark_free(record: &mut [u8]) {
		record[..FLAG_LEN].copy_from_slice(&FREE_FLAG.to_le_bytes());
	}

	/// Decodes a record back into per-column values, `None` for a free
	/// slot. NULL columns decode as `Value::Null`.
	pub fn decode(&self, record: &[u8]) -> Option<Vec<Value>> {
		assert_eq!(record.len(), self.record_size, "record slice does not match layout");
		if Self::is_free(record) {
			return None;
		}

		let nulls = Bitmap::from_bytes(record[FLAG_LEN..FLAG_LEN + self.bitmap_len()].to_vec());
		let mut cells = Vec::with_capacity(self.types.len());
		let mut offset = FLAG_LEN + self.bitmap_len();
		for (i, ty) in self.types.iter().enumerate() {
			let cell = &record[offset..offset + ty.width()];
			cells.push(if nulls.at(i) { Value::Null } else { Value::decode(*ty, cell) });
			offset += ty.width();
		}
		Some(cells)
	}

	/// Overwrites one cell in place, flipping its null bit as needed. Used
	/// by UPDATE so untouched cells keep their exact bytes.
	pub fn write_cell(&self, record: &mut [u8], idx: usize, value: &Value) {
		assert_eq!(record.len(), self.record_size, "record slice does not match layout");
		let ty = self.types[idx];

		let bit = 1u8 << (idx % 8);
		if value.is_null() {
			record[FLAG_LEN + idx / 8] |= bit;
		} else {
			record[FLAG_LEN + idx / 8] &= !bit;
		}

		let offset = self.cell_offset(idx);
		let mut cell = &mut record[offset..offset + ty.width()];
		value.encode(ty, &mut cell);
	}
}
