// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Record blocks and record-block chains.
//!
//! A record block is a whole block whose first eight bytes point at the
//! next block of the chain (0 terminates) and whose remaining body is a
//! packed array of fixed-size records. A table's physical storage is the
//! chain rooted at its first record block.

use blockfile::{BlockFile, NULL_ADDR};
use log::debug;
use rowcodec::{RecordLayout, Value};

use crate::{
	ops::{Set, Tuple},
	table::Table,
	Error, Result,
};

const NEXT_LEN: usize = 8;

/// One record block's bytes, addressable by slot.
pub(crate) struct RecordBlockBuf {
	bytes: Vec<u8>,
	record_size: usize,
	slots: usize,
}

impl RecordBlockBuf {
	/// A fresh block: no successor, every slot free.
	pub fn empty(block_size: usize, record_size: usize) -> RecordBlockBuf {
		let mut buf = RecordBlockBuf::from_bytes(vec![0; block_size], record_size);
		assert!(buf.slots > 0, "record does not fit a block body");
		buf.mark_all_free();
		buf
	}

	pub fn from_bytes(bytes: Vec<u8>, record_size: usize) -> RecordBlockBuf {
		let slots = (bytes.len() - NEXT_LEN) / record_size;
		RecordBlockBuf { bytes, record_size, slots }
	}

	pub fn next(&self) -> u64 {
		u64::from_le_bytes(self.bytes[..NEXT_LEN].try_into().expect("block body is at least 8 bytes; qed"))
	}

	pub fn set_next(&mut self, addr: u64) {
		self.bytes[..NEXT_LEN].copy_from_slice(&addr.to_le_bytes());
	}

	pub fn slots(&self) -> usize {
		self.slots
	}

	fn offset(&self, slot: usize) -> usize {
		NEXT_LEN + slot * self.record_size
	}

	pub fn record(&self, slot: usize) -> &[u8] {
		let offset = self.offset(slot);
		&self.bytes[offset..offset + self.record_size]
	}

	pub fn record_mut(&mut self, slot: usize) -> &mut [u8] {
		let offset = self.offset(slot);
		&mut self.bytes[offset..offset + self.record_size]
	}

	pub fn is_free(&self, slot: usize) -> bool {
		RecordLayout::is_free(self.record(slot))
	}

	/// Places the record in the leftmost free slot; `false` when full.
	pub fn insert(&mut self, record: &[u8]) -> bool {
		for slot in 0..self.slots {
			if self.is_free(slot) {
				self.record_mut(slot).copy_from_slice(record);
				return true;
			}
		}
		false
	}

	/// Flags every slot free, leaving the payload bytes behind.
	pub fn mark_all_free(&mut self) {
		for slot in 0..self.slots {
			RecordLayout::mark_free(self.record_mut(slot));
		}
	}

	pub fn as_bytes(&self) -> &[u8] {
		&self.bytes
	}
}

/// A table's record-block chain.
pub(crate) struct RecordChain<'a> {
	file: &'a BlockFile,
	layout: &'a RecordLayout,
	first: u64,
}

impl<'a> RecordChain<'a> {
	pub fn new(file: &'a BlockFile, layout: &'a RecordLayout, first: u64) -> RecordChain<'a> {
		RecordChain { file, layout, first }
	}

	/// Writes an all-free block at the chain root.
	pub fn init_first(&self) -> Result<()> {
		let block = RecordBlockBuf::empty(self.file.block_size() as usize, self.layout.record_size());
		self.write(self.first, &block)
	}

	pub fn read(&self, addr: u64) -> Result<RecordBlockBuf> {
		Ok(RecordBlockBuf::from_bytes(self.file.read_block(addr)?, self.layout.record_size()))
	}

	pub fn write(&self, addr: u64, block: &RecordBlockBuf) -> Result<()> {
		self.file.write_block(addr, block.as_bytes())?;
		Ok(())
	}

	/// The chain's block addresses, root first. A chain longer than the
	/// file has blocks can only be a cycle and is reported as corruption.
	pub fn addresses(&self) -> Result<Vec<u64>> {
		let limit = self.file.header().block_count;
		let mut out = Vec::new();
		let mut addr = self.first;
		while addr != NULL_ADDR {
			if out.len() as u64 >= limit {
				return Err(Error::Storage(blockfile::Error::BadAddress(addr)));
			}
			out.push(addr);
			addr = self.read(addr)?.next();
		}
		Ok(out)
	}

	/// Decodes every live record in chain order.
	pub fn rows(&self) -> Result<Vec<Vec<Value>>> {
		let mut rows = Vec::new();
		for addr in self.addresses()? {
			let block = self.read(addr)?;
			for slot in 0..block.slots() {
				if let Some(cells) = self.layout.decode(block.record(slot)) {
					rows.push(cells);
				}
			}
		}
		Ok(rows)
	}

	/// Inserts into the first block with a free slot, chaining a fresh
	/// block onto the tail when every block is full.
	pub fn insert(&self, record: &[u8]) -> Result<()> {
		let mut addr = self.first;
		loop {
			let mut block = self.read(addr)?;
			if block.insert(record) {
				return self.write(addr, &block);
			}
			let next = block.next();
			if next != NULL_ADDR {
				addr = next;
				continue;
			}

			let fresh = self.file.alloc()?;
			let mut tail = RecordBlockBuf::empty(self.file.block_size() as usize, self.layout.record_size());
			let inserted = tail.insert(record);
			debug_assert!(inserted);
			self.write(fresh, &tail)?;
			block.set_next(fresh);
			self.write(addr, &block)?;
			debug!(target: "modestdb", "chained record block {} after {}", fresh, addr);
			return Ok(());
		}
	}

	/// Returns every block of the chain to the free list.
	pub fn free_all(&self) -> Result<()> {
		for addr in self.addresses()? {
			self.file.free(addr)?;
		}
		Ok(())
	}
}

/// Scans a table into a tuple set keyed by qualified column names.
pub(crate) fn scan(file: &BlockFile, table: &Table) -> Result<Set> {
	let layout = table.layout();
	let chain = RecordChain::new(file, &layout, table.first_block);
	Ok(chain.rows()?.into_iter().map(|cells| tuple_of(table, cells)).collect())
}

/// Builds the tuple for one decoded row.
pub(crate) fn tuple_of(table: &Table, cells: Vec<Value>) -> Tuple {
	let mut tuple = Tuple::new();
	for (column, cell) in table.columns.iter().zip(cells) {
		tuple.insert(table.qualified(column), cell);
	}
	tuple
}
