// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Block-granular storage over a single file.
//!
//! The file is a sequence of fixed-size blocks addressed from 1; block 1 is
//! the database header. `BlockFile` is the only thing that touches the file:
//! callers deal in block addresses and whole-block buffers. A singly-linked
//! free list threaded through the first eight bytes of each free block
//! recycles space; when the list is empty the file grows by one block.
//!
//! All multi-byte fields are little-endian.

mod error;

use std::{
	fs::{File, OpenOptions},
	io::{ErrorKind, Read, Seek, SeekFrom, Write},
	path::Path,
};

use bytes::{Buf, BufMut};
use log::debug;
use parking_lot::{Mutex, RwLock};

pub use self::error::{Error, Result};

/// Magic word at offset 0 of every database file.
pub const MAGIC: u32 = 0x8709_F625;
/// Smallest accepted block size.
pub const MIN_BLOCK_SIZE: u32 = 4096;
/// Largest accepted block size.
pub const MAX_BLOCK_SIZE: u32 = 1 << 20;
/// Address of the header block.
pub const HEADER_BLOCK: u64 = 1;
/// The null block address; terminates chains and empty lists.
pub const NULL_ADDR: u64 = 0;

const HEADER_LEN: usize = 72;

/// The database header persisted in block 1.
///
/// `block_count` doubles as the high-water mark of ever-allocated addresses;
/// the four trailing counters are monotonically increasing id generators for
/// the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
	pub block_size: u32,
	pub block_count: u64,
	pub free_block_count: u64,
	pub free_list_head: u64,
	pub free_list_tail: u64,
	pub table_count: u64,
	pub column_count: u64,
	pub default_numeric_count: u64,
	pub default_char_count: u64,
}

impl Header {
	fn new(block_size: u32) -> Header {
		Header {
			block_size,
			block_count: 1,
			free_block_count: 0,
			free_list_head: NULL_ADDR,
			free_list_tail: NULL_ADDR,
			table_count: 0,
			column_count: 0,
			default_numeric_count: 0,
			default_char_count: 0,
		}
	}

	fn encode(&self) -> Vec<u8> {
		let mut out = Vec::with_capacity(HEADER_LEN);
		out.put_u32_le(MAGIC);
		out.put_u32_le(self.block_size);
		out.put_u64_le(self.block_count);
		out.put_u64_le(self.free_block_count);
		out.put_u64_le(self.free_list_head);
		out.put_u64_le(self.free_list_tail);
		out.put_u64_le(self.table_count);
		out.put_u64_le(self.column_count);
		out.put_u64_le(self.default_numeric_count);
		out.put_u64_le(self.default_char_count);
		out
	}

	fn decode(mut bytes: &[u8]) -> Result<Header> {
		if bytes.get_u32_le() != MAGIC {
			return Err(Error::InvalidFile);
		}
		let block_size = bytes.get_u32_le();
		if !valid_block_size(block_size) {
			return Err(Error::InvalidBlockSize(block_size));
		}
		Ok(Header {
			block_size,
			block_count: bytes.get_u64_le(),
			free_block_count: bytes.get_u64_le(),
			free_list_head: bytes.get_u64_le(),
			free_list_tail: bytes.get_u64_le(),
			table_count: bytes.get_u64_le(),
			column_count: bytes.get_u64_le(),
			default_numeric_count: bytes.get_u64_le(),
			default_char_count: bytes.get_u64_le(),
		})
	}
}

fn valid_block_size(size: u32) -> bool {
	size.is_power_of_two() && (MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&size)
}

/// A block-addressed database file.
///
/// Reads and writes are whole-block; shorter buffers are right-padded with
/// zeroes on write. Interior locks make the handle shareable: the header
/// lock serializes allocator state, the file lock serializes raw I/O, and
/// the two are always taken in that order.
pub struct BlockFile {
	file: Mutex<File>,
	header: RwLock<Header>,
}

impl BlockFile {
	/// Creates (or truncates) a database file with the given block size and
	/// writes a fresh header.
	pub fn create(path: &Path, block_size: u32) -> Result<BlockFile> {
		if !valid_block_size(block_size) {
			return Err(Error::InvalidBlockSize(block_size));
		}

		let file = OpenOptions::new().read(true).write(true).create(true).truncate(true).open(path)?;
		let header = Header::new(block_size);
		let bf = BlockFile { file: Mutex::new(file), header: RwLock::new(header) };
		bf.write_at(block_size, HEADER_BLOCK, &header.encode())?;
		debug!(target: "blockfile", "created {} with {}-byte blocks", path.display(), block_size);
		Ok(bf)
	}

	/// Opens an existing database file, validating its magic word.
	pub fn open(path: &Path) -> Result<BlockFile> {
		let mut file = OpenOptions::new().read(true).write(true).open(path)?;

		let mut raw = [0u8; HEADER_LEN];
		file.seek(SeekFrom::Start(0))?;
		if let Err(err) = file.read_exact(&mut raw) {
			return Err(match err.kind() {
				ErrorKind::UnexpectedEof => Error::InvalidFile,
				_ => Error::Io(err),
			});
		}
		let header = Header::decode(&raw)?;

		debug!(target: "blockfile", "opened {}: {} blocks, {} free", path.display(), header.block_count, header.free_block_count);
		Ok(BlockFile { file: Mutex::new(file), header: RwLock::new(header) })
	}

	/// Snapshot of the current header.
	pub fn header(&self) -> Header {
		*self.header.read()
	}

	pub fn block_size(&self) -> u32 {
		self.header.read().block_size
	}

	/// Reads the whole block at `addr`.
	pub fn read_block(&self, addr: u64) -> Result<Vec<u8>> {
		let header = self.header.read();
		check_addr(addr, &header)?;
		self.read_at(header.block_size, addr)
	}

	/// Writes `bytes` as the whole block at `addr`, zero-padding to the
	/// block size. Buffers longer than a block are a programming error.
	pub fn write_block(&self, addr: u64, bytes: &[u8]) -> Result<()> {
		let header = self.header.read();
		check_addr(addr, &header)?;
		self.write_at(header.block_size, addr, bytes)
	}

	/// Hands out a usable block address: the head of the free list when
	/// there is one, otherwise a fresh block appended to the file. The
	/// returned block's contents are unspecified; callers overwrite it.
	pub fn alloc(&self) -> Result<u64> {
		let mut header = self.header.write();

		if header.free_list_head == NULL_ADDR {
			let addr = header.block_count + 1;
			self.write_at(header.block_size, addr, &[])?;
			header.block_count = addr;
			self.write_at(header.block_size, HEADER_BLOCK, &header.encode())?;
			debug!(target: "blockfile", "extended file to block {}", addr);
			Ok(addr)
		} else {
			let addr = header.free_list_head;
			let block = self.read_at(header.block_size, addr)?;
			let next = (&block[..8]).get_u64_le();
			header.free_list_head = next;
			if next == NULL_ADDR {
				header.free_list_tail = NULL_ADDR;
			}
			header.free_block_count -= 1;
			self.write_at(header.block_size, HEADER_BLOCK, &header.encode())?;
			debug!(target: "blockfile", "reused free block {}", addr);
			Ok(addr)
		}
	}

	/// Returns a block to the free list. Freed blocks stay counted in
	/// `block_count`; the file never shrinks. Freeing an address twice
	/// corrupts the list and is not detected.
	pub fn free(&self, addr: u64) -> Result<()> {
		let mut header = self.header.write();
		check_addr(addr, &header)?;

		let mut block = self.read_at(header.block_size, addr)?;
		block[..8].copy_from_slice(&header.free_list_head.to_le_bytes());
		self.write_at(header.block_size, addr, &block)?;

		if header.free_list_head == NULL_ADDR {
			header.free_list_tail = addr;
		}
		header.free_list_head = addr;
		header.free_block_count += 1;
		self.write_at(header.block_size, HEADER_BLOCK, &header.encode())
	}

	/// Applies `f` to the header and persists the result. Used by the
	/// engine to bump its id-generator counters.
	pub fn update_header<F: FnOnce(&mut Header)>(&self, f: F) -> Result<()> {
		let mut header = self.header.write();
		f(&mut header);
		self.write_at(header.block_size, HEADER_BLOCK, &header.encode())
	}

	fn read_at(&self, block_size: u32, addr: u64) -> Result<Vec<u8>> {
		let mut buf = vec![0; block_size as usize];
		let mut file = self.file.lock();
		file.seek(SeekFrom::Start(offset(addr, block_size)))?;
		file.read_exact(&mut buf)?;
		Ok(buf)
	}

	fn write_at(&self, block_size: u32, addr: u64, bytes: &[u8]) -> Result<()> {
		assert!(bytes.len() <= block_size as usize, "buffer exceeds block size");

		let mut file = self.file.lock();
		file.seek(SeekFrom::Start(offset(addr, block_size)))?;
		if bytes.len() == block_size as usize {
			file.write_all(bytes)?;
		} else {
			let mut padded = vec![0; block_size as usize];
			padded[..bytes.len()].copy_from_slice(bytes);
			file.write_all(&padded)?;
		}
		Ok(())
	}
}

fn offset(addr: u64, block_size: u32) -> u64 {
	(addr - 1) * block_size as u64
}

fn check_addr(addr: u64, header: &Header) -> Result<()> {
	if addr == NULL_ADDR || addr > header.block_count {
		return Err(Error::BadAddress(addr));
	}
	Ok(())
}
