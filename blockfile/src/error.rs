// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::{error, fmt, io, result};

/// Block-file error.
#[derive(Debug)]
pub enum Error {
	/// Requested block size is out of range or not a power of two.
	InvalidBlockSize(u32),
	/// The file's magic word does not match; not a database file.
	InvalidFile,
	/// Logical block address is zero or past the end of the file.
	BadAddress(u64),
	/// Underlying read or write failure.
	Io(io::Error),
}

/// Block-file result.
pub type Result<T> = result::Result<T, Error>;

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Error::InvalidBlockSize(size) => write!(f, "invalid block size {}", size),
			Error::InvalidFile => write!(f, "magic mismatch; not a database file"),
			Error::BadAddress(addr) => write!(f, "block address {} out of bounds", addr),
			Error::Io(err) => write!(f, "i/o error: {}", err),
		}
	}
}

impl error::Error for Error {
	fn source(&self) -> Option<&(dyn error::Error + 'static)> {
		match self {
			Error::Io(err) => Some(err),
			_ => None,
		}
	}
}

impl From<io::Error> for Error {
	fn from(err: io::Error) -> Error {
		Error::Io(err)
	}
}
