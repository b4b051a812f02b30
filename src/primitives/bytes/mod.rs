#![forbid(unsafe_code)]
//! Wire codec shared by every record decoder in the storage layer.
//!
//! Records are scanned directly from mapped or pooled buffers supplied by
//! the storage host, so every decode is bounds-checked and fails by
//! `Result` rather than panicking. Reading past a declared length boundary
//! is a correctness bug, not an efficiency concern.

pub mod ord {
    //! Big-endian scalar encoders.
    //!
    //! Network byte order keeps records lexicographically comparable when
    //! embedded in storage sort keys.

    use core::convert::TryInto;

    use crate::types::{Result, VeilError};

    const U32_LEN: usize = core::mem::size_of::<u32>();
    const U64_LEN: usize = core::mem::size_of::<u64>();

    /// Appends a u32 in big-endian byte order.
    pub fn put_u32_be(out: &mut Vec<u8>, v: u32) {
        out.extend_from_slice(&v.to_be_bytes());
    }

    /// Decodes a u32 from the front of `src` in big-endian byte order.
    pub fn get_u32_be(src: &[u8]) -> Result<u32> {
        let head = src.get(..U32_LEN).ok_or(VeilError::Truncated {
            needed: U32_LEN,
            remaining: src.len(),
        })?;
        let bytes: [u8; U32_LEN] = head.try_into().expect("slice has exactly 4 bytes");
        Ok(u32::from_be_bytes(bytes))
    }

    /// Appends a u64 in big-endian byte order.
    pub fn put_u64_be(out: &mut Vec<u8>, v: u64) {
        out.extend_from_slice(&v.to_be_bytes());
    }

    /// Decodes a u64 from the front of `src` in big-endian byte order.
    pub fn get_u64_be(src: &[u8]) -> Result<u64> {
        let head = src.get(..U64_LEN).ok_or(VeilError::Truncated {
            needed: U64_LEN,
            remaining: src.len(),
        })?;
        let bytes: [u8; U64_LEN] = head.try_into().expect("slice has exactly 8 bytes");
        Ok(u64::from_be_bytes(bytes))
    }
}

pub mod buf {
    //! A bounds-checked slice cursor for record parsing.

    use core::fmt;

    use crate::types::{Result, VeilError};

    /// A cursor reading bytes from a slice with offset tracking.
    ///
    /// Unlike an unchecked splitter, `take` never reads past the end of the
    /// underlying buffer; overreads surface as [`VeilError::Truncated`].
    pub struct Cursor<'a> {
        buf: &'a [u8],
        off: usize,
    }

    impl<'a> Cursor<'a> {
        /// Creates a new cursor starting at offset 0.
        pub fn new(buf: &'a [u8]) -> Self {
            Self { buf, off: 0 }
        }

        /// Takes the next `n` bytes, advancing the offset.
        pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
            let remaining = self.remaining();
            if n > remaining {
                return Err(VeilError::Truncated {
                    needed: n,
                    remaining,
                });
            }
            let slice = &self.buf[self.off..self.off + n];
            self.off += n;
            Ok(slice)
        }

        /// Takes a single byte.
        pub fn u8(&mut self) -> Result<u8> {
            Ok(self.take(1)?[0])
        }

        /// Takes a big-endian u32.
        pub fn u32_be(&mut self) -> Result<u32> {
            let bytes = self.take(4)?;
            Ok(u32::from_be_bytes(bytes.try_into().expect("4-byte slice")))
        }

        /// Takes a big-endian u64.
        pub fn u64_be(&mut self) -> Result<u64> {
            let bytes = self.take(8)?;
            Ok(u64::from_be_bytes(bytes.try_into().expect("8-byte slice")))
        }

        /// Returns the number of bytes remaining.
        pub fn remaining(&self) -> usize {
            self.buf.len().saturating_sub(self.off)
        }

        /// True when every byte has been consumed.
        pub fn is_empty(&self) -> bool {
            self.remaining() == 0
        }

        /// Fails unless the cursor has consumed the whole buffer.
        pub fn expect_end(&self) -> Result<()> {
            if self.is_empty() {
                Ok(())
            } else {
                Err(VeilError::Corruption("trailing bytes after payload"))
            }
        }
    }

    impl fmt::Debug for Cursor<'_> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("Cursor")
                .field("off", &self.off)
                .field("remaining", &self.remaining())
                .finish()
        }
    }
}

pub mod lp {
    //! Length-prefixed byte arrays and UTF-8 strings.
    //!
    //! The prefix is a 4-byte big-endian unsigned length. A zero-length
    //! array round-trips as prefix `0` with no payload; it is a normal
    //! value, never an end-of-stream marker.

    use super::buf::Cursor;
    use super::ord;
    use crate::types::{Result, VeilError};

    /// Appends a length-prefixed byte array.
    pub fn put_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
        debug_assert!(bytes.len() <= u32::MAX as usize, "byte array too long");
        ord::put_u32_be(out, bytes.len() as u32);
        out.extend_from_slice(bytes);
    }

    /// Appends a length-prefixed UTF-8 string.
    pub fn put_str(out: &mut Vec<u8>, s: &str) {
        put_bytes(out, s.as_bytes());
    }

    /// Reads a length prefix then exactly that many bytes.
    pub fn get_bytes<'a>(cur: &mut Cursor<'a>) -> Result<&'a [u8]> {
        let len = cur.u32_be()? as usize;
        cur.take(len)
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn get_str(cur: &mut Cursor<'_>) -> Result<String> {
        let bytes = get_bytes(cur)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| VeilError::Corruption("length-prefixed string not valid UTF-8"))
    }
}
