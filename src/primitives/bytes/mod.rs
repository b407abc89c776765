#![forbid(unsafe_code)]
//! Big-endian encoding helpers and a checked read cursor.

pub mod be {
    //! Appending big-endian writers for fixed-width integers.

    /// Appends a single byte.
    #[inline]
    pub fn put_u8(dst: &mut Vec<u8>, v: u8) {
        dst.push(v);
    }

    /// Appends a big-endian `i32`.
    #[inline]
    pub fn put_i32(dst: &mut Vec<u8>, v: i32) {
        dst.extend_from_slice(&v.to_be_bytes());
    }

    /// Appends a big-endian `i64`.
    #[inline]
    pub fn put_i64(dst: &mut Vec<u8>, v: i64) {
        dst.extend_from_slice(&v.to_be_bytes());
    }

    /// Appends a big-endian `u16`.
    #[inline]
    pub fn put_u16(dst: &mut Vec<u8>, v: u16) {
        dst.extend_from_slice(&v.to_be_bytes());
    }

    /// Appends a big-endian `u32`.
    #[inline]
    pub fn put_u32(dst: &mut Vec<u8>, v: u32) {
        dst.extend_from_slice(&v.to_be_bytes());
    }
}

pub mod buf {
    //! A slice-backed cursor whose reads fail instead of panicking on short input.

    use core::convert::TryInto;
    use core::fmt;

    /// A cursor for reading bytes from a slice with offset tracking.
    pub struct Cursor<'a> {
        /// The underlying byte slice.
        pub buf: &'a [u8],
        /// Current read offset.
        pub off: usize,
    }

    impl<'a> Cursor<'a> {
        /// Creates a new cursor starting at offset 0.
        pub fn new(buf: &'a [u8]) -> Self {
            Self { buf, off: 0 }
        }

        /// Takes the next `n` bytes, or `None` (leaving the offset untouched) when
        /// fewer than `n` remain.
        pub fn take(&mut self, n: usize) -> Option<&'a [u8]> {
            let end = self.off.checked_add(n)?;
            if end > self.buf.len() {
                return None;
            }
            let slice = &self.buf[self.off..end];
            self.off = end;
            Some(slice)
        }

        fn array<const N: usize>(&mut self) -> Option<[u8; N]> {
            self.take(N)?.try_into().ok()
        }

        /// Reads one byte.
        pub fn get_u8(&mut self) -> Option<u8> {
            self.take(1).map(|b| b[0])
        }

        /// Reads a big-endian `u16`.
        pub fn get_u16(&mut self) -> Option<u16> {
            self.array().map(u16::from_be_bytes)
        }

        /// Reads a big-endian `u32`.
        pub fn get_u32(&mut self) -> Option<u32> {
            self.array().map(u32::from_be_bytes)
        }

        /// Reads a big-endian `i32`.
        pub fn get_i32(&mut self) -> Option<i32> {
            self.array().map(i32::from_be_bytes)
        }

        /// Reads a big-endian `i64`.
        pub fn get_i64(&mut self) -> Option<i64> {
            self.array().map(i64::from_be_bytes)
        }

        /// Returns the number of bytes remaining in the buffer.
        pub fn remaining(&self) -> usize {
            self.buf.len().saturating_sub(self.off)
        }

        /// Returns `true` once every byte has been consumed.
        pub fn is_exhausted(&self) -> bool {
            self.remaining() == 0
        }
    }

    impl<'a> fmt::Debug for Cursor<'a> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("Cursor")
                .field("off", &self.off)
                .field("remaining", &self.remaining())
                .finish()
        }
    }
}
