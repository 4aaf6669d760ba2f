//! The byte-level collaborators of the assembler: a source of lines and a sink of scalars.

use crate::isa::types::word::{Byte, Int, LuaInteger, LuaNumber, SizeT, Word};
use std::io::{self, BufRead, Write};

pub trait LineReader {
    /// Returns `Ok(None)` once the input is exhausted.
    fn next_line(&mut self) -> io::Result<Option<String>>;
}

/// Adapts any `BufRead` (files, stdin, byte slices) into a `LineReader`.
pub struct Lines<B> {
    inner: B,
}

impl<B: BufRead> Lines<B> {
    pub fn new(inner: B) -> Self {
        Lines { inner }
    }
}

impl<'a> Lines<&'a [u8]> {
    pub fn from_source(source: &'a str) -> Self {
        Lines::new(source.as_bytes())
    }
}

impl<B: BufRead> LineReader for Lines<B> {
    fn next_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.inner.read_line(&mut line)? == 0 {
            return Ok(None);
        }

        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        Ok(Some(line))
    }
}

/// A fixed-width value written in host byte order.
pub trait Scalar: Copy {
    const WIDTH: usize;

    fn encode(self, buf: &mut [u8]);
}

macro_rules! impl_scalar {
    ($($ty:ty),*) => {
        $(
            impl Scalar for $ty {
                const WIDTH: usize = std::mem::size_of::<$ty>();

                fn encode(self, buf: &mut [u8]) {
                    buf.copy_from_slice(&self.to_ne_bytes());
                }
            }
        )*
    };
}

// `Int`, `SizeT` and friends are aliases of these.
impl_scalar!(u8, i32, u32, i64, u64, usize, f64);

impl Scalar for bool {
    const WIDTH: usize = 1;

    fn encode(self, buf: &mut [u8]) {
        buf[0] = self as u8;
    }
}

const MAX_SCALAR_WIDTH: usize = 16;

pub trait ByteWriter {
    /// Returns the number of bytes actually written, which may be short.
    fn write_bytes(&mut self, buf: &[u8]) -> io::Result<usize>;

    fn write_all_bytes(&mut self, buf: &[u8]) -> io::Result<()> {
        let written = self.write_bytes(buf)?;
        if written != buf.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short write: {} of {} bytes", written, buf.len()),
            ));
        }
        Ok(())
    }

    fn write_scalar<T: Scalar>(&mut self, value: T) -> io::Result<()> {
        let mut buf = [0u8; MAX_SCALAR_WIDTH];
        value.encode(&mut buf[..T::WIDTH]);
        self.write_all_bytes(&buf[..T::WIDTH])
    }
}

impl<W: Write> ByteWriter for W {
    fn write_bytes(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut written = 0;
        while written < buf.len() {
            match self.write(&buf[written..]) {
                Ok(0) => break,
                Ok(n) => written += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => (),
                Err(err) => return Err(err),
            }
        }
        Ok(written)
    }
}

/// The widths the header advertises; these must agree with the `Scalar` impls used for the body.
pub fn host_widths() -> [Byte; 5] {
    [
        Int::WIDTH as Byte,
        SizeT::WIDTH as Byte,
        Word::WIDTH as Byte,
        LuaInteger::WIDTH as Byte,
        LuaNumber::WIDTH as Byte,
    ]
}
