use super::{chunk, conductor};
use std::fmt::Display;
use std::io;

/// A value tagged with the 1-based source line it came from, if it came from one.
#[derive(Debug, PartialEq, Eq)]
pub struct Located<T: Sized> {
    line: Option<usize>,
    val: T,
}

impl<T> Located<T> {
    pub fn at_line(line: usize, val: T) -> Self {
        Located {
            line: Some(line),
            val,
        }
    }

    pub fn line(&self) -> Option<usize> {
        self.line
    }

    pub fn value(&self) -> &T {
        &self.val
    }
}

impl<T> From<T> for Located<T> {
    fn from(val: T) -> Self {
        Located { line: None, val }
    }
}

impl<T: Display> Display for Located<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.line {
            Some(line) => write!(f, "error parsing line {}: {}", line, self.val),
            None => write!(f, "error at end of input: {}", self.val),
        }
    }
}

#[derive(Debug)]
pub enum Error {
    Parse(Located<conductor::Error>),
    Read(io::Error),
    Write(chunk::Error),
}

impl Error {
    /// The source line the error was raised on, if it was raised while reading a line.
    pub fn line(&self) -> Option<usize> {
        match self {
            Error::Parse(err) => err.line(),
            Error::Read(_) | Error::Write(_) => None,
        }
    }
}

impl From<Located<conductor::Error>> for Error {
    fn from(err: Located<conductor::Error>) -> Self {
        Error::Parse(err)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Read(err)
    }
}

impl From<chunk::Error> for Error {
    fn from(err: chunk::Error) -> Self {
        Error::Write(err)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Parse(err) => write!(f, "{}", err),
            Error::Read(err) => write!(f, "failed to read source: {}", err),
            Error::Write(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for Error {}
