pub mod assets;
pub(crate) mod common;

pub mod io;
pub mod isa;

pub mod assembler;

pub mod cli;
