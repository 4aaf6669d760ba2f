pub mod chunk;
pub mod conductor;
pub mod listing;
pub mod model;
pub mod operand;
pub mod resolve;
pub mod tokenize;
pub mod types;

pub use model::Program;
pub use types::{Error, Located};

use crate::io::{ByteWriter, LineReader, Lines};
use conductor::Assembler;

#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Reject input that ends inside a code, const or upvalue segment.
    pub strict_segments: bool,
}

/// Reads every line of `reader` and returns the finished function table. Nothing is written.
pub fn assemble_program<R: LineReader>(
    reader: &mut R,
    config: &Config,
) -> Result<Program, Error> {
    let mut asm = Assembler::new(config.clone());
    let mut line_no = 0;
    while let Some(line) = reader.next_line()? {
        line_no += 1;
        asm.feed_line(&line)
            .map_err(|err| Located::at_line(line_no, err))?;
    }

    let program = asm.finish().map_err(Located::<conductor::Error>::from)?;
    Ok(program)
}

pub fn assemble<R: LineReader, W: ByteWriter>(
    reader: &mut R,
    writer: &mut W,
    config: &Config,
) -> Result<(), Error> {
    let program = assemble_program(reader, config)?;
    chunk::write_chunk(&program, writer)?;
    Ok(())
}

pub fn assemble_str(source: &str, config: &Config) -> Result<Vec<u8>, Error> {
    let mut bytes = Vec::new();
    assemble(&mut Lines::from_source(source), &mut bytes, config)?;
    Ok(bytes)
}
