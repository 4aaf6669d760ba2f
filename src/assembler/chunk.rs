use super::model::{Constant, Function, Program, MAIN_FUNCTION};
use crate::io::{host_widths, ByteWriter};
use crate::isa::types::word::{
    Byte, Field, FieldOverflow, Instruction, Int, LuaInteger, LuaNumber, SizeT,
};
use itertools::Itertools;
use log::{debug, trace};
use std::convert::TryFrom;
use std::fmt::Display;
use std::io;

pub const LUA_SIGNATURE: &[u8; 4] = b"\x1bLua";
pub const LUAC_VERSION: Byte = 0x53;
pub const LUAC_FORMAT: Byte = 0;
pub const LUAC_DATA: &[u8; 6] = b"\x19\x93\r\n\x1a\n";
pub const LUAC_INT: LuaInteger = 0x5678;
pub const LUAC_NUM: LuaNumber = 370.5;

/// Strings shorter than this get a one-byte length prefix.
const SHORT_STRING_LIMIT: usize = 0xFE;
const LONG_STRING_MARKER: Byte = 0xFF;

#[derive(Debug)]
pub enum Error {
    NoMain,
    MissingSubroutine { caller: String, name: String },
    RecursiveSubroutine(Vec<String>),
    Field(String, FieldOverflow),
    TooLarge(&'static str, usize),
    Io(io::Error),
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::NoMain => write!(f, "no {} function", MAIN_FUNCTION),
            Error::MissingSubroutine { caller, name } => {
                write!(f, "no such function: {} (used by '{}')", name, caller)
            }
            Error::RecursiveSubroutine(chain) => write!(
                f,
                "function cannot contain itself as a subroutine: {}",
                chain.iter().join(" -> ")
            ),
            Error::Field(name, err) => write!(f, "in function '{}': {}", name, err),
            Error::TooLarge(what, len) => write!(f, "too many {} ({})", what, len),
            Error::Io(err) => write!(f, "write failed: {}", err),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

/// Writes `program` as a binary chunk rooted at its `main` function.
pub fn write_chunk<W: ByteWriter>(program: &Program, out: &mut W) -> Result<(), Error> {
    let main = program.main().ok_or(Error::NoMain)?;

    write_header(out)?;
    out.write_scalar(program.upvalue_count)?;

    let mut stack = Vec::new();
    write_function(program, main, out, &mut stack)
}

pub fn write_header<W: ByteWriter>(out: &mut W) -> Result<(), Error> {
    out.write_all_bytes(LUA_SIGNATURE)?;
    out.write_scalar(LUAC_VERSION)?;
    out.write_scalar(LUAC_FORMAT)?;
    out.write_all_bytes(LUAC_DATA)?;
    out.write_all_bytes(&host_widths())?;
    out.write_scalar(LUAC_INT)?;
    out.write_scalar(LUAC_NUM)?;
    Ok(())
}

fn count(what: &'static str, len: usize) -> Result<Int, Error> {
    Int::try_from(len).map_err(|_| Error::TooLarge(what, len))
}

fn write_string<W: ByteWriter>(out: &mut W, bytes: &[u8]) -> Result<(), Error> {
    let len = bytes.len();
    if len < SHORT_STRING_LIMIT {
        out.write_scalar((len + 1) as Byte)?;
    } else {
        out.write_scalar(LONG_STRING_MARKER)?;
        out.write_scalar::<SizeT>(len + 1)?;
    }
    out.write_all_bytes(bytes)?;
    Ok(())
}

fn write_constant<W: ByteWriter>(out: &mut W, constant: &Constant) -> Result<(), Error> {
    out.write_scalar(constant.type_tag())?;
    match constant {
        Constant::Nil => (),
        Constant::Bool(b) => out.write_scalar(*b)?,
        Constant::Number(n) => out.write_scalar(*n)?,
        Constant::String(s) => write_string(out, s)?,
    }
    Ok(())
}

/// Assigns each referenced subroutine its proto index, in first-use order, and patches the
/// `Bx` of every instruction that names it.
pub(crate) fn link_protos<'p>(
    program: &'p Program,
    func: &Function,
) -> Result<(Vec<Instruction>, Vec<&'p Function>), Error> {
    let mut instructions = func.instructions.clone();
    let mut patches = func.subroutine_patches.clone();
    let mut protos = Vec::with_capacity(func.subroutines.len());

    for (idx, name) in func.subroutines.iter().enumerate() {
        let sub = program
            .function(name)
            .ok_or_else(|| Error::MissingSubroutine {
                caller: func.name.clone(),
                name: name.clone(),
            })?;
        protos.push(sub);

        for site in patches.take(name) {
            trace!("'{}': proto {} is '{}' at {}", func.name, idx, name, site);
            instructions[site]
                .set(Field::Bx, idx as i64)
                .map_err(|err| Error::Field(func.name.clone(), err))?;
        }
    }

    Ok((instructions, protos))
}

fn write_function<'p, W: ByteWriter>(
    program: &'p Program,
    func: &'p Function,
    out: &mut W,
    stack: &mut Vec<&'p str>,
) -> Result<(), Error> {
    if stack.contains(&func.name.as_str()) {
        let mut chain: Vec<String> = stack.iter().map(|s| s.to_string()).collect();
        chain.push(func.name.clone());
        return Err(Error::RecursiveSubroutine(chain));
    }
    stack.push(&func.name);

    debug!("writing function '{}'", func.name);
    let (instructions, protos) = link_protos(program, func)?;

    write_string(out, func.name.as_bytes())?;
    // Line range of the definition, which is not tracked.
    out.write_scalar::<Int>(0)?;
    out.write_scalar::<Int>(0)?;
    out.write_scalar(func.header.params)?;
    out.write_scalar(func.header.vararg as Byte)?;
    out.write_scalar(func.header.max_stack_size)?;

    out.write_scalar(count("instructions", instructions.len())?)?;
    for inst in &instructions {
        out.write_scalar(inst.word())?;
    }

    out.write_scalar(count("constants", func.constants.len())?)?;
    for constant in func.constants.iter() {
        write_constant(out, constant)?;
    }

    out.write_scalar(count("upvalues", func.upvalues.len())?)?;
    for upvalue in &func.upvalues {
        out.write_scalar(upvalue.in_stack)?;
        out.write_scalar(upvalue.index)?;
    }

    out.write_scalar(count("protos", protos.len())?)?;
    for proto in protos {
        write_function(program, proto, out, stack)?;
    }

    out.write_scalar(count("line info entries", func.line_info.len())?)?;
    for line in &func.line_info {
        out.write_scalar(*line)?;
    }

    // Local variable and upvalue name tables.
    out.write_scalar::<Int>(0)?;
    out.write_scalar::<Int>(0)?;

    stack.pop();
    Ok(())
}
