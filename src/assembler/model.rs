use super::resolve::Patches;
use crate::isa::types::word::{Byte, Instruction, Int};
use derive_more::{Constructor, Display};
use std::collections::HashMap;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use std::fmt;

/*
    What the assembler accumulates, per function:

        1.  `Constant`s: the literal values a function can load, deduplicated structurally inside
            one function by a `ConstantPool`. Pools are never shared between functions, so a
            constant index is only meaningful relative to the function which owns it.

        2.  `Upvalue`s: descriptors telling the VM where each captured variable comes from, in
            declaration order.

        3.  `Function`s: the immutable record of a finished `.func` block. Its subroutine
            references are still *names* at this point; they become proto indices only when the
            function is written, since a proto list is local to each writer invocation.

    A `Program` is the table of every finished function plus the chunk-level upvalue count.
*/

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Nil,
    Bool(bool),
    Number(f64),
    String(Vec<u8>),
}

impl Constant {
    pub const TNIL: Byte = 0;
    pub const TBOOLEAN: Byte = 1;
    pub const TNUMBER: Byte = 3;
    pub const TSTRING: Byte = 4;

    pub fn type_tag(&self) -> Byte {
        match self {
            Constant::Nil => Constant::TNIL,
            Constant::Bool(_) => Constant::TBOOLEAN,
            Constant::Number(_) => Constant::TNUMBER,
            Constant::String(_) => Constant::TSTRING,
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Nil => write!(f, "nil"),
            Constant::Bool(b) => write!(f, "{}", b),
            Constant::Number(n) => write!(f, "{}", n),
            Constant::String(bytes) => {
                write!(f, "\"")?;
                for b in bytes.iter().flat_map(|b| std::ascii::escape_default(*b)) {
                    write!(f, "{}", b as char)?;
                }
                write!(f, "\"")
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    pub fn position(&self, constant: &Constant) -> Option<usize> {
        self.entries.iter().position(|c| c == constant)
    }

    /// Returns the index of `constant`, appending it if no structurally equal entry exists.
    pub fn intern(&mut self, constant: Constant) -> usize {
        match self.position(&constant) {
            Some(idx) => idx,
            None => {
                self.entries.push(constant);
                self.entries.len() - 1
            }
        }
    }

    pub fn get(&self, idx: usize) -> Option<&Constant> {
        self.entries.get(idx)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Constant> {
        self.entries.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Constructor)]
pub struct Upvalue {
    pub in_stack: Byte,
    pub index: Byte,
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum VarargMode {
    #[display(fmt = "fixed")]
    Fixed = 0,
    #[display(fmt = "vararg")]
    Vararg = 1,
    #[display(fmt = "needs-arg")]
    NeedsArg = 2,
}

impl VarargMode {
    pub fn from_byte(raw: Byte) -> Option<VarargMode> {
        VarargMode::from_u8(raw)
    }
}

/// Identifies a `.func` block by declaration order.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Constructor)]
pub struct FunctionHeader {
    pub max_stack_size: Byte,
    pub params: Byte,
    pub vararg: VarargMode,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub header: FunctionHeader,
    pub instructions: Vec<Instruction>,
    pub constants: ConstantPool,
    pub upvalues: Vec<Upvalue>,
    /// Names of referenced subroutines, in first-use order. This is the proto order.
    pub subroutines: Vec<String>,
    /// Instruction indices whose `Bx` awaits the proto index of the named subroutine.
    pub subroutine_patches: Patches,
    pub line_info: Vec<Int>,
}

pub const MAIN_FUNCTION: &str = "main";

#[derive(Debug, Clone)]
pub struct Program {
    pub upvalue_count: Byte,
    pub functions: HashMap<String, Function>,
}

impl Program {
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    pub fn main(&self) -> Option<&Function> {
        self.function(MAIN_FUNCTION)
    }
}
