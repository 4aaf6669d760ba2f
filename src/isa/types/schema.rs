use super::word::Field;
use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// The operand shapes a single operand slot of an opcode accepts.
    #[derive(Default)]
    pub struct OperandKinds: u32 {
        const STACK    = 1 << 0;
        const UPVALUE  = 1 << 1;
        const LOCATION = 1 << 2;
        const CONSTANT = 1 << 3;
        const EMBEDDED = 1 << 4;
        const PROTO    = 1 << 5;

        /// Either a stack slot or a constant, distinguished by `BIT_RK`.
        const RK = Self::STACK.bits | Self::CONSTANT.bits;
    }
}

impl fmt::Display for OperandKinds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (OperandKinds::STACK, "%stack"),
            (OperandKinds::UPVALUE, "@upvalue"),
            (OperandKinds::LOCATION, "$label"),
            (OperandKinds::CONSTANT, "const"),
            (OperandKinds::EMBEDDED, "literal"),
            (OperandKinds::PROTO, "function"),
        ];
        let accepted = names
            .iter()
            .filter(|(kind, _)| self.contains(*kind))
            .map(|(_, name)| *name)
            .collect::<Vec<_>>();
        write!(f, "{}", accepted.join("|"))
    }
}

/// Where a decoded operand value ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dest {
    Field(Field),
    /// Always carried by a trailing `EXTRAARG` word.
    Extra,
    /// Stored in C when it fits, otherwise C is zeroed and the value moves to an `EXTRAARG` word.
    COrExtra,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperandDef {
    pub dest: Dest,
    pub kinds: OperandKinds,
}

impl OperandDef {
    pub const fn new(dest: Dest, kinds: OperandKinds) -> OperandDef {
        OperandDef { dest, kinds }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpDef {
    pub operands: Vec<OperandDef>,
}

impl OpDef {
    pub fn with(operands: Vec<OperandDef>) -> OpDef {
        OpDef { operands }
    }

    pub fn arity(&self) -> usize {
        self.operands.len()
    }
}
