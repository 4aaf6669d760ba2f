use derive_more::Display;
use enum_map::Enum;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use static_assertions::const_assert;
use std::fmt;
use strum_macros::{EnumIter, IntoStaticStr};

pub type Byte = u8;
pub type Word = u32;

// Host scalar types of the target loader. Their widths are recorded in the chunk header.
pub type Int = i32;
pub type SizeT = usize;
pub type LuaInteger = i64;
pub type LuaNumber = f64;

pub const OPCODE_WIDTH: u32 = 6;
pub const A_WIDTH: u32 = 8;
pub const B_WIDTH: u32 = 9;
pub const C_WIDTH: u32 = 9;
pub const BX_WIDTH: u32 = B_WIDTH + C_WIDTH;
pub const AX_WIDTH: u32 = A_WIDTH + BX_WIDTH;

const_assert!(OPCODE_WIDTH + AX_WIDTH == 32);

pub const MAXARG_C: u32 = (1 << C_WIDTH) - 1;
pub const MAXARG_BX: u32 = (1 << BX_WIDTH) - 1;
pub const MAXARG_SBX: i64 = (MAXARG_BX >> 1) as i64;

/// Set in a 9-bit B/C field when it addresses the constant pool instead of a stack slot.
pub const BIT_RK: u32 = 1 << (B_WIDTH - 1);

/*
    Instruction words are laid out as follows (most significant bit first):

        BBBBBBBBB CCCCCCCCC AAAAAAAA OOOOOO     iABC
        BxBxBxBxBxBxBxBxBxBx AAAAAAAA OOOOOO    iABx / iAsBx
        AxAxAxAxAxAxAxAxAxAxAxAxAxAx OOOOOO     iAx

    `sBx` is stored in the `Bx` field biased by `MAXARG_SBX`, so that the full signed range
    fits in an unsigned field.
*/

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    A,
    B,
    C,
    Bx,
    #[display(fmt = "sBx")]
    SBx,
    Ax,
}

impl Field {
    pub const fn pos(self) -> u32 {
        match self {
            Field::A | Field::Ax => OPCODE_WIDTH,
            Field::C | Field::Bx | Field::SBx => OPCODE_WIDTH + A_WIDTH,
            Field::B => OPCODE_WIDTH + A_WIDTH + C_WIDTH,
        }
    }

    pub const fn width(self) -> u32 {
        match self {
            Field::A => A_WIDTH,
            Field::B => B_WIDTH,
            Field::C => C_WIDTH,
            Field::Bx | Field::SBx => BX_WIDTH,
            Field::Ax => AX_WIDTH,
        }
    }

    const fn mask(self) -> Word {
        ((1 << self.width()) - 1) << self.pos()
    }

    /// The inclusive range of values this field can hold, as seen by the assembler.
    pub fn range(self) -> (i64, i64) {
        match self {
            Field::SBx => (-MAXARG_SBX, MAXARG_SBX),
            _ => (0, (1i64 << self.width()) - 1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldOverflow {
    pub field: Field,
    pub value: i64,
}

impl fmt::Display for FieldOverflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (lo, hi) = self.field.range();
        write!(
            f,
            "value {} does not fit in field {} (range {}..={})",
            self.value, self.field, lo, hi
        )
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, Enum, EnumIter, IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum OpCode {
    Move,
    LoadK,
    LoadKx,
    LoadBool,
    LoadNil,
    GetUpval,
    GetTabUp,
    GetTable,
    SetTabUp,
    SetUpval,
    SetTable,
    NewTable,
    #[strum(serialize = "self")]
    SelfOp,
    Add,
    Sub,
    Mul,
    Mod,
    Pow,
    Div,
    IDiv,
    BAnd,
    BOr,
    BXor,
    Shl,
    Shr,
    Unm,
    BNot,
    Not,
    Len,
    Concat,
    Jmp,
    Eq,
    Lt,
    Le,
    Test,
    TestSet,
    Call,
    TailCall,
    Return,
    ForLoop,
    ForPrep,
    TForCall,
    TForLoop,
    SetList,
    Closure,
    VarArg,
    ExtraArg,
}

const_assert!((OpCode::ExtraArg as u32) < (1 << OPCODE_WIDTH));

impl OpCode {
    pub fn mnemonic(self) -> &'static str {
        self.into()
    }

    pub fn decode(raw: Word) -> Option<OpCode> {
        OpCode::from_u32(raw & ((1 << OPCODE_WIDTH) - 1))
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mnemonic().to_uppercase())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Instruction(Word);

impl Instruction {
    pub fn new(opcode: OpCode) -> Instruction {
        Instruction(opcode as Word)
    }

    pub const fn from_word(raw: Word) -> Instruction {
        Instruction(raw)
    }

    pub fn extra_arg(ax: i64) -> Result<Instruction, FieldOverflow> {
        let mut inst = Instruction::new(OpCode::ExtraArg);
        inst.set(Field::Ax, ax)?;
        Ok(inst)
    }

    pub const fn word(self) -> Word {
        self.0
    }

    pub fn opcode(self) -> Option<OpCode> {
        OpCode::decode(self.0)
    }

    pub fn get(self, field: Field) -> i64 {
        let raw = i64::from((self.0 & field.mask()) >> field.pos());
        match field {
            Field::SBx => raw - MAXARG_SBX,
            _ => raw,
        }
    }

    /// Overwrite `field`, failing (and leaving the word untouched) if `value` is out of range.
    pub fn set(&mut self, field: Field, value: i64) -> Result<(), FieldOverflow> {
        let (lo, hi) = field.range();
        if value < lo || value > hi {
            return Err(FieldOverflow { field, value });
        }

        let stored = match field {
            Field::SBx => value + MAXARG_SBX,
            _ => value,
        } as Word;

        self.0 = (self.0 & !field.mask()) | ((stored << field.pos()) & field.mask());
        Ok(())
    }
}
