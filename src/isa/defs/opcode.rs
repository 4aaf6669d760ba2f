use crate::common;
use crate::isa::types::{
    schema::{Dest, OpDef, OperandDef, OperandKinds as K},
    word::{Field, OpCode},
};
use enum_map::EnumMap;
use once_cell::sync::Lazy;
use strum::IntoEnumIterator;

// Operand layouts, in source order. Note that source order and field order differ for
// SETUPVAL, which names the upvalue first.

const fn op(dest: Dest, kinds: K) -> OperandDef {
    OperandDef::new(dest, kinds)
}

const A: Dest = Dest::Field(Field::A);
const B: Dest = Dest::Field(Field::B);
const C: Dest = Dest::Field(Field::C);
const BX: Dest = Dest::Field(Field::Bx);
const SBX: Dest = Dest::Field(Field::SBx);
const AX: Dest = Dest::Field(Field::Ax);

struct Builder {
    defs: EnumMap<OpCode, OpDef>,
}

impl Builder {
    fn new() -> Builder {
        Builder {
            defs: EnumMap::default(),
        }
    }

    fn register(&mut self, opcode: OpCode, operands: Vec<OperandDef>) {
        assert!(
            self.defs[opcode].operands.is_empty(),
            "duplicate operand layout for {}",
            opcode
        );
        assert!(operands.len() <= 3);
        self.defs[opcode] = OpDef::with(operands);
    }

    fn register_all(&mut self, opcodes: &[OpCode], operands: Vec<OperandDef>) {
        for opcode in opcodes {
            self.register(*opcode, operands.clone());
        }
    }
}

fn gen_loads(builder: &mut Builder) {
    builder.register(OpCode::Move, vec![op(A, K::STACK), op(B, K::STACK)]);
    builder.register(OpCode::LoadK, vec![op(A, K::STACK), op(BX, K::CONSTANT)]);
    builder.register(
        OpCode::LoadKx,
        vec![op(A, K::STACK), op(Dest::Extra, K::CONSTANT)],
    );
    builder.register(
        OpCode::LoadBool,
        vec![op(A, K::STACK), op(B, K::EMBEDDED), op(C, K::EMBEDDED)],
    );
    builder.register(OpCode::LoadNil, vec![op(A, K::STACK), op(B, K::EMBEDDED)]);
}

fn gen_upvalues_and_tables(builder: &mut Builder) {
    builder.register(OpCode::GetUpval, vec![op(A, K::STACK), op(B, K::UPVALUE)]);
    builder.register(
        OpCode::GetTabUp,
        vec![op(A, K::STACK), op(B, K::UPVALUE), op(C, K::RK)],
    );
    builder.register(
        OpCode::GetTable,
        vec![op(A, K::STACK), op(B, K::STACK), op(C, K::RK)],
    );
    builder.register(
        OpCode::SetTabUp,
        vec![op(A, K::UPVALUE), op(B, K::RK), op(C, K::RK)],
    );
    builder.register(OpCode::SetUpval, vec![op(B, K::UPVALUE), op(A, K::STACK)]);
    builder.register(
        OpCode::SetTable,
        vec![op(A, K::STACK), op(B, K::RK), op(C, K::RK)],
    );
    builder.register(
        OpCode::NewTable,
        vec![op(A, K::STACK), op(B, K::EMBEDDED), op(C, K::EMBEDDED)],
    );
    builder.register(
        OpCode::SelfOp,
        vec![op(A, K::STACK), op(B, K::STACK), op(C, K::RK)],
    );
    builder.register(
        OpCode::SetList,
        vec![
            op(A, K::STACK),
            op(B, K::EMBEDDED),
            op(Dest::COrExtra, K::EMBEDDED),
        ],
    );
}

fn gen_arith(builder: &mut Builder) {
    builder.register_all(
        &[
            OpCode::Add,
            OpCode::Sub,
            OpCode::Mul,
            OpCode::Mod,
            OpCode::Pow,
            OpCode::Div,
            OpCode::IDiv,
            OpCode::BAnd,
            OpCode::BOr,
            OpCode::BXor,
            OpCode::Shl,
            OpCode::Shr,
        ],
        vec![op(A, K::STACK), op(B, K::RK), op(C, K::RK)],
    );
    builder.register_all(
        &[OpCode::Unm, OpCode::BNot, OpCode::Not, OpCode::Len],
        vec![op(A, K::STACK), op(B, K::STACK)],
    );
    builder.register(
        OpCode::Concat,
        vec![op(A, K::STACK), op(B, K::STACK), op(C, K::STACK)],
    );
}

fn gen_ctl(builder: &mut Builder) {
    builder.register(OpCode::Jmp, vec![op(A, K::EMBEDDED), op(SBX, K::LOCATION)]);
    builder.register_all(
        &[OpCode::Eq, OpCode::Lt, OpCode::Le],
        vec![op(A, K::EMBEDDED), op(B, K::RK), op(C, K::RK)],
    );
    builder.register(OpCode::Test, vec![op(A, K::STACK), op(C, K::EMBEDDED)]);
    builder.register(
        OpCode::TestSet,
        vec![op(A, K::STACK), op(B, K::STACK), op(C, K::EMBEDDED)],
    );
    builder.register_all(
        &[OpCode::Call, OpCode::TailCall],
        vec![op(A, K::STACK), op(B, K::EMBEDDED), op(C, K::EMBEDDED)],
    );
    builder.register(OpCode::Return, vec![op(A, K::STACK), op(B, K::EMBEDDED)]);
    builder.register_all(
        &[OpCode::ForLoop, OpCode::ForPrep, OpCode::TForLoop],
        vec![op(A, K::STACK), op(SBX, K::LOCATION)],
    );
    builder.register(OpCode::TForCall, vec![op(A, K::STACK), op(C, K::EMBEDDED)]);
}

fn gen_closures(builder: &mut Builder) {
    builder.register(OpCode::Closure, vec![op(A, K::STACK), op(BX, K::PROTO)]);
    builder.register(OpCode::VarArg, vec![op(A, K::STACK), op(B, K::EMBEDDED)]);
    builder.register(OpCode::ExtraArg, vec![op(AX, K::EMBEDDED)]);
}

pub struct Table {
    defs: EnumMap<OpCode, OpDef>,
}

static TABLE: Lazy<Table> = Lazy::new(|| {
    let mut builder = Builder::new();
    gen_loads(&mut builder);
    gen_upvalues_and_tables(&mut builder);
    gen_arith(&mut builder);
    gen_ctl(&mut builder);
    gen_closures(&mut builder);
    Table {
        defs: builder.defs,
    }
});

impl Table {
    pub fn get() -> &'static Table {
        &TABLE
    }

    pub fn def(&self, opcode: OpCode) -> &OpDef {
        &self.defs[opcode]
    }

    pub fn lookup(&self, mnemonic: &str) -> Option<OpCode> {
        OpCode::iter().find(|op| common::eq_ignore_case(mnemonic, op.mnemonic()))
    }
}
