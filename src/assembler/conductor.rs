use super::model::{
    Constant, ConstantPool, Function, FunctionHeader, FunctionId, Program, Upvalue, VarargMode,
};
use super::operand::{self, RawOperand};
use super::resolve::{
    jump_delta, BindingConflict, Labels, Patches, SubroutineBindings, UNRESOLVED_LOCATION,
};
use super::tokenize::{self, Cursor};
use super::Config;
use crate::common;
use crate::isa::defs::Table;
use crate::isa::types::schema::{Dest, OperandKinds};
use crate::isa::types::word::{
    Byte, Field, FieldOverflow, Instruction, Int, BIT_RK, MAXARG_C,
};
use derive_more::Display;
use itertools::Itertools;
use log::{debug, trace, warn};
use std::collections::HashMap;
use strum::IntoEnumIterator;
use strum_macros::{EnumIter, IntoStaticStr};

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    #[display(fmt = "top level")]
    None,
    #[display(fmt = "function")]
    Func,
    #[display(fmt = "code segment")]
    Code,
    #[display(fmt = "const segment")]
    Const,
    #[display(fmt = "upvalue segment")]
    Upvalue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Directive {
    Upvalues,
    Func,
    BeginConst,
    EndConst,
    BeginCode,
    EndCode,
    BeginUpvalue,
    EndUpvalue,
}

impl Directive {
    pub fn name(self) -> &'static str {
        self.into()
    }

    pub fn lookup(name: &str) -> Option<Directive> {
        Directive::iter().find(|d| common::eq_ignore_case(name, d.name()))
    }
}

#[derive(Debug)]
pub enum Error {
    Lex(tokenize::Error),
    Operand(operand::Error),
    Field(FieldOverflow),
    Binding(BindingConflict),
    UnknownDirective(String),
    MisplacedDirective(Directive, Segment),
    UpvaluesRedeclared,
    ByteOutOfRange(&'static str, i64),
    InvalidVarargMode(i64),
    DuplicateFunction(String),
    UnknownOpcode(String),
    OutsideSegment(Segment),
    UndeclaredLocations(Vec<String>),
    MissingUpvalueCount,
    UnterminatedSegment(Segment),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Lex(err) => write!(f, "{}", err),
            Error::Operand(err) => write!(f, "{}", err),
            Error::Field(err) => write!(f, "operand out of range: {}", err),
            Error::Binding(err) => write!(f, "{}", err),
            Error::UnknownDirective(name) => write!(f, "unknown directive '.{}'", name),
            Error::MisplacedDirective(directive, segment) => write!(
                f,
                ".{} is not allowed in a {}, expected {}",
                directive.name(),
                segment,
                expected_segment(*directive)
            ),
            Error::UpvaluesRedeclared => write!(f, "amount of upvalues already declared"),
            Error::ByteOutOfRange(what, value) => {
                write!(f, "{} must be between 0 and 255, got {}", what, value)
            }
            Error::InvalidVarargMode(mode) => {
                write!(f, "vararg mode must be 0, 1 or 2, got {}", mode)
            }
            Error::DuplicateFunction(name) => write!(f, "duplicate function '{}'", name),
            Error::UnknownOpcode(name) => write!(f, "invalid opcode '{}'", name),
            Error::OutsideSegment(segment) => write!(
                f,
                "unimplemented: no code, const or upvalue segment is open ({})",
                segment
            ),
            Error::UndeclaredLocations(names) => {
                write!(f, "undeclared locations: {}", names.iter().join(", "))
            }
            Error::MissingUpvalueCount => write!(f, "amount of upvalues never declared"),
            Error::UnterminatedSegment(segment) => {
                write!(f, "end of input inside an unterminated {}", segment)
            }
        }
    }
}

impl From<tokenize::Error> for Error {
    fn from(err: tokenize::Error) -> Self {
        Error::Lex(err)
    }
}

impl From<operand::Error> for Error {
    fn from(err: operand::Error) -> Self {
        Error::Operand(err)
    }
}

impl From<FieldOverflow> for Error {
    fn from(err: FieldOverflow) -> Self {
        Error::Field(err)
    }
}

impl From<BindingConflict> for Error {
    fn from(err: BindingConflict) -> Self {
        Error::Binding(err)
    }
}

fn expected_segment(directive: Directive) -> &'static str {
    match directive {
        Directive::Upvalues => "a single declaration",
        Directive::Func => "top level or function",
        Directive::BeginConst | Directive::BeginCode | Directive::BeginUpvalue => "function",
        Directive::EndConst => "const segment",
        Directive::EndCode => "code segment",
        Directive::EndUpvalue => "upvalue segment",
    }
}

const DIRECTIVE_CHAR: char = '.';
const BYTE_MAX: i64 = Byte::MAX as i64;

fn byte_arg(cur: &mut Cursor, what: &'static str) -> Result<Byte, Error> {
    let value = cur.integer()?;
    if value < 0 || value > BYTE_MAX {
        return Err(Error::ByteOutOfRange(what, value));
    }
    Ok(value as Byte)
}

/// The accumulators of the `.func` block currently being assembled.
#[derive(Debug)]
struct FunctionBuilder {
    id: FunctionId,
    name: String,
    header: FunctionHeader,
    instructions: Vec<Instruction>,
    constants: ConstantPool,
    upvalues: Vec<Upvalue>,
    labels: Labels,
    subroutines: Vec<String>,
    subroutine_patches: Patches,
    line_info: Vec<Int>,
}

impl FunctionBuilder {
    fn new(id: FunctionId, name: String, header: FunctionHeader) -> Self {
        FunctionBuilder {
            id,
            name,
            header,
            instructions: Vec::new(),
            constants: ConstantPool::default(),
            upvalues: Vec::new(),
            labels: Labels::default(),
            subroutines: Vec::new(),
            subroutine_patches: Patches::default(),
            line_info: Vec::new(),
        }
    }

    fn finish(self) -> Result<Function, Error> {
        let unresolved = self.labels.unresolved();
        if !unresolved.is_empty() {
            return Err(Error::UndeclaredLocations(unresolved));
        }

        Ok(Function {
            name: self.name,
            header: self.header,
            instructions: self.instructions,
            constants: self.constants,
            upvalues: self.upvalues,
            subroutines: self.subroutines,
            subroutine_patches: self.subroutine_patches,
            line_info: self.line_info,
        })
    }

    fn declare_label(&mut self, name: &str) -> Result<(), Error> {
        let target = self.instructions.len();
        for &site in self.labels.pending(name) {
            let mut inst = self.instructions[site];
            inst.set(Field::SBx, jump_delta(target, site))?;
        }

        for (site, delta) in self.labels.declare(name, target) {
            trace!("resolved ${} at {} (sBx {})", name, site, delta);
            self.instructions[site].set(Field::SBx, delta)?;
        }
        Ok(())
    }

    /// Turns a parsed operand into the integer stored in its field. Constants, forward label
    /// references and subroutine uses are collected into `effects` rather than recorded.
    fn bind(
        &self,
        bindings: &SubroutineBindings,
        raw: RawOperand,
        kinds: OperandKinds,
        site: usize,
        effects: &mut LineEffects,
    ) -> Result<i64, Error> {
        Ok(match raw {
            RawOperand::Stack(n) | RawOperand::Upvalue(n) | RawOperand::Embedded(n) => n,
            RawOperand::Location(label) => match self.labels.resolved(&label, site) {
                Some(delta) => delta,
                None => {
                    effects.labels.push(label);
                    UNRESOLVED_LOCATION
                }
            },
            RawOperand::Constant(constant) => {
                let idx = effects.constant_index(&self.constants, constant) as i64;
                if kinds.contains(OperandKinds::STACK) {
                    idx | i64::from(BIT_RK)
                } else {
                    idx
                }
            }
            RawOperand::Proto(name) => {
                bindings.check(&name, self.id)?;
                effects.subroutines.push(name);
                // Patched with the proto index when the function is written.
                0
            }
        })
    }

    fn instruction(
        &mut self,
        bindings: &mut SubroutineBindings,
        mnemonic: &str,
        cur: &mut Cursor,
    ) -> Result<(), Error> {
        let table = Table::get();
        let opcode = table
            .lookup(mnemonic)
            .ok_or_else(|| Error::UnknownOpcode(mnemonic.to_owned()))?;
        let slots = &table.def(opcode).operands;

        let raws = slots
            .iter()
            .map(|slot| operand::parse(cur, slot.kinds))
            .collect::<Result<Vec<_>, _>>()?;
        let comment = operand::expect_no_more(cur)?;
        let line = comment.map(tokenize::line_marker).transpose()?.flatten();

        let site = self.instructions.len();
        let mut inst = Instruction::new(opcode);
        let mut extra = None;
        let mut effects = LineEffects::default();

        for (slot, raw) in slots.iter().zip(raws) {
            let value = self.bind(bindings, raw, slot.kinds, site, &mut effects)?;
            match slot.dest {
                Dest::Field(field) => inst.set(field, value)?,
                Dest::Extra => extra = Some(value),
                Dest::COrExtra if value > i64::from(MAXARG_C) => {
                    inst.set(Field::C, 0)?;
                    extra = Some(value);
                }
                Dest::COrExtra => inst.set(Field::C, value)?,
            }
        }
        let extra = extra.map(Instruction::extra_arg).transpose()?;

        // The line has fully assembled; nothing above has touched the function.
        for constant in effects.constants {
            self.constants.intern(constant);
        }
        for label in &effects.labels {
            self.labels.defer(label, site);
        }
        for name in effects.subroutines {
            if bindings.bind(&name, self.id)? {
                self.subroutines.push(name.clone());
            }
            self.subroutine_patches.defer(&name, site);
        }

        self.instructions.push(inst);
        if let Some(line) = line {
            self.line_info.push(line);
        }
        if let Some(extra) = extra {
            self.instructions.push(extra);
        }

        Ok(())
    }
}

/// What an instruction line adds to its function, held back until the line is known to be
/// valid.
#[derive(Debug, Default)]
struct LineEffects {
    constants: Vec<Constant>,
    labels: Vec<String>,
    subroutines: Vec<String>,
}

impl LineEffects {
    /// The index `constant` will have once this line's new constants are interned.
    fn constant_index(&mut self, pool: &ConstantPool, constant: Constant) -> usize {
        if let Some(idx) = pool.position(&constant) {
            return idx;
        }
        let offset = match self.constants.iter().position(|c| *c == constant) {
            Some(offset) => offset,
            None => {
                self.constants.push(constant);
                self.constants.len() - 1
            }
        };
        pool.len() + offset
    }
}

/// Consumes source lines one at a time, accumulating finished functions.
pub struct Assembler {
    config: Config,
    segment: Segment,
    upvalue_count: Option<Byte>,
    functions: HashMap<String, Function>,
    bindings: SubroutineBindings,
    next_id: usize,
    current: Option<FunctionBuilder>,
}

impl Assembler {
    pub fn new(config: Config) -> Self {
        Assembler {
            config,
            segment: Segment::None,
            upvalue_count: None,
            functions: HashMap::new(),
            bindings: SubroutineBindings::default(),
            next_id: 0,
            current: None,
        }
    }

    pub fn segment(&self) -> Segment {
        self.segment
    }

    pub fn feed_line(&mut self, line: &str) -> Result<(), Error> {
        let mut cur = Cursor::new(line);
        cur.skip_blank();
        if cur.at_end() {
            return Ok(());
        }

        if cur.eat(DIRECTIVE_CHAR) {
            return self.directive(&mut cur);
        }

        match self.segment {
            Segment::Code => self.code_line(&mut cur),
            Segment::Const => self.const_line(&mut cur),
            Segment::Upvalue => self.upvalue_line(&mut cur),
            Segment::None | Segment::Func => Err(Error::OutsideSegment(self.segment)),
        }
    }

    fn directive(&mut self, cur: &mut Cursor) -> Result<(), Error> {
        let name = cur.name()?;
        let directive =
            Directive::lookup(name).ok_or_else(|| Error::UnknownDirective(name.to_owned()))?;
        trace!(".{} in {}", directive.name(), self.segment);

        let next = match (directive, self.segment) {
            (Directive::Upvalues, _) => {
                if self.upvalue_count.is_some() {
                    return Err(Error::UpvaluesRedeclared);
                }
                let count = byte_arg(cur, "amount of upvalues")?;
                cur.expect_end()?;
                self.upvalue_count = Some(count);
                return Ok(());
            }

            (Directive::Func, Segment::None) | (Directive::Func, Segment::Func) => {
                self.begin_function(cur)?;
                self.segment = Segment::Func;
                return Ok(());
            }

            (Directive::BeginConst, Segment::Func) => Segment::Const,
            (Directive::BeginCode, Segment::Func) => Segment::Code,
            (Directive::BeginUpvalue, Segment::Func) => Segment::Upvalue,
            (Directive::EndConst, Segment::Const)
            | (Directive::EndCode, Segment::Code)
            | (Directive::EndUpvalue, Segment::Upvalue) => Segment::Func,

            (_, segment) => return Err(Error::MisplacedDirective(directive, segment)),
        };

        cur.expect_end()?;
        self.segment = next;
        Ok(())
    }

    fn begin_function(&mut self, cur: &mut Cursor) -> Result<(), Error> {
        let name = cur.name()?.to_owned();
        let max_stack_size = byte_arg(cur, "max stack size")?;
        let params = byte_arg(cur, "parameter count")?;
        let raw_vararg = cur.integer()?;
        let vararg = Some(raw_vararg)
            .filter(|mode| (0..=BYTE_MAX).contains(mode))
            .and_then(|mode| VarargMode::from_byte(mode as Byte))
            .ok_or(Error::InvalidVarargMode(raw_vararg))?;
        cur.expect_end()?;

        self.finish_function()?;
        if self.functions.contains_key(&name) {
            return Err(Error::DuplicateFunction(name));
        }

        let id = FunctionId(self.next_id);
        self.next_id += 1;
        trace!("function #{} '{}'", id, name);
        self.current = Some(FunctionBuilder::new(
            id,
            name,
            FunctionHeader::new(max_stack_size, params, vararg),
        ));
        Ok(())
    }

    /// Moves the current function into the function table, if it assembled any instructions.
    fn finish_function(&mut self) -> Result<(), Error> {
        let builder = match self.current.take() {
            Some(builder) => builder,
            None => return Ok(()),
        };

        if builder.instructions.is_empty() {
            warn!("discarding function '{}': it has no instructions", builder.name);
            return Ok(());
        }

        let func = builder.finish()?;
        debug!(
            "finished function '{}': {} instructions, {} constants, {} upvalues, {} subroutines",
            func.name,
            func.instructions.len(),
            func.constants.len(),
            func.upvalues.len(),
            func.subroutines.len()
        );

        if self.functions.contains_key(&func.name) {
            return Err(Error::DuplicateFunction(func.name));
        }
        self.functions.insert(func.name.clone(), func);
        Ok(())
    }

    fn builder(&mut self) -> Result<&mut FunctionBuilder, Error> {
        let segment = self.segment;
        self.current
            .as_mut()
            .ok_or(Error::OutsideSegment(segment))
    }

    fn code_line(&mut self, cur: &mut Cursor) -> Result<(), Error> {
        let name = cur.name()?;
        if cur.eat(':') {
            cur.expect_end()?;
            return self.builder()?.declare_label(name);
        }

        let bindings = &mut self.bindings;
        match self.current.as_mut() {
            Some(builder) => builder.instruction(bindings, name, cur),
            None => Err(Error::OutsideSegment(self.segment)),
        }
    }

    fn const_line(&mut self, cur: &mut Cursor) -> Result<(), Error> {
        let constant = cur.literal()?;
        cur.expect_end()?;
        self.builder()?.constants.intern(constant);
        Ok(())
    }

    fn upvalue_line(&mut self, cur: &mut Cursor) -> Result<(), Error> {
        let in_stack = byte_arg(cur, "upvalue in_stack")?;
        let index = byte_arg(cur, "upvalue index")?;
        cur.expect_end()?;
        self.builder()?.upvalues.push(Upvalue::new(in_stack, index));
        Ok(())
    }

    /// Ends the input, finalizing the last function.
    pub fn finish(mut self) -> Result<Program, Error> {
        let open = matches!(
            self.segment,
            Segment::Code | Segment::Const | Segment::Upvalue
        );
        if open && self.config.strict_segments {
            return Err(Error::UnterminatedSegment(self.segment));
        }

        self.finish_function()?;
        let upvalue_count = self.upvalue_count.ok_or(Error::MissingUpvalueCount)?;

        Ok(Program {
            upvalue_count,
            functions: self.functions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::types::word::OpCode;

    fn feed(asm: &mut Assembler, src: &str) -> Result<(), Error> {
        src.lines().try_for_each(|line| asm.feed_line(line))
    }

    fn assemble(src: &str) -> Result<Program, Error> {
        let mut asm = Assembler::new(Config::default());
        feed(&mut asm, src)?;
        asm.finish()
    }

    #[test]
    fn directives_drive_segments() {
        let mut asm = Assembler::new(Config::default());
        assert_eq!(asm.segment(), Segment::None);
        feed(&mut asm, ".upvalues 1\n.func main 2 0 0").unwrap();
        assert_eq!(asm.segment(), Segment::Func);
        feed(&mut asm, ".begin_code").unwrap();
        assert_eq!(asm.segment(), Segment::Code);
        feed(&mut asm, ".END_CODE ; done").unwrap();
        assert_eq!(asm.segment(), Segment::Func);
    }

    #[test]
    fn misplaced_directives() {
        let mut asm = Assembler::new(Config::default());
        assert!(matches!(
            asm.feed_line(".begin_code"),
            Err(Error::MisplacedDirective(Directive::BeginCode, Segment::None))
        ));
        feed(&mut asm, ".func main 2 0 0\n.begin_const").unwrap();
        assert!(matches!(
            asm.feed_line(".func other 2 0 0"),
            Err(Error::MisplacedDirective(Directive::Func, Segment::Const))
        ));
        assert!(matches!(
            asm.feed_line(".end_code"),
            Err(Error::MisplacedDirective(Directive::EndCode, Segment::Const))
        ));
    }

    #[test]
    fn directive_errors() {
        let mut asm = Assembler::new(Config::default());
        assert!(matches!(
            asm.feed_line(".frobnicate"),
            Err(Error::UnknownDirective(_))
        ));
        asm.feed_line(".upvalues 1").unwrap();
        assert!(matches!(
            asm.feed_line(".upvalues 1"),
            Err(Error::UpvaluesRedeclared)
        ));
        assert!(matches!(
            asm.feed_line(".func f 2 0 3"),
            Err(Error::InvalidVarargMode(3))
        ));
        assert!(matches!(
            asm.feed_line(".func f 256 0 0"),
            Err(Error::ByteOutOfRange(_, 256))
        ));
        assert!(matches!(
            asm.feed_line(".func f 2 0 0 extra"),
            Err(Error::Lex(tokenize::Error::TrailingCharacters(_)))
        ));
    }

    #[test]
    fn lines_outside_segments() {
        let mut asm = Assembler::new(Config::default());
        asm.feed_line("   ").unwrap();
        asm.feed_line("; just a comment").unwrap();
        assert!(matches!(
            asm.feed_line("move %0 %1"),
            Err(Error::OutsideSegment(Segment::None))
        ));
    }

    #[test]
    fn forward_jump_is_patched() {
        let program = assemble(
            ".upvalues 0
             .func main 2 0 0
             .begin_code
             jmp 0 $skip
             loadnil %0 0
             skip:
             return %0 1
             .end_code",
        )
        .unwrap();
        let main = program.main().unwrap();
        assert_eq!(main.instructions[0].opcode(), Some(OpCode::Jmp));
        assert_eq!(main.instructions[0].get(Field::SBx), 1);
    }

    #[test]
    fn backward_jump() {
        let program = assemble(
            ".upvalues 0
             .func main 2 0 0
             .begin_code
             top:
             loadnil %0 0
             jmp 0 $top
             .end_code",
        )
        .unwrap();
        assert_eq!(program.main().unwrap().instructions[1].get(Field::SBx), -2);
    }

    #[test]
    fn unresolved_labels_are_listed() {
        let err = assemble(
            ".upvalues 0
             .func main 2 0 0
             .begin_code
             jmp 0 $a
             jmp 0 $b
             .end_code",
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "undeclared locations: a, b");
    }

    #[test]
    fn rk_constants_are_flagged() {
        let program = assemble(
            ".upvalues 0
             .func main 2 0 0
             .begin_const
             \"x\"
             .end_const
             .begin_code
             settable %0 const \"x\" const 2
             loadk %1 const 2
             .end_code",
        )
        .unwrap();
        let main = program.main().unwrap();
        assert_eq!(main.constants.len(), 2);
        assert_eq!(main.instructions[0].get(Field::B), i64::from(BIT_RK));
        assert_eq!(main.instructions[0].get(Field::C), i64::from(BIT_RK) | 1);
        assert_eq!(main.instructions[1].get(Field::Bx), 1);
    }

    #[test]
    fn extra_arg_words() {
        let program = assemble(
            ".upvalues 0
             .func main 2 0 0
             .begin_code
             loadkx %0 const \"k\" ;L4;
             setlist %0 1 600 ;L5;
             setlist %0 1 7
             .end_code",
        )
        .unwrap();
        let main = program.main().unwrap();
        let ops: Vec<_> = main.instructions.iter().map(|i| i.opcode()).collect();
        assert_eq!(
            ops,
            vec![
                Some(OpCode::LoadKx),
                Some(OpCode::ExtraArg),
                Some(OpCode::SetList),
                Some(OpCode::ExtraArg),
                Some(OpCode::SetList),
            ]
        );
        assert_eq!(main.instructions[1].get(Field::Ax), 0);
        assert_eq!(main.instructions[2].get(Field::C), 0);
        assert_eq!(main.instructions[3].get(Field::Ax), 600);
        assert_eq!(main.instructions[4].get(Field::C), 7);
        assert_eq!(main.line_info, vec![4, 5]);
    }

    #[test]
    fn operand_out_of_range() {
        let err = assemble(
            ".upvalues 0
             .func main 2 0 0
             .begin_code
             move %256 %0
             .end_code",
        )
        .unwrap_err();
        assert!(matches!(err, Error::Field(FieldOverflow { field: Field::A, value: 256 })));
    }

    #[test]
    fn subroutines_are_recorded_once() {
        let program = assemble(
            ".upvalues 0
             .func main 2 0 0
             .begin_code
             closure %0 inner
             closure %1 inner
             closure %1 other
             .end_code
             .func inner 2 0 0
             .begin_code
             return %0 1
             .end_code
             .func other 2 0 0
             .begin_code
             return %0 1
             .end_code",
        )
        .unwrap();
        let main = program.main().unwrap();
        assert_eq!(main.subroutines, vec!["inner", "other"]);
        assert_eq!(
            main.subroutine_patches.names().collect::<Vec<_>>(),
            vec!["inner", "other"]
        );
    }

    #[test]
    fn subroutine_bound_twice() {
        let err = assemble(
            ".upvalues 0
             .func main 2 0 0
             .begin_code
             closure %0 shared
             .end_code
             .func second 2 0 0
             .begin_code
             closure %0 shared
             .end_code",
        )
        .unwrap_err();
        assert!(matches!(err, Error::Binding(_)));
    }

    #[test]
    fn empty_functions_are_discarded() {
        let program = assemble(
            ".upvalues 0
             .func ghost 2 0 0
             .func main 2 0 0
             .begin_code
             return %0 1
             .end_code",
        )
        .unwrap();
        assert!(program.function("ghost").is_none());
        assert!(program.main().is_some());
    }

    #[test]
    fn duplicate_functions() {
        let err = assemble(
            ".upvalues 0
             .func main 2 0 0
             .begin_code
             return %0 1
             .end_code
             .func main 2 0 0",
        )
        .unwrap_err();
        assert!(matches!(err, Error::DuplicateFunction(name) if name == "main"));
    }

    #[test]
    fn upvalue_lines() {
        let program = assemble(
            ".upvalues 1
             .func main 2 0 1
             .begin_upvalue
             1 0
             0 3 ; comment
             .end_upvalue
             .begin_code
             return %0 1
             .end_code",
        )
        .unwrap();
        let main = program.main().unwrap();
        assert_eq!(main.upvalues, vec![Upvalue::new(1, 0), Upvalue::new(0, 3)]);
        assert_eq!(main.header.vararg, VarargMode::Vararg);
        assert_eq!(program.upvalue_count, 1);
    }

    #[test]
    fn missing_upvalue_count() {
        let err = assemble(
            ".func main 2 0 0
             .begin_code
             return %0 1",
        )
        .unwrap_err();
        assert!(matches!(err, Error::MissingUpvalueCount));
    }

    #[test]
    fn unterminated_segments() {
        let src = ".upvalues 0
                   .func main 2 0 0
                   .begin_code
                   return %0 1";
        assert!(assemble(src).is_ok());

        let mut strict = Assembler::new(Config {
            strict_segments: true,
        });
        feed(&mut strict, src).unwrap();
        assert!(matches!(
            strict.finish(),
            Err(Error::UnterminatedSegment(Segment::Code))
        ));
    }

    #[test]
    fn unknown_opcode() {
        let mut asm = Assembler::new(Config::default());
        feed(&mut asm, ".func main 2 0 0\n.begin_code").unwrap();
        assert!(matches!(
            asm.feed_line("frob %0"),
            Err(Error::UnknownOpcode(name)) if name == "frob"
        ));
    }

    #[test]
    fn rejected_lines_leave_no_trace() {
        let mut asm = Assembler::new(Config::default());
        feed(&mut asm, ".upvalues 0\n.func main 3 0 0\n.begin_code").unwrap();

        assert!(matches!(
            asm.feed_line("jmp 0 $x %9"),
            Err(Error::Operand(operand::Error::TooMany(_)))
        ));
        assert!(matches!(
            asm.feed_line("settable %0 const \"leak\" @1"),
            Err(Error::Operand(operand::Error::Illegal { .. }))
        ));
        assert!(matches!(
            asm.feed_line("closure %0 helper %1"),
            Err(Error::Operand(operand::Error::TooMany(_)))
        ));
        assert!(matches!(
            asm.feed_line("loadk %0 const 1 ;L99999999999;"),
            Err(Error::Lex(tokenize::Error::IntegerOverflow(_)))
        ));
        assert!(matches!(
            asm.feed_line("jmp 0 $x .end_code"),
            Err(Error::Operand(operand::Error::TooMany(_)))
        ));

        feed(
            &mut asm,
            "move %1 %2
             x:
             return %0 1
             .end_code
             .func other 2 0 0
             .begin_code
             closure %0 helper
             .end_code",
        )
        .unwrap();
        assert_eq!(asm.segment(), Segment::Func);

        let program = asm.finish().unwrap();
        let main = program.main().unwrap();
        assert_eq!(main.instructions.len(), 2);
        assert_eq!(main.instructions[0].opcode(), Some(OpCode::Move));
        assert_eq!(main.instructions[0].get(Field::A), 1);
        assert_eq!(main.instructions[0].get(Field::B), 2);
        assert_eq!(main.instructions[0].get(Field::C), 0);
        assert!(main.constants.is_empty());
        assert!(main.subroutines.is_empty());
        assert!(main.subroutine_patches.is_empty());
        assert!(main.line_info.is_empty());
    }

    #[test]
    fn binding_conflict_leaves_line_unassembled() {
        let mut asm = Assembler::new(Config::default());
        feed(
            &mut asm,
            ".upvalues 0
             .func main 2 0 0
             .begin_code
             closure %0 shared
             return %0 1
             .end_code
             .func other 2 0 0
             .begin_code",
        )
        .unwrap();
        assert!(matches!(
            asm.feed_line("settable %0 const \"k\" $nowhere"),
            Err(Error::Operand(_))
        ));
        assert!(matches!(
            asm.feed_line("closure %0 shared"),
            Err(Error::Binding(_))
        ));
        feed(&mut asm, "return %0 1\n.end_code").unwrap();

        let program = asm.finish().unwrap();
        let other = program.function("other").unwrap();
        assert_eq!(other.instructions.len(), 1);
        assert!(other.constants.is_empty());
        assert!(other.subroutines.is_empty());
    }

    #[test]
    fn repeated_new_constant_in_one_line() {
        let program = assemble(
            ".upvalues 0
             .func main 2 0 0
             .begin_const
             \"a\"
             .end_const
             .begin_code
             settable %0 const \"b\" const \"b\"
             settable %0 const \"a\" const \"c\"
             .end_code",
        )
        .unwrap();
        let main = program.main().unwrap();
        assert_eq!(main.constants.len(), 3);
        let rk = i64::from(BIT_RK);
        assert_eq!(main.instructions[0].get(Field::B), rk | 1);
        assert_eq!(main.instructions[0].get(Field::C), rk | 1);
        assert_eq!(main.instructions[1].get(Field::B), rk);
        assert_eq!(main.instructions[1].get(Field::C), rk | 2);
    }
}
