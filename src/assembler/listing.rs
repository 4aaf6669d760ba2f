use super::chunk::{self, link_protos};
use super::model::{Function, Program};
use crate::isa::defs::Table;
use crate::isa::types::{
    schema::{Dest, OperandDef, OperandKinds},
    word::{Field, Instruction, OpCode, BIT_RK},
};
use std::fmt::{self, Display};

/// One function as the writer would emit it, with its subroutine references linked.
pub struct FunctionListing<'a> {
    pub func: &'a Function,
    pub depth: usize,
    pub instructions: Vec<Instruction>,
    pub protos: Vec<&'a Function>,
}

impl<'a> FunctionListing<'a> {
    fn operand(
        &self,
        f: &mut fmt::Formatter<'_>,
        def: &OperandDef,
        value: i64,
        site: usize,
    ) -> fmt::Result {
        let kinds = def.kinds;
        let rk_const = kinds.contains(OperandKinds::RK) && value & i64::from(BIT_RK) != 0;

        if rk_const || kinds == OperandKinds::CONSTANT {
            let idx = if rk_const { value & !i64::from(BIT_RK) } else { value };
            return match self.func.constants.get(idx as usize) {
                Some(constant) => write!(f, "const {}", constant),
                None => write!(f, "k{}?", idx),
            };
        }

        if kinds.contains(OperandKinds::STACK) {
            write!(f, "%{}", value)
        } else if kinds.contains(OperandKinds::UPVALUE) {
            write!(f, "@{}", value)
        } else if kinds.contains(OperandKinds::LOCATION) {
            write!(f, "${}", site as i64 + value + 1)
        } else if kinds.contains(OperandKinds::PROTO) {
            match self.protos.get(value as usize) {
                Some(proto) => write!(f, "{}", proto.name),
                None => write!(f, "proto{}?", value),
            }
        } else {
            write!(f, "{}", value)
        }
    }

    fn instruction(&self, f: &mut fmt::Formatter<'_>, site: usize) -> fmt::Result {
        let inst = self.instructions[site];
        let opcode = match inst.opcode() {
            Some(opcode) => opcode,
            None => return write!(f, "??? {:#010x}", inst.word()),
        };
        write!(f, "{:<9}", opcode.to_string())?;

        let extra = self
            .instructions
            .get(site + 1)
            .filter(|next| next.opcode() == Some(OpCode::ExtraArg))
            .map(|next| next.get(Field::Ax));

        for def in &Table::get().def(opcode).operands {
            let value = match def.dest {
                Dest::Field(field) => inst.get(field),
                Dest::Extra => extra.unwrap_or(0),
                Dest::COrExtra => match (inst.get(Field::C), extra) {
                    (0, Some(ax)) => ax,
                    (c, _) => c,
                },
            };
            write!(f, " ")?;
            self.operand(f, def, value, site)?;
        }
        Ok(())
    }
}

impl<'a> Display for FunctionListing<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let indent = "  ".repeat(self.depth);
        let func = self.func;
        writeln!(
            f,
            "{}function {} (params {}, {}, max stack {})",
            indent, func.name, func.header.params, func.header.vararg, func.header.max_stack_size
        )?;

        writeln!(f, "{}  constants ({}):", indent, func.constants.len())?;
        for (idx, constant) in func.constants.iter().enumerate() {
            writeln!(f, "{}    {:>4}  {}", indent, idx, constant)?;
        }

        writeln!(f, "{}  upvalues ({}):", indent, func.upvalues.len())?;
        for (idx, upvalue) in func.upvalues.iter().enumerate() {
            writeln!(
                f,
                "{}    {:>4}  in_stack {} index {}",
                indent, idx, upvalue.in_stack, upvalue.index
            )?;
        }

        writeln!(f, "{}  code ({}):", indent, self.instructions.len())?;
        for site in 0..self.instructions.len() {
            write!(f, "{}    {:>4}  ", indent, site)?;
            self.instruction(f, site)?;
            writeln!(f)?;
        }
        Ok(())
    }
}

fn collect<'a>(
    program: &'a Program,
    func: &'a Function,
    depth: usize,
    stack: &mut Vec<&'a str>,
    out: &mut Vec<FunctionListing<'a>>,
) -> Result<(), chunk::Error> {
    if stack.contains(&func.name.as_str()) {
        let mut chain: Vec<String> = stack.iter().map(|s| s.to_string()).collect();
        chain.push(func.name.clone());
        return Err(chunk::Error::RecursiveSubroutine(chain));
    }

    let (instructions, protos) = link_protos(program, func)?;
    out.push(FunctionListing {
        func,
        depth,
        instructions,
        protos: protos.clone(),
    });

    stack.push(&func.name);
    for proto in protos {
        collect(program, proto, depth + 1, stack, out)?;
    }
    stack.pop();
    Ok(())
}

/// Lists every function reachable from `main`, depth first in proto order.
pub fn list(program: &Program) -> Result<String, chunk::Error> {
    let main = program.main().ok_or(chunk::Error::NoMain)?;
    let mut listings = Vec::new();
    collect(program, main, 0, &mut Vec::new(), &mut listings)?;

    let mut text = format!("upvalues {}\n", program.upvalue_count);
    for listing in listings {
        text.push_str(&listing.to_string());
    }
    Ok(text)
}
