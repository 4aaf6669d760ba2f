pub mod opcode;

pub use opcode::Table;
