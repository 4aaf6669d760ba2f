#![allow(dead_code)]

use luasm::assembler::{self, model::Constant, Config};
use luasm::isa::types::word::Instruction;
use std::convert::TryInto;

pub fn assemble(src: &str) -> Result<Vec<u8>, assembler::Error> {
    assembler::assemble_str(src, &Config::default())
}

/// Wraps `code` in a `main` function with no upvalue descriptors.
pub fn main_only(code: &str) -> String {
    format!(
        ".upvalues 0\n.func main 8 0 0\n.begin_code\n{}\n.end_code\n",
        code
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub signature: [u8; 4],
    pub version: u8,
    pub format: u8,
    pub data: [u8; 6],
    pub widths: [u8; 5],
    pub int_check: i64,
    pub num_check: f64,
    pub upvalue_count: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFunction {
    pub source: Vec<u8>,
    pub line_defined: i32,
    pub last_line_defined: i32,
    pub params: u8,
    pub vararg: u8,
    pub max_stack_size: u8,
    pub code: Vec<Instruction>,
    pub constants: Vec<Constant>,
    pub upvalues: Vec<(u8, u8)>,
    pub protos: Vec<DecodedFunction>,
    pub line_info: Vec<i32>,
    pub locals: i32,
    pub upvalue_names: i32,
}

impl DecodedFunction {
    pub fn name(&self) -> &str {
        std::str::from_utf8(&self.source).unwrap()
    }
}

/// Reads a chunk back the way the VM's loader does, panicking on anything malformed.
pub struct Decoder<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Decoder { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> &'a [u8] {
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        slice
    }

    fn byte(&mut self) -> u8 {
        self.take(1)[0]
    }

    fn int(&mut self) -> i32 {
        i32::from_ne_bytes(self.take(4).try_into().unwrap())
    }

    fn word(&mut self) -> u32 {
        u32::from_ne_bytes(self.take(4).try_into().unwrap())
    }

    fn size_t(&mut self) -> usize {
        usize::from_ne_bytes(self.take(std::mem::size_of::<usize>()).try_into().unwrap())
    }

    fn string(&mut self) -> Vec<u8> {
        let len = match self.byte() {
            0xFF => self.size_t(),
            short => short as usize,
        };
        self.take(len - 1).to_vec()
    }

    pub fn header(&mut self) -> Header {
        Header {
            signature: self.take(4).try_into().unwrap(),
            version: self.byte(),
            format: self.byte(),
            data: self.take(6).try_into().unwrap(),
            widths: self.take(5).try_into().unwrap(),
            int_check: i64::from_ne_bytes(self.take(8).try_into().unwrap()),
            num_check: f64::from_ne_bytes(self.take(8).try_into().unwrap()),
            upvalue_count: self.byte(),
        }
    }

    fn constant(&mut self) -> Constant {
        match self.byte() {
            0 => Constant::Nil,
            1 => Constant::Bool(self.byte() != 0),
            3 => Constant::Number(f64::from_ne_bytes(self.take(8).try_into().unwrap())),
            4 => Constant::String(self.string()),
            tag => panic!("unknown constant tag {}", tag),
        }
    }

    pub fn function(&mut self) -> DecodedFunction {
        let source = self.string();
        let line_defined = self.int();
        let last_line_defined = self.int();
        let params = self.byte();
        let vararg = self.byte();
        let max_stack_size = self.byte();

        let n = self.int();
        let code = (0..n)
            .map(|_| Instruction::from_word(self.word()))
            .collect();

        let n = self.int();
        let constants = (0..n).map(|_| self.constant()).collect();

        let n = self.int();
        let upvalues = (0..n).map(|_| (self.byte(), self.byte())).collect();

        let n = self.int();
        let protos = (0..n).map(|_| self.function()).collect();

        let n = self.int();
        let line_info = (0..n).map(|_| self.int()).collect();

        DecodedFunction {
            source,
            line_defined,
            last_line_defined,
            params,
            vararg,
            max_stack_size,
            code,
            constants,
            upvalues,
            protos,
            line_info,
            locals: self.int(),
            upvalue_names: self.int(),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.pos == self.bytes.len()
    }
}

/// Decodes a whole chunk, checking that no bytes trail the main function.
pub fn decode(bytes: &[u8]) -> (Header, DecodedFunction) {
    let mut decoder = Decoder::new(bytes);
    let header = decoder.header();
    let main = decoder.function();
    assert!(decoder.is_exhausted(), "trailing bytes after main function");
    (header, main)
}

pub fn assemble_and_decode(src: &str) -> DecodedFunction {
    let bytes = assemble(src).unwrap_or_else(|err| panic!("{}", err));
    decode(&bytes).1
}
