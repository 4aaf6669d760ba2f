use crate::assembler::{self, Config};
use once_cell::sync::Lazy;

pub const DEFAULT_BINARY_EXT: &str = "luac";

pub static HELLO_SRC: &str = include_str!("../asm/hello.lasm");
pub static SUM_SRC: &str = include_str!("../asm/sum.lasm");
pub static CLOSURES_SRC: &str = include_str!("../asm/closures.lasm");

/// The bundled sample programs, by file stem.
pub static SAMPLES: &[(&str, &str)] = &[
    ("hello", HELLO_SRC),
    ("sum", SUM_SRC),
    ("closures", CLOSURES_SRC),
];

static HELLO_CHUNK: Lazy<Vec<u8>> = Lazy::new(|| {
    assembler::assemble_str(HELLO_SRC, &Config::default())
        .expect("Could not assemble binary-packaged hello sample")
});

pub fn hello_chunk() -> &'static [u8] {
    &HELLO_CHUNK
}
