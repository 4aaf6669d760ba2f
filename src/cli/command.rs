use crate::assembler::{self, Config, Program};
use crate::{assets, io::Lines};
use ansi_term::Color;
use anyhow::{anyhow, Context};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use structopt::StructOpt;

#[cfg(windows)]
fn enable_ansi() {
    ansi_term::enable_ansi_support().ok();
}

#[cfg(not(windows))]
fn enable_ansi() {}

pub fn terminal_init(verbose: bool) {
    enable_ansi();

    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}

#[derive(StructOpt, Debug)]
#[structopt(name = "luasm")]
pub enum CommandRoot {
    Asm(SubcommandAsm),
    List(SubcommandList),
}

#[derive(StructOpt, Debug)]
pub struct AsmOpts {
    /// Reject sources that end inside a code, const or upvalue segment
    #[structopt(long)]
    strict: bool,

    /// Log each function as it is finished and written
    #[structopt(short, long)]
    verbose: bool,
}

impl AsmOpts {
    fn config(&self) -> Config {
        Config {
            strict_segments: self.strict,
        }
    }
}

#[derive(StructOpt, Debug)]
#[structopt(name = "lasm")]
pub struct SubcommandAsm {
    #[structopt(flatten)]
    opts: AsmOpts,

    #[structopt(name = "in.lasm", parse(from_os_str))]
    in_src: PathBuf,

    #[structopt(name = "out.luac", parse(from_os_str))]
    out_bin: Option<PathBuf>,
}

#[derive(StructOpt, Debug)]
pub struct SubcommandList {
    #[structopt(flatten)]
    opts: AsmOpts,

    #[structopt(name = "in.lasm", parse(from_os_str))]
    in_src: PathBuf,
}

pub fn read_program(path: &Path, config: &Config) -> anyhow::Result<Program> {
    let file =
        File::open(path).with_context(|| format!("could not open '{}'", path.display()))?;
    let program = assembler::assemble_program(&mut Lines::new(BufReader::new(file)), config)
        .with_context(|| format!("could not assemble '{}'", path.display()))?;
    Ok(program)
}

pub fn default_out_path(in_src: &Path) -> anyhow::Result<PathBuf> {
    let stem = in_src
        .file_stem()
        .ok_or_else(|| anyhow!("'{}' has no file name", in_src.display()))?;
    Ok(PathBuf::from(stem).with_extension(assets::DEFAULT_BINARY_EXT))
}

fn assemble_to_file(cmd: &SubcommandAsm) -> anyhow::Result<PathBuf> {
    let program = read_program(&cmd.in_src, &cmd.opts.config())?;

    // Nothing is written unless the whole chunk assembles.
    let mut chunk = Vec::new();
    assembler::chunk::write_chunk(&program, &mut chunk)
        .map_err(assembler::Error::from)
        .with_context(|| format!("could not assemble '{}'", cmd.in_src.display()))?;

    let out_bin = match &cmd.out_bin {
        Some(path) => path.clone(),
        None => default_out_path(&cmd.in_src)?,
    };
    std::fs::write(&out_bin, chunk)
        .with_context(|| format!("could not write '{}'", out_bin.display()))?;
    Ok(out_bin)
}

fn list_program(cmd: &SubcommandList) -> anyhow::Result<String> {
    let program = read_program(&cmd.in_src, &cmd.opts.config())?;
    let text = assembler::listing::list(&program)
        .map_err(assembler::Error::from)
        .with_context(|| format!("could not list '{}'", cmd.in_src.display()))?;
    Ok(text)
}

fn report(err: anyhow::Error) -> ! {
    eprintln!("{} {:#}", Color::Red.bold().paint("error:"), err);
    std::process::exit(1);
}

pub fn root(cmd: CommandRoot) -> ! {
    match cmd {
        CommandRoot::Asm(scmd) => asm(scmd),
        CommandRoot::List(scmd) => list(scmd),
    }
}

pub fn asm(cmd: SubcommandAsm) -> ! {
    terminal_init(cmd.opts.verbose);

    match assemble_to_file(&cmd) {
        Ok(out_bin) => {
            log::info!("wrote {}", out_bin.display());
            std::process::exit(0);
        }
        Err(err) => report(err),
    }
}

pub fn list(cmd: SubcommandList) -> ! {
    terminal_init(cmd.opts.verbose);

    match list_program(&cmd) {
        Ok(text) => {
            print!("{}", text);
            std::process::exit(0);
        }
        Err(err) => report(err),
    }
}
