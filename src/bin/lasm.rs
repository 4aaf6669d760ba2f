use luasm::cli::command;
use structopt::StructOpt;

fn main() {
    command::asm(command::SubcommandAsm::from_args());
}
