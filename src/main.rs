use clap::Parser;
use dataql::cmd::{self, Cli};
use dataql::error;

fn main() {
    let cli = Cli::parse();

    if let Err(e) = cmd::run(cli) {
        eprintln!("{e:#}");
        std::process::exit(error::exit_code(&e));
    }
}
