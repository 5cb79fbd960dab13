mod run;

pub use run::RunArgs;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;

const AFTER_HELP: &str = "\x1b[1mCommon workflows:\x1b[0m
  Query a CSV file:
    dataql run -f users.csv -q \"SELECT name FROM users WHERE age > 30\"

  Join two files under chosen table names:
    dataql run -f orders.csv -f customers.csv:people -q \"SELECT ...\"

  Explore interactively:
    dataql run -f logs.jsonl.gz

  Export a result:
    dataql run -f data.parquet -q \"SELECT * FROM data\" -e out.xlsx -t excel

\x1b[1mMore info:\x1b[0m
  Run 'dataql run --help' for the full flag list.
  Enable completions: dataql completions <shell>";

#[derive(Parser)]
#[command(name = "dataql")]
#[command(version)]
#[command(about = "Query files, databases, and message queues with SQL")]
#[command(after_help = AFTER_HELP)]
#[command(arg_required_else_help = true)]
#[command(max_term_width = 100)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load inputs and run SQL against them
    Run(RunArgs),

    /// Generate shell completions
    #[command(after_help = "\x1b[1mExamples:\x1b[0m
  dataql completions bash > /etc/bash_completion.d/dataql
  dataql completions zsh > ~/.zfunc/_dataql")]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run(args) => run::run(args),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut io::stdout());
            Ok(())
        }
    }
}
