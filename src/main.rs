use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use tracing::Level;

use kuvm::bytecode::disassemble;
use kuvm::{assemble_text, executable, Exit, Machine, MachineConfig, Program};

/// Assemble, inspect and run programs for the kuvm register machine.
#[derive(Parser)]
#[clap(version, about)]
#[clap(propagate_version = true)]
struct Cli {
  #[command(subcommand)]
  cmd: Cmd,

  /// Log more (-v for debug, -vv for every executed instruction)
  #[clap(short, long, action = clap::ArgAction::Count, global = true)]
  verbose: u8,
}

#[derive(clap::Subcommand)]
enum Cmd {
  /// Assemble a source file into a KVX executable
  Asm {
    input: PathBuf,
    /// Where to write the executable
    #[clap(short, long)]
    output: PathBuf,
  },
  /// Run a KVX executable
  Run {
    input: PathBuf,
    #[command(flatten)]
    limits: Limits,
  },
  /// Assemble a source file and run it without writing an executable
  Exec {
    input: PathBuf,
    #[command(flatten)]
    limits: Limits,
  },
  /// Print the instructions of a KVX executable
  Dis {
    input: PathBuf,
  },
}

#[derive(clap::Args)]
struct Limits {
  /// Largest stack size in bytes
  #[clap(long, default_value_t = kuvm::config::DEFAULT_STACK_LIMIT)]
  stack_limit: usize,

  /// Largest heap size in bytes
  #[clap(long, default_value_t = kuvm::config::DEFAULT_HEAP_LIMIT)]
  heap_limit: usize,

  /// Print a table summarizing the run
  #[clap(long)]
  table: bool,
}

impl Limits {
  fn config(&self) -> MachineConfig {
    MachineConfig {
      stack_limit : self.stack_limit,
      heap_limit  : self.heap_limit,
      ..MachineConfig::default()
    }
  }
}

fn init_tracing(verbose: u8) {
  let level =
    match verbose {
      0 => Level::WARN,
      1 => Level::DEBUG,
      _ => Level::TRACE,
    };
  let _ = tracing_subscriber::fmt()
      .without_time()
      .with_target(false)
      .with_max_level(level)
      .with_writer(io::stderr)
      .try_init();
}

fn assemble_file(input: &Path) -> Result<Program, String> {
  let source = fs::read_to_string(input).map_err(|error| format!("{}: {}", input.display(), error))?;
  assemble_text(&source).map_err(|error| format!("{}: {}", input.display(), error))
}

fn load_file(input: &Path) -> Result<Program, String> {
  executable::load(input).map_err(|error| format!("{}: {}", input.display(), error))
}

/// Runs `program`, reporting the exit. The process status is the program's status, truncated
/// to a byte, or 1 for an abnormal exit.
fn run(program: &Program, limits: &Limits) -> ExitCode {
  let mut machine = Machine::with_config(limits.config());
  let exit: Exit = machine.exec(program);

  if limits.table {
    if let Err(error) = exit.render(&mut io::stdout()) {
      eprintln!("error: {}", error);
    }
  } else if !exit.is_normal() {
    eprintln!("{}", exit);
  }

  match exit.is_normal() {
    true  => ExitCode::from(exit.status as u8),
    false => ExitCode::from(1),
  }
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  let result =
    match &cli.cmd {

      Cmd::Asm { input, output } => {
        assemble_file(input).and_then(|program| {
          executable::save(output, &program).map_err(|error| format!("{}: {}", output.display(), error))
        })
        .map(|_| ExitCode::SUCCESS)
      }

      Cmd::Run { input, limits } => load_file(input).map(|program| run(&program, limits)),

      Cmd::Exec { input, limits } => assemble_file(input).map(|program| run(&program, limits)),

      Cmd::Dis { input } => {
        load_file(input).and_then(|program| {
          let listing = disassemble(&program.text).map_err(|error| format!("{}: {}", input.display(), error))?;
          for (offset, instruction) in listing {
            println!("{:08X}  {}", offset, instruction);
          }
          if !program.data.is_empty() {
            println!("; data: {} bytes", program.data.len());
          }
          if program.global_size > 0 {
            println!("; global: {} bytes", program.global_size);
          }
          Ok(ExitCode::SUCCESS)
        })
      }

    };

  match result {
    Ok(code) => code,
    Err(message) => {
      eprintln!("error: {}", message);
      ExitCode::from(2)
    }
  }
}
