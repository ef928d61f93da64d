/*!
  A small register machine and its toolchain.

  Assembly text is parsed and translated to an intermediate representation (`assembly`, `ir`),
  lowered to bytecode with every symbolic reference resolved (`assembler`), optionally stored in
  the KVX executable format (`executable`), and finally run by the interpreter (`machine`).

```text
source ──parse──▶ ast ──translate──▶ ir::Program ──assemble──▶ executable::Program ──exec──▶ Exit
```
*/

#[macro_use] extern crate prettytable;
#[macro_use] extern crate lazy_static;

pub mod address;
pub mod assembler;
pub mod assembly;
pub mod bytecode;
pub mod config;
pub mod error;
pub mod executable;
pub mod ir;
pub mod machine;
pub mod symboltable;

pub use config::MachineConfig;
pub use error::Error;
pub use executable::Program;
pub use machine::{Exit, Machine};

/// Assembles source text into a program ready to run.
pub fn assemble_text(source: &str) -> Result<Program, Error> {
  let program = assembly::compile(source)?;
  Ok(assembler::assemble(&program)?)
}
