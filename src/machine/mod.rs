/*!
  The machine: a fetch-decode-execute interpreter for resolved programs.

  A run starts with `exec`, which resets every piece of machine state, loads the program and
  steps until the machine halts, either through `halt` or through a runtime error. Each step
  decodes the instruction at `ip` with `bytecode::decode_instruction`, dispatches it to the
  handler of its family and, unless the handler transferred control, advances `ip` past the
  instruction. Handlers validate all of their operands before changing any state, so a failed
  instruction has no visible effect.

  The machine value is reusable: nothing survives from one `exec` to the next except the
  allocated capacity of its buffers and the installed syscall handler.
*/

mod arith;
mod control;
mod error;
mod exit;
mod memory;
mod registers;
mod stack;
mod syscall;

use std::fmt::{Display, Formatter};
use std::time::{Duration, Instant};

use prettytable::{format as TableFormat, Table};
use tracing::{debug, trace};

use crate::bytecode::{decode_instruction, Instruction, SpecialRegister, GENERAL_REGISTER_COUNT};
use crate::config::MachineConfig;
use crate::executable::Program;

pub use error::{ErrorKind, RuntimeError};
pub use exit::{Exit, Stats};
pub use memory::{Memory, WORD_SIZE};
pub use registers::{RegisterFile, FLAG_LESS, FLAG_ZERO};
pub use stack::Frame;
pub use syscall::{NoSysCalls, SysCallContext, SysCallError, SysCallHandler};

pub struct Machine {
  config    : MachineConfig,
  registers : RegisterFile,
  memory    : Memory,
  frames    : Vec<Frame>,
  syscalls  : Box<dyn SysCallHandler>,
  stats     : Stats,
  last      : Option<(u8, u8)>,

  // Per-step flags
  jumped    : bool,                 // The current instruction set `ip` itself
  halted    : bool,                 // Stop after the current instruction
  error     : Option<RuntimeError>, // Why the run stopped, if abnormally
}

impl Default for Machine {
  fn default() -> Self {
    Machine::new()
  }
}

impl Machine {

  // region Construction and access

  pub fn new() -> Machine {
    Machine::with_config(MachineConfig::default())
  }

  pub fn with_config(config: MachineConfig) -> Machine {
    Machine {
      config,
      registers : RegisterFile::default(),
      memory    : Memory::new(&config),
      frames    : Vec::new(),
      syscalls  : Box::new(NoSysCalls),
      stats     : Stats::default(),
      last      : None,
      jumped    : false,
      halted    : false,
      error     : None,
    }
  }

  /// Installs the handler of the `syscall` instruction.
  pub fn with_syscalls<H>(mut self, handler: H) -> Machine
    where H: SysCallHandler + 'static
  {
    self.syscalls = Box::new(handler);
    self
  }

  pub fn config(&self) -> &MachineConfig {
    &self.config
  }

  pub fn registers(&self) -> &RegisterFile {
    &self.registers
  }

  pub fn memory(&self) -> &Memory {
    &self.memory
  }

  pub fn frames(&self) -> &[Frame] {
    &self.frames
  }

  // endregion

  // region Execution

  /// Clears all state left by a previous run and loads `program`.
  pub fn reset(&mut self, program: &Program) {
    self.registers.reset();
    self.registers.ip = program.entry_point as u64;
    self.memory.reset(program);
    self.frames.clear();
    self.stats  = Stats::default();
    self.last   = None;
    self.jumped = false;
    self.halted = false;
    self.error  = None;
  }

  /// Runs `program` to completion.
  pub fn exec(&mut self, program: &Program) -> Exit {
    self.reset(program);
    debug!(
      text = program.text.len(),
      data = program.data.len(),
      global = program.global_size,
      entry = program.entry_point,
      "starting run"
    );

    let start = Instant::now();
    while !self.halted {
      self.step();
    }
    let exit = self.exit(start.elapsed());

    debug!(clock = exit.clock, "{}", exit);
    exit
  }

  /// Switches to the halted state with a runtime error.
  fn stop(&mut self, error: RuntimeError) {
    self.error  = Some(error);
    self.halted = true;
  }

  fn step(&mut self) {
    self.jumped = false;
    let ip = self.registers.ip;

    let header = (ip as usize).checked_add(2).and_then(|end| self.memory.text.get(ip as usize..end));
    if let Some(header) = header {
      self.last = Some((header[0], header[1]));
    }

    let (instruction, size) =
      match decode_instruction(&self.memory.text, ip as usize) {
        Ok(decoded) => decoded,
        Err(fault)  => {
          self.stop(RuntimeError::from_decode(fault, ip));
          return;
        }
      };
    trace!(ip, clock = self.registers.clock, "{}", instruction);

    if let Err(error) = self.execute(instruction, size as u64) {
      self.stop(error);
      return;
    }
    self.registers.clock += 1;

    if !self.jumped && !self.halted {
      self.registers.ip += size as u64;
    }

    #[cfg(feature = "trace_computation")]
    trace!("\n{}", self);
  }

  /// Dispatches a decoded instruction of `size` bytes to its handler.
  fn execute(&mut self, instruction: Instruction, size: u64) -> Result<(), RuntimeError> {
    match instruction {

      Instruction::Trap => {
        let layout = self.last.map(|(_, layout)| layout).unwrap_or(0);
        Err(RuntimeError::new(ErrorKind::Trap, layout as u64))
      }

      Instruction::Halt => {
        self.halted = true;
        Ok(())
      }

      Instruction::Nop                      => Ok(()),
      Instruction::SysCall                  => self.exec_syscall(),
      Instruction::Ret                      => self.exec_ret(),
      Instruction::Jump { flag, target }    => self.exec_jump(flag, target),
      Instruction::Call(target)             => self.exec_call(target, size),
      Instruction::Push(register)           => self.exec_push(register),
      Instruction::Pop(register)            => self.exec_pop(register),
      Instruction::Clear(register)          => self.registers.write(register, 0),
      Instruction::Set { dest, source }     => self.exec_set(dest, source),
      Instruction::Test { dest, source }    => self.exec_test(dest, source),
      Instruction::Inc { dest, source }     => self.exec_step(dest, source, u64::wrapping_add),
      Instruction::Dec { dest, source }     => self.exec_step(dest, source, u64::wrapping_sub),
      Instruction::Add { dest, left, right } => self.exec_binary(dest, left, right, u64::wrapping_add),
      Instruction::Sub { dest, left, right } => self.exec_binary(dest, left, right, u64::wrapping_sub),
      Instruction::Load { dest, base, offset } => self.exec_load(dest, base, offset),
      Instruction::Store { base, source, offset } => self.exec_store(base, source, offset),

    }
  }

  fn exit(&self, time: Duration) -> Exit {
    Exit {
      error  : self.error,
      time,
      ip     : self.registers.ip,
      status : match self.error {
        None    => self.registers.sc,
        Some(_) => 0
      },
      clock  : self.registers.clock,
      stats  : self.stats,
      last   : self.last,
    }
  }

  // endregion

  // region Display methods

  fn make_register_table(&self) -> Table {
    let mut table = Table::new();

    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"Register", ubl->"Contents"]);

    let specials = [
      (SpecialRegister::Ip,    self.registers.ip),
      (SpecialRegister::Sp,    self.registers.sp),
      (SpecialRegister::Fp,    self.registers.fp),
      (SpecialRegister::Sc,    self.registers.sc),
      (SpecialRegister::Cf,    self.registers.cf),
      (SpecialRegister::Clock, self.registers.clock),
    ];
    for (register, value) in specials.iter() {
      table.add_row(row![r->format!("{} =", register), format!("0x{:016X}", value)]);
    }
    // Only the general registers in use, to keep traces readable.
    for index in 0..GENERAL_REGISTER_COUNT {
      let value = self.registers.general[index];
      if value != 0 {
        table.add_row(row![r->format!("r{} =", index), format!("0x{:016X}", value)]);
      }
    }
    table
  }

  fn make_frame_table(&self) -> Table {
    let mut table = Table::new();

    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"Frame", ubl->"Return", ubl->"Base"]);

    for (i, frame) in self.frames.iter().enumerate().rev() {
      match i + 1 == self.frames.len() {

        true  => {
          table.add_row(
            row![r->format!("* --> {}", i), format!("0x{:08X}", frame.ret), frame.base]
          );
        }

        false => {
          table.add_row(
            row![r->format!("{}", i), format!("0x{:08X}", frame.ret), frame.base]
          );
        }

      }
    }
    table
  }

  // endregion

}

lazy_static! {
  static ref TABLE_DISPLAY_FORMAT: TableFormat::TableFormat =
    TableFormat::FormatBuilder::new()
      .column_separator('│')
      .borders(' ')
      .separator(
        TableFormat::LinePosition::Title,
        TableFormat::LineSeparator::new('─', '┼', ' ', ' ')
      )
      .separator(
        TableFormat::LinePosition::Bottom,
        TableFormat::LineSeparator::new('─', '┴', ' ', ' ')
      )
      .padding(1, 1)
      .build();
}

impl Display for Machine {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let register_table = self.make_register_table();
    let frame_table    = self.make_frame_table();

    let mut combined_table = table!([register_table, frame_table]);

    combined_table.set_titles(row![ub->"Registers", ub->"Frames"]);
    combined_table.set_format(*TABLE_DISPLAY_FORMAT);

    let state = match (self.halted, &self.error) {
      (false, _)           => "Running.".to_string(),
      (true, None)         => "Halted.".to_string(),
      (true, Some(error))  => format!("Halted: {}", error),
    };

    write!(
      f,
      "{}\tstack: {} bytes\theap: {} bytes\tglobal: {} bytes\n{}",
      state,
      self.memory.stack.len(),
      self.memory.heap.len(),
      self.memory.global.len(),
      combined_table
    )
  }
}
