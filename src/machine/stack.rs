//! Call frames and the `push` and `pop` instructions.

use crate::bytecode::Register;

use super::error::RuntimeError;
use super::Machine;

/// Saved caller state of an active `call`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Frame {
  /// Offset of the instruction after the call.
  pub ret  : u64,
  /// The caller's frame pointer.
  pub base : u64,
}

impl Machine {

  pub(super) fn exec_push(&mut self, register: Register) -> Result<(), RuntimeError> {
    let value = self.registers.read(register)?;
    self.memory.push_word(value)?;

    let size = self.memory.stack.len() as u64;
    self.registers.sp = size;
    self.stats.max_stack = self.stats.max_stack.max(size);
    Ok(())
  }

  /// Pops into `register`. The word must belong to the current frame.
  pub(super) fn exec_pop(&mut self, register: Register) -> Result<(), RuntimeError> {
    self.registers.check_writable(register)?;
    let value = self.memory.pop_word(self.registers.fp as usize)?;
    self.registers.sp = self.memory.stack.len() as u64;
    self.registers.write(register, value)
  }

}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::bytecode::{encode_instruction, encoded_size, Instruction, Source, Target};
  use crate::config::MachineConfig;
  use crate::executable::Program;
  use crate::machine::ErrorKind;

  fn r(index: u8) -> Register {
    Register::general(index)
  }

  fn program(instructions: &[Instruction]) -> Program {
    let mut text = Vec::new();
    for instruction in instructions {
      encode_instruction(instruction, &mut text);
    }
    Program { text, data: vec![], entry_point: 0, global_size: 0 }
  }

  #[test]
  fn push_and_pop_are_last_in_first_out() {
    let instructions = [
      Instruction::Set { dest: r(1), source: Source::Val(10) },
      Instruction::Set { dest: r(2), source: Source::Val(20) },
      Instruction::Push(r(1)),
      Instruction::Push(r(2)),
      Instruction::Pop(r(3)),
      Instruction::Pop(Register::SC),
      Instruction::Halt,
    ];
    let mut machine = Machine::new();
    let exit = machine.exec(&program(&instructions));
    assert_eq!(exit.status, 10);
    assert_eq!(machine.registers().general[3], 20);
    assert_eq!(machine.registers().sp, 0);
    assert_eq!(exit.stats.max_stack, 16);
  }

  #[test]
  fn pop_on_an_empty_stack() {
    let exit = Machine::new().exec(&program(&[Instruction::Pop(r(0))]));
    assert_eq!(exit.error, Some(RuntimeError::new(ErrorKind::StackUnderflow, 0)));
  }

  #[test]
  fn pop_cannot_reach_into_the_callers_frame() {
    let callee = [Instruction::Pop(r(0)), Instruction::Ret];
    let mut instructions = vec![
      Instruction::Push(r(0)),
      Instruction::Call(Target::Offset(0)),
      Instruction::Halt,
    ];
    let start = instructions.iter().map(encoded_size).sum::<usize>() as u32;
    instructions[1] = Instruction::Call(Target::Offset(start));
    instructions.extend_from_slice(&callee);

    let exit = Machine::new().exec(&program(&instructions));
    assert_eq!(exit.error, Some(RuntimeError::new(ErrorKind::StackUnderflow, 8)));
    assert_eq!(exit.ip, start as u64);
  }

  #[test]
  fn pop_into_a_read_only_register_keeps_the_stack() {
    let instructions = [Instruction::Push(r(0)), Instruction::Pop(Register::CLOCK)];
    let mut machine = Machine::new();
    let exit = machine.exec(&program(&instructions));
    assert_eq!(exit.error, Some(RuntimeError::new(ErrorKind::ReadOnlySpecialRegisterWrite, 0x85)));
    assert_eq!(machine.memory().stack.len(), 8);
    assert_eq!(machine.registers().sp, 8);
  }

  #[test]
  fn stack_limit() {
    let config = MachineConfig { stack_limit: 16, ..MachineConfig::default() };
    let instructions = [
      Instruction::Push(r(0)),
      Instruction::Push(r(0)),
      Instruction::Push(r(0)),
    ];
    let exit = Machine::with_config(config).exec(&program(&instructions));
    assert_eq!(exit.error, Some(RuntimeError::new(ErrorKind::StackOverflow, 24)));
    assert_eq!(exit.stats.max_stack, 16);
    assert_eq!(exit.ip, 6);
  }

  #[test]
  fn push_of_an_unknown_register() {
    let exit = Machine::new().exec(&program(&[Instruction::Push(Register(0x90))]));
    assert_eq!(exit.error, Some(RuntimeError::new(ErrorKind::BadSpecialRegister, 0x90)));
  }
}
