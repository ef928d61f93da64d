//! Control transfer: `jump`, `call`, `ret` and `syscall`.

use tracing::trace;

use crate::address::{Pointer, Segment};
use crate::bytecode::{JumpFlag, Target};

use super::error::{ErrorKind, RuntimeError};
use super::registers::{FLAG_LESS, FLAG_ZERO};
use super::stack::Frame;
use super::syscall::SysCallContext;
use super::Machine;

/// Whether the condition `flag` holds for the flags register `cf`.
fn holds(flag: JumpFlag, cf: u64) -> bool {
  let zero = cf & FLAG_ZERO != 0;
  let less = cf & FLAG_LESS != 0;
  match flag {
    JumpFlag::Always         => true,
    JumpFlag::Zero           => zero,
    JumpFlag::NotZero        => !zero,
    JumpFlag::Less           => less,
    JumpFlag::LessOrEqual    => less || zero,
    JumpFlag::Greater        => !less && !zero,
    JumpFlag::GreaterOrEqual => !less,
  }
}

impl Machine {

  /**
    Resolves a jump or call target to a text offset. A register target must hold a pointer
    tagged with the text segment. Either way the offset must lie inside the text segment,
    otherwise the error is of kind `bad_address`.
  */
  fn text_target(&self, target: Target, bad_address: ErrorKind) -> Result<u64, RuntimeError> {
    let pointer =
      match target {
        Target::Offset(offset) => Pointer::new(Segment::Text, offset as u64),
        Target::Reg(register)  => {
          let pointer = Pointer(self.registers.read(register)?);
          match pointer.segment() {
            Some(Segment::Text) => pointer,
            Some(_) => return Err(RuntimeError::new(ErrorKind::NonTextSegmentJumpTarget, pointer.raw())),
            None    => return Err(RuntimeError::new(ErrorKind::BadSegmentTag, pointer.raw())),
          }
        }
      };

    match self.memory.locate(pointer, 1) {
      Ok(_)  => Ok(pointer.offset()),
      Err(_) => Err(RuntimeError::new(bad_address, pointer.offset()))
    }
  }

  pub(super) fn exec_jump(&mut self, flag: JumpFlag, target: Target) -> Result<(), RuntimeError> {
    let offset = self.text_target(target, ErrorKind::BadJumpAddress)?;
    if holds(flag, self.registers.cf) {
      self.registers.ip = offset;
      self.jumped = true;
    }
    Ok(())
  }

  /// `size` is the encoded size of the call, so that the return address is the next instruction.
  pub(super) fn exec_call(&mut self, target: Target, size: u64) -> Result<(), RuntimeError> {
    let offset = self.text_target(target, ErrorKind::BadCallAddress)?;
    if self.frames.len() >= self.config.frame_limit {
      return Err(RuntimeError::new(ErrorKind::StackOverflow, self.frames.len() as u64));
    }

    self.frames.push(Frame {
      ret  : self.registers.ip + size,
      base : self.registers.fp,
    });
    self.registers.fp = self.registers.sp;
    self.registers.ip = offset;
    self.jumped = true;

    self.stats.max_frames = self.stats.max_frames.max(self.frames.len() as u64);
    trace!(depth = self.frames.len(), "call 0x{:08X}", offset);
    Ok(())
  }

  /// Discards the current frame's stack contents and returns to the caller.
  pub(super) fn exec_ret(&mut self) -> Result<(), RuntimeError> {
    let frame = self.frames.pop()
                    .ok_or(RuntimeError::new(ErrorKind::EmptyFrameStack, 0))?;

    self.memory.truncate_stack(self.registers.fp as usize);
    self.registers.sp = self.registers.fp;
    self.registers.fp = frame.base;
    self.registers.ip = frame.ret;
    self.jumped = true;
    Ok(())
  }

  pub(super) fn exec_syscall(&mut self) -> Result<(), RuntimeError> {
    let number = self.registers.sc;
    let mut context = SysCallContext::new(&mut self.registers.general, &mut self.memory);
    let result = self.syscalls.syscall(number, &mut context)?;
    self.registers.sc = result;
    Ok(())
  }

}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::bytecode::{encode_instruction, encoded_size, Instruction, Register, Source, GENERAL_REGISTER_COUNT};
  use crate::config::MachineConfig;
  use crate::executable::Program;
  use crate::machine::{Exit, SysCallError, SysCallHandler};

  fn r(index: u8) -> Register {
    Register::general(index)
  }

  fn program(instructions: &[Instruction]) -> Program {
    let mut text = Vec::new();
    for instruction in instructions {
      encode_instruction(instruction, &mut text);
    }
    Program { text, data: vec![], entry_point: 0, global_size: 16 }
  }

  fn offset_of(instructions: &[Instruction], index: usize) -> u32 {
    instructions[..index].iter().map(encoded_size).sum::<usize>() as u32
  }

  /// Runs a branch on `flag` after comparing `left` with `right`. The status is 2 if taken.
  fn branch(flag: JumpFlag, left: u64, right: u64) -> u64 {
    let mut instructions = vec![
      Instruction::Set { dest: r(1), source: Source::Val(left) },
      Instruction::Test { dest: r(1), source: Source::Val(right) },
      Instruction::Jump { flag, target: Target::Offset(0) },
      Instruction::Set { dest: Register::SC, source: Source::Val(1) },
      Instruction::Halt,
      Instruction::Set { dest: Register::SC, source: Source::Val(2) },
      Instruction::Halt,
    ];
    instructions[2] = Instruction::Jump { flag, target: Target::Offset(offset_of(&instructions, 5)) };
    let exit = Machine::new().exec(&program(&instructions));
    assert_eq!(exit.error, None);
    exit.status
  }

  #[test]
  fn conditions() {
    let table: &[(JumpFlag, u64, u64, u64)] = &[
      (JumpFlag::Always,         1, 2, 2),
      (JumpFlag::Zero,           3, 3, 2),
      (JumpFlag::Zero,           3, 4, 1),
      (JumpFlag::NotZero,        3, 4, 2),
      (JumpFlag::NotZero,        3, 3, 1),
      (JumpFlag::Less,           2, 3, 2),
      (JumpFlag::Less,           3, 3, 1),
      (JumpFlag::LessOrEqual,    3, 3, 2),
      (JumpFlag::LessOrEqual,    4, 3, 1),
      (JumpFlag::Greater,        4, 3, 2),
      (JumpFlag::Greater,        3, 3, 1),
      (JumpFlag::GreaterOrEqual, 3, 3, 2),
      (JumpFlag::GreaterOrEqual, 2, 3, 1),
      // Comparison is unsigned.
      (JumpFlag::Greater, u64::MAX, 0, 2),
    ];
    for (flag, left, right, expected) in table {
      assert_eq!(branch(*flag, *left, *right), *expected, "{} {} {}", flag, left, right);
    }
  }

  #[test]
  fn jump_targets_are_validated_before_the_condition() {
    let instructions = [
      Instruction::Test { dest: r(1), source: Source::Val(1) },
      Instruction::Jump { flag: JumpFlag::Zero, target: Target::Offset(0x400) },
      Instruction::Halt,
    ];
    let exit = Machine::new().exec(&program(&instructions));
    assert_eq!(exit.error, Some(RuntimeError::new(ErrorKind::BadJumpAddress, 0x400)));
    assert_eq!(exit.ip, 3);
  }

  #[test]
  fn register_targets() {
    let global = Pointer::new(Segment::Global, 0).raw();
    let untagged = 0x0900_0000_0000_0000;
    let cases = [
      (global, RuntimeError::new(ErrorKind::NonTextSegmentJumpTarget, global)),
      (untagged, RuntimeError::new(ErrorKind::BadSegmentTag, untagged)),
      (0x1000, RuntimeError::new(ErrorKind::BadJumpAddress, 0x1000)),
    ];
    for (value, expected) in cases {
      let instructions = [
        Instruction::Set { dest: r(4), source: Source::Val(value) },
        Instruction::Jump { flag: JumpFlag::Always, target: Target::Reg(r(4)) },
      ];
      let exit = Machine::new().exec(&program(&instructions));
      assert_eq!(exit.error, Some(expected));
    }

    // A plain offset is a text pointer.
    let mut instructions = vec![
      Instruction::Set { dest: r(4), source: Source::Val(0) },
      Instruction::Jump { flag: JumpFlag::Always, target: Target::Reg(r(4)) },
      Instruction::Trap,
      Instruction::Halt,
    ];
    instructions[0] = Instruction::Set { dest: r(4), source: Source::Val(offset_of(&instructions, 3) as u64) };
    assert!(Machine::new().exec(&program(&instructions)).is_normal());
  }

  #[test]
  fn call_and_return() {
    let mut instructions = vec![
      Instruction::Push(r(0)),
      Instruction::Call(Target::Offset(0)),
      Instruction::Set { dest: Register::SC, source: Source::Reg(r(1)) },
      Instruction::Halt,
      // Callee
      Instruction::Push(r(0)),
      Instruction::Push(r(0)),
      Instruction::Set { dest: r(1), source: Source::Reg(Register::SP) },
      Instruction::Ret,
    ];
    instructions[1] = Instruction::Call(Target::Offset(offset_of(&instructions, 4)));

    let mut machine = Machine::new();
    let exit = machine.exec(&program(&instructions));
    assert_eq!(exit.error, None);
    assert_eq!(exit.status, 24);
    assert_eq!(exit.stats.max_frames, 1);
    assert_eq!(exit.stats.max_stack, 24);
    assert!(machine.frames().is_empty());
    assert_eq!(machine.registers().sp, 8);
    assert_eq!(machine.registers().fp, 0);
    assert_eq!(machine.memory().stack.len(), 8);
  }

  #[test]
  fn bad_call_target() {
    let instructions = [Instruction::Call(Target::Offset(8)), Instruction::Halt];
    let exit = Machine::new().exec(&program(&instructions));
    assert_eq!(exit.error, Some(RuntimeError::new(ErrorKind::BadCallAddress, 8)));
    assert_eq!(exit.stats.max_frames, 0);
  }

  #[test]
  fn ret_without_a_frame() {
    let exit = Machine::new().exec(&program(&[Instruction::Ret]));
    assert_eq!(exit.error, Some(RuntimeError::new(ErrorKind::EmptyFrameStack, 0)));
    assert_eq!(exit.ip, 0);
  }

  #[test]
  fn unbounded_recursion_overflows() {
    let config = MachineConfig { frame_limit: 4, ..MachineConfig::default() };
    let exit = Machine::with_config(config).exec(&program(&[Instruction::Call(Target::Offset(0))]));
    assert_eq!(exit.error, Some(RuntimeError::new(ErrorKind::StackOverflow, 4)));
    assert_eq!(exit.stats.max_frames, 4);
    assert_eq!(exit.clock, 4);
  }

  struct Adder;

  impl SysCallHandler for Adder {
    fn syscall(&mut self, number: u64, context: &mut SysCallContext<'_>) -> Result<u64, SysCallError> {
      match number {
        1 => Ok(context.register(0)? + context.register(1)?),
        2 => {
          let sum = context.register(0)? + context.register(1)?;
          context.write(Pointer::new(Segment::Global, 0), &sum.to_le_bytes())?;
          Ok(0)
        }
        3 => {
          context.write(Pointer::new(Segment::Data, 0), &[0])?;
          Ok(0)
        }
        4 => {
          let sum = context.register(0)? + context.register(1)?;
          context.set_register(2, sum)?;
          Ok(0)
        }
        5 => Ok(context.register(GENERAL_REGISTER_COUNT)?),
        6 => {
          context.set_register(GENERAL_REGISTER_COUNT + 1, 0)?;
          Ok(0)
        }
        _ => Err(SysCallError::Unknown(number))
      }
    }
  }

  fn syscall(number: u64) -> (Machine, Exit) {
    let instructions = [
      Instruction::Set { dest: r(0), source: Source::Val(40) },
      Instruction::Set { dest: r(1), source: Source::Val(2) },
      Instruction::Set { dest: Register::SC, source: Source::Val(number) },
      Instruction::SysCall,
      Instruction::Halt,
    ];
    let mut machine = Machine::new().with_syscalls(Adder);
    let exit = machine.exec(&program(&instructions));
    (machine, exit)
  }

  #[test]
  fn syscalls_go_through_the_handler() {
    let (_, exit) = syscall(1);
    assert_eq!(exit.error, None);
    assert_eq!(exit.status, 42);

    let (machine, exit) = syscall(2);
    assert_eq!(exit.status, 0);
    assert_eq!(machine.memory().global[0], 42);

    let (_, exit) = syscall(3);
    assert_eq!(
      exit.error,
      Some(RuntimeError::new(ErrorKind::ReadOnlySegmentWrite, Pointer::new(Segment::Data, 0).raw()))
    );

    let (_, exit) = syscall(99);
    assert_eq!(exit.error, Some(RuntimeError::new(ErrorKind::BadSysCall, 99)));
  }

  #[test]
  fn syscall_register_access() {
    let (machine, exit) = syscall(4);
    assert_eq!(exit.error, None);
    assert_eq!(machine.registers().general[2], 42);

    let (_, exit) = syscall(5);
    assert_eq!(exit.error, Some(RuntimeError::new(ErrorKind::BadRegister, GENERAL_REGISTER_COUNT as u64)));

    let (_, exit) = syscall(6);
    assert_eq!(exit.error, Some(RuntimeError::new(ErrorKind::BadRegister, GENERAL_REGISTER_COUNT as u64 + 1)));
  }

  #[test]
  fn no_syscalls_by_default() {
    let exit = Machine::new().exec(&program(&[Instruction::SysCall]));
    assert_eq!(exit.error, Some(RuntimeError::new(ErrorKind::BadSysCall, 0)));
  }
}
