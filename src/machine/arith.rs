//! Register arithmetic and memory access.

use crate::address::Pointer;
use crate::bytecode::{Register, Source};

use super::error::RuntimeError;
use super::Machine;

impl Machine {

  fn value(&self, source: Source) -> Result<u64, RuntimeError> {
    match source {
      Source::Reg(register) => self.registers.read(register),
      Source::Val(value)    => Ok(value),
    }
  }

  pub(super) fn exec_set(&mut self, dest: Register, source: Source) -> Result<(), RuntimeError> {
    let value = self.value(source)?;
    self.registers.write(dest, value)
  }

  pub(super) fn exec_test(&mut self, dest: Register, source: Source) -> Result<(), RuntimeError> {
    let left  = self.registers.read(dest)?;
    let right = self.value(source)?;
    self.registers.compare(left, right);
    Ok(())
  }

  /// `inc` and `dec`: `dest = op(dest, source)`.
  pub(super) fn exec_step(&mut self, dest: Register, source: Source, op: fn(u64, u64) -> u64)
    -> Result<(), RuntimeError>
  {
    let left  = self.registers.read(dest)?;
    let right = self.value(source)?;
    self.registers.write(dest, op(left, right))
  }

  /// `add` and `sub`: `dest = op(left, right)`.
  pub(super) fn exec_binary(&mut self, dest: Register, left: Register, right: Source, op: fn(u64, u64) -> u64)
    -> Result<(), RuntimeError>
  {
    let left  = self.registers.read(left)?;
    let right = self.value(right)?;
    self.registers.write(dest, op(left, right))
  }

  fn effective_address(&self, base: Register, offset: Source) -> Result<Pointer, RuntimeError> {
    let base   = Pointer(self.registers.read(base)?);
    let offset = self.value(offset)?;
    Ok(base.add_offset(offset))
  }

  pub(super) fn exec_load(&mut self, dest: Register, base: Register, offset: Source) -> Result<(), RuntimeError> {
    self.registers.check_writable(dest)?;
    let pointer = self.effective_address(base, offset)?;
    let value = self.memory.load_word(pointer)?;
    self.registers.write(dest, value)
  }

  pub(super) fn exec_store(&mut self, base: Register, source: Register, offset: Source) -> Result<(), RuntimeError> {
    let pointer = self.effective_address(base, offset)?;
    let value = self.registers.read(source)?;
    self.memory.store_word(pointer, value)
  }

}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::address::Segment;
  use crate::bytecode::{encode_instruction, Instruction};
  use crate::executable::Program;
  use crate::machine::{ErrorKind, FLAG_LESS, FLAG_ZERO};

  fn r(index: u8) -> Register {
    Register::general(index)
  }

  fn run(instructions: &[Instruction]) -> (Machine, crate::machine::Exit) {
    let mut text = Vec::new();
    for instruction in instructions {
      encode_instruction(instruction, &mut text);
    }
    let program = Program { text, data: b"constant".to_vec(), entry_point: 0, global_size: 32 };
    let mut machine = Machine::new();
    let exit = machine.exec(&program);
    (machine, exit)
  }

  #[test]
  fn arithmetic_wraps() {
    let (machine, exit) = run(&[
      Instruction::Set { dest: r(1), source: Source::Val(u64::MAX) },
      Instruction::Inc { dest: r(1), source: Source::Val(2) },
      Instruction::Dec { dest: r(2), source: Source::Val(1) },
      Instruction::Set { dest: r(3), source: Source::Val(100) },
      Instruction::Add { dest: r(4), left: r(3), right: Source::Val(23) },
      Instruction::Sub { dest: r(5), left: r(3), right: Source::Reg(r(4)) },
      Instruction::Inc { dest: r(3), source: Source::Reg(r(3)) },
      Instruction::Halt,
    ]);
    assert!(exit.is_normal());
    let general = &machine.registers().general;
    assert_eq!(general[1], 1);
    assert_eq!(general[2], u64::MAX);
    assert_eq!(general[4], 123);
    assert_eq!(general[5], 100u64.wrapping_sub(123));
    assert_eq!(general[3], 200);
  }

  #[test]
  fn clear_and_set() {
    let (machine, _) = run(&[
      Instruction::Set { dest: r(7), source: Source::Val(0xDEAD_BEEF) },
      Instruction::Set { dest: r(8), source: Source::Reg(r(7)) },
      Instruction::Clear(r(7)),
      Instruction::Set { dest: r(9), source: Source::Reg(Register::CLOCK) },
      Instruction::Halt,
    ]);
    assert_eq!(machine.registers().general[7], 0);
    assert_eq!(machine.registers().general[8], 0xDEAD_BEEF);
    assert_eq!(machine.registers().general[9], 3);
  }

  #[test]
  fn test_sets_flags() {
    let (machine, _) = run(&[
      Instruction::Set { dest: r(1), source: Source::Val(5) },
      Instruction::Test { dest: r(1), source: Source::Val(9) },
      Instruction::Halt,
    ]);
    assert_eq!(machine.registers().cf, FLAG_LESS);

    let (machine, _) = run(&[Instruction::Test { dest: r(1), source: Source::Reg(r(2)) }, Instruction::Halt]);
    assert_eq!(machine.registers().cf, FLAG_ZERO);
  }

  #[test]
  fn writes_to_read_only_registers() {
    for dest in [Register::IP, Register::SP, Register::FP, Register::CF, Register::CLOCK] {
      let (_, exit) = run(&[Instruction::Inc { dest, source: Source::Val(1) }]);
      assert_eq!(exit.error, Some(RuntimeError::new(ErrorKind::ReadOnlySpecialRegisterWrite, dest.code() as u64)));
      assert_eq!(exit.ip, 0);
    }
  }

  #[test]
  fn load_and_store() {
    let global = Pointer::new(Segment::Global, 0).raw();
    let data = Pointer::new(Segment::Data, 0).raw();
    let (machine, exit) = run(&[
      Instruction::Set { dest: r(1), source: Source::Val(global) },
      Instruction::Set { dest: r(2), source: Source::Val(0x1122_3344_5566_7788) },
      Instruction::Set { dest: r(3), source: Source::Val(24) },
      Instruction::Store { base: r(1), source: r(2), offset: Source::Reg(r(3)) },
      Instruction::Load { dest: r(4), base: r(1), offset: Source::Val(24) },
      Instruction::Set { dest: r(5), source: Source::Val(data) },
      Instruction::Load { dest: Register::SC, base: r(5), offset: Source::Val(0) },
      Instruction::Halt,
    ]);
    assert!(exit.is_normal());
    assert_eq!(machine.registers().general[4], 0x1122_3344_5566_7788);
    assert_eq!(machine.memory().global[24], 0x88);
    assert_eq!(exit.status, u64::from_le_bytes(*b"constant"));
  }

  #[test]
  fn memory_faults() {
    let global = Pointer::new(Segment::Global, 0);
    let data = Pointer::new(Segment::Data, 0);
    let cases = [
      (global.raw(), 25, RuntimeError::new(ErrorKind::SegmentOutOfBounds, global.add_offset(25).raw())),
      (data.raw(), 0, RuntimeError::new(ErrorKind::ReadOnlySegmentWrite, data.raw())),
      (0xAB00_0000_0000_0000, 0, RuntimeError::new(ErrorKind::BadSegmentTag, 0xAB00_0000_0000_0000)),
    ];
    for (base, offset, expected) in cases {
      let (_, exit) = run(&[
        Instruction::Set { dest: r(1), source: Source::Val(base) },
        Instruction::Store { base: r(1), source: r(2), offset: Source::Val(offset) },
        Instruction::Halt,
      ]);
      assert_eq!(exit.error, Some(expected));
    }
  }
}
