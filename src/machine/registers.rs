/*!
  The register file. Special registers other than `sc` are only ever updated by the machine
  itself; the instruction stream may read them but not write them.
*/

use crate::bytecode::{Register, SpecialRegister, GENERAL_REGISTER_COUNT};

use super::error::{ErrorKind, RuntimeError};

/// Bit of the flags register set by `test` when its operands are equal.
pub const FLAG_ZERO: u64 = 1 << 0;
/// Bit of the flags register set by `test` when its first operand is below the second (unsigned).
pub const FLAG_LESS: u64 = 1 << 1;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RegisterFile {
  /// Instruction pointer, an offset into the text segment.
  pub ip      : u64,
  /// Stack pointer, an offset into the stack segment.
  pub sp      : u64,
  /// Frame pointer, an offset into the stack segment.
  pub fp      : u64,
  /// Syscall number on entry to `syscall`, its result on return. The exit status of a run.
  pub sc      : u64,
  /// Comparison flags.
  pub cf      : u64,
  /// Number of completed instructions.
  pub clock   : u64,
  pub general : [u64; GENERAL_REGISTER_COUNT],
}

impl Default for RegisterFile {
  fn default() -> Self {
    RegisterFile {
      ip      : 0,
      sp      : 0,
      fp      : 0,
      sc      : 0,
      cf      : 0,
      clock   : 0,
      general : [0; GENERAL_REGISTER_COUNT],
    }
  }
}

/// Classifies a register byte which selects no register at all.
fn unknown(register: Register) -> RuntimeError {
  match register.is_special() {
    true  => RuntimeError::new(ErrorKind::BadSpecialRegister, register.code() as u64),
    false => RuntimeError::new(ErrorKind::BadRegister, register.code() as u64)
  }
}

impl RegisterFile {
  pub fn reset(&mut self) {
    *self = RegisterFile::default();
  }

  pub fn read(&self, register: Register) -> Result<u64, RuntimeError> {
    if let Some(index) = register.general_index() {
      return Ok(self.general[index]);
    }
    match register.special() {
      Some(SpecialRegister::Ip)    => Ok(self.ip),
      Some(SpecialRegister::Sp)    => Ok(self.sp),
      Some(SpecialRegister::Fp)    => Ok(self.fp),
      Some(SpecialRegister::Sc)    => Ok(self.sc),
      Some(SpecialRegister::Cf)    => Ok(self.cf),
      Some(SpecialRegister::Clock) => Ok(self.clock),
      None                         => Err(unknown(register))
    }
  }

  /// Fails exactly when `write` would, without writing.
  pub fn check_writable(&self, register: Register) -> Result<(), RuntimeError> {
    if register.is_writable() {
      return Ok(());
    }
    match register.special() {
      Some(_) => Err(RuntimeError::new(ErrorKind::ReadOnlySpecialRegisterWrite, register.code() as u64)),
      None    => Err(unknown(register))
    }
  }

  pub fn write(&mut self, register: Register, value: u64) -> Result<(), RuntimeError> {
    self.check_writable(register)?;
    match register.general_index() {
      Some(index) => self.general[index] = value,
      None        => self.sc = value,
    }
    Ok(())
  }

  /// Sets the flags register from comparing `left` with `right`.
  pub fn compare(&mut self, left: u64, right: u64) {
    let mut flags = 0;
    if left == right {
      flags |= FLAG_ZERO;
    }
    if left < right {
      flags |= FLAG_LESS;
    }
    self.cf = flags;
  }
}
