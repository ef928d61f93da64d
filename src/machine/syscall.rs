/*!
  The single syscall dispatch point. The machine itself implements no syscalls: the `syscall`
  instruction hands the number in `sc` to the installed `SysCallHandler`, and the value the
  handler returns is written back to `sc`.
*/

use thiserror::Error;

use crate::address::Pointer;
use crate::bytecode::GENERAL_REGISTER_COUNT;

use super::error::{ErrorKind, RuntimeError};
use super::memory::Memory;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Error)]
pub enum SysCallError {
  /// The handler does not implement this number.
  #[error("unknown syscall {0}")]
  Unknown(u64),
  /// The handler hit a runtime error while accessing machine state.
  #[error(transparent)]
  Fault(#[from] RuntimeError),
}

impl From<SysCallError> for RuntimeError {
  fn from(error: SysCallError) -> RuntimeError {
    match error {
      SysCallError::Unknown(number) => RuntimeError::new(ErrorKind::BadSysCall, number),
      SysCallError::Fault(error)    => error,
    }
  }
}

/// The part of the machine a syscall handler may see and change.
pub struct SysCallContext<'m> {
  registers : &'m mut [u64; GENERAL_REGISTER_COUNT],
  memory    : &'m mut Memory,
}

impl<'m> SysCallContext<'m> {
  pub(crate) fn new(registers: &'m mut [u64; GENERAL_REGISTER_COUNT], memory: &'m mut Memory) -> Self {
    SysCallContext { registers, memory }
  }

  /// General-purpose register `index`, which must be below 64.
  pub fn register(&self, index: usize) -> Result<u64, RuntimeError> {
    self.registers
        .get(index)
        .copied()
        .ok_or_else(|| RuntimeError::new(ErrorKind::BadRegister, index as u64))
  }

  pub fn set_register(&mut self, index: usize, value: u64) -> Result<(), RuntimeError> {
    let slot = self.registers
                   .get_mut(index)
                   .ok_or_else(|| RuntimeError::new(ErrorKind::BadRegister, index as u64))?;
    *slot = value;
    Ok(())
  }

  pub fn read(&self, pointer: Pointer, length: usize) -> Result<&[u8], RuntimeError> {
    self.memory.resolve(pointer, length)
  }

  pub fn write(&mut self, pointer: Pointer, bytes: &[u8]) -> Result<(), RuntimeError> {
    self.memory.resolve_mut(pointer, bytes.len())?.copy_from_slice(bytes);
    Ok(())
  }

  /// Grows the heap by `additional` zeroed bytes, returning a pointer to them.
  pub fn grow_heap(&mut self, additional: usize) -> Result<Pointer, RuntimeError> {
    self.memory.grow_heap(additional)
  }
}

pub trait SysCallHandler {
  fn syscall(&mut self, number: u64, context: &mut SysCallContext<'_>) -> Result<u64, SysCallError>;
}

/// Rejects every syscall.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoSysCalls;

impl SysCallHandler for NoSysCalls {
  fn syscall(&mut self, number: u64, _context: &mut SysCallContext<'_>) -> Result<u64, SysCallError> {
    Err(SysCallError::Unknown(number))
  }
}
