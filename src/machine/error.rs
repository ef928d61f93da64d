use strum_macros::{Display as StrumDisplay, EnumIter, IntoStaticStr};
use num_enum::IntoPrimitive;
use thiserror::Error;

use crate::bytecode::{DecodeFault, LayoutFault};

/**
  Why a run stopped abnormally. Each kind has a stable numeric code, starting at 1, and the
  auxiliary value of a `RuntimeError` is interpreted according to its kind:

    kind                            aux
    ---------------------------------------------------------------
    TextSegmentExhausted            instruction pointer
    Trap                            layout byte of the trap
    BadOpcode                       opcode byte
    BadSegmentTag                   raw pointer
    BadSpecialRegister              register byte
    BadRegister                     register byte
    BadJumpAddress, BadCallAddress  target offset
    BadInstructionVariant           layout byte
    BadJumpConditionFlag            layout byte
    EmptyFrameStack                 0
    ReadOnlySpecialRegisterWrite    register byte
    InstructionDataTruncated        instruction pointer
    NonTextSegmentJumpTarget        raw pointer
    SegmentOutOfBounds              raw pointer
    ReadOnlySegmentWrite            raw pointer
    StackOverflow                   stack size (or frame count) that was refused
    StackUnderflow                  stack pointer
    HeapLimitExceeded               heap size that was refused
    BadSysCall                      syscall number
*/
#[derive(
  StrumDisplay, IntoStaticStr, EnumIter, IntoPrimitive,
  Copy, Clone, Eq, PartialEq, Hash, Debug
)]
#[strum(serialize_all = "snake_case")]
#[repr(u32)]
pub enum ErrorKind {
  TextSegmentExhausted = 1,
  Trap,
  BadOpcode,
  BadSegmentTag,
  BadSpecialRegister,
  BadRegister,
  BadJumpAddress,
  BadCallAddress,
  BadInstructionVariant,
  BadJumpConditionFlag,
  EmptyFrameStack,
  ReadOnlySpecialRegisterWrite,
  InstructionDataTruncated,
  NonTextSegmentJumpTarget,
  SegmentOutOfBounds,
  ReadOnlySegmentWrite,
  StackOverflow,
  StackUnderflow,
  HeapLimitExceeded,
  BadSysCall,
}

impl ErrorKind {
  pub fn code(&self) -> u32 {
    Into::<u32>::into(*self)
  }
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Error)]
#[error("{kind} (code={}, aux=0x{aux:X})", .kind.code())]
pub struct RuntimeError {
  pub kind : ErrorKind,
  pub aux  : u64,
}

impl RuntimeError {
  pub fn new(kind: ErrorKind, aux: u64) -> RuntimeError {
    RuntimeError { kind, aux }
  }

  /// Classifies a failure to decode the instruction at `ip`.
  pub fn from_decode(fault: DecodeFault, ip: u64) -> RuntimeError {
    match fault {
      DecodeFault::Exhausted(_)  => RuntimeError::new(ErrorKind::TextSegmentExhausted, ip),
      DecodeFault::BadOpcode(op) => RuntimeError::new(ErrorKind::BadOpcode, op as u64),
      DecodeFault::Truncated(_)  => RuntimeError::new(ErrorKind::InstructionDataTruncated, ip),
      DecodeFault::Layout(LayoutFault::BadVariant(layout)) => {
        RuntimeError::new(ErrorKind::BadInstructionVariant, layout as u64)
      }
      DecodeFault::Layout(LayoutFault::BadJumpFlag(layout)) => {
        RuntimeError::new(ErrorKind::BadJumpConditionFlag, layout as u64)
      }
    }
  }
}
