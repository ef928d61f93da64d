use std::fmt::{Display, Formatter};

use strum_macros::{Display as StrumDisplay, EnumIter, EnumString, IntoStaticStr};
use num_enum::{TryFromPrimitive, IntoPrimitive};

use crate::bytecode::layout::JumpFlag;
use crate::bytecode::register::Register;

/**
  Opcodes of the virtual machine.

  The opcode is the first byte of every encoded instruction and selects the instruction family.
  The second byte, the layout, selects the variant within the family (see `bytecode::layout`).

  `Trap` is zero. Every `[00 XX]` pair aborts execution regardless of its layout byte, so
  zeroed text faults when it is executed.
*/
#[derive(
  StrumDisplay, IntoStaticStr, EnumString, EnumIter, TryFromPrimitive, IntoPrimitive,
  Clone,        Copy,          Eq,         PartialEq, Debug,            Hash
)]
#[strum(serialize_all = "lowercase")]
#[repr(u8)]
pub enum Opcode {
  // Control //
  Trap    = 0x00, // trap
  Halt    = 0x01, // halt
  Nop     = 0x02, // nop
  SysCall = 0x03, // syscall
  Jump    = 0x04, // jump( label | register )
  Call    = 0x05, // call( function | register )
  Ret     = 0x06, // ret

  // Stack //
  Push    = 0x07, // push( register )
  Pop     = 0x08, // pop( register )

  // Registers and memory //
  Clear   = 0x09, // clear( register )
  Set     = 0x0A, // set( register, register | immediate )
  Load    = 0x0B, // load( register, register, register | immediate )
  Store   = 0x0C, // store( register, register, register | immediate )
  Test    = 0x0D, // test( register, register | immediate )

  // Arithmetic //
  Inc     = 0x0E, // inc( register [, register | immediate] )
  Dec     = 0x0F, // dec( register [, register | immediate] )
  Add     = 0x10, // add( register, register, register | immediate )
  Sub     = 0x11, // sub( register, register, register | immediate )
}

impl Opcode {
  pub fn code(&self) -> u8 {
    Into::<u8>::into(*self)
  }

  /// The mnemonic used in assembly text.
  pub fn mnemonic(&self) -> &'static str {
    self.into()
  }
}

/// The second operand of most instruction families: either a register or an immediate value.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Source {
  Reg(Register),
  Val(u64),
}

impl Display for Source {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Source::Reg(register) => write!(f, "{}", register),
      Source::Val(value)    => write!(f, "{}", value),
    }
  }
}

/// Destination of a jump or call.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Target {
  /// A register holding a text segment pointer.
  Reg(Register),
  /// An offset into the text segment.
  Offset(u32),
}

impl Display for Target {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Target::Reg(register) => write!(f, "{}", register),
      Target::Offset(offset) => write!(f, "0x{:08X}", offset),
    }
  }
}

/**
  Holds the unencoded components of an instruction. As such, it enumerates the possible
  instruction argument combinations. Which layout an instruction is encoded with is decided by
  `binary::encode_instruction`, which always picks the smallest layout able to hold the operands.
*/
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Instruction {
  Trap,
  Halt,
  Nop,
  SysCall,
  Ret,
  Jump {
    flag   : JumpFlag,
    target : Target,
  },
  Call(Target),
  Push(Register),
  Pop(Register),
  Clear(Register),
  Set {
    dest   : Register,
    source : Source,
  },
  Test {
    dest   : Register,
    source : Source,
  },
  Inc {
    dest   : Register,
    source : Source,
  },
  Dec {
    dest   : Register,
    source : Source,
  },
  Add {
    dest  : Register,
    left  : Register,
    right : Source,
  },
  Sub {
    dest  : Register,
    left  : Register,
    right : Source,
  },
  /// `dest = *(base + offset)`
  Load {
    dest   : Register,
    base   : Register,
    offset : Source,
  },
  /// `*(base + offset) = source`
  Store {
    base   : Register,
    source : Register,
    offset : Source,
  },
}

impl Instruction {
  pub fn opcode(&self) -> Opcode {
    match self {
      Instruction::Trap           => Opcode::Trap,
      Instruction::Halt           => Opcode::Halt,
      Instruction::Nop            => Opcode::Nop,
      Instruction::SysCall        => Opcode::SysCall,
      Instruction::Ret            => Opcode::Ret,
      Instruction::Jump { .. }    => Opcode::Jump,
      Instruction::Call(_)        => Opcode::Call,
      Instruction::Push(_)        => Opcode::Push,
      Instruction::Pop(_)         => Opcode::Pop,
      Instruction::Clear(_)       => Opcode::Clear,
      Instruction::Set { .. }     => Opcode::Set,
      Instruction::Test { .. }    => Opcode::Test,
      Instruction::Inc { .. }     => Opcode::Inc,
      Instruction::Dec { .. }     => Opcode::Dec,
      Instruction::Add { .. }     => Opcode::Add,
      Instruction::Sub { .. }     => Opcode::Sub,
      Instruction::Load { .. }    => Opcode::Load,
      Instruction::Store { .. }   => Opcode::Store,
    }
  }

  /// Whether control never falls through to the next instruction.
  pub fn is_terminator(&self) -> bool {
    matches!(
      self,
      Instruction::Trap
      | Instruction::Halt
      | Instruction::Ret
      | Instruction::Jump { flag: JumpFlag::Always, .. }
    )
  }
}

impl Display for Instruction {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let opcode = self.opcode();
    match self {

      | Instruction::Trap
      | Instruction::Halt
      | Instruction::Nop
      | Instruction::SysCall
      | Instruction::Ret => {
        write!(f, "{};", opcode)
      }

      Instruction::Jump { flag: JumpFlag::Always, target } => {
        write!(f, "{} {};", opcode, target)
      }

      Instruction::Jump { flag, target } => {
        write!(f, "{}.{} {};", opcode, flag, target)
      }

      Instruction::Call(target) => {
        write!(f, "{} {};", opcode, target)
      }

      | Instruction::Push(register)
      | Instruction::Pop(register)
      | Instruction::Clear(register) => {
        write!(f, "{} {};", opcode, register)
      }

      | Instruction::Set  { dest, source }
      | Instruction::Test { dest, source }
      | Instruction::Inc  { dest, source }
      | Instruction::Dec  { dest, source } => {
        write!(f, "{} {}, {};", opcode, dest, source)
      }

      | Instruction::Add { dest, left, right }
      | Instruction::Sub { dest, left, right } => {
        write!(f, "{} {}, {}, {};", opcode, dest, left, right)
      }

      Instruction::Load { dest, base, offset } => {
        write!(f, "{} {}, {}, {};", opcode, dest, base, offset)
      }

      Instruction::Store { base, source, offset } => {
        write!(f, "{} {}, {}, {};", opcode, base, source, offset)
      }

    }
  }
}
