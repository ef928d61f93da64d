/*!
  Layout bytes.

  The second byte of every instruction is its layout. Each opcode family interprets the layout
  byte in its own way, and together with the opcode it fully determines how many data bytes
  follow the two header bytes. Three packing conventions are used:

    jump         [flag:4][mode:4]       flag is the condition, mode is register or val32
    set, test    [variant:4][value:4]   value is an inline immediate for the val4 variant
    inc, dec     [value:4][variant:4]   value is an inline immediate for the tiny variant

  Everything else uses a plain small integer. All packing is done on plain bytes through the
  functions in this module.
*/

use strum_macros::{Display as StrumDisplay, EnumIter, EnumString, IntoStaticStr};
use num_enum::{TryFromPrimitive, IntoPrimitive};
use thiserror::Error;

use crate::bytecode::instruction::Opcode;

/// Layout of instructions without data: `halt`, `nop`, `syscall`, `ret`.
pub const NO_DATA_LAYOUT: u8 = 0;
/// Layout of the single-register families: `push`, `pop`, `clear`.
pub const REGISTER_LAYOUT: u8 = 0;

/// Largest immediate which fits in a layout nibble.
pub const NIBBLE_MAX: u64 = 0x0F;

/// Why a layout byte was rejected.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Error)]
pub enum LayoutFault {
  #[error("layout 0x{0:02X} is not a variant of its opcode")]
  BadVariant(u8),
  #[error("layout 0x{0:02X} has an undefined jump condition")]
  BadJumpFlag(u8),
}

/// Jump conditions, evaluated against the flags register written by `test`.
#[derive(
  StrumDisplay, IntoStaticStr, EnumString, EnumIter, TryFromPrimitive, IntoPrimitive,
  Clone,        Copy,          Eq,         PartialEq, Debug,            Hash
)]
#[repr(u8)]
pub enum JumpFlag {
  #[strum(serialize = "always")]
  Always         = 0,
  #[strum(serialize = "z")]
  Zero           = 1,
  #[strum(serialize = "nz")]
  NotZero        = 2,
  #[strum(serialize = "l")]
  Less           = 3,
  #[strum(serialize = "le")]
  LessOrEqual    = 4,
  #[strum(serialize = "g")]
  Greater        = 5,
  #[strum(serialize = "ge")]
  GreaterOrEqual = 6,
}

/// Addressing mode of `jump` and `call` targets.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive, EnumIter)]
#[repr(u8)]
pub enum TargetLayout {
  /// `RR`: a register holding a text pointer.
  Reg   = 0,
  /// `II II II II`: a text offset.
  Val32 = 1,
}

/// Variants of `set` and `test`, stored in the high nibble.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive, EnumIter)]
#[repr(u8)]
pub enum ValueLayout {
  /// `RR RR`
  Reg   = 0,
  /// `RR`, value in the low nibble of the layout.
  Val4  = 1,
  /// `RR II`
  Val8  = 2,
  /// `RR II×2`
  Val16 = 3,
  /// `RR II×4`
  Val32 = 4,
  /// `RR II×8`
  Val64 = 5,
}

/// Variants of `inc` and `dec`, stored in the low nibble.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive, EnumIter)]
#[repr(u8)]
pub enum StepLayout {
  /// `RR`, value in the high nibble of the layout.
  Tiny  = 0,
  /// `RR RR`
  Reg   = 1,
  /// `RR II×4`
  Val32 = 2,
  /// `RR II×8`
  Val64 = 3,
}

/// The layouts shared by `add`, `sub`, `load` and `store`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive, EnumIter)]
#[repr(u8)]
pub enum GenericLayout {
  /// `RR RR RR`
  RegRegReg   = 0,
  /// `RR RR II×4`
  RegRegVal32 = 1,
  /// `RR RR II×8`
  RegRegVal64 = 2,
}

// region Pack and unpack

fn high_nibble(layout: u8) -> u8 {
  layout >> 4
}

fn low_nibble(layout: u8) -> u8 {
  layout & 0x0F
}

pub fn pack_jump(flag: JumpFlag, mode: TargetLayout) -> u8 {
  (Into::<u8>::into(flag) << 4) | Into::<u8>::into(mode)
}

pub fn unpack_jump(layout: u8) -> Result<(JumpFlag, TargetLayout), LayoutFault> {
  let mode = TargetLayout::try_from(low_nibble(layout)).map_err(|_| LayoutFault::BadVariant(layout))?;
  let flag = JumpFlag::try_from(high_nibble(layout)).map_err(|_| LayoutFault::BadJumpFlag(layout))?;
  Ok((flag, mode))
}

pub fn unpack_call(layout: u8) -> Result<TargetLayout, LayoutFault> {
  TargetLayout::try_from(layout).map_err(|_| LayoutFault::BadVariant(layout))
}

/// Packs a `set`/`test` layout. `inline` is only kept for `Val4` and must not exceed 15.
pub fn pack_value(variant: ValueLayout, inline: u8) -> u8 {
  let inline = match variant {
    ValueLayout::Val4 => inline & 0x0F,
    _                 => 0
  };
  (Into::<u8>::into(variant) << 4) | inline
}

/// Returns the variant and the inline value, which is zero for every variant but `Val4`.
pub fn unpack_value(layout: u8) -> Result<(ValueLayout, u8), LayoutFault> {
  let variant = ValueLayout::try_from(high_nibble(layout)).map_err(|_| LayoutFault::BadVariant(layout))?;
  match (variant, low_nibble(layout)) {
    (ValueLayout::Val4, inline) => Ok((variant, inline)),
    (_, 0)                      => Ok((variant, 0)),
    _                           => Err(LayoutFault::BadVariant(layout)),
  }
}

/// Packs an `inc`/`dec` layout. `inline` is only kept for `Tiny` and must not exceed 15.
pub fn pack_step(variant: StepLayout, inline: u8) -> u8 {
  let inline = match variant {
    StepLayout::Tiny => inline & 0x0F,
    _                => 0
  };
  (inline << 4) | Into::<u8>::into(variant)
}

pub fn unpack_step(layout: u8) -> Result<(StepLayout, u8), LayoutFault> {
  let variant = StepLayout::try_from(low_nibble(layout)).map_err(|_| LayoutFault::BadVariant(layout))?;
  match (variant, high_nibble(layout)) {
    (StepLayout::Tiny, inline) => Ok((variant, inline)),
    (_, 0)                     => Ok((variant, 0)),
    _                          => Err(LayoutFault::BadVariant(layout)),
  }
}

pub fn unpack_generic(layout: u8) -> Result<GenericLayout, LayoutFault> {
  GenericLayout::try_from(layout).map_err(|_| LayoutFault::BadVariant(layout))
}

// endregion

/**
  The number of data bytes following the two header bytes of an instruction with the given
  opcode and layout. `trap` accepts any layout and never has data.
*/
pub fn data_size(opcode: Opcode, layout: u8) -> Result<usize, LayoutFault> {
  let size =
    match opcode {

      Opcode::Trap => 0,

      | Opcode::Halt
      | Opcode::Nop
      | Opcode::SysCall
      | Opcode::Ret => {
        match layout == NO_DATA_LAYOUT {
          true  => 0,
          false => return Err(LayoutFault::BadVariant(layout))
        }
      }

      Opcode::Jump => {
        match unpack_jump(layout)?.1 {
          TargetLayout::Reg   => 1,
          TargetLayout::Val32 => 4,
        }
      }

      Opcode::Call => {
        match unpack_call(layout)? {
          TargetLayout::Reg   => 1,
          TargetLayout::Val32 => 4,
        }
      }

      | Opcode::Push
      | Opcode::Pop
      | Opcode::Clear => {
        match layout == REGISTER_LAYOUT {
          true  => 1,
          false => return Err(LayoutFault::BadVariant(layout))
        }
      }

      | Opcode::Set
      | Opcode::Test => {
        match unpack_value(layout)?.0 {
          ValueLayout::Reg   => 2,
          ValueLayout::Val4  => 1,
          ValueLayout::Val8  => 2,
          ValueLayout::Val16 => 3,
          ValueLayout::Val32 => 5,
          ValueLayout::Val64 => 9,
        }
      }

      | Opcode::Inc
      | Opcode::Dec => {
        match unpack_step(layout)?.0 {
          StepLayout::Tiny  => 1,
          StepLayout::Reg   => 2,
          StepLayout::Val32 => 5,
          StepLayout::Val64 => 9,
        }
      }

      | Opcode::Add
      | Opcode::Sub
      | Opcode::Load
      | Opcode::Store => {
        match unpack_generic(layout)? {
          GenericLayout::RegRegReg   => 3,
          GenericLayout::RegRegVal32 => 6,
          GenericLayout::RegRegVal64 => 10,
        }
      }

    };
  Ok(size)
}
