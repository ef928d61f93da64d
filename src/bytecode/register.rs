//! Register selectors. A register is encoded as a single byte: values below 64 select one of the
//! general-purpose registers, values with the high bit set select a special (control) register.

use std::fmt::{Display, Formatter};

use strum_macros::{Display as StrumDisplay, EnumIter, EnumString, IntoStaticStr};
use num_enum::{TryFromPrimitive, IntoPrimitive};

/// Number of general-purpose registers.
pub const GENERAL_REGISTER_COUNT: usize = 64;

/// Bit which tags a register byte as special.
pub const SPECIAL_REGISTER_BIT: u8 = 0x80;

/// The closed set of special registers.
#[derive(
  StrumDisplay, IntoStaticStr, EnumString, EnumIter, TryFromPrimitive, IntoPrimitive,
  Clone,        Copy,          Eq,         PartialEq, Debug,            Hash
)]
#[strum(serialize_all = "lowercase")]
#[repr(u8)]
pub enum SpecialRegister {
  /// Instruction pointer. Read-only, managed by the machine.
  Ip    = 0x80,
  /// Stack pointer. Read-only, managed by the machine.
  Sp    = 0x81,
  /// Frame pointer. Read-only, managed by the machine.
  Fp    = 0x82,
  /// Syscall register: selects the syscall number and receives its result. Read-write.
  Sc    = 0x83,
  /// Comparison flags. Read-only, written by `test`.
  Cf    = 0x84,
  /// Number of executed instructions. Read-only, managed by the machine.
  Clock = 0x85,
}

impl SpecialRegister {
  pub fn is_writable(&self) -> bool {
    *self == SpecialRegister::Sc
  }
}

/// A register as it appears in instruction data.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub struct Register(pub u8);

impl Register {
  pub const IP    : Register = Register(SpecialRegister::Ip    as u8);
  pub const SP    : Register = Register(SpecialRegister::Sp    as u8);
  pub const FP    : Register = Register(SpecialRegister::Fp    as u8);
  pub const SC    : Register = Register(SpecialRegister::Sc    as u8);
  pub const CF    : Register = Register(SpecialRegister::Cf    as u8);
  pub const CLOCK : Register = Register(SpecialRegister::Clock as u8);

  /// Panics if `index` is not a general-purpose register index.
  pub fn general(index: u8) -> Register {
    assert!((index as usize) < GENERAL_REGISTER_COUNT, "general register index {} out of range", index);
    Register(index)
  }

  pub fn code(&self) -> u8 {
    self.0
  }

  pub fn is_special(&self) -> bool {
    self.0 & SPECIAL_REGISTER_BIT != 0
  }

  /// Index into the general-purpose register file, if this is a valid general register.
  pub fn general_index(&self) -> Option<usize> {
    match (self.0 as usize) < GENERAL_REGISTER_COUNT {
      true  => Some(self.0 as usize),
      false => None
    }
  }

  /// The special register this byte selects, if it selects one.
  pub fn special(&self) -> Option<SpecialRegister> {
    match self.is_special() {
      true  => SpecialRegister::try_from(self.0).ok(),
      false => None
    }
  }

  /**
    Whether instructions may write this register. Only general registers and `sc` qualify;
    bytes which select no register at all are not writable either.
  */
  pub fn is_writable(&self) -> bool {
    match self.special() {
      Some(special) => special.is_writable(),
      None          => self.general_index().is_some()
    }
  }

  /// Parses a register name as written in assembly, without the `#:` prefix.
  pub fn from_name(name: &str) -> Option<Register> {
    if let Ok(special) = name.parse::<SpecialRegister>() {
      return Some(special.into());
    }
    let index = name.strip_prefix('r')?;
    // Reject forms like `r007` or `r+1` which `parse` would otherwise accept.
    if index.is_empty() || (index.len() > 1 && index.starts_with('0')) || !index.bytes().all(|b| b.is_ascii_digit()) {
      return None;
    }
    match index.parse::<u8>() {
      Ok(index) if (index as usize) < GENERAL_REGISTER_COUNT => Some(Register(index)),
      _ => None
    }
  }
}

impl From<SpecialRegister> for Register {
  fn from(special: SpecialRegister) -> Register {
    Register(special.into())
  }
}

impl Display for Register {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match (self.special(), self.general_index()) {
      (Some(special), _) => write!(f, "#:{}", special),
      (None, Some(index)) => write!(f, "#:r{}", index),
      (None, None) => write!(f, "#:?{:02X}", self.0),
    }
  }
}
