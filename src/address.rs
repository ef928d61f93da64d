//! A tagged pointer into one of the machine's five memory segments, with some convenience
//! functions.

use std::fmt::{Display, Formatter};

use strum_macros::{Display as StrumDisplay, EnumIter, IntoStaticStr};
use num_enum::{TryFromPrimitive, IntoPrimitive};

/// Number of bits of a pointer which hold the offset. The byte above them is the segment tag.
pub const OFFSET_BITS: u32 = 56;
pub const OFFSET_MASK: u64 = (1 << OFFSET_BITS) - 1;

#[derive(
  StrumDisplay, IntoStaticStr, EnumIter, TryFromPrimitive, IntoPrimitive,
  Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug
)]
#[strum(serialize_all = "lowercase")]
#[repr(u8)]
pub enum Segment {
  /// Code. Read-only.
  Text   = 0,
  /// Initialized constants from the executable. Read-only.
  Data   = 1,
  /// Zero-initialized globals.
  Global = 2,
  Stack  = 3,
  Heap   = 4,
}

impl Segment {
  pub fn is_writable(&self) -> bool {
    !matches!(self, Segment::Text | Segment::Data)
  }
}

/**
  A raw 64-bit value used as a pointer. The top byte is the segment tag and the low 56 bits are
  the byte offset within the segment. A `Pointer` is never trusted: the tag is validated by
  `segment()` and the offset by the machine's memory when the pointer is resolved.
*/
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub struct Pointer(pub u64);

impl Pointer {
  pub fn new(segment: Segment, offset: u64) -> Pointer {
    Pointer(((Into::<u8>::into(segment) as u64) << OFFSET_BITS) | (offset & OFFSET_MASK))
  }

  pub fn tag(&self) -> u8 {
    (self.0 >> OFFSET_BITS) as u8
  }

  /// The segment, or `None` if the tag byte names no segment.
  pub fn segment(&self) -> Option<Segment> {
    Segment::try_from(self.tag()).ok()
  }

  pub fn offset(&self) -> u64 {
    self.0 & OFFSET_MASK
  }

  /// Moves the pointer within its segment. The tag is never disturbed by overflow.
  pub fn add_offset(&self, delta: u64) -> Pointer {
    Pointer((self.0 & !OFFSET_MASK) | (self.offset().wrapping_add(delta) & OFFSET_MASK))
  }

  pub fn raw(&self) -> u64 {
    self.0
  }
}

impl Display for Pointer {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self.segment() {
      Some(segment) => write!(f, "{}[0x{:X}]", segment, self.offset()),
      None          => write!(f, "?{:02X}[0x{:X}]", self.tag(), self.offset())
    }
  }
}
