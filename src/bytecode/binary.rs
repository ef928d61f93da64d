/*!
  This module is responsible for the encoding and decoding of binary instructions.

  An encoded instruction is two header bytes, `[opcode][layout]`, followed by the data bytes
  the pair calls for: register selectors first (destination before source), then an optional
  little-endian immediate. The machine and the disassembler both decode through
  `decode_instruction`, so there is a single reading of the instruction stream.
*/

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

use super::instruction::{Instruction, Opcode, Source, Target};
use super::layout::{
  data_size, pack_jump, pack_step, pack_value, unpack_generic, unpack_jump, unpack_call,
  unpack_step, unpack_value, GenericLayout, JumpFlag, LayoutFault, StepLayout, TargetLayout,
  ValueLayout, NIBBLE_MAX, NO_DATA_LAYOUT, REGISTER_LAYOUT,
};
use super::register::Register;

/// Size of the `[opcode][layout]` header.
pub const HEADER_SIZE: usize = 2;

/// Why the bytes at some offset are not an instruction.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Error)]
pub enum DecodeFault {
  #[error("fewer than two bytes remain at 0x{0:08X}")]
  Exhausted(usize),
  #[error("unknown opcode 0x{0:02X}")]
  BadOpcode(u8),
  #[error(transparent)]
  Layout(#[from] LayoutFault),
  #[error("instruction at 0x{0:08X} runs past the end of the text segment")]
  Truncated(usize),
}

// region Decoding

fn read_value(data: &[u8]) -> u64 {
  match data.len() {
    1 => data[0] as u64,
    2 => LittleEndian::read_u16(data) as u64,
    4 => LittleEndian::read_u32(data) as u64,
    8 => LittleEndian::read_u64(data),
    _ => 0
  }
}

/// Reads the trailing `Source` of the set/test and inc/dec families.
fn value_source(data: &[u8], inline: u8, wide: bool) -> Source {
  match (data.len(), wide) {
    (1, _)     => Source::Val(inline as u64),
    (2, false) => Source::Reg(Register(data[1])),
    _          => Source::Val(read_value(&data[1..])),
  }
}

fn generic_source(layout: GenericLayout, data: &[u8]) -> Source {
  match layout {
    GenericLayout::RegRegReg => Source::Reg(Register(data[2])),
    _                        => Source::Val(read_value(&data[2..])),
  }
}

fn target(mode: TargetLayout, data: &[u8]) -> Target {
  match mode {
    TargetLayout::Reg   => Target::Reg(Register(data[0])),
    TargetLayout::Val32 => Target::Offset(LittleEndian::read_u32(data)),
  }
}

/**
  Decodes the instruction starting at `ip`, returning it along with its total encoded size
  (header included). A zero opcode byte decodes as `trap` whatever its layout byte is.
*/
pub fn decode_instruction(text: &[u8], ip: usize) -> Result<(Instruction, usize), DecodeFault> {
  if text.len() < HEADER_SIZE || ip > text.len() - HEADER_SIZE {
    return Err(DecodeFault::Exhausted(ip));
  }
  let (code, layout) = (text[ip], text[ip + 1]);
  let opcode = Opcode::try_from(code).map_err(|_| DecodeFault::BadOpcode(code))?;

  let size = data_size(opcode, layout)?;
  let start = ip + HEADER_SIZE;
  if size > text.len() - start {
    return Err(DecodeFault::Truncated(ip));
  }
  let data = &text[start..start + size];

  let instruction =
    match opcode {
      Opcode::Trap    => Instruction::Trap,
      Opcode::Halt    => Instruction::Halt,
      Opcode::Nop     => Instruction::Nop,
      Opcode::SysCall => Instruction::SysCall,
      Opcode::Ret     => Instruction::Ret,

      Opcode::Jump => {
        let (flag, mode) = unpack_jump(layout)?;
        Instruction::Jump { flag, target: target(mode, data) }
      }

      Opcode::Call  => Instruction::Call(target(unpack_call(layout)?, data)),
      Opcode::Push  => Instruction::Push(Register(data[0])),
      Opcode::Pop   => Instruction::Pop(Register(data[0])),
      Opcode::Clear => Instruction::Clear(Register(data[0])),

      | Opcode::Set
      | Opcode::Test => {
        let (variant, inline) = unpack_value(layout)?;
        let dest   = Register(data[0]);
        let source = value_source(data, inline, variant != ValueLayout::Reg);
        match opcode {
          Opcode::Set => Instruction::Set { dest, source },
          _           => Instruction::Test { dest, source },
        }
      }

      | Opcode::Inc
      | Opcode::Dec => {
        let (variant, inline) = unpack_step(layout)?;
        let dest   = Register(data[0]);
        let source = value_source(data, inline, variant != StepLayout::Reg);
        match opcode {
          Opcode::Inc => Instruction::Inc { dest, source },
          _           => Instruction::Dec { dest, source },
        }
      }

      | Opcode::Add
      | Opcode::Sub
      | Opcode::Load
      | Opcode::Store => {
        let source = generic_source(unpack_generic(layout)?, data);
        let (first, second) = (Register(data[0]), Register(data[1]));
        match opcode {
          Opcode::Add  => Instruction::Add  { dest: first, left: second, right: source },
          Opcode::Sub  => Instruction::Sub  { dest: first, left: second, right: source },
          Opcode::Load => Instruction::Load { dest: first, base: second, offset: source },
          _            => Instruction::Store { base: first, source: second, offset: source },
        }
      }
    };

  Ok((instruction, HEADER_SIZE + size))
}

/// Decodes a whole text segment, pairing every instruction with its offset.
pub fn disassemble(text: &[u8]) -> Result<Vec<(u32, Instruction)>, DecodeFault> {
  let mut listing = Vec::new();
  let mut ip = 0;
  while ip < text.len() {
    let (instruction, size) = decode_instruction(text, ip)?;
    listing.push((ip as u32, instruction));
    ip += size;
  }
  Ok(listing)
}

// endregion

// region Encoding

fn push_register(out: &mut Vec<u8>, register: Register) {
  out.push(register.code());
}

fn encode_value_family(out: &mut Vec<u8>, opcode: Opcode, dest: Register, source: Source) {
  let (layout, immediate): (u8, Option<(u64, usize)>) =
    match source {
      Source::Reg(_)                       => (pack_value(ValueLayout::Reg, 0), None),
      Source::Val(v) if v <= NIBBLE_MAX    => (pack_value(ValueLayout::Val4, v as u8), None),
      Source::Val(v) if v <= u8::MAX as u64  => (pack_value(ValueLayout::Val8, 0), Some((v, 1))),
      Source::Val(v) if v <= u16::MAX as u64 => (pack_value(ValueLayout::Val16, 0), Some((v, 2))),
      Source::Val(v) if v <= u32::MAX as u64 => (pack_value(ValueLayout::Val32, 0), Some((v, 4))),
      Source::Val(v)                       => (pack_value(ValueLayout::Val64, 0), Some((v, 8))),
    };
  out.push(opcode.code());
  out.push(layout);
  push_register(out, dest);
  push_source_tail(out, source, immediate);
}

fn encode_step_family(out: &mut Vec<u8>, opcode: Opcode, dest: Register, source: Source) {
  let (layout, immediate): (u8, Option<(u64, usize)>) =
    match source {
      Source::Reg(_)                       => (pack_step(StepLayout::Reg, 0), None),
      Source::Val(v) if v <= NIBBLE_MAX    => (pack_step(StepLayout::Tiny, v as u8), None),
      Source::Val(v) if v <= u32::MAX as u64 => (pack_step(StepLayout::Val32, 0), Some((v, 4))),
      Source::Val(v)                       => (pack_step(StepLayout::Val64, 0), Some((v, 8))),
    };
  out.push(opcode.code());
  out.push(layout);
  push_register(out, dest);
  push_source_tail(out, source, immediate);
}

fn encode_generic(out: &mut Vec<u8>, opcode: Opcode, first: Register, second: Register, source: Source) {
  let (layout, immediate): (GenericLayout, Option<(u64, usize)>) =
    match source {
      Source::Reg(_)                       => (GenericLayout::RegRegReg, None),
      Source::Val(v) if v <= u32::MAX as u64 => (GenericLayout::RegRegVal32, Some((v, 4))),
      Source::Val(v)                       => (GenericLayout::RegRegVal64, Some((v, 8))),
    };
  out.push(opcode.code());
  out.push(layout.into());
  push_register(out, first);
  push_register(out, second);
  push_source_tail(out, source, immediate);
}

/// Writes the register or the explicit immediate which ends most instructions.
fn push_source_tail(out: &mut Vec<u8>, source: Source, immediate: Option<(u64, usize)>) {
  match (source, immediate) {
    (Source::Reg(register), _) => push_register(out, register),
    (Source::Val(_), Some((value, width))) => out.extend_from_slice(&value.to_le_bytes()[..width]),
    (Source::Val(_), None) => {}
  }
}

fn encode_target(out: &mut Vec<u8>, opcode: Opcode, flag: JumpFlag, target: Target) {
  let mode =
    match target {
      Target::Reg(_)    => TargetLayout::Reg,
      Target::Offset(_) => TargetLayout::Val32,
    };
  out.push(opcode.code());
  out.push(
    match opcode {
      Opcode::Jump => pack_jump(flag, mode),
      _            => mode.into()
    }
  );
  match target {
    Target::Reg(register) => push_register(out, register),
    Target::Offset(offset) => out.extend_from_slice(&offset.to_le_bytes()),
  }
}

/**
  Appends the encoding of `instruction` to `out`, choosing the smallest layout able to hold its
  operands. An `Offset` jump or call target is always encoded as four bytes directly after the
  header, which the assembler relies on when patching forward references.
*/
pub fn encode_instruction(instruction: &Instruction, out: &mut Vec<u8>) {
  let opcode = instruction.opcode();
  match *instruction {

    | Instruction::Trap
    | Instruction::Halt
    | Instruction::Nop
    | Instruction::SysCall
    | Instruction::Ret => {
      out.push(opcode.code());
      out.push(NO_DATA_LAYOUT);
    }

    Instruction::Jump { flag, target } => encode_target(out, opcode, flag, target),
    Instruction::Call(target) => encode_target(out, opcode, JumpFlag::Always, target),

    | Instruction::Push(register)
    | Instruction::Pop(register)
    | Instruction::Clear(register) => {
      out.push(opcode.code());
      out.push(REGISTER_LAYOUT);
      push_register(out, register);
    }

    | Instruction::Set  { dest, source }
    | Instruction::Test { dest, source } => encode_value_family(out, opcode, dest, source),

    | Instruction::Inc { dest, source }
    | Instruction::Dec { dest, source } => encode_step_family(out, opcode, dest, source),

    | Instruction::Add { dest, left, right }
    | Instruction::Sub { dest, left, right } => encode_generic(out, opcode, dest, left, right),

    Instruction::Load { dest, base, offset } => encode_generic(out, opcode, dest, base, offset),
    Instruction::Store { base, source, offset } => encode_generic(out, opcode, base, source, offset),

  }
}

/// Size in bytes of the encoding `encode_instruction` produces.
pub fn encoded_size(instruction: &Instruction) -> usize {
  let mut buffer = Vec::with_capacity(12);
  encode_instruction(instruction, &mut buffer);
  buffer.len()
}

// endregion


#[cfg(test)]
mod tests {
  use super::*;

  fn r(index: u8) -> Register {
    Register::general(index)
  }

  fn encode(instruction: Instruction) -> Vec<u8> {
    let mut out = Vec::new();
    encode_instruction(&instruction, &mut out);
    out
  }

  #[test]
  fn smallest_layout_is_chosen() {
    assert_eq!(encode(Instruction::Set { dest: Register::SC, source: Source::Val(7) }), vec![0x0A, 0x17, 0x83]);
    assert_eq!(encode(Instruction::Set { dest: r(1), source: Source::Val(19) }), vec![0x0A, 0x20, 0x01, 19]);
    assert_eq!(
      encode(Instruction::Set { dest: r(1), source: Source::Val(0x1234) }),
      vec![0x0A, 0x30, 0x01, 0x34, 0x12]
    );
    assert_eq!(encode(Instruction::Set { dest: r(1), source: Source::Reg(r(2)) }), vec![0x0A, 0x00, 1, 2]);
    assert_eq!(encode(Instruction::Inc { dest: r(3), source: Source::Val(1) }), vec![0x0E, 0x10, 3]);
    assert_eq!(encode(Instruction::Dec { dest: r(3), source: Source::Val(100) }), vec![0x0F, 0x02, 3, 100, 0, 0, 0]);
    assert_eq!(
      encode(Instruction::Add { dest: r(1), left: r(2), right: Source::Reg(r(3)) }),
      vec![0x10, 0x00, 1, 2, 3]
    );
    assert_eq!(
      encode(Instruction::Jump { flag: JumpFlag::Zero, target: Target::Offset(0x0102) }),
      vec![0x04, 0x11, 0x02, 0x01, 0, 0]
    );
    assert_eq!(encode(Instruction::Call(Target::Reg(r(4)))), vec![0x05, 0x00, 4]);
    assert_eq!(encode(Instruction::Halt), vec![0x01, 0x00]);
  }

  #[test]
  fn decode_reads_back_every_family() {
    let program = [
      Instruction::Nop,
      Instruction::Set { dest: Register::SC, source: Source::Val(u64::MAX) },
      Instruction::Test { dest: r(0), source: Source::Val(200) },
      Instruction::Inc { dest: r(9), source: Source::Val(15) },
      Instruction::Dec { dest: r(9), source: Source::Val(1 << 40) },
      Instruction::Sub { dest: r(1), left: r(1), right: Source::Val(5) },
      Instruction::Load { dest: r(1), base: r(2), offset: Source::Val(u64::MAX) },
      Instruction::Store { base: r(2), source: r(1), offset: Source::Reg(r(3)) },
      Instruction::Push(r(63)),
      Instruction::Pop(r(62)),
      Instruction::Clear(r(61)),
      Instruction::Jump { flag: JumpFlag::GreaterOrEqual, target: Target::Reg(r(7)) },
      Instruction::Call(Target::Offset(0)),
      Instruction::SysCall,
      Instruction::Ret,
    ];
    let mut text = Vec::new();
    for instruction in program.iter() {
      encode_instruction(instruction, &mut text);
    }

    let listing = disassemble(&text).unwrap();
    let decoded: Vec<Instruction> = listing.iter().map(|(_, instruction)| *instruction).collect();
    assert_eq!(decoded, program.to_vec());

    let mut expected_offset = 0;
    for (offset, instruction) in listing {
      assert_eq!(offset as usize, expected_offset);
      expected_offset += encoded_size(&instruction);
    }
  }

  #[test]
  fn trap_ignores_its_layout() {
    assert_eq!(decode_instruction(&[0x00, 0xAB], 0), Ok((Instruction::Trap, 2)));
  }

  #[test]
  fn decode_faults() {
    assert_eq!(decode_instruction(&[0x01], 0), Err(DecodeFault::Exhausted(0)));
    assert_eq!(decode_instruction(&[0x02, 0x00, 0x01], 2), Err(DecodeFault::Exhausted(2)));
    assert_eq!(decode_instruction(&[], 0), Err(DecodeFault::Exhausted(0)));
    assert_eq!(decode_instruction(&[0x7F, 0x00], 0), Err(DecodeFault::BadOpcode(0x7F)));
    assert_eq!(
      decode_instruction(&[0x04, 0x71, 0, 0, 0, 0], 0),
      Err(DecodeFault::Layout(LayoutFault::BadJumpFlag(0x71)))
    );
    assert_eq!(
      decode_instruction(&[0x01, 0x01], 0),
      Err(DecodeFault::Layout(LayoutFault::BadVariant(0x01)))
    );
    assert_eq!(decode_instruction(&[0x0A, 0x50, 0x01, 0x02], 0), Err(DecodeFault::Truncated(0)));
  }
}
