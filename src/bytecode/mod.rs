/*!

  The instruction set. Instructions are byte-aligned and variable-length:

    [Opcode:8][Layout:8][Data:0..80]

  The opcode selects the instruction family and the layout selects the variant within it. The
  pair fully determines the length of the data that follows, which holds one-byte register
  selectors (destination first) and then an optional little-endian immediate of 1, 2, 4 or 8
  bytes. Small immediates (0 to 15) of `set`, `test`, `inc` and `dec` are packed into a spare
  nibble of the layout byte and need no data at all.

  Decoded instructions are represented as a sum type, `Instruction`, with one variant per
  opcode. Unlike the byte encoding it does not record a layout; `encode_instruction` chooses the
  smallest layout able to hold the operands.

  Registers are one byte. Values 0 to 63 select a general-purpose register, values with the
  high bit set select one of the special registers.

*/

mod binary;
mod instruction;
mod layout;
mod register;

pub use binary::{decode_instruction, disassemble, encode_instruction, encoded_size, DecodeFault, HEADER_SIZE};
pub use instruction::{Instruction, Opcode, Source, Target};
pub use layout::{
  data_size, pack_jump, pack_step, pack_value, unpack_call, unpack_generic, unpack_jump,
  unpack_step, unpack_value, GenericLayout, JumpFlag, LayoutFault, StepLayout, TargetLayout,
  ValueLayout,
};
pub use register::{Register, SpecialRegister, GENERAL_REGISTER_COUNT};
