/*!
  Lowers an IR program into a resolved executable.

  Data entries are laid out first, in declaration order, so their offsets are known before any
  instruction refers to them. Functions are then encoded contiguously in declaration order.
  A call or jump whose target has already been placed is encoded with its final address;
  otherwise a zero placeholder is written and a patch entry is recorded, and all patches are
  applied once the text segment is complete.

  Execution always begins at text offset 0. If the entry function is not the first function, a
  `jump` to it is emitted at offset 0 ahead of all functions.
*/

mod patch;

use tracing::{debug, trace};

use crate::address::{Pointer, Segment};
use crate::bytecode::{encode_instruction, Instruction, JumpFlag, Source, Target, HEADER_SIZE};
use crate::error::LinkError;
use crate::executable::Program;
use crate::ir::{self, Atom, FunName};

pub use patch::{apply_patches, OffsetsTable, PatchEntry, PatchTarget};

/// State of a single assembler run. It is consumed by `finish`.
pub struct Assembler<'p> {
  program : &'p ir::Program,
  text    : Vec<u8>,
  data    : Vec<u8>,
  table   : OffsetsTable,
  patches : Vec<PatchEntry>,
}

impl<'p> Assembler<'p> {

  pub fn new(program: &'p ir::Program) -> Assembler<'p> {
    Assembler {
      program,
      text    : Vec::new(),
      data    : Vec::new(),
      table   : OffsetsTable::for_program(program),
      patches : Vec::new(),
    }
  }

  /// Current offset into the text segment.
  fn text_offset(&self) -> Result<u32, LinkError> {
    u32::try_from(self.text.len()).map_err(|_| LinkError::TextTooLarge(u32::MAX as usize))
  }

  pub fn patches(&self) -> &[PatchEntry] {
    &self.patches
  }

  pub fn offsets(&self) -> &OffsetsTable {
    &self.table
  }

  // region Data segment

  pub fn encode_data_segment(&mut self) -> Result<(), LinkError> {
    let program = self.program;
    for entry in program.data.iter() {
      let offset = u32::try_from(self.data.len()).map_err(|_| LinkError::DataTooLarge(u32::MAX as usize))?;
      self.data.extend_from_slice(&entry.bytes);
      self.table.data.push(offset);
      debug!(name = %entry.name, offset, size = entry.bytes.len(), "placed data entry");
    }
    u32::try_from(self.data.len()).map_err(|_| LinkError::DataTooLarge(u32::MAX as usize))?;
    Ok(())
  }

  // endregion

  // region Text segment

  pub fn encode_text_segment(&mut self) -> Result<(), LinkError> {
    let program = self.program;
    if program.function(program.entry).is_none() {
      return Err(LinkError::BadEntryFunction(program.function_name(program.entry)));
    }

    if program.entry.index() != 0 {
      self.jump_to_function(JumpFlag::Always, program.entry)?;
      debug!(entry = %program.function_name(program.entry), "emitted entry prologue");
    }

    for (index, fun) in program.functions.iter().enumerate() {
      let name = FunName(index as u32);
      let offset = self.text_offset()?;
      self.table.functions[index] = Some(offset);
      debug!(function = %fun.name, offset, "placed function");

      for atom in fun.atoms.iter() {
        self.encode_atom(name, atom)?;
      }
    }
    self.text_offset()?;
    Ok(())
  }

  fn encode_atom(&mut self, fun: FunName, atom: &Atom) -> Result<(), LinkError> {
    trace!(offset = self.text.len(), atom = ?atom, "encoding atom");
    match atom {

      Atom::Place(label) => {
        let offset = self.text_offset()?;
        let program = self.program;
        let slot = self.table.labels[fun.index()]
                       .get_mut(label.index())
                       .ok_or_else(|| patch::unresolved(program, PatchTarget::Label(fun, *label)))?;
        match slot {
          Some(_) => {
            let function = program.function_name(fun);
            let label = program.functions[fun.index()].labels[label.index()].to_string();
            return Err(LinkError::DuplicateLabelPlacement { function, label });
          }
          None => *slot = Some(offset)
        }
      }

      Atom::Instruction(ir::Instruction::Plain(instruction)) => {
        encode_instruction(instruction, &mut self.text);
      }

      Atom::Instruction(ir::Instruction::CallFun(callee)) => {
        if callee.index() >= self.table.functions.len() {
          return Err(patch::unresolved(self.program, PatchTarget::Fun(*callee)));
        }
        let address = self.table.function(*callee);
        self.emit_transfer(
          |offset| Instruction::Call(Target::Offset(offset)),
          address,
          PatchTarget::Fun(*callee)
        )?;
      }

      Atom::Instruction(ir::Instruction::JumpLabel { label, flag }) => {
        let target = PatchTarget::Label(fun, *label);
        if label.index() >= self.table.labels[fun.index()].len() {
          return Err(patch::unresolved(self.program, target));
        }
        let flag = *flag;
        let address = self.table.label(fun, *label);
        self.emit_transfer(
          |offset| Instruction::Jump { flag, target: Target::Offset(offset) },
          address,
          target
        )?;
      }

      Atom::Instruction(ir::Instruction::SetData { dest, data }) => {
        let offset = self.table
                         .data
                         .get(data.index())
                         .copied()
                         .ok_or(LinkError::UnresolvedData(data.0))?;
        let pointer = Pointer::new(Segment::Data, offset as u64);
        encode_instruction(
          &Instruction::Set { dest: *dest, source: Source::Val(pointer.raw()) },
          &mut self.text
        );
      }

    }
    Ok(())
  }

  fn jump_to_function(&mut self, flag: JumpFlag, fun: FunName) -> Result<(), LinkError> {
    let address = self.table.function(fun);
    self.emit_transfer(
      |offset| Instruction::Jump { flag, target: Target::Offset(offset) },
      address,
      PatchTarget::Fun(fun)
    )
  }

  /**
    Emits a call or jump with an immediate text offset. An unplaced target gets a zero
    placeholder and a patch entry for the four bytes after the instruction header.
  */
  fn emit_transfer<F>(&mut self, make: F, address: Option<u32>, target: PatchTarget) -> Result<(), LinkError>
    where F: Fn(u32) -> Instruction
  {
    let start = self.text_offset()?;
    match address {
      Some(address) => encode_instruction(&make(address), &mut self.text),
      None => {
        encode_instruction(&make(0), &mut self.text);
        self.patches.push(PatchEntry { target, offset: start + HEADER_SIZE as u32 });
        trace!(slot = start + HEADER_SIZE as u32, target = ?target, "recorded patch");
      }
    }
    Ok(())
  }

  // endregion

  /// Applies the patches and hands out the executable along with the final offsets table.
  pub fn finish(mut self) -> Result<(Program, OffsetsTable), LinkError> {
    apply_patches(&mut self.text, &self.patches, &self.table, self.program)?;
    debug!(
      text = self.text.len(),
      data = self.data.len(),
      patches = self.patches.len(),
      "assembled program"
    );
    let program = Program {
      text        : self.text,
      data        : self.data,
      entry_point : 0,
      global_size : self.program.global_size,
    };
    Ok((program, self.table))
  }
}

/// Runs all assembler passes over `program`.
pub fn assemble_with_offsets(program: &ir::Program) -> Result<(Program, OffsetsTable), LinkError> {
  let mut assembler = Assembler::new(program);
  assembler.encode_data_segment()?;
  assembler.encode_text_segment()?;
  assembler.finish()
}

pub fn assemble(program: &ir::Program) -> Result<Program, LinkError> {
  assemble_with_offsets(program).map(|(program, _)| program)
}
