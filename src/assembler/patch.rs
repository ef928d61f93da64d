/*!
  Linkage state of one assembler run: where every function, label and data entry ended up, and
  the 4-byte slots in the text segment which still wait for the address of a symbol.
*/

use byteorder::{ByteOrder, LittleEndian};
use tracing::debug;

use crate::error::LinkError;
use crate::ir::{self, FunName, Label};

/**
  Translates integer names into offsets. A `None` entry means the symbol has not been placed
  yet. Offset zero is a legitimate placement (the first function, or a label at its start), so
  placement is tracked explicitly instead of by value.
*/
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct OffsetsTable {
  /// Data entry name to offset in the data segment.
  pub data      : Vec<u32>,
  /// Function name to offset in the text segment.
  pub functions : Vec<Option<u32>>,
  /// Function name, then label name, to offset in the text segment.
  pub labels    : Vec<Vec<Option<u32>>>,
}

impl OffsetsTable {
  pub fn for_program(program: &ir::Program) -> OffsetsTable {
    OffsetsTable {
      data      : Vec::with_capacity(program.data.len()),
      functions : vec![None; program.functions.len()],
      labels    : program.functions.iter().map(|fun| vec![None; fun.labels.len()]).collect(),
    }
  }

  pub fn function(&self, fun: FunName) -> Option<u32> {
    self.functions.get(fun.index()).copied().flatten()
  }

  pub fn label(&self, fun: FunName, label: Label) -> Option<u32> {
    self.labels
        .get(fun.index())
        .and_then(|labels| labels.get(label.index()))
        .copied()
        .flatten()
  }
}

/// The symbol whose address a patch writes.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum PatchTarget {
  Fun(FunName),
  Label(FunName, Label),
}

/// A placeholder in the text segment: `offset` is the first of its four bytes.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct PatchEntry {
  pub target : PatchTarget,
  pub offset : u32,
}

pub(crate) fn unresolved(program: &ir::Program, target: PatchTarget) -> LinkError {
  match target {
    PatchTarget::Fun(fun) => LinkError::UnresolvedFunction(program.function_name(fun)),
    PatchTarget::Label(fun, label) => {
      let name = program
          .function(fun)
          .and_then(|f| f.label_name(label))
          .map(|name| name.to_string())
          .unwrap_or_else(|| format!("#{}", label.0));
      LinkError::UnresolvedLabel { function: program.function_name(fun), label: name }
    }
  }
}

/// Overwrites every placeholder with the now known address of its target.
pub fn apply_patches(
  text    : &mut [u8],
  patches : &[PatchEntry],
  table   : &OffsetsTable,
  program : &ir::Program
) -> Result<(), LinkError> {
  for patch in patches {
    let address =
      match patch.target {
        PatchTarget::Fun(fun)          => table.function(fun),
        PatchTarget::Label(fun, label) => table.label(fun, label),
      }
      .ok_or_else(|| unresolved(program, patch.target))?;

    let start = patch.offset as usize;
    LittleEndian::write_u32(&mut text[start..start + 4], address);
    debug!(slot = patch.offset, address, target = ?patch.target, "applied patch");
  }
  Ok(())
}


#[cfg(test)]
mod tests {
  use string_cache::DefaultAtom;

  use super::*;

  fn program() -> ir::Program {
    ir::Program {
      functions: vec![
        ir::Fun { name: DefaultAtom::from("main"), atoms: vec![], labels: vec![DefaultAtom::from("end")] },
        ir::Fun { name: DefaultAtom::from("f"), atoms: vec![], labels: vec![] },
      ],
      data: vec![],
      entry: FunName(0),
      global_size: 0,
    }
  }

  #[test]
  fn zero_offsets_count_as_placed() {
    let program = program();
    let mut table = OffsetsTable::for_program(&program);
    assert_eq!(table.function(FunName(0)), None);
    table.functions[0] = Some(0);
    table.labels[0][0] = Some(0);
    assert_eq!(table.function(FunName(0)), Some(0));
    assert_eq!(table.label(FunName(0), Label(0)), Some(0));
    assert_eq!(table.label(FunName(1), Label(0)), None);
  }

  #[test]
  fn patches_are_little_endian() {
    let program = program();
    let mut table = OffsetsTable::for_program(&program);
    table.functions[1] = Some(0x0102_0304);
    let mut text = vec![0xEE; 8];
    let patches = [PatchEntry { target: PatchTarget::Fun(FunName(1)), offset: 2 }];
    apply_patches(&mut text, &patches, &table, &program).unwrap();
    assert_eq!(text, vec![0xEE, 0xEE, 0x04, 0x03, 0x02, 0x01, 0xEE, 0xEE]);
  }

  #[test]
  fn unplaced_targets_fail() {
    let program = program();
    let table = OffsetsTable::for_program(&program);
    let mut text = vec![0; 8];
    let patches = [PatchEntry { target: PatchTarget::Label(FunName(0), Label(0)), offset: 0 }];
    assert_eq!(
      apply_patches(&mut text, &patches, &table, &program),
      Err(LinkError::UnresolvedLabel { function: "main".to_string(), label: "end".to_string() })
    );
  }
}
