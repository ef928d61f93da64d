/*!
  The intermediate representation: a program before linking.

  Functions, labels and data entries are referred to by integer names. A `FunName` indexes
  `Program::functions`, a `DataName` indexes `Program::data`, and a `Label` indexes the `labels`
  list of the function in which it is used. Labels are local to their function. The textual
  names are kept alongside for diagnostics.
*/

use std::fmt::{Display, Formatter};

use string_cache::DefaultAtom;

use crate::bytecode::{self, JumpFlag, Register};

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub struct FunName(pub u32);

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub struct Label(pub u32);

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub struct DataName(pub u32);

macro_rules! integer_name {
  ($name:ident) => {
    impl $name {
      pub fn index(&self) -> usize {
        self.0 as usize
      }
    }

    impl From<u32> for $name {
      fn from(value: u32) -> $name {
        $name(value)
      }
    }
  };
}

integer_name!(FunName);
integer_name!(Label);
integer_name!(DataName);

/// An instruction whose operands may still be symbolic.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Instruction {
  /// Fully concrete, encoded as is.
  Plain(bytecode::Instruction),
  /// Static call, dispatched to the function's text offset.
  CallFun(FunName),
  /// Jump to a label of the enclosing function.
  JumpLabel {
    label : Label,
    flag  : JumpFlag,
  },
  /// Loads a pointer to a data entry.
  SetData {
    dest : Register,
    data : DataName,
  },
}

impl Instruction {
  /// Whether control never falls through past this instruction.
  pub fn is_terminator(&self) -> bool {
    match self {
      Instruction::Plain(instruction) => instruction.is_terminator(),
      Instruction::JumpLabel { flag, .. } => *flag == JumpFlag::Always,
      _ => false
    }
  }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Atom {
  Instruction(Instruction),
  /// Places a label at the position of the next instruction.
  Place(Label),
}

impl From<bytecode::Instruction> for Atom {
  fn from(instruction: bytecode::Instruction) -> Atom {
    Atom::Instruction(Instruction::Plain(instruction))
  }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Fun {
  pub name   : DefaultAtom,
  pub atoms  : Vec<Atom>,
  /// Names of the labels used in this function, indexed by `Label`.
  pub labels : Vec<DefaultAtom>,
}

impl Fun {
  pub fn label_name(&self, label: Label) -> Option<&DefaultAtom> {
    self.labels.get(label.index())
  }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DataEntry {
  pub name  : DefaultAtom,
  pub bytes : Vec<u8>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Program {
  pub functions   : Vec<Fun>,
  pub data        : Vec<DataEntry>,
  pub entry       : FunName,
  pub global_size : u32,
}

impl Program {
  pub fn function(&self, name: FunName) -> Option<&Fun> {
    self.functions.get(name.index())
  }

  pub fn function_name(&self, name: FunName) -> String {
    match self.function(name) {
      Some(fun) => fun.name.to_string(),
      None      => format!("#{}", name.0)
    }
  }
}

impl Display for Fun {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    writeln!(f, "#fun {} {{", self.name)?;
    for atom in &self.atoms {
      match atom {
        Atom::Place(label) => {
          let name = self.label_name(*label).map(|name| name.to_string()).unwrap_or_default();
          writeln!(f, "@.{}:", name)?;
        }
        Atom::Instruction(Instruction::Plain(instruction)) => writeln!(f, "  {}", instruction)?,
        Atom::Instruction(Instruction::CallFun(fun)) => writeln!(f, "  call <fun {}>;", fun.0)?,
        Atom::Instruction(Instruction::JumpLabel { label, flag }) => {
          let name = self.label_name(*label).map(|name| name.to_string()).unwrap_or_default();
          match flag {
            JumpFlag::Always => writeln!(f, "  jump @.{};", name)?,
            _                => writeln!(f, "  jump.{} @.{};", flag, name)?,
          }
        }
        Atom::Instruction(Instruction::SetData { dest, data }) => {
          writeln!(f, "  set {}, <data {}>;", dest, data.0)?
        }
      }
    }
    write!(f, "}}")
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::bytecode::Target;

  #[test]
  fn terminators() {
    assert!(Instruction::Plain(bytecode::Instruction::Ret).is_terminator());
    assert!(Instruction::JumpLabel { label: Label(0), flag: JumpFlag::Always }.is_terminator());
    assert!(!Instruction::JumpLabel { label: Label(0), flag: JumpFlag::Less }.is_terminator());
    assert!(!Instruction::CallFun(FunName(0)).is_terminator());
    assert!(
      !Instruction::Plain(
        bytecode::Instruction::Jump { flag: JumpFlag::Zero, target: Target::Offset(0) }
      ).is_terminator()
    );
  }

  #[test]
  fn display_function() {
    let fun = Fun {
      name   : DefaultAtom::from("main"),
      atoms  : vec![
        Atom::Instruction(Instruction::JumpLabel { label: Label(0), flag: JumpFlag::NotZero }),
        Atom::Place(Label(0)),
        bytecode::Instruction::Halt.into(),
      ],
      labels : vec![DefaultAtom::from("done")],
    };
    assert_eq!(fun.to_string(), "#fun main {\n  jump.nz @.done;\n@.done:\n  halt;\n}");
  }
}
