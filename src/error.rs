/*!
  Load-time, assembly-time and link-time errors. Each stage has its own enum and they are never
  conflated with the machine's runtime errors, which are values reported in `machine::Exit`.
*/

use std::io;

use thiserror::Error;

/// Failure to encode or decode an executable.
#[derive(Debug, Error)]
pub enum FormatError {
  #[error("i/o error: {0}")]
  Io(#[from] io::Error),

  #[error("bad magic: {0:02X?}")]
  BadMagic([u8; 4]),

  #[error("bad version: {0}")]
  BadVersion(u32),

  #[error("file ends inside the {0}")]
  Truncated(&'static str),

  #[error("bad segment layout: {0}")]
  BadSegmentLayout(String),

  #[error("{segment} segment of {size} bytes does not fit in the header")]
  SegmentTooLarge { segment: &'static str, size: usize },
}

/// Failure to turn assembly text into a program. Every variant carries its 1-based source line.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum AssemblyError {
  #[error("line {line}: syntax error: {message}")]
  Syntax { line: usize, message: String },

  #[error("line {line}: unknown mnemonic `{mnemonic}`")]
  UnknownMnemonic { line: usize, mnemonic: String },

  #[error("line {line}: `{mnemonic}` takes {expected} operand(s), found {found}")]
  WrongOperandCount { line: usize, mnemonic: String, expected: String, found: usize },

  #[error("line {line}: operand {position} of `{mnemonic}` must be {expected}")]
  BadOperand { line: usize, mnemonic: String, position: usize, expected: &'static str },

  #[error("line {line}: unknown register `#:{name}`")]
  UnknownRegister { line: usize, name: String },

  #[error("line {line}: function `{name}` is already defined")]
  DuplicateFunction { line: usize, name: String },

  #[error("line {line}: label `@.{name}` is already placed in this function")]
  DuplicateLabel { line: usize, name: String },

  #[error("line {line}: data `{name}` is already defined")]
  DuplicateData { line: usize, name: String },

  #[error("line {line}: call to undefined function `{name}`")]
  UndefinedFunction { line: usize, name: String },

  #[error("line {line}: jump to undefined label `@.{name}`")]
  UndefinedLabel { line: usize, name: String },

  #[error("line {line}: reference to undefined data `{name}`")]
  UndefinedData { line: usize, name: String },

  #[error("line {line}: no `#entry` directive")]
  MissingEntry { line: usize },

  #[error("line {line}: entry is already declared")]
  DuplicateEntry { line: usize },

  #[error("line {line}: register {register} cannot be written")]
  ReadOnlyDestination { line: usize, register: String },

  #[error("line {line}: immediate {value} is out of range for {context}")]
  ImmediateOutOfRange { line: usize, value: u64, context: &'static str },
}

impl AssemblyError {
  pub fn line(&self) -> usize {
    match self {
      | AssemblyError::Syntax { line, .. }
      | AssemblyError::UnknownMnemonic { line, .. }
      | AssemblyError::WrongOperandCount { line, .. }
      | AssemblyError::BadOperand { line, .. }
      | AssemblyError::UnknownRegister { line, .. }
      | AssemblyError::DuplicateFunction { line, .. }
      | AssemblyError::DuplicateLabel { line, .. }
      | AssemblyError::DuplicateData { line, .. }
      | AssemblyError::UndefinedFunction { line, .. }
      | AssemblyError::UndefinedLabel { line, .. }
      | AssemblyError::UndefinedData { line, .. }
      | AssemblyError::MissingEntry { line }
      | AssemblyError::DuplicateEntry { line }
      | AssemblyError::ReadOnlyDestination { line, .. }
      | AssemblyError::ImmediateOutOfRange { line, .. } => *line
    }
  }
}

/// Failure to lower an IR program into an executable. These indicate IR which did not come from
/// the translator, which checks names before linking.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum LinkError {
  #[error("reference to unknown function `{0}`")]
  UnresolvedFunction(String),

  #[error("reference to unknown label `@.{label}` in function `{function}`")]
  UnresolvedLabel { function: String, label: String },

  #[error("reference to unknown data entry #{0}")]
  UnresolvedData(u32),

  #[error("entry function `{0}` is not defined")]
  BadEntryFunction(String),

  #[error("label `@.{label}` is placed twice in function `{function}`")]
  DuplicateLabelPlacement { function: String, label: String },

  #[error("text segment exceeds {0} bytes")]
  TextTooLarge(usize),

  #[error("data segment exceeds {0} bytes")]
  DataTooLarge(usize),
}

/// Any failure of the assemble-and-link pipeline or of the executable format.
#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Format(#[from] FormatError),

  #[error(transparent)]
  Assembly(#[from] AssemblyError),

  #[error(transparent)]
  Link(#[from] LinkError),
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn messages_carry_lines() {
    let error = AssemblyError::UnknownMnemonic { line: 7, mnemonic: "copy".to_string() };
    assert_eq!(error.line(), 7);
    assert_eq!(error.to_string(), "line 7: unknown mnemonic `copy`");
  }

  #[test]
  fn stages_convert_into_crate_error() {
    let error: Error = LinkError::BadEntryFunction("main".to_string()).into();
    assert!(matches!(error, Error::Link(LinkError::BadEntryFunction(_))));
    assert_eq!(error.to_string(), "entry function `main` is not defined");
  }
}
