//! Syntax tree of an assembly source file. Names are kept as written; nothing is resolved yet.

/// An instruction operand.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Operand {
  /// `#:name`, without the prefix.
  Register(String),
  Integer(u64),
  /// `@.name`, without the prefix.
  Label(String),
  /// A function or data name, possibly dotted.
  Symbol(String),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Instruction {
  pub line     : usize,
  pub mnemonic : String,
  /// The suffix of a dotted mnemonic, as in `jump.nz`.
  pub variant  : Option<String>,
  pub operands : Vec<Operand>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Atom {
  Instruction(Instruction),
  /// `@.name:`
  Place { line: usize, name: String },
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Fun {
  pub line  : usize,
  pub name  : String,
  pub atoms : Vec<Atom>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DataItem {
  /// A string literal, escapes already applied.
  Bytes(Vec<u8>),
  /// A single byte.
  Integer(u64),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Data {
  pub line  : usize,
  pub name  : String,
  pub items : Vec<DataItem>,
}

/// A directive naming a symbol or a size, `#entry name;` or `#global size;`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Directive<T> {
  pub line  : usize,
  pub value : T,
}

/// A whole source file.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Text {
  /// Every `#entry` directive in order. Only one is allowed, which translation checks.
  pub entries   : Vec<Directive<String>>,
  pub globals   : Vec<Directive<u64>>,
  pub functions : Vec<Fun>,
  pub data      : Vec<Data>,
  /// Number of the last line, for errors about the file as a whole.
  pub last_line : usize,
}
