/*!
  Translation of a syntax tree into the IR.

  Functions and data entries get integer names in declaration order, so a function may be called
  before it is defined. Labels are numbered per function in order of placement. Every symbolic
  reference is checked here, which leaves nothing for the linker to reject in translated programs.

  A function whose last atom lets control fall through gets an implicit terminator: `halt` for
  the entry function and `ret` for any other.
*/

use string_cache::DefaultAtom;

use crate::bytecode::{self, JumpFlag, Opcode, Register, Source, Target};
use crate::error::AssemblyError;
use crate::ir::{self, Atom, DataEntry, DataName, FunName, Label};
use crate::symboltable::SymbolTable;

use super::ast::{self, DataItem, Operand};

/// Resolves the operands of one instruction, reporting errors against its line and mnemonic.
struct Operands<'t> {
  instruction : &'t ast::Instruction,
  mnemonic    : String,
}

impl<'t> Operands<'t> {
  fn new(instruction: &'t ast::Instruction) -> Operands<'t> {
    let mnemonic =
      match &instruction.variant {
        Some(variant) => format!("{}.{}", instruction.mnemonic, variant),
        None          => instruction.mnemonic.clone(),
      };
    Operands { instruction, mnemonic }
  }

  fn line(&self) -> usize {
    self.instruction.line
  }

  fn len(&self) -> usize {
    self.instruction.operands.len()
  }

  fn expect_count(&self, min: usize, max: usize) -> Result<(), AssemblyError> {
    let found = self.len();
    if found >= min && found <= max {
      return Ok(());
    }
    let expected =
      match min == max {
        true  => min.to_string(),
        false => format!("{} or {}", min, max),
      };
    Err(AssemblyError::WrongOperandCount { line: self.line(), mnemonic: self.mnemonic.clone(), expected, found })
  }

  /// Operand at 0-based `index`. Callers check the count first.
  fn get(&self, index: usize) -> &'t Operand {
    &self.instruction.operands[index]
  }

  fn bad(&self, index: usize, expected: &'static str) -> AssemblyError {
    AssemblyError::BadOperand { line: self.line(), mnemonic: self.mnemonic.clone(), position: index + 1, expected }
  }

  fn lookup_register(&self, name: &str) -> Result<Register, AssemblyError> {
    Register::from_name(name).ok_or_else(|| AssemblyError::UnknownRegister { line: self.line(), name: name.to_string() })
  }

  fn register(&self, index: usize) -> Result<Register, AssemblyError> {
    match self.get(index) {
      Operand::Register(name) => self.lookup_register(name),
      _ => Err(self.bad(index, "a register"))
    }
  }

  /// A register the instruction writes.
  fn destination(&self, index: usize) -> Result<Register, AssemblyError> {
    let register = self.register(index)?;
    match register.is_writable() {
      true  => Ok(register),
      false => Err(AssemblyError::ReadOnlyDestination { line: self.line(), register: register.to_string() })
    }
  }

  fn source(&self, index: usize) -> Result<Source, AssemblyError> {
    match self.get(index) {
      Operand::Register(name) => Ok(Source::Reg(self.lookup_register(name)?)),
      Operand::Integer(value) => Ok(Source::Val(*value)),
      _ => Err(self.bad(index, "a register or an integer"))
    }
  }
}

struct Translator<'t> {
  text      : &'t ast::Text,
  functions : SymbolTable<FunName>,
  data      : SymbolTable<DataName>,
}

impl<'t> Translator<'t> {

  fn new(text: &'t ast::Text) -> Translator<'t> {
    Translator {
      text,
      functions : SymbolTable::new(),
      data      : SymbolTable::new(),
    }
  }

  fn program(&mut self) -> Result<ir::Program, AssemblyError> {
    let entry = self.entry_directive()?;
    let global_size = self.global_size()?;

    for fun in &self.text.functions {
      self.functions.insert(&fun.name).map_err(|_| {
        AssemblyError::DuplicateFunction { line: fun.line, name: fun.name.clone() }
      })?;
    }
    let data = self.data_entries()?;

    let entry_name = self.functions.get_id(&entry.value).ok_or_else(|| {
      AssemblyError::UndefinedFunction { line: entry.line, name: entry.value.clone() }
    })?;

    let mut functions = Vec::with_capacity(self.text.functions.len());
    for (index, fun) in self.text.functions.iter().enumerate() {
      let is_entry = index == entry_name.index();
      functions.push(self.function(fun, is_entry)?);
    }

    Ok(ir::Program { functions, data, entry: entry_name, global_size })
  }

  fn entry_directive(&self) -> Result<&'t ast::Directive<String>, AssemblyError> {
    match self.text.entries.as_slice() {
      [] => Err(AssemblyError::MissingEntry { line: self.text.last_line }),
      [entry] => Ok(entry),
      [_, second, ..] => Err(AssemblyError::DuplicateEntry { line: second.line }),
    }
  }

  fn global_size(&self) -> Result<u32, AssemblyError> {
    match self.text.globals.as_slice() {
      [] => Ok(0),
      [global] => {
        u32::try_from(global.value).map_err(|_| {
          AssemblyError::ImmediateOutOfRange { line: global.line, value: global.value, context: "the global segment size" }
        })
      }
      [_, second, ..] => Err(AssemblyError::Syntax {
        line    : second.line,
        message : "the global segment size is already declared".to_string(),
      }),
    }
  }

  fn data_entries(&mut self) -> Result<Vec<DataEntry>, AssemblyError> {
    let mut entries = Vec::with_capacity(self.text.data.len());
    for data in &self.text.data {
      self.data.insert(&data.name).map_err(|_| {
        AssemblyError::DuplicateData { line: data.line, name: data.name.clone() }
      })?;

      let mut bytes = Vec::new();
      for item in &data.items {
        match item {
          DataItem::Bytes(string) => bytes.extend_from_slice(string),
          DataItem::Integer(value) => {
            let byte = u8::try_from(*value).map_err(|_| {
              AssemblyError::ImmediateOutOfRange { line: data.line, value: *value, context: "a data byte" }
            })?;
            bytes.push(byte);
          }
        }
      }
      entries.push(DataEntry { name: DefaultAtom::from(data.name.as_str()), bytes });
    }
    Ok(entries)
  }

  fn function(&self, fun: &ast::Fun, is_entry: bool) -> Result<ir::Fun, AssemblyError> {
    let mut labels: SymbolTable<Label> = SymbolTable::new();
    for atom in &fun.atoms {
      if let ast::Atom::Place { line, name } = atom {
        labels.insert(name).map_err(|_| AssemblyError::DuplicateLabel { line: *line, name: name.clone() })?;
      }
    }

    let mut atoms = Vec::with_capacity(fun.atoms.len() + 1);
    for atom in &fun.atoms {
      let translated =
        match atom {
          ast::Atom::Place { name, .. } => {
            // Present by construction of `labels` above.
            match labels.get_id(name) {
              Some(label) => Atom::Place(label),
              None        => continue
            }
          }
          ast::Atom::Instruction(instruction) => Atom::Instruction(self.instruction(instruction, &labels)?),
        };
      atoms.push(translated);
    }

    let terminated = matches!(atoms.last(), Some(Atom::Instruction(last)) if last.is_terminator());
    if !terminated {
      let terminator =
        match is_entry {
          true  => bytecode::Instruction::Halt,
          false => bytecode::Instruction::Ret,
        };
      atoms.push(terminator.into());
    }

    Ok(ir::Fun {
      name   : DefaultAtom::from(fun.name.as_str()),
      atoms,
      labels : labels.names(),
    })
  }

  fn instruction(&self, instruction: &ast::Instruction, labels: &SymbolTable<Label>)
    -> Result<ir::Instruction, AssemblyError>
  {
    let operands = Operands::new(instruction);
    let line = instruction.line;
    let unknown = || AssemblyError::UnknownMnemonic { line, mnemonic: operands.mnemonic.clone() };

    let opcode = instruction.mnemonic.parse::<Opcode>().map_err(|_| unknown())?;
    let flag =
      match (&instruction.variant, opcode) {
        (None, _) => JumpFlag::Always,
        (Some(variant), Opcode::Jump) => variant.parse::<JumpFlag>().map_err(|_| unknown())?,
        (Some(_), _) => return Err(unknown()),
      };

    let plain =
      match opcode {

        | Opcode::Trap
        | Opcode::Halt
        | Opcode::Nop
        | Opcode::SysCall
        | Opcode::Ret => {
          operands.expect_count(0, 0)?;
          match opcode {
            Opcode::Trap    => bytecode::Instruction::Trap,
            Opcode::Halt    => bytecode::Instruction::Halt,
            Opcode::Nop     => bytecode::Instruction::Nop,
            Opcode::SysCall => bytecode::Instruction::SysCall,
            _               => bytecode::Instruction::Ret,
          }
        }

        Opcode::Jump => {
          operands.expect_count(1, 1)?;
          match operands.get(0) {
            Operand::Label(name) => {
              let label = labels.get_id(name).ok_or_else(|| {
                AssemblyError::UndefinedLabel { line, name: name.clone() }
              })?;
              return Ok(ir::Instruction::JumpLabel { label, flag });
            }
            Operand::Register(_) => bytecode::Instruction::Jump { flag, target: Target::Reg(operands.register(0)?) },
            _ => return Err(operands.bad(0, "a label or a register"))
          }
        }

        Opcode::Call => {
          operands.expect_count(1, 1)?;
          match operands.get(0) {
            Operand::Symbol(name) => {
              let fun = self.functions.get_id(name).ok_or_else(|| {
                AssemblyError::UndefinedFunction { line, name: name.clone() }
              })?;
              return Ok(ir::Instruction::CallFun(fun));
            }
            Operand::Register(_) => bytecode::Instruction::Call(Target::Reg(operands.register(0)?)),
            _ => return Err(operands.bad(0, "a function name or a register"))
          }
        }

        Opcode::Push => {
          operands.expect_count(1, 1)?;
          bytecode::Instruction::Push(operands.register(0)?)
        }

        Opcode::Pop => {
          operands.expect_count(1, 1)?;
          bytecode::Instruction::Pop(operands.destination(0)?)
        }

        Opcode::Clear => {
          operands.expect_count(1, 1)?;
          bytecode::Instruction::Clear(operands.destination(0)?)
        }

        Opcode::Set => {
          operands.expect_count(2, 2)?;
          let dest = operands.destination(0)?;
          if let Operand::Symbol(name) = operands.get(1) {
            let data = self.data.get_id(name).ok_or_else(|| {
              AssemblyError::UndefinedData { line, name: name.clone() }
            })?;
            return Ok(ir::Instruction::SetData { dest, data });
          }
          bytecode::Instruction::Set { dest, source: operands.source(1)? }
        }

        Opcode::Test => {
          operands.expect_count(2, 2)?;
          bytecode::Instruction::Test { dest: operands.register(0)?, source: operands.source(1)? }
        }

        | Opcode::Inc
        | Opcode::Dec => {
          operands.expect_count(1, 2)?;
          let dest = operands.destination(0)?;
          let source =
            match operands.len() {
              2 => operands.source(1)?,
              _ => Source::Val(1),
            };
          match opcode {
            Opcode::Inc => bytecode::Instruction::Inc { dest, source },
            _           => bytecode::Instruction::Dec { dest, source },
          }
        }

        | Opcode::Add
        | Opcode::Sub => {
          operands.expect_count(3, 3)?;
          let dest  = operands.destination(0)?;
          let left  = operands.register(1)?;
          let right = operands.source(2)?;
          match opcode {
            Opcode::Add => bytecode::Instruction::Add { dest, left, right },
            _           => bytecode::Instruction::Sub { dest, left, right },
          }
        }

        Opcode::Load => {
          operands.expect_count(3, 3)?;
          bytecode::Instruction::Load {
            dest   : operands.destination(0)?,
            base   : operands.register(1)?,
            offset : operands.source(2)?,
          }
        }

        Opcode::Store => {
          operands.expect_count(3, 3)?;
          bytecode::Instruction::Store {
            base   : operands.register(0)?,
            source : operands.register(1)?,
            offset : operands.source(2)?,
          }
        }

      };

    Ok(ir::Instruction::Plain(plain))
  }
}

/// Translates a parsed source file into an IR program.
pub fn translate(text: &ast::Text) -> Result<ir::Program, AssemblyError> {
  Translator::new(text).program()
}
