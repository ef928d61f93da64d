use std::fmt::{Display, Formatter};
use std::io::{self, Write};
use std::time::Duration;

use prettytable::Table;

use crate::bytecode::Opcode;

use super::error::RuntimeError;
use super::TABLE_DISPLAY_FORMAT;

/// Peak resource usage of a run.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Stats {
  /// Largest stack size in bytes.
  pub max_stack  : u64,
  /// Largest number of simultaneously active call frames.
  pub max_frames : u64,
}

/**
  How a run ended. Covers both normal and abnormal exits. `status` is the final value of the
  syscall register for a normal exit and zero otherwise.
*/
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Exit {
  pub error  : Option<RuntimeError>,
  /// Wall-clock execution time.
  pub time   : Duration,
  /// Instruction pointer when the machine stopped. For a `halt` or a fault it points at the
  /// instruction responsible.
  pub ip     : u64,
  pub status : u64,
  /// Number of completed instructions.
  pub clock  : u64,
  pub stats  : Stats,
  /// Opcode and layout bytes of the last instruction fetched, if any was.
  pub last   : Option<(u8, u8)>,
}

impl Exit {
  pub fn is_normal(&self) -> bool {
    self.error.is_none()
  }

  fn last_instruction(&self) -> String {
    match self.last {
      Some((opcode, layout)) => {
        let name = Opcode::try_from(opcode).map(|op| op.mnemonic()).unwrap_or("?");
        format!("{} [{:02X} {:02X}]", name, opcode, layout)
      }
      None => "none".to_string()
    }
  }

  /// Writes a summary table of the run.
  pub fn render<W: Write>(&self, out: &mut W) -> io::Result<()> {
    let mut table = Table::new();
    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"vm", ubl->"exit"]);
    table.add_row(row![r->"time", format!("{:?}", self.time)]);
    table.add_row(row![r->"clock", self.clock]);
    table.add_row(row![r->"ip", format!("0x{:08X}", self.ip)]);
    table.add_row(row![r->"max stack", self.stats.max_stack]);
    table.add_row(row![r->"max frames", self.stats.max_frames]);
    table.add_row(row![r->"last", self.last_instruction()]);
    match &self.error {
      None        => table.add_row(row![r->"status", self.status]),
      Some(error) => table.add_row(row![r->"error", error]),
    };
    table.print(out)?;
    writeln!(out, "{}", self)
  }
}

impl Display for Exit {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match &self.error {
      None => write!(f, "vm: normal exit (at 0x{:08X}) with status {}", self.ip, self.status),
      Some(error) => write!(f, "vm: abnormal exit (at 0x{:08X}) with runtime error: {}", self.ip, error),
    }
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::machine::error::ErrorKind;

  fn exit(error: Option<RuntimeError>) -> Exit {
    Exit {
      error,
      time   : Duration::from_millis(1),
      ip     : 0x10,
      status : 19,
      clock  : 4,
      stats  : Stats::default(),
      last   : Some((0x01, 0x00)),
    }
  }

  #[test]
  fn one_line_form() {
    assert_eq!(exit(None).to_string(), "vm: normal exit (at 0x00000010) with status 19");
    let abnormal = exit(Some(RuntimeError::new(ErrorKind::Trap, 0)));
    assert_eq!(
      abnormal.to_string(),
      "vm: abnormal exit (at 0x00000010) with runtime error: trap (code=2, aux=0x0)"
    );
  }

  #[test]
  fn rendered_table_names_the_last_instruction() {
    let mut out = Vec::new();
    exit(None).render(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("halt [01 00]"));
    assert!(text.ends_with("with status 19\n"));
  }
}
