/*!
  The textual form of programs, called assembly. Source text is parsed into a syntax tree
  (`ast`), which `translate` turns into the IR consumed by the assembler.

```text
#entry main;
#data greeting "hello\n";

#fun main {
  set #:r0, greeting;
  set #:sc, 19;
}
```
*/

pub mod ast;
mod parser;
mod translate;

use crate::error::AssemblyError;
use crate::ir;

pub use parser::parse;
pub use translate::translate;

/// Parses and translates `source`.
pub fn compile(source: &str) -> Result<ir::Program, AssemblyError> {
  translate(&parse(source)?)
}
