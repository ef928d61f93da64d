/*!
  A `nom` parser for assembly text.

  The grammar, whitespace and comments (`// ...`, `/* ... */`) allowed between any two tokens:

    text        := directive*
    directive   := "#entry" symbol ";"
                 | "#global" integer ";"
                 | "#data" symbol item ("," item)* ";"
                 | "#fun" symbol "{" atom* "}"
    item        := string | integer
    atom        := "@." word ":"
                 | word ("." word)? (operand ("," operand)*)? ";"
    operand     := "#:" name | "@." word | integer | symbol
    integer     := decimal | "0x" hex
    symbol      := word ("." word)*

  Directives are parsed one at a time by hand so that every atom knows its line; the tokens
  within a directive are parsed with combinators.
*/

use std::cell::Cell;

use nom::{
  branch::alt,
  bytes::complete::{escaped_transform, is_not, tag, tag_no_case, take_until},
  character::complete::{
    alpha1,
    alphanumeric1,
    char as one_char,
    digit1,
    hex_digit1,
    multispace1,
    not_line_ending
  },
  combinator::{map, map_res, opt, recognize, value},
  multi::{many0_count, separated_list0, separated_list1},
  sequence::{delimited, pair, preceded, terminated, tuple},
  IResult,
};

use crate::error::AssemblyError;

use super::ast::{Atom, Data, DataItem, Directive, Fun, Instruction, Operand, Text};

type ParseResult<'a, T> = IResult<&'a str, T>;

// region Tokens

fn line_comment(input: &str) -> ParseResult<()> {
  value((), pair(tag("//"), not_line_ending))(input)
}

fn block_comment(input: &str) -> ParseResult<()> {
  value((), tuple((tag("/*"), take_until("*/"), tag("*/"))))(input)
}

/// Skips whitespace and comments. Never fails.
fn ws(input: &str) -> ParseResult<()> {
  value((), many0_count(alt((value((), multispace1), line_comment, block_comment))))(input)
}

fn word(input: &str) -> ParseResult<&str> {
  recognize(
    pair(
      alt((alpha1, tag("_"))),
      many0_count(alt((alphanumeric1, tag("_"))))
    )
  )(input)
}

fn symbol(input: &str) -> ParseResult<&str> {
  recognize(separated_list1(one_char('.'), word))(input)
}

fn integer(input: &str) -> ParseResult<u64> {
  alt((
    map_res(preceded(tag_no_case("0x"), hex_digit1), |digits: &str| u64::from_str_radix(digits, 16)),
    map_res(digit1, |digits: &str| digits.parse::<u64>()),
  ))(input)
}

fn string_literal(input: &str) -> ParseResult<String> {
  let escape = alt((
    value("\n", one_char('n')),
    value("\t", one_char('t')),
    value("\\", one_char('\\')),
    value("\"", one_char('"')),
    value("\0", one_char('0')),
  ));
  delimited(
    one_char('"'),
    // `escaped_transform` rejects an empty string.
    map(opt(escaped_transform(is_not("\\\""), '\\', escape)), Option::unwrap_or_default),
    one_char('"')
  )(input)
}

fn label(input: &str) -> ParseResult<&str> {
  preceded(tag("@."), word)(input)
}

fn comma(input: &str) -> ParseResult<char> {
  delimited(ws, one_char(','), ws)(input)
}

fn semicolon(input: &str) -> ParseResult<char> {
  preceded(ws, one_char(';'))(input)
}

// endregion

// region Atoms

fn operand(input: &str) -> ParseResult<Operand> {
  alt((
    map(preceded(tag("#:"), alphanumeric1), |name: &str| Operand::Register(name.to_string())),
    map(label,   |name: &str| Operand::Label(name.to_string())),
    map(integer, Operand::Integer),
    map(symbol,  |name: &str| Operand::Symbol(name.to_string())),
  ))(input)
}

fn place(input: &str) -> ParseResult<&str> {
  terminated(label, preceded(ws, one_char(':')))(input)
}

/// Mnemonic, variant and operands of an instruction, up to and including its `;`.
fn instruction(input: &str) -> ParseResult<(&str, Option<&str>, Vec<Operand>)> {
  tuple((
    word,
    opt(preceded(one_char('.'), word)),
    terminated(preceded(ws, separated_list0(comma, operand)), semicolon)
  ))(input)
}

fn data_item(input: &str) -> ParseResult<DataItem> {
  alt((
    map(string_literal, |string| DataItem::Bytes(string.into_bytes())),
    map(integer, DataItem::Integer),
  ))(input)
}

// endregion

struct Parser<'a> {
  source : &'a str,
  /// The last position asked about in `line`, as (bytes consumed, line there).
  cursor : Cell<(usize, usize)>,
}

impl<'a> Parser<'a> {

  fn new(source: &'a str) -> Self {
    Parser { source, cursor: Cell::new((0, 1)) }
  }

  /**
    The 1-based line on which `rest`, a suffix of the source, starts. Positions are asked for in
    mostly increasing order, so only the newlines between the previous position and this one are
    counted.
  */
  fn line(&self, rest: &str) -> usize {
    let consumed = self.source.len() - rest.len();
    let (from, line) =
      match self.cursor.get() {
        (from, line) if from <= consumed => (from, line),
        _                                => (0, 1),
      };
    let line = line + self.source.as_bytes()[from..consumed].iter().filter(|&&byte| byte == b'\n').count();
    self.cursor.set((consumed, line));
    line
  }

  fn syntax(&self, rest: &'a str, expected: &str) -> AssemblyError {
    let message =
      match rest.split_whitespace().next() {
        Some(token) => format!("expected {}, found `{}`", expected, token.chars().take(24).collect::<String>()),
        None        => format!("expected {}, found end of input", expected),
      };
    AssemblyError::Syntax { line: self.line(rest), message }
  }

  /// Runs a combinator, turning its failure into a syntax error at the point of failure.
  fn run<T, P>(&self, input: &'a str, mut parser: P, expected: &str) -> Result<(&'a str, T), AssemblyError>
    where P: FnMut(&'a str) -> ParseResult<'a, T>
  {
    parser(input).map_err(|error| {
      match error {
        | nom::Err::Error(error)
        | nom::Err::Failure(error) => self.syntax(error.input, expected),
        nom::Err::Incomplete(_)    => self.syntax("", expected),
      }
    })
  }

  fn skip(&self, input: &'a str) -> &'a str {
    match ws(input) {
      Ok((rest, _)) => rest,
      Err(_)        => input
    }
  }

  fn text(&self) -> Result<Text, AssemblyError> {
    let mut text = Text::default();
    let mut input = self.skip(self.source);

    while !input.is_empty() {
      let line = self.line(input);
      let (rest, keyword) = self.run(input, preceded(one_char('#'), word), "a directive")?;

      input =
        match keyword {

          "entry" => {
            let (rest, name) = self.run(rest, terminated(preceded(ws, symbol), semicolon), "a function name and `;`")?;
            text.entries.push(Directive { line, value: name.to_string() });
            rest
          }

          "global" => {
            let (rest, size) = self.run(rest, terminated(preceded(ws, integer), semicolon), "a size and `;`")?;
            text.globals.push(Directive { line, value: size });
            rest
          }

          "data" => {
            let (rest, (name, items)) = self.run(
              rest,
              terminated(
                pair(preceded(ws, symbol), preceded(ws, separated_list1(comma, data_item))),
                semicolon
              ),
              "a data name followed by strings or integers"
            )?;
            text.data.push(Data { line, name: name.to_string(), items });
            rest
          }

          "fun" => {
            let (rest, fun) = self.fun(rest, line)?;
            text.functions.push(fun);
            rest
          }

          _ => return Err(self.syntax(input, "`#entry`, `#fun`, `#data` or `#global`"))

        };
      input = self.skip(input);
    }

    text.last_line = self.line(input);
    Ok(text)
  }

  fn fun(&self, input: &'a str, line: usize) -> Result<(&'a str, Fun), AssemblyError> {
    let (mut input, name) = self.run(
      input,
      delimited(ws, symbol, pair(ws, one_char('{'))),
      "a function name and `{`"
    )?;
    let mut atoms = Vec::new();

    loop {
      input = self.skip(input);
      if let Some(rest) = input.strip_prefix('}') {
        return Ok((rest, Fun { line, name: name.to_string(), atoms }));
      }

      let atom_line = self.line(input);
      let (rest, atom) = self.run(
        input,
        alt((
          map(place, |name: &str| Atom::Place { line: atom_line, name: name.to_string() }),
          map(instruction, |(mnemonic, variant, operands)| {
            Atom::Instruction(Instruction {
              line     : atom_line,
              mnemonic : mnemonic.to_string(),
              variant  : variant.map(str::to_string),
              operands,
            })
          }),
        )),
        "an instruction, a label or `}`"
      )?;
      atoms.push(atom);
      input = rest;
    }
  }

}

/// Parses a whole source file.
pub fn parse(source: &str) -> Result<Text, AssemblyError> {
  Parser::new(source).text()
}


#[cfg(test)]
mod tests {
  use super::*;

  fn instruction_atom(line: usize, mnemonic: &str, variant: Option<&str>, operands: Vec<Operand>) -> Atom {
    Atom::Instruction(Instruction {
      line,
      mnemonic : mnemonic.to_string(),
      variant  : variant.map(str::to_string),
      operands,
    })
  }

  #[test]
  fn tokens() {
    assert_eq!(integer("0x1F;"), Ok((";", 31)));
    assert_eq!(integer("0X10"), Ok(("", 16)));
    assert_eq!(integer("19, x"), Ok((", x", 19)));
    assert_eq!(symbol("std.print;"), Ok((";", "std.print")));
    assert_eq!(symbol("main."), Ok((".", "main")));
    assert_eq!(string_literal(r#""a\n\"b\"\0" rest"#), Ok((" rest", "a\n\"b\"\0".to_string())));
    assert_eq!(string_literal(r#""""#), Ok(("", String::new())));
    assert_eq!(ws("  // comment\n /* block\n */ halt"), Ok(("halt", ())));
  }

  #[test]
  fn operands() {
    assert_eq!(operand("#:sc"), Ok(("", Operand::Register("sc".to_string()))));
    assert_eq!(operand("#:r12,"), Ok((",", Operand::Register("r12".to_string()))));
    assert_eq!(operand("@.loop;"), Ok((";", Operand::Label("loop".to_string()))));
    assert_eq!(operand("0xff"), Ok(("", Operand::Integer(255))));
    assert_eq!(operand("hello.world"), Ok(("", Operand::Symbol("hello.world".to_string()))));
  }

  #[test]
  fn whole_file() {
    let source = "\
// A comment before anything.
#entry main;
#global 4096;
#data greeting \"hi\\n\", 0;

#fun main {
  set #:sc, 19;   /* inline */
@.again:
  jump.nz @.again;
  call std.print;
  halt;
}

#fun std.print {}
";
    let text = parse(source).unwrap();
    assert_eq!(text.entries, vec![Directive { line: 2, value: "main".to_string() }]);
    assert_eq!(text.globals, vec![Directive { line: 3, value: 4096 }]);
    assert_eq!(
      text.data,
      vec![Data {
        line  : 4,
        name  : "greeting".to_string(),
        items : vec![DataItem::Bytes(b"hi\n".to_vec()), DataItem::Integer(0)],
      }]
    );

    assert_eq!(text.functions.len(), 2);
    let main = &text.functions[0];
    assert_eq!(main.line, 6);
    assert_eq!(
      main.atoms,
      vec![
        instruction_atom(7, "set", None, vec![Operand::Register("sc".to_string()), Operand::Integer(19)]),
        Atom::Place { line: 8, name: "again".to_string() },
        instruction_atom(9, "jump", Some("nz"), vec![Operand::Label("again".to_string())]),
        instruction_atom(10, "call", None, vec![Operand::Symbol("std.print".to_string())]),
        instruction_atom(11, "halt", None, vec![]),
      ]
    );
    assert_eq!(text.functions[1].name, "std.print");
    assert!(text.functions[1].atoms.is_empty());
    assert_eq!(text.last_line, 15);
  }

  #[test]
  fn single_line_program() {
    let text = parse("#entry main; #fun main { jump @.label; @.label: nop; halt; }").unwrap();
    assert_eq!(text.functions[0].atoms.len(), 4);
  }

  #[test]
  fn syntax_errors_carry_lines() {
    let cases: &[(&str, usize)] = &[
      ("#fun main {\n  nop\n}", 3),
      ("#fun main {\n  set #:r1 2;\n}", 2),
      ("#entry main", 1),
      ("\n\n#proc main {}", 3),
      ("#fun main {\n  halt;\n", 3),
      ("#data bytes;", 1),
      ("halt;", 1),
    ];
    for (source, line) in cases {
      match parse(source) {
        Err(AssemblyError::Syntax { line: found, .. }) => assert_eq!(found, *line, "{:?}", source),
        other => panic!("expected a syntax error for {:?}, got {:?}", source, other),
      }
    }
  }

  #[test]
  fn lines_in_long_sources() {
    let mut source = String::from("#fun main {\n");
    for _ in 0..5000 {
      source.push_str("  nop;\n");
    }
    source.push_str("}\n#fun broken {\n  set #:r1 2;\n}\n");

    match parse(&source) {
      Err(AssemblyError::Syntax { line, .. }) => assert_eq!(line, 5004),
      other => panic!("expected a syntax error, got {:?}", other),
    }

    let valid = source.replace("set #:r1 2;", "set #:r1, 2;");
    let text = parse(&valid).unwrap();
    let atoms = &text.functions[0].atoms;
    assert_eq!(atoms.len(), 5000);
    assert!(matches!(&atoms[0], Atom::Instruction(instruction) if instruction.line == 2));
    assert!(matches!(&atoms[4999], Atom::Instruction(instruction) if instruction.line == 5001));
    assert_eq!(text.functions[1].line, 5003);
    assert_eq!(text.last_line, 5006);
  }

  #[test]
  fn line_lookups_out_of_order() {
    let source = "a\nb\nc\nd\n";
    let parser = Parser::new(source);
    assert_eq!(parser.line(&source[6..]), 4);
    assert_eq!(parser.line(&source[2..]), 2);
    assert_eq!(parser.line(&source[4..]), 3);
    assert_eq!(parser.line(source), 1);
    assert_eq!(parser.line(""), 5);
  }
}
