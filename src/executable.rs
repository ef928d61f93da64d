/*!
  The executable format.

  An executable holds a program's text and data segments as raw bytes, plus the size of its
  zero-initialized global segment, which is recorded in the header but never stored. All
  integers are little-endian and each stored segment begins at an 8-byte-aligned file offset.

     0: [XX XX XX XX]                magic, `KVX\0`
     4: [XX XX XX XX]                version, always 0
     8: [XX XX XX XX XX XX XX XX]    text offset
    16: [XX XX XX XX]                text size
    20: [XX XX XX XX]                text flags
    24: [XX XX XX XX XX XX XX XX]    data offset
    32: [XX XX XX XX]                data size
    36: [XX XX XX XX]                data flags
    40: [XX XX XX XX XX XX XX XX]    global offset, unused
    48: [XX XX XX XX]                global size
    52: [XX XX XX XX]                global flags
    56: text, then data, each padded to 8-byte alignment

  The entry point is not stored. Assembled programs always begin executing at text offset 0.
*/

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::debug;

use crate::error::FormatError;

pub const MAGIC: [u8; 4] = *b"KVX\0";
pub const VERSION: u32 = 0;
/// Magic, version and three 16-byte segment records.
pub const HEADER_SIZE: u64 = 4 + 4 + 3 * 16;
pub const SEGMENT_ALIGNMENT: u64 = 8;

/// A resolved program, ready to be executed.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Program {
  pub text        : Vec<u8>,
  pub data        : Vec<u8>,
  /// Offset into `text` where execution begins.
  pub entry_point : u32,
  /// Bytes of zero-initialized global memory.
  pub global_size : u32,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct SegmentHeader {
  pub offset : u64,
  pub size   : u32,
  pub flags  : u32,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Header {
  pub version : u32,
  pub text    : SegmentHeader,
  pub data    : SegmentHeader,
  pub global  : SegmentHeader,
}

fn align_by_8(value: u64) -> u64 {
  (value + SEGMENT_ALIGNMENT - 1) & !(SEGMENT_ALIGNMENT - 1)
}

fn segment_size(segment: &'static str, bytes: &[u8]) -> Result<u32, FormatError> {
  u32::try_from(bytes.len()).map_err(|_| FormatError::SegmentTooLarge { segment, size: bytes.len() })
}

impl Header {
  /// The header `encode` writes for `program`.
  pub fn for_program(program: &Program) -> Result<Header, FormatError> {
    let text = SegmentHeader {
      offset : align_by_8(HEADER_SIZE),
      size   : segment_size("text", &program.text)?,
      flags  : 0,
    };
    let data = SegmentHeader {
      offset : align_by_8(text.offset + text.size as u64),
      size   : segment_size("data", &program.data)?,
      flags  : 0,
    };
    let global = SegmentHeader {
      offset : 0,
      size   : program.global_size,
      flags  : 0,
    };
    Ok(Header { version: VERSION, text, data, global })
  }

  /// Checks that the stored segments are aligned, clear of the header and of each other.
  fn validate(&self) -> Result<(), FormatError> {
    for (name, segment) in [("text", &self.text), ("data", &self.data)] {
      if segment.offset % SEGMENT_ALIGNMENT != 0 {
        return Err(FormatError::BadSegmentLayout(
          format!("{} offset 0x{:X} is not 8-byte aligned", name, segment.offset)
        ));
      }
      if segment.size > 0 && segment.offset < HEADER_SIZE {
        return Err(FormatError::BadSegmentLayout(
          format!("{} offset 0x{:X} overlaps the header", name, segment.offset)
        ));
      }
    }
    if self.text.size > 0 && self.data.size > 0 {
      let text_end = self.text.offset.checked_add(self.text.size as u64).ok_or_else(|| {
        FormatError::BadSegmentLayout(
          format!("text segment at 0x{:X} of {} bytes ends past the addressable range", self.text.offset, self.text.size)
        )
      })?;
      if text_end > self.data.offset {
        return Err(FormatError::BadSegmentLayout(
          format!(
            "text segment [0x{:X}, 0x{:X}) overlaps data at 0x{:X}",
            self.text.offset,
            text_end,
            self.data.offset
          )
        ));
      }
    }
    Ok(())
  }
}

// region Encoding

fn write_segment_header<W: Write>(out: &mut W, segment: &SegmentHeader) -> io::Result<()> {
  out.write_u64::<LittleEndian>(segment.offset)?;
  out.write_u32::<LittleEndian>(segment.size)?;
  out.write_u32::<LittleEndian>(segment.flags)
}

/// Writes zero padding until `position` reaches `offset`, then the segment bytes.
fn write_at<W: Write>(out: &mut W, position: &mut u64, offset: u64, bytes: &[u8]) -> io::Result<()> {
  if offset > *position {
    let padding = vec![0u8; (offset - *position) as usize];
    out.write_all(&padding)?;
    *position = offset;
  }
  out.write_all(bytes)?;
  *position += bytes.len() as u64;
  Ok(())
}

pub fn encode<W: Write>(program: &Program, mut out: W) -> Result<(), FormatError> {
  let header = Header::for_program(program)?;

  out.write_all(&MAGIC)?;
  out.write_u32::<LittleEndian>(header.version)?;
  write_segment_header(&mut out, &header.text)?;
  write_segment_header(&mut out, &header.data)?;
  write_segment_header(&mut out, &header.global)?;

  let mut position = HEADER_SIZE;
  write_at(&mut out, &mut position, header.text.offset, &program.text)?;
  write_at(&mut out, &mut position, header.data.offset, &program.data)?;
  out.flush()?;

  debug!(
    text = program.text.len(),
    data = program.data.len(),
    global = program.global_size,
    "encoded executable"
  );
  Ok(())
}

// endregion

// region Decoding

/// Maps an early end of file to `Truncated`, keeping every other I/O error as it is.
fn truncated(what: &'static str) -> impl Fn(io::Error) -> FormatError {
  move |error| match error.kind() {
    io::ErrorKind::UnexpectedEof => FormatError::Truncated(what),
    _ => FormatError::Io(error)
  }
}

fn read_segment_header<R: Read>(input: &mut R) -> io::Result<SegmentHeader> {
  Ok(SegmentHeader {
    offset : input.read_u64::<LittleEndian>()?,
    size   : input.read_u32::<LittleEndian>()?,
    flags  : input.read_u32::<LittleEndian>()?,
  })
}

pub fn read_header<R: Read>(input: &mut R) -> Result<Header, FormatError> {
  let mut raw = [0u8; HEADER_SIZE as usize];
  input.read_exact(&mut raw).map_err(truncated("header"))?;
  let mut raw = Cursor::new(&raw[..]);

  let mut magic = [0u8; 4];
  raw.read_exact(&mut magic)?;
  if magic != MAGIC {
    return Err(FormatError::BadMagic(magic));
  }

  let version = raw.read_u32::<LittleEndian>()?;
  if version != VERSION {
    return Err(FormatError::BadVersion(version));
  }

  let header = Header {
    version,
    text   : read_segment_header(&mut raw)?,
    data   : read_segment_header(&mut raw)?,
    global : read_segment_header(&mut raw)?,
  };
  header.validate()?;
  Ok(header)
}

/// Reads exactly `segment.size` bytes at `segment.offset`.
fn read_segment<R: Read + Seek>(
  input   : &mut R,
  segment : &SegmentHeader,
  what    : &'static str
) -> Result<Vec<u8>, FormatError> {
  if segment.size == 0 {
    return Ok(Vec::new());
  }
  input.seek(SeekFrom::Start(segment.offset))?;

  // A lying size field must not be able to force a huge allocation up front.
  let mut bytes = Vec::new();
  input.take(segment.size as u64).read_to_end(&mut bytes)?;
  match bytes.len() == segment.size as usize {
    true  => Ok(bytes),
    false => Err(FormatError::Truncated(what))
  }
}

pub fn decode<R: Read + Seek>(mut input: R) -> Result<Program, FormatError> {
  let header = read_header(&mut input)?;
  let text = read_segment(&mut input, &header.text, "text segment")?;
  let data = read_segment(&mut input, &header.data, "data segment")?;

  debug!(text = text.len(), data = data.len(), global = header.global.size, "decoded executable");
  Ok(Program {
    text,
    data,
    entry_point: 0,
    global_size: header.global.size,
  })
}

// endregion

impl Program {
  pub fn to_bytes(&self) -> Result<Vec<u8>, FormatError> {
    let mut bytes = Vec::new();
    encode(self, &mut bytes)?;
    Ok(bytes)
  }

  pub fn from_bytes(bytes: &[u8]) -> Result<Program, FormatError> {
    decode(Cursor::new(bytes))
  }
}

pub fn save<P: AsRef<Path>>(path: P, program: &Program) -> Result<(), FormatError> {
  let file = File::create(path)?;
  encode(program, BufWriter::new(file))
}

pub fn load<P: AsRef<Path>>(path: P) -> Result<Program, FormatError> {
  let file = File::open(path)?;
  decode(BufReader::new(file))
}
