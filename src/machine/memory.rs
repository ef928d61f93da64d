/*!
  The five memory segments of a run.

  Every access through a pointer goes through `locate`, which validates the segment tag and
  checks the offset and length against the segment's current size. Text and data are copies of
  the program's segments and are never written. Global is zero-filled at load. The stack grows
  and shrinks with `push`, `pop`, `call` and `ret`; the heap only grows, at the request of a
  syscall handler. Both are bounded by the machine's configuration.
*/

use std::ops::Range;

use byteorder::{ByteOrder, LittleEndian};

use crate::address::{Pointer, Segment};
use crate::config::MachineConfig;
use crate::executable::Program;

use super::error::{ErrorKind, RuntimeError};

/// Size of a stack slot and of every value moved by `load`, `store`, `push` and `pop`.
pub const WORD_SIZE: usize = 8;

#[derive(Clone, Debug, Default)]
pub struct Memory {
  pub text    : Vec<u8>,
  pub data    : Vec<u8>,
  pub global  : Vec<u8>,
  pub stack   : Vec<u8>,
  pub heap    : Vec<u8>,
  stack_limit : usize,
  heap_limit  : usize,
}

impl Memory {
  pub fn new(config: &MachineConfig) -> Memory {
    Memory {
      stack_limit : config.stack_limit,
      heap_limit  : config.heap_limit,
      ..Memory::default()
    }
  }

  /// Loads `program`, discarding everything left over from a previous run. Buffers are reused.
  pub fn reset(&mut self, program: &Program) {
    self.text.clear();
    self.text.extend_from_slice(&program.text);
    self.data.clear();
    self.data.extend_from_slice(&program.data);
    self.global.clear();
    self.global.resize(program.global_size as usize, 0);
    self.stack.clear();
    self.heap.clear();
  }

  pub fn segment(&self, segment: Segment) -> &[u8] {
    match segment {
      Segment::Text   => &self.text,
      Segment::Data   => &self.data,
      Segment::Global => &self.global,
      Segment::Stack  => &self.stack,
      Segment::Heap   => &self.heap,
    }
  }

  fn segment_mut(&mut self, segment: Segment) -> &mut [u8] {
    match segment {
      Segment::Text   => &mut self.text,
      Segment::Data   => &mut self.data,
      Segment::Global => &mut self.global,
      Segment::Stack  => &mut self.stack,
      Segment::Heap   => &mut self.heap,
    }
  }

  /// Validates `length` bytes at `pointer`, returning the segment and the byte range within it.
  pub fn locate(&self, pointer: Pointer, length: usize) -> Result<(Segment, Range<usize>), RuntimeError> {
    let segment = pointer.segment()
                         .ok_or(RuntimeError::new(ErrorKind::BadSegmentTag, pointer.raw()))?;
    let size = self.segment(segment).len() as u64;
    let start = pointer.offset();
    match start.checked_add(length as u64) {
      Some(end) if end <= size => Ok((segment, start as usize..end as usize)),
      _ => Err(RuntimeError::new(ErrorKind::SegmentOutOfBounds, pointer.raw()))
    }
  }

  pub fn resolve(&self, pointer: Pointer, length: usize) -> Result<&[u8], RuntimeError> {
    let (segment, range) = self.locate(pointer, length)?;
    Ok(&self.segment(segment)[range])
  }

  pub fn resolve_mut(&mut self, pointer: Pointer, length: usize) -> Result<&mut [u8], RuntimeError> {
    let (segment, range) = self.locate(pointer, length)?;
    if !segment.is_writable() {
      return Err(RuntimeError::new(ErrorKind::ReadOnlySegmentWrite, pointer.raw()));
    }
    Ok(&mut self.segment_mut(segment)[range])
  }

  pub fn load_word(&self, pointer: Pointer) -> Result<u64, RuntimeError> {
    Ok(LittleEndian::read_u64(self.resolve(pointer, WORD_SIZE)?))
  }

  pub fn store_word(&mut self, pointer: Pointer, value: u64) -> Result<(), RuntimeError> {
    LittleEndian::write_u64(self.resolve_mut(pointer, WORD_SIZE)?, value);
    Ok(())
  }

  // region Stack

  pub fn push_word(&mut self, value: u64) -> Result<(), RuntimeError> {
    let size = self.stack.len() + WORD_SIZE;
    if size > self.stack_limit {
      return Err(RuntimeError::new(ErrorKind::StackOverflow, size as u64));
    }
    self.stack.extend_from_slice(&value.to_le_bytes());
    Ok(())
  }

  /// Removes the top word, which must lie at or above `floor`.
  pub fn pop_word(&mut self, floor: usize) -> Result<u64, RuntimeError> {
    let top = self.stack.len();
    if top < floor + WORD_SIZE {
      return Err(RuntimeError::new(ErrorKind::StackUnderflow, top as u64));
    }
    let value = LittleEndian::read_u64(&self.stack[top - WORD_SIZE..top]);
    self.stack.truncate(top - WORD_SIZE);
    Ok(value)
  }

  /// Drops everything above `size` bytes. The dropped bytes are no longer addressable.
  pub fn truncate_stack(&mut self, size: usize) {
    self.stack.truncate(size);
  }

  // endregion

  /// Grows the heap by `additional` zero bytes and returns a pointer to the first of them.
  pub fn grow_heap(&mut self, additional: usize) -> Result<Pointer, RuntimeError> {
    let start = self.heap.len();
    let size = start.checked_add(additional).unwrap_or(usize::MAX);
    if size > self.heap_limit {
      return Err(RuntimeError::new(ErrorKind::HeapLimitExceeded, size as u64));
    }
    self.heap.resize(size, 0);
    Ok(Pointer::new(Segment::Heap, start as u64))
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  fn memory() -> Memory {
    let config = MachineConfig { stack_limit: 32, heap_limit: 64, ..MachineConfig::default() };
    let mut memory = Memory::new(&config);
    let program = Program { text: vec![1, 0], data: b"0123456789".to_vec(), entry_point: 0, global_size: 16 };
    memory.reset(&program);
    memory
  }

  #[test]
  fn bounds_are_checked() {
    let memory = memory();
    assert_eq!(memory.resolve(Pointer::new(Segment::Data, 2), 3), Ok(&b"234"[..]));
    assert_eq!(memory.resolve(Pointer::new(Segment::Data, 2), 8).map(|b| b.len()), Ok(8));
    let past = Pointer::new(Segment::Data, 3);
    assert_eq!(memory.resolve(past, 8), Err(RuntimeError::new(ErrorKind::SegmentOutOfBounds, past.raw())));
    let empty = Pointer::new(Segment::Heap, 0);
    assert_eq!(memory.resolve(empty, 1), Err(RuntimeError::new(ErrorKind::SegmentOutOfBounds, empty.raw())));
    let untagged = Pointer(0x0700_0000_0000_0000);
    assert_eq!(memory.resolve(untagged, 1), Err(RuntimeError::new(ErrorKind::BadSegmentTag, untagged.raw())));
  }

  #[test]
  fn read_only_segments() {
    let mut memory = memory();
    let text = Pointer::new(Segment::Text, 0);
    assert_eq!(memory.resolve_mut(text, 1), Err(RuntimeError::new(ErrorKind::ReadOnlySegmentWrite, text.raw())));
    let data = Pointer::new(Segment::Data, 0);
    assert_eq!(memory.store_word(data, 1), Err(RuntimeError::new(ErrorKind::ReadOnlySegmentWrite, data.raw())));

    let global = Pointer::new(Segment::Global, 8);
    memory.store_word(global, 0x0102030405060708).unwrap();
    assert_eq!(memory.load_word(global), Ok(0x0102030405060708));
    assert_eq!(memory.global[8], 0x08);
  }

  #[test]
  fn stack_limits() {
    let mut memory = memory();
    for value in 0..4 {
      memory.push_word(value).unwrap();
    }
    assert_eq!(memory.push_word(4), Err(RuntimeError::new(ErrorKind::StackOverflow, 40)));
    assert_eq!(memory.pop_word(16), Ok(3));
    assert_eq!(memory.pop_word(16), Ok(2));
    assert_eq!(memory.pop_word(16), Err(RuntimeError::new(ErrorKind::StackUnderflow, 16)));
    assert_eq!(memory.stack.len(), 16);
  }

  #[test]
  fn heap_growth() {
    let mut memory = memory();
    assert_eq!(memory.grow_heap(40), Ok(Pointer::new(Segment::Heap, 0)));
    assert_eq!(memory.grow_heap(24), Ok(Pointer::new(Segment::Heap, 40)));
    assert_eq!(memory.grow_heap(1), Err(RuntimeError::new(ErrorKind::HeapLimitExceeded, 65)));
    assert!(memory.heap.iter().all(|byte| *byte == 0));
  }

  #[test]
  fn reset_clears_previous_run() {
    let mut memory = memory();
    memory.push_word(9).unwrap();
    memory.grow_heap(8).unwrap();
    memory.global[0] = 0xFF;
    memory.reset(&Program::default());
    assert!(memory.text.is_empty() && memory.stack.is_empty() && memory.heap.is_empty());
    assert!(memory.global.is_empty());
  }
}
