//! Resource limits of a machine.

/// Default stack limit: 1 MiB.
pub const DEFAULT_STACK_LIMIT: usize = 1 << 20;
/// Default heap limit: 16 MiB.
pub const DEFAULT_HEAP_LIMIT: usize = 16 << 20;
/// Default limit on the depth of the call frame stack.
pub const DEFAULT_FRAME_LIMIT: usize = 1 << 16;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MachineConfig {
  /// Largest size in bytes the stack may reach.
  pub stack_limit : usize,
  /// Largest size in bytes the heap may reach.
  pub heap_limit  : usize,
  /// Largest number of active call frames.
  pub frame_limit : usize,
}

impl Default for MachineConfig {
  fn default() -> Self {
    MachineConfig {
      stack_limit : DEFAULT_STACK_LIMIT,
      heap_limit  : DEFAULT_HEAP_LIMIT,
      frame_limit : DEFAULT_FRAME_LIMIT,
    }
  }
}
