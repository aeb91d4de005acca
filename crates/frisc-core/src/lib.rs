//! Core virtual machine for the FRISC 32-bit educational RISC architecture.
//!
//! The crate models the CPU register file, a flat little-endian memory, a
//! memory-mapped I/O bus with timer, parallel I/O, DMA and generic units, and
//! a priority interrupt controller. Device time is virtual and advanced by
//! the host or the run loop, so runs are reproducible.

/// Deterministic virtual time and per-device tick schedules.
pub mod clock;
pub use clock::{DeviceClock, VirtualClock, MAX_DEVICE_FREQUENCY_HZ, NANOS_PER_SECOND};

/// Flat memory, access widths and the memory-mapped bus.
pub mod memory;
pub use memory::{
    image_from_bit_strings, image_from_byte_string, AccessWidth, Bus, Memory, MemoryWrite,
    DEFAULT_MEMORY_BYTES,
};

/// Public host-facing machine API.
pub mod api;
pub use api::{
    Machine, MachineConfig, MachineStats, RunFlag, RunOutcome, RunStop, StepOutcome, TraceEvent,
    TraceSink, DEFAULT_CPU_FREQUENCY_HZ,
};

/// Architectural CPU state model primitives.
pub mod state;
pub use state::{GeneralRegister, RegisterFile, RunState, GENERAL_REGISTER_COUNT};

/// Opcode and condition-code tables.
pub mod encoding;
pub use encoding::{Condition, Opcode, OPCODE_TABLE};

/// Instruction decoder and canonical encoder.
pub mod decoder;
pub use decoder::{
    decode, AluOp, DecodedInstruction, MemoryOperand, MoveSource, MoveTarget, Operand,
    ReturnKind,
};

/// Error and fault taxonomy.
pub mod fault;
pub use fault::{BusError, ConfigError, DecodeError, Fault, FaultClass, LoadError};

/// Instruction execution engine.
pub mod execute;
pub use execute::{execute, ExecuteOutcome, Flags, FlagsUpdate};

/// End-of-cycle interrupt acceptance.
pub mod interrupt;
pub use interrupt::{
    poll_interrupts, InterruptAcceptance, MASKABLE_VECTOR, NON_MASKABLE_VECTOR,
};

/// Memory-mapped I/O units.
pub mod peripherals;
pub use peripherals::{
    Device, DeviceAction, DmaController, GenericUnit, InterruptLevel, IntervalTimer, IoUnit,
    ParallelIo, Peripheral, PortDirection, TransferLimit, UnitConfig,
};

/// Instruction disassembly.
pub mod disasm;
pub use disasm::{disassemble, disassemble_window, DisassemblyRow};

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;
