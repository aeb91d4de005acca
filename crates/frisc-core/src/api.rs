//! Public host-facing machine API.
//!
//! [`Machine`] owns the register file and the bus, and drives the
//! fetch/decode/execute/interrupt cycle. Hosts load images, attach units,
//! step or run, and observe execution through a [`TraceSink`].

use core::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, trace, warn};

use crate::decoder::{decode, DecodedInstruction};
use crate::disasm::{self, DisassemblyRow};
use crate::execute::{execute, ExecuteOutcome};
use crate::interrupt::{poll_interrupts, InterruptAcceptance};
use crate::memory::{
    image_from_bit_strings, image_from_byte_string, Bus, Memory, MemoryWrite,
    DEFAULT_MEMORY_BYTES,
};
use crate::peripherals::{Device, IoUnit, UnitConfig};
use crate::state::{RegisterFile, RunState};
use crate::{BusError, ConfigError, Fault, LoadError};

/// Default CPU clock frequency used to advance virtual time per step.
pub const DEFAULT_CPU_FREQUENCY_HZ: u32 = 1_000_000;

/// Top-level machine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct MachineConfig {
    /// Flat memory size in bytes.
    pub memory_size: usize,
    /// CPU clock frequency; one instruction is one cycle.
    pub cpu_frequency_hz: u32,
    /// Advances the virtual clock by one CPU cycle after each instruction.
    pub advance_clock_per_step: bool,
    /// Step guard for [`Machine::run`]; `None` runs until halt, fault or pause.
    pub max_run_steps: Option<u64>,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            memory_size: DEFAULT_MEMORY_BYTES,
            cpu_frequency_hz: DEFAULT_CPU_FREQUENCY_HZ,
            advance_clock_per_step: true,
            max_run_steps: None,
        }
    }
}

impl MachineConfig {
    /// Checks the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidMemorySize`] for a zero, unaligned or
    /// larger than 4 GiB memory, and [`ConfigError::InvalidCpuFrequency`] for
    /// a zero CPU frequency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let addressable = u64::try_from(self.memory_size).is_ok_and(|size| size <= 1 << 32);
        if self.memory_size == 0 || self.memory_size & 3 != 0 || !addressable {
            return Err(ConfigError::InvalidMemorySize {
                size: self.memory_size,
            });
        }
        if self.cpu_frequency_hz == 0 {
            return Err(ConfigError::InvalidCpuFrequency);
        }
        Ok(())
    }
}

/// Output status from one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepOutcome {
    /// Instruction retired; the machine is ready for the next one.
    Continue,
    /// A taken `HALT` retired.
    Halted,
    /// The step faulted, or a fault was already latched.
    Faulted(Fault),
}

/// Reason a run loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunStop {
    /// A taken `HALT` retired.
    Halted,
    /// A fault was raised or already latched.
    Faulted(Fault),
    /// The run flag was cleared.
    Paused,
    /// The step limit was reached.
    StepLimit,
}

/// Aggregated outcome of a run loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunOutcome {
    /// Instructions retired during this call.
    pub steps: u64,
    /// Why the loop stopped.
    pub stop: RunStop,
}

/// Execution events delivered to a [`TraceSink`] in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraceEvent {
    /// An instruction decoded and is about to execute.
    BeforeExecute {
        /// Fetch address.
        pc: u32,
        /// Raw instruction word.
        word: u32,
        /// Decoded form.
        instruction: DecodedInstruction,
    },
    /// A bus write performed by the CPU, a DMA transfer or the host.
    MemoryWrite(MemoryWrite),
    /// An interrupt sequence entered its handler.
    InterruptAccepted {
        /// Sequence kind.
        kind: InterruptAcceptance,
        /// Handler address loaded into `PC`.
        handler: u32,
    },
    /// A cycle finished, including interrupt acceptance.
    CycleComplete {
        /// Address of the next instruction.
        pc: u32,
        /// Instructions retired since reset.
        instructions: u64,
    },
    /// A taken `HALT` stopped the machine.
    Halted {
        /// Address of the instruction after the `HALT`.
        pc: u32,
    },
    /// A fault stopped the machine.
    Faulted {
        /// Address of the faulting instruction.
        pc: u32,
        /// The fault.
        fault: Fault,
    },
}

/// Sink for execution events.
pub trait TraceSink {
    /// Records an event.
    fn on_event(&mut self, event: TraceEvent);
}

impl<F: FnMut(TraceEvent)> TraceSink for F {
    fn on_event(&mut self, event: TraceEvent) {
        self(event);
    }
}

/// Shared "continue running" flag checked by the run loop between
/// instructions.
///
/// Clones share the flag, so a trace sink or another thread can pause a run.
#[derive(Debug, Clone, Default)]
pub struct RunFlag(Arc<AtomicBool>);

impl RunFlag {
    /// Returns whether a run loop is active and not paused.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Asks the run loop to stop after the current instruction.
    pub fn pause(&self) {
        self.0.store(false, Ordering::Release);
    }

    fn start(&self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Execution counters since the last reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct MachineStats {
    /// Retired instructions.
    pub instructions: u64,
    /// Accepted maskable interrupts.
    pub maskable_interrupts: u64,
    /// Accepted non-maskable interrupts.
    pub non_maskable_interrupts: u64,
}

/// A complete machine: CPU registers, memory, I/O units and virtual clock.
pub struct Machine {
    config: MachineConfig,
    regs: RegisterFile,
    bus: Bus,
    run_state: RunState,
    stats: MachineStats,
    run_flag: RunFlag,
    trace: Option<Box<dyn TraceSink>>,
}

impl fmt::Debug for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Machine")
            .field("config", &self.config)
            .field("regs", &self.regs)
            .field("bus", &self.bus)
            .field("run_state", &self.run_state)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::with_valid_config(MachineConfig::default())
    }
}

impl Machine {
    /// Creates a machine with zeroed memory and no units.
    ///
    /// # Errors
    ///
    /// See [`MachineConfig::validate`].
    pub fn new(config: MachineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::with_valid_config(config))
    }

    fn with_valid_config(config: MachineConfig) -> Self {
        Self {
            bus: Bus::new(Memory::new(config.memory_size)),
            config,
            regs: RegisterFile::default(),
            run_state: RunState::Ready,
            stats: MachineStats::default(),
            run_flag: RunFlag::default(),
            trace: None,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &MachineConfig {
        &self.config
    }

    /// Restores registers, unit state, the virtual clock and counters to
    /// power-on values and clears any latched fault. Memory is preserved.
    pub fn reset(&mut self) {
        self.regs.reset();
        self.bus.reset_units();
        self.run_state = RunState::Ready;
        self.stats = MachineStats::default();
        self.run_flag.pause();
        debug!("machine reset");
    }

    /// Zeroes memory and copies `image` to address 0.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::ImageTooLarge`] when the image does not fit;
    /// memory is then unchanged.
    pub fn load_bytes(&mut self, image: &[u8]) -> Result<(), LoadError> {
        self.bus.memory_mut().load(image)?;
        debug!("loaded {} byte image", image.len());
        Ok(())
    }

    /// Loads a string holding one byte per character.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::NonByteCharacter`] or
    /// [`LoadError::ImageTooLarge`].
    pub fn load_byte_string(&mut self, text: &str) -> Result<(), LoadError> {
        self.load_bytes(&image_from_byte_string(text)?)
    }

    /// Loads one binary literal per byte (`"10110000"`).
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::InvalidBitString`] or
    /// [`LoadError::ImageTooLarge`].
    pub fn load_bit_strings<S: AsRef<str>>(&mut self, entries: &[S]) -> Result<(), LoadError> {
        self.load_bytes(&image_from_bit_strings(entries)?)
    }

    /// Executes one fetch/decode/execute/interrupt cycle.
    ///
    /// A halted machine resumes at the instruction after the `HALT`. A
    /// faulted machine stays faulted until [`Machine::reset`].
    pub fn step(&mut self) -> StepOutcome {
        if let RunState::Faulted(fault) = self.run_state {
            return StepOutcome::Faulted(fault);
        }
        self.run_state = RunState::Ready;

        let pc = self.regs.pc();
        let word = match self.bus.read_word(pc) {
            Ok(word) => word,
            Err(err) => return self.fault(pc, err.into()),
        };
        let instruction = match decode(word) {
            Ok(instruction) => instruction,
            Err(err) => return self.fault(pc, err.into()),
        };
        trace!("{pc:#010x}: {word:#010x} {instruction:?}");
        self.emit(TraceEvent::BeforeExecute {
            pc,
            word,
            instruction,
        });

        let outcome = match execute(instruction, &mut self.regs, &mut self.bus) {
            Ok(outcome) => outcome,
            Err(err) => return self.fault(pc, err.into()),
        };
        self.stats.instructions += 1;

        if self.config.advance_clock_per_step {
            self.bus.advance_cycles(1, self.config.cpu_frequency_hz);
        }

        match poll_interrupts(&mut self.regs, &mut self.bus) {
            Ok(InterruptAcceptance::None) => {}
            Ok(kind) => {
                match kind {
                    InterruptAcceptance::Maskable => self.stats.maskable_interrupts += 1,
                    InterruptAcceptance::NonMaskable => self.stats.non_maskable_interrupts += 1,
                    InterruptAcceptance::None => {}
                }
                self.flush_writes();
                self.emit(TraceEvent::InterruptAccepted {
                    kind,
                    handler: self.regs.pc(),
                });
            }
            Err(err) => return self.fault(pc, err.into()),
        }

        self.flush_writes();
        self.emit(TraceEvent::CycleComplete {
            pc: self.regs.pc(),
            instructions: self.stats.instructions,
        });

        if outcome == ExecuteOutcome::Halt {
            self.run_state = RunState::Halted;
            debug!("halted at {pc:#010x}");
            self.emit(TraceEvent::Halted { pc: self.regs.pc() });
            return StepOutcome::Halted;
        }
        StepOutcome::Continue
    }

    /// Runs until `HALT`, a fault, a pause, or [`MachineConfig::max_run_steps`].
    pub fn run(&mut self) -> RunOutcome {
        self.run_loop(self.config.max_run_steps)
    }

    /// Runs at most `max_steps` instructions.
    pub fn run_for(&mut self, max_steps: u64) -> RunOutcome {
        self.run_loop(Some(max_steps))
    }

    fn run_loop(&mut self, limit: Option<u64>) -> RunOutcome {
        if let RunState::Faulted(fault) = self.run_state {
            return RunOutcome {
                steps: 0,
                stop: RunStop::Faulted(fault),
            };
        }

        self.run_flag.start();
        let mut steps = 0;
        let stop = loop {
            if !self.run_flag.is_running() {
                break RunStop::Paused;
            }
            if limit.is_some_and(|limit| steps >= limit) {
                break RunStop::StepLimit;
            }
            match self.step() {
                StepOutcome::Continue => steps += 1,
                StepOutcome::Halted => {
                    steps += 1;
                    break RunStop::Halted;
                }
                StepOutcome::Faulted(fault) => break RunStop::Faulted(fault),
            }
        };
        self.run_flag.pause();
        RunOutcome { steps, stop }
    }

    /// Stops a running loop after the current instruction.
    pub fn pause(&self) {
        self.run_flag.pause();
    }

    /// Returns a handle to the run flag.
    #[must_use]
    pub fn run_flag(&self) -> RunFlag {
        self.run_flag.clone()
    }

    fn fault(&mut self, pc: u32, fault: Fault) -> StepOutcome {
        // Writes that completed before the fault are still reported.
        self.flush_writes();
        warn!("fault at {pc:#010x}: {fault}");
        self.run_state = RunState::Faulted(fault);
        self.emit(TraceEvent::Faulted { pc, fault });
        StepOutcome::Faulted(fault)
    }

    fn emit(&mut self, event: TraceEvent) {
        if let Some(sink) = self.trace.as_mut() {
            sink.on_event(event);
        }
    }

    fn flush_writes(&mut self) {
        if self.trace.is_none() {
            return;
        }
        for write in self.bus.take_writes() {
            self.emit(TraceEvent::MemoryWrite(write));
        }
    }

    /// Installs a trace sink and turns on write observation.
    pub fn set_trace_sink(&mut self, sink: impl TraceSink + 'static) {
        self.trace = Some(Box::new(sink));
        self.bus.observe_writes(true);
    }

    /// Removes the trace sink.
    pub fn take_trace_sink(&mut self) -> Option<Box<dyn TraceSink>> {
        self.bus.observe_writes(false);
        self.trace.take()
    }

    /// Reads a byte through the bus.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Unmapped`] for unmapped addresses.
    pub fn read_byte(&self, addr: u32) -> Result<u8, BusError> {
        self.bus.read_byte(addr)
    }

    /// Reads a little-endian half-word through the bus.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Unmapped`] for unmapped addresses.
    pub fn read_half(&self, addr: u32) -> Result<u16, BusError> {
        self.bus.read_half(addr)
    }

    /// Reads a little-endian word through the bus.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Unmapped`] for unmapped addresses.
    pub fn read_word(&self, addr: u32) -> Result<u32, BusError> {
        self.bus.read_word(addr)
    }

    /// Writes a byte through the bus.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Unmapped`] for unmapped addresses.
    pub fn write_byte(&mut self, addr: u32, value: u8) -> Result<(), BusError> {
        self.bus.write_byte(addr, value)?;
        self.flush_writes();
        Ok(())
    }

    /// Writes a little-endian half-word through the bus.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Unmapped`] for unmapped addresses.
    pub fn write_half(&mut self, addr: u32, value: u16) -> Result<(), BusError> {
        self.bus.write_half(addr, value)?;
        self.flush_writes();
        Ok(())
    }

    /// Writes a little-endian word through the bus.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Unmapped`] for unmapped addresses.
    pub fn write_word(&mut self, addr: u32, value: u32) -> Result<(), BusError> {
        self.bus.write_word(addr, value)?;
        self.flush_writes();
        Ok(())
    }

    /// Builds and attaches a unit.
    ///
    /// # Errors
    ///
    /// Returns the [`ConfigError`] from unit validation or registration; the
    /// registry is unchanged on error.
    pub fn attach(&mut self, config: UnitConfig, device: Device) -> Result<(), ConfigError> {
        self.bus.attach(IoUnit::new(config, device)?)
    }

    /// Detaches unit `id` and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownUnit`] when no such unit is attached.
    pub fn detach(&mut self, id: &str) -> Result<IoUnit, ConfigError> {
        self.bus.detach(id)
    }

    /// Returns unit `id`.
    #[must_use]
    pub fn unit(&self, id: &str) -> Option<&IoUnit> {
        self.bus.unit(id)
    }

    /// Returns unit `id` mutably.
    pub fn unit_mut(&mut self, id: &str) -> Option<&mut IoUnit> {
        self.bus.unit_mut(id)
    }

    /// Returns attached unit ids in attach order.
    #[must_use]
    pub fn unit_ids(&self) -> Vec<&str> {
        self.bus.unit_ids()
    }

    /// Forces the interrupt signal of unit `id` high.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownUnit`] when no such unit is attached.
    pub fn raise_interrupt(&mut self, id: &str) -> Result<(), ConfigError> {
        self.bus.set_interrupt_signal(id, true)
    }

    /// Forces the interrupt signal of unit `id` low.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownUnit`] when no such unit is attached.
    pub fn clear_interrupt(&mut self, id: &str) -> Result<(), ConfigError> {
        self.bus.set_interrupt_signal(id, false)
    }

    /// Sets one byte of a generic unit window.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownUnit`], [`ConfigError::NotInjectable`]
    /// for non-generic units, or [`ConfigError::OffsetOutOfRange`].
    pub fn set_unit_byte(&mut self, id: &str, offset: u32, value: u8) -> Result<(), ConfigError> {
        let generic = self
            .known_unit_mut(id)?
            .device_mut()
            .as_generic_mut()
            .ok_or_else(|| ConfigError::NotInjectable { id: id.to_owned() })?;
        generic
            .set_byte(offset, value)
            .ok_or_else(|| ConfigError::OffsetOutOfRange {
                id: id.to_owned(),
                offset,
            })
    }

    /// Queues input bytes on a parallel I/O unit.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownUnit`] or [`ConfigError::NotInjectable`]
    /// for units that are not parallel ports.
    pub fn feed_parallel_input(&mut self, id: &str, bytes: &[u8]) -> Result<(), ConfigError> {
        self.known_unit_mut(id)?
            .device_mut()
            .as_parallel_mut()
            .ok_or_else(|| ConfigError::NotInjectable { id: id.to_owned() })?
            .feed_input(bytes);
        Ok(())
    }

    fn known_unit_mut(&mut self, id: &str) -> Result<&mut IoUnit, ConfigError> {
        self.bus
            .unit_mut(id)
            .ok_or_else(|| ConfigError::UnknownUnit { id: id.to_owned() })
    }

    /// Advances virtual time, delivering due device ticks.
    pub fn advance_clock(&mut self, nanos: u64) {
        self.bus.advance_time(nanos);
        self.flush_writes();
    }

    /// Delivers `ticks` ticks to unit `id` directly.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownUnit`] when no such unit is attached.
    pub fn tick_unit(&mut self, id: &str, ticks: u64) -> Result<(), ConfigError> {
        self.bus.tick_unit(id, ticks)?;
        self.flush_writes();
        Ok(())
    }

    /// Returns the current virtual time in nanoseconds.
    #[must_use]
    pub const fn now_ns(&self) -> u64 {
        self.bus.clock().now_ns()
    }

    /// Returns the register file.
    #[must_use]
    pub const fn registers(&self) -> &RegisterFile {
        &self.regs
    }

    /// Returns the register file mutably.
    #[allow(clippy::missing_const_for_fn)]
    pub fn registers_mut(&mut self) -> &mut RegisterFile {
        &mut self.regs
    }

    /// Returns the bus.
    #[must_use]
    pub const fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Returns the current run state.
    #[must_use]
    pub const fn run_state(&self) -> RunState {
        self.run_state
    }

    /// Returns execution counters.
    #[must_use]
    pub const fn stats(&self) -> MachineStats {
        self.stats
    }

    /// Disassembles the words around `center_pc`.
    #[must_use]
    pub fn disassemble_window(
        &self,
        center_pc: u32,
        before: u32,
        after: u32,
    ) -> Vec<DisassemblyRow> {
        disasm::disassemble_window(&self.bus, center_pc, before, after)
    }
}
