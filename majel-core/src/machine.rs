//! Majel-1 machine harness - a Z80 whose I/O space is the backplane.

use std::num::NonZeroU16;

use z80emu::host::TsCounter;
use z80emu::{Clock, Cpu, Io, Memory, Z80NMOS};

use crate::bus::{Backplane, Chassis};
use crate::error::{MajelError, MajelResult};
use crate::ioseek::IoTable;
use crate::memory::{MemoryPlan, Region};
use crate::mfs::MfsState;
use crate::{ExitInfo, ExitReason};

/// Type alias for the clock.
type TsClock = TsCounter<i32>;

/// Machine bus - memory + backplane.
struct Bus<'a> {
    memory: &'a mut [u8; 65536],
    chassis: &'a mut Chassis,
    trace: bool,
}

impl Memory for Bus<'_> {
    type Timestamp = i32;

    fn read_debug(&self, addr: u16) -> u8 {
        self.memory[addr as usize]
    }

    fn read_mem(&self, addr: u16, _ts: Self::Timestamp) -> u8 {
        self.memory[addr as usize]
    }

    fn write_mem(&mut self, addr: u16, value: u8, _ts: Self::Timestamp) {
        self.memory[addr as usize] = value;
    }
}

impl Io for Bus<'_> {
    type Timestamp = i32;
    type WrIoBreak = ();
    type RetiBreak = ();

    fn read_io(&mut self, port: u16, _ts: Self::Timestamp) -> (u8, Option<NonZeroU16>) {
        // Only the low address byte reaches the backplane.
        let value = self.chassis.input(port as u8);
        if self.trace {
            eprintln!("[Z80] IN  ({:#04X}) -> {:#04X}", port as u8, value);
        }
        (value, None)
    }

    fn write_io(
        &mut self,
        port: u16,
        value: u8,
        _ts: Self::Timestamp,
    ) -> (Option<Self::WrIoBreak>, Option<NonZeroU16>) {
        if self.trace {
            eprintln!("[Z80] OUT ({:#04X}) <- {:#04X}", port as u8, value);
        }
        self.chassis.output(port as u8, value);
        (None, None)
    }
}

/// Z80 with 64KB RAM and a chassis on its I/O ports.
pub struct Machine {
    cpu: Z80NMOS,
    clock: TsClock,
    memory: [u8; 65536],
    chassis: Chassis,
    /// Enable port tracing.
    pub trace: bool,
}

impl Machine {
    pub fn new(chassis: Chassis) -> Self {
        Self {
            cpu: Z80NMOS::default(),
            clock: TsClock::default(),
            memory: [0; 65536],
            chassis,
            trace: false,
        }
    }

    pub fn chassis(&self) -> &Chassis {
        &self.chassis
    }

    pub fn chassis_mut(&mut self) -> &mut Chassis {
        &mut self.chassis
    }

    pub fn cpu(&self) -> &Z80NMOS {
        &self.cpu
    }

    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    /// Load binary data into memory at a specific address.
    pub fn load_at(&mut self, address: u16, data: &[u8]) {
        let start = address as usize;
        let end = (start + data.len()).min(self.memory.len());
        self.memory[start..end].copy_from_slice(&data[..end - start]);
    }

    /// Copy a record image into its RAM window. The window must also lie
    /// inside the 64 KiB address space.
    pub fn mirror(&mut self, region: Region, bytes: &[u8]) -> MajelResult<()> {
        let window_error = || MajelError::Window {
            name: "mirror",
            size: bytes.len(),
            top: region.end,
        };
        if bytes.len() > region.len() {
            return Err(window_error());
        }
        let start = region.start as usize;
        let target = self
            .memory
            .get_mut(start..start + bytes.len())
            .ok_or_else(window_error)?;
        target.copy_from_slice(bytes);
        Ok(())
    }

    /// Mirror the driver records into the windows of `plan`.
    pub fn install(
        &mut self,
        plan: &MemoryPlan,
        state: &MfsState,
        table: &IoTable,
    ) -> MajelResult<()> {
        self.mirror(plan.mfs, &state.to_bytes())?;
        self.mirror(plan.iotbl, &table.to_bytes())
    }

    /// Run from `start_address` until HALT or until `limit` T-states pass.
    pub fn run_from(&mut self, start_address: u16, limit: u64) -> MajelResult<ExitInfo> {
        self.cpu.reset();
        self.cpu.set_pc(start_address);
        self.cpu.set_sp(0x0000);
        self.clock = TsClock::default();

        loop {
            let t_states = self.clock.as_timestamp() as u64;
            if t_states >= limit {
                if self.trace {
                    eprintln!("[Z80] T-state limit reached at PC {:#06X}", self.cpu.get_pc());
                }
                return Ok(ExitInfo {
                    reason: ExitReason::Limit,
                    t_states,
                    pc: self.cpu.get_pc(),
                });
            }

            let mut bus = Bus {
                memory: &mut self.memory,
                chassis: &mut self.chassis,
                trace: self.trace,
            };
            let _result =
                self.cpu
                    .execute_next(&mut bus, &mut self.clock, None::<fn(z80emu::CpuDebug)>);

            if self.cpu.is_halt() {
                return Ok(ExitInfo {
                    reason: ExitReason::Halt,
                    t_states: self.clock.as_timestamp() as u64,
                    pc: self.cpu.get_pc(),
                });
            }
        }
    }
}
