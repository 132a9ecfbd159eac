//! NES Console Implementation.
//!
//! The Console struct provides the high-level emulation API, managing the
//! CPU, PPU, APU, and mapper integration with proper timing.

use crate::bus::{ControllerState, NesBus};
use nes_cpu::Cpu;
use nes_mappers::{Mapper, Rom, RomError, create_mapper};

#[cfg(not(feature = "std"))]
use alloc::{boxed::Box, vec::Vec};

/// NES emulation timing constants.
pub mod timing {
    /// Master clock frequency (NTSC).
    pub const MASTER_CLOCK_NTSC: u32 = 21_477_272;
    /// CPU clock frequency (NTSC).
    pub const CPU_CLOCK_NTSC: u32 = MASTER_CLOCK_NTSC / 12;
    /// PPU clock frequency (NTSC).
    pub const PPU_CLOCK_NTSC: u32 = MASTER_CLOCK_NTSC / 4;
    /// CPU cycles per frame (NTSC).
    pub const CPU_CYCLES_PER_FRAME: u32 = 29_780;
    /// PPU dots per scanline.
    pub const PPU_DOTS_PER_SCANLINE: u16 = 341;
    /// Total scanlines (including vblank).
    pub const PPU_SCANLINES: u16 = 262;
    /// Target frame rate (NTSC).
    pub const FRAME_RATE_NTSC: f64 = 60.0988;
    /// CPU cycles from power/reset until PPUCTRL/PPUMASK writes take effect.
    pub const PPU_WARMUP_CYCLES: u64 = 29_658;
}

/// Console error type.
#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    /// ROM loading error.
    #[error("ROM error: {0}")]
    Rom(#[from] RomError),
}

/// NES console emulator.
pub struct Console {
    /// 6502 CPU.
    cpu: Cpu,
    /// System bus (PPU, APU, mapper, RAM).
    bus: NesBus,
    /// Frame buffer (256x240 RGBA).
    framebuffer: Vec<u8>,
    /// Total CPU cycles executed.
    total_cycles: u64,
    /// Frame counter.
    frame_count: u64,
    /// Is emulation running?
    running: bool,
    /// Which of the 3 PPU dots in the current CPU cycle `tick()` is on.
    dot_phase: u8,
    /// Whether the CPU is held by DMA for the in-progress 3-dot group.
    dma_held: bool,
    /// NMI edge accumulated across the in-progress 3-dot group.
    nmi_edge_pending: bool,
    /// Set when the CPU reached an instruction boundary on the last dot
    /// that completed a 3-dot group.
    last_instruction_boundary: bool,
}

impl Console {
    /// Create a new console with the given ROM.
    ///
    /// # Errors
    ///
    /// Returns an error if the ROM cannot be loaded or uses an unsupported mapper.
    pub fn new(rom_data: &[u8]) -> Result<Self, ConsoleError> {
        let rom = Rom::load(rom_data)?;
        let mapper = create_mapper(&rom)?;
        Self::with_mapper(mapper)
    }

    /// Create a new console from ROM bytes (alias for `new`).
    ///
    /// # Errors
    ///
    /// Returns an error if the ROM cannot be loaded or uses an unsupported mapper.
    pub fn from_rom_bytes(rom_data: &[u8]) -> Result<Self, ConsoleError> {
        Self::new(rom_data)
    }

    /// Create a console with a pre-created mapper.
    ///
    /// # Errors
    ///
    /// Returns an error if the console cannot be initialized.
    pub fn with_mapper(mapper: Box<dyn Mapper>) -> Result<Self, ConsoleError> {
        let bus = NesBus::new(mapper);
        let cpu = Cpu::new();

        Ok(Self {
            cpu,
            bus,
            framebuffer: vec![0; 256 * 240 * 4],
            total_cycles: 0,
            frame_count: 0,
            running: true,
            dot_phase: 0,
            dma_held: false,
            nmi_edge_pending: false,
            last_instruction_boundary: false,
        })
    }

    /// Reset the console to initial state.
    pub fn reset(&mut self) {
        self.bus.reset();
        self.cpu.reset(&mut self.bus);
        self.total_cycles = 0;
        self.running = true;
        self.dot_phase = 0;
        self.dma_held = false;
        self.nmi_edge_pending = false;
        self.last_instruction_boundary = false;
    }

    /// Power on the console (cold boot).
    pub fn power_on(&mut self) {
        self.reset();
    }

    /// Advance the system by exactly one PPU dot.
    ///
    /// The PPU, and the mapper's scanline clock, advance every call. The
    /// CPU only runs on the 3rd dot of each group: that call arbitrates
    /// any in-flight OAM/DMC DMA, steps the APU one cycle, updates the
    /// mapper IRQ line, flushes the PPU's power/reset warmup buffer once
    /// 29,658 cycles have elapsed, and finally ticks the CPU one cycle
    /// unless a DMA is holding the bus. Any NMI edge seen across the
    /// group's 3 dots is delivered to the CPU right before that tick.
    ///
    /// Returns `true` when this dot completed a frame (scanline 261, dot
    /// 340 on NTSC, or 339 on the odd-frame skip).
    pub fn tick(&mut self) -> bool {
        if !self.running {
            return false;
        }

        if self.dot_phase == 0 {
            self.dma_held = self.bus.step_dma();
            self.nmi_edge_pending = false;
        }

        let (frame_complete, nmi_edge) = self.bus.step_ppu();
        self.bus.step_mapper_dot();
        self.nmi_edge_pending |= nmi_edge;

        self.dot_phase += 1;
        if self.dot_phase == 3 {
            self.dot_phase = 0;

            if self.nmi_edge_pending {
                self.cpu.trigger_nmi();
            }

            self.bus.step_apu();
            if self.bus.irq_pending() {
                log::trace!("mapper/frame-counter IRQ asserted at cycle {}", self.total_cycles);
            }
            self.cpu.set_irq(self.bus.irq_pending());

            self.last_instruction_boundary = if self.dma_held {
                false
            } else {
                self.cpu.tick(&mut self.bus)
            };

            self.bus.add_cpu_cycles(1);
            self.total_cycles += 1;

            if !self.bus.ppu_warmup_complete() && self.total_cycles >= timing::PPU_WARMUP_CYCLES {
                self.bus.complete_ppu_warmup();
                log::debug!("PPU warmup complete at cycle {}", self.total_cycles);
            }
        }

        if frame_complete {
            log::trace!("frame {} boundary reached", self.frame_count);
        }

        frame_complete
    }

    /// Run emulation for one CPU instruction.
    ///
    /// Returns the number of CPU cycles executed (including any cycles
    /// spent held by OAM/DMC DMA before the instruction could run).
    pub fn step(&mut self) -> u8 {
        if !self.running {
            return 0;
        }

        let mut cycles = 0u8;
        loop {
            self.tick();
            if self.dot_phase == 0 {
                cycles = cycles.saturating_add(1);
                if self.last_instruction_boundary {
                    break;
                }
            }
        }
        cycles
    }

    /// Run emulation for one full frame.
    ///
    /// Loops `tick()` until the PPU reports a frame boundary, so this
    /// always stops exactly at scanline 261 dot 340 (or 339 on the
    /// odd-frame skip) rather than after a fixed cycle count.
    ///
    /// Returns the actual number of CPU cycles executed.
    pub fn step_frame(&mut self) -> u64 {
        let start_cycles = self.total_cycles;

        while self.running {
            if self.tick() {
                break;
            }
        }

        // Copy PPU framebuffer
        self.update_framebuffer();
        self.frame_count += 1;

        self.total_cycles - start_cycles
    }

    /// Run emulation for one frame with cycle-accurate timing.
    ///
    /// This is an alias for `step_frame()` for API compatibility.
    /// Returns the actual number of CPU cycles executed.
    pub fn step_frame_accurate(&mut self) -> u64 {
        self.step_frame()
    }

    /// Update the framebuffer from PPU output.
    fn update_framebuffer(&mut self) {
        let ppu_buffer = self.bus.ppu.frame_buffer();

        // Convert PPU palette indices to RGBA
        for (i, &palette_idx) in ppu_buffer.iter().enumerate() {
            let rgb = crate::palette::NES_PALETTE[palette_idx as usize & 0x3F];
            let offset = i * 4;
            self.framebuffer[offset] = rgb.0; // R
            self.framebuffer[offset + 1] = rgb.1; // G
            self.framebuffer[offset + 2] = rgb.2; // B
            self.framebuffer[offset + 3] = 255; // A
        }
    }

    /// Get the current framebuffer (256x240 RGBA).
    #[must_use]
    pub fn framebuffer(&self) -> &[u8] {
        &self.framebuffer
    }

    /// Set controller 1 state from button byte.
    pub fn set_controller_1(&mut self, buttons: u8) {
        self.bus.controller1 = ControllerState { buttons };
    }

    /// Set controller 2 state from button byte.
    pub fn set_controller_2(&mut self, buttons: u8) {
        self.bus.controller2 = ControllerState { buttons };
    }

    /// Set controller 1 state.
    pub fn set_controller1(&mut self, state: ControllerState) {
        self.bus.controller1 = state;
    }

    /// Set controller 2 state.
    pub fn set_controller2(&mut self, state: ControllerState) {
        self.bus.controller2 = state;
    }

    /// Get controller 1 state.
    #[must_use]
    pub fn controller1(&self) -> ControllerState {
        self.bus.controller1
    }

    /// Get controller 2 state.
    #[must_use]
    pub fn controller2(&self) -> ControllerState {
        self.bus.controller2
    }

    /// Get the total CPU cycles executed.
    #[must_use]
    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    /// Get the frame count.
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Check if emulation is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Pause emulation.
    pub fn pause(&mut self) {
        self.running = false;
    }

    /// Resume emulation.
    pub fn resume(&mut self) {
        self.running = true;
    }

    /// Get a reference to the CPU for debugging.
    #[must_use]
    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    /// Get a reference to the PPU for debugging.
    #[must_use]
    pub fn ppu(&self) -> &nes_ppu::Ppu {
        &self.bus.ppu
    }

    /// Get a reference to the APU for debugging.
    #[must_use]
    pub fn apu(&self) -> &nes_apu::Apu {
        &self.bus.apu
    }

    /// Get the total CPU cycles (alias for `total_cycles`).
    #[must_use]
    pub fn cycles(&self) -> u64 {
        self.total_cycles
    }

    /// Peek at memory without side effects.
    ///
    /// This is useful for debugging/display purposes where we don't want
    /// to trigger PPU register side effects or mapper state changes.
    #[must_use]
    pub fn peek_memory(&self, addr: u16) -> u8 {
        self.bus.peek(addr)
    }

    /// Get a reference to the bus for debugging.
    #[must_use]
    pub fn bus(&self) -> &NesBus {
        &self.bus
    }

    /// Get a mutable reference to the bus.
    pub fn bus_mut(&mut self) -> &mut NesBus {
        &mut self.bus
    }

    /// Get the mapper number.
    #[must_use]
    pub fn mapper_number(&self) -> u16 {
        self.bus.mapper.mapper_number()
    }

    /// Get the mapper name.
    #[must_use]
    pub fn mapper_name(&self) -> &'static str {
        self.bus.mapper.mapper_name()
    }

    /// Check if the ROM has battery-backed RAM.
    #[must_use]
    pub fn has_battery(&self) -> bool {
        self.bus.mapper.has_battery()
    }

    /// Get battery-backed RAM for saving.
    #[must_use]
    pub fn battery_ram(&self) -> Option<&[u8]> {
        self.bus.mapper.battery_ram()
    }

    /// Load battery-backed RAM.
    pub fn load_battery_ram(&mut self, data: &[u8]) {
        self.bus.mapper.set_battery_ram(data);
    }
}
