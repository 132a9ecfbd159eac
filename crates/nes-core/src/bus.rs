//! NES System Bus Implementation.
//!
//! The bus connects the CPU to all other components:
//! - PPU registers ($2000-$2007, mirrored every 8 bytes to $3FFF)
//! - APU/IO registers ($4000-$4017)
//! - Cartridge space ($4020-$FFFF)
//! - Internal RAM ($0000-$07FF, mirrored to $1FFF)

use crate::dma::{DmaLedger, DmcDma, DmcDmaStep, OamDma, OamDmaStep};
use nes_apu::Apu;
use nes_cpu::Bus;
use nes_mappers::{Mapper, Mirroring as MapperMirroring};
use nes_ppu::{Mirroring as PpuMirroring, Ppu};

#[cfg(not(feature = "std"))]
use alloc::boxed::Box;

/// Convert the mapper's mirroring mode into the PPU's own mirroring type.
/// The two crates define identical enums independently so neither depends
/// on the other; the bus is the seam that reconciles them.
fn to_ppu_mirroring(mirroring: MapperMirroring) -> PpuMirroring {
    match mirroring {
        MapperMirroring::Horizontal => PpuMirroring::Horizontal,
        MapperMirroring::Vertical => PpuMirroring::Vertical,
        MapperMirroring::SingleScreenLower => PpuMirroring::SingleScreenLower,
        MapperMirroring::SingleScreenUpper => PpuMirroring::SingleScreenUpper,
        MapperMirroring::FourScreen => PpuMirroring::FourScreen,
    }
}

/// Controller input state.
#[derive(Debug, Clone, Copy, Default)]
pub struct ControllerState {
    /// Button states: A, B, Select, Start, Up, Down, Left, Right
    pub buttons: u8,
}

impl ControllerState {
    /// A button mask.
    pub const A: u8 = 0x01;
    /// B button mask.
    pub const B: u8 = 0x02;
    /// Select button mask.
    pub const SELECT: u8 = 0x04;
    /// Start button mask.
    pub const START: u8 = 0x08;
    /// Up button mask.
    pub const UP: u8 = 0x10;
    /// Down button mask.
    pub const DOWN: u8 = 0x20;
    /// Left button mask.
    pub const LEFT: u8 = 0x40;
    /// Right button mask.
    pub const RIGHT: u8 = 0x80;
}

/// NES system bus connecting all components.
pub struct NesBus {
    /// Internal RAM (2KB, mirrored 4 times).
    pub ram: [u8; 2048],
    /// PPU (Picture Processing Unit).
    pub ppu: Ppu,
    /// APU (Audio Processing Unit).
    pub apu: Apu,
    /// Cartridge mapper.
    pub mapper: Box<dyn Mapper>,
    /// Controller 1 state.
    pub controller1: ControllerState,
    /// Controller 2 state.
    pub controller2: ControllerState,
    /// Controller 1 shift register.
    controller1_shift: u8,
    /// Controller 2 shift register.
    controller2_shift: u8,
    /// Controller strobe latch.
    controller_strobe: bool,
    /// Per-cycle OAM DMA state machine.
    oam_dma: OamDma,
    /// Per-cycle DMC DMA state machine.
    dmc_dma: DmcDma,
    /// Single source of truth for how the two DMAs arbitrate the bus.
    dma_ledger: DmaLedger,
    /// CPU cycle counter, the ledger's time base and the OAM DMA alignment rule's parity source.
    cpu_cycles: u64,
    /// Last value on the data bus (for open bus behavior).
    last_bus_value: u8,
}

impl NesBus {
    /// Create a new NES bus with the given mapper.
    pub fn new(mapper: Box<dyn Mapper>) -> Self {
        let mirroring = to_ppu_mirroring(mapper.mirroring());
        Self {
            ram: [0; 2048],
            ppu: Ppu::new(mirroring),
            apu: Apu::new(),
            mapper,
            controller1: ControllerState::default(),
            controller2: ControllerState::default(),
            controller1_shift: 0,
            controller2_shift: 0,
            controller_strobe: false,
            oam_dma: OamDma::new(),
            dmc_dma: DmcDma::new(),
            dma_ledger: DmaLedger::new(),
            cpu_cycles: 0,
            last_bus_value: 0,
        }
    }

    /// Reset the bus and all components.
    pub fn reset(&mut self) {
        self.ram.fill(0);
        self.ppu.reset();
        self.apu.reset();
        self.mapper.reset();
        self.controller1_shift = 0;
        self.controller2_shift = 0;
        self.controller_strobe = false;
        self.oam_dma.reset();
        self.dmc_dma.reset();
        self.dma_ledger.reset();
        self.cpu_cycles = 0;
        self.last_bus_value = 0;
    }

    /// Start an OAM DMA transfer from `page:00`-`page:FF`.
    ///
    /// The 513/514-cycle alignment rule is derived from the current CPU
    /// cycle's parity, matching real hardware: the DMA always begins with
    /// a dummy "get ready" cycle when triggered on an odd CPU cycle.
    pub fn request_oam_dma(&mut self, page: u8) {
        let odd_cycle = self.cpu_cycles % 2 == 1;
        self.oam_dma.start(page, odd_cycle);
        log::trace!("OAM DMA started from page {page:02X} at cycle {}", self.cpu_cycles);
    }

    /// Is OAM DMA in progress (including while paused for a DMC steal)?
    #[must_use]
    pub fn oam_dma_active(&self) -> bool {
        self.oam_dma.is_active()
    }

    /// Is DMC DMA in progress?
    #[must_use]
    pub fn dmc_dma_active(&self) -> bool {
        self.dmc_dma.is_active()
    }

    /// Advance OAM DMA and DMC DMA by one CPU cycle, performing at most one
    /// bus side effect (a read, a write, or a fetch). Returns `true` if the
    /// CPU must be held this cycle (RDY held low).
    ///
    /// DMC DMA always wins the bus: if the DMC channel needs its next
    /// sample byte, it starts (or continues) a steal, pausing an
    /// in-progress OAM DMA for the duration. The DMA Interaction Ledger
    /// timestamps every pause/resume so the realignment cycle OAM DMA owes
    /// afterward falls out of history rather than a separate flag.
    pub fn step_dma(&mut self) -> bool {
        if self.apu.dmc_needs_sample() && !self.dmc_dma.is_active() {
            let oam_active = self.oam_dma.is_active();
            self.dma_ledger.record_dmc_active(self.cpu_cycles, oam_active);
            if oam_active {
                self.oam_dma.pause();
            }
            self.dmc_dma.start();
            log::trace!(
                "DMC DMA started at cycle {} (OAM DMA {})",
                self.cpu_cycles,
                if oam_active { "paused" } else { "idle" }
            );
        }

        if let Some(step) = self.dmc_dma.query(self.apu.dmc_sample_addr()) {
            if let DmcDmaStep::Fetch { addr } = step {
                let sample = self.mapper.read_prg(addr);
                self.apu.dmc_fill_sample(sample);
            }
            if self.dmc_dma.advance() {
                let oam_was_paused = self.oam_dma.is_paused();
                self.dma_ledger
                    .record_dmc_inactive(self.cpu_cycles, oam_was_paused);
                if oam_was_paused {
                    self.oam_dma.resume();
                }
                log::trace!("DMC DMA finished at cycle {}", self.cpu_cycles);
            }
            return true;
        }

        if self.oam_dma.is_active() && self.dma_ledger.take_realignment() {
            return true;
        }

        if let Some(step) = self.oam_dma.query() {
            match step {
                OamDmaStep::Idle => self.oam_dma.advance_alignment(),
                OamDmaStep::Read { .. } => {
                    if let Some(addr) = self.oam_dma.source_addr() {
                        let value = self.cpu_read_dma(addr);
                        self.oam_dma.advance_read(value);
                    }
                }
                OamDmaStep::Write { index, value } => {
                    self.ppu.oam_data_write(value);
                    self.oam_dma.advance_write();
                    if index == 0xFF {
                        log::trace!("OAM DMA finished at cycle {}", self.cpu_cycles);
                    }
                }
            }
            return true;
        }

        false
    }

    /// Internal CPU read without updating bus state (for DMA source reads).
    fn cpu_read_dma(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x1FFF => self.ram[(addr & 0x07FF) as usize],
            0x4020..=0xFFFF => self.mapper.read_prg(addr),
            _ => self.last_bus_value,
        }
    }

    /// Step the PPU by one dot, routing CHR accesses to the mapper.
    ///
    /// Returns `(frame_complete, nmi_edge)`.
    pub fn step_ppu(&mut self) -> (bool, bool) {
        let mapper = &mut self.mapper;
        self.ppu.step_with_chr(|addr| mapper.read_chr(addr))
    }

    /// Step the mapper's own clock (scanline/IRQ counters) by one PPU dot.
    pub fn step_mapper_dot(&mut self) {
        self.mapper.clock(1);
    }

    /// Step the APU by one CPU cycle.
    pub fn step_apu(&mut self) {
        self.apu.clock();
    }

    /// Check if any mapper/frame-counter IRQ is pending.
    #[must_use]
    pub fn irq_pending(&self) -> bool {
        self.mapper.irq_pending() || self.apu.irq_pending()
    }

    /// Acknowledge mapper IRQ.
    pub fn acknowledge_mapper_irq(&mut self) {
        self.mapper.irq_acknowledge();
    }

    /// Get the current CPU cycle count.
    #[must_use]
    pub fn cpu_cycles(&self) -> u64 {
        self.cpu_cycles
    }

    /// Increment CPU cycle count.
    pub fn add_cpu_cycles(&mut self, cycles: u64) {
        self.cpu_cycles += cycles;
    }

    /// Has the PPU's 29,658-CPU-cycle power/reset warmup elapsed?
    #[must_use]
    pub fn ppu_warmup_complete(&self) -> bool {
        self.ppu.warmup_complete()
    }

    /// Flush PPUCTRL/PPUMASK writes buffered during warmup.
    pub fn complete_ppu_warmup(&mut self) {
        self.ppu.complete_warmup();
    }

    /// Read controller register.
    fn read_controller(&mut self, port: u8) -> u8 {
        let shift = if port == 0 {
            &mut self.controller1_shift
        } else {
            &mut self.controller2_shift
        };

        // Open bus behavior: bits 5-7 come from last bus value
        let open_bus = self.last_bus_value & 0xE0;

        // Read bit 0 from shift register
        let data = (*shift & 1) | open_bus;
        *shift >>= 1;
        *shift |= 0x80; // Shift in 1s after all buttons read

        data
    }

    /// Write controller strobe.
    fn write_controller_strobe(&mut self, val: u8) {
        let new_strobe = val & 1 != 0;

        // On falling edge (strobe 1->0), latch controller state
        if self.controller_strobe && !new_strobe {
            self.controller1_shift = self.controller1.buttons;
            self.controller2_shift = self.controller2.buttons;
        }

        self.controller_strobe = new_strobe;

        // While strobe is high, continuously reload
        if self.controller_strobe {
            self.controller1_shift = self.controller1.buttons;
            self.controller2_shift = self.controller2.buttons;
        }
    }

    /// Peek at memory without side effects.
    ///
    /// This is useful for debugging/display purposes where we don't want
    /// to trigger PPU register side effects or mapper state changes.
    #[must_use]
    pub fn peek(&self, addr: u16) -> u8 {
        match addr {
            // Internal RAM (mirrored every 2KB)
            0x0000..=0x1FFF => self.ram[(addr & 0x07FF) as usize],

            // PPU registers - return last bus value to avoid side effects
            0x2000..=0x3FFF => self.last_bus_value,

            // APU and I/O registers
            0x4000..=0x4017 => match addr {
                0x4015 => self.apu.peek_status(),
                _ => self.last_bus_value,
            },

            // APU test mode
            0x4018..=0x401F => self.last_bus_value,

            // Cartridge space
            0x4020..=0xFFFF => self.mapper.read_prg(addr),
        }
    }
}

/// CPU bus implementation.
impl Bus for NesBus {
    fn read(&mut self, addr: u16) -> u8 {
        let value = match addr {
            // Internal RAM (mirrored every 2KB)
            0x0000..=0x1FFF => self.ram[(addr & 0x07FF) as usize],

            // PPU registers (mirrored every 8 bytes)
            0x2000..=0x3FFF => {
                let mapper = &mut self.mapper;
                self.ppu.read_register(addr, |a| mapper.read_chr(a))
            }

            // APU and I/O registers
            0x4000..=0x4017 => match addr {
                0x4015 => self.apu.read_status(),
                0x4016 => self.read_controller(0),
                0x4017 => self.read_controller(1),
                _ => self.last_bus_value, // Write-only registers
            },

            // APU test mode (normally disabled)
            0x4018..=0x401F => self.last_bus_value,

            // Cartridge space
            0x4020..=0xFFFF => self.mapper.read_prg(addr),
        };

        self.last_bus_value = value;
        value
    }

    fn write(&mut self, addr: u16, val: u8) {
        self.last_bus_value = val;

        match addr {
            // Internal RAM (mirrored every 2KB)
            0x0000..=0x1FFF => {
                self.ram[(addr & 0x07FF) as usize] = val;
            }

            // PPU registers (mirrored every 8 bytes)
            0x2000..=0x3FFF => {
                let mapper = &mut self.mapper;
                self.ppu
                    .write_register(addr, val, |a, v| mapper.write_chr(a, v));
            }

            // APU and I/O registers
            0x4000..=0x4017 => match addr {
                0x4000..=0x4013 | 0x4015 | 0x4017 => {
                    self.apu.write(addr, val);
                }
                0x4014 => {
                    self.request_oam_dma(val);
                }
                0x4016 => {
                    self.write_controller_strobe(val);
                }
                _ => {}
            },

            // APU test mode (normally disabled)
            0x4018..=0x401F => {}

            // Cartridge space
            0x4020..=0xFFFF => {
                self.mapper.write_prg(addr, val);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nes_mappers::{Mirroring, Nrom, Rom, RomFormat, RomHeader};

    #[cfg(not(feature = "std"))]
    use alloc::{boxed::Box, vec, vec::Vec};

    fn create_test_bus() -> NesBus {
        let rom = Rom {
            header: RomHeader {
                format: RomFormat::INes,
                mapper: 0,
                prg_rom_size: 2,
                chr_rom_size: 1,
                prg_ram_size: 0,
                chr_ram_size: 0,
                mirroring: Mirroring::Vertical,
                has_battery: false,
                has_trainer: false,
                tv_system: 0,
            },
            prg_rom: vec![0; 32768],
            chr_rom: vec![0; 8192],
            trainer: None,
        };
        NesBus::new(Box::new(Nrom::new(&rom)))
    }

    #[test]
    fn test_ram_mirroring() {
        let mut bus = create_test_bus();

        // Write to $0000
        Bus::write(&mut bus, 0x0000, 0x42);
        assert_eq!(Bus::read(&mut bus, 0x0000), 0x42);

        // Should mirror to $0800, $1000, $1800
        assert_eq!(Bus::read(&mut bus, 0x0800), 0x42);
        assert_eq!(Bus::read(&mut bus, 0x1000), 0x42);
        assert_eq!(Bus::read(&mut bus, 0x1800), 0x42);

        // Write to mirrored address
        Bus::write(&mut bus, 0x1234, 0xAB);
        assert_eq!(Bus::read(&mut bus, 0x0234), 0xAB); // $1234 & $07FF = $0234
    }

    #[test]
    fn test_controller_strobe() {
        let mut bus = create_test_bus();

        // Set controller 1 buttons
        bus.controller1.buttons = 0b1010_0101; // A, Select, Up, Right

        // Strobe high then low to latch
        Bus::write(&mut bus, 0x4016, 1);
        Bus::write(&mut bus, 0x4016, 0);

        // Read buttons one at a time (bit 0 of each read)
        assert_eq!(Bus::read(&mut bus, 0x4016) & 1, 1); // A
        assert_eq!(Bus::read(&mut bus, 0x4016) & 1, 0); // B
        assert_eq!(Bus::read(&mut bus, 0x4016) & 1, 1); // Select
        assert_eq!(Bus::read(&mut bus, 0x4016) & 1, 0); // Start
        assert_eq!(Bus::read(&mut bus, 0x4016) & 1, 0); // Up (bit 4)
        assert_eq!(Bus::read(&mut bus, 0x4016) & 1, 1); // Down
        assert_eq!(Bus::read(&mut bus, 0x4016) & 1, 0); // Left
        assert_eq!(Bus::read(&mut bus, 0x4016) & 1, 1); // Right
    }

    #[test]
    fn test_oam_dma_per_cycle() {
        let mut bus = create_test_bus();

        // Fill RAM page 2 ($0200-$02FF) with test data
        for i in 0..256u16 {
            Bus::write(&mut bus, 0x0200 + i, i as u8);
        }

        // Trigger OAM DMA from page 2 on an even CPU cycle (no alignment cycle)
        bus.cpu_cycles = 0;
        Bus::write(&mut bus, 0x4014, 0x02);
        assert!(bus.oam_dma_active());

        let mut held_cycles = 0;
        while bus.oam_dma_active() {
            assert!(bus.step_dma());
            held_cycles += 1;
            assert!(held_cycles <= 600);
        }

        assert_eq!(held_cycles, 512); // 256 reads + 256 writes, no alignment burn
    }

    #[test]
    fn test_open_bus_behavior() {
        let mut bus = create_test_bus();

        // Read from a location to set bus value
        Bus::write(&mut bus, 0x0000, 0xAB);
        let _ = Bus::read(&mut bus, 0x0000);

        // Last bus value should be updated
        assert_eq!(bus.last_bus_value, 0xAB);
    }

    #[test]
    fn test_peek_memory() {
        let mut bus = create_test_bus();

        // Write to RAM
        Bus::write(&mut bus, 0x0100, 0x42);

        // Peek should return the value without side effects
        assert_eq!(bus.peek(0x0100), 0x42);

        // Peek at mirrored address
        assert_eq!(bus.peek(0x0900), 0x42);
    }

    #[test]
    fn test_reset() {
        let mut bus = create_test_bus();
        bus.cpu_cycles = 42;

        bus.reset();

        assert_eq!(Bus::read(&mut bus, 0x0000), 0);
        assert_eq!(bus.cpu_cycles, 0);
        assert!(!bus.oam_dma_active());
    }
}
