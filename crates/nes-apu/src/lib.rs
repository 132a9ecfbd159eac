//! NES APU (Audio Processing Unit) Emulation.
//!
//! This crate tracks the register and timing state of the NES 2A03 APU's
//! five channels (two pulse, triangle, noise, DMC) well enough to drive
//! `$4015` status reads and DMC sample-fetch DMA. It does not synthesize
//! audio: duty-cycle sequencing, envelopes, sweep, the triangle's linear
//! counter, and the non-linear mixer are out of scope, so there is no
//! `output()` sample to read.
//!
//! # Architecture
//!
//! The APU runs at half the CPU clock rate. Each channel tracks a length
//! counter, and the frame counter provides the timing signals that clock
//! them on half frames and raise the frame IRQ.
//!
//! # Example
//!
//! ```no_run
//! use nes_apu::Apu;
//!
//! let mut apu = Apu::new();
//!
//! // Enable pulse channel 1
//! apu.write(0x4015, 0x01);
//!
//! // Configure pulse 1 and load its length counter
//! apu.write(0x4000, 0xBF);
//! apu.write(0x4002, 0xFD); // Timer low
//! apu.write(0x4003, 0x00); // Timer high + length counter
//!
//! // Clock the APU
//! for _ in 0..29780 {
//!     apu.clock();
//! }
//! assert!(apu.pulse1_length() > 0);
//! ```
//!
//! # no_std Support
//!
//! This crate supports `no_std` environments with the `alloc` crate.
//! Enable the `std` feature (enabled by default) for standard library support.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

mod apu;
mod dmc;
mod frame_counter;
mod length_counter;
mod noise;
mod pulse;
mod timer;
mod triangle;

pub use apu::Apu;
pub use dmc::Dmc;
pub use frame_counter::{FrameCounter, FrameCounterMode, FrameEvent};
pub use length_counter::LengthCounter;
pub use noise::Noise;
pub use pulse::Pulse;
pub use timer::Timer;
pub use triangle::Triangle;

/// NTSC CPU clock rate in Hz.
pub const CPU_CLOCK_NTSC: u32 = 1_789_773;

/// PAL CPU clock rate in Hz.
pub const CPU_CLOCK_PAL: u32 = 1_662_607;

/// NTSC APU sample rate (before resampling).
/// This is the CPU clock rate since we sample every CPU cycle.
pub const APU_SAMPLE_RATE_NTSC: u32 = CPU_CLOCK_NTSC;

/// Cycles per frame (NTSC).
pub const CYCLES_PER_FRAME_NTSC: u32 = 29780;

/// Cycles per frame (PAL).
pub const CYCLES_PER_FRAME_PAL: u32 = 33247;
