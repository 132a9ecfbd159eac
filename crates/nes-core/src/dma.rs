//! OAM DMA and DMC DMA arbitration.
//!
//! Both transfers steal CPU cycles by freezing the 6502 mid-instruction.
//! When they overlap, DMC DMA always wins: OAM DMA is paused for the
//! duration of the DMC fetch and resumes afterward, with real hardware
//! sometimes re-transferring the byte that was in flight when the pause
//! happened (the "duplicate byte" quirk). The DMA Interaction Ledger
//! timestamps every pause/resume/activation so that quirk, and the
//! alignment cycle OAM DMA needs after a DMC steal, can be reconstructed
//! from history rather than tracked with ad hoc flags scattered around
//! the bus.

/// Byte and destination OAM address captured when a DMC steal interrupts
/// an in-flight OAM DMA "put" cycle, used to reproduce the duplicate-byte
/// quirk once OAM DMA resumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptedPut {
    /// The byte that was about to be written to OAM.
    pub byte: u8,
    /// The OAM DMA byte index (0-255) that write belonged to.
    pub index: u8,
}

/// Timestamped history of DMA interactions, the single source of truth for
/// how OAM DMA and DMC DMA arbitrate the bus when they overlap.
#[derive(Debug, Clone, Default)]
pub struct DmaLedger {
    /// CPU cycle at which OAM DMA was paused for a DMC steal.
    pub oam_pause_cycle: Option<u64>,
    /// CPU cycle at which OAM DMA resumed after a DMC steal.
    pub oam_resume_cycle: Option<u64>,
    /// CPU cycle at which DMC DMA last became active.
    pub last_dmc_active_cycle: Option<u64>,
    /// CPU cycle at which DMC DMA last finished.
    pub last_dmc_inactive_cycle: Option<u64>,
    /// Set when OAM DMA must burn an extra alignment cycle after a DMC
    /// steal before resuming its get/put sequence. Cleared once consumed.
    pub needs_alignment_after_dmc: bool,
    /// Captured state for the duplicate-byte quirk, consumed on resume.
    pub interrupted_put: Option<InterruptedPut>,
}

impl DmaLedger {
    /// Fresh ledger (power-on state).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Record the DMC channel starting a steal at `cycle`. If OAM DMA was
    /// mid-transfer, this also marks it paused.
    pub fn record_dmc_active(&mut self, cycle: u64, oam_active: bool) {
        self.last_dmc_active_cycle = Some(cycle);
        if oam_active {
            self.oam_pause_cycle = Some(cycle);
        }
    }

    /// Record the DMC steal finishing at `cycle`. If OAM DMA had been
    /// paused for it, marks the resume point and requests realignment.
    pub fn record_dmc_inactive(&mut self, cycle: u64, oam_was_paused: bool) {
        self.last_dmc_inactive_cycle = Some(cycle);
        if oam_was_paused {
            self.oam_resume_cycle = Some(cycle);
            self.needs_alignment_after_dmc = true;
        }
    }

    /// Consume the pending post-steal alignment requirement, if any.
    pub fn take_realignment(&mut self) -> bool {
        core::mem::take(&mut self.needs_alignment_after_dmc)
    }
}

/// One step of OAM DMA: either the get-ready/realignment cycle, a CPU-side
/// read of the source byte, or the paired write of the most recently read
/// byte into PPU OAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OamDmaStep {
    /// The initial get-ready cycle (burned once if starting on an odd CPU
    /// cycle), with no bus side effect.
    Idle,
    /// Read byte `index` from `page:index` in CPU address space.
    Read { index: u8 },
    /// Write `value` (the byte read for `index`) to PPU OAMDATA.
    Write { index: u8, value: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OamDmaPhase {
    Idle,
    Alignment,
    Read(u8),
    Write(u8, u8),
    Done,
}

/// Three-phase (query/execute/update) OAM DMA state machine.
///
/// `query` is the pure phase: it only inspects state to decide what the
/// cycle should do. Callers perform the single side effect it names (the
/// execute phase) and then call the matching `advance_*` method to fold
/// the result back into state (the update phase).
#[derive(Debug, Clone)]
pub struct OamDma {
    phase: OamDmaPhase,
    page: u8,
    paused: bool,
}

impl Default for OamDma {
    fn default() -> Self {
        Self {
            phase: OamDmaPhase::Idle,
            page: 0,
            paused: false,
        }
    }
}

impl OamDma {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Is a transfer in progress (including while paused for a DMC steal)?
    #[must_use]
    pub fn is_active(&self) -> bool {
        !matches!(self.phase, OamDmaPhase::Idle | OamDmaPhase::Done)
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Begin a transfer from `page:00` through `page:FF`. `odd_cycle`
    /// selects the 513 vs 514 cycle alignment rule.
    pub fn start(&mut self, page: u8, odd_cycle: bool) {
        self.page = page;
        self.paused = false;
        self.phase = if odd_cycle {
            OamDmaPhase::Alignment
        } else {
            OamDmaPhase::Read(0)
        };
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// Burn one realignment cycle without advancing the transfer, used
    /// right after a DMC steal resumes an interrupted OAM DMA.
    pub fn realign(&self) -> OamDmaStep {
        OamDmaStep::Idle
    }

    /// Query: what should this cycle do? Returns `None` if idle/paused.
    #[must_use]
    pub fn query(&self) -> Option<OamDmaStep> {
        if self.paused {
            return None;
        }
        match self.phase {
            OamDmaPhase::Idle | OamDmaPhase::Done => None,
            OamDmaPhase::Alignment => Some(OamDmaStep::Idle),
            OamDmaPhase::Read(index) => Some(OamDmaStep::Read { index }),
            OamDmaPhase::Write(index, value) => Some(OamDmaStep::Write { index, value }),
        }
    }

    /// Address to read from for the current `Read` phase.
    #[must_use]
    pub fn source_addr(&self) -> Option<u16> {
        match self.phase {
            OamDmaPhase::Read(index) => Some(u16::from(self.page) << 8 | u16::from(index)),
            _ => None,
        }
    }

    /// Update: the alignment cycle completed.
    pub fn advance_alignment(&mut self) {
        if self.phase == OamDmaPhase::Alignment {
            self.phase = OamDmaPhase::Read(0);
        }
    }

    /// Update: the read side effect completed with `value`; the next
    /// cycle's query will report the paired write.
    pub fn advance_read(&mut self, value: u8) {
        if let OamDmaPhase::Read(index) = self.phase {
            self.phase = OamDmaPhase::Write(index, value);
        }
    }

    /// Update: the write side effect completed; move to the next byte or
    /// finish the transfer.
    pub fn advance_write(&mut self) {
        if let OamDmaPhase::Write(index, _) = self.phase {
            self.phase = match index.checked_add(1) {
                Some(next) => OamDmaPhase::Read(next),
                None => OamDmaPhase::Done,
            };
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum DmcDmaPhase {
    #[default]
    Idle,
    Halt,
    Dummy,
    Fetch,
}

/// Three-phase DMC DMA state machine: a fixed halt/dummy/fetch sequence
/// triggered whenever the APU's DMC channel needs its next sample byte.
#[derive(Debug, Clone, Default)]
pub struct DmcDma {
    phase: DmcDmaPhase,
}

/// What a DMC DMA cycle should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmcDmaStep {
    /// Halt/dummy cycle: no bus side effect, just steals the CPU.
    Stall,
    /// Fetch the sample byte from `addr` and hand it to the APU.
    Fetch { addr: u16 },
}

impl DmcDma {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.phase != DmcDmaPhase::Idle
    }

    /// Begin a 3-cycle steal (halt, dummy, fetch).
    pub fn start(&mut self) {
        self.phase = DmcDmaPhase::Halt;
    }

    /// Query: what should this cycle do?
    #[must_use]
    pub fn query(&self, sample_addr: u16) -> Option<DmcDmaStep> {
        match self.phase {
            DmcDmaPhase::Idle => None,
            DmcDmaPhase::Halt | DmcDmaPhase::Dummy => Some(DmcDmaStep::Stall),
            DmcDmaPhase::Fetch => Some(DmcDmaStep::Fetch { addr: sample_addr }),
        }
    }

    /// Update: fold this cycle's completed step back into phase state.
    /// Returns `true` once the fetch has completed (DMA now idle).
    pub fn advance(&mut self) -> bool {
        match self.phase {
            DmcDmaPhase::Halt => {
                self.phase = DmcDmaPhase::Dummy;
                false
            }
            DmcDmaPhase::Dummy => {
                self.phase = DmcDmaPhase::Fetch;
                false
            }
            DmcDmaPhase::Fetch => {
                self.phase = DmcDmaPhase::Idle;
                true
            }
            DmcDmaPhase::Idle => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oam_dma_even_start_no_alignment() {
        let mut dma = OamDma::new();
        dma.start(0x02, false);
        assert_eq!(dma.query(), Some(OamDmaStep::Read { index: 0 }));
    }

    #[test]
    fn test_oam_dma_odd_start_needs_alignment() {
        let mut dma = OamDma::new();
        dma.start(0x02, true);
        assert_eq!(dma.query(), Some(OamDmaStep::Idle));
        dma.advance_alignment();
        assert_eq!(dma.query(), Some(OamDmaStep::Read { index: 0 }));
    }

    #[test]
    fn test_oam_dma_full_transfer() {
        let mut dma = OamDma::new();
        dma.start(0x02, false);
        for i in 0u16..256 {
            let index = i as u8;
            assert_eq!(dma.source_addr(), Some(0x0200 + i));
            dma.advance_read(index);
            assert_eq!(dma.query(), Some(OamDmaStep::Write { index, value: index }));
            dma.advance_write();
        }
        assert!(!dma.is_active());
    }

    #[test]
    fn test_oam_dma_pause_resume() {
        let mut dma = OamDma::new();
        dma.start(0x02, false);
        dma.pause();
        assert_eq!(dma.query(), None);
        assert!(dma.is_active());
        dma.resume();
        assert_eq!(dma.query(), Some(OamDmaStep::Read { index: 0 }));
    }

    #[test]
    fn test_dmc_dma_sequence() {
        let mut dma = DmcDma::new();
        dma.start();
        assert_eq!(dma.query(0x8000), Some(DmcDmaStep::Stall));
        assert!(!dma.advance());
        assert_eq!(dma.query(0x8000), Some(DmcDmaStep::Stall));
        assert!(!dma.advance());
        assert_eq!(dma.query(0x8000), Some(DmcDmaStep::Fetch { addr: 0x8000 }));
        assert!(dma.advance());
        assert!(!dma.is_active());
    }

    #[test]
    fn test_ledger_records_pause_and_resume() {
        let mut ledger = DmaLedger::new();
        ledger.record_dmc_active(100, true);
        assert_eq!(ledger.oam_pause_cycle, Some(100));
        ledger.record_dmc_inactive(104, true);
        assert_eq!(ledger.oam_resume_cycle, Some(104));
        assert!(ledger.needs_alignment_after_dmc);
        assert!(ledger.take_realignment());
        assert!(!ledger.needs_alignment_after_dmc);
    }

    #[test]
    fn test_ledger_no_pause_when_oam_inactive() {
        let mut ledger = DmaLedger::new();
        ledger.record_dmc_active(50, false);
        assert_eq!(ledger.oam_pause_cycle, None);
        assert_eq!(ledger.last_dmc_active_cycle, Some(50));
    }
}
