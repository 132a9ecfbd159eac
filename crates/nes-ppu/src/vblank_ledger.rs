//! VBlank ledger: single source of truth for VBlank status and the NMI line.
//!
//! The PPU sets and clears the VBlank flag on fixed dots (241,1) and (261,1).
//! Reading $2002 on the exact dot the flag is set is a well-known race: real
//! hardware sometimes suppresses the flag and the NMI it would have caused.
//! Rather than special-casing that single dot inline, every set/clear/read is
//! timestamped here and the race window is evaluated uniformly.

/// Timestamped record of VBlank set/clear events plus $2002-read races.
///
/// Time is measured in absolute PPU dots (`Ppu::total_dots`), not
/// scanline/dot pairs, so ordering survives frame wraparound.
#[derive(Debug, Clone, Default)]
pub struct VBlankLedger {
    last_set: Option<u64>,
    last_clear: Option<u64>,
    /// Set dot suppressed by a same-window $2002 read; the flag read back
    /// as clear and the NMI that dot would have caused is dropped.
    race_suppressed: bool,
}

/// Closed window, in PPU dots, around a set/clear timestamp in which a
/// $2002 read races the hardware flag update.
const RACE_WINDOW: u64 = 2;

impl VBlankLedger {
    /// Create a fresh ledger (VBlank inactive, nothing suppressed).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset to power-on state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Record the VBlank flag being set at `cycle` (dot (241,1)).
    pub fn record_set(&mut self, cycle: u64) {
        self.last_set = Some(cycle);
        self.race_suppressed = false;
    }

    /// Record the VBlank flag being cleared at `cycle` (dot (261,1) or a
    /// $2002 read that falls in the race window).
    pub fn record_clear(&mut self, cycle: u64) {
        self.last_clear = Some(cycle);
    }

    /// Record a $2002 status read at `cycle`.
    ///
    /// Returns `true` if this read lands in the race window around the most
    /// recent set event, meaning the caller should report VBlank as clear
    /// and suppress the NMI for that set, matching real hardware.
    pub fn record_read_status(&mut self, cycle: u64) -> bool {
        let racing = match self.last_set {
            Some(set_at) => cycle.abs_diff(set_at) <= RACE_WINDOW && self.is_active_at(cycle),
            None => false,
        };
        if racing {
            self.race_suppressed = true;
            self.last_clear = Some(cycle);
        }
        racing
    }

    /// Is VBlank currently active, ignoring race suppression (used by dot
    /// logic that needs the "real" flag rather than what $2002 reports).
    #[must_use]
    pub fn is_active(&self) -> bool {
        match (self.last_set, self.last_clear) {
            (Some(set_at), Some(clear_at)) => set_at > clear_at,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    fn is_active_at(&self, cycle: u64) -> bool {
        match (self.last_set, self.last_clear) {
            (Some(set_at), Some(clear_at)) => set_at <= cycle && set_at > clear_at,
            (Some(set_at), None) => set_at <= cycle,
            (None, _) => false,
        }
    }

    /// Compute the NMI line level for this dot: VBlank active (and not
    /// race-suppressed) AND NMI generation enabled in PPUCTRL.
    #[must_use]
    pub fn nmi_line(&self, nmi_enabled: bool) -> bool {
        nmi_enabled && self.is_active() && !self.race_suppressed
    }
}
