//! Pure arithmetic cores for ALU and read-modify-write instructions.
//!
//! `Cpu::execute_rmw_instruction` and `Cpu::do_adc`/`do_sbc` need the new register/flag
//! state before they touch `self`. These functions compute that state as a `Delta`
//! from plain inputs, with no access to `Cpu`, so the arithmetic itself is trivial to
//! reason about and test in isolation from the state machine that drives it.

/// Result of an ALU or RMW operation: the value to store, plus any flag changes.
///
/// `carry`/`overflow` are `None` when the operation leaves that flag untouched
/// (INC/DEC never touch carry; BIT-style ops aren't expressed here at all).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Delta {
    /// Value to write back to memory or a register.
    pub result: u8,
    /// New carry flag state, if this operation affects carry.
    pub carry: Option<bool>,
    /// New overflow flag state, if this operation affects overflow.
    pub overflow: Option<bool>,
}

impl Delta {
    fn value(result: u8) -> Self {
        Self { result, carry: None, overflow: None }
    }

    fn with_carry(result: u8, carry: bool) -> Self {
        Self { result, carry: Some(carry), overflow: None }
    }
}

/// ASL - shift left, old bit 7 becomes carry.
#[must_use]
pub fn asl(value: u8) -> Delta {
    Delta::with_carry(value << 1, value & 0x80 != 0)
}

/// LSR - shift right, old bit 0 becomes carry.
#[must_use]
pub fn lsr(value: u8) -> Delta {
    Delta::with_carry(value >> 1, value & 0x01 != 0)
}

/// ROL - rotate left through carry.
#[must_use]
pub fn rol(value: u8, carry_in: bool) -> Delta {
    Delta::with_carry((value << 1) | u8::from(carry_in), value & 0x80 != 0)
}

/// ROR - rotate right through carry.
#[must_use]
pub fn ror(value: u8, carry_in: bool) -> Delta {
    Delta::with_carry((value >> 1) | (u8::from(carry_in) << 7), value & 0x01 != 0)
}

/// INC - wrapping increment. Does not affect carry.
#[must_use]
pub fn inc(value: u8) -> Delta {
    Delta::value(value.wrapping_add(1))
}

/// DEC - wrapping decrement. Does not affect carry.
#[must_use]
pub fn dec(value: u8) -> Delta {
    Delta::value(value.wrapping_sub(1))
}

/// ADC - add with carry, producing the new accumulator, carry, and overflow.
///
/// SBC is ADC with the operand's bits inverted (`!value`), so it reuses this directly.
#[must_use]
pub fn adc(a: u8, value: u8, carry_in: bool) -> Delta {
    let sum = u16::from(a) + u16::from(value) + u16::from(carry_in);
    let result = sum as u8;
    let overflow = (!(a ^ value) & (a ^ result)) & 0x80 != 0;
    Delta {
        result,
        carry: Some(sum > 0xFF),
        overflow: Some(overflow),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asl_carry_out() {
        let d = asl(0x80);
        assert_eq!(d.result, 0x00);
        assert_eq!(d.carry, Some(true));
    }

    #[test]
    fn test_lsr_carry_out() {
        let d = lsr(0x01);
        assert_eq!(d.result, 0x00);
        assert_eq!(d.carry, Some(true));
    }

    #[test]
    fn test_rol_carry_in_out() {
        let d = rol(0x80, true);
        assert_eq!(d.result, 0x01);
        assert_eq!(d.carry, Some(true));
    }

    #[test]
    fn test_ror_carry_in_out() {
        let d = ror(0x01, true);
        assert_eq!(d.result, 0x80);
        assert_eq!(d.carry, Some(true));
    }

    #[test]
    fn test_inc_wraps() {
        assert_eq!(inc(0xFF).result, 0x00);
        assert_eq!(inc(0xFF).carry, None);
    }

    #[test]
    fn test_dec_wraps() {
        assert_eq!(dec(0x00).result, 0xFF);
    }

    #[test]
    fn test_adc_overflow() {
        // 0x50 + 0x50 = 0xA0, signed overflow (positive + positive = negative)
        let d = adc(0x50, 0x50, false);
        assert_eq!(d.result, 0xA0);
        assert_eq!(d.overflow, Some(true));
        assert_eq!(d.carry, Some(false));
    }

    #[test]
    fn test_adc_carry_no_overflow() {
        let d = adc(0xFF, 0x02, false);
        assert_eq!(d.result, 0x01);
        assert_eq!(d.carry, Some(true));
        assert_eq!(d.overflow, Some(false));
    }

    #[test]
    fn test_sbc_via_inverted_operand() {
        // 0x10 - 0x01 with carry set (no borrow) == adc(0x10, !0x01, true)
        let d = adc(0x10, !0x01u8, true);
        assert_eq!(d.result, 0x0F);
        assert_eq!(d.carry, Some(true));
    }
}
