use fixed::types::I32F32;

/// Q32.32 fixed-point: 32 integer bits, 32 fractional bits.
pub type Fixed64 = I32F32;

/// Elapsed simulation time in seconds. Fixed-point so that two hosts
/// stepping the same world compute identical per-tick transfer caps.
pub type Seconds = Fixed64;

/// Ticks are the atomic unit of simulation time.
pub type Ticks = u64;

/// Stored or transferred electrical energy. Always non-negative.
pub type Power = u64;

/// Convert an f64 to Fixed64. Use only for initialization, never in sim loop.
#[inline]
pub fn f64_to_fixed64(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

/// Convert Fixed64 to f64. Use only for display, never in sim loop.
#[inline]
pub fn fixed64_to_f64(v: Fixed64) -> f64 {
    v.to_num::<f64>()
}

/// Build a [`Seconds`] value from a float. Same caveats as [`f64_to_fixed64`].
#[inline]
pub fn seconds(v: f64) -> Seconds {
    f64_to_fixed64(v)
}

/// Scale a per-second rate to the amount allowed over `dt`, rounding half
/// up. Works on the raw fixed-point bits so rates above the Fixed64 integer
/// range do not saturate early. Non-positive `dt` yields 0.
pub fn scale_rate(rate: Power, dt: Seconds) -> Power {
    if dt <= Fixed64::ZERO {
        return 0;
    }
    let bits = dt.to_bits() as u128;
    let frac = I32F32::FRAC_NBITS;
    let scaled = (rate as u128 * bits + (1u128 << (frac - 1))) >> frac;
    u64::try_from(scaled).unwrap_or(Power::MAX)
}
