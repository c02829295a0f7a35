use fixed::types::I32F32;

/// Q32.32 fixed-point: 32 integer bits, 32 fractional bits.
pub type Fixed64 = I32F32;

/// An ingredient quantity. Fractional amounts are allowed.
pub type Amount = Fixed64;

/// A duration in simulated seconds.
pub type Seconds = Fixed64;

/// Ticks count whole simulation steps.
pub type Ticks = u64;

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

/// Sum a sequence of fixed-point values, saturating instead of overflowing.
#[inline]
pub fn saturating_sum<I: IntoIterator<Item = Fixed64>>(values: I) -> Fixed64 {
    values
        .into_iter()
        .fold(Fixed64::ZERO, |acc, v| acc.saturating_add(v))
}
