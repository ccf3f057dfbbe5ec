//! Wire-decimal to fixed-point scaling.
//!
//! Venues report prices and amounts as plain decimals in their own units;
//! internally Coral works on scaled fixed-point values. [`ScaleCodec`]
//! applies a per-venue integer scale factor, fixed at construction:
//!
//! - quantities scale *up*: `internal = wire * factor`, rounded to the
//!   nearest whole internal unit;
//! - prices scale *down*: `internal = wire / factor`.
//!
//! The module also owns the exponential-safe decimal parser. Small
//! magnitudes (fees in particular) can arrive in scientific notation
//! (`1.2e-6`) and must be normalized to fixed point before use.

use crate::types::{Price, Quantity};

/// Upper bound on stored decimal places. Divisions by non-power-of-ten
/// factors round at this precision.
pub const MAX_SCALE: u8 = 12;

/// Errors from decimal parsing and codec construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScaleError {
    /// The scale factor must be a positive integer.
    #[error("invalid scale factor {0}: must be at least 1")]
    BadFactor(u32),
    /// The input is not a decimal number.
    #[error("unparseable decimal {0:?}")]
    BadDecimal(String),
    /// The value does not fit the fixed-point range.
    #[error("decimal {0:?} overflows the fixed-point range")]
    Overflow(String),
}

/// Parse a wire decimal into a [`Price`].
///
/// Accepts plain (`432.72`), signed (`-0.04`), and exponential (`1.2e-6`)
/// forms; surrounding whitespace is ignored (some venues pad positional
/// fields).
pub fn parse_price(raw: &str) -> Result<Price, ScaleError> {
    let (mantissa, scale) = parse_parts(raw)?;
    Ok(Price::new(mantissa, scale))
}

/// Parse a wire decimal into a [`Quantity`]. Sign is preserved.
pub fn parse_quantity(raw: &str) -> Result<Quantity, ScaleError> {
    let (mantissa, scale) = parse_parts(raw)?;
    Ok(Quantity::new(mantissa, scale))
}

/// Exponential-safe decimal parse into `(mantissa, scale)`.
fn parse_parts(raw: &str) -> Result<(i64, u8), ScaleError> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(ScaleError::BadDecimal(raw.to_string()));
    }

    let (number, exponent) = match s.find(['e', 'E']) {
        Some(pos) => {
            let exp: i32 = s[pos + 1..]
                .parse()
                .map_err(|_| ScaleError::BadDecimal(raw.to_string()))?;
            (&s[..pos], exp)
        }
        None => (s, 0),
    };

    let (sign, digits) = match number.as_bytes().first() {
        Some(b'-') => (-1i128, &number[1..]),
        Some(b'+') => (1, &number[1..]),
        _ => (1, number),
    };

    let (int_part, frac_part) = match digits.find('.') {
        Some(pos) => (&digits[..pos], &digits[pos + 1..]),
        None => (digits, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(ScaleError::BadDecimal(raw.to_string()));
    }
    if !int_part.bytes().all(|b| b.is_ascii_digit())
        || !frac_part.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(ScaleError::BadDecimal(raw.to_string()));
    }

    let mut mantissa: i128 = 0;
    for b in int_part.bytes().chain(frac_part.bytes()) {
        mantissa = mantissa
            .checked_mul(10)
            .and_then(|m| m.checked_add((b - b'0') as i128))
            .ok_or_else(|| ScaleError::Overflow(raw.to_string()))?;
    }
    mantissa *= sign;

    let mut scale = frac_part.len() as i32 - exponent;
    if scale < 0 {
        let factor = 10i128
            .checked_pow((-scale) as u32)
            .ok_or_else(|| ScaleError::Overflow(raw.to_string()))?;
        mantissa = mantissa
            .checked_mul(factor)
            .ok_or_else(|| ScaleError::Overflow(raw.to_string()))?;
        scale = 0;
    }
    if scale > MAX_SCALE as i32 {
        mantissa = div_round(mantissa, 10i128.pow((scale - MAX_SCALE as i32) as u32));
        scale = MAX_SCALE as i32;
    }

    let mantissa = i64::try_from(mantissa).map_err(|_| ScaleError::Overflow(raw.to_string()))?;
    Ok((mantissa, scale as u8))
}

/// Sign-aware division rounding half away from zero.
fn div_round(num: i128, den: i128) -> i128 {
    let half = den / 2;
    if num >= 0 {
        (num + half) / den
    } else {
        (num - half) / den
    }
}

/// Per-venue scaling codec. The factor is fixed at construction and never
/// mutated afterwards.
#[derive(Debug, Clone, Copy)]
pub struct ScaleCodec {
    factor: u32,
    /// `Some(k)` when `factor == 10^k`; exact scale-shifting applies.
    shift: Option<u8>,
}

impl ScaleCodec {
    /// Create a codec for the given integer scale factor.
    pub fn new(factor: u32) -> Result<Self, ScaleError> {
        if factor == 0 {
            return Err(ScaleError::BadFactor(factor));
        }
        Ok(Self {
            factor,
            shift: pow10_exponent(factor),
        })
    }

    /// The venue scale factor.
    #[inline]
    pub const fn factor(&self) -> u32 {
        self.factor
    }

    /// Wire amount to internal units: `wire * factor`, rounded to the
    /// nearest whole unit. Sign is preserved.
    pub fn scale_quantity(&self, wire: Quantity) -> Quantity {
        let num = wire.mantissa() as i128 * self.factor as i128;
        let den = 10i128.pow(wire.scale() as u32);
        Quantity::new(div_round(num, den) as i64, 0)
    }

    /// Internal units back to a wire amount: `internal / factor`.
    pub fn unscale_quantity(&self, internal: Quantity) -> Quantity {
        match self.shift {
            Some(k) => Quantity::new(internal.mantissa(), internal.scale() + k),
            None => {
                let pad = 10i128.pow((MAX_SCALE - internal.scale().min(MAX_SCALE)) as u32);
                let m = div_round(internal.mantissa() as i128 * pad, self.factor as i128);
                Quantity::new(m as i64, MAX_SCALE)
            }
        }
    }

    /// Wire price to internal: `wire / factor`.
    pub fn scale_price(&self, wire: Price) -> Price {
        match self.shift {
            Some(k) => Price::new(wire.mantissa(), wire.scale() + k),
            None => {
                let pad = 10i128.pow((MAX_SCALE - wire.scale().min(MAX_SCALE)) as u32);
                let m = div_round(wire.mantissa() as i128 * pad, self.factor as i128);
                Price::new(m as i64, MAX_SCALE)
            }
        }
    }

    /// Internal price back to wire: `internal * factor`.
    pub fn unscale_price(&self, internal: Price) -> Price {
        match self.shift {
            Some(k) if internal.scale() >= k => {
                Price::new(internal.mantissa(), internal.scale() - k)
            }
            Some(k) => {
                let factor = 10i64.pow((k - internal.scale()) as u32);
                Price::new(
                    internal
                        .mantissa()
                        .checked_mul(factor)
                        .expect("ScaleCodec::unscale_price overflow"),
                    0,
                )
            }
            None => Price::new(
                internal
                    .mantissa()
                    .checked_mul(self.factor as i64)
                    .expect("ScaleCodec::unscale_price overflow"),
                internal.scale(),
            ),
        }
    }
}

/// `Some(k)` if `n == 10^k`.
fn pow10_exponent(n: u32) -> Option<u8> {
    let mut v = n;
    let mut k = 0u8;
    while v % 10 == 0 {
        v /= 10;
        k += 1;
    }
    (v == 1).then_some(k)
}
