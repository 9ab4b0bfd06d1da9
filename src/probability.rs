//! Fingerprint collision probability estimates
//!
//! States are deduplicated by 64-bit fingerprint, so two distinct states with
//! the same fingerprint make the checker skip part of the state space. This
//! module estimates the chance that happened:
//!
//! - **optimistic**: `distinct * (generated - distinct) / 2^64`, assuming
//!   fingerprints are uniformly distributed
//! - **observed**: `1 / d`, where `d` is the smallest gap between any two
//!   fingerprints actually stored in the seen-set
//!
//! Estimates are rendered with a fixed number of significant digits.

/// 2^64 as a float
const FINGERPRINT_SPACE: f64 = 18_446_744_073_709_551_616.0;

/// Significant digits kept by the observed estimate
const OBSERVED_DIGITS: u32 = 2;

/// Smallest integer with `OBSERVED_DIGITS` digits
const TWO_DIGIT_FLOOR: u128 = 10u128.pow(OBSERVED_DIGITS - 1);

/// A pair of collision estimates for a finished run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionEstimate {
    /// Estimate from the birthday bound
    pub optimistic: f64,

    /// Estimate from the observed minimum fingerprint distance
    pub observed: Option<f64>,
}

impl CollisionEstimate {
    /// Render both estimates to `significant_digits` digits
    pub fn render(&self, significant_digits: usize) -> (String, Option<String>) {
        (
            render(self.optimistic, significant_digits),
            self.observed.map(|p| render(p, significant_digits)),
        )
    }
}

/// Probability that a collision was missed, assuming uniform fingerprints
pub fn optimistic_probability(distinct: u64, generated: u64) -> f64 {
    let duplicates = generated.saturating_sub(distinct);
    distinct as f64 * (duplicates as f64 / FINGERPRINT_SPACE)
}

/// `1 / actual_distance`, rounded half-up to two significant digits
///
/// The division is exact: the two leading digits are computed in integer
/// arithmetic before converting to a float. Returns `None` for a zero
/// distance.
pub fn observed_probability(actual_distance: u64) -> Option<f64> {
    if actual_distance == 0 {
        return None;
    }

    let divisor = actual_distance as u128;
    let mut numerator: u128 = 1;
    let mut scale: u32 = 0;
    while numerator / divisor < TWO_DIGIT_FLOOR {
        numerator *= 10;
        scale += 1;
    }

    let mut digits = numerator / divisor;
    if (numerator % divisor) * 2 >= divisor {
        digits += 1;
    }
    // Rounding carried into a third digit
    if digits == TWO_DIGIT_FLOOR * 10 {
        digits = TWO_DIGIT_FLOOR;
        scale -= 1;
    }

    format!("{digits}e-{scale}").parse().ok()
}

/// Estimate collision probabilities for a run
///
/// When nothing was generated both estimates are exactly zero.
pub fn estimate(distinct: u64, generated: u64, actual_distance: Option<u64>) -> CollisionEstimate {
    if distinct == 0 && generated == 0 {
        return CollisionEstimate {
            optimistic: 0.0,
            observed: Some(0.0),
        };
    }

    CollisionEstimate {
        optimistic: optimistic_probability(distinct, generated),
        observed: actual_distance.and_then(observed_probability),
    }
}

/// Render a probability to `significant_digits` significant digits
///
/// The value is first written in its shortest round-trip form using the
/// layout `[d]*[.[d]+[E[+|-][d]+]]`. Leading zeros are dropped, the digit
/// after the last kept one rounds half-up (carrying through `9`s and adding a
/// leading `1` if needed), and any exponent is copied verbatim. Strings that
/// do not fit that layout, such as negative values, are returned unchanged.
pub fn render(val: f64, significant_digits: usize) -> String {
    if val == 0.0 {
        return "0.0".to_string();
    }

    let text = shortest_decimal(val);
    let src = text.as_bytes();
    let len = src.len();
    let mut out: Vec<u8> = Vec::with_capacity(len + 1);
    let mut next = 0;
    let mut found = 0;

    while next < len && src[next] == b'0' {
        next += 1;
    }
    while next < len && src[next].is_ascii_digit() {
        out.push(src[next]);
        found += 1;
        next += 1;
    }

    if next == len {
        return ascii(out);
    }
    if src[next] != b'.' {
        return text;
    }

    next += 1;
    if found >= significant_digits {
        while next < len && src[next].is_ascii_digit() {
            next += 1;
        }
    } else {
        out.push(b'.');
        if found == 0 {
            while next < len && src[next] == b'0' {
                out.push(b'0');
                next += 1;
            }
        }
        while next < len && src[next].is_ascii_digit() && found < significant_digits {
            out.push(src[next]);
            found += 1;
            next += 1;
        }
        if next < len && src[next].is_ascii_digit() && src[next] >= b'5' {
            carry(&mut out);
        }
        while next < len && src[next].is_ascii_digit() {
            next += 1;
        }
    }

    if next >= len {
        return ascii(out);
    }
    if src[next] == b'E' {
        out.extend_from_slice(&src[next..]);
        return ascii(out);
    }
    text
}

/// Increment the decimal digits in `digits`, skipping the point
fn carry(digits: &mut Vec<u8>) {
    for i in (0..digits.len()).rev() {
        match digits[i] {
            b'.' => continue,
            b'9' => digits[i] = b'0',
            d => {
                digits[i] = d + 1;
                return;
            }
        }
    }
    digits.insert(0, b'1');
}

fn ascii(bytes: Vec<u8>) -> String {
    bytes.into_iter().map(char::from).collect()
}

/// Shortest round-trip decimal form of `v`
///
/// Plain notation with at least one fractional digit for magnitudes in
/// `[1e-3, 1e7)`, otherwise `d.dddE±n`.
fn shortest_decimal(v: f64) -> String {
    if v.is_nan() {
        return "NaN".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }

    let magnitude = v.abs();
    if (1e-3..1e7).contains(&magnitude) {
        let plain = format!("{v}");
        if plain.contains('.') {
            plain
        } else {
            format!("{plain}.0")
        }
    } else {
        let scientific = format!("{v:e}");
        let (mantissa, exponent) = scientific.split_once('e').unwrap_or((&scientific, "0"));
        if mantissa.contains('.') {
            format!("{mantissa}E{exponent}")
        } else {
            format!("{mantissa}.0E{exponent}")
        }
    }
}
