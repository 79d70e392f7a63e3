//! ============================================================================
//! Token Amounts - Exact integer/decimal conversions
//! ============================================================================
//! Raw amounts stay integers end to end. Conversion to a decimal value is a
//! string operation and threshold checks compare in raw units, so no float
//! ever touches a balance.
//! ============================================================================

use rust_decimal::Decimal;

/// Parse a ledger-reported raw amount. Only plain digit strings are accepted.
pub fn parse_raw_amount(amount: &str) -> Option<u128> {
    let amount = amount.trim();
    if amount.is_empty() || !amount.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    amount.parse::<u128>().ok()
}

/// Insert the decimal point `decimals` digits from the right and trim
/// trailing fractional zeros: (123456789, 6) -> "123.456789"
pub fn format_raw_amount(raw: u128, decimals: u8) -> String {
    let digits = raw.to_string();
    let scale = decimals as usize;
    if scale == 0 {
        return digits;
    }

    let padded = if digits.len() <= scale {
        format!("{}{}", "0".repeat(scale + 1 - digits.len()), digits)
    } else {
        digits
    };

    let (whole, fraction) = padded.split_at(padded.len() - scale);
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        whole.to_string()
    } else {
        format!("{}.{}", whole, fraction)
    }
}

/// Smallest raw amount that satisfies `threshold` at the given scale.
/// Fractional remainders round up; values too large for u128 saturate.
pub fn threshold_to_raw(threshold: Decimal, decimals: u8) -> u128 {
    if threshold <= Decimal::ZERO {
        return 0;
    }

    let mantissa = threshold.mantissa().unsigned_abs();
    let scale = threshold.scale();
    let decimals = decimals as u32;

    if decimals >= scale {
        10u128
            .checked_pow(decimals - scale)
            .and_then(|factor| mantissa.checked_mul(factor))
            .unwrap_or(u128::MAX)
    } else {
        // scale is at most 28, so the divisor always fits
        let divisor = 10u128.pow(scale - decimals);
        mantissa.div_ceil(divisor)
    }
}

/// raw / 10^decimals >= threshold, decided in raw units
pub fn meets_threshold(raw: u128, decimals: u8, threshold: Decimal) -> bool {
    raw >= threshold_to_raw(threshold, decimals)
}
