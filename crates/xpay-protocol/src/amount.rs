//! Amount and identity normalization for the outbound payload.

use crate::error::XpayError;

/// Convert a decimal order total into an integer number of minor currency
/// units: multiply by 100 and truncate. `19.999` is 1999 minor units, not
/// 2000 — the partner protocol truncates, it never rounds up.
///
/// Parsed digit-wise so binary floating point can never shave a cent off
/// totals like `4.56`.
pub fn minor_units(total: &str) -> Result<i64, XpayError> {
    let total = total.trim();
    let (int_part, frac_part) = match total.split_once('.') {
        Some((i, f)) => (i, f),
        None => (total, ""),
    };

    if int_part.is_empty() && frac_part.is_empty() {
        return Err(XpayError::Validation("empty amount".to_string()));
    }
    if !int_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
    {
        return Err(XpayError::Validation(format!("malformed amount: {total}")));
    }

    let whole: i64 = if int_part.is_empty() {
        0
    } else {
        int_part
            .parse()
            .map_err(|_| XpayError::Validation(format!("amount out of range: {total}")))?
    };

    // First two fraction digits are the cents; anything beyond is truncated.
    let mut cents = 0i64;
    for (i, c) in frac_part.chars().take(2).enumerate() {
        let d = i64::from(c.to_digit(10).unwrap_or(0));
        cents += d * if i == 0 { 10 } else { 1 };
    }

    whole
        .checked_mul(100)
        .and_then(|w| w.checked_add(cents))
        .ok_or_else(|| XpayError::Validation(format!("amount out of range: {total}")))
}

/// Strip the formatting characters the partner rejects in phone numbers.
pub fn normalize_phone(phone: &str) -> String {
    phone
        .chars()
        .filter(|c| !matches!(c, '+' | '-' | '(' | ')'))
        .collect()
}
