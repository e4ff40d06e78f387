//! Wei → ETH → USD conversion on arbitrary-precision decimals.
//!
//! Amounts are always built from strings and never pass through `f64`:
//! Wei balances routinely carry more significant digits than a double can
//! hold. All rounding is half-up at a fixed number of fractional digits.

use crate::constants::{ETH_DISPLAY_DECIMALS, PLACEHOLDER, USD_DISPLAY_DECIMALS, WEI_DECIMALS};
use crate::errors::ConversionError;
use bigdecimal::num_bigint::BigInt;
use bigdecimal::{BigDecimal, RoundingMode, ToPrimitive, Zero};
use std::fmt;
use std::str::FromStr;

/// A validated ETH→USD rate. Always strictly positive.
#[derive(Debug, Clone, PartialEq)]
pub struct EthPrice {
    value: BigDecimal,
    raw: String,
}

impl EthPrice {
    /// Parses a rate as returned by the explorer. Returns `None` for
    /// non-numeric, zero or negative input.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let value = BigDecimal::from_str(trimmed).ok()?;
        if value <= BigDecimal::zero() {
            return None;
        }
        Some(Self {
            value,
            raw: trimmed.to_string(),
        })
    }

    pub fn as_decimal(&self) -> &BigDecimal {
        &self.value
    }

    /// Lossy, for display and metrics only.
    pub fn as_f64(&self) -> f64 {
        self.value.to_f64().unwrap_or_default()
    }
}

impl fmt::Display for EthPrice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Converts a base-10 Wei amount into ETH with exactly 6 fractional digits.
pub fn wei_to_eth(wei: &str) -> Result<String, ConversionError> {
    let wei = wei.trim();
    if wei.is_empty() || wei == "0" {
        return Ok(format_fixed(&BigDecimal::zero(), ETH_DISPLAY_DECIMALS));
    }
    if !wei.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ConversionError::InvalidInteger(wei.to_string()));
    }
    let units = BigInt::from_str(wei).map_err(|_| ConversionError::InvalidInteger(wei.to_string()))?;
    let eth = BigDecimal::new(units, WEI_DECIMALS);
    Ok(format_fixed(&eth, ETH_DISPLAY_DECIMALS))
}

/// Multiplies an ETH amount by the price and returns the separator-free USD
/// value with exactly 2 fractional digits.
pub fn eth_to_usd(eth: &str, price: &EthPrice) -> Result<String, ConversionError> {
    let eth = parse_amount(eth)?;
    let usd = eth * price.as_decimal();
    Ok(format_fixed(&usd, USD_DISPLAY_DECIMALS))
}

/// Sums formatted USD amounts. Separators are stripped; placeholders and
/// empty entries are skipped rather than counted as zero.
pub fn sum_usd<I, S>(values: I) -> Result<String, ConversionError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut total = BigDecimal::zero();
    for value in values {
        let value = value.as_ref().trim();
        if value.is_empty() || value == PLACEHOLDER {
            continue;
        }
        total += parse_amount(value)?;
    }
    Ok(format_fixed(&total, USD_DISPLAY_DECIMALS))
}

/// ETH amount as rows display it: 6 fractional digits with separators.
pub fn format_eth_display(eth: &str) -> Result<String, ConversionError> {
    let eth = parse_amount(eth)?;
    Ok(with_thousands_separators(&format_fixed(
        &eth,
        ETH_DISPLAY_DECIMALS,
    )))
}

/// Inserts `,` between groups of three integer digits. Display only.
pub fn with_thousands_separators(plain: &str) -> String {
    let (sign, unsigned) = match plain.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", plain),
    };
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((int_part, frac_part)) => (int_part, Some(frac_part)),
        None => (unsigned, None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    match frac_part {
        Some(frac) => format!("{sign}{grouped}.{frac}"),
        None => format!("{sign}{grouped}"),
    }
}

/// Parses a decimal amount, tolerating thousands separators.
fn parse_amount(value: &str) -> Result<BigDecimal, ConversionError> {
    let cleaned: String = value.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return Err(ConversionError::InvalidDecimal(value.to_string()));
    }
    BigDecimal::from_str(&cleaned).map_err(|_| ConversionError::InvalidDecimal(value.to_string()))
}

/// Rounds half-up to `places` fractional digits and renders the digits
/// without going through `BigDecimal`'s `Display`, which may switch to
/// exponent notation.
fn format_fixed(value: &BigDecimal, places: i64) -> String {
    let rounded = value.with_scale_round(places, RoundingMode::HalfUp);
    let (units, scale) = rounded.as_bigint_and_exponent();
    debug_assert_eq!(scale, places);

    let negative = units < BigInt::zero();
    let mut digits = units.magnitude().to_string();
    let places = places.max(0) as usize;
    if digits.len() <= places {
        digits = format!("{}{}", "0".repeat(places + 1 - digits.len()), digits);
    }

    let split = digits.len() - places;
    let (int_part, frac_part) = digits.split_at(split);
    let sign = if negative { "-" } else { "" };
    if places == 0 {
        format!("{sign}{int_part}")
    } else {
        format!("{sign}{int_part}.{frac_part}")
    }
}
