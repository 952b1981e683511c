//! Conversion between numeric amounts and their currency-formatted storage form.
//!
//! Postgres renders `money` as `$1,234.56` or `-$5.68`; the SQLite and
//! in-memory backends persist the same shape produced by [`format_money`].

use std::str::FromStr;

use rust_decimal::Decimal;
use thiserror::Error;

pub const CURRENCY_SYMBOL: char = '$';

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MoneyError {
    #[error("empty money amount")]
    Empty,
    #[error("malformed money amount {0:?}")]
    Malformed(String),
    #[error("money amount {0} is not finite")]
    NotFinite(f64),
}

fn split_sign(s: &str) -> (bool, &str) {
    if let Some(rest) = s.strip_prefix('-') {
        (true, rest)
    } else if let Some(rest) = s.strip_prefix('+') {
        (false, rest)
    } else {
        (false, s)
    }
}

/// Parses a currency-formatted amount such as `$105.35`, `-$5.68` or `$-5.68`.
///
/// The currency symbol and digit group separators are optional.
pub fn parse_money(raw: &str) -> Result<f64, MoneyError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(MoneyError::Empty);
    }

    let (mut negative, rest) = split_sign(trimmed);
    let rest = rest.strip_prefix(CURRENCY_SYMBOL).unwrap_or(rest);
    let rest = if negative {
        rest
    } else {
        let (after_symbol, rest) = split_sign(rest);
        negative = after_symbol;
        rest
    };

    let digits: String = rest.chars().filter(|c| *c != ',').collect();
    if digits.is_empty() {
        return Err(MoneyError::Empty);
    }
    // Plain positional notation only: no exponent, no inf/nan, a single point.
    let well_formed = digits.chars().all(|c| c.is_ascii_digit() || c == '.')
        && digits.chars().filter(|c| *c == '.').count() <= 1
        && digits.chars().any(|c| c.is_ascii_digit());
    if !well_formed {
        return Err(MoneyError::Malformed(raw.to_string()));
    }

    let value: f64 = digits
        .parse()
        .map_err(|_| MoneyError::Malformed(raw.to_string()))?;
    if !value.is_finite() {
        return Err(MoneyError::Malformed(raw.to_string()));
    }

    Ok(if negative { -value } else { value })
}

/// Renders an amount with a leading currency symbol, sign first: `-$5.68`.
pub fn format_money(amount: f64) -> Result<String, MoneyError> {
    if !amount.is_finite() {
        return Err(MoneyError::NotFinite(amount));
    }
    if amount.is_sign_negative() && amount != 0.0 {
        Ok(format!("-{}{}", CURRENCY_SYMBOL, -amount))
    } else {
        Ok(format!("{}{}", CURRENCY_SYMBOL, amount.abs()))
    }
}

/// Exact decimal form of an amount, using its shortest round-trip representation.
pub fn to_decimal(amount: f64) -> Result<Decimal, MoneyError> {
    if !amount.is_finite() {
        return Err(MoneyError::NotFinite(amount));
    }
    Decimal::from_str(&amount.to_string()).map_err(|_| MoneyError::Malformed(amount.to_string()))
}
