use alloy::primitives::{
    U256,
    utils::{UnitsError, format_units, parse_units},
};

/// Decimals assumed for every token handled by the tools, native BTC included.
// TODO: read `decimals()` from the token contract once non-18-decimal tokens are listed.
pub const TOKEN_DECIMALS: u8 = 18;

#[derive(Debug, thiserror::Error)]
pub enum AmountError {
    #[error(transparent)]
    Units(#[from] UnitsError),

    #[error("more than {} decimal places", TOKEN_DECIMALS)]
    TooPrecise,

    #[error("amount must be greater than zero")]
    NotPositive,
}

/// Converts a decimal amount string, e.g. "1.5", to base units.
///
/// The conversion is exact: "1.5" becomes 1.5 * 10^18. Amounts with more
/// than [`TOKEN_DECIMALS`] fraction digits, zero and negative amounts are rejected.
pub fn to_base_units(amount: &str) -> Result<U256, AmountError> {
    let amount = amount.trim();
    if amount.is_empty() {
        return Err(UnitsError::InvalidUnit(amount.to_string()).into());
    }
    if let Some((_, fraction)) = amount.split_once('.') {
        if fraction.len() > TOKEN_DECIMALS as usize {
            return Err(AmountError::TooPrecise);
        }
    }
    let value = parse_units(amount, TOKEN_DECIMALS)?;
    let abs = value.get_absolute();
    if value.is_negative() || abs.is_zero() {
        return Err(AmountError::NotPositive);
    }
    Ok(abs)
}

/// Formats base units as a decimal string without trailing zeros, e.g. "0.5".
pub fn format_base_units(value: U256) -> String {
    match format_units(value, TOKEN_DECIMALS) {
        Ok(s) => trim_decimal(&s),
        Err(_) => value.to_string(),
    }
}

fn trim_decimal(s: &str) -> String {
    if !s.contains('.') {
        return s.to_string();
    }
    let s = s.trim_end_matches('0');
    s.strip_suffix('.').unwrap_or(s).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_base_units() {
        assert_eq!(
            to_base_units("1.5").unwrap(),
            U256::from(1_500_000_000_000_000_000u128)
        );
        assert_eq!(to_base_units(" 2 ").unwrap(), U256::from(2_000_000_000_000_000_000u128));
        assert_eq!(to_base_units("0.000000000000001").unwrap(), U256::from(1000u64));
        assert_eq!(
            to_base_units("123456789.123456789123456789").unwrap(),
            U256::from(123_456_789_123_456_789_123_456_789u128)
        );
        assert!(to_base_units("0.000000000000000001").is_ok());
        assert!(matches!(
            to_base_units("0.0000000000000000009"),
            Err(AmountError::TooPrecise)
        ));
        assert!(matches!(to_base_units("0"), Err(AmountError::NotPositive)));
        assert!(matches!(to_base_units("0.000"), Err(AmountError::NotPositive)));
        assert!(to_base_units("-1").is_err());
        assert!(to_base_units("abc").is_err());
        assert!(to_base_units("").is_err());
    }

    #[test]
    fn test_format_base_units() {
        assert_eq!(format_base_units(U256::from(500_000_000_000_000_000u128)), "0.5");
        assert_eq!(format_base_units(U256::from(2_000_000_000_000_000_000u128)), "2");
        assert_eq!(format_base_units(U256::ZERO), "0");
    }
}
