//! Conversions between human decimal amounts and on-chain base units.

use alloy::primitives::U256;
use rust_decimal::Decimal;

/// Convert base units to a human amount. `None` when the value does not fit a `Decimal`.
pub fn from_base_units(raw: U256, decimals: u8) -> Option<Decimal> {
    let value: i128 = i128::try_from(u128::try_from(raw).ok()?).ok()?;
    Decimal::try_from_i128_with_scale(value, u32::from(decimals))
        .ok()
        .map(|d| d.normalize())
}

/// Convert a human amount to base units, truncating excess precision.
///
/// Returns `None` for negative amounts or overflow.
pub fn to_base_units(amount: Decimal, decimals: u8) -> Option<U256> {
    if amount.is_sign_negative() {
        return None;
    }

    let mut scaled = amount.trunc_with_scale(u32::from(decimals));
    scaled.rescale(u32::from(decimals));
    if scaled.scale() != u32::from(decimals) {
        return None;
    }
    let mantissa = u128::try_from(scaled.mantissa()).ok()?;
    Some(U256::from(mantissa))
}
