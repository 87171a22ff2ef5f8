//! Rate parsing and unit conversions.
//!
//! All arithmetic is done with fixed-precision decimals; integer
//! smallest-unit amounts (satoshis, gwei, droplets) appear only at the
//! boundaries.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

use crate::entities::CoinType;

/// Satoshis per BTC.
pub const SATOSHIS_PER_BTC: i64 = 100_000_000;
/// Droplets per SKY.
pub const DROPLETS_PER_SKY: i64 = 1_000_000;
/// Largest number of decimal places a SKY amount may carry on-chain.
pub const MAX_DROPLET_PRECISION: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateError {
    #[error("rate is not a valid number: {0}")]
    Invalid(String),
    #[error("rate denominator is zero")]
    ZeroDenominator,
    #[error("rate must be greater than zero")]
    NotPositive,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConvertError {
    #[error(transparent)]
    Rate(#[from] RateError),
    #[error("calculated amount is negative")]
    Negative,
    #[error("calculated amount does not fit the target integer type")]
    Overflow,
}

/// Parse a configured exchange rate.
///
/// Accepts an integer ("100"), a decimal ("0.5") or a rational fraction
/// ("1/2"). The rate must be strictly positive.
pub fn parse_rate(rate: &str) -> Result<Decimal, RateError> {
    let rate = rate.trim();

    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let num = parse_decimal(num)?;
            let den = parse_decimal(den)?;
            if den.is_zero() {
                return Err(RateError::ZeroDenominator);
            }
            num.checked_div(den).ok_or(RateError::ZeroDenominator)?
        }
        None => parse_decimal(rate)?,
    };

    if value <= Decimal::ZERO {
        return Err(RateError::NotPositive);
    }

    Ok(value)
}

fn parse_decimal(s: &str) -> Result<Decimal, RateError> {
    Decimal::from_str(s.trim()).map_err(|_| RateError::Invalid(s.trim().to_string()))
}

/// Convert a deposit value in its chain's smallest unit into droplets to
/// send, applying the configured rate and truncating the whole-SKY amount
/// to `max_decimals` places.
pub fn calculate_sky_value(
    value: i64,
    coin_type: CoinType,
    rate: &str,
    max_decimals: u32,
) -> Result<u64, ConvertError> {
    if value < 0 {
        return Err(ConvertError::Negative);
    }

    let rate = parse_rate(rate)?;
    let amount = Decimal::new(value, coin_type.unit_exponent());
    let sky = amount
        .checked_mul(rate)
        .ok_or(ConvertError::Overflow)?
        .trunc_with_scale(max_decimals);

    let droplets = sky
        .checked_mul(Decimal::from(DROPLETS_PER_SKY))
        .ok_or(ConvertError::Overflow)?
        .trunc();

    if droplets.is_sign_negative() {
        return Err(ConvertError::Negative);
    }

    droplets.to_u64().ok_or(ConvertError::Overflow)
}

/// Convert satoshis into the BTC amount to request on the exchange,
/// truncated to the trade pair's price precision.
pub fn calculate_requested_amount(satoshis: i64, price_precision: u32) -> Decimal {
    Decimal::new(satoshis, 8).trunc_with_scale(price_precision)
}

/// Droplets bought for a completed order's whole-SKY amount.
pub fn calculate_sky_bought(completed_amount: Decimal) -> Result<u64, ConvertError> {
    let droplets = completed_amount
        .checked_mul(Decimal::from(DROPLETS_PER_SKY))
        .ok_or(ConvertError::Overflow)?
        .trunc();

    if droplets.is_sign_negative() {
        return Err(ConvertError::Negative);
    }

    droplets.to_u64().ok_or(ConvertError::Overflow)
}

/// Satoshis spent for a completed order, `completed_amount * avg_price`.
///
/// This can be less than the amount requested, due to the minimum
/// purchasable unit on the exchange.
pub fn calculate_btc_spent(
    completed_amount: Decimal,
    avg_price: Decimal,
) -> Result<i64, ConvertError> {
    completed_amount
        .checked_mul(avg_price)
        .and_then(|btc| btc.checked_mul(Decimal::from(SATOSHIS_PER_BTC)))
        .ok_or(ConvertError::Overflow)?
        .trunc()
        .to_i64()
        .ok_or(ConvertError::Overflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rate_accepts_all_forms() {
        assert_eq!(parse_rate("100"), Ok(Decimal::from(100)));
        assert_eq!(parse_rate("0.5"), Ok(Decimal::new(5, 1)));
        assert_eq!(parse_rate("1/2"), Ok(Decimal::new(5, 1)));
        assert_eq!(parse_rate(" 3 / 4 "), Ok(Decimal::new(75, 2)));
    }

    #[test]
    fn parse_rate_rejects_bad_input() {
        assert!(matches!(parse_rate("abc"), Err(RateError::Invalid(_))));
        assert_eq!(parse_rate("1/0"), Err(RateError::ZeroDenominator));
        assert_eq!(parse_rate("0"), Err(RateError::NotPositive));
        assert_eq!(parse_rate("-1"), Err(RateError::NotPositive));
        assert!(matches!(parse_rate(""), Err(RateError::Invalid(_))));
    }

    #[test]
    fn sky_value_whole_btc() {
        // 1 BTC at rate 100 -> 100 SKY -> 100e6 droplets
        let droplets = calculate_sky_value(100_000_000, CoinType::Btc, "100", 3).unwrap();
        assert_eq!(droplets, 100_000_000);
    }

    #[test]
    fn sky_value_truncates_to_max_decimals() {
        // 0.001 BTC at rate 1/3 -> 0.000333... SKY, truncated to 0 at 3 decimals
        let droplets = calculate_sky_value(100_000, CoinType::Btc, "1/3", 3).unwrap();
        assert_eq!(droplets, 0);

        // 1 BTC at rate 1/3 -> 0.333 SKY at 3 decimals -> 333_000 droplets
        let droplets = calculate_sky_value(100_000_000, CoinType::Btc, "1/3", 3).unwrap();
        assert_eq!(droplets, 333_000);

        // same with no truncation beyond droplet resolution
        let droplets = calculate_sky_value(100_000_000, CoinType::Btc, "1/3", 6).unwrap();
        assert_eq!(droplets, 333_333);
    }

    #[test]
    fn sky_value_other_coins() {
        // 1 ETH (1e9 gwei) at rate 20 -> 20 SKY
        let droplets = calculate_sky_value(1_000_000_000, CoinType::Eth, "20", 3).unwrap();
        assert_eq!(droplets, 20_000_000);

        // 1 SKY-source (1e6 droplets) at rate 1 -> 1 SKY
        let droplets = calculate_sky_value(1_000_000, CoinType::Sky, "1", 3).unwrap();
        assert_eq!(droplets, 1_000_000);
    }

    #[test]
    fn sky_value_rejects_negative() {
        assert_eq!(
            calculate_sky_value(-1, CoinType::Btc, "100", 3),
            Err(ConvertError::Negative)
        );
    }

    #[test]
    fn requested_amount_truncates_to_precision() {
        // 12345678 satoshis = 0.12345678 BTC, truncated to 6 places
        let amount = calculate_requested_amount(12_345_678, 6);
        assert_eq!(amount.to_string(), "0.123456");
    }

    #[test]
    fn sky_bought_and_btc_spent() {
        let completed = Decimal::new(25, 1); // 2.5 SKY
        assert_eq!(calculate_sky_bought(completed), Ok(2_500_000));
        assert_eq!(
            calculate_sky_bought(Decimal::new(-1, 0)),
            Err(ConvertError::Negative)
        );

        let price = Decimal::new(2, 3); // 0.002 BTC/SKY
        assert_eq!(calculate_btc_spent(completed, price), Ok(500_000));
    }
}
