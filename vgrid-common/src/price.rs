//! Fixed-point price conversion
//!
//! Prices travel on the wire as rationals (`price_per_unit /
//! pixels_per_unit`) but are stored and compared as i64 fixed-point values:
//! `floor(price_per_unit * PRICE_SCALE / pixels_per_unit)`. Round-tripping
//! through this conversion is the canonical comparison basis for the
//! working-set price filter.

use crate::net::PriceInfo;
use crate::{Error, Result};
use num_rational::Rational64;

/// Scaling factor applied when flattening a rational price to i64.
pub const PRICE_SCALE: i64 = 1000;

/// Convert a rational price to its i64 fixed-point image.
pub fn price_to_fixed(price: Rational64) -> Result<i64> {
    let scaled = i128::from(*price.numer()) * i128::from(PRICE_SCALE);
    let fixed = scaled.div_euclid(i128::from(*price.denom()));
    i64::try_from(fixed)
        .map_err(|_| Error::InvalidInput(format!("price {price} overflows fixed-point range")))
}

/// Wire price as a rational, rejecting nonsensical denominators.
pub fn info_price(info: &PriceInfo) -> Result<Rational64> {
    if info.pixels_per_unit <= 0 {
        return Err(Error::InvalidInput(format!(
            "pixels_per_unit must be positive, got {}",
            info.pixels_per_unit
        )));
    }
    Ok(Rational64::new(info.price_per_unit, info.pixels_per_unit))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_to_fixed() {
        assert_eq!(price_to_fixed(Rational64::new(1, 1)).unwrap(), 1000);
        assert_eq!(price_to_fixed(Rational64::new(999, 1)).unwrap(), 999_000);
        assert_eq!(price_to_fixed(Rational64::new(1, 3)).unwrap(), 333);
        assert_eq!(price_to_fixed(Rational64::new(0, 1)).unwrap(), 0);
    }

    #[test]
    fn test_price_to_fixed_overflow() {
        assert!(price_to_fixed(Rational64::new(i64::MAX, 1)).is_err());
    }

    #[test]
    fn test_info_price_rejects_bad_denominator() {
        let info = PriceInfo {
            price_per_unit: 5,
            pixels_per_unit: 0,
        };
        assert!(info_price(&info).is_err());
    }

    #[test]
    fn test_fixed_point_is_comparison_basis() {
        // 10/3 and 3333/1000 flatten to the same fixed-point image.
        let a = price_to_fixed(Rational64::new(10, 3)).unwrap();
        let b = price_to_fixed(Rational64::new(3333, 1000)).unwrap();
        assert_eq!(a, b);
    }
}
