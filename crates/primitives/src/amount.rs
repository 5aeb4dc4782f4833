//! Token amounts and the arithmetic applied to them on the way across the bridge.

use std::{fmt, io, str::FromStr};

use borsh::{BorshDeserialize, BorshSerialize};
use ethnum::U256;
use serde::{Deserialize, Serialize};

use crate::errors::ParseError;

/// A token amount in the smallest unit of its chain.
///
/// Serialized as a base-10 string in text formats and as 32 big-endian bytes in binary ones.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct Amount(U256);

impl Amount {
    /// Zero.
    pub const ZERO: Self = Self(U256::ZERO);

    /// Wraps a raw integer.
    pub const fn new(value: U256) -> Self {
        Self(value)
    }

    /// The underlying integer.
    pub const fn get(&self) -> U256 {
        self.0
    }

    /// Converts to `u64`, if it fits.
    pub fn to_u64(&self) -> Option<u64> {
        (self.0 <= U256::from(u64::MAX)).then(|| self.0.as_u64())
    }

    /// Big-endian 32-byte encoding.
    pub fn to_be_bytes(&self) -> [u8; 32] {
        self.0.to_be_bytes()
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Self(U256::from(value))
    }
}

impl From<U256> for Amount {
    fn from(value: U256) -> Self {
        Self(value)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for Amount {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseError::InvalidAmount(s.to_string()));
        }

        U256::from_str_radix(s, 10)
            .map(Self)
            .map_err(|_| ParseError::InvalidAmount(s.to_string()))
    }
}

impl TryFrom<String> for Amount {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Amount> for String {
    fn from(value: Amount) -> Self {
        value.to_string()
    }
}

impl BorshSerialize for Amount {
    fn serialize<W: io::Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.0.to_be_bytes())
    }
}

impl BorshDeserialize for Amount {
    fn deserialize_reader<R: io::Read>(reader: &mut R) -> io::Result<Self> {
        let bytes = <[u8; 32]>::deserialize_reader(reader)?;
        Ok(Self(U256::from_be_bytes(bytes)))
    }
}

/// Converts `amount` from `src_decimals` to `dst_decimals` precision.
///
/// Scaling down truncates. Returns `None` if scaling up overflows.
pub fn rescale(amount: Amount, src_decimals: u8, dst_decimals: u8) -> Option<Amount> {
    use std::cmp::Ordering;

    match src_decimals.cmp(&dst_decimals) {
        Ordering::Equal => Some(amount),
        Ordering::Less => {
            let factor = pow10(u32::from(dst_decimals - src_decimals))?;
            amount.0.checked_mul(factor).map(Amount)
        }
        Ordering::Greater => match pow10(u32::from(src_decimals - dst_decimals)) {
            Some(factor) => Some(Amount(amount.0 / factor)),
            // the divisor exceeds any representable amount
            None => Some(Amount::ZERO),
        },
    }
}

fn pow10(exp: u32) -> Option<U256> {
    U256::from(10u8).checked_pow(exp)
}

/// A commission rate, parsed from a non-negative decimal string such as `"0.001"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommissionRate {
    numerator: U256,
    scale: u32,
}

impl CommissionRate {
    /// No commission.
    pub const ZERO: Self = Self {
        numerator: U256::ZERO,
        scale: 0,
    };

    /// Splits `amount` into `(commission, remainder)` where the commission is truncated
    /// toward zero.
    pub fn apply(&self, amount: Amount) -> Option<(Amount, Amount)> {
        let divisor = pow10(self.scale)?;
        let commission = amount.0.checked_mul(self.numerator)? / divisor;
        let remainder = amount.0.checked_sub(commission)?;

        Some((Amount(commission), Amount(remainder)))
    }
}

impl FromStr for CommissionRate {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::InvalidRate(s.to_string());

        let (int, frac) = s.split_once('.').unwrap_or((s, ""));
        if int.is_empty() && frac.is_empty() {
            return Err(invalid());
        }

        let digits = format!("{int}{frac}");
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let numerator = U256::from_str_radix(&digits, 10).map_err(|_| invalid())?;
        let scale = u32::try_from(frac.len()).map_err(|_| invalid())?;

        // rates above one would make the remainder negative
        if numerator > pow10(scale).ok_or_else(invalid)? {
            return Err(invalid());
        }

        Ok(Self { numerator, scale })
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn rescale_between_precisions() {
        let one_btc = Amount::from(100_000_000);
        let as_wei = rescale(one_btc, 8, 18).expect("must fit");
        assert_eq!(as_wei.to_string(), "1000000000000000000");

        let back = rescale(as_wei, 18, 8).expect("must fit");
        assert_eq!(back, one_btc);

        // truncation on the way down
        let dust = Amount::from(1_999);
        assert_eq!(rescale(dust, 18, 15), Some(Amount::from(1)));

        assert_eq!(rescale(dust, 6, 6), Some(dust));
    }

    #[test]
    fn rescale_up_detects_overflow() {
        let big = Amount::new(U256::MAX);
        assert_eq!(rescale(big, 0, 1), None);
    }

    #[test]
    fn commission_truncates() {
        let rate: CommissionRate = "0.001".parse().expect("must parse");
        let (fee, rest) = rate.apply(Amount::from(123_456)).expect("must apply");
        assert_eq!(fee, Amount::from(123));
        assert_eq!(rest, Amount::from(123_333));

        let (fee, rest) = CommissionRate::ZERO
            .apply(Amount::from(10))
            .expect("must apply");
        assert_eq!(fee, Amount::ZERO);
        assert_eq!(rest, Amount::from(10));
    }

    #[test]
    fn commission_rate_parsing() {
        assert!("1".parse::<CommissionRate>().is_ok());
        assert!(".5".parse::<CommissionRate>().is_ok());
        assert!("1.5".parse::<CommissionRate>().is_err());
        assert!("-0.1".parse::<CommissionRate>().is_err());
        assert!("".parse::<CommissionRate>().is_err());
        assert!("0.1x".parse::<CommissionRate>().is_err());
    }

    #[test]
    fn amount_text_and_binary_encodings() {
        let amount: Amount = "340282366920938463463374607431768211456".parse().expect("2^128");
        let json = serde_json::to_string(&amount).expect("must serialize");
        assert_eq!(json, "\"340282366920938463463374607431768211456\"");

        let bytes = borsh::to_vec(&amount).expect("must serialize");
        assert_eq!(bytes.len(), 32);
        assert_eq!(borsh::from_slice::<Amount>(&bytes).expect("must decode"), amount);

        assert!("0x10".parse::<Amount>().is_err());
        assert!("-1".parse::<Amount>().is_err());
    }

    proptest! {
        #[test]
        fn commission_never_exceeds_amount(raw in any::<u64>(), bps in 0u32..=10_000) {
            let rate: CommissionRate = format!("{}.{:04}", bps / 10_000, bps % 10_000)
                .parse()
                .expect("must parse");
            let (fee, rest) = rate.apply(Amount::from(raw)).expect("must apply");
            prop_assert!(fee <= Amount::from(raw));
            prop_assert_eq!(fee.get() + rest.get(), U256::from(raw));
        }
    }
}
