//! Fixed-point amounts.
//!
//! Every amount inside the engine is a [`Wei`]: an unsigned integer count of
//! the ledger's smallest unit (18 decimals). Decimal strings exist only at the
//! input/display boundary:
//!
//! | Direction            | Function         |
//! |----------------------|------------------|
//! | user input → engine  | [`parse_units`]  |
//! | engine → display     | [`format_units`] |
//!
//! On the JSON wire amounts travel as base-10 integer strings (see
//! [`wei_serde`]) because they routinely exceed `u64`.

/// Amount in the ledger's smallest unit.
pub type Wei = u128;

/// Number of fractional digits in one whole unit.
pub const DECIMALS: u32 = 18;

/// 1 whole unit expressed in [`Wei`].
pub const WEI_PER_UNIT: Wei = 1_000_000_000_000_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitsError {
    Empty,
    /// A character other than ASCII digits and a single `.` was found.
    InvalidCharacter(char),
    /// More than [`DECIMALS`] digits after the point.
    TooPrecise,
    Overflow,
}

impl std::fmt::Display for UnitsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitsError::Empty => write!(f, "amount is empty"),
            UnitsError::InvalidCharacter(c) => write!(f, "amount has invalid character {c:?}"),
            UnitsError::TooPrecise => {
                write!(f, "amount has more than {DECIMALS} fractional digits")
            }
            UnitsError::Overflow => write!(f, "amount does not fit in 128 bits"),
        }
    }
}

impl std::error::Error for UnitsError {}

/// Parse a decimal string such as `"0.1"` or `"25"` into [`Wei`].
///
/// Signs, exponents and separators are rejected. Surrounding whitespace is
/// ignored.
pub fn parse_units(s: &str) -> Result<Wei, UnitsError> {
    let t = s.trim();
    if t.is_empty() || t == "." {
        return Err(UnitsError::Empty);
    }

    let (whole, frac) = match t.split_once('.') {
        Some((w, f)) => (w, f),
        None => (t, ""),
    };

    if let Some(c) = whole
        .chars()
        .chain(frac.chars())
        .find(|c| !c.is_ascii_digit())
    {
        return Err(UnitsError::InvalidCharacter(c));
    }
    if frac.len() > DECIMALS as usize {
        return Err(UnitsError::TooPrecise);
    }

    let mut acc: Wei = 0;
    for d in whole.bytes() {
        acc = acc
            .checked_mul(10)
            .and_then(|v| v.checked_add(Wei::from(d - b'0')))
            .ok_or(UnitsError::Overflow)?;
    }
    acc = acc.checked_mul(WEI_PER_UNIT).ok_or(UnitsError::Overflow)?;

    let mut frac_wei: Wei = 0;
    for d in frac.bytes() {
        frac_wei = frac_wei * 10 + Wei::from(d - b'0');
    }
    frac_wei *= 10u128.pow(DECIMALS - frac.len() as u32);

    acc.checked_add(frac_wei).ok_or(UnitsError::Overflow)
}

/// Render [`Wei`] as a decimal string with trailing zeros removed.
pub fn format_units(amount: Wei) -> String {
    let whole = amount / WEI_PER_UNIT;
    let frac = amount % WEI_PER_UNIT;
    if frac == 0 {
        return whole.to_string();
    }
    let digits = format!("{:0width$}", frac, width = DECIMALS as usize);
    format!("{}.{}", whole, digits.trim_end_matches('0'))
}

/// Scale `amount` by a multiplier given in hundredths (`150` = ×1.5).
pub fn apply_multiplier(amount: Wei, hundredths: u32) -> Wei {
    amount.saturating_mul(Wei::from(hundredths)) / 100
}

/// Serde adapter: [`Wei`] as a base-10 string.
pub mod wei_serde {
    use super::Wei;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &Wei, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&v.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Wei, D::Error> {
        let raw = String::deserialize(d)?;
        raw.parse::<Wei>().map_err(D::Error::custom)
    }
}

/// Serde adapter: `Option<Wei>` as an optional base-10 string.
pub mod opt_wei_serde {
    use super::Wei;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &Option<Wei>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(x) => s.serialize_some(&x.to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Wei>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        raw.map(|r| r.parse::<Wei>().map_err(D::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_fractional_stake() {
        assert_eq!(parse_units("0.1").unwrap(), 100_000_000_000_000_000);
        assert_eq!(parse_units("0.05").unwrap(), 50_000_000_000_000_000);
        assert_eq!(parse_units(" 25 ").unwrap(), 25 * WEI_PER_UNIT);
        assert_eq!(parse_units(".5").unwrap(), WEI_PER_UNIT / 2);
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert_eq!(parse_units(""), Err(UnitsError::Empty));
        assert_eq!(parse_units("-1"), Err(UnitsError::InvalidCharacter('-')));
        assert_eq!(parse_units("1.2.3"), Err(UnitsError::InvalidCharacter('.')));
        assert_eq!(
            parse_units("0.0000000000000000001"),
            Err(UnitsError::TooPrecise)
        );
        assert_eq!(
            parse_units("999999999999999999999999999999999"),
            Err(UnitsError::Overflow)
        );
    }

    #[test]
    fn format_trims_trailing_zeros() {
        assert_eq!(format_units(150_000_000_000_000_000), "0.15");
        assert_eq!(format_units(0), "0");
        assert_eq!(format_units(3 * WEI_PER_UNIT), "3");
        assert_eq!(format_units(1), "0.000000000000000001");
    }

    #[test]
    fn multiplier_in_hundredths() {
        let stake = parse_units("0.1").unwrap();
        assert_eq!(apply_multiplier(stake, 150), parse_units("0.15").unwrap());
        assert_eq!(apply_multiplier(stake, 5000), parse_units("5").unwrap());
    }

    #[test]
    fn wei_serde_uses_strings() {
        #[derive(serde::Serialize, serde::Deserialize)]
        struct W {
            #[serde(with = "wei_serde")]
            v: Wei,
            #[serde(with = "opt_wei_serde", default)]
            o: Option<Wei>,
        }
        let big: Wei = 100 * WEI_PER_UNIT;
        let s = serde_json::to_string(&W { v: big, o: None }).unwrap();
        assert_eq!(s, r#"{"v":"100000000000000000000","o":null}"#);
        let back: W = serde_json::from_str(r#"{"v":"7","o":"9"}"#).unwrap();
        assert_eq!(back.v, 7);
        assert_eq!(back.o, Some(9));
    }
}
