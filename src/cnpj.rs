// src/cnpj.rs

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

use crate::sheet::CellValue;

pub const CNPJ_LEN: usize = 14;

static NON_DIGIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^0-9]").expect("static regex"));

/// A canonical CNPJ: exactly 14 ASCII digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cnpj(String);

impl Cnpj {
    /// Strips every non-digit, restores the leading zero a numeric cell drops
    /// (13 digits → 14), and rejects anything that is not then 14 digits long.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut digits = NON_DIGIT.replace_all(raw, "").into_owned();
        if digits.len() == CNPJ_LEN - 1 {
            digits.insert(0, '0');
        }
        (digits.len() == CNPJ_LEN).then_some(Cnpj(digits))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cnpj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cell → identifier; missing cells have no identifier.
pub fn normalize(value: &CellValue) -> Option<Cnpj> {
    match value {
        CellValue::Empty => None,
        other => Cnpj::parse(&other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    #[test]
    fn test_formatted_cnpj() {
        assert_eq!(
            normalize(&text("11.222.333/0001-81")).unwrap().as_str(),
            "11222333000181"
        );
    }

    #[test]
    fn test_thirteen_digits_get_leading_zero() {
        assert_eq!(
            normalize(&text("1222333000181")).unwrap().as_str(),
            "01222333000181"
        );
        assert_eq!(
            normalize(&CellValue::Number(1222333000181.0)).unwrap().as_str(),
            "01222333000181"
        );
    }

    #[test]
    fn test_rejects_wrong_lengths() {
        assert_eq!(normalize(&text("123")), None);
        assert_eq!(normalize(&text("")), None);
        assert_eq!(normalize(&text("no digits here")), None);
        // 15 digits is never truncated
        assert_eq!(normalize(&text("112223330001810")), None);
        // 12 digits only gets one zero, still short
        assert_eq!(normalize(&text("222333000181")), None);
        assert_eq!(normalize(&CellValue::Bool(true)), None);
    }

    #[test]
    fn test_missing_is_absent() {
        assert_eq!(normalize(&CellValue::Empty), None);
    }

    #[test]
    fn test_absent_iff_digit_count_is_off() {
        let samples = [
            "", "1", "12.345", "1222333000181", "11222333000181", "112223330001811",
            "CNPJ: 11.222.333/0001-81", "abc1222333000181xyz", "00.000.000/0000-00",
        ];
        for raw in samples {
            let digits = raw.chars().filter(|c| c.is_ascii_digit()).count();
            let kept = digits == 13 || digits == 14;
            assert_eq!(normalize(&text(raw)).is_some(), kept, "{raw:?}");
        }
    }

    #[test]
    fn test_idempotent() {
        for raw in ["11.222.333/0001-81", "1222333000181"] {
            let once = normalize(&text(raw)).unwrap();
            let twice = normalize(&text(once.as_str())).unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_only_ascii_digits_survive() {
        assert_eq!(
            Cnpj::parse(" 11222333000181 \n").unwrap().as_str(),
            "11222333000181"
        );
        // Arabic-Indic digits are not CNPJ digits
        assert_eq!(Cnpj::parse("١١٢٢٢٣٣٣٠٠٠١٨١"), None);
    }
}
