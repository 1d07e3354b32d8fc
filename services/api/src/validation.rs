//! Request field validation with FastAPI-style 422 details.

use dataset::parse_int;
use serde::Serialize;
use serde_json::Value;

/// Bounds on an integer field.
#[derive(Debug, Clone, Copy)]
pub enum Rule {
    Between(i64, i64),
    AtLeast(i64),
    GreaterThan(i64),
}

impl Rule {
    fn check(self, value: i64) -> Result<i64, String> {
        match self {
            Rule::Between(min, _) | Rule::AtLeast(min) if value < min => {
                Err(format!("Input should be greater than or equal to {min}"))
            }
            Rule::Between(_, max) if value > max => {
                Err(format!("Input should be less than or equal to {max}"))
            }
            Rule::GreaterThan(min) if value <= min => {
                Err(format!("Input should be greater than {min}"))
            }
            _ => Ok(value),
        }
    }
}

pub const ID_RA: Rule = Rule::Between(1, 33);
pub const COD_NATUREZA: Rule = Rule::Between(1, 32);
pub const QUANTIDADE: Rule = Rule::AtLeast(0);
pub const MES: Rule = Rule::Between(1, 12);
pub const ANO: Rule = Rule::Between(2000, 2100);
pub const CODIGO: Rule = Rule::GreaterThan(0);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub loc: Vec<String>,
    pub msg: String,
}

impl FieldError {
    pub fn new(location: &str, field: &str, msg: impl Into<String>) -> Self {
        Self {
            loc: vec![location.to_string(), field.to_string()],
            msg: msg.into(),
        }
    }
}

/// A raw input value, before type and bounds checks.
#[derive(Debug, Clone, Copy)]
pub enum RawValue<'a> {
    Missing,
    Text(&'a str),
    Json(&'a serde_json::Value),
}

impl<'a> From<Option<&'a String>> for RawValue<'a> {
    fn from(value: Option<&'a String>) -> Self {
        value.map_or(RawValue::Missing, |s| RawValue::Text(s))
    }
}

impl<'a> From<Option<&'a serde_json::Value>> for RawValue<'a> {
    fn from(value: Option<&'a serde_json::Value>) -> Self {
        match value {
            None | Some(serde_json::Value::Null) => RawValue::Missing,
            Some(v) => RawValue::Json(v),
        }
    }
}

impl RawValue<'_> {
    fn as_int(self) -> Result<i64, String> {
        let parsed = match self {
            RawValue::Missing => return Err("Field required".to_string()),
            RawValue::Text(s) => parse_int(s),
            RawValue::Json(Value::Number(n)) => n.as_i64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.is_finite() && f.fract() == 0.0)
                    .map(|f| f as i64)
            }),
            RawValue::Json(Value::String(s)) => parse_int(s),
            RawValue::Json(_) => None,
        };
        parsed.ok_or_else(|| "Input should be a valid integer".to_string())
    }
}

/// Collects every field error of one request instead of stopping at the first.
#[derive(Debug)]
pub struct Validator {
    location: &'static str,
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new(location: &'static str) -> Self {
        Self {
            location,
            errors: Vec::new(),
        }
    }

    /// Returns the checked value, or 0 after recording an error.
    pub fn int<'a>(&mut self, field: &str, raw: impl Into<RawValue<'a>>, rule: Rule) -> i64 {
        match raw.into().as_int().and_then(|v| rule.check(v)) {
            Ok(v) => v,
            Err(msg) => {
                self.errors.push(FieldError::new(self.location, field, msg));
                0
            }
        }
    }

    pub fn finish(self) -> Result<(), Vec<FieldError>> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rules() {
        assert_eq!(ID_RA.check(1), Ok(1));
        assert_eq!(ID_RA.check(33), Ok(33));
        assert_eq!(
            ID_RA.check(0),
            Err("Input should be greater than or equal to 1".to_string())
        );
        assert_eq!(
            ID_RA.check(34),
            Err("Input should be less than or equal to 33".to_string())
        );
        assert!(QUANTIDADE.check(0).is_ok());
        assert!(QUANTIDADE.check(-1).is_err());
        assert_eq!(CODIGO.check(0), Err("Input should be greater than 0".to_string()));
        assert!(ANO.check(1999).is_err());
        assert!(ANO.check(2101).is_err());
    }

    #[test]
    fn test_validator_collects_all_errors() {
        let mes = "13".to_string();
        let body = json!({ "ano": "dois mil", "id_ra": 3 });

        let mut v = Validator::new("body");
        assert_eq!(v.int("id_ra", body.get("id_ra"), ID_RA), 3);
        v.int("ano", body.get("ano"), ANO);
        v.int("mes", Some(&mes), MES);
        v.int("quantidade", body.get("quantidade"), QUANTIDADE);

        let errors = v.finish().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0].loc, vec!["body", "ano"]);
        assert_eq!(errors[0].msg, "Input should be a valid integer");
        assert_eq!(errors[1].msg, "Input should be less than or equal to 12");
        assert_eq!(errors[2].msg, "Field required");
    }

    #[test]
    fn test_numeric_strings_and_integral_floats_coerce() {
        let body = json!({ "ano": "2024", "mes": 6.0, "id_ra": " 3 ", "quantidade": 2.5 });
        let query = "2023.0".to_string();

        let mut v = Validator::new("body");
        assert_eq!(v.int("ano", body.get("ano"), ANO), 2024);
        assert_eq!(v.int("mes", body.get("mes"), MES), 6);
        assert_eq!(v.int("id_ra", body.get("id_ra"), ID_RA), 3);
        assert_eq!(v.int("ano", Some(&query), ANO), 2023);
        v.int("quantidade", body.get("quantidade"), QUANTIDADE);

        let errors = v.finish().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].loc, vec!["body", "quantidade"]);
        assert_eq!(errors[0].msg, "Input should be a valid integer");
    }

    #[test]
    fn test_non_numeric_json_is_rejected() {
        let body = json!({ "ano": true, "mes": [6] });
        let mut v = Validator::new("body");
        v.int("ano", body.get("ano"), ANO);
        v.int("mes", body.get("mes"), MES);
        assert_eq!(v.finish().unwrap_err().len(), 2);
    }

    #[test]
    fn test_text_values_are_trimmed() {
        let raw = " 7 ".to_string();
        let mut v = Validator::new("query");
        assert_eq!(v.int("cod_natureza", Some(&raw), COD_NATUREZA), 7);
        assert!(v.finish().is_ok());
    }
}
