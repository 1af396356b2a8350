use chrono::{NaiveDate, NaiveDateTime};

/// Date columns are compared and rendered in ISO order so that string
///  comparisons agree with chronological ones.
pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Type tag for a field, supplied by the caller through the `types` context
///  map. The tag decides which escaping rule a comparison value gets and
///  which native representation the in-memory evaluator coerces to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ParamType {
    Null,
    Bool,
    Int,
    Float,
    Str,
    Date,
    DateTime,
}

/// A comparison operand. `List` only appears as the right-hand side of
///  `==`/`!=` comparisons, where it renders as an IN list.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    List(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Loose integer cast: a string is parsed up to the first non-numeric
    ///  character, anything unparseable becomes 0. Casts never fail so that
    ///  a mistyped value degrades the same way in every rendering backend.
    pub fn to_int(&self) -> i64 {
        match self {
            Value::Null => 0,
            Value::Bool(b) => *b as i64,
            Value::Int(i) => *i,
            Value::Float(f) => *f as i64,
            Value::Str(s) => leading_number(s, false).parse().unwrap_or(0),
            Value::Date(_) | Value::DateTime(_) | Value::List(_) => 0,
        }
    }

    pub fn to_float(&self) -> f64 {
        match self {
            Value::Null => 0.0,
            Value::Bool(b) => *b as i64 as f64,
            Value::Int(i) => *i as f64,
            Value::Float(f) => *f,
            Value::Str(s) => leading_number(s, true).parse().unwrap_or(0.0),
            Value::Date(_) | Value::DateTime(_) | Value::List(_) => 0.0,
        }
    }

    /// Truthiness: 0, 0.0, "", "0" and null are false.
    pub fn to_bool(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty() && s != "0",
            Value::Date(_) | Value::DateTime(_) => true,
            Value::List(l) => !l.is_empty(),
        }
    }

    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Str(s) => s.clone(),
            Value::Date(d) => d.format(DATE_FORMAT).to_string(),
            Value::DateTime(dt) => dt.format(DATETIME_FORMAT).to_string(),
            Value::List(l) => {
                let parts: Vec<String> = l.iter().map(|v| v.to_display_string()).collect();
                parts.join(",")
            }
        }
    }

    pub fn to_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            Value::DateTime(dt) => Some(dt.date()),
            Value::Str(s) => NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).ok(),
            _ => None,
        }
    }

    pub fn to_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Value::DateTime(dt) => Some(*dt),
            Value::Date(d) => d.and_hms_opt(0, 0, 0),
            Value::Str(s) => {
                let s = s.trim();
                NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
                    .ok()
                    .or_else(|| {
                        NaiveDate::parse_from_str(s, DATE_FORMAT)
                            .ok()
                            .and_then(|d| d.and_hms_opt(0, 0, 0))
                    })
            }
            _ => None,
        }
    }

    /// Coerces to the native representation for [ty]. Date values that fail
    ///  to parse become `Null` rather than a separate error.
    pub fn coerce(&self, ty: ParamType) -> Value {
        match ty {
            ParamType::Null => Value::Null,
            ParamType::Bool => Value::Bool(self.to_bool()),
            ParamType::Int => Value::Int(self.to_int()),
            ParamType::Float => Value::Float(self.to_float()),
            ParamType::Str => Value::Str(self.to_display_string()),
            ParamType::Date => self.to_date().map(Value::Date).unwrap_or(Value::Null),
            ParamType::DateTime => self
                .to_datetime()
                .map(Value::DateTime)
                .unwrap_or(Value::Null),
        }
    }

    /// Total order used by the in-memory evaluator. Both sides are expected
    ///  to be coerced to the same variant already; mixed pairs fall back to
    ///  a fixed variant rank with numbers compared cross-type.
    pub fn compare(&self, other: &Value) -> std::cmp::Ordering {
        use Value::*;
        match (self, other) {
            (Null, Null) => std::cmp::Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Int(a), Float(b)) => (*a as f64).total_cmp(b),
            (Float(a), Int(b)) => a.total_cmp(&(*b as f64)),
            (Str(a), Str(b)) => a.cmp(b),
            (Date(a), Date(b)) => a.cmp(b),
            (DateTime(a), DateTime(b)) => a.cmp(b),
            (a, b) => rank(a).cmp(&rank(b)),
        }
    }
}

fn rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Int(_) | Value::Float(_) => 2,
        Value::Str(_) => 3,
        Value::Date(_) => 4,
        Value::DateTime(_) => 5,
        Value::List(_) => 6,
    }
}

/// The numeric prefix of [s]: optional sign, digits, and (for floats) one
///  decimal point.
fn leading_number(s: &str, float: bool) -> &str {
    let s = s.trim_start();
    let mut end = 0;
    let mut seen_dot = false;
    for (i, c) in s.char_indices() {
        match c {
            '+' | '-' if i == 0 => end = i + 1,
            '0'..='9' => end = i + 1,
            '.' if float && !seen_dot => {
                seen_dot = true;
                end = i + 1;
            }
            _ => break,
        }
    }
    &s[..end]
}

// These From implementations keep factory and test code terse
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}
impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}
impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}
impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}
impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}
impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}
impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}
impl From<Vec<Value>> for Value {
    fn from(l: Vec<Value>) -> Self {
        Value::List(l)
    }
}
