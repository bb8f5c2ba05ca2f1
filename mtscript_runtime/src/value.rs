use std::{fmt::Display, rc::Rc};

use indexmap::IndexMap;
use mtscript_syntax::ast::Literal;

/// A dynamically typed script value. Lists and maps are shared and
/// copied on write.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    Number(f64),
    Str(String),
    Boolean(bool),
    #[default]
    Undefined,
    List(Rc<Vec<Value>>),
    Map(Rc<IndexMap<String, Value>>),
}

impl From<&Literal> for Value {
    fn from(literal: &Literal) -> Self {
        match literal {
            Literal::Number(n) => Self::Number(*n),
            Literal::Str(s) => Self::Str(s.clone()),
            Literal::Boolean(b) => Self::Boolean(*b),
            Literal::Undefined => Self::Undefined,
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(Rc::new(items))
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(map: IndexMap<String, Value>) -> Self {
        Self::Map(Rc::new(map))
    }
}

/// Parse a string the way numeric contexts do: surrounding whitespace is
/// ignored, and only decimal and exponent notation are accepted.
pub fn parse_numeric(s: &str) -> Option<f64> {
    let s = s.trim();
    if !s.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }
    if !s
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'))
    {
        return None;
    }
    s.parse().ok()
}

pub fn format_number(n: f64) -> String {
    if n == 0.0 {
        // Also covers -0
        "0".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n.is_nan() {
        "NaN".to_string()
    } else {
        n.to_string()
    }
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Number(_) => "number",
            Self::Str(_) => "string",
            Self::Boolean(_) => "boolean",
            Self::Undefined => "undefined",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }

    /// Numeric coercion: numeric strings parse, booleans are 1 or 0 and
    /// undefined is 0. Lists, maps and other strings have no number.
    pub fn to_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Str(s) => parse_numeric(s),
            Self::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Undefined => Some(0.0),
            Self::List(_) | Self::Map(_) => None,
        }
    }

    pub fn to_bool(&self) -> bool {
        match self {
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::Str(s) => !s.is_empty(),
            Self::Boolean(b) => *b,
            Self::Undefined => false,
            Self::List(items) => !items.is_empty(),
            Self::Map(map) => !map.is_empty(),
        }
    }

    fn is_numeric_like(&self) -> bool {
        match self {
            Self::Number(_) | Self::Boolean(_) => true,
            Self::Str(s) => parse_numeric(s).is_some(),
            _ => false,
        }
    }

    /// Script equality. Same kinds compare by value; mixed kinds compare
    /// as numbers when both sides are numeric-like, and are otherwise
    /// unequal.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Undefined, Self::Undefined) => true,
            (Self::List(a), Self::List(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.equals(y))
            }
            (Self::Map(a), Self::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.get(k).map_or(false, |w| v.equals(w)))
            }
            (a, b) if a.is_numeric_like() && b.is_numeric_like() => {
                a.to_number() == b.to_number()
            }
            _ => false,
        }
    }

    /// Rendering used inside lists and maps, where strings are quoted.
    fn fmt_nested(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Undefined => f.write_str("undefined"),
            other => write!(f, "{other}"),
        }
    }

    /// Type and rendering, for error messages.
    pub fn describe(&self) -> String {
        match self {
            Self::Undefined => "undefined".to_string(),
            Self::Str(s) => format!("string {s:?}"),
            other => format!("{} {other}", other.type_name()),
        }
    }
}

/// String context rendering.
impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => f.write_str(&format_number(*n)),
            Self::Str(s) => f.write_str(s),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Undefined => Ok(()),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    item.fmt_nested(f)?;
                }
                f.write_str("]")
            }
            Self::Map(map) => {
                f.write_str("{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key:?}: ")?;
                    value.fmt_nested(f)?;
                }
                f.write_str("}")
            }
        }
    }
}
