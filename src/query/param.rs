//! Bound parameter values and their canonical text form
//!
//! Query keys embed the parameter sequence as text, so every process sharing
//! a cache store must render parameters identically. The canonical form is a
//! Python tuple literal: `()`, `(7,)`, `(1, 'EU', None, True, 2.5)`.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Write};

/// A single bound parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Param {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("None"),
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => f.write_str(&float_repr(*v)),
            Self::Text(s) => f.write_str(&text_repr(s)),
        }
    }
}

impl From<i64> for Param {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Param {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Param {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Param {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Param {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Param {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl<T: Into<Param>> From<Option<T>> for Param {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Render a parameter sequence as a tuple literal
pub fn params_repr(params: &[Param]) -> String {
    match params {
        [] => "()".to_string(),
        [single] => format!("({},)", single),
        many => {
            let items: Vec<String> = many.iter().map(Param::to_string).collect();
            format!("({})", items.join(", "))
        }
    }
}

/// Quote a string the way Python's `repr` does
fn text_repr(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };

    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if !is_printable(c) => {
                let code = c as u32;
                let _ = match code {
                    0..=0xff => write!(out, "\\x{:02x}", code),
                    0x100..=0xffff => write!(out, "\\u{:04x}", code),
                    _ => write!(out, "\\U{:08x}", code),
                };
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// Code points `repr` escapes: controls, format characters, separators
/// other than the ASCII space, private use and noncharacters
///
/// Unassigned code points are left as they are; which ones Python escapes
/// depends on its Unicode version.
fn is_printable(c: char) -> bool {
    let code = c as u32;
    if code == 0x20 {
        return true;
    }
    if code & 0xfffe == 0xfffe {
        return false;
    }
    !matches!(
        code,
        // Cc
        0x00..=0x1f | 0x7f..=0x9f
        // Zs, Zl, Zp
        | 0xa0 | 0x1680 | 0x2000..=0x200a | 0x2028 | 0x2029 | 0x202f | 0x205f | 0x3000
        // Cf
        | 0xad | 0x600..=0x605 | 0x61c | 0x6dd | 0x70f | 0x890 | 0x891 | 0x8e2 | 0x180e
        | 0x200b..=0x200f | 0x202a..=0x202e | 0x2060..=0x2064 | 0x2066..=0x206f
        | 0xfeff | 0xfff9..=0xfffb | 0x110bd | 0x110cd | 0x13430..=0x1343f
        | 0x1bca0..=0x1bca3 | 0x1d173..=0x1d17a | 0xe0001 | 0xe0020..=0xe007f
        // Noncharacters
        | 0xfdd0..=0xfdef
        // Co
        | 0xe000..=0xf8ff | 0xf0000..=0xffffd | 0x100000..=0x10fffd
    )
}

/// Format a float the way Python's `repr` does
fn float_repr(v: f64) -> String {
    if v.is_nan() {
        return "nan".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    // Debug already picks the shortest round-trip digits; only the
    // exponent spelling differs (1e16 vs 1e+16, 1e-5 vs 1e-05).
    let debug = format!("{:?}", v);
    match debug.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(d) => ('-', d),
                None => ('+', exp),
            };
            let mantissa = mantissa.strip_suffix(".0").unwrap_or(mantissa);
            format!("{}e{}{:0>2}", mantissa, sign, digits)
        }
        None => debug,
    }
}
