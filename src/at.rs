//! A small grammar for the values that appear in single-line modem responses
//! such as `+CREG: 0,1` or `+CSQ: 14,99`.
//!
//! The dialogue between this daemon and the modem (spec §4.E) is driven by
//! literal substring matching (`OK`, `ERROR`, `+CMT:`, ...), not a generic
//! multi-line AT response engine — so unlike a library meant for arbitrary
//! AT interaction, this grammar only needs to parse the *value* half of a
//! handful of known information responses.
use std::fmt;
use crate::errors::{GatewayError, GatewayResult};

/// Any of the value shapes that appear after `+PARAM: ` in a modem response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AtValue {
    /// A string-type value - text surrounded by "quotation marks".
    String(String),
    /// An integer.
    Integer(u32),
    /// Some untyped value - usually a bareword like `READY` or `GSM`.
    Unknown(String),
    /// An empty value, corresponding to nothing at all (two commas in a row).
    Empty,
    /// A comma-separated run of the above.
    Array(Vec<AtValue>),
}

macro_rules! at_value_impl {
    ($($var:ident, $refmeth:ident, $asmeth:ident, $ty:ty),* $(,)?) => {
        impl AtValue {
            $(
                pub fn $refmeth(&self) -> GatewayResult<&$ty> {
                    if let AtValue::$var(ref i) = *self {
                        Ok(i)
                    } else {
                        Err(GatewayError::UnexpectedResponse(stringify!($var)))
                    }
                }
                pub fn $asmeth(self) -> GatewayResult<$ty> {
                    if let AtValue::$var(i) = self {
                        Ok(i)
                    } else {
                        Err(GatewayError::UnexpectedResponse(stringify!($var)))
                    }
                }
             )*
        }
    }
}
at_value_impl!(
    String, get_string, as_string, String,
    Integer, get_integer, as_integer, u32,
    Unknown, get_unknown, as_unknown, String,
    Array, get_array, as_array, Vec<AtValue>,
);

impl fmt::Display for AtValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use self::AtValue::*;
        match *self {
            String(ref st) => write!(f, "\"{}\"", st),
            Integer(i) => write!(f, "{}", i),
            Unknown(ref st) => write!(f, "{}", st),
            Empty => Ok(()),
            Array(ref val) => {
                for (i, v) in val.iter().enumerate() {
                    let c = if i == 0 { "" } else { "," };
                    write!(f, "{}{}", c, v)?;
                }
                Ok(())
            }
        }
    }
}

impl AtValue {
    /// Index into an `Array` (or treat a scalar as a one-element array),
    /// the way modem responses with a variable argument count are usually read.
    pub fn nth(&self, idx: usize) -> GatewayResult<&AtValue> {
        match self {
            AtValue::Array(v) => v.get(idx).ok_or(GatewayError::UnexpectedResponse("array index")),
            v if idx == 0 => Ok(v),
            _ => Err(GatewayError::UnexpectedResponse("array index")),
        }
    }
}
