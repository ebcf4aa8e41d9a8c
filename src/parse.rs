//! `nom` combinators for the value grammar in `at.rs`.
//!
//! Ported from the teacher's `named!`-macro nom 3 grammar to nom 7's plain
//! function-combinator style; the shapes parsed are unchanged, minus the
//! bracketed-array and UCS2-string productions this daemon never needs
//! (PDU mode is used exclusively, so all modem text is plain ASCII).
use nom::IResult;
use nom::branch::alt;
use nom::bytes::complete::{tag, take_until, take_while1};
use nom::character::complete::{char, digit1, none_of};
use nom::combinator::{map, map_res, opt, value};
use nom::multi::{many0, many1};
use nom::sequence::{delimited, preceded, separated_pair};

use crate::at::AtValue;

pub fn parse_string(input: &[u8]) -> IResult<&[u8], String> {
    map_res(
        delimited(char('"'), take_until("\""), char('"')),
        |data: &[u8]| std::str::from_utf8(data).map(|s| s.to_owned()),
    )(input)
}

pub fn parse_integer(input: &[u8]) -> IResult<&[u8], u32> {
    map_res(digit1, |data: &[u8]| {
        std::str::from_utf8(data).unwrap().parse::<u32>()
    })(input)
}

pub fn parse_unknown(input: &[u8]) -> IResult<&[u8], String> {
    map(many1(none_of(",\r\n")), |data: Vec<char>| {
        data.into_iter().collect()
    })(input)
}

pub fn parse_empty(input: &[u8]) -> IResult<&[u8], ()> {
    value((), tag(""))(input)
}

pub fn parse_single_value(input: &[u8]) -> IResult<&[u8], AtValue> {
    alt((
        map(parse_string, AtValue::String),
        map(parse_integer, AtValue::Integer),
        map(parse_unknown, AtValue::Unknown),
        map(parse_empty, |_| AtValue::Empty),
    ))(input)
}

pub fn parse_value(input: &[u8]) -> IResult<&[u8], AtValue> {
    map(
        nom::sequence::pair(
            parse_single_value,
            many0(preceded(char(','), parse_single_value)),
        ),
        |(first, mut others)| {
            if others.is_empty() {
                first
            } else {
                let mut ret = vec![first];
                ret.append(&mut others);
                AtValue::Array(ret)
            }
        },
    )(input)
}

/// Parses a full `+PARAM: value,value,...` information response line, returning
/// `(param, value)`. The param name is everything before the first `: `.
pub fn parse_information_response(input: &[u8]) -> IResult<&[u8], (String, AtValue)> {
    map(
        separated_pair(
            take_while1(|c: u8| c != b':'),
            delimited(char(':'), opt(char(' ')), nom::combinator::success(())),
            parse_value,
        ),
        |(param, response)| (std::str::from_utf8(param).unwrap().to_owned(), response),
    )(input)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::at::AtValue::*;

    #[test]
    fn value_string() {
        assert_eq!(parse_string(b"\"testing\"").unwrap(), (&[][..], "testing".into()));
        assert_eq!(parse_value(b"\"testing\"").unwrap(), (&[][..], String("testing".into())));
    }

    #[test]
    fn value_integer() {
        assert_eq!(parse_integer(b"9001").unwrap(), (&[][..], 9001));
        assert_eq!(parse_value(b"9001").unwrap(), (&[][..], Integer(9001)));
    }

    #[test]
    fn value_unknown() {
        assert_eq!(parse_unknown(b"READY").unwrap(), (&[][..], "READY".into()));
        assert_eq!(parse_value(b"READY").unwrap(), (&[][..], Unknown("READY".into())));
    }

    #[test]
    fn value_array() {
        assert_eq!(
            parse_value(b"1,0,\"GSM\"").unwrap(),
            (&[][..], Array(vec![Integer(1), Integer(0), String("GSM".into())]))
        );
    }

    #[test]
    fn information_response() {
        assert_eq!(
            parse_information_response(b"+CREG: 0,1").unwrap(),
            (&[][..], ("+CREG".into(), Array(vec![Integer(0), Integer(1)])))
        );
    }
}
