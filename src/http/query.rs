//! URL query string parser with form decoding.

use crate::{errors::ProtocolError, http::types::to_lower_case};
use memchr::memchr;
use percent_encoding::percent_decode;
use std::{borrow::Cow, collections::HashMap};

/// Query string parser.
///
/// Pairs are separated by `&`, keys and values by the first `=`. Both are
/// form-decoded (`+` becomes a space, then `%XX` sequences are decoded) and
/// keys are lower-cased. A key may appear only once.
///
/// # Examples
/// ```rust
/// use ferrule::query::Query;
///
/// let args = Query::parse(b"Name=Sprax&debug&&city=New+York%21").unwrap();
///
/// assert_eq!(args.len(), 3);
/// assert_eq!(args["name"], "Sprax");
/// assert_eq!(args["debug"], "");
/// assert_eq!(args["city"], "New York!");
///
/// // Keys are compared after decoding and lower-casing
/// assert!(Query::parse(b"a=1&A=2").is_err());
/// ```
pub struct Query;

impl Query {
    /// Parses a query string (without the leading `?`) into a new map.
    #[inline]
    pub fn parse(query: &[u8]) -> Result<HashMap<String, String>, ProtocolError> {
        let mut result = HashMap::new();
        Self::parse_into(&mut result, query)?;
        Ok(result)
    }

    /// Parses a query string into an existing map.
    ///
    /// Fails with [`ProtocolError::DuplicateQueryKey`] when a key is already
    /// present in `result`, whether it came from `query` or was there before.
    pub fn parse_into(
        result: &mut HashMap<String, String>,
        query: &[u8],
    ) -> Result<(), ProtocolError> {
        let mut start = 0;
        while start < query.len() {
            // Find next '&' or end of string
            let end = memchr(b'&', &query[start..])
                .map(|pos| start + pos)
                .unwrap_or(query.len());

            if start < end {
                let pair = &query[start..end];

                let (key, value) = match memchr(b'=', pair) {
                    Some(index) => (&pair[..index], &pair[index + 1..]),
                    None => (pair, &b""[..]),
                };

                let key = to_lower_case(&Self::decode(key));
                if result.contains_key(&key) {
                    return Err(ProtocolError::DuplicateQueryKey);
                }

                result.insert(key, Self::decode(value).into_owned());
            }

            start = end + 1;
        }

        Ok(())
    }

    /// Decodes one `application/x-www-form-urlencoded` component.
    ///
    /// Invalid escapes are kept literally and invalid UTF-8 is replaced with
    /// `U+FFFD`.
    ///
    /// ```rust
    /// use ferrule::query::Query;
    ///
    /// assert_eq!(Query::decode(b"a+b%2Bc"), "a b+c");
    /// assert_eq!(Query::decode(b"100%"), "100%");
    /// ```
    pub fn decode(component: &[u8]) -> Cow<'_, str> {
        if memchr(b'+', component).is_none() {
            return percent_decode(component).decode_utf8_lossy();
        }

        let spaced: Vec<u8> = component
            .iter()
            .map(|&b| if b == b'+' { b' ' } else { b })
            .collect();

        Cow::Owned(percent_decode(&spaced).decode_utf8_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid() {
        #[rustfmt::skip]
        let cases: [(&[u8], Vec<(&str, &str)>); 9] = [
            (b"",                        vec![]),
            (b"&&",                      vec![]),
            (b"name=Sprax",              vec![("name", "Sprax")]),
            (b"debug",                   vec![("debug", "")]),
            (b"empty=",                  vec![("empty", "")]),
            (b"=value",                  vec![("", "value")]),
            (b"KEY=Value",               vec![("key", "Value")]),
            (b"q=a+b%20c&x=%2B",         vec![("q", "a b c"), ("x", "+")]),
            (b"eq=a=b&mail=u%40e.org",   vec![("eq", "a=b"), ("mail", "u@e.org")]),
        ];

        for (query, expected) in cases {
            let args = Query::parse(query).unwrap();
            assert_eq!(args.len(), expected.len(), "{:?}", String::from_utf8_lossy(query));

            for (key, value) in expected {
                assert_eq!(args.get(key).map(String::as_str), Some(value));
            }
        }
    }

    #[test]
    fn parse_duplicates() {
        #[rustfmt::skip]
        let cases: [&[u8]; 4] = [
            b"a=1&a=2",
            b"a&a",
            b"Key=1&kEY=2",
            b"x%41=1&xa=2",
        ];

        for query in cases {
            assert_eq!(Query::parse(query), Err(ProtocolError::DuplicateQueryKey));
        }
    }

    #[test]
    fn parse_into_existing() {
        let mut args = HashMap::new();
        Query::parse_into(&mut args, b"a=1").unwrap();
        Query::parse_into(&mut args, b"b=2").unwrap();
        assert_eq!(args.len(), 2);

        assert_eq!(
            Query::parse_into(&mut args, b"a=3"),
            Err(ProtocolError::DuplicateQueryKey)
        );
    }

    #[test]
    fn decode() {
        #[rustfmt::skip]
        let cases: [(&[u8], &str); 6] = [
            (b"plain",       "plain"),
            (b"a+b",         "a b"),
            (b"%C3%A4",      "ä"),
            (b"%zz",         "%zz"),
            (b"%FF",         "\u{FFFD}"),
            (b"%2B+%2b",     "+ +"),
        ];

        for (value, expected) in cases {
            assert_eq!(Query::decode(value), expected);
        }
    }
}
