//! A logfmt tokenizer.
//!
//! Splits a line like `lvl=info msg="hello world" count#hits=1` into
//! key/value pairs. Keys are runs of printable bytes other than `=` and `"`.
//! Values are either bare runs of the same bytes or double-quoted strings with
//! backslash escapes. A key without `=`, or with nothing after it, has an
//! empty value. Anything between pairs is skipped.

use std::borrow::Cow;
use std::char;
use std::error;
use std::fmt;

/// Tokenizer failures. Both leave the rest of the line unreadable.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// A quoted value ran off the end of the line.
    UnterminatedString,
    /// A quoted value held an escape sequence we do not understand.
    InvalidEscape(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::UnterminatedString => write!(f, "logfmt: unterminated string"),
            Error::InvalidEscape(ref s) => write!(f, "logfmt: error unquoting bytes {:?}", s),
        }
    }
}

impl error::Error for Error {}

/// One key/value pair of a logfmt line.
#[derive(Debug, Clone, PartialEq)]
pub struct Pair<'a> {
    /// The key, never empty.
    pub key: &'a [u8],
    /// The value, unquoted. Borrowed unless escapes had to be resolved.
    pub value: Cow<'a, [u8]>,
}

/// Iterator over the pairs of one line.
///
/// # Examples
///
/// ```
/// use siphon::protocols::logfmt::Tokenizer;
///
/// let pairs: Vec<_> = Tokenizer::new(b"a=1 b=\"two words\" c")
///     .collect::<Result<_, _>>()
///     .unwrap();
/// assert_eq!(3, pairs.len());
/// assert_eq!(&b"two words"[..], &*pairs[1].value);
/// assert!(pairs[2].value.is_empty());
/// ```
pub struct Tokenizer<'a> {
    data: &'a [u8],
    pos: usize,
}

#[inline]
fn is_ident(c: u8) -> bool {
    c > b' ' && c != b'"' && c != b'='
}

impl<'a> Tokenizer<'a> {
    /// Tokenize `data`.
    pub fn new(data: &'a [u8]) -> Tokenizer<'a> {
        Tokenizer { data: data, pos: 0 }
    }

    fn pair(&self, key: &'a [u8], value: Cow<'a, [u8]>) -> Option<Result<Pair<'a>, Error>> {
        Some(Ok(Pair {
            key: key,
            value: value,
        }))
    }

    fn run(&mut self, pred: fn(u8) -> bool) -> &'a [u8] {
        let data = self.data;
        let start = self.pos;
        while self.pos < data.len() && pred(data[self.pos]) {
            self.pos += 1;
        }
        &data[start..self.pos]
    }

    fn quoted(&mut self) -> Result<Cow<'a, [u8]>, Error> {
        // self.pos sits on the opening quote
        let start = self.pos + 1;
        let mut escaped = false;
        let mut i = start;
        loop {
            if i >= self.data.len() {
                self.pos = self.data.len();
                return Err(Error::UnterminatedString);
            }
            match self.data[i] {
                b'\\' => {
                    escaped = true;
                    i += 2;
                }
                b'"' => break,
                _ => i += 1,
            }
        }
        self.pos = i + 1;
        let raw = &self.data[start..i];
        if escaped {
            unquote(raw).map(Cow::Owned)
        } else {
            Ok(Cow::Borrowed(raw))
        }
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Result<Pair<'a>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.run(|c| !is_ident(c));
        if self.pos >= self.data.len() {
            return None;
        }
        let key = self.run(is_ident);
        let data = self.data;
        let empty = Cow::Borrowed(&data[0..0]);

        if self.pos >= self.data.len() || self.data[self.pos] != b'=' {
            return self.pair(key, empty);
        }
        self.pos += 1;
        if self.pos >= self.data.len() {
            return self.pair(key, empty);
        }

        let c = self.data[self.pos];
        if c == b'"' {
            match self.quoted() {
                Ok(value) => self.pair(key, value),
                Err(e) => Some(Err(e)),
            }
        } else if is_ident(c) {
            let value = self.run(is_ident);
            self.pair(key, Cow::Borrowed(value))
        } else {
            self.pair(key, empty)
        }
    }
}

fn unquote(raw: &[u8]) -> Result<Vec<u8>, Error> {
    let invalid = || Error::InvalidEscape(String::from_utf8_lossy(raw).into_owned());
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] != b'\\' {
            out.push(raw[i]);
            i += 1;
            continue;
        }
        let esc = match raw.get(i + 1) {
            Some(c) => *c,
            None => return Err(invalid()),
        };
        i += 2;
        match esc {
            b'"' | b'\\' | b'/' | b'\'' => out.push(esc),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0c),
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'u' => {
                let hex = raw.get(i..i + 4).ok_or_else(&invalid)?;
                let code = ::std::str::from_utf8(hex)
                    .ok()
                    .and_then(|h| u32::from_str_radix(h, 16).ok())
                    .ok_or_else(&invalid)?;
                i += 4;
                let c = char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER);
                let mut buf = [0; 4];
                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
            _ => return Err(invalid()),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;

    fn pairs(line: &str) -> Result<Vec<(String, String)>, Error> {
        Tokenizer::new(line.as_bytes())
            .map(|p| {
                p.map(|p| {
                    (
                        String::from_utf8_lossy(p.key).into_owned(),
                        String::from_utf8_lossy(&p.value).into_owned(),
                    )
                })
            })
            .collect()
    }

    fn owned(xs: &[(&str, &str)]) -> Vec<(String, String)> {
        xs.iter()
            .map(|&(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_bare_pairs() {
        assert_eq!(
            owned(&[("a", "1"), ("b", "two"), ("count#x@0.5", "2ms")]),
            pairs("a=1 b=two count#x@0.5=2ms").unwrap()
        );
    }

    #[test]
    fn test_quoted_value() {
        assert_eq!(
            owned(&[("t", "1983-02-21T01:23:45-0400"), ("foo", "bar baz")]),
            pairs("t=\"1983-02-21T01:23:45-0400\" foo=\"bar baz\"").unwrap()
        );
    }

    #[test]
    fn test_empty_values() {
        assert_eq!(
            owned(&[("lvl", "info"), ("msg", ""), ("flag", ""), ("end", "")]),
            pairs("lvl=info msg= flag end=").unwrap()
        );
        assert_eq!(owned(&[("q", "")]), pairs("q=\"\"").unwrap());
    }

    #[test]
    fn test_garbage_is_skipped() {
        assert_eq!(owned(&[("a", "1"), ("b", "2")]), pairs("  = \"a=1\t  b=2\n").unwrap());
        assert!(pairs("").unwrap().is_empty());
        assert!(pairs("\n").unwrap().is_empty());
    }

    #[test]
    fn test_double_equals() {
        assert_eq!(owned(&[("a", ""), ("b", "")]), pairs("a==b").unwrap());
    }

    #[test]
    fn test_bare_key_is_a_pair() {
        assert_eq!(owned(&[("test", "")]), pairs("test\n").unwrap());
    }

    #[test]
    fn test_escapes() {
        assert_eq!(
            owned(&[("m", "say \"hi\"\n\\ \u{e9}")]),
            pairs(r#"m="say \"hi\"\n\\ é""#).unwrap()
        );
    }

    #[test]
    fn test_unterminated_string() {
        assert_eq!(Err(Error::UnterminatedString), pairs("count#test=\"1.2"));
        assert_eq!(Err(Error::UnterminatedString), pairs("a=\"ends in escape\\\""));
    }

    #[test]
    fn test_invalid_escape() {
        match pairs(r#"a="\q""#) {
            Err(Error::InvalidEscape(_)) => {}
            other => panic!("unexpected {:?}", other),
        }
        match pairs(r#"a="\u12""#) {
            Err(Error::InvalidEscape(_)) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unescaped_values_borrow() {
        let line = b"a=\"x y\"";
        let pair = Tokenizer::new(line).next().unwrap().unwrap();
        match pair.value {
            Cow::Borrowed(v) => assert_eq!(b"x y", v),
            Cow::Owned(_) => panic!("value should borrow from the line"),
        }
    }
}
