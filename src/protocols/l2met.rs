//! The l2met metric grammar, embedded in logfmt lines.
//!
//! Any logfmt key containing `#` is a metric: `<type>#<name>[@<rate>]` with a
//! value of `<number><units>`, for instance `measure#db.query@0.5=12.5ms`. The
//! remaining keys, save for `t`, `lvl` and `msg`, tag every metric on the line.
//! `t` carries the time of the line; lines without a readable `t` are stamped
//! with the current time.

use metric::{Bucket, Id, Kind};
use protocols::logfmt;
use std::error;
use std::fmt;
use std::str;
use std::time::Duration;
use time;

const TIME_KEY: &[u8] = b"t";
const LEVEL_KEY: &[u8] = b"lvl";
const MESSAGE_KEY: &[u8] = b"msg";

const METRIC_SEPARATOR: u8 = b'#';
const RATE_SEPARATOR: u8 = b'@';

/// Upper bound on the copies a sampled measure is expanded into.
pub const MAX_REPLICAS: usize = 10_000;

/// Reasons a line could not be parsed.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The line is not valid logfmt.
    Tokenize(logfmt::Error),
    /// The metric type is not `count`, `sample` or `measure`.
    InvalidType(String),
    /// Nothing follows the `#` of a metric key.
    EmptyName,
    /// The metric value does not start with a number.
    InvalidValue(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Tokenize(ref e) => write!(f, "parser: error parsing line: {}", e),
            Error::InvalidType(ref t) => write!(f, "parser: invalid metric type: {}", t),
            Error::EmptyName => write!(f, "parser: zero length name"),
            Error::InvalidValue(ref v) => write!(f, "parser: invalid float value: {}", v),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::Tokenize(ref e) => Some(e),
            _ => None,
        }
    }
}

impl From<logfmt::Error> for Error {
    fn from(e: logfmt::Error) -> Error {
        Error::Tokenize(e)
    }
}

fn lossy(b: &[u8]) -> String {
    String::from_utf8_lossy(b).into_owned()
}

/// Parses l2met lines into `Bucket` fragments.
///
/// The parser holds no per-line state and is cheap to clone, so each worker
/// may own one.
#[derive(Clone, Debug)]
pub struct Parser {
    resolution: i64,
}

impl Parser {
    /// Create a parser quantizing times to `resolution`.
    ///
    /// A zero resolution is treated as one nanosecond.
    pub fn new(resolution: Duration) -> Parser {
        Parser {
            resolution: time::nanos(resolution).max(1),
        }
    }

    /// The window width, in nanoseconds.
    pub fn resolution(&self) -> i64 {
        self.resolution
    }

    /// Parse `line` into metric fragments.
    ///
    /// A line without metrics yields an empty vector, not an error.
    ///
    /// # Examples
    ///
    /// ```
    /// use siphon::protocols::l2met::Parser;
    /// use std::time::Duration;
    ///
    /// let parser = Parser::new(Duration::from_secs(10));
    /// let bkts = parser.parse(b"lvl=info count#hits@0.1=2 host=a").unwrap();
    /// assert_eq!(1, bkts.len());
    /// assert_eq!("hits", bkts[0].id.name);
    /// assert_eq!(vec![20.0], bkts[0].vals);
    ///
    /// assert!(parser.parse(b"lvl=info msg=\"no metrics here\"").unwrap().is_empty());
    /// ```
    pub fn parse(&self, line: &[u8]) -> Result<Vec<Bucket>, Error> {
        self.parse_at(time::now(), line)
    }

    /// As `parse`, with `now` standing in for the current time of lines that
    /// carry none.
    pub fn parse_at(&self, now: i64, line: &[u8]) -> Result<Vec<Bucket>, Error> {
        let mut ts = None;
        let mut tags = Vec::new();
        let mut bkts = Vec::with_capacity(2);

        for pair in logfmt::Tokenizer::new(line) {
            let pair = pair?;
            if pair.key == TIME_KEY {
                ts = str::from_utf8(&pair.value).ok().and_then(time::parse);
                continue;
            }
            if pair.key == LEVEL_KEY || pair.key == MESSAGE_KEY {
                continue;
            }
            if pair.key.contains(&METRIC_SEPARATOR) {
                bkts.push(parse_metric(pair.key, &pair.value)?);
                continue;
            }
            tags.push((lossy(pair.key), lossy(&pair.value)));
        }

        let window = time::quantize(ts.unwrap_or(now), self.resolution);
        for bkt in &mut bkts {
            bkt.id.time = window;
            bkt.id.tags = tags.clone();
        }
        Ok(bkts)
    }
}

fn parse_metric(key: &[u8], value: &[u8]) -> Result<Bucket, Error> {
    let sep = key.iter()
        .position(|c| *c == METRIC_SEPARATOR)
        .unwrap_or(key.len());
    let (raw_kind, rest) = (&key[..sep], &key[(sep + 1).min(key.len())..]);

    let kind: Kind = str::from_utf8(raw_kind)
        .ok()
        .and_then(|k| k.parse().ok())
        .ok_or_else(|| Error::InvalidType(lossy(raw_kind)))?;
    if rest.is_empty() {
        return Err(Error::EmptyName);
    }
    let (name, rate) = split_rate(rest);
    if name.is_empty() {
        return Err(Error::EmptyName);
    }

    let (v, units) = split_value(value)?;
    let mut bkt = Bucket::new(Id::new(kind, lossy(name), 0)).units(units);
    match kind {
        Kind::Count => {
            if rate > 0.0 {
                bkt.append(v / rate);
            } else {
                bkt.append(v);
            }
        }
        Kind::Sample => bkt.append(v),
        Kind::Measure => {
            for _ in 0..replicas(rate) {
                bkt.append(v);
            }
        }
    }
    Ok(bkt)
}

/// How many copies of a measure sampled at `rate` stand in for the
/// unsampled stream.
fn replicas(rate: f64) -> usize {
    if !(rate > 0.0) {
        return 1;
    }
    let n = (1.0 / rate).floor();
    if n < 1.0 {
        1
    } else if n >= MAX_REPLICAS as f64 {
        MAX_REPLICAS
    } else {
        n as usize
    }
}

/// Split `name@rate`. An unreadable rate is zero, meaning unsampled.
fn split_rate(b: &[u8]) -> (&[u8], f64) {
    match b.iter().position(|c| *c == RATE_SEPARATOR) {
        None => (b, 0.0),
        Some(i) => {
            let rate = str::from_utf8(&b[i + 1..])
                .ok()
                .and_then(|r| r.parse::<f64>().ok())
                .unwrap_or(0.0);
            (&b[..i], rate)
        }
    }
}

/// Split `12.5ms` into `(12.5, "ms")`.
fn split_value(b: &[u8]) -> Result<(f64, String), Error> {
    let pos = b.iter()
        .take_while(|c| c.is_ascii_digit() || **c == b'.' || **c == b'-')
        .count();
    if pos == 0 {
        return Err(Error::InvalidValue(lossy(b)));
    }
    // the prefix is ASCII by construction
    let v = str::from_utf8(&b[..pos])
        .ok()
        .and_then(|n| n.parse::<f64>().ok())
        .ok_or_else(|| Error::InvalidValue(lossy(b)))?;
    Ok((v, lossy(&b[pos..])))
}

#[cfg(test)]
mod test {
    extern crate quickcheck;

    use self::quickcheck::{QuickCheck, TestResult};
    use super::*;
    use time::NANOS_PER_SEC;

    fn parser(secs: u64) -> Parser {
        Parser::new(Duration::from_secs(secs))
    }

    #[test]
    fn test_parse_valid_metrics() {
        let metrics = [
            "t=\"1983-02-21T01:23:45-0400\" lvl=info msg= count#test=2 foo=\"bar\" size=10",
            "t=\"1983-02-21T01:23:45-0400\" lvl=info msg= count#test@0.1=2 foo=\"bar\" size=10",
            "t=\"1983-02-21T01:23:45-0400\" lvl=info msg= count#test=-2 foo=\"bar\" size=10",
            "t=\"1983-02-21T01:23:45-0400\" lvl=info msg= count#test@0.1=-2 foo=\"bar\" size=10",
            "t=\"1983-02-21T01:23:45-0400\" lvl=info msg= sample#test=2.3 foo=\"bar\" size=10",
            "t=\"1983-02-21T01:23:45-0400\" lvl=info msg= sample#test@0.1=2.3 foo=\"bar\" size=10",
            "t=\"1983-02-21T01:23:45-0400\" lvl=info msg= measure#test=2.3ms foo=\"bar\" size=10",
            "t=\"1983-02-21T01:23:45-0400\" lvl=info msg= measure#test@0.1=2.3ms foo=\"bar\" size=10",
        ];

        for m in metrics.iter() {
            let bkts = parser(1).parse(m.as_bytes()).unwrap();
            assert_eq!(1, bkts.len(), "{}", m);
            assert_eq!("test", bkts[0].id.name);
            assert_eq!(
                vec![
                    ("foo".to_string(), "bar".to_string()),
                    ("size".to_string(), "10".to_string()),
                ],
                bkts[0].id.tags
            );
        }
    }

    #[test]
    fn test_parse_invalid_metrics() {
        let p = parser(1);
        assert_eq!(
            Err(Error::InvalidValue("test".to_string())),
            p.parse(b"count#test=test")
        );
        assert_eq!(
            Err(Error::InvalidType("foo".to_string())),
            p.parse(b"foo#test=1.2")
        );
        assert_eq!(Err(Error::EmptyName), p.parse(b"count#=1.2"));
        assert_eq!(
            Err(Error::InvalidValue("1-2".to_string())),
            p.parse(b"sample#test=1-2")
        );
        assert_eq!(
            Err(Error::Tokenize(logfmt::Error::UnterminatedString)),
            p.parse(b"count#test=\"1.2")
        );
    }

    #[test]
    fn test_parse_rejects_empty_name_before_rate() {
        assert_eq!(Err(Error::EmptyName), parser(1).parse(b"count#@0.1=1"));
    }

    #[test]
    fn test_parse_rejects_empty_value() {
        assert_eq!(
            Err(Error::InvalidValue(String::new())),
            parser(1).parse(b"count#test=")
        );
    }

    #[test]
    fn test_one_bad_metric_fails_the_line() {
        assert!(parser(1).parse(b"count#good=1 count#bad=x").is_err());
    }

    #[test]
    fn test_parse_count() {
        let bkts = parser(30).parse(b"count#prefix.test=2").unwrap();
        assert_eq!(1, bkts.len());
        assert_eq!(Kind::Count, bkts[0].kind());
        assert_eq!("prefix.test", bkts[0].id.name);
        assert_eq!(vec![2.0], bkts[0].vals);
        assert_eq!(2.0, bkts[0].sum);
        assert_eq!("", bkts[0].units);
    }

    #[test]
    fn test_parse_sample() {
        let bkts = parser(30).parse(b"sample#prefix.test=2.5").unwrap();
        assert_eq!(1, bkts.len());
        assert_eq!(Kind::Sample, bkts[0].kind());
        assert_eq!(vec![2.5], bkts[0].vals);
    }

    #[test]
    fn test_parse_measure() {
        let bkts = parser(30).parse(b"measure#prefix.test=2.545ms").unwrap();
        assert_eq!(1, bkts.len());
        assert_eq!(Kind::Measure, bkts[0].kind());
        assert_eq!("prefix.test", bkts[0].id.name);
        assert_eq!(vec![2.545], bkts[0].vals);
        assert_eq!("ms", bkts[0].units);
    }

    #[test]
    fn test_parse_rates() {
        let cases: [(&str, Vec<f64>); 6] = [
            ("count#test@0.1=2", vec![20.0]),
            ("count#test@0.1=-2", vec![-20.0]),
            ("count#test@nope=2", vec![2.0]),
            ("sample#test@0.1=2.3", vec![2.3]),
            ("measure#test@0.2=2.3ms", vec![2.3, 2.3, 2.3, 2.3, 2.3]),
            ("measure#test@nope=2.3ms", vec![2.3]),
        ];
        for &(ref line, ref vals) in cases.iter() {
            let bkts = parser(1).parse(line.as_bytes()).unwrap();
            assert_eq!(1, bkts.len());
            assert_eq!(*vals, bkts[0].vals, "{}", line);
        }
    }

    #[test]
    fn test_measure_replicas_are_bounded() {
        assert_eq!(1, replicas(0.0));
        assert_eq!(1, replicas(-1.0));
        assert_eq!(1, replicas(2.0));
        assert_eq!(4, replicas(0.25));
        assert_eq!(MAX_REPLICAS, replicas(1e-12));
        let bkts = parser(1).parse(b"measure#x@0.000000001=1").unwrap();
        assert_eq!(MAX_REPLICAS, bkts[0].vals.len());
    }

    #[test]
    fn test_parse_time() {
        let bkts = parser(30)
            .parse(b"t=\"1983-02-21T01:23:45+0200\" lvl=info msg= count#test=2")
            .unwrap();
        assert_eq!(1, bkts.len());
        assert_eq!(414_631_410 * NANOS_PER_SEC, bkts[0].id.time);
    }

    #[test]
    fn test_parse_no_time_uses_now() {
        let now = 1_000_007 * NANOS_PER_SEC;
        let bkts = parser(30)
            .parse_at(now, b"lvl=info msg= count#test=2")
            .unwrap();
        assert_eq!(999_990 * NANOS_PER_SEC, bkts[0].id.time);
    }

    #[test]
    fn test_parse_bad_time_uses_now() {
        let now = 1_000_007 * NANOS_PER_SEC;
        let bkts = parser(30)
            .parse_at(now, b"t=\"1983-02-21T01:23:45\" lvl=info msg= count#test=2")
            .unwrap();
        assert_eq!(999_990 * NANOS_PER_SEC, bkts[0].id.time);
    }

    #[test]
    fn test_parse_out_of_range_time_uses_now() {
        let now = 1_000_007 * NANOS_PER_SEC;
        for line in &[
            &b"t=\"1600-01-01T00:00:00+0000\" count#a=1"[..],
            &b"t=\"2300-01-01T00:00:00+0000\" count#a=1"[..],
        ] {
            let bkts = parser(30).parse_at(now, line).unwrap();
            assert_eq!(1, bkts.len());
            assert_eq!(999_990 * NANOS_PER_SEC, bkts[0].id.time);
        }
    }

    #[test]
    fn test_parse_wall_clock() {
        let before = time::quantize(time::now(), 60 * NANOS_PER_SEC);
        let bkts = parser(60).parse(b"count#test=2").unwrap();
        let after = time::quantize(time::now(), 60 * NANOS_PER_SEC);
        assert!(before <= bkts[0].id.time && bkts[0].id.time <= after);
    }

    #[test]
    fn test_parse_tags() {
        let bkts = parser(1)
            .parse(b"t=\"1983-02-21T01:23:45+0200\" lvl=info msg= count#test=2 foo=\"bar\" size=10 test=test")
            .unwrap();
        let want: Vec<(String, String)> = vec![
            ("foo".into(), "bar".into()),
            ("size".into(), "10".into()),
            ("test".into(), "test".into()),
        ];
        assert_eq!(1, bkts.len());
        assert_eq!(want, bkts[0].id.tags);
    }

    #[test]
    fn test_tags_apply_to_every_metric() {
        let bkts = parser(1)
            .parse(b"host=a count#hits=1 measure#lat=3ms az=b")
            .unwrap();
        assert_eq!(2, bkts.len());
        for bkt in &bkts {
            assert_eq!(2, bkt.id.tags.len());
            assert_eq!(("az".to_string(), "b".to_string()), bkt.id.tags[1]);
        }
        assert_eq!(bkts[0].id.time, bkts[1].id.time);
    }

    #[test]
    fn test_no_metrics_is_not_an_error() {
        assert_eq!(Ok(vec![]), parser(1).parse(b"lvl=info msg=\"hello\" user=bob"));
        assert_eq!(Ok(vec![]), parser(1).parse(b"test\n"));
        assert_eq!(Ok(vec![]), parser(1).parse(b""));
    }

    #[test]
    fn test_trailing_newline() {
        let bkts = parser(1).parse(b"count#test=2 foo=bar\n").unwrap();
        assert_eq!(1, bkts.len());
        assert_eq!(("foo".to_string(), "bar".to_string()), bkts[0].id.tags[0]);
    }

    #[test]
    fn test_count_values_round_trip() {
        fn inner(v: i32, tags: u8) -> TestResult {
            let mut line = format!("count#qc={}", v);
            for i in 0..(tags % 8) {
                line.push_str(&format!(" k{}=v{}", i, i));
            }
            let bkts = match parser(10).parse(line.as_bytes()) {
                Ok(bkts) => bkts,
                Err(_) => return TestResult::failed(),
            };
            assert_eq!(1, bkts.len());
            assert_eq!(vec![f64::from(v)], bkts[0].vals);
            assert_eq!(usize::from(tags % 8), bkts[0].id.tags.len());
            TestResult::passed()
        }
        QuickCheck::new()
            .tests(1000)
            .max_tests(10000)
            .quickcheck(inner as fn(i32, u8) -> TestResult);
    }
}
