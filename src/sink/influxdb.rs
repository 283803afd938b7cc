use metric::{Bucket, Kind};
use sink::{Error, Sink};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use url::Url;

/// Largest datagram we will send.
pub const MAX_DATAGRAM: usize = 8_192;

/// InfluxDB sink
///
/// Ships buckets to InfluxDB as line protocol over UDP. Lines are packed
/// into datagrams of at most `MAX_DATAGRAM` bytes. A line longer than that
/// goes out alone.
///
/// This talks to InfluxDB's UDP listener, not the HTTP write API. The
/// database is whatever the listener is configured to write into, so there
/// is no database, user or password to give, and a DSN carrying any of them
/// is refused.
pub struct InfluxDB {
    addr: SocketAddr,
    socket: UdpSocket,
    stats: String,
    datagram: String,
}

impl InfluxDB {
    /// Connect to the InfluxDB UDP listener named by `dsn`, of the form
    /// `udp://host:port`.
    pub fn new(dsn: &str) -> Result<InfluxDB, Error> {
        let addr = resolve(dsn)?;
        let bind = if addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind)?;
        info!("shipping to influxdb at {}", addr);
        Ok(InfluxDB {
            addr: addr,
            socket: socket,
            stats: String::with_capacity(1_024),
            datagram: String::with_capacity(MAX_DATAGRAM),
        })
    }

    fn send(&mut self) -> Result<(), Error> {
        if !self.datagram.is_empty() {
            self.socket.send_to(self.datagram.as_bytes(), self.addr)?;
            self.datagram.clear();
        }
        Ok(())
    }
}

fn resolve(dsn: &str) -> Result<SocketAddr, Error> {
    let url = Url::parse(dsn).map_err(|e| Error::Dsn(format!("{}: {}", dsn, e)))?;
    if url.scheme() != "udp" {
        return Err(Error::Dsn(format!("{}: scheme must be udp", dsn)));
    }
    let host = url.host_str()
        .ok_or_else(|| Error::Dsn(format!("{}: missing host", dsn)))?;
    let port = url.port()
        .ok_or_else(|| Error::Dsn(format!("{}: missing port", dsn)))?;
    if !url.username().is_empty() || url.password().is_some() {
        return Err(Error::Dsn(format!("{}: udp takes no credentials", dsn)));
    }
    if !(url.path().is_empty() || url.path() == "/") {
        return Err(Error::Dsn(format!("{}: udp takes no database", dsn)));
    }
    // IPv6 hosts come back bracketed
    let host = host.trim_start_matches('[').trim_end_matches(']');
    (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| Error::Dsn(format!("{}: host did not resolve", dsn)))
}

#[inline]
fn push_escaped(s: &str, escape: &[char], out: &mut String) {
    for c in s.chars() {
        if escape.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
}

#[inline]
fn push_field(key: &str, val: f64, out: &mut String) {
    if !out.ends_with(' ') {
        out.push(',');
    }
    let _ = write!(out, "{}={}", key, val);
}

/// Format one bucket as a line of InfluxDB line protocol, newline included.
///
/// Returns false, writing nothing, for a bucket with no values.
pub fn format_bucket(bkt: &Bucket, out: &mut String) -> bool {
    let summary = match bkt.summary() {
        Some(s) => s,
        None => return false,
    };

    push_escaped(&bkt.id.name.replace('.', "_"), &[',', ' '], out);
    // later duplicates win, keys sorted as influx prefers
    let tags: BTreeMap<&str, &str> = bkt.id
        .tags
        .iter()
        .filter(|&&(ref k, ref v)| !k.is_empty() && !v.is_empty())
        .map(|&(ref k, ref v)| (k.as_str(), v.as_str()))
        .collect();
    for (k, v) in tags {
        out.push(',');
        push_escaped(k, &[',', '=', ' '], out);
        out.push('=');
        push_escaped(v, &[',', '=', ' '], out);
    }
    out.push(' ');

    match bkt.kind() {
        Kind::Count => push_field("value", summary.sum, out),
        Kind::Sample => push_field("value", summary.last, out),
        Kind::Measure => {
            push_field("90_percentile", summary.p90, out);
            push_field("95_percentile", summary.p95, out);
            push_field("97_percentile", summary.p97, out);
            push_field("99_percentile", summary.p99, out);
            let _ = write!(out, ",count={}i", summary.count);
            push_field("lower", summary.lower, out);
            push_field("mean", summary.mean, out);
            push_field("sum", summary.sum, out);
            push_field("upper", summary.upper, out);
        }
    }
    let _ = writeln!(out, " {}", bkt.id.time);
    true
}

impl Sink for InfluxDB {
    fn insert(&mut self, bkts: Vec<Bucket>) -> Result<(), Error> {
        for bkt in &bkts {
            self.stats.clear();
            if !format_bucket(bkt, &mut self.stats) {
                continue;
            }
            if self.datagram.len() + self.stats.len() > MAX_DATAGRAM {
                self.send()?;
            }
            self.datagram.push_str(&self.stats);
        }
        self.send()
    }

    fn close(&mut self) -> Result<(), Error> {
        self.send()
    }
}
