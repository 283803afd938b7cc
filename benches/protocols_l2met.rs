#[macro_use]
extern crate criterion;

use criterion::Criterion;

extern crate siphon;

use siphon::protocols::l2met::Parser;
use siphon::protocols::logfmt::Tokenizer;
use std::time::Duration;

const LINE: &[u8] = b"t=\"2013-03-27T20:02:24+0000\" lvl=info msg=\"request served\" \
host=web.1 measure#http.latency=23.4ms count#http.requests=1 \
sample#conns@0.5=13 measure#db.query@0.1=1.2ms\n";

fn benchmark(c: &mut Criterion) {
    c.bench_function("tokenize_logfmt", |b| {
        b.iter(|| Tokenizer::new(LINE).count());
    });

    let parser = Parser::new(Duration::from_secs(10));
    c.bench_function("parse_l2met", move |b| {
        b.iter(|| parser.parse(LINE).map(|bkts| bkts.len()));
    });

    let parser = Parser::new(Duration::from_secs(10));
    c.bench_function("parse_l2met_no_metrics", move |b| {
        b.iter(|| parser.parse(b"lvl=info msg=\"nothing to see\" host=web.1\n").is_ok());
    });
}

criterion_group!(benches, benchmark);
criterion_main!(benches);
