#![allow(unknown_lints)]

extern crate chan_signal;
extern crate chrono;
extern crate fern;
extern crate siphon;

#[macro_use]
extern crate log;

use chrono::Utc;
use siphon::app::{Application, Scheduler};
use siphon::config::{self, SinkKind};
use siphon::protocols::l2met::Parser;
use siphon::sink::{self, Console, InfluxDB, Null, Sink};
use siphon::source::{ParseOpts, Pipeline};
use siphon::store::Store;
use std::io::{self, Write};
use std::process;
use std::sync::Arc;
use std::thread;

type BoxedSink = Box<dyn Sink + Send>;

fn build_sink(args: &config::Args) -> Result<BoxedSink, sink::Error> {
    match args.sink {
        SinkKind::Console => Ok(Box::new(Console::new(io::stderr()))),
        SinkKind::Null => Ok(Box::new(Null::new())),
        SinkKind::InfluxDB => match args.influxdb {
            Some(ref dsn) => Ok(Box::new(InfluxDB::new(dsn)?)),
            None => Err(sink::Error::Dsn("no influxdb url configured".into())),
        },
    }
}

/// Ship everything still held and close the sink. Returns the exit code.
fn shutdown(app: &Application<BoxedSink>) -> i32 {
    match app.flush() {
        Ok(n) => {
            info!("flushed {} buckets", n);
            0
        }
        Err(e) => {
            error!("final flush failed: {}", e);
            1
        }
    }
}

fn main() {
    // Must come before any thread is spawned so the signals are masked
    // everywhere but here.
    let signal = chan_signal::notify(&[chan_signal::Signal::INT, chan_signal::Signal::TERM]);

    let args = match config::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(2);
        }
    };

    let level = match args.verbose {
        0 => log::LevelFilter::Error,
        1 => log::LevelFilter::Warn,
        2 => log::LevelFilter::Info,
        3 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    // stdout carries the lines we pass through, so logs go to stderr
    let logging = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}][{}][{}] {}",
                record.module_path().unwrap_or("?"),
                record.line().unwrap_or(0),
                Utc::now().to_rfc3339(),
                record.level(),
                message
            ))
        })
        .level(level)
        .chain(io::stderr())
        .apply();
    if let Err(e) = logging {
        eprintln!("could not set up logging: {}", e);
        process::exit(2);
    }

    info!("siphon - {}", args.version);

    let store = Arc::new(Store::new(args.resolution()));
    let sink = match build_sink(&args) {
        Ok(sink) => sink,
        Err(e) => {
            error!("unable to build sink: {}", e);
            process::exit(1);
        }
    };
    let app = Arc::new(Application::new(Arc::clone(&store), sink));
    let scheduler = match Scheduler::start(Arc::clone(&app), args.resolution()) {
        Ok(scheduler) => scheduler,
        Err(e) => {
            error!("unable to start scheduler: {}", e);
            process::exit(1);
        }
    };

    {
        let app = Arc::clone(&app);
        thread::spawn(move || {
            if let Some(sig) = signal.recv() {
                info!("received {:?}, shutting down", sig);
                process::exit(shutdown(&app));
            }
        });
    }

    let pipeline = Pipeline::new(Parser::new(args.resolution()), store);
    let opts = ParseOpts {
        chunk_size: args.chunk_size,
        max_pending: args.max_pending,
    };
    let stdin = io::stdin();
    let stdout = io::stdout();
    let res = pipeline.run(stdin.lock(), opts, |line| {
        if let Err(e) = stdout.lock().write_all(line) {
            trace!("unable to pass line through: {}", e);
        }
    });

    let mut code = 0;
    if let Err(e) = res {
        error!("{}", e);
        code = 1;
    }
    info!("{:?}", pipeline.stats());
    scheduler.stop();
    if shutdown(&app) != 0 {
        code = 1;
    }
    let _ = stdout.lock().flush();
    process::exit(code);
}
