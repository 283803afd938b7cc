//! Provides the CLI option parser
//!
//! Used to parse the argv/config file into a struct that
//! the binary can consume and use as configuration data.
//!
//! Settings come from three places. Flags given on the command line win over
//! the config file, which wins over the defaults.

use clap::{App, Arg, ArgMatches};
use std::env;
use std::error;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use toml;

const VERSION: Option<&'static str> = option_env!("CARGO_PKG_VERSION");

/// Name of the config file looked for in the home directory.
pub const DEFAULT_CONFIG: &str = ".siphon.toml";

/// Widest window accepted, in seconds. One day.
pub const MAX_RESOLUTION: u64 = 86_400;

/// Configuration failures.
#[derive(Debug)]
pub enum Error {
    /// The config file could not be read.
    Io(io::Error),
    /// The config file is not valid TOML or holds unknown keys.
    Toml(toml::de::Error),
    /// A setting is out of range or inconsistent with the others.
    Invalid(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Io(ref e) => write!(f, "config: {}", e),
            Error::Toml(ref e) => write!(f, "config: {}", e),
            Error::Invalid(ref s) => write!(f, "config: {}", s),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::Io(ref e) => Some(e),
            Error::Toml(ref e) => Some(e),
            Error::Invalid(_) => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::Io(e)
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Error {
        Error::Toml(e)
    }
}

/// Where swept buckets go.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// JSON lines on stderr. See `sink::Console`.
    Console,
    /// Nowhere. See `sink::Null`.
    Null,
    /// InfluxDB over UDP. See `sink::InfluxDB`.
    InfluxDB,
}

impl FromStr for SinkKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<SinkKind, Error> {
        match s {
            "console" => Ok(SinkKind::Console),
            "null" => Ok(SinkKind::Null),
            "influxdb" => Ok(SinkKind::InfluxDB),
            _ => Err(Error::Invalid(format!("unknown sink {}", s))),
        }
    }
}

fn default_version() -> String {
    VERSION.unwrap_or("unknown").to_string()
}

/// Configuration struct for the siphon executable
///
/// Please see documentation on `parse_args` in this module for more details.
#[derive(Debug, Clone, PartialEq)]
pub struct Args {
    /// Width of an aggregation window, in seconds. Also the interval between
    /// scans.
    pub resolution: u64,
    /// Bytes of input batched before they are handed to the parser.
    pub chunk_size: usize,
    /// Chunks allowed to wait on the parser before input is dropped.
    pub max_pending: usize,
    /// Where swept buckets go.
    pub sink: SinkKind,
    /// InfluxDB destination, `udp://host:port`. Required by the influxdb
    /// sink.
    pub influxdb: Option<String>,
    /// The verbosity setting of siphon. The higher the value the more chatty
    /// siphon gets.
    pub verbose: u64,
    /// siphon version string. This is set automatically.
    pub version: String,
}

impl Default for Args {
    fn default() -> Self {
        Args {
            resolution: 10,
            chunk_size: 4096,
            max_pending: 16,
            sink: SinkKind::Console,
            influxdb: None,
            verbose: 0,
            version: default_version(),
        }
    }
}

impl Args {
    /// The window width.
    pub fn resolution(&self) -> Duration {
        Duration::from_secs(self.resolution)
    }

    /// Reject settings siphon cannot run with.
    pub fn validate(&self) -> Result<(), Error> {
        if self.resolution == 0 {
            return Err(Error::Invalid("resolution must be at least 1s".into()));
        }
        if self.resolution > MAX_RESOLUTION {
            return Err(Error::Invalid(format!(
                "resolution must be at most {}s",
                MAX_RESOLUTION
            )));
        }
        if self.chunk_size == 0 {
            return Err(Error::Invalid("chunk-size must be at least 1".into()));
        }
        if self.sink == SinkKind::InfluxDB && self.influxdb.is_none() {
            return Err(Error::Invalid("influxdb sink requires an influxdb url".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct FileConfig {
    resolution: Option<u64>,
    chunk_size: Option<usize>,
    max_pending: Option<usize>,
    sink: Option<SinkKind>,
    influxdb: Option<String>,
}

impl FileConfig {
    fn apply(self, args: &mut Args) {
        if let Some(resolution) = self.resolution {
            args.resolution = resolution;
        }
        if let Some(chunk_size) = self.chunk_size {
            args.chunk_size = chunk_size;
        }
        if let Some(max_pending) = self.max_pending {
            args.max_pending = max_pending;
        }
        if let Some(sink) = self.sink {
            args.sink = sink;
        }
        if self.influxdb.is_some() {
            args.influxdb = self.influxdb;
        }
    }
}

fn app<'a, 'b>() -> App<'a, 'b> {
    App::new("siphon")
        .version(VERSION.unwrap_or("unknown"))
        .about("aggregates l2met metrics out of logfmt streams")
        .arg(
            Arg::with_name("config-file")
                .long("config")
                .short("C")
                .value_name("config")
                .help("The config file to feed in. Defaults to ~/.siphon.toml.")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("resolution")
                .long("resolution")
                .value_name("seconds")
                .help("Width of an aggregation window.")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("chunk-size")
                .long("chunk-size")
                .value_name("bytes")
                .help("Input batched per handoff to the parser.")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("max-pending")
                .long("max-pending")
                .value_name("chunks")
                .help("Chunks queued for the parser before input is dropped.")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("sink")
                .long("sink")
                .possible_values(&["console", "null", "influxdb"])
                .help("Where swept buckets go.")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("influxdb")
                .long("influxdb")
                .value_name("url")
                .help("InfluxDB destination, udp://host:port.")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .multiple(true)
                .help("Turn on verbose output."),
        )
}

/// Parse the command line, and the config file it names.
///
/// Without `--config` the default file in the home directory is read if it
/// exists. A file named explicitly must exist.
pub fn parse_args() -> Result<Args, Error> {
    from_matches(&app().get_matches())
}

fn default_config_path() -> Option<PathBuf> {
    env::var_os("HOME").map(|home| PathBuf::from(home).join(DEFAULT_CONFIG))
}

fn read_config(path: &Path) -> Result<FileConfig, Error> {
    let mut buffer = String::new();
    File::open(path)?.read_to_string(&mut buffer)?;
    Ok(toml::from_str(&buffer)?)
}

fn flag<T: FromStr>(matches: &ArgMatches, name: &str) -> Result<Option<T>, Error> {
    match matches.value_of(name) {
        None => Ok(None),
        Some(raw) => raw.parse()
            .map(Some)
            .map_err(|_| Error::Invalid(format!("{} is not a valid {}", raw, name))),
    }
}

fn from_matches(matches: &ArgMatches) -> Result<Args, Error> {
    let mut args = Args::default();

    let file = match matches.value_of("config-file") {
        Some(path) => Some(read_config(Path::new(path))?),
        None => match default_config_path() {
            Some(ref path) if path.exists() => Some(read_config(path)?),
            _ => None,
        },
    };
    if let Some(file) = file {
        file.apply(&mut args);
    }

    if let Some(resolution) = flag(matches, "resolution")? {
        args.resolution = resolution;
    }
    if let Some(chunk_size) = flag(matches, "chunk-size")? {
        args.chunk_size = chunk_size;
    }
    if let Some(max_pending) = flag(matches, "max-pending")? {
        args.max_pending = max_pending;
    }
    if let Some(sink) = flag(matches, "sink")? {
        args.sink = sink;
    }
    if let Some(influxdb) = matches.value_of("influxdb") {
        args.influxdb = Some(influxdb.to_string());
    }
    args.verbose = matches.occurrences_of("verbose");

    args.validate()?;
    Ok(args)
}

/// Parse a config file body.
///
/// Recognized keys are `resolution`, `chunk-size`, `max-pending`, `sink` and
/// `influxdb`. Anything else is an error. Missing keys take their defaults.
///
/// # Examples
///
/// ```
/// use siphon::config::{parse_config_file, SinkKind};
///
/// let args = parse_config_file(r#"
/// resolution = 60
/// sink = "influxdb"
/// influxdb = "udp://localhost:8089"
/// "#).unwrap();
/// assert_eq!(60, args.resolution);
/// assert_eq!(SinkKind::InfluxDB, args.sink);
/// ```
pub fn parse_config_file(buffer: &str) -> Result<Args, Error> {
    let mut args = Args::default();
    let file: FileConfig = toml::from_str(buffer)?;
    file.apply(&mut args);
    args.validate()?;
    Ok(args)
}
