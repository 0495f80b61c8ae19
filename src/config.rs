//! Provides the CLI option parser
//!
//! Used to parse the argv/config file into a struct that
//! the collector can consume and use as configuration data.

use clap::{App, Arg};
use source::HttpConfig;
use std::error;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;
use toml;

const VERSION: Option<&'static str> = option_env!("CARGO_PKG_VERSION");

fn default_data_directory() -> PathBuf {
    Path::new("/tmp/metrics-collector").to_path_buf()
}

fn default_version() -> String {
    VERSION.unwrap_or("unknown").to_string()
}

/// Which uploader the collector hands its metrics to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SinkKind {
    /// See `sink::Console`.
    Console,
    /// See `sink::Null`.
    Null,
}

/// Configuration struct for the metrics-collector executable
///
/// This struct is what we construct from parsing the configuration file. See
/// `parse_args` for more details.
#[derive(Debug)]
pub struct Args {
    /// The directory in which stored batches live. This directory MUST be
    /// solely owned by the collector.
    pub data_directory: PathBuf,
    /// Seconds between scrape cycles.
    pub scrape_interval: u64,
    /// Seconds between upload cycles.
    pub upload_interval: u64,
    /// Seconds a single target may take to answer a scrape.
    pub scrape_timeout: u64,
    /// If set, stored batches older than this many seconds are pruned.
    pub retention: Option<u64>,
    /// Where uploads go.
    pub sink: SinkKind,
    /// The targets to scrape, as (name, url) pairs, ordered by name.
    pub endpoints: Vec<(String, String)>,
    /// The verbosity setting. The higher the value the more chatty the
    /// collector gets.
    pub verbose: u64,
    /// Version string. This is set automatically.
    pub version: String,
}

impl Default for Args {
    fn default() -> Self {
        Args {
            data_directory: default_data_directory(),
            scrape_interval: 60,
            upload_interval: 300,
            scrape_timeout: 10,
            retention: None,
            sink: SinkKind::Console,
            endpoints: Vec::new(),
            verbose: 0,
            version: default_version(),
        }
    }
}

impl Args {
    /// The scraper configuration these arguments describe.
    pub fn http(&self) -> HttpConfig {
        HttpConfig {
            endpoints: self.endpoints.clone(),
            timeout: Duration::from_secs(self.scrape_timeout),
        }
    }
}

/// The ways configuration may be rejected.
#[derive(Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    Io(io::Error),
    /// The configuration file is not valid TOML.
    Toml(toml::de::Error),
    /// A key holds a value of the wrong shape.
    Invalid {
        /// The offending key.
        key: String,
        /// What was expected of it.
        reason: &'static str,
    },
}

impl ConfigError {
    fn invalid<S>(key: S, reason: &'static str) -> ConfigError
    where
        S: Into<String>,
    {
        ConfigError::Invalid {
            key: key.into(),
            reason: reason,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ConfigError::Io(ref e) => write!(f, "could not read config file: {}", e),
            ConfigError::Toml(ref e) => write!(f, "could not parse config file: {}", e),
            ConfigError::Invalid { ref key, reason } => {
                write!(f, "invalid value for {}: {}", key, reason)
            }
        }
    }
}

impl error::Error for ConfigError {}

impl From<io::Error> for ConfigError {
    fn from(e: io::Error) -> ConfigError {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> ConfigError {
        ConfigError::Toml(e)
    }
}

/// Parse the collector's configuration arguments
///
/// This function will read the environment arguments and construct an
/// `Args`. Most configuration is stored in an on-disk file. See
/// `metrics-collector --help` for more information.
pub fn parse_args() -> Result<Args, ConfigError> {
    let args = App::new("metrics-collector")
        .version(VERSION.unwrap_or("unknown"))
        .about("scrapes prometheus endpoints, uploads what changed")
        .arg(
            Arg::with_name("config-file")
                .long("config")
                .short("C")
                .value_name("config")
                .required(true)
                .help("The config file to feed in.")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .multiple(true)
                .help("Turn on verbose output."),
        )
        .get_matches();

    let verb = if args.is_present("verbose") {
        args.occurrences_of("verbose")
    } else {
        0
    };

    // required(true) means clap exits before we get here without a file
    let filename = args.value_of("config-file").unwrap_or_default();
    let mut fp = File::open(filename)?;
    let mut buffer = String::new();
    fp.read_to_string(&mut buffer)?;
    parse_config_file(&buffer, verb)
}

/// Upper bound on any interval or retention, in seconds. Larger values
/// overflow timer and timestamp arithmetic.
const MAX_SECONDS: i64 = 4_294_967_295;

fn seconds(value: &toml::Value, key: &str) -> Result<u64, ConfigError> {
    match value.as_integer() {
        Some(secs) if secs > 0 && secs <= MAX_SECONDS => Ok(secs as u64),
        Some(secs) if secs > MAX_SECONDS => Err(ConfigError::invalid(
            key,
            "must be no larger than 4294967295",
        )),
        _ => Err(ConfigError::invalid(key, "must be a positive integer")),
    }
}

/// Parse the collector's configuration file.
///
/// Every key is optional; see `Args::default` for what an absent key means.
pub fn parse_config_file(buffer: &str, verbosity: u64) -> Result<Args, ConfigError> {
    let mut args = Args::default();
    let value: toml::Value = toml::from_str(buffer)?;

    args.verbose = verbosity;

    if let Some(dir) = value.get("data-directory") {
        let dir = dir.as_str()
            .ok_or_else(|| ConfigError::invalid("data-directory", "must be a string"))?;
        args.data_directory = Path::new(dir).to_path_buf();
    }

    if let Some(si) = value.get("scrape-interval") {
        args.scrape_interval = seconds(si, "scrape-interval")?;
    }

    if let Some(ui) = value.get("upload-interval") {
        args.upload_interval = seconds(ui, "upload-interval")?;
    }

    if let Some(st) = value.get("scrape-timeout") {
        args.scrape_timeout = seconds(st, "scrape-timeout")?;
    }

    if let Some(ret) = value.get("retention") {
        args.retention = Some(seconds(ret, "retention")?);
    }

    if let Some(sink) = value.get("sink") {
        args.sink = match sink.as_str() {
            Some("console") => SinkKind::Console,
            Some("null") => SinkKind::Null,
            _ => {
                return Err(ConfigError::invalid(
                    "sink",
                    "must be one of \"console\" or \"null\"",
                ))
            }
        };
    }

    if let Some(endpoints) = value.get("endpoints") {
        let tbl = endpoints
            .as_table()
            .ok_or_else(|| ConfigError::invalid("endpoints", "must be a table"))?;
        for (name, url) in tbl.iter() {
            let url = url.as_str().ok_or_else(|| {
                ConfigError::invalid(format!("endpoints.{}", name), "must be a string")
            })?;
            args.endpoints.push((name.clone(), url.to_string()));
        }
    }

    Ok(args)
}
