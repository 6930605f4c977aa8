//! Server Configuration
//!
//! Startup settings for FlintKV. The struct is built once from command-line
//! flags, then shared read-only (`Arc<Config>`) by the listener and every
//! command handler. `CONFIG GET` reads it through [`Config::get`].

use std::path::PathBuf;
use thiserror::Error;

/// Default host to bind to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default port (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// Default snapshot directory
pub const DEFAULT_DIR: &str = "./";

/// Default snapshot file name
pub const DEFAULT_DBFILENAME: &str = "dump.rdb";

/// Pending-connection queue length passed to `listen`
pub const ACCEPT_BACKLOG: u32 = 128;

/// Bytes read from a socket per read call
pub const READ_BUFFER_SIZE: usize = 4096;

/// Errors from command-line parsing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} requires a value")]
    MissingValue(String),

    #[error("invalid port number: {0}")]
    InvalidPort(String),

    #[error("unknown argument: {0}")]
    UnknownArgument(String),
}

/// What the command line asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliAction {
    Run(Config),
    Help,
    Version,
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Directory holding the snapshot file
    pub dir: String,
    /// Snapshot file name inside `dir`
    pub dbfilename: String,
    /// Buffer partial frames and answer every frame in a read, instead of
    /// treating each read as exactly one request
    pub pipelining: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            dir: DEFAULT_DIR.to_string(),
            dbfilename: DEFAULT_DBFILENAME.to_string(),
            pipelining: false,
        }
    }
}

impl Config {
    /// Parses flags (without the program name).
    pub fn from_args<I>(args: I) -> Result<CliAction, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut config = Config::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            let mut value = || args.next().ok_or_else(|| ConfigError::MissingValue(arg.clone()));

            match arg.as_str() {
                "--host" | "-h" => config.host = value()?,
                "--port" | "-p" => {
                    let raw = value()?;
                    config.port = raw.parse().map_err(|_| ConfigError::InvalidPort(raw))?;
                }
                "--dir" => config.dir = value()?,
                "--dbfilename" => config.dbfilename = value()?,
                "--pipelining" => config.pipelining = true,
                "--help" => return Ok(CliAction::Help),
                "--version" | "-v" => return Ok(CliAction::Version),
                other => return Err(ConfigError::UnknownArgument(other.to_string())),
            }
        }

        Ok(CliAction::Run(config))
    }

    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Location of the snapshot file: `dir + "/" + dbfilename`.
    pub fn snapshot_path(&self) -> PathBuf {
        PathBuf::from(format!("{}/{}", self.dir, self.dbfilename))
    }

    /// Looks up a parameter by name for `CONFIG GET`.
    pub fn get(&self, name: &str) -> Option<String> {
        match name.to_ascii_lowercase().as_str() {
            "dir" => Some(self.dir.clone()),
            "dbfilename" => Some(self.dbfilename.clone()),
            "port" => Some(self.port.to_string()),
            "bind" => Some(self.host.clone()),
            _ => None,
        }
    }
}
