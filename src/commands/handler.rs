//! Command Handler
//!
//! Routes decoded commands to the store, the snapshot reader and the
//! configuration.
//!
//! ## Supported Commands
//!
//! - `PING` - Test connection
//! - `ECHO message` - Echo message
//! - `SET key value [PX milliseconds]` - Set a key
//! - `GET key` - Get a key's value
//! - `CONFIG GET parameter` - Read a configuration parameter
//! - `KEYS *` - List the keys stored in the snapshot file
//!
//! Failures are returned as [`CommandError`]; the connection layer turns
//! them into `-ERR ...` replies.

use crate::config::Config;
use crate::protocol::{Command, RespValue};
use crate::snapshot;
use crate::storage::{StorageEngine, StoreError};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors produced while executing a command.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("wrong number of arguments for '{0}' command")]
    WrongArity(&'static str),

    #[error("unknown subcommand '{0}' for 'CONFIG'")]
    UnknownSubcommand(String),

    #[error("unknown config parameter '{0}'")]
    UnknownParameter(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(#[from] StoreError),
}

impl CommandError {
    /// Renders the error as a RESP error reply.
    pub fn to_resp(&self) -> RespValue {
        RespValue::error(format!("ERR {}", self))
    }
}

/// Result type for command execution.
pub type CommandResult = Result<RespValue, CommandError>;

/// Executes commands against the shared store and configuration.
///
/// Cloning is cheap; each connection task holds its own clone.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    storage: Arc<StorageEngine>,
    config: Arc<Config>,
}

impl CommandHandler {
    /// Creates a new command handler.
    pub fn new(storage: Arc<StorageEngine>, config: Arc<Config>) -> Self {
        Self { storage, config }
    }

    /// Executes a command and returns the reply.
    pub async fn execute(&self, command: Command) -> CommandResult {
        let args = command.args.as_slice();
        match command.name.as_str() {
            "PING" => Ok(RespValue::pong()),
            "ECHO" => self.cmd_echo(args),
            "SET" => self.cmd_set(args),
            "GET" => self.cmd_get(args),
            "CONFIG" => self.cmd_config(args),
            "KEYS" => self.cmd_keys(args).await,
            _ => Err(CommandError::UnknownCommand(command.name.clone())),
        }
    }

    /// ECHO message
    fn cmd_echo(&self, args: &[Bytes]) -> CommandResult {
        let message = args.first().ok_or(CommandError::WrongArity("ECHO"))?;
        Ok(RespValue::bulk_string(message.clone()))
    }

    /// SET key value [PX milliseconds]
    ///
    /// A malformed PX clause is ignored rather than rejected.
    fn cmd_set(&self, args: &[Bytes]) -> CommandResult {
        let [key, value, ..] = args else {
            return Err(CommandError::WrongArity("SET"));
        };

        let ttl = parse_px(&args[2..]);
        self.storage.set(key.clone(), value.clone(), ttl)?;
        Ok(RespValue::ok())
    }

    /// GET key
    fn cmd_get(&self, args: &[Bytes]) -> CommandResult {
        let key = args.first().ok_or(CommandError::WrongArity("GET"))?;
        Ok(match self.storage.get(key) {
            Some(value) => RespValue::bulk_string(value),
            None => RespValue::null(),
        })
    }

    /// CONFIG GET parameter
    fn cmd_config(&self, args: &[Bytes]) -> CommandResult {
        let [subcommand, param, ..] = args else {
            return Err(CommandError::WrongArity("CONFIG"));
        };

        let subcommand = String::from_utf8_lossy(subcommand).to_ascii_uppercase();
        if subcommand != "GET" {
            return Err(CommandError::UnknownSubcommand(subcommand));
        }

        let name = String::from_utf8_lossy(param);
        let value = self
            .config
            .get(&name)
            .ok_or_else(|| CommandError::UnknownParameter(name.to_string()))?;
        Ok(RespValue::bulk_array([param.clone(), Bytes::from(value)]))
    }

    /// KEYS pattern
    ///
    /// Only `*` is matched; it lists the keys of the configured snapshot
    /// file. A missing or unreadable snapshot yields an empty array.
    async fn cmd_keys(&self, args: &[Bytes]) -> CommandResult {
        let pattern = args.first().ok_or(CommandError::WrongArity("KEYS"))?;
        if &pattern[..] != b"*" {
            return Ok(RespValue::bulk_array(Vec::<Bytes>::new()));
        }

        let path = self.config.snapshot_path();
        let scan = tokio::task::spawn_blocking(move || snapshot::load(path)).await;

        let keys = match scan {
            Ok(Ok(scan)) => scan.keys(),
            Ok(Err(e)) => {
                debug!(error = %e, "Snapshot unavailable for KEYS");
                Vec::new()
            }
            Err(e) => {
                debug!(error = %e, "Snapshot task failed");
                Vec::new()
            }
        };
        Ok(RespValue::bulk_array(keys))
    }
}

/// Reads a `PX <milliseconds>` clause from the arguments after key and value.
///
/// The keyword is case-insensitive and the value must be a plain base-10
/// literal; anything else means no TTL.
fn parse_px(options: &[Bytes]) -> Option<Duration> {
    let [keyword, millis, ..] = options else {
        return None;
    };
    if !keyword.eq_ignore_ascii_case(b"PX") {
        return None;
    }
    if millis.is_empty() || !millis.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(millis)
        .ok()?
        .parse::<u64>()
        .ok()
        .map(Duration::from_millis)
}
