//! Encoding of an invocation into environment variables and back.
use std::collections::HashMap;
use std::env;
use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{NetchainError, NetchainResult};

pub const ENV_COMMAND: &str = "CNI_COMMAND";
pub const ENV_CONTAINER_ID: &str = "CNI_CONTAINERID";
pub const ENV_NETNS: &str = "CNI_NETNS";
pub const ENV_IFNAME: &str = "CNI_IFNAME";
pub const ENV_ARGS: &str = "CNI_ARGS";
pub const ENV_PATH: &str = "CNI_PATH";

/// Every variable the protocol owns, in encoding order.
pub const PROTOCOL_VARS: [&str; 6] = [
    ENV_COMMAND,
    ENV_CONTAINER_ID,
    ENV_NETNS,
    ENV_IFNAME,
    ENV_ARGS,
    ENV_PATH,
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Command {
    Add,
    Del,
    Check,
    Version,
    Gc,
    Status,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Add => "ADD",
            Command::Del => "DEL",
            Command::Check => "CHECK",
            Command::Version => "VERSION",
            Command::Gc => "GC",
            Command::Status => "STATUS",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = NetchainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADD" => Ok(Command::Add),
            "DEL" => Ok(Command::Del),
            "CHECK" => Ok(Command::Check),
            "VERSION" => Ok(Command::Version),
            "GC" => Ok(Command::Gc),
            "STATUS" => Ok(Command::Status),
            other => Err(NetchainError::msg(format!(
                "unknown CNI_COMMAND: {}",
                other
            ))),
        }
    }
}

/// The protocol fields of one invocation.
#[derive(Clone, Debug, PartialEq)]
pub struct InvocationArgs {
    pub command: Command,
    pub container_id: String,
    pub netns: String,
    pub if_name: String,
    pub plugin_args: Vec<(String, String)>,
    pub path: Vec<PathBuf>,
}

impl InvocationArgs {
    pub fn new(command: Command, path: Vec<PathBuf>) -> Self {
        InvocationArgs {
            command,
            container_id: String::new(),
            netns: String::new(),
            if_name: String::new(),
            plugin_args: Vec::new(),
            path,
        }
    }

    /// Encode as environment variables, fails on malformed plugin args.
    pub fn as_env(&self) -> NetchainResult<Vec<(String, String)>> {
        let args = encode_plugin_args(&self.plugin_args)?;
        let path = env::join_paths(&self.path)
            .map_err(|e| NetchainError::invalid_config(format!("invalid plugin path: {}", e)))?;
        let path = os_to_string(path)?;

        Ok(vec![
            (ENV_COMMAND.to_string(), self.command.as_str().to_string()),
            (ENV_CONTAINER_ID.to_string(), self.container_id.clone()),
            (ENV_NETNS.to_string(), self.netns.clone()),
            (ENV_IFNAME.to_string(), self.if_name.clone()),
            (ENV_ARGS.to_string(), args),
            (ENV_PATH.to_string(), path),
        ])
    }

    /// Decode the protocol variables out of an environment map.
    pub fn from_env(env: &HashMap<String, String>) -> NetchainResult<Self> {
        let get = |key: &str| env.get(key).cloned().unwrap_or_default();
        let command = env
            .get(ENV_COMMAND)
            .ok_or_else(|| NetchainError::msg(format!("{} is not set", ENV_COMMAND)))?
            .parse()?;
        let plugin_args = parse_plugin_args(&get(ENV_ARGS))?;
        Ok(InvocationArgs {
            command,
            container_id: get(ENV_CONTAINER_ID),
            netns: get(ENV_NETNS),
            if_name: get(ENV_IFNAME),
            plugin_args,
            path: split_path(&get(ENV_PATH)),
        })
    }
}

fn os_to_string(s: OsString) -> NetchainResult<String> {
    s.into_string()
        .map_err(|s| NetchainError::invalid_config(format!("path {:?} is not valid UTF-8", s)))
}

fn check_pair(key: &str, value: &str) -> NetchainResult<()> {
    if key.is_empty() || value.is_empty() || key.contains(['=', ';']) || value.contains(['=', ';'])
    {
        return Err(NetchainError::invalid_config(format!(
            "invalid CNI_ARGS pair \"{}={}\"",
            key, value
        )));
    }
    Ok(())
}

/// Join plugin arguments as `K=V;K2=V2`.
pub fn encode_plugin_args(args: &[(String, String)]) -> NetchainResult<String> {
    let mut pairs = Vec::with_capacity(args.len());
    for (k, v) in args {
        check_pair(k, v)?;
        pairs.push(format!("{}={}", k, v));
    }
    Ok(pairs.join(";"))
}

/// Split `K=V;K2=V2`, every pair must have exactly one `=` with both sides set.
pub fn parse_plugin_args(s: &str) -> NetchainResult<Vec<(String, String)>> {
    if s.is_empty() {
        return Ok(Vec::new());
    }
    s.split(';')
        .map(|pair| {
            let parts: Vec<&str> = pair.split('=').collect();
            match parts.as_slice() {
                [k, v] if !k.is_empty() && !v.is_empty() => Ok((k.to_string(), v.to_string())),
                _ => Err(NetchainError::invalid_config(format!(
                    "invalid CNI_ARGS pair \"{}\"",
                    pair
                ))),
            }
        })
        .collect()
}

/// Turn raw `NAME=value` entries into a map. The last definition of a name
/// wins and an entry without `=` maps to the empty string.
pub fn parse_environ<I, S>(entries: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut map = HashMap::new();
    for entry in entries {
        let entry = entry.as_ref();
        match entry.split_once('=') {
            Some((k, v)) => map.insert(k.to_string(), v.to_string()),
            None => map.insert(entry.to_string(), String::new()),
        };
    }
    map
}

pub fn split_path(path: &str) -> Vec<PathBuf> {
    if path.is_empty() {
        return Vec::new();
    }
    env::split_paths(path).collect()
}
