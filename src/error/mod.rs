use std::error::Error;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub type NetchainResult<T> = Result<T, NetchainError>;

/// wrap any result into a NetchainError and add the given msg
#[macro_export]
macro_rules! wrap {
    ($result:expr, $msg:expr) => {
        $result.map_err(|err| NetchainError::wrap($msg, err.into()))
    };
}

/// Well known error codes a plugin may report in its error object.
pub mod codes {
    pub const INCOMPATIBLE_CNI_VERSION: u32 = 1;
    pub const UNSUPPORTED_FIELD: u32 = 2;
    pub const UNKNOWN_CONTAINER: u32 = 3;
    pub const INVALID_ENVIRONMENT_VARIABLES: u32 = 4;
    pub const IO_FAILURE: u32 = 5;
    pub const DECODING_FAILURE: u32 = 6;
    pub const INVALID_NETWORK_CONFIG: u32 = 7;
    pub const TRY_AGAIN_LATER: u32 = 11;
    pub const LIMITED_CONNECTIVITY: u32 = 50;
    pub const NO_CONNECTIVITY: u32 = 51;
    pub const INTERNAL: u32 = 999;
}

/// The error object a plugin writes to stdout before exiting non-zero.
/// This is the only structured error that crosses the process boundary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginError {
    #[serde(rename = "cniVersion", default, skip_serializing_if = "Option::is_none")]
    pub cni_version: Option<String>,

    #[serde(rename = "code")]
    pub code: u32,

    #[serde(rename = "msg")]
    pub msg: String,

    #[serde(rename = "details", default, skip_serializing_if = "String::is_empty")]
    pub details: String,
}

impl PluginError {
    pub fn new<S, D>(code: u32, msg: S, details: D) -> Self
    where
        S: Into<String>,
        D: Into<String>,
    {
        PluginError {
            cni_version: None,
            code,
            msg: msg.into(),
            details: details.into(),
        }
    }
}

impl fmt::Display for PluginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.details.is_empty() {
            write!(f, "{}", self.msg)
        } else {
            write!(f, "{}; {}", self.msg, self.details)
        }
    }
}

impl Error for PluginError {}

/// The step of a chain run in which a plugin failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Discovery,
    Negotiation,
    Execution,
    Conversion,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Discovery => "discovery",
            Phase::Negotiation => "negotiation",
            Phase::Execution => "execution",
            Phase::Conversion => "conversion",
        };
        f.write_str(s)
    }
}

/// Contains a list of errors, this is useful for DEL and GC since we
/// should cleanup as much as possible before return all encountered errors.
#[derive(Debug)]
pub struct NetchainErrorList(Vec<NetchainError>);

impl NetchainErrorList {
    pub fn new() -> Self {
        Self(vec![])
    }

    pub fn push(&mut self, err: NetchainError) {
        match err {
            // make sure the flatten the error list, nested lists would just look ugly
            NetchainError::List(mut list) => self.0.append(&mut list.0),
            err => self.0.push(err),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn errors(&self) -> &[NetchainError] {
        &self.0
    }

    /// Ok when nothing was collected, the error itself when there is exactly
    /// one and the whole list otherwise.
    pub fn into_result(mut self) -> NetchainResult<()> {
        match self.0.len() {
            0 => Ok(()),
            1 => Err(self.0.remove(0)),
            _ => Err(NetchainError::List(self)),
        }
    }
}

// clippy wants the default implementation even if it is not needed
impl Default for NetchainErrorList {
    fn default() -> Self {
        Self::new()
    }
}

pub trait ErrorWrap<T> {
    /// wrap NetchainResult error into a NetchainError and add the given msg
    fn wrap<S>(self, msg: S) -> NetchainResult<T>
    where
        S: Into<String>;
}

impl<T> ErrorWrap<T> for NetchainResult<T> {
    fn wrap<S>(self, msg: S) -> NetchainResult<T>
    where
        S: Into<String>,
    {
        self.map_err(|err| NetchainError::wrap(msg, err))
    }
}

/// The main netchain error type
#[derive(Debug)]
pub enum NetchainError {
    // A string message
    Message(String),
    // A string message that sets a specific exit code for the binary
    ExitCode(String, i32),
    // A chain of multiple errors
    Chain(String, Box<NetchainError>),

    Io(std::io::Error),

    Serde(serde_json::Error),

    /// Malformed configuration, runtime arguments or CNI_ARGS.
    InvalidConfig(String),

    /// The plugin reported a structured error.
    Plugin(PluginError),

    /// The requested version is not in the set the plugin supports.
    Incompatible {
        requested: String,
        supported: Vec<String>,
    },

    NoPluginName,
    NoPaths,
    PluginNotFound {
        name: String,
        paths: Vec<String>,
    },

    /// Non-zero exit without a parsable error object.
    ExecFailed {
        status: String,
        output: String,
    },

    Timeout {
        after: Duration,
        stderr: String,
    },

    Cancelled {
        stderr: String,
    },

    /// A result cannot be represented in the requested version.
    Conversion(String),

    /// A plugin of a chain failed, identifies the plugin and the failing step.
    Stage {
        plugin: String,
        position: usize,
        phase: Phase,
        source: Box<NetchainError>,
    },

    List(NetchainErrorList),
}

impl NetchainError {
    pub fn msg<S>(msg: S) -> NetchainError
    where
        S: Into<String>,
    {
        NetchainError::Message(msg.into())
    }

    pub fn wrap<S>(msg: S, chained: NetchainError) -> NetchainError
    where
        S: Into<String>,
    {
        NetchainError::Chain(msg.into(), Box::new(chained))
    }

    pub fn invalid_config<S>(msg: S) -> NetchainError
    where
        S: Into<String>,
    {
        NetchainError::InvalidConfig(msg.into())
    }

    pub fn conversion<S>(msg: S) -> NetchainError
    where
        S: Into<String>,
    {
        NetchainError::Conversion(msg.into())
    }

    pub fn stage<S>(plugin: S, position: usize, phase: Phase, err: NetchainError) -> NetchainError
    where
        S: Into<String>,
    {
        NetchainError::Stage {
            plugin: plugin.into(),
            position,
            phase,
            source: Box::new(err),
        }
    }

    /// Print the error in a standardized JSON format recognized by callers.
    pub fn print_json(&self) {
        let to_json = self.to_plugin_error();
        println!(
            "{}",
            serde_json::to_string(&to_json)
                .unwrap_or(format!("Failed to serialize error message: {}", to_json.msg))
        );
    }

    /// Get the exit code that the binary should exit with
    pub fn get_exit_code(&self) -> i32 {
        match *self {
            NetchainError::ExitCode(_, i) => i,
            _ => 1,
        }
    }

    /// unwrap the chain and stage errors recursively until we a non wrapping type error
    pub fn root_cause(&self) -> &NetchainError {
        match self {
            NetchainError::Chain(_, inner) => inner.root_cause(),
            NetchainError::Stage { source, .. } => source.root_cause(),
            _ => self,
        }
    }

    /// Map the error onto the wire error object with the matching code.
    pub fn to_plugin_error(&self) -> PluginError {
        match self.root_cause() {
            NetchainError::Plugin(e) => {
                // keep the plugin's code but do not lose the context we added
                let mut e = e.clone();
                if !matches!(self, NetchainError::Plugin(_)) {
                    e.msg = self.to_string();
                }
                e
            }
            NetchainError::Incompatible {
                requested,
                supported,
            } => PluginError::new(
                codes::INCOMPATIBLE_CNI_VERSION,
                "incompatible CNI versions",
                format!("config is \"{}\", plugin supports {:?}", requested, supported),
            ),
            NetchainError::InvalidConfig(_) => {
                PluginError::new(codes::INVALID_NETWORK_CONFIG, self.to_string(), "")
            }
            NetchainError::Serde(_) => {
                PluginError::new(codes::DECODING_FAILURE, self.to_string(), "")
            }
            NetchainError::Io(_) => PluginError::new(codes::IO_FAILURE, self.to_string(), ""),
            _ => PluginError::new(codes::INTERNAL, self.to_string(), ""),
        }
    }
}

impl fmt::Display for NetchainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetchainError::Message(s) => write!(f, "{}", s),
            NetchainError::ExitCode(s, _) => write!(f, "{}", s),
            NetchainError::Chain(s, e) => write!(f, "{}: {}", s, e),
            NetchainError::Io(e) => write!(f, "IO error: {}", e),
            NetchainError::Serde(e) => write!(f, "JSON Decoding error: {}", e),
            NetchainError::InvalidConfig(s) => write!(f, "invalid configuration: {}", s),
            NetchainError::Plugin(e) => write!(f, "{}", e),
            NetchainError::Incompatible {
                requested,
                supported,
            } => write!(
                f,
                "incompatible CNI versions: config is \"{}\", plugin supports {:?}",
                requested, supported
            ),
            NetchainError::NoPluginName => write!(f, "no plugin name provided"),
            NetchainError::NoPaths => write!(f, "no paths provided"),
            NetchainError::PluginNotFound { name, paths } => {
                write!(f, "failed to find plugin \"{}\" in path {:?}", name, paths)
            }
            NetchainError::ExecFailed { status, output } => {
                write!(f, "plugin failed ({}) with output: {:?}", status, output)
            }
            NetchainError::Timeout { after, stderr } => {
                write!(f, "plugin timed out after {:?}", after)?;
                if !stderr.is_empty() {
                    write!(f, ", stderr: {}", stderr.trim_end())?;
                }
                Ok(())
            }
            NetchainError::Cancelled { stderr } => {
                write!(f, "plugin execution cancelled")?;
                if !stderr.is_empty() {
                    write!(f, ", stderr: {}", stderr.trim_end())?;
                }
                Ok(())
            }
            NetchainError::Conversion(s) => write!(f, "cannot convert: {}", s),
            NetchainError::Stage {
                plugin,
                position,
                phase,
                source,
            } => write!(
                f,
                "plugin type=\"{}\" (position {}) failed during {}: {}",
                plugin, position, phase, source
            ),
            NetchainError::List(list) => {
                if list.0.len() == 1 {
                    write!(f, "{}", list.0[0])
                } else {
                    write!(f, "netchain encountered multiple errors:")?;
                    for e in &list.0 {
                        write!(f, "\n\t- {}", e)?;
                    }
                    Ok(())
                }
            }
        }
    }
}

impl Error for NetchainError {}

impl From<std::io::Error> for NetchainError {
    fn from(err: std::io::Error) -> NetchainError {
        NetchainError::Io(err)
    }
}

impl From<serde_json::Error> for NetchainError {
    fn from(err: serde_json::Error) -> NetchainError {
        NetchainError::Serde(err)
    }
}

impl From<PluginError> for NetchainError {
    fn from(err: PluginError) -> NetchainError {
        NetchainError::Plugin(err)
    }
}

impl From<ipnet::AddrParseError> for NetchainError {
    fn from(e: ipnet::AddrParseError) -> Self {
        NetchainError::Message(format!("{}", e))
    }
}
