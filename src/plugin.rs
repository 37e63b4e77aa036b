//! Plugin side of the protocol: decode the invocation, call the matching
//! handler and encode its outcome.
use std::collections::HashMap;
use std::env;
use std::io::{self, Read, Write};
use std::path::PathBuf;

use log::debug;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{codes, NetchainError, NetchainResult, PluginError};
use crate::invoke::args::{self, Command};
use crate::netns;
use crate::types::{self, AnyResult, Attachment, NetConf};
use crate::version::{self, PluginInfo, CURRENT_VERSION, IMPLICIT_VERSION};

/// Everything a handler gets about the invocation, in its raw protocol form.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CmdArgs {
    pub container_id: String,
    pub netns: String,
    pub if_name: String,
    /// CNI_ARGS exactly as received.
    pub args: String,
    /// CNI_PATH exactly as received.
    pub path: String,
    pub stdin_data: Vec<u8>,
}

impl CmdArgs {
    fn from_env(env: &HashMap<String, String>, stdin_data: Vec<u8>) -> Self {
        let get = |key: &str| env.get(key).cloned().unwrap_or_default();
        CmdArgs {
            container_id: get(args::ENV_CONTAINER_ID),
            netns: get(args::ENV_NETNS),
            if_name: get(args::ENV_IFNAME),
            args: get(args::ENV_ARGS),
            path: get(args::ENV_PATH),
            stdin_data,
        }
    }

    /// The protocol variables describing these arguments for `command`.
    pub fn to_env(&self, command: Command) -> Vec<(String, String)> {
        vec![
            (args::ENV_COMMAND.to_string(), command.as_str().to_string()),
            (args::ENV_CONTAINER_ID.to_string(), self.container_id.clone()),
            (args::ENV_NETNS.to_string(), self.netns.clone()),
            (args::ENV_IFNAME.to_string(), self.if_name.clone()),
            (args::ENV_ARGS.to_string(), self.args.clone()),
            (args::ENV_PATH.to_string(), self.path.clone()),
        ]
    }

    /// Decoded CNI_ARGS, fails on malformed pairs.
    pub fn plugin_args(&self) -> NetchainResult<Vec<(String, String)>> {
        args::parse_plugin_args(&self.args)
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        args::split_path(&self.path)
    }

    /// Decode the config into the plugin's own type.
    pub fn load_conf<T: DeserializeOwned>(&self) -> NetchainResult<T> {
        Ok(serde_json::from_slice(&self.stdin_data)?)
    }

    pub fn net_conf(&self) -> NetchainResult<NetConf> {
        self.load_conf()
    }

    /// The previous result of the chain, if any was passed.
    pub fn prev_result(&self) -> NetchainResult<Option<AnyResult>> {
        match self.net_conf()?.raw_prev_result {
            Some(value) => Ok(Some(types::parse_result_value(&value)?)),
            None => Ok(None),
        }
    }

    /// The attachments a GC must keep, `None` means collect everything.
    pub fn valid_attachments(&self) -> NetchainResult<Option<Vec<Attachment>>> {
        #[derive(Deserialize)]
        struct GcConf {
            #[serde(rename = "cni.dev/valid-attachments", default)]
            valid_attachments: Option<Vec<Attachment>>,
        }
        let conf: GcConf = self.load_conf()?;
        Ok(conf.valid_attachments)
    }

    /// Run `f` inside the container's network namespace.
    pub fn with_netns<T, F>(&self, f: F) -> NetchainResult<T>
    where
        F: FnOnce() -> NetchainResult<T>,
    {
        if self.netns.is_empty() {
            return Err(NetchainError::msg("no network namespace given"));
        }
        netns::with_netns(&self.netns, f)
    }
}

/// Define the plugin functions
pub trait Plugin {
    /// set up the attachment and describe it
    fn add(&self, args: &CmdArgs) -> NetchainResult<AnyResult>;
    /// tear down the attachment, must succeed if there is nothing to remove
    fn del(&self, args: &CmdArgs) -> NetchainResult<()>;
    /// verify the attachment still matches the previous result
    fn check(&self, args: &CmdArgs) -> NetchainResult<Option<AnyResult>>;

    fn gc(&self, _args: &CmdArgs) -> NetchainResult<()> {
        Ok(())
    }

    fn status(&self, _args: &CmdArgs) -> NetchainResult<()> {
        Ok(())
    }
}

pub struct PluginExec<P: Plugin> {
    plugin: P,
    info: PluginInfo,
    about: String,
    /// Predates version negotiation: no VERSION command, speaks 0.1.0 only.
    legacy: bool,
}

impl<P: Plugin> PluginExec<P> {
    pub fn new<S: Into<String>>(plugin: P, info: PluginInfo, about: S) -> Self {
        PluginExec {
            plugin,
            info,
            about: about.into(),
            legacy: false,
        }
    }

    pub fn legacy<S: Into<String>>(plugin: P, about: S) -> Self {
        PluginExec {
            plugin,
            info: PluginInfo::legacy(),
            about: about.into(),
            legacy: true,
        }
    }

    /// Serve the invocation described by the process environment and exit
    /// non-zero with an error object on stdout if it failed.
    pub fn exec(&self) {
        let env = args::parse_environ(
            env::vars_os()
                .map(|(k, v)| format!("{}={}", k.to_string_lossy(), v.to_string_lossy())),
        );
        let stdout = io::stdout();
        if let Err(err) = self.run_with(&env, io::stdin(), stdout.lock(), io::stderr()) {
            serde_json::to_writer(io::stdout(), &err)
                .unwrap_or_else(|e| println!("failed to write json error: {}: {}", e, err));
            std::process::exit(1);
        }
    }

    /// Serve one invocation with explicit streams.
    pub fn run_with<R, W, E>(
        &self,
        env: &HashMap<String, String>,
        mut stdin: R,
        mut stdout: W,
        mut stderr: E,
    ) -> Result<(), PluginError>
    where
        R: Read,
        W: Write,
        E: Write,
    {
        let command = match env.get(args::ENV_COMMAND) {
            Some(c) if !c.is_empty() => c,
            _ => {
                // run without a command, e.g. by a human
                let _ = writeln!(stderr, "{}", self.about);
                return Ok(());
            }
        };
        let command: Command = match command.parse() {
            Ok(c) => c,
            Err(e) => {
                return Err(PluginError::new(
                    codes::INVALID_ENVIRONMENT_VARIABLES,
                    e.to_string(),
                    "",
                ))
            }
        };

        if command == Command::Version {
            if self.legacy {
                return Err(PluginError::new(
                    codes::INVALID_ENVIRONMENT_VARIABLES,
                    "unknown CNI_COMMAND: VERSION",
                    "",
                ));
            }
            let reply = PluginInfo {
                cni_version: CURRENT_VERSION.to_string(),
                supported_versions: self.info.supported_versions.clone(),
            };
            return write_json(&mut stdout, &reply).map_err(|e| e.to_plugin_error());
        }

        check_required_env(command, env)?;

        let mut stdin_data = Vec::new();
        if let Err(e) = stdin.read_to_end(&mut stdin_data) {
            return Err(NetchainError::wrap("error reading from stdin", e.into()).to_plugin_error());
        }
        let cmd_args = CmdArgs::from_env(env, stdin_data);

        let conf_version = match version::declared_version(&cmd_args.stdin_data) {
            Ok(v) => v,
            Err(e) => {
                return Err(
                    NetchainError::wrap("decoding version from network config", e)
                        .to_plugin_error(),
                )
            }
        };

        self.dispatch(command, &cmd_args, &conf_version, &mut stdout)
            .map_err(|e| {
                let mut err = e.to_plugin_error();
                err.cni_version = Some(conf_version.clone());
                err
            })
    }

    fn dispatch<W: Write>(
        &self,
        command: Command,
        cmd_args: &CmdArgs,
        conf_version: &str,
        stdout: &mut W,
    ) -> NetchainResult<()> {
        if !self.legacy {
            self.info.confirm(conf_version)?;
        }
        let out_version = if self.legacy {
            IMPLICIT_VERSION
        } else {
            conf_version
        };

        debug!("dispatching {} for config version {}", command, conf_version);
        match command {
            Command::Add => {
                let result = self.plugin.add(cmd_args)?;
                result.print_as(out_version, stdout)?;
            }
            Command::Del => self.plugin.del(cmd_args)?,
            Command::Check => {
                require_version(conf_version, version::MIN_CHECK_VERSION, command)?;
                if let Some(result) = self.plugin.check(cmd_args)? {
                    result.print_as(out_version, stdout)?;
                }
            }
            Command::Gc => {
                require_version(conf_version, version::MIN_GC_VERSION, command)?;
                self.plugin.gc(cmd_args)?;
            }
            Command::Status => {
                require_version(conf_version, version::MIN_GC_VERSION, command)?;
                self.plugin.status(cmd_args)?;
            }
            // answered before the config is read
            Command::Version => {}
        }
        Ok(())
    }
}

fn write_json<W: Write, T: serde::Serialize>(w: &mut W, value: &T) -> NetchainResult<()> {
    serde_json::to_writer(&mut *w, value)?;
    Ok(())
}

fn require_version(conf_version: &str, min: &str, command: Command) -> NetchainResult<()> {
    if version::greater_than_or_equal_to(conf_version, min)? {
        return Ok(());
    }
    Err(PluginError::new(
        codes::INCOMPATIBLE_CNI_VERSION,
        format!("config version does not allow {}", command),
        format!("{} requires at least {}, config is {}", command, min, conf_version),
    )
    .into())
}

/// Fail with the list of protocol variables `command` needs but did not get.
fn check_required_env(command: Command, env: &HashMap<String, String>) -> Result<(), PluginError> {
    let required: &[&str] = match command {
        Command::Add | Command::Check => &[
            args::ENV_CONTAINER_ID,
            args::ENV_NETNS,
            args::ENV_IFNAME,
            args::ENV_PATH,
        ],
        Command::Del => &[args::ENV_CONTAINER_ID, args::ENV_IFNAME, args::ENV_PATH],
        Command::Gc | Command::Status => &[args::ENV_PATH],
        Command::Version => &[],
    };
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|var| env.get(*var).map(|v| v.is_empty()).unwrap_or(true))
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    Err(PluginError::new(
        codes::INVALID_ENVIRONMENT_VARIABLES,
        format!("required env variables [{}] missing", missing.join(",")),
        "",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_cmd_args_env_is_lossless() {
        let e = env(&[
            ("CNI_COMMAND", "ADD"),
            ("CNI_CONTAINERID", "cid-1"),
            ("CNI_NETNS", "/var/run/netns/x"),
            ("CNI_IFNAME", "eth0"),
            ("CNI_ARGS", "not even=valid;;"),
            ("CNI_PATH", "/a::/b"),
        ]);
        let args = CmdArgs::from_env(&e, b"{}".to_vec());
        let back: HashMap<String, String> = args.to_env(Command::Add).into_iter().collect();
        assert_eq!(back, e);
        assert_eq!(CmdArgs::from_env(&back, b"{}".to_vec()), args);
    }

    #[test]
    fn test_missing_env_lists_all() {
        let err = check_required_env(Command::Add, &env(&[("CNI_IFNAME", "eth0")])).unwrap_err();
        assert_eq!(err.code, codes::INVALID_ENVIRONMENT_VARIABLES);
        assert_eq!(
            err.msg,
            "required env variables [CNI_CONTAINERID,CNI_NETNS,CNI_PATH] missing"
        );
        assert!(check_required_env(Command::Gc, &env(&[("CNI_PATH", "/bin")])).is_ok());
        assert!(check_required_env(Command::Version, &env(&[])).is_ok());
        // DEL does not need a namespace
        assert!(check_required_env(
            Command::Del,
            &env(&[("CNI_CONTAINERID", "c"), ("CNI_IFNAME", "eth0"), ("CNI_PATH", "/bin")])
        )
        .is_ok());
    }

    #[test]
    fn test_valid_attachments() {
        let args = CmdArgs {
            stdin_data: br#"{"cni.dev/valid-attachments":[{"containerID":"a","ifname":"eth0"}]}"#
                .to_vec(),
            ..Default::default()
        };
        assert_eq!(
            args.valid_attachments().unwrap(),
            Some(vec![Attachment::new("a", "eth0")])
        );
        let args = CmdArgs {
            stdin_data: b"{}".to_vec(),
            ..Default::default()
        };
        assert_eq!(args.valid_attachments().unwrap(), None);
    }

    #[test]
    fn test_with_netns_needs_namespace() {
        let args = CmdArgs::default();
        assert!(args.with_netns(|| Ok(())).is_err());
    }
}
