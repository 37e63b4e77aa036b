//! Helpers shared by the test programs.
#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use netchain::error::{codes, NetchainError, NetchainResult, PluginError};
use netchain::invoke::{Context, Exec};
use netchain::version::{PluginInfo, KNOWN_VERSIONS};
use serde_json::Value;

/// One recorded plugin invocation.
#[derive(Clone, Debug)]
pub struct Call {
    pub plugin: String,
    pub command: String,
    pub env: HashMap<String, String>,
    pub stdin: Value,
}

type Handler = Box<dyn Fn(&Call) -> NetchainResult<Vec<u8>> + Send + Sync>;

struct FakePlugin {
    /// Empty means the plugin predates VERSION.
    versions: Vec<String>,
    handler: Handler,
}

/// In-process stand-in for plugin executables. Answers VERSION itself and
/// routes everything else to the registered handler.
#[derive(Default)]
pub struct FakeExec {
    plugins: HashMap<String, FakePlugin>,
    calls: Mutex<Vec<Call>>,
}

impl FakeExec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plugin<F>(self, name: &str, handler: F) -> Self
    where
        F: Fn(&Call) -> NetchainResult<Vec<u8>> + Send + Sync + 'static,
    {
        self.plugin_with_versions(name, KNOWN_VERSIONS, handler)
    }

    pub fn plugin_with_versions<F>(mut self, name: &str, versions: &[&str], handler: F) -> Self
    where
        F: Fn(&Call) -> NetchainResult<Vec<u8>> + Send + Sync + 'static,
    {
        self.plugins.insert(
            name.to_string(),
            FakePlugin {
                versions: versions.iter().map(|v| v.to_string()).collect(),
                handler: Box::new(handler),
            },
        );
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// (plugin, command) of every call except VERSION queries.
    pub fn invocations(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter(|c| c.command != "VERSION")
            .map(|c| (c.plugin, c.command))
            .collect()
    }

    pub fn calls_of(&self, plugin: &str, command: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.plugin == plugin && c.command == command)
            .collect()
    }
}

impl Exec for FakeExec {
    fn exec_plugin(
        &self,
        _ctx: &Context,
        plugin_path: &Path,
        stdin: &[u8],
        env: &[(String, String)],
    ) -> NetchainResult<Vec<u8>> {
        let name = plugin_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let env: HashMap<String, String> = env.iter().cloned().collect();
        let call = Call {
            plugin: name.clone(),
            command: env.get("CNI_COMMAND").cloned().unwrap_or_default(),
            env,
            stdin: serde_json::from_slice(stdin).unwrap_or(Value::Null),
        };
        self.calls.lock().unwrap().push(call.clone());

        let plugin = self
            .plugins
            .get(&name)
            .ok_or_else(|| NetchainError::msg(format!("no fake plugin {}", name)))?;
        if call.command == "VERSION" {
            if plugin.versions.is_empty() {
                return plugin_error(
                    codes::INVALID_ENVIRONMENT_VARIABLES,
                    "unknown CNI_COMMAND: VERSION",
                );
            }
            return Ok(serde_json::to_vec(&PluginInfo::supports(&plugin.versions))?);
        }
        (plugin.handler)(&call)
    }

    fn find_in_path(&self, plugin: &str, paths: &[PathBuf]) -> NetchainResult<PathBuf> {
        if plugin.is_empty() {
            return Err(NetchainError::NoPluginName);
        }
        if paths.is_empty() {
            return Err(NetchainError::NoPaths);
        }
        if self.plugins.contains_key(plugin) {
            return Ok(paths[0].join(plugin));
        }
        Err(NetchainError::PluginNotFound {
            name: plugin.to_string(),
            paths: paths.iter().map(|p| p.display().to_string()).collect(),
        })
    }
}

pub fn json(value: Value) -> NetchainResult<Vec<u8>> {
    Ok(serde_json::to_vec(&value)?)
}

pub fn plugin_error(code: u32, msg: &str) -> NetchainResult<Vec<u8>> {
    Err(PluginError::new(code, msg, "").into())
}

pub fn no_output(_call: &Call) -> NetchainResult<Vec<u8>> {
    Ok(Vec::new())
}

/// Writing an executable while another thread forks can make the exec fail
/// with ETXTBSY, tests that write and run scripts hold this lock.
pub fn exec_lock() -> MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = Mutex::new(());
    LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("write plugin script");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod plugin script");
    path
}

pub fn tempdir() -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix("netchain-tests")
        .tempdir()
        .expect("create tempdir")
}
