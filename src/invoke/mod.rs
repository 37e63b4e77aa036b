//! Running a single plugin: environment encoding, process execution and
//! decoding of what comes back.
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{NetchainError, NetchainResult};
use crate::types::{self, AnyResult};
use crate::version::{self, PluginInfo, CURRENT_VERSION};

pub mod args;
pub mod context;
pub mod exec;

pub use args::{Command, InvocationArgs};
pub use context::{CancelToken, Context};
pub use exec::{find_in_path, Exec, RawExec};

/// Run a plugin command that produces a result (ADD).
///
/// A result without a declared version is taken to be in `conf_version`,
/// the version of the config the plugin was handed.
pub fn exec_plugin_with_result<E: Exec + ?Sized>(
    ctx: &Context,
    exec: &E,
    plugin_path: &Path,
    net_conf: &[u8],
    args: &InvocationArgs,
    conf_version: &str,
) -> NetchainResult<AnyResult> {
    let env = args.as_env()?;
    let stdout = exec.exec_plugin(ctx, plugin_path, net_conf, &env)?;
    types::parse_result_or(&stdout, conf_version)
}

/// Run a plugin command whose output is ignored (DEL, CHECK, GC, STATUS).
pub fn exec_plugin_without_result<E: Exec + ?Sized>(
    ctx: &Context,
    exec: &E,
    plugin_path: &Path,
    net_conf: &[u8],
    args: &InvocationArgs,
) -> NetchainResult<()> {
    let env = args.as_env()?;
    exec.exec_plugin(ctx, plugin_path, net_conf, &env)?;
    Ok(())
}

/// Ask a plugin which versions it speaks.
///
/// Plugins that predate the VERSION command reject it as unknown, those are
/// treated as speaking 0.1.0 only.
pub fn get_version_info<E: Exec + ?Sized>(
    ctx: &Context,
    exec: &E,
    plugin_path: &Path,
    path: &[PathBuf],
) -> NetchainResult<PluginInfo> {
    let args = InvocationArgs::new(Command::Version, path.to_vec());
    let stdin = serde_json::to_vec(&serde_json::json!({ "cniVersion": CURRENT_VERSION }))?;
    let env = args.as_env()?;
    match exec.exec_plugin(ctx, plugin_path, &stdin, &env) {
        Ok(stdout) => version::decode_plugin_info(&stdout),
        Err(err) => {
            if is_unknown_version_command(&err) {
                debug!("plugin {:?} does not know VERSION, assuming 0.1.0", plugin_path);
                return Ok(PluginInfo::legacy());
            }
            Err(err)
        }
    }
}

fn is_unknown_version_command(err: &NetchainError) -> bool {
    matches!(err.root_cause(), NetchainError::Plugin(e) if e.msg == "unknown CNI_COMMAND: VERSION")
}
