use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Args;
use log::debug;

use crate::chain::CniConfig;
use crate::error::{NetchainError, NetchainResult};
use crate::invoke::{args::parse_plugin_args, RawExec};
use crate::types::{CapabilityArgs, NetworkConfigList, RuntimeConf};
use crate::wrap;

pub mod add;
pub mod check;
pub mod del;
pub mod gc;
pub mod status;
pub mod version;

/// Options every chain command shares, taken from the global flags.
#[derive(Debug, Clone)]
pub struct Settings {
    pub plugin_paths: Vec<PathBuf>,
    pub cache_dir: PathBuf,
    pub timeout: Option<Duration>,
}

impl Settings {
    fn cni_config(&self) -> CniConfig {
        let exec = match self.timeout {
            Some(t) => RawExec::with_timeout(t),
            None => RawExec::new(),
        };
        CniConfig::with_exec(self.plugin_paths.clone(), exec).cache_dir(self.cache_dir.clone())
    }
}

/// Identifies the attachment an ADD, CHECK or DEL works on.
#[derive(Args, Debug)]
pub struct AttachmentArgs {
    /// Path to the network configuration list.
    #[clap(required = true)]
    config: PathBuf,
    /// Network namespace path.
    #[clap(required = true)]
    netns: String,
    /// Container ID of the attachment.
    #[clap(long)]
    container_id: String,
    /// Interface name inside the namespace.
    #[clap(long, default_value = "eth0")]
    ifname: String,
    /// Plugin arguments as KEY=VALUE pairs separated by ';'.
    #[clap(long)]
    args: Option<String>,
    /// JSON object with capability arguments, e.g. '{"portMappings": [...]}'.
    #[clap(long)]
    capability_args: Option<String>,
}

impl AttachmentArgs {
    fn load(&self) -> NetchainResult<(NetworkConfigList, RuntimeConf)> {
        let list = load_list(&self.config)?;

        let mut rt = RuntimeConf::new(&self.container_id, &self.netns, &self.ifname);
        if let Some(args) = &self.args {
            rt.args = parse_plugin_args(args)?;
        }
        if let Some(caps) = &self.capability_args {
            let value = wrap!(
                serde_json::from_str(caps),
                "failed to parse --capability-args"
            )?;
            rt.capability_args = CapabilityArgs::from_json(value)?;
        }
        Ok((list, rt))
    }
}

fn load_list(path: &Path) -> NetchainResult<NetworkConfigList> {
    debug!("loading network config list {:?}", path);
    let bytes = wrap!(
        fs::read(path),
        format!("failed to read config {:?}", path.display())
    )?;
    NetworkConfigList::from_bytes(&bytes)
}
