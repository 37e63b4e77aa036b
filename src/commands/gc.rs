use std::path::PathBuf;

use clap::Parser;

use super::{load_list, Settings};
use crate::error::NetchainResult;
use crate::invoke::Context;
use crate::types::{Attachment, GcArgs};

#[derive(Parser, Debug)]
pub struct Gc {
    /// Path to the network configuration list.
    #[clap(required = true)]
    config: PathBuf,
    /// Attachment that must be kept, as <containerID>:<ifname>. Can be given
    /// multiple times, without it everything of the network is collected.
    #[clap(long = "valid")]
    valid: Vec<Attachment>,
}

impl Gc {
    pub fn exec(&self, settings: &Settings) -> NetchainResult<()> {
        let list = load_list(&self.config)?;
        let args = GcArgs {
            valid_attachments: if self.valid.is_empty() {
                None
            } else {
                Some(self.valid.clone())
            },
        };
        settings
            .cni_config()
            .gc_network_list(&Context::background(), &list, &args)
    }
}
