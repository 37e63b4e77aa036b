use std::path::PathBuf;

use clap::Parser;

use super::{load_list, Settings};
use crate::error::NetchainResult;
use crate::invoke::Context;

#[derive(Parser, Debug)]
pub struct Status {
    /// Path to the network configuration list.
    #[clap(required = true)]
    config: PathBuf,
}

impl Status {
    pub fn exec(&self, settings: &Settings) -> NetchainResult<()> {
        let list = load_list(&self.config)?;
        settings
            .cni_config()
            .get_status_network_list(&Context::background(), &list)
    }
}
