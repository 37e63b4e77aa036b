use clap::Parser;
use log::debug;

use super::{AttachmentArgs, Settings};
use crate::error::NetchainResult;
use crate::invoke::Context;

#[derive(Parser, Debug)]
pub struct Del {
    #[clap(flatten)]
    attachment: AttachmentArgs,
}

impl Del {
    /// Detach the container, every plugin is asked even if some fail.
    pub fn exec(&self, settings: &Settings) -> NetchainResult<()> {
        let (list, rt) = self.attachment.load()?;
        settings
            .cni_config()
            .del_network_list(&Context::background(), &list, &rt)?;
        debug!("{:?}", "Teardown complete");
        Ok(())
    }
}
