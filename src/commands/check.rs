use clap::Parser;

use super::{AttachmentArgs, Settings};
use crate::error::NetchainResult;
use crate::invoke::Context;

#[derive(Parser, Debug)]
pub struct Check {
    #[clap(flatten)]
    attachment: AttachmentArgs,
}

impl Check {
    pub fn exec(&self, settings: &Settings) -> NetchainResult<()> {
        let (list, rt) = self.attachment.load()?;
        settings
            .cni_config()
            .check_network_list(&Context::background(), &list, &rt)
    }
}
