use clap::Parser;
use log::debug;

use super::{AttachmentArgs, Settings};
use crate::error::NetchainResult;
use crate::invoke::Context;

#[derive(Parser, Debug)]
pub struct Add {
    #[clap(flatten)]
    attachment: AttachmentArgs,
}

impl Add {
    /// Attach the container to the network and print the resulting JSON.
    pub fn exec(&self, settings: &Settings) -> NetchainResult<()> {
        let (list, rt) = self.attachment.load()?;
        let result = settings
            .cni_config()
            .add_network_list(&Context::background(), &list, &rt)?;
        debug!("{:#?}", result);
        let out = serde_json::to_string(&result)?;
        println!("{}", out);
        Ok(())
    }
}
