use clap::Parser;
use serde::Serialize;

use crate::error::NetchainResult;
use crate::version::{CURRENT_VERSION, KNOWN_VERSIONS};

#[derive(Parser, Debug)]
pub struct Version {}

#[derive(Debug, Serialize)]
struct Info {
    version: &'static str,
    commit: &'static str,
    target: &'static str,
    #[serde(rename = "cniVersion")]
    cni_version: &'static str,
    #[serde(rename = "supportedVersions")]
    supported_versions: &'static [&'static str],
}

impl Version {
    pub fn exec(&self) -> NetchainResult<()> {
        let info = Info {
            version: env!("CARGO_PKG_VERSION"),
            commit: env!("VERGEN_GIT_SHA"),
            target: env!("VERGEN_CARGO_TARGET_TRIPLE"),
            cni_version: CURRENT_VERSION,
            supported_versions: KNOWN_VERSIONS,
        };

        let out = serde_json::to_string_pretty(&info)?;
        println!("{out}");

        Ok(())
    }
}
