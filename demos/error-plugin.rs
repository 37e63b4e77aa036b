//! This is just an example plugin, do not use it in production!

use netchain::{
    error::{codes, NetchainResult, PluginError},
    plugin::{CmdArgs, Plugin, PluginExec},
    types::AnyResult,
    version::{PluginInfo, KNOWN_VERSIONS},
};

fn main() {
    let info = PluginInfo::supports(KNOWN_VERSIONS);

    PluginExec::new(Exec {}, info, "error plugin 0.1.0-dev").exec();
}

struct Exec {}

impl Plugin for Exec {
    fn add(&self, _args: &CmdArgs) -> NetchainResult<AnyResult> {
        Err(PluginError::new(codes::TRY_AGAIN_LATER, "add error", "").into())
    }

    fn del(&self, _args: &CmdArgs) -> NetchainResult<()> {
        Err(PluginError::new(codes::INTERNAL, "del error", "").into())
    }

    fn check(&self, _args: &CmdArgs) -> NetchainResult<Option<AnyResult>> {
        Err(PluginError::new(codes::UNKNOWN_CONTAINER, "check error", "").into())
    }

    fn status(&self, _args: &CmdArgs) -> NetchainResult<()> {
        Err(PluginError::new(codes::NO_CONNECTIVITY, "status error", "").into())
    }
}
