//! This is just an example plugin, do not use it in production!
//!
//! Hands the previous result of the chain on unchanged. As the first plugin
//! of a chain it reports the container interface and nothing else.

use netchain::{
    error::{NetchainError, NetchainResult},
    plugin::{CmdArgs, Plugin, PluginExec},
    types::{AnyResult, CniResult, Interface},
    version::PluginInfo,
};

fn main() {
    let info = match PluginInfo::supports_from("0.3.0") {
        Ok(info) => info,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    PluginExec::new(Exec {}, info, "passthrough plugin 0.1.0-dev").exec();
}

struct Exec {}

impl Plugin for Exec {
    fn add(&self, args: &CmdArgs) -> NetchainResult<AnyResult> {
        if let Some(prev) = args.prev_result()? {
            return Ok(prev);
        }
        let result = CniResult {
            interfaces: vec![Interface {
                name: args.if_name.clone(),
                mac: String::new(),
                sandbox: args.netns.clone(),
            }],
            ..Default::default()
        };
        Ok(result.into())
    }

    fn del(&self, _args: &CmdArgs) -> NetchainResult<()> {
        Ok(())
    }

    fn check(&self, args: &CmdArgs) -> NetchainResult<Option<AnyResult>> {
        match args.prev_result()? {
            Some(_) => Ok(None),
            None => Err(NetchainError::msg("required prevResult missing")),
        }
    }

    fn gc(&self, args: &CmdArgs) -> NetchainResult<()> {
        match args.valid_attachments()? {
            Some(valid) => eprintln!("keeping {} attachments", valid.len()),
            None => eprintln!("collecting everything"),
        }
        Ok(())
    }
}
