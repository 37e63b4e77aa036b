use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use netchain::commands::add;
use netchain::commands::check;
use netchain::commands::del;
use netchain::commands::gc;
use netchain::commands::status;
use netchain::commands::version;
use netchain::commands::Settings;

#[derive(Parser, Debug)]
#[clap(version = env!("CARGO_PKG_VERSION"))]
struct Opts {
    /// Directories to search for plugin executables, ':' separated or given multiple times.
    #[clap(long = "plugin-directory", env = "CNI_PATH", value_delimiter = ':')]
    plugin_directories: Vec<PathBuf>,
    /// Directory for cached results, needed for check.
    #[clap(long, env = "NETCHAIN_CACHE_DIR", default_value = "/var/lib/cni")]
    cache_dir: PathBuf,
    /// Kill plugins that run longer than this many seconds.
    #[clap(long, env = "NETCHAIN_TIMEOUT")]
    timeout: Option<u64>,
    /// Netchain command
    #[clap(subcommand)]
    subcmd: SubCommand,
}

#[derive(Subcommand, Debug)]
enum SubCommand {
    /// Attaches a container to the network described by the config list.
    Add(add::Add),
    /// Verifies an existing attachment against its cached result.
    Check(check::Check),
    /// Removes an attachment again.
    Del(del::Del),
    /// Releases resources of attachments that no longer exist.
    Gc(gc::Gc),
    /// Reports whether the network's plugins are ready.
    Status(status::Status),
    /// Display info about netchain.
    Version(version::Version),
}

fn main() {
    env_logger::builder().format_timestamp(None).init();
    let opts = Opts::parse();

    let settings = Settings {
        plugin_paths: opts.plugin_directories,
        cache_dir: opts.cache_dir,
        timeout: opts.timeout.map(Duration::from_secs),
    };
    let result = match opts.subcmd {
        SubCommand::Add(add) => add.exec(&settings),
        SubCommand::Check(check) => check.exec(&settings),
        SubCommand::Del(del) => del.exec(&settings),
        SubCommand::Gc(gc) => gc.exec(&settings),
        SubCommand::Status(status) => status.exec(&settings),
        SubCommand::Version(version) => version.exec(),
    };

    match result {
        Ok(_) => {}
        Err(err) => {
            err.print_json();
            std::process::exit(err.get_exit_code());
        }
    }
}
