use anyhow::Result;
use vergen::{vergen, Config};

fn main() -> Result<()> {
    // VERGEN_GIT_SHA and VERGEN_CARGO_TARGET_TRIPLE feed `netchain version`
    if vergen(Config::default()).is_err() {
        // source trees outside of git have no commit to report
        let mut config = Config::default();
        *config.git_mut().enabled_mut() = false;
        vergen(config)?;
        println!("cargo:rustc-env=VERGEN_GIT_SHA=unknown");
    }
    Ok(())
}
