#[cfg(test)]
mod tests {
    use std::fs;
    use std::panic;

    use netchain::error::NetchainError;
    use netchain::netns::with_netns;

    macro_rules! test_setup {
        () => {
            if !nix::unistd::getuid().is_root() {
                // there is no actual way to mark a test as skipped
                // https://internals.rust-lang.org/t/pre-rfc-skippable-tests/14611
                eprintln!("test skipped, requires root");
                return;
            }
            nix::sched::unshare(nix::sched::CloneFlags::CLONE_NEWNET)
                .expect("unshare(CLONE_NEWNET)");
        };
    }

    fn current_netns() -> String {
        fs::read_link("/proc/thread-self/ns/net")
            .expect("read current netns")
            .to_string_lossy()
            .into_owned()
    }

    #[test]
    fn test_with_netns_switches_and_restores() {
        test_setup!();
        let own = current_netns();
        let host = fs::read_link("/proc/1/ns/net")
            .expect("read host netns")
            .to_string_lossy()
            .into_owned();
        assert_ne!(own, host, "unshare should have created a new namespace");

        let inside = with_netns("/proc/1/ns/net", || Ok(current_netns())).unwrap();
        assert_eq!(inside, host);
        assert_eq!(current_netns(), own);
    }

    #[test]
    fn test_with_netns_restores_on_error() {
        test_setup!();
        let own = current_netns();

        let res: Result<(), NetchainError> =
            with_netns("/proc/1/ns/net", || Err(NetchainError::msg("inside failed")));
        assert_eq!(res.unwrap_err().to_string(), "inside failed");
        assert_eq!(current_netns(), own);
    }

    #[test]
    fn test_with_netns_restores_on_panic() {
        test_setup!();
        let own = current_netns();

        let res = panic::catch_unwind(|| {
            let _: Result<(), NetchainError> =
                with_netns("/proc/1/ns/net", || panic!("inside panicked"));
        });
        assert!(res.is_err());
        assert_eq!(current_netns(), own);
    }
}
