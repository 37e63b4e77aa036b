use std::fs::File;
use std::path::Path;

use log::error;
use nix::sched::{self, CloneFlags};

use crate::error::{NetchainError, NetchainResult};
use crate::wrap;

/// Network namespace of the calling thread.
const THREAD_NETNS: &str = "/proc/thread-self/ns/net";

fn setns(ns: &File, what: &str) -> NetchainResult<()> {
    sched::setns(ns, CloneFlags::CLONE_NEWNET).map_err(|errno| {
        NetchainError::wrap(
            format!("failed to setns to {}", what),
            std::io::Error::from(errno).into(),
        )
    })
}

/// Moves the thread back into the namespace it came from, also when the
/// closure panics.
struct RestoreGuard {
    original: Option<File>,
}

impl RestoreGuard {
    fn restore(mut self) -> NetchainResult<()> {
        match self.original.take() {
            Some(ns) => setns(&ns, "the original network namespace"),
            None => Ok(()),
        }
    }
}

impl Drop for RestoreGuard {
    fn drop(&mut self) {
        if let Some(ns) = self.original.take() {
            if let Err(e) = setns(&ns, "the original network namespace") {
                error!("failed to restore network namespace: {}", e);
            }
        }
    }
}

/// Run `f` with the calling thread moved into the network namespace at `path`.
///
/// The previous namespace is restored afterwards, also when `f` failed or panicked. Only
/// the current thread changes namespace, threads spawned by `f` do not
/// inherit it reliably and should not be used for namespace work.
pub fn with_netns<P, T, F>(path: P, f: F) -> NetchainResult<T>
where
    P: AsRef<Path>,
    F: FnOnce() -> NetchainResult<T>,
{
    let path = path.as_ref();
    let original = wrap!(File::open(THREAD_NETNS), "open current network namespace")?;
    let target = wrap!(
        File::open(path),
        format!("open network namespace {:?}", path.display())
    )?;

    setns(&target, &format!("{:?}", path.display()))?;
    let guard = RestoreGuard {
        original: Some(original),
    };
    let result = f();
    if let Err(e) = guard.restore() {
        error!("failed to restore network namespace: {}", e);
        return Err(e);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_namespace() {
        let mut called = false;
        let res = with_netns("/nonexistent/netns", || {
            called = true;
            Ok(())
        });
        assert!(res.is_err());
        assert!(!called, "closure must not run without a namespace");
        assert!(
            res.unwrap_err().to_string().contains("/nonexistent/netns"),
            "error should name the path"
        );
    }
}
