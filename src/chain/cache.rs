use std::{
    fs::{self, File},
    io::{self, ErrorKind, Write},
    path::{Path, PathBuf},
};

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::{NetchainError, NetchainResult},
    types::{self, AnyResult, Attachment, RuntimeConf},
    wrap,
};

/// File layout looks like this
/// $cache/results/$network-$containerID-$ifname -> last ADD result of the attachment
/// $cache/results/.$network-$containerID-$ifname.tmp -> entry being written
const RESULTS_DIR: &str = "results";
const CACHE_KIND: &str = "cniCacheV1";

/// macro to quickly wrap the IO error with useful context
/// First argument is the function, second the path, third the extra error message.
/// The full error is "$msg $path: $org_error"
macro_rules! fs_err {
    ($func:expr, $path:expr, $msg:expr) => {
        $func($path).map_err(|err| {
            NetchainError::wrap(format!("{} {:?}", $msg, $path.display()), err.into())
        })
    };
}

fn remove_file_ignore_enoent<P: AsRef<Path>>(path: P) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(ok) => Ok(ok),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// What is stored per attachment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CachedResult {
    #[serde(rename = "kind")]
    pub kind: String,

    #[serde(rename = "containerId")]
    pub container_id: String,

    #[serde(rename = "ifName")]
    pub if_name: String,

    #[serde(rename = "networkName")]
    pub network_name: String,

    #[serde(rename = "cniArgs", default)]
    pub cni_args: Vec<(String, String)>,

    #[serde(rename = "capabilityArgs", default)]
    pub capability_args: Value,

    #[serde(rename = "result")]
    pub result: Value,
}

impl CachedResult {
    pub fn attachment(&self) -> Attachment {
        Attachment::new(self.container_id.clone(), self.if_name.clone())
    }

    pub fn parse_result(&self) -> NetchainResult<AnyResult> {
        types::parse_result_value(&self.result)
    }

    /// Names containing '-' can map different attachments to one file name,
    /// only the stored fields tell them apart.
    fn is_for(&self, network: &str, container_id: &str, if_name: &str) -> bool {
        self.network_name == network && self.container_id == container_id && self.if_name == if_name
    }
}

fn results_dir(cache_dir: &Path) -> PathBuf {
    cache_dir.join(RESULTS_DIR)
}

fn result_file(cache_dir: &Path, network: &str, container_id: &str, if_name: &str) -> PathBuf {
    results_dir(cache_dir).join(format!("{}-{}-{}", network, container_id, if_name))
}

/// Store the result of a successful ADD.
pub fn write_result(
    cache_dir: &Path,
    network: &str,
    rt: &RuntimeConf,
    result: &AnyResult,
) -> NetchainResult<()> {
    let dir = results_dir(cache_dir);
    fs_err!(fs::create_dir_all, &dir, "create result cache dir")?;

    let entry = CachedResult {
        kind: CACHE_KIND.to_string(),
        container_id: rt.container_id.clone(),
        if_name: rt.if_name.clone(),
        network_name: network.to_string(),
        cni_args: rt.args.clone(),
        capability_args: rt.capability_args.to_json(),
        result: result.to_value()?,
    };

    let path = result_file(cache_dir, network, &rt.container_id, &rt.if_name);
    let data = serde_json::to_vec(&entry)?;
    persist(&path, &data)?;
    debug!("cached result for {} in {:?}", network, path);
    Ok(())
}

/// Write to a temp file next to `path` and rename it into place, readers
/// never see a partially written entry.
fn persist(path: &Path, data: &[u8]) -> NetchainResult<()> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.tmp", name));

    let res = fs_err!(File::create, &tmp, "create cached result").and_then(|mut file| {
        file.write_all(data)
            .and_then(|_| file.sync_all())
            .map_err(|e| {
                NetchainError::wrap(format!("write cached result {:?}", tmp.display()), e.into())
            })
    });
    let res = res.and_then(|_| {
        fs::rename(&tmp, path).map_err(|e| {
            NetchainError::wrap(format!("replace cached result {:?}", path.display()), e.into())
        })
    });
    if res.is_err() {
        let _ = remove_file_ignore_enoent(&tmp);
    }
    res
}

/// Read the stored entry of an attachment, `None` when there is none.
pub fn read_result(
    cache_dir: &Path,
    network: &str,
    container_id: &str,
    if_name: &str,
) -> NetchainResult<Option<CachedResult>> {
    let path = result_file(cache_dir, network, container_id, if_name);
    match read_entry(&path)? {
        Some(entry) if entry.is_for(network, container_id, if_name) => Ok(Some(entry)),
        Some(entry) => {
            debug!(
                "cached result {:?} belongs to {} ({}) on {}, ignoring it",
                path, entry.container_id, entry.if_name, entry.network_name
            );
            Ok(None)
        }
        None => Ok(None),
    }
}

fn read_entry(path: &Path) -> NetchainResult<Option<CachedResult>> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(NetchainError::wrap(
                format!("read cached result {:?}", path.display()),
                err.into(),
            ))
        }
    };
    let entry: CachedResult = wrap!(
        serde_json::from_slice(&bytes),
        format!("parse cached result {:?}", path.display())
    )?;
    if entry.kind != CACHE_KIND {
        return Err(NetchainError::msg(format!(
            "cached result {:?} has unknown kind \"{}\"",
            path.display(),
            entry.kind
        )));
    }
    Ok(Some(entry))
}

pub fn remove_result(
    cache_dir: &Path,
    network: &str,
    container_id: &str,
    if_name: &str,
) -> NetchainResult<()> {
    let path = result_file(cache_dir, network, container_id, if_name);
    // leave the entry of another attachment that shares the file name alone,
    // unreadable entries still get removed
    if let Ok(Some(entry)) = read_entry(&path) {
        if !entry.is_for(network, container_id, if_name) {
            return Ok(());
        }
    }
    fs_err!(remove_file_ignore_enoent, &path, "remove cached result")
}

/// All cached entries of a network.
pub fn network_entries(cache_dir: &Path, network: &str) -> NetchainResult<Vec<CachedResult>> {
    let dir = results_dir(cache_dir);
    let read_dir = match fs::read_dir(&dir) {
        Ok(r) => r,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(vec![]),
        Err(err) => {
            return Err(NetchainError::wrap(
                format!("read result cache dir {:?}", dir.display()),
                err.into(),
            ))
        }
    };

    let prefix = format!("{}-", network);
    let mut entries = Vec::new();
    for dir_entry in read_dir {
        let path = dir_entry?.path();
        let matches_prefix = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with(&prefix))
            .unwrap_or(false);
        if !matches_prefix {
            continue;
        }
        // the prefix is ambiguous for names containing '-', the stored name decides
        match read_entry(&path) {
            Ok(Some(entry)) if entry.network_name == network => entries.push(entry),
            Ok(_) => {}
            Err(e) => warn!("skipping unreadable cache entry: {}", e),
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::parse_result;

    fn rt(cid: &str) -> RuntimeConf {
        let mut rt = RuntimeConf::new(cid, "/var/run/netns/x", "eth0");
        rt.args = vec![("K".to_string(), "V".to_string())];
        rt
    }

    #[test]
    fn test_write_read_remove() {
        let dir = tempfile::Builder::new()
            .prefix("netchain-tests")
            .tempdir()
            .unwrap();
        let result =
            parse_result(br#"{"cniVersion":"1.0.0","ips":[{"address":"10.0.0.2/24"}]}"#).unwrap();

        assert!(read_result(dir.path(), "net", "cid-1", "eth0").unwrap().is_none());
        write_result(dir.path(), "net", &rt("cid-1"), &result).unwrap();

        let entry = read_result(dir.path(), "net", "cid-1", "eth0")
            .unwrap()
            .unwrap();
        assert_eq!(entry.kind, "cniCacheV1");
        assert_eq!(entry.network_name, "net");
        assert_eq!(entry.cni_args, vec![("K".to_string(), "V".to_string())]);
        assert_eq!(entry.parse_result().unwrap(), result);
        assert!(dir.path().join("results/net-cid-1-eth0").is_file());

        remove_result(dir.path(), "net", "cid-1", "eth0").unwrap();
        assert!(read_result(dir.path(), "net", "cid-1", "eth0").unwrap().is_none());
        // missing files are fine
        remove_result(dir.path(), "net", "cid-1", "eth0").unwrap();
    }

    #[test]
    fn test_colliding_file_names() {
        let dir = tempfile::Builder::new()
            .prefix("netchain-tests")
            .tempdir()
            .unwrap();
        let result = parse_result(br#"{"cniVersion":"1.0.0"}"#).unwrap();

        // both attachments map to results/a-b-c-eth0
        write_result(dir.path(), "a-b", &rt("c"), &result).unwrap();
        assert!(dir.path().join("results/a-b-c-eth0").is_file());
        assert!(read_result(dir.path(), "a", "b-c", "eth0").unwrap().is_none());

        remove_result(dir.path(), "a", "b-c", "eth0").unwrap();
        let entry = read_result(dir.path(), "a-b", "c", "eth0").unwrap().unwrap();
        assert_eq!(entry.network_name, "a-b");
        assert_eq!(entry.container_id, "c");
    }

    #[test]
    fn test_write_replaces_whole_entry() {
        let dir = tempfile::Builder::new()
            .prefix("netchain-tests")
            .tempdir()
            .unwrap();
        let first =
            parse_result(br#"{"cniVersion":"1.0.0","ips":[{"address":"10.0.0.2/24"}]}"#).unwrap();
        let second = parse_result(br#"{"cniVersion":"1.0.0"}"#).unwrap();

        write_result(dir.path(), "net", &rt("cid"), &first).unwrap();
        write_result(dir.path(), "net", &rt("cid"), &second).unwrap();

        let entry = read_result(dir.path(), "net", "cid", "eth0").unwrap().unwrap();
        assert_eq!(entry.parse_result().unwrap(), second);
        let names: Vec<String> = fs::read_dir(dir.path().join("results"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["net-cid-eth0"], "temp file left behind");

        // a truncated entry from an older writer is an error, not a result
        fs::write(dir.path().join("results/net-cid-eth0"), b"{\"kind\":").unwrap();
        assert!(read_result(dir.path(), "net", "cid", "eth0").is_err());
        remove_result(dir.path(), "net", "cid", "eth0").unwrap();
        assert!(!dir.path().join("results/net-cid-eth0").exists());
    }

    #[test]
    fn test_network_entries() {
        let dir = tempfile::Builder::new()
            .prefix("netchain-tests")
            .tempdir()
            .unwrap();
        let result = parse_result(br#"{"cniVersion":"1.0.0"}"#).unwrap();
        write_result(dir.path(), "net", &rt("a"), &result).unwrap();
        write_result(dir.path(), "net", &rt("b"), &result).unwrap();
        write_result(dir.path(), "net-2", &rt("c"), &result).unwrap();

        let mut ids: Vec<String> = network_entries(dir.path(), "net")
            .unwrap()
            .into_iter()
            .map(|e| e.container_id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["a", "b"]);

        let missing = dir.path().join("nothing-here");
        assert!(network_entries(&missing, "net").unwrap().is_empty());
    }
}
