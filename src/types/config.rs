// Network configuration as handed to plugins.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::debug;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::common::Dns;
use crate::error::{NetchainError, NetchainResult};
use crate::validation;
use crate::version;
use crate::wrap;

/// The fields of a plugin config the engine needs for dispatch.
/// Everything else stays in the raw bytes and is passed through untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NetConf {
    #[serde(rename = "cniVersion", default)]
    pub cni_version: String,

    #[serde(rename = "name", default)]
    pub name: String,

    /// Name of the plugin executable.
    #[serde(rename = "type", default)]
    pub plugin_type: String,

    /// Capabilities the plugin wants filled into its runtimeConfig.
    #[serde(rename = "capabilities", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub capabilities: BTreeMap<String, bool>,

    #[serde(rename = "ipam", default, skip_serializing_if = "Option::is_none")]
    pub ipam: Option<Ipam>,

    #[serde(rename = "dns", default, skip_serializing_if = "Option::is_none")]
    pub dns: Option<Dns>,

    #[serde(rename = "runtimeConfig", default, skip_serializing_if = "Option::is_none")]
    pub runtime_config: Option<Value>,

    /// Result of the previous plugin in the chain, still in its wire form.
    #[serde(rename = "prevResult", default, skip_serializing_if = "Option::is_none")]
    pub raw_prev_result: Option<Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ipam {
    #[serde(rename = "type", default)]
    pub plugin_type: String,
}

/// One plugin's configuration: the parsed dispatch fields plus the original bytes.
#[derive(Clone, Debug, PartialEq)]
pub struct NetworkConfig {
    pub network: NetConf,
    pub bytes: Vec<u8>,
}

impl NetworkConfig {
    pub fn from_bytes(bytes: &[u8]) -> NetchainResult<Self> {
        let network: NetConf = wrap!(
            serde_json::from_slice(bytes),
            "error parsing configuration"
        )?;
        if network.plugin_type.is_empty() {
            return Err(NetchainError::invalid_config(
                "error parsing configuration: missing 'type'",
            ));
        }
        Ok(NetworkConfig {
            network,
            bytes: bytes.to_vec(),
        })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> NetchainResult<Self> {
        let path = path.as_ref();
        let bytes = wrap!(fs::read(path), format!("error reading {:?}", path.display()))?;
        NetworkConfig::from_bytes(&bytes)
    }

    /// The config as a JSON object, ready to get fields spliced in.
    pub fn to_object(&self) -> NetchainResult<Map<String, Value>> {
        match serde_json::from_slice(&self.bytes)? {
            Value::Object(map) => Ok(map),
            _ => Err(NetchainError::invalid_config(
                "plugin configuration is not a JSON object",
            )),
        }
    }
}

/// An ordered list of plugins producing one attachment.
#[derive(Clone, Debug, PartialEq)]
pub struct NetworkConfigList {
    pub name: String,
    pub cni_version: String,
    pub disable_check: bool,
    pub disable_gc: bool,
    pub plugins: Vec<NetworkConfig>,
    pub bytes: Vec<u8>,
}

#[derive(Deserialize)]
struct RawList {
    #[serde(rename = "name", default)]
    name: String,

    #[serde(rename = "cniVersion", default)]
    cni_version: String,

    #[serde(rename = "cniVersions", default)]
    cni_versions: Vec<String>,

    #[serde(rename = "disableCheck", default, deserialize_with = "bool_or_string")]
    disable_check: bool,

    #[serde(rename = "disableGC", default, deserialize_with = "bool_or_string")]
    disable_gc: bool,

    #[serde(rename = "plugins", default)]
    plugins: Option<Vec<Value>>,
}

/// Accepts `true` as well as `"true"`.
fn bool_or_string<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Bool(b) => Ok(b),
        Value::String(s) => s
            .parse::<bool>()
            .map_err(|_| serde::de::Error::custom(format!("invalid boolean value \"{}\"", s))),
        other => Err(serde::de::Error::custom(format!(
            "expected boolean, got {}",
            other
        ))),
    }
}

impl NetworkConfigList {
    pub fn from_bytes(bytes: &[u8]) -> NetchainResult<Self> {
        let raw: RawList = wrap!(
            serde_json::from_slice(bytes),
            "error parsing configuration list"
        )?;

        validation::validate_network_name(&raw.name)?;

        let mut cni_version = raw.cni_version;
        if !raw.cni_versions.is_empty() {
            match version::highest_known(&raw.cni_versions) {
                Some(v) => {
                    debug!("selected version {} out of {:?}", v, raw.cni_versions);
                    cni_version = v;
                }
                None => {
                    return Err(NetchainError::invalid_config(format!(
                        "none of the listed cniVersions {:?} is supported",
                        raw.cni_versions
                    )))
                }
            }
        }

        let raw_plugins = raw.plugins.ok_or_else(|| {
            NetchainError::invalid_config("error parsing configuration list: no 'plugins' key")
        })?;
        if raw_plugins.is_empty() {
            return Err(NetchainError::invalid_config(
                "error parsing configuration list: no plugins in list",
            ));
        }

        let mut plugins = Vec::with_capacity(raw_plugins.len());
        for (i, conf) in raw_plugins.iter().enumerate() {
            if !conf.is_object() {
                return Err(NetchainError::invalid_config(format!(
                    "plugin {} is not a JSON object",
                    i
                )));
            }
            let conf_bytes = serde_json::to_vec(conf)?;
            let plugin = NetworkConfig::from_bytes(&conf_bytes)
                .map_err(|e| NetchainError::wrap(format!("failed to parse plugin config {}", i), e))?;
            plugins.push(plugin);
        }

        Ok(NetworkConfigList {
            name: raw.name,
            cni_version,
            disable_check: raw.disable_check,
            disable_gc: raw.disable_gc,
            plugins,
            bytes: bytes.to_vec(),
        })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> NetchainResult<Self> {
        let path = path.as_ref();
        let bytes = wrap!(fs::read(path), format!("error reading {:?}", path.display()))?;
        NetworkConfigList::from_bytes(&bytes)
    }

    /// Wrap a single plugin config into a list of one, taking name and
    /// version from the plugin itself.
    pub fn from_single(conf: NetworkConfig) -> NetchainResult<Self> {
        validation::validate_network_name(&conf.network.name)?;
        let bytes = serde_json::to_vec(&serde_json::json!({
            "name": conf.network.name,
            "cniVersion": conf.network.cni_version,
            "plugins": [serde_json::from_slice::<Value>(&conf.bytes)?],
        }))?;
        Ok(NetworkConfigList {
            name: conf.network.name.clone(),
            cni_version: conf.network.cni_version.clone(),
            disable_check: false,
            disable_gc: false,
            plugins: vec![conf],
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIST: &str = r#"{
        "cniVersion": "1.0.0",
        "name": "dbnet",
        "disableCheck": "true",
        "plugins": [
            {"type": "bridge", "bridge": "cni0", "ipam": {"type": "host-local", "subnet": "10.1.0.0/16"}},
            {"type": "portmap", "capabilities": {"portMappings": true}, "snat": true}
        ]
    }"#;

    #[test]
    fn test_list_from_bytes() {
        let list = NetworkConfigList::from_bytes(LIST.as_bytes()).unwrap();
        assert_eq!(list.name, "dbnet");
        assert_eq!(list.cni_version, "1.0.0");
        assert!(list.disable_check);
        assert!(!list.disable_gc);
        assert_eq!(list.plugins.len(), 2);
        assert_eq!(list.plugins[0].network.plugin_type, "bridge");
        assert_eq!(
            list.plugins[0].network.ipam,
            Some(Ipam {
                plugin_type: "host-local".to_string()
            })
        );
        assert_eq!(
            list.plugins[1].network.capabilities.get("portMappings"),
            Some(&true)
        );

        // unknown keys are kept in the raw bytes
        let obj = list.plugins[1].to_object().unwrap();
        assert_eq!(obj["snat"], Value::Bool(true));
    }

    #[test]
    fn test_list_picks_highest_known_version() {
        let list = NetworkConfigList::from_bytes(
            br#"{"name":"n","cniVersion":"0.4.0","cniVersions":["0.4.0","1.1.0","5.0.0"],"plugins":[{"type":"x"}]}"#,
        )
        .unwrap();
        assert_eq!(list.cni_version, "1.1.0");
    }

    #[test]
    fn test_list_errors() {
        let cases: &[&[u8]] = &[
            br#"{"cniVersion":"1.0.0","plugins":[{"type":"x"}]}"#,
            br#"{"name":"n","cniVersion":"1.0.0"}"#,
            br#"{"name":"n","cniVersion":"1.0.0","plugins":[]}"#,
            br#"{"name":"n","cniVersion":"1.0.0","plugins":[{"name":"x"}]}"#,
            br#"{"name":"n","cniVersion":"1.0.0","plugins":[1]}"#,
            br#"{"name":"n","disableCheck":"maybe","plugins":[{"type":"x"}]}"#,
            br#"{"name":"n","cniVersions":["9.9.9"],"plugins":[{"type":"x"}]}"#,
            br#"not json"#,
        ];
        for case in cases {
            assert!(
                NetworkConfigList::from_bytes(case).is_err(),
                "should fail: {}",
                String::from_utf8_lossy(case)
            );
        }
    }

    #[test]
    fn test_from_single() {
        let conf = NetworkConfig::from_bytes(
            br#"{"cniVersion":"0.4.0","name":"single","type":"loopback"}"#,
        )
        .unwrap();
        let list = NetworkConfigList::from_single(conf).unwrap();
        assert_eq!(list.name, "single");
        assert_eq!(list.cni_version, "0.4.0");
        assert_eq!(list.plugins.len(), 1);
        let reparsed = NetworkConfigList::from_bytes(&list.bytes).unwrap();
        assert_eq!(reparsed.plugins, list.plugins);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::Builder::new()
            .prefix("netchain-tests")
            .tempdir()
            .unwrap();
        let path = dir.path().join("10-dbnet.conflist");
        fs::write(&path, LIST).unwrap();
        let list = NetworkConfigList::from_file(&path).unwrap();
        assert_eq!(list.plugins.len(), 2);
        assert!(NetworkConfigList::from_file(dir.path().join("missing")).is_err());
    }
}
