//! Protocol version table and negotiation helpers.
use std::cmp::Ordering;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{NetchainError, NetchainResult};

/// Every protocol version the engine speaks, oldest first.
pub const KNOWN_VERSIONS: &[&str] = &[
    "0.1.0", "0.2.0", "0.3.0", "0.3.1", "0.4.0", "1.0.0", "1.1.0", "1.2.0",
];

/// The version of the canonical result shape.
pub const CURRENT_VERSION: &str = "1.2.0";

/// Oldest config version that may be sent a CHECK.
pub const MIN_CHECK_VERSION: &str = "0.4.0";

/// Oldest config version that knows about GC and STATUS.
pub const MIN_GC_VERSION: &str = "1.1.0";

/// Assumed when a config or result does not declare its version.
pub const IMPLICIT_VERSION: &str = "0.1.0";

/// What a plugin answers to VERSION.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    #[serde(rename = "cniVersion", default)]
    pub cni_version: String,

    #[serde(rename = "supportedVersions", default)]
    pub supported_versions: Vec<String>,
}

impl PluginInfo {
    /// Info for a plugin supporting exactly the given versions.
    pub fn supports<S: AsRef<str>>(versions: &[S]) -> Self {
        PluginInfo {
            cni_version: CURRENT_VERSION.to_string(),
            supported_versions: versions.iter().map(|v| v.as_ref().to_string()).collect(),
        }
    }

    /// Info for a plugin supporting every known version starting at `min`.
    pub fn supports_from(min: &str) -> NetchainResult<Self> {
        Ok(PluginInfo {
            cni_version: CURRENT_VERSION.to_string(),
            supported_versions: versions_from(min)?,
        })
    }

    /// Info for a plugin that predates version negotiation.
    pub fn legacy() -> Self {
        PluginInfo {
            cni_version: "0.1.0".to_string(),
            supported_versions: vec!["0.1.0".to_string()],
        }
    }

    /// Fail with an incompatibility error unless `requested` is supported.
    pub fn confirm(&self, requested: &str) -> NetchainResult<()> {
        confirm(requested, &self.supported_versions)
    }
}

/// Exact string membership of `requested` in `supported`.
pub fn confirm<S: AsRef<str>>(requested: &str, supported: &[S]) -> NetchainResult<()> {
    if supported.iter().any(|v| v.as_ref() == requested) {
        return Ok(());
    }
    Err(NetchainError::Incompatible {
        requested: requested.to_string(),
        supported: supported.iter().map(|v| v.as_ref().to_string()).collect(),
    })
}

/// All known versions at or after `min`, in order.
pub fn versions_from(min: &str) -> NetchainResult<Vec<String>> {
    let start = KNOWN_VERSIONS
        .iter()
        .position(|v| *v == min)
        .ok_or_else(|| NetchainError::msg(format!("unknown CNI version \"{}\"", min)))?;
    Ok(KNOWN_VERSIONS[start..].iter().map(|v| v.to_string()).collect())
}

fn parse(version: &str) -> NetchainResult<semver::Version> {
    semver::Version::parse(version).map_err(|e| {
        NetchainError::invalid_config(format!("invalid version \"{}\": {}", version, e))
    })
}

/// Semantic comparison of two version strings.
pub fn compare(a: &str, b: &str) -> NetchainResult<Ordering> {
    Ok(parse(a)?.cmp(&parse(b)?))
}

pub fn greater_than_or_equal_to(version: &str, other: &str) -> NetchainResult<bool> {
    Ok(compare(version, other)? != Ordering::Less)
}

/// Pick the newest known version out of a list of candidates, used for
/// config lists carrying `cniVersions`.
pub fn highest_known<S: AsRef<str>>(candidates: &[S]) -> Option<String> {
    KNOWN_VERSIONS
        .iter()
        .rev()
        .find(|known| candidates.iter().any(|c| c.as_ref() == **known))
        .map(|v| v.to_string())
}

/// Decode a plugin's VERSION reply.
///
/// Plugins from the 0.2.0 era answer without `supportedVersions`, those are
/// known to speak 0.1.0 and 0.2.0.
pub fn decode_plugin_info(bytes: &[u8]) -> NetchainResult<PluginInfo> {
    let info: PluginInfo = serde_json::from_slice(bytes)?;
    if info.cni_version.is_empty() {
        return Err(NetchainError::msg(
            "decoding version info: missing field cniVersion",
        ));
    }
    if info.supported_versions.is_empty() {
        if info.cni_version == "0.2.0" {
            debug!("plugin reported version 0.2.0 without supported versions");
            return Ok(PluginInfo::supports(&["0.1.0", "0.2.0"]));
        }
        return Err(NetchainError::msg(
            "decoding version info: missing field supportedVersions",
        ));
    }
    Ok(info)
}

/// Read the declared `cniVersion` of an arbitrary JSON document.
pub fn declared_version(bytes: &[u8]) -> NetchainResult<String> {
    #[derive(Deserialize)]
    struct Versioned {
        #[serde(rename = "cniVersion", default)]
        cni_version: String,
    }
    let v: Versioned = serde_json::from_slice(bytes)?;
    if v.cni_version.is_empty() {
        return Ok(IMPLICIT_VERSION.to_string());
    }
    Ok(v.cni_version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirm_incompatible_lists_everything() {
        let info = PluginInfo::supports(&["0.3.1", "0.4.0"]);
        match info.confirm("1.0.0") {
            Err(NetchainError::Incompatible {
                requested,
                supported,
            }) => {
                assert_eq!(requested, "1.0.0");
                assert_eq!(supported, vec!["0.3.1", "0.4.0"]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(info.confirm("0.4.0").is_ok());
    }

    #[test]
    fn test_confirm_is_exact_membership() {
        // no range matching, 0.3.0 is not implied by 0.3.1
        assert!(confirm("0.3.0", &["0.3.1"]).is_err());
        assert!(confirm("1.0", &["1.0.0"]).is_err());
    }

    #[test]
    fn test_versions_from() {
        assert_eq!(
            versions_from("1.0.0").unwrap(),
            vec!["1.0.0", "1.1.0", "1.2.0"]
        );
        assert_eq!(versions_from("0.1.0").unwrap().len(), KNOWN_VERSIONS.len());
        assert!(versions_from("0.5.0").is_err());
    }

    #[test]
    fn test_known_versions_are_ordered() {
        for pair in KNOWN_VERSIONS.windows(2) {
            assert_eq!(compare(pair[0], pair[1]).unwrap(), Ordering::Less);
        }
        assert_eq!(KNOWN_VERSIONS.last(), Some(&CURRENT_VERSION));
    }

    #[test]
    fn test_greater_than_or_equal_to() {
        assert!(greater_than_or_equal_to("0.4.0", MIN_CHECK_VERSION).unwrap());
        assert!(!greater_than_or_equal_to("0.3.1", MIN_CHECK_VERSION).unwrap());
        assert!(greater_than_or_equal_to("1.0.0", "0.4.0").unwrap());
        assert!(greater_than_or_equal_to("garbage", "0.4.0").is_err());
    }

    #[test]
    fn test_highest_known() {
        assert_eq!(
            highest_known(&["0.4.0", "1.0.0", "9.9.9"]),
            Some("1.0.0".to_string())
        );
        assert_eq!(highest_known(&["9.9.9"]), None);
    }

    #[test]
    fn test_decode_plugin_info() {
        let info =
            decode_plugin_info(br#"{"cniVersion":"1.0.0","supportedVersions":["0.4.0","1.0.0"]}"#)
                .unwrap();
        assert_eq!(info.supported_versions, vec!["0.4.0", "1.0.0"]);

        let legacy = decode_plugin_info(br#"{"cniVersion":"0.2.0"}"#).unwrap();
        assert_eq!(legacy.supported_versions, vec!["0.1.0", "0.2.0"]);

        assert!(decode_plugin_info(br#"{"cniVersion":"0.4.0"}"#).is_err());
        assert!(decode_plugin_info(br#"{"supportedVersions":["0.4.0"]}"#).is_err());
    }

    #[test]
    fn test_declared_version() {
        assert_eq!(declared_version(br#"{"cniVersion":"0.4.0"}"#).unwrap(), "0.4.0");
        assert_eq!(declared_version(br#"{"ip4":{}}"#).unwrap(), IMPLICIT_VERSION);
    }
}
