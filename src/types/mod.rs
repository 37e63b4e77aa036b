//! Versioned plugin results and the conversions between them.
//!
//! Each known schema generation is its own type with a pair of conversions
//! against the current shape ([`current::CniResult`]). Converting between two
//! arbitrary versions is the composition of both.
use std::io::Write;

use serde::Serialize;

use crate::error::{NetchainError, NetchainResult};
use crate::version::{self, CURRENT_VERSION};

pub mod common;
pub mod config;
pub mod current;
pub mod runtime;
pub mod v020;
pub mod v040;
pub mod v100;
pub mod v110;

pub use common::{Dns, Interface, IpConfig, SimpleRoute};
pub use config::{NetConf, NetworkConfig, NetworkConfigList};
pub use current::{CniResult, NextHop, Route};
pub use runtime::{Attachment, Capability, CapabilityArgs, GcArgs, RuntimeConf};
pub use v020::Result020;
pub use v040::Result040;
pub use v100::Result100;
pub use v110::Result110;

/// A schema generation, several protocol versions can share one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Generation {
    Legacy,
    Tagged,
    V100,
    V110,
    Current,
}

impl Generation {
    pub fn versions(&self) -> &'static [&'static str] {
        match self {
            Generation::Legacy => &["0.1.0", "0.2.0"],
            Generation::Tagged => &["0.3.0", "0.3.1", "0.4.0"],
            Generation::V100 => &["1.0.0"],
            Generation::V110 => &["1.1.0"],
            Generation::Current => &[CURRENT_VERSION],
        }
    }

    pub fn for_version(version: &str) -> NetchainResult<Generation> {
        [
            Generation::Legacy,
            Generation::Tagged,
            Generation::V100,
            Generation::V110,
            Generation::Current,
        ]
        .into_iter()
        .find(|g| g.versions().contains(&version))
        .ok_or_else(|| {
            NetchainError::conversion(format!("unsupported CNI result version \"{}\"", version))
        })
    }

    pub fn decode(&self, bytes: &[u8]) -> NetchainResult<AnyResult> {
        Ok(match self {
            Generation::Legacy => AnyResult::Legacy(Result020::from_bytes(bytes)?),
            Generation::Tagged => AnyResult::Tagged(Result040::from_bytes(bytes)?),
            Generation::V100 => AnyResult::V100(Result100::from_bytes(bytes)?),
            Generation::V110 => AnyResult::V110(Result110::from_bytes(bytes)?),
            Generation::Current => AnyResult::Current(CniResult::from_bytes(bytes)?),
        })
    }
}

/// Fail if a decoder for `generation` was handed a result of another version.
pub(crate) fn check_decoded_version(declared: &str, generation: Generation) -> NetchainResult<()> {
    if generation.versions().contains(&declared) {
        return Ok(());
    }
    Err(NetchainError::msg(format!(
        "result declares cniVersion \"{}\" but the decoder supports {:?}",
        declared,
        generation.versions()
    )))
}

/// A plugin result in whatever version it was produced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AnyResult {
    Legacy(Result020),
    Tagged(Result040),
    V100(Result100),
    V110(Result110),
    Current(CniResult),
}

impl AnyResult {
    pub fn version(&self) -> &str {
        match self {
            AnyResult::Legacy(r) => &r.cni_version,
            AnyResult::Tagged(r) => &r.cni_version,
            AnyResult::V100(r) => &r.cni_version,
            AnyResult::V110(r) => &r.cni_version,
            AnyResult::Current(r) => &r.cni_version,
        }
    }

    /// Reconstruct the current shape from any version.
    pub fn to_current(&self) -> NetchainResult<CniResult> {
        match self {
            AnyResult::Legacy(r) => Ok(r.to_current()),
            AnyResult::Tagged(r) => r.to_current(),
            AnyResult::V100(r) => Ok(r.to_current()),
            AnyResult::V110(r) => Ok(r.to_current()),
            AnyResult::Current(r) => {
                let mut r = r.clone();
                r.cni_version = CURRENT_VERSION.to_string();
                Ok(r)
            }
        }
    }

    /// Project the current shape onto `version`.
    pub fn from_current(result: &CniResult, version: &str) -> NetchainResult<AnyResult> {
        Ok(match Generation::for_version(version)? {
            Generation::Legacy => AnyResult::Legacy(Result020::from_current(result, version)?),
            Generation::Tagged => AnyResult::Tagged(Result040::from_current(result, version)?),
            Generation::V100 => AnyResult::V100(Result100::from_current(result, version)?),
            Generation::V110 => AnyResult::V110(Result110::from_current(result, version)?),
            Generation::Current => {
                let mut r = result.clone();
                r.cni_version = version.to_string();
                AnyResult::Current(r)
            }
        })
    }

    /// Get this result as `version`. Fails instead of dropping data the
    /// target version cannot hold.
    pub fn convert_to(&self, version: &str) -> NetchainResult<AnyResult> {
        if self.version() == version {
            return Ok(self.clone());
        }
        let current = self.to_current()?;
        AnyResult::from_current(&current, version)
    }

    pub fn to_value(&self) -> NetchainResult<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn to_bytes(&self) -> NetchainResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Write the result converted to `version`.
    pub fn print_as<W: Write>(&self, version: &str, writer: W) -> NetchainResult<()> {
        let converted = self.convert_to(version)?;
        serde_json::to_writer(writer, &converted)?;
        Ok(())
    }
}

impl From<CniResult> for AnyResult {
    fn from(r: CniResult) -> Self {
        AnyResult::Current(r)
    }
}

/// Parse an untyped result, the decoder is selected by its `cniVersion`.
pub fn parse_result(bytes: &[u8]) -> NetchainResult<AnyResult> {
    let declared = version::declared_version(bytes)?;
    Generation::for_version(&declared)?.decode(bytes)
}

/// Parse an untyped result held as a JSON value, e.g. a `prevResult`.
pub fn parse_result_value(value: &serde_json::Value) -> NetchainResult<AnyResult> {
    parse_result(&serde_json::to_vec(value)?)
}

/// Parse a plugin's output, assuming `default_version` when the plugin did
/// not declare one.
pub fn parse_result_or(bytes: &[u8], default_version: &str) -> NetchainResult<AnyResult> {
    let mut value: serde_json::Value = serde_json::from_slice(bytes)?;
    let obj = value
        .as_object_mut()
        .ok_or_else(|| NetchainError::msg("plugin result is not a JSON object"))?;
    let missing = obj
        .get("cniVersion")
        .and_then(|v| v.as_str())
        .map(str::is_empty)
        .unwrap_or(true);
    if missing {
        obj.insert(
            "cniVersion".to_string(),
            serde_json::Value::String(default_version.to_string()),
        );
    }
    parse_result_value(&value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESULT_100: &str = r#"{
        "cniVersion": "1.0.0",
        "interfaces": [
            {"name": "cni0", "mac": "00:11:22:33:44:55"},
            {"name": "eth0", "mac": "00:11:22:33:44:66", "sandbox": "/var/run/netns/x"}
        ],
        "ips": [
            {"interface": 1, "address": "10.1.2.3/24", "gateway": "10.1.2.1"},
            {"interface": 1, "address": "fd00::3/64", "gateway": "fd00::1"}
        ],
        "routes": [
            {"dst": "0.0.0.0/0", "gw": "10.1.2.1"},
            {"dst": "::/0"}
        ],
        "dns": {"nameservers": ["10.1.2.1"], "search": ["example.com"]}
    }"#;

    fn result_100() -> AnyResult {
        parse_result(RESULT_100.as_bytes()).unwrap()
    }

    #[test]
    fn test_parse_dispatches_on_version() {
        assert!(matches!(result_100(), AnyResult::V100(_)));
        let legacy = parse_result(br#"{"ip4":{"ip":"10.1.2.3/24"}}"#).unwrap();
        assert!(matches!(legacy, AnyResult::Legacy(_)));
        assert_eq!(legacy.version(), "0.1.0");
        let tagged = parse_result(
            br#"{"cniVersion":"0.3.1","ips":[{"version":"4","address":"10.0.0.2/24"}]}"#,
        )
        .unwrap();
        assert!(matches!(tagged, AnyResult::Tagged(_)));
    }

    #[test]
    fn test_parse_unknown_version() {
        let err = parse_result(br#"{"cniVersion":"7.0.0"}"#).unwrap_err();
        assert!(err.to_string().contains("7.0.0"), "{}", err);
    }

    #[test]
    fn test_decoder_rejects_foreign_version() {
        let err = Result040::from_bytes(RESULT_100.as_bytes()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("\"1.0.0\""), "{}", msg);
        assert!(msg.contains("0.4.0"), "{}", msg);
    }

    #[test]
    fn test_convert_is_noop_for_same_version() {
        let r = result_100();
        assert_eq!(r.convert_to("1.0.0").unwrap(), r);
    }

    #[test]
    fn test_round_trip_through_every_richer_version() {
        let r = result_100();
        for v in ["0.3.0", "0.3.1", "0.4.0", "1.1.0", "1.2.0"] {
            let there = r.convert_to(v).unwrap();
            assert_eq!(there.version(), v);
            let back = there.convert_to("1.0.0").unwrap();
            assert_eq!(back, r, "round trip through {}", v);
        }
    }

    #[test]
    fn test_tagged_ips_get_family() {
        let r = result_100().convert_to("0.4.0").unwrap();
        let value = r.to_value().unwrap();
        assert_eq!(value["ips"][0]["version"], "4");
        assert_eq!(value["ips"][1]["version"], "6");
        assert_eq!(value["ips"][1]["interface"], 1);
    }

    #[test]
    fn test_legacy_downgrade_and_back() {
        let legacy = result_100().convert_to("0.2.0").unwrap();
        let value = legacy.to_value().unwrap();
        assert_eq!(value["ip4"]["ip"], "10.1.2.3/24");
        assert_eq!(value["ip4"]["routes"][0]["gw"], "10.1.2.1");
        assert_eq!(value["ip6"]["ip"], "fd00::3/64");
        assert_eq!(value["ip6"]["routes"][0]["dst"], "::/0");
        assert!(value.get("interfaces").is_none());

        // legacy -> 1.2.0 -> legacy keeps everything the legacy shape has
        let back = legacy.convert_to("1.2.0").unwrap().convert_to("0.2.0").unwrap();
        assert_eq!(back, legacy);
    }

    #[test]
    fn test_legacy_downgrade_needs_addresses() {
        let empty = AnyResult::Current(CniResult::default());
        let err = empty.convert_to("0.2.0").unwrap_err();
        assert_eq!(err.to_string(), "cannot convert: no valid IP addresses");
    }

    #[test]
    fn test_legacy_downgrade_rejects_second_address() {
        let r = parse_result(
            br#"{"cniVersion":"1.0.0","ips":[{"address":"10.0.0.2/24"},{"address":"10.0.0.3/24"}]}"#,
        )
        .unwrap();
        let err = r.convert_to("0.1.0").unwrap_err();
        assert!(matches!(err, NetchainError::Conversion(_)));
        assert!(err.to_string().contains("2 IPv4 addresses"), "{}", err);
    }

    #[test]
    fn test_legacy_route_needs_family_slot() {
        let r = parse_result(
            br#"{"cniVersion":"1.0.0","ips":[{"address":"10.0.0.2/24"}],"routes":[{"dst":"::/0"}]}"#,
        )
        .unwrap();
        let err = r.convert_to("0.2.0").unwrap_err();
        assert!(err.to_string().contains("no IPv6 address"), "{}", err);
    }

    #[test]
    fn test_route_mtu_survives_only_from_110() {
        let r = parse_result(
            br#"{"cniVersion":"1.1.0","ips":[{"address":"10.0.0.2/24"}],"routes":[{"dst":"0.0.0.0/0","gw":"10.0.0.1","mtu":1450}]}"#,
        )
        .unwrap();
        let current = r.convert_to("1.2.0").unwrap();
        assert_eq!(current.convert_to("1.1.0").unwrap(), r);
        let err = r.convert_to("1.0.0").unwrap_err();
        assert!(err.to_string().contains("mtu"), "{}", err);
    }

    #[test]
    fn test_multipath_only_in_current() {
        let r = parse_result(
            br#"{"cniVersion":"1.2.0","ips":[{"address":"10.0.0.2/24"}],"routes":[{"dst":"0.0.0.0/0","nextHops":[{"gw":"10.0.0.1"},{"gw":"10.0.0.254"}]}]}"#,
        )
        .unwrap();
        for v in ["1.1.0", "1.0.0", "0.4.0", "0.2.0"] {
            let err = r.convert_to(v).unwrap_err();
            assert!(
                matches!(err, NetchainError::Conversion(_)),
                "{} should fail: {:?}",
                v,
                err
            );
        }
    }

    #[test]
    fn test_single_next_hop_round_trips_through_gw() {
        let r = parse_result(
            br#"{"cniVersion":"1.2.0","ips":[{"address":"10.0.0.2/24"}],"routes":[{"dst":"0.0.0.0/0","nextHops":[{"gw":"10.0.0.1"}]}]}"#,
        )
        .unwrap();
        let older = r.convert_to("1.0.0").unwrap();
        assert_eq!(older.to_value().unwrap()["routes"][0]["gw"], "10.0.0.1");
        assert_eq!(older.convert_to("1.2.0").unwrap(), r);
    }

    #[test]
    fn test_tag_mismatch_is_rejected() {
        let r = parse_result(
            br#"{"cniVersion":"0.4.0","ips":[{"version":"6","address":"10.0.0.2/24"}]}"#,
        )
        .unwrap();
        assert!(r.convert_to("1.0.0").is_err());
    }

    #[test]
    fn test_parse_result_or_fills_version() {
        let r = parse_result_or(br#"{"ips":[{"address":"10.0.0.2/24"}]}"#, "1.0.0").unwrap();
        assert!(matches!(r, AnyResult::V100(_)));
        let r = parse_result_or(br#"{"cniVersion":"0.4.0"}"#, "1.0.0").unwrap();
        assert_eq!(r.version(), "0.4.0");
        assert!(parse_result_or(b"[]", "1.0.0").is_err());
    }
}
