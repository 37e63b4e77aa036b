// The earliest result shape, used by 0.1.0 and 0.2.0: one slot per family.

use std::net::IpAddr;

use ipnet::IpNet;
use log::debug;
use serde::{Deserialize, Serialize};

use super::common::{is_ipv4, Dns, IpConfig, SimpleRoute};
use super::current::{CniResult, Route};
use super::{check_decoded_version, Generation};
use crate::error::{NetchainError, NetchainResult};
use crate::version::{CURRENT_VERSION, IMPLICIT_VERSION};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Result020 {
    #[serde(rename = "cniVersion", default)]
    pub cni_version: String,

    #[serde(rename = "ip4", default, skip_serializing_if = "Option::is_none")]
    pub ip4: Option<IpConfig020>,

    #[serde(rename = "ip6", default, skip_serializing_if = "Option::is_none")]
    pub ip6: Option<IpConfig020>,

    #[serde(rename = "dns", default, skip_serializing_if = "Dns::is_empty")]
    pub dns: Dns,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpConfig020 {
    #[serde(rename = "ip")]
    pub ip: IpNet,

    #[serde(rename = "gateway", default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<IpAddr>,

    #[serde(rename = "routes", default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<SimpleRoute>,
}

impl Result020 {
    pub fn from_bytes(bytes: &[u8]) -> NetchainResult<Self> {
        let mut result: Result020 = serde_json::from_slice(bytes)?;
        if result.cni_version.is_empty() {
            result.cni_version = IMPLICIT_VERSION.to_string();
        }
        check_decoded_version(&result.cni_version, Generation::Legacy)?;
        Ok(result)
    }

    pub fn to_current(&self) -> CniResult {
        let mut result = CniResult {
            cni_version: CURRENT_VERSION.to_string(),
            dns: self.dns.clone(),
            ..Default::default()
        };
        for slot in [&self.ip4, &self.ip6].into_iter().flatten() {
            result.ips.push(IpConfig {
                interface: None,
                address: slot.ip,
                gateway: slot.gateway,
            });
            result.routes.extend(slot.routes.iter().map(Route::from));
        }
        result
    }

    pub fn from_current(result: &CniResult, version: &str) -> NetchainResult<Self> {
        let (v4, v6): (Vec<&IpConfig>, Vec<&IpConfig>) =
            result.ips.iter().partition(|ip| is_ipv4(&ip.address));
        if v4.is_empty() && v6.is_empty() {
            return Err(NetchainError::conversion("no valid IP addresses"));
        }
        let mut ip4 = single_slot(&v4, "IPv4", version)?;
        let mut ip6 = single_slot(&v6, "IPv6", version)?;

        for route in &result.routes {
            let simple = route.to_simple(version)?;
            let (slot, family) = if is_ipv4(&route.dst) {
                (&mut ip4, "IPv4")
            } else {
                (&mut ip6, "IPv6")
            };
            match slot {
                Some(slot) => slot.routes.push(simple),
                None => {
                    return Err(NetchainError::conversion(format!(
                        "route to {} has no {} address to attach to in version {}",
                        route.dst, family, version
                    )))
                }
            }
        }

        if !result.interfaces.is_empty() {
            debug!(
                "version {} has no interface list, not carrying {} interfaces",
                version,
                result.interfaces.len()
            );
        }

        Ok(Result020 {
            cni_version: version.to_string(),
            ip4,
            ip6,
            dns: result.dns.clone(),
        })
    }
}

fn single_slot(
    ips: &[&IpConfig],
    family: &str,
    version: &str,
) -> NetchainResult<Option<IpConfig020>> {
    match ips {
        [] => Ok(None),
        [ip] => Ok(Some(IpConfig020 {
            ip: ip.address,
            gateway: ip.gateway,
            routes: Vec::new(),
        })),
        _ => Err(NetchainError::conversion(format!(
            "{} {} addresses but version {} holds at most one",
            ips.len(),
            family,
            version
        ))),
    }
}
