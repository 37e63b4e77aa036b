// Result shape of 0.3.0, 0.3.1 and 0.4.0: every ip carries its family.

use std::net::IpAddr;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use super::common::{is_ipv4, Dns, Interface, IpConfig, SimpleRoute};
use super::current::{CniResult, Route};
use super::{check_decoded_version, Generation};
use crate::error::{NetchainError, NetchainResult};
use crate::version::CURRENT_VERSION;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Result040 {
    #[serde(rename = "cniVersion")]
    pub cni_version: String,

    #[serde(rename = "interfaces", default, skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<Interface>,

    #[serde(rename = "ips", default, skip_serializing_if = "Vec::is_empty")]
    pub ips: Vec<IpConfig040>,

    #[serde(rename = "routes", default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<SimpleRoute>,

    #[serde(rename = "dns", default, skip_serializing_if = "Dns::is_empty")]
    pub dns: Dns,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpConfig040 {
    /// "4" or "6"
    #[serde(rename = "version")]
    pub version: String,

    #[serde(rename = "interface", default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<usize>,

    #[serde(rename = "address")]
    pub address: IpNet,

    #[serde(rename = "gateway", default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<IpAddr>,
}

fn family_tag(address: &IpNet) -> &'static str {
    if is_ipv4(address) {
        "4"
    } else {
        "6"
    }
}

impl Result040 {
    pub fn from_bytes(bytes: &[u8]) -> NetchainResult<Self> {
        let result: Result040 = serde_json::from_slice(bytes)?;
        check_decoded_version(&result.cni_version, Generation::Tagged)?;
        Ok(result)
    }

    pub fn to_current(&self) -> NetchainResult<CniResult> {
        let mut ips = Vec::with_capacity(self.ips.len());
        for ip in &self.ips {
            if ip.version != family_tag(&ip.address) {
                return Err(NetchainError::conversion(format!(
                    "ip {} is tagged as version \"{}\"",
                    ip.address, ip.version
                )));
            }
            ips.push(IpConfig {
                interface: ip.interface,
                address: ip.address,
                gateway: ip.gateway,
            });
        }
        Ok(CniResult {
            cni_version: CURRENT_VERSION.to_string(),
            interfaces: self.interfaces.clone(),
            ips,
            routes: self.routes.iter().map(Route::from).collect(),
            dns: self.dns.clone(),
        })
    }

    pub fn from_current(result: &CniResult, version: &str) -> NetchainResult<Self> {
        let ips = result
            .ips
            .iter()
            .map(|ip| IpConfig040 {
                version: family_tag(&ip.address).to_string(),
                interface: ip.interface,
                address: ip.address,
                gateway: ip.gateway,
            })
            .collect();
        let routes = result
            .routes
            .iter()
            .map(|r| r.to_simple(version))
            .collect::<NetchainResult<Vec<_>>>()?;
        Ok(Result040 {
            cni_version: version.to_string(),
            interfaces: result.interfaces.clone(),
            ips,
            routes,
            dns: result.dns.clone(),
        })
    }
}
