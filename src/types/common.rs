// Types shared by several result versions.

use std::net::IpAddr;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

/// Interface created or touched by a plugin.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    #[serde(rename = "name")]
    pub name: String,

    /// Hardware address, empty when the interface has none.
    #[serde(rename = "mac", default, skip_serializing_if = "String::is_empty")]
    pub mac: String,

    /// Namespace locator the interface lives in, empty for host interfaces.
    #[serde(rename = "sandbox", default, skip_serializing_if = "String::is_empty")]
    pub sandbox: String,
}

/// IP configuration as used from 1.0.0 on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpConfig {
    /// Index into the interfaces list of the same result.
    #[serde(rename = "interface", default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<usize>,

    #[serde(rename = "address")]
    pub address: IpNet,

    #[serde(rename = "gateway", default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<IpAddr>,
}

/// A route which only knows a destination and a single optional gateway.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleRoute {
    #[serde(rename = "dst")]
    pub dst: IpNet,

    #[serde(rename = "gw", default, skip_serializing_if = "Option::is_none")]
    pub gw: Option<IpAddr>,
}

/// resolv.conf style DNS settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dns {
    #[serde(rename = "nameservers", default, skip_serializing_if = "Vec::is_empty")]
    pub nameservers: Vec<String>,

    #[serde(rename = "domain", default, skip_serializing_if = "String::is_empty")]
    pub domain: String,

    #[serde(rename = "search", default, skip_serializing_if = "Vec::is_empty")]
    pub search: Vec<String>,

    #[serde(rename = "options", default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl Dns {
    pub fn is_empty(&self) -> bool {
        self.nameservers.is_empty()
            && self.domain.is_empty()
            && self.search.is_empty()
            && self.options.is_empty()
    }
}

pub(crate) fn is_ipv4(net: &IpNet) -> bool {
    matches!(net, IpNet::V4(_))
}
