// Result shape of 1.1.0: routes gained mtu/advmss/priority/table/scope.

use std::net::IpAddr;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use super::common::{Dns, Interface, IpConfig};
use super::current::{CniResult, Route};
use super::{check_decoded_version, Generation};
use crate::error::NetchainResult;
use crate::version::CURRENT_VERSION;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Result110 {
    #[serde(rename = "cniVersion")]
    pub cni_version: String,

    #[serde(rename = "interfaces", default, skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<Interface>,

    #[serde(rename = "ips", default, skip_serializing_if = "Vec::is_empty")]
    pub ips: Vec<IpConfig>,

    #[serde(rename = "routes", default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<Route110>,

    #[serde(rename = "dns", default, skip_serializing_if = "Dns::is_empty")]
    pub dns: Dns,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route110 {
    #[serde(rename = "dst")]
    pub dst: IpNet,

    #[serde(rename = "gw", default, skip_serializing_if = "Option::is_none")]
    pub gw: Option<IpAddr>,

    #[serde(rename = "mtu", default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,

    #[serde(rename = "advmss", default, skip_serializing_if = "Option::is_none")]
    pub advmss: Option<u32>,

    #[serde(rename = "priority", default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,

    #[serde(rename = "table", default, skip_serializing_if = "Option::is_none")]
    pub table: Option<u32>,

    #[serde(rename = "scope", default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<u32>,
}

impl Result110 {
    pub fn from_bytes(bytes: &[u8]) -> NetchainResult<Self> {
        let result: Result110 = serde_json::from_slice(bytes)?;
        check_decoded_version(&result.cni_version, Generation::V110)?;
        Ok(result)
    }

    pub fn to_current(&self) -> CniResult {
        let routes = self
            .routes
            .iter()
            .map(|r| {
                let mut route = Route::new(r.dst, r.gw);
                route.mtu = r.mtu;
                route.advmss = r.advmss;
                route.priority = r.priority;
                route.table = r.table;
                route.scope = r.scope;
                route
            })
            .collect();
        CniResult {
            cni_version: CURRENT_VERSION.to_string(),
            interfaces: self.interfaces.clone(),
            ips: self.ips.clone(),
            routes,
            dns: self.dns.clone(),
        }
    }

    pub fn from_current(result: &CniResult, version: &str) -> NetchainResult<Self> {
        let mut routes = Vec::with_capacity(result.routes.len());
        for r in &result.routes {
            routes.push(Route110 {
                dst: r.dst,
                gw: r.single_gateway(version)?,
                mtu: r.mtu,
                advmss: r.advmss,
                priority: r.priority,
                table: r.table,
                scope: r.scope,
            });
        }
        Ok(Result110 {
            cni_version: version.to_string(),
            interfaces: result.interfaces.clone(),
            ips: result.ips.clone(),
            routes,
            dns: result.dns.clone(),
        })
    }
}
