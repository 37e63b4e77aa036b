// Result shape of 1.0.0: untagged ips, plain dst/gw routes.

use serde::{Deserialize, Serialize};

use super::common::{Dns, Interface, IpConfig, SimpleRoute};
use super::current::{CniResult, Route};
use super::{check_decoded_version, Generation};
use crate::error::NetchainResult;
use crate::version::CURRENT_VERSION;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Result100 {
    #[serde(rename = "cniVersion")]
    pub cni_version: String,

    #[serde(rename = "interfaces", default, skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<Interface>,

    #[serde(rename = "ips", default, skip_serializing_if = "Vec::is_empty")]
    pub ips: Vec<IpConfig>,

    #[serde(rename = "routes", default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<SimpleRoute>,

    #[serde(rename = "dns", default, skip_serializing_if = "Dns::is_empty")]
    pub dns: Dns,
}

impl Result100 {
    pub fn from_bytes(bytes: &[u8]) -> NetchainResult<Self> {
        let result: Result100 = serde_json::from_slice(bytes)?;
        check_decoded_version(&result.cni_version, Generation::V100)?;
        Ok(result)
    }

    pub fn to_current(&self) -> CniResult {
        CniResult {
            cni_version: CURRENT_VERSION.to_string(),
            interfaces: self.interfaces.clone(),
            ips: self.ips.clone(),
            routes: self.routes.iter().map(Route::from).collect(),
            dns: self.dns.clone(),
        }
    }

    pub fn from_current(result: &CniResult, version: &str) -> NetchainResult<Self> {
        let routes = result
            .routes
            .iter()
            .map(|r| r.to_simple(version))
            .collect::<NetchainResult<Vec<_>>>()?;
        Ok(Result100 {
            cni_version: version.to_string(),
            interfaces: result.interfaces.clone(),
            ips: result.ips.clone(),
            routes,
            dns: result.dns.clone(),
        })
    }
}
