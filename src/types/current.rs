//! The current (1.2.0) result shape. Every other version converts through it.

use std::convert::TryFrom;
use std::net::IpAddr;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use super::common::{Dns, Interface, IpConfig, SimpleRoute};
use super::{check_decoded_version, Generation};
use crate::error::{NetchainError, NetchainResult};
use crate::version::CURRENT_VERSION;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CniResult {
    #[serde(rename = "cniVersion")]
    pub cni_version: String,

    #[serde(rename = "interfaces", default, skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<Interface>,

    #[serde(rename = "ips", default, skip_serializing_if = "Vec::is_empty")]
    pub ips: Vec<IpConfig>,

    #[serde(rename = "routes", default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<Route>,

    #[serde(rename = "dns", default, skip_serializing_if = "Dns::is_empty")]
    pub dns: Dns,
}

impl Default for CniResult {
    fn default() -> Self {
        CniResult {
            cni_version: CURRENT_VERSION.to_string(),
            interfaces: Vec::new(),
            ips: Vec::new(),
            routes: Vec::new(),
            dns: Dns::default(),
        }
    }
}

impl CniResult {
    pub fn from_bytes(bytes: &[u8]) -> NetchainResult<Self> {
        let result: CniResult = serde_json::from_slice(bytes)?;
        check_decoded_version(&result.cni_version, Generation::Current)?;
        Ok(result)
    }
}

/// One gateway of a multipath route.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextHop {
    #[serde(rename = "gw")]
    pub gw: IpAddr,

    #[serde(rename = "weight", default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
}

impl NextHop {
    pub fn new(gw: IpAddr) -> Self {
        NextHop { gw, weight: None }
    }
}

/// Canonical route. A single unweighted hop is what older versions call `gw`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RouteWire", into = "RouteWire")]
pub struct Route {
    pub dst: IpNet,
    pub next_hops: Vec<NextHop>,
    pub mtu: Option<u32>,
    pub advmss: Option<u32>,
    pub priority: Option<u32>,
    pub table: Option<u32>,
    pub scope: Option<u32>,
}

impl Route {
    pub fn new(dst: IpNet, gw: Option<IpAddr>) -> Self {
        Route {
            dst,
            next_hops: gw.into_iter().map(NextHop::new).collect(),
            mtu: None,
            advmss: None,
            priority: None,
            table: None,
            scope: None,
        }
    }

    /// The single gateway of this route, fails if the hops cannot be
    /// expressed as one plain `gw` field.
    pub(crate) fn single_gateway(&self, target: &str) -> NetchainResult<Option<IpAddr>> {
        match self.next_hops.as_slice() {
            [] => Ok(None),
            [hop] if hop.weight.is_none() => Ok(Some(hop.gw)),
            [_] => Err(NetchainError::conversion(format!(
                "route to {} has a weighted next hop which version {} cannot represent",
                self.dst, target
            ))),
            hops => Err(NetchainError::conversion(format!(
                "route to {} has {} next hops, version {} supports only a single gateway",
                self.dst,
                hops.len(),
                target
            ))),
        }
    }

    fn extended_attributes(&self) -> Vec<&'static str> {
        let mut attrs = Vec::new();
        if self.mtu.is_some() {
            attrs.push("mtu");
        }
        if self.advmss.is_some() {
            attrs.push("advmss");
        }
        if self.priority.is_some() {
            attrs.push("priority");
        }
        if self.table.is_some() {
            attrs.push("table");
        }
        if self.scope.is_some() {
            attrs.push("scope");
        }
        attrs
    }

    /// Project onto the destination/gateway only shape used before 1.1.0.
    pub(crate) fn to_simple(&self, target: &str) -> NetchainResult<SimpleRoute> {
        let attrs = self.extended_attributes();
        if !attrs.is_empty() {
            return Err(NetchainError::conversion(format!(
                "route to {} sets {} which version {} cannot represent",
                self.dst,
                attrs.join(", "),
                target
            )));
        }
        Ok(SimpleRoute {
            dst: self.dst,
            gw: self.single_gateway(target)?,
        })
    }
}

impl From<&SimpleRoute> for Route {
    fn from(r: &SimpleRoute) -> Self {
        Route::new(r.dst, r.gw)
    }
}

/// Wire form of a route, `gw` and `nextHops` are mutually exclusive.
#[derive(Serialize, Deserialize)]
struct RouteWire {
    #[serde(rename = "dst")]
    dst: IpNet,

    #[serde(rename = "gw", default, skip_serializing_if = "Option::is_none")]
    gw: Option<IpAddr>,

    #[serde(rename = "nextHops", default, skip_serializing_if = "Vec::is_empty")]
    next_hops: Vec<NextHop>,

    #[serde(rename = "mtu", default, skip_serializing_if = "Option::is_none")]
    mtu: Option<u32>,

    #[serde(rename = "advmss", default, skip_serializing_if = "Option::is_none")]
    advmss: Option<u32>,

    #[serde(rename = "priority", default, skip_serializing_if = "Option::is_none")]
    priority: Option<u32>,

    #[serde(rename = "table", default, skip_serializing_if = "Option::is_none")]
    table: Option<u32>,

    #[serde(rename = "scope", default, skip_serializing_if = "Option::is_none")]
    scope: Option<u32>,
}

impl TryFrom<RouteWire> for Route {
    type Error = String;

    fn try_from(w: RouteWire) -> Result<Self, Self::Error> {
        let next_hops = match (w.gw, w.next_hops.is_empty()) {
            (Some(_), false) => {
                return Err(format!(
                    "route to {} sets both gw and nextHops",
                    w.dst
                ))
            }
            (Some(gw), true) => vec![NextHop::new(gw)],
            (None, _) => w.next_hops,
        };
        Ok(Route {
            dst: w.dst,
            next_hops,
            mtu: w.mtu,
            advmss: w.advmss,
            priority: w.priority,
            table: w.table,
            scope: w.scope,
        })
    }
}

impl From<Route> for RouteWire {
    fn from(r: Route) -> Self {
        let (gw, next_hops) = match r.next_hops.as_slice() {
            [hop] if hop.weight.is_none() => (Some(hop.gw), Vec::new()),
            _ => (None, r.next_hops),
        };
        RouteWire {
            dst: r.dst,
            gw,
            next_hops,
            mtu: r.mtu,
            advmss: r.advmss,
            priority: r.priority,
            table: r.table,
            scope: r.scope,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_hop_is_written_as_gw() {
        let route = Route::new("0.0.0.0/0".parse().unwrap(), Some("10.0.0.1".parse().unwrap()));
        let json = serde_json::to_string(&route).unwrap();
        assert_eq!(json, r#"{"dst":"0.0.0.0/0","gw":"10.0.0.1"}"#);

        let back: Route = serde_json::from_str(&json).unwrap();
        assert_eq!(back, route);
    }

    #[test]
    fn test_multipath_route() {
        let json = r#"{"dst":"10.10.0.0/16","nextHops":[{"gw":"10.0.0.1","weight":2},{"gw":"10.0.0.2"}],"mtu":1400}"#;
        let route: Route = serde_json::from_str(json).unwrap();
        assert_eq!(route.next_hops.len(), 2);
        assert_eq!(route.next_hops[0].weight, Some(2));
        assert_eq!(route.mtu, Some(1400));
        assert_eq!(serde_json::to_string(&route).unwrap(), json);

        let err = route.to_simple("1.0.0").unwrap_err();
        assert!(err.to_string().contains("mtu"), "{}", err);
    }

    #[test]
    fn test_gw_and_next_hops_conflict() {
        let json = r#"{"dst":"10.10.0.0/16","gw":"10.0.0.9","nextHops":[{"gw":"10.0.0.1"}]}"#;
        let err = serde_json::from_str::<Route>(json).unwrap_err();
        assert!(err.to_string().contains("both gw and nextHops"), "{}", err);
    }

    #[test]
    fn test_single_gateway() {
        let mut route = Route::new("10.10.0.0/16".parse().unwrap(), None);
        assert_eq!(route.single_gateway("1.1.0").unwrap(), None);

        route.next_hops = vec![NextHop {
            gw: "10.0.0.1".parse().unwrap(),
            weight: Some(5),
        }];
        assert!(route.single_gateway("1.1.0").is_err());

        route.next_hops = vec![
            NextHop::new("10.0.0.1".parse().unwrap()),
            NextHop::new("10.0.0.2".parse().unwrap()),
        ];
        let err = route.single_gateway("1.1.0").unwrap_err();
        assert!(err.to_string().contains("2 next hops"), "{}", err);
    }
}
