// Per attachment runtime parameters supplied by the caller.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{NetchainError, NetchainResult};

/// Capabilities a runtime can hand to plugins through `runtimeConfig`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
    PortMappings,
    IpRanges,
    Bandwidth,
    Dns,
    Ips,
    Mac,
    InfinibandGuid,
    DeviceId,
    Aliases,
    CgroupPath,
}

impl Capability {
    pub const ALL: [Capability; 10] = [
        Capability::PortMappings,
        Capability::IpRanges,
        Capability::Bandwidth,
        Capability::Dns,
        Capability::Ips,
        Capability::Mac,
        Capability::InfinibandGuid,
        Capability::DeviceId,
        Capability::Aliases,
        Capability::CgroupPath,
    ];

    /// The key used in plugin configs and runtimeConfig.
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::PortMappings => "portMappings",
            Capability::IpRanges => "ipRanges",
            Capability::Bandwidth => "bandwidth",
            Capability::Dns => "dns",
            Capability::Ips => "ips",
            Capability::Mac => "mac",
            Capability::InfinibandGuid => "infinibandGUID",
            Capability::DeviceId => "deviceID",
            Capability::Aliases => "aliases",
            Capability::CgroupPath => "cgroupPath",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = NetchainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| NetchainError::invalid_config(format!("unknown capability \"{}\"", s)))
    }
}

/// Capability arguments keyed by capability, the values are passed on as is.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CapabilityArgs(BTreeMap<Capability, Value>);

impl CapabilityArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, cap: Capability, value: Value) -> Option<Value> {
        self.0.insert(cap, value)
    }

    pub fn get(&self, cap: Capability) -> Option<&Value> {
        self.0.get(&cap)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Capability, &Value)> {
        self.0.iter()
    }

    /// Parse a JSON object keyed by capability name.
    pub fn from_json(value: Value) -> NetchainResult<Self> {
        let obj = match value {
            Value::Object(obj) => obj,
            Value::Null => return Ok(Self::default()),
            other => {
                return Err(NetchainError::invalid_config(format!(
                    "capability args must be a JSON object, got {}",
                    other
                )))
            }
        };
        let mut args = CapabilityArgs::new();
        for (key, value) in obj {
            args.insert(key.parse()?, value);
        }
        Ok(args)
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.as_str().to_string(), v.clone()))
                .collect(),
        )
    }
}

/// Identifies one attachment: a container and one of its interfaces.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(rename = "containerID")]
    pub container_id: String,

    #[serde(rename = "ifname")]
    pub if_name: String,
}

impl Attachment {
    pub fn new<C: Into<String>, I: Into<String>>(container_id: C, if_name: I) -> Self {
        Attachment {
            container_id: container_id.into(),
            if_name: if_name.into(),
        }
    }
}

impl FromStr for Attachment {
    type Err = NetchainError;

    /// `<containerID>:<ifname>`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((cid, ifname)) if !cid.is_empty() && !ifname.is_empty() => {
                Ok(Attachment::new(cid, ifname))
            }
            _ => Err(NetchainError::invalid_config(format!(
                "invalid attachment \"{}\", expected <containerID>:<ifname>",
                s
            ))),
        }
    }
}

/// Arguments of a GC run. Without a list of valid attachments the plugins
/// collect everything they manage for the network.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GcArgs {
    pub valid_attachments: Option<Vec<Attachment>>,
}

/// Everything identifying the attachment an operation works on.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RuntimeConf {
    pub container_id: String,
    /// Namespace locator, may be empty for DEL.
    pub netns: String,
    pub if_name: String,
    /// Ordered plugin arguments, sent as CNI_ARGS.
    pub args: Vec<(String, String)>,
    pub capability_args: CapabilityArgs,
    /// Overrides the orchestrator wide cache directory for this attachment.
    pub cache_dir: Option<PathBuf>,
}

impl RuntimeConf {
    pub fn new<C, N, I>(container_id: C, netns: N, if_name: I) -> Self
    where
        C: Into<String>,
        N: Into<String>,
        I: Into<String>,
    {
        RuntimeConf {
            container_id: container_id.into(),
            netns: netns.into(),
            if_name: if_name.into(),
            ..Default::default()
        }
    }

    pub fn attachment(&self) -> Attachment {
        Attachment::new(self.container_id.clone(), self.if_name.clone())
    }
}
