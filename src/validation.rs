use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{NetchainError, NetchainResult};

static NAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_.\-]*$").expect("name pattern must compile")
});

// IFNAMSIZ minus the trailing NUL
const MAX_INTERFACE_NAME_LEN: usize = 15;

pub fn validate_container_id(container_id: &str) -> NetchainResult<()> {
    if container_id.is_empty() {
        return Err(NetchainError::invalid_config("missing containerID"));
    }
    if !NAME_PATTERN.is_match(container_id) {
        return Err(NetchainError::invalid_config(format!(
            "invalid characters in containerID \"{}\"",
            container_id
        )));
    }
    Ok(())
}

pub fn validate_network_name(name: &str) -> NetchainResult<()> {
    if name.is_empty() {
        return Err(NetchainError::invalid_config("missing network name"));
    }
    if !NAME_PATTERN.is_match(name) {
        return Err(NetchainError::invalid_config(format!(
            "invalid characters found in network name \"{}\"",
            name
        )));
    }
    Ok(())
}

pub fn validate_interface_name(ifname: &str) -> NetchainResult<()> {
    debug!("Checking interface name {:?}", ifname);
    if ifname.is_empty() {
        return Err(NetchainError::invalid_config("interface name is empty"));
    }
    if ifname.len() > MAX_INTERFACE_NAME_LEN {
        return Err(NetchainError::invalid_config(format!(
            "interface name \"{}\" is too long, max {} characters",
            ifname, MAX_INTERFACE_NAME_LEN
        )));
    }
    if ifname == "." || ifname == ".." {
        return Err(NetchainError::invalid_config(format!(
            "interface name \"{}\" is not allowed",
            ifname
        )));
    }
    if let Some(c) = ifname
        .chars()
        .find(|c| *c == '/' || *c == ':' || c.is_whitespace())
    {
        return Err(NetchainError::invalid_config(format!(
            "interface name \"{}\" contains invalid character {:?}",
            ifname, c
        )));
    }
    Ok(())
}
