//! # Configuration
//!
//! Two JSON documents, read from fixed paths given on the command line: a
//! gateway-level document (parsed here into strongly-typed structs) and a
//! concentrator-level document (board/channel layout, kept opaque as
//! `serde_json::Value` since this crate has no physical radio to configure
//! it for). Unknown keys in either document are ignored.

use crate::error::GatewayError;
use crate::filter::FilterMode;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Upstream service kind. One [`crate::service::ServiceProtocol`]
/// implementation exists per variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Semtech,
    Ttn,
    Mqtt,
    Pkt,
    Relay,
    Delay,
    Gwtraf,
}

/// Regional parameters, used only to select default frequency plans; the
/// plan itself lives in the concentrator-level document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Region {
    Eu,
    Eu433,
    Us,
    Cn470,
    Cn779,
    As1,
    As2,
    As3,
    Kr,
    In,
    Ru,
    Kz,
    Au,
}

fn default_filter_mode() -> FilterModeConfig {
    FilterModeConfig::None
}

/// Serde-friendly mirror of [`FilterMode`]; kept distinct so the filter
/// engine's runtime type doesn't need to derive `Deserialize` itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterModeConfig {
    None,
    Include,
    Exclude,
}

impl From<FilterModeConfig> for FilterMode {
    fn from(c: FilterModeConfig) -> Self {
        match c {
            FilterModeConfig::None => FilterMode::None,
            FilterModeConfig::Include => FilterMode::Include,
            FilterModeConfig::Exclude => FilterMode::Exclude,
        }
    }
}

/// Per-field filter configuration for one service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default = "default_filter_mode")]
    pub fport: FilterModeConfig,
    #[serde(default = "default_filter_mode")]
    pub devaddr: FilterModeConfig,
    #[serde(default = "default_filter_mode")]
    pub deveui: FilterModeConfig,
    #[serde(default = "default_filter_mode")]
    pub joineui: FilterModeConfig,
    #[serde(default = "default_filter_mode")]
    pub netid: FilterModeConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub devaddr_values: Vec<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fport_values: Vec<u8>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deveui_values: Vec<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub joineui_values: Vec<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub netid_values: Vec<u32>,
}

impl Default for FilterModeConfig {
    fn default() -> Self {
        FilterModeConfig::None
    }
}

/// One entry of the gateway-level document's `servers[]` array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(rename = "type")]
    pub kind: ServiceKind,
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub key: Option<String>,
    pub addr: String,
    pub port_up: u16,
    #[serde(default)]
    pub port_down: Option<u16>,
    #[serde(default = "default_pull_interval")]
    pub pull_interval: u32,
    #[serde(default)]
    pub max_stall: u32,
    #[serde(default)]
    pub autoquit_threshold: u32,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub fwd_valid_pkt: bool,
    #[serde(default)]
    pub fwd_error_pkt: bool,
    #[serde(default)]
    pub fwd_nocrc_pkt: bool,
}

fn default_true() -> bool {
    true
}

fn default_pull_interval() -> u32 {
    10
}

/// The gateway-level configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub gateway_id: String,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_beacon_period")]
    pub beacon_period: u32,
    #[serde(default = "default_beacon_freq_hz")]
    pub beacon_freq_hz: u32,
    #[serde(default)]
    pub region: Option<Region>,
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
}

fn default_beacon_period() -> u32 {
    0
}

fn default_beacon_freq_hz() -> u32 {
    869_525_000
}

impl GatewayConfig {
    /// Parses the gateway-level document from a JSON byte slice.
    pub fn parse(data: &[u8]) -> Result<Self, GatewayError> {
        serde_json::from_slice(data)
            .map_err(|e| GatewayError::Config(format!("gwcfg parse error: {e}")))
    }

    /// Reads and parses the gateway-level document from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, GatewayError> {
        let data = std::fs::read(path.as_ref())
            .map_err(|e| GatewayError::Config(format!("reading {}: {e}", path.as_ref().display())))?;
        Self::parse(&data)
    }

    /// Services with `enabled == true`, in file order — the order the
    /// coordinator assigns stamp bits in.
    pub fn enabled_services(&self) -> impl Iterator<Item = &ServerConfig> {
        self.servers.iter().filter(|s| s.enabled)
    }
}

/// The concentrator-level configuration document. Board and channel layout
/// vary per hardware revision; this crate has no physical radio to
/// configure, so the document is kept opaque and handed to a
/// [`crate::concentrator::Concentrator`] implementation to interpret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcentratorConfig(pub serde_json::Value);

impl ConcentratorConfig {
    pub fn parse(data: &[u8]) -> Result<Self, GatewayError> {
        let value = serde_json::from_slice(data)
            .map_err(|e| GatewayError::Config(format!("sxcfg parse error: {e}")))?;
        Ok(Self(value))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, GatewayError> {
        let data = std::fs::read(path.as_ref())
            .map_err(|e| GatewayError::Config(format!("reading {}: {e}", path.as_ref().display())))?;
        Self::parse(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_gateway_config_with_defaults() {
        let json = br#"{
            "gateway_id": "AA555A0000000000",
            "servers": [
                { "type": "semtech", "name": "ttn-eu1", "addr": "router.eu1.ttn.com", "port_up": 1700 }
            ]
        }"#;
        let cfg = GatewayConfig::parse(json).unwrap();
        assert_eq!(cfg.gateway_id, "AA555A0000000000");
        assert_eq!(cfg.beacon_freq_hz, 869_525_000);
        assert_eq!(cfg.servers.len(), 1);
        assert!(cfg.servers[0].enabled);
        assert_eq!(cfg.servers[0].pull_interval, 10);
    }

    #[test]
    fn ignores_unknown_keys() {
        let json = br#"{
            "gateway_id": "AA555A0000000000",
            "some_future_field": 42,
            "servers": []
        }"#;
        assert!(GatewayConfig::parse(json).is_ok());
    }

    #[test]
    fn enabled_services_filters_out_disabled_entries() {
        let json = br#"{
            "gateway_id": "AA555A0000000000",
            "servers": [
                { "type": "semtech", "name": "a", "addr": "x", "port_up": 1700, "enabled": true },
                { "type": "relay", "name": "b", "addr": "y", "port_up": 1700, "enabled": false }
            ]
        }"#;
        let cfg = GatewayConfig::parse(json).unwrap();
        let enabled: Vec<_> = cfg.enabled_services().map(|s| s.name.as_str()).collect();
        assert_eq!(enabled, vec!["a"]);
    }

    #[test]
    fn parses_deveui_joineui_and_netid_filter_values() {
        let json = br#"{
            "gateway_id": "AA555A0000000000",
            "servers": [
                { "type": "semtech", "name": "a", "addr": "x", "port_up": 1700,
                  "filter": {
                      "deveui": "include", "deveui_values": [1, 2],
                      "joineui": "exclude", "joineui_values": [3],
                      "netid": "include", "netid_values": [7]
                  }
                }
            ]
        }"#;
        let cfg = GatewayConfig::parse(json).unwrap();
        let filter = &cfg.servers[0].filter;
        assert_eq!(filter.deveui, FilterModeConfig::Include);
        assert_eq!(filter.deveui_values, vec![1, 2]);
        assert_eq!(filter.joineui, FilterModeConfig::Exclude);
        assert_eq!(filter.joineui_values, vec![3]);
        assert_eq!(filter.netid, FilterModeConfig::Include);
        assert_eq!(filter.netid_values, vec![7]);
    }

    #[test]
    fn concentrator_config_keeps_arbitrary_json_opaque() {
        let json = br#"{ "SX130x_conf": { "lorawan_public": true } }"#;
        let cfg = ConcentratorConfig::parse(json).unwrap();
        assert_eq!(cfg.0["SX130x_conf"]["lorawan_public"], true);
    }
}
