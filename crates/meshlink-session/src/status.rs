//! Schema for the engine's running-info document.
//!
//! Every field is optional and parsing never fails loudly: a document that
//! does not match is treated as "not yet connected" by the poller.
use std::net::Ipv4Addr;

use serde::Deserialize;

use crate::address::{self, UNASSIGNED};
use crate::topology::{HopRecord, PeerRecord};

/// Network prefix assumed when the engine omits one.
pub const DEFAULT_NETWORK_LENGTH: u8 = 24;

/// Snapshot of the engine's running state.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RunningInfo {
    pub my_node_info: Option<MyNodeInfo>,
    pub nodes: Vec<NodeInfo>,
}

/// The local node as seen by the engine.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MyNodeInfo {
    pub hostname: Option<String>,
    pub version: Option<String>,
    pub virtual_ipv4: Option<VirtualIpv4>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VirtualIpv4 {
    pub address: Option<PackedAddress>,
    pub network_length: Option<u8>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PackedAddress {
    pub addr: u32,
}

/// Address field of a remote node; engines disagree on the encoding.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AddressValue {
    Packed(u32),
    Text(String),
    Nested { addr: u32 },
}

impl AddressValue {
    fn to_text(&self) -> String {
        match self {
            AddressValue::Packed(addr) | AddressValue::Nested { addr } => {
                address::address_to_text(*addr)
            }
            AddressValue::Text(text) => {
                // Some engines report "10.0.0.2/24".
                text.split('/').next().unwrap_or_default().trim().to_string()
            }
        }
    }
}

/// A remote node reported by the engine.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NodeInfo {
    #[serde(alias = "ipv4_addr")]
    pub ipv4: Option<AddressValue>,
    pub hostname: String,
    pub version: Option<String>,
    pub platform: Option<String>,
    pub latency_ms: f64,
    pub hops: Vec<HopInfo>,
}

/// One relay on the path to a remote node.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HopInfo {
    #[serde(alias = "hostname", alias = "node_name")]
    pub name: Option<String>,
    #[serde(alias = "ipv4", alias = "target_ip")]
    pub address: Option<AddressValue>,
    pub latency_ms: f64,
}

impl RunningInfo {
    /// Parse a raw document. Empty, `null` or malformed input yields `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        match serde_json::from_str::<Option<RunningInfo>>(raw) {
            Ok(info) => info,
            Err(e) => {
                tracing::debug!("running info did not match schema: {e}");
                None
            }
        }
    }

    /// The confirmed virtual address, if the engine has assigned one.
    pub fn confirmed_address(&self) -> Option<Ipv4Addr> {
        let addr = self
            .my_node_info
            .as_ref()?
            .virtual_ipv4
            .as_ref()?
            .address?
            .addr;
        (addr != 0).then(|| Ipv4Addr::from(addr))
    }

    /// Prefix length of the virtual network.
    pub fn network_length(&self) -> u8 {
        self.my_node_info
            .as_ref()
            .and_then(|n| n.virtual_ipv4.as_ref())
            .and_then(|v| v.network_length)
            .filter(|&len| len <= 32)
            .unwrap_or(DEFAULT_NETWORK_LENGTH)
    }

    /// Flatten into graph-builder input. The local node comes first when
    /// the engine has confirmed an address.
    pub fn peer_records(&self) -> Vec<PeerRecord> {
        let mut records = Vec::with_capacity(self.nodes.len() + 1);

        if let (Some(me), Some(addr)) = (&self.my_node_info, self.confirmed_address()) {
            records.push(PeerRecord {
                hostname: me.hostname.clone().unwrap_or_default(),
                address: addr.to_string(),
                latency_ms: 0.0,
                hops: Vec::new(),
                platform: me.version.clone(),
            });
        }

        for node in &self.nodes {
            let address = node
                .ipv4
                .as_ref()
                .map(AddressValue::to_text)
                .filter(|text| !text.is_empty())
                .unwrap_or_else(|| UNASSIGNED.to_string());
            records.push(PeerRecord {
                hostname: node.hostname.clone(),
                address,
                latency_ms: sanitize_latency(node.latency_ms),
                hops: node
                    .hops
                    .iter()
                    .map(|hop| HopRecord {
                        name: hop.name.clone().unwrap_or_default(),
                        address: hop
                            .address
                            .as_ref()
                            .map(AddressValue::to_text)
                            .unwrap_or_default(),
                        latency_ms: sanitize_latency(hop.latency_ms),
                    })
                    .collect(),
                platform: node.platform.clone().or_else(|| node.version.clone()),
            });
        }
        records
    }
}

fn sanitize_latency(ms: f64) -> f64 {
    if ms.is_finite() && ms > 0.0 {
        ms
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONNECTED: &str = r#"{
        "my_node_info": {
            "hostname": "laptop",
            "version": "2.1.0",
            "virtual_ipv4": { "address": { "addr": 3232235777 }, "network_length": 16 }
        },
        "nodes": [
            { "ipv4": "192.168.1.2", "hostname": "desk", "latency_ms": 12.5, "hops": [] },
            { "hostname": "PublicServer_hk", "latency_ms": 40.0,
              "hops": [ { "hostname": "relay-a", "ipv4": "192.168.1.9", "latency_ms": 20.0 } ] }
        ]
    }"#;

    #[test]
    fn empty_and_null_are_not_documents() {
        assert!(RunningInfo::parse("").is_none());
        assert!(RunningInfo::parse("   ").is_none());
        assert!(RunningInfo::parse("null").is_none());
    }

    #[test]
    fn malformed_document_is_none() {
        assert!(RunningInfo::parse("{\"nodes\": 7}").is_none());
        assert!(RunningInfo::parse("<html>").is_none());
    }

    #[test]
    fn zero_address_is_not_confirmed() {
        let info = RunningInfo::parse(
            r#"{"my_node_info":{"virtual_ipv4":{"address":{"addr":0}}}}"#,
        )
        .unwrap();
        assert_eq!(info.confirmed_address(), None);
    }

    #[test]
    fn missing_address_is_not_confirmed() {
        let info = RunningInfo::parse(r#"{"my_node_info":{"hostname":"x"}}"#).unwrap();
        assert_eq!(info.confirmed_address(), None);
        assert_eq!(info.network_length(), DEFAULT_NETWORK_LENGTH);
    }

    #[test]
    fn confirmed_address_and_prefix() {
        let info = RunningInfo::parse(CONNECTED).unwrap();
        assert_eq!(info.confirmed_address(), Some(Ipv4Addr::new(192, 168, 1, 1)));
        assert_eq!(info.network_length(), 16);
    }

    #[test]
    fn peer_records_include_local_first() {
        let records = RunningInfo::parse(CONNECTED).unwrap().peer_records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].hostname, "laptop");
        assert_eq!(records[0].address, "192.168.1.1");
        assert_eq!(records[0].platform.as_deref(), Some("2.1.0"));
        assert_eq!(records[1].address, "192.168.1.2");
        assert_eq!(records[1].latency_ms, 12.5);
        // Servers report no client address.
        assert_eq!(records[2].address, UNASSIGNED);
        assert_eq!(records[2].hops.len(), 1);
        assert_eq!(records[2].hops[0].name, "relay-a");
        assert_eq!(records[2].hops[0].address, "192.168.1.9");
    }

    #[test]
    fn address_encodings_are_accepted() {
        let info = RunningInfo::parse(
            r#"{"nodes":[
                {"hostname":"a","ipv4":3232235778},
                {"hostname":"b","ipv4":{"addr":3232235779}},
                {"hostname":"c","ipv4_addr":"192.168.1.4/24"}
            ]}"#,
        )
        .unwrap();
        let addrs: Vec<_> = info.peer_records().into_iter().map(|r| r.address).collect();
        assert_eq!(addrs, ["192.168.1.2", "192.168.1.3", "192.168.1.4"]);
    }

    #[test]
    fn negative_latency_is_clamped() {
        let info =
            RunningInfo::parse(r#"{"nodes":[{"hostname":"a","latency_ms":-3.0}]}"#).unwrap();
        assert_eq!(info.peer_records()[0].latency_ms, 0.0);
    }
}
