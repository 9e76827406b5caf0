//! Topology graph derived from the engine's peer list.
//!
//! Pure logic: takes a flat list of [`PeerRecord`]s and the local address,
//! returns deduplicated nodes plus the edges from the local node through
//! relays to every peer. [`TopologyCache`] skips rebuilding when the peer set
//! has not changed.
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::address::UNASSIGNED;

/// Hostname prefix the engine gives to public relay servers.
pub const SERVER_NAME_PREFIX: &str = "PublicServer_";

/// Node id of the local node.
pub const LOCAL_NODE_ID: &str = "local";

/// Fixed layout position of the local node.
pub const LOCAL_ANCHOR: [f64; 2] = [0.0, 0.0];

// ── Input ──────────────────────────────────────────────────────────────

/// One peer as reported by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerRecord {
    pub hostname: String,
    /// Dotted quad, or `0.0.0.0` for server/relay-only nodes.
    pub address: String,
    pub latency_ms: f64,
    /// Relays in traversal order from the local node. Empty means direct.
    #[serde(default)]
    pub hops: Vec<HopRecord>,
    #[serde(default)]
    pub platform: Option<String>,
}

/// One relay on the path to a peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HopRecord {
    pub name: String,
    pub address: String,
    pub latency_ms: f64,
}

// ── Output ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeRole {
    Local,
    Server,
    Player,
    Relay,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphNode {
    pub id: String,
    /// Normalized display name, unique within a graph.
    pub name: String,
    pub role: NodeRole,
    pub address: Option<String>,
    pub latency_ms: u32,
    pub platform: String,
    /// Pinned layout position; only the local node has one.
    pub anchor: Option<[f64; 2]>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphEdge {
    /// `conn_<source>_<target>`
    pub id: String,
    pub source: String,
    pub target: String,
    /// Segment latency, e.g. `12.5ms`.
    pub label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TopologyGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl TopologyGraph {
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn local(&self) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.role == NodeRole::Local)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Strip the synthetic server prefix from a hostname.
pub fn normalize_name(hostname: &str) -> &str {
    let trimmed = hostname.trim();
    trimmed.strip_prefix(SERVER_NAME_PREFIX).unwrap_or(trimmed)
}

fn latency_label(ms: f64) -> String {
    format!("{ms:.1}ms")
}

fn latency_whole(ms: f64) -> u32 {
    if ms.is_finite() && ms > 0.0 {
        ms.round() as u32
    } else {
        0
    }
}

// ── Builder ────────────────────────────────────────────────────────────

#[derive(Default)]
struct GraphBuilder {
    graph: TopologyGraph,
    /// Normalized name -> node id. First writer wins.
    by_name: HashMap<String, String>,
    edge_ids: HashSet<String>,
    servers: usize,
    players: usize,
    relays: usize,
}

impl GraphBuilder {
    fn register(&mut self, node: GraphNode) -> String {
        let id = node.id.clone();
        self.by_name.insert(node.name.clone(), id.clone());
        self.graph.nodes.push(node);
        id
    }

    fn add_edge(&mut self, source: &str, target: &str, latency_ms: f64) {
        if source == target {
            return;
        }
        let id = format!("conn_{source}_{target}");
        if !self.edge_ids.insert(id.clone()) {
            return;
        }
        self.graph.edges.push(GraphEdge {
            id,
            source: source.to_string(),
            target: target.to_string(),
            label: latency_label(latency_ms),
        });
    }

    fn add_peer(&mut self, peer: &PeerRecord) -> Option<String> {
        let name = normalize_name(&peer.hostname);
        if self.by_name.contains_key(name) {
            return None;
        }

        let (role, id, address) = if peer.address == UNASSIGNED {
            let id = format!("server_{}", self.servers);
            self.servers += 1;
            (NodeRole::Server, id, None)
        } else {
            let id = format!("player_{}", self.players);
            self.players += 1;
            (NodeRole::Player, id, Some(peer.address.clone()))
        };

        Some(self.register(GraphNode {
            id,
            name: name.to_string(),
            role,
            address,
            latency_ms: latency_whole(peer.latency_ms),
            platform: platform_label(peer.platform.as_deref()),
            anchor: None,
        }))
    }

    /// Resolve a hop to a node id, allocating a relay if it is new.
    fn hop_node(&mut self, hop: &HopRecord, target_name: &str, target_id: &str) -> String {
        let fallback;
        let raw = if hop.name.trim().is_empty() {
            fallback = format!("relay_{}", hop.address);
            fallback.as_str()
        } else {
            hop.name.as_str()
        };
        let name = normalize_name(raw);

        if name == target_name {
            return target_id.to_string();
        }
        if let Some(id) = self.by_name.get(name) {
            return id.clone();
        }

        let id = format!("relay_{}", self.relays);
        self.relays += 1;
        let address = (!hop.address.is_empty() && hop.address != UNASSIGNED)
            .then(|| hop.address.clone());
        self.register(GraphNode {
            id,
            name: name.to_string(),
            role: NodeRole::Relay,
            address,
            latency_ms: latency_whole(hop.latency_ms),
            platform: platform_label(None),
            anchor: None,
        })
    }

    fn add_path(&mut self, peer: &PeerRecord, peer_id: &str, local_id: Option<&str>) {
        if peer.hops.is_empty() {
            if let Some(local) = local_id {
                self.add_edge(local, peer_id, peer.latency_ms);
            }
            return;
        }

        let target_name = normalize_name(&peer.hostname).to_string();
        let mut cursor = local_id.map(str::to_string);
        for hop in &peer.hops {
            let hop_id = self.hop_node(hop, &target_name, peer_id);
            if let Some(prev) = &cursor {
                self.add_edge(prev, &hop_id, hop.latency_ms);
            }
            cursor = Some(hop_id);
        }

        if let Some(last) = cursor {
            if last != peer_id {
                self.add_edge(&last, peer_id, peer.latency_ms);
            }
        }
    }
}

fn platform_label(platform: Option<&str>) -> String {
    match platform.map(str::trim) {
        Some(p) if !p.is_empty() => p.to_string(),
        _ => "unknown".to_string(),
    }
}

/// Build the topology graph for `peers` as seen from `local_address`.
///
/// Deterministic: the same input in the same order yields the same graph.
pub fn build(peers: &[PeerRecord], local_address: &str) -> TopologyGraph {
    let mut builder = GraphBuilder::default();

    let local_index = if local_address.is_empty() || local_address == UNASSIGNED {
        None
    } else {
        peers.iter().position(|p| p.address == local_address)
    };

    let local_id = local_index.map(|i| {
        let peer = &peers[i];
        builder.register(GraphNode {
            id: LOCAL_NODE_ID.to_string(),
            name: normalize_name(&peer.hostname).to_string(),
            role: NodeRole::Local,
            address: Some(peer.address.clone()),
            latency_ms: 0,
            platform: platform_label(peer.platform.as_deref()),
            anchor: Some(LOCAL_ANCHOR),
        })
    });

    for (i, peer) in peers.iter().enumerate() {
        if Some(i) == local_index {
            continue;
        }
        let Some(peer_id) = builder.add_peer(peer) else {
            tracing::trace!(hostname = %peer.hostname, "duplicate peer skipped");
            continue;
        };
        builder.add_path(peer, &peer_id, local_id.as_deref());
    }

    builder.graph
}

// ── Cache ──────────────────────────────────────────────────────────────

/// Rebuilds the graph only when the ordered peer addresses (or the local
/// address) differ from the previous call.
#[derive(Debug, Default)]
pub struct TopologyCache {
    local_address: String,
    addresses: Vec<String>,
    graph: Arc<TopologyGraph>,
    primed: bool,
}

impl TopologyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current graph and whether it was rebuilt by this call.
    pub fn update(
        &mut self,
        peers: &[PeerRecord],
        local_address: &str,
    ) -> (Arc<TopologyGraph>, bool) {
        let unchanged = self.primed
            && self.local_address == local_address
            && self.addresses.len() == peers.len()
            && self.addresses.iter().zip(peers).all(|(a, p)| *a == p.address);
        if unchanged {
            return (Arc::clone(&self.graph), false);
        }

        self.graph = Arc::new(build(peers, local_address));
        self.addresses = peers.iter().map(|p| p.address.clone()).collect();
        self.local_address = local_address.to_string();
        self.primed = true;
        (Arc::clone(&self.graph), true)
    }

    /// Last built graph (empty before the first update).
    pub fn graph(&self) -> Arc<TopologyGraph> {
        Arc::clone(&self.graph)
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
