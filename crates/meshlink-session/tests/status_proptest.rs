use std::collections::HashSet;

use meshlink_session::{build_topology, RunningInfo, UNASSIGNED};
use proptest::prelude::*;

/// Strategy for one remote node in the engine's JSON encoding.
fn arb_node() -> impl Strategy<Value = serde_json::Value> {
    (
        prop_oneof![
            Just("desk"),
            Just("couch"),
            Just("PublicServer_eu"),
            Just("relay-a"),
            Just(""),
        ],
        prop::option::of(1u32..u32::MAX),
        0.0f64..500.0,
        prop::collection::vec(
            (prop_oneof![Just("relay-a"), Just("PublicServer_eu"), Just("")], 0u8..4),
            0..3,
        ),
    )
        .prop_map(|(hostname, addr, latency, hops)| {
            let hops: Vec<_> = hops
                .into_iter()
                .map(|(name, last)| {
                    serde_json::json!({
                        "name": name,
                        "address": format!("10.0.0.{last}"),
                        "latency_ms": latency / 2.0,
                    })
                })
                .collect();
            let mut node = serde_json::json!({
                "hostname": hostname,
                "latency_ms": latency,
                "hops": hops,
            });
            if let Some(addr) = addr {
                node["ipv4"] = serde_json::json!({ "addr": addr });
            }
            node
        })
}

proptest! {
    /// Arbitrary text never panics the parser.
    #[test]
    fn parse_never_panics(raw in ".{0,200}") {
        let _ = RunningInfo::parse(&raw);
    }

    /// Graphs built from engine documents are well formed.
    #[test]
    fn graph_from_engine_document(
        local in 1u32..u32::MAX,
        nodes in prop::collection::vec(arb_node(), 0..8),
    ) {
        let doc = serde_json::json!({
            "my_node_info": {
                "hostname": "laptop",
                "virtual_ipv4": { "address": { "addr": local } }
            },
            "nodes": nodes,
        });
        let info = RunningInfo::parse(&doc.to_string()).unwrap();
        let address = info.confirmed_address().unwrap();
        let peers = info.peer_records();
        prop_assert_eq!(peers.len(), nodes.len() + 1);
        prop_assert!(peers.iter().all(|p| !p.address.is_empty()));

        let graph = build_topology(&peers, &address.to_string());

        let ids: HashSet<_> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
        prop_assert_eq!(ids.len(), graph.nodes.len());
        let names: HashSet<_> = graph.nodes.iter().map(|n| n.name.as_str()).collect();
        prop_assert_eq!(names.len(), graph.nodes.len());

        let edge_ids: HashSet<_> = graph.edges.iter().map(|e| e.id.as_str()).collect();
        prop_assert_eq!(edge_ids.len(), graph.edges.len());
        for edge in &graph.edges {
            prop_assert_ne!(&edge.source, &edge.target);
            prop_assert!(ids.contains(edge.source.as_str()));
            prop_assert!(ids.contains(edge.target.as_str()));
        }

        for node in &graph.nodes {
            prop_assert_ne!(node.address.as_deref(), Some(UNASSIGNED));
        }
    }
}
