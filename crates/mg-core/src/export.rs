//! Subscription descriptor assembly and export
//!
//! Once the public hostname is known, three protocol descriptors are
//! built against the static edge address, newline-joined, and
//! base64-encoded into the subscription bundle. The bundle is the
//! single latest-export value: stored in memory for the front-end,
//! snapshotted to disk, and optionally synced to a registry. Only the
//! in-memory store write matters for correctness; everything else is
//! best-effort.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::config::{Settings, WorkPaths};
use crate::geo::GeoTagger;
use crate::ingress::{TROJAN_WS_PATH, VLESS_WS_PATH, VMESS_WS_PATH};
use crate::store::SubscriptionStore;

/// Query suffix advertising websocket early data to clients
const EARLY_DATA_QUERY: &str = "?ed=2560";

/// Keep-alive registration endpoint
const KEEP_ALIVE_ENDPOINT: &str = "https://oooo.serv00.net/add-url";

/// Characters escaped in the descriptor `path` parameter
const PATH_ESCAPES: &AsciiSet = &CONTROLS.add(b'/').add(b'?').add(b'=');

/// The vmess descriptor payload, base64-embedded in the link
#[derive(Debug, Serialize, Deserialize)]
struct VmessNode {
    v: String,
    ps: String,
    add: String,
    port: u16,
    id: String,
    aid: String,
    scy: String,
    net: String,
    #[serde(rename = "type")]
    typ: String,
    host: String,
    path: String,
    tls: String,
    sni: String,
    alpn: String,
    fp: String,
}

/// Assembles and publishes the subscription bundle
#[derive(Debug, Clone)]
pub struct SubscriptionExporter {
    node_id: String,
    edge_host: String,
    edge_port: u16,
    node_label: String,
    registry_url: String,
    public_url: String,
    sub_path: String,
    sub_file: PathBuf,
    store: SubscriptionStore,
    geo: GeoTagger,
}

impl SubscriptionExporter {
    pub fn new(settings: &Settings, paths: &WorkPaths, store: SubscriptionStore) -> Self {
        Self {
            node_id: settings.node_id.clone(),
            edge_host: settings.edge_host.clone(),
            edge_port: settings.edge_port,
            node_label: settings.node_label.clone(),
            registry_url: settings.registry_url.clone(),
            public_url: settings.public_url.clone(),
            sub_path: settings.sub_path.clone(),
            sub_file: paths.subscription.clone(),
            store,
            geo: GeoTagger::new(),
        }
    }

    /// Replace the geo tagger (tests and embedders)
    pub fn with_geo(mut self, geo: GeoTagger) -> Self {
        self.geo = geo;
        self
    }

    /// Export the bundle for a discovered hostname.
    ///
    /// Overwrites the latest-export value, snapshots it to the
    /// subscription file, and kicks off the registry sync. Returns the
    /// encoded bundle.
    pub async fn export(&self, domain: &str) -> String {
        let geo_label = self.geo.lookup().await;
        let name = self.display_name(&geo_label);

        let lines = self.descriptors(domain, &name);
        let encoded = BASE64.encode(lines.join("\n"));

        info!("Public endpoint bound: {}", domain);
        debug!("Subscription bundle (base64): {}", encoded);

        // Disk snapshot is an inspection artifact only
        if let Err(e) = fs::write(&self.sub_file, &encoded) {
            warn!("Failed to persist subscription snapshot: {}", e);
        }

        self.store.set(encoded.clone());
        self.sync_registry(lines);

        encoded
    }

    /// Display name: optional operator prefix plus the geo label
    fn display_name(&self, geo_label: &str) -> String {
        if self.node_label.is_empty() {
            geo_label.to_string()
        } else {
            format!("{}-{}", self.node_label, geo_label)
        }
    }

    /// Build the three protocol descriptors.
    ///
    /// All point at the same edge address and carry the discovered
    /// hostname as TLS server name and host header.
    fn descriptors(&self, domain: &str, name: &str) -> Vec<String> {
        let vless = format!(
            "vless://{}@{}:{}?encryption=none&security=tls&sni={}&fp=firefox&type=ws&host={}&path={}#{}",
            self.node_id,
            self.edge_host,
            self.edge_port,
            domain,
            domain,
            encode_path(&format!("{}{}", VLESS_WS_PATH, EARLY_DATA_QUERY)),
            name,
        );

        let vmess_node = VmessNode {
            v: "2".to_string(),
            ps: name.to_string(),
            add: self.edge_host.clone(),
            port: self.edge_port,
            id: self.node_id.clone(),
            aid: "0".to_string(),
            scy: "none".to_string(),
            net: "ws".to_string(),
            typ: "none".to_string(),
            host: domain.to_string(),
            path: format!("{}{}", VMESS_WS_PATH, EARLY_DATA_QUERY),
            tls: "tls".to_string(),
            sni: domain.to_string(),
            alpn: String::new(),
            fp: "firefox".to_string(),
        };
        let vmess = format!(
            "vmess://{}",
            BASE64.encode(serde_json::to_string(&vmess_node).expect("vmess node serializes")),
        );

        let trojan = format!(
            "trojan://{}@{}:{}?security=tls&sni={}&fp=firefox&type=ws&host={}&path={}#{}",
            self.node_id,
            self.edge_host,
            self.edge_port,
            domain,
            domain,
            encode_path(&format!("{}{}", TROJAN_WS_PATH, EARLY_DATA_QUERY)),
            name,
        );

        vec![vless, vmess, trojan]
    }

    /// Select the registry call: one subscription URL when the public
    /// service URL is known, the raw descriptor lines otherwise.
    fn registry_payload(&self, lines: &[String]) -> Option<(String, serde_json::Value)> {
        if self.registry_url.is_empty() {
            return None;
        }

        if self.public_url.is_empty() {
            Some((
                format!("{}/api/add-nodes", self.registry_url),
                serde_json::json!({ "nodes": lines }),
            ))
        } else {
            Some((
                format!("{}/api/add-subscriptions", self.registry_url),
                serde_json::json!({
                    "subscription": [format!("{}/{}", self.public_url, self.sub_path)]
                }),
            ))
        }
    }

    /// Fire-and-forget registry sync; failures are advisory only
    fn sync_registry(&self, lines: Vec<String>) {
        let (url, payload) = match self.registry_payload(&lines) {
            Some(call) => call,
            None => return,
        };

        tokio::spawn(async move {
            let client = reqwest::Client::new();
            if let Err(e) = client.post(&url).json(&payload).send().await {
                debug!("Registry sync failed: {}", e);
            }
        });
    }
}

/// Fire-and-forget registration of the public URL with the keep-alive
/// service
pub fn spawn_keep_alive(public_url: String) {
    tokio::spawn(async move {
        let client = reqwest::Client::new();
        let payload = serde_json::json!({ "url": public_url });
        if let Err(e) = client.post(KEEP_ALIVE_ENDPOINT).json(&payload).send().await {
            debug!("Keep-alive registration failed: {}", e);
        }
    });
}

fn encode_path(path: &str) -> String {
    utf8_percent_encode(path, PATH_ESCAPES).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn exporter(dir: &TempDir) -> SubscriptionExporter {
        let mut settings = Settings::default();
        settings.node_id = "11111111-2222-3333-4444-555555555555".to_string();
        settings.edge_host = "edge.example.net".to_string();
        settings.edge_port = 443;
        let paths = WorkPaths::new(dir.path());

        SubscriptionExporter::new(&settings, &paths, SubscriptionStore::new())
            // Unroutable endpoint: lookups fail fast to the sentinel
            .with_geo(GeoTagger::with_endpoint("http://127.0.0.1:9/json/"))
    }

    #[test]
    fn test_encode_path() {
        assert_eq!(encode_path("/vless-argo?ed=2560"), "%2Fvless-argo%3Fed%3D2560");
    }

    #[test]
    fn test_descriptors_carry_identity_and_hostname() {
        let dir = TempDir::new().unwrap();
        let exporter = exporter(&dir);
        let lines = exporter.descriptors("abc123.trycloudflare.com", "node-1");

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("vless://11111111-2222-3333-4444-555555555555@"));
        assert!(lines[1].starts_with("vmess://"));
        assert!(lines[2].starts_with("trojan://11111111-2222-3333-4444-555555555555@"));

        for line in [&lines[0], &lines[2]] {
            assert!(line.contains("sni=abc123.trycloudflare.com"));
            assert!(line.contains("host=abc123.trycloudflare.com"));
            assert!(line.contains("edge.example.net:443"));
            assert!(line.ends_with("#node-1"));
        }
        assert!(lines[0].contains("path=%2Fvless-argo%3Fed%3D2560"));
        assert!(lines[2].contains("path=%2Ftrojan-argo%3Fed%3D2560"));
    }

    #[test]
    fn test_vmess_payload_round_trips() {
        let dir = TempDir::new().unwrap();
        let exporter = exporter(&dir);
        let lines = exporter.descriptors("abc123.trycloudflare.com", "node-1");

        let payload = lines[1].strip_prefix("vmess://").unwrap();
        let node: VmessNode =
            serde_json::from_slice(&BASE64.decode(payload).unwrap()).unwrap();

        assert_eq!(node.v, "2");
        assert_eq!(node.ps, "node-1");
        assert_eq!(node.host, "abc123.trycloudflare.com");
        assert_eq!(node.sni, "abc123.trycloudflare.com");
        assert_eq!(node.id, "11111111-2222-3333-4444-555555555555");
        assert_eq!(node.path, "/vmess-argo?ed=2560");
        assert_eq!(node.net, "ws");
        assert_eq!(node.tls, "tls");
    }

    #[test]
    fn test_display_name_prefix() {
        let dir = TempDir::new().unwrap();
        let mut exporter = exporter(&dir);
        assert_eq!(exporter.display_name("DE_EXAMPLE"), "DE_EXAMPLE");

        exporter.node_label = "edge-1".to_string();
        assert_eq!(exporter.display_name("DE_EXAMPLE"), "edge-1-DE_EXAMPLE");
    }

    #[test]
    fn test_registry_payload_selection() {
        let dir = TempDir::new().unwrap();
        let mut exporter = exporter(&dir);
        let lines = vec!["vless://a".to_string(), "vmess://b".to_string()];

        // No registry configured: no call
        assert!(exporter.registry_payload(&lines).is_none());

        // Registry without a public URL: raw node lines
        exporter.registry_url = "https://registry.example.com".to_string();
        let (url, payload) = exporter.registry_payload(&lines).unwrap();
        assert_eq!(url, "https://registry.example.com/api/add-nodes");
        assert_eq!(payload["nodes"][0], "vless://a");

        // Registry plus public URL: one subscription link
        exporter.public_url = "https://node.example.com".to_string();
        exporter.sub_path = "subb".to_string();
        let (url, payload) = exporter.registry_payload(&lines).unwrap();
        assert_eq!(url, "https://registry.example.com/api/add-subscriptions");
        assert_eq!(payload["subscription"][0], "https://node.example.com/subb");
    }

    #[tokio::test]
    async fn test_export_round_trip() {
        let dir = TempDir::new().unwrap();
        let exporter = exporter(&dir);

        let encoded = exporter.export("abc123.trycloudflare.com").await;

        // The decoded bundle is exactly the three descriptor lines
        let decoded = String::from_utf8(BASE64.decode(&encoded).unwrap()).unwrap();
        let lines: Vec<&str> = decoded.lines().collect();
        assert_eq!(lines.len(), 3);
        for line in &lines {
            assert!(line.contains("11111111-2222-3333-4444-555555555555"));
        }

        // Geo lookup failed, so the sentinel is the display name
        assert!(lines[0].ends_with("#UN_NET"));

        // Stored and snapshotted
        assert_eq!(exporter.store.get().as_deref(), Some(encoded.as_str()));
        assert_eq!(
            fs::read_to_string(dir.path().join("sub.txt")).unwrap(),
            encoded
        );
    }

    #[tokio::test]
    async fn test_export_overwrites_previous_bundle() {
        let dir = TempDir::new().unwrap();
        let exporter = exporter(&dir);

        let first = exporter.export("first.trycloudflare.com").await;
        let second = exporter.export("second.trycloudflare.com").await;

        assert_ne!(first, second);
        assert_eq!(exporter.store.get().as_deref(), Some(second.as_str()));
    }

    #[tokio::test]
    async fn test_unwritable_snapshot_is_tolerated() {
        let dir = TempDir::new().unwrap();
        let mut exporter = exporter(&dir);
        exporter.sub_file = dir.path().join("no-such-dir").join("sub.txt");

        // Still exports and stores despite the failed file write
        let encoded = exporter.export("abc123.trycloudflare.com").await;
        assert_eq!(exporter.store.get().as_deref(), Some(encoded.as_str()));
    }
}
