//! Routing configuration synthesis for the proxy engine
//!
//! Builds the multiplexed ingress plan: one public inbound on the
//! configured port whose fallback table dispatches, by destination
//! port or websocket path, to four loopback inbounds carrying the
//! individual proxy protocols. The plan is a typed mirror of the
//! engine's JSON configuration schema.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{NodeError, Result};

/// Internal loopback ports, one per dispatched protocol
pub const VLESS_TCP_PORT: u16 = 3001;
pub const VLESS_WS_PORT: u16 = 3002;
pub const VMESS_WS_PORT: u16 = 3003;
pub const TROJAN_WS_PORT: u16 = 3004;

/// Websocket paths, shared between fallback dispatch and exported links
pub const VLESS_WS_PATH: &str = "/vless-argo";
pub const VMESS_WS_PATH: &str = "/vmess-argo";
pub const TROJAN_WS_PATH: &str = "/trojan-argo";

/// The synthesized routing document consumed by the proxy engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngressPlan {
    pub log: LogSettings,
    pub inbounds: Vec<Inbound>,
    pub outbounds: Vec<Outbound>,
}

/// Engine log settings; the engine's own output is discarded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    pub access: String,
    pub error: String,
    pub loglevel: String,
}

/// A single inbound listener entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inbound {
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listen: Option<String>,
    pub protocol: String,
    pub settings: InboundSettings,
    #[serde(rename = "streamSettings")]
    pub stream_settings: StreamSettings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sniffing: Option<Sniffing>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InboundSettings {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clients: Vec<Client>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decryption: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallbacks: Vec<Fallback>,
}

/// A protocol client credential entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Client {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
    #[serde(rename = "alterId", skip_serializing_if = "Option::is_none")]
    pub alter_id: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// One fallback dispatch entry.
///
/// Entries keep declaration order: the bare-port default first, then
/// path-matched entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fallback {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub dest: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSettings {
    pub network: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security: Option<String>,
    #[serde(rename = "wsSettings", skip_serializing_if = "Option::is_none")]
    pub ws_settings: Option<WsSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsSettings {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sniffing {
    pub enabled: bool,
    #[serde(rename = "destOverride")]
    pub dest_override: Vec<String>,
    #[serde(rename = "metadataOnly")]
    pub metadata_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outbound {
    pub protocol: String,
    pub tag: String,
}

impl IngressPlan {
    /// Synthesize the routing plan for a node identity and ingress port.
    ///
    /// Deterministic given the same inputs: one public VLESS inbound
    /// with a four-entry fallback table, four loopback inbounds, and
    /// the direct/block outbound pair.
    pub fn synthesize(node_id: &str, ingress_port: u16) -> Self {
        let sniffing = Sniffing {
            enabled: true,
            dest_override: vec!["http".into(), "tls".into(), "quic".into()],
            metadata_only: false,
        };

        let public = Inbound {
            port: ingress_port,
            listen: None,
            protocol: "vless".to_string(),
            settings: InboundSettings {
                clients: vec![Client {
                    id: Some(node_id.to_string()),
                    flow: Some("xtls-rprx-vision".to_string()),
                    ..Default::default()
                }],
                decryption: Some("none".to_string()),
                fallbacks: vec![
                    Fallback {
                        path: None,
                        dest: VLESS_TCP_PORT,
                    },
                    Fallback {
                        path: Some(VLESS_WS_PATH.to_string()),
                        dest: VLESS_WS_PORT,
                    },
                    Fallback {
                        path: Some(VMESS_WS_PATH.to_string()),
                        dest: VMESS_WS_PORT,
                    },
                    Fallback {
                        path: Some(TROJAN_WS_PATH.to_string()),
                        dest: TROJAN_WS_PORT,
                    },
                ],
            },
            stream_settings: StreamSettings {
                network: "tcp".to_string(),
                security: None,
                ws_settings: None,
            },
            sniffing: None,
        };

        let vless_tcp = Inbound {
            port: VLESS_TCP_PORT,
            listen: Some("127.0.0.1".to_string()),
            protocol: "vless".to_string(),
            settings: InboundSettings {
                clients: vec![Client {
                    id: Some(node_id.to_string()),
                    ..Default::default()
                }],
                decryption: Some("none".to_string()),
                fallbacks: Vec::new(),
            },
            stream_settings: StreamSettings {
                network: "tcp".to_string(),
                security: Some("none".to_string()),
                ws_settings: None,
            },
            sniffing: None,
        };

        let vless_ws = Inbound {
            port: VLESS_WS_PORT,
            listen: Some("127.0.0.1".to_string()),
            protocol: "vless".to_string(),
            settings: InboundSettings {
                clients: vec![Client {
                    id: Some(node_id.to_string()),
                    level: Some(0),
                    ..Default::default()
                }],
                decryption: Some("none".to_string()),
                fallbacks: Vec::new(),
            },
            stream_settings: StreamSettings {
                network: "ws".to_string(),
                security: Some("none".to_string()),
                ws_settings: Some(WsSettings {
                    path: VLESS_WS_PATH.to_string(),
                }),
            },
            sniffing: Some(sniffing.clone()),
        };

        let vmess_ws = Inbound {
            port: VMESS_WS_PORT,
            listen: Some("127.0.0.1".to_string()),
            protocol: "vmess".to_string(),
            settings: InboundSettings {
                clients: vec![Client {
                    id: Some(node_id.to_string()),
                    alter_id: Some(0),
                    ..Default::default()
                }],
                decryption: None,
                fallbacks: Vec::new(),
            },
            stream_settings: StreamSettings {
                network: "ws".to_string(),
                security: None,
                ws_settings: Some(WsSettings {
                    path: VMESS_WS_PATH.to_string(),
                }),
            },
            sniffing: Some(sniffing.clone()),
        };

        let trojan_ws = Inbound {
            port: TROJAN_WS_PORT,
            listen: Some("127.0.0.1".to_string()),
            protocol: "trojan".to_string(),
            settings: InboundSettings {
                clients: vec![Client {
                    password: Some(node_id.to_string()),
                    ..Default::default()
                }],
                decryption: None,
                fallbacks: Vec::new(),
            },
            stream_settings: StreamSettings {
                network: "ws".to_string(),
                security: Some("none".to_string()),
                ws_settings: Some(WsSettings {
                    path: TROJAN_WS_PATH.to_string(),
                }),
            },
            sniffing: Some(sniffing),
        };

        Self {
            log: LogSettings {
                access: "/dev/null".to_string(),
                error: "/dev/null".to_string(),
                loglevel: "none".to_string(),
            },
            inbounds: vec![public, vless_tcp, vless_ws, vmess_ws, trojan_ws],
            outbounds: vec![
                Outbound {
                    protocol: "freedom".to_string(),
                    tag: "direct".to_string(),
                },
                Outbound {
                    protocol: "blackhole".to_string(),
                    tag: "block".to_string(),
                },
            ],
        }
    }

    /// The public-facing inbound (the one carrying the fallback table)
    pub fn public_inbound(&self) -> &Inbound {
        &self.inbounds[0]
    }

    /// The loopback-only internal inbounds
    pub fn internal_inbounds(&self) -> &[Inbound] {
        &self.inbounds[1..]
    }

    /// Write the plan to the path the proxy engine reads at startup.
    ///
    /// Failure here is fatal to startup: the engine cannot run without
    /// its configuration.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string(self)?;
        fs::write(path, json).map_err(|source| NodeError::RoutingConfig {
            path: path.to_path_buf(),
            source,
        })
    }
}
