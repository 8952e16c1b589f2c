//! Launch planning for the external processes
//!
//! Derives the exact argument sets for the proxy engine, the tunnel
//! client, and the telemetry agent, and writes any side files the
//! tunnel client needs before it can start. No process or network
//! activity happens here.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::WorkPaths;
use crate::credential::{classify, CredentialForm};
use crate::error::Result;

/// A planned process launch
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl LaunchSpec {
    fn new(program: &Path, args: Vec<String>) -> Self {
        Self {
            program: program.to_path_buf(),
            args,
        }
    }
}

/// The generated tunnel definition side file
#[derive(Debug, Serialize, Deserialize)]
pub struct TunnelDefinition {
    pub tunnel: String,
    #[serde(rename = "credentials-file")]
    pub credentials_file: PathBuf,
    pub protocol: String,
    pub ingress: Vec<IngressRule>,
}

/// One ingress rule in the tunnel definition
#[derive(Debug, Serialize, Deserialize)]
pub struct IngressRule {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    pub service: String,
    #[serde(rename = "originRequest", skip_serializing_if = "Option::is_none")]
    pub origin_request: Option<OriginRequest>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OriginRequest {
    #[serde(rename = "noTLSVerify")]
    pub no_tls_verify: bool,
}

/// The tunnel identifier field of a structured credential
#[derive(Debug, Deserialize)]
struct TunnelCredential {
    #[serde(rename = "TunnelID")]
    tunnel_id: String,
}

/// Arguments for the proxy engine: the routing config is its sole input
pub fn engine_spec(engine_bin: &Path, routing_config: &Path) -> LaunchSpec {
    LaunchSpec::new(
        engine_bin,
        vec!["-c".to_string(), routing_config.display().to_string()],
    )
}

/// Arguments for the telemetry agent.
///
/// A bare host gets an `https://` prefix before being passed along.
pub fn agent_spec(agent_bin: &Path, telemetry_host: &str, telemetry_token: &str) -> LaunchSpec {
    let endpoint = if telemetry_host.starts_with("http") {
        telemetry_host.to_string()
    } else {
        format!("https://{}", telemetry_host)
    };
    LaunchSpec::new(
        agent_bin,
        vec![
            "-e".to_string(),
            endpoint,
            "-t".to_string(),
            telemetry_token.to_string(),
        ],
    )
}

/// Derive the tunnel client launch from the credential form.
///
/// `Token` runs a named tunnel directly from the token. `TunnelFile`
/// writes the credential and a generated definition file first and
/// references only the definition. Everything else requests an
/// ephemeral quick tunnel whose log output feeds domain discovery.
pub fn tunnel_spec(
    tunnel_bin: &Path,
    credential: &str,
    tunnel_domain: &str,
    ingress_port: u16,
    paths: &WorkPaths,
) -> Result<LaunchSpec> {
    let form = classify(credential);
    debug!("Tunnel credential classified as {:?}", form);

    match form {
        CredentialForm::Token => Ok(LaunchSpec::new(
            tunnel_bin,
            vec![
                "tunnel".to_string(),
                "--edge-ip-version".to_string(),
                "auto".to_string(),
                "--no-autoupdate".to_string(),
                "--protocol".to_string(),
                "http2".to_string(),
                "run".to_string(),
                "--token".to_string(),
                credential.to_string(),
            ],
        )),

        CredentialForm::TunnelFile => match extract_tunnel_id(credential) {
            Some(tunnel_id) => {
                write_side_files(credential, &tunnel_id, tunnel_domain, ingress_port, paths)?;
                Ok(LaunchSpec::new(
                    tunnel_bin,
                    vec![
                        "tunnel".to_string(),
                        "--edge-ip-version".to_string(),
                        "auto".to_string(),
                        "--config".to_string(),
                        paths.tunnel_definition.display().to_string(),
                        "run".to_string(),
                    ],
                ))
            }
            None => {
                warn!("Structured credential has no TunnelID field, falling back to quick tunnel");
                Ok(quick_tunnel_spec(tunnel_bin, ingress_port, paths))
            }
        },

        CredentialForm::Absent | CredentialForm::Unrecognized => {
            Ok(quick_tunnel_spec(tunnel_bin, ingress_port, paths))
        }
    }
}

/// Quick-tunnel arguments: no credential, log redirected for discovery
fn quick_tunnel_spec(tunnel_bin: &Path, ingress_port: u16, paths: &WorkPaths) -> LaunchSpec {
    LaunchSpec::new(
        tunnel_bin,
        vec![
            "tunnel".to_string(),
            "--edge-ip-version".to_string(),
            "auto".to_string(),
            "--no-autoupdate".to_string(),
            "--protocol".to_string(),
            "http2".to_string(),
            "--logfile".to_string(),
            paths.tunnel_log.display().to_string(),
            "--loglevel".to_string(),
            "info".to_string(),
            "--url".to_string(),
            format!("http://localhost:{}", ingress_port),
        ],
    )
}

/// Extract the tunnel identifier from a structured credential by key
fn extract_tunnel_id(credential: &str) -> Option<String> {
    serde_json::from_str::<TunnelCredential>(credential)
        .ok()
        .map(|c| c.tunnel_id)
}

/// Write the credential file verbatim and the generated definition
fn write_side_files(
    credential: &str,
    tunnel_id: &str,
    tunnel_domain: &str,
    ingress_port: u16,
    paths: &WorkPaths,
) -> Result<()> {
    fs::write(&paths.tunnel_credential, credential)?;

    let definition = TunnelDefinition {
        tunnel: tunnel_id.to_string(),
        credentials_file: paths.tunnel_credential.clone(),
        protocol: "http2".to_string(),
        ingress: vec![
            IngressRule {
                hostname: Some(tunnel_domain.to_string()),
                service: format!("http://localhost:{}", ingress_port),
                origin_request: Some(OriginRequest {
                    no_tls_verify: true,
                }),
            },
            IngressRule {
                hostname: None,
                service: "http_status:404".to_string(),
                origin_request: None,
            },
        ],
    };

    fs::write(&paths.tunnel_definition, serde_yaml::to_string(&definition)?)?;
    Ok(())
}
