//! mg-core: pipeline components for the Muxgate ingress provisioner
//!
//! This crate provides the provisioning pipeline behind the mg-node
//! daemon: routing-config synthesis for the proxy engine, tunnel
//! credential classification and launch planning, detached process
//! supervision, public hostname discovery, and subscription export.

pub mod config;
pub mod credential;
pub mod discovery;
pub mod error;
pub mod export;
pub mod geo;
pub mod ingress;
pub mod launch;
pub mod store;
pub mod supervise;

pub use credential::{classify, CredentialForm};
pub use discovery::DomainDiscovery;
pub use error::{NodeError, Result};
pub use export::SubscriptionExporter;
pub use ingress::IngressPlan;
pub use store::SubscriptionStore;
