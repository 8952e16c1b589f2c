//! Public hostname discovery for the outbound tunnel
//!
//! When the operator configured both a fixed hostname and a
//! credential, the hostname is known up front. Otherwise the tunnel
//! provider assigns an ephemeral one, announced only in the tunnel
//! client's log output, so the log is polled until the hostname
//! appears or the retry budget runs out. Exhaustion is a normal
//! terminal outcome, not an error.

use regex::Regex;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};

/// Maximum read-and-match attempts against the tunnel log
pub const MAX_ATTEMPTS: u32 = 20;

/// Delay before each attempt
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// URL pattern of provider-issued quick-tunnel hostnames
const QUICK_TUNNEL_URL: &str = r"https?://([^ ]*trycloudflare\.com)";

/// Resolves the tunnel's public hostname
#[derive(Debug, Clone)]
pub struct DomainDiscovery {
    log_path: PathBuf,
    attempts: u32,
    interval: Duration,
}

impl DomainDiscovery {
    /// Discovery against the given tunnel log with the default budget
    pub fn new(log_path: PathBuf) -> Self {
        Self {
            log_path,
            attempts: MAX_ATTEMPTS,
            interval: POLL_INTERVAL,
        }
    }

    /// Override the retry budget
    pub fn with_budget(mut self, attempts: u32, interval: Duration) -> Self {
        self.attempts = attempts;
        self.interval = interval;
        self
    }

    /// Resolve the public hostname.
    ///
    /// The fixed hostname wins immediately, with no I/O, when both it
    /// and a credential are configured. Otherwise the log is polled;
    /// `None` means the budget was exhausted and no export should
    /// happen.
    pub async fn resolve(&self, tunnel_domain: &str, credential: &str) -> Option<String> {
        if !tunnel_domain.is_empty() && !credential.is_empty() {
            debug!("Using fixed tunnel hostname: {}", tunnel_domain);
            return Some(tunnel_domain.to_string());
        }
        self.poll_log().await
    }

    /// Bounded sequential scan of the tunnel log.
    ///
    /// Each cycle sleeps, then reads the full current log content; a
    /// log file that does not exist yet is a miss, not an error.
    async fn poll_log(&self) -> Option<String> {
        let pattern = Regex::new(QUICK_TUNNEL_URL).expect("quick-tunnel pattern is valid");

        for attempt in 1..=self.attempts {
            sleep(self.interval).await;

            let content = match std::fs::read_to_string(&self.log_path) {
                Ok(content) => content,
                Err(_) => {
                    debug!("Tunnel log not readable yet (attempt {}/{})", attempt, self.attempts);
                    continue;
                }
            };

            if let Some(captures) = pattern.captures(&content) {
                let domain = captures[1].to_string();
                info!("Tunnel hostname discovered on attempt {}: {}", attempt, domain);
                return Some(domain);
            }

            debug!("No tunnel hostname yet (attempt {}/{})", attempt, self.attempts);
        }

        info!(
            "No tunnel hostname after {} attempts, skipping export",
            self.attempts
        );
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_fixed_hostname_short_circuits() {
        let discovery = DomainDiscovery::new(PathBuf::from("/nonexistent/tunnel.log"));
        let start = Instant::now();

        let domain = discovery
            .resolve("tunnel.example.com", &"A".repeat(150))
            .await;

        assert_eq!(domain.as_deref(), Some("tunnel.example.com"));
        // No polling happened: no virtual time elapsed
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_hostname_requires_credential() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("tunnel.log");
        std::fs::write(&log, "https://abc123.trycloudflare.com/ registered").unwrap();

        // Domain configured but no credential: the quick tunnel is
        // authoritative, so the log wins
        let discovery = DomainDiscovery::new(log);
        let domain = discovery.resolve("tunnel.example.com", "").await;
        assert_eq!(domain.as_deref(), Some("abc123.trycloudflare.com"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_discovers_hostname_from_log() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("tunnel.log");
        std::fs::write(
            &log,
            "INF +--------------------+\nINF |  https://quiet-sun-4242.trycloudflare.com/  |\n",
        )
        .unwrap();

        let discovery = DomainDiscovery::new(log);
        let domain = discovery.resolve("", "").await;
        assert_eq!(domain.as_deref(), Some("quiet-sun-4242.trycloudflare.com"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_log_found_on_second_attempt() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("tunnel.log");

        // The tunnel client writes its log three seconds after launch
        let writer_log = log.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(3)).await;
            std::fs::write(&writer_log, "https://abc123.trycloudflare.com/").unwrap();
        });

        let start = Instant::now();
        let discovery = DomainDiscovery::new(log);
        let domain = discovery.resolve("", "").await;

        assert_eq!(domain.as_deref(), Some("abc123.trycloudflare.com"));
        // Miss at 2s, hit on the second attempt at 4s
        assert_eq!(start.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_none() {
        let discovery = DomainDiscovery::new(PathBuf::from("/nonexistent/tunnel.log"));
        let start = Instant::now();

        let domain = discovery.resolve("", "").await;

        assert!(domain.is_none());
        // Full budget spent: 20 attempts x 2s
        assert_eq!(start.elapsed(), Duration::from_secs(40));
    }

    #[tokio::test(start_paused = true)]
    async fn test_log_without_match_exhausts_budget() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("tunnel.log");
        std::fs::write(&log, "ERR failed to request quick tunnel\n").unwrap();

        let discovery = DomainDiscovery::new(log).with_budget(3, Duration::from_secs(2));
        let domain = discovery.resolve("", "").await;
        assert!(domain.is_none());
    }
}
