//! Best-effort unique identity of this node, used as the lock owner token.
//!
//! The identity has the form `{host}:{pid}@{hostname}`, where `host` names
//! a local address that can actually reach the outside world. The name is
//! this machine's hostname when that hostname resolves back to the address,
//! and the address literal otherwise. When no
//! such address can be found the sentinel `UnknownHost:{pid}@{hostname}` is
//! returned and marked invalid; clustered scheduling refuses to take locks
//! with it.

use std::fmt;
use std::net::{IpAddr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nix::ifaddrs::getifaddrs;
use nix::net::if_::InterfaceFlags;
use tokio::net::TcpSocket;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use crate::domain::models::IdentityConfig;

const UNKNOWN_HOST: &str = "UnknownHost";

/// Resolves a local address usable as this node's network identity.
#[async_trait]
pub trait AddressProbe: Send + Sync {
    async fn resolve_address(&self) -> Option<IpAddr>;

    /// Name for a resolved address. Defaults to the address literal.
    async fn host_name(&self, address: IpAddr) -> String {
        address.to_string()
    }
}

/// Probes every up, non-loopback interface address by opening a TCP
/// connection from it to a well-known host. The first address that
/// connects wins.
pub struct NetworkInterfaceProbe {
    validation_host: String,
    validation_port: u16,
    timeout: Duration,
}

impl NetworkInterfaceProbe {
    /// Probe against the configured validation host.
    pub fn new(config: &IdentityConfig) -> Self {
        Self {
            validation_host: config.validation_host.clone(),
            validation_port: config.validation_port,
            timeout: Duration::from_millis(config.probe_timeout_ms),
        }
    }

    fn candidate_addresses() -> Vec<IpAddr> {
        let interfaces = match getifaddrs() {
            Ok(interfaces) => interfaces,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to enumerate network interfaces");
                return Vec::new();
            }
        };

        interfaces
            .filter(|ifa| {
                ifa.flags.contains(InterfaceFlags::IFF_UP)
                    && !ifa.flags.contains(InterfaceFlags::IFF_LOOPBACK)
            })
            .filter_map(|ifa| {
                let address = ifa.address?;
                if let Some(v4) = address.as_sockaddr_in() {
                    return Some(IpAddr::V4(*SocketAddrV4::from(*v4).ip()));
                }
                address
                    .as_sockaddr_in6()
                    .map(|v6| IpAddr::V6(*SocketAddrV6::from(*v6).ip()))
            })
            .collect()
    }

    async fn validation_targets(&self) -> Vec<SocketAddr> {
        let lookup = tokio::net::lookup_host((self.validation_host.as_str(), self.validation_port));
        match tokio::time::timeout(self.timeout * 8, lookup).await {
            Ok(Ok(addrs)) => addrs.collect(),
            Ok(Err(e)) => {
                tracing::debug!(host = %self.validation_host, error = %e, "Validation host lookup failed");
                Vec::new()
            }
            Err(_) => {
                tracing::debug!(host = %self.validation_host, "Validation host lookup timed out");
                Vec::new()
            }
        }
    }

    async fn connects_from(&self, local: IpAddr, remote: SocketAddr) -> bool {
        let socket = match local {
            IpAddr::V4(_) => TcpSocket::new_v4(),
            IpAddr::V6(_) => TcpSocket::new_v6(),
        };
        let Ok(socket) = socket else {
            return false;
        };
        if socket.bind(SocketAddr::new(local, 0)).is_err() {
            return false;
        }
        matches!(
            tokio::time::timeout(self.timeout, socket.connect(remote)).await,
            Ok(Ok(_))
        )
    }
}

#[async_trait]
impl AddressProbe for NetworkInterfaceProbe {
    async fn resolve_address(&self) -> Option<IpAddr> {
        let candidates = Self::candidate_addresses();
        if candidates.is_empty() {
            return None;
        }
        let targets = self.validation_targets().await;

        for local in candidates {
            let Some(remote) = targets.iter().find(|t| t.is_ipv4() == local.is_ipv4()) else {
                continue;
            };
            if self.connects_from(local, *remote).await {
                return Some(local);
            }
        }
        None
    }

    async fn host_name(&self, address: IpAddr) -> String {
        name_for_address(&local_hostname(), address, self.timeout * 8).await
    }
}

/// `hostname` if it resolves to `address`, else the address literal.
async fn name_for_address(hostname: &str, address: IpAddr, timeout: Duration) -> String {
    let lookup = tokio::net::lookup_host((hostname, 0));
    match tokio::time::timeout(timeout, lookup).await {
        Ok(Ok(mut resolved)) => {
            if resolved.any(|a| a.ip() == address) {
                hostname.to_string()
            } else {
                address.to_string()
            }
        }
        Ok(Err(e)) => {
            tracing::debug!(hostname, error = %e, "Hostname lookup failed");
            address.to_string()
        }
        Err(_) => {
            tracing::debug!(hostname, "Hostname lookup timed out");
            address.to_string()
        }
    }
}

/// A computed identity token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    value: String,
    valid: bool,
}

impl Identity {
    /// The identity string.
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// False when the value is the `UnknownHost` sentinel.
    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

struct CachedIdentity {
    identity: Identity,
    computed_at: Instant,
}

/// Cached node identity with periodic re-resolution.
pub struct NodeIdentity {
    probe: Arc<dyn AddressProbe>,
    refresh_interval: Duration,
    cached: RwLock<Option<CachedIdentity>>,
    refresh_lock: Mutex<()>,
}

impl NodeIdentity {
    /// Identity resolved by `probe`, cached for `refresh_interval`.
    pub fn new(probe: Arc<dyn AddressProbe>, refresh_interval: Duration) -> Self {
        Self {
            probe,
            refresh_interval,
            cached: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Identity backed by [`NetworkInterfaceProbe`].
    pub fn from_config(config: &IdentityConfig) -> Self {
        Self::new(
            Arc::new(NetworkInterfaceProbe::new(config)),
            Duration::from_secs(config.refresh_interval_secs),
        )
    }

    fn fresh(&self, cached: Option<&CachedIdentity>) -> Option<Identity> {
        cached
            .filter(|c| c.identity.valid && c.computed_at.elapsed() < self.refresh_interval)
            .map(|c| c.identity.clone())
    }

    /// Current identity; recomputed when the cached one is invalid or older
    /// than the refresh interval.
    pub async fn get(&self) -> Identity {
        if let Some(identity) = self.fresh(self.cached.read().await.as_ref()) {
            return identity;
        }

        let _guard = self.refresh_lock.lock().await;
        if let Some(identity) = self.fresh(self.cached.read().await.as_ref()) {
            return identity;
        }

        let identity = self.compute().await;
        if identity.valid {
            tracing::debug!(identity = %identity, "Resolved node identity");
        } else {
            tracing::warn!(identity = %identity, "No routable local address, node identity unresolved");
        }

        *self.cached.write().await = Some(CachedIdentity {
            identity: identity.clone(),
            computed_at: Instant::now(),
        });
        identity
    }

    async fn compute(&self) -> Identity {
        let suffix = format!("{}@{}", nix::unistd::getpid(), local_hostname());
        match self.probe.resolve_address().await {
            Some(address) => Identity {
                value: format!("{}:{suffix}", self.probe.host_name(address).await),
                valid: true,
            },
            None => Identity {
                value: format!("{UNKNOWN_HOST}:{suffix}"),
                valid: false,
            },
        }
    }
}

fn local_hostname() -> String {
    nix::unistd::gethostname()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}
