// Realm catalog - in-memory realm directory with periodic refresh
//
// Realms are loaded from the store with their three address columns
// resolved to IPv4 up front; a realm that fails to resolve is never
// inserted. Readers take an immutable snapshot; the refresh task builds a
// replacement table and swaps it in atomically.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use rand::Rng;
use tokio::sync::watch;

use logon_shared::{
    Expansion, REALM_TYPE_FFA_PVP, REALM_TYPE_MAX_CLIENT, REALM_TYPE_NORMAL, REALM_TYPE_PVP,
    RealmFlags,
};

use crate::store::{AccountStore, StorageError};

/// Seconds between catalog refreshes, jittered by up to a tenth.
pub const REALM_UPDATE_INTERVAL_SECS: u64 = 30;

/// One supported client build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildInfo {
    pub build: u32,
    pub major: u32,
    pub minor: u32,
    pub revision: u32,
}

/// Supported builds, loaded from the store at startup and immutable
/// afterwards.
#[derive(Debug, Clone, Default)]
pub struct BuildCatalog {
    builds: Vec<BuildInfo>,
}

impl BuildCatalog {
    pub fn new(builds: Vec<BuildInfo>) -> Self {
        BuildCatalog { builds }
    }

    pub fn find(&self, build: u32) -> Option<&BuildInfo> {
        self.builds.iter().find(|info| info.build == build)
    }

    pub fn len(&self) -> usize {
        self.builds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builds.is_empty()
    }
}

/// One game world entry with pre-resolved addresses.
#[derive(Debug, Clone, PartialEq)]
pub struct Realm {
    pub id: u32,
    pub name: String,
    pub address: Ipv4Addr,
    pub local_address: Ipv4Addr,
    pub local_subnet_mask: Ipv4Addr,
    pub port: u16,
    pub realm_type: u8,
    pub flags: u8,
    pub category: u8,
    pub population: f32,
    pub build: u32,
}

impl Realm {
    /// Endpoint to advertise to a client connecting from `client_addr`.
    ///
    /// Loopback clients are given the local address unless the realm only
    /// knows loopback addresses, in which case the client address is
    /// echoed back. Clients inside the realm's local subnet get the local
    /// address; everyone else gets the external one.
    pub fn address_for_client(&self, client_addr: IpAddr) -> SocketAddr {
        let ip: IpAddr = if client_addr.is_loopback() {
            if self.local_address.is_loopback() && self.address.is_loopback() {
                client_addr
            } else {
                IpAddr::V4(self.local_address)
            }
        } else if let IpAddr::V4(client_v4) = client_addr {
            if in_subnet(client_v4, self.local_address, self.local_subnet_mask) {
                IpAddr::V4(self.local_address)
            } else {
                IpAddr::V4(self.address)
            }
        } else {
            IpAddr::V4(self.address)
        };
        SocketAddr::new(ip, self.port)
    }
}

fn in_subnet(client: Ipv4Addr, local: Ipv4Addr, mask: Ipv4Addr) -> bool {
    let mask = u32::from(mask);
    u32::from(client) & mask == u32::from(local) & mask
}

/// How one realm appears in the list rendered for a given client build.
#[derive(Debug, Clone, PartialEq)]
pub struct RealmListing<'a> {
    pub realm: &'a Realm,
    pub flags: u8,
    pub display_name: String,
    /// Present when the entry advertises a different build than the
    /// client's; post-BC records append it as an override.
    pub build_override: Option<&'a BuildInfo>,
}

/// Decide visibility and flags of `realm` for a client on `client_build`.
///
/// A realm on the client's own build lists normally. A realm on another
/// supported build lists as offline with the build attached (spelled into
/// the name for pre-BC clients, which have no override field). A realm on
/// an unsupported build is omitted.
pub fn listing_for_build<'a>(
    realm: &'a Realm,
    client_build: u32,
    builds: &'a BuildCatalog,
    expansion: Expansion,
) -> Option<RealmListing<'a>> {
    if realm.build == client_build {
        return Some(RealmListing {
            realm,
            flags: realm.flags,
            display_name: realm.name.clone(),
            build_override: None,
        });
    }

    let info = builds.find(realm.build)?;
    let flags =
        realm.flags | RealmFlags::REALM_FLAG_OFFLINE | RealmFlags::REALM_FLAG_SPECIFYBUILD;
    let display_name = match expansion {
        Expansion::PreBc => format!(
            "{} ({}.{}.{})",
            realm.name, info.major, info.minor, info.revision
        ),
        Expansion::PostBc => realm.name.clone(),
    };

    Some(RealmListing {
        realm,
        flags,
        display_name,
        build_override: Some(info),
    })
}

/// The realm directory. One instance per process, owned by the bootstrap.
pub struct RealmCatalog {
    realms: RwLock<Arc<BTreeMap<u32, Realm>>>,
}

impl Default for RealmCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl RealmCatalog {
    pub fn new() -> Self {
        RealmCatalog {
            realms: RwLock::new(Arc::new(BTreeMap::new())),
        }
    }

    /// Current table. The snapshot stays consistent for the caller even
    /// while a refresh swaps in a newer one.
    pub fn snapshot(&self) -> Arc<BTreeMap<u32, Realm>> {
        self.realms.read().clone()
    }

    pub fn len(&self) -> usize {
        self.realms.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.realms.read().is_empty()
    }

    /// Re-read the realm table from the store and swap the snapshot.
    pub async fn update_realms<S: AccountStore + ?Sized>(
        &self,
        store: &S,
    ) -> Result<(), StorageError> {
        tracing::debug!("Updating realm list");

        let rows = store.list_realms().await?;
        let previous = self.snapshot();
        let mut next = BTreeMap::new();

        for row in rows {
            if row.id == 0 {
                tracing::error!("Realm '{}' has id 0, skipping", row.name);
                continue;
            }
            if row.flags == RealmFlags::REALM_FLAG_SKIP {
                continue;
            }

            let Some(address) = resolve_ipv4(&row.address).await else {
                tracing::error!(
                    "Failed to resolve address = {}, realm = {}, id = {}",
                    row.address,
                    row.name,
                    row.id
                );
                continue;
            };
            let Some(local_address) = resolve_ipv4(&row.local_address).await else {
                tracing::error!(
                    "Failed to resolve local address = {}, realm = {}, id = {}",
                    row.local_address,
                    row.name,
                    row.id
                );
                continue;
            };
            let Some(local_subnet_mask) = resolve_ipv4(&row.local_subnet_mask).await else {
                tracing::error!(
                    "Failed to resolve local subnet mask = {}, realm = {}, id = {}",
                    row.local_subnet_mask,
                    row.name,
                    row.id
                );
                continue;
            };

            let mut realm_type = row.realm_type;
            if realm_type == REALM_TYPE_FFA_PVP {
                realm_type = REALM_TYPE_PVP;
            }
            if realm_type >= REALM_TYPE_MAX_CLIENT {
                realm_type = REALM_TYPE_NORMAL;
            }

            if previous.contains_key(&row.id) {
                tracing::debug!(
                    "Updated realm id = {}, name = {}, type = {}, flags = {}, population = {}",
                    row.id,
                    row.name,
                    realm_type,
                    row.flags,
                    row.population
                );
            } else {
                tracing::info!(
                    "Added realm id = {}, name = {}, type = {}, flags = {}, population = {}",
                    row.id,
                    row.name,
                    realm_type,
                    row.flags,
                    row.population
                );
            }

            next.insert(
                row.id,
                Realm {
                    id: row.id,
                    name: row.name,
                    address,
                    local_address,
                    local_subnet_mask,
                    port: row.port,
                    realm_type,
                    flags: row.flags,
                    category: row.category,
                    population: row.population,
                    build: row.build,
                },
            );
        }

        for (id, realm) in previous.iter() {
            if !next.contains_key(id) {
                tracing::info!("Removed realm id = {}, name = {}", id, realm.name);
            }
        }

        *self.realms.write() = Arc::new(next);
        Ok(())
    }
}

/// Periodic refresh driver; runs until the shutdown signal flips.
pub async fn refresh_loop<S: AccountStore + ?Sized>(
    catalog: Arc<RealmCatalog>,
    store: Arc<S>,
    interval_secs: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let jitter = rand::thread_rng().gen_range(0..=interval_secs / 10);
        let period = if rand::random() {
            interval_secs + jitter
        } else {
            interval_secs - jitter
        };

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(period)) => {}
            _ = shutdown.changed() => return,
        }

        if let Err(e) = catalog.update_realms(store.as_ref()).await {
            tracing::error!("Realm list refresh failed: {}", e);
        }
    }
}

async fn resolve_ipv4(host: &str) -> Option<Ipv4Addr> {
    if let Ok(ip) = host.parse::<Ipv4Addr>() {
        return Some(ip);
    }
    match tokio::net::lookup_host((host, 0u16)).await {
        Ok(mut addrs) => addrs.find_map(|addr| match addr.ip() {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        }),
        Err(_) => None,
    }
}
