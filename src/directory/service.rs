//! The directory service.
//!
//! Every operation resolves the owner of its grain against the current ring
//! snapshot. The owner applies it to its partition; everyone else forwards
//! it with an incremented hop count. A silo that receives an already
//! forwarded request and still is not the owner waits `retry_delay` and
//! resolves once more before forwarding again, so a request either lands on
//! an owner or fails with [`Error::HopLimitExceeded`].

use crate::cluster::{MembershipOracle, SubscriptionId};
use crate::config::DirectoryConfig;
use crate::directory::cache::{create_directory_cache, CachedAddress, DirectoryCache};
use crate::directory::collaborators::{Catalog, HandoffManager, NoopCatalog, NoopHandoffManager};
use crate::directory::partition::{LocalDirectoryPartition, PartitionStore};
use crate::error::{Error, Result};
use crate::metrics::{DirectoryMetrics, DirectoryStats};
use crate::network::RemoteDirectoryChannel;
use crate::partitioning::{ring_distance, OwnershipResolver, RingMembership, RING_SIZE};
use crate::types::{
    ActivationId, AddressAndTag, GrainAddress, GrainId, SiloAddress, UnregistrationCause,
};
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Directory operations, served locally or by a remote owner.
///
/// `hop_count` is zero for calls made by the local runtime and grows by one
/// on every forward.
#[async_trait::async_trait]
pub trait GrainDirectory: Send + Sync + 'static {
    /// Register an activation. Returns the authoritative registration, which
    /// is a different activation when another one won the race.
    async fn register(
        &self,
        address: GrainAddress,
        previous: Option<GrainAddress>,
        hop_count: u32,
    ) -> Result<AddressAndTag>;

    /// Remove an activation if it is still the registered one.
    async fn unregister(
        &self,
        address: GrainAddress,
        cause: UnregistrationCause,
        hop_count: u32,
    ) -> Result<()>;

    /// Remove a batch of activations, grouped by owner.
    async fn unregister_many(
        &self,
        addresses: Vec<GrainAddress>,
        cause: UnregistrationCause,
        hop_count: u32,
    ) -> Result<()>;

    /// Find the registered activation. A miss is not an error.
    async fn lookup(&self, grain: GrainId, hop_count: u32) -> Result<AddressAndTag>;

    /// Remove whatever is registered for a grain.
    async fn delete(&self, grain: GrainId, hop_count: u32) -> Result<()>;
}

struct EventLoop {
    subscription: SubscriptionId,
    shutdown: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// One silo's share of the distributed grain directory.
pub struct DirectoryService {
    pub(super) local: SiloAddress,
    pub(super) config: DirectoryConfig,
    pub(super) resolver: OwnershipResolver,
    pub(super) partition: Arc<dyn PartitionStore>,
    pub(super) cache: Arc<dyn DirectoryCache>,
    pub(super) oracle: Arc<dyn MembershipOracle>,
    pub(super) channel: Arc<dyn RemoteDirectoryChannel>,
    pub(super) handoff: Arc<dyn HandoffManager>,
    pub(super) catalog: Arc<dyn Catalog>,
    pub(super) metrics: DirectoryMetrics,

    /// Serializes ring mutation and the partition/cache adjustment after it.
    pub(super) membership_lock: Mutex<()>,

    event_loop: Mutex<Option<EventLoop>>,
}

impl DirectoryService {
    /// Start building a service for `local`.
    pub fn builder(local: SiloAddress, config: DirectoryConfig) -> DirectoryServiceBuilder {
        DirectoryServiceBuilder::new(local, config)
    }

    /// The local silo.
    pub fn local(&self) -> &SiloAddress {
        &self.local
    }

    /// Active configuration.
    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    /// Whether the service accepts ownership.
    pub fn is_running(&self) -> bool {
        self.resolver.is_running()
    }

    /// Begin serving and follow membership changes.
    ///
    /// The ring starts out with every silo the oracle already reports as
    /// functional.
    ///
    /// Must be called from within a Tokio runtime. Calling it twice is a
    /// no-op.
    pub fn start(self: &Arc<Self>) {
        let mut event_loop = self.event_loop.lock();
        if event_loop.is_some() {
            return;
        }

        self.resolver.set_running(true);

        let (subscription, mut events) = self.oracle.subscribe();

        // Members that joined before we subscribed never produce an event.
        // Seed them before the loop runs so queued changes apply on top.
        let mut seeded = 0;
        for silo in self.oracle.functional_silos() {
            if silo != self.local && self.add_silo(&silo) {
                seeded += 1;
            }
        }

        let (shutdown, mut shutdown_rx) = mpsc::channel::<()>(1);
        let directory = Arc::downgrade(self);

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = events.recv() => {
                        let Some(event) = event else { break };
                        let Some(directory) = directory.upgrade() else { break };
                        directory.handle_status_change(&event);
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });

        *event_loop = Some(EventLoop {
            subscription,
            shutdown,
            handle,
        });

        info!(local = %self.local, seeded, "Grain directory started");
    }

    /// Stop owning directory entries.
    ///
    /// The local silo leaves ownership calculation immediately, so writes
    /// arriving from now on are forwarded to the next owner. Local state is
    /// dropped; the handoff collaborator is responsible for having moved it.
    pub async fn stop(&self) {
        self.resolver.set_running(false);
        self.partition.clear();
        self.cache.clear();

        let event_loop = self.event_loop.lock().take();
        if let Some(event_loop) = event_loop {
            self.oracle.unsubscribe(event_loop.subscription);
            let _ = event_loop.shutdown.send(()).await;
            if let Err(e) = event_loop.handle.await {
                warn!(local = %self.local, error = %e, "Membership event loop ended abnormally");
            }
        }

        info!(local = %self.local, "Grain directory stopped");
    }

    /// Whether `silo` may be trusted as the location of an activation.
    pub fn is_functional(&self, silo: &SiloAddress) -> bool {
        *silo == self.local || self.oracle.is_functional(silo)
    }

    /// Resolve where an operation runs: `None` for here, the owner otherwise.
    async fn resolve_target(
        &self,
        grain: &GrainId,
        hop_count: u32,
        operation: &'static str,
    ) -> Result<Option<SiloAddress>> {
        let target = self.resolver.check_forward(grain, hop_count, operation)?;
        if hop_count == 0 || target.is_none() {
            return Ok(target);
        }

        // Already forwarded once and still not ours; let membership settle.
        tokio::time::sleep(self.config.retry_delay).await;
        let target = self.resolver.check_forward(grain, hop_count, operation)?;
        if let Some(owner) = &target {
            warn!(
                local = %self.local,
                grain = %grain,
                owner = %owner,
                hop_count,
                operation,
                "Not the owner, forwarding again"
            );
        }
        Ok(target)
    }

    fn remote(&self, owner: &SiloAddress) -> Result<Arc<dyn GrainDirectory>> {
        self.channel.directory(owner)
    }

    /// Split `addresses` into those owned here and per-owner batches.
    fn split_by_owner(
        &self,
        addresses: Vec<GrainAddress>,
        hop_count: u32,
    ) -> Result<(Vec<GrainAddress>, HashMap<SiloAddress, Vec<GrainAddress>>)> {
        let mut local = Vec::new();
        let mut forward: HashMap<SiloAddress, Vec<GrainAddress>> = HashMap::new();
        for address in addresses {
            match self
                .resolver
                .check_forward(&address.grain_id, hop_count, "unregister_many")?
            {
                Some(owner) => forward.entry(owner).or_default().push(address),
                None => local.push(address),
            }
        }
        Ok((local, forward))
    }

    fn unregister_locally(&self, addresses: &[GrainAddress], cause: UnregistrationCause) {
        for address in addresses {
            self.metrics.unregistrations_many.local.inc();
            if self
                .partition
                .remove_activation(&address.grain_id, address.activation_id, cause)
            {
                self.cache.remove_address(address);
            }
        }
    }

    /// Answer from the cache or the local partition without any network call.
    ///
    /// A cache hit is reported with version tag `0` and only when its silo is
    /// still functional. Returns `None` when the answer needs the owner.
    pub fn local_lookup(&self, grain: &GrainId) -> Result<Option<AddressAndTag>> {
        let Some(owner) = self.resolver.owner_of(grain)? else {
            return Ok(None);
        };

        if let Some(address) = self.local_cache_data(grain) {
            trace!(local = %self.local, grain = %grain, address = %address, "Local lookup hit cache");
            return Ok(Some(AddressAndTag::new(address, AddressAndTag::CACHED)));
        }

        if owner != self.local {
            return Ok(None);
        }

        self.metrics.lookups.local.inc();
        let result = self.partition.lookup(grain);
        if !result.is_found() {
            return Ok(None);
        }
        self.metrics.lookups_local_successes.inc();
        Ok(Some(result))
    }

    /// Cached location of `grain`, if the cache has one on a functional silo.
    pub fn try_cached_lookup(&self, grain: &GrainId) -> Option<GrainAddress> {
        self.local_cache_data(grain)
    }

    /// Cached entry for `grain` whose silo is still functional.
    pub fn local_cache_data(&self, grain: &GrainId) -> Option<GrainAddress> {
        let cached = self
            .cache
            .lookup(grain)
            .filter(|entry| self.is_functional(&entry.address.silo))
            .map(|entry| entry.address);
        self.metrics.record_cache_lookup(cached.is_some());
        cached
    }

    /// Every cache entry, valid or not.
    pub fn cached_entries(&self) -> Vec<CachedAddress> {
        self.cache.entries()
    }

    /// What the local partition holds for `grain`.
    pub fn local_directory_data(&self, grain: &GrainId) -> AddressAndTag {
        self.partition.lookup(grain)
    }

    /// Remember that `grain` lives on `silo`.
    pub fn add_or_update_cache_entry(&self, grain: GrainId, silo: SiloAddress) {
        self.cache.add_or_update(
            GrainAddress::new(grain, ActivationId::nil(), silo),
            AddressAndTag::CACHED,
        );
    }

    /// Forget the cached location of `grain`.
    pub fn invalidate_cache_entry(&self, grain: &GrainId) -> bool {
        self.cache.remove(grain)
    }

    /// Forget the cached location of `address.grain_id` if it is `address`.
    pub fn invalidate_cache_address(&self, address: &GrainAddress) -> bool {
        self.cache.remove_address(address)
    }

    /// Drop a registration whose activation turned out not to exist.
    ///
    /// The registration is removed here unless `origin` is a silo outside the
    /// ring, in which case the request goes back to it.
    pub async fn unregister_after_nonexisting_activation(
        &self,
        address: GrainAddress,
        origin: Option<SiloAddress>,
    ) -> Result<()> {
        trace!(local = %self.local, address = %address, origin = ?origin, "Unregistering nonexistent activation");

        match origin {
            Some(origin) if !self.resolver.is_member(&origin) => {
                self.remote(&origin)?
                    .unregister(address, UnregistrationCause::NonexistentActivation, 0)
                    .await
            }
            _ => {
                self.unregister(address, UnregistrationCause::NonexistentActivation, 0)
                    .await
            }
        }
    }

    /// Silo owning the directory entry for `grain`.
    pub fn primary_for_grain(&self, grain: &GrainId) -> Result<Option<SiloAddress>> {
        self.resolver.owner_of(grain)
    }

    /// Whether `silo` is in this silo's directory ring.
    pub fn is_silo_in_cluster(&self, silo: &SiloAddress) -> bool {
        self.resolver.is_member(silo)
    }

    /// Current ring snapshot.
    pub fn membership_snapshot(&self) -> Arc<RingMembership> {
        self.resolver.snapshot()
    }

    /// Ring neighbor before `silo`.
    pub fn predecessor(&self, silo: &SiloAddress) -> Option<SiloAddress> {
        self.resolver.predecessor(silo)
    }

    /// Ring neighbor after `silo`.
    pub fn successor(&self, silo: &SiloAddress) -> Option<SiloAddress> {
        self.resolver.successor(silo)
    }

    /// Sizes, ring share and operation counters.
    pub fn stats(&self) -> DirectoryStats {
        let ring = self.resolver.snapshot();
        let ring_distance_to_successor = ring
            .successor(&self.local)
            .map(|next| ring_distance(&self.local, next))
            .unwrap_or(0);
        let ring_percentage = self.resolver.owned_range_size() as f64 / RING_SIZE as f64 * 100.0;
        let average_ring_percentage = if ring.is_empty() {
            0.0
        } else {
            100.0 / ring.len() as f64
        };

        DirectoryStats {
            partition_size: self.partition.len(),
            cache_size: self.cache.len(),
            ring_size: ring.len(),
            ring_distance_to_successor,
            ring_percentage,
            average_ring_percentage,
            metrics: self.metrics.snapshot(),
        }
    }

    /// Operation counters.
    pub fn metrics(&self) -> &DirectoryMetrics {
        &self.metrics
    }
}

#[async_trait::async_trait]
impl GrainDirectory for DirectoryService {
    async fn register(
        &self,
        address: GrainAddress,
        previous: Option<GrainAddress>,
        hop_count: u32,
    ) -> Result<AddressAndTag> {
        self.metrics.registrations.record_issued(hop_count);

        let Some(owner) = self
            .resolve_target(&address.grain_id, hop_count, "register")
            .await?
        else {
            self.metrics.registrations.local.inc();
            let result = self.partition.add_single_activation(address, previous.as_ref());
            if let Some(registered) = &result.address {
                self.cache.add_or_update(registered.clone(), result.version_tag);
            }
            return Ok(result);
        };

        self.metrics.registrations.remote_sent.inc();
        let result = self
            .remote(&owner)?
            .register(address.clone(), previous, hop_count + 1)
            .await?;

        // Only cache our own activation; a duplicate winner is left to lookups.
        if result.address.as_ref() == Some(&address) && self.is_functional(&address.silo) {
            self.cache.add_or_update(address, result.version_tag);
        }
        Ok(result)
    }

    async fn unregister(
        &self,
        address: GrainAddress,
        cause: UnregistrationCause,
        hop_count: u32,
    ) -> Result<()> {
        self.metrics.unregistrations.record_issued(hop_count);

        if hop_count == 0 {
            self.cache.remove(&address.grain_id);
        }

        match self
            .resolve_target(&address.grain_id, hop_count, "unregister")
            .await?
        {
            None => {
                self.metrics.unregistrations.local.inc();
                if self
                    .partition
                    .remove_activation(&address.grain_id, address.activation_id, cause)
                {
                    self.cache.remove_address(&address);
                }
                Ok(())
            }
            Some(owner) => {
                self.metrics.unregistrations.remote_sent.inc();
                self.remote(&owner)?
                    .unregister(address, cause, hop_count + 1)
                    .await
            }
        }
    }

    async fn unregister_many(
        &self,
        addresses: Vec<GrainAddress>,
        cause: UnregistrationCause,
        hop_count: u32,
    ) -> Result<()> {
        self.metrics.unregistrations_many.record_issued(hop_count);

        let (local, mut forward) = self.split_by_owner(addresses, hop_count)?;
        self.unregister_locally(&local, cause);

        if hop_count > 0 && !forward.is_empty() {
            tokio::time::sleep(self.config.retry_delay).await;
            let pending = forward.into_values().flatten().collect();
            let (local, again) = self.split_by_owner(pending, hop_count)?;
            self.unregister_locally(&local, cause);
            if !again.is_empty() {
                warn!(
                    local = %self.local,
                    destinations = again.len(),
                    hop_count,
                    "Not the owner of some unregistrations, forwarding again"
                );
            }
            forward = again;
        }

        let calls = forward
            .into_iter()
            .map(|(owner, batch)| {
                self.metrics.unregistrations_many.remote_sent.inc();
                let remote = self.remote(&owner);
                async move { remote?.unregister_many(batch, cause, hop_count + 1).await }
            })
            .collect::<Vec<_>>();

        // Every destination gets its batch even when another one fails.
        join_all(calls).await.into_iter().collect()
    }

    async fn lookup(&self, grain: GrainId, hop_count: u32) -> Result<AddressAndTag> {
        self.metrics.lookups.record_issued(hop_count);

        let Some(owner) = self.resolve_target(&grain, hop_count, "lookup").await? else {
            self.metrics.lookups.local.inc();
            let result = self.partition.lookup(&grain);
            if result.is_found() {
                self.metrics.lookups_local_successes.inc();
            } else {
                // Membership may have just moved the entry here.
                trace!(local = %self.local, grain = %grain, "Local lookup found nothing");
            }
            return Ok(result);
        };

        if !self.is_functional(&owner) {
            return Err(Error::UnstableTarget {
                grain,
                local: self.local.clone(),
                owner,
            });
        }

        self.metrics.lookups.remote_sent.inc();
        let result = self.remote(&owner)?.lookup(grain.clone(), hop_count + 1).await?;

        if let Some(address) = &result.address {
            if self.is_functional(&address.silo) {
                self.cache.add_or_update(address.clone(), result.version_tag);
            }
        }
        trace!(local = %self.local, grain = %grain, owner = %owner, found = result.is_found(), "Remote lookup");
        Ok(result)
    }

    async fn delete(&self, grain: GrainId, hop_count: u32) -> Result<()> {
        self.metrics.deletes.record_issued(hop_count);

        match self.resolve_target(&grain, hop_count, "delete").await? {
            None => {
                self.metrics.deletes.local.inc();
                self.partition.remove_grain(&grain);
                self.cache.remove(&grain);
                Ok(())
            }
            Some(owner) => {
                self.metrics.deletes.remote_sent.inc();
                self.cache.remove(&grain);
                self.remote(&owner)?.delete(grain, hop_count + 1).await
            }
        }
    }
}

/// Builder for [`DirectoryService`].
///
/// The membership oracle and the remote channel are required. Partition,
/// cache, handoff and catalog default to the in-memory implementations.
pub struct DirectoryServiceBuilder {
    local: SiloAddress,
    config: DirectoryConfig,
    partition: Option<Arc<dyn PartitionStore>>,
    cache: Option<Arc<dyn DirectoryCache>>,
    oracle: Option<Arc<dyn MembershipOracle>>,
    channel: Option<Arc<dyn RemoteDirectoryChannel>>,
    handoff: Option<Arc<dyn HandoffManager>>,
    catalog: Option<Arc<dyn Catalog>>,
}

impl DirectoryServiceBuilder {
    fn new(local: SiloAddress, config: DirectoryConfig) -> Self {
        Self {
            local,
            config,
            partition: None,
            cache: None,
            oracle: None,
            channel: None,
            handoff: None,
            catalog: None,
        }
    }

    /// Use a custom partition store.
    pub fn with_partition(mut self, partition: Arc<dyn PartitionStore>) -> Self {
        self.partition = Some(partition);
        self
    }

    /// Use a custom cache instead of the configured one.
    pub fn with_cache(mut self, cache: Arc<dyn DirectoryCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Set the membership oracle.
    pub fn with_oracle(mut self, oracle: Arc<dyn MembershipOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Set the channel used to reach remote owners.
    pub fn with_channel(mut self, channel: Arc<dyn RemoteDirectoryChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Set the handoff manager.
    pub fn with_handoff(mut self, handoff: Arc<dyn HandoffManager>) -> Self {
        self.handoff = Some(handoff);
        self
    }

    /// Set the catalog.
    pub fn with_catalog(mut self, catalog: Arc<dyn Catalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Build the service. The ring starts out holding only the local silo.
    pub fn build(self) -> Result<Arc<DirectoryService>> {
        self.config.validate()?;

        let oracle = self
            .oracle
            .ok_or_else(|| Error::Config("directory requires a membership oracle".into()))?;
        let channel = self
            .channel
            .ok_or_else(|| Error::Config("directory requires a remote channel".into()))?;

        let partition = self.partition.unwrap_or_else(|| {
            Arc::new(
                LocalDirectoryPartition::new(self.config.lazy_deregistration_delay)
                    .with_oracle(oracle.clone()),
            )
        });
        let cache = self
            .cache
            .unwrap_or_else(|| create_directory_cache(&self.config.cache));

        let resolver = OwnershipResolver::new(
            self.local.clone(),
            self.config.seed.clone(),
            self.config.hop_limit,
        );
        resolver.publish(RingMembership::from_silos([self.local.clone()]));

        debug!(
            local = %self.local,
            hop_limit = self.config.hop_limit,
            retry_delay = ?self.config.retry_delay,
            "Grain directory created"
        );

        Ok(Arc::new(DirectoryService {
            local: self.local,
            config: self.config,
            resolver,
            partition,
            cache,
            oracle,
            channel,
            handoff: self.handoff.unwrap_or_else(|| Arc::new(NoopHandoffManager)),
            catalog: self.catalog.unwrap_or_else(|| Arc::new(NoopCatalog)),
            metrics: DirectoryMetrics::new(),
            membership_lock: Mutex::new(()),
            event_loop: Mutex::new(None),
        }))
    }
}
