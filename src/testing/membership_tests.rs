//! Directory behavior under membership churn and lifecycle changes.

#[cfg(test)]
mod tests {
    use crate::cluster::{MembershipOracle, SiloStatus, StaticMembershipOracle};
    use crate::config::{DirectoryCacheConfig, DirectoryConfig};
    use crate::directory::{DirectoryService, GrainDirectory};
    use crate::error::Error;
    use crate::network::InProcessChannel;
    use crate::testing::{activation, grain_at, silo_at, wait_for, TestCluster};
    use crate::types::{AddressAndTag, UnregistrationCause};
    use std::sync::Arc;
    use std::time::Duration;

    fn fast_config() -> DirectoryConfig {
        DirectoryConfig::default().with_retry_delay(Duration::from_millis(1))
    }

    /// Test Case 1: Oracle events reach the ring through the event loop
    #[tokio::test]
    async fn test_event_loop_follows_oracle() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("info")
            .try_init();

        let cluster = TestCluster::start(&[10, 50], fast_config());
        let a = cluster.silo(0).clone();
        let newcomer = silo_at(12000, 70);

        cluster.oracle.set_status(newcomer.clone(), SiloStatus::Joining);
        cluster.oracle.set_status(newcomer.clone(), SiloStatus::Active);
        let joined = wait_for(
            || a.is_silo_in_cluster(&newcomer),
            Duration::from_secs(2),
            Duration::from_millis(5),
        )
        .await;
        assert!(joined);

        cluster.oracle.set_status(newcomer.clone(), SiloStatus::Dead);
        let left = wait_for(
            || !a.is_silo_in_cluster(&newcomer),
            Duration::from_secs(2),
            Duration::from_millis(5),
        )
        .await;
        assert!(left);
        assert_eq!(a.stats().metrics.silos_removed, 1);

        cluster.shutdown().await;
    }

    /// Test Case 1b: Silos started on a shared oracle agree on ownership
    ///
    /// Members that were active before a silo subscribed produce no event,
    /// so the ring must be seeded from the oracle at start.
    #[tokio::test]
    async fn test_start_seeds_ring_from_oracle() {
        let a_address = silo_at(12100, 10);
        let b_address = silo_at(12101, 50);
        let oracle = StaticMembershipOracle::with_active([a_address.clone(), b_address.clone()]);
        let channel = Arc::new(InProcessChannel::new());

        let services: Vec<Arc<DirectoryService>> = [a_address.clone(), b_address.clone()]
            .into_iter()
            .map(|address| {
                let service = DirectoryService::builder(address.clone(), fast_config())
                    .with_oracle(oracle.clone())
                    .with_channel(channel.clone())
                    .build()
                    .unwrap();
                channel.register(address, &service);
                service.start();
                service
            })
            .collect();

        let grain = grain_at(40);
        for service in &services {
            assert_eq!(service.membership_snapshot().len(), 2);
            assert_eq!(service.primary_for_grain(&grain).unwrap(), Some(b_address.clone()));
        }

        // A registration from a lands on b, and b answers a lookup locally.
        let address = activation(grain.clone(), &a_address);
        services[0].register(address.clone(), None, 0).await.unwrap();
        assert_eq!(services[1].local_directory_data(&grain).address, Some(address));
        assert!(!services[0].local_directory_data(&grain).is_found());

        for service in &services {
            service.stop().await;
        }
    }

    /// Test Case 2: No cached entry survives the removal of its silo
    #[tokio::test]
    async fn test_cache_never_outlives_membership() {
        let cluster = TestCluster::start(&[10, 50, 90], fast_config());
        let a = cluster.silo(0);
        let b = cluster.silo(1);

        // Activations on b, spread over every owner.
        let grains: Vec<_> = (0..40).map(|i| grain_at(i * 3)).collect();
        for grain in &grains {
            b.register(activation(grain.clone(), b.local()), None, 0)
                .await
                .unwrap();
            a.lookup(grain.clone(), 0).await.unwrap();
        }
        assert!(a
            .cached_entries()
            .iter()
            .any(|entry| entry.address.silo == cluster.address(1)));

        cluster.kill(1);

        assert!(a
            .cached_entries()
            .iter()
            .all(|entry| entry.address.silo != cluster.address(1)));
        for grain in &grains {
            if let Some(found) = a.local_lookup(grain).unwrap() {
                assert_ne!(found.address.unwrap().silo, cluster.address(1));
            }
        }

        cluster.shutdown().await;
    }

    /// Test Case 3: Concurrent registrations agree on one winner
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_register_race_has_one_winner() {
        let cluster = TestCluster::start(&[10, 50, 90], fast_config());
        let grain = grain_at(60);

        let mut handles = Vec::new();
        for i in 0..2 {
            let silo = cluster.silo(i).clone();
            let address = activation(grain.clone(), silo.local());
            handles.push(tokio::spawn(async move {
                silo.register(address, None, 0).await
            }));
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(results[0], results[1]);
        assert_eq!(cluster.silo(2).stats().partition_size, 1);
        assert_eq!(cluster.silo(2).local_directory_data(&grain), results[0]);

        // Only the winner's silo caches it.
        let winner = results[0].address.clone().unwrap();
        for i in 0..2 {
            let cached = cluster.silo(i).try_cached_lookup(&grain);
            if cluster.address(i) == winner.silo {
                assert_eq!(cached, Some(winner.clone()));
            } else {
                assert_eq!(cached, None);
            }
        }

        cluster.shutdown().await;
    }

    /// Test Case 4: A stopped silo drops its state and hands ownership on
    #[tokio::test]
    async fn test_stop_drains_ownership() {
        let cluster = TestCluster::start(&[10, 50], fast_config());
        let a = cluster.silo(0);
        let b = cluster.silo(1);
        let grain = grain_at(40);

        b.register(activation(grain.clone(), b.local()), None, 0)
            .await
            .unwrap();
        let subscribers = cluster.oracle.subscriber_count();

        b.stop().await;

        assert!(!b.is_running());
        assert_eq!(b.stats().partition_size, 0);
        assert_eq!(b.stats().cache_size, 0);
        assert_eq!(cluster.oracle.subscriber_count(), subscribers - 1);

        // b now sends its old range on to the next silo, a keeps it on b.
        assert_eq!(b.primary_for_grain(&grain).unwrap(), Some(cluster.address(0)));
        assert_eq!(a.primary_for_grain(&grain).unwrap(), Some(cluster.address(1)));

        cluster.shutdown().await;
    }

    /// Test Case 5: Sole draining silo still serves as the last resort
    #[tokio::test]
    async fn test_draining_sole_silo_acts_locally() {
        let cluster = TestCluster::start(&[10], fast_config());
        let a = cluster.silo(0);
        a.stop().await;

        let grain = grain_at(5);
        assert_eq!(a.primary_for_grain(&grain).unwrap(), None);

        let address = activation(grain.clone(), a.local());
        let result = a.register(address.clone(), None, 0).await.unwrap();
        assert_eq!(result.address, Some(address));
        assert_eq!(a.local_lookup(&grain).unwrap(), None);
    }

    /// Test Case 6: Nonexistent activations are removed lazily
    #[tokio::test]
    async fn test_unregister_after_nonexisting_activation() {
        let config = fast_config().with_lazy_deregistration_delay(Duration::from_millis(20));
        let cluster = TestCluster::start(&[10], config);
        let a = cluster.silo(0);
        let address = activation(grain_at(5), a.local());
        a.register(address.clone(), None, 0).await.unwrap();

        // Too young to be trusted as gone.
        a.unregister_after_nonexisting_activation(address.clone(), None)
            .await
            .unwrap();
        assert!(a.local_directory_data(&address.grain_id).is_found());

        tokio::time::sleep(Duration::from_millis(40)).await;
        a.unregister_after_nonexisting_activation(address.clone(), Some(cluster.address(0)))
            .await
            .unwrap();
        assert!(!a.local_directory_data(&address.grain_id).is_found());

        cluster.shutdown().await;
    }

    /// Test Case 7: Origin outside the ring gets the unregistration back
    #[tokio::test]
    async fn test_unregister_after_nonexisting_activation_foreign_origin() {
        let cluster = TestCluster::start(&[10], fast_config());
        let a = cluster.silo(0);
        let foreign = silo_at(13000, 500);

        let err = a
            .unregister_after_nonexisting_activation(
                activation(grain_at(5), a.local()),
                Some(foreign.clone()),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err,
            Error::Network(crate::error::NetworkError::Unreachable(foreign))
        );

        cluster.shutdown().await;
    }

    /// Test Case 8: Cache helpers validate against membership
    #[tokio::test]
    async fn test_cache_helpers() {
        let cluster = TestCluster::start(&[10, 50], fast_config());
        let a = cluster.silo(0);
        let grain = grain_at(40);

        a.add_or_update_cache_entry(grain.clone(), cluster.address(1));
        let cached = a.try_cached_lookup(&grain).unwrap();
        assert_eq!(cached.silo, cluster.address(1));
        assert_eq!(
            a.local_lookup(&grain).unwrap(),
            Some(AddressAndTag::new(cached.clone(), AddressAndTag::CACHED))
        );

        // An entry on a silo the oracle no longer trusts is ignored.
        cluster.oracle.set_status(cluster.address(1), SiloStatus::None);
        assert!(a.try_cached_lookup(&grain).is_none());
        cluster.oracle.set_status(cluster.address(1), SiloStatus::Active);

        let other = activation(grain.clone(), &cluster.address(1));
        assert!(!a.invalidate_cache_address(&other));
        assert!(a.invalidate_cache_address(&cached));
        assert!(!a.invalidate_cache_entry(&grain));

        cluster.shutdown().await;
    }

    /// Test Case 9: Unregister at hop zero clears the local cache first
    #[tokio::test]
    async fn test_unregister_invalidates_cache() {
        let cluster = TestCluster::start(&[10, 50], fast_config());
        let a = cluster.silo(0);
        let grain = grain_at(40);
        let address = activation(grain.clone(), a.local());

        a.register(address.clone(), None, 0).await.unwrap();
        assert!(a.try_cached_lookup(&grain).is_some());

        a.unregister(address, UnregistrationCause::Force, 0)
            .await
            .unwrap();
        assert!(a.try_cached_lookup(&grain).is_none());
        assert_eq!(a.local_lookup(&grain).unwrap(), None);

        cluster.shutdown().await;
    }

    /// Test Case 10: Ring statistics
    #[tokio::test]
    async fn test_ring_stats() {
        let quarter = 1u32 << 30;
        let cluster = TestCluster::start(&[0, quarter, 2 * quarter, 3 * quarter], fast_config());
        let stats = cluster.silo(1).stats();

        assert_eq!(stats.ring_size, 4);
        assert_eq!(stats.ring_distance_to_successor, quarter as u64);
        assert!((stats.ring_percentage - 25.0).abs() < 1e-9);
        assert!((stats.average_ring_percentage - 25.0).abs() < 1e-9);
        assert_eq!(cluster.silo(1).successor(&cluster.address(1)), Some(cluster.address(2)));
        assert_eq!(cluster.silo(1).predecessor(&cluster.address(1)), Some(cluster.address(0)));

        cluster.shutdown().await;
    }

    /// Test Case 11: Builder validation
    #[test]
    fn test_builder_requires_collaborators() {
        let local = silo_at(11000, 10);
        let oracle: Arc<dyn MembershipOracle> = StaticMembershipOracle::new();

        let missing_channel = DirectoryService::builder(local.clone(), DirectoryConfig::default())
            .with_oracle(oracle.clone())
            .build();
        assert!(matches!(missing_channel, Err(Error::Config(_))));

        let bad_config = DirectoryService::builder(
            local.clone(),
            DirectoryConfig::default().with_cache(DirectoryCacheConfig::bounded(0)),
        )
        .with_oracle(oracle.clone())
        .with_channel(Arc::new(InProcessChannel::new()))
        .build();
        assert!(matches!(bad_config, Err(Error::Config(_))));

        let directory = DirectoryService::builder(local.clone(), DirectoryConfig::default())
            .with_oracle(oracle)
            .with_channel(Arc::new(InProcessChannel::new()))
            .build()
            .unwrap();
        assert!(directory.is_silo_in_cluster(&local));
        assert!(!directory.is_running());
    }

    /// Test Case 12: Disabled cache never answers
    #[tokio::test]
    async fn test_disabled_cache() {
        let config = fast_config().with_cache(DirectoryCacheConfig::disabled());
        let cluster = TestCluster::start(&[10, 50], config);
        let a = cluster.silo(0);
        let grain = grain_at(40);

        a.register(activation(grain.clone(), a.local()), None, 0)
            .await
            .unwrap();
        assert_eq!(a.local_lookup(&grain).unwrap(), None);
        assert_eq!(a.stats().cache_size, 0);

        cluster.shutdown().await;
    }
}
