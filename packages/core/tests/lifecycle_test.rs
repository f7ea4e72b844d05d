//! Lifecycle Tests
//!
//! Verify the fan-out/isolate pattern of the lifecycle controller: one
//! faulty resource never aborts a bulk call, failures demote the resource
//! from external visibility and surface as exactly one warning, and the
//! per-resource state machine only ever moves forward.

#[cfg(test)]
mod lifecycle_tests {
    use std::sync::{Arc, Mutex};

    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::json;

    use plantgraph_core::behaviors::ResourceBehavior;
    use plantgraph_core::db::{MemoryResourceStore, ResourceStore};
    use plantgraph_core::models::{Capabilities, LifecycleState, Resource};
    use plantgraph_core::registry::{ResourceTypeDef, ResourceTypeRegistry};
    use plantgraph_core::services::{ErrorReporting, ManagerConfig, ResourceManager};

    /// Sink that records every warning for later assertions.
    #[derive(Default)]
    struct CountingReporting {
        warnings: Mutex<Vec<String>>,
    }

    impl CountingReporting {
        fn count(&self) -> usize {
            self.warnings.lock().unwrap().len()
        }
    }

    impl ErrorReporting for CountingReporting {
        fn report_warning(&self, component: &str, error: &anyhow::Error) {
            self.warnings
                .lock()
                .unwrap()
                .push(format!("{component}: {error}"));
        }
    }

    /// Marks the resource extension payload while running.
    struct OnlineFlagBehavior;

    #[async_trait]
    impl ResourceBehavior for OnlineFlagBehavior {
        async fn start(&self, resource: &mut Resource) -> anyhow::Result<()> {
            resource.extension_data["online"] = json!(true);
            Ok(())
        }

        async fn stop(&self, resource: &mut Resource) -> anyhow::Result<()> {
            resource.extension_data["online"] = json!(false);
            Ok(())
        }
    }

    /// Fails its initialization, standing in for a broken device.
    struct BrokenInitBehavior;

    #[async_trait]
    impl ResourceBehavior for BrokenInitBehavior {
        async fn initialize(&self, _resource: &mut Resource) -> anyhow::Result<()> {
            anyhow::bail!("device did not answer")
        }
    }

    fn registry() -> Arc<ResourceTypeRegistry> {
        Arc::new(
            ResourceTypeRegistry::builder()
                .register(ResourceTypeDef::new("PlantRoot").public())
                .register(
                    ResourceTypeDef::new("Machine")
                        .public()
                        .with_capabilities(Capabilities::single("assemble"))
                        .with_behavior(Arc::new(OnlineFlagBehavior)),
                )
                .register(
                    ResourceTypeDef::new("FlakyMachine")
                        .public()
                        .with_capabilities(Capabilities::single("assemble"))
                        .with_behavior(Arc::new(BrokenInitBehavior)),
                )
                .build()
                .expect("valid test registry"),
        )
    }

    fn manager_with(
        store: &Arc<MemoryResourceStore>,
        reporting: &Arc<CountingReporting>,
    ) -> ResourceManager {
        let dyn_store: Arc<dyn ResourceStore> = store.clone();
        ResourceManager::with_reporting(
            registry(),
            dyn_store,
            ManagerConfig::new("PlantRoot"),
            reporting.clone(),
        )
    }

    async fn seed_machines(store: &Arc<MemoryResourceStore>, types: &[&str]) -> Result<Vec<i64>> {
        let reporting = Arc::new(CountingReporting::default());
        let seeder = manager_with(store, &reporting);
        let mut ids = Vec::new();
        for (index, type_name) in types.iter().enumerate() {
            let resource = seeder.create(type_name)?;
            resource.write().await.name = format!("{type_name}-{index}");
            ids.push(seeder.save(&resource).await?);
        }
        Ok(ids)
    }

    #[tokio::test]
    async fn one_broken_resource_does_not_abort_initialization() -> Result<()> {
        let store = Arc::new(MemoryResourceStore::new());
        let ids = seed_machines(&store, &["Machine", "Machine", "FlakyMachine"]).await?;

        let reporting = Arc::new(CountingReporting::default());
        let manager = manager_with(&store, &reporting);
        manager.initialize().await?;

        // Exactly one warning, and only the broken resource is demoted.
        assert_eq!(reporting.count(), 1);
        let visible = manager.get_resources(|_| true).await;
        assert_eq!(visible.len(), 2);
        assert!(visible.iter().all(|proxy| proxy.id() != ids[2]));

        // The healthy resources are initialized, the broken one is not.
        for id in &ids[..2] {
            let resource = manager.get(*id)?;
            assert_eq!(resource.read().await.state(), LifecycleState::Initialized);
        }
        let broken = manager.get(ids[2])?;
        assert_eq!(broken.read().await.state(), LifecycleState::Constructed);
        Ok(())
    }

    #[tokio::test]
    async fn bulk_start_and_stop_drive_the_state_machine() -> Result<()> {
        let store = Arc::new(MemoryResourceStore::new());
        let ids = seed_machines(&store, &["Machine", "Machine"]).await?;

        let reporting = Arc::new(CountingReporting::default());
        let manager = manager_with(&store, &reporting);
        manager.initialize().await?;
        manager.start().await;

        for id in &ids {
            let resource = manager.get(*id)?;
            let guard = resource.read().await;
            assert_eq!(guard.state(), LifecycleState::Running);
            assert_eq!(guard.extension_data["online"], json!(true));
        }

        manager.stop().await;
        for id in &ids {
            let resource = manager.get(*id)?;
            let guard = resource.read().await;
            assert_eq!(guard.state(), LifecycleState::Stopped);
            assert_eq!(guard.extension_data["online"], json!(false));
        }
        assert_eq!(reporting.count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn single_start_and_stop_return_success_flags() -> Result<()> {
        let store = Arc::new(MemoryResourceStore::new());
        let ids = seed_machines(&store, &["Machine"]).await?;

        let reporting = Arc::new(CountingReporting::default());
        let manager = manager_with(&store, &reporting);
        manager.initialize().await?;

        let machine = manager.get(ids[0])?;
        assert!(manager.start_resource(&machine).await);
        assert_eq!(machine.read().await.state(), LifecycleState::Running);

        assert!(manager.stop_resource(&machine).await);
        assert_eq!(machine.read().await.state(), LifecycleState::Stopped);

        // Stopped resources are not restarted; the fault is reported, not
        // raised.
        assert!(!manager.start_resource(&machine).await);
        assert_eq!(reporting.count(), 1);
        assert_eq!(machine.read().await.state(), LifecycleState::Stopped);
        Ok(())
    }

    #[tokio::test]
    async fn stopping_a_resource_that_never_ran_is_a_quiet_no_op() -> Result<()> {
        let store = Arc::new(MemoryResourceStore::new());
        let ids = seed_machines(&store, &["Machine"]).await?;

        let reporting = Arc::new(CountingReporting::default());
        let manager = manager_with(&store, &reporting);
        manager.initialize().await?;

        let machine = manager.get(ids[0])?;
        assert!(manager.stop_resource(&machine).await);
        assert_eq!(machine.read().await.state(), LifecycleState::Initialized);
        assert_eq!(reporting.count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn failed_start_demotes_from_external_visibility() -> Result<()> {
        let store = Arc::new(MemoryResourceStore::new());
        let ids = seed_machines(&store, &["Machine"]).await?;

        let reporting = Arc::new(CountingReporting::default());
        let manager = manager_with(&store, &reporting);
        manager.initialize().await?;
        // Starting twice makes the second bulk call fail for the resource.
        manager.start().await;
        manager.start().await;

        assert_eq!(reporting.count(), 1);
        assert!(manager.get_resources(|_| true).await.is_empty());
        // The resource itself is untouched and still addressable by id.
        let machine = manager.get(ids[0])?;
        assert_eq!(machine.read().await.state(), LifecycleState::Running);
        Ok(())
    }
}
