//! One supervised run: build the sets, export, notify and maintain them

use crate::config::Config;
use dispatcher_core::{
    schedule_renotify, DispatcherError, Notifier, Reconciler, Result, SetRegistry, SourceFactory,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct Runner {
    config: Arc<Config>,
    factory: Arc<dyn SourceFactory>,
    notifier: Arc<dyn Notifier>,
}

impl Runner {
    pub fn new(
        config: Arc<Config>,
        factory: Arc<dyn SourceFactory>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            factory,
            notifier,
        }
    }

    /// Run one attempt until `cancel` fires or the reconciler fails.
    ///
    /// Everything started here (watchers, API server, follow-up notify) is
    /// stopped before returning.
    pub async fn run_once(&self, cancel: &CancellationToken) -> Result<()> {
        let attempt = cancel.child_token();
        let _stop = attempt.clone().drop_guard();

        let mut registry = SetRegistry::new(&self.config.output);
        for definition in &self.config.definitions {
            registry.add(definition, self.factory.as_ref()).await?;
        }
        if registry.is_empty() {
            warn!("No dispatcher sets configured");
        }
        let registry = Arc::new(registry);

        tokio::select! {
            result = registry.update_all() => result?,
            _ = attempt.cancelled() => return Ok(()),
        }
        registry.export_all().await?;
        info!(
            "Exported {} dispatcher sets to {}",
            registry.len(),
            registry.output().display()
        );

        if let Err(e) = self.notifier.notify().await {
            warn!(
                "Failed to notify proxy after initial dispatcher export; it may not be up yet: {}",
                e
            );
        }
        let _renotify = schedule_renotify(
            self.notifier.clone(),
            self.config.renotify_delay,
            attempt.clone(),
        );

        let api = match &self.config.api_addr {
            Some(addr) => {
                let listener = TcpListener::bind(addr)
                    .await
                    .map_err(|source| DispatcherError::Listen {
                        addr: addr.clone(),
                        source,
                    })?;
                Some(tokio::spawn(dispatcher_api::serve(
                    listener,
                    registry.clone(),
                    attempt.clone(),
                )))
            }
            None => None,
        };

        let result = Reconciler::new(registry, self.notifier.clone())
            .run(&attempt)
            .await;

        attempt.cancel();
        if let Some(api) = api {
            let _ = api.await;
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dispatcher_core::{
        DefinitionDefaults, GroupDefinition, MemorySource, MembershipSource, NotifyError,
        SourceError,
    };
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct MemoryFactory;

    #[async_trait]
    impl SourceFactory for MemoryFactory {
        async fn create(
            &self,
            definition: &GroupDefinition,
        ) -> std::result::Result<Arc<dyn MembershipSource>, SourceError> {
            if definition.name == "missing" {
                return Err(SourceError::InvalidDefinition("missing".to_string()));
            }
            Ok(Arc::new(MemorySource::new(
                definition.id,
                vec![format!("10.0.0.{}:{}", definition.id, definition.port)],
            )))
        }
    }

    #[derive(Default)]
    struct UnreachableNotifier {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Notifier for UnreachableNotifier {
        async fn notify(&self) -> std::result::Result<(), NotifyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(NotifyError::Resolve("kamailio:9998".to_string()))
        }
    }

    /// Fails the first notify, as a proxy that is still starting would
    #[derive(Default)]
    struct StartingNotifier {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Notifier for StartingNotifier {
        async fn notify(&self) -> std::result::Result<(), NotifyError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(NotifyError::Send(std::io::Error::from(
                    std::io::ErrorKind::ConnectionRefused,
                )));
            }
            Ok(())
        }
    }

    fn config(output: &Path, sets: &str) -> Arc<Config> {
        Arc::new(Config {
            definitions: GroupDefinition::parse_list(sets, &DefinitionDefaults::default()).unwrap(),
            output: output.to_path_buf(),
            rpc_host: "127.0.0.1".to_string(),
            rpc_port: 9998,
            kubeconfig: None,
            api_addr: None,
            min_runtime: Duration::from_secs(60),
            max_short_failures: 10,
            renotify_delay: Duration::from_millis(50),
        })
    }

    #[tokio::test]
    async fn test_startup_notify_failure_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("dispatcher.list");
        let notifier = Arc::new(UnreachableNotifier::default());
        let runner = Runner::new(
            config(&output, "a=1,b=2"),
            Arc::new(MemoryFactory),
            notifier.clone(),
        );

        let cancel = CancellationToken::new();
        let stop = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            stop.cancel();
        });

        assert!(runner.run_once(&cancel).await.is_ok());
        assert_eq!(
            std::fs::read_to_string(&output).unwrap(),
            "1 sip:10.0.0.1:5060\n2 sip:10.0.0.2:5060\n"
        );
        // startup notify plus the follow-up
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_delayed_notify_recovers_from_startup_failure() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = Arc::new(StartingNotifier::default());
        let runner = Runner::new(
            config(&dir.path().join("dispatcher.list"), "a=1"),
            Arc::new(MemoryFactory),
            notifier.clone(),
        );

        let cancel = CancellationToken::new();
        let stop = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            stop.cancel();
        });

        assert!(runner.run_once(&cancel).await.is_ok());
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_source_construction_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Runner::new(
            config(&dir.path().join("dispatcher.list"), "a=1,missing=2"),
            Arc::new(MemoryFactory),
            Arc::new(UnreachableNotifier::default()),
        );

        let err = runner.run_once(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, DispatcherError::SourceConstruction { id: 2, .. }));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_export_failure_ends_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = Arc::new(UnreachableNotifier::default());
        let runner = Runner::new(
            config(&dir.path().join("missing").join("dispatcher.list"), "a=1"),
            Arc::new(MemoryFactory),
            notifier.clone(),
        );

        let err = runner.run_once(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, DispatcherError::Write { .. }));
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 0);
    }
}
