use rally::{Locality, RallyConfig};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Upper bound for any single collective in these tests.
pub const WAIT: Duration = Duration::from_secs(20);

/// Helper: run the same participant body on every locality of an
/// in-process cluster. Keeps all localities alive until every task
/// completes.
pub async fn run_sites<F, Fut>(num_sites: u32, f: F)
where
    F: Fn(Arc<Locality>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    run_sites_with_config(num_sites, RallyConfig::default(), f).await;
}

pub async fn run_sites_with_config<F, Fut>(num_sites: u32, config: RallyConfig, f: F)
where
    F: Fn(Arc<Locality>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let localities = Locality::bootstrap_local_with_config(num_sites, config)
        .await
        .unwrap();

    let f = Arc::new(f);
    let mut handles = Vec::new();
    for locality in &localities {
        let locality = Arc::clone(locality);
        let f = Arc::clone(&f);
        handles.push(tokio::spawn(async move { f(locality).await }));
    }
    for h in handles {
        h.await.unwrap();
    }
}

/// Config with short name resolution and call timeouts for fault tests.
pub fn fast_config() -> RallyConfig {
    RallyConfig {
        resolve_timeout: Duration::from_millis(300),
        rpc_timeout: Some(Duration::from_secs(10)),
        shutdown_timeout: Duration::from_millis(500),
        ..RallyConfig::default()
    }
}
