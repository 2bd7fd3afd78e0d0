use super::helpers::{WAIT, fast_config};
use rally::rpc::COMMUNICATOR_GET;
use rally::{
    Generation, Locality, LocalityState, NumSites, RallyError, RootSite, ThisSite,
    create_communicator, scatter_from,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[tokio::test]
async fn test_shutdown_walks_through_states() {
    let localities = Locality::bootstrap_local(2).await.unwrap();
    let locality = Arc::clone(&localities[0]);
    assert_eq!(locality.state(), LocalityState::Running);

    let seen = Arc::new(Mutex::new(None));
    let observer = Arc::clone(&locality);
    let slot = Arc::clone(&seen);
    locality.on_shutdown(move || {
        *slot.lock().unwrap() = Some(observer.state());
    });

    locality.shutdown(Duration::from_millis(500)).await.unwrap();
    assert_eq!(*seen.lock().unwrap(), Some(LocalityState::Draining));
    assert_eq!(locality.state(), LocalityState::Stopped);
}

#[tokio::test]
async fn test_shutdown_is_idempotent() {
    let localities = Locality::bootstrap_local(1).await.unwrap();
    let locality = &localities[0];
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    locality.on_shutdown(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let timeout = Duration::from_millis(200);
    let (a, b) = tokio::join!(locality.shutdown(timeout), locality.shutdown(timeout));
    a.unwrap();
    b.unwrap();
    locality.shutdown(timeout).await.unwrap();

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(locality.state(), LocalityState::Stopped);
}

#[tokio::test]
async fn test_stopped_locality_refuses_local_calls() {
    let localities = Locality::bootstrap_local(1).await.unwrap();
    let locality = &localities[0];
    locality.shutdown(Duration::from_millis(200)).await.unwrap();

    let err = locality
        .invoke(locality.site(), COMMUNICATOR_GET, Vec::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RallyError::ShuttingDown { site: 0 }));
}

#[tokio::test]
async fn test_shutdown_aborts_parked_requests() {
    let localities = Locality::bootstrap_local(2).await.unwrap();
    let _host = create_communicator(
        &localities[0],
        "parked",
        NumSites::default(),
        ThisSite::default(),
        None,
        RootSite::new(0),
    )
    .unwrap();
    let consumer = create_communicator(
        &localities[1],
        "parked",
        NumSites::default(),
        ThisSite::default(),
        None,
        RootSite::new(0),
    )
    .unwrap();

    // The root never contributes, so the consumer's request parks on site 0.
    let pending = scatter_from::<u64>(&consumer, Generation::new(1));
    tokio::time::timeout(WAIT, async {
        while localities[0].inflight_requests() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(localities[0].inflight_requests(), 1);

    localities[0]
        .shutdown(Duration::from_millis(100))
        .await
        .unwrap();
    assert_eq!(localities[0].state(), LocalityState::Stopped);
    assert_eq!(localities[0].inflight_requests(), 0);

    let err = pending.wait_timeout(WAIT).await.unwrap_err();
    assert!(!matches!(err, RallyError::WaitTimeout { .. }), "{err}");
}

#[tokio::test]
async fn test_shutdown_all_stops_every_locality() {
    let localities = Locality::bootstrap_local(3).await.unwrap();
    localities[0]
        .shutdown_all(Duration::from_millis(500))
        .await
        .unwrap();

    for locality in &localities {
        tokio::time::timeout(WAIT, locality.stopped())
            .await
            .unwrap_or_else(|_| panic!("site {} did not stop", locality.site()));
        assert_eq!(locality.state(), LocalityState::Stopped);
    }
}

#[tokio::test]
async fn test_shutdown_cluster_uses_configured_budget() {
    let localities = Locality::bootstrap_local_with_config(2, fast_config())
        .await
        .unwrap();
    localities[1].shutdown_cluster().await.unwrap();
    for locality in &localities {
        tokio::time::timeout(WAIT, locality.stopped()).await.unwrap();
    }
}
