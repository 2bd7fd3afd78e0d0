use super::helpers::{WAIT, fast_config};
use rally::{
    Generation, Locality, NumSites, RallyError, RootSite, ThisSite, create_communicator,
    scatter_from, scatter_from_basename, scatter_to,
};
use std::time::Duration;

#[tokio::test]
async fn test_invalid_arguments_fail_without_communicating() {
    let localities = Locality::bootstrap_local(2).await.unwrap();
    let comm = create_communicator(
        &localities[1],
        "args",
        NumSites::default(),
        ThisSite::default(),
        None,
        RootSite::new(0),
    )
    .unwrap();
    let root_comm = create_communicator(
        &localities[0],
        "args",
        NumSites::default(),
        ThisSite::default(),
        None,
        RootSite::new(0),
    )
    .unwrap();
    let before: u64 = localities.iter().map(|l| l.dispatch_count()).sum();

    let err = scatter_from::<u8>(&comm, Generation::new(0)).await.unwrap_err();
    assert!(matches!(err, RallyError::InvalidGeneration { .. }));

    let err = scatter_from::<u8>(&comm, (ThisSite::new(5), Generation::new(1)))
        .await
        .unwrap_err();
    assert!(matches!(err, RallyError::InvalidSite { site: 5, num_sites: 2 }));

    let err = scatter_from::<u8>(&comm, (ThisSite::new(2), Generation::new(1)))
        .await
        .unwrap_err();
    assert!(matches!(err, RallyError::InvalidSite { site: 2, num_sites: 2 }));

    let err = scatter_to(&root_comm, vec![1u8, 2, 3], Generation::new(1))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RallyError::ValueCountMismatch {
            expected: 2,
            actual: 3
        }
    ));

    let err = scatter_from_basename::<u8>(
        &localities[0],
        "args",
        ThisSite::default(),
        Generation::new(1),
        RootSite::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, RallyError::RootIsCaller { site: 0, .. }));

    let err = create_communicator(
        &localities[0],
        "args",
        NumSites::default(),
        ThisSite::default(),
        Some(Generation::new(0)),
        RootSite::new(0),
    )
    .unwrap_err();
    assert!(err.is_invalid_argument());

    let after: u64 = localities.iter().map(|l| l.dispatch_count()).sum();
    assert_eq!(before, after, "argument faults must not reach the network");
}

#[tokio::test]
async fn test_duplicate_consumer_gets_protocol_fault() {
    let localities = Locality::bootstrap_local(3).await.unwrap();
    let comms: Vec<_> = localities
        .iter()
        .map(|l| {
            create_communicator(l, "dup", NumSites::default(), ThisSite::default(), None, RootSite::new(0))
                .unwrap()
        })
        .collect();
    let g = Generation::new(1);

    let first = scatter_from::<u32>(&comms[1], g);
    let second = scatter_from::<u32>(&comms[1], g);
    // The generation cannot complete yet, so one of the two check-ins is
    // refused while the other stays parked.
    tokio::time::timeout(WAIT, async {
        while !first.is_finished() && !second.is_finished() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    let other = scatter_from::<u32>(&comms[2], g);
    let root = scatter_to(&comms[0], vec![10u32, 11, 12], g);

    let (first, second, other, root) = tokio::join!(
        first.wait_timeout(WAIT),
        second.wait_timeout(WAIT),
        other.wait_timeout(WAIT),
        root.wait_timeout(WAIT),
    );
    assert_eq!(root.unwrap(), 10);
    assert_eq!(other.unwrap(), 12);

    let (ok, err): (Vec<_>, Vec<_>) = [first, second].into_iter().partition(|r| r.is_ok());
    assert_eq!(ok.len(), 1, "exactly one duplicate may succeed");
    assert_eq!(ok.into_iter().next().unwrap().unwrap(), 11);
    let err = err.into_iter().next().unwrap().unwrap_err();
    assert!(err.is_protocol_fault(), "{err}");
    assert!(err.to_string().contains("already checked in"), "{err}");
}

#[tokio::test]
async fn test_completed_generation_is_rejected() {
    let localities = Locality::bootstrap_local(2).await.unwrap();
    let root = create_communicator(
        &localities[0],
        "stale",
        NumSites::default(),
        ThisSite::default(),
        None,
        RootSite::new(0),
    )
    .unwrap();
    let consumer = create_communicator(
        &localities[1],
        "stale",
        NumSites::default(),
        ThisSite::default(),
        None,
        RootSite::new(0),
    )
    .unwrap();
    let g = Generation::new(1);

    let (a, b) = tokio::join!(
        scatter_to(&root, vec!["x".to_string(), "y".to_string()], g),
        scatter_from::<String>(&consumer, g),
    );
    assert_eq!(a.unwrap(), "x");
    assert_eq!(b.unwrap(), "y");

    let err = scatter_from::<String>(&consumer, g)
        .wait_timeout(WAIT)
        .await
        .unwrap_err();
    assert!(err.is_protocol_fault(), "{err}");
    assert!(err.to_string().contains("already completed"), "{err}");

    // The next generation is unaffected.
    let g2 = Generation::new(2);
    let (a, b) = tokio::join!(
        scatter_to(&root, vec!["p".to_string(), "q".to_string()], g2),
        scatter_from::<String>(&consumer, g2),
    );
    assert_eq!(a.unwrap(), "p");
    assert_eq!(b.unwrap(), "q");
}

#[tokio::test]
async fn test_unreachable_root_is_a_transport_fault() {
    let localities = Locality::bootstrap_local(2).await.unwrap();
    let consumer = create_communicator(
        &localities[1],
        "gone",
        NumSites::default(),
        ThisSite::default(),
        None,
        RootSite::new(0),
    )
    .unwrap();

    localities[0].close();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let err = scatter_from::<u32>(&consumer, Generation::new(1))
        .wait_timeout(WAIT)
        .await
        .unwrap_err();
    assert!(!matches!(err, RallyError::WaitTimeout { .. }), "{err}");
    assert!(!err.is_invalid_argument(), "{err}");
    assert!(!err.is_protocol_fault(), "{err}");
}

#[tokio::test]
async fn test_unregistered_name_times_out_on_host() {
    let localities = Locality::bootstrap_local_with_config(2, fast_config())
        .await
        .unwrap();
    // Site 0 never creates "ghost", so the request parks in name resolution
    // until the resolve timeout.
    let consumer = create_communicator(
        &localities[1],
        "ghost",
        NumSites::default(),
        ThisSite::default(),
        None,
        RootSite::new(0),
    )
    .unwrap();

    let err = scatter_from::<u32>(&consumer, Generation::new(1))
        .wait_timeout(WAIT)
        .await
        .unwrap_err();
    assert!(matches!(err, RallyError::RemoteProtocol { site: 0, .. }), "{err}");
    assert!(err.to_string().contains("ghost"), "{err}");
}

#[tokio::test]
async fn test_mismatched_site_count_is_rejected_by_host() {
    let localities = Locality::bootstrap_local(2).await.unwrap();
    let _host = create_communicator(
        &localities[0],
        "mismatch",
        NumSites::new(2),
        ThisSite::default(),
        None,
        RootSite::new(0),
    )
    .unwrap();
    let consumer = create_communicator(
        &localities[1],
        "mismatch",
        NumSites::new(3),
        ThisSite::default(),
        None,
        RootSite::new(0),
    )
    .unwrap();

    let err = scatter_from::<u32>(&consumer, Generation::new(1))
        .wait_timeout(WAIT)
        .await
        .unwrap_err();
    assert!(err.is_protocol_fault(), "{err}");
}
