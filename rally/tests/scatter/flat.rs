use super::helpers::{WAIT, run_sites};
use rally::collective::CollectiveGroup;
use rally::{
    Generation, Locality, NumSites, RootSite, ThisSite, create_communicator, create_local_communicator,
    scatter_from, scatter_from_basename, scatter_to, scatter_to_basename,
};
use std::sync::Arc;

#[tokio::test]
async fn test_scatter_4_sites_by_basename() {
    run_sites(4, |locality| async move {
        let site = locality.site();
        let g = Generation::new(1);
        let values: Vec<u64> = (0..4).map(|i| i * 11).collect();

        let share = if site == 0 {
            scatter_to_basename(&locality, "flat", values.clone(), NumSites::default(), ThisSite::default(), g)
                .wait_timeout(WAIT)
                .await
        } else {
            scatter_from_basename::<u64>(&locality, "flat", ThisSite::default(), g, RootSite::new(0))
                .wait_timeout(WAIT)
                .await
        };
        assert_eq!(share.unwrap(), values[site as usize], "site {site}");
    })
    .await;
}

#[tokio::test]
async fn test_scatter_with_nonzero_root() {
    run_sites(5, |locality| async move {
        let site = locality.site();
        let root = 3;
        let g = Generation::new(7);
        let values: Vec<String> = (0..5).map(|i| format!("share-{i}")).collect();

        let share = if site == root {
            scatter_to_basename(&locality, "rooted", values, NumSites::default(), ThisSite::default(), g)
                .await
        } else {
            scatter_from_basename::<String>(&locality, "rooted", ThisSite::default(), g, RootSite::new(root))
                .await
        };
        assert_eq!(share.unwrap(), format!("share-{site}"));
    })
    .await;
}

#[tokio::test]
async fn test_shared_communicator_across_generations() {
    run_sites(3, |locality| async move {
        let site = locality.site();
        let root = 1;
        let comm = create_communicator(
            &locality,
            "shared",
            NumSites::default(),
            ThisSite::default(),
            None,
            RootSite::new(root),
        )
        .unwrap();
        assert_eq!(comm.is_host(), site == root);
        assert_eq!(comm.host(), root);

        for g in 1..=3u64 {
            let values: Vec<u32> = (0..3).map(|i| (g * 100) as u32 + i).collect();
            let share = if site == root {
                scatter_to(&comm, values, Generation::new(g)).await
            } else {
                scatter_from::<u32>(&comm, Generation::new(g)).await
            };
            assert_eq!(share.unwrap(), (g * 100) as u32 + site, "generation {g}");
        }
    })
    .await;
}

#[tokio::test]
async fn test_concurrent_generations_are_isolated() {
    run_sites(4, |locality| async move {
        let site = locality.site();
        let comm = create_communicator(
            &locality,
            "isolated",
            NumSites::default(),
            ThisSite::default(),
            None,
            RootSite::new(0),
        )
        .unwrap();

        // Issue every generation before waiting on any of them; the root
        // issues them in reverse order.
        let gens: Vec<u64> = if site == 0 {
            (1..=6).rev().collect()
        } else {
            (1..=6).collect()
        };
        let group: CollectiveGroup<Vec<u64>> = gens
            .iter()
            .map(|&g| {
                if site == 0 {
                    let values = (0..4).map(|i| vec![g; i as usize + 1]).collect();
                    scatter_to(&comm, values, Generation::new(g))
                } else {
                    scatter_from(&comm, Generation::new(g))
                }
            })
            .collect();

        let shares = group.wait_all().await.unwrap();
        for (g, share) in gens.iter().zip(shares) {
            assert_eq!(share, vec![*g; site as usize + 1], "site {site} generation {g}");
        }
    })
    .await;
}

#[tokio::test]
async fn test_argument_orders_are_equivalent() {
    run_sites(2, |locality| async move {
        let site = locality.site();
        let comm = create_communicator(
            &locality,
            "orders",
            NumSites::default(),
            ThisSite::default(),
            None,
            RootSite::new(0),
        )
        .unwrap();

        let g1 = Generation::new(1);
        let g2 = Generation::new(2);
        let (a, b) = if site == 0 {
            (
                scatter_to(&comm, vec![10i32, 11], (ThisSite::new(0), g1)).await,
                scatter_to(&comm, vec![20i32, 21], (g2, ThisSite::new(0))).await,
            )
        } else {
            (
                scatter_from::<i32>(&comm, (g1, ThisSite::new(1))).await,
                scatter_from::<i32>(&comm, (ThisSite::new(1), g2)).await,
            )
        };
        assert_eq!(a.unwrap(), 10 + site as i32);
        assert_eq!(b.unwrap(), 20 + site as i32);
    })
    .await;
}

#[tokio::test]
async fn test_root_reads_its_own_share_through_communicator() {
    run_sites(3, |locality| async move {
        let site = locality.site();
        let comm = create_communicator(
            &locality,
            "own",
            NumSites::default(),
            ThisSite::default(),
            Some(Generation::new(4)),
            RootSite::new(2),
        )
        .unwrap();
        let values = vec![(String::from("a"), 0.5f64), ("b".into(), 1.5), ("c".into(), 2.5)];
        let share = if site == 2 {
            scatter_to(&comm, values.clone(), Generation::new(4)).await
        } else {
            scatter_from(&comm, Generation::new(4)).await
        };
        assert_eq!(share.unwrap(), values[site as usize]);
    })
    .await;
}

#[tokio::test]
async fn test_local_communicator_within_one_locality() {
    run_sites(2, |locality| async move {
        let base = locality.site() as u64 * 1000;
        let mut handles = Vec::new();
        for participant in 0..4u32 {
            let locality = locality.clone();
            handles.push(tokio::spawn(async move {
                let comm = create_local_communicator(
                    &locality,
                    "local",
                    4,
                    participant,
                    None,
                    RootSite::new(0),
                )
                .unwrap();
                assert_eq!(comm.host(), locality.site());
                let g = Generation::new(1);
                if participant == 0 {
                    let values = (0..4).map(|i| base + i).collect();
                    scatter_to(&comm, values, g).await
                } else {
                    scatter_from::<u64>(&comm, g).await
                }
            }));
        }
        for (participant, h) in handles.into_iter().enumerate() {
            assert_eq!(h.await.unwrap().unwrap(), base + participant as u64);
        }
    })
    .await;
}

#[tokio::test]
async fn test_root_can_drop_its_handle_and_communicator() {
    let localities = Locality::bootstrap_local(3).await.unwrap();
    let g = Generation::new(1);
    let root = create_communicator(
        &localities[0],
        "fire-and-forget",
        NumSites::default(),
        ThisSite::default(),
        None,
        RootSite::new(0),
    )
    .unwrap();
    let handle = scatter_to(&root, vec![5u32, 6, 7], g);
    drop(handle);
    drop(root);

    let receive = |site: usize| {
        let locality = Arc::clone(&localities[site]);
        async move {
            let comm = create_communicator(
                &locality,
                "fire-and-forget",
                NumSites::default(),
                ThisSite::default(),
                None,
                RootSite::new(0),
            )?;
            scatter_from::<u32>(&comm, g).wait_timeout(WAIT).await
        }
    };
    let (a, b) = tokio::join!(receive(1), receive(2));
    assert_eq!(a.unwrap(), 6);
    assert_eq!(b.unwrap(), 7);
}
