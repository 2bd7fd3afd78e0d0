use super::helpers::{WAIT, run_sites};
use rally::collective::LevelRole;
use rally::{
    Generation, Locality, NumSites, RallyError, RootSite, ThisSite,
    create_hierarchical_communicator, scatter_from_hierarchically, scatter_to_hierarchically,
};

/// Scatter `0..num_sites` through a tree and check every site gets its
/// own index, exactly as the flat protocol would deliver it.
async fn check_tree(num_sites: u32, arity: u32, root: u32) {
    run_sites(num_sites, move |locality| async move {
        let site = locality.site();
        let g = Generation::new(1);
        let tree = create_hierarchical_communicator(
            &locality,
            "tree",
            NumSites::default(),
            ThisSite::default(),
            Some(g),
            RootSite::new(root),
            Some(arity),
        )
        .unwrap();
        assert_eq!(tree.is_root(), site == root);

        let values: Vec<u64> = (0..u64::from(num_sites)).collect();
        let share = if tree.is_root() {
            scatter_to_hierarchically(&tree, values, g)
                .wait_timeout(WAIT)
                .await
        } else {
            scatter_from_hierarchically::<u64>(&tree, g)
                .wait_timeout(WAIT)
                .await
        };
        assert_eq!(
            share.unwrap(),
            u64::from(site),
            "n={num_sites} arity={arity} root={root} site={site}"
        );
    })
    .await;
}

#[tokio::test]
async fn test_hierarchical_8_sites_binary() {
    check_tree(8, 2, 0).await;
}

#[tokio::test]
async fn test_hierarchical_uneven_binary() {
    check_tree(7, 2, 0).await;
}

#[tokio::test]
async fn test_hierarchical_uneven_ternary() {
    check_tree(10, 3, 0).await;
}

#[tokio::test]
async fn test_hierarchical_nonzero_root() {
    check_tree(6, 2, 4).await;
}

#[tokio::test]
async fn test_hierarchical_wide_arity_is_flat() {
    check_tree(5, 8, 2).await;
}

#[tokio::test]
async fn test_hierarchical_single_site() {
    check_tree(1, 2, 0).await;
}

#[tokio::test]
async fn test_tree_shape_for_8_sites() {
    run_sites(8, |locality| async move {
        let site = locality.site();
        let tree = create_hierarchical_communicator(
            &locality,
            "shape",
            NumSites::default(),
            ThisSite::default(),
            None,
            RootSite::default(),
            Some(2),
        )
        .unwrap();
        let expected_depth = match site {
            0 => 3,
            4 => 3,
            2 | 6 => 2,
            _ => 1,
        };
        assert_eq!(tree.levels().len(), expected_depth, "site {site}");
        if site == 0 {
            assert!(tree.levels().iter().all(|l| l.role == LevelRole::Producer));
        } else {
            assert!(matches!(tree.levels()[0].role, LevelRole::Consumer { .. }));
        }
        // Each level is hosted by its leader.
        for level in tree.levels() {
            assert_eq!(
                level.communicator.is_host(),
                level.role == LevelRole::Producer
            );
        }
    })
    .await;
}

#[tokio::test]
async fn test_tree_reused_across_generations() {
    run_sites(6, |locality| async move {
        let site = locality.site();
        let tree = create_hierarchical_communicator(
            &locality,
            "reused",
            NumSites::default(),
            ThisSite::default(),
            None,
            RootSite::new(0),
            None,
        )
        .unwrap();
        assert_eq!(tree.arity(), locality.config().default_arity);

        for g in 1..=3u64 {
            let values: Vec<u64> = (0..6).map(|i| g * 10 + i).collect();
            let share = if tree.is_root() {
                scatter_to_hierarchically(&tree, values, Generation::new(g)).await
            } else {
                scatter_from_hierarchically::<u64>(&tree, Generation::new(g)).await
            };
            assert_eq!(share.unwrap(), g * 10 + u64::from(site));
        }
    })
    .await;
}

#[tokio::test]
async fn test_hierarchical_argument_faults() {
    let localities = Locality::bootstrap_local(3).await.unwrap();

    let err = create_hierarchical_communicator(
        &localities[0],
        "bad",
        NumSites::default(),
        ThisSite::default(),
        None,
        RootSite::new(0),
        Some(1),
    )
    .unwrap_err();
    assert!(matches!(err, RallyError::InvalidArity { arity: 1 }));

    let root_tree = create_hierarchical_communicator(
        &localities[0],
        "faults",
        NumSites::default(),
        ThisSite::default(),
        None,
        RootSite::new(0),
        Some(2),
    )
    .unwrap();
    let leaf_tree = create_hierarchical_communicator(
        &localities[1],
        "faults",
        NumSites::default(),
        ThisSite::default(),
        None,
        RootSite::new(0),
        Some(2),
    )
    .unwrap();

    let before = localities[0].dispatch_count() + localities[1].dispatch_count();

    let err = scatter_from_hierarchically::<u32>(&root_tree, Generation::new(1))
        .await
        .unwrap_err();
    assert!(matches!(err, RallyError::RootIsCaller { site: 0, .. }));

    let err = scatter_to_hierarchically(&leaf_tree, vec![1u32, 2, 3], Generation::new(1))
        .await
        .unwrap_err();
    assert!(matches!(err, RallyError::NotRoot { site: 1, root: 0, .. }));

    let err = scatter_to_hierarchically(&root_tree, vec![1u32, 2], Generation::new(1))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RallyError::ValueCountMismatch {
            expected: 3,
            actual: 2
        }
    ));

    let err = scatter_to_hierarchically(&root_tree, vec![1u32, 2, 3], Generation::new(0))
        .await
        .unwrap_err();
    assert!(err.is_invalid_argument());

    let after = localities[0].dispatch_count() + localities[1].dispatch_count();
    assert_eq!(before, after);
}
