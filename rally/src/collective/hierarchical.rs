//! Tree-structured scatter.
//!
//! Sites are numbered relative to the root. The group covering the relative
//! range `[lo, hi)` is led by `lo`. A group of at most `arity` sites is a
//! leaf: its leader hands every member its share through one communicator.
//! A larger group is split into `arity` contiguous sub-ranges, the first
//! `size % arity` of them one site longer than the rest; the leader sends
//! one `Vec<T>` per sub-range to the sub-range leaders, keeps the first one
//! and recurses into it, as does every sub-range leader.

use crate::collective::args::{NumSites, RootSite, ThisSite};
use crate::collective::communicator::{Communicator, check_site};
use crate::collective::handle::CollectiveHandle;
use crate::collective::scatter::{scatter_from_site, scatter_to_site};
use crate::error::{RallyError, Result};
use crate::locality::Locality;
use crate::naming::{basename_with_generation, name_from_basename};
use crate::payload::Payload;
use crate::types::{Generation, Site};
use std::sync::Arc;

/// Part a site plays in one tree level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelRole {
    /// Group leader: scatters the group's values.
    Producer,
    /// Receives the share at `index`.
    Consumer { index: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LevelShape {
    /// Shares are groups of values, one per sub-range.
    Interior { group_sizes: Vec<u32> },
    /// Shares are single values.
    Leaf,
}

/// One level of a site's path through the tree, in relative site numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LevelPlan {
    first: u32,
    last: u32,
    participants: u32,
    role: LevelRole,
    shape: LevelShape,
}

fn split(lo: u32, hi: u32, arity: u32) -> Vec<(u32, u32)> {
    let size = hi - lo;
    let base = size / arity;
    let extra = size % arity;
    let mut start = lo;
    (0..arity)
        .map(|j| {
            let len = base + u32::from(j < extra);
            let range = (start, start + len);
            start += len;
            range
        })
        .collect()
}

/// The levels relative site `site` takes part in, top to bottom.
pub(crate) fn plan(num_sites: u32, arity: u32, site: u32) -> Vec<LevelPlan> {
    let mut levels = Vec::new();
    let (mut lo, mut hi) = (0, num_sites);
    while hi - lo > 1 {
        let size = hi - lo;
        if size <= arity {
            let role = if site == lo {
                LevelRole::Producer
            } else {
                LevelRole::Consumer { index: site - lo }
            };
            levels.push(LevelPlan {
                first: lo,
                last: hi - 1,
                participants: size,
                role,
                shape: LevelShape::Leaf,
            });
            break;
        }

        let groups = split(lo, hi, arity);
        let Some(j) = groups.iter().position(|&(a, b)| a <= site && site < b) else {
            break;
        };
        let role = if site == lo {
            Some(LevelRole::Producer)
        } else if site == groups[j].0 {
            Some(LevelRole::Consumer { index: j as u32 })
        } else {
            None
        };
        if let Some(role) = role {
            levels.push(LevelPlan {
                first: lo,
                last: hi - 1,
                participants: arity,
                role,
                shape: LevelShape::Interior {
                    group_sizes: groups.iter().map(|&(a, b)| b - a).collect(),
                },
            });
        }
        (lo, hi) = groups[j];
    }
    levels
}

/// A level communicator together with this site's part in it.
#[derive(Debug, Clone)]
pub struct TreeLevel {
    pub communicator: Communicator,
    pub role: LevelRole,
    pub shape: LevelShape,
}

/// This site's path through a scatter tree.
#[derive(Debug, Clone)]
pub struct HierarchicalCommunicator {
    levels: Arc<[TreeLevel]>,
    num_sites: u32,
    this_site: Site,
    root_site: Site,
    arity: u32,
}

impl HierarchicalCommunicator {
    pub fn levels(&self) -> &[TreeLevel] {
        &self.levels
    }

    pub fn num_sites(&self) -> u32 {
        self.num_sites
    }

    pub fn this_site(&self) -> Site {
        self.this_site
    }

    pub fn root_site(&self) -> Site {
        self.root_site
    }

    pub fn arity(&self) -> u32 {
        self.arity
    }

    pub fn is_root(&self) -> bool {
        self.this_site == self.root_site
    }
}

/// Build this site's scatter tree for `basename`.
///
/// Every participant calls this with the same arguments apart from
/// `this_site`. The communicator of each level is hosted by the level's
/// leader. `root_site` defaults to 0 and `arity` to the configured default.
pub fn create_hierarchical_communicator(
    locality: &Arc<Locality>,
    basename: &str,
    num_sites: NumSites,
    this_site: ThisSite,
    generation: Option<Generation>,
    root_site: RootSite,
    arity: Option<u32>,
) -> Result<HierarchicalCommunicator> {
    let num_sites = num_sites.resolve(locality.num_sites());
    let this_site = this_site.resolve(locality.site());
    let root_site = root_site.resolve(0);
    check_site(this_site, num_sites)?;
    check_site(root_site, num_sites)?;
    let arity = arity.unwrap_or(locality.config().default_arity);
    if arity < 2 {
        return Err(RallyError::InvalidArity { arity });
    }
    if generation.is_some_and(|g| !g.is_valid()) {
        return Err(RallyError::InvalidGeneration {
            operation: "create_hierarchical_communicator",
        });
    }

    let mut base = basename_with_generation(basename, generation);
    if !base.ends_with('/') {
        base.push('/');
    }
    let relative = (this_site + num_sites - root_site) % num_sites;

    let mut levels = Vec::new();
    for level in plan(num_sites, arity, relative) {
        let host = (level.first + root_site) % num_sites;
        let name = name_from_basename(&format!("{base}{}-{}/", level.first, level.last), host);
        let index = match level.role {
            LevelRole::Producer => 0,
            LevelRole::Consumer { index } => index,
        };
        let communicator = Communicator::open(
            locality,
            name,
            host,
            level.participants,
            index,
            host == locality.site(),
        )?;
        levels.push(TreeLevel {
            communicator,
            role: level.role,
            shape: level.shape,
        });
    }
    tracing::debug!(
        site = this_site,
        root = root_site,
        num_sites,
        arity,
        depth = levels.len(),
        "hierarchical communicator created"
    );

    Ok(HierarchicalCommunicator {
        levels: levels.into(),
        num_sites,
        this_site,
        root_site,
        arity,
    })
}

/// Scatter `values` from the root of the tree; resolves to the root's own
/// value.
pub fn scatter_to_hierarchically<T: Payload>(
    comm: &HierarchicalCommunicator,
    values: Vec<T>,
    generation: Generation,
) -> CollectiveHandle<T> {
    if !generation.is_valid() {
        return CollectiveHandle::failed(RallyError::InvalidGeneration {
            operation: "scatter_to",
        });
    }
    if !comm.is_root() {
        return CollectiveHandle::failed(RallyError::NotRoot {
            operation: "scatter_to",
            site: comm.this_site,
            root: comm.root_site,
        });
    }
    let n = comm.num_sites as usize;
    if values.len() != n {
        return CollectiveHandle::failed(RallyError::ValueCountMismatch {
            expected: n,
            actual: values.len(),
        });
    }

    // Relative site k receives values[(k + root) % n].
    let mut values = values;
    values.rotate_left(comm.root_site as usize);
    let levels = Arc::clone(&comm.levels);
    CollectiveHandle::spawn(async move { walk(&levels, Some(values), generation).await })
}

/// Receive this site's value of a tree scatter.
pub fn scatter_from_hierarchically<T: Payload>(
    comm: &HierarchicalCommunicator,
    generation: Generation,
) -> CollectiveHandle<T> {
    if !generation.is_valid() {
        return CollectiveHandle::failed(RallyError::InvalidGeneration {
            operation: "scatter_from",
        });
    }
    if comm.is_root() {
        return CollectiveHandle::failed(RallyError::RootIsCaller {
            operation: "scatter_from",
            site: comm.this_site,
        });
    }
    let levels = Arc::clone(&comm.levels);
    CollectiveHandle::spawn(async move { walk(&levels, None, generation).await })
}

async fn walk<T: Payload>(
    levels: &[TreeLevel],
    mut held: Option<Vec<T>>,
    generation: Generation,
) -> Result<T> {
    for level in levels {
        let comm = &level.communicator;
        match (level.role, &level.shape) {
            (LevelRole::Consumer { index }, LevelShape::Interior { .. }) => {
                held = Some(scatter_from_site::<Vec<T>>(comm, index, generation).await?);
            }
            (LevelRole::Consumer { index }, LevelShape::Leaf) => {
                return scatter_from_site::<T>(comm, index, generation).await;
            }
            (LevelRole::Producer, LevelShape::Interior { group_sizes }) => {
                let groups = regroup(take_held(&mut held, generation)?, group_sizes)?;
                held = Some(scatter_to_site(comm, groups, 0, generation).await?);
            }
            (LevelRole::Producer, LevelShape::Leaf) => {
                let values = take_held(&mut held, generation)?;
                if values.len() != comm.num_sites() as usize {
                    return Err(RallyError::ValueCountMismatch {
                        expected: comm.num_sites() as usize,
                        actual: values.len(),
                    });
                }
                return scatter_to_site(comm, values, 0, generation).await;
            }
        }
    }
    // A group of one: the value was delivered by the level above.
    take_held(&mut held, generation)?
        .pop()
        .ok_or_else(|| RallyError::protocol("scatter", generation.get(), "received an empty group"))
}

fn take_held<T>(held: &mut Option<Vec<T>>, generation: Generation) -> Result<Vec<T>> {
    held.take().ok_or_else(|| {
        RallyError::protocol(
            "scatter",
            generation.get(),
            "site has no values to pass down the tree",
        )
    })
}

fn regroup<T>(values: Vec<T>, group_sizes: &[u32]) -> Result<Vec<Vec<T>>> {
    let expected: usize = group_sizes.iter().map(|&s| s as usize).sum();
    if values.len() != expected {
        return Err(RallyError::ValueCountMismatch {
            expected,
            actual: values.len(),
        });
    }
    let mut values = values.into_iter();
    Ok(group_sizes
        .iter()
        .map(|&size| values.by_ref().take(size as usize).collect())
        .collect())
}
