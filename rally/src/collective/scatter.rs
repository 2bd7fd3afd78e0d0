//! Scatter: the root hands value `i` to participant `i`.
//!
//! The root calls `scatter_to` with one value per participant, every other
//! participant calls `scatter_from`. Both resolve to the caller's own value.

use crate::collective::args::{IntoCallSite, NumSites, RootSite, ThisSite};
use crate::collective::communicator::{Communicator, check_site, create_communicator};
use crate::collective::handle::CollectiveHandle;
use crate::collective::remote::Operation;
use crate::collective::server::{CommunicatorServer, StepFn};
use crate::error::{RallyError, Result};
use crate::locality::Locality;
use crate::payload::{self, Payload};
use crate::rpc::{COMMUNICATOR_GET, COMMUNICATOR_SET};
use crate::types::{Generation, Site};
use std::sync::Arc;

/// Scatter `values` from the root; resolves to `values[this_site]`.
///
/// Fails before communicating if the generation is 0, the site is outside
/// the communicator or `values` does not hold one value per site.
pub fn scatter_to<T: Payload>(
    comm: &Communicator,
    values: Vec<T>,
    call: impl IntoCallSite,
) -> CollectiveHandle<T> {
    let (site, generation) = match validate("scatter_to", comm, call) {
        Ok(v) => v,
        Err(e) => return CollectiveHandle::failed(e),
    };
    if values.len() != comm.num_sites() as usize {
        return CollectiveHandle::failed(RallyError::ValueCountMismatch {
            expected: comm.num_sites() as usize,
            actual: values.len(),
        });
    }
    let comm = comm.clone();
    CollectiveHandle::spawn(async move { scatter_to_site(&comm, values, site, generation).await })
}

/// Receive this site's value of a scatter rooted elsewhere.
pub fn scatter_from<T: Payload>(comm: &Communicator, call: impl IntoCallSite) -> CollectiveHandle<T> {
    let (site, generation) = match validate("scatter_from", comm, call) {
        Ok(v) => v,
        Err(e) => return CollectiveHandle::failed(e),
    };
    let comm = comm.clone();
    CollectiveHandle::spawn(async move { scatter_from_site(&comm, site, generation).await })
}

/// Create the communicator for `basename` rooted at the caller and scatter
/// `values` through it.
pub fn scatter_to_basename<T: Payload>(
    locality: &Arc<Locality>,
    basename: &str,
    values: Vec<T>,
    num_sites: NumSites,
    this_site: ThisSite,
    generation: Generation,
) -> CollectiveHandle<T> {
    if !generation.is_valid() {
        return CollectiveHandle::failed(RallyError::InvalidGeneration {
            operation: "scatter_to",
        });
    }
    let site = this_site.resolve(locality.site());
    let comm = match create_communicator(
        locality,
        basename,
        num_sites,
        ThisSite::new(site),
        Some(generation),
        RootSite::new(site),
    ) {
        Ok(comm) => comm,
        Err(e) => return CollectiveHandle::failed(e),
    };
    scatter_to(&comm, values, (ThisSite::new(site), generation))
}

/// Address the communicator for `basename` rooted at `root_site` (default
/// 0) and receive this site's value.
pub fn scatter_from_basename<T: Payload>(
    locality: &Arc<Locality>,
    basename: &str,
    this_site: ThisSite,
    generation: Generation,
    root_site: RootSite,
) -> CollectiveHandle<T> {
    if !generation.is_valid() {
        return CollectiveHandle::failed(RallyError::InvalidGeneration {
            operation: "scatter_from",
        });
    }
    let site = this_site.resolve(locality.site());
    let root = root_site.resolve(0);
    if site == root {
        return CollectiveHandle::failed(RallyError::RootIsCaller {
            operation: "scatter_from",
            site,
        });
    }
    let comm = match create_communicator(
        locality,
        basename,
        NumSites::default(),
        ThisSite::new(site),
        Some(generation),
        RootSite::new(root),
    ) {
        Ok(comm) => comm,
        Err(e) => return CollectiveHandle::failed(e),
    };
    scatter_from(&comm, (ThisSite::new(site), generation))
}

fn validate(
    operation: &'static str,
    comm: &Communicator,
    call: impl IntoCallSite,
) -> Result<(Site, Generation)> {
    let call = call.into_call_site();
    if !call.generation.is_valid() {
        return Err(RallyError::InvalidGeneration { operation });
    }
    let site = call.this_site.resolve(comm.this_site());
    check_site(site, comm.num_sites())?;
    Ok((site, call.generation))
}

pub(crate) async fn scatter_to_site<T: Payload>(
    comm: &Communicator,
    values: Vec<T>,
    site: Site,
    generation: Generation,
) -> Result<T> {
    tracing::debug!(name = comm.name(), site, %generation, "scatter_to");
    let encoded: Vec<Vec<u8>> = values.iter().map(payload::to_bytes).collect();
    let share = comm
        .invoke(COMMUNICATOR_SET, Operation::Scatter, site, generation, Some(encoded))
        .await?;
    payload::from_bytes(&share)
}

pub(crate) async fn scatter_from_site<T: Payload>(
    comm: &Communicator,
    site: Site,
    generation: Generation,
) -> Result<T> {
    tracing::debug!(name = comm.name(), site, %generation, "scatter_from");
    let share = comm
        .invoke(COMMUNICATOR_GET, Operation::Scatter, site, generation, None)
        .await?;
    payload::from_bytes(&share)
}

/// Server half: fill the slot from the producer's values and hand each
/// site its own.
pub(crate) async fn serve_scatter(
    server: &CommunicatorServer,
    site: Site,
    generation: Generation,
    values: Option<Vec<Vec<u8>>>,
) -> Result<Vec<u8>> {
    let operation = Operation::Scatter.name();
    let g = generation.get();
    let step = values.map(|values| -> StepFn<Vec<u8>> {
        Box::new(move |data: &mut Vec<Option<Vec<u8>>>, _: Site| {
            if values.len() != data.len() {
                return Err(RallyError::protocol(
                    operation,
                    g,
                    format!("expected {} values, got {}", data.len(), values.len()),
                ));
            }
            for (slot, value) in data.iter_mut().zip(values) {
                *slot = Some(value);
            }
            Ok(())
        })
    });
    server
        .handle_data(operation, site, generation, step, move |data, _, which| {
            data[which as usize].take().ok_or_else(|| {
                RallyError::protocol(operation, g, format!("no value was produced for site {which}"))
            })
        })
        .await
}
