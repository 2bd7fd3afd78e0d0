//! Requests addressed to a hosted communicator and the actions serving them.

use crate::collective::scatter;
use crate::collective::server::CommunicatorServer;
use crate::error::{RallyError, Result};
use crate::locality::Locality;
use crate::rpc::{COMMUNICATOR_GET, COMMUNICATOR_SET, RpcHandler, rpc_handler};
use crate::types::{ActionId, Generation, Site};
use std::sync::{Arc, Weak};

/// Collective operations a communicator can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Scatter,
}

impl Operation {
    pub fn name(self) -> &'static str {
        match self {
            Operation::Scatter => "scatter",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "scatter" => Ok(Operation::Scatter),
            _ => Err(RallyError::UnknownOperation {
                name: name.to_owned(),
            }),
        }
    }
}

/// Body of a `COMMUNICATOR_GET` / `COMMUNICATOR_SET` action.
#[derive(rkyv::Archive, rkyv::Serialize, rkyv::Deserialize, Debug, Clone, PartialEq)]
pub(crate) struct CommRequest {
    pub name: String,
    pub operation: String,
    pub num_sites: u32,
    pub site: Site,
    pub generation: u64,
    /// Encoded values of a producer, one per site.
    pub values: Option<Vec<Vec<u8>>>,
}

impl CommRequest {
    pub(crate) fn encode(&self) -> Result<Vec<u8>> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|bytes| bytes.to_vec())
            .map_err(|e| RallyError::EncodeFailed(e.to_string()))
    }

    pub(crate) fn decode(bytes: &[u8]) -> Result<Self> {
        let mut aligned = rkyv::util::AlignedVec::<16>::with_capacity(bytes.len());
        aligned.extend_from_slice(bytes);
        rkyv::from_bytes::<CommRequest, rkyv::rancor::Error>(&aligned)
            .map_err(|e| RallyError::DecodeFailed(e.to_string()))
    }
}

/// Handlers for the two communicator actions of a locality.
pub(crate) fn communicator_handlers(
    locality: Weak<Locality>,
    site: Site,
) -> [(ActionId, RpcHandler); 2] {
    [
        (COMMUNICATOR_GET, handler(locality.clone(), site, false)),
        (COMMUNICATOR_SET, handler(locality, site, true)),
    ]
}

fn handler(locality: Weak<Locality>, site: Site, producer: bool) -> RpcHandler {
    rpc_handler(move |payload| {
        let locality = locality.clone();
        async move {
            let locality = locality
                .upgrade()
                .ok_or(RallyError::ShuttingDown { site })?;
            let request = CommRequest::decode(&payload)?;
            if request.values.is_some() != producer {
                let reason = if producer {
                    "set request carries no values"
                } else {
                    "get request carries values"
                };
                return Err(RallyError::protocol(
                    &request.operation,
                    request.generation,
                    reason,
                ));
            }
            let server = resolve_server(&locality, &request).await?;
            serve(&server, request).await
        }
    })
}

async fn resolve_server(locality: &Locality, request: &CommRequest) -> Result<Arc<CommunicatorServer>> {
    let component = locality
        .symbols()
        .resolve(&request.name, locality.config().resolve_timeout)
        .await?;
    let type_name = component.type_name();
    let server = component
        .into_any()
        .downcast::<CommunicatorServer>()
        .map_err(|_| RallyError::ComponentMismatch {
            name: request.name.clone(),
            reason: format!("'{type_name}' is not a communicator"),
        })?;
    if server.num_sites() != request.num_sites {
        return Err(RallyError::ComponentMismatch {
            name: request.name.clone(),
            reason: format!(
                "hosted for {} sites, caller expects {}",
                server.num_sites(),
                request.num_sites
            ),
        });
    }
    Ok(server)
}

async fn serve(server: &CommunicatorServer, request: CommRequest) -> Result<Vec<u8>> {
    let generation = Generation::new(request.generation);
    match Operation::from_name(&request.operation)? {
        Operation::Scatter => {
            scatter::serve_scatter(server, request.site, generation, request.values).await
        }
    }
}
