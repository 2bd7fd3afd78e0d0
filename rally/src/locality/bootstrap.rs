use crate::config::RallyConfig;
use crate::error::{RallyError, Result};
use crate::locality::Locality;
use crate::protocol::RallyMessage;
use crate::transport::router::read_frame;
use crate::transport::{PeerConnection, TransportListener};
use crate::types::{PROTOCOL_VERSION, Priority, Site};
use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

impl Locality {
    /// Bootstrap `num_sites` localities in this process, fully meshed over
    /// loopback QUIC. Intended for tests and single-host deployments.
    pub async fn bootstrap_local(num_sites: u32) -> Result<Vec<Arc<Locality>>> {
        Self::bootstrap_local_with_config(num_sites, RallyConfig::default()).await
    }

    /// Like `bootstrap_local`, with every locality using `config`.
    pub async fn bootstrap_local_with_config(
        num_sites: u32,
        config: RallyConfig,
    ) -> Result<Vec<Arc<Locality>>> {
        if num_sites == 0 {
            return Err(RallyError::InvalidSite {
                site: 0,
                num_sites: 0,
            });
        }

        let loopback = SocketAddr::from((Ipv4Addr::LOCALHOST, 0));
        let listeners: Vec<Arc<TransportListener>> = (0..num_sites)
            .map(|_| TransportListener::bind(loopback).map(Arc::new))
            .collect::<Result<_>>()?;
        let addrs: Vec<SocketAddr> = listeners.iter().map(|l| l.local_addr()).collect();

        // Site j accepts one connection from every site below it.
        let mut accept_tasks = Vec::new();
        for j in 0..num_sites {
            let listener = Arc::clone(&listeners[j as usize]);
            accept_tasks.push(tokio::spawn(accept_peers(listener, j, j as usize)));
        }

        // Site i connects to every site above it and introduces itself.
        let mut connect_tasks = Vec::new();
        for i in 0..num_sites {
            for j in (i + 1)..num_sites {
                let listener = Arc::clone(&listeners[i as usize]);
                let addr = addrs[j as usize];
                connect_tasks.push(tokio::spawn(async move {
                    let conn = listener.connect(addr).await?;
                    let peer = PeerConnection::new(j, conn);
                    let hello = RallyMessage::Hello {
                        protocol_version: PROTOCOL_VERSION,
                        site: i,
                    };
                    peer.send_message(&hello, Priority::Critical).await?;
                    Ok::<_, RallyError>((i, peer))
                }));
            }
        }

        let mut all_peers: Vec<HashMap<Site, PeerConnection>> =
            (0..num_sites).map(|_| HashMap::new()).collect();
        for handle in connect_tasks {
            let (i, peer) = handle
                .await
                .map_err(|e| RallyError::transport_with_source("connect task panicked", e))??;
            all_peers[i as usize].insert(peer.site, peer);
        }
        for (j, handle) in accept_tasks.into_iter().enumerate() {
            let accepted = handle
                .await
                .map_err(|e| RallyError::transport_with_source("accept task panicked", e))??;
            for peer in accepted {
                all_peers[j].insert(peer.site, peer);
            }
        }

        let mut localities = Vec::with_capacity(num_sites as usize);
        for (site, peers) in all_peers.into_iter().enumerate() {
            let locality = Locality::new(site as Site, num_sites, peers, config.clone())?;
            locality.attach_endpoint(listeners[site].endpoint().clone());
            localities.push(locality);
        }
        tracing::info!(num_sites, "bootstrap: localities ready");
        Ok(localities)
    }
}

/// Accept `expected` connections on `listener`, identifying each peer by
/// the `Hello` it sends first.
async fn accept_peers(
    listener: Arc<TransportListener>,
    site: Site,
    expected: usize,
) -> Result<Vec<PeerConnection>> {
    let mut peers = Vec::with_capacity(expected);
    for _ in 0..expected {
        let conn = listener.accept().await?;
        let stream = conn
            .accept_uni()
            .await
            .map_err(|e| RallyError::transport_with_source("await hello", e))?;
        match read_frame(stream, site).await {
            Some(RallyMessage::Hello {
                protocol_version,
                site: remote,
            }) => {
                if protocol_version != PROTOCOL_VERSION {
                    return Err(RallyError::transport(format!(
                        "site {remote} speaks protocol {protocol_version}, expected {PROTOCOL_VERSION}"
                    )));
                }
                tracing::debug!(site, peer = remote, "bootstrap: peer connected");
                peers.push(PeerConnection::new(remote, conn));
            }
            _ => return Err(RallyError::transport("expected hello as first frame")),
        }
    }
    Ok(peers)
}
