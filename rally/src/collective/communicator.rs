use crate::collective::args::{NumSites, RootSite, ThisSite};
use crate::collective::remote::{CommRequest, Operation};
use crate::config::COMMUNICATOR_COMPONENT;
use crate::error::{RallyError, Result};
use crate::locality::Locality;
use crate::naming::{ComponentArgs, Registration, basename_with_generation, name_from_basename};
use crate::types::{ActionId, Generation, Site};
use std::sync::Arc;

/// Client handle of a communicator hosted on one site.
///
/// Cheap to clone. While the hosting site holds a `Communicator` for a name,
/// the server behind that name stays registered.
#[derive(Clone)]
pub struct Communicator {
    inner: Arc<CommunicatorInner>,
}

struct CommunicatorInner {
    locality: Arc<Locality>,
    name: String,
    host: Site,
    num_sites: u32,
    this_site: Site,
    registration: Option<Arc<Registration>>,
}

impl Communicator {
    pub(crate) fn open(
        locality: &Arc<Locality>,
        name: String,
        host: Site,
        num_sites: u32,
        this_site: Site,
        hosted_here: bool,
    ) -> Result<Self> {
        let registration = if hosted_here {
            let args = ComponentArgs {
                name: name.clone(),
                num_sites,
            };
            Some(locality.symbols().register_or_get(
                &name,
                COMMUNICATOR_COMPONENT,
                num_sites,
                || locality.components().create(COMMUNICATOR_COMPONENT, &args),
            )?)
        } else {
            None
        };
        tracing::debug!(
            site = locality.site(),
            name = %name,
            host,
            num_sites,
            hosted = hosted_here,
            "communicator: opened"
        );
        Ok(Self {
            inner: Arc::new(CommunicatorInner {
                locality: Arc::clone(locality),
                name,
                host,
                num_sites,
                this_site,
                registration,
            }),
        })
    }

    /// Registered name of the server.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Site hosting the server.
    pub fn host(&self) -> Site {
        self.inner.host
    }

    pub fn num_sites(&self) -> u32 {
        self.inner.num_sites
    }

    /// Default site index of calls made through this handle.
    pub fn this_site(&self) -> Site {
        self.inner.this_site
    }

    /// Whether this handle keeps the server registered.
    pub fn is_host(&self) -> bool {
        self.inner.registration.is_some()
    }

    pub fn locality(&self) -> &Arc<Locality> {
        &self.inner.locality
    }

    pub(crate) async fn invoke(
        &self,
        action: ActionId,
        operation: Operation,
        site: Site,
        generation: Generation,
        values: Option<Vec<Vec<u8>>>,
    ) -> Result<Vec<u8>> {
        let request = CommRequest {
            name: self.inner.name.clone(),
            operation: operation.name().to_owned(),
            num_sites: self.inner.num_sites,
            site,
            generation: generation.get(),
            values,
        };
        self.inner
            .locality
            .invoke(self.inner.host, action, request.encode()?)
            .await
    }
}

impl std::fmt::Debug for Communicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Communicator")
            .field("name", &self.inner.name)
            .field("host", &self.inner.host)
            .field("num_sites", &self.inner.num_sites)
            .field("this_site", &self.inner.this_site)
            .finish()
    }
}

pub(crate) fn check_site(site: Site, num_sites: u32) -> Result<()> {
    if site >= num_sites {
        return Err(RallyError::InvalidSite { site, num_sites });
    }
    Ok(())
}

/// Create a communicator for `basename` hosted on `root_site`.
///
/// Every participant calls this with the same base name and generation. The
/// participant running on the root's locality registers the server; the
/// others address it by name. Defaults: `num_sites` is the number of
/// localities, `this_site` is the calling locality and the root is the
/// caller.
pub fn create_communicator(
    locality: &Arc<Locality>,
    basename: &str,
    num_sites: NumSites,
    this_site: ThisSite,
    generation: Option<Generation>,
    root_site: RootSite,
) -> Result<Communicator> {
    let num_sites = num_sites.resolve(locality.num_sites());
    let this_site = this_site.resolve(locality.site());
    let root_site = root_site.resolve(this_site);
    check_site(this_site, num_sites)?;
    check_site(root_site, num_sites)?;
    if let Some(g) = generation {
        if !g.is_valid() {
            return Err(RallyError::InvalidGeneration {
                operation: "create_communicator",
            });
        }
    }

    let name = name_from_basename(&basename_with_generation(basename, generation), root_site);
    let hosted_here = root_site == locality.site();
    Communicator::open(locality, name, root_site, num_sites, this_site, hosted_here)
}

/// Create a communicator whose participants all run on the calling
/// locality.
///
/// The name is prefixed with the locality, so equal base names on different
/// localities never meet. The root participant registers the server.
pub fn create_local_communicator(
    locality: &Arc<Locality>,
    basename: &str,
    num_sites: u32,
    this_site: Site,
    generation: Option<Generation>,
    root_site: RootSite,
) -> Result<Communicator> {
    let root_site = root_site.resolve(this_site);
    check_site(this_site, num_sites)?;
    check_site(root_site, num_sites)?;
    if let Some(g) = generation {
        if !g.is_valid() {
            return Err(RallyError::InvalidGeneration {
                operation: "create_local_communicator",
            });
        }
    }

    let local_base = format!("/{}/{}", locality.site(), basename.trim_start_matches('/'));
    let name = name_from_basename(&basename_with_generation(&local_base, generation), root_site);
    Communicator::open(
        locality,
        name,
        locality.site(),
        num_sites,
        this_site,
        this_site == root_site,
    )
}
