//! Typed optional arguments of the collective entry points.
//!
//! Each wrapper holds `None` when the caller wants the default; the default
//! is filled in by whichever entry point consumes it.

use crate::types::{Generation, Site};

/// Number of participating sites. Defaults to the number of localities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NumSites(pub Option<u32>);

impl NumSites {
    pub const fn new(n: u32) -> Self {
        Self(Some(n))
    }

    pub fn resolve(self, default: u32) -> u32 {
        self.0.unwrap_or(default)
    }
}

impl From<u32> for NumSites {
    fn from(n: u32) -> Self {
        Self::new(n)
    }
}

/// The caller's site index. Defaults to the calling locality.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThisSite(pub Option<Site>);

impl ThisSite {
    pub const fn new(site: Site) -> Self {
        Self(Some(site))
    }

    pub fn resolve(self, default: Site) -> Site {
        self.0.unwrap_or(default)
    }
}

impl From<Site> for ThisSite {
    fn from(site: Site) -> Self {
        Self::new(site)
    }
}

/// Site hosting the operation's root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RootSite(pub Option<Site>);

impl RootSite {
    pub const fn new(site: Site) -> Self {
        Self(Some(site))
    }

    pub fn resolve(self, default: Site) -> Site {
        self.0.unwrap_or(default)
    }
}

impl From<Site> for RootSite {
    fn from(site: Site) -> Self {
        Self::new(site)
    }
}

/// Per-call arguments of an operation on an existing communicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSite {
    pub this_site: ThisSite,
    pub generation: Generation,
}

/// Accepts the site and generation of a call in either order.
pub trait IntoCallSite {
    fn into_call_site(self) -> CallSite;
}

impl IntoCallSite for CallSite {
    fn into_call_site(self) -> CallSite {
        self
    }
}

impl IntoCallSite for (ThisSite, Generation) {
    fn into_call_site(self) -> CallSite {
        CallSite {
            this_site: self.0,
            generation: self.1,
        }
    }
}

impl IntoCallSite for (Generation, ThisSite) {
    fn into_call_site(self) -> CallSite {
        CallSite {
            this_site: self.1,
            generation: self.0,
        }
    }
}

impl IntoCallSite for Generation {
    fn into_call_site(self) -> CallSite {
        CallSite {
            this_site: ThisSite::default(),
            generation: self,
        }
    }
}
