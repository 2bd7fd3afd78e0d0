use crate::error::{RallyError, Result};
use crate::naming::factory::Component;
use crate::types::{Generation, Site};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::watch;

/// Derive the registered name of the component hosted for `basename` at
/// `site`: `/<basename>/<site>`.
pub fn name_from_basename(basename: &str, site: Site) -> String {
    let mut name = String::with_capacity(basename.len() + 12);
    if !basename.starts_with('/') {
        name.push('/');
    }
    name.push_str(basename);
    if !name.ends_with('/') {
        name.push('/');
    }
    name.push_str(&site.to_string());
    name
}

/// Append the generation to a base name (`<basename><generation>/`).
pub fn basename_with_generation(basename: &str, generation: Option<Generation>) -> String {
    match generation {
        Some(g) => format!("{basename}{g}/"),
        None => basename.to_owned(),
    }
}

struct Entry {
    id: u64,
    component: Arc<dyn Component>,
    registration: Weak<Registration>,
}

impl Entry {
    fn is_live(&self) -> bool {
        self.registration.strong_count() > 0
    }
}

struct TableInner {
    site: Site,
    entries: Mutex<HashMap<String, Entry>>,
    version: watch::Sender<u64>,
    next_id: AtomicU64,
}

/// Per-locality map from registered names to hosted components.
///
/// Registrations are reference counted: the entry disappears when the last
/// `Arc<Registration>` for it is dropped.
pub struct SymbolTable {
    inner: Arc<TableInner>,
}

/// Keeps a name registered while alive.
pub struct Registration {
    id: u64,
    name: String,
    component: Arc<dyn Component>,
    table: Weak<TableInner>,
}

impl Registration {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn component(&self) -> &Arc<dyn Component> {
        &self.component
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("name", &self.name)
            .field("type", &self.component.type_name())
            .finish()
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        let Some(table) = self.table.upgrade() else {
            return;
        };
        let Ok(mut entries) = table.entries.lock() else {
            return;
        };
        if entries.get(&self.name).is_some_and(|e| e.id == self.id) {
            entries.remove(&self.name);
            tracing::debug!(site = table.site, name = %self.name, "symbols: unregistered");
        }
    }
}

impl SymbolTable {
    pub fn new(site: Site) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            inner: Arc::new(TableInner {
                site,
                entries: Mutex::new(HashMap::new()),
                version,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register `component` under `name`. Fails if the name is taken.
    pub fn register(&self, name: &str, component: Arc<dyn Component>) -> Result<Arc<Registration>> {
        let mut entries = self.lock()?;
        if entries.get(name).is_some_and(Entry::is_live) {
            return Err(RallyError::NameAlreadyRegistered {
                name: name.to_owned(),
            });
        }
        Ok(self.insert(&mut entries, name, component))
    }

    /// Return the live registration for `name`, creating the component with
    /// `create` if nothing is registered yet.
    ///
    /// An existing component must have the requested type and site count.
    pub fn register_or_get(
        &self,
        name: &str,
        type_name: &str,
        num_sites: u32,
        create: impl FnOnce() -> Result<Arc<dyn Component>>,
    ) -> Result<Arc<Registration>> {
        let mut entries = self.lock()?;
        let existing = entries.get(name).and_then(|e| e.registration.upgrade());
        if let Some(existing) = existing {
            // Release the table before `existing` can be dropped: its
            // destructor takes the same lock.
            drop(entries);
            let component = existing.component();
            if component.type_name() != type_name {
                return Err(RallyError::ComponentMismatch {
                    name: name.to_owned(),
                    reason: format!(
                        "registered as '{}', requested '{type_name}'",
                        component.type_name()
                    ),
                });
            }
            if component.num_sites() != num_sites {
                return Err(RallyError::ComponentMismatch {
                    name: name.to_owned(),
                    reason: format!(
                        "registered with {} sites, requested {num_sites}",
                        component.num_sites()
                    ),
                });
            }
            return Ok(existing);
        }
        let component = create()?;
        Ok(self.insert(&mut entries, name, component))
    }

    /// Look `name` up without waiting.
    pub fn lookup(&self, name: &str) -> Result<Option<Arc<dyn Component>>> {
        let entries = self.lock()?;
        Ok(entries
            .get(name)
            .filter(|e| e.is_live())
            .map(|e| Arc::clone(&e.component)))
    }

    /// Wait up to `timeout` for `name` to be registered.
    pub async fn resolve(&self, name: &str, timeout: Duration) -> Result<Arc<dyn Component>> {
        let deadline = tokio::time::Instant::now() + timeout;
        // Subscribe before the first lookup so a registration in between is
        // not missed.
        let mut changes = self.inner.version.subscribe();
        loop {
            if let Some(component) = self.lookup(name)? {
                return Ok(component);
            }
            match tokio::time::timeout_at(deadline, changes.changed()).await {
                Ok(Ok(())) => continue,
                _ => {
                    return Err(RallyError::NameResolveTimeout {
                        name: name.to_owned(),
                        timeout_ms: timeout.as_millis() as u64,
                    });
                }
            }
        }
    }

    /// Number of live registrations.
    pub fn len(&self) -> usize {
        self.lock()
            .map(|entries| entries.values().filter(|e| e.is_live()).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Entry>>> {
        self.inner
            .entries
            .lock()
            .map_err(|_| RallyError::LockPoisoned("symbol table"))
    }

    fn insert(
        &self,
        entries: &mut HashMap<String, Entry>,
        name: &str,
        component: Arc<dyn Component>,
    ) -> Arc<Registration> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let registration = Arc::new(Registration {
            id,
            name: name.to_owned(),
            component: Arc::clone(&component),
            table: Arc::downgrade(&self.inner),
        });
        entries.insert(
            name.to_owned(),
            Entry {
                id,
                component,
                registration: Arc::downgrade(&registration),
            },
        );
        self.inner.version.send_modify(|v| *v += 1);
        tracing::debug!(site = self.inner.site, name, "symbols: registered");
        registration
    }
}
