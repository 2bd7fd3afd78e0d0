//! Server side of a communicator: one rendezvous slot per generation.
//!
//! Every participant of a generation checks in exactly once. A producer
//! check-in runs its step function to fill the slot. When the last of the
//! `num_sites` participants has checked in the slot is finalized and every
//! waiting participant extracts its own share by running its finalizer under
//! the communicator lock. After the last share has been handed out the slot
//! is discarded and the generation is retired; any later arrival for it is a
//! protocol fault.
//!
//! Only the most recently completed generations are remembered by number.
//! Once one is forgotten, every generation up to the highest forgotten one
//! that has no live slot is treated as completed.

use crate::config::COMMUNICATOR_COMPONENT;
use crate::error::{RallyError, Result};
use crate::naming::{Component, ComponentArgs, ComponentFactory};
use crate::types::{Generation, Site};
use std::any::Any;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

/// Producer contribution: writes values into the slot of a generation.
pub type StepFn<D> = Box<dyn FnOnce(&mut Vec<Option<D>>, Site) -> Result<()> + Send>;

/// Lifecycle of the slot of one generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Created by an early consumer; nothing produced yet.
    Empty,
    /// The producer's step has run; waiting for the remaining check-ins.
    Producing,
    /// Every participant has checked in; shares are being delivered.
    Finalized,
}

struct GenerationSlot {
    operation: String,
    state: SlotState,
    data: Box<dyn Any + Send>,
    checked_in: Vec<bool>,
    arrived: u32,
    delivered: u32,
    all_done: bool,
    ready: watch::Sender<bool>,
}

impl GenerationSlot {
    fn new<D: Send + 'static>(operation: &str, num_sites: usize) -> Self {
        let data: Vec<Option<D>> = (0..num_sites).map(|_| None).collect();
        let (ready, _) = watch::channel(false);
        Self {
            operation: operation.to_owned(),
            state: SlotState::Empty,
            data: Box::new(data),
            checked_in: vec![false; num_sites],
            arrived: 0,
            delivered: 0,
            all_done: false,
            ready,
        }
    }
}

#[derive(Default)]
struct ServerState {
    slots: HashMap<u64, GenerationSlot>,
    retired: HashSet<u64>,
    /// Retired generations in completion order, oldest first.
    completed: VecDeque<u64>,
    /// Highest generation dropped from `retired`.
    retired_floor: u64,
}

impl ServerState {
    fn is_retired(&self, g: u64) -> bool {
        self.retired.contains(&g) || (g <= self.retired_floor && !self.slots.contains_key(&g))
    }

    fn retire(&mut self, g: u64, limit: usize) {
        self.retired.insert(g);
        self.completed.push_back(g);
        while self.completed.len() > limit {
            let Some(oldest) = self.completed.pop_front() else {
                break;
            };
            self.retired.remove(&oldest);
            self.retired_floor = self.retired_floor.max(oldest);
        }
    }
}

/// The rendezvous object hosted for one communicator name.
pub struct CommunicatorServer {
    name: String,
    num_sites: u32,
    retired_limit: usize,
    state: Mutex<ServerState>,
}

impl CommunicatorServer {
    pub fn new(name: impl Into<String>, num_sites: u32, retired_limit: usize) -> Self {
        Self {
            name: name.into(),
            num_sites,
            retired_limit,
            state: Mutex::new(ServerState::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_sites(&self) -> u32 {
        self.num_sites
    }

    /// Number of generations with a live slot.
    pub fn live_generations(&self) -> usize {
        self.lock().map(|s| s.slots.len()).unwrap_or(0)
    }

    pub fn slot_state(&self, generation: Generation) -> Option<SlotState> {
        let state = self.lock().ok()?;
        state.slots.get(&generation.get()).map(|slot| slot.state)
    }

    pub fn is_retired(&self, generation: Generation) -> bool {
        self.lock()
            .map(|s| s.is_retired(generation.get()))
            .unwrap_or(false)
    }

    /// Check `site` in for `generation` and resolve to its share.
    ///
    /// `step` is `Some` for producers. `finalizer` runs once for this site
    /// after all participants have checked in; it receives the whole slot,
    /// the shared "all done" flag of the generation and the site index.
    pub async fn handle_data<D, R, F>(
        &self,
        operation: &str,
        site: Site,
        generation: Generation,
        step: Option<StepFn<D>>,
        finalizer: F,
    ) -> Result<R>
    where
        D: Send + 'static,
        F: FnOnce(&mut Vec<Option<D>>, &mut bool, Site) -> Result<R> + Send,
    {
        let mut ready = self.check_in::<D>(operation, site, generation, step)?;
        if ready.wait_for(|finalized| *finalized).await.is_err() {
            return Err(RallyError::protocol(
                operation,
                generation.get(),
                "slot was torn down before it was finalized",
            ));
        }
        self.deliver(operation, site, generation, finalizer)
    }

    fn check_in<D: Send + 'static>(
        &self,
        operation: &str,
        site: Site,
        generation: Generation,
        step: Option<StepFn<D>>,
    ) -> Result<watch::Receiver<bool>> {
        let g = generation.get();
        if !generation.is_valid() {
            return Err(RallyError::protocol(operation, g, "generation 0 is reserved"));
        }
        if site >= self.num_sites {
            return Err(RallyError::protocol(
                operation,
                g,
                format!("site {site} is outside [0, {})", self.num_sites),
            ));
        }

        let mut state = self.lock()?;
        if state.is_retired(g) {
            return Err(RallyError::protocol(
                operation,
                g,
                "generation already completed",
            ));
        }

        let num_sites = self.num_sites as usize;
        let slot = state
            .slots
            .entry(g)
            .or_insert_with(|| GenerationSlot::new::<D>(operation, num_sites));

        if slot.operation != operation {
            return Err(RallyError::protocol(
                operation,
                g,
                format!("generation is in use by '{}'", slot.operation),
            ));
        }
        if slot.checked_in[site as usize] {
            return Err(RallyError::protocol(
                operation,
                g,
                format!("site {site} already checked in"),
            ));
        }
        if slot.state == SlotState::Finalized {
            return Err(RallyError::protocol(operation, g, "generation already finalized"));
        }

        let data = slot
            .data
            .downcast_mut::<Vec<Option<D>>>()
            .ok_or_else(|| {
                RallyError::protocol(operation, g, "value type differs from the generation in progress")
            })?;
        if let Some(step) = step {
            if slot.state != SlotState::Empty {
                return Err(RallyError::protocol(
                    operation,
                    g,
                    "a producer already contributed to this generation",
                ));
            }
            step(data, site)?;
            slot.state = SlotState::Producing;
        }

        slot.checked_in[site as usize] = true;
        slot.arrived += 1;
        let ready = slot.ready.subscribe();
        tracing::debug!(
            name = %self.name,
            site,
            generation = g,
            arrived = slot.arrived,
            num_sites = self.num_sites,
            "communicator: checked in"
        );

        if slot.arrived == self.num_sites {
            slot.state = SlotState::Finalized;
            slot.ready.send_replace(true);
            tracing::debug!(name = %self.name, generation = g, "communicator: finalized");
        }
        Ok(ready)
    }

    fn deliver<D, R, F>(
        &self,
        operation: &str,
        site: Site,
        generation: Generation,
        finalizer: F,
    ) -> Result<R>
    where
        D: Send + 'static,
        F: FnOnce(&mut Vec<Option<D>>, &mut bool, Site) -> Result<R>,
    {
        let g = generation.get();
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let slot = state
            .slots
            .get_mut(&g)
            .ok_or_else(|| RallyError::protocol(operation, g, "slot vanished before delivery"))?;
        let data = slot
            .data
            .downcast_mut::<Vec<Option<D>>>()
            .ok_or_else(|| {
                RallyError::protocol(operation, g, "value type differs from the generation in progress")
            })?;
        let share = finalizer(data, &mut slot.all_done, site);

        slot.delivered += 1;
        if slot.delivered == self.num_sites {
            state.slots.remove(&g);
            state.retire(g, self.retired_limit);
            tracing::debug!(name = %self.name, generation = g, "communicator: generation retired");
        }
        share
    }

    fn lock(&self) -> Result<MutexGuard<'_, ServerState>> {
        self.state
            .lock()
            .map_err(|_| RallyError::LockPoisoned("communicator slots"))
    }
}

impl Component for CommunicatorServer {
    fn type_name(&self) -> &'static str {
        COMMUNICATOR_COMPONENT
    }

    fn num_sites(&self) -> u32 {
        self.num_sites
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Builds `CommunicatorServer`s for the component registry.
pub struct CommunicatorFactory {
    retired_generations: usize,
}

impl CommunicatorFactory {
    pub fn new(retired_generations: usize) -> Self {
        Self {
            retired_generations,
        }
    }
}

impl ComponentFactory for CommunicatorFactory {
    fn type_name(&self) -> &'static str {
        COMMUNICATOR_COMPONENT
    }

    fn create(&self, args: &ComponentArgs) -> Result<Arc<dyn Component>> {
        Ok(Arc::new(CommunicatorServer::new(
            args.name.clone(),
            args.num_sites,
            self.retired_generations,
        )))
    }
}
