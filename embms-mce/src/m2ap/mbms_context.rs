//! MBMS Service Management
//!
//! One context per active broadcast bearer service, keyed by the
//! MCE-allocated 24-bit MCE-MBMS-M2AP-ID with a secondary index on
//! (TMGI, service area). The per-eNB map records, for every eNB that
//! accepted the session, the eNB-local MBMS id from its Start response;
//! cross-references to the eNB registry are by association id only.
//!
//! A deferred Start or Update is held as a [`PendingSessionAction`]
//! owning the timer task; dropping the action (supersede, stop, service
//! destruction) aborts the timer, so a fired timer can never observe a
//! freed service.

use std::collections::HashMap;
use std::time::SystemTime;

use thiserror::Error;
use tokio::task::JoinHandle;

use embms_m2ap::procedures::{BearerQos, Tmgi, TnlInformation};
use embms_m2ap::{INVALID_MCE_MBMS_M2AP_ID, MCE_MBMS_M2AP_ID_MAX};

/// MBMS service lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbmsServiceState {
    /// Deferred timer armed, nothing sent on the wire yet
    Pending,
    /// At least one Session Start was sent
    Active,
    /// An update reconciliation is in flight
    Updating,
}

impl std::fmt::Display for MbmsServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MbmsServiceState::Pending => write!(f, "Pending"),
            MbmsServiceState::Active => write!(f, "Active"),
            MbmsServiceState::Updating => write!(f, "Updating"),
        }
    }
}

/// What a deferred timer will do when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingActionKind {
    /// Fan out Session Start
    Start,
    /// Run update reconciliation
    Update,
}

/// A scheduled Start or Update owned by its service.
///
/// The timer task is aborted when this value is dropped.
#[derive(Debug)]
pub struct PendingSessionAction {
    /// What will happen when the timer fires
    pub kind: PendingActionKind,
    /// Absolute fire time
    pub fire_at: SystemTime,
    handle: JoinHandle<()>,
}

impl PendingSessionAction {
    /// Wraps a spawned timer task.
    pub fn new(kind: PendingActionKind, fire_at: SystemTime, handle: JoinHandle<()>) -> Self {
        Self {
            kind,
            fire_at,
            handle,
        }
    }
}

impl Drop for PendingSessionAction {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Per-service context.
#[derive(Debug)]
pub struct MbmsServiceContext {
    /// MCE allocated 24-bit service id (primary key)
    pub mce_mbms_m2ap_id: u32,
    /// Broadcast service identity
    pub tmgi: Tmgi,
    /// Current MBMS service area
    pub service_area: u16,
    /// Bearer level QoS
    pub qos: BearerQos,
    /// Downlink transport addressing
    pub tnl: TnlInformation,
    /// Association id -> eNB-local MBMS id, one entry per accepting eNB
    pub enb_refs: HashMap<u64, u16>,
    /// Lifecycle state
    pub state: MbmsServiceState,
    /// At most one outstanding deferred action
    pub pending: Option<PendingSessionAction>,
}

impl MbmsServiceContext {
    /// Creates a context with no eNB references yet.
    pub fn new(
        mce_mbms_m2ap_id: u32,
        tmgi: Tmgi,
        service_area: u16,
        qos: BearerQos,
        tnl: TnlInformation,
        state: MbmsServiceState,
    ) -> Self {
        Self {
            mce_mbms_m2ap_id,
            tmgi,
            service_area,
            qos,
            tnl,
            enb_refs: HashMap::new(),
            state,
            pending: None,
        }
    }

    /// Cancels an armed deferred action, if any. Returns whether one
    /// was cancelled.
    pub fn cancel_pending(&mut self) -> bool {
        self.pending.take().is_some()
    }
}

/// Owned snapshot of a service for status reporting.
#[derive(Debug, Clone)]
pub struct MbmsServiceInfo {
    /// MCE MBMS service id
    pub mce_mbms_m2ap_id: u32,
    /// Broadcast service identity
    pub tmgi: Tmgi,
    /// Current service area
    pub service_area: u16,
    /// Lifecycle state
    pub state: MbmsServiceState,
    /// Number of eNBs carrying the session
    pub enb_count: usize,
}

impl From<&MbmsServiceContext> for MbmsServiceInfo {
    fn from(ctx: &MbmsServiceContext) -> Self {
        Self {
            mce_mbms_m2ap_id: ctx.mce_mbms_m2ap_id,
            tmgi: ctx.tmgi,
            service_area: ctx.service_area,
            state: ctx.state,
            enb_count: ctx.enb_refs.len(),
        }
    }
}

/// MBMS service registry errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MbmsRegistryError {
    /// Every 24-bit id is currently allocated
    #[error("MCE MBMS M2AP id space exhausted")]
    IdSpaceExhausted,
}

/// Keyed store of MBMS service contexts.
#[derive(Debug, Default)]
pub struct MbmsServiceRegistry {
    services: HashMap<u32, MbmsServiceContext>,
    by_tmgi_area: HashMap<(Tmgi, u16), u32>,
    next_id: u32,
}

impl MbmsServiceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            services: HashMap::new(),
            by_tmgi_area: HashMap::new(),
            next_id: 1,
        }
    }

    fn advance(candidate: u32) -> u32 {
        let next = candidate + 1;
        if next == 0 || next >= INVALID_MCE_MBMS_M2AP_ID {
            1
        } else {
            next
        }
    }

    /// Allocates a 24-bit id not currently in use.
    ///
    /// The counter wraps around the 24-bit space skipping zero and the
    /// invalid sentinel; ids still allocated after wraparound are
    /// skipped, and a full scan without a free id is an error rather
    /// than a silent collision.
    pub fn allocate_id(&mut self) -> Result<u32, MbmsRegistryError> {
        for _ in 0..=MCE_MBMS_M2AP_ID_MAX {
            let candidate = self.next_id;
            self.next_id = Self::advance(candidate);
            if !self.services.contains_key(&candidate) {
                return Ok(candidate);
            }
        }
        Err(MbmsRegistryError::IdSpaceExhausted)
    }

    /// Inserts a service, indexing it by (TMGI, area).
    pub fn insert(&mut self, ctx: MbmsServiceContext) {
        self.by_tmgi_area
            .insert((ctx.tmgi, ctx.service_area), ctx.mce_mbms_m2ap_id);
        self.services.insert(ctx.mce_mbms_m2ap_id, ctx);
    }

    /// Looks up a service by id.
    pub fn get(&self, id: u32) -> Option<&MbmsServiceContext> {
        self.services.get(&id)
    }

    /// Looks up a mutable service by id.
    pub fn get_mut(&mut self, id: u32) -> Option<&mut MbmsServiceContext> {
        self.services.get_mut(&id)
    }

    /// Finds the service id for a (TMGI, area) pair.
    pub fn find_by_tmgi_area(&self, tmgi: Tmgi, area: u16) -> Option<u32> {
        self.by_tmgi_area.get(&(tmgi, area)).copied()
    }

    /// Moves a service to a new area in the secondary index.
    pub fn reindex_area(&mut self, id: u32, new_area: u16) {
        let Some(ctx) = self.services.get_mut(&id) else {
            return;
        };
        let old_key = (ctx.tmgi, ctx.service_area);
        if self.by_tmgi_area.get(&old_key) == Some(&id) {
            self.by_tmgi_area.remove(&old_key);
        }
        ctx.service_area = new_area;
        self.by_tmgi_area.insert((ctx.tmgi, new_area), id);
    }

    /// Removes a service, dropping any armed timer with it.
    pub fn remove(&mut self, id: u32) -> Option<MbmsServiceContext> {
        let ctx = self.services.remove(&id)?;
        let key = (ctx.tmgi, ctx.service_area);
        if self.by_tmgi_area.get(&key) == Some(&id) {
            self.by_tmgi_area.remove(&key);
        }
        Some(ctx)
    }

    /// All service ids currently allocated.
    pub fn ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.services.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of services.
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Returns true if no service is tracked.
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Iterates over all services.
    pub fn iter(&self) -> impl Iterator<Item = &MbmsServiceContext> {
        self.services.values()
    }

    /// Owned snapshots of every service, for use outside the core task.
    pub fn snapshot(&self) -> Vec<MbmsServiceInfo> {
        self.services.values().map(MbmsServiceInfo::from).collect()
    }
}
