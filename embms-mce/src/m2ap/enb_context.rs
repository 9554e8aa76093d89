//! eNB Association Management
//!
//! One context per eNB connected over M2, keyed by SCTP association id
//! with a secondary index on the numeric eNB id announced in M2 Setup.
//! The context tracks the M2 lifecycle state, the advertised MBMS
//! service areas, and the number of MBMS services currently referencing
//! the eNB. That counter is maintained by the registry so it can also
//! complete deferred state transitions when it drains to zero.

use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::debug;

/// eNB M2 lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnbState {
    /// Transport association up, no M2 Setup yet
    #[default]
    Init,
    /// M2 Setup accepted, sessions may be started
    Ready,
    /// A reset is draining the eNB's session references
    Resetting,
    /// Being torn down; removed once the last reference drains
    Shutdown,
}

impl std::fmt::Display for EnbState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnbState::Init => write!(f, "Init"),
            EnbState::Ready => write!(f, "Ready"),
            EnbState::Resetting => write!(f, "Resetting"),
            EnbState::Shutdown => write!(f, "Shutdown"),
        }
    }
}

/// Per-eNB association context.
#[derive(Debug, Clone)]
pub struct M2apEnbContext {
    /// SCTP association id (primary key)
    pub assoc_id: u64,
    /// Numeric eNB id from M2 Setup; None before setup
    pub enb_id: Option<u32>,
    /// eNB display name from M2 Setup
    pub enb_name: Option<String>,
    /// Lifecycle state
    pub state: EnbState,
    /// Negotiated inbound stream count
    pub in_streams: u16,
    /// Negotiated outbound stream count
    pub out_streams: u16,
    /// MBMS service areas advertised by the eNB
    pub service_areas: HashSet<u16>,
    /// MBSFN synchronisation area advertised by the eNB
    pub mbsfn_sync_area: Option<u16>,
    /// Number of MBMS services currently referencing this eNB
    pub active_service_count: u32,
}

impl M2apEnbContext {
    /// Creates a context for a fresh association.
    pub fn new(assoc_id: u64, in_streams: u16, out_streams: u16) -> Self {
        Self {
            assoc_id,
            enb_id: None,
            enb_name: None,
            state: EnbState::Init,
            in_streams,
            out_streams,
            service_areas: HashSet::new(),
            mbsfn_sync_area: None,
            active_service_count: 0,
        }
    }

    /// Applies an accepted M2 Setup Request.
    pub fn on_setup_accepted(
        &mut self,
        enb_id: u32,
        enb_name: Option<String>,
        service_areas: HashSet<u16>,
        mbsfn_sync_area: u16,
    ) {
        self.enb_id = Some(enb_id);
        self.enb_name = enb_name;
        self.service_areas = service_areas;
        self.mbsfn_sync_area = Some(mbsfn_sync_area);
        self.state = EnbState::Ready;
    }

    /// Returns true if the eNB is ready and advertises the given area.
    pub fn serves_area(&self, area: u16) -> bool {
        self.state == EnbState::Ready && self.service_areas.contains(&area)
    }

    /// Returns true if sessions may be started on this eNB.
    pub fn is_ready(&self) -> bool {
        self.state == EnbState::Ready
    }
}

/// Owned snapshot of an eNB context for status reporting.
#[derive(Debug, Clone)]
pub struct EnbContextInfo {
    /// SCTP association id
    pub assoc_id: u64,
    /// Numeric eNB id, if setup completed
    pub enb_id: Option<u32>,
    /// eNB display name
    pub name: Option<String>,
    /// Lifecycle state
    pub state: EnbState,
    /// Number of MBMS services referencing the eNB
    pub active_services: u32,
}

impl From<&M2apEnbContext> for EnbContextInfo {
    fn from(ctx: &M2apEnbContext) -> Self {
        Self {
            assoc_id: ctx.assoc_id,
            enb_id: ctx.enb_id,
            name: ctx.enb_name.clone(),
            state: ctx.state,
            active_services: ctx.active_service_count,
        }
    }
}

/// eNB registry errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnbRegistryError {
    /// The association exists but is in a state that must not be
    /// silently resurrected.
    #[error("association {assoc_id} rejected in state {state}")]
    AssociationRejected {
        /// Association id
        assoc_id: u64,
        /// State that caused the rejection
        state: EnbState,
    },
}

/// Keyed store of eNB association contexts.
#[derive(Debug, Default)]
pub struct EnbRegistry {
    enbs: HashMap<u64, M2apEnbContext>,
    by_enb_id: HashMap<u32, u64>,
}

impl EnbRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or refreshes the context for a transport association.
    ///
    /// A new association starts in `Init`. An existing entry in
    /// `Resetting` or `Shutdown` rejects the call; otherwise only the
    /// stream counts are refreshed.
    pub fn upsert_on_association(
        &mut self,
        assoc_id: u64,
        in_streams: u16,
        out_streams: u16,
    ) -> Result<&mut M2apEnbContext, EnbRegistryError> {
        if let Some(ctx) = self.enbs.get(&assoc_id) {
            if matches!(ctx.state, EnbState::Resetting | EnbState::Shutdown) {
                return Err(EnbRegistryError::AssociationRejected {
                    assoc_id,
                    state: ctx.state,
                });
            }
        }

        let ctx = self
            .enbs
            .entry(assoc_id)
            .or_insert_with(|| M2apEnbContext::new(assoc_id, in_streams, out_streams));
        ctx.in_streams = in_streams;
        ctx.out_streams = out_streams;
        Ok(ctx)
    }

    /// Looks up a context by association id.
    pub fn find(&self, assoc_id: u64) -> Option<&M2apEnbContext> {
        self.enbs.get(&assoc_id)
    }

    /// Looks up a mutable context by association id.
    pub fn find_mut(&mut self, assoc_id: u64) -> Option<&mut M2apEnbContext> {
        self.enbs.get_mut(&assoc_id)
    }

    /// Returns the association currently bound to a numeric eNB id.
    pub fn assoc_for_enb_id(&self, enb_id: u32) -> Option<u64> {
        self.by_enb_id.get(&enb_id).copied()
    }

    /// Looks up a context by numeric eNB id.
    pub fn find_by_enb_id(&self, enb_id: u32) -> Option<&M2apEnbContext> {
        self.assoc_for_enb_id(enb_id).and_then(|a| self.find(a))
    }

    /// Binds a numeric eNB id to an association (on accepted setup).
    pub fn bind_enb_id(&mut self, assoc_id: u64, enb_id: u32) {
        self.by_enb_id.insert(enb_id, assoc_id);
    }

    /// Removes a context, clearing the secondary index.
    pub fn remove(&mut self, assoc_id: u64) -> Option<M2apEnbContext> {
        let ctx = self.enbs.remove(&assoc_id)?;
        if let Some(enb_id) = ctx.enb_id {
            if self.by_enb_id.get(&enb_id) == Some(&assoc_id) {
                self.by_enb_id.remove(&enb_id);
            }
        }
        Some(ctx)
    }

    /// Associations of ready eNBs advertising the given service area.
    pub fn assoc_ids_serving_area(&self, area: u16) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .enbs
            .values()
            .filter(|ctx| ctx.serves_area(area))
            .map(|ctx| ctx.assoc_id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Records that one more MBMS service references this eNB.
    pub fn note_service_attached(&mut self, assoc_id: u64) {
        if let Some(ctx) = self.enbs.get_mut(&assoc_id) {
            ctx.active_service_count += 1;
        }
    }

    /// Records that one MBMS service stopped referencing this eNB and
    /// completes any state transition waiting on the counter draining:
    /// `Resetting` falls back to `Init`, `Shutdown` removes the entry.
    pub fn note_service_detached(&mut self, assoc_id: u64) {
        let Some(ctx) = self.enbs.get_mut(&assoc_id) else {
            return;
        };
        ctx.active_service_count = ctx.active_service_count.saturating_sub(1);
        if ctx.active_service_count > 0 {
            return;
        }
        match ctx.state {
            EnbState::Resetting => {
                debug!("eNB assoc_id {} reset complete, back to Init", assoc_id);
                ctx.state = EnbState::Init;
            }
            EnbState::Shutdown => {
                debug!("eNB assoc_id {} drained, removing", assoc_id);
                self.remove(assoc_id);
            }
            _ => {}
        }
    }

    /// Number of tracked associations.
    pub fn len(&self) -> usize {
        self.enbs.len()
    }

    /// Returns true if no association is tracked.
    pub fn is_empty(&self) -> bool {
        self.enbs.is_empty()
    }

    /// Iterates over all contexts.
    pub fn iter(&self) -> impl Iterator<Item = &M2apEnbContext> {
        self.enbs.values()
    }

    /// Owned snapshots of every context, for use outside the core task.
    pub fn snapshot(&self) -> Vec<EnbContextInfo> {
        self.enbs.values().map(EnbContextInfo::from).collect()
    }
}
