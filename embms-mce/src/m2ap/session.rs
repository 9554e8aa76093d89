//! MBMS session lifecycle
//!
//! Start, update and stop orchestration across every eNB serving the
//! target area. A start or update carrying an absolute time is held as
//! a pending action on the service and executed when the timer fires;
//! a newer command for the same service supersedes the armed action.
//! All handlers run on the M2AP task, so each command is applied to
//! the registries atomically with respect to inbound traffic.

use std::collections::HashSet;
use std::time::{Duration, SystemTime};

use tracing::{debug, error, info, warn};

use embms_m2ap::procedures::{
    SessionStartFailure, SessionStartRequest, SessionStartResponse, SessionStopRequest,
    SessionStopResponse, SessionUpdateFailure, SessionUpdateRequest, SessionUpdateResponse,
};
use embms_m2ap::{codec, InitiatingMessage, M2apPdu, MBMS_SERVICE_STREAM};

use crate::m2ap::mbms_context::{MbmsServiceContext, MbmsServiceState, PendingActionKind,
    PendingSessionAction};
use crate::m2ap::task::M2apTask;
use crate::tasks::{M2apMessage, SessionStartCommand, SessionStopCommand, SessionUpdateCommand};

impl M2apTask {
    // ========================================================================
    // Session Start
    // ========================================================================

    pub(crate) async fn handle_session_start(&mut self, cmd: SessionStartCommand) {
        if let Some(existing) = self
            .services
            .find_by_tmgi_area(cmd.tmgi, cmd.service_area)
        {
            // A start for a running session means the upstream lost
            // track of it; replace rather than reject.
            warn!(
                "{} already running in area {} as service {:#08x}, replacing",
                cmd.tmgi, cmd.service_area, existing
            );
            self.stop_service(existing).await;
        }

        if cmd.start_time.is_none()
            && self.enbs.assoc_ids_serving_area(cmd.service_area).is_empty()
        {
            warn!(
                "no ready eNB serves area {}, dropping start of {}",
                cmd.service_area, cmd.tmgi
            );
            return;
        }

        let id = match self.services.allocate_id() {
            Ok(id) => id,
            Err(err) => {
                error!("cannot start {}: {}", cmd.tmgi, err);
                return;
            }
        };
        self.services.insert(MbmsServiceContext::new(
            id,
            cmd.tmgi,
            cmd.service_area,
            cmd.qos,
            cmd.tnl,
            MbmsServiceState::Pending,
        ));
        info!(
            "MBMS service {:#08x} created for {} in area {}",
            id, cmd.tmgi, cmd.service_area
        );

        match cmd.start_time {
            Some(at) => self.arm_timer(id, PendingActionKind::Start, at),
            None => self.fan_out_start(id).await,
        }
    }

    /// Sends the Session Start Request to every eNB currently serving
    /// the service's area. Eligibility is resolved at send time, so a
    /// deferred start reaches eNBs that completed setup after the
    /// start command arrived.
    pub(crate) async fn fan_out_start(&mut self, id: u32) {
        let (tmgi, service_area, qos, tnl) = {
            let Some(svc) = self.services.get_mut(id) else {
                return;
            };
            svc.cancel_pending();
            (svc.tmgi, svc.service_area, svc.qos, svc.tnl)
        };

        let eligible = self.enbs.assoc_ids_serving_area(service_area);
        if eligible.is_empty() {
            warn!(
                "no ready eNB serves area {} anymore, destroying MBMS service {:#08x}",
                service_area, id
            );
            self.destroy_service(id);
            return;
        }

        let request = M2apPdu::Initiating(InitiatingMessage::SessionStartRequest(
            SessionStartRequest {
                mce_mbms_m2ap_id: id,
                tmgi,
                service_area,
                qos,
                tnl,
            },
        ));
        let data = codec::encode(&request);
        info!(
            "starting {} ({:#08x}) on {} eNBs in area {}",
            tmgi,
            id,
            eligible.len(),
            service_area
        );
        for assoc_id in eligible {
            self.send_raw(assoc_id, MBMS_SERVICE_STREAM, data.clone()).await;
        }

        if let Some(svc) = self.services.get_mut(id) {
            svc.state = MbmsServiceState::Active;
        }
    }

    pub(crate) fn handle_session_start_response(
        &mut self,
        assoc_id: u64,
        resp: SessionStartResponse,
    ) {
        let Some(svc) = self.services.get_mut(resp.mce_mbms_m2ap_id) else {
            warn!(
                "Session Start Response from association {} for unknown service {:#08x}",
                assoc_id, resp.mce_mbms_m2ap_id
            );
            return;
        };
        if self.enbs.find(assoc_id).is_none() {
            warn!(
                "Session Start Response for service {:#08x} from departed association {}",
                resp.mce_mbms_m2ap_id, assoc_id
            );
            return;
        }
        if svc.enb_refs.insert(assoc_id, resp.enb_mbms_m2ap_id).is_none() {
            self.enbs.note_service_attached(assoc_id);
            debug!(
                "association {} carries MBMS service {:#08x} as eNB id {}",
                assoc_id, resp.mce_mbms_m2ap_id, resp.enb_mbms_m2ap_id
            );
        } else {
            debug!(
                "duplicate Session Start Response from association {} for service {:#08x}",
                assoc_id, resp.mce_mbms_m2ap_id
            );
        }
    }

    pub(crate) fn handle_session_start_failure(&mut self, assoc_id: u64, fail: SessionStartFailure) {
        warn!(
            "association {} failed to start MBMS service {:#08x}: {}",
            assoc_id, fail.mce_mbms_m2ap_id, fail.cause
        );
    }

    // ========================================================================
    // Session Update
    // ========================================================================

    pub(crate) async fn handle_session_update(&mut self, cmd: SessionUpdateCommand) {
        let Some(id) = self
            .services
            .find_by_tmgi_area(cmd.tmgi, cmd.old_service_area)
        else {
            warn!(
                "update for unknown session {} in area {}",
                cmd.tmgi, cmd.old_service_area
            );
            return;
        };

        let was_pending = {
            let Some(svc) = self.services.get_mut(id) else {
                return;
            };
            let unchanged = cmd.new_service_area == svc.service_area
                && cmd.qos == svc.qos
                && cmd.tnl == svc.tnl
                && cmd.update_time.is_none();
            if unchanged {
                debug!("update of MBMS service {:#08x} changes nothing, ignoring", id);
                return;
            }
            svc.cancel_pending();
            svc.qos = cmd.qos;
            svc.tnl = cmd.tnl;
            svc.state == MbmsServiceState::Pending
        };
        if cmd.new_service_area != cmd.old_service_area {
            self.services.reindex_area(id, cmd.new_service_area);
        }
        info!(
            "updating MBMS service {:#08x} ({}) in area {}",
            id, cmd.tmgi, cmd.new_service_area
        );

        // A service that never started has nothing to reconcile; the
        // update just re-schedules its start with the new parameters.
        match (was_pending, cmd.update_time) {
            (true, Some(at)) => self.arm_timer(id, PendingActionKind::Start, at),
            (true, None) => self.fan_out_start(id).await,
            (false, Some(at)) => self.arm_timer(id, PendingActionKind::Update, at),
            (false, None) => self.reconcile(id).await,
        }
    }

    /// Re-resolves eligibility for the service's area and sends each
    /// eNB the procedure matching its transition: Stop for eNBs no
    /// longer eligible, Update for eNBs that keep carrying the session,
    /// Start for newly eligible ones.
    pub(crate) async fn reconcile(&mut self, id: u32) {
        let (tmgi, service_area, qos, tnl, refs) = {
            let Some(svc) = self.services.get_mut(id) else {
                return;
            };
            svc.cancel_pending();
            svc.state = MbmsServiceState::Updating;
            let refs: Vec<(u64, u16)> =
                svc.enb_refs.iter().map(|(&a, &e)| (a, e)).collect();
            (svc.tmgi, svc.service_area, svc.qos, svc.tnl, refs)
        };

        let eligible_vec = self.enbs.assoc_ids_serving_area(service_area);
        let eligible: HashSet<u64> = eligible_vec.iter().copied().collect();
        let referenced: HashSet<u64> = refs.iter().map(|&(a, _)| a).collect();

        for &(assoc_id, enb_mbms_m2ap_id) in
            refs.iter().filter(|(a, _)| !eligible.contains(a))
        {
            debug!(
                "association {} leaves MBMS service {:#08x} after area change",
                assoc_id, id
            );
            let stop = M2apPdu::Initiating(InitiatingMessage::SessionStopRequest(
                SessionStopRequest {
                    mce_mbms_m2ap_id: id,
                    enb_mbms_m2ap_id,
                },
            ));
            self.send_pdu(assoc_id, MBMS_SERVICE_STREAM, &stop).await;
            if let Some(svc) = self.services.get_mut(id) {
                svc.enb_refs.remove(&assoc_id);
            }
            self.enbs.note_service_detached(assoc_id);
        }

        for &(assoc_id, enb_mbms_m2ap_id) in
            refs.iter().filter(|(a, _)| eligible.contains(a))
        {
            let update = M2apPdu::Initiating(InitiatingMessage::SessionUpdateRequest(
                SessionUpdateRequest {
                    mce_mbms_m2ap_id: id,
                    enb_mbms_m2ap_id,
                    tmgi,
                    service_area,
                    qos,
                    tnl,
                },
            ));
            self.send_pdu(assoc_id, MBMS_SERVICE_STREAM, &update).await;
        }

        let newcomers: Vec<u64> = eligible_vec
            .into_iter()
            .filter(|a| !referenced.contains(a))
            .collect();
        let has_newcomers = !newcomers.is_empty();
        if has_newcomers {
            let request = M2apPdu::Initiating(InitiatingMessage::SessionStartRequest(
                SessionStartRequest {
                    mce_mbms_m2ap_id: id,
                    tmgi,
                    service_area,
                    qos,
                    tnl,
                },
            ));
            let data = codec::encode(&request);
            for assoc_id in newcomers {
                self.send_raw(assoc_id, MBMS_SERVICE_STREAM, data.clone()).await;
            }
        }

        let orphaned = self
            .services
            .get(id)
            .map_or(true, |svc| svc.enb_refs.is_empty() && !has_newcomers);
        if orphaned {
            warn!(
                "MBMS service {:#08x} has no eligible eNB after update, destroying",
                id
            );
            self.destroy_service(id);
        } else if let Some(svc) = self.services.get_mut(id) {
            svc.state = MbmsServiceState::Active;
        }
    }

    pub(crate) fn handle_session_update_response(
        &mut self,
        assoc_id: u64,
        resp: SessionUpdateResponse,
    ) {
        debug!(
            "association {} applied update of MBMS service {:#08x}",
            assoc_id, resp.mce_mbms_m2ap_id
        );
    }

    pub(crate) fn handle_session_update_failure(
        &mut self,
        assoc_id: u64,
        fail: SessionUpdateFailure,
    ) {
        warn!(
            "association {} failed to update MBMS service {:#08x}: {}",
            assoc_id, fail.mce_mbms_m2ap_id, fail.cause
        );
        let id = fail.mce_mbms_m2ap_id;
        let emptied = {
            let Some(svc) = self.services.get_mut(id) else {
                return;
            };
            if svc.enb_refs.remove(&assoc_id).is_none() {
                return;
            }
            self.enbs.note_service_detached(assoc_id);
            svc.enb_refs.is_empty() && svc.state != MbmsServiceState::Pending
        };
        if emptied {
            warn!("MBMS service {:#08x} lost its last eNB, destroying", id);
            self.destroy_service(id);
        }
    }

    // ========================================================================
    // Session Stop
    // ========================================================================

    pub(crate) async fn handle_session_stop(&mut self, cmd: SessionStopCommand) {
        let Some(id) = self
            .services
            .find_by_tmgi_area(cmd.tmgi, cmd.service_area)
        else {
            // Stopping a session that is already gone is a no-op.
            debug!(
                "stop for {} in area {} matches no session",
                cmd.tmgi, cmd.service_area
            );
            return;
        };
        info!("stopping MBMS service {:#08x} ({})", id, cmd.tmgi);
        self.stop_service(id).await;
    }

    pub(crate) fn handle_session_stop_response(&mut self, assoc_id: u64, resp: SessionStopResponse) {
        debug!(
            "association {} confirmed stop of MBMS service {:#08x}",
            assoc_id, resp.mce_mbms_m2ap_id
        );
    }

    /// Sends a Session Stop Request to every eNB carrying the service,
    /// then destroys it.
    pub(crate) async fn stop_service(&mut self, id: u32) {
        let refs: Vec<(u64, u16)> = match self.services.get(id) {
            Some(svc) => svc.enb_refs.iter().map(|(&a, &e)| (a, e)).collect(),
            None => return,
        };
        for (assoc_id, enb_mbms_m2ap_id) in refs {
            let stop = M2apPdu::Initiating(InitiatingMessage::SessionStopRequest(
                SessionStopRequest {
                    mce_mbms_m2ap_id: id,
                    enb_mbms_m2ap_id,
                },
            ));
            self.send_pdu(assoc_id, MBMS_SERVICE_STREAM, &stop).await;
        }
        self.destroy_service(id);
    }

    /// Removes the service, releasing every eNB reference it still
    /// holds and aborting any armed timer.
    pub(crate) fn destroy_service(&mut self, id: u32) {
        if let Some(ctx) = self.services.remove(id) {
            for assoc_id in ctx.enb_refs.keys() {
                self.enbs.note_service_detached(*assoc_id);
            }
            debug!("MBMS service {:#08x} destroyed", id);
        }
    }

    // ========================================================================
    // Deferred actions
    // ========================================================================

    pub(crate) fn arm_timer(&mut self, id: u32, kind: PendingActionKind, at: SystemTime) {
        let delay = at
            .duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO);
        let tx = self.task_base.m2ap_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx
                .send(M2apMessage::ActionTimerExpired {
                    mce_mbms_m2ap_id: id,
                })
                .await;
        });
        if let Some(svc) = self.services.get_mut(id) {
            debug!("MBMS service {:#08x} {:?} deferred by {:?}", id, kind, delay);
            svc.pending = Some(PendingSessionAction::new(kind, at, handle));
        } else {
            handle.abort();
        }
    }

    pub(crate) async fn handle_action_timer_expired(&mut self, id: u32) {
        let kind = {
            let Some(svc) = self.services.get_mut(id) else {
                debug!("timer fired for vanished MBMS service {:#08x}", id);
                return;
            };
            match svc.pending.take() {
                Some(action) => action.kind,
                None => {
                    debug!("stale timer for MBMS service {:#08x}", id);
                    return;
                }
            }
        };
        match kind {
            PendingActionKind::Start => self.fan_out_start(id).await,
            PendingActionKind::Update => self.reconcile(id).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::m2ap::test_support::{sample_qos, TestHarness};
    use crate::tasks::TaskMessage;
    use embms_m2ap::procedures::{GbrQosInfo, TnlInformation};
    use rand::seq::SliceRandom;
    use rand::Rng;
    use std::net::{IpAddr, Ipv4Addr};

    fn start_cmd(h: &mut TestHarness, area: u16) -> SessionStartCommand {
        SessionStartCommand {
            tmgi: h.next_tmgi(),
            service_area: area,
            qos: sample_qos(),
            tnl: TnlInformation::unspecified(),
            start_time: None,
        }
    }

    #[tokio::test]
    async fn test_start_fans_out_to_serving_enbs() {
        let mut h = TestHarness::new();
        h.ready_enb(1, 0x1001, &[7]).await;
        h.ready_enb(2, 0x1002, &[7, 9]).await;
        h.ready_enb(3, 0x1003, &[9]).await;

        let cmd = start_cmd(&mut h, 7);
        let tmgi = cmd.tmgi;
        h.task.dispatch(M2apMessage::SessionStart(cmd)).await;

        let sent = h.queued_pdus();
        let targets: Vec<u64> = sent.iter().map(|(a, _, _)| *a).collect();
        assert_eq!(targets, vec![1, 2]);
        for (_, stream, pdu) in &sent {
            assert_eq!(*stream, MBMS_SERVICE_STREAM);
            match pdu {
                M2apPdu::Initiating(InitiatingMessage::SessionStartRequest(req)) => {
                    assert_eq!(req.tmgi, tmgi);
                    assert_eq!(req.service_area, 7);
                }
                other => panic!("unexpected PDU: {other}"),
            }
        }

        let id = h.task.services.find_by_tmgi_area(tmgi, 7).unwrap();
        assert_eq!(h.task.services.get(id).unwrap().state, MbmsServiceState::Active);

        h.start_response(1, id, 100).await;
        h.start_response(2, id, 200).await;
        assert_eq!(h.task.services.get(id).unwrap().enb_refs.len(), 2);
        h.assert_counters_consistent();
    }

    #[tokio::test]
    async fn test_start_without_serving_enb_is_dropped() {
        let mut h = TestHarness::new();
        h.ready_enb(1, 0x1001, &[9]).await;

        let cmd = start_cmd(&mut h, 7);
        h.task.dispatch(M2apMessage::SessionStart(cmd)).await;
        assert!(h.task.services.is_empty());
        assert!(h.queued_pdus().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_start_replaces_running_session() {
        let mut h = TestHarness::new();
        h.ready_enb(1, 0x1001, &[7]).await;
        let old_id = h.active_service(7, &[(1, 100)]).await;

        let old = h.task.services.get(old_id).unwrap();
        let cmd = SessionStartCommand {
            tmgi: old.tmgi,
            service_area: 7,
            qos: sample_qos(),
            tnl: TnlInformation::unspecified(),
            start_time: None,
        };
        h.task.dispatch(M2apMessage::SessionStart(cmd)).await;

        let sent = h.queued_pdus();
        assert!(matches!(
            sent[0].2,
            M2apPdu::Initiating(InitiatingMessage::SessionStopRequest(ref stop))
                if stop.mce_mbms_m2ap_id == old_id && stop.enb_mbms_m2ap_id == 100
        ));
        assert!(matches!(
            sent[1].2,
            M2apPdu::Initiating(InitiatingMessage::SessionStartRequest(_))
        ));

        assert!(h.task.services.get(old_id).is_none());
        assert_eq!(h.task.services.len(), 1);
        h.assert_counters_consistent();
    }

    #[tokio::test]
    async fn test_duplicate_start_response_counted_once() {
        let mut h = TestHarness::new();
        h.ready_enb(1, 0x1001, &[7]).await;
        let id = h.active_service(7, &[(1, 100)]).await;

        h.start_response(1, id, 100).await;
        assert_eq!(h.task.enbs.find(1).unwrap().active_service_count, 1);
        h.assert_counters_consistent();
    }

    #[tokio::test]
    async fn test_start_response_from_departed_enb_ignored() {
        let mut h = TestHarness::new();
        h.ready_enb(1, 0x1001, &[7]).await;
        h.ready_enb(2, 0x1002, &[7]).await;

        let cmd = start_cmd(&mut h, 7);
        let tmgi = cmd.tmgi;
        h.task.dispatch(M2apMessage::SessionStart(cmd)).await;
        let id = h.task.services.find_by_tmgi_area(tmgi, 7).unwrap();
        h.drain();

        // Association 1 is torn down before its response arrives.
        h.task.dispatch(M2apMessage::AssociationDown { assoc_id: 1 }).await;
        h.start_response(1, id, 100).await;

        let svc = h.task.services.get(id).unwrap();
        assert!(!svc.enb_refs.contains_key(&1));

        h.start_response(2, id, 200).await;
        assert_eq!(h.task.services.get(id).unwrap().enb_refs.len(), 1);
        h.assert_counters_consistent();
    }

    #[tokio::test]
    async fn test_update_moves_service_area() {
        let mut h = TestHarness::new();
        h.ready_enb(1, 0x1001, &[7]).await;
        h.ready_enb(2, 0x1002, &[7, 9]).await;
        h.ready_enb(3, 0x1003, &[9]).await;
        let id = h.active_service(7, &[(1, 100), (2, 200)]).await;
        let tmgi = h.task.services.get(id).unwrap().tmgi;

        let cmd = SessionUpdateCommand {
            tmgi,
            old_service_area: 7,
            new_service_area: 9,
            qos: sample_qos(),
            tnl: TnlInformation::unspecified(),
            update_time: None,
        };
        h.task.dispatch(M2apMessage::SessionUpdate(cmd)).await;

        let sent = h.queued_pdus();
        let mut stops = 0;
        let mut updates = 0;
        let mut starts = 0;
        for (assoc_id, stream, pdu) in &sent {
            assert_eq!(*stream, MBMS_SERVICE_STREAM);
            match pdu {
                M2apPdu::Initiating(InitiatingMessage::SessionStopRequest(_)) => {
                    assert_eq!(*assoc_id, 1);
                    stops += 1;
                }
                M2apPdu::Initiating(InitiatingMessage::SessionUpdateRequest(req)) => {
                    assert_eq!(*assoc_id, 2);
                    assert_eq!(req.service_area, 9);
                    assert_eq!(req.enb_mbms_m2ap_id, 200);
                    updates += 1;
                }
                M2apPdu::Initiating(InitiatingMessage::SessionStartRequest(req)) => {
                    assert_eq!(*assoc_id, 3);
                    assert_eq!(req.service_area, 9);
                    starts += 1;
                }
                other => panic!("unexpected PDU: {other}"),
            }
        }
        assert_eq!((stops, updates, starts), (1, 1, 1));

        let svc = h.task.services.get(id).unwrap();
        assert_eq!(svc.service_area, 9);
        assert!(!svc.enb_refs.contains_key(&1));
        assert!(svc.enb_refs.contains_key(&2));
        assert_eq!(h.task.services.find_by_tmgi_area(tmgi, 9), Some(id));
        assert_eq!(h.task.services.find_by_tmgi_area(tmgi, 7), None);
        h.assert_counters_consistent();

        h.start_response(3, id, 300).await;
        h.assert_counters_consistent();
    }

    #[tokio::test]
    async fn test_redundant_update_sends_nothing() {
        let mut h = TestHarness::new();
        h.ready_enb(1, 0x1001, &[7]).await;
        let id = h.active_service(7, &[(1, 100)]).await;
        let tmgi = h.task.services.get(id).unwrap().tmgi;

        let cmd = SessionUpdateCommand {
            tmgi,
            old_service_area: 7,
            new_service_area: 7,
            qos: sample_qos(),
            tnl: TnlInformation::unspecified(),
            update_time: None,
        };
        h.task.dispatch(M2apMessage::SessionUpdate(cmd)).await;

        assert!(h.queued_pdus().is_empty());
        assert_eq!(h.task.services.get(id).unwrap().state, MbmsServiceState::Active);
    }

    #[tokio::test]
    async fn test_update_with_new_qos_reaches_every_carrier() {
        let mut h = TestHarness::new();
        h.ready_enb(1, 0x1001, &[7]).await;
        h.ready_enb(2, 0x1002, &[7]).await;
        let id = h.active_service(7, &[(1, 100), (2, 200)]).await;
        let tmgi = h.task.services.get(id).unwrap().tmgi;

        let mut qos = sample_qos();
        qos.gbr = Some(GbrQosInfo {
            mbr_dl: 2_000_000,
            gbr_dl: 1_000_000,
        });
        let tnl = TnlInformation {
            ip_mc_address: IpAddr::V4(Ipv4Addr::new(239, 1, 1, 1)),
            ip_source_address: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            gtp_dl_teid: 0xDEAD,
        };
        let cmd = SessionUpdateCommand {
            tmgi,
            old_service_area: 7,
            new_service_area: 7,
            qos,
            tnl,
            update_time: None,
        };
        h.task.dispatch(M2apMessage::SessionUpdate(cmd)).await;

        let sent = h.queued_pdus();
        assert_eq!(sent.len(), 2);
        for (_, _, pdu) in &sent {
            match pdu {
                M2apPdu::Initiating(InitiatingMessage::SessionUpdateRequest(req)) => {
                    assert_eq!(req.qos, qos);
                    assert_eq!(req.tnl, tnl);
                }
                other => panic!("unexpected PDU: {other}"),
            }
        }
        let svc = h.task.services.get(id).unwrap();
        assert_eq!(svc.qos, qos);
        assert_eq!(svc.state, MbmsServiceState::Active);
    }

    #[tokio::test]
    async fn test_update_to_unserved_area_destroys_service() {
        let mut h = TestHarness::new();
        h.ready_enb(1, 0x1001, &[7]).await;
        h.ready_enb(2, 0x1002, &[7]).await;
        let id = h.active_service(7, &[(1, 100), (2, 200)]).await;
        let tmgi = h.task.services.get(id).unwrap().tmgi;

        // Area 99 is served by no connected eNB.
        let cmd = SessionUpdateCommand {
            tmgi,
            old_service_area: 7,
            new_service_area: 99,
            qos: sample_qos(),
            tnl: TnlInformation::unspecified(),
            update_time: None,
        };
        h.task.dispatch(M2apMessage::SessionUpdate(cmd)).await;

        let sent = h.queued_pdus();
        assert_eq!(sent.len(), 2);
        for (_, _, pdu) in &sent {
            assert!(matches!(
                pdu,
                M2apPdu::Initiating(InitiatingMessage::SessionStopRequest(stop))
                    if stop.mce_mbms_m2ap_id == id
            ));
        }
        assert!(h.task.services.get(id).is_none());
        h.assert_counters_consistent();
    }

    #[tokio::test]
    async fn test_update_unknown_session_ignored() {
        let mut h = TestHarness::new();
        h.ready_enb(1, 0x1001, &[7]).await;

        let cmd = SessionUpdateCommand {
            tmgi: h.next_tmgi(),
            old_service_area: 7,
            new_service_area: 9,
            qos: sample_qos(),
            tnl: TnlInformation::unspecified(),
            update_time: None,
        };
        h.task.dispatch(M2apMessage::SessionUpdate(cmd)).await;
        assert!(h.queued_pdus().is_empty());
    }

    #[tokio::test]
    async fn test_update_failure_drops_reference() {
        let mut h = TestHarness::new();
        h.ready_enb(1, 0x1001, &[7]).await;
        h.ready_enb(2, 0x1002, &[7]).await;
        let id = h.active_service(7, &[(1, 100), (2, 200)]).await;

        h.task.handle_session_update_failure(
            1,
            SessionUpdateFailure {
                mce_mbms_m2ap_id: id,
                enb_mbms_m2ap_id: 100,
                cause: embms_m2ap::procedures::Cause::RadioNetwork(
                    embms_m2ap::procedures::RadioNetworkCause::RadioResourcesNotAvailable,
                ),
            },
        );

        let svc = h.task.services.get(id).unwrap();
        assert!(!svc.enb_refs.contains_key(&1));
        h.assert_counters_consistent();

        // Losing the last carrier destroys the service.
        h.task.handle_session_update_failure(
            2,
            SessionUpdateFailure {
                mce_mbms_m2ap_id: id,
                enb_mbms_m2ap_id: 200,
                cause: embms_m2ap::procedures::Cause::Misc(
                    embms_m2ap::procedures::MiscCause::HardwareFailure,
                ),
            },
        );
        assert!(h.task.services.get(id).is_none());
        h.assert_counters_consistent();
    }

    #[tokio::test]
    async fn test_stop_sends_stop_to_each_carrier() {
        let mut h = TestHarness::new();
        h.ready_enb(1, 0x1001, &[7]).await;
        h.ready_enb(2, 0x1002, &[7]).await;
        let id = h.active_service(7, &[(1, 100), (2, 200)]).await;
        let tmgi = h.task.services.get(id).unwrap().tmgi;

        h.task
            .dispatch(M2apMessage::SessionStop(SessionStopCommand {
                tmgi,
                service_area: 7,
            }))
            .await;

        let sent = h.queued_pdus();
        assert_eq!(sent.len(), 2);
        for (_, stream, pdu) in &sent {
            assert_eq!(*stream, MBMS_SERVICE_STREAM);
            assert!(matches!(
                pdu,
                M2apPdu::Initiating(InitiatingMessage::SessionStopRequest(stop))
                    if stop.mce_mbms_m2ap_id == id
            ));
        }
        assert!(h.task.services.get(id).is_none());
        h.assert_counters_consistent();
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let mut h = TestHarness::new();
        h.ready_enb(1, 0x1001, &[7]).await;
        let id = h.active_service(7, &[(1, 100)]).await;
        let tmgi = h.task.services.get(id).unwrap().tmgi;

        let cmd = SessionStopCommand {
            tmgi,
            service_area: 7,
        };
        h.task
            .dispatch(M2apMessage::SessionStop(cmd.clone()))
            .await;
        assert_eq!(h.queued_pdus().len(), 1);

        h.task.dispatch(M2apMessage::SessionStop(cmd)).await;
        assert!(h.queued_pdus().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deferred_start_fires_when_timer_expires() {
        let mut h = TestHarness::new();
        h.ready_enb(1, 0x1001, &[7]).await;

        let mut cmd = start_cmd(&mut h, 7);
        cmd.start_time = Some(SystemTime::now() + Duration::from_secs(5));
        let tmgi = cmd.tmgi;
        h.task.dispatch(M2apMessage::SessionStart(cmd)).await;

        let id = h.task.services.find_by_tmgi_area(tmgi, 7).unwrap();
        assert_eq!(h.task.services.get(id).unwrap().state, MbmsServiceState::Pending);
        assert!(h.queued_pdus().is_empty());

        // Paused time auto-advances to the sleep deadline.
        let fired = h.m2ap_rx.recv().await.unwrap();
        match fired {
            TaskMessage::Message(msg) => h.task.dispatch(msg).await,
            other => panic!("unexpected: {other:?}"),
        }

        let sent = h.queued_pdus();
        assert_eq!(sent.len(), 1);
        assert!(matches!(
            sent[0].2,
            M2apPdu::Initiating(InitiatingMessage::SessionStartRequest(_))
        ));
        assert_eq!(h.task.services.get(id).unwrap().state, MbmsServiceState::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deferred_start_covers_late_enbs() {
        let mut h = TestHarness::new();

        // No eNB yet; the deferred start is still accepted.
        let mut cmd = start_cmd(&mut h, 7);
        cmd.start_time = Some(SystemTime::now() + Duration::from_secs(5));
        let tmgi = cmd.tmgi;
        h.task.dispatch(M2apMessage::SessionStart(cmd)).await;
        let id = h.task.services.find_by_tmgi_area(tmgi, 7).unwrap();

        h.ready_enb(1, 0x1001, &[7]).await;

        let fired = h.m2ap_rx.recv().await.unwrap();
        h.task.dispatch(fired.into_message().unwrap()).await;

        assert_eq!(h.task.services.get(id).unwrap().state, MbmsServiceState::Active);
        assert_eq!(h.queued_pdus().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_update_supersedes_deferred_start() {
        let mut h = TestHarness::new();
        h.ready_enb(1, 0x1001, &[7]).await;

        let mut cmd = start_cmd(&mut h, 7);
        cmd.start_time = Some(SystemTime::now() + Duration::from_secs(60));
        let tmgi = cmd.tmgi;
        h.task.dispatch(M2apMessage::SessionStart(cmd)).await;
        let id = h.task.services.find_by_tmgi_area(tmgi, 7).unwrap();

        let update = SessionUpdateCommand {
            tmgi,
            old_service_area: 7,
            new_service_area: 7,
            qos: sample_qos(),
            tnl: TnlInformation {
                ip_mc_address: IpAddr::V4(Ipv4Addr::new(239, 0, 0, 7)),
                ip_source_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                gtp_dl_teid: 7,
            },
            update_time: None,
        };
        h.task.dispatch(M2apMessage::SessionUpdate(update)).await;

        // The pending service starts right away with the new transport.
        let sent = h.queued_pdus();
        assert_eq!(sent.len(), 1);
        match &sent[0].2 {
            M2apPdu::Initiating(InitiatingMessage::SessionStartRequest(req)) => {
                assert_eq!(req.tnl.gtp_dl_teid, 7);
            }
            other => panic!("unexpected PDU: {other}"),
        }
        assert_eq!(h.task.services.get(id).unwrap().state, MbmsServiceState::Active);
        assert!(h.task.services.get(id).unwrap().pending.is_none());

        // The superseded timer never fires.
        tokio::task::yield_now().await;
        assert!(h.m2ap_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deferred_update_applies_when_timer_expires() {
        let mut h = TestHarness::new();
        h.ready_enb(1, 0x1001, &[7]).await;
        let id = h.active_service(7, &[(1, 100)]).await;
        let tmgi = h.task.services.get(id).unwrap().tmgi;

        let mut qos = sample_qos();
        qos.priority_level = 1;
        let cmd = SessionUpdateCommand {
            tmgi,
            old_service_area: 7,
            new_service_area: 7,
            qos,
            tnl: TnlInformation::unspecified(),
            update_time: Some(SystemTime::now() + Duration::from_secs(10)),
        };
        h.task.dispatch(M2apMessage::SessionUpdate(cmd)).await;
        assert!(h.queued_pdus().is_empty());
        assert!(h.task.services.get(id).unwrap().pending.is_some());

        let fired = h.m2ap_rx.recv().await.unwrap();
        h.task.dispatch(fired.into_message().unwrap()).await;

        let sent = h.queued_pdus();
        assert_eq!(sent.len(), 1);
        match &sent[0].2 {
            M2apPdu::Initiating(InitiatingMessage::SessionUpdateRequest(req)) => {
                assert_eq!(req.qos.priority_level, 1);
            }
            other => panic!("unexpected PDU: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_deferred_start() {
        let mut h = TestHarness::new();
        h.ready_enb(1, 0x1001, &[7]).await;

        let mut cmd = start_cmd(&mut h, 7);
        cmd.start_time = Some(SystemTime::now() + Duration::from_secs(30));
        let tmgi = cmd.tmgi;
        h.task.dispatch(M2apMessage::SessionStart(cmd)).await;

        h.task
            .dispatch(M2apMessage::SessionStop(SessionStopCommand {
                tmgi,
                service_area: 7,
            }))
            .await;

        assert!(h.task.services.is_empty());
        assert!(h.queued_pdus().is_empty());
        tokio::task::yield_now().await;
        assert!(h.m2ap_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stale_timer_message_is_ignored() {
        let mut h = TestHarness::new();
        h.ready_enb(1, 0x1001, &[7]).await;

        h.task
            .dispatch(M2apMessage::ActionTimerExpired {
                mce_mbms_m2ap_id: 0x1234,
            })
            .await;
        assert!(h.queued_pdus().is_empty());
    }

    #[tokio::test]
    async fn test_randomized_interleaving_keeps_counters_consistent() {
        let mut h = TestHarness::new();
        h.ready_enb(1, 0x1001, &[7]).await;
        h.ready_enb(2, 0x1002, &[7, 9]).await;
        h.ready_enb(3, 0x1003, &[9]).await;

        let mut rng = rand::thread_rng();
        let mut live: Vec<(u32, u16)> = Vec::new();
        let mut next_enb_id = 1u16;

        for _ in 0..200 {
            match rng.gen_range(0..4) {
                0 => {
                    let area = *[7u16, 9].choose(&mut rng).unwrap();
                    let refs: Vec<(u64, u16)> = h
                        .task
                        .enbs
                        .assoc_ids_serving_area(area)
                        .into_iter()
                        .map(|a| {
                            next_enb_id += 1;
                            (a, next_enb_id)
                        })
                        .collect();
                    let id = h.active_service(area, &refs).await;
                    live.push((id, area));
                }
                1 => {
                    if let Some(idx) = (!live.is_empty()).then(|| rng.gen_range(0..live.len())) {
                        let (id, area) = live.swap_remove(idx);
                        if let Some(svc) = h.task.services.get(id) {
                            let tmgi = svc.tmgi;
                            h.task
                                .dispatch(M2apMessage::SessionStop(SessionStopCommand {
                                    tmgi,
                                    service_area: area,
                                }))
                                .await;
                        }
                    }
                }
                2 => {
                    if let Some(idx) = (!live.is_empty()).then(|| rng.gen_range(0..live.len())) {
                        let (id, area) = live[idx];
                        if let Some(svc) = h.task.services.get(id) {
                            let tmgi = svc.tmgi;
                            let new_area = if area == 7 { 9 } else { 7 };
                            h.task
                                .dispatch(M2apMessage::SessionUpdate(SessionUpdateCommand {
                                    tmgi,
                                    old_service_area: area,
                                    new_service_area: new_area,
                                    qos: sample_qos(),
                                    tnl: TnlInformation::unspecified(),
                                    update_time: None,
                                }))
                                .await;
                            if h.task.services.get(id).is_some() {
                                live[idx] = (id, new_area);
                            } else {
                                live.swap_remove(idx);
                            }
                        }
                    }
                }
                _ => {
                    // A random carrier reports a start response for a
                    // random live service; duplicates must not skew
                    // the counters.
                    if let Some(&(id, area)) = live.choose(&mut rng) {
                        if let Some(assoc) =
                            h.task.enbs.assoc_ids_serving_area(area).first().copied()
                        {
                            next_enb_id += 1;
                            h.start_response(assoc, id, next_enb_id).await;
                        }
                    }
                }
            }
            h.drain();
            live.retain(|&(id, _)| h.task.services.get(id).is_some());
            h.assert_counters_consistent();
        }
    }
}
