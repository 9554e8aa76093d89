//! M2AP task
//!
//! Single owner of all M2 protocol state. Every transport event and
//! every upstream session command arrives through one mailbox and is
//! handled to completion before the next, so the registries need no
//! locking. This module holds the dispatcher and the per-eNB
//! procedures (M2 Setup, Reset, Error Indication); the session
//! lifecycle handlers live in [`super::session`].

use std::collections::HashSet;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use embms_m2ap::procedures::{
    Cause, M2SetupFailure, M2SetupRequest, M2SetupResponse, MbsfnAreaConfig, MiscCause,
    ProtocolCause, Reset, ResetAcknowledge, ResetItem, ResetType, SchedulingInformation,
    SessionStopRequest, TimeToWait,
};
use embms_m2ap::{
    codec, InitiatingMessage, M2apPdu, SuccessfulOutcome, UnsuccessfulOutcome,
    ENB_SIGNALLING_STREAM, INVALID_MCE_MBMS_M2AP_ID, MBMS_SERVICE_STREAM,
};

use crate::m2ap::enb_context::{EnbRegistry, EnbState};
use crate::m2ap::mbms_context::{MbmsServiceRegistry, MbmsServiceState};
use crate::tasks::{M2apMessage, MceTaskBase, SctpMessage, Task, TaskMessage};

/// Common subframe allocation period advertised to every eNB.
const CSA_PERIOD_RF: u16 = 64;

/// The M2AP protocol task.
pub struct M2apTask {
    pub(crate) task_base: MceTaskBase,
    /// Served PLMNs in 3GPP encoded form, for setup validation
    served_plmns: Vec<[u8; 3]>,
    /// MBMS service areas this MCE coordinates
    pub(crate) served_areas: HashSet<u16>,
    pub(crate) enbs: EnbRegistry,
    pub(crate) services: MbmsServiceRegistry,
}

#[async_trait::async_trait]
impl Task for M2apTask {
    type Message = M2apMessage;

    async fn run(&mut self, mut rx: mpsc::Receiver<TaskMessage<M2apMessage>>) {
        info!("M2AP task started");
        while let Some(msg) = rx.recv().await {
            match msg {
                TaskMessage::Message(msg) => self.dispatch(msg).await,
                TaskMessage::Shutdown => break,
            }
        }
        info!("M2AP task stopped");
    }
}

impl M2apTask {
    /// Creates the task from the shared base.
    pub fn new(task_base: MceTaskBase) -> Self {
        let served_plmns = task_base.config.plmns.iter().map(|p| p.encode()).collect();
        let served_areas = task_base
            .config
            .mbms_service_areas
            .iter()
            .copied()
            .collect();
        Self {
            task_base,
            served_plmns,
            served_areas,
            enbs: EnbRegistry::new(),
            services: MbmsServiceRegistry::new(),
        }
    }

    pub(crate) async fn dispatch(&mut self, msg: M2apMessage) {
        match msg {
            M2apMessage::AssociationUp {
                assoc_id,
                in_streams,
                out_streams,
            } => self.handle_association_up(assoc_id, in_streams, out_streams).await,
            M2apMessage::AssociationDown { assoc_id } => {
                self.handle_association_down(assoc_id).await
            }
            M2apMessage::ReceivePdu {
                assoc_id,
                stream,
                data,
            } => self.handle_receive_pdu(assoc_id, stream, data).await,
            M2apMessage::SessionStart(cmd) => self.handle_session_start(cmd).await,
            M2apMessage::SessionUpdate(cmd) => self.handle_session_update(cmd).await,
            M2apMessage::SessionStop(cmd) => self.handle_session_stop(cmd).await,
            M2apMessage::ActionTimerExpired { mce_mbms_m2ap_id } => {
                self.handle_action_timer_expired(mce_mbms_m2ap_id).await
            }
        }
    }

    // ========================================================================
    // Outbound plumbing
    // ========================================================================

    pub(crate) async fn send_pdu(&self, assoc_id: u64, stream: u16, pdu: &M2apPdu) {
        self.send_raw(assoc_id, stream, codec::encode(pdu)).await;
    }

    pub(crate) async fn send_raw(&self, assoc_id: u64, stream: u16, data: Bytes) {
        let msg = SctpMessage::SendPdu {
            assoc_id,
            stream,
            data,
        };
        if self.task_base.sctp_tx.send(msg).await.is_err() {
            warn!("SCTP task gone, dropping outbound PDU");
        }
    }

    pub(crate) async fn close_association(&self, assoc_id: u64) {
        let msg = SctpMessage::CloseAssociation { assoc_id };
        if self.task_base.sctp_tx.send(msg).await.is_err() {
            warn!("SCTP task gone, cannot close association {}", assoc_id);
        }
    }

    // ========================================================================
    // Transport events
    // ========================================================================

    async fn handle_association_up(&mut self, assoc_id: u64, in_streams: u16, out_streams: u16) {
        match self.enbs.upsert_on_association(assoc_id, in_streams, out_streams) {
            Ok(ctx) => {
                info!(
                    "eNB association {} up ({} in / {} out streams), state {}",
                    assoc_id, in_streams, out_streams, ctx.state
                );
            }
            Err(err) => {
                warn!("rejecting association {}: {}", assoc_id, err);
                self.close_association(assoc_id).await;
            }
        }
    }

    async fn handle_association_down(&mut self, assoc_id: u64) {
        info!("eNB association {} down", assoc_id);
        self.remove_enb_cascading(assoc_id).await;
    }

    /// Removes an eNB and every session reference pointing at it.
    /// Services left with no eNB are destroyed unless still pending.
    pub(crate) async fn remove_enb_cascading(&mut self, assoc_id: u64) {
        let referencing: Vec<u32> = self
            .services
            .iter()
            .filter(|svc| svc.enb_refs.contains_key(&assoc_id))
            .map(|svc| svc.mce_mbms_m2ap_id)
            .collect();

        for id in referencing {
            let emptied = {
                let Some(svc) = self.services.get_mut(id) else {
                    continue;
                };
                svc.enb_refs.remove(&assoc_id);
                self.enbs.note_service_detached(assoc_id);
                svc.enb_refs.is_empty() && svc.state != MbmsServiceState::Pending
            };
            if emptied {
                warn!("MBMS service {:#08x} lost its last eNB, destroying", id);
                self.destroy_service(id);
            }
        }

        self.enbs.remove(assoc_id);
    }

    // ========================================================================
    // Inbound dispatch
    // ========================================================================

    async fn handle_receive_pdu(&mut self, assoc_id: u64, stream: u16, data: Bytes) {
        let pdu = match codec::decode(&data) {
            Ok(pdu) => pdu,
            Err(err) => {
                warn!(
                    "undecodable PDU from association {} stream {}: {}",
                    assoc_id, stream, err
                );
                return;
            }
        };
        debug!("rx {} from association {} stream {}", pdu, assoc_id, stream);

        match pdu {
            M2apPdu::Initiating(msg) => match msg {
                InitiatingMessage::M2SetupRequest(req) => {
                    self.handle_m2_setup_request(assoc_id, stream, req).await
                }
                InitiatingMessage::Reset(reset) => self.handle_reset(assoc_id, reset).await,
                InitiatingMessage::ErrorIndication(ind) => {
                    self.handle_error_indication(assoc_id, ind).await
                }
                InitiatingMessage::ServiceCountingResultsReport(report) => {
                    for result in &report.results {
                        info!(
                            "counting report from association {}: mbsfn area {} {} counted {}",
                            assoc_id, report.mbsfn_area_id, result.tmgi, result.counting_result
                        );
                    }
                }
                InitiatingMessage::OverloadNotification(notif) => {
                    info!(
                        "overload notification from association {}: mbsfn area {} is {:?}",
                        assoc_id, notif.mbsfn_area_id, notif.status
                    );
                }
                other => {
                    debug!(
                        "dropping MCE-originated initiating message {:?} from association {}",
                        other.procedure_code(),
                        assoc_id
                    );
                }
            },
            M2apPdu::Successful(msg) => match msg {
                SuccessfulOutcome::SessionStartResponse(resp) => {
                    self.handle_session_start_response(assoc_id, resp)
                }
                SuccessfulOutcome::SessionUpdateResponse(resp) => {
                    self.handle_session_update_response(assoc_id, resp)
                }
                SuccessfulOutcome::SessionStopResponse(resp) => {
                    self.handle_session_stop_response(assoc_id, resp)
                }
                SuccessfulOutcome::SchedulingInformationResponse(_) => {
                    debug!("scheduling information acknowledged by association {}", assoc_id);
                }
                SuccessfulOutcome::ServiceCountingResponse(_) => {
                    debug!("service counting acknowledged by association {}", assoc_id);
                }
                other => {
                    debug!(
                        "dropping unexpected successful outcome {:?} from association {}",
                        other.procedure_code(),
                        assoc_id
                    );
                }
            },
            M2apPdu::Unsuccessful(msg) => match msg {
                UnsuccessfulOutcome::SessionStartFailure(fail) => {
                    self.handle_session_start_failure(assoc_id, fail)
                }
                UnsuccessfulOutcome::SessionUpdateFailure(fail) => {
                    self.handle_session_update_failure(assoc_id, fail)
                }
                UnsuccessfulOutcome::ServiceCountingFailure(fail) => {
                    warn!(
                        "service counting failed at association {}: {}",
                        assoc_id, fail.cause
                    );
                }
                other => {
                    debug!(
                        "dropping unexpected unsuccessful outcome {:?} from association {}",
                        other.procedure_code(),
                        assoc_id
                    );
                }
            },
        }
    }

    // ========================================================================
    // M2 Setup
    // ========================================================================

    async fn handle_m2_setup_request(
        &mut self,
        assoc_id: u64,
        stream: u16,
        req: M2SetupRequest,
    ) {
        if stream != ENB_SIGNALLING_STREAM {
            warn!(
                "M2 Setup Request from association {} on stream {}, rejecting",
                assoc_id, stream
            );
            self.send_setup_failure(assoc_id, Cause::Protocol(ProtocolCause::Unspecified), None)
                .await;
            return;
        }

        if self.enbs.find(assoc_id).is_none() {
            warn!("M2 Setup Request from unknown association {}", assoc_id);
            return;
        }

        if self.enbs.len() > self.task_base.config.max_enbs {
            warn!(
                "rejecting {}: eNB capacity {} reached",
                req.global_enb_id, self.task_base.config.max_enbs
            );
            self.send_setup_failure(
                assoc_id,
                Cause::Misc(MiscCause::ControlProcessingOverload),
                Some(TimeToWait::V20s),
            )
            .await;
            return;
        }

        if !self.served_plmns.contains(&req.global_enb_id.plmn) {
            warn!("rejecting {}: PLMN not served", req.global_enb_id);
            self.send_setup_failure(
                assoc_id,
                Cause::Misc(MiscCause::Unspecified),
                Some(TimeToWait::V20s),
            )
            .await;
            return;
        }

        if req.configured_cells.len() != 1 {
            warn!(
                "rejecting {}: {} configured cells, exactly one supported",
                req.global_enb_id,
                req.configured_cells.len()
            );
            self.send_setup_failure(
                assoc_id,
                Cause::Misc(MiscCause::Unspecified),
                Some(TimeToWait::V20s),
            )
            .await;
            return;
        }

        let advertised: HashSet<u16> = req.advertised_service_areas().collect();
        if advertised.is_disjoint(&self.served_areas) {
            warn!("rejecting {}: no service area in common", req.global_enb_id);
            self.send_setup_failure(
                assoc_id,
                Cause::Misc(MiscCause::Unspecified),
                Some(TimeToWait::V20s),
            )
            .await;
            return;
        }

        let enb_id = req.global_enb_id.enb_id;
        if let Some(old_assoc) = self.enbs.assoc_for_enb_id(enb_id) {
            if old_assoc != assoc_id {
                warn!(
                    "{} already bound to association {}, tearing down stale binding",
                    req.global_enb_id, old_assoc
                );
                self.send_setup_failure(assoc_id, Cause::Misc(MiscCause::Unspecified), None)
                    .await;
                self.remove_enb_cascading(old_assoc).await;
                self.close_association(old_assoc).await;
                return;
            }
        }

        let mbsfn_sync_area = req.configured_cells[0].mbsfn_sync_area;
        if let Some(ctx) = self.enbs.find_mut(assoc_id) {
            ctx.on_setup_accepted(enb_id, req.enb_name.clone(), advertised, mbsfn_sync_area);
        }
        self.enbs.bind_enb_id(assoc_id, enb_id);
        info!(
            "M2 Setup accepted for {} on association {}",
            req.global_enb_id, assoc_id
        );

        let response = M2apPdu::Successful(SuccessfulOutcome::M2SetupResponse(M2SetupResponse {
            mce_id: self.task_base.config.mce_id,
            mce_name: Some(self.task_base.config.name.clone()),
            mbsfn_area_ids: self.task_base.config.mbsfn_area_ids.clone(),
        }));
        self.send_pdu(assoc_id, ENB_SIGNALLING_STREAM, &response).await;

        let scheduling = M2apPdu::Initiating(InitiatingMessage::SchedulingInformation(
            SchedulingInformation {
                mcch_update_time: self.task_base.config.mcch_update_time,
                areas: self
                    .task_base
                    .config
                    .mbsfn_area_ids
                    .iter()
                    .map(|&mbsfn_area_id| MbsfnAreaConfig {
                        mbsfn_area_id,
                        csa_period_rf: CSA_PERIOD_RF,
                    })
                    .collect(),
            },
        ));
        self.send_pdu(assoc_id, ENB_SIGNALLING_STREAM, &scheduling).await;
    }

    async fn send_setup_failure(
        &self,
        assoc_id: u64,
        cause: Cause,
        time_to_wait: Option<TimeToWait>,
    ) {
        let pdu = M2apPdu::Unsuccessful(UnsuccessfulOutcome::M2SetupFailure(M2SetupFailure {
            cause,
            time_to_wait,
        }));
        self.send_pdu(assoc_id, ENB_SIGNALLING_STREAM, &pdu).await;
    }

    // ========================================================================
    // Reset
    // ========================================================================

    async fn handle_reset(&mut self, assoc_id: u64, reset: Reset) {
        if self.enbs.find(assoc_id).is_none() {
            warn!("Reset from unknown association {}", assoc_id);
            return;
        }
        info!(
            "Reset from association {}, cause {}",
            assoc_id, reset.cause
        );

        match reset.reset_type {
            ResetType::Full => self.handle_full_reset(assoc_id).await,
            ResetType::Partial(items) => self.handle_partial_reset(assoc_id, items).await,
        }
    }

    /// Full reset releases every session on the association, then the
    /// association itself is closed and the eNB forgotten. The eNB
    /// re-establishes and runs M2 Setup again from scratch.
    async fn handle_full_reset(&mut self, assoc_id: u64) {
        if let Some(ctx) = self.enbs.find_mut(assoc_id) {
            ctx.state = EnbState::Shutdown;
        }

        let ack = M2apPdu::Successful(SuccessfulOutcome::ResetAcknowledge(ResetAcknowledge {
            items: None,
        }));
        self.send_pdu(assoc_id, ENB_SIGNALLING_STREAM, &ack).await;

        self.remove_enb_cascading(assoc_id).await;
        self.close_association(assoc_id).await;
    }

    /// Partial reset releases only the itemized sessions. Items the MCE
    /// cannot match are skipped but still echoed in the acknowledge.
    async fn handle_partial_reset(&mut self, assoc_id: u64, items: Vec<ResetItem>) {
        if let Some(ctx) = self.enbs.find_mut(assoc_id) {
            ctx.state = EnbState::Resetting;
        }

        for item in &items {
            self.apply_reset_item(assoc_id, item).await;
        }

        // A drained counter already dropped the eNB back to Init. Any
        // other outcome, including an all-skipped item list, goes
        // straight back to service.
        if let Some(ctx) = self.enbs.find_mut(assoc_id) {
            if ctx.state == EnbState::Resetting {
                ctx.state = EnbState::Ready;
            }
        }

        let ack = M2apPdu::Successful(SuccessfulOutcome::ResetAcknowledge(ResetAcknowledge {
            items: Some(items),
        }));
        self.send_pdu(assoc_id, ENB_SIGNALLING_STREAM, &ack).await;
    }

    async fn apply_reset_item(&mut self, assoc_id: u64, item: &ResetItem) {
        let Some(id) = item.mce_mbms_m2ap_id else {
            warn!("reset item without MCE MBMS id from association {}", assoc_id);
            return;
        };
        if id >= INVALID_MCE_MBMS_M2AP_ID {
            warn!("reset item with invalid MCE MBMS id {:#08x}", id);
            return;
        }

        let emptied = {
            let Some(svc) = self.services.get_mut(id) else {
                warn!("reset item names unknown MBMS service {:#08x}", id);
                return;
            };
            let Some(&recorded) = svc.enb_refs.get(&assoc_id) else {
                warn!(
                    "reset item names MBMS service {:#08x} not carried by association {}",
                    id, assoc_id
                );
                return;
            };
            if let Some(enb_id) = item.enb_mbms_m2ap_id {
                if enb_id != recorded {
                    warn!(
                        "reset item eNB MBMS id {} does not match recorded {} for service {:#08x}",
                        enb_id, recorded, id
                    );
                    return;
                }
            }
            svc.enb_refs.remove(&assoc_id);
            self.enbs.note_service_detached(assoc_id);
            svc.enb_refs.is_empty() && svc.state != MbmsServiceState::Pending
        };
        debug!(
            "reset released MBMS service {:#08x} on association {}",
            id, assoc_id
        );
        if emptied {
            warn!("MBMS service {:#08x} lost its last eNB, destroying", id);
            self.destroy_service(id);
        }
    }

    // ========================================================================
    // Error Indication
    // ========================================================================

    async fn handle_error_indication(
        &mut self,
        assoc_id: u64,
        ind: embms_m2ap::procedures::ErrorIndication,
    ) {
        let cause = ind
            .cause
            .map(|c| c.to_string())
            .unwrap_or_else(|| "unreported".into());

        let Some(id) = ind.mce_mbms_m2ap_id.filter(|&id| id < INVALID_MCE_MBMS_M2AP_ID) else {
            warn!(
                "Error Indication from association {} (cause {}), no session named",
                assoc_id, cause
            );
            return;
        };

        let recorded = self
            .services
            .get(id)
            .and_then(|svc| svc.enb_refs.get(&assoc_id).copied());
        let Some(enb_mbms_m2ap_id) = recorded else {
            warn!(
                "Error Indication from association {} (cause {}) names MBMS service \
                 {:#08x} it does not carry",
                assoc_id, cause, id
            );
            return;
        };

        // The eNB cannot continue the session; stop it there and drop
        // the reference.
        warn!(
            "Error Indication from association {} for MBMS service {:#08x} (cause {}), \
             stopping the session on that eNB",
            assoc_id, id, cause
        );
        let stop = M2apPdu::Initiating(InitiatingMessage::SessionStopRequest(SessionStopRequest {
            mce_mbms_m2ap_id: id,
            enb_mbms_m2ap_id,
        }));
        self.send_pdu(assoc_id, MBMS_SERVICE_STREAM, &stop).await;

        let emptied = {
            let Some(svc) = self.services.get_mut(id) else {
                return;
            };
            svc.enb_refs.remove(&assoc_id);
            self.enbs.note_service_detached(assoc_id);
            svc.enb_refs.is_empty() && svc.state != MbmsServiceState::Pending
        };
        if emptied {
            warn!("MBMS service {:#08x} lost its last eNB, destroying", id);
            self.destroy_service(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::m2ap::test_support::{
        decoded_sends, recv_send, setup_request, TestHarness,
    };
    use embms_m2ap::procedures::GlobalEnbId;

    #[tokio::test]
    async fn test_setup_accepted_sends_response_and_scheduling() {
        let mut h = TestHarness::new();
        h.association_up(1).await;
        h.task
            .dispatch(M2apMessage::ReceivePdu {
                assoc_id: 1,
                stream: ENB_SIGNALLING_STREAM,
                data: codec::encode(&setup_request(0x1001, &[7, 9])),
            })
            .await;

        let sent = decoded_sends(&mut h.sctp_rx, 2).await;
        assert!(matches!(
            sent[0].1,
            M2apPdu::Successful(SuccessfulOutcome::M2SetupResponse(_))
        ));
        assert!(matches!(
            sent[1].1,
            M2apPdu::Initiating(InitiatingMessage::SchedulingInformation(_))
        ));

        let ctx = h.task.enbs.find(1).unwrap();
        assert_eq!(ctx.state, EnbState::Ready);
        assert_eq!(ctx.enb_id, Some(0x1001));
        assert_eq!(h.task.enbs.assoc_for_enb_id(0x1001), Some(1));
    }

    #[tokio::test]
    async fn test_setup_on_wrong_stream_rejected() {
        let mut h = TestHarness::new();
        h.association_up(1).await;
        h.task
            .dispatch(M2apMessage::ReceivePdu {
                assoc_id: 1,
                stream: MBMS_SERVICE_STREAM,
                data: codec::encode(&setup_request(0x1001, &[7])),
            })
            .await;

        let (stream, pdu) = recv_send(&mut h.sctp_rx).await;
        assert_eq!(stream, ENB_SIGNALLING_STREAM);
        match pdu {
            M2apPdu::Unsuccessful(UnsuccessfulOutcome::M2SetupFailure(f)) => {
                assert_eq!(f.cause, Cause::Protocol(ProtocolCause::Unspecified));
                assert_eq!(f.time_to_wait, None);
            }
            other => panic!("unexpected PDU: {other}"),
        }
        assert_eq!(h.task.enbs.find(1).unwrap().state, EnbState::Init);
    }

    #[tokio::test]
    async fn test_setup_rejects_unserved_plmn() {
        let mut h = TestHarness::new();
        h.association_up(1).await;

        let mut req = setup_request(0x1001, &[7]);
        if let M2apPdu::Initiating(InitiatingMessage::M2SetupRequest(ref mut r)) = req {
            r.global_enb_id = GlobalEnbId {
                plmn: [0x13, 0x00, 0x14],
                enb_id: 0x1001,
            };
        }
        h.task
            .dispatch(M2apMessage::ReceivePdu {
                assoc_id: 1,
                stream: ENB_SIGNALLING_STREAM,
                data: codec::encode(&req),
            })
            .await;

        let (_, pdu) = recv_send(&mut h.sctp_rx).await;
        match pdu {
            M2apPdu::Unsuccessful(UnsuccessfulOutcome::M2SetupFailure(f)) => {
                assert_eq!(f.cause, Cause::Misc(MiscCause::Unspecified));
                assert_eq!(f.time_to_wait, Some(TimeToWait::V20s));
            }
            other => panic!("unexpected PDU: {other}"),
        }
    }

    #[tokio::test]
    async fn test_setup_rejects_disjoint_service_areas() {
        let mut h = TestHarness::new();
        h.association_up(1).await;
        h.task
            .dispatch(M2apMessage::ReceivePdu {
                assoc_id: 1,
                stream: ENB_SIGNALLING_STREAM,
                data: codec::encode(&setup_request(0x1001, &[42])),
            })
            .await;

        let (_, pdu) = recv_send(&mut h.sctp_rx).await;
        assert!(matches!(
            pdu,
            M2apPdu::Unsuccessful(UnsuccessfulOutcome::M2SetupFailure(_))
        ));
        assert_eq!(h.task.enbs.find(1).unwrap().state, EnbState::Init);
    }

    #[tokio::test]
    async fn test_setup_rejects_over_capacity() {
        let mut h = TestHarness::new();
        // Capacity in the test config is 8; fill past it.
        for assoc in 1..=9u64 {
            h.association_up(assoc).await;
        }
        h.task
            .dispatch(M2apMessage::ReceivePdu {
                assoc_id: 9,
                stream: ENB_SIGNALLING_STREAM,
                data: codec::encode(&setup_request(0x1009, &[7])),
            })
            .await;

        let (_, pdu) = recv_send(&mut h.sctp_rx).await;
        match pdu {
            M2apPdu::Unsuccessful(UnsuccessfulOutcome::M2SetupFailure(f)) => {
                assert_eq!(f.cause, Cause::Misc(MiscCause::ControlProcessingOverload));
                assert_eq!(f.time_to_wait, Some(TimeToWait::V20s));
            }
            other => panic!("unexpected PDU: {other}"),
        }
    }

    #[tokio::test]
    async fn test_setup_duplicate_enb_id_tears_down_stale_binding() {
        let mut h = TestHarness::new();
        h.ready_enb(1, 0x1001, &[7]).await;

        h.association_up(2).await;
        h.task
            .dispatch(M2apMessage::ReceivePdu {
                assoc_id: 2,
                stream: ENB_SIGNALLING_STREAM,
                data: codec::encode(&setup_request(0x1001, &[7])),
            })
            .await;

        let (_, pdu) = recv_send(&mut h.sctp_rx).await;
        assert!(matches!(
            pdu,
            M2apPdu::Unsuccessful(UnsuccessfulOutcome::M2SetupFailure(_))
        ));
        match h.sctp_rx.recv().await {
            Some(TaskMessage::Message(SctpMessage::CloseAssociation { assoc_id })) => {
                assert_eq!(assoc_id, 1);
            }
            other => panic!("expected close of stale association: {other:?}"),
        }
        assert!(h.task.enbs.find(1).is_none());
        assert_eq!(h.task.enbs.assoc_for_enb_id(0x1001), None);
    }

    #[tokio::test]
    async fn test_full_reset_acks_and_closes() {
        let mut h = TestHarness::new();
        h.ready_enb(1, 0x1001, &[7]).await;
        let id = h.active_service(7, &[(1, 100)]).await;

        h.task
            .dispatch(M2apMessage::ReceivePdu {
                assoc_id: 1,
                stream: ENB_SIGNALLING_STREAM,
                data: codec::encode(&M2apPdu::Initiating(InitiatingMessage::Reset(Reset {
                    cause: Cause::Misc(MiscCause::OmIntervention),
                    reset_type: ResetType::Full,
                }))),
            })
            .await;

        let (stream, pdu) = recv_send(&mut h.sctp_rx).await;
        assert_eq!(stream, ENB_SIGNALLING_STREAM);
        match pdu {
            M2apPdu::Successful(SuccessfulOutcome::ResetAcknowledge(ack)) => {
                assert_eq!(ack.items, None);
            }
            other => panic!("unexpected PDU: {other}"),
        }
        match h.sctp_rx.recv().await {
            Some(TaskMessage::Message(SctpMessage::CloseAssociation { assoc_id })) => {
                assert_eq!(assoc_id, 1);
            }
            other => panic!("expected association close: {other:?}"),
        }
        assert!(h.task.enbs.find(1).is_none());
        assert!(h.task.services.get(id).is_none());
    }

    #[tokio::test]
    async fn test_partial_reset_releases_named_session_only() {
        let mut h = TestHarness::new();
        h.ready_enb(1, 0x1001, &[7, 9]).await;
        let id_a = h.active_service(7, &[(1, 100)]).await;
        let id_b = h.active_service(9, &[(1, 101)]).await;

        let items = vec![ResetItem {
            mce_mbms_m2ap_id: Some(id_a),
            enb_mbms_m2ap_id: Some(100),
        }];
        h.task
            .dispatch(M2apMessage::ReceivePdu {
                assoc_id: 1,
                stream: ENB_SIGNALLING_STREAM,
                data: codec::encode(&M2apPdu::Initiating(InitiatingMessage::Reset(Reset {
                    cause: Cause::Misc(MiscCause::HardwareFailure),
                    reset_type: ResetType::Partial(items.clone()),
                }))),
            })
            .await;

        let (_, pdu) = recv_send(&mut h.sctp_rx).await;
        match pdu {
            M2apPdu::Successful(SuccessfulOutcome::ResetAcknowledge(ack)) => {
                assert_eq!(ack.items, Some(items));
            }
            other => panic!("unexpected PDU: {other}"),
        }

        assert!(h.task.services.get(id_a).is_none());
        assert!(h.task.services.get(id_b).is_some());
        let ctx = h.task.enbs.find(1).unwrap();
        assert_eq!(ctx.state, EnbState::Ready);
        assert_eq!(ctx.active_service_count, 1);
    }

    #[tokio::test]
    async fn test_partial_reset_skips_unmatched_items_but_echoes_all() {
        let mut h = TestHarness::new();
        h.ready_enb(1, 0x1001, &[7]).await;
        let id = h.active_service(7, &[(1, 100)]).await;

        let items = vec![
            // No MCE id at all.
            ResetItem {
                mce_mbms_m2ap_id: None,
                enb_mbms_m2ap_id: Some(100),
            },
            // Unknown service.
            ResetItem {
                mce_mbms_m2ap_id: Some(0x00BEEF),
                enb_mbms_m2ap_id: None,
            },
            // Known service but mismatched eNB-local id.
            ResetItem {
                mce_mbms_m2ap_id: Some(id),
                enb_mbms_m2ap_id: Some(999),
            },
        ];
        h.task
            .dispatch(M2apMessage::ReceivePdu {
                assoc_id: 1,
                stream: ENB_SIGNALLING_STREAM,
                data: codec::encode(&M2apPdu::Initiating(InitiatingMessage::Reset(Reset {
                    cause: Cause::Misc(MiscCause::Unspecified),
                    reset_type: ResetType::Partial(items.clone()),
                }))),
            })
            .await;

        let (_, pdu) = recv_send(&mut h.sctp_rx).await;
        match pdu {
            M2apPdu::Successful(SuccessfulOutcome::ResetAcknowledge(ack)) => {
                assert_eq!(ack.items, Some(items));
            }
            other => panic!("unexpected PDU: {other}"),
        }
        // Nothing actually released.
        assert!(h.task.services.get(id).is_some());
        assert_eq!(h.task.enbs.find(1).unwrap().active_service_count, 1);
    }

    #[tokio::test]
    async fn test_partial_reset_with_no_matched_items_returns_enb_to_service() {
        let mut h = TestHarness::new();
        h.ready_enb(1, 0x1001, &[7]).await;

        // Idle eNB, item names a service the MCE never allocated.
        let items = vec![ResetItem {
            mce_mbms_m2ap_id: Some(0x00BEEF),
            enb_mbms_m2ap_id: None,
        }];
        h.task
            .dispatch(M2apMessage::ReceivePdu {
                assoc_id: 1,
                stream: ENB_SIGNALLING_STREAM,
                data: codec::encode(&M2apPdu::Initiating(InitiatingMessage::Reset(Reset {
                    cause: Cause::Misc(MiscCause::Unspecified),
                    reset_type: ResetType::Partial(items.clone()),
                }))),
            })
            .await;

        let (_, pdu) = recv_send(&mut h.sctp_rx).await;
        match pdu {
            M2apPdu::Successful(SuccessfulOutcome::ResetAcknowledge(ack)) => {
                assert_eq!(ack.items, Some(items));
            }
            other => panic!("unexpected PDU: {other}"),
        }
        assert_eq!(h.task.enbs.find(1).unwrap().state, EnbState::Ready);

        // The eNB keeps taking session fan-out afterwards.
        let id = h.active_service(7, &[(1, 100)]).await;
        assert!(h.task.services.get(id).is_some());
        h.assert_counters_consistent();
    }

    #[tokio::test]
    async fn test_error_indication_stops_session_on_reporting_enb() {
        let mut h = TestHarness::new();
        h.ready_enb(1, 0x1001, &[7]).await;
        h.ready_enb(2, 0x1002, &[7]).await;
        let id = h.active_service(7, &[(1, 100), (2, 200)]).await;

        h.task
            .dispatch(M2apMessage::ReceivePdu {
                assoc_id: 1,
                stream: ENB_SIGNALLING_STREAM,
                data: codec::encode(&M2apPdu::Initiating(InitiatingMessage::ErrorIndication(
                    embms_m2ap::procedures::ErrorIndication {
                        mce_mbms_m2ap_id: Some(id),
                        enb_mbms_m2ap_id: Some(100),
                        cause: Some(Cause::RadioNetwork(
                            embms_m2ap::procedures::RadioNetworkCause::RadioResourcesNotAvailable,
                        )),
                    },
                ))),
            })
            .await;

        let (stream, pdu) = recv_send(&mut h.sctp_rx).await;
        assert_eq!(stream, MBMS_SERVICE_STREAM);
        match pdu {
            M2apPdu::Initiating(InitiatingMessage::SessionStopRequest(stop)) => {
                assert_eq!(stop.mce_mbms_m2ap_id, id);
                assert_eq!(stop.enb_mbms_m2ap_id, 100);
            }
            other => panic!("unexpected PDU: {other}"),
        }

        let svc = h.task.services.get(id).unwrap();
        assert!(!svc.enb_refs.contains_key(&1));
        assert!(svc.enb_refs.contains_key(&2));
        assert_eq!(h.task.enbs.find(1).unwrap().active_service_count, 0);
    }

    #[tokio::test]
    async fn test_error_indication_without_session_is_logged_only() {
        let mut h = TestHarness::new();
        h.ready_enb(1, 0x1001, &[7]).await;

        h.task
            .dispatch(M2apMessage::ReceivePdu {
                assoc_id: 1,
                stream: ENB_SIGNALLING_STREAM,
                data: codec::encode(&M2apPdu::Initiating(InitiatingMessage::ErrorIndication(
                    embms_m2ap::procedures::ErrorIndication {
                        mce_mbms_m2ap_id: None,
                        enb_mbms_m2ap_id: None,
                        cause: Some(Cause::Protocol(ProtocolCause::SemanticError)),
                    },
                ))),
            })
            .await;

        assert!(h.sctp_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_association_down_cascades_to_services() {
        let mut h = TestHarness::new();
        h.ready_enb(1, 0x1001, &[7, 9]).await;
        h.ready_enb(2, 0x1002, &[7]).await;
        let id_a = h.active_service(7, &[(1, 100), (2, 200)]).await;
        let id_b = h.active_service(9, &[(1, 101)]).await;

        h.task
            .dispatch(M2apMessage::AssociationDown { assoc_id: 1 })
            .await;
        assert!(h.task.enbs.find(1).is_none());
        // Service A survives on the other eNB, B lost its only carrier.
        let svc_a = h.task.services.get(id_a).unwrap();
        assert!(!svc_a.enb_refs.contains_key(&1));
        assert!(svc_a.enb_refs.contains_key(&2));
        assert!(h.task.services.get(id_b).is_none());

        h.task
            .dispatch(M2apMessage::AssociationDown { assoc_id: 2 })
            .await;
        assert!(h.task.services.get(id_a).is_none());
        assert!(h.task.enbs.is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_pdu_is_dropped() {
        let mut h = TestHarness::new();
        h.ready_enb(1, 0x1001, &[7]).await;

        h.task
            .dispatch(M2apMessage::ReceivePdu {
                assoc_id: 1,
                stream: ENB_SIGNALLING_STREAM,
                data: Bytes::from_static(&[0xFF, 0xFF, 0x00]),
            })
            .await;
        assert!(h.sctp_rx.try_recv().is_err());
    }
}
