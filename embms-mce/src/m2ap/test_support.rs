//! Shared fixtures for M2AP task tests.

use tokio::sync::mpsc;

use embms_m2ap::procedures::{
    BearerQos, EnbMbmsConfigItem, GlobalEnbId, M2SetupRequest, SessionStartResponse, Tmgi,
    TnlInformation,
};
use embms_m2ap::{codec, InitiatingMessage, M2apPdu, SuccessfulOutcome, MBMS_SERVICE_STREAM};

use crate::m2ap::task::M2apTask;
use crate::tasks::{
    tests::test_config, M2apMessage, MceTaskBase, SctpMessage, SessionStartCommand, TaskMessage,
};

/// PLMN 208/93 in 3GPP encoded form, matching the test configuration.
pub(crate) const TEST_PLMN: [u8; 3] = [0x02, 0xF8, 0x39];

pub(crate) fn sample_qos() -> BearerQos {
    BearerQos {
        qci: 65,
        priority_level: 3,
        preemption_capability: false,
        preemption_vulnerability: true,
        gbr: None,
    }
}

/// An M2 Setup Request PDU for one single-cell eNB.
pub(crate) fn setup_request(enb_id: u32, areas: &[u16]) -> M2apPdu {
    M2apPdu::Initiating(InitiatingMessage::M2SetupRequest(M2SetupRequest {
        global_enb_id: GlobalEnbId {
            plmn: TEST_PLMN,
            enb_id,
        },
        enb_name: Some(format!("enb-{enb_id:#x}")),
        configured_cells: vec![EnbMbmsConfigItem {
            ecgi_cell_id: enb_id << 8,
            mbsfn_sync_area: 1,
            service_areas: areas.to_vec(),
        }],
    }))
}

/// Receives one outbound PDU, failing on anything else.
pub(crate) async fn recv_send(
    rx: &mut mpsc::Receiver<TaskMessage<SctpMessage>>,
) -> (u16, M2apPdu) {
    match rx.recv().await {
        Some(TaskMessage::Message(SctpMessage::SendPdu { stream, data, .. })) => {
            (stream, codec::decode(&data).unwrap())
        }
        other => panic!("expected outbound PDU: {other:?}"),
    }
}

/// Receives `n` outbound PDUs in order.
pub(crate) async fn decoded_sends(
    rx: &mut mpsc::Receiver<TaskMessage<SctpMessage>>,
    n: usize,
) -> Vec<(u16, M2apPdu)> {
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        out.push(recv_send(rx).await);
    }
    out
}

/// An M2AP task wired to inspectable mailboxes.
pub(crate) struct TestHarness {
    pub task: M2apTask,
    pub m2ap_rx: mpsc::Receiver<TaskMessage<M2apMessage>>,
    pub sctp_rx: mpsc::Receiver<TaskMessage<SctpMessage>>,
    next_service: u32,
}

impl TestHarness {
    pub fn new() -> Self {
        let (base, m2ap_rx, sctp_rx) = MceTaskBase::new(test_config(), 64);
        Self {
            task: M2apTask::new(base),
            m2ap_rx,
            sctp_rx,
            next_service: 1,
        }
    }

    /// Discards every queued outbound transport message.
    pub fn drain(&mut self) {
        while self.sctp_rx.try_recv().is_ok() {}
    }

    pub async fn association_up(&mut self, assoc_id: u64) {
        self.task
            .dispatch(M2apMessage::AssociationUp {
                assoc_id,
                in_streams: 2,
                out_streams: 2,
            })
            .await;
    }

    /// Brings an association up and completes M2 Setup for it.
    pub async fn ready_enb(&mut self, assoc_id: u64, enb_id: u32, areas: &[u16]) {
        self.association_up(assoc_id).await;
        self.task
            .dispatch(M2apMessage::ReceivePdu {
                assoc_id,
                stream: embms_m2ap::ENB_SIGNALLING_STREAM,
                data: codec::encode(&setup_request(enb_id, areas)),
            })
            .await;
        self.drain();
    }

    /// A fresh TMGI that no other service in this harness uses.
    pub fn next_tmgi(&mut self) -> Tmgi {
        let tmgi = Tmgi::new(TEST_PLMN, self.next_service);
        self.next_service += 1;
        tmgi
    }

    /// Starts a session in `area` and feeds Start responses from the
    /// given (association, eNB-local id) pairs. Returns the allocated
    /// service id with the outbound queue drained.
    pub async fn active_service(&mut self, area: u16, refs: &[(u64, u16)]) -> u32 {
        let tmgi = self.next_tmgi();
        self.task
            .dispatch(M2apMessage::SessionStart(SessionStartCommand {
                tmgi,
                service_area: area,
                qos: sample_qos(),
                tnl: TnlInformation::unspecified(),
                start_time: None,
            }))
            .await;
        let id = self
            .task
            .services
            .find_by_tmgi_area(tmgi, area)
            .expect("service not created");
        for &(assoc_id, enb_mbms_m2ap_id) in refs {
            self.start_response(assoc_id, id, enb_mbms_m2ap_id).await;
        }
        self.drain();
        id
    }

    /// Feeds one Session Start Response into the task.
    pub async fn start_response(&mut self, assoc_id: u64, id: u32, enb_mbms_m2ap_id: u16) {
        let pdu = M2apPdu::Successful(SuccessfulOutcome::SessionStartResponse(
            SessionStartResponse {
                mce_mbms_m2ap_id: id,
                enb_mbms_m2ap_id,
            },
        ));
        self.task
            .dispatch(M2apMessage::ReceivePdu {
                assoc_id,
                stream: MBMS_SERVICE_STREAM,
                data: codec::encode(&pdu),
            })
            .await;
    }

    /// Checks that every eNB's reference counter equals the number of
    /// services actually pointing at it.
    pub fn assert_counters_consistent(&self) {
        for enb in self.task.enbs.iter() {
            let actual = self
                .task
                .services
                .iter()
                .filter(|svc| svc.enb_refs.contains_key(&enb.assoc_id))
                .count() as u32;
            assert_eq!(
                enb.active_service_count, actual,
                "counter mismatch for association {}",
                enb.assoc_id
            );
        }
    }

    /// Decodes every queued outbound PDU without blocking.
    pub fn queued_pdus(&mut self) -> Vec<(u64, u16, M2apPdu)> {
        let mut out = Vec::new();
        while let Ok(msg) = self.sctp_rx.try_recv() {
            if let TaskMessage::Message(SctpMessage::SendPdu {
                assoc_id,
                stream,
                data,
            }) = msg
            {
                out.push((assoc_id, stream, codec::decode(&data).unwrap()));
            }
        }
        out
    }
}
