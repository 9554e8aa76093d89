//! M2AP message encoding/decoding
//!
//! Binary codec for the structured PDU model. Every PDU starts with a
//! two-byte header (outcome class, procedure code) followed by the
//! message body. Optionals are presence-prefixed, lists are
//! count-prefixed, strings are length-prefixed UTF-8.

use bytes::{BufMut, Bytes, BytesMut};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use thiserror::Error;

use crate::pdu::{InitiatingMessage, M2apPdu, PduType, ProcedureCode, SuccessfulOutcome, UnsuccessfulOutcome};
use crate::procedures::{
    BearerQos, Cause, CountingResultItem, EnbMbmsConfigItem, ErrorIndication, GbrQosInfo,
    GlobalEnbId, M2SetupFailure, M2SetupRequest, M2SetupResponse, MbsfnAreaConfig, MiscCause,
    OverloadNotification, OverloadStatus, ProtocolCause, RadioNetworkCause, Reset,
    ResetAcknowledge, ResetItem, ResetType, SchedulingInformation, SchedulingInformationResponse,
    ServiceCountingFailure, ServiceCountingResponse, ServiceCountingResultsReport,
    SessionStartFailure, SessionStartRequest, SessionStartResponse, SessionStopRequest,
    SessionStopResponse, SessionUpdateFailure, SessionUpdateRequest, SessionUpdateResponse,
    TimeToWait, Tmgi, TnlInformation, TransportCause,
};

/// Errors that can occur during M2AP encoding/decoding.
#[derive(Debug, Error)]
pub enum M2apCodecError {
    /// Unknown outcome class byte
    #[error("unknown M2AP PDU type: {0}")]
    UnknownPduType(u8),

    /// Unknown procedure code byte
    #[error("unknown M2AP procedure code: {0}")]
    UnknownProcedureCode(u8),

    /// Known procedure, but no message defined for this outcome class
    #[error("no message defined for procedure {procedure:?} with pdu type {pdu_type:?}")]
    UnexpectedMessage {
        /// Procedure code from the header
        procedure: ProcedureCode,
        /// Outcome class from the header
        pdu_type: PduType,
    },

    /// Buffer too short
    #[error("buffer too short: need {needed} bytes, have {available}")]
    BufferTooShort {
        /// Number of bytes needed
        needed: usize,
        /// Number of bytes available
        available: usize,
    },

    /// A field held a value outside its domain
    #[error("invalid field value: {0}")]
    InvalidValue(String),
}

/// Result type for M2AP codec operations.
pub type Result<T> = std::result::Result<T, M2apCodecError>;

// ============================================================================
// Encoding
// ============================================================================

/// Encodes an M2AP PDU into a byte buffer.
pub fn encode(pdu: &M2apPdu) -> Bytes {
    let mut buf = BytesMut::with_capacity(128);
    buf.put_u8(pdu.pdu_type() as u8);
    buf.put_u8(pdu.procedure_code() as u8);

    match pdu {
        M2apPdu::Initiating(msg) => encode_initiating(msg, &mut buf),
        M2apPdu::Successful(msg) => encode_successful(msg, &mut buf),
        M2apPdu::Unsuccessful(msg) => encode_unsuccessful(msg, &mut buf),
    }

    buf.freeze()
}

fn encode_initiating(msg: &InitiatingMessage, buf: &mut BytesMut) {
    match msg {
        InitiatingMessage::SessionStartRequest(m) => {
            buf.put_u32(m.mce_mbms_m2ap_id);
            put_tmgi(buf, &m.tmgi);
            buf.put_u16(m.service_area);
            put_qos(buf, &m.qos);
            put_tnl(buf, &m.tnl);
        }
        InitiatingMessage::SessionStopRequest(m) => {
            buf.put_u32(m.mce_mbms_m2ap_id);
            buf.put_u16(m.enb_mbms_m2ap_id);
        }
        InitiatingMessage::SessionUpdateRequest(m) => {
            buf.put_u32(m.mce_mbms_m2ap_id);
            buf.put_u16(m.enb_mbms_m2ap_id);
            put_tmgi(buf, &m.tmgi);
            buf.put_u16(m.service_area);
            put_qos(buf, &m.qos);
            put_tnl(buf, &m.tnl);
        }
        InitiatingMessage::SchedulingInformation(m) => {
            buf.put_u8(m.mcch_update_time);
            buf.put_u16(m.areas.len() as u16);
            for area in &m.areas {
                buf.put_u16(area.mbsfn_area_id);
                buf.put_u16(area.csa_period_rf);
            }
        }
        InitiatingMessage::ErrorIndication(m) => {
            put_opt_u32(buf, m.mce_mbms_m2ap_id);
            put_opt_u16(buf, m.enb_mbms_m2ap_id);
            match m.cause {
                Some(cause) => {
                    buf.put_u8(1);
                    put_cause(buf, &cause);
                }
                None => buf.put_u8(0),
            }
        }
        InitiatingMessage::Reset(m) => {
            put_cause(buf, &m.cause);
            match &m.reset_type {
                ResetType::Full => buf.put_u8(0),
                ResetType::Partial(items) => {
                    buf.put_u8(1);
                    put_reset_items(buf, items);
                }
            }
        }
        InitiatingMessage::M2SetupRequest(m) => {
            buf.put_slice(&m.global_enb_id.plmn);
            buf.put_u32(m.global_enb_id.enb_id);
            put_opt_string(buf, m.enb_name.as_deref());
            buf.put_u16(m.configured_cells.len() as u16);
            for cell in &m.configured_cells {
                buf.put_u32(cell.ecgi_cell_id);
                buf.put_u16(cell.mbsfn_sync_area);
                buf.put_u16(cell.service_areas.len() as u16);
                for area in &cell.service_areas {
                    buf.put_u16(*area);
                }
            }
        }
        InitiatingMessage::ServiceCountingResultsReport(m) => {
            buf.put_u16(m.mbsfn_area_id);
            buf.put_u16(m.results.len() as u16);
            for result in &m.results {
                put_tmgi(buf, &result.tmgi);
                buf.put_u32(result.counting_result);
            }
        }
        InitiatingMessage::OverloadNotification(m) => {
            buf.put_u16(m.mbsfn_area_id);
            buf.put_u8(m.status as u8);
        }
    }
}

fn encode_successful(msg: &SuccessfulOutcome, buf: &mut BytesMut) {
    match msg {
        SuccessfulOutcome::SessionStartResponse(m) => {
            buf.put_u32(m.mce_mbms_m2ap_id);
            buf.put_u16(m.enb_mbms_m2ap_id);
        }
        SuccessfulOutcome::SessionStopResponse(m) => {
            buf.put_u32(m.mce_mbms_m2ap_id);
            buf.put_u16(m.enb_mbms_m2ap_id);
        }
        SuccessfulOutcome::SessionUpdateResponse(m) => {
            buf.put_u32(m.mce_mbms_m2ap_id);
            buf.put_u16(m.enb_mbms_m2ap_id);
        }
        SuccessfulOutcome::SchedulingInformationResponse(SchedulingInformationResponse) => {}
        SuccessfulOutcome::ResetAcknowledge(m) => match &m.items {
            Some(items) => {
                buf.put_u8(1);
                put_reset_items(buf, items);
            }
            None => buf.put_u8(0),
        },
        SuccessfulOutcome::M2SetupResponse(m) => {
            buf.put_u16(m.mce_id);
            put_opt_string(buf, m.mce_name.as_deref());
            buf.put_u16(m.mbsfn_area_ids.len() as u16);
            for id in &m.mbsfn_area_ids {
                buf.put_u16(*id);
            }
        }
        SuccessfulOutcome::ServiceCountingResponse(ServiceCountingResponse) => {}
    }
}

fn encode_unsuccessful(msg: &UnsuccessfulOutcome, buf: &mut BytesMut) {
    match msg {
        UnsuccessfulOutcome::SessionStartFailure(m) => {
            buf.put_u32(m.mce_mbms_m2ap_id);
            put_cause(buf, &m.cause);
        }
        UnsuccessfulOutcome::SessionUpdateFailure(m) => {
            buf.put_u32(m.mce_mbms_m2ap_id);
            buf.put_u16(m.enb_mbms_m2ap_id);
            put_cause(buf, &m.cause);
        }
        UnsuccessfulOutcome::M2SetupFailure(m) => {
            put_cause(buf, &m.cause);
            match m.time_to_wait {
                Some(ttw) => {
                    buf.put_u8(1);
                    buf.put_u8(ttw as u8);
                }
                None => buf.put_u8(0),
            }
        }
        UnsuccessfulOutcome::ServiceCountingFailure(m) => {
            put_cause(buf, &m.cause);
        }
    }
}

fn put_tmgi(buf: &mut BytesMut, tmgi: &Tmgi) {
    buf.put_slice(&tmgi.to_bytes());
}

fn put_qos(buf: &mut BytesMut, qos: &BearerQos) {
    buf.put_u8(qos.qci);
    buf.put_u8(qos.priority_level);
    let mut flags = 0u8;
    if qos.preemption_capability {
        flags |= 0x01;
    }
    if qos.preemption_vulnerability {
        flags |= 0x02;
    }
    buf.put_u8(flags);
    match qos.gbr {
        Some(gbr) => {
            buf.put_u8(1);
            buf.put_u64(gbr.mbr_dl);
            buf.put_u64(gbr.gbr_dl);
        }
        None => buf.put_u8(0),
    }
}

fn put_tnl(buf: &mut BytesMut, tnl: &TnlInformation) {
    put_ip(buf, &tnl.ip_mc_address);
    put_ip(buf, &tnl.ip_source_address);
    buf.put_u32(tnl.gtp_dl_teid);
}

fn put_ip(buf: &mut BytesMut, addr: &IpAddr) {
    match addr {
        IpAddr::V4(v4) => {
            buf.put_u8(4);
            buf.put_slice(&v4.octets());
        }
        IpAddr::V6(v6) => {
            buf.put_u8(16);
            buf.put_slice(&v6.octets());
        }
    }
}

fn put_cause(buf: &mut BytesMut, cause: &Cause) {
    match cause {
        Cause::RadioNetwork(c) => {
            buf.put_u8(0);
            buf.put_u8(*c as u8);
        }
        Cause::Transport(c) => {
            buf.put_u8(1);
            buf.put_u8(*c as u8);
        }
        Cause::Protocol(c) => {
            buf.put_u8(2);
            buf.put_u8(*c as u8);
        }
        Cause::Misc(c) => {
            buf.put_u8(3);
            buf.put_u8(*c as u8);
        }
    }
}

fn put_opt_u32(buf: &mut BytesMut, value: Option<u32>) {
    match value {
        Some(v) => {
            buf.put_u8(1);
            buf.put_u32(v);
        }
        None => buf.put_u8(0),
    }
}

fn put_opt_u16(buf: &mut BytesMut, value: Option<u16>) {
    match value {
        Some(v) => {
            buf.put_u8(1);
            buf.put_u16(v);
        }
        None => buf.put_u8(0),
    }
}

fn put_opt_string(buf: &mut BytesMut, value: Option<&str>) {
    match value {
        Some(s) => {
            buf.put_u8(1);
            buf.put_u16(s.len() as u16);
            buf.put_slice(s.as_bytes());
        }
        None => buf.put_u8(0),
    }
}

fn put_reset_items(buf: &mut BytesMut, items: &[ResetItem]) {
    buf.put_u16(items.len() as u16);
    for item in items {
        put_opt_u32(buf, item.mce_mbms_m2ap_id);
        put_opt_u16(buf, item.enb_mbms_m2ap_id);
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Checked cursor over the input buffer.
struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.buf.len() < n {
            return Err(M2apCodecError::BufferTooShort {
                needed: n,
                available: self.buf.len(),
            });
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        let mut out = [0u8; 8];
        out.copy_from_slice(b);
        Ok(u64::from_be_bytes(out))
    }

    fn flag(&mut self) -> Result<bool> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(M2apCodecError::InvalidValue(format!(
                "presence flag must be 0 or 1, got {other}"
            ))),
        }
    }
}

/// Decodes an M2AP PDU from a byte buffer.
pub fn decode(data: &[u8]) -> Result<M2apPdu> {
    let mut r = Reader::new(data);

    let pdu_type_byte = r.u8()?;
    let pdu_type = PduType::try_from(pdu_type_byte)
        .map_err(|_| M2apCodecError::UnknownPduType(pdu_type_byte))?;

    let code_byte = r.u8()?;
    let procedure = ProcedureCode::try_from(code_byte)
        .map_err(|_| M2apCodecError::UnknownProcedureCode(code_byte))?;

    match (procedure, pdu_type) {
        (ProcedureCode::SessionStart, PduType::InitiatingMessage) => {
            Ok(M2apPdu::Initiating(InitiatingMessage::SessionStartRequest(
                SessionStartRequest {
                    mce_mbms_m2ap_id: r.u32()?,
                    tmgi: get_tmgi(&mut r)?,
                    service_area: r.u16()?,
                    qos: get_qos(&mut r)?,
                    tnl: get_tnl(&mut r)?,
                },
            )))
        }
        (ProcedureCode::SessionStart, PduType::SuccessfulOutcome) => {
            Ok(M2apPdu::Successful(SuccessfulOutcome::SessionStartResponse(
                SessionStartResponse {
                    mce_mbms_m2ap_id: r.u32()?,
                    enb_mbms_m2ap_id: r.u16()?,
                },
            )))
        }
        (ProcedureCode::SessionStart, PduType::UnsuccessfulOutcome) => Ok(M2apPdu::Unsuccessful(
            UnsuccessfulOutcome::SessionStartFailure(SessionStartFailure {
                mce_mbms_m2ap_id: r.u32()?,
                cause: get_cause(&mut r)?,
            }),
        )),
        (ProcedureCode::SessionStop, PduType::InitiatingMessage) => {
            Ok(M2apPdu::Initiating(InitiatingMessage::SessionStopRequest(
                SessionStopRequest {
                    mce_mbms_m2ap_id: r.u32()?,
                    enb_mbms_m2ap_id: r.u16()?,
                },
            )))
        }
        (ProcedureCode::SessionStop, PduType::SuccessfulOutcome) => {
            Ok(M2apPdu::Successful(SuccessfulOutcome::SessionStopResponse(
                SessionStopResponse {
                    mce_mbms_m2ap_id: r.u32()?,
                    enb_mbms_m2ap_id: r.u16()?,
                },
            )))
        }
        (ProcedureCode::SessionUpdate, PduType::InitiatingMessage) => {
            Ok(M2apPdu::Initiating(InitiatingMessage::SessionUpdateRequest(
                SessionUpdateRequest {
                    mce_mbms_m2ap_id: r.u32()?,
                    enb_mbms_m2ap_id: r.u16()?,
                    tmgi: get_tmgi(&mut r)?,
                    service_area: r.u16()?,
                    qos: get_qos(&mut r)?,
                    tnl: get_tnl(&mut r)?,
                },
            )))
        }
        (ProcedureCode::SessionUpdate, PduType::SuccessfulOutcome) => {
            Ok(M2apPdu::Successful(SuccessfulOutcome::SessionUpdateResponse(
                SessionUpdateResponse {
                    mce_mbms_m2ap_id: r.u32()?,
                    enb_mbms_m2ap_id: r.u16()?,
                },
            )))
        }
        (ProcedureCode::SessionUpdate, PduType::UnsuccessfulOutcome) => Ok(M2apPdu::Unsuccessful(
            UnsuccessfulOutcome::SessionUpdateFailure(SessionUpdateFailure {
                mce_mbms_m2ap_id: r.u32()?,
                enb_mbms_m2ap_id: r.u16()?,
                cause: get_cause(&mut r)?,
            }),
        )),
        (ProcedureCode::MbmsSchedulingInformation, PduType::InitiatingMessage) => {
            let mcch_update_time = r.u8()?;
            let count = r.u16()?;
            let mut areas = Vec::with_capacity(count as usize);
            for _ in 0..count {
                areas.push(MbsfnAreaConfig {
                    mbsfn_area_id: r.u16()?,
                    csa_period_rf: r.u16()?,
                });
            }
            Ok(M2apPdu::Initiating(InitiatingMessage::SchedulingInformation(
                SchedulingInformation {
                    mcch_update_time,
                    areas,
                },
            )))
        }
        (ProcedureCode::MbmsSchedulingInformation, PduType::SuccessfulOutcome) => {
            Ok(M2apPdu::Successful(
                SuccessfulOutcome::SchedulingInformationResponse(SchedulingInformationResponse),
            ))
        }
        (ProcedureCode::ErrorIndication, PduType::InitiatingMessage) => {
            let mce_mbms_m2ap_id = if r.flag()? { Some(r.u32()?) } else { None };
            let enb_mbms_m2ap_id = if r.flag()? { Some(r.u16()?) } else { None };
            let cause = if r.flag()? {
                Some(get_cause(&mut r)?)
            } else {
                None
            };
            Ok(M2apPdu::Initiating(InitiatingMessage::ErrorIndication(
                ErrorIndication {
                    mce_mbms_m2ap_id,
                    enb_mbms_m2ap_id,
                    cause,
                },
            )))
        }
        (ProcedureCode::Reset, PduType::InitiatingMessage) => {
            let cause = get_cause(&mut r)?;
            let reset_type = match r.u8()? {
                0 => ResetType::Full,
                1 => ResetType::Partial(get_reset_items(&mut r)?),
                other => {
                    return Err(M2apCodecError::InvalidValue(format!(
                        "unknown reset type tag {other}"
                    )))
                }
            };
            Ok(M2apPdu::Initiating(InitiatingMessage::Reset(Reset {
                cause,
                reset_type,
            })))
        }
        (ProcedureCode::Reset, PduType::SuccessfulOutcome) => {
            let items = if r.flag()? {
                Some(get_reset_items(&mut r)?)
            } else {
                None
            };
            Ok(M2apPdu::Successful(SuccessfulOutcome::ResetAcknowledge(
                ResetAcknowledge { items },
            )))
        }
        (ProcedureCode::M2Setup, PduType::InitiatingMessage) => {
            let plmn_bytes = r.take(3)?;
            let mut plmn = [0u8; 3];
            plmn.copy_from_slice(plmn_bytes);
            let enb_id = r.u32()?;
            let enb_name = get_opt_string(&mut r)?;
            let cell_count = r.u16()?;
            let mut configured_cells = Vec::with_capacity(cell_count as usize);
            for _ in 0..cell_count {
                let ecgi_cell_id = r.u32()?;
                let mbsfn_sync_area = r.u16()?;
                let area_count = r.u16()?;
                let mut service_areas = Vec::with_capacity(area_count as usize);
                for _ in 0..area_count {
                    service_areas.push(r.u16()?);
                }
                configured_cells.push(EnbMbmsConfigItem {
                    ecgi_cell_id,
                    mbsfn_sync_area,
                    service_areas,
                });
            }
            Ok(M2apPdu::Initiating(InitiatingMessage::M2SetupRequest(
                M2SetupRequest {
                    global_enb_id: GlobalEnbId { plmn, enb_id },
                    enb_name,
                    configured_cells,
                },
            )))
        }
        (ProcedureCode::M2Setup, PduType::SuccessfulOutcome) => {
            let mce_id = r.u16()?;
            let mce_name = get_opt_string(&mut r)?;
            let count = r.u16()?;
            let mut mbsfn_area_ids = Vec::with_capacity(count as usize);
            for _ in 0..count {
                mbsfn_area_ids.push(r.u16()?);
            }
            Ok(M2apPdu::Successful(SuccessfulOutcome::M2SetupResponse(
                M2SetupResponse {
                    mce_id,
                    mce_name,
                    mbsfn_area_ids,
                },
            )))
        }
        (ProcedureCode::M2Setup, PduType::UnsuccessfulOutcome) => {
            let cause = get_cause(&mut r)?;
            let time_to_wait = if r.flag()? {
                let v = r.u8()?;
                Some(
                    TimeToWait::try_from(v).map_err(|_| {
                        M2apCodecError::InvalidValue(format!("unknown time-to-wait {v}"))
                    })?,
                )
            } else {
                None
            };
            Ok(M2apPdu::Unsuccessful(UnsuccessfulOutcome::M2SetupFailure(
                M2SetupFailure {
                    cause,
                    time_to_wait,
                },
            )))
        }
        (ProcedureCode::MbmsServiceCounting, PduType::SuccessfulOutcome) => Ok(M2apPdu::Successful(
            SuccessfulOutcome::ServiceCountingResponse(ServiceCountingResponse),
        )),
        (ProcedureCode::MbmsServiceCounting, PduType::UnsuccessfulOutcome) => {
            Ok(M2apPdu::Unsuccessful(
                UnsuccessfulOutcome::ServiceCountingFailure(ServiceCountingFailure {
                    cause: get_cause(&mut r)?,
                }),
            ))
        }
        (ProcedureCode::MbmsServiceCountingResultsReport, PduType::InitiatingMessage) => {
            let mbsfn_area_id = r.u16()?;
            let count = r.u16()?;
            let mut results = Vec::with_capacity(count as usize);
            for _ in 0..count {
                results.push(CountingResultItem {
                    tmgi: get_tmgi(&mut r)?,
                    counting_result: r.u32()?,
                });
            }
            Ok(M2apPdu::Initiating(
                InitiatingMessage::ServiceCountingResultsReport(ServiceCountingResultsReport {
                    mbsfn_area_id,
                    results,
                }),
            ))
        }
        (ProcedureCode::MbmsOverloadNotification, PduType::InitiatingMessage) => {
            let mbsfn_area_id = r.u16()?;
            let status_byte = r.u8()?;
            let status = OverloadStatus::try_from(status_byte).map_err(|_| {
                M2apCodecError::InvalidValue(format!("unknown overload status {status_byte}"))
            })?;
            Ok(M2apPdu::Initiating(InitiatingMessage::OverloadNotification(
                OverloadNotification {
                    mbsfn_area_id,
                    status,
                },
            )))
        }
        (procedure, pdu_type) => Err(M2apCodecError::UnexpectedMessage {
            procedure,
            pdu_type,
        }),
    }
}

fn get_tmgi(r: &mut Reader<'_>) -> Result<Tmgi> {
    let bytes = r.take(6)?;
    let mut raw = [0u8; 6];
    raw.copy_from_slice(bytes);
    Ok(Tmgi::from_bytes(&raw))
}

fn get_qos(r: &mut Reader<'_>) -> Result<BearerQos> {
    let qci = r.u8()?;
    let priority_level = r.u8()?;
    let flags = r.u8()?;
    let gbr = if r.flag()? {
        Some(GbrQosInfo {
            mbr_dl: r.u64()?,
            gbr_dl: r.u64()?,
        })
    } else {
        None
    };
    Ok(BearerQos {
        qci,
        priority_level,
        preemption_capability: flags & 0x01 != 0,
        preemption_vulnerability: flags & 0x02 != 0,
        gbr,
    })
}

fn get_tnl(r: &mut Reader<'_>) -> Result<TnlInformation> {
    Ok(TnlInformation {
        ip_mc_address: get_ip(r)?,
        ip_source_address: get_ip(r)?,
        gtp_dl_teid: r.u32()?,
    })
}

fn get_ip(r: &mut Reader<'_>) -> Result<IpAddr> {
    match r.u8()? {
        4 => {
            let b = r.take(4)?;
            let mut octets = [0u8; 4];
            octets.copy_from_slice(b);
            Ok(IpAddr::V4(Ipv4Addr::from(octets)))
        }
        16 => {
            let b = r.take(16)?;
            let mut octets = [0u8; 16];
            octets.copy_from_slice(b);
            Ok(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        other => Err(M2apCodecError::InvalidValue(format!(
            "unknown address length tag {other}"
        ))),
    }
}

fn get_cause(r: &mut Reader<'_>) -> Result<Cause> {
    let group = r.u8()?;
    let value = r.u8()?;
    let invalid =
        |group: u8, value: u8| M2apCodecError::InvalidValue(format!("cause {group}/{value}"));
    match group {
        0 => RadioNetworkCause::try_from(value)
            .map(Cause::RadioNetwork)
            .map_err(|_| invalid(group, value)),
        1 => TransportCause::try_from(value)
            .map(Cause::Transport)
            .map_err(|_| invalid(group, value)),
        2 => ProtocolCause::try_from(value)
            .map(Cause::Protocol)
            .map_err(|_| invalid(group, value)),
        3 => MiscCause::try_from(value)
            .map(Cause::Misc)
            .map_err(|_| invalid(group, value)),
        _ => Err(invalid(group, value)),
    }
}

fn get_opt_string(r: &mut Reader<'_>) -> Result<Option<String>> {
    if !r.flag()? {
        return Ok(None);
    }
    let len = r.u16()? as usize;
    let bytes = r.take(len)?;
    let s = std::str::from_utf8(bytes)
        .map_err(|_| M2apCodecError::InvalidValue("string is not valid UTF-8".into()))?;
    Ok(Some(s.to_owned()))
}

fn get_reset_items(r: &mut Reader<'_>) -> Result<Vec<ResetItem>> {
    let count = r.u16()?;
    let mut items = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let mce_mbms_m2ap_id = if r.flag()? { Some(r.u32()?) } else { None };
        let enb_mbms_m2ap_id = if r.flag()? { Some(r.u16()?) } else { None };
        items.push(ResetItem {
            mce_mbms_m2ap_id,
            enb_mbms_m2ap_id,
        });
    }
    Ok(items)
}
