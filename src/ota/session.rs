//! OTA transfer session state machine.
//!
//! A [`TransferSession`] owns the single in-progress reconstruction of an
//! image. Every GATT write goes through [`TransferSession::on_write`], which
//! decodes the buffer, classifies it against the current state, and performs
//! exactly one transition before returning a [`Status`].
//!
//! # Transitions
//!
//! ```text
//! Idle        + offset 0          -> validate -> InProgress | Complete | Idle
//! Idle        + offset != 0       -> Idle (OutOfOrderStart)
//! InProgress  + expected offset   -> InProgress | Complete
//! InProgress  + previous chunk    -> InProgress (rewrite, no advance)
//! InProgress  + new offset 0      -> invalidate, then as Idle + offset 0
//! InProgress  + anything else     -> Aborted (SequenceGap)
//! InProgress  + previous header,
//!               different bytes   -> Aborted (SequenceGap)
//! InProgress  + anything else     -> Aborted (SequenceGap)
//! Complete/Aborted + offset 0     -> as Idle + offset 0
//! Complete/Aborted + offset != 0  -> unchanged (NoActiveSession)
//! ```
//!
//! A rejected offset-0 packet always leaves the session `Idle`, including
//! when it arrives after `Complete` or `Aborted`; later non-zero offsets then
//! get `OutOfOrderStart`. A finished image stays in storage until a new
//! first chunk validates.
//!
//! Payloads are flushed to the [`ChunkWriter`] immediately; the session only
//! keeps the raw bytes of the most recent chunk so it can tell an exact
//! retransmission from a conflicting one.

use super::error::ErrorKind;
use super::image::{ImageValidator, METADATA_SIZE};
use super::packet::{decode, Packet};
use super::policy::{Action, Failure, LenientPolicy, Phase, RecoveryPolicy, Stage};
use super::stats::TransferStats;
use super::writer::{ChunkWriter, SessionId};
use crate::config::OtaConfig;
use log::{debug, error, info, warn};
use std::sync::Arc;

/// Outcome of one `on_write` call, handed back to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Chunk accepted, more expected.
    Accepted,
    /// Chunk accepted and the image is complete.
    AcceptedFinal,
    /// Packet rejected; session state unchanged.
    Rejected(ErrorKind),
    /// Packet rejected and the session discarded; sender must restart at 0.
    Aborted(ErrorKind),
}

/// Acceptance summary of a [`Status`], used to drive acknowledgements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationResult {
    /// Whether the packet was accepted.
    pub accepted: bool,
    /// Why it was not, if it was not.
    pub reason: Option<ErrorKind>,
}

impl Status {
    /// True for `Accepted` and `AcceptedFinal`.
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted | Self::AcceptedFinal)
    }

    /// Reduce to accepted/reason form.
    pub fn validation_result(&self) -> ValidationResult {
        match self {
            Self::Accepted | Self::AcceptedFinal => ValidationResult {
                accepted: true,
                reason: None,
            },
            Self::Rejected(kind) | Self::Aborted(kind) => ValidationResult {
                accepted: false,
                reason: Some(*kind),
            },
        }
    }

    /// ATT error code for the GATT write response (0 on success).
    pub fn att_error_code(&self) -> u8 {
        match self {
            Self::Accepted | Self::AcceptedFinal => 0,
            Self::Rejected(kind) | Self::Aborted(kind) => kind.att_error_code(),
        }
    }
}

/// Offset and declared length of an accepted chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ChunkRef {
    offset: u32,
    length: u32,
}

/// Bookkeeping for a validated transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveTransfer {
    /// Session identifier handed to the writer.
    pub session: SessionId,
    /// Image version from the first chunk.
    pub version: u16,
    /// Declared image length.
    pub total_length: u32,
    /// Next image offset the session accepts.
    pub expected_offset: u32,
    /// Image bytes written so far.
    pub bytes_written: u32,
    /// Most recently accepted chunk.
    last_chunk: ChunkRef,
    /// Raw bytes of the most recently accepted chunk.
    last_raw: Vec<u8>,
}

/// Session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No transfer active.
    Idle,
    /// Reserved; handled exactly like `Idle`.
    AwaitingFirstPacket,
    /// Receiving chunks for a validated image.
    InProgress(ActiveTransfer),
    /// Last transfer was discarded.
    Aborted { reason: ErrorKind },
    /// Last transfer finished.
    Complete {
        session: SessionId,
        total_length: u32,
    },
}

impl SessionState {
    /// Convert state to a string for the GATT status characteristic.
    pub fn to_ble_string(&self) -> String {
        match self {
            Self::Idle | Self::AwaitingFirstPacket => "idle".to_string(),
            Self::InProgress(active) => format!(
                "in_progress:{}/{}",
                active.bytes_written, active.total_length
            ),
            Self::Aborted { reason } => format!("aborted:{}", reason.as_str()),
            Self::Complete { total_length, .. } => format!("complete:{}", total_length),
        }
    }

    fn phase(&self) -> Phase {
        match self {
            Self::InProgress(_) => Phase::InProgress,
            _ => Phase::Inactive,
        }
    }
}

/// What a decoded packet means in the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// Validate and begin a new transfer.
    Start,
    /// Discard the active transfer, then begin a new one.
    Restart(SessionId),
    /// Next contiguous chunk.
    Append,
    /// Exact retransmission of the previous chunk.
    Duplicate,
    /// Rejected outside a transfer.
    Reject(ErrorKind),
    /// Gap or corruption inside a transfer.
    Break(ErrorKind),
}

/// Reassembles one OTA image at a time from GATT writes.
pub struct TransferSession<W, P = LenientPolicy> {
    writer: W,
    policy: P,
    validator: ImageValidator,
    max_payload: usize,
    state: SessionState,
    /// Finished session whose bytes still occupy the slot.
    stale: Option<SessionId>,
    next_session: u32,
    stats: Arc<TransferStats>,
}

impl<W: ChunkWriter> TransferSession<W> {
    /// Create an idle session with the default recovery policy.
    pub fn new(writer: W, config: &OtaConfig) -> Self {
        Self::with_policy(writer, config, LenientPolicy)
    }
}

impl<W: ChunkWriter, P: RecoveryPolicy> TransferSession<W, P> {
    /// Create an idle session with a custom recovery policy.
    pub fn with_policy(writer: W, config: &OtaConfig, policy: P) -> Self {
        Self {
            writer,
            policy,
            validator: ImageValidator::from_config(config),
            max_payload: config.max_payload(),
            state: SessionState::Idle,
            stale: None,
            next_session: 1,
            stats: Arc::new(TransferStats::new()),
        }
    }

    /// Share decision counters with an external reporter.
    pub fn with_stats(mut self, stats: Arc<TransferStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Process one raw GATT write.
    pub fn on_write(&mut self, raw: &[u8]) -> Status {
        let packet = match decode(raw, self.max_payload) {
            Ok(packet) => packet,
            Err(kind) => return self.fail(kind, Stage::Decode),
        };

        match self.classify(&packet, raw) {
            Step::Start => self.begin(&packet, raw),
            Step::Restart(previous) => {
                info!("Restarting transfer: session {} superseded", previous);
                self.stats.record_restart();
                self.state = SessionState::Idle;
                if let Err(e) = self.writer.invalidate(previous) {
                    error!("Failed to invalidate session {}: {}", previous, e);
                    return self.fail(ErrorKind::WriteFailed, Stage::Storage);
                }
                self.begin(&packet, raw)
            }
            Step::Append => self.append(&packet, raw),
            Step::Duplicate => self.rewrite(&packet),
            Step::Reject(kind) | Step::Break(kind) => self.fail(kind, Stage::Sequence),
        }
    }

    fn classify(&self, packet: &Packet<'_>, raw: &[u8]) -> Step {
        let active = match &self.state {
            SessionState::InProgress(active) => active,
            SessionState::Idle | SessionState::AwaitingFirstPacket => {
                return if packet.is_first() {
                    Step::Start
                } else {
                    Step::Reject(ErrorKind::OutOfOrderStart)
                };
            }
            SessionState::Complete { .. } | SessionState::Aborted { .. } => {
                return if packet.is_first() {
                    Step::Start
                } else {
                    Step::Reject(ErrorKind::NoActiveSession)
                };
            }
        };

        let chunk = ChunkRef {
            offset: packet.header.offset,
            length: packet.header.length,
        };
        let same_header = chunk == active.last_chunk;
        let is_resend = same_header && raw == active.last_raw.as_slice();

        if is_resend && self.policy.accepts_duplicates() {
            Step::Duplicate
        } else if packet.is_first() {
            Step::Restart(active.session)
        } else if same_header {
            // Previous chunk resent with different bytes
            Step::Break(ErrorKind::SequenceGap)
        } else if chunk.offset == active.expected_offset {
            let end = chunk.offset as u64 + chunk.length as u64;
            if end > active.total_length as u64 {
                Step::Break(ErrorKind::PayloadOverflow)
            } else {
                Step::Append
            }
        } else {
            Step::Break(ErrorKind::SequenceGap)
        }
    }

    /// Validate a first chunk and start a session from it.
    fn begin(&mut self, packet: &Packet<'_>, raw: &[u8]) -> Status {
        let image = match self.validator.validate(packet.payload) {
            Ok(image) => image,
            Err(kind) => {
                self.state = SessionState::Idle;
                return self.fail(kind, Stage::Sequence);
            }
        };

        if let Some(previous) = self.stale.take() {
            if let Err(e) = self.writer.invalidate(previous) {
                error!("Failed to invalidate finished session {}: {}", previous, e);
                return self.fail(ErrorKind::WriteFailed, Stage::Storage);
            }
        }

        let session = SessionId(self.next_session);
        self.next_session = self.next_session.wrapping_add(1);

        let data = &packet.payload[METADATA_SIZE..];
        // Adopt the session before writing so a failed write invalidates it
        self.state = SessionState::InProgress(ActiveTransfer {
            session,
            version: image.version,
            total_length: image.total_length,
            expected_offset: 0,
            bytes_written: 0,
            last_chunk: ChunkRef {
                offset: packet.header.offset,
                length: packet.header.length,
            },
            last_raw: raw.to_vec(),
        });

        if let Err(e) = self.writer.write(0, data) {
            error!("Session {}: {}", session, e);
            return self.fail(ErrorKind::WriteFailed, Stage::Storage);
        }

        info!(
            "Session {} started: version={} total_length={}",
            session, image.version, image.total_length
        );
        self.advance(data.len() as u32)
    }

    fn append(&mut self, packet: &Packet<'_>, raw: &[u8]) -> Status {
        let SessionState::InProgress(active) = &mut self.state else {
            return Status::Rejected(ErrorKind::NoActiveSession);
        };
        let session = active.session;
        active.last_chunk = ChunkRef {
            offset: packet.header.offset,
            length: packet.header.length,
        };
        active.last_raw.clear();
        active.last_raw.extend_from_slice(raw);

        if let Err(e) = self.writer.write(packet.header.offset, packet.payload) {
            error!("Session {}: {}", session, e);
            return self.fail(ErrorKind::WriteFailed, Stage::Storage);
        }
        self.advance(packet.payload.len() as u32)
    }

    /// Record `len` freshly written bytes and complete the session if done.
    fn advance(&mut self, len: u32) -> Status {
        let SessionState::InProgress(active) = &mut self.state else {
            return Status::Rejected(ErrorKind::NoActiveSession);
        };
        active.expected_offset += len;
        active.bytes_written += len;
        self.stats.record_accepted(len as usize);
        debug!(
            "Session {} chunk accepted: {}/{} bytes",
            active.session, active.bytes_written, active.total_length
        );

        if active.bytes_written < active.total_length {
            return Status::Accepted;
        }

        let session = active.session;
        let total_length = active.total_length;
        if let Err(e) = self.writer.finalize(session, total_length) {
            error!("Session {} could not be finalized: {}", session, e);
            return self.fail(ErrorKind::WriteFailed, Stage::Storage);
        }

        info!("Session {} complete: {} bytes", session, total_length);
        self.state = SessionState::Complete {
            session,
            total_length,
        };
        self.stale = Some(session);
        self.stats.record_completed();
        Status::AcceptedFinal
    }

    /// Rewrite the previous chunk without advancing.
    fn rewrite(&mut self, packet: &Packet<'_>) -> Status {
        let SessionState::InProgress(active) = &self.state else {
            return Status::Rejected(ErrorKind::NoActiveSession);
        };
        let session = active.session;
        let data = if packet.is_first() {
            &packet.payload[METADATA_SIZE..]
        } else {
            packet.payload
        };

        if let Err(e) = self.writer.write(packet.header.offset, data) {
            error!("Session {}: {}", session, e);
            return self.fail(ErrorKind::WriteFailed, Stage::Storage);
        }
        debug!(
            "Session {} duplicate chunk at offset {} rewritten",
            session, packet.header.offset
        );
        self.stats.record_duplicate();
        Status::Accepted
    }

    fn fail(&mut self, kind: ErrorKind, stage: Stage) -> Status {
        let failure = Failure {
            kind,
            stage,
            phase: self.state.phase(),
        };
        let action = match stage {
            Stage::Storage => Action::Abort,
            _ => self.policy.decide(failure),
        };
        match action {
            Action::Report => {
                warn!("Packet rejected: {} ({})", kind, self.state.to_ble_string());
                self.stats.record_rejected();
                Status::Rejected(kind)
            }
            Action::Abort => self.abort(kind),
        }
    }

    /// Discard the active session, if any, and enter `Aborted`.
    fn abort(&mut self, reason: ErrorKind) -> Status {
        let previous = std::mem::replace(&mut self.state, SessionState::Aborted { reason });
        if let SessionState::InProgress(active) = previous {
            warn!(
                "Session {} aborted at {}/{} bytes: {}",
                active.session, active.bytes_written, active.total_length, reason
            );
            if let Err(e) = self.writer.invalidate(active.session) {
                error!("Failed to invalidate session {}: {}", active.session, e);
            }
        } else {
            warn!("Transfer aborted: {}", reason);
        }
        self.stats.record_aborted();
        Status::Aborted(reason)
    }

    /// Current state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Next offset accepted, or 0 when no transfer is active.
    pub fn expected_offset(&self) -> u32 {
        match &self.state {
            SessionState::InProgress(active) => active.expected_offset,
            _ => 0,
        }
    }

    /// Declared image length of the active or finished transfer.
    pub fn total_length(&self) -> u32 {
        match &self.state {
            SessionState::InProgress(active) => active.total_length,
            SessionState::Complete { total_length, .. } => *total_length,
            _ => 0,
        }
    }

    /// Bytes written by the active or finished transfer.
    pub fn bytes_written(&self) -> u32 {
        match &self.state {
            SessionState::InProgress(active) => active.bytes_written,
            SessionState::Complete { total_length, .. } => *total_length,
            _ => 0,
        }
    }

    /// True once the current transfer's first chunk passed validation.
    pub fn image_signature_ok(&self) -> bool {
        matches!(
            self.state,
            SessionState::InProgress(_) | SessionState::Complete { .. }
        )
    }

    /// Shared decision counters.
    pub fn stats(&self) -> Arc<TransferStats> {
        Arc::clone(&self.stats)
    }

    /// Borrow the chunk writer.
    pub fn writer(&self) -> &W {
        &self.writer
    }

}
