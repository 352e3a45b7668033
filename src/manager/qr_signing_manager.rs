//! Drives one QR signing flow from start to finish.
//!
//! Steps: `TransactionInfo -> DisplayPayload -> ScanQr -> SendingTx`, then the session
//! ends on a successful submission or on cancel. Only one session is active at a time.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use flume::Receiver;
use parking_lot::Mutex;
use tracing::{debug, error, info, trace, warn};

use crate::{
    animated_qr::{AnimatedQr, AnimatedQrError, generate_images},
    config::QrDisplayConfig,
    qr_scanner::{QrScanner, ScanEvent},
    scan::{ScanMode, ScanResult},
    uos::{BinaryFrame, SigningRequest, UosError},
};

use super::message_sender::{MessageSender, SingleOrMany};

type Message = QrSigningManagerReconcileMessage;
type Reconciler = dyn QrSigningManagerReconciler;
pub type Error = QrSigningError;
type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, uniffi::Enum)]
pub enum QrSigningStep {
    TransactionInfo,
    DisplayPayload,
    ScanQr,
    SendingTx,
}

#[derive(Debug, Clone, PartialEq, Eq, uniffi::Enum)]
pub enum QrSigningManagerReconcileMessage {
    StepChanged(QrSigningStep),
    DisplayFrameChanged(u32),
    ScanRejected(String),
    SubmissionFailed(String),
    Completed(String),
    Cancelled,
}

#[uniffi::export(callback_interface)]
pub trait QrSigningManagerReconciler: Send + Sync + std::fmt::Debug + 'static {
    /// tells the frontend to reconcile the manager changes
    fn reconcile(&self, message: Message);
    fn reconcile_many(&self, messages: Vec<Message>);
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, uniffi::Error)]
pub enum SubmissionError {
    #[error("{0}")]
    Rejected(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl From<uniffi::UnexpectedUniFFICallbackError> for SubmissionError {
    fn from(error: uniffi::UnexpectedUniFFICallbackError) -> Self {
        Self::Unexpected(error.reason)
    }
}

/// Hands a signature to whatever broadcasts it
#[async_trait]
pub trait SignatureSubmitter: Send + Sync + std::fmt::Debug + 'static {
    async fn submit(
        &self,
        request: SigningRequest,
        signature: String,
    ) -> Result<String, SubmissionError>;
}

/// Submitter implemented by the frontend
#[uniffi::export(callback_interface)]
pub trait SignatureSubmitterCallback: Send + Sync + std::fmt::Debug + 'static {
    fn submit(
        &self,
        request: SigningRequest,
        signature: String,
    ) -> Result<String, SubmissionError>;
}

#[derive(Debug)]
struct ForeignSubmitter(Arc<dyn SignatureSubmitterCallback>);

#[async_trait]
impl SignatureSubmitter for ForeignSubmitter {
    async fn submit(
        &self,
        request: SigningRequest,
        signature: String,
    ) -> Result<String, SubmissionError> {
        let callback = self.0.clone();

        uos_tokio::unblock::run_blocking(move || callback.submit(request, signature))
            .await
            .map_err(|error| SubmissionError::Unexpected(error.to_string()))?
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, uniffi::Error)]
pub enum QrSigningError {
    #[error("a signing session is already active")]
    SessionAlreadyActive,

    #[error("no active signing session")]
    NoActiveSession,

    #[error("session was cancelled before submission finished")]
    SessionCancelled,

    #[error("expected step {expected}, session is at {found}")]
    InvalidStep { expected: QrSigningStep, found: QrSigningStep },

    #[error("unable to encode payload: {0}")]
    Encoding(#[from] UosError),

    #[error("unable to display payload: {0}")]
    Display(#[from] AnimatedQrError),

    #[error(transparent)]
    Submission(#[from] SubmissionError),

    #[error("no signature has been scanned")]
    MissingSignature,

    #[error("submission already in progress")]
    SubmissionInProgress,
}

/// Outcome of handing one camera read to the manager
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Enum)]
pub enum QrScanOutcome {
    /// Paused scanner or a repeat of the last read
    Ignored,
    /// Not a signature, scanner keeps running
    Rejected { reason: String },
    Submitted { result: String },
}

/// Read only view of the session for the frontend
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct QrSigningSessionState {
    pub id: u64,
    pub step: QrSigningStep,
    pub request: SigningRequest,
    pub frame_count: u32,
    pub signature: Option<String>,
    pub last_error: Option<String>,
    pub is_submitting: bool,
}

#[derive(Debug)]
pub struct QrSigningSession {
    id: u64,
    request: SigningRequest,
    step: QrSigningStep,
    frame: Option<BinaryFrame>,
    display: Option<Arc<AnimatedQr>>,
    frame_count: u32,
    scanner: QrScanner,
    scan_result: Option<ScanResult>,
    last_error: Option<String>,
    submitting: bool,
}

impl QrSigningSession {
    fn new(id: u64, request: SigningRequest) -> Self {
        Self {
            id,
            request,
            step: QrSigningStep::TransactionInfo,
            frame: None,
            display: None,
            frame_count: 0,
            scanner: QrScanner::new(ScanMode::Signature),
            scan_result: None,
            last_error: None,
            submitting: false,
        }
    }

    fn expect_step(&self, expected: QrSigningStep) -> Result<()> {
        if self.step != expected {
            return Err(Error::InvalidStep { expected, found: self.step });
        }

        Ok(())
    }

    fn signature(&self) -> Option<String> {
        self.scan_result.as_ref().and_then(ScanResult::signature).map(ToString::to_string)
    }

    fn stop_display(&mut self) {
        if let Some(display) = self.display.take() {
            display.stop();
        }
    }

    fn state(&self) -> QrSigningSessionState {
        QrSigningSessionState {
            id: self.id,
            step: self.step,
            request: self.request.clone(),
            frame_count: self.frame_count,
            signature: self.signature(),
            last_error: self.last_error.clone(),
            is_submitting: self.submitting,
        }
    }
}

impl Drop for QrSigningSession {
    fn drop(&mut self) {
        self.stop_display();
    }
}

#[derive(Debug, uniffi::Object)]
pub struct RustQrSigningManager {
    session: Arc<Mutex<Option<QrSigningSession>>>,
    config: QrDisplayConfig,
    submitter: Arc<dyn SignatureSubmitter>,
    next_session_id: AtomicU64,

    reconciler: MessageSender<Message>,
    reconcile_receiver: Arc<Receiver<SingleOrMany<Message>>>,
}

impl RustQrSigningManager {
    pub fn with_submitter(submitter: Arc<dyn SignatureSubmitter>, config: QrDisplayConfig) -> Self {
        let (sender, receiver) = flume::bounded(1000);

        Self {
            session: Arc::new(Mutex::new(None)),
            config,
            submitter,
            next_session_id: AtomicU64::new(1),
            reconciler: MessageSender::new(sender),
            reconcile_receiver: Arc::new(receiver),
        }
    }

    fn send(&self, message: Message) {
        self.reconciler.send(message);
    }

    /// Run `f` against the active session
    fn with_session<T>(&self, f: impl FnOnce(&mut QrSigningSession) -> Result<T>) -> Result<T> {
        let mut guard = self.session.lock();
        let session = guard.as_mut().ok_or(Error::NoActiveSession)?;
        f(session)
    }

    fn build_display(&self, frame: &BinaryFrame) -> Result<Arc<AnimatedQr>> {
        let images = generate_images(frame, false, &self.config)?;
        let sender = self.reconciler.clone();

        let display = AnimatedQr::with_listener(images, self.config.frame_delay(), move |index| {
            sender.send(Message::DisplayFrameChanged(index))
        });

        Ok(Arc::new(display))
    }

    /// Render the payload for the session at `expected` and switch it to the display step
    fn show_payload(&self, expected: QrSigningStep) -> Result<Arc<AnimatedQr>> {
        let (id, request, frame) = self.with_session(|session| {
            session.expect_step(expected)?;
            Ok((session.id, session.request.clone(), session.frame.clone()))
        })?;

        // rendering is slow, the session stays unlocked until the swap
        let frame = match frame {
            Some(frame) => frame,
            None => request.build_frame()?,
        };

        let display = self.build_display(&frame)?;
        self.install_display(id, expected, frame, display)
    }

    fn install_display(
        &self,
        id: u64,
        expected: QrSigningStep,
        frame: BinaryFrame,
        display: Arc<AnimatedQr>,
    ) -> Result<Arc<AnimatedQr>> {
        let mut guard = self.session.lock();
        let Some(session) = guard.as_mut().filter(|session| session.id == id) else {
            debug!("session {id} ended while rendering, dropping display");
            display.stop();
            return Err(Error::SessionCancelled);
        };

        if let Err(error) = session.expect_step(expected) {
            display.stop();
            return Err(error);
        }

        session.stop_display();
        session.frame_count = display.frame_count();
        session.frame = Some(frame);
        session.display = Some(display.clone());
        session.scanner.pause();
        session.step = QrSigningStep::DisplayPayload;

        Ok(display)
    }

    async fn submit(&self, id: u64, request: SigningRequest, signature: String) -> Result<QrScanOutcome> {
        debug!("submitting signature for session {id}");
        let result = self.submitter.submit(request, signature).await;

        let mut guard = self.session.lock();
        let Some(session) = guard.as_mut().filter(|session| session.id == id) else {
            warn!("session {id} is gone, dropping submission result");
            return Err(Error::SessionCancelled);
        };

        match result {
            Ok(outcome) => {
                info!("session {id} submitted");
                *guard = None;
                drop(guard);

                self.send(Message::Completed(outcome.clone()));
                Ok(QrScanOutcome::Submitted { result: outcome })
            }
            Err(error) => {
                error!("session {id} submission failed: {error}");
                session.submitting = false;
                session.last_error = Some(error.to_string());
                drop(guard);

                self.send(Message::SubmissionFailed(error.to_string()));
                Err(error.into())
            }
        }
    }
}

#[uniffi::export(async_runtime = "tokio")]
impl RustQrSigningManager {
    #[uniffi::constructor]
    pub fn new(submitter: Box<dyn SignatureSubmitterCallback>, config: QrDisplayConfig) -> Self {
        let submitter = ForeignSubmitter(Arc::from(submitter));
        Self::with_submitter(Arc::new(submitter), config)
    }

    #[uniffi::method]
    pub fn listen_for_updates(&self, reconciler: Box<Reconciler>) {
        let reconcile_receiver = self.reconcile_receiver.clone();

        uos_tokio::task::spawn(async move {
            while let Ok(field) = reconcile_receiver.recv_async().await {
                trace!("reconcile_receiver: {field:?}");
                match field {
                    SingleOrMany::Single(message) => reconciler.reconcile(message),
                    SingleOrMany::Many(messages) => reconciler.reconcile_many(messages),
                }
            }
        });
    }

    /// Start a new flow at the transaction info step, returns the session id
    #[uniffi::method]
    pub fn start_session(&self, request: SigningRequest) -> Result<u64> {
        let mut guard = self.session.lock();
        if guard.is_some() {
            return Err(Error::SessionAlreadyActive);
        }

        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        debug!("starting qr signing session {id}");
        *guard = Some(QrSigningSession::new(id, request));
        drop(guard);

        self.send(Message::StepChanged(QrSigningStep::TransactionInfo));
        Ok(id)
    }

    /// User confirmed, encode the payload and show it
    #[uniffi::method]
    pub fn confirm_sign(&self) -> Result<Arc<AnimatedQr>> {
        let display = self.show_payload(QrSigningStep::TransactionInfo)?;

        self.send(Message::StepChanged(QrSigningStep::DisplayPayload));
        Ok(display)
    }

    /// Companion device is showing its signature, switch to the camera
    #[uniffi::method]
    pub fn open_scanner(&self) -> Result<()> {
        self.with_session(|session| {
            session.expect_step(QrSigningStep::DisplayPayload)?;
            session.stop_display();
            session.scanner.resume();
            session.last_error = None;
            session.step = QrSigningStep::ScanQr;
            Ok(())
        })?;

        self.send(Message::StepChanged(QrSigningStep::ScanQr));
        Ok(())
    }

    /// Back from the camera to the payload
    #[uniffi::method]
    pub fn close_scanner(&self) -> Result<Arc<AnimatedQr>> {
        let display = self.show_payload(QrSigningStep::ScanQr)?;

        self.send(Message::StepChanged(QrSigningStep::DisplayPayload));
        Ok(display)
    }

    /// Camera could not be opened or permission was denied
    #[uniffi::method]
    pub fn scanner_unavailable(&self) -> Result<Arc<AnimatedQr>> {
        warn!("scanner unavailable, returning to payload display");
        self.close_scanner()
    }

    /// Handle one camera read while scanning
    #[uniffi::method]
    pub async fn scan(&self, raw: String) -> Result<QrScanOutcome> {
        let submission = self.with_session(|session| {
            session.expect_step(QrSigningStep::ScanQr)?;

            let result = match session.scanner.on_read(&raw) {
                ScanEvent::Ignored | ScanEvent::Duplicate => return Ok(Err(QrScanOutcome::Ignored)),
                ScanEvent::Unrecognized => {
                    let reason = "not a signature qr code".to_string();
                    return Ok(Err(QrScanOutcome::Rejected { reason }));
                }
                ScanEvent::Classified { result, .. } => result,
            };

            let Some(signature) = result.signature().map(ToString::to_string) else {
                let reason = format!("expected a signature, found {}", result.kind());
                session.scanner.dismiss();
                return Ok(Err(QrScanOutcome::Rejected { reason }));
            };

            session.scan_result = Some(result);
            session.step = QrSigningStep::SendingTx;
            session.submitting = true;

            Ok(Ok((session.id, session.request.clone(), signature)))
        })?;

        let (id, request, signature) = match submission {
            Ok(submission) => submission,
            Err(QrScanOutcome::Rejected { reason }) => {
                debug!("scan rejected: {reason}");
                self.send(Message::ScanRejected(reason.clone()));
                return Ok(QrScanOutcome::Rejected { reason });
            }
            Err(outcome) => return Ok(outcome),
        };

        self.send(Message::StepChanged(QrSigningStep::SendingTx));
        self.submit(id, request, signature).await
    }

    /// Try the submission again after a failure
    #[uniffi::method]
    pub async fn retry_submit(&self) -> Result<QrScanOutcome> {
        let (id, request, signature) = self.with_session(|session| {
            session.expect_step(QrSigningStep::SendingTx)?;

            if session.submitting {
                return Err(Error::SubmissionInProgress);
            }

            let signature = session.signature().ok_or(Error::MissingSignature)?;
            session.submitting = true;
            session.last_error = None;

            Ok((session.id, session.request.clone(), signature))
        })?;

        self.submit(id, request, signature).await
    }

    /// Drop the session from any step
    #[uniffi::method]
    pub fn cancel(&self) {
        let Some(session) = self.session.lock().take() else {
            return;
        };

        debug!("cancelled qr signing session {} at {}", session.id, session.step);
        drop(session);

        self.send(Message::Cancelled);
    }

    #[uniffi::method]
    pub fn step(&self) -> Option<QrSigningStep> {
        self.session.lock().as_ref().map(|session| session.step)
    }

    #[uniffi::method]
    pub fn session_state(&self) -> Option<QrSigningSessionState> {
        self.session.lock().as_ref().map(QrSigningSession::state)
    }

    /// The payload display, only while at the display step
    #[uniffi::method]
    pub fn display(&self) -> Option<Arc<AnimatedQr>> {
        self.session.lock().as_ref().and_then(|session| session.display.clone())
    }

    #[uniffi::method]
    pub fn config(&self) -> QrDisplayConfig {
        self.config
    }
}
