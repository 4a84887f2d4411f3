//! Drives one upload through the state machine.

use log::{debug, info, warn};
use serde_json::{json, Value};

use crate::dispatch::{ApiResponse, Dispatcher};
use crate::error::{Error, PollStop, Result, UploadPhase};
use crate::http::HttpMethod;
use crate::params::{ParamValue, Urn};
use crate::transport::Transport;

use super::poll::wait_until_ready;
use super::pool::run_chunks;
use super::session::UploadSession;
use super::source::ByteSource;
use super::state::{transition, UploadEvent, UploadState};
use super::{MediaKind, UploadOptions, UploadOutcome};

pub struct UploadRequest<'a> {
    pub kind: MediaKind,
    pub owner: &'a str,
    pub source: &'a dyn ByteSource,
    /// Poll until processing completes.
    pub wait: bool,
}

pub struct Uploader<'d, T: Transport> {
    dispatcher: &'d Dispatcher<T>,
    options: UploadOptions,
}

/// Bookkeeping for one run: the current state plus the context failures
/// are tagged with.
struct Run {
    state: UploadState,
    owner: String,
    asset: Option<String>,
}

impl Run {
    fn advance(&mut self, event: UploadEvent) -> Result<()> {
        let next = transition(self.state, event)?;
        debug!("upload {} -> {next}", self.state);
        self.state = next;
        Ok(())
    }

    fn fail(&mut self, phase: UploadPhase, chunk: Option<usize>, source: Error) -> Error {
        if let Ok(next) = transition(self.state, UploadEvent::Failed(phase)) {
            self.state = next;
        }
        warn!("upload {phase} phase failed: {source}");
        Error::UploadPhase {
            phase,
            owner: self.owner.clone(),
            asset: self.asset.clone(),
            chunk,
            source: Box::new(source),
        }
    }
}

impl<'d, T: Transport> Uploader<'d, T> {
    pub fn new(dispatcher: &'d Dispatcher<T>, options: UploadOptions) -> Self {
        Self { dispatcher, options }
    }

    pub fn run(&self, request: &UploadRequest<'_>) -> Result<UploadOutcome> {
        self.options.validate()?;
        let owner = Urn::parse(request.owner)?;
        let size = request.source.len();
        if size == 0 {
            return Err(Error::Source(format!("{} is empty", request.source.name())));
        }

        let mut run = Run {
            state: UploadState::Unregistered,
            owner: owner.to_string(),
            asset: None,
        };

        let mut session = self
            .register(request.kind, owner, size)
            .map_err(|e| run.fail(UploadPhase::Register, None, e))?;
        run.asset = Some(session.asset.clone());
        run.advance(UploadEvent::Registered)?;
        info!(
            "registered {} ({} bytes, {} upload request(s))",
            session.asset,
            size,
            session.chunks.len()
        );

        run.advance(UploadEvent::UploadStarted)?;
        self.upload(&mut session, request.source).map_err(|(chunk, e)| {
            let chunk = if session.is_chunked() { chunk } else { None };
            run.fail(UploadPhase::Upload, chunk, e)
        })?;
        run.advance(UploadEvent::ChunksAcknowledged {
            pending: session.pending(),
        })?;
        info!("uploaded {} chunk(s) of {}", session.chunks.len(), session.asset);

        let asset = self
            .finalize(&session)
            .map_err(|e| run.fail(UploadPhase::Finalize, None, e))?;
        session.completed = true;
        run.asset = Some(asset.clone());
        run.advance(UploadEvent::Finalized { wait: request.wait })?;
        info!("finalized {asset}");

        let mut outcome = UploadOutcome {
            asset: asset.clone(),
            kind: request.kind,
            size,
            chunks: session.chunks.len(),
            confirmed: false,
            status: None,
            polls: 0,
        };
        if !request.wait {
            return Ok(outcome);
        }

        match wait_until_ready(self.dispatcher, request.kind, &asset, &self.options) {
            Ok(result) => {
                run.advance(UploadEvent::ProcessingComplete)?;
                outcome.confirmed = true;
                outcome.status = Some(result.status);
                outcome.polls = result.polls;
                Ok(outcome)
            }
            Err(Error::PollTimeout { asset, reason }) => {
                match reason {
                    PollStop::Cancelled => warn!("stopped waiting for {asset}: interrupted"),
                    PollStop::TimedOut { attempts } => {
                        warn!("stopped waiting for {asset} after {attempts} status check(s)")
                    }
                }
                Err(Error::PollTimeout { asset, reason })
            }
            Err(e) => Err(run.fail(UploadPhase::Poll, None, e)),
        }
    }

    fn register(&self, kind: MediaKind, owner: Urn, size: u64) -> Result<UploadSession> {
        let body = match kind {
            MediaKind::Image => json!({
                "initializeUploadRequest": { "owner": owner.as_str() }
            }),
            MediaKind::Video => json!({
                "initializeUploadRequest": {
                    "owner": owner.as_str(),
                    "fileSizeBytes": size,
                    "uploadCaptions": false,
                    "uploadThumbnail": false
                }
            }),
        };
        let response = self.action(kind, "initializeUpload", &body)?;
        UploadSession::from_register(kind, owner, size, &response.json()?, &self.options)
    }

    /// Upload every chunk. Images carry the bearer token; video part URLs
    /// are presigned and must not. Video parts must answer with an ETag.
    fn upload(
        &self,
        session: &mut UploadSession,
        source: &dyn ByteSource,
    ) -> std::result::Result<(), (Option<usize>, Error)> {
        let kind = session.kind;
        let chunks = &session.chunks;
        let cancel = self.dispatcher.cancel_token();
        let etags = run_chunks(chunks.len(), self.options.parallelism, cancel, |index, token| {
            let chunk = &chunks[index];
            let bytes = source.read_range(chunk.range.offset, chunk.range.len)?;
            debug!(
                "uploading chunk {index} ({} bytes at {})",
                chunk.range.len, chunk.range.offset
            );
            let response = self
                .dispatcher
                .put_bytes(&chunk.url, bytes, kind == MediaKind::Image, token)?;
            let etag = response
                .header("etag")
                .map(|etag| etag.trim_matches('"').to_string());
            if kind == MediaKind::Video && etag.is_none() {
                return Err(Error::Response(format!(
                    "upload of chunk {index} returned no ETag"
                )));
            }
            Ok(etag)
        })
        .map_err(|failure| (Some(failure.index), failure.error))?;

        for (index, etag) in etags.into_iter().enumerate() {
            session.acknowledge(index, etag);
        }
        Ok(())
    }

    /// Finalize and return the asset URN, preferring what the server reports.
    fn finalize(&self, session: &UploadSession) -> Result<String> {
        let mut request = serde_json::Map::new();
        request.insert(
            session.kind.field().to_string(),
            Value::String(session.asset.clone()),
        );
        request.insert(
            "uploadToken".to_string(),
            Value::String(session.upload_token.clone()),
        );
        request.insert("uploadedPartIds".to_string(), json!(session.part_ids()));
        let body = json!({ "finalizeUploadRequest": request });

        let response = self.action(session.kind, "finalizeUpload", &body)?;
        let reported = response.json().ok().and_then(|value| {
            let field = session.kind.field();
            value
                .pointer(&format!("/value/{field}"))
                .or_else(|| value.get(field))
                .and_then(Value::as_str)
                .map(str::to_string)
        });
        Ok(reported
            .or(response.restli_id)
            .unwrap_or_else(|| session.asset.clone()))
    }

    fn action(&self, kind: MediaKind, action: &str, body: &Value) -> Result<ApiResponse> {
        let request = self.dispatcher.plan(
            HttpMethod::Post,
            &format!("/{}", kind.collection()),
            &[("action".to_string(), ParamValue::string(action))],
            Some(body),
            &[],
        )?;
        self.dispatcher.execute(&request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::config::{ClientConfig, RetryPolicy};
    use crate::error::{TransportError, EXIT_FAILURE, EXIT_UNKNOWN_OUTCOME};
    use crate::http::{HttpRequest, HttpResponse};
    use crate::transport::testing::ScriptedTransport;
    use crate::upload::MemorySource;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    const OWNER: &str = "urn:li:organization:2414183";

    type PartResult = std::result::Result<HttpResponse, TransportError>;

    fn config() -> ClientConfig {
        let mut config = ClientConfig::new("token").with_base_url("http://api.test/rest");
        config.retry = RetryPolicy::immediate(2);
        config
    }

    fn small_options() -> UploadOptions {
        UploadOptions {
            chunk_threshold: 10,
            chunk_size: 10,
            parallelism: 3,
            poll_interval: Duration::from_millis(1),
            max_polls: 5,
            poll_timeout: Duration::from_secs(5),
        }
    }

    fn request<'a>(kind: MediaKind, source: &'a MemorySource, wait: bool) -> UploadRequest<'a> {
        UploadRequest {
            kind,
            owner: OWNER,
            source,
            wait,
        }
    }

    fn is_action(request: &HttpRequest, action: &str) -> bool {
        request.url.ends_with(&format!("?action={action}"))
    }

    fn ok_with_etag(etag: &str) -> PartResult {
        Ok(HttpResponse::new(200, "").with_header("ETag", etag))
    }

    /// A video backend with `parts` upload URLs of 10 bytes each.
    fn video_backend(
        parts: usize,
        part: impl Fn(&HttpRequest, usize) -> PartResult + Send + Sync + 'static,
    ) -> ScriptedTransport {
        ScriptedTransport::new(move |request| {
            if is_action(request, "initializeUpload") {
                let instructions: Vec<Value> = (0..parts)
                    .map(|i| {
                        json!({
                            "uploadUrl": format!("http://upload.test/part/{i}"),
                            "firstByte": i * 10,
                            "lastByte": i * 10 + 9
                        })
                    })
                    .collect();
                let body = json!({"value": {
                    "video": "urn:li:video:C5F10",
                    "uploadToken": "tok",
                    "uploadInstructions": instructions
                }});
                return Ok(HttpResponse::new(200, body.to_string()));
            }
            if is_action(request, "finalizeUpload") {
                return Ok(HttpResponse::new(200, ""));
            }
            if let Some(index) = request.url.strip_prefix("http://upload.test/part/") {
                return part(request, index.parse().unwrap());
            }
            Ok(HttpResponse::new(404, "unexpected"))
        })
    }

    /// A single-part video backend whose status endpoint answers `status`.
    fn polled_backend(
        status: &'static str,
        on_status: impl Fn() + Send + Sync + 'static,
    ) -> ScriptedTransport {
        ScriptedTransport::new(move |request| {
            if is_action(request, "initializeUpload") {
                let body = json!({"value": {
                    "video": "urn:li:video:9",
                    "uploadToken": "",
                    "uploadUrl": "http://upload.test/part/0"
                }});
                return Ok(HttpResponse::new(200, body.to_string()));
            }
            if request.url.contains("/videos/") {
                on_status();
                return Ok(HttpResponse::new(200, format!(r#"{{"status":"{status}"}}"#)));
            }
            ok_with_etag("e")
        })
    }

    #[test]
    fn chunked_video_finalizes_with_ordered_etags() {
        let transport = video_backend(3, |_, index| ok_with_etag(&format!("\"etag-{index}\"")));
        let dispatcher = Dispatcher::new(&transport, config()).unwrap();
        let source = MemorySource::new("clip.mp4", vec![7u8; 30]);
        let outcome = Uploader::new(&dispatcher, small_options())
            .run(&request(MediaKind::Video, &source, false))
            .unwrap();
        assert_eq!(outcome.asset, "urn:li:video:C5F10");
        assert_eq!(outcome.chunks, 3);
        assert!(!outcome.confirmed);

        let requests = transport.requests();
        let finalize = requests
            .iter()
            .find(|r| is_action(r, "finalizeUpload"))
            .unwrap();
        let body: Value = serde_json::from_slice(finalize.body.as_deref().unwrap()).unwrap();
        assert_eq!(
            body,
            json!({"finalizeUploadRequest": {
                "video": "urn:li:video:C5F10",
                "uploadToken": "tok",
                "uploadedPartIds": ["etag-0", "etag-1", "etag-2"]
            }})
        );
        let part = requests.iter().find(|r| r.url.contains("/part/")).unwrap();
        assert!(part.header("authorization").is_none());
    }

    #[test]
    fn finalize_waits_for_slow_chunks() {
        let finished = Arc::new(AtomicUsize::new(0));
        let seen = finished.clone();
        let transport = ScriptedTransport::new(move |request| {
            if is_action(request, "initializeUpload") {
                let body = json!({"value": {
                    "video": "urn:li:video:1",
                    "uploadToken": "",
                    "uploadInstructions": [
                        {"uploadUrl": "http://upload.test/part/0", "firstByte": 0, "lastByte": 9},
                        {"uploadUrl": "http://upload.test/part/1", "firstByte": 10, "lastByte": 19}
                    ]
                }});
                return Ok(HttpResponse::new(200, body.to_string()));
            }
            if is_action(request, "finalizeUpload") {
                let acknowledged = seen.load(Ordering::SeqCst);
                assert_eq!(acknowledged, 2, "finalize before every chunk acknowledged");
                return Ok(HttpResponse::new(200, ""));
            }
            if request.url.ends_with("/part/1") {
                std::thread::sleep(Duration::from_millis(50));
            }
            seen.fetch_add(1, Ordering::SeqCst);
            ok_with_etag("e")
        });
        let dispatcher = Dispatcher::new(&transport, config()).unwrap();
        let source = MemorySource::new("clip.mp4", vec![0u8; 20]);
        Uploader::new(&dispatcher, small_options())
            .run(&request(MediaKind::Video, &source, false))
            .unwrap();
        assert_eq!(finished.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failing_chunk_fails_the_upload_without_finalize() {
        let transport = video_backend(4, |_, index| {
            if index == 2 {
                Err(TransportError::transient("connection reset"))
            } else {
                ok_with_etag("e")
            }
        });
        let dispatcher = Dispatcher::new(&transport, config()).unwrap();
        let source = MemorySource::new("clip.mp4", vec![0u8; 40]);
        let err = Uploader::new(&dispatcher, small_options())
            .run(&request(MediaKind::Video, &source, false))
            .unwrap_err();
        match &err {
            Error::UploadPhase {
                phase,
                chunk,
                asset,
                source,
                ..
            } => {
                assert_eq!(*phase, UploadPhase::Upload);
                assert_eq!(*chunk, Some(2));
                assert_eq!(asset.as_deref(), Some("urn:li:video:C5F10"));
                assert!(matches!(**source, Error::Transport { attempts: 2, .. }));
            }
            other => panic!("unexpected error {other}"),
        }
        let requests = transport.requests();
        assert!(!requests.iter().any(|r| is_action(r, "finalizeUpload")));
        let retries = requests.iter().filter(|r| r.url.ends_with("/part/2")).count();
        assert_eq!(retries, 2);
    }

    #[test]
    fn missing_etag_fails_the_part() {
        let transport = video_backend(2, |_, _| Ok(HttpResponse::new(200, "")));
        let dispatcher = Dispatcher::new(&transport, config()).unwrap();
        let source = MemorySource::new("clip.mp4", vec![0u8; 20]);
        let err = Uploader::new(&dispatcher, small_options())
            .run(&request(MediaKind::Video, &source, false))
            .unwrap_err();
        assert!(err.to_string().contains("no ETag"), "{err}");
    }

    #[test]
    fn register_rejection_is_tagged_with_owner() {
        let transport =
            ScriptedTransport::new(|_| Ok(HttpResponse::new(403, r#"{"message":"denied"}"#)));
        let dispatcher = Dispatcher::new(&transport, config()).unwrap();
        let source = MemorySource::new("a.png", vec![1u8; 5]);
        let err = Uploader::new(&dispatcher, small_options())
            .run(&request(MediaKind::Image, &source, false))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("register phase failed for owner {OWNER}: HTTP 403: {{\"message\":\"denied\"}}")
        );
        assert_eq!(err.api_status(), Some(403));
    }

    #[test]
    fn invalid_owner_fails_before_any_request() {
        let transport = ScriptedTransport::new(|_| Ok(HttpResponse::new(200, "{}")));
        let dispatcher = Dispatcher::new(&transport, config()).unwrap();
        let source = MemorySource::new("a.png", vec![1u8; 5]);
        let err = Uploader::new(&dispatcher, small_options())
            .run(&UploadRequest {
                kind: MediaKind::Image,
                owner: "organization:1",
                source: &source,
                wait: false,
            })
            .unwrap_err();
        assert!(matches!(err, Error::Encoding(_)));
        assert_eq!(transport.count(), 0);
    }

    #[test]
    fn polling_reports_failed_processing_as_poll_phase() {
        let transport = polled_backend("PROCESSING_FAILED", || {});
        let dispatcher = Dispatcher::new(&transport, config()).unwrap();
        let source = MemorySource::new("clip.mp4", vec![0u8; 5]);
        let err = Uploader::new(&dispatcher, small_options())
            .run(&request(MediaKind::Video, &source, true))
            .unwrap_err();
        assert!(
            matches!(err, Error::UploadPhase { phase: UploadPhase::Poll, .. }),
            "{err}"
        );
        assert_eq!(err.exit_code(), EXIT_FAILURE);
    }

    #[test]
    fn polling_gives_up_after_max_polls() {
        let transport = polled_backend("PROCESSING", || {});
        let dispatcher = Dispatcher::new(&transport, config()).unwrap();
        let source = MemorySource::new("clip.mp4", vec![0u8; 5]);
        let err = Uploader::new(&dispatcher, small_options())
            .run(&request(MediaKind::Video, &source, true))
            .unwrap_err();
        assert!(
            matches!(
                err,
                Error::PollTimeout {
                    reason: PollStop::TimedOut { attempts: 5 },
                    ..
                }
            ),
            "{err}"
        );
        assert_eq!(err.exit_code(), EXIT_UNKNOWN_OUTCOME);
        let polls = transport
            .requests()
            .iter()
            .filter(|r| r.url.contains("/videos/"))
            .count();
        assert_eq!(polls, 5);
    }

    #[test]
    fn interrupt_while_polling_leaves_the_outcome_unknown() {
        let cancel = CancelToken::new();
        let interrupt = cancel.clone();
        let transport = polled_backend("PROCESSING", move || interrupt.cancel());
        let dispatcher = Dispatcher::new(&transport, config())
            .unwrap()
            .with_cancel(cancel);
        let source = MemorySource::new("clip.mp4", vec![0u8; 5]);
        let mut options = small_options();
        options.poll_interval = Duration::from_secs(30);
        let started = std::time::Instant::now();
        let err = Uploader::new(&dispatcher, options)
            .run(&request(MediaKind::Video, &source, true))
            .unwrap_err();

        match &err {
            Error::PollTimeout { asset, reason } => {
                assert_eq!(asset, "urn:li:video:9");
                assert_eq!(*reason, PollStop::Cancelled);
            }
            other => panic!("unexpected error {other}"),
        }
        assert!(err.to_string().contains("still processing, not confirmed"));
        assert_eq!(err.exit_code(), EXIT_UNKNOWN_OUTCOME);
        assert!(started.elapsed() < Duration::from_secs(5));
        let polls = transport
            .requests()
            .iter()
            .filter(|r| r.url.contains("/videos/"))
            .count();
        assert_eq!(polls, 1);
    }
}
