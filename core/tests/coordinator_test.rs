use std::sync::{Arc, Mutex};
use std::time::Duration;

use mockall::mock;
use parley_core::message::{
    DocumentIndexed, DocumentRef, ErrorReport, FinalResponse, Metadata, QueryRequest,
    RetrievalResult, StatusUpdate,
};
use parley_core::{
    names, BoundarySink, Coordinator, CoordinatorConfig, Envelope, Message, MessageBus,
    MessageKind, Outbox, RecordingBoundary, RequestStatus, DUPLICATE_REQUEST_CONTEXT,
    REJECTED_CONTEXT,
};

mock! {
    pub Sink {}
    impl BoundarySink for Sink {
        fn deliver(&self, envelope: Envelope);
    }
}

struct Harness {
    bus: MessageBus,
    coordinator: Arc<Coordinator>,
    boundary: Arc<RecordingBoundary>,
    // Everything the coordinator sent towards ingestion or retrieval
    worker_traffic: Arc<Mutex<Vec<Envelope>>>,
}

fn harness_with(config: CoordinatorConfig) -> Harness {
    let bus = MessageBus::new();
    let boundary = Arc::new(RecordingBoundary::new());
    let coordinator = Arc::new(Coordinator::new(config, boundary.clone()));
    bus.register_worker(Arc::clone(&coordinator));

    let worker_traffic = Arc::new(Mutex::new(Vec::new()));
    for name in [names::INGESTION, names::RETRIEVAL] {
        let log = Arc::clone(&worker_traffic);
        bus.register_fn(name, move |env: &Envelope, _: &dyn Outbox| {
            log.lock().unwrap().push(env.clone());
            Ok(())
        });
    }

    Harness {
        bus,
        coordinator,
        boundary,
        worker_traffic,
    }
}

fn harness() -> Harness {
    harness_with(CoordinatorConfig::default())
}

fn from_boundary(message: Message) -> Envelope {
    Envelope::new(names::BOUNDARY, names::COORDINATOR, message)
}

fn query(text: &str) -> Message {
    Message::QueryRequest(QueryRequest { query: text.into() })
}

fn final_response(answer: &str) -> FinalResponse {
    FinalResponse {
        answer: answer.into(),
        source_chunks: vec!["c1".into()],
        source_metadata: vec![Metadata::new()],
        original_query: "What KPIs?".into(),
    }
}

fn worker_reply(correlation_id: &str, sender: &str, message: Message) -> Envelope {
    Envelope::with_correlation(sender, names::COORDINATOR, correlation_id, message)
}

#[test]
fn upload_creates_state_under_request_correlation_id() {
    let h = harness();
    let request = from_boundary(Message::UploadRequest(DocumentRef::new(
        "/tmp/a.txt",
        "a.txt",
        "txt",
    )));
    let id = request.correlation_id().to_string();

    h.bus.send(request);

    let state = h.coordinator.state(&id).expect("state created");
    assert_eq!(state.status, RequestStatus::Uploading);
    assert_eq!(state.file_name(), Some("a.txt"));
    assert_eq!(h.coordinator.in_flight(), 1);

    let traffic = h.worker_traffic.lock().unwrap();
    assert_eq!(traffic.len(), 1);
    assert_eq!(traffic[0].receiver(), names::INGESTION);
    assert_eq!(traffic[0].correlation_id(), id);
}

#[test]
fn upload_with_missing_details_is_rejected_without_state() {
    let h = harness();
    h.bus
        .send(from_boundary(Message::UploadRequest(DocumentRef::new("", "a.txt", "txt"))));

    assert_eq!(h.coordinator.in_flight(), 0);
    assert!(h.worker_traffic.lock().unwrap().is_empty());
    let errors = h.boundary.of_kind(MessageKind::Error);
    assert_eq!(errors.len(), 1);
    match errors[0].message() {
        Message::Error(report) => assert!(report.error.contains("file_path")),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn whitespace_query_emits_exactly_one_error() {
    for text in ["", "   ", "\n\t"] {
        let h = harness();
        h.bus.send(from_boundary(query(text)));

        assert_eq!(h.coordinator.in_flight(), 0);
        assert!(h.worker_traffic.lock().unwrap().is_empty());
        let received = h.boundary.snapshot();
        assert_eq!(received.len(), 1, "only the error reaches the boundary");
        assert_eq!(received[0].kind(), MessageKind::Error);
    }
}

#[test]
fn empty_query_reaches_mock_boundary_once() {
    let mut sink = MockSink::new();
    sink.expect_deliver()
        .times(1)
        .withf(|env| env.kind() == MessageKind::Error && env.receiver() == names::BOUNDARY)
        .return_const(());

    let bus = MessageBus::new();
    let coordinator = Arc::new(Coordinator::new(CoordinatorConfig::default(), Arc::new(sink)));
    bus.register_worker(Arc::clone(&coordinator));

    bus.send(from_boundary(query("")));
    assert_eq!(coordinator.in_flight(), 0);
}

#[test]
fn final_response_for_live_request_completes_and_clears_state() {
    let h = harness();
    let request = from_boundary(query("What KPIs?"));
    let id = request.correlation_id().to_string();
    h.bus.send(request);
    h.boundary.take();

    let response = final_response("X");
    h.bus.send(worker_reply(
        &id,
        names::RESPONDER,
        Message::FinalResponse(response.clone()),
    ));

    let finals = h.boundary.of_kind(MessageKind::FinalResponse);
    assert_eq!(finals.len(), 1);
    assert_eq!(finals[0].correlation_id(), id);
    assert_eq!(finals[0].message(), &Message::FinalResponse(response.clone()));
    assert!(h.coordinator.state(&id).is_none());

    // A repeat is treated as unknown but still surfaces
    h.bus.send(worker_reply(
        &id,
        names::RESPONDER,
        Message::FinalResponse(response),
    ));
    assert_eq!(h.boundary.of_kind(MessageKind::FinalResponse).len(), 2);
    assert_eq!(h.coordinator.in_flight(), 0);
}

#[test]
fn worker_error_for_live_request_is_forwarded_and_clears_state() {
    let h = harness();
    let request = from_boundary(query("What KPIs?"));
    let id = request.correlation_id().to_string();
    h.bus.send(request);
    h.boundary.take();

    let report = ErrorReport::new("index unavailable", "Query: 'What KPIs?'");
    h.bus.send(worker_reply(
        &id,
        names::RETRIEVAL,
        Message::Error(report.clone()),
    ));

    let received = h.boundary.take();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].message(), &Message::Error(report));
    assert!(h.coordinator.state(&id).is_none());
}

#[test]
fn terminal_replies_for_unknown_ids_are_forwarded_unmodified() {
    let h = harness();
    let response = final_response("orphan");
    let report = ErrorReport::new("late failure", "ctx");

    h.bus.send(worker_reply(
        "unknown-1",
        names::RESPONDER,
        Message::FinalResponse(response.clone()),
    ));
    h.bus.send(worker_reply(
        "unknown-2",
        names::INGESTION,
        Message::Error(report.clone()),
    ));

    let received = h.boundary.take();
    assert_eq!(received.len(), 2);
    assert_eq!(received[0].correlation_id(), "unknown-1");
    assert_eq!(received[0].message(), &Message::FinalResponse(response));
    assert_eq!(received[1].correlation_id(), "unknown-2");
    assert_eq!(received[1].message(), &Message::Error(report));
}

#[test]
fn duplicate_correlation_id_is_rejected() {
    let h = harness();
    let first = Envelope::with_correlation(names::BOUNDARY, names::COORDINATOR, "dup", query("a"));
    let second = Envelope::with_correlation(names::BOUNDARY, names::COORDINATOR, "dup", query("b"));
    h.bus.send(first);
    h.boundary.take();

    h.bus.send(second);

    let errors = h.boundary.of_kind(MessageKind::Error);
    assert_eq!(errors.len(), 1);
    match errors[0].message() {
        Message::Error(report) => {
            assert_eq!(report.context, DUPLICATE_REQUEST_CONTEXT);
            assert!(report.error.contains("dup"));
        }
        other => panic!("unexpected {other:?}"),
    }
    let state = h.coordinator.state("dup").expect("original state kept");
    assert_eq!(state.original_query(), Some("a"));
    assert_eq!(h.worker_traffic.lock().unwrap().len(), 1);
}

#[test]
fn duplicate_rejection_does_not_end_the_live_request() {
    let h = harness();
    let upload = Message::UploadRequest(DocumentRef::new("/tmp/a.txt", "a.txt", "txt"));
    h.bus.send(Envelope::with_correlation(
        names::BOUNDARY,
        names::COORDINATOR,
        "live",
        upload.clone(),
    ));
    h.bus.send(Envelope::with_correlation(
        names::BOUNDARY,
        names::COORDINATOR,
        "live",
        upload,
    ));
    let duplicate = h.boundary.of_kind(MessageKind::Error);
    assert_eq!(duplicate.len(), 1);
    assert_eq!(duplicate[0].correlation_id(), "live");
    h.boundary.take();

    h.bus.send(worker_reply(
        "live",
        names::RETRIEVAL,
        Message::DocumentIndexed(DocumentIndexed {
            file_name: "a.txt".into(),
            chunks: 3,
        }),
    ));

    let received = h.boundary.take();
    assert_eq!(received.len(), 1);
    match received[0].message() {
        Message::StatusUpdate(update) => assert_eq!(update.status, "complete"),
        other => panic!("unexpected {other:?}"),
    }
    assert!(h.coordinator.state("live").is_none());
}

#[test]
fn validation_rejections_use_the_generic_context() {
    let h = harness();
    h.bus.send(from_boundary(query("   ")));

    let errors = h.boundary.of_kind(MessageKind::Error);
    assert_eq!(errors.len(), 1);
    match errors[0].message() {
        Message::Error(report) => {
            assert_eq!(report.context, REJECTED_CONTEXT);
            assert_ne!(report.context, DUPLICATE_REQUEST_CONTEXT);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn informational_replies_only_record_progress() {
    let h = harness();
    let request = from_boundary(query("What KPIs?"));
    let id = request.correlation_id().to_string();
    h.bus.send(request);
    h.boundary.take();

    h.bus.send(worker_reply(
        &id,
        names::RETRIEVAL,
        Message::RetrievalResult(RetrievalResult {
            query: "What KPIs?".into(),
            retrieved_context: vec![],
            source_metadata: vec![],
        }),
    ));

    let state = h.coordinator.state(&id).expect("still in flight");
    assert_eq!(state.status, RequestStatus::Querying);
    assert_eq!(state.hops, 1);
    assert!(h.boundary.snapshot().is_empty());
}

#[test]
fn unrecognized_message_is_ignored() {
    let h = harness();
    h.bus.send(worker_reply(
        "whatever",
        names::RETRIEVAL,
        Message::StatusUpdate(StatusUpdate {
            status: "noise".into(),
            message: "not for the coordinator".into(),
            correlation_id: "whatever".into(),
        }),
    ));
    assert!(h.boundary.snapshot().is_empty());
    assert_eq!(h.coordinator.in_flight(), 0);
}

#[test]
fn document_indexed_completes_upload() {
    let h = harness();
    let request = from_boundary(Message::UploadRequest(DocumentRef::new(
        "/tmp/a.txt",
        "a.txt",
        "txt",
    )));
    let id = request.correlation_id().to_string();
    h.bus.send(request);
    h.boundary.take();

    h.bus.send(worker_reply(
        &id,
        names::RETRIEVAL,
        Message::DocumentIndexed(DocumentIndexed {
            file_name: "a.txt".into(),
            chunks: 3,
        }),
    ));

    let received = h.boundary.take();
    assert_eq!(received.len(), 1);
    match received[0].message() {
        Message::StatusUpdate(update) => {
            assert_eq!(update.status, "complete");
            assert_eq!(update.correlation_id, id);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(h.coordinator.state(&id).is_none());
}

#[test]
fn evict_expired_times_out_stale_requests() {
    let h = harness_with(CoordinatorConfig::default().with_request_ttl(Duration::ZERO));
    let request = from_boundary(query("What KPIs?"));
    let id = request.correlation_id().to_string();
    h.bus.send(request);
    h.boundary.take();

    let evicted = h.coordinator.evict_expired();

    assert_eq!(evicted, vec![id.clone()]);
    assert_eq!(h.coordinator.in_flight(), 0);
    let received = h.boundary.take();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].correlation_id(), id);
    assert_eq!(received[0].kind(), MessageKind::Error);
}

#[test]
fn fresh_requests_survive_eviction() {
    let h = harness();
    h.bus.send(from_boundary(query("What KPIs?")));

    assert!(h.coordinator.evict_expired().is_empty());
    assert_eq!(h.coordinator.in_flight(), 1);
}

#[tokio::test]
async fn sweeper_evicts_in_background() {
    let h = harness_with(CoordinatorConfig::default().with_request_ttl(Duration::ZERO));
    h.bus.send(from_boundary(query("What KPIs?")));
    h.boundary.take();

    let sweeper = Arc::clone(&h.coordinator).spawn_sweeper(Duration::from_millis(5));
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while h.coordinator.in_flight() > 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    sweeper.abort();

    assert_eq!(h.coordinator.in_flight(), 0);
    assert_eq!(h.boundary.of_kind(MessageKind::Error).len(), 1);
}
