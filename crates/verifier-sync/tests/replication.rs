//! Replication between peers over the in-memory transport

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use verifier_core::{
    Address, Ed25519Verifier, LocalSigner, OptimismSignature, SignatureId, SignatureMessage,
    SignaturePointer, H256,
};
use verifier_network::{
    Envelope, EnvelopeStream, ExchangeRequest, FindCommonSignature, MemoryNetwork, MemoryTransport,
    SignatureExchange, StreamTransport, TransportEvents,
};
use verifier_storage::{Link, NewSignature, SignatureLog, SignatureQuery};
use verifier_sync::{sync_with_peer, AllowAll, Replicator, ReplicatorHandle, SyncConfig, SyncContext};

const CHAIN_ID: u64 = 248;

fn config() -> SyncConfig {
    SyncConfig {
        publish_interval_ms: 0,
        ..Default::default()
    }
}

/// `count` linked records, two seconds apart
fn chain(signer: Address, count: u64) -> Vec<OptimismSignature> {
    let mut previous = None;
    (0..count)
        .map(|i| {
            let id = SignatureId::from_parts(1_700_000_000_000 + i * 2_000, 0);
            let record = OptimismSignature {
                id,
                previous_id: previous,
                signer,
                scc: Address::new([0xcc; 20]),
                batch_index: i,
                batch_root: H256::digest(&i.to_be_bytes()),
                batch_size: 10,
                prev_total_elements: i * 10,
                extra_data: vec![],
                approved: true,
                signature: vec![i as u8; 64],
            };
            previous = Some(id);
            record
        })
        .collect()
}

/// Replace each record's signature with a valid one by `signer`
fn signed_by(signer: &LocalSigner, mut records: Vec<OptimismSignature>) -> Vec<OptimismSignature> {
    for record in &mut records {
        record.signature = signer.sign(&SignatureMessage {
            chain_id: CHAIN_ID,
            scc: record.scc,
            batch_index: record.batch_index,
            batch_root: record.batch_root,
            approved: record.approved,
        });
    }
    records
}

fn log_with(records: &[OptimismSignature]) -> Arc<SignatureLog> {
    let log = SignatureLog::in_memory();
    for record in records {
        log.save(NewSignature::from_remote(record.clone())).unwrap();
    }
    Arc::new(log)
}

fn all_records(log: &SignatureLog) -> Vec<OptimismSignature> {
    log.find(&SignatureQuery::new())
}

fn start(
    ctx: SyncContext,
    transport: MemoryTransport,
    events: TransportEvents<tokio::io::DuplexStream>,
) -> (Arc<Replicator<MemoryTransport>>, ReplicatorHandle) {
    let replicator = Arc::new(Replicator::new(ctx, transport));
    let handle = replicator.spawn(events);
    (replicator, handle)
}

#[tokio::test]
async fn test_finder_pages_newest_first_then_requests_everything() {
    let signer = Address::new([1; 20]);
    let records = chain(signer, 150);
    let network = MemoryNetwork::new();
    let (a, _a_events) = network.join();
    let (b, mut b_events) = network.join();

    let peer = tokio::spawn(async move {
        let (_, io) = b_events.streams.recv().await.unwrap();
        let mut stream = EnvelopeStream::new(io);
        let mut reads = Vec::new();
        loop {
            let envelope = stream.recv().await.unwrap().unwrap();
            reads.push(envelope.clone());
            match envelope {
                Envelope::FindCommonSignature(_) => {
                    stream.send(&Envelope::find_response(None)).await.unwrap()
                }
                Envelope::SignatureExchange(_) => stream.send(&Envelope::Eom).await.unwrap(),
                Envelope::Eom => break,
                other => panic!("unexpected {:?}", other),
            }
        }
        reads
    });

    let ctx = SyncContext::permissive(log_with(&records), config());
    let outcome = sync_with_peer(&ctx, &a, b.local_peer_id(), &[signer])
        .await
        .unwrap();
    assert_eq!(outcome.total(), 0);

    let reads = peer.await.unwrap();
    assert_eq!(reads.len(), 5);
    for (page, newest) in [(0usize, 149usize), (1, 99), (2, 49)] {
        match &reads[page] {
            Envelope::FindCommonSignature(FindCommonSignature {
                locals: Some(locals),
                ..
            }) => {
                assert_eq!(locals.len(), 50);
                assert_eq!(locals[0], records[newest].pointer());
                assert_eq!(locals[49], records[newest - 49].pointer());
            }
            other => panic!("unexpected {:?}", other),
        }
    }
    match &reads[3] {
        Envelope::SignatureExchange(SignatureExchange {
            requests: Some(requests),
            ..
        }) => assert_eq!(
            requests,
            &vec![ExchangeRequest {
                signer,
                id_after: None
            }]
        ),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(reads[4], Envelope::Eom);
    assert_eq!(ctx.stats().find_requests_sent, 3);
}

#[tokio::test]
async fn test_empty_node_pulls_full_chain() {
    let signer = Address::new([1; 20]);
    let records = chain(signer, 150);
    let network = MemoryNetwork::new();
    let (a, _a_events) = network.join();
    let (b, b_events) = network.join();
    let b_peer = b.local_peer_id();

    let (remote, handle) = start(
        SyncContext::permissive(log_with(&records), config()),
        b,
        b_events,
    );

    let ctx = SyncContext::permissive(Arc::new(SignatureLog::in_memory()), config());
    let outcome = sync_with_peer(&ctx, &a, b_peer, &[signer]).await.unwrap();

    assert_eq!(outcome.applied, 150);
    assert_eq!(all_records(&ctx.log), records);
    assert_eq!(ctx.log.tip(&signer), records.last().cloned());

    let stats = ctx.stats();
    assert_eq!(stats.find_requests_sent, 0);
    assert_eq!(stats.pages_received, 2);
    assert_eq!(stats.sessions_completed, 1);
    assert_eq!(remote.stats().pages_sent, 2);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_shared_prefix_only_transfers_the_suffix() {
    let signer = Address::new([1; 20]);
    let records = chain(signer, 100);
    let network = MemoryNetwork::new();
    let (a, _a_events) = network.join();
    let (b, b_events) = network.join();
    let b_peer = b.local_peer_id();

    let (_remote, handle) = start(
        SyncContext::permissive(log_with(&records), config()),
        b,
        b_events,
    );

    let ctx = SyncContext::permissive(log_with(&records[..97]), config());
    let outcome = sync_with_peer(&ctx, &a, b_peer, &[signer]).await.unwrap();

    // the one-second rewind re-sends the ancestor itself
    assert_eq!(outcome.applied, 3);
    assert_eq!(outcome.known, 1);
    assert_eq!(ctx.stats().find_requests_sent, 1);
    assert_eq!(all_records(&ctx.log), records);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_zero_margin_transfers_exactly_the_missing_records() {
    let signer = Address::new([1; 20]);
    let records = chain(signer, 100);
    let network = MemoryNetwork::new();
    let (a, _a_events) = network.join();
    let (b, mut b_events) = network.join();
    let b_peer = b.local_peer_id();

    let remote_log = log_with(&records);
    let peer = tokio::spawn(async move {
        let (_, io) = b_events.streams.recv().await.unwrap();
        let mut stream = EnvelopeStream::new(io);
        let mut pages = Vec::new();
        loop {
            match stream.recv().await.unwrap().unwrap() {
                Envelope::FindCommonSignature(FindCommonSignature {
                    locals: Some(locals),
                    ..
                }) => {
                    let found = verifier_sync::find_common(&remote_log, &locals);
                    stream.send(&Envelope::find_response(found)).await.unwrap();
                }
                Envelope::SignatureExchange(SignatureExchange {
                    requests: Some(requests),
                    ..
                }) => {
                    let page = remote_log.find(
                        &SignatureQuery::new()
                            .signer(signer)
                            .id_after(requests[0].id_after),
                    );
                    pages.push(page.clone());
                    stream.send(&Envelope::exchange_response(page)).await.unwrap();
                    assert!(stream.recv().await.unwrap().unwrap().is_received_ack());
                    stream.send(&Envelope::Eom).await.unwrap();
                }
                Envelope::Eom => break,
                other => panic!("unexpected {:?}", other),
            }
        }
        pages
    });

    let ctx = SyncContext::permissive(
        log_with(&records[..97]),
        SyncConfig {
            id_after_margin_ms: 0,
            ..config()
        },
    );
    let outcome = sync_with_peer(&ctx, &a, b_peer, &[signer]).await.unwrap();
    assert_eq!(outcome.applied, 3);
    assert_eq!(outcome.known, 0);

    let pages = peer.await.unwrap();
    assert_eq!(pages, vec![records[97..].to_vec()]);
}

#[tokio::test]
async fn test_next_page_waits_for_ack() {
    let signer = Address::new([1; 20]);
    let records = chain(signer, 250);
    let network = MemoryNetwork::new();
    let (a, _a_events) = network.join();
    let (b, b_events) = network.join();
    let b_peer = b.local_peer_id();
    let (_remote, handle) = start(
        SyncContext::permissive(log_with(&records), config()),
        b,
        b_events,
    );

    let mut stream = EnvelopeStream::new(a.open_stream(b_peer).await.unwrap());
    stream
        .send(&Envelope::exchange_request(vec![ExchangeRequest {
            signer,
            id_after: None,
        }]))
        .await
        .unwrap();

    let mut received = Vec::new();
    for expected in [100usize, 100, 50] {
        match stream.recv().await.unwrap().unwrap() {
            Envelope::SignatureExchange(SignatureExchange {
                responses: Some(page),
                ..
            }) => {
                assert_eq!(page.len(), expected);
                received.extend(page);
            }
            other => panic!("unexpected {:?}", other),
        }
        let early = tokio::time::timeout(Duration::from_millis(200), stream.recv()).await;
        assert!(early.is_err(), "responder sent before the ack");
        stream.send(&Envelope::received_ack()).await.unwrap();
    }
    assert_eq!(stream.recv().await.unwrap(), Some(Envelope::Eom));
    assert_eq!(received, records);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_find_responder_answers_each_request_until_eom() {
    let signer = Address::new([1; 20]);
    let records = chain(signer, 10);
    let network = MemoryNetwork::new();
    let (a, _a_events) = network.join();
    let (b, b_events) = network.join();
    let b_peer = b.local_peer_id();
    let (remote, handle) = start(
        SyncContext::permissive(log_with(&records), config()),
        b,
        b_events,
    );

    let unknown = SignaturePointer {
        id: SignatureId::from_parts(42, 42),
        previous_id: None,
    };
    let mut stream = EnvelopeStream::new(a.open_stream(b_peer).await.unwrap());

    stream.send(&Envelope::find_request(vec![unknown])).await.unwrap();
    assert_eq!(stream.recv().await.unwrap(), Some(Envelope::find_response(None)));

    stream
        .send(&Envelope::find_request(vec![unknown, records[4].pointer(), records[2].pointer()]))
        .await
        .unwrap();
    assert_eq!(
        stream.recv().await.unwrap(),
        Some(Envelope::find_response(Some(records[4].pointer())))
    );

    stream.send(&Envelope::Eom).await.unwrap();
    assert_eq!(stream.recv().await.unwrap(), Some(Envelope::Eom));
    assert_eq!(remote.stats().find_requests_served, 2);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_pushed_page_is_applied() {
    let signer = Address::new([1; 20]);
    let records = chain(signer, 20);
    let network = MemoryNetwork::new();
    let (a, _a_events) = network.join();
    let (b, b_events) = network.join();
    let b_peer = b.local_peer_id();
    let (remote, handle) = start(
        SyncContext::permissive(log_with(&records[..10]), config()),
        b,
        b_events,
    );

    let mut stream = EnvelopeStream::new(a.open_stream(b_peer).await.unwrap());
    stream
        .send(&Envelope::exchange_response(records[10..].to_vec()))
        .await
        .unwrap();
    stream.send(&Envelope::Eom).await.unwrap();
    assert_eq!(stream.recv().await.unwrap(), Some(Envelope::Eom));

    assert_eq!(all_records(&remote.context().log), records);
    handle.shutdown().await;
}

#[tokio::test]
async fn test_inbound_streams_over_capacity_are_dropped() {
    let network = MemoryNetwork::new();
    let (a, _a_events) = network.join();
    let (b, b_events) = network.join();
    let b_peer = b.local_peer_id();
    let mut limited = config();
    limited.inbound.concurrency = 1;
    let (remote, handle) = start(
        SyncContext::permissive(Arc::new(SignatureLog::in_memory()), limited),
        b,
        b_events,
    );

    let mut first = EnvelopeStream::new(a.open_stream(b_peer).await.unwrap());
    let mut second = EnvelopeStream::new(a.open_stream(b_peer).await.unwrap());

    assert_eq!(second.recv().await.unwrap(), None);
    first.send(&Envelope::find_request(vec![])).await.unwrap();
    assert_eq!(first.recv().await.unwrap(), Some(Envelope::find_response(None)));

    let stats = remote.stats();
    assert_eq!(stats.inbound_streams, 2);
    assert_eq!(stats.inbound_rejected, 1);
    handle.shutdown().await;
}

#[tokio::test]
async fn test_announcement_triggers_verified_sync() {
    let signer = LocalSigner::from_bytes(&[7; 32]);
    let keys = HashMap::from([(signer.address(), signer.verifying_key())]);
    let network = MemoryNetwork::new();
    let (a, a_events) = network.join();
    let (b, b_events) = network.join();

    let source = Arc::new(SignatureLog::in_memory());
    for i in 0..10u64 {
        let message = SignatureMessage {
            chain_id: CHAIN_ID,
            scc: Address::new([0xcc; 20]),
            batch_index: i,
            batch_root: H256::digest(&i.to_be_bytes()),
            approved: true,
        };
        source
            .save(NewSignature {
                id: None,
                link: Link::Auto,
                signer: signer.address(),
                scc: message.scc,
                batch_index: i,
                batch_root: message.batch_root,
                batch_size: 1,
                prev_total_elements: i,
                extra_data: vec![],
                approved: true,
                signature: signer.sign(&message),
            })
            .unwrap();
    }

    let verifier = Arc::new(Ed25519Verifier::new(CHAIN_ID, keys));
    let (local, local_handle) = start(
        SyncContext::new(
            Arc::new(SignatureLog::in_memory()),
            verifier.clone(),
            Arc::new(AllowAll),
            config(),
        ),
        a,
        a_events,
    );
    let (remote, remote_handle) = start(
        SyncContext::new(source.clone(), verifier, Arc::new(AllowAll), config()),
        b,
        b_events,
    );

    assert_eq!(remote.publish_latest().await.unwrap(), 1);

    let log = local.context().log.clone();
    tokio::time::timeout(Duration::from_secs(5), async {
        while log.len() < 10 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("announcement did not lead to a sync");

    assert_eq!(all_records(&log), all_records(&source));
    let stats = local.stats();
    assert_eq!(stats.announcements_received, 1);
    assert_eq!(stats.records_rejected, 0);

    local_handle.shutdown().await;
    remote_handle.shutdown().await;
}

#[tokio::test]
async fn test_forged_records_are_not_applied() {
    let honest = LocalSigner::from_bytes(&[1; 32]);
    let keys = HashMap::from([(honest.address(), honest.verifying_key())]);
    let ctx = SyncContext::new(
        Arc::new(SignatureLog::in_memory()),
        Arc::new(Ed25519Verifier::new(CHAIN_ID, keys)),
        Arc::new(AllowAll),
        config(),
    );

    // only the root is forged; its validly signed descendants cannot link
    let mut records = signed_by(&honest, chain(honest.address(), 3));
    records[0].signature = vec![0; 64];
    let outcome = verifier_sync::apply_records(&ctx, records);
    assert_eq!(outcome.applied, 0);
    assert_eq!(outcome.rejected, 1);
    assert_eq!(outcome.overtaken, 2);
    assert!(ctx.log.is_empty());
}

#[tokio::test]
async fn test_fully_forged_page_is_rejected() {
    let honest = LocalSigner::from_bytes(&[1; 32]);
    let keys = HashMap::from([(honest.address(), honest.verifying_key())]);
    let ctx = SyncContext::new(
        Arc::new(SignatureLog::in_memory()),
        Arc::new(Ed25519Verifier::new(CHAIN_ID, keys)),
        Arc::new(AllowAll),
        config(),
    );

    let outcome = verifier_sync::apply_records(&ctx, chain(honest.address(), 3));
    assert_eq!(outcome.rejected, 3);
    assert_eq!(outcome.overtaken, 0);
    assert!(ctx.log.is_empty());
}

#[tokio::test]
async fn test_approval_change_on_tip_replicates() {
    let signer = Address::new([1; 20]);
    let records = chain(signer, 10);
    let mut changed = records.clone();
    changed[9].approved = false;
    changed[9].signature = vec![0xbb; 64];

    let network = MemoryNetwork::new();
    let (a, _a_events) = network.join();
    let (b, b_events) = network.join();
    let b_peer = b.local_peer_id();
    let (_remote, handle) = start(
        SyncContext::permissive(log_with(&changed), config()),
        b,
        b_events,
    );

    let ctx = SyncContext::permissive(log_with(&records), config());
    let outcome = sync_with_peer(&ctx, &a, b_peer, &[signer]).await.unwrap();

    assert_eq!(outcome.applied, 1);
    let tip = ctx.log.tip(&signer).unwrap();
    assert_eq!(tip, changed[9]);
    assert_eq!(all_records(&ctx.log), changed);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_out_of_protocol_envelopes_abort_the_stream() {
    let signer = Address::new([1; 20]);
    let records = chain(signer, 5);
    let network = MemoryNetwork::new();
    let (a, _a_events) = network.join();
    let (b, b_events) = network.join();
    let b_peer = b.local_peer_id();
    let (remote, handle) = start(
        SyncContext::permissive(log_with(&records), config()),
        b,
        b_events,
    );

    let stray_ack = Envelope::received_ack();
    let empty_find = Envelope::FindCommonSignature(FindCommonSignature {
        locals: None,
        found: None,
    });
    for envelope in [stray_ack, empty_find] {
        let mut stream = EnvelopeStream::new(a.open_stream(b_peer).await.unwrap());
        stream.send(&envelope).await.unwrap();
        assert_eq!(stream.recv().await.unwrap(), None);
    }

    assert_eq!(all_records(&remote.context().log), records);
    let stats = remote.stats();
    assert_eq!(stats.find_requests_served, 0);
    assert_eq!(stats.pages_sent, 0);
    assert_eq!(stats.records_applied, 0);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_exchange_stops_when_reply_is_not_an_ack() {
    let signer = Address::new([1; 20]);
    let records = chain(signer, 250);
    let network = MemoryNetwork::new();
    let (a, _a_events) = network.join();
    let (b, b_events) = network.join();
    let b_peer = b.local_peer_id();
    let (remote, handle) = start(
        SyncContext::permissive(log_with(&records), config()),
        b,
        b_events,
    );

    let mut stream = EnvelopeStream::new(a.open_stream(b_peer).await.unwrap());
    stream
        .send(&Envelope::exchange_request(vec![ExchangeRequest {
            signer,
            id_after: None,
        }]))
        .await
        .unwrap();
    match stream.recv().await.unwrap().unwrap() {
        Envelope::SignatureExchange(SignatureExchange {
            responses: Some(page),
            ..
        }) => assert_eq!(page.len(), 100),
        other => panic!("unexpected {:?}", other),
    }

    stream.send(&Envelope::find_request(vec![])).await.unwrap();
    assert_eq!(stream.recv().await.unwrap(), None);
    assert_eq!(remote.stats().pages_sent, 1);

    handle.shutdown().await;
}
