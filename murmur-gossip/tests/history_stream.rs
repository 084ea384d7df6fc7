// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end history-stream scenarios against an in-memory bot.

use std::sync::Arc;
use std::time::Duration;

use murmur_core::{
    Contact, FeedAlgorithm, FeedRef, LogEntry, MessageAlgorithm, MessageRef, StoredMessage,
};
use murmur_gossip::{ChannelSink, FeedManager, GossipError, HistoryStreamRequest};
use murmur_graph::{ContactIndex, GraphBuilder};
use murmur_store::{EventLog, MemoryLog, MemoryStore, Multilog};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

fn feed(byte: u8) -> FeedRef {
    FeedRef::new(FeedAlgorithm::Classic, [byte; 32])
}

struct Bot {
    receive_log: MemoryLog<LogEntry>,
    user_feeds: Multilog,
    manager: FeedManager,
    shutdown: CancellationToken,
}

impl Bot {
    async fn new() -> Self {
        let receive_log = MemoryLog::new();
        let user_feeds = Multilog::new();
        let shutdown = CancellationToken::new();
        let manager = FeedManager::new(receive_log.clone(), user_feeds.clone(), shutdown.clone())
            .await
            .unwrap();
        Self {
            receive_log,
            user_feeds,
            manager,
            shutdown,
        }
    }

    async fn publish(&self, author: FeedRef, sequence: u64, content: Value) -> StoredMessage {
        self.publish_raw(author, sequence, content, Vec::new()).await
    }

    async fn publish_raw(
        &self,
        author: FeedRef,
        sequence: u64,
        content: Value,
        raw: Vec<u8>,
    ) -> StoredMessage {
        let value = json!({
            "author": author.to_string(),
            "sequence": sequence,
            "timestamp": sequence * 1000,
            "hash": "sha256",
            "content": content,
        });
        let mut key = [0u8; 32];
        key[0] = author.key_bytes()[0];
        key[1] = sequence as u8;
        let message = StoredMessage::new(
            MessageRef::new(MessageAlgorithm::Sha256, key),
            author,
            sequence,
            (sequence * 1000) as f64,
            sequence as f64,
            content,
            value,
            raw,
        );

        let offset = self
            .receive_log
            .append(LogEntry::Message(message.clone()))
            .await
            .unwrap();
        self.user_feeds.get(&author).append(offset).await.unwrap();
        message
    }

    async fn fill(&self, author: FeedRef, count: u64) {
        for sequence in 1..=count {
            self.publish(author, sequence, json!({ "type": "post", "n": sequence }))
                .await;
        }
    }
}

fn drain_seqs(rx: &mut mpsc::Receiver<Vec<u8>>) -> Vec<u64> {
    let mut seqs = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        let value: Value = serde_json::from_slice(&frame).unwrap();
        seqs.push(value["sequence"].as_u64().unwrap());
    }
    seqs
}

async fn next_seq(rx: &mut mpsc::Receiver<Vec<u8>>) -> u64 {
    let frame = timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("frame within a second")
        .expect("sink still open");
    let value: Value = serde_json::from_slice(&frame).unwrap();
    value["sequence"].as_u64().unwrap()
}

#[tokio::test]
async fn history_only_bounded() {
    let bot = Bot::new().await;
    let author = feed(1);
    bot.fill(author, 5).await;

    let (sink, mut rx) = ChannelSink::new(16);
    let sink = Arc::new(sink);

    let mut arg = HistoryStreamRequest::new(author);
    arg.seq = 2;
    arg.limit = 2;
    bot.manager
        .create_history_stream(CancellationToken::new(), sink.clone(), &arg)
        .await
        .unwrap();

    assert_eq!(drain_seqs(&mut rx), vec![2, 3]);
    assert_eq!(sink.close_calls(), 1);
    assert_eq!(rx.recv().await, None);
}

#[tokio::test]
async fn history_then_live() {
    let bot = Bot::new().await;
    let author = feed(1);
    bot.fill(author, 3).await;

    let (sink, mut rx) = ChannelSink::new(16);
    let sink = Arc::new(sink);

    let mut arg = HistoryStreamRequest::new(author);
    arg.seq = 1;
    arg.limit = -1;
    arg.live = true;
    bot.manager
        .create_history_stream(CancellationToken::new(), sink.clone(), &arg)
        .await
        .unwrap();

    assert_eq!(drain_seqs(&mut rx), vec![1, 2, 3]);
    assert_eq!(sink.close_calls(), 0);

    bot.publish(author, 4, json!({ "type": "post", "n": 4 })).await;
    assert_eq!(next_seq(&mut rx).await, 4);

    // main-log shutdown closes the sink exactly once
    bot.shutdown.cancel();
    assert_eq!(
        timeout(Duration::from_secs(1), rx.recv()).await.unwrap(),
        None
    );
    assert_eq!(sink.close_calls(), 1);
}

#[tokio::test]
async fn past_end_live() {
    let bot = Bot::new().await;
    let author = feed(1);
    bot.fill(author, 2).await;

    let (sink, mut rx) = ChannelSink::new(16);
    let sink = Arc::new(sink);

    let mut arg = HistoryStreamRequest::new(author);
    arg.seq = 10;
    arg.limit = -1;
    arg.live = true;
    bot.manager
        .create_history_stream(CancellationToken::new(), sink.clone(), &arg)
        .await
        .unwrap();

    assert_eq!(drain_seqs(&mut rx), Vec::<u64>::new());
    assert_eq!(bot.manager.live_feed_count().await, 1);

    bot.publish(author, 3, json!({ "type": "post", "n": 3 })).await;
    assert_eq!(next_seq(&mut rx).await, 3);
}

#[tokio::test]
async fn past_end_without_live_closes_silently() {
    let bot = Bot::new().await;
    let author = feed(1);
    bot.fill(author, 2).await;

    let (sink, mut rx) = ChannelSink::new(16);
    let sink = Arc::new(sink);

    let mut arg = HistoryStreamRequest::new(author);
    arg.seq = 10;
    bot.manager
        .create_history_stream(CancellationToken::new(), sink.clone(), &arg)
        .await
        .unwrap();

    assert_eq!(rx.recv().await, None);
    assert_eq!(sink.close_calls(), 1);
}

#[tokio::test]
async fn unbounded_limit_drains_the_full_range() {
    let bot = Bot::new().await;
    let author = feed(1);
    bot.fill(author, 4).await;

    let (sink, mut rx) = ChannelSink::new(16);
    let mut arg = HistoryStreamRequest::new(author);
    arg.seq = 2;
    arg.limit = -1;
    bot.manager
        .create_history_stream(CancellationToken::new(), Arc::new(sink), &arg)
        .await
        .unwrap();

    // cur - seq + 1 frames
    assert_eq!(drain_seqs(&mut rx), vec![2, 3, 4]);
}

#[tokio::test]
async fn reverse_yields_descending_sequences() {
    let bot = Bot::new().await;
    let author = feed(1);
    bot.fill(author, 3).await;

    let (sink, mut rx) = ChannelSink::new(16);
    let mut arg = HistoryStreamRequest::new(author);
    arg.reverse = true;
    bot.manager
        .create_history_stream(CancellationToken::new(), Arc::new(sink), &arg)
        .await
        .unwrap();

    assert_eq!(drain_seqs(&mut rx), vec![3, 2, 1]);
}

#[tokio::test]
async fn live_with_zero_limit_is_unbounded() {
    let bot = Bot::new().await;
    let author = feed(1);
    bot.fill(author, 2).await;

    let (sink, mut rx) = ChannelSink::new(16);
    let sink = Arc::new(sink);

    let mut arg = HistoryStreamRequest::new(author);
    arg.seq = 1;
    arg.limit = 0;
    arg.live = true;
    bot.manager
        .create_history_stream(CancellationToken::new(), sink.clone(), &arg)
        .await
        .unwrap();

    assert_eq!(drain_seqs(&mut rx), vec![1, 2]);
    assert_eq!(sink.close_calls(), 0);

    bot.publish(author, 3, json!({ "type": "post", "n": 3 })).await;
    assert_eq!(next_seq(&mut rx).await, 3);
}

#[tokio::test]
async fn keys_envelope_frames() {
    let bot = Bot::new().await;
    let author = feed(1);
    bot.fill(author, 1).await;

    let (sink, mut rx) = ChannelSink::new(16);
    let mut arg = HistoryStreamRequest::new(author);
    arg.keys = true;
    bot.manager
        .create_history_stream(CancellationToken::new(), Arc::new(sink), &arg)
        .await
        .unwrap();

    let frame: Value = serde_json::from_slice(&rx.recv().await.unwrap()).unwrap();
    assert!(frame["key"].as_str().unwrap().starts_with('%'));
    assert_eq!(frame["value"]["sequence"], 1);
    assert!(frame["timestamp"].is_number());
}

#[tokio::test]
async fn binary_feeds_stream_length_prefixed_frames() {
    let bot = Bot::new().await;
    let author = FeedRef::new(FeedAlgorithm::Binary, [9; 32]);
    bot.publish_raw(author, 1, json!({ "type": "post" }), vec![0x01, 0x02])
        .await;

    let (sink, mut rx) = ChannelSink::new(16);
    let arg = HistoryStreamRequest::new(author);
    bot.manager
        .create_history_stream(CancellationToken::new(), Arc::new(sink), &arg)
        .await
        .unwrap();

    let frame = rx.recv().await.unwrap();
    assert_eq!(&frame[..4], &2u32.to_be_bytes());
    assert_eq!(&frame[4..], &[0x01, 0x02]);

    // the same feed requested as JSON uses the envelope path
    let (sink, mut rx) = ChannelSink::new(16);
    let mut arg = HistoryStreamRequest::new(author);
    arg.as_json = true;
    bot.manager
        .create_history_stream(CancellationToken::new(), Arc::new(sink), &arg)
        .await
        .unwrap();
    let frame: Value = serde_json::from_slice(&rx.recv().await.unwrap()).unwrap();
    assert_eq!(frame["sequence"], 1);
}

#[tokio::test]
async fn missing_id_is_bad_input() {
    let bot = Bot::new().await;
    let (sink, _rx) = ChannelSink::new(16);

    let mut arg = HistoryStreamRequest::new(feed(1));
    arg.id = None;
    let err = bot
        .manager
        .create_history_stream(CancellationToken::new(), Arc::new(sink), &arg)
        .await
        .unwrap_err();
    assert!(matches!(err, GossipError::MissingId));
    assert_eq!(err.kind(), murmur_core::ErrorKind::BadInput);
}

#[tokio::test]
async fn cancellation_is_clean_termination() {
    let bot = Bot::new().await;
    let author = feed(1);
    bot.fill(author, 3).await;

    let (sink, _rx) = ChannelSink::new(16);
    let sink = Arc::new(sink);
    let ctx = CancellationToken::new();
    ctx.cancel();

    let arg = HistoryStreamRequest::new(author);
    bot.manager
        .create_history_stream(ctx, sink.clone(), &arg)
        .await
        .unwrap();
    assert_eq!(sink.close_calls(), 1);
}

#[tokio::test]
async fn remote_going_away_is_clean_termination() {
    let bot = Bot::new().await;
    let author = feed(1);
    bot.fill(author, 3).await;

    let (sink, rx) = ChannelSink::new(16);
    drop(rx);

    let arg = HistoryStreamRequest::new(author);
    bot.manager
        .create_history_stream(CancellationToken::new(), Arc::new(sink), &arg)
        .await
        .unwrap();
}

#[tokio::test]
async fn contact_messages_feed_the_trust_graph() {
    let bot = Bot::new().await;
    let (a, b) = (feed(1), feed(2));

    let builder = Arc::new(GraphBuilder::new(MemoryStore::new()));
    let index = ContactIndex::new(builder.clone());
    let index_task = {
        let index = index.clone();
        let log = bot.receive_log.clone();
        let cancel = bot.shutdown.clone();
        tokio::spawn(async move { index.run(&log, cancel).await })
    };

    bot.publish(a, 1, json!({ "type": "post", "text": "unrelated" }))
        .await;
    bot.publish(a, 2, Contact::follow(b).to_value()).await;

    // the index task consumes the live tail asynchronously
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    loop {
        let follows = builder.follows(&a).await.unwrap();
        if follows.contains(&b) {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "contact never reached the index"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    bot.shutdown.cancel();
    timeout(Duration::from_secs(1), index_task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn empty_feed_with_live_request_waits_for_first_message() {
    let bot = Bot::new().await;
    let author = feed(1);

    let (sink, mut rx) = ChannelSink::new(16);
    let mut arg = HistoryStreamRequest::new(author);
    arg.seq = 1;
    arg.limit = -1;
    arg.live = true;
    bot.manager
        .create_history_stream(CancellationToken::new(), Arc::new(sink), &arg)
        .await
        .unwrap();

    bot.publish(author, 1, json!({ "type": "post", "n": 1 })).await;
    assert_eq!(next_seq(&mut rx).await, 1);
}
