use std::{
    io,
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};

use chat_api::{
    ChatUser, Envelope, Kind, SendParams, METHOD_INIT, METHOD_SEND, METHOD_STOP, METHOD_SUBSCRIBE,
    TOPIC_HELLO, TOPIC_MESSAGE, TOPIC_READY, TOPIC_TYPING, UNKNOWN_METHOD,
};
use chrono::{DateTime, FixedOffset, TimeDelta};
use rand::{rngs::StdRng, SeedableRng};
use serde_json::json;
use tokio::{
    io::{AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf},
    task::JoinHandle,
};
use typing_record_bot::{
    bot::record_announcement,
    clock::SystemClock,
    gateway,
    ipc::{read_envelope, write_envelope},
    record::read_record,
    Bot, RecordStore, SessionTracker, TauntCatalog, Timing,
};

struct LogWriter(Arc<Mutex<Vec<u8>>>);
impl io::Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
struct MakeLogWriter(Arc<Mutex<Vec<u8>>>);
impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for MakeLogWriter {
    type Writer = LogWriter;
    fn make_writer(&'a self) -> Self::Writer {
        LogWriter(self.0.clone())
    }
}

fn juan() -> ChatUser {
    ChatUser {
        name: "juan".into(),
        discriminator: "0420".into(),
    }
}

fn at(secs: i64) -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339("2024-03-01T12:00:00-05:00").unwrap() + TimeDelta::seconds(secs)
}

/// Chat host side of an in-memory gateway connection.
struct Host {
    reader: BufReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
}

impl Host {
    async fn send(&mut self, env: Envelope) {
        write_envelope(&mut self.writer, &env).await.unwrap();
    }

    async fn recv(&mut self) -> Envelope {
        read_envelope(&mut self.reader).await.unwrap().unwrap()
    }

    async fn expect_request(&mut self, method: &str) -> Envelope {
        let env = self.recv().await;
        assert_eq!(env.kind, Kind::Request);
        assert_eq!(env.method.as_deref(), Some(method));
        env
    }

    async fn ack(&mut self, req: &Envelope) {
        self.send(Envelope::response(req.id.clone(), json!({"ok": true})))
            .await;
    }

    async fn handshake(&mut self) {
        self.send(Envelope::event(TOPIC_HELLO, Some(json!({"api_version": "1"}))))
            .await;
        let init = self.expect_request(METHOD_INIT).await;
        assert_eq!(
            init.params.as_ref().unwrap()["metadata"]["id"],
            json!("typing_record_bot")
        );
        self.ack(&init).await;
        let sub = self.expect_request(METHOD_SUBSCRIBE).await;
        assert_eq!(
            sub.params.as_ref().unwrap()["topics"],
            json!([TOPIC_TYPING, TOPIC_MESSAGE])
        );
        self.ack(&sub).await;
        self.send(Envelope::event(TOPIC_READY, Some(json!({"user": {"name": "bot", "discriminator": "0001"}}))))
            .await;
    }

    async fn typing(&mut self, secs: i64) {
        let payload = json!({"channel_id": "general", "user": juan(), "at": at(secs)});
        self.send(Envelope::event(TOPIC_TYPING, Some(payload))).await;
    }

    async fn message(&mut self, secs: i64, content: &str) {
        let payload =
            json!({"channel_id": "general", "author": juan(), "content": content, "at": at(secs)});
        self.send(Envelope::event(TOPIC_MESSAGE, Some(payload))).await;
    }

    async fn expect_send(&mut self) -> (Envelope, SendParams) {
        let req = self.expect_request(METHOD_SEND).await;
        let params: SendParams = serde_json::from_value(req.params.clone().unwrap()).unwrap();
        (req, params)
    }

    async fn stop(&mut self) {
        self.send(Envelope::request("stop-1", METHOD_STOP, json!({})))
            .await;
        let resp = self.recv().await;
        assert_eq!(resp.kind, Kind::Response);
        assert_eq!(resp.id.as_deref(), Some("stop-1"));
    }
}

async fn start(record_file: &Path) -> (Host, JoinHandle<anyhow::Result<()>>) {
    let records = RecordStore::load(record_file).await.unwrap();
    let mut rng = StdRng::seed_from_u64(42);
    let taunts = TauntCatalog::new(vec!["Stop.".into()], &mut rng);
    let tracker = SessionTracker::new(Timing::default(), taunts, records).with_rng(rng);
    let bot = Bot::new(juan(), None, tracker, SystemClock::new(chrono_tz::Tz::UTC));

    let (bot_side, host_side) = tokio::io::duplex(64 * 1024);
    let (bot_read, bot_write) = tokio::io::split(bot_side);
    let server = tokio::spawn(gateway::serve(BufReader::new(bot_read), bot_write, bot));
    let (host_read, host_write) = tokio::io::split(host_side);
    let host = Host {
        reader: BufReader::new(host_read),
        writer: host_write,
    };
    (host, server)
}

#[tokio::test]
async fn taunt_then_new_record_over_gateway() {
    let buf = Arc::new(Mutex::new(Vec::new()));
    let subscriber = tracing_subscriber::fmt()
        .with_writer(MakeLogWriter(buf.clone()))
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let dir = tempfile::tempdir().unwrap();
    let record_file = dir.path().join("typing_record.json");
    let (mut host, server) = start(&record_file).await;
    host.handshake().await;

    host.typing(0).await;
    host.typing(35).await;
    let (req, taunt) = host.expect_send().await;
    assert_eq!(taunt.channel_id, "general");
    assert_eq!(taunt.text, "Stop.");
    host.ack(&req).await;

    host.message(40, "ok ok").await;
    let (req, announcement) = host.expect_send().await;
    assert_eq!(
        announcement.text,
        record_announcement("juan", Duration::from_secs(40))
    );
    host.ack(&req).await;

    host.stop().await;
    server.await.unwrap().unwrap();

    let record = read_record(&record_file).await.unwrap().unwrap();
    assert_eq!(record.best_duration, Duration::from_secs(40));
    assert_eq!(record.set_at, Some(at(40)));

    let logs = String::from_utf8(buf.lock().unwrap().clone()).unwrap();
    assert!(logs.contains("successfully logged in as bot#0001"), "logs: {logs}");
    assert!(logs.contains("new typing record"), "logs: {logs}");
}

#[tokio::test]
async fn rejected_taunt_keeps_bot_running() {
    let dir = tempfile::tempdir().unwrap();
    let record_file = dir.path().join("typing_record.json");
    let (mut host, server) = start(&record_file).await;
    host.handshake().await;

    host.typing(0).await;
    host.typing(31).await;
    let (req, _) = host.expect_send().await;
    host.send(Envelope::error_response(req.id.clone(), 403, "missing permissions"))
        .await;

    host.message(33, "hello").await;
    let (req, announcement) = host.expect_send().await;
    assert!(announcement.text.ends_with("33.00 seconds!"));
    host.ack(&req).await;

    host.stop().await;
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn unknown_requests_get_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let (mut host, server) = start(&dir.path().join("r.json")).await;
    host.handshake().await;

    host.send(Envelope::request("x", "bot.dance", json!({}))).await;
    let resp = host.recv().await;
    assert_eq!(resp.id.as_deref(), Some("x"));
    assert_eq!(resp.error.unwrap().code, UNKNOWN_METHOD);

    drop(host);
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn handshake_requires_hello() {
    let dir = tempfile::tempdir().unwrap();
    let (mut host, server) = start(&dir.path().join("r.json")).await;
    host.send(Envelope::event(TOPIC_READY, None)).await;
    assert!(server.await.unwrap().is_err());
}

#[tokio::test]
async fn host_closing_input_ends_serve_with_taunt_in_flight() {
    let dir = tempfile::tempdir().unwrap();
    let (mut host, server) = start(&dir.path().join("r.json")).await;
    host.handshake().await;

    host.typing(0).await;
    host.typing(35).await;
    // close host -> bot while keeping the bot's output readable
    host.writer.shutdown().await.unwrap();

    let finished = tokio::time::timeout(Duration::from_secs(5), server).await;
    let result = finished.expect("serve did not return after the gateway closed");
    result.unwrap().unwrap();
}
