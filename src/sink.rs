// ===============================
// src/sink.rs
// ===============================
//
// Trade sinks: the only write path out of the generator.
//
// - StdoutSink  : satu baris JSON per trade ke stdout
// - JsonlSink   : append ke file .jsonl (BufWriter, flush tiap 1000 trade)
// - RedisStreamSink : XADD tiap trade ke Redis stream (default trades:stream)
// - ChannelSink : mpsc ke consumer in-process (juga dipakai test)
//
// `ping` is the liveness probe run once before generation starts.
// A hung publish stalls the generator; only RedisStreamSink has its own timeout.
//
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use thiserror::Error;
use tokio::{
    fs::{self, OpenOptions},
    io::{AsyncWrite, AsyncWriteExt, BufWriter},
    sync::mpsc,
    time::timeout,
};
use tracing::{info, warn};
use url::Url;

use crate::domain::Trade;

const FLUSH_EVERY_N_TRADES: u32 = 1000;
const REDIS_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_REDIS_HOST: &str = "localhost";
pub const DEFAULT_REDIS_PORT: u16 = 6379;
pub const DEFAULT_STREAM: &str = "trades:stream";

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialize trade: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("redis url: {0}")]
    Url(#[from] url::ParseError),
    #[error("no reply within {0:?}")]
    Timeout(Duration),
    #[error("sink channel closed")]
    Closed,
}

#[async_trait]
pub trait TradeSink: Send {
    /// Liveness probe; must succeed before the generator starts.
    async fn ping(&mut self) -> Result<(), SinkError>;
    async fn publish(&mut self, trade: &Trade) -> Result<(), SinkError>;
    async fn flush(&mut self) -> Result<(), SinkError> { Ok(()) }
    fn describe(&self) -> String;
}

/// Where trades go, parsed from `--sink`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkSpec {
    Stdout,
    Jsonl(PathBuf),
    Redis(RedisTarget),
}

impl FromStr for SinkSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("stdout") || s == "-" {
            return Ok(SinkSpec::Stdout);
        }
        if let Some(path) = s.strip_prefix("jsonl:") {
            if path.is_empty() {
                return Err("jsonl sink needs a path (jsonl:<path>)".to_string());
            }
            return Ok(SinkSpec::Jsonl(PathBuf::from(path)));
        }
        if s.eq_ignore_ascii_case("redis") {
            return Ok(SinkSpec::Redis(RedisTarget::default()));
        }
        if s.starts_with("redis://") {
            return RedisTarget::parse_url(s).map(SinkSpec::Redis);
        }
        Err(format!("unknown sink {s:?} (expected stdout, jsonl:<path>, redis or redis://host:port/db)"))
    }
}

impl fmt::Display for SinkSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkSpec::Stdout => f.write_str("stdout"),
            SinkSpec::Jsonl(p) => write!(f, "jsonl:{}", p.display()),
            SinkSpec::Redis(t) => write!(f, "{t}"),
        }
    }
}

/// Open the sink described by `spec`. Does not probe it; the engine does.
pub async fn connect(spec: &SinkSpec) -> Result<Box<dyn TradeSink>, SinkError> {
    Ok(match spec {
        SinkSpec::Stdout => Box::new(StdoutSink::new()),
        SinkSpec::Jsonl(path) => Box::new(JsonlSink::open(path).await?),
        SinkSpec::Redis(target) => Box::new(RedisStreamSink::new(target.clone())?),
    })
}

// ---- line writer shared by stdout & jsonl ----

struct LineWriter<W: AsyncWrite + Unpin + Send> {
    writer: BufWriter<W>,
    since_last_flush: u32,
}

impl<W: AsyncWrite + Unpin + Send> LineWriter<W> {
    fn new(inner: W) -> Self {
        Self { writer: BufWriter::new(inner), since_last_flush: 0 }
    }

    async fn write_trade(&mut self, trade: &Trade) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(trade)?;
        line.push(b'\n');
        self.writer.write_all(&line).await?;

        self.since_last_flush += 1;
        if self.since_last_flush >= FLUSH_EVERY_N_TRADES {
            self.flush().await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush().await?;
        self.since_last_flush = 0;
        Ok(())
    }
}

pub struct StdoutSink {
    out: LineWriter<tokio::io::Stdout>,
}

impl StdoutSink {
    pub fn new() -> Self { Self { out: LineWriter::new(tokio::io::stdout()) } }
}

impl Default for StdoutSink {
    fn default() -> Self { Self::new() }
}

#[async_trait]
impl TradeSink for StdoutSink {
    async fn ping(&mut self) -> Result<(), SinkError> { self.out.flush().await }
    async fn publish(&mut self, trade: &Trade) -> Result<(), SinkError> { self.out.write_trade(trade).await }
    async fn flush(&mut self) -> Result<(), SinkError> { self.out.flush().await }
    fn describe(&self) -> String { "stdout".to_string() }
}

pub struct JsonlSink {
    path: PathBuf,
    out: LineWriter<tokio::fs::File>,
}

impl JsonlSink {
    /// Append mode; missing parent directories are created.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path).await?;
        info!(path = %path.display(), "jsonl sink opened");
        Ok(Self { path, out: LineWriter::new(file) })
    }
}

#[async_trait]
impl TradeSink for JsonlSink {
    async fn ping(&mut self) -> Result<(), SinkError> {
        self.out.flush().await?;
        fs::metadata(&self.path).await?;
        Ok(())
    }
    async fn publish(&mut self, trade: &Trade) -> Result<(), SinkError> { self.out.write_trade(trade).await }
    async fn flush(&mut self) -> Result<(), SinkError> { self.out.flush().await }
    fn describe(&self) -> String { format!("jsonl:{}", self.path.display()) }
}

// ---- Redis stream ----

/// Where the Redis sink connects and which stream it appends to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisTarget {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: i64,
    pub stream: String,
}

impl Default for RedisTarget {
    fn default() -> Self {
        Self {
            host: DEFAULT_REDIS_HOST.to_string(),
            port: DEFAULT_REDIS_PORT,
            password: None,
            db: 0,
            stream: DEFAULT_STREAM.to_string(),
        }
    }
}

impl RedisTarget {
    /// `redis://[:password@]host[:port][/db][?stream=name]`
    pub fn parse_url(raw: &str) -> Result<Self, String> {
        let url = Url::parse(raw).map_err(|e| format!("bad redis url {raw:?}: {e}"))?;
        if url.scheme() != "redis" {
            return Err(format!("bad redis url {raw:?}: scheme must be redis"));
        }
        let mut target = RedisTarget::default();
        if let Some(host) = url.host_str().filter(|h| !h.is_empty()) {
            target.host = host.to_string();
        }
        if let Some(port) = url.port() {
            target.port = port;
        }
        if let Some(pw) = url.password() {
            let pw = urlencoding::decode(pw).map_err(|e| format!("bad redis password encoding: {e}"))?;
            target.password = Some(pw.into_owned());
        }
        let db = url.path().trim_matches('/');
        if !db.is_empty() {
            target.db = db.parse().map_err(|_| format!("bad redis db {db:?} in {raw:?}"))?;
        }
        if let Some((_, stream)) = url.query_pairs().find(|(k, _)| k == "stream") {
            if stream.is_empty() {
                return Err("redis stream name is empty".to_string());
            }
            target.stream = stream.into_owned();
        }
        Ok(target)
    }

    /// URL handed to the redis client (password included, percent-encoded).
    pub fn connection_url(&self) -> Result<Url, SinkError> {
        let mut url = Url::parse(&format!("redis://{}:{}/{}", self.host, self.port, self.db))?;
        if let Some(pw) = &self.password {
            // only fails for cannot-be-a-base urls
            let _ = url.set_password(Some(pw));
        }
        Ok(url)
    }
}

// password never printed
impl fmt::Display for RedisTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let auth = if self.password.is_some() { ":***@" } else { "" };
        write!(f, "redis://{auth}{}:{}/{}?stream={}", self.host, self.port, self.db, self.stream)
    }
}

/// Field/value pairs appended per trade (`XADD <stream> * k v ...`).
pub fn stream_fields(trade: &Trade) -> [(&'static str, String); 7] {
    [
        ("id", trade.id.to_string()),
        ("user_id", trade.user_id.clone()),
        ("symbol", trade.symbol.clone()),
        ("amount", trade.amount.to_string()),
        ("price", trade.price.to_string()),
        ("side", trade.side.as_str().to_string()),
        ("timestamp", trade.timestamp.to_rfc3339()),
    ]
}

/// Appends every trade to a Redis stream. Connects lazily on `ping`, reconnects
/// on the next publish after an I/O failure.
pub struct RedisStreamSink {
    target: RedisTarget,
    client: redis::Client,
    conn: Option<MultiplexedConnection>,
}

impl RedisStreamSink {
    pub fn new(target: RedisTarget) -> Result<Self, SinkError> {
        let client = redis::Client::open(target.connection_url()?.as_str())?;
        Ok(Self { target, client, conn: None })
    }

    async fn connection(&mut self) -> Result<MultiplexedConnection, SinkError> {
        if self.conn.is_none() {
            let conn = timeout(REDIS_TIMEOUT, self.client.get_multiplexed_async_connection())
                .await
                .map_err(|_| SinkError::Timeout(REDIS_TIMEOUT))??;
            info!(redis = %self.target, "redis connected");
            self.conn = Some(conn);
        }
        self.conn.clone().ok_or(SinkError::Closed)
    }

    async fn run(&mut self, cmd: redis::Cmd) -> Result<String, SinkError> {
        let mut conn = self.connection().await?;
        let reply = timeout(REDIS_TIMEOUT, cmd.query_async::<_, String>(&mut conn))
            .await
            .map_err(|_| SinkError::Timeout(REDIS_TIMEOUT))?;
        match reply {
            Ok(v) => Ok(v),
            Err(e) => {
                if e.is_io_error() || e.is_connection_dropped() {
                    warn!(redis = %self.target, error = %e, "redis connection lost, reconnecting on next publish");
                    self.conn = None;
                }
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl TradeSink for RedisStreamSink {
    async fn ping(&mut self) -> Result<(), SinkError> {
        self.run(redis::cmd("PING")).await.map(|_| ())
    }

    async fn publish(&mut self, trade: &Trade) -> Result<(), SinkError> {
        let mut cmd = redis::cmd("XADD");
        cmd.arg(&self.target.stream).arg("*");
        for (field, value) in stream_fields(trade) {
            cmd.arg(field).arg(value);
        }
        self.run(cmd).await.map(|_| ())
    }

    fn describe(&self) -> String { self.target.to_string() }
}

/// Hands trades to an in-process consumer.
pub struct ChannelSink {
    tx: mpsc::Sender<Trade>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Trade>) -> Self { Self { tx } }

    /// Sink + receiving end with room for `capacity` trades.
    pub fn pair(capacity: usize) -> (Self, mpsc::Receiver<Trade>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl TradeSink for ChannelSink {
    async fn ping(&mut self) -> Result<(), SinkError> {
        if self.tx.is_closed() { Err(SinkError::Closed) } else { Ok(()) }
    }

    async fn publish(&mut self, trade: &Trade) -> Result<(), SinkError> {
        self.tx.send(trade.clone()).await.map_err(|_| SinkError::Closed)
    }

    fn describe(&self) -> String { "channel".to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Side;
    use chrono::Utc;
    use uuid::Uuid;

    fn trade(n: u32) -> Trade {
        Trade {
            id: Uuid::new_v4(),
            user_id: format!("USER_{n:03}"),
            symbol: "AAPL".into(),
            amount: 10.0 + n as f64,
            price: 175.5,
            side: Side::Sell,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn sink_spec_parsing() {
        assert_eq!("stdout".parse::<SinkSpec>().unwrap(), SinkSpec::Stdout);
        assert_eq!(
            "jsonl:out/trades.jsonl".parse::<SinkSpec>().unwrap(),
            SinkSpec::Jsonl(PathBuf::from("out/trades.jsonl"))
        );
        assert_eq!("redis".parse::<SinkSpec>().unwrap(), SinkSpec::Redis(RedisTarget::default()));
        assert!("jsonl:".parse::<SinkSpec>().is_err());
        assert!("http://localhost:8080/trades".parse::<SinkSpec>().is_err());
    }

    #[tokio::test]
    async fn jsonl_sink_appends_one_line_per_trade() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dir/trades.jsonl");
        let mut sink = JsonlSink::open(&path).await.unwrap();
        sink.ping().await.unwrap();
        let sent: Vec<Trade> = (0..3).map(trade).collect();
        for t in &sent {
            sink.publish(t).await.unwrap();
        }
        sink.flush().await.unwrap();

        let body = std::fs::read_to_string(&path).unwrap();
        let back: Vec<Trade> = body.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(back, sent);
        assert!(body.contains("\"side\":\"SELL\""));
    }

    #[tokio::test]
    async fn channel_sink_reports_closed_receiver() {
        let (mut sink, rx) = ChannelSink::pair(4);
        sink.ping().await.unwrap();
        sink.publish(&trade(1)).await.unwrap();
        drop(rx);
        assert!(matches!(sink.ping().await, Err(SinkError::Closed)));
        assert!(matches!(sink.publish(&trade(2)).await, Err(SinkError::Closed)));
    }

    #[test]
    fn redis_url_parsing() {
        let t = RedisTarget::parse_url("redis://:s3cr%40t@cache.internal:6380/2?stream=trades:test").unwrap();
        assert_eq!(t.host, "cache.internal");
        assert_eq!(t.port, 6380);
        assert_eq!(t.password.as_deref(), Some("s3cr@t"));
        assert_eq!(t.db, 2);
        assert_eq!(t.stream, "trades:test");

        let t = RedisTarget::parse_url("redis://10.0.0.5").unwrap();
        assert_eq!((t.host.as_str(), t.port, t.db), ("10.0.0.5", DEFAULT_REDIS_PORT, 0));
        assert_eq!(t.password, None);
        assert_eq!(t.stream, DEFAULT_STREAM);

        assert!(RedisTarget::parse_url("redis://localhost/zero").is_err());
        assert!(RedisTarget::parse_url("redis://localhost?stream=").is_err());
        assert!("redis://localhost:notaport".parse::<SinkSpec>().is_err());
    }

    #[test]
    fn redis_display_hides_password() {
        let t = RedisTarget { password: Some("hunter2".into()), ..RedisTarget::default() };
        let shown = SinkSpec::Redis(t.clone()).to_string();
        assert_eq!(shown, "redis://:***@localhost:6379/0?stream=trades:stream");
        assert!(!shown.contains("hunter2"));
        // the client url still carries it
        assert_eq!(t.connection_url().unwrap().password(), Some("hunter2"));
    }

    #[test]
    fn stream_fields_carry_the_whole_trade() {
        let t = trade(7);
        let fields = stream_fields(&t);
        let get = |k: &str| fields.iter().find(|(f, _)| *f == k).map(|(_, v)| v.clone()).unwrap();
        assert_eq!(get("id"), t.id.to_string());
        assert_eq!(get("user_id"), "USER_007");
        assert_eq!(get("symbol"), "AAPL");
        assert_eq!(get("amount").parse::<f64>().unwrap(), 17.0);
        assert_eq!(get("price").parse::<f64>().unwrap(), 175.5);
        assert_eq!(get("side"), "SELL");
        assert_eq!(get("timestamp"), t.timestamp.to_rfc3339());
    }

    #[test]
    fn redis_errors_map_to_sink_errors() {
        let e: SinkError = redis::RedisError::from((redis::ErrorKind::IoError, "connection refused")).into();
        assert!(matches!(e, SinkError::Redis(_)));
        assert!(e.to_string().starts_with("redis: "));
        assert!(e.to_string().contains("connection refused"));

        let e: SinkError = Url::parse("redis://[::1").unwrap_err().into();
        assert!(matches!(e, SinkError::Url(_)));
    }

    #[tokio::test]
    async fn redis_sink_ping_fails_without_server() {
        // nothing listens on the discard port
        let target = RedisTarget { host: "127.0.0.1".into(), port: 9, ..RedisTarget::default() };
        let mut sink = RedisStreamSink::new(target).unwrap();
        let err = sink.ping().await.unwrap_err();
        assert!(matches!(err, SinkError::Redis(_) | SinkError::Timeout(_)), "{err}");
        assert_eq!(sink.describe(), "redis://127.0.0.1:9/0?stream=trades:stream");
    }
}
