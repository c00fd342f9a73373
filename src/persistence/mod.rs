use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;
use tokio::time::{timeout, Duration};

use crate::error::BotError;
use crate::models::TradeRecord;
use crate::Result;

/// Sink for open/close trade events
pub trait TradeLog: Send + Sync {
    fn record(&self, record: &TradeRecord) -> impl Future<Output = Result<()>> + Send;
}

impl<T: TradeLog> TradeLog for Arc<T> {
    fn record(&self, record: &TradeRecord) -> impl Future<Output = Result<()>> + Send {
        (**self).record(record)
    }
}

/// Keeps records in memory, used by the simulator and tests
#[derive(Debug, Default)]
pub struct MemoryTradeLog {
    records: Mutex<Vec<TradeRecord>>,
}

impl MemoryTradeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<TradeRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

impl TradeLog for MemoryTradeLog {
    async fn record(&self, record: &TradeRecord) -> Result<()> {
        self.records
            .lock()
            .map_err(|_| BotError::TradeLog("memory log lock poisoned".to_string()))?
            .push(record.clone());
        Ok(())
    }
}

/// Appends one JSON object per line
pub struct JsonlTradeLog {
    path: PathBuf,
    // Serializes appends so lines never interleave
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonlTradeLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every record in the file, oldest first
    ///
    /// A missing file reads as empty. Lines that do not parse (e.g. a write
    /// cut short) are logged and skipped.
    pub async fn load_all(&self) -> Result<Vec<TradeRecord>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for (index, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(
                    path = %self.path.display(),
                    line = index + 1,
                    error = %e,
                    "Skipping unreadable trade record"
                ),
            }
        }
        Ok(records)
    }
}

impl TradeLog for JsonlTradeLog {
    async fn record(&self, record: &TradeRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        tracing::debug!(path = %self.path.display(), trade_id = %record.trade_id, "Trade record appended");
        Ok(())
    }
}

/// Pushes JSON records onto a Redis list
#[derive(Clone)]
pub struct RedisTradeLog {
    conn: ConnectionManager,
    key: String,
}

impl RedisTradeLog {
    /// Connect to Redis
    ///
    /// # Arguments
    /// * `redis_url` - Redis connection URL (e.g., "redis://127.0.0.1:6379")
    /// * `key` - List the records are pushed onto
    pub async fn connect(redis_url: &str, key: impl Into<String>) -> Result<Self> {
        let client = Client::open(redis_url)?;

        let conn = timeout(Duration::from_secs(5), ConnectionManager::new(client))
            .await
            .map_err(|_| BotError::TradeLog("Redis connection timeout after 5 seconds".to_string()))??;

        tracing::info!("Connected to Redis at {}", redis_url);

        Ok(Self {
            conn,
            key: key.into(),
        })
    }

    /// All records on the list, oldest first
    pub async fn load_all(&self) -> Result<Vec<TradeRecord>> {
        let mut conn = self.conn.clone();
        let values: Vec<String> = conn.lrange(&self.key, 0, -1).await?;

        values
            .iter()
            .map(|json| serde_json::from_str(json).map_err(BotError::from))
            .collect()
    }

    pub async fn clear(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(&self.key).await?;
        Ok(())
    }
}

impl TradeLog for RedisTradeLog {
    async fn record(&self, record: &TradeRecord) -> Result<()> {
        let value = serde_json::to_string(record)?;
        let mut conn = self.conn.clone();
        conn.rpush::<_, _, ()>(&self.key, value).await?;

        tracing::debug!(key = %self.key, trade_id = %record.trade_id, "Trade record pushed");
        Ok(())
    }
}

/// One configured sink
pub enum TradeSink {
    Memory(Arc<MemoryTradeLog>),
    Jsonl(JsonlTradeLog),
    Redis(RedisTradeLog),
}

impl TradeSink {
    fn name(&self) -> &'static str {
        match self {
            TradeSink::Memory(_) => "memory",
            TradeSink::Jsonl(_) => "jsonl",
            TradeSink::Redis(_) => "redis",
        }
    }

    async fn record(&self, record: &TradeRecord) -> Result<()> {
        match self {
            TradeSink::Memory(log) => log.record(record).await,
            TradeSink::Jsonl(log) => log.record(record).await,
            TradeSink::Redis(log) => log.record(record).await,
        }
    }
}

/// Writes each record to every sink
///
/// A failing sink is logged and skipped; the call fails only when every
/// sink failed.
#[derive(Default)]
pub struct FanoutTradeLog {
    sinks: Vec<TradeSink>,
}

impl FanoutTradeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: TradeSink) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl TradeLog for FanoutTradeLog {
    async fn record(&self, record: &TradeRecord) -> Result<()> {
        let mut failures = 0;
        for sink in &self.sinks {
            if let Err(e) = sink.record(record).await {
                failures += 1;
                tracing::warn!(sink = sink.name(), error = %e, "Trade log sink failed");
            }
        }

        if failures > 0 && failures == self.sinks.len() {
            return Err(BotError::TradeLog(format!(
                "all {} trade log sinks failed",
                failures
            )));
        }
        Ok(())
    }
}
