//! Persistence boundary
//!
//! The engine only needs atomic create/read/update by ID and query by
//! status; anything beyond that (schema, retention) belongs to the
//! backing store. [`InMemoryStore`] is the default for paper trading and
//! tests. CSV logs of signals, trades and rejections are appended
//! day-by-day for offline analysis.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use csv::WriterBuilder;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock as AsyncRwLock;

use crate::types::{Position, PositionStatus};

/// Durable position storage as the engine sees it.
#[async_trait]
pub trait PositionStore: Send + Sync {
    /// Insert a new position; fails if the ID already exists.
    async fn create(&self, position: &Position) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<Position>>;
    /// Replace an existing position; fails if the ID is unknown.
    async fn update(&self, position: &Position) -> Result<()>;
    async fn query_by_status(&self, status: PositionStatus) -> Result<Vec<Position>>;
}

/// Position store backed by a map, for paper mode and tests.
#[derive(Default)]
pub struct InMemoryStore {
    positions: AsyncRwLock<HashMap<String, Position>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PositionStore for InMemoryStore {
    async fn create(&self, position: &Position) -> Result<()> {
        let mut positions = self.positions.write().await;
        if positions.contains_key(&position.id) {
            anyhow::bail!("position {} already exists", position.id);
        }
        positions.insert(position.id.clone(), position.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Position>> {
        Ok(self.positions.read().await.get(id).cloned())
    }

    async fn update(&self, position: &Position) -> Result<()> {
        let mut positions = self.positions.write().await;
        if !positions.contains_key(&position.id) {
            anyhow::bail!("position {} does not exist", position.id);
        }
        positions.insert(position.id.clone(), position.clone());
        Ok(())
    }

    async fn query_by_status(&self, status: PositionStatus) -> Result<Vec<Position>> {
        Ok(self
            .positions
            .read()
            .await
            .values()
            .filter(|p| p.status == status)
            .cloned()
            .collect())
    }
}

/// Signal row for CSV storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalRow {
    pub timestamp: i64,
    pub signal_id: String,
    pub strategy: String,
    pub market_id: String,
    pub token_id: String,
    pub side: String,
    pub price: f64,
    pub edge: f64,
    pub confidence: f64,
    pub reason: String,
    #[serde(default)]
    pub size_usd: Option<f64>,
}

/// Executed trade row for CSV storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRow {
    pub timestamp: i64,
    pub strategy: String,
    pub market_id: String,
    pub token_id: String,
    pub side: String,
    pub price: f64,
    pub shares: f64,
    pub stake_usd: f64,
}

/// Rejected signal row for CSV storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectionRow {
    pub timestamp: i64,
    pub signal_id: String,
    pub strategy: String,
    pub market_id: String,
    pub reason: String,
}

/// Appends engine events to daily CSV files under the data directory.
pub struct CsvLogger {
    signal_writer: Arc<AsyncRwLock<csv::Writer<std::fs::File>>>,
    trade_writer: Arc<AsyncRwLock<csv::Writer<std::fs::File>>>,
    rejection_writer: Arc<AsyncRwLock<csv::Writer<std::fs::File>>>,
}

impl CsvLogger {
    pub fn new(data_dir: &str) -> Result<Self> {
        let data_dir = PathBuf::from(data_dir);
        fs::create_dir_all(&data_dir).context("Failed to create data directory")?;
        fs::create_dir_all(data_dir.join("signals"))?;
        fs::create_dir_all(data_dir.join("trades"))?;
        fs::create_dir_all(data_dir.join("rejections"))?;

        let today = Utc::now().format("%Y-%m-%d");
        let signal_writer =
            Self::create_writer(&data_dir.join("signals"), &format!("signals_{}.csv", today))?;
        let trade_writer =
            Self::create_writer(&data_dir.join("trades"), &format!("trades_{}.csv", today))?;
        let rejection_writer = Self::create_writer(
            &data_dir.join("rejections"),
            &format!("rejections_{}.csv", today),
        )?;

        Ok(Self {
            signal_writer: Arc::new(AsyncRwLock::new(signal_writer)),
            trade_writer: Arc::new(AsyncRwLock::new(trade_writer)),
            rejection_writer: Arc::new(AsyncRwLock::new(rejection_writer)),
        })
    }

    fn create_writer(dir: &Path, filename: &str) -> Result<csv::Writer<std::fs::File>> {
        let path = dir.join(filename);
        let file_has_data =
            path.exists() && fs::metadata(&path).map(|m| m.len() > 0).unwrap_or(false);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .context("Failed to open CSV file")?;

        Ok(WriterBuilder::new()
            .has_headers(!file_has_data)
            .from_writer(file))
    }

    pub async fn log_signal(&self, row: SignalRow) -> Result<()> {
        let mut writer = self.signal_writer.write().await;
        writer
            .serialize(&row)
            .context("Failed to write signal row")?;
        writer.flush().context("Failed to flush signal writer")?;
        Ok(())
    }

    pub async fn log_trade(&self, row: TradeRow) -> Result<()> {
        let mut writer = self.trade_writer.write().await;
        writer.serialize(&row).context("Failed to write trade row")?;
        writer.flush().context("Failed to flush trade writer")?;
        Ok(())
    }

    pub async fn log_rejection(&self, row: RejectionRow) -> Result<()> {
        let mut writer = self.rejection_writer.write().await;
        writer
            .serialize(&row)
            .context("Failed to write rejection row")?;
        writer.flush().context("Failed to flush rejection writer")?;
        Ok(())
    }
}
