/// Layered runtime settings
///
/// Built-in defaults, then an optional TOML file, then environment
/// variables of the form `REGIMEBOT__<SECTION>__<KEY>`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::BotError;
use crate::indicators::DEFAULT_WINDOWS;
use crate::models::{Direction, MarketType, OrderType, TradeKind};
use crate::Result;

pub const DEFAULT_CONFIG_PATH: &str = "regimebot.toml";
const ENV_PREFIX: &str = "REGIMEBOT";

/// Windows the classifier reads; the rest are informational
pub const REQUIRED_WINDOWS: [usize; 4] = [5, 7, 21, 200];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub monitor: MonitorSettings,
    pub trade: TradeSettings,
    pub executor: ExecutorSettings,
    pub trade_log: TradeLogSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub symbol: String,
    pub interval: String,
    pub market_type: MarketType,
    pub windows: Vec<usize>,
    pub candle_limit: usize,
    pub cycle_interval_ms: u64,
    pub pause_poll_ms: u64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".to_string(),
            interval: "1m".to_string(),
            market_type: MarketType::Spot,
            windows: DEFAULT_WINDOWS.to_vec(),
            candle_limit: 200,
            cycle_interval_ms: 1000,
            pause_poll_ms: 2000,
            retry_attempts: 3,
            retry_delay_ms: 1000,
        }
    }
}

/// Per-trade parameters, read fresh before each open
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradeSettings {
    pub amount: f64,
    pub return_percentage: f64,
    pub loss_risk_percentage: f64,
    pub trade_type: OrderType,
    pub limit_price: Option<f64>,
}

impl Default for TradeSettings {
    fn default() -> Self {
        Self {
            amount: 1.0,
            return_percentage: 1.0,
            loss_risk_percentage: 1.0,
            trade_type: OrderType::Market,
            limit_price: None,
        }
    }
}

impl TradeSettings {
    /// Trade kind for an open in the given direction
    pub fn kind_for(&self, direction: Direction) -> TradeKind {
        TradeKind::new(direction, self.trade_type)
    }

    pub fn validate(&self) -> Result<()> {
        if self.return_percentage < 0.0 || self.loss_risk_percentage < 0.0 {
            return Err(BotError::InvalidSetting(format!(
                "percentages must not be negative (return {}, loss risk {})",
                self.return_percentage, self.loss_risk_percentage
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorMode {
    #[default]
    Paper,
    Http,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSettings {
    pub mode: ExecutorMode,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradeLogSettings {
    pub jsonl_path: Option<PathBuf>,
    pub redis_url: Option<String>,
    pub redis_key: String,
}

impl Default for TradeLogSettings {
    fn default() -> Self {
        Self {
            jsonl_path: None,
            redis_url: None,
            redis_key: "regimebot:trades".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from an optional file plus the environment
    ///
    /// A missing file is not an error; defaults fill whatever is absent.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path.as_ref()).required(false))
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("monitor.windows"),
            )
            .build()?;

        let settings: Settings = settings.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let monitor = &self.monitor;

        for required in REQUIRED_WINDOWS {
            if !monitor.windows.contains(&required) {
                return Err(BotError::InvalidSetting(format!(
                    "monitor.windows must include {}",
                    required
                )));
            }
        }

        let largest = monitor.windows.iter().copied().max().unwrap_or(0);
        if monitor.candle_limit < largest {
            return Err(BotError::InvalidSetting(format!(
                "monitor.candle_limit {} is smaller than the largest window {}",
                monitor.candle_limit, largest
            )));
        }

        self.trade.validate()?;

        if self.executor.mode == ExecutorMode::Http && self.executor.base_url.is_none() {
            return Err(BotError::InvalidSetting(
                "executor.base_url is required in http mode".to_string(),
            ));
        }

        Ok(())
    }
}

/// Read-only source of the per-trade parameters
pub trait SettingsStore: Send + Sync {
    fn trade_settings(&self) -> Result<TradeSettings>;
}

/// Fixed settings, used by tests and the simulator
#[derive(Debug, Clone, Default)]
pub struct StaticSettings(pub TradeSettings);

impl SettingsStore for StaticSettings {
    fn trade_settings(&self) -> Result<TradeSettings> {
        Ok(self.0.clone())
    }
}

/// Re-reads the file and environment on every call so edits apply live
#[derive(Debug, Clone)]
pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SettingsStore for FileSettingsStore {
    fn trade_settings(&self) -> Result<TradeSettings> {
        let settings = Settings::load(&self.path)?;
        Ok(settings.trade)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn toml_file(contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert_eq!(settings.monitor.symbol, "BTCUSDT");
        assert_eq!(settings.monitor.windows, vec![5, 7, 21, 150, 200]);
        assert_eq!(settings.monitor.retry_attempts, 3);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings.monitor.interval, "1m");
        assert_eq!(settings.executor.mode, ExecutorMode::Paper);
    }

    #[test]
    fn test_load_from_file() {
        let file = toml_file(
            r#"
[monitor]
symbol = "ETHUSDT"
market_type = "futures"
candle_limit = 250

[trade]
amount = 0.5
return_percentage = 5.0
loss_risk_percentage = 2.0
trade_type = "limit"

[executor]
mode = "http"
base_url = "http://127.0.0.1:9000"
"#,
        );

        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.monitor.symbol, "ETHUSDT");
        assert_eq!(settings.monitor.market_type, MarketType::Futures);
        assert_eq!(settings.monitor.candle_limit, 250);
        // untouched keys keep their defaults
        assert_eq!(settings.monitor.pause_poll_ms, 2000);
        assert_eq!(settings.trade.amount, 0.5);
        assert_eq!(settings.trade.trade_type, OrderType::Limit);
        assert_eq!(settings.trade.kind_for(Direction::Sell), TradeKind::LimitSell);
        assert_eq!(settings.executor.mode, ExecutorMode::Http);
    }

    #[test]
    fn test_env_overrides_file() {
        let file = toml_file("[trade]\nlimit_price = 50.0\n");
        std::env::set_var("REGIMEBOT__TRADE__LIMIT_PRICE", "101.5");

        let loaded = Settings::load(file.path());
        std::env::remove_var("REGIMEBOT__TRADE__LIMIT_PRICE");

        assert_eq!(loaded.unwrap().trade.limit_price, Some(101.5));
    }

    #[test]
    fn test_rejects_short_candle_limit() {
        let mut settings = Settings::default();
        settings.monitor.candle_limit = 150;
        assert!(matches!(settings.validate(), Err(BotError::InvalidSetting(_))));
    }

    #[test]
    fn test_rejects_missing_required_window() {
        let mut settings = Settings::default();
        settings.monitor.windows = vec![5, 7, 200];
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_rejects_negative_percentage() {
        let mut settings = Settings::default();
        settings.trade.loss_risk_percentage = -1.0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_http_mode_needs_base_url() {
        let mut settings = Settings::default();
        settings.executor.mode = ExecutorMode::Http;
        assert!(settings.validate().is_err());

        settings.executor.base_url = Some("http://localhost:9000".to_string());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_file_store_sees_edits() {
        let file = toml_file("[trade]\namount = 2.0\n");
        let store = FileSettingsStore::new(file.path());
        assert_eq!(store.trade_settings().unwrap().amount, 2.0);

        std::fs::write(file.path(), "[trade]\namount = 3.0\n").unwrap();
        assert_eq!(store.trade_settings().unwrap().amount, 3.0);
    }
}
