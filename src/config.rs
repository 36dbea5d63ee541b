use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::EngineError;
use crate::tracker::SlotMatching;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub round: RoundConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DetectionConfig {
    /// 上方向への移動量がこれを超えたらジャンプ（ピクセル）
    #[serde(default = "default_jump_threshold")]
    pub jump_threshold: f32,
    /// 検出結果とスロットの対応付け方式
    #[serde(default)]
    pub matching: SlotMatching,
    /// proximity方式で同一人物とみなす最大水平距離（ピクセル）。jump_threshold より大きくすること
    #[serde(default = "default_max_match_distance")]
    pub max_match_distance: f32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    /// 全員のジャンプが収まるべき時間幅（秒）
    #[serde(default = "default_sync_window")]
    pub sync_window: f64,
    /// 最後のジャンプからこの時間が経つと一連のジャンプを終了とみなす（秒）
    #[serde(default = "default_jump_end_timeout")]
    pub jump_end_timeout: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RoundConfig {
    /// 目標回数の表示時間（秒）
    #[serde(default = "default_show_number_time")]
    pub show_number_time: f64,
    /// カウントダウン秒数
    #[serde(default = "default_countdown_secs")]
    pub countdown_secs: u32,
    /// 結果表示時間（秒）
    #[serde(default = "default_result_display_time")]
    pub result_display_time: f64,
    #[serde(default = "default_target_min")]
    pub target_min: u32,
    #[serde(default = "default_target_max")]
    pub target_max: u32,
    /// 目標回数の乱数シード（未指定ならOSエントロピー）
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default)]
    pub verbose: bool,
}

fn default_jump_threshold() -> f32 { 50.0 }
fn default_max_match_distance() -> f32 { 150.0 }
fn default_sync_window() -> f64 { 0.25 }
fn default_jump_end_timeout() -> f64 { 2.5 }
fn default_show_number_time() -> f64 { 1.5 }
fn default_countdown_secs() -> u32 { 3 }
fn default_result_display_time() -> f64 { 2.0 }
fn default_target_min() -> u32 { 1 }
fn default_target_max() -> u32 { 10 }
fn default_listen_addr() -> String { "0.0.0.0:9100".to_string() }
fn default_log_dir() -> String { "logs".to_string() }

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            jump_threshold: default_jump_threshold(),
            matching: SlotMatching::default(),
            max_match_distance: default_max_match_distance(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_window: default_sync_window(),
            jump_end_timeout: default_jump_end_timeout(),
        }
    }
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            show_number_time: default_show_number_time(),
            countdown_secs: default_countdown_secs(),
            result_display_time: default_result_display_time(),
            target_min: default_target_min(),
            target_max: default_target_max(),
            seed: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            log_dir: default_log_dir(),
            verbose: false,
        }
    }
}

impl DetectionConfig {
    /// 着地判定の閾値: floor(jump_threshold / 3)
    pub fn settle_threshold(&self) -> f32 {
        (self.jump_threshold / 3.0).floor()
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// ファイルがない・壊れている場合はデフォルト値で起動する
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("{} not found, using defaults", path.display());
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("config error ({e:#}), using defaults");
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> std::result::Result<(), EngineError> {
        let invalid = |msg: String| Err(EngineError::InvalidConfig(msg));
        let detection = &self.detection;
        if !(detection.jump_threshold > 0.0) {
            return invalid(format!(
                "jump_threshold must be > 0 (got {})",
                detection.jump_threshold
            ));
        }
        if !(detection.max_match_distance > detection.jump_threshold) {
            return invalid(format!(
                "max_match_distance ({}) must be > jump_threshold ({})",
                detection.max_match_distance, detection.jump_threshold
            ));
        }
        if !(self.sync.sync_window >= 0.0) {
            return invalid(format!("sync_window must be >= 0 (got {})", self.sync.sync_window));
        }
        if !(self.sync.jump_end_timeout > 0.0) {
            return invalid(format!(
                "jump_end_timeout must be > 0 (got {})",
                self.sync.jump_end_timeout
            ));
        }
        if !(self.round.show_number_time >= 0.0) || !(self.round.result_display_time >= 0.0) {
            return invalid("phase durations must be >= 0".to_string());
        }
        if self.round.target_min > self.round.target_max {
            return invalid(format!(
                "target_min ({}) > target_max ({})",
                self.round.target_min, self.round.target_max
            ));
        }
        Ok(())
    }
}
