//! 1本の映像ストリームぶんのジャンプ判定エンジン。
//!
//! 人物追跡 → 通算の同時ジャンプ判定 → ラウンド進行 を毎フレーム同期的に回す。
//! 状態はすべてインスタンスが持つ。複数ストリームを扱う場合はストリームごとに1つ作り、
//! 同じインスタンスへの呼び出しは呼び出し側で直列化すること。
//! タイムアウトは `update` のたびに時刻を比較して判定するので、呼び出しが止まるとタイマーも止まる。

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{EngineError, Result};
use crate::pose::PersonKeypoints;
use crate::round::{Round, RoundPhase, RoundSnapshot};
use crate::sync::GroupSynchronizer;
use crate::tracker::{JumpEvent, MotionState, PersonTracker, SlotId};

/// ラウンド切り替え時にスロットの前回Yを戻す基準値
pub const NEUTRAL_BASELINE_Y: f32 = 0.0;

/// 表示用のスロット状態
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotSnapshot {
    pub slot: SlotId,
    pub y: f32,
    pub state: MotionState,
}

/// `update` 1回分の出力
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameReport {
    pub timestamp: f64,
    /// このフレームの検出人数
    pub people: usize,
    /// 通算の同時ジャンプ回数
    pub group_jumps: u32,
    /// このフレームで発生したジャンプ
    pub events: Vec<JumpEvent>,
    pub slots: Vec<SlotSnapshot>,
    pub round: RoundSnapshot,
}

pub struct JumpEngine {
    config: Config,
    tracker: PersonTracker,
    group: GroupSynchronizer,
    round: Round,
    rng: StdRng,
    last_timestamp: Option<f64>,
}

impl JumpEngine {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let mut rng = match config.round.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let round = Round::new(&config.round, &config.sync, &mut rng);
        Ok(Self {
            tracker: PersonTracker::from_config(&config.detection),
            group: GroupSynchronizer::from_config(&config.sync),
            round,
            rng,
            last_timestamp: None,
            config,
        })
    }

    /// 1フレーム処理する
    ///
    /// `timestamp` は単調増加の秒。不正な時刻は状態を変えずにエラーを返す。
    pub fn update(&mut self, timestamp: f64, people: &[PersonKeypoints]) -> Result<FrameReport> {
        self.check_timestamp(timestamp)?;
        self.last_timestamp = Some(timestamp);

        let tracked = self.tracker.update(timestamp, people);
        let visible = people.len();
        let all_on_ground = self.tracker.all_on_ground(&tracked.visible);

        self.group.record(&tracked.events);
        self.group.evaluate(timestamp, visible, all_on_ground);
        self.group
            .expire_stale(timestamp, self.config.sync.jump_end_timeout);

        self.round.record(&tracked.events);
        if let Some(RoundPhase::ShowNumber) =
            self.round
                .advance(timestamp, visible, all_on_ground, &mut self.rng)
        {
            self.tracker.settle_all(NEUTRAL_BASELINE_Y);
        }

        let slots = tracked
            .visible
            .iter()
            .filter_map(|&id| {
                self.tracker.slot(id).map(|slot| SlotSnapshot {
                    slot: id,
                    y: slot.last_y,
                    state: slot.state,
                })
            })
            .collect();

        Ok(FrameReport {
            timestamp,
            people: visible,
            group_jumps: self.group.count(),
            events: tracked.events,
            slots,
            round: self.round.snapshot(timestamp),
        })
    }

    fn check_timestamp(&self, timestamp: f64) -> Result<()> {
        if !timestamp.is_finite() || timestamp < 0.0 {
            warn!("rejected frame: invalid timestamp {}", timestamp);
            return Err(EngineError::InvalidTimestamp { timestamp });
        }
        if let Some(previous) = self.last_timestamp {
            if timestamp < previous {
                warn!("rejected frame: timestamp {} < {}", timestamp, previous);
                return Err(EngineError::NonMonotonicTimestamp {
                    previous,
                    current: timestamp,
                });
            }
        }
        Ok(())
    }

    /// 通算カウンタ・履歴・追跡スロット・ラウンドを初期状態に戻す
    ///
    /// 何度呼んでも結果は同じ。時刻の単調性チェックもリセットされる。
    pub fn reset(&mut self) {
        self.group.reset();
        self.tracker.reset();
        self.round.reset();
        self.last_timestamp = None;
        info!("engine reset");
    }

    pub fn group_jumps(&self) -> u32 {
        self.group.count()
    }

    pub fn tracker(&self) -> &PersonTracker {
        &self.tracker
    }

    pub fn round(&self) -> &Round {
        &self.round
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
