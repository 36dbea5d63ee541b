//! 目標回数を当てる1ラウンドの進行（目標表示 → カウントダウン → ジャンプ → 結果）

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{RoundConfig, SyncConfig};
use crate::sync::{GroupSynchronizer, SyncOutcome};
use crate::tracker::JumpEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    ShowNumber,
    Countdown,
    Jumping,
    Result,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundOutcome {
    Success,
    WrongCount,
    NotSynchronous,
}

impl RoundOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Success => "Success!",
            Self::WrongCount => "Fail (Wrong count)",
            Self::NotSynchronous => "Fail (Not synchronous)",
        }
    }

    /// 表示色 (RGB)
    pub fn color(&self) -> [u8; 3] {
        match self {
            Self::Success => [0, 255, 0],
            Self::WrongCount | Self::NotSynchronous => [255, 0, 0],
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// 表示・API応答用のラウンド状態
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundSnapshot {
    pub phase: RoundPhase,
    /// リセット直後、次のフレームで引き直すまでは `None`
    pub target: Option<u32>,
    /// フェーズ開始からの経過秒
    pub elapsed: f64,
    /// フェーズ終了までの残り秒（Jumpingでは最初のジャンプ以降、終了判定までの残り）
    pub remaining: Option<f64>,
    /// カウントダウン中の表示数字
    pub countdown: Option<u32>,
    pub jumps: u32,
    pub outcome: Option<RoundOutcome>,
    pub message: Option<String>,
    pub color: Option<[u8; 3]>,
}

pub struct Round {
    config: RoundConfig,
    jump_end_timeout: f64,
    phase: RoundPhase,
    target: u32,
    /// `None` = 次の `advance` の時刻をフェーズ開始とする（起動直後・リセット直後）
    phase_started_at: Option<f64>,
    reroll_pending: bool,
    sync: GroupSynchronizer,
    outcome: Option<RoundOutcome>,
}

impl Round {
    pub fn new<R: Rng + ?Sized>(round: &RoundConfig, sync: &SyncConfig, rng: &mut R) -> Self {
        let mut this = Self {
            config: round.clone(),
            jump_end_timeout: sync.jump_end_timeout,
            phase: RoundPhase::ShowNumber,
            target: round.target_min,
            phase_started_at: None,
            reroll_pending: false,
            sync: GroupSynchronizer::from_config(sync),
            outcome: None,
        };
        this.roll_target(rng);
        this
    }

    fn roll_target<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.target = rng.gen_range(self.config.target_min..=self.config.target_max);
        self.reroll_pending = false;
    }

    /// ジャンプイベントをラウンド内の履歴に積む
    pub fn record(&mut self, events: &[JumpEvent]) {
        self.sync.record(events);
    }

    /// 1フレーム分進める。フェーズが変わった場合は新しいフェーズを返す
    pub fn advance<R: Rng + ?Sized>(
        &mut self,
        now: f64,
        visible: usize,
        all_on_ground: bool,
        rng: &mut R,
    ) -> Option<RoundPhase> {
        let started = match self.phase_started_at {
            Some(t) => t,
            None => {
                if self.reroll_pending {
                    self.roll_target(rng);
                }
                self.phase_started_at = Some(now);
                info!("round start: target={}", self.target);
                now
            }
        };
        let elapsed = now - started;

        match self.phase {
            RoundPhase::ShowNumber => {
                if elapsed > self.config.show_number_time {
                    self.enter(RoundPhase::Countdown, now);
                    return Some(RoundPhase::Countdown);
                }
            }
            RoundPhase::Countdown => {
                if elapsed >= self.config.countdown_secs as f64 {
                    self.sync.reset();
                    self.enter(RoundPhase::Jumping, now);
                    return Some(RoundPhase::Jumping);
                }
            }
            RoundPhase::Jumping => {
                if let SyncOutcome::OutOfSync { window } =
                    self.sync.evaluate(now, visible, all_on_ground)
                {
                    info!("round failed: jumps spread over {:.3}s", window);
                    self.finish(RoundOutcome::NotSynchronous, now);
                    return Some(RoundPhase::Result);
                }
                if let Some(last) = self.sync.last_jump_at() {
                    if self.sync.count() > 0 && now - last > self.jump_end_timeout {
                        let outcome = if self.sync.count() == self.target {
                            RoundOutcome::Success
                        } else {
                            RoundOutcome::WrongCount
                        };
                        self.finish(outcome, now);
                        return Some(RoundPhase::Result);
                    }
                }
            }
            RoundPhase::Result => {
                if elapsed > self.config.result_display_time {
                    self.roll_target(rng);
                    self.sync.reset();
                    self.outcome = None;
                    self.enter(RoundPhase::ShowNumber, now);
                    info!("next round: target={}", self.target);
                    return Some(RoundPhase::ShowNumber);
                }
            }
        }
        None
    }

    fn enter(&mut self, phase: RoundPhase, now: f64) {
        info!("round phase {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
        self.phase_started_at = Some(now);
    }

    fn finish(&mut self, outcome: RoundOutcome, now: f64) {
        info!(
            "round result: {} (jumps {}/{})",
            outcome.message(),
            self.sync.count(),
            self.target
        );
        self.outcome = Some(outcome);
        self.enter(RoundPhase::Result, now);
    }

    /// 目標表示フェーズに戻す。目標回数は次の `advance` で引き直す
    pub fn reset(&mut self) {
        self.phase = RoundPhase::ShowNumber;
        self.phase_started_at = None;
        self.reroll_pending = true;
        self.sync.reset();
        self.outcome = None;
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    /// 現在の目標回数。リセット後、次の `advance` で引き直すまでは `None`
    pub fn target(&self) -> Option<u32> {
        if self.reroll_pending {
            None
        } else {
            Some(self.target)
        }
    }

    pub fn jumps(&self) -> u32 {
        self.sync.count()
    }

    pub fn outcome(&self) -> Option<RoundOutcome> {
        self.outcome
    }

    pub fn snapshot(&self, now: f64) -> RoundSnapshot {
        let elapsed = self.phase_started_at.map(|t| now - t).unwrap_or(0.0);
        let until = |duration: f64| Some((duration - elapsed).max(0.0));

        let remaining = match self.phase {
            RoundPhase::ShowNumber => until(self.config.show_number_time),
            RoundPhase::Countdown => until(self.config.countdown_secs as f64),
            RoundPhase::Jumping => self
                .sync
                .last_jump_at()
                .map(|last| (self.jump_end_timeout - (now - last)).max(0.0)),
            RoundPhase::Result => until(self.config.result_display_time),
        };

        let countdown = match self.phase {
            RoundPhase::Countdown => {
                Some(self.config.countdown_secs.saturating_sub(elapsed.floor() as u32))
            }
            _ => None,
        };

        RoundSnapshot {
            phase: self.phase,
            target: self.target(),
            elapsed,
            remaining,
            countdown,
            jumps: self.sync.count(),
            outcome: self.outcome,
            message: self.outcome.map(|o| o.message().to_string()),
            color: self.outcome.map(|o| o.color()),
        }
    }
}
