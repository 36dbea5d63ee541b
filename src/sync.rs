//! 全員が同時にジャンプしたかどうかの判定。
//!
//! 同じ判定をエンジン全体の通算カウンタと、ラウンド内のカウンタの2か所で使う。

use serde::Serialize;
use tracing::info;

use crate::config::SyncConfig;
use crate::tracker::JumpEvent;

/// `evaluate` の結果
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// 判定条件がそろっていない
    Idle,
    /// 直近N件が時間窓に収まった
    Synchronized { window: f64 },
    /// 直近N件が時間窓からはみ出した
    OutOfSync { window: f64 },
}

/// ジャンプ履歴と再判定ラッチを持つ同時ジャンプ判定器
#[derive(Debug, Clone)]
pub struct GroupSynchronizer {
    sync_window: f64,
    history: Vec<JumpEvent>,
    can_jump: bool,
    count: u32,
    last_jump_at: Option<f64>,
}

impl GroupSynchronizer {
    pub fn new(sync_window: f64) -> Self {
        Self {
            sync_window,
            history: Vec::new(),
            can_jump: true,
            count: 0,
            last_jump_at: None,
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.sync_window)
    }

    pub fn record(&mut self, events: &[JumpEvent]) {
        self.history.extend_from_slice(events);
    }

    /// 1フレームに1回呼ぶ
    ///
    /// `visible` はこのフレームの検出人数、`all_on_ground` は見えている全員が接地しているか。
    /// 全員の着地後に直近 `visible` 件のジャンプ時刻の幅を調べ、窓内ならカウントしてラッチを閉じる。
    /// ラッチが閉じていて全員接地なら、ラッチを開けて履歴を捨てる（次の判定の始まり）。
    pub fn evaluate(&mut self, now: f64, visible: usize, all_on_ground: bool) -> SyncOutcome {
        let mut outcome = SyncOutcome::Idle;

        if visible > 0 && self.history.len() >= visible && self.can_jump && all_on_ground {
            let recent = &self.history[self.history.len() - visible..];
            let window = time_spread(recent);
            if window <= self.sync_window {
                self.count += 1;
                self.last_jump_at = Some(now);
                self.can_jump = false;
                info!(
                    "synchronized jump #{} (window {:.3}s, {} people)",
                    self.count, window, visible
                );
                outcome = SyncOutcome::Synchronized { window };
            } else {
                outcome = SyncOutcome::OutOfSync { window };
            }
        }

        if !self.can_jump && all_on_ground {
            self.can_jump = true;
            self.history.clear();
        }

        outcome
    }

    /// 最後の同時ジャンプから `timeout` 秒以上経っていたら途中の履歴を捨てる（カウンタは維持）
    pub fn expire_stale(&mut self, now: f64, timeout: f64) -> bool {
        if self.count == 0 {
            return false;
        }
        match self.last_jump_at {
            Some(last) if now - last > timeout => {
                let dropped = !self.history.is_empty();
                self.history.clear();
                dropped
            }
            _ => false,
        }
    }

    /// 新しい判定エピソードを始める（カウンタは維持）
    pub fn rearm(&mut self) {
        self.history.clear();
        self.can_jump = true;
    }

    pub fn reset(&mut self) {
        self.rearm();
        self.count = 0;
        self.last_jump_at = None;
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn last_jump_at(&self) -> Option<f64> {
        self.last_jump_at
    }

    pub fn can_jump(&self) -> bool {
        self.can_jump
    }

    pub fn history(&self) -> &[JumpEvent] {
        &self.history
    }
}

fn time_spread(events: &[JumpEvent]) -> f64 {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for event in events {
        min = min.min(event.timestamp);
        max = max.max(event.timestamp);
    }
    max - min
}
