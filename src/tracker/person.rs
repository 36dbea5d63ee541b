use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::DetectionConfig;
use crate::pose::{Keypoint, PersonKeypoints};
use crate::tracker::matching::{match_by_position, match_by_proximity, SlotId, SlotMatching};

/// 接地/空中
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotionState {
    #[default]
    Ground,
    Air,
}

/// Ground→Air 遷移1回につき1つ発行される
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JumpEvent {
    pub slot: SlotId,
    pub timestamp: f64,
}

/// スロットごとの追跡状態
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedSlot {
    /// 前回の基準点Y
    pub last_y: f32,
    /// 前回観測した基準点（proximity対応付け用）
    pub anchor: Keypoint,
    pub state: MotionState,
}

impl TrackedSlot {
    fn new(reference: Keypoint) -> Self {
        Self {
            last_y: reference.y,
            anchor: reference,
            state: MotionState::Ground,
        }
    }
}

/// 1フレーム分の更新結果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackerUpdate {
    pub events: Vec<JumpEvent>,
    /// このフレームで存在したスロット（キーポイント無しで維持されたものを含む）
    pub visible: Vec<SlotId>,
}

/// 人物ごとのジャンプ検出
///
/// 基準点（鼻）のYが1フレームで `jump_threshold` より大きく上がったら空中へ、
/// 空中で上下動が `floor(jump_threshold / 3)` 未満に収まったら接地に戻す。
pub struct PersonTracker {
    jump_threshold: f32,
    settle_threshold: f32,
    matching: SlotMatching,
    max_match_distance: f32,
    slots: BTreeMap<SlotId, TrackedSlot>,
    next_id: SlotId,
}

impl PersonTracker {
    pub fn new(jump_threshold: f32, matching: SlotMatching) -> Self {
        let config = DetectionConfig {
            jump_threshold,
            matching,
            ..DetectionConfig::default()
        };
        Self::from_config(&config)
    }

    pub fn from_config(config: &DetectionConfig) -> Self {
        Self {
            jump_threshold: config.jump_threshold,
            settle_threshold: config.settle_threshold(),
            matching: config.matching,
            max_match_distance: config.max_match_distance,
            slots: BTreeMap::new(),
            next_id: 0,
        }
    }

    /// 1フレーム分の検出で状態を更新し、発生したジャンプを返す
    pub fn update(&mut self, timestamp: f64, people: &[PersonKeypoints]) -> TrackerUpdate {
        let assigned = match self.matching {
            SlotMatching::Positional => match_by_position(people),
            SlotMatching::Proximity => {
                let previous: Vec<(SlotId, Keypoint)> =
                    self.slots.iter().map(|(&id, slot)| (id, slot.anchor)).collect();
                match_by_proximity(&previous, people, self.max_match_distance)
            }
        };

        let mut update = TrackerUpdate::default();
        let mut present: HashSet<SlotId> = HashSet::new();

        for (person, slot_id) in people.iter().zip(assigned) {
            let reference = match person.reference() {
                Some(r) => *r,
                None => {
                    // データなし: 既存スロットはそのまま維持
                    if let Some(id) = slot_id {
                        if self.slots.contains_key(&id) {
                            present.insert(id);
                            update.visible.push(id);
                        }
                    }
                    continue;
                }
            };

            let id = match slot_id {
                Some(id) => id,
                None => self.allocate_id(),
            };
            present.insert(id);
            update.visible.push(id);

            let slot = self
                .slots
                .entry(id)
                .or_insert_with(|| TrackedSlot::new(reference));
            let prev_y = slot.last_y;
            let y = reference.y;

            match slot.state {
                MotionState::Ground if prev_y - y > self.jump_threshold => {
                    slot.state = MotionState::Air;
                    update.events.push(JumpEvent { slot: id, timestamp });
                    debug!("slot {} jump: y {:.1} -> {:.1} at t={:.3}", id, prev_y, y, timestamp);
                }
                MotionState::Air if (y - prev_y).abs() < self.settle_threshold => {
                    slot.state = MotionState::Ground;
                    debug!("slot {} landed at y={:.1}", id, y);
                }
                _ => {}
            }

            slot.last_y = y;
            slot.anchor = reference;
        }

        self.slots.retain(|id, _| present.contains(id));
        update
    }

    fn allocate_id(&mut self) -> SlotId {
        // positional方式ではインデックスがIDなのでここには来ない
        while self.slots.contains_key(&self.next_id) {
            self.next_id += 1;
        }
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// 状態が記録されていないスロットは接地扱い
    pub fn state(&self, slot: SlotId) -> MotionState {
        self.slots.get(&slot).map(|s| s.state).unwrap_or_default()
    }

    pub fn slot(&self, slot: SlotId) -> Option<&TrackedSlot> {
        self.slots.get(&slot)
    }

    pub fn slots(&self) -> impl Iterator<Item = (SlotId, &TrackedSlot)> {
        self.slots.iter().map(|(&id, slot)| (id, slot))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn all_on_ground(&self, visible: &[SlotId]) -> bool {
        visible.iter().all(|&id| self.state(id) == MotionState::Ground)
    }

    /// 全スロットを接地・基準位置に戻す（ラウンド切り替え時）
    pub fn settle_all(&mut self, baseline_y: f32) {
        for slot in self.slots.values_mut() {
            slot.state = MotionState::Ground;
            slot.last_y = baseline_y;
        }
    }

    pub fn reset(&mut self) {
        self.slots.clear();
        self.next_id = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(ys: &[f32]) -> Vec<PersonKeypoints> {
        ys.iter()
            .enumerate()
            .map(|(i, &y)| PersonKeypoints::from_reference(100.0 + 300.0 * i as f32, y))
            .collect()
    }

    #[test]
    fn test_first_sighting_never_jumps() {
        let mut tracker = PersonTracker::new(50.0, SlotMatching::Positional);
        let update = tracker.update(0.0, &frame(&[100.0]));
        assert!(update.events.is_empty());
        assert_eq!(tracker.state(0), MotionState::Ground);
        assert_eq!(tracker.slot(0).unwrap().last_y, 100.0);
    }

    #[test]
    fn test_rapid_rise_emits_jump() {
        let mut tracker = PersonTracker::new(50.0, SlotMatching::Positional);
        tracker.update(0.0, &frame(&[200.0]));
        let update = tracker.update(0.1, &frame(&[100.0]));
        assert_eq!(update.events, vec![JumpEvent { slot: 0, timestamp: 0.1 }]);
        assert_eq!(tracker.state(0), MotionState::Air);
    }

    #[test]
    fn test_rise_equal_to_threshold_is_not_jump() {
        let mut tracker = PersonTracker::new(50.0, SlotMatching::Positional);
        tracker.update(0.0, &frame(&[200.0]));
        let update = tracker.update(0.1, &frame(&[150.0]));
        assert!(update.events.is_empty());
        assert_eq!(tracker.state(0), MotionState::Ground);
    }

    #[test]
    fn test_downward_motion_is_not_jump() {
        let mut tracker = PersonTracker::new(50.0, SlotMatching::Positional);
        tracker.update(0.0, &frame(&[100.0]));
        let update = tracker.update(0.1, &frame(&[300.0]));
        assert!(update.events.is_empty());
    }

    #[test]
    fn test_air_settles_back_to_ground() {
        let mut tracker = PersonTracker::new(50.0, SlotMatching::Positional);
        tracker.update(0.0, &frame(&[200.0]));
        tracker.update(0.1, &frame(&[100.0]));
        // 落下中（大きく動いている）は空中のまま
        tracker.update(0.2, &frame(&[190.0]));
        assert_eq!(tracker.state(0), MotionState::Air);
        // 上下動が floor(50/3)=16 未満 → 接地
        let update = tracker.update(0.3, &frame(&[200.0]));
        assert!(update.events.is_empty());
        assert_eq!(tracker.state(0), MotionState::Ground);
    }

    #[test]
    fn test_no_second_event_while_airborne() {
        let mut tracker = PersonTracker::new(50.0, SlotMatching::Positional);
        tracker.update(0.0, &frame(&[300.0]));
        assert_eq!(tracker.update(0.1, &frame(&[200.0])).events.len(), 1);
        assert!(tracker.update(0.2, &frame(&[100.0])).events.is_empty());
    }

    #[test]
    fn test_missing_slot_removed_immediately() {
        let mut tracker = PersonTracker::new(50.0, SlotMatching::Positional);
        tracker.update(0.0, &frame(&[200.0, 200.0]));
        assert_eq!(tracker.len(), 2);
        tracker.update(0.1, &frame(&[200.0]));
        assert_eq!(tracker.len(), 1);
        assert!(tracker.slot(1).is_none());
        tracker.update(0.2, &[]);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_empty_keypoints_preserve_slot() {
        let mut tracker = PersonTracker::new(50.0, SlotMatching::Positional);
        tracker.update(0.0, &frame(&[200.0]));
        tracker.update(0.1, &frame(&[100.0]));
        let update = tracker.update(0.2, &[PersonKeypoints::empty()]);
        assert!(update.events.is_empty());
        assert_eq!(update.visible, vec![0]);
        let slot = tracker.slot(0).unwrap();
        assert_eq!(slot.state, MotionState::Air);
        assert_eq!(slot.last_y, 100.0);
    }

    #[test]
    fn test_proximity_keeps_identity_when_reordered() {
        let mut tracker = PersonTracker::new(50.0, SlotMatching::Proximity);
        let a = |y| PersonKeypoints::from_reference(100.0, y);
        let b = |y| PersonKeypoints::from_reference(600.0, y);
        tracker.update(0.0, &[a(300.0), b(300.0)]);
        // 順番が入れ替わり、右の人（スロット1）だけがジャンプ
        let update = tracker.update(0.1, &[b(200.0), a(300.0)]);
        assert_eq!(update.events, vec![JumpEvent { slot: 1, timestamp: 0.1 }]);
        assert_eq!(tracker.state(0), MotionState::Ground);
        assert_eq!(tracker.state(1), MotionState::Air);
    }

    #[test]
    fn test_positional_reorder_looks_like_jump() {
        let mut tracker = PersonTracker::new(50.0, SlotMatching::Positional);
        let a = |y| PersonKeypoints::from_reference(100.0, y);
        let b = |y| PersonKeypoints::from_reference(600.0, y);
        tracker.update(0.0, &[a(300.0), b(200.0)]);
        // 旧来方式では並び替えがそのままスロットに反映され、誤ってジャンプになる
        let update = tracker.update(0.1, &[b(200.0), a(300.0)]);
        assert_eq!(update.events, vec![JumpEvent { slot: 0, timestamp: 0.1 }]);
        assert_eq!(tracker.slot(0).unwrap().last_y, 200.0);
    }

    #[test]
    fn test_proximity_large_rise_keeps_slot() {
        let mut tracker = PersonTracker::new(50.0, SlotMatching::Proximity);
        tracker.update(0.0, &[PersonKeypoints::from_reference(320.0, 400.0)]);
        let update = tracker.update(0.1, &[PersonKeypoints::from_reference(320.0, 240.0)]);
        assert_eq!(update.events, vec![JumpEvent { slot: 0, timestamp: 0.1 }]);
        assert_eq!(update.visible, vec![0]);
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.state(0), MotionState::Air);
    }

    #[test]
    fn test_proximity_allocates_fresh_ids() {
        let mut tracker = PersonTracker::new(50.0, SlotMatching::Proximity);
        tracker.update(0.0, &[PersonKeypoints::from_reference(100.0, 300.0)]);
        let update = tracker.update(
            0.1,
            &[
                PersonKeypoints::from_reference(100.0, 300.0),
                PersonKeypoints::from_reference(900.0, 300.0),
            ],
        );
        assert_eq!(update.visible, vec![0, 1]);
    }

    #[test]
    fn test_settle_all() {
        let mut tracker = PersonTracker::new(50.0, SlotMatching::Positional);
        tracker.update(0.0, &frame(&[200.0, 200.0]));
        tracker.update(0.1, &frame(&[100.0, 100.0]));
        tracker.settle_all(0.0);
        for (_, slot) in tracker.slots() {
            assert_eq!(slot.state, MotionState::Ground);
            assert_eq!(slot.last_y, 0.0);
        }
        // 基準位置からは下方向の動きになるのでジャンプしない
        assert!(tracker.update(0.2, &frame(&[150.0, 150.0])).events.is_empty());
    }

    #[test]
    fn test_all_on_ground_defaults_unknown() {
        let mut tracker = PersonTracker::new(50.0, SlotMatching::Positional);
        assert!(tracker.all_on_ground(&[0, 1]));
        tracker.update(0.0, &frame(&[200.0]));
        tracker.update(0.1, &frame(&[100.0]));
        assert!(!tracker.all_on_ground(&[0, 1]));
    }
}
