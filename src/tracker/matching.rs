use std::cmp::Ordering;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::pose::{Keypoint, PersonKeypoints};

/// スロット識別子
///
/// positional方式では検出リスト内のインデックスそのもの
pub type SlotId = usize;

/// 検出結果をスロットに対応付ける方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotMatching {
    /// 検出リストの順番 = スロット（検出器の並び順が安定している前提）
    Positional,
    /// 前フレームの基準点に最も近い検出を同じスロットとする
    #[default]
    Proximity,
}

/// positional方式: i番目の検出はスロットi
pub fn match_by_position(detections: &[PersonKeypoints]) -> Vec<Option<SlotId>> {
    (0..detections.len()).map(Some).collect()
}

/// proximity方式の貪欲割り当て
///
/// 戻り値は検出ごとの既存スロット（`None` = 新規、または空検出で割り当て先なし）。
/// 1. 空でない検出と既存スロットの全ペアを水平距離の近い順に確定（`max_distance` 以内）。
///    ジャンプ中の上下動で別人扱いにならないよう、ゲートは水平方向だけで見る。
///    水平距離が同じなら垂直距離の近い方を優先
/// 2. 空の検出には残った既存スロットをID昇順で割り当て、状態を維持させる
pub fn match_by_proximity(
    previous: &[(SlotId, Keypoint)],
    detections: &[PersonKeypoints],
    max_distance: f32,
) -> Vec<Option<SlotId>> {
    let mut assigned: Vec<Option<SlotId>> = vec![None; detections.len()];

    let mut pairs: Vec<(f32, f32, SlotId, usize)> = Vec::new();
    for &(slot, anchor) in previous {
        for (det_idx, person) in detections.iter().enumerate() {
            if let Some(reference) = person.reference() {
                let dx = (anchor.x - reference.x).abs();
                if dx <= max_distance {
                    let dy = (anchor.y - reference.y).abs();
                    pairs.push((dx, dy, slot, det_idx));
                }
            }
        }
    }

    // 水平距離 → 垂直距離 → スロットID → 検出インデックス の順
    pairs.sort_by(|a, b| {
        a.0.partial_cmp(&b.0)
            .unwrap_or(Ordering::Equal)
            .then(a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
            .then(a.2.cmp(&b.2))
            .then(a.3.cmp(&b.3))
    });

    let mut matched_slots: HashSet<SlotId> = HashSet::new();
    for (_, _, slot, det_idx) in pairs {
        if matched_slots.contains(&slot) || assigned[det_idx].is_some() {
            continue;
        }
        assigned[det_idx] = Some(slot);
        matched_slots.insert(slot);
    }

    let mut leftover: Vec<SlotId> = previous
        .iter()
        .map(|&(slot, _)| slot)
        .filter(|slot| !matched_slots.contains(slot))
        .collect();
    leftover.sort_unstable();
    let mut leftover = leftover.into_iter();

    for (det_idx, person) in detections.iter().enumerate() {
        if person.is_empty() {
            assigned[det_idx] = leftover.next();
        }
    }

    assigned
}
