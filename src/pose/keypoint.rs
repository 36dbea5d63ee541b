use serde::{Deserialize, Serialize};

/// COCO (YOLOv8-pose) の 17 キーポイントインデックス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum KeypointIndex {
    Nose = 0,
    LeftEye = 1,
    RightEye = 2,
    LeftEar = 3,
    RightEar = 4,
    LeftShoulder = 5,
    RightShoulder = 6,
    LeftElbow = 7,
    RightElbow = 8,
    LeftWrist = 9,
    RightWrist = 10,
    LeftHip = 11,
    RightHip = 12,
    LeftKnee = 13,
    RightKnee = 14,
    LeftAnkle = 15,
    RightAnkle = 16,
}

impl KeypointIndex {
    /// ジャンプ判定に使う基準点
    pub const REFERENCE: KeypointIndex = KeypointIndex::Nose;
}

/// 単一キーポイント（画像ピクセル座標、Yは下が正）
///
/// ワイヤ/JSON上は `[x, y]` の2要素配列
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f32; 2]", into = "[f32; 2]")]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl From<[f32; 2]> for Keypoint {
    fn from(p: [f32; 2]) -> Self {
        Self::new(p[0], p[1])
    }
}

impl From<Keypoint> for [f32; 2] {
    fn from(kp: Keypoint) -> Self {
        [kp.x, kp.y]
    }
}

/// 1フレーム内の1人分のキーポイント列
///
/// 検出器によっては点数が0になる（その人物はそのフレームで「データなし」扱い）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonKeypoints {
    pub keypoints: Vec<Keypoint>,
}

impl PersonKeypoints {
    pub fn new(keypoints: Vec<Keypoint>) -> Self {
        Self { keypoints }
    }

    /// キーポイントなし
    pub fn empty() -> Self {
        Self::default()
    }

    /// 基準点のみのセット（テスト・リプレイ用）
    pub fn from_reference(x: f32, y: f32) -> Self {
        Self::new(vec![Keypoint::new(x, y)])
    }

    pub fn get(&self, index: KeypointIndex) -> Option<&Keypoint> {
        self.keypoints.get(index as usize)
    }

    /// 基準点（鼻）
    pub fn reference(&self) -> Option<&Keypoint> {
        self.get(KeypointIndex::REFERENCE)
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}
