use glam::Vec2;

/// MoveNet の 17 キーポイントインデックス（解剖学的関節）
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
    pub const COUNT: usize = 17;

    pub const ALL: [KeypointIndex; Self::COUNT] = [
        Self::Nose,
        Self::LeftEye,
        Self::RightEye,
        Self::LeftEar,
        Self::RightEar,
        Self::LeftShoulder,
        Self::RightShoulder,
        Self::LeftElbow,
        Self::RightElbow,
        Self::LeftWrist,
        Self::RightWrist,
        Self::LeftHip,
        Self::RightHip,
        Self::LeftKnee,
        Self::RightKnee,
        Self::LeftAnkle,
        Self::RightAnkle,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// 診断ログ用の短い名前
    pub fn name(&self) -> &'static str {
        match self {
            Self::Nose => "nose",
            Self::LeftEye => "l_eye",
            Self::RightEye => "r_eye",
            Self::LeftEar => "l_ear",
            Self::RightEar => "r_ear",
            Self::LeftShoulder => "l_shoulder",
            Self::RightShoulder => "r_shoulder",
            Self::LeftElbow => "l_elbow",
            Self::RightElbow => "r_elbow",
            Self::LeftWrist => "l_wrist",
            Self::RightWrist => "r_wrist",
            Self::LeftHip => "l_hip",
            Self::RightHip => "r_hip",
            Self::LeftKnee => "l_knee",
            Self::RightKnee => "r_knee",
            Self::LeftAnkle => "l_ankle",
            Self::RightAnkle => "r_ankle",
        }
    }
}

/// 単一キーポイント。座標は入力画像に対する正規化座標 (0.0〜1.0)。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    /// 信頼度スコア (0.0〜1.0)
    pub confidence: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, confidence: f32) -> Self {
        Self { x, y, confidence }
    }

    /// 信頼度が閾値を超えているか（閾値ちょうどは不採用）
    pub fn is_valid(&self, threshold: f32) -> bool {
        self.confidence > threshold
    }

    /// 整数ピクセル座標へ変換（2D描画用）
    pub fn to_pixel(&self, width: u32, height: u32) -> (i32, i32) {
        (
            (self.x * width as f32) as i32,
            (self.y * height as f32) as i32,
        )
    }

    /// スクリーン座標（浮動小数ピクセル）へ変換
    pub fn to_screen(&self, width: f32, height: f32) -> Vec2 {
        Vec2::new(self.x * width, self.y * height)
    }
}

impl Default for Keypoint {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            confidence: 0.0,
        }
    }
}

/// 17キーポイントからなる姿勢。常にちょうど17要素。
#[derive(Debug, Clone)]
pub struct Pose {
    pub keypoints: [Keypoint; KeypointIndex::COUNT],
}

impl Pose {
    pub fn new(keypoints: [Keypoint; KeypointIndex::COUNT]) -> Self {
        Self { keypoints }
    }

    pub fn get(&self, index: KeypointIndex) -> &Keypoint {
        &self.keypoints[index as usize]
    }

    /// 全キーポイントの平均信頼度
    pub fn average_confidence(&self) -> f32 {
        let sum: f32 = self.keypoints.iter().map(|k| k.confidence).sum();
        sum / KeypointIndex::COUNT as f32
    }

    /// (スクリーン座標, 信頼度) の列へ変換。Smoother への入力形式。
    pub fn to_screen_observations(
        &self,
        width: f32,
        height: f32,
    ) -> [(Vec2, f32); KeypointIndex::COUNT] {
        std::array::from_fn(|i| {
            let kp = &self.keypoints[i];
            (kp.to_screen(width, height), kp.confidence)
        })
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            keypoints: [Keypoint::default(); KeypointIndex::COUNT],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_count() {
        assert_eq!(KeypointIndex::COUNT, 17);
        assert_eq!(KeypointIndex::ALL.len(), 17);
    }

    #[test]
    fn test_from_index_bounds() {
        assert_eq!(KeypointIndex::from_index(0), Some(KeypointIndex::Nose));
        assert_eq!(
            KeypointIndex::from_index(16),
            Some(KeypointIndex::RightAnkle)
        );
        assert_eq!(KeypointIndex::from_index(17), None);
    }

    #[test]
    fn test_all_is_index_ordered() {
        for (i, idx) in KeypointIndex::ALL.iter().enumerate() {
            assert_eq!(*idx as usize, i);
        }
    }

    #[test]
    fn test_is_valid_strictly_above() {
        let kp = Keypoint::new(0.5, 0.5, 0.5);
        // 閾値ちょうどは不採用
        assert!(!kp.is_valid(0.5));
        assert!(Keypoint::new(0.5, 0.5, 0.51).is_valid(0.5));
    }

    #[test]
    fn test_to_pixel() {
        let kp = Keypoint::new(0.5, 0.25, 1.0);
        assert_eq!(kp.to_pixel(640, 480), (320, 120));
    }

    #[test]
    fn test_to_screen() {
        let kp = Keypoint::new(0.5, 0.25, 1.0);
        let p = kp.to_screen(1280.0, 720.0);
        assert_eq!(p, Vec2::new(640.0, 180.0));
    }

    #[test]
    fn test_pose_get() {
        let mut keypoints = [Keypoint::default(); KeypointIndex::COUNT];
        keypoints[KeypointIndex::LeftWrist as usize] = Keypoint::new(0.2, 0.8, 0.9);
        let pose = Pose::new(keypoints);
        assert_eq!(pose.get(KeypointIndex::LeftWrist).confidence, 0.9);
    }

    #[test]
    fn test_to_screen_observations_length() {
        let pose = Pose::default();
        let obs = pose.to_screen_observations(1920.0, 1080.0);
        assert_eq!(obs.len(), KeypointIndex::COUNT);
        assert_eq!(obs[0].0, Vec2::ZERO);
    }
}
