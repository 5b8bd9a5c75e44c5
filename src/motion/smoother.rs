use glam::Vec2;

use crate::pose::KeypointIndex;

/// 信頼度ゲート付きキーポイント保持フィルタ
///
/// 関節ごとに最後に採用したスクリーン座標を保持する。新しい観測は
/// 信頼度が閾値を超えた関節だけを上書きし、それ以外は前回値を
/// 保ち続ける。単発の低信頼検出によるチラつきをここで吸収する。
pub struct KeypointSmoother {
    threshold: f32,
    positions: [Vec2; KeypointIndex::COUNT],
}

impl KeypointSmoother {
    /// 初期位置は全関節 (0, 0)
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            positions: [Vec2::ZERO; KeypointIndex::COUNT],
        }
    }

    /// 観測列 (スクリーン座標, 信頼度) を適用する。
    ///
    /// - 空の観測列は no-op（前回状態を完全保持）
    /// - 信頼度 > 閾値 の関節のみ上書き、それ以外は保持
    /// - 17要素を超える分は無視
    ///
    /// 採用した関節数を返す。
    pub fn update(&mut self, observations: &[(Vec2, f32)]) -> usize {
        if observations.is_empty() {
            return 0;
        }

        let mut accepted = 0;
        for (i, (position, confidence)) in
            observations.iter().enumerate().take(KeypointIndex::COUNT)
        {
            if *confidence > self.threshold {
                self.positions[i] = *position;
                accepted += 1;
            }
        }
        accepted
    }

    pub fn positions(&self) -> &[Vec2; KeypointIndex::COUNT] {
        &self.positions
    }

    pub fn get(&self, index: KeypointIndex) -> Vec2 {
        self.positions[index as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const N: usize = KeypointIndex::COUNT;

    fn full_observation(position: Vec2, confidence: f32) -> Vec<(Vec2, f32)> {
        vec![(position, confidence); N]
    }

    #[test]
    fn test_initial_state_is_zero() {
        let smoother = KeypointSmoother::new(0.5);
        assert_eq!(smoother.positions().len(), N);
        assert!(smoother.positions().iter().all(|p| *p == Vec2::ZERO));
    }

    #[test]
    fn test_empty_update_is_noop() {
        let mut smoother = KeypointSmoother::new(0.5);
        smoother.update(&full_observation(Vec2::new(10.0, 20.0), 0.9));
        let before = *smoother.positions();

        let accepted = smoother.update(&[]);
        assert_eq!(accepted, 0);
        assert_eq!(*smoother.positions(), before);
    }

    #[test]
    fn test_overwrite_above_threshold() {
        let mut smoother = KeypointSmoother::new(0.5);
        let p = Vec2::new(320.0, 240.0);
        let accepted = smoother.update(&full_observation(p, 0.9));
        assert_eq!(accepted, N);
        assert!(smoother.positions().iter().all(|q| *q == p));
    }

    #[test]
    fn test_hold_at_or_below_threshold() {
        let mut smoother = KeypointSmoother::new(0.5);
        let p = Vec2::new(100.0, 200.0);
        smoother.update(&full_observation(p, 0.8));

        // ちょうど閾値は保持
        smoother.update(&full_observation(Vec2::new(999.0, 999.0), 0.5));
        assert!(smoother.positions().iter().all(|q| *q == p));

        // 閾値未満も保持
        smoother.update(&full_observation(Vec2::new(999.0, 999.0), 0.1));
        assert!(smoother.positions().iter().all(|q| *q == p));
    }

    #[test]
    fn test_single_joint_update() {
        let mut smoother = KeypointSmoother::new(0.5);
        let initial = Vec2::new(5.0, 5.0);
        smoother.update(&full_observation(initial, 0.9));

        // index 5 だけ高信頼: それ以外は保持される
        let mut obs = full_observation(Vec2::new(100.0, 200.0), 0.0);
        obs[5] = (Vec2::new(100.0, 200.0), 0.9);
        let accepted = smoother.update(&obs);

        assert_eq!(accepted, 1);
        for (i, p) in smoother.positions().iter().enumerate() {
            if i == 5 {
                assert_eq!(*p, Vec2::new(100.0, 200.0));
            } else {
                assert_eq!(*p, initial);
            }
        }
    }

    #[test]
    fn test_never_confident_keeps_default() {
        let mut smoother = KeypointSmoother::new(0.5);
        smoother.update(&full_observation(Vec2::new(50.0, 50.0), 0.2));
        smoother.update(&full_observation(Vec2::new(70.0, 70.0), 0.4));
        assert!(smoother.positions().iter().all(|p| *p == Vec2::ZERO));
    }

    #[test]
    fn test_length_always_17() {
        let mut smoother = KeypointSmoother::new(0.5);

        // 短い観測列
        smoother.update(&[(Vec2::new(1.0, 1.0), 0.9); 3]);
        assert_eq!(smoother.positions().len(), N);

        // 17を超える観測列: 余剰は無視
        let long = vec![(Vec2::new(2.0, 2.0), 0.9); 25];
        let accepted = smoother.update(&long);
        assert_eq!(accepted, N);
        assert_eq!(smoother.positions().len(), N);
    }

    #[test]
    fn test_get_by_index() {
        let mut smoother = KeypointSmoother::new(0.5);
        let mut obs = full_observation(Vec2::ZERO, 0.0);
        obs[KeypointIndex::Nose as usize] = (Vec2::new(11.0, 22.0), 0.9);
        smoother.update(&obs);
        assert_eq!(smoother.get(KeypointIndex::Nose), Vec2::new(11.0, 22.0));
    }
}
