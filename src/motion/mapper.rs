use glam::{Vec2, Vec3};

/// 正規化の基準となる表示領域。
/// サイズは呼び出し側が明示的に渡す（グローバル参照はしない）。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
    /// 映像ネイティブ幅と表示幅が異なる場合の水平補正。
    /// 通常は 0（クロップ/レターボックスが無い場合）。
    pub x_offset: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            x_offset: 0.0,
        }
    }

    pub fn with_x_offset(width: f32, height: f32, x_offset: f32) -> Self {
        Self {
            width,
            height,
            x_offset,
        }
    }
}

/// スクリーンピクセル座標を正規化デバイス座標 [-1, 1]² へ変換する。
/// スクリーンYは下向き、デバイスYは上向きなので縦軸は反転する。
pub fn to_ndc(point: Vec2, viewport: &Viewport) -> Vec2 {
    Vec2::new(
        ((point.x + viewport.x_offset) / viewport.width) * 2.0 - 1.0,
        -(point.y / viewport.height) * 2.0 + 1.0,
    )
}

/// 原点と方向で表すレイ
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    /// シーン原点から、デバイス座標点を固定深度 z = -1 に置いた方向へのレイ。
    /// ライブカメラの位置・姿勢には依存しない（2D入力と定数だけの純関数）。
    pub fn from_ndc(ndc: Vec2) -> Self {
        Self {
            origin: Vec3::ZERO,
            direction: Vec3::new(ndc.x, ndc.y, -1.0).normalize(),
        }
    }

    /// レイ上の距離 t の点
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// スクリーンピクセル座標を 3D ワールド座標へ写す。
/// NDC変換 → 固定原点レイ → 距離 distance でサンプリング。
pub fn screen_to_world(point: Vec2, viewport: &Viewport, distance: f32) -> Vec3 {
    Ray::from_ndc(to_ndc(point, viewport)).at(distance)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VP: Viewport = Viewport {
        width: 1280.0,
        height: 720.0,
        x_offset: 0.0,
    };

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn test_ndc_center() {
        let ndc = to_ndc(Vec2::new(640.0, 360.0), &VP);
        assert!(approx_eq(ndc.x, 0.0));
        assert!(approx_eq(ndc.y, 0.0));
    }

    #[test]
    fn test_ndc_corners_and_vertical_flip() {
        // 左上ピクセル (0,0) → NDC (-1, +1)
        let top_left = to_ndc(Vec2::ZERO, &VP);
        assert!(approx_eq(top_left.x, -1.0));
        assert!(approx_eq(top_left.y, 1.0));

        // 右下ピクセル → NDC (+1, -1)
        let bottom_right = to_ndc(Vec2::new(1280.0, 720.0), &VP);
        assert!(approx_eq(bottom_right.x, 1.0));
        assert!(approx_eq(bottom_right.y, -1.0));
    }

    #[test]
    fn test_ndc_x_offset() {
        // 幅 950 の映像を幅 1280 の表示に中央寄せした場合の補正
        let offset = (1280.0 - 950.0) / 2.0;
        let vp = Viewport::with_x_offset(1280.0, 720.0, offset);
        // 映像中心 (475, y) が表示中心に一致する
        let ndc = to_ndc(Vec2::new(475.0, 360.0), &vp);
        assert!(approx_eq(ndc.x, 0.0));
    }

    #[test]
    fn test_ray_direction_normalized() {
        let ray = Ray::from_ndc(Vec2::new(0.7, -0.3));
        assert!(approx_eq(ray.direction.length(), 1.0));
        assert_eq!(ray.origin, Vec3::ZERO);
        assert!(ray.direction.z < 0.0);
    }

    #[test]
    fn test_center_maps_straight_ahead() {
        let p = screen_to_world(Vec2::new(640.0, 360.0), &VP, 50.0);
        assert!(approx_eq(p.x, 0.0));
        assert!(approx_eq(p.y, 0.0));
        assert!(approx_eq(p.z, -50.0));
    }

    #[test]
    fn test_output_magnitude_equals_distance() {
        for point in [
            Vec2::new(0.0, 0.0),
            Vec2::new(1280.0, 0.0),
            Vec2::new(100.0, 650.0),
            Vec2::new(640.0, 360.0),
        ] {
            let p = screen_to_world(point, &VP, 50.0);
            assert!(
                approx_eq(p.length(), 50.0),
                "|{:?}| = {} != 50",
                p,
                p.length()
            );
        }
    }

    #[test]
    fn test_screen_above_center_maps_up() {
        // スクリーン上方（yが小さい）はワールドでは +Y
        let p = screen_to_world(Vec2::new(640.0, 100.0), &VP, 50.0);
        assert!(p.y > 0.0);
    }

    #[test]
    fn test_pure_function() {
        let input = Vec2::new(123.0, 456.0);
        let a = screen_to_world(input, &VP, 50.0);
        let b = screen_to_world(input, &VP, 50.0);
        assert_eq!(a, b);
    }
}
