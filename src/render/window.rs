use anyhow::Result;
use glam::Vec2;
use minifb::{Key, Window, WindowOptions};
use opencv::core::{Mat, Size};
use opencv::imgproc;
use opencv::prelude::*;

use crate::pose::Pose;
use crate::render::{
    KEYPOINT_COLOR, LOW_CONFIDENCE_COLOR, SKELETON_COLOR, SKELETON_CONNECTIONS, TARGET_COLOR,
};

/// minifbを使用した2Dデバッグビュー。
/// カメラフレーム・推論した骨格・平滑化後の追従位置を重ねて表示する。
pub struct DebugRenderer {
    window: Window,
    buffer: Vec<u32>,
    width: usize,
    height: usize,
}

impl DebugRenderer {
    pub fn new(title: &str, width: usize, height: usize) -> Result<Self> {
        let window = Window::new(
            title,
            width,
            height,
            WindowOptions {
                resize: false,
                ..WindowOptions::default()
            },
        )?;

        Ok(Self {
            window,
            buffer: vec![0u32; width * height],
            width,
            height,
        })
    }

    /// ウィンドウが開いているか（ESCで閉じる）
    pub fn is_open(&self) -> bool {
        self.window.is_open() && !self.window.is_key_down(Key::Escape)
    }

    pub fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// BGRフレームをビューサイズへリサイズしてバッファへ転写
    pub fn draw_frame(&mut self, frame: &Mat) -> Result<()> {
        let mut resized = Mat::default();
        imgproc::resize(
            frame,
            &mut resized,
            Size::new(self.width as i32, self.height as i32),
            0.0,
            0.0,
            imgproc::INTER_LINEAR,
        )?;

        let data = resized.data_bytes()?;
        let channels = resized.channels() as usize;
        let step = resized.mat_step().get(0);

        for y in 0..self.height {
            let row = &data[y * step..];
            for x in 0..self.width {
                let px = x * channels;
                if px + 2 < row.len() {
                    // BGR -> 0x00RRGGBB
                    self.buffer[y * self.width + x] = (row[px + 2] as u32) << 16
                        | (row[px + 1] as u32) << 8
                        | row[px] as u32;
                }
            }
        }

        Ok(())
    }

    /// 推論した姿勢（骨格線とキーポイント）を描画
    pub fn draw_pose(&mut self, pose: &Pose, confidence_threshold: f32) {
        let w = self.width as u32;
        let h = self.height as u32;

        // 両端が有効な接続だけ線を引く
        for (a, b) in SKELETON_CONNECTIONS.iter() {
            let start = pose.get(*a);
            let end = pose.get(*b);
            if start.is_valid(confidence_threshold) && end.is_valid(confidence_threshold) {
                let from = start.to_pixel(w, h);
                let to = end.to_pixel(w, h);
                self.draw_line(from, to, SKELETON_COLOR);
            }
        }

        for kp in pose.keypoints.iter() {
            let (cx, cy) = kp.to_pixel(w, h);
            let color = if kp.is_valid(confidence_threshold) {
                KEYPOINT_COLOR
            } else {
                LOW_CONFIDENCE_COLOR
            };
            self.fill_circle(cx, cy, 4, color);
        }
    }

    /// 平滑化後の追従位置（スクリーン座標）を十字マーカーで描画
    pub fn draw_targets(&mut self, targets: &[Vec2]) {
        const ARM: i32 = 5;
        for t in targets {
            let (x, y) = (t.x as i32, t.y as i32);
            self.draw_line((x - ARM, y), (x + ARM, y), TARGET_COLOR);
            self.draw_line((x, y - ARM), (x, y + ARM), TARGET_COLOR);
        }
    }

    /// バッファをウィンドウへ反映
    pub fn present(&mut self) -> Result<()> {
        self.window
            .update_with_buffer(&self.buffer, self.width, self.height)?;
        Ok(())
    }

    /// Bresenhamで線分を描画
    fn draw_line(&mut self, from: (i32, i32), to: (i32, i32), color: u32) {
        let (mut x, mut y) = from;
        let (x1, y1) = to;
        let dx = (x1 - x).abs();
        let dy = -(y1 - y).abs();
        let step_x = if x < x1 { 1 } else { -1 };
        let step_y = if y < y1 { 1 } else { -1 };
        let mut error = dx + dy;

        loop {
            self.set_pixel(x, y, color);
            if x == x1 && y == y1 {
                break;
            }
            let e2 = 2 * error;
            if e2 >= dy {
                error += dy;
                x += step_x;
            }
            if e2 <= dx {
                error += dx;
                y += step_y;
            }
        }
    }

    /// 走査線方式の塗りつぶし円
    fn fill_circle(&mut self, cx: i32, cy: i32, radius: i32, color: u32) {
        for dy in -radius..=radius {
            let half = ((radius * radius - dy * dy) as f32).sqrt() as i32;
            for dx in -half..=half {
                self.set_pixel(cx + dx, cy + dy, color);
            }
        }
    }

    fn set_pixel(&mut self, x: i32, y: i32, color: u32) {
        if x >= 0 && x < self.width as i32 && y >= 0 && y < self.height as i32 {
            self.buffer[y as usize * self.width + x as usize] = color;
        }
    }
}
