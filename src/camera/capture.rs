use anyhow::{Context, Result};
use opencv::{
    core::Mat,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureAPIs},
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::config::CameraConfig;

/// OpenCVベースのカメラキャプチャ
pub struct OpenCvCamera {
    capture: VideoCapture,
    width: u32,
    height: u32,
}

impl OpenCvCamera {
    /// 設定の解像度でカメラを開く。デバイス側が要求値を近い値へ
    /// 丸めることがあるため、実際の解像度を読み直して保持する。
    pub fn from_config(config: &CameraConfig) -> Result<Self> {
        let mut capture = VideoCapture::new(config.index, VideoCaptureAPIs::CAP_ANY as i32)
            .with_context(|| format!("Failed to open camera {}", config.index))?;

        if !capture.is_opened()? {
            anyhow::bail!("Camera {} is not available", config.index);
        }

        capture.set(videoio::CAP_PROP_FRAME_WIDTH, config.width as f64)?;
        capture.set(videoio::CAP_PROP_FRAME_HEIGHT, config.height as f64)?;
        // 古いフレームを溜めない
        capture.set(videoio::CAP_PROP_BUFFERSIZE, 1.0)?;

        let width = capture.get(videoio::CAP_PROP_FRAME_WIDTH)? as u32;
        let height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT)? as u32;

        Ok(Self {
            capture,
            width,
            height,
        })
    }

    /// 実際の解像度
    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// 1フレーム読み込む（BGR形式）。空フレームはエラー扱い。
    pub fn read_frame(&mut self) -> Result<Mat> {
        let mut frame = Mat::default();
        self.capture
            .read(&mut frame)
            .context("Failed to read frame")?;

        if frame.empty() {
            anyhow::bail!("Empty frame received");
        }

        Ok(frame)
    }
}

/// キャプチャスレッドを持ち、常に最新フレームだけを公開するカメラ。
/// フレームが一度も到着していない間は get_frame() が None を返し、
/// 消費側はそのティックを読み飛ばすだけでよい。
pub struct ThreadedCamera {
    shared: Arc<Mutex<Option<Mat>>>,
    frame_id: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    width: u32,
    height: u32,
    handle: Option<thread::JoinHandle<()>>,
}

impl ThreadedCamera {
    pub fn start(config: &CameraConfig) -> Result<Self> {
        let mut camera = OpenCvCamera::from_config(config)?;
        let (width, height) = camera.resolution();

        let shared = Arc::new(Mutex::new(None::<Mat>));
        let frame_id = Arc::new(AtomicU64::new(0));
        let running = Arc::new(AtomicBool::new(true));

        let shared_writer = shared.clone();
        let frame_id_writer = frame_id.clone();
        let running_flag = running.clone();

        let handle = thread::spawn(move || {
            while running_flag.load(Ordering::Acquire) {
                match camera.read_frame() {
                    Ok(frame) => {
                        *shared_writer.lock().unwrap() = Some(frame);
                        frame_id_writer.fetch_add(1, Ordering::Release);
                    }
                    Err(_) => {
                        // 一時的なデバイス不調。少し待って再試行。
                        thread::sleep(Duration::from_millis(50));
                    }
                }
            }
        });

        Ok(Self {
            shared,
            frame_id,
            running,
            width,
            height,
            handle: Some(handle),
        })
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// 現在のフレームID。新フレーム到着ごとにインクリメントされる。
    pub fn frame_id(&self) -> u64 {
        self.frame_id.load(Ordering::Acquire)
    }

    /// 最新フレームのコピーを取得。初回フレーム到着前のみ None。
    pub fn get_frame(&self) -> Option<Mat> {
        self.shared.lock().unwrap().as_ref().map(|m| m.clone())
    }
}

impl Drop for ThreadedCamera {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
