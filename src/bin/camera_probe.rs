use opencv::core::Mat;
use opencv::imgcodecs;
use opencv::prelude::*;
use opencv::videoio::{self, VideoCapture, VideoCaptureAPIs};
use std::thread;
use std::time::Duration;

/// 調べるデバイス番号の上限
const MAX_PROBE_INDEX: i32 = 5;

/// 接続されているカメラを列挙し、プロパティとサンプルフレームを確認する
fn main() {
    println!("=== カメラプローブ ===");
    println!();

    for index in 0..MAX_PROBE_INDEX {
        probe(index);
        println!();
    }
}

fn probe(index: i32) {
    print!("index {}: ", index);

    let mut cap = match VideoCapture::new(index, VideoCaptureAPIs::CAP_ANY as i32) {
        Ok(c) => c,
        Err(e) => {
            println!("open failed: {}", e);
            return;
        }
    };
    if !cap.is_opened().unwrap_or(false) {
        println!("not available");
        return;
    }

    let width = cap.get(videoio::CAP_PROP_FRAME_WIDTH).unwrap_or(0.0);
    let height = cap.get(videoio::CAP_PROP_FRAME_HEIGHT).unwrap_or(0.0);
    let fps = cap.get(videoio::CAP_PROP_FPS).unwrap_or(0.0);
    let backend = cap.get_backend_name().unwrap_or_default();
    println!("{}x{} fps={} backend={}", width, height, fps, backend);

    // 初回フレームはデバイスのウォームアップ待ちになることがある
    thread::sleep(Duration::from_millis(500));

    let mut frame = Mat::default();
    match cap.read(&mut frame) {
        Ok(true) if !frame.empty() => {
            println!(
                "       frame: {}x{} ch={} depth={}",
                frame.cols(),
                frame.rows(),
                frame.channels(),
                frame.depth()
            );
            let filename = format!("probe_cam{}.png", index);
            match imgcodecs::imwrite(&filename, &frame, &opencv::core::Vector::new()) {
                Ok(_) => println!("       saved: {}", filename),
                Err(e) => println!("       save err: {}", e),
            }
        }
        Ok(_) => println!("       frame: EMPTY"),
        Err(e) => println!("       frame err: {}", e),
    }
}
