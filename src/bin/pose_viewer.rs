use anyhow::Result;
use std::time::Instant;

use kagami::camera::OpenCvCamera;
use kagami::config::Config;
use kagami::motion::KeypointSmoother;
use kagami::pose::{preprocess_frame, PoseDetector};
use kagami::render::DebugRenderer;

const CONFIG_PATH: &str = "config.toml";

/// 2Dビューア: 推論した骨格（生）と平滑化後の追従位置を重ねて表示する。
/// 3Dシーンを起動せずにモデルとスムージングの挙動を確認する用。
fn main() -> Result<()> {
    let config = Config::load_or_default(CONFIG_PATH);

    println!("kagami pose viewer (ESC to quit)");

    let mut camera = OpenCvCamera::from_config(&config.camera)?;
    let (width, height) = camera.resolution();
    println!("camera: {}x{}", width, height);

    println!("loading {} ...", config.pose.model_path);
    let mut detector = PoseDetector::new(&config.pose.model_path)?;
    println!("model ready");

    let mut view = DebugRenderer::new("kagami pose viewer", width as usize, height as usize)?;
    let mut smoother = KeypointSmoother::new(config.pose.confidence_threshold);

    let mut frames = 0u32;
    let mut tick = Instant::now();

    while view.is_open() {
        let frame = match camera.read_frame() {
            Ok(f) => f,
            Err(e) => {
                eprintln!("frame capture error: {}", e);
                continue;
            }
        };

        let input = preprocess_frame(&frame, config.pose.flip_horizontal, config.pose.image_scale)?;
        let pose = detector.detect(input)?;

        // 高信頼の関節のみ上書き、残りは前回位置を保持
        smoother.update(&pose.to_screen_observations(width as f32, height as f32));

        view.draw_frame(&frame)?;
        view.draw_pose(&pose, config.pose.confidence_threshold);
        view.draw_targets(smoother.positions());
        view.present()?;

        frames += 1;
        let elapsed = tick.elapsed().as_secs_f32();
        if elapsed >= 1.0 {
            println!(
                "fps {:.1} / mean confidence {:.2}",
                frames as f32 / elapsed,
                pose.average_confidence()
            );
            frames = 0;
            tick = Instant::now();
        }
    }

    Ok(())
}
