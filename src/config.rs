use anyhow::Result;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub pose: PoseConfig,
    #[serde(default)]
    pub scene: SceneConfig,
    #[serde(default)]
    pub spring: SpringConfig,
    #[serde(default)]
    pub debug: DebugConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CameraConfig {
    /// カメラデバイス番号
    #[serde(default = "default_camera_index")]
    pub index: i32,
    /// キャプチャ解像度（横）
    #[serde(default = "default_camera_width")]
    pub width: u32,
    /// キャプチャ解像度（縦）
    #[serde(default = "default_camera_height")]
    pub height: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PoseConfig {
    /// ONNXモデルのパス
    #[serde(default = "default_model_path")]
    pub model_path: String,
    /// この信頼度を超えたキーポイントだけを採用する
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    /// 鏡像モード（フレームを左右反転してから推論）
    #[serde(default = "default_flip_horizontal")]
    pub flip_horizontal: bool,
    /// 推論前に入力フレームへ掛ける縮小率 (0.0-1.0]
    #[serde(default = "default_image_scale")]
    pub image_scale: f32,
    /// 何レンダリングフレームごとに推論を依頼するか
    #[serde(default = "default_sample_interval")]
    pub sample_interval: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SceneConfig {
    /// スクリーン→ワールド変換でレイをサンプリングする距離
    #[serde(default = "default_ray_distance")]
    pub ray_distance: f32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SpringConfig {
    #[serde(default = "default_spring_mass")]
    pub mass: f32,
    #[serde(default = "default_spring_tension")]
    pub tension: f32,
    #[serde(default = "default_spring_friction")]
    pub friction: f32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DebugConfig {
    /// カメラフレームと骨格を表示する2Dデバッグウィンドウ
    #[serde(default)]
    pub view: bool,
}

fn default_camera_index() -> i32 { 0 }
fn default_camera_width() -> u32 { 1280 }
fn default_camera_height() -> u32 { 720 }
fn default_model_path() -> String { "models/movenet_lightning.onnx".to_string() }
fn default_confidence_threshold() -> f32 { 0.5 }
fn default_flip_horizontal() -> bool { true }
fn default_image_scale() -> f32 { 0.7 }
fn default_sample_interval() -> u32 { 5 }
fn default_ray_distance() -> f32 { 50.0 }
fn default_spring_mass() -> f32 { 1.0 }
fn default_spring_tension() -> f32 { 170.0 }
fn default_spring_friction() -> f32 { 26.0 }

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: default_camera_index(),
            width: default_camera_width(),
            height: default_camera_height(),
        }
    }
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            confidence_threshold: default_confidence_threshold(),
            flip_horizontal: default_flip_horizontal(),
            image_scale: default_image_scale(),
            sample_interval: default_sample_interval(),
        }
    }
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            ray_distance: default_ray_distance(),
        }
    }
}

impl Default for SpringConfig {
    fn default() -> Self {
        Self {
            mass: default_spring_mass(),
            tension: default_spring_tension(),
            friction: default_spring_friction(),
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self { view: false }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// 設定ファイルが無い・壊れている場合はデフォルトで起動する
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!(
                    "Config not loaded ({}): using defaults",
                    e
                );
                Config::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.camera.index, 0);
        assert_eq!(config.pose.confidence_threshold, 0.5);
        assert!(config.pose.flip_horizontal);
        assert_eq!(config.pose.sample_interval, 5);
        assert_eq!(config.scene.ray_distance, 50.0);
        assert_eq!(config.spring.tension, 170.0);
        assert_eq!(config.spring.friction, 26.0);
        assert!(!config.debug.view);
    }

    #[test]
    fn test_parse_partial_toml() {
        let toml = r#"
            [pose]
            confidence_threshold = 0.3

            [spring]
            tension = 120.0
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.pose.confidence_threshold, 0.3);
        // 省略したフィールドはデフォルト
        assert_eq!(config.pose.sample_interval, 5);
        assert_eq!(config.spring.tension, 120.0);
        assert_eq!(config.spring.friction, 26.0);
    }

    #[test]
    fn test_load_missing_file_falls_back() {
        let config = Config::load_or_default("does_not_exist.toml");
        assert_eq!(config.scene.ray_distance, 50.0);
    }
}
