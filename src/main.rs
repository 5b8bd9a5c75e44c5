use anyhow::Result;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Instant;

use bevy::input::mouse::{MouseMotion, MouseScrollUnit, MouseWheel};
use bevy::prelude::*;
use bevy::window::{FileDragAndDrop, PrimaryWindow};
use opencv::core::Mat;

use kagami::camera::ThreadedCamera;
use kagami::config::Config;
use kagami::model;
use kagami::motion::{screen_to_world, KeypointSmoother, Spring2, SpringParams, Viewport};
use kagami::pose::{preprocess_frame, KeypointIndex, Pose, PoseDetector};
use kagami::render::DebugRenderer;

const CONFIG_PATH: &str = "config.toml";

/// インスタンス数 = 関節数。セッション中は増減しない。
const INSTANCE_COUNT: usize = KeypointIndex::COUNT;

// --- Inference thread types ---

struct InferenceRequest {
    frame: Mat,
    timestamp: Instant,
}

struct InferenceResult {
    pose: Pose,
    timestamp: Instant,
}

// --- Bevy Resources ---

#[derive(Resource)]
struct AppSettings(Config);

#[derive(Resource)]
struct CameraInput {
    /// カメラが開けなかった場合は None のまま走る（トラッキングなしの定常状態）
    camera: Option<ThreadedCamera>,
    last_frame_id: u64,
    in_flight: bool,
    last_request: Option<Instant>,
}

#[derive(Resource)]
struct InferenceTx(mpsc::SyncSender<InferenceRequest>);

#[derive(Resource)]
struct InferenceRx(Mutex<mpsc::Receiver<InferenceResult>>);

#[derive(Resource)]
struct DetectorReady(Arc<AtomicBool>);

#[derive(Resource)]
struct Tracking {
    smoother: KeypointSmoother,
    springs: [Spring2; INSTANCE_COUNT],
    frame_counter: u64,
    /// デバッグビュー用に最後の生の推論結果を保持
    latest_raw: Option<Pose>,
}

/// 全インスタンスが参照共有するジオメトリ/マテリアルのペア。
/// モデルドロップ成功時に丸ごと置き換える。
#[derive(Resource)]
struct SharedModel {
    mesh: Handle<Mesh>,
    material: Handle<StandardMaterial>,
}

#[derive(Resource)]
struct OrbitState {
    yaw: f32,
    pitch: f32,
    radius: f32,
    focus: Vec3,
}

impl Default for OrbitState {
    fn default() -> Self {
        Self {
            yaw: 0.0,
            pitch: 0.0,
            radius: 5.0,
            focus: Vec3::ZERO,
        }
    }
}

#[derive(Resource)]
struct FpsCounter {
    frame_count: u32,
    inference_count: u32,
    accepted_joints: usize,
    timer: Instant,
}

#[derive(Resource)]
struct LogFileRes(LogFile);

struct DebugView {
    renderer: DebugRenderer,
}

// --- Components ---

#[derive(Component)]
struct KeypointInstance(usize);

#[derive(Component)]
struct OrbitCamera;

type LogFile = Arc<Mutex<std::io::BufWriter<std::fs::File>>>;

fn open_log_file() -> Result<LogFile> {
    fs::create_dir_all("logs")?;
    let ts = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let path = format!("logs/kagami_{}.log", ts);
    let file = std::fs::File::create(&path)?;
    eprintln!("Log: {}", path);
    Ok(Arc::new(Mutex::new(std::io::BufWriter::new(file))))
}

macro_rules! log {
    ($logfile:expr, $($arg:tt)*) => {{
        let msg = format!($($arg)*);
        println!("{}", msg);
        if let Ok(mut f) = $logfile.lock() {
            let _ = writeln!(f, "{}", msg);
        }
    }};
}

fn main() -> Result<()> {
    let config = Config::load_or_default(CONFIG_PATH);
    let logfile = open_log_file()?;

    log!(logfile, "Kagami {} - webcam pose to instanced 3D", env!("GIT_VERSION"));
    log!(logfile, "Model: {}", config.pose.model_path);
    log!(
        logfile,
        "Sampling: every {} frames, threshold {}",
        config.pose.sample_interval,
        config.pose.confidence_threshold
    );

    // カメラ起動。拒否・不在でもセッションは続行し、以降のサンプリングが
    // 空振りするだけ（フレームは二度と来ない定常状態）。
    let camera = match ThreadedCamera::start(&config.camera) {
        Ok(cam) => {
            let (w, h) = cam.resolution();
            log!(logfile, "Camera: {}x{}", w, h);
            Some(cam)
        }
        Err(e) => {
            log!(logfile, "Camera unavailable: {}. Running without tracking.", e);
            None
        }
    };

    // 推論スレッド: リクエストは最新のみ処理、結果はチャネルで返す
    let (request_tx, request_rx) = mpsc::sync_channel::<InferenceRequest>(1);
    let (result_tx, result_rx) = mpsc::channel::<InferenceResult>();
    let ready = Arc::new(AtomicBool::new(false));
    {
        let ready = ready.clone();
        let logfile = logfile.clone();
        let pose_cfg = config.pose.clone();
        std::thread::spawn(move || {
            let mut detector = match PoseDetector::new(&pose_cfg.model_path) {
                Ok(d) => d,
                Err(e) => {
                    // ロード失敗 = トラッキング無効のまま走り続ける
                    log!(logfile, "Pose model load failed: {}. Tracking disabled.", e);
                    return;
                }
            };
            ready.store(true, Ordering::Release);
            log!(logfile, "Inference thread: model loaded");

            while let Ok(mut req) = request_rx.recv() {
                // キューに溜まったリクエストをドレインし最新のみ処理
                while let Ok(newer) = request_rx.try_recv() {
                    req = newer;
                }
                if req.timestamp.elapsed().as_secs_f32() > 0.5 {
                    continue;
                }

                let input = match preprocess_frame(
                    &req.frame,
                    pose_cfg.flip_horizontal,
                    pose_cfg.image_scale,
                ) {
                    Ok(v) => v,
                    Err(e) => {
                        log!(logfile, "preprocess error: {}", e);
                        continue;
                    }
                };
                match detector.detect(input) {
                    Ok(pose) => {
                        let _ = result_tx.send(InferenceResult {
                            pose,
                            timestamp: req.timestamp,
                        });
                    }
                    Err(e) => log!(logfile, "inference error: {}", e),
                }
            }
        });
    }

    let spring_params = SpringParams::from_config(&config.spring);
    let tracking = Tracking {
        smoother: KeypointSmoother::new(config.pose.confidence_threshold),
        springs: std::array::from_fn(|_| Spring2::new(Vec2::ZERO, spring_params)),
        frame_counter: 0,
        latest_raw: None,
    };

    let debug_view = if config.debug.view {
        match DebugRenderer::new("kagami debug", 640, 360) {
            Ok(renderer) => Some(DebugView { renderer }),
            Err(e) => {
                log!(logfile, "Debug view failed: {}", e);
                None
            }
        }
    } else {
        None
    };

    log!(logfile, "");
    log!(logfile, "操作: [ドラッグ] 回転  [ホイール] ズーム  [O] モデル選択  [GLB/GLTFドロップ] モデル差し替え");
    log!(logfile, "");

    let mut app = App::new();
    app.add_plugins(DefaultPlugins.set(WindowPlugin {
        primary_window: Some(Window {
            title: "kagami".to_string(),
            resolution: (1280.0, 720.0).into(),
            ..Default::default()
        }),
        ..Default::default()
    }))
    .insert_resource(AppSettings(config))
    .insert_resource(CameraInput {
        camera,
        last_frame_id: 0,
        in_flight: false,
        last_request: None,
    })
    .insert_resource(InferenceTx(request_tx))
    .insert_resource(InferenceRx(Mutex::new(result_rx)))
    .insert_resource(DetectorReady(ready))
    .insert_resource(tracking)
    .insert_resource(OrbitState::default())
    .insert_resource(FpsCounter {
        frame_count: 0,
        inference_count: 0,
        accepted_joints: 0,
        timer: Instant::now(),
    })
    .insert_resource(LogFileRes(logfile.clone()))
    .add_systems(Startup, setup_scene)
    .add_systems(
        Update,
        (
            (sample_pose_system, receive_pose_system, animate_instances_system).chain(),
            (model_drop_system, model_pick_system, orbit_camera_system, fps_system).chain(),
        )
            .chain(),
    );

    if let Some(dv) = debug_view {
        app.insert_non_send_resource(dv)
            .add_systems(Update, debug_view_system.after(animate_instances_system));
    }

    app.run();

    log!(logfile, "Shutting down...");
    Ok(())
}

// --- Systems ---

fn setup_scene(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    commands.spawn((
        Camera3d::default(),
        Transform::from_xyz(0.0, 0.0, 5.0).looking_at(Vec3::ZERO, Vec3::Y),
        OrbitCamera,
    ));

    // ライト: 環境光 + 点光源ひとつ
    commands.insert_resource(AmbientLight {
        color: Color::WHITE,
        brightness: 300.0,
        ..Default::default()
    });
    commands.spawn((
        PointLight {
            intensity: 2_000_000.0,
            range: 200.0,
            ..Default::default()
        },
        Transform::from_xyz(10.0, 10.0, 10.0),
    ));

    // デフォルトの共有ジオメトリ: トーラス
    let mesh = meshes.add(Torus {
        minor_radius: 1.0,
        major_radius: 3.0,
    });
    let material = materials.add(StandardMaterial {
        base_color: Color::srgb(0.6, 0.7, 0.9),
        perceptual_roughness: 0.4,
        ..Default::default()
    });

    // 関節ごとに1インスタンス、計17。メッシュ/マテリアルは参照共有。
    for i in 0..INSTANCE_COUNT {
        commands.spawn((
            Mesh3d(mesh.clone()),
            MeshMaterial3d(material.clone()),
            Transform::default(),
            KeypointInstance(i),
        ));
    }

    commands.insert_resource(SharedModel { mesh, material });
}

/// sample_interval フレームごとに最新カメラフレームを推論スレッドへ送る。
/// モデル未ロード・フレーム未到着・推論中はそのティックを読み飛ばす。
fn sample_pose_system(
    mut cam: ResMut<CameraInput>,
    mut tracking: ResMut<Tracking>,
    tx: Res<InferenceTx>,
    ready: Res<DetectorReady>,
    settings: Res<AppSettings>,
) {
    tracking.frame_counter += 1;
    let interval = settings.0.pose.sample_interval.max(1) as u64;
    if tracking.frame_counter % interval != 0 {
        return;
    }

    if cam.in_flight {
        // 結果が返らないまま1秒経過したら諦めて再送を許可
        let stuck = cam
            .last_request
            .map_or(false, |t| t.elapsed().as_secs_f32() > 1.0);
        if !stuck {
            return;
        }
        cam.in_flight = false;
    }

    if !ready.0.load(Ordering::Acquire) {
        return;
    }
    let Some(camera) = cam.camera.as_ref() else {
        return;
    };
    let frame_id = camera.frame_id();
    if frame_id == cam.last_frame_id {
        return;
    }
    let Some(frame) = camera.get_frame() else {
        return;
    };

    if tx
        .0
        .try_send(InferenceRequest {
            frame,
            timestamp: Instant::now(),
        })
        .is_ok()
    {
        cam.last_frame_id = frame_id;
        cam.in_flight = true;
        cam.last_request = Some(Instant::now());
    }
}

/// 推論結果を取り込み、信頼度ゲートを通った関節だけスプリングの
/// 目標位置を更新する。結果が無いフレームは何もしない。
fn receive_pose_system(
    mut cam: ResMut<CameraInput>,
    mut tracking: ResMut<Tracking>,
    rx: Res<InferenceRx>,
    windows: Query<&Window, With<PrimaryWindow>>,
    mut fps: ResMut<FpsCounter>,
) {
    let Ok(window) = windows.single() else {
        return;
    };
    let (w, h) = (window.width(), window.height());

    let rx = rx.0.lock().unwrap();
    while let Ok(result) = rx.try_recv() {
        cam.in_flight = false;
        // 古すぎる推論結果は破棄
        if result.timestamp.elapsed().as_secs_f32() > 0.3 {
            continue;
        }

        let observations = result.pose.to_screen_observations(w, h);
        let t = &mut *tracking;
        let accepted = t.smoother.update(&observations);
        let targets = *t.smoother.positions();
        for (i, spring) in t.springs.iter_mut().enumerate() {
            spring.set_target(targets[i]);
        }
        t.latest_raw = Some(result.pose);

        fps.inference_count += 1;
        fps.accepted_joints = accepted;
    }
}

/// 毎フレーム: スプリングを進め、スクリーン→ワールド変換して
/// 全17インスタンスの変換を書き直す（検出の有無に関わらず）。
fn animate_instances_system(
    time: Res<Time>,
    mut tracking: ResMut<Tracking>,
    settings: Res<AppSettings>,
    windows: Query<&Window, With<PrimaryWindow>>,
    mut instances: Query<(&KeypointInstance, &mut Transform)>,
) {
    let Ok(window) = windows.single() else {
        return;
    };
    let viewport = Viewport::new(window.width(), window.height());
    let distance = settings.0.scene.ray_distance;
    let dt = time.delta_secs();

    let mut points = [Vec2::ZERO; INSTANCE_COUNT];
    for (i, spring) in tracking.springs.iter_mut().enumerate() {
        points[i] = spring.step(dt);
    }

    for (instance, mut transform) in instances.iter_mut() {
        transform.translation = screen_to_world(points[instance.0], &viewport, distance);
    }
}

type InstanceQuery<'w, 's> = Query<
    'w,
    's,
    (
        &'static mut Mesh3d,
        &'static mut MeshMaterial3d<StandardMaterial>,
    ),
    With<KeypointInstance>,
>;

/// ファイルをパースして共有メッシュ/マテリアルを丸ごと置き換える。
/// 失敗時はログのみで、直前のペアがそのまま使われ続ける。
fn swap_model(
    path: &Path,
    meshes: &mut Assets<Mesh>,
    materials: &mut Assets<StandardMaterial>,
    shared: &mut SharedModel,
    instances: &mut InstanceQuery,
    logfile: &LogFile,
) {
    match model::load_model_file(path) {
        Ok(parsed) => {
            let mesh = meshes.add(parsed.mesh);
            let material = materials.add(parsed.material);
            for (mut m, mut mat) in instances.iter_mut() {
                m.0 = mesh.clone();
                mat.0 = material.clone();
            }
            // 旧アセットは最後のハンドルが外れた時点で解放される
            shared.mesh = mesh;
            shared.material = material;
            log!(logfile, "Model swapped: {}", path.display());
        }
        Err(e) => {
            log!(logfile, "Model load failed ({}): {:#}", path.display(), e);
        }
    }
}

/// ウィンドウへのファイルドロップでモデルを差し替える。
/// 複数ファイルのドロップはファイルごとに1回ずつ発火する。
fn model_drop_system(
    mut events: EventReader<FileDragAndDrop>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    mut shared: ResMut<SharedModel>,
    mut instances: InstanceQuery,
    lf: Res<LogFileRes>,
) {
    for event in events.read() {
        if let FileDragAndDrop::DroppedFile { path_buf, .. } = event {
            swap_model(
                path_buf,
                &mut meshes,
                &mut materials,
                &mut shared,
                &mut instances,
                &lf.0,
            );
        }
    }
}

/// Oキーでファイル選択ダイアログを開く（ドロップと同じ差し替え経路）
fn model_pick_system(
    keys: Res<ButtonInput<KeyCode>>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    mut shared: ResMut<SharedModel>,
    mut instances: InstanceQuery,
    lf: Res<LogFileRes>,
) {
    if !keys.just_pressed(KeyCode::KeyO) {
        return;
    }

    let picked = rfd::FileDialog::new()
        .add_filter("glTF model", &["glb", "gltf"])
        .pick_file();

    if let Some(path) = picked {
        swap_model(
            &path,
            &mut meshes,
            &mut materials,
            &mut shared,
            &mut instances,
            &lf.0,
        );
    }
}

/// 左ドラッグで回転、ホイールでズームするオービットカメラ
fn orbit_camera_system(
    buttons: Res<ButtonInput<MouseButton>>,
    mut motion: EventReader<MouseMotion>,
    mut wheel: EventReader<MouseWheel>,
    mut orbit: ResMut<OrbitState>,
    mut cameras: Query<&mut Transform, With<OrbitCamera>>,
) {
    if buttons.pressed(MouseButton::Left) {
        for ev in motion.read() {
            orbit.yaw -= ev.delta.x * 0.008;
            orbit.pitch = (orbit.pitch - ev.delta.y * 0.008).clamp(-1.54, 1.54);
        }
    } else {
        motion.clear();
    }

    for ev in wheel.read() {
        let scroll = match ev.unit {
            MouseScrollUnit::Line => ev.y * 0.1,
            MouseScrollUnit::Pixel => ev.y * 0.002,
        };
        orbit.radius = (orbit.radius * (1.0 - scroll)).clamp(1.0, 400.0);
    }

    let Ok(mut transform) = cameras.single_mut() else {
        return;
    };
    let rotation = Quat::from_euler(EulerRot::YXZ, orbit.yaw, orbit.pitch, 0.0);
    transform.translation = orbit.focus + rotation * (Vec3::Z * orbit.radius);
    transform.look_at(orbit.focus, Vec3::Y);
}

fn fps_system(mut fps: ResMut<FpsCounter>, tracking: Res<Tracking>, lf: Res<LogFileRes>) {
    fps.frame_count += 1;
    let elapsed = fps.timer.elapsed().as_secs_f32();
    if elapsed >= 1.0 {
        // 追従が消える原因の診断用に、最も信頼度の低い関節も出す
        let mut diag = String::new();
        if let Some(ref pose) = tracking.latest_raw {
            let mut weakest = KeypointIndex::Nose;
            for idx in KeypointIndex::ALL {
                if pose.get(idx).confidence < pose.get(weakest).confidence {
                    weakest = idx;
                }
            }
            diag = format!(
                " weakest {}={:.2}",
                weakest.name(),
                pose.get(weakest).confidence
            );
        }

        let nose = tracking.smoother.get(KeypointIndex::Nose);
        log!(
            lf.0,
            "FPS: {:.1} (infer: {}, joints: {}/17) nose=({:.0},{:.0}){}",
            fps.frame_count as f32 / elapsed,
            fps.inference_count,
            fps.accepted_joints,
            nose.x,
            nose.y,
            diag
        );
        fps.frame_count = 0;
        fps.inference_count = 0;
        fps.timer = Instant::now();
    }
}

/// 2Dデバッグビュー: カメラフレーム + 生の骨格 + 平滑化後の追従位置
fn debug_view_system(
    cam: Res<CameraInput>,
    tracking: Res<Tracking>,
    settings: Res<AppSettings>,
    windows: Query<&Window, With<PrimaryWindow>>,
    mut view: NonSendMut<DebugView>,
) {
    if !view.renderer.is_open() {
        return;
    }

    if let Some(frame) = cam.camera.as_ref().and_then(|c| c.get_frame()) {
        let _ = view.renderer.draw_frame(&frame);
    }

    if let Some(ref pose) = tracking.latest_raw {
        view.renderer.draw_pose(pose, settings.0.pose.confidence_threshold);
    }

    if let Ok(window) = windows.single() {
        let (vw, vh) = view.renderer.size();
        let sx = vw as f32 / window.width();
        let sy = vh as f32 / window.height();
        let targets: Vec<Vec2> = tracking
            .smoother
            .positions()
            .iter()
            .map(|p| Vec2::new(p.x * sx, p.y * sy))
            .collect();
        view.renderer.draw_targets(&targets);
    }

    let _ = view.renderer.present();
}
