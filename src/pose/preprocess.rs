use anyhow::Result;
use ndarray::Array4;
use opencv::{
    core::{self, AlgorithmHint, Mat, Size, CV_32FC3},
    imgproc,
    prelude::*,
};

/// MoveNet用の入力サイズ
pub const MOVENET_INPUT_SIZE: i32 = 192;

/// OpenCV Mat を MoveNet用の入力テンソルに変換
///
/// - flip_horizontal: 鏡像モード。推論前にフレームを左右反転する
/// - image_scale: (0,1) なら先にこの倍率へ縮小してから 192x192 へ
/// - BGR -> RGB、f32化 (0.0-255.0)、[1, 192, 192, 3]
pub fn preprocess_frame(frame: &Mat, flip_horizontal: bool, image_scale: f32) -> Result<Array4<f32>> {
    let mut working = frame.clone();

    if flip_horizontal {
        let mut flipped = Mat::default();
        core::flip(&working, &mut flipped, 1)?;
        working = flipped;
    }

    if image_scale > 0.0 && image_scale < 1.0 {
        let w = ((working.cols() as f32) * image_scale).round().max(1.0) as i32;
        let h = ((working.rows() as f32) * image_scale).round().max(1.0) as i32;
        let mut scaled = Mat::default();
        imgproc::resize(
            &working,
            &mut scaled,
            Size::new(w, h),
            0.0,
            0.0,
            imgproc::INTER_AREA,
        )?;
        working = scaled;
    }

    // BGR -> RGB
    let mut rgb = Mat::default();
    imgproc::cvt_color(
        &working,
        &mut rgb,
        imgproc::COLOR_BGR2RGB,
        0,
        AlgorithmHint::ALGO_HINT_DEFAULT,
    )?;

    // 192x192 にリサイズ
    let mut resized = Mat::default();
    imgproc::resize(
        &rgb,
        &mut resized,
        Size::new(MOVENET_INPUT_SIZE, MOVENET_INPUT_SIZE),
        0.0,
        0.0,
        imgproc::INTER_LINEAR,
    )?;

    // f32 に変換してテンソルへ詰め替え
    let mut float_mat = Mat::default();
    resized.convert_to(&mut float_mat, CV_32FC3, 1.0, 0.0)?;

    let size = MOVENET_INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, size, size, 3));

    for y in 0..MOVENET_INPUT_SIZE {
        for x in 0..MOVENET_INPUT_SIZE {
            let pixel = float_mat.at_2d::<opencv::core::Vec3f>(y, x)?;
            tensor[[0, y as usize, x as usize, 0]] = pixel[0];
            tensor[[0, y as usize, x as usize, 1]] = pixel[1];
            tensor[[0, y as usize, x as usize, 2]] = pixel[2];
        }
    }

    Ok(tensor)
}
