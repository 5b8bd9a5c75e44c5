use anyhow::{Context, Result};
use bevy::asset::RenderAssetUsages;
use bevy::pbr::StandardMaterial;
use bevy::render::mesh::{Indices, Mesh, PrimitiveTopology};
use bevy::render::render_resource::Face;
use std::fs;
use std::path::Path;

/// ドロップされたモデルから取り出した共有ジオメトリ/マテリアルのペア
pub struct ParsedModel {
    pub mesh: Mesh,
    pub material: StandardMaterial,
}

/// モデルファイルを丸ごと読み込んでパースする。
/// 読み込み失敗・パース失敗は呼び出し側でログして無視する（状態は変えない）。
pub fn load_model_file<P: AsRef<Path>>(path: P) -> Result<ParsedModel> {
    let bytes = fs::read(path.as_ref())
        .with_context(|| format!("Failed to read model file: {}", path.as_ref().display()))?;
    load_model_bytes(&bytes)
}

/// glTF/GLB のバイト列をパースし、シーン先頭ノードのメッシュと
/// マテリアルを置き換え用ペアとして取り出す。
pub fn load_model_bytes(bytes: &[u8]) -> Result<ParsedModel> {
    let (document, buffers, _images) =
        gltf::import_slice(bytes).context("Failed to parse glTF model")?;

    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .context("Model has no scene")?;
    let root = scene.nodes().next().context("Scene has no nodes")?;
    // 先頭ノード自身がメッシュを持たない場合はそのサブツリーを探す
    let mesh = first_mesh_in(root).context("First scene node carries no mesh")?;
    let primitive = mesh
        .primitives()
        .next()
        .context("Mesh has no primitives")?;

    let bevy_mesh = build_mesh(&primitive, &buffers)?;
    let material = build_material(&primitive.material());

    Ok(ParsedModel {
        mesh: bevy_mesh,
        material,
    })
}

fn first_mesh_in(node: gltf::Node<'_>) -> Option<gltf::Mesh<'_>> {
    if let Some(mesh) = node.mesh() {
        return Some(mesh);
    }
    node.children().find_map(first_mesh_in)
}

fn build_mesh(
    primitive: &gltf::Primitive<'_>,
    buffers: &[gltf::buffer::Data],
) -> Result<Mesh> {
    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|d| d.0.as_slice()));

    let positions: Vec<[f32; 3]> = reader
        .read_positions()
        .context("Primitive has no positions")?
        .collect();

    let mut mesh = Mesh::new(
        PrimitiveTopology::TriangleList,
        RenderAssetUsages::default(),
    );
    mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, positions);

    let has_normals = match reader.read_normals() {
        Some(normals) => {
            mesh.insert_attribute(
                Mesh::ATTRIBUTE_NORMAL,
                normals.collect::<Vec<[f32; 3]>>(),
            );
            true
        }
        None => false,
    };

    if let Some(tex_coords) = reader.read_tex_coords(0) {
        mesh.insert_attribute(
            Mesh::ATTRIBUTE_UV_0,
            tex_coords.into_f32().collect::<Vec<[f32; 2]>>(),
        );
    }

    if let Some(indices) = reader.read_indices() {
        mesh.insert_indices(Indices::U32(indices.into_u32().collect()));
    }

    if !has_normals {
        // インデックス有無に応じてスムーズ/フラット法線を補う
        mesh.compute_normals();
    }

    Ok(mesh)
}

fn build_material(material: &gltf::Material<'_>) -> StandardMaterial {
    let pbr = material.pbr_metallic_roughness();
    let [r, g, b, a] = pbr.base_color_factor();

    StandardMaterial {
        base_color: bevy::color::Color::linear_rgba(r, g, b, a),
        metallic: pbr.metallic_factor(),
        perceptual_roughness: pbr.roughness_factor(),
        double_sided: material.double_sided(),
        cull_mode: if material.double_sided() {
            None
        } else {
            Some(Face::Back)
        },
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 三角形1枚だけのGLBをメモリ上に組み立てる
    fn minimal_glb() -> Vec<u8> {
        let json = br#"{"asset":{"version":"2.0"},"scene":0,"scenes":[{"nodes":[0]}],"nodes":[{"mesh":0}],"meshes":[{"primitives":[{"attributes":{"POSITION":1},"indices":0}]}],"accessors":[{"bufferView":0,"componentType":5123,"count":3,"type":"SCALAR"},{"bufferView":1,"componentType":5126,"count":3,"type":"VEC3","min":[0.0,0.0,0.0],"max":[1.0,1.0,0.0]}],"bufferViews":[{"buffer":0,"byteOffset":0,"byteLength":6},{"buffer":0,"byteOffset":8,"byteLength":36}],"buffers":[{"byteLength":44}]}"#;

        // BIN: u16インデックス3個 + 4バイト境界へのパディング + f32頂点3個
        let mut bin: Vec<u8> = Vec::new();
        for i in [0u16, 1, 2] {
            bin.extend_from_slice(&i.to_le_bytes());
        }
        bin.extend_from_slice(&[0, 0]);
        for v in [
            [0.0f32, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
        ] {
            for c in v {
                bin.extend_from_slice(&c.to_le_bytes());
            }
        }

        let mut json_chunk = json.to_vec();
        while json_chunk.len() % 4 != 0 {
            json_chunk.push(b' ');
        }
        let mut bin_chunk = bin;
        while bin_chunk.len() % 4 != 0 {
            bin_chunk.push(0);
        }

        let total = 12 + 8 + json_chunk.len() + 8 + bin_chunk.len();
        let mut glb: Vec<u8> = Vec::with_capacity(total);
        glb.extend_from_slice(&0x4654_6C67u32.to_le_bytes()); // "glTF"
        glb.extend_from_slice(&2u32.to_le_bytes());
        glb.extend_from_slice(&(total as u32).to_le_bytes());
        glb.extend_from_slice(&(json_chunk.len() as u32).to_le_bytes());
        glb.extend_from_slice(&0x4E4F_534Au32.to_le_bytes()); // "JSON"
        glb.extend_from_slice(&json_chunk);
        glb.extend_from_slice(&(bin_chunk.len() as u32).to_le_bytes());
        glb.extend_from_slice(&0x004E_4942u32.to_le_bytes()); // "BIN\0"
        glb.extend_from_slice(&bin_chunk);
        glb
    }

    #[test]
    fn test_parse_minimal_glb() {
        let parsed = load_model_bytes(&minimal_glb()).unwrap();
        assert_eq!(parsed.mesh.count_vertices(), 3);
        assert_eq!(parsed.mesh.indices().map(|i| i.len()), Some(3));
        // 法線が無いモデルでは計算で補われる
        assert!(parsed.mesh.attribute(Mesh::ATTRIBUTE_NORMAL).is_some());
        // マテリアル未定義はglTFのデフォルト値
        assert_eq!(parsed.material.metallic, 1.0);
        assert_eq!(parsed.material.perceptual_roughness, 1.0);
    }

    #[test]
    fn test_parse_garbage_fails() {
        assert!(load_model_bytes(b"this is not a model").is_err());
        assert!(load_model_bytes(&[]).is_err());
    }

    #[test]
    fn test_missing_file_fails() {
        assert!(load_model_file("no/such/model.glb").is_err());
    }
}
