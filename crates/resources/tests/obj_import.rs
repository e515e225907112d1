//! Integration tests for OBJ import.

use std::path::PathBuf;

use glam::Vec3;
use renderer_resources::{MeshData, ResourceError};

fn write_obj(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "renderer_resources_{}_{}.obj",
        name,
        std::process::id()
    ));
    std::fs::write(&path, contents).expect("write test obj");
    path
}

/// Unit cube, eight shared corners, twelve triangles, no normals or UVs.
const CUBE_WITHOUT_NORMALS: &str = "\
v -0.5 -0.5 -0.5
v 0.5 -0.5 -0.5
v 0.5 0.5 -0.5
v -0.5 0.5 -0.5
v -0.5 -0.5 0.5
v 0.5 -0.5 0.5
v 0.5 0.5 0.5
v -0.5 0.5 0.5
f 1 3 2
f 1 4 3
f 5 6 7
f 5 7 8
f 1 2 6
f 1 6 5
f 4 8 7
f 4 7 3
f 1 5 8
f 1 8 4
f 2 3 7
f 2 7 6
";

#[test]
fn test_obj_without_normals_gets_unit_averaged_normals() {
    let path = write_obj("no_normals", CUBE_WITHOUT_NORMALS);
    let mesh = MeshData::load_obj(&path).expect("load cube");
    let _ = std::fs::remove_file(&path);

    assert!(!mesh.vertices.is_empty());
    for (i, vertex) in mesh.vertices.iter().enumerate() {
        let expected = mesh
            .indices
            .chunks_exact(3)
            .filter(|tri| tri.contains(&(i as u32)))
            .map(|tri| {
                let p = |k: u32| mesh.vertices[k as usize].position;
                (p(tri[1]) - p(tri[0])).cross(p(tri[2]) - p(tri[0])).normalize()
            })
            .fold(Vec3::ZERO, |acc, n| acc + n)
            .normalize();

        assert!(
            (vertex.normal.length() - 1.0).abs() < 1e-5,
            "vertex {} normal {:?} is not unit length",
            i,
            vertex.normal
        );
        assert!((vertex.normal - expected).length() < 1e-5);
    }
}

#[test]
fn test_obj_dedup_counts() {
    // A quad as two triangles sharing an edge: 4 unique corners, 2 faces.
    let quad = "\
v 0 0 0
v 1 0 0
v 1 0 1
v 0 0 1
vt 0 0
vt 1 0
vt 1 1
vt 0 1
vn 0 1 0
f 1/1/1 3/3/1 2/2/1
f 1/1/1 4/4/1 3/3/1
";
    let path = write_obj("dedup", quad);
    let mesh = MeshData::load_obj(&path).expect("load quad");
    let _ = std::fs::remove_file(&path);

    assert_eq!(mesh.vertices.len(), 4);
    assert_eq!(mesh.indices.len(), 3 * 2);
    assert_eq!(mesh.triangle_count(), 2);
}

#[test]
fn test_obj_is_centred_and_uv_flipped() {
    let tri = "\
v 2 0 0
v 4 0 0
v 4 0 2
vt 0 0
vt 1 0
vt 1 0.25
vn 0 1 0
f 1/1/1 3/3/1 2/2/1
";
    let path = write_obj("centred", tri);
    let mesh = MeshData::load_obj(&path).expect("load triangle");
    let _ = std::fs::remove_file(&path);

    let min = mesh
        .vertices
        .iter()
        .fold(Vec3::splat(f32::MAX), |m, v| m.min(v.position));
    let max = mesh
        .vertices
        .iter()
        .fold(Vec3::splat(f32::MIN), |m, v| m.max(v.position));
    assert!(((min + max) * 0.5).length() < 1e-6);

    assert!(mesh.vertices.iter().any(|v| (v.tex_coord.y - 0.75).abs() < 1e-6));
    assert!(mesh.vertices.iter().all(|v| v.normal == Vec3::Y));
}

#[test]
fn test_obj_tangents_are_finite() {
    let path = write_obj("tangents", CUBE_WITHOUT_NORMALS);
    let mesh = MeshData::load_obj(&path).expect("load cube");
    let _ = std::fs::remove_file(&path);

    for v in &mesh.vertices {
        assert!(v.tangent.is_finite());
        assert!(v.bitangent.is_finite());
    }
}

#[test]
fn test_empty_obj_is_rejected() {
    let path = write_obj("empty", "# nothing here\n");
    let result = MeshData::load_obj(&path);
    let _ = std::fs::remove_file(&path);
    assert!(matches!(
        result,
        Err(ResourceError::EmptyMesh(_)) | Err(ResourceError::ObjLoad { .. })
    ));
}
