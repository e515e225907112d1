//! The SPIR-V the build script compiles is present under the resource root
//! and reflects to the layouts the passes bind.

use std::path::PathBuf;

use ash::vk;

use renderer_rhi::reflect::{ShaderResources, reflect, words_from_bytes};

fn shader_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../assets/shaders")
}

fn load(name: &str, stage: vk::ShaderStageFlags) -> ShaderResources {
    let path = shader_dir().join(format!("{name}.spv"));
    let bytes = std::fs::read(&path)
        .unwrap_or_else(|e| panic!("{} missing ({e}); the build script compiles it", path.display()));
    reflect(&words_from_bytes(&bytes).unwrap(), stage).unwrap()
}

fn pipeline(vert: &str, frag: &str) -> ShaderResources {
    let vert = load(vert, vk::ShaderStageFlags::VERTEX);
    let frag = load(frag, vk::ShaderStageFlags::FRAGMENT);
    ShaderResources::combine([&vert, &frag])
}

fn set_types(resources: &ShaderResources, set: u32) -> Vec<(u32, vk::DescriptorType)> {
    resources
        .bindings_by_set()
        .remove(&set)
        .unwrap_or_default()
        .into_iter()
        .map(|b| (b.binding, b.descriptor_type))
        .collect()
}

const UBO: vk::DescriptorType = vk::DescriptorType::UNIFORM_BUFFER;
const SAMPLER: vk::DescriptorType = vk::DescriptorType::COMBINED_IMAGE_SAMPLER;

#[test]
fn test_every_pipeline_stage_is_compiled() {
    for name in [
        "pbr.vert",
        "pbr.frag",
        "basic.vert",
        "basic.frag",
        "shadowmap.vert",
        "shadowmap.frag",
        "grid.vert",
        "grid.frag",
    ] {
        let path = shader_dir().join(format!("{name}.spv"));
        assert!(path.is_file(), "{} was not compiled", path.display());
    }
}

#[test]
fn test_pbr_layout() {
    let pbr = pipeline("pbr.vert", "pbr.frag");

    assert_eq!(set_types(&pbr, 0), vec![(0, UBO), (1, UBO)]);
    assert_eq!(set_types(&pbr, 1), vec![(0, UBO), (1, SAMPLER)]);
    assert_eq!(
        set_types(&pbr, 2),
        (0..5).map(|binding| (binding, SAMPLER)).collect::<Vec<_>>()
    );

    let mut locations: Vec<u32> = pbr.attributes.iter().map(|a| a.location).collect();
    locations.sort_unstable();
    assert_eq!(locations, vec![0, 1, 2, 3, 4]);
    assert!(!pbr.push_constant_ranges.is_empty());
}

#[test]
fn test_frame_set_is_shared_by_mesh_and_grid_pipelines() {
    let pbr = pipeline("pbr.vert", "pbr.frag");
    let basic = pipeline("basic.vert", "basic.frag");
    let grid = pipeline("grid.vert", "grid.frag");

    assert_eq!(set_types(&basic, 0), set_types(&pbr, 0));
    assert_eq!(set_types(&grid, 0), set_types(&pbr, 0));
    assert_eq!(set_types(&basic, 1), vec![(0, UBO)]);
}

#[test]
fn test_grid_and_shadow_inputs() {
    let grid = pipeline("grid.vert", "grid.frag");
    assert!(!grid.has_vertex_input());
    assert!(set_types(&grid, 1).is_empty());

    let shadow = pipeline("shadowmap.vert", "shadowmap.frag");
    assert!(shadow.descriptor_bindings.is_empty());
    assert!(!shadow.push_constant_ranges.is_empty());
    assert_eq!(shadow.attributes.len(), 5);
}
