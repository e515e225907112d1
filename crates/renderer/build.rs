// Compiles assets/shaders/*.{vert,frag} to <name>.spv next to the sources,
// where the renderer resolves `<resource root>/shaders/<name>.spv`.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

fn shader_kind(path: &Path) -> Option<shaderc::ShaderKind> {
    match path.extension()?.to_str()? {
        "vert" => Some(shaderc::ShaderKind::Vertex),
        "frag" => Some(shaderc::ShaderKind::Fragment),
        _ => None,
    }
}

fn main() {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let shader_dir = manifest_dir.join("../../assets/shaders");
    println!("cargo:rerun-if-changed={}", shader_dir.display());

    if env::var("SKIP_SHADERS").is_ok() {
        println!("cargo:warning=SKIP_SHADERS set, shader compilation skipped");
        return;
    }
    println!("cargo:rerun-if-env-changed=SKIP_SHADERS");

    let compiler = shaderc::Compiler::new().expect("failed to create shaderc compiler");
    let mut options = shaderc::CompileOptions::new().expect("failed to create shaderc options");
    options.set_target_env(
        shaderc::TargetEnv::Vulkan,
        shaderc::EnvVersion::Vulkan1_3 as u32,
    );
    // Reflection needs every declared block: no optimisation.
    options.set_optimization_level(shaderc::OptimizationLevel::Zero);

    let entries = fs::read_dir(&shader_dir)
        .unwrap_or_else(|e| panic!("cannot read {}: {}", shader_dir.display(), e));

    let mut compiled = 0;
    for entry in entries {
        let path = entry.unwrap().path();
        let Some(kind) = shader_kind(&path) else {
            continue;
        };
        println!("cargo:rerun-if-changed={}", path.display());

        let file_name = path.file_name().unwrap().to_string_lossy().into_owned();
        let source = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("cannot read {}: {}", path.display(), e));
        let artifact = compiler
            .compile_into_spirv(&source, kind, &file_name, "main", Some(&options))
            .unwrap_or_else(|e| panic!("shader compilation failed for {}:\n{}", file_name, e));
        if artifact.get_num_warnings() > 0 {
            println!(
                "cargo:warning={}: {}",
                file_name,
                artifact.get_warning_messages().replace('\n', " ")
            );
        }

        let out_file = shader_dir.join(format!("{file_name}.spv"));
        fs::write(&out_file, artifact.as_binary_u8())
            .unwrap_or_else(|e| panic!("cannot write {}: {}", out_file.display(), e));
        compiled += 1;
    }

    if compiled == 0 {
        panic!("no shaders found in {}", shader_dir.display());
    }
}
