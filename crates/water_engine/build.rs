// build.rs
// Compiles the GLSL sources under resources/shaders into target/shaders/*.spv

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

const STAGES: [&str; 3] = ["vert", "frag", "comp"];

fn is_stale(source: &Path, output: &Path) -> bool {
    match (fs::metadata(source).and_then(|m| m.modified()), fs::metadata(output).and_then(|m| m.modified())) {
        (Ok(src), Ok(dst)) => src > dst,
        _ => true,
    }
}

fn compile(glslc: &Path, source: &Path, output: &Path) {
    let status = Command::new(glslc).arg(source).arg("-o").arg(output).status();
    match status {
        Ok(s) if s.success() => eprintln!("info: compiled {} -> {}", source.display(), output.display()),
        Ok(s) => panic!("glslc failed for {} (exit code {})", source.display(), s.code().unwrap_or(-1)),
        Err(e) => panic!("failed to run glslc for {}: {}", source.display(), e),
    }
}

fn main() {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".into()));
    let workspace_root = manifest_dir.join("../..");
    let shader_dir = workspace_root.join("resources/shaders");
    let target_dir = workspace_root.join("target/shaders");

    println!("cargo:rerun-if-changed={}", shader_dir.display());
    println!("cargo:rerun-if-env-changed=VULKAN_SDK");
    println!("cargo:rerun-if-env-changed=SKIP_SHADERS");

    if env::var("SKIP_SHADERS").is_ok() {
        eprintln!("info: SKIP_SHADERS set, shader compilation skipped");
        return;
    }

    let Ok(vulkan_sdk) = env::var("VULKAN_SDK") else {
        eprintln!("warning: VULKAN_SDK not set, shader compilation skipped");
        return;
    };

    let glslc = if cfg!(target_os = "windows") {
        PathBuf::from(&vulkan_sdk).join("Bin").join("glslc.exe")
    } else {
        PathBuf::from(&vulkan_sdk).join("bin").join("glslc")
    };
    if !glslc.exists() {
        panic!("glslc not found at {}", glslc.display());
    }

    if let Err(e) = fs::create_dir_all(&target_dir) {
        eprintln!("warning: failed to create {}: {}", target_dir.display(), e);
        return;
    }

    let Ok(entries) = fs::read_dir(&shader_dir) else {
        eprintln!("info: no shader directory at {}", shader_dir.display());
        return;
    };

    let mut compiled = 0;
    for path in entries.filter_map(Result::ok).map(|e| e.path()) {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else { continue };
        if !STAGES.contains(&ext) {
            continue;
        }
        // water.vert -> water_vert.spv, keeps stages of one program side by side
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else { continue };
        let output = target_dir.join(format!("{stem}_{ext}.spv"));
        if is_stale(&path, &output) {
            compile(&glslc, &path, &output);
            compiled += 1;
        }
    }

    eprintln!("info: {compiled} shader(s) compiled");
}
