use std::env;
use std::fs;
use std::path::Path;
use std::process::Command;

use chrono::Utc;

fn main() {
    println!("cargo:rerun-if-env-changed=STDHTTP_BUILD_ID_OVERRIDE");
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs");

    if let Some(path) = git_head_path() {
        println!("cargo:rerun-if-changed={}", path);
    }

    let override_id = env::var("STDHTTP_BUILD_ID_OVERRIDE").ok();
    let build_time = Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();
    let git_label = git_describe().unwrap_or_else(|| "unknown".to_string());

    let build_id = override_id.unwrap_or_else(|| format!("{} | {}", build_time, git_label));

    println!("cargo:rustc-env=STDHTTP_BUILD_ID={}", build_id);
}

fn git_head_path() -> Option<String> {
    let head = Path::new(".git/HEAD");
    if !head.exists() {
        return None;
    }
    match fs::read_to_string(head) {
        Ok(content) => match content.strip_prefix("ref: ") {
            Some(reference) => {
                let ref_path = format!(".git/{}", reference.trim());
                Path::new(&ref_path)
                    .exists()
                    .then_some(ref_path)
                    .or_else(|| Some(head.display().to_string()))
            }
            None => Some(head.display().to_string()),
        },
        Err(_) => Some(head.display().to_string()),
    }
}

fn git_describe() -> Option<String> {
    let output = Command::new("git")
        .args(["describe", "--tags", "--dirty", "--always"])
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let label = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!label.is_empty()).then_some(label)
}
