use std::path::Path;

fn watch(dir: &Path) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            watch(&path);
        } else if matches!(path.extension().and_then(|s| s.to_str()), Some("json" | "tz")) {
            println!("cargo:rerun-if-changed={}", path.display());
        }
    }
}

fn main() {
    // Rerun when contract or opcode fixtures change
    println!("cargo:rerun-if-changed=tests/fixtures");
    watch(Path::new("tests/fixtures"));
}
