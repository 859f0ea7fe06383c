//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: The socket driver and the transports run on the Tokio runtime
//! and MUST NOT use blocking I/O or thread sleeps.
//! **Required**: Use `tokio::net`, `tokio::fs` and `tokio::time`, not
//! `std::net`, `std::os::unix::net`, `std::fs` or `std::thread::sleep`.
//!
//! Configuration loading runs before the socket exists and is not scanned.

use std::fs;
use std::path::{Path, PathBuf};

use architectural_enforcement::workspace_root;

/// Paths that must stay async-only, relative to the workspace root
const ASYNC_ONLY: &[&str] = &["unixsock/core/src/socket.rs", "unixsock/core/src/transport"];

const FORBIDDEN: &[(&str, &str)] = &[
    ("std::fs", "Blocking file I/O"),
    ("std::net", "Blocking network I/O"),
    ("std::os::unix::net", "Blocking Unix socket I/O"),
    ("std::thread::sleep", "Thread sleep"),
    ("std::io::stdin()", "Blocking stdin"),
];

/// Test that the async path does not use blocking I/O
#[test]
fn test_no_blocking_io_in_socket_driver() {
    let violations = find_blocking_io_violations();

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Blocking calls found on the async path!\n");

        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }

        eprintln!("\n✅ REQUIRED async equivalents:");
        eprintln!("  - tokio::net::UnixStream, tokio::net::UnixDatagram");
        eprintln!("  - tokio::fs::metadata().await");
        eprintln!("  - tokio::time::sleep().await");

        panic!(
            "\nFound {} blocking call(s) on the async path.\nFix these before merging!",
            violations.len()
        );
    }
}

/// The scanned paths must exist, otherwise the policy silently checks nothing
#[test]
fn test_scanned_paths_exist() {
    for relative in ASYNC_ONLY {
        let path = workspace_root().join(relative);
        assert!(path.exists(), "missing scanned path: {}", path.display());
    }
    assert!(!rust_files().is_empty());
}

fn rust_files() -> Vec<PathBuf> {
    let mut files = Vec::new();
    for relative in ASYNC_ONLY {
        let root = workspace_root().join(relative);
        for entry in walkdir::WalkDir::new(&root)
            .into_iter()
            .filter_map(Result::ok)
        {
            if entry.path().extension().and_then(|s| s.to_str()) == Some("rs") {
                files.push(entry.path().to_path_buf());
            }
        }
    }
    files
}

fn find_blocking_io_violations() -> Vec<String> {
    let mut violations = Vec::new();
    for file in rust_files() {
        check_file(&file, &mut violations);
    }
    violations
}

fn check_file(path: &Path, violations: &mut Vec<String>) {
    let Ok(content) = fs::read_to_string(path) else {
        return;
    };

    for (idx, line) in content.lines().enumerate() {
        // Test modules may block freely
        if line.trim_start().starts_with("#[cfg(test)]") {
            break;
        }

        let code_part = line.split("//").next().unwrap_or(line);
        for (pattern, description) in FORBIDDEN {
            if code_part.contains(pattern) {
                violations.push(format!(
                    "{}:{} - {}: {}",
                    path.display(),
                    idx + 1,
                    description,
                    line.trim()
                ));
            }
        }
    }
}

#[test]
fn test_detects_violation_before_test_module() {
    let dir = std::env::temp_dir().join(format!("arch-enforcement-{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    let file = dir.join("sample.rs");
    fs::write(
        &file,
        "use std::os::unix::net::UnixStream; // blocking\n\
         // std::fs::read in a comment is fine\n\
         #[cfg(test)]\n\
         mod tests { use std::fs; }\n",
    )
    .unwrap();

    let mut violations = Vec::new();
    check_file(&file, &mut violations);
    fs::remove_dir_all(&dir).unwrap();

    assert_eq!(violations.len(), 1, "{violations:?}");
    assert!(violations.iter().all(|v| v.contains(":1 ")));
}
