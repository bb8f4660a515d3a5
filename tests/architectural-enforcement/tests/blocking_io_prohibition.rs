//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: Async functions in the netstreams crates MUST NOT use
//! blocking I/O.
//! **Required**: Use `tokio::fs`, `tokio::net`, not `std::fs`, `std::net`
//! sockets, or `std::thread::sleep`

use architectural_enforcement::{code_part, is_in_async_function, is_test_code, scan_production};

const FORBIDDEN: &[&str] = &[
    "std::fs::",
    "std::net::TcpStream",
    "std::net::TcpListener",
    "std::net::UdpSocket",
    "std::thread::sleep",
    "std::io::stdin",
];

fn blocking_call(code: &str) -> Option<&'static str> {
    FORBIDDEN.iter().copied().find(|pattern| code.contains(pattern))
}

/// Test that async production code does not use blocking I/O
#[test]
fn test_no_blocking_io_in_async_code() {
    let violations = scan_production(|_, lines, idx| {
        blocking_call(code_part(lines[idx])).is_some()
            && !is_test_code(lines, idx)
            && is_in_async_function(lines, idx)
    });

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Blocking I/O calls found in async code!\n");

        for violation in &violations {
            eprintln!("  ❌ {}", violation);
        }

        eprintln!("\n❌ FORBIDDEN blocking I/O:");
        for pattern in FORBIDDEN {
            eprintln!("  - {pattern}");
        }
        eprintln!("\n✅ ACCEPTABLE blocking I/O:");
        eprintln!("  - Non-async functions (config loading before the runtime starts)");
        eprintln!("  - Test code");

        panic!(
            "\nFound {} blocking I/O violation(s) in async code.\nFix these before merging!",
            violations.len()
        );
    }
}

#[test]
fn test_detects_blocking_call_in_async_fn() {
    let code = vec![
        "pub async fn load(path: &Path) -> Result<String> {",
        "    let text = std::fs::read_to_string(path)?;",
        "    Ok(text)",
        "}",
    ];

    assert_eq!(blocking_call(code[1]), Some("std::fs::"));
    assert!(is_in_async_function(&code, 1));
}

#[test]
fn test_sync_config_loading_is_allowed() {
    let code = vec![
        "fn load_config_with_env(path: Option<PathBuf>) -> Result<NetConfig, ConfigError> {",
        "    let content = std::fs::read_to_string(config_path)?;",
        "}",
    ];

    assert!(blocking_call(code[1]).is_some());
    assert!(!is_in_async_function(&code, 1));
}
