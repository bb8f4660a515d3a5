//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code in the netstreams crates MUST NOT call sleep
//! methods. Endpoints wait on socket readiness and channel messages.
//! **Exceptions**: Reconnect backoff between connect attempts, test code

use architectural_enforcement::{code_part, is_test_code, scan_production};

/// Test that production code does not contain sleep() calls
#[test]
fn test_no_sleep_in_production_code() {
    let violations = scan_production(|_, lines, idx| {
        let code = code_part(lines[idx]);
        if !(code.contains("::sleep(") || code.contains(".sleep(")) {
            return false;
        }
        !(is_test_code(lines, idx) || is_backoff_context(lines, idx) || is_interval_pattern(lines, idx))
    });

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Sleep calls found in production code!\n");

        for violation in &violations {
            eprintln!("  ❌ {}", violation);
        }

        eprintln!("\n✅ ACCEPTABLE sleep uses:");
        eprintln!("  - Reconnect backoff driven by a ReconnectPolicy");
        eprintln!("  - Test code (#[cfg(test)] modules, #[test] or #[tokio::test] functions)");
        eprintln!("  - Periodic tasks using tokio::time::interval()");
        eprintln!("\n❌ FORBIDDEN:");
        eprintln!("  - Sleep in accept or read loops");
        eprintln!("  - Sleep to 'wait' for a peer (await the socket instead)");

        panic!(
            "\nFound {} sleep violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}

/// Check if sleep is the delay between reconnect attempts
fn is_backoff_context(lines: &[&str], current_idx: usize) -> bool {
    let context_range = current_idx.saturating_sub(15)..std::cmp::min(current_idx + 5, lines.len());

    let mut has_policy_delay = false;
    let mut has_retry_context = false;

    for line in &lines[context_range] {
        let line = line.to_lowercase();

        // The delay must come from the policy, not a literal
        if line.contains("reconnect::delay") || line.contains("next_delay") || line.contains("on_failure") {
            has_policy_delay = true;
        }

        if line.contains("retry")
            || line.contains("retrying")
            || line.contains("reconnect")
            || line.contains("backoff")
            || line.contains("attempt")
        {
            has_retry_context = true;
        }
    }

    has_policy_delay && has_retry_context
}

/// Check if this is tokio::time::interval pattern (acceptable for periodic tasks)
fn is_interval_pattern(lines: &[&str], current_idx: usize) -> bool {
    let start = current_idx.saturating_sub(20);
    let end = std::cmp::min(current_idx + 5, lines.len());

    lines[start..end]
        .iter()
        .any(|line| line.contains("interval.tick()") || line.contains("tokio::time::interval"))
}

#[test]
fn test_backoff_detection() {
    let code = vec![
        "match state.on_failure() {",
        "    Reconnect::Delay(delay) => {",
        "        warn!(attempt, \"Connect failed, retrying\");",
        "        tokio::time::sleep(delay).await;",
        "    }",
        "}",
    ];

    assert!(is_backoff_context(&code, 3), "Should accept policy-driven backoff");
}

#[test]
fn test_literal_sleep_is_not_backoff() {
    let code = vec![
        "async fn accept_loop(listener: TcpListener) {",
        "    loop {",
        "        tokio::time::sleep(Duration::from_millis(10)).await;",
        "    }",
        "}",
    ];

    assert!(!is_backoff_context(&code, 2));
    assert!(!is_test_code(&code, 2));
}
