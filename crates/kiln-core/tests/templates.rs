//! Starter templates against the real host toolchains.
//!
//! Languages whose toolchain is not installed are skipped. Run the full
//! sweep with: `cargo test -p kiln-core --test templates -- --ignored`

use kiln_core::{ExecutionRequest, LanguageRegistry, Outcome, Sandbox, SandboxConfig};
use std::time::Duration;

fn sandbox(scratch: &std::path::Path) -> Sandbox {
    let config = SandboxConfig::builder()
        .scratch_root(scratch)
        .step_timeout(Duration::from_secs(120))
        .build()
        .unwrap();
    Sandbox::new(config).unwrap()
}

/// Returns `None` (and logs why) when the toolchain is missing.
async fn run_template(sandbox: &Sandbox, language: &str) -> Option<kiln_core::ExecutionResult> {
    let profile = sandbox.registry().resolve(language).unwrap().clone();
    if !sandbox.registry().is_available(&profile) {
        eprintln!("Skipping {language}: toolchain not installed");
        return None;
    }
    let template = profile.template.clone().unwrap_or_default();
    Some(sandbox.execute(ExecutionRequest::new(language, template)).await)
}

#[test]
fn test_every_builtin_has_a_template() {
    let registry = LanguageRegistry::builtin();
    assert_eq!(registry.len(), 20);
    for profile in registry.profiles() {
        let template = profile.template.as_deref().unwrap_or_default();
        assert!(
            template.contains("Hello, World!"),
            "{} template does not print the greeting",
            profile.id
        );
    }
}

#[tokio::test]
async fn test_python_template() {
    let scratch = tempfile::tempdir().unwrap();
    let sandbox = sandbox(scratch.path());
    let Some(result) = run_template(&sandbox, "python").await else {
        return;
    };
    assert_eq!(result.outcome, Outcome::Success, "error: {}", result.error);
    assert_eq!(result.output, "Hello, World!\n");
}

#[tokio::test]
async fn test_bash_template() {
    let scratch = tempfile::tempdir().unwrap();
    let sandbox = sandbox(scratch.path());
    let Some(result) = run_template(&sandbox, "bash").await else {
        return;
    };
    assert_eq!(result.outcome, Outcome::Success, "error: {}", result.error);
    assert_eq!(result.output, "Hello, World!\n");
}

#[tokio::test]
async fn test_cpp_compile_error() {
    let scratch = tempfile::tempdir().unwrap();
    let sandbox = sandbox(scratch.path());
    if which::which("g++").is_err() {
        eprintln!("Skipping cpp: g++ not installed");
        return;
    }

    let result = sandbox
        .execute(ExecutionRequest::new("cpp", "int main() { return 0 }"))
        .await;

    assert_eq!(result.outcome, Outcome::CompileFailed);
    assert_eq!(result.output, "");
    assert!(result.error.contains("error"));
    assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_python_runtime_error() {
    let scratch = tempfile::tempdir().unwrap();
    let sandbox = sandbox(scratch.path());
    if which::which("python3").is_err() {
        eprintln!("Skipping python: python3 not installed");
        return;
    }

    let result = sandbox
        .execute(ExecutionRequest::new("py", "print('before')\n1/0\n"))
        .await;

    assert_eq!(result.outcome, Outcome::RuntimeFailed);
    assert_eq!(result.output, "before\n");
    assert!(result.error.contains("ZeroDivisionError"));
}

#[tokio::test]
#[ignore = "compiles with every installed toolchain; slow"]
async fn test_all_builtin_templates() {
    let scratch = tempfile::tempdir().unwrap();
    let sandbox = sandbox(scratch.path());
    let ids: Vec<String> = sandbox
        .registry()
        .profiles()
        .iter()
        .map(|p| p.id.clone())
        .collect();

    for id in ids {
        let Some(result) = run_template(&sandbox, &id).await else {
            continue;
        };
        assert_eq!(result.outcome, Outcome::Success, "{id}: {}", result.error);
        assert_eq!(result.output.trim(), "Hello, World!", "{id}");
    }
    assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
}
