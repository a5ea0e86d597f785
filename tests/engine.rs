mod common;

use common::{exists, Harness};
use polyexec::result::RESOURCE_LIMIT_NOTE;
use polyexec::{ExecutionError, ExecutionRequest};

// ── stdin / stdout ──────────────────────────────────────

#[tokio::test]
async fn test_echo_stdin() {
    let h = Harness::new("cat");

    let request = ExecutionRequest::new("python", "print(input())").with_stdin("hello\n");
    let result = h.engine.execute(&request).await.unwrap();

    assert_eq!(result.stdout, "hello\n");
    assert_eq!(result.stderr, "");
    assert_eq!(h.staged_files(), 0);
}

#[tokio::test]
async fn test_stdin_closed_when_absent() {
    // `cat` would block forever if stdin were left open
    let h = Harness::new("cat");

    let result = h
        .engine
        .execute(&ExecutionRequest::new("ruby", "puts gets"))
        .await
        .unwrap();

    assert_eq!(result.stdout, "");
}

#[tokio::test]
async fn test_large_stdin_is_fully_delivered() {
    let h = Harness::new("wc -c | tr -d ' '");
    let input = "x".repeat(1024 * 1024);

    let result = h
        .engine
        .execute(&ExecutionRequest::new("python", "import sys").with_stdin(input))
        .await
        .unwrap();

    assert_eq!(result.stdout.trim(), "1048576");
}

#[tokio::test]
async fn test_unread_stdin_does_not_fail() {
    // Program exits without touching its (large) stdin: broken pipe is ignored
    let h = Harness::new("echo done");
    let input = "y".repeat(4 * 1024 * 1024);

    let result = h
        .engine
        .execute(&ExecutionRequest::new("c", "int main(){}").with_stdin(input))
        .await
        .unwrap();

    assert_eq!(result.stdout, "done\n");
}

// ── source staging ──────────────────────────────────────

#[tokio::test]
async fn test_source_is_mounted_and_removed() {
    let h = Harness::new(r#"cat "$src"; echo; echo "$src" >&2"#);

    let result = h
        .engine
        .execute(&ExecutionRequest::new("go", "package main"))
        .await
        .unwrap();

    assert_eq!(result.stdout, "package main\n");
    let staged = result.stderr.trim();
    assert!(staged.ends_with(".go"), "unexpected staged path {staged}");
    assert!(!exists(staged));
    assert_eq!(h.staged_files(), 0);
}

#[tokio::test]
async fn test_auxiliary_file_is_mounted_under_required_name() {
    let h = Harness::new(
        r#"for a in "$@"; do
  case "$a" in
    *:/app/Program.csproj:ro) cat "${a%%:/app/*}" ;;
  esac
done"#,
    );

    let result = h
        .engine
        .execute(&ExecutionRequest::new("csharp", "Console.WriteLine(1);"))
        .await
        .unwrap();

    assert!(result.stdout.contains("<OutputType>Exe</OutputType>"));
    assert_eq!(h.staged_files(), 0);
}

#[tokio::test]
async fn test_five_concurrent_executions_stay_isolated() {
    // Behaves like `python main.py` for programs of the form print("...")
    let h = Harness::new(r#"sed -n 's/^print("\(.*\)")$/\1/p' "$src""#);

    let requests: Vec<ExecutionRequest> = (0..5)
        .map(|i| ExecutionRequest::new("python", format!("print(\"unique-{i}\")")))
        .collect();

    let results =
        futures::future::join_all(requests.iter().map(|r| h.engine.execute(r))).await;

    for (i, result) in results.into_iter().enumerate() {
        let result = result.unwrap();
        assert_eq!(result.stdout, format!("unique-{i}\n"));
        assert_eq!(result.stderr, "");
    }
    assert_eq!(h.staged_files(), 0);
}

// ── invocation shape ────────────────────────────────────

#[tokio::test]
async fn test_invocation_arguments() {
    let h = Harness::new(r#"printf '%s\n' "$@""#);

    let result = h
        .engine
        .execute(&ExecutionRequest::new("python", "print(1)"))
        .await
        .unwrap();
    let args: Vec<&str> = result.stdout.lines().collect();

    assert_eq!(&args[..3], &["run", "-i", "--rm"]);
    assert!(args.contains(&"--quiet"));
    assert!(args.contains(&"cpu=20:20"));
    assert!(args.contains(&"--memory=512m"));
    assert!(args.iter().any(|a| a.ends_with(":/app/main.py:ro")));
    assert_eq!(
        &args[args.len() - 4..],
        &["python:3.12-slim", "sh", "-c", "python3 -u /app/main.py"]
    );
}

#[tokio::test]
async fn test_configured_limits_ignore_request_timeout() {
    let h = Harness::with_config(r#"printf '%s\n' "$@""#, |config| {
        config.sandbox.cpu_time_limit_secs = 10;
        config.sandbox.memory_limit_mb = 64;
        config.sandbox.network = Some("none".to_string());
        config
            .images
            .insert("ruby".to_string(), "mirror.local/ruby:3".to_string());
    });

    let request = ExecutionRequest::new("rb", "puts 1").with_timeout(2.0);
    let result = h.engine.execute(&request).await.unwrap();
    let args: Vec<&str> = result.stdout.lines().collect();

    assert!(args.contains(&"cpu=10:10"));
    assert!(!args.contains(&"cpu=2:2"));
    assert!(args.contains(&"--memory=64m"));
    assert!(args.contains(&"--memory-swap=64m"));
    assert!(args.contains(&"--network=none"));
    assert!(args.contains(&"mirror.local/ruby:3"));
}

// ── termination ─────────────────────────────────────────

#[tokio::test]
async fn test_forced_kill_is_annotated() {
    let h = Harness::new("echo partial; echo Killed >&2; exit 137");

    let result = h
        .engine
        .execute(&ExecutionRequest::new("python", "x = [0] * 10**10"))
        .await
        .unwrap();

    assert_eq!(result.stdout, "partial\n");
    assert_eq!(result.stderr, format!("Killed\n{RESOURCE_LIMIT_NOTE}"));
    assert_eq!(h.staged_files(), 0);
}

#[tokio::test]
async fn test_cpu_limit_kill_is_annotated() {
    let h = Harness::new("exit 152");

    let result = h
        .engine
        .execute(&ExecutionRequest::new("c", "int main(){for(;;);}"))
        .await
        .unwrap();

    assert!(result.hit_resource_limit());
}

#[tokio::test]
async fn test_program_crash_passes_through() {
    let h = Harness::new(r#"echo "Segmentation fault (core dumped)" >&2; exit 139"#);

    let result = h
        .engine
        .execute(&ExecutionRequest::new("cpp", "int main(){*(int*)0=1;}"))
        .await
        .unwrap();

    assert_eq!(result.stderr, "Segmentation fault (core dumped)\n");
    assert!(!result.hit_resource_limit());
    assert_eq!(h.staged_files(), 0);
}

#[tokio::test]
async fn test_compile_error_is_plain_stderr() {
    let h = Harness::new(
        r#"echo "/app/main.c:1:10: error: expected ';' before '}' token" >&2; exit 1"#,
    );

    let result = h
        .engine
        .execute(&ExecutionRequest::new("c", "int main(){return 0}"))
        .await
        .unwrap();

    assert_eq!(result.stdout, "");
    assert!(result.stderr.contains("error: expected ';'"));
    assert!(!result.hit_resource_limit());
}

#[tokio::test]
async fn test_interleaved_output_is_not_truncated() {
    // ~200KB per stream, well past a pipe buffer
    let h = Harness::new(
        r#"i=0
while [ $i -lt 20000 ]; do
  echo "out $i"
  echo "err $i" >&2
  i=$((i+1))
done"#,
    );

    let result = h
        .engine
        .execute(&ExecutionRequest::new("python", "spam()"))
        .await
        .unwrap();

    let out: Vec<&str> = result.stdout.lines().collect();
    let err: Vec<&str> = result.stderr.lines().collect();
    assert_eq!(out.len(), 20000);
    assert_eq!(err.len(), 20000);
    assert_eq!(out[0], "out 0");
    assert_eq!(out[19999], "out 19999");
    assert_eq!(err[19999], "err 19999");
}

// ── failures before a result exists ─────────────────────

#[tokio::test]
async fn test_unsupported_language_spawns_nothing() {
    let h = Harness::new(r#"touch "$(dirname "$0")/spawned""#);

    let err = h
        .engine
        .execute(&ExecutionRequest::new("cobol", "DISPLAY 'HI'."))
        .await
        .unwrap_err();

    assert!(matches!(err, ExecutionError::UnsupportedLanguage(_)));
    assert!(err.is_client_error());
    assert!(!h.marker().exists());
    assert_eq!(h.staged_files(), 0);
}

#[tokio::test]
async fn test_marker_is_written_when_spawned() {
    // Control for the test above: the marker mechanism itself works
    let h = Harness::new(r#"touch "$(dirname "$0")/spawned""#);

    h.engine
        .execute(&ExecutionRequest::new("php", "<?php echo 1;"))
        .await
        .unwrap();

    assert!(h.marker().exists());
}

#[tokio::test]
async fn test_missing_cli_is_spawn_failure() {
    let h = Harness::with_config("", |config| {
        config.sandbox.program = "/nonexistent/polyexec-docker".to_string();
        config.sandbox.program_args.clear();
    });

    let err = h
        .engine
        .execute(&ExecutionRequest::new("python", "print(1)"))
        .await
        .unwrap_err();

    match err {
        ExecutionError::Spawn { ref program, .. } => {
            assert_eq!(program, "/nonexistent/polyexec-docker")
        }
        ref other => panic!("Expected Spawn, got {other:?}"),
    }
    assert!(!err.is_client_error());
    assert_eq!(h.staged_files(), 0);
}

#[tokio::test]
async fn test_unreachable_runtime_is_spawn_failure() {
    let h = Harness::new(
        r#"echo "docker: Cannot connect to the Docker daemon at unix:///var/run/docker.sock. Is the docker daemon running?" >&2
exit 125"#,
    );

    let err = h
        .engine
        .execute(&ExecutionRequest::new("python", "print(1)"))
        .await
        .unwrap_err();

    match err {
        ExecutionError::Spawn { ref program, ref source } => {
            assert_eq!(program, "sh");
            assert!(source.to_string().contains("Cannot connect to the Docker daemon"));
        }
        ref other => panic!("Expected Spawn, got {other:?}"),
    }
    assert!(!err.is_client_error());
    assert_eq!(h.staged_files(), 0);
}

#[tokio::test]
async fn test_program_exiting_125_after_output_is_a_result() {
    let h = Harness::new("echo 42; exit 125");

    let result = h
        .engine
        .execute(&ExecutionRequest::new("python", "print(42); exit(125)"))
        .await
        .unwrap();

    assert_eq!(result.stdout, "42\n");
    assert!(!result.hit_resource_limit());
}

#[tokio::test]
async fn test_unwritable_staging_is_staging_failure() {
    let h = Harness::with_config(r#"touch "$(dirname "$0")/spawned""#, |config| {
        config.sandbox.staging_dir = config.sandbox.staging_dir.join("gone");
    });

    let err = h
        .engine
        .execute(&ExecutionRequest::new("python", "print(1)"))
        .await
        .unwrap_err();

    assert!(matches!(err, ExecutionError::Staging { .. }));
    assert!(!h.marker().exists());
}
