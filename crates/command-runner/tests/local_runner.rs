//! Integration tests for local command execution

use command_runner::{Command, LocalRunner, Runner};

#[test]
fn test_working_directory_is_honored() {
    smol::block_on(async {
        let dir = tempfile::tempdir().unwrap();
        let runner = LocalRunner::new();
        let cmd = Command::builder("pwd").current_dir(dir.path()).build();

        let result = runner.run(&cmd).await.unwrap();
        assert!(result.success());

        // Resolve symlinks (macOS tempdirs live under /private)
        let expected = dir.path().canonicalize().unwrap();
        let reported = std::path::Path::new(result.output.trim())
            .canonicalize()
            .unwrap();
        assert_eq!(reported, expected);
    });
}

#[test]
fn test_env_vars_are_passed() {
    smol::block_on(async {
        let runner = LocalRunner::new();
        let cmd = Command::builder("sh")
            .arg("-c")
            .arg("printf '%s' \"$PROVIS_TEST_VAR\"")
            .env("PROVIS_TEST_VAR", "present")
            .build();

        let result = runner.run(&cmd).await.unwrap();
        assert!(result.success());
        assert_eq!(result.output, "present");
    });
}

#[test]
fn test_exit_codes_are_reported() {
    smol::block_on(async {
        let runner = LocalRunner::new();
        let cmd = Command::builder("sh").arg("-c").arg("exit 42").build();

        let result = runner.run(&cmd).await.unwrap();
        assert!(!result.success());
        assert_eq!(result.status.code, Some(42));
    });
}
