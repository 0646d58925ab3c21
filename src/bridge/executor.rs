//! Command execution abstraction for testability.
//!
//! Every adb invocation goes through the [`CommandExecutor`] trait, so the
//! whole engine can run against the [`mock::MockCommandExecutor`] in tests.
//! Screenshots come back as raw bytes, so the trait carries both a text and
//! a byte-oriented entry point.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;

/// Trait for executing external commands.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Execute a command and return stdout as text.
    async fn run(&self, program: &Path, args: &[&str]) -> Result<String>;

    /// Execute a command and return stdout as raw bytes.
    async fn run_raw(&self, program: &Path, args: &[&str]) -> Result<Vec<u8>>;
}

/// Production executor over `tokio::process`.
#[derive(Clone, Default)]
pub struct CommandRunner;

impl CommandRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandExecutor for CommandRunner {
    async fn run(&self, program: &Path, args: &[&str]) -> Result<String> {
        let bytes = self.run_raw(program, args).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn run_raw(&self, program: &Path, args: &[&str]) -> Result<Vec<u8>> {
        log::debug!("executing: {} {}", program.display(), args.join(" "));

        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .with_context(|| format!("failed to execute {}", program.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            anyhow::bail!(
                "command failed with exit code {}: stderr: {} stdout: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim(),
                stdout.trim()
            );
        }

        Ok(output.stdout)
    }
}

pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    type MockResponse = Result<Vec<u8>, String>;
    type CallHistory = Arc<Mutex<Vec<(String, Vec<String>)>>>;

    struct MockRule {
        program: String,
        args: Vec<String>,
        /// Match when the invocation's args merely start with `args`
        prefix: bool,
        responses: VecDeque<MockResponse>,
    }

    /// Mock implementation of [`CommandExecutor`] for tests.
    ///
    /// Rules are registered per (program, args) key, either exact or by
    /// argument prefix (transfers and taps carry run-dependent paths and
    /// coordinates). A rule may hold a sequence of responses; the last one
    /// repeats once the sequence is exhausted, which scripts "template
    /// visible N times, then gone" polling flows.
    #[derive(Clone, Default)]
    pub struct MockCommandExecutor {
        rules: Arc<Mutex<Vec<MockRule>>>,
        call_history: CallHistory,
    }

    impl MockCommandExecutor {
        pub fn new() -> Self {
            Self::default()
        }

        fn push_rule(self, program: &str, args: &[&str], prefix: bool, responses: Vec<MockResponse>) -> Self {
            self.rules.lock().unwrap().push(MockRule {
                program: program.to_string(),
                args: args.iter().map(|s| s.to_string()).collect(),
                prefix,
                responses: responses.into(),
            });
            self
        }

        pub fn with_success(self, program: &str, args: &[&str], output: &str) -> Self {
            self.push_rule(program, args, false, vec![Ok(output.as_bytes().to_vec())])
        }

        pub fn with_error(self, program: &str, args: &[&str], error: &str) -> Self {
            self.push_rule(program, args, false, vec![Err(error.to_string())])
        }

        pub fn with_raw(self, program: &str, args: &[&str], bytes: Vec<u8>) -> Self {
            self.push_rule(program, args, false, vec![Ok(bytes)])
        }

        /// Responses consumed one per call; the last repeats.
        pub fn with_sequence(self, program: &str, args: &[&str], responses: Vec<MockResponse>) -> Self {
            self.push_rule(program, args, false, responses)
        }

        pub fn with_success_prefix(self, program: &str, args: &[&str], output: &str) -> Self {
            self.push_rule(program, args, true, vec![Ok(output.as_bytes().to_vec())])
        }

        pub fn with_error_prefix(self, program: &str, args: &[&str], error: &str) -> Self {
            self.push_rule(program, args, true, vec![Err(error.to_string())])
        }

        pub fn with_sequence_prefix(
            self,
            program: &str,
            args: &[&str],
            responses: Vec<MockResponse>,
        ) -> Self {
            self.push_rule(program, args, true, responses)
        }

        pub fn call_history(&self) -> Vec<(String, Vec<String>)> {
            self.call_history.lock().unwrap().clone()
        }

        /// Calls whose argument list starts with the given prefix.
        pub fn calls_matching(&self, prefix: &[&str]) -> Vec<Vec<String>> {
            self.call_history()
                .into_iter()
                .map(|(_, args)| args)
                .filter(|args| {
                    args.len() >= prefix.len()
                        && args.iter().zip(prefix.iter()).all(|(a, p)| a == p)
                })
                .collect()
        }

        fn lookup(&self, program: &Path, args: &[&str]) -> MockResponse {
            let program_str = program.to_string_lossy();
            let basename = program
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| program_str.clone().into_owned());

            let mut rules = self.rules.lock().unwrap();

            // Exact rules win; among prefix rules the longest prefix wins.
            let mut best: Option<(usize, bool, usize)> = None; // (index, exact, args len)
            for (i, rule) in rules.iter().enumerate() {
                if rule.program != program_str && rule.program != basename {
                    continue;
                }
                let matched = if rule.prefix {
                    args.len() >= rule.args.len()
                        && rule.args.iter().zip(args.iter()).all(|(r, a)| r == a)
                } else {
                    rule.args.len() == args.len()
                        && rule.args.iter().zip(args.iter()).all(|(r, a)| r == a)
                };
                if !matched {
                    continue;
                }
                let candidate = (i, !rule.prefix, rule.args.len());
                best = match best {
                    None => Some(candidate),
                    Some(current) => {
                        // exact beats prefix; longer prefix beats shorter
                        if (candidate.1, candidate.2) > (current.1, current.2) {
                            Some(candidate)
                        } else {
                            Some(current)
                        }
                    }
                };
            }

            match best {
                Some((index, _, _)) => {
                    let rule = &mut rules[index];
                    if rule.responses.len() > 1 {
                        rule.responses.pop_front().unwrap()
                    } else {
                        rule.responses
                            .front()
                            .cloned()
                            .unwrap_or_else(|| Err("mock sequence exhausted".to_string()))
                    }
                }
                None => Err(format!(
                    "no mock response for: {} {}",
                    program_str,
                    args.join(" ")
                )),
            }
        }
    }

    #[async_trait]
    impl CommandExecutor for MockCommandExecutor {
        async fn run(&self, program: &Path, args: &[&str]) -> Result<String> {
            let bytes = self.run_raw(program, args).await?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }

        async fn run_raw(&self, program: &Path, args: &[&str]) -> Result<Vec<u8>> {
            self.call_history.lock().unwrap().push((
                program.to_string_lossy().into_owned(),
                args.iter().map(|s| s.to_string()).collect(),
            ));
            self.lookup(program, args)
                .map_err(|e| anyhow::anyhow!(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockCommandExecutor;
    use super::*;

    #[tokio::test]
    async fn mock_exact_match_and_history() {
        let executor = MockCommandExecutor::new().with_success("adb", &["devices"], "ok\n");
        let out = executor.run(Path::new("adb"), &["devices"]).await.unwrap();
        assert_eq!(out, "ok\n");
        assert_eq!(executor.call_history().len(), 1);
    }

    #[tokio::test]
    async fn mock_prefix_match_covers_variable_args() {
        let executor = MockCommandExecutor::new().with_success_prefix(
            "adb",
            &["-s", "emulator-5554", "shell", "input", "tap"],
            "",
        );
        for coords in [["100", "200"], ["5", "7"]] {
            let args = [
                "-s",
                "emulator-5554",
                "shell",
                "input",
                "tap",
                coords[0],
                coords[1],
            ];
            assert!(executor.run(Path::new("adb"), &args).await.is_ok());
        }
        assert_eq!(
            executor
                .calls_matching(&["-s", "emulator-5554", "shell", "input", "tap"])
                .len(),
            2
        );
    }

    #[tokio::test]
    async fn mock_exact_beats_prefix() {
        let executor = MockCommandExecutor::new()
            .with_success_prefix("adb", &["devices"], "prefix")
            .with_success("adb", &["devices"], "exact");
        let out = executor.run(Path::new("adb"), &["devices"]).await.unwrap();
        assert_eq!(out, "exact");
    }

    #[tokio::test]
    async fn mock_sequence_repeats_last() {
        let executor = MockCommandExecutor::new().with_sequence(
            "adb",
            &["x"],
            vec![Ok(b"first".to_vec()), Ok(b"second".to_vec())],
        );
        let p = Path::new("adb");
        assert_eq!(executor.run(p, &["x"]).await.unwrap(), "first");
        assert_eq!(executor.run(p, &["x"]).await.unwrap(), "second");
        assert_eq!(executor.run(p, &["x"]).await.unwrap(), "second");
    }

    #[tokio::test]
    async fn mock_unconfigured_command_errors() {
        let executor = MockCommandExecutor::new();
        assert!(executor.run(Path::new("adb"), &["devices"]).await.is_err());
    }
}
