//! Runs a bundle's own patch logic in a child JVM.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info};

use crate::error::{Error, Result};

/// Number of trailing stderr lines kept in errors.
const STDERR_TAIL: usize = 20;

/// Launches `java -jar <bundle>` in patch-only mode.
#[derive(Debug, Clone)]
pub struct PatchLauncher {
    java: PathBuf,
    jvm_args: Vec<String>,
}

impl Default for PatchLauncher {
    fn default() -> Self {
        Self::new("java")
    }
}

impl PatchLauncher {
    /// Creates a launcher for the given `java` executable.
    pub fn new(java: impl Into<PathBuf>) -> Self {
        Self {
            java: java.into(),
            jvm_args: Vec::new(),
        }
    }

    /// Adds an extra JVM argument, placed before `-jar`.
    pub fn with_jvm_arg(mut self, arg: impl Into<String>) -> Self {
        self.jvm_args.push(arg.into());
        self
    }

    /// Builds the command that patches `bundle` into `repo`.
    pub fn command(&self, bundle: &Path, repo: &Path) -> Command {
        let mut cmd = Command::new(&self.java);
        cmd.arg("-Dpaperclip.patchonly=true")
            .arg(format!("-DbundlerRepoDir={}", repo.display()))
            .args(&self.jvm_args)
            .arg("-jar")
            .arg(bundle)
            .current_dir(repo)
            .stdin(Stdio::null());
        cmd
    }

    /// Runs the bundle and waits for it. Failures are classified from stderr.
    pub fn run(&self, bundle: &Path, repo: &Path) -> Result<()> {
        info!(
            "Running patch process: {} -jar {}",
            self.java.display(),
            bundle.display()
        );
        let output = self
            .command(bundle, repo)
            .output()
            .map_err(|e| Error::Launch {
                program: self.java.display().to_string(),
                source: e,
            })?;

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            debug!(target: "shellex::patch", "{}", line);
        }

        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(classify_failure(bundle, &output.status.to_string(), &stderr))
    }
}

/// Maps a failed patch process to an error, telling version problems apart.
pub fn classify_failure(bundle: &Path, status: &str, stderr: &str) -> Error {
    if stderr.contains("UnsupportedClassVersionError") {
        return match parse_class_versions(stderr) {
            Some((found, max_supported)) => Error::UnsupportedBundleVersion {
                bundle: bundle.to_path_buf(),
                found,
                max_supported,
            },
            None => Error::IncompatibleRuntime {
                bundle: bundle.to_path_buf(),
                detail: stderr
                    .lines()
                    .find(|l| l.contains("UnsupportedClassVersionError"))
                    .unwrap_or_default()
                    .trim()
                    .to_string(),
            },
        };
    }

    let lines: Vec<&str> = stderr.lines().collect();
    let tail = lines[lines.len().saturating_sub(STDERR_TAIL)..].join("\n");
    Error::PatchProcess {
        status: status.to_string(),
        stderr: tail,
    }
}

/// Extracts `(class file version, runtime maximum)` from a JVM version error.
fn parse_class_versions(stderr: &str) -> Option<(u16, u16)> {
    fn major_after<'a>(text: &'a str, marker: &str) -> Option<(u16, &'a str)> {
        let start = text.find(marker)? + marker.len();
        let rest = &text[start..];
        let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
        Some((digits.parse().ok()?, rest))
    }

    let (found, rest) = major_after(stderr, "class file version ")?;
    let (max, _) = major_after(rest, "versions up to ")?;
    Some((found, max))
}

#[cfg(test)]
mod tests {
    use super::*;

    const UCVE: &str = "Error: LinkageError occurred while loading main class io.papermc.paperclip.Main\n\
\tjava.lang.UnsupportedClassVersionError: io/papermc/paperclip/Main has been compiled by a more recent \
version of the Java Runtime (class file version 65.0), this version of the Java Runtime only recognizes \
class file versions up to 61.0\n";

    #[test]
    fn test_classify_version_error() {
        let err = classify_failure(Path::new("paper.jar"), "exit status: 1", UCVE);
        assert!(matches!(
            err,
            Error::UnsupportedBundleVersion {
                found: 65,
                max_supported: 61,
                ..
            }
        ));
    }

    #[test]
    fn test_classify_unparseable_version_error() {
        let err = classify_failure(
            Path::new("paper.jar"),
            "exit status: 1",
            "java.lang.UnsupportedClassVersionError: weird\n",
        );
        assert!(matches!(err, Error::IncompatibleRuntime { .. }));
    }

    #[test]
    fn test_classify_generic_failure_keeps_tail() {
        let stderr: String = (0..50).map(|i| format!("line {i}\n")).collect();
        match classify_failure(Path::new("paper.jar"), "exit status: 2", &stderr) {
            Error::PatchProcess { stderr, status } => {
                assert_eq!(status, "exit status: 2");
                assert_eq!(stderr.lines().count(), STDERR_TAIL);
                assert!(stderr.ends_with("line 49"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_command_arguments() {
        let launcher = PatchLauncher::new("/opt/jdk/bin/java").with_jvm_arg("-Xmx1G");
        let cmd = launcher.command(Path::new("/b/paper.jar"), Path::new("/repo"));
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec![
                "-Dpaperclip.patchonly=true",
                "-DbundlerRepoDir=/repo",
                "-Xmx1G",
                "-jar",
                "/b/paper.jar"
            ]
        );
    }

    #[test]
    fn test_missing_java_is_a_launch_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let launcher = PatchLauncher::new(dir.path().join("no-such-java"));
        let err = launcher
            .run(&dir.path().join("paper.jar"), dir.path())
            .unwrap_err();
        assert!(matches!(err, Error::Launch { .. }));
    }
}
