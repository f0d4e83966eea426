use std::{
    io::{self, BufRead, BufReader},
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use crate::domain::Secret;

/// Errors raised by the external module compiler.
#[derive(Debug, thiserror::Error)]
pub enum SubprocessError {
    /// The executable could not be started.
    #[error("failed to launch {}", program.display())]
    Launch {
        /// The executable.
        program: PathBuf,
        /// The underlying error.
        #[source]
        source: io::Error,
    },

    /// The process ran but reported failure.
    #[error("{} exited with {}", program.display(), code.map_or_else(|| "a signal".to_string(), |c| format!("status {c}")))]
    Exit {
        /// The executable.
        program: PathBuf,
        /// The exit status, if the process was not killed by a signal.
        code: Option<i32>,
    },

    /// Reading the process output failed.
    #[error("failed to read output of {}", program.display())]
    Output {
        /// The executable.
        program: PathBuf,
        /// The underlying error.
        #[source]
        source: io::Error,
    },
}

/// One module to build from an assembled document.
#[derive(Debug, Clone, Copy)]
pub struct CompileJob<'a> {
    /// The OSIS document to package.
    pub input: &'a Path,
    /// Where the module is written.
    pub module_dir: &'a Path,
    /// The key the module text is encrypted with.
    pub cipher_key: &'a Secret,
}

/// Packages an OSIS document into a distributable text module.
pub trait ModuleCompiler {
    /// Builds the module, passing each line the compiler prints to `on_line`.
    ///
    /// Blocks until the compiler finishes.
    ///
    /// # Errors
    ///
    /// Fails if the compiler cannot be run or does not succeed.
    fn compile(
        &self,
        job: &CompileJob<'_>,
        on_line: &mut dyn FnMut(&str),
    ) -> Result<(), SubprocessError>;
}

/// Runs the SWORD `osis2mod` utility.
///
/// The command line is `{program} {module_dir} {input} -z -c {cipher_key}`:
/// compressed and encrypted. Standard error is passed straight through to
/// the caller's terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Osis2Mod {
    program: PathBuf,
}

impl Osis2Mod {
    /// Uses the executable at `program`.
    #[must_use]
    pub const fn new(program: PathBuf) -> Self {
        Self { program }
    }

    /// The executable path.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl ModuleCompiler for Osis2Mod {
    fn compile(
        &self,
        job: &CompileJob<'_>,
        on_line: &mut dyn FnMut(&str),
    ) -> Result<(), SubprocessError> {
        tracing::info!(
            "Running {} {} {} -z -c ********",
            self.program.display(),
            job.module_dir.display(),
            job.input.display()
        );

        let mut child = Command::new(&self.program)
            .arg(job.module_dir)
            .arg(job.input)
            .args(["-z", "-c"])
            .arg(job.cipher_key.expose())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| SubprocessError::Launch {
                program: self.program.clone(),
                source,
            })?;

        let output_error = |source| SubprocessError::Output {
            program: self.program.clone(),
            source,
        };
        if let Some(stdout) = child.stdout.take() {
            for line in BufReader::new(stdout).lines() {
                on_line(&line.map_err(output_error)?);
            }
        }

        let status = child.wait().map_err(output_error)?;
        if status.success() {
            Ok(())
        } else {
            Err(SubprocessError::Exit {
                program: self.program.clone(),
                code: status.code(),
            })
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::{fs, os::unix::fs::PermissionsExt};

    use tempfile::TempDir;

    use super::*;

    fn script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("osis2mod");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn run(program: PathBuf) -> (Result<(), SubprocessError>, Vec<String>) {
        let key = Secret::new("aaaaaaaa".to_string()).unwrap();
        let job = CompileJob {
            input: Path::new("in.xml"),
            module_dir: Path::new("modules/niv"),
            cipher_key: &key,
        };
        let mut lines = Vec::new();
        let result = Osis2Mod::new(program).compile(&job, &mut |line: &str| lines.push(line.to_string()));
        (result, lines)
    }

    #[test]
    fn relays_stdout_line_by_line() {
        let tmp = TempDir::new().unwrap();
        let (result, lines) = run(script(tmp.path(), r#"for arg in "$@"; do echo "$arg"; done"#));

        result.unwrap();
        assert_eq!(lines, ["modules/niv", "in.xml", "-z", "-c", "aaaaaaaa"]);
    }

    #[test]
    fn non_zero_exit_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let (result, lines) = run(script(tmp.path(), "echo partial; exit 3"));

        assert!(matches!(result, Err(SubprocessError::Exit { code: Some(3), .. })));
        assert_eq!(lines, ["partial"]);
    }

    #[test]
    fn missing_executable_is_a_launch_error() {
        let tmp = TempDir::new().unwrap();
        let (result, _) = run(tmp.path().join("absent"));

        assert!(matches!(result, Err(SubprocessError::Launch { .. })));
    }
}
