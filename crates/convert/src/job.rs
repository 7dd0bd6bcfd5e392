use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::ConvertError;
use crate::config::ConverterConfig;
use crate::inline::inline_images;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Failed,
    TimedOut,
}

/// One bounded converter invocation. The temp output dir lives as long
/// as the job (or the registry it is handed to).
#[derive(Debug)]
pub struct ConversionJob {
    pub input: PathBuf,
    pub target: String,
    pub status: JobStatus,
    out_dir: TempDir,
}

/// A successful conversion: the produced file plus the dir holding any
/// extracted images. Dropping the outcome (or superseding it in a
/// registry) removes both.
#[derive(Debug)]
pub struct ConversionOutcome {
    pub output_path: PathBuf,
    pub image_dir: PathBuf,
    out_dir: TempDir,
}

impl ConversionOutcome {
    /// Read the produced HTML and inline its image references.
    pub fn html_with_inlined_images(&self) -> Result<String, ConvertError> {
        let html = std::fs::read_to_string(&self.output_path)?;
        let (html, report) = inline_images(&html, self.out_dir.path(), Some(&self.image_dir));
        info!(
            embedded = report.embedded,
            skipped = report.skipped,
            failed = report.failed,
            "image inlining finished"
        );
        Ok(html)
    }
}

impl ConversionJob {
    pub fn new(input: impl Into<PathBuf>, target: impl Into<String>) -> Result<Self, ConvertError> {
        Ok(Self {
            input: input.into(),
            target: target.into(),
            status: JobStatus::Pending,
            out_dir: TempDir::with_prefix("penmark-convert-")?,
        })
    }

    /// Run the converter to completion or deadline. On timeout the whole
    /// process group is killed and no output is consumed.
    pub fn run(mut self, config: &ConverterConfig) -> Result<ConversionOutcome, ConvertError> {
        let binary = config
            .binary
            .as_ref()
            .ok_or(ConvertError::MissingConverter)?;

        let mut command = Command::new(binary);
        command
            .arg("--headless")
            .arg("--convert-to")
            .arg(&self.target)
            .arg("--outdir")
            .arg(self.out_dir.path())
            .arg(&self.input)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        debug!(binary = %binary.display(), input = %self.input.display(),
               target = %self.target, "spawning converter");
        let mut child = command.spawn().map_err(ConvertError::Spawn)?;
        self.status = JobStatus::Running;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdout_reader = spawn_pipe_reader(stdout);
        let stderr_reader = spawn_pipe_reader(stderr);

        let deadline = Instant::now() + config.timeout;
        let status = loop {
            match child.try_wait()? {
                Some(status) => break status,
                None if Instant::now() >= deadline => {
                    warn!(input = %self.input.display(), "conversion deadline hit, killing");
                    kill_process_group(&mut child);
                    let _ = child.wait();
                    let _ = stdout_reader.join();
                    let _ = stderr_reader.join();
                    self.status = JobStatus::TimedOut;
                    return Err(ConvertError::TimedOut(config.timeout));
                }
                None => std::thread::sleep(Duration::from_millis(25)),
            }
        };

        let stdout = stdout_reader.join().unwrap_or_default();
        let stderr = stderr_reader.join().unwrap_or_default();
        if config.diagnostics {
            debug!(stdout = %String::from_utf8_lossy(&stdout), "converter stdout");
            debug!(stderr = %String::from_utf8_lossy(&stderr), "converter stderr");
        }

        if !status.success() {
            self.status = JobStatus::Failed;
            return Err(ConvertError::NonZeroExit {
                status,
                stderr: if config.diagnostics {
                    String::from_utf8_lossy(&stderr).into_owned()
                } else {
                    String::new()
                },
            });
        }

        let output_path = discover_output(self.out_dir.path(), &self.target)?;
        self.status = JobStatus::Done;
        let image_dir = self.out_dir.path().join("images");
        Ok(ConversionOutcome {
            output_path,
            image_dir,
            out_dir: self.out_dir,
        })
    }
}

fn spawn_pipe_reader<R: Read + Send + 'static>(
    pipe: Option<R>,
) -> std::thread::JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

#[cfg(unix)]
fn kill_process_group(child: &mut std::process::Child) {
    let pid = child.id() as i32;
    // The child was spawned as its own process group leader.
    unsafe {
        libc::kill(-pid, libc::SIGKILL);
    }
    let _ = child.kill();
}

#[cfg(not(unix))]
fn kill_process_group(child: &mut std::process::Child) {
    let _ = child.kill();
}

/// Pick the converter's output file: the lexicographically first
/// non-empty file with the requested extension.
fn discover_output(dir: &Path, target: &str) -> Result<PathBuf, ConvertError> {
    let wanted = target.to_ascii_lowercase();
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(dir)?
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| e.to_ascii_lowercase() == wanted)
                    .unwrap_or(false)
        })
        .collect();
    candidates.sort();
    candidates
        .into_iter()
        .find(|p| std::fs::metadata(p).map(|m| m.len() > 0).unwrap_or(false))
        .ok_or(ConvertError::EmptyOutput)
}

/// Session-owned registry of conversion temp dirs. A new outcome for a
/// document supersedes (and removes) the previous one; dropping the
/// registry removes everything.
#[derive(Debug, Default)]
pub struct TempDirRegistry {
    current: Option<ConversionOutcome>,
}

impl TempDirRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a fresh outcome, dropping (and deleting) any previous one.
    pub fn adopt(&mut self, outcome: ConversionOutcome) -> &ConversionOutcome {
        self.current = Some(outcome);
        self.current.as_ref().expect("just set")
    }

    pub fn current(&self) -> Option<&ConversionOutcome> {
        self.current.as_ref()
    }

    pub fn clear(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_converter_is_reported() {
        let config = ConverterConfig::default();
        let job = ConversionJob::new("/nonexistent/file.odt", "html").unwrap();
        let err = job.run(&config).unwrap_err();
        assert!(matches!(err, ConvertError::MissingConverter));
    }

    #[test]
    fn discover_picks_first_nonempty_lexicographically() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.html"), "late").unwrap();
        std::fs::write(dir.path().join("a.html"), "").unwrap();
        std::fs::write(dir.path().join("c.txt"), "wrong ext").unwrap();
        let found = discover_output(dir.path(), "html").unwrap();
        assert_eq!(found.file_name().unwrap(), "b.html");
    }

    #[test]
    fn discover_fails_on_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            discover_output(dir.path(), "html"),
            Err(ConvertError::EmptyOutput)
        ));
    }

    #[cfg(unix)]
    #[test]
    fn timeout_kills_the_process_group() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("slow-convert.sh");
        std::fs::write(&script, "#!/bin/sh\nsleep 30\n").unwrap();
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let config = ConverterConfig::default()
            .with_binary(&script)
            .with_timeout(Duration::from_millis(200));
        let job = ConversionJob::new("input.odt", "html").unwrap();
        let started = Instant::now();
        let err = job.run(&config).unwrap_err();
        assert!(matches!(err, ConvertError::TimedOut(_)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_is_a_failure() {
        let config = ConverterConfig::default().with_binary("/bin/false");
        let job = ConversionJob::new("ignored.odt", "html").unwrap();
        let err = job.run(&config).unwrap_err();
        assert!(matches!(err, ConvertError::NonZeroExit { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn successful_run_discovers_output() {
        // A tiny fake converter: writes out.html into the --outdir.
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-convert.sh");
        std::fs::write(
            &script,
            "#!/bin/sh\n\
             while [ \"$1\" != \"--outdir\" ]; do shift; done\n\
             echo '<p>converted</p>' > \"$2/out.html\"\n",
        )
        .unwrap();
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let config = ConverterConfig::default().with_binary(&script);
        let job = ConversionJob::new("input.odt", "html").unwrap();
        let outcome = job.run(&config).unwrap();
        let html = outcome.html_with_inlined_images().unwrap();
        assert!(html.contains("converted"));
    }
}
