//! Engine adapter that runs an external generator process.
//!
//! Each request gets its own scratch output directory. The process is
//! expected to write `image-<index>.png` for every index in `0..count`;
//! a missing or undecodable file becomes an absent entry.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::{CancelToken, InferencePipeline, ModelResources, PipelineError};
use crate::config::PipelineSettings;
use crate::models::{GeneratedImage, GenerationRequest, GenerationResult};

/// How often the child is polled for exit and cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Maximum stderr bytes kept for error messages.
const STDERR_LIMIT: usize = 4096;

pub struct CommandPipeline {
    program: PathBuf,
    args: Vec<String>,
    resources: ModelResources,
}

impl CommandPipeline {
    /// Resolve the engine program once. Failure here is a startup error.
    pub fn new(settings: &PipelineSettings, resources: ModelResources) -> Result<Self, PipelineError> {
        let program = resolve_program(&settings.program)
            .ok_or_else(|| PipelineError::ProgramNotFound(settings.program.clone()))?;
        info!(?program, models = ?resources.root(), "Engine ready");
        Ok(Self {
            program,
            args: settings.args.clone(),
            resources,
        })
    }

    fn expand_args(&self, request: &GenerationRequest, output: &Path) -> Vec<String> {
        let vars: HashMap<&str, String> = HashMap::from([
            ("prompt", request.prompt.clone()),
            ("count", request.image_count.to_string()),
            ("steps", request.step_count.to_string()),
            ("seed", request.seed.to_string()),
            ("safety", request.safety_enabled.to_string()),
            ("models", self.resources.root().display().to_string()),
            ("output", output.display().to_string()),
        ]);
        self.args
            .iter()
            .map(|arg| expand_template(arg, &vars))
            .collect()
    }
}

impl InferencePipeline for CommandPipeline {
    fn generate(
        &self,
        request: &GenerationRequest,
        cancel: &CancelToken,
    ) -> Result<GenerationResult, PipelineError> {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let output = tempfile::Builder::new()
            .prefix("fluidcanvas-")
            .tempdir()?;
        let args = self.expand_args(request, output.path());
        debug!(program = ?self.program, seed = request.seed, "Spawning engine");

        let started = Instant::now();
        let mut command = Command::new(&self.program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        // Own process group, so a cancel also reaches whatever the engine forks.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        let mut child = command
            .spawn()
            .map_err(|source| PipelineError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        let stderr_reader = child.stderr.take().map(|mut stderr| {
            thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = stderr.read_to_end(&mut buf);
                buf
            })
        });

        let status = loop {
            if cancel.is_cancelled() {
                kill_engine(&mut child);
                let _ = child.wait();
                // The pipe closes once every process in the group is gone.
                if let Some(handle) = stderr_reader {
                    let _ = handle.join();
                }
                info!("Engine cancelled");
                return Err(PipelineError::Cancelled);
            }
            if let Some(status) = child.try_wait()? {
                break status;
            }
            thread::sleep(POLL_INTERVAL);
        };

        let stderr = stderr_reader
            .and_then(|handle| handle.join().ok())
            .map(|bytes| truncate_stderr(&bytes))
            .unwrap_or_default();

        if !status.success() {
            return Err(PipelineError::ProcessFailed {
                status: status.to_string(),
                stderr,
            });
        }

        let result = collect_outputs(output.path(), request.image_count as usize);
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            produced = result.entries.len() - result.absent_count(),
            absent = result.absent_count(),
            "Engine finished"
        );
        Ok(result)
    }
}

/// Kill the engine and everything it spawned.
#[cfg(unix)]
fn kill_engine(child: &mut Child) {
    let pgid = child.id() as libc::pid_t;
    // SAFETY: killpg only sends a signal; the group was created at spawn.
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc != 0 {
        let error = std::io::Error::last_os_error();
        warn!(pgid, error = ?error, "Failed to kill engine process group");
        if let Err(e) = child.kill() {
            warn!(error = ?e, "Failed to kill engine process");
        }
    }
}

#[cfg(not(unix))]
fn kill_engine(child: &mut Child) {
    if let Err(e) = child.kill() {
        warn!(error = ?e, "Failed to kill engine process");
    }
}

/// File name the engine writes for the image at `index`.
pub fn output_file_name(index: usize) -> String {
    format!("image-{index}.png")
}

/// Read back `count` entries from the engine's output directory.
pub fn collect_outputs(dir: &Path, count: usize) -> GenerationResult {
    let files: HashMap<String, PathBuf> = WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let name = entry.file_name().to_str()?.to_string();
            Some((name, entry.into_path()))
        })
        .collect();

    let entries = (0..count)
        .map(|index| {
            let path = files.get(&output_file_name(index))?;
            match image::open(path) {
                Ok(img) => Some(GeneratedImage::new(img.to_rgba8())),
                Err(e) => {
                    warn!(?path, error = ?e, "Failed to decode engine output");
                    None
                }
            }
        })
        .collect();

    GenerationResult::new(entries)
}

/// Substitute `{name}` placeholders in a single pass. Unknown placeholders
/// and substituted text are left as-is.
pub fn expand_template(template: &str, vars: &HashMap<&str, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let name = &after[..close];
                match vars.get(name) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn resolve_program(program: &str) -> Option<PathBuf> {
    let program = program.trim();
    if program.is_empty() {
        return None;
    }
    let candidate = Path::new(program);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(program))
        .find(|path| path.is_file())
}

fn truncate_stderr(bytes: &[u8]) -> String {
    let start = bytes.len().saturating_sub(STDERR_LIMIT);
    String::from_utf8_lossy(&bytes[start..]).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn vars() -> HashMap<&'static str, String> {
        HashMap::from([("seed", "42".to_string()), ("prompt", "{seed} cat".to_string())])
    }

    fn resources() -> (tempfile::TempDir, ModelResources) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("model.bin"), b"x").unwrap();
        let resources = ModelResources::open(dir.path()).unwrap();
        (dir, resources)
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            prompt: String::new(),
            image_count: 4,
            step_count: 25,
            seed: 1,
            safety_enabled: true,
        }
    }

    #[test]
    fn test_expand_template_single_pass() {
        assert_eq!(expand_template("--seed={seed}", &vars()), "--seed=42");
        assert_eq!(expand_template("{prompt}", &vars()), "{seed} cat");
        assert_eq!(expand_template("{unknown}-{seed}", &vars()), "{unknown}-42");
        assert_eq!(expand_template("open{brace", &vars()), "open{brace");
        assert_eq!(expand_template("", &vars()), "");
    }

    #[test]
    fn test_collect_outputs_marks_missing_and_corrupt_entries() {
        let dir = tempfile::tempdir().unwrap();
        RgbaImage::from_pixel(3, 2, Rgba([9, 9, 9, 255]))
            .save(dir.path().join(output_file_name(0)))
            .unwrap();
        std::fs::write(dir.path().join(output_file_name(2)), b"not a png").unwrap();
        RgbaImage::from_pixel(1, 1, Rgba([1, 2, 3, 255]))
            .save(dir.path().join(output_file_name(3)))
            .unwrap();

        let result = collect_outputs(dir.path(), 4);
        assert_eq!(result.entries.len(), 4);
        assert_eq!(result.entries[0].as_ref().map(|img| (img.width(), img.height())), Some((3, 2)));
        assert!(result.entries[1].is_none());
        assert!(result.entries[2].is_none());
        assert!(result.entries[3].is_some());
    }

    #[test]
    fn test_missing_program_fails_construction() {
        let (_dir, resources) = resources();
        let settings = PipelineSettings {
            program: "/definitely/not/here/engine".to_string(),
            ..PipelineSettings::default()
        };
        let err = CommandPipeline::new(&settings, resources).err().unwrap();
        assert!(matches!(err, PipelineError::ProgramNotFound(_)));
    }

    #[test]
    fn test_expand_args_fills_request_fields() {
        let (_dir, resources) = resources();
        let pipeline = CommandPipeline {
            program: PathBuf::from("engine"),
            args: PipelineSettings::default().args,
            resources,
        };
        let mut request = request();
        request.prompt = "a red fox".to_string();
        request.seed = 1234;
        let args = pipeline.expand_args(&request, Path::new("/tmp/out"));

        let value_after = |flag: &str| {
            let pos = args.iter().position(|a| a == flag).unwrap();
            args[pos + 1].clone()
        };
        assert_eq!(value_after("--prompt"), "a red fox");
        assert_eq!(value_after("--count"), "4");
        assert_eq!(value_after("--steps"), "25");
        assert_eq!(value_after("--seed"), "1234");
        assert_eq!(value_after("--safety"), "true");
        assert_eq!(value_after("--output"), "/tmp/out");
    }

    #[cfg(unix)]
    fn shell_pipeline(script: &str) -> (tempfile::TempDir, CommandPipeline) {
        let (dir, resources) = resources();
        let settings = PipelineSettings {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            models_dir: None,
        };
        (dir, CommandPipeline::new(&settings, resources).unwrap())
    }

    #[cfg(unix)]
    #[test]
    fn test_engine_without_output_yields_absent_entries() {
        let (_dir, pipeline) = shell_pipeline("true");
        let result = pipeline.generate(&request(), &CancelToken::new()).unwrap();
        assert_eq!(result.entries.len(), 4);
        assert_eq!(result.absent_count(), 4);
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_engine_reports_stderr() {
        let (_dir, pipeline) = shell_pipeline("echo model exploded >&2; exit 3");
        match pipeline.generate(&request(), &CancelToken::new()) {
            Err(PipelineError::ProcessFailed { stderr, .. }) => {
                assert_eq!(stderr, "model exploded");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    /// True once `pid` has exited (gone, or a zombie awaiting its reaper).
    #[cfg(target_os = "linux")]
    fn process_exited(pid: &str) -> bool {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => stat
                .rsplit_once(')')
                .and_then(|(_, rest)| rest.trim_start().chars().next())
                .is_some_and(|state| state == 'Z' || state == 'X'),
            Err(_) => true,
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_cancel_kills_engine_and_its_children() {
        let scratch = tempfile::tempdir().unwrap();
        let pid_file = scratch.path().join("engine.pid");
        let script = format!("sleep 30 & echo $! > '{}'; wait", pid_file.display());
        let (_dir, pipeline) = shell_pipeline(&script);

        let cancel = CancelToken::new();
        let canceller = cancel.clone();
        let watched = pid_file.clone();
        let handle = thread::spawn(move || {
            let deadline = Instant::now() + Duration::from_secs(10);
            while !watched.exists() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(10));
            }
            thread::sleep(Duration::from_millis(50));
            canceller.cancel();
        });

        let started = Instant::now();
        let err = pipeline.generate(&request(), &cancel).unwrap_err();
        handle.join().unwrap();
        assert!(matches!(err, PipelineError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(10));

        let grandchild = std::fs::read_to_string(&pid_file).unwrap();
        let grandchild = grandchild.trim();
        assert!(!grandchild.is_empty());
        let deadline = Instant::now() + Duration::from_secs(2);
        while !process_exited(grandchild) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        assert!(process_exited(grandchild), "engine child {grandchild} survived cancel");
    }
}
