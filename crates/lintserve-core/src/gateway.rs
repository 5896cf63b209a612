//! Running the external analysis engine.
//!
//! The engine always analyses the file as it is on disk. Unsaved editor
//! content is never passed to it.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::document::DocumentProxy;
use crate::error::{CoreError, CoreResult};
use crate::fs::FileSystem;
use crate::scheduler::CancelToken;

/// Well-formed result with no findings.
pub const EMPTY_RESULT: &str = r#"{"results":{}}"#;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// What to analyse. Owned so it can move onto a worker thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub path: PathBuf,
    pub workspace: Option<PathBuf>,
}

impl AnalysisRequest {
    pub fn new(path: impl Into<PathBuf>, workspace: Option<PathBuf>) -> Self {
        Self {
            path: path.into(),
            workspace,
        }
    }

    pub fn for_document(document: &DocumentProxy) -> Self {
        Self::new(document.path(), document.workspace().map(Path::to_path_buf))
    }
}

/// Raw engine result before interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOutput {
    pub stdout: String,
    /// `None` when the engine was terminated by a signal.
    pub exit_code: Option<i32>,
}

/// Something that can analyse one file.
pub trait AnalysisEngine: Send + Sync {
    /// Run to completion, or stop early with `CoreError::EngineCancelled`
    /// once `token` fires.
    fn run(&self, request: &AnalysisRequest, token: &CancelToken) -> CoreResult<EngineOutput>;
}

/// Runs the engine as a child process.
///
/// The target filename is appended as the last argument and the child
/// runs in the request's workspace (or the current directory).
#[derive(Debug, Clone)]
pub struct CommandEngine {
    program: String,
    args: Vec<String>,
}

impl CommandEngine {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.program.clone(), config.args.clone())
    }
}

impl AnalysisEngine for CommandEngine {
    fn run(&self, request: &AnalysisRequest, token: &CancelToken) -> CoreResult<EngineOutput> {
        let cwd = request
            .workspace
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(&request.path)
            .current_dir(&cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| CoreError::EngineSpawn {
                program: self.program.clone(),
                source,
            })?;

        // drain stdout while polling
        let reader = child.stdout.take().map(|mut stdout| {
            thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = stdout.read_to_end(&mut buf);
                buf
            })
        });

        let status = loop {
            if token.is_cancelled() {
                stop(&mut child);
                debug!(path = %request.path.display(), "engine killed on cancel");
                return Err(CoreError::EngineCancelled);
            }
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(source) => {
                    stop(&mut child);
                    return Err(CoreError::EngineSpawn {
                        program: self.program.clone(),
                        source,
                    });
                }
            }
        };

        let stdout = reader
            .and_then(|handle| handle.join().ok())
            .map(|buf| String::from_utf8_lossy(&buf).into_owned())
            .unwrap_or_default();

        Ok(EngineOutput {
            stdout,
            exit_code: status.code(),
        })
    }
}

/// Kill and reap, leaving no zombie behind.
fn stop(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Runs analyses and always produces a well-formed result string.
pub struct AnalysisGateway {
    engine: Arc<dyn AnalysisEngine>,
    fs: Arc<dyn FileSystem>,
}

impl std::fmt::Debug for AnalysisGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisGateway")
            .field("fs", &self.fs)
            .finish_non_exhaustive()
    }
}

impl AnalysisGateway {
    pub fn new(engine: Arc<dyn AnalysisEngine>, fs: Arc<dyn FileSystem>) -> Self {
        Self { engine, fs }
    }

    /// Analyse the file named by `request`.
    ///
    /// Exit code 1 means findings and the captured output is the result;
    /// 0 means none. Every other outcome (missing file, abnormal exit,
    /// engine failure, unparseable output) is logged and becomes
    /// [`EMPTY_RESULT`].
    pub fn analyze(&self, request: &AnalysisRequest, token: &CancelToken) -> String {
        if !self.fs.is_file(&request.path) {
            debug!(path = %request.path.display(), "not on disk, nothing to analyse");
            return EMPTY_RESULT.to_string();
        }

        let output = match self.engine.run(request, token) {
            Ok(output) => output,
            Err(CoreError::EngineCancelled) => return EMPTY_RESULT.to_string(),
            Err(e) => {
                warn!(path = %request.path.display(), error = %e, "analysis engine failed");
                return EMPTY_RESULT.to_string();
            }
        };

        match output.exit_code {
            Some(1) => {
                let stdout = output.stdout.trim();
                if stdout.is_empty() {
                    debug!(path = %request.path.display(), "no results for the file");
                    return EMPTY_RESULT.to_string();
                }
                if let Err(e) = serde_json::from_str::<serde_json::Value>(stdout) {
                    warn!(path = %request.path.display(), error = %e, "engine output is not JSON");
                    return EMPTY_RESULT.to_string();
                }
                stdout.to_string()
            }
            Some(0) => {
                debug!(path = %request.path.display(), "no issues found");
                EMPTY_RESULT.to_string()
            }
            code => {
                warn!(path = %request.path.display(), exit_code = ?code, "engine exited abnormally");
                EMPTY_RESULT.to_string()
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::fs::MockFileSystem;
    use std::sync::Mutex;

    /// Engine that returns a fixed answer and records what it was asked.
    pub(crate) struct ScriptedEngine {
        answer: Mutex<Option<CoreResult<EngineOutput>>>,
        pub(crate) requests: Mutex<Vec<AnalysisRequest>>,
    }

    impl ScriptedEngine {
        pub(crate) fn exiting(code: i32, stdout: &str) -> Self {
            Self::answering(Ok(EngineOutput {
                stdout: stdout.to_string(),
                exit_code: Some(code),
            }))
        }

        pub(crate) fn answering(answer: CoreResult<EngineOutput>) -> Self {
            Self {
                answer: Mutex::new(Some(answer)),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    impl AnalysisEngine for ScriptedEngine {
        fn run(&self, request: &AnalysisRequest, _token: &CancelToken) -> CoreResult<EngineOutput> {
            self.requests.lock().unwrap().push(request.clone());
            self.answer
                .lock()
                .unwrap()
                .take()
                .unwrap_or(Err(CoreError::EngineCancelled))
        }
    }

    const FINDINGS: &str = r#"{"results":{"python":[]}}"#;

    fn gateway_with(engine: ScriptedEngine) -> (AnalysisGateway, Arc<ScriptedEngine>) {
        let fs = MockFileSystem::new();
        fs.add_file("/work/a.py", "x = 1\n");
        let engine = Arc::new(engine);
        (AnalysisGateway::new(engine.clone(), Arc::new(fs)), engine)
    }

    fn request() -> AnalysisRequest {
        AnalysisRequest::new("/work/a.py", Some(PathBuf::from("/work")))
    }

    #[test]
    fn test_exit_one_returns_output() {
        let (gateway, engine) = gateway_with(ScriptedEngine::exiting(1, FINDINGS));
        assert_eq!(gateway.analyze(&request(), &CancelToken::new()), FINDINGS);
        assert_eq!(engine.requests.lock().unwrap().as_slice(), &[request()]);
    }

    #[test]
    fn test_exit_one_without_output_is_empty() {
        let (gateway, _) = gateway_with(ScriptedEngine::exiting(1, "  \n"));
        assert_eq!(gateway.analyze(&request(), &CancelToken::new()), EMPTY_RESULT);
    }

    #[test]
    fn test_exit_one_with_garbage_is_empty() {
        let (gateway, _) = gateway_with(ScriptedEngine::exiting(1, "Traceback (most recent call last)"));
        assert_eq!(gateway.analyze(&request(), &CancelToken::new()), EMPTY_RESULT);
    }

    #[test]
    fn test_exit_zero_is_empty() {
        let (gateway, _) = gateway_with(ScriptedEngine::exiting(0, FINDINGS));
        assert_eq!(gateway.analyze(&request(), &CancelToken::new()), EMPTY_RESULT);
    }

    #[test]
    fn test_abnormal_exit_is_empty() {
        let (gateway, _) = gateway_with(ScriptedEngine::exiting(13, FINDINGS));
        assert_eq!(gateway.analyze(&request(), &CancelToken::new()), EMPTY_RESULT);

        let (gateway, _) = gateway_with(ScriptedEngine::answering(Ok(EngineOutput {
            stdout: FINDINGS.to_string(),
            exit_code: None,
        })));
        assert_eq!(gateway.analyze(&request(), &CancelToken::new()), EMPTY_RESULT);
    }

    #[test]
    fn test_engine_error_is_empty() {
        let (gateway, _) = gateway_with(ScriptedEngine::answering(Err(CoreError::EngineSpawn {
            program: "coala".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        })));
        assert_eq!(gateway.analyze(&request(), &CancelToken::new()), EMPTY_RESULT);
    }

    #[test]
    fn test_missing_file_skips_engine() {
        let (gateway, engine) = gateway_with(ScriptedEngine::exiting(1, FINDINGS));
        let missing = AnalysisRequest::new("/work/gone.py", None);
        assert_eq!(gateway.analyze(&missing, &CancelToken::new()), EMPTY_RESULT);
        assert!(engine.requests.lock().unwrap().is_empty());
    }

    #[test]
    fn test_request_for_document() {
        let proxy = DocumentProxy::new("/work/a.py", Some(PathBuf::from("/work"))).unwrap();
        assert_eq!(AnalysisRequest::for_document(&proxy), request());
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::time::Instant;

        fn shell(script: &str) -> CommandEngine {
            // with `sh -c`, the appended filename becomes $0
            CommandEngine::new("sh", vec!["-c".to_string(), script.to_string()])
        }

        #[test]
        fn test_command_engine_captures_stdout_and_exit_code() {
            let temp = tempfile::tempdir().unwrap();
            let file = temp.path().join("target.py");
            std::fs::write(&file, FINDINGS).unwrap();

            let engine = shell(r#"cat "$0"; exit 1"#);
            let request = AnalysisRequest::new(&file, Some(temp.path().to_path_buf()));
            let output = engine.run(&request, &CancelToken::new()).unwrap();

            assert_eq!(output.exit_code, Some(1));
            assert_eq!(output.stdout, FINDINGS);
        }

        #[test]
        fn test_command_engine_runs_in_workspace() {
            let temp = tempfile::tempdir().unwrap();
            let engine = shell("pwd");
            let request = AnalysisRequest::new(temp.path().join("x.py"), Some(temp.path().to_path_buf()));
            let output = engine.run(&request, &CancelToken::new()).unwrap();

            let reported = std::fs::canonicalize(output.stdout.trim()).unwrap();
            assert_eq!(reported, std::fs::canonicalize(temp.path()).unwrap());
        }

        #[test]
        fn test_command_engine_killed_on_cancel() {
            let engine = shell("sleep 30");
            let token = CancelToken::new();
            let canceller = token.clone();
            let started = Instant::now();

            let handle = thread::spawn(move || {
                thread::sleep(Duration::from_millis(100));
                canceller.cancel();
            });
            let result = engine.run(&AnalysisRequest::new("/tmp/x.py", None), &token);
            handle.join().unwrap();

            assert!(matches!(result, Err(CoreError::EngineCancelled)));
            assert!(started.elapsed() < Duration::from_secs(10));
        }

        #[test]
        fn test_stop_reaps_child() {
            let mut child = Command::new("sh")
                .args(["-c", "sleep 30"])
                .spawn()
                .unwrap();
            stop(&mut child);
            // a reaped child reports its cached status at once
            assert!(child.try_wait().unwrap().is_some());
        }

        #[test]
        fn test_missing_program_is_spawn_error() {
            let engine = CommandEngine::new("lintserve-no-such-engine", vec![]);
            let result = engine.run(&AnalysisRequest::new("/tmp/x.py", None), &CancelToken::new());
            assert!(matches!(result, Err(CoreError::EngineSpawn { .. })));
        }
    }
}
