use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use regex::Regex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::dialogue::{CodeExecutor, DialogueError, ExecutorFactory, Message, Role, KIND_EXECUTION_RESULT};

const OUTPUT_LIMIT_BYTES: usize = 64 * 1024;
const DEFAULT_PATH: &str = "/usr/local/bin:/usr/bin:/bin";
pub const NO_CODE_REPLY: &str =
    "No code block found in the last message. Put code in a fenced markdown block so it can be run.";

#[derive(Debug, Clone, PartialEq)]
pub struct CodeBlock {
    pub language: String,
    pub code: String,
}

/// Fenced markdown blocks in order of appearance.
pub fn extract_code_blocks(text: &str) -> Vec<CodeBlock> {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    let fence = FENCE.get_or_init(|| {
        Regex::new(r"```[ \t]*([A-Za-z0-9_+-]*)[^\n]*\n([\s\S]*?)```").expect("valid code fence regex")
    });

    fence
        .captures_iter(text)
        .map(|caps| CodeBlock {
            language: caps[1].to_ascii_lowercase(),
            code: caps[2].to_string(),
        })
        .filter(|block| !block.code.trim().is_empty())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Interpreter {
    Python,
    Shell,
}

impl Interpreter {
    fn for_language(language: &str) -> Option<Self> {
        match language {
            "" | "python" | "py" | "python3" => Some(Interpreter::Python),
            "sh" | "bash" | "shell" | "console" => Some(Interpreter::Shell),
            _ => None,
        }
    }

    fn program(&self) -> &'static str {
        match self {
            Interpreter::Python => "python3",
            Interpreter::Shell => "sh",
        }
    }

    fn extension(&self) -> &'static str {
        match self {
            Interpreter::Python => "py",
            Interpreter::Shell => "sh",
        }
    }
}

struct RunResult {
    exit_code: i32,
    output: String,
}

struct CappedOutput {
    bytes: Vec<u8>,
    truncated: bool,
}

/// Runs code blocks from writer messages inside one private directory.
///
/// The directory is removed when the executor is dropped.
pub struct SandboxExecutor {
    dir: PathBuf,
    timeout: Duration,
    files_written: AtomicUsize,
}

impl SandboxExecutor {
    pub fn create(root: &Path, timeout: Duration) -> Result<Self, DialogueError> {
        let dir = root.join(Uuid::new_v4().to_string());
        std::fs::create_dir_all(&dir)
            .map_err(|e| DialogueError::Execution(format!("cannot create sandbox {}: {}", dir.display(), e)))?;
        // Children run inside the sandbox, so HOME and TMPDIR must not be relative to it
        let dir = std::fs::canonicalize(&dir)
            .map_err(|e| DialogueError::Execution(format!("cannot resolve sandbox {}: {}", dir.display(), e)))?;
        debug!("Created sandbox {}", dir.display());
        Ok(Self {
            dir,
            timeout,
            files_written: AtomicUsize::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn run_block(&self, interpreter: Interpreter, code: &str) -> Result<RunResult, DialogueError> {
        let index = self.files_written.fetch_add(1, Ordering::SeqCst);
        let file_name = format!("tmp_code_{}.{}", index, interpreter.extension());
        tokio::fs::write(self.dir.join(&file_name), code)
            .await
            .map_err(|e| DialogueError::Execution(format!("cannot write {}: {}", file_name, e)))?;

        let path = std::env::var_os("PATH").unwrap_or_else(|| DEFAULT_PATH.into());
        let mut command = Command::new(interpreter.program());
        command
            .arg(&file_name)
            .current_dir(&self.dir)
            .env_clear()
            .env("PATH", path)
            .env("HOME", &self.dir)
            .env("TMPDIR", &self.dir)
            .env("MPLBACKEND", "Agg")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so whatever the code spawns can be killed with it
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command
            .spawn()
            .map_err(|e| DialogueError::Execution(format!("failed to start {}: {}", interpreter.program(), e)))?;
        let pgid = child.id();

        let stdout = tokio::spawn(read_capped(child.stdout.take(), OUTPUT_LIMIT_BYTES));
        let stderr = tokio::spawn(read_capped(child.stderr.take(), OUTPUT_LIMIT_BYTES));

        let waited = tokio::time::timeout(self.timeout, child.wait()).await;
        kill_process_group(pgid);

        let status = match waited {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                stdout.abort();
                stderr.abort();
                return Err(DialogueError::Execution(e.to_string()));
            }
            Err(_) => {
                stdout.abort();
                stderr.abort();
                warn!("⏱️ Code execution in {} timed out after {:?}", self.dir.display(), self.timeout);
                return Err(DialogueError::Timeout(self.timeout));
            }
        };

        let out = collect_output(stdout).await?;
        let err = collect_output(stderr).await?;
        let mut text = String::from_utf8_lossy(&out.bytes).into_owned();
        text.push_str(&String::from_utf8_lossy(&err.bytes));
        Ok(RunResult {
            exit_code: status.code().unwrap_or(-1),
            output: cap_output(text, OUTPUT_LIMIT_BYTES, out.truncated || err.truncated),
        })
    }
}

/// Keeps at most `limit` bytes and discards the rest, so a chatty child
/// neither fills memory nor blocks on a full pipe.
async fn read_capped<R>(reader: Option<R>, limit: usize) -> std::io::Result<CappedOutput>
where
    R: AsyncRead + Unpin,
{
    let mut bytes = Vec::new();
    let Some(mut reader) = reader else {
        return Ok(CappedOutput { bytes, truncated: false });
    };

    (&mut reader).take(limit as u64 + 1).read_to_end(&mut bytes).await?;
    let truncated = bytes.len() > limit;
    if truncated {
        bytes.truncate(limit);
        tokio::io::copy(&mut reader, &mut tokio::io::sink()).await?;
    }
    Ok(CappedOutput { bytes, truncated })
}

async fn collect_output(handle: JoinHandle<std::io::Result<CappedOutput>>) -> Result<CappedOutput, DialogueError> {
    handle
        .await
        .map_err(|e| DialogueError::Execution(format!("output reader failed: {}", e)))?
        .map_err(|e| DialogueError::Execution(format!("cannot read output: {}", e)))
}

#[cfg(unix)]
fn kill_process_group(pgid: Option<u32>) {
    let Some(pgid) = pgid else { return };
    // SAFETY: killpg only sends a signal. An empty group fails with ESRCH.
    let rc = unsafe { libc::killpg(pgid as libc::pid_t, libc::SIGKILL) };
    if rc != 0 {
        debug!("killpg({}) skipped: {}", pgid, std::io::Error::last_os_error());
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: Option<u32>) {}

#[async_trait]
impl CodeExecutor for SandboxExecutor {
    async fn execute(&self, message: &Message) -> Result<Message, DialogueError> {
        let blocks = extract_code_blocks(message.text());
        if blocks.is_empty() {
            return Ok(Message::new(Role::Executor, NO_CODE_REPLY).with_kind(KIND_EXECUTION_RESULT));
        }

        let started = Instant::now();
        let mut exit_code = 0;
        let mut output = String::new();
        let mut executed = 0usize;

        for block in &blocks {
            let Some(interpreter) = Interpreter::for_language(&block.language) else {
                exit_code = 1;
                output.push_str(&format!("unknown language {}", block.language));
                break;
            };

            let result = self.run_block(interpreter, &block.code).await?;
            executed += 1;
            output.push_str(&result.output);
            exit_code = result.exit_code;
            if exit_code != 0 {
                break;
            }
        }

        let verdict = if exit_code == 0 { "execution succeeded" } else { "execution failed" };
        info!(
            "🧪 Executed {}/{} code blocks in {:.2}s: exitcode {}",
            executed,
            blocks.len(),
            started.elapsed().as_secs_f64(),
            exit_code
        );

        Ok(
            Message::new(Role::Executor, format!("exitcode: {} ({})\nCode output: {}", exit_code, verdict, output))
                .with_kind(KIND_EXECUTION_RESULT)
                .with_metadata("exit_code", exit_code)
                .with_metadata("blocks_executed", executed as u64)
                .with_metadata("duration_ms", started.elapsed().as_millis() as u64),
        )
    }
}

impl Drop for SandboxExecutor {
    fn drop(&mut self) {
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => debug!("Removed sandbox {}", self.dir.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove sandbox {}: {}", self.dir.display(), e),
        }
    }
}

/// Hands out a fresh [`SandboxExecutor`] under `root` for each dialogue run.
pub struct SandboxExecutorFactory {
    root: PathBuf,
    timeout: Duration,
}

impl SandboxExecutorFactory {
    pub fn new(root: PathBuf, timeout: Duration) -> Self {
        Self { root, timeout }
    }
}

impl ExecutorFactory for SandboxExecutorFactory {
    fn create(&self) -> Result<Box<dyn CodeExecutor>, DialogueError> {
        Ok(Box::new(SandboxExecutor::create(&self.root, self.timeout)?))
    }
}

fn cap_output(mut text: String, limit: usize, truncated: bool) -> String {
    if !truncated && text.len() <= limit {
        return text;
    }
    if text.len() > limit {
        let mut cut = limit;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    text.push_str("\n[output truncated]");
    text
}
