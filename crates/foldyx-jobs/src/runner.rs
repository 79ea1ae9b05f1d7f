//! Prediction tool execution with a streamed, cancellable log.
//!
//! `JobRunner::start` spawns the tool and hands back a `RunHandle`. The handle
//! is the single consumer of the child's merged stdout/stderr: `next_line`
//! yields each line as soon as it is read, `finish` drains the rest and maps
//! the exit status onto the error taxonomy.
//!
//! stdout and stderr are separate pipes read by separate tasks. Each stream
//! keeps its own line order, but lines written to both at nearly the same
//! time may be interleaved differently than in a terminal.

use std::ffi::OsString;
use std::io;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use foldyx_common::{FoldyxError, Result, RunOptions};
use foldyx_config::ToolConfig;

/// Lines buffered between the pipe readers and the consumer.
const LINE_BUFFER: usize = 256;
/// How long to wait for each buffered line once the process is gone.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Fully resolved command line for one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    program: String,
    args: Vec<OsString>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into(), args: Vec::new() }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// `<exe> predict <input_dir> --out_dir <output_dir> ...`
    pub fn predict(tool: &ToolConfig, input_dir: &Path, output_dir: &Path, options: &RunOptions) -> Self {
        let mut cmd = Self::new(tool.executable.clone())
            .arg("predict")
            .arg(input_dir.as_os_str())
            .arg("--out_dir")
            .arg(output_dir.as_os_str())
            .arg("--recycling_steps")
            .arg(options.recycling_steps.to_string())
            .arg("--diffusion_samples")
            .arg(options.diffusion_samples.to_string())
            .arg("--output_format")
            .arg(tool.output_format.as_flag())
            .arg("--override");

        if options.use_msa_server {
            cmd = cmd.arg("--use_msa_server");
        }
        if options.use_potentials {
            cmd = cmd.arg("--use_potentials");
        }
        if options.gpu_count > 1 {
            cmd = cmd.arg("--devices").arg(options.gpu_count.to_string());
        }
        cmd
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// Shell-like rendering for the run log.
    pub fn display(&self) -> String {
        let mut out = self.program.clone();
        for arg in &self.args {
            out.push(' ');
            out.push_str(&arg.to_string_lossy());
        }
        out
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

/// Cloneable cancellation signal for a running job.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once `cancel` has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // the sender lives as long as self, so this only returns on cancel
        let _ = rx.wait_for(|c| *c).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Log of a run that exited with status zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunLog {
    pub text: String,
    pub line_count: usize,
}

#[derive(Debug)]
enum Exit {
    Exited(Option<i32>),
    Cancelled,
    TimedOut(u64),
    WaitFailed(io::Error),
    /// Supervisor dropped without reporting
    Lost,
}

/// Live handle on a spawned tool process.
#[derive(Debug)]
pub struct RunHandle {
    program: String,
    lines: ReceiverStream<String>,
    exit: oneshot::Receiver<Exit>,
    exited: Option<Exit>,
    closed: bool,
    cancel: CancelToken,
    log: String,
    line_count: usize,
}

impl RunHandle {
    /// Next line of merged stdout/stderr, or `None` once both streams close.
    /// Order is preserved within each stream, not across the two.
    ///
    /// After the process is gone, lines still in flight are read for at most
    /// `DRAIN_GRACE` each; pipes held open by the tool's own children do not
    /// keep the stream alive.
    pub async fn next_line(&mut self) -> Option<String> {
        if self.closed {
            return None;
        }
        let line = loop {
            if self.exited.is_some() {
                break tokio::time::timeout(DRAIN_GRACE, self.lines.next())
                    .await
                    .ok()
                    .flatten();
            }
            tokio::select! {
                biased;
                line = self.lines.next() => break line,
                exit = &mut self.exit => self.exited = Some(exit.unwrap_or(Exit::Lost)),
            }
        };

        match line {
            Some(line) => {
                self.record(&line);
                Some(line)
            }
            None => {
                self.closed = true;
                None
            }
        }
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Everything read so far.
    pub fn log(&self) -> &str {
        &self.log
    }

    /// Drain the remaining output and wait for the process to exit.
    pub async fn finish(mut self) -> Result<RunLog> {
        while self.next_line().await.is_some() {}

        let exit = match self.exited.take() {
            Some(exit) => exit,
            None => (&mut self.exit).await.unwrap_or(Exit::Lost),
        };

        match exit {
            Exit::Exited(Some(0)) => {
                info!("{} finished successfully ({} log lines)", self.program, self.line_count);
                Ok(RunLog { text: self.log, line_count: self.line_count })
            }
            Exit::Exited(code) => {
                warn!("{} exited with {:?}", self.program, code);
                Err(FoldyxError::Process { code, log: self.log })
            }
            Exit::Cancelled => Err(FoldyxError::Cancelled),
            Exit::TimedOut(secs) => Err(FoldyxError::TimedOut { secs }),
            Exit::WaitFailed(e) => Err(FoldyxError::Io(e)),
            Exit::Lost => Err(FoldyxError::Io(io::Error::new(
                io::ErrorKind::Other,
                "process supervisor went away",
            ))),
        }
    }

    fn record(&mut self, line: &str) {
        self.log.push_str(line);
        self.log.push('\n');
        self.line_count += 1;
    }
}

/// Launches the prediction tool.
#[derive(Debug, Clone)]
pub struct JobRunner {
    tool: ToolConfig,
    timeout: Option<Duration>,
}

impl JobRunner {
    pub fn new(tool: ToolConfig) -> Self {
        let timeout = tool.timeout();
        Self { tool, timeout }
    }

    /// Replace the configured wall-clock limit.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn tool(&self) -> &ToolConfig {
        &self.tool
    }

    pub fn command(&self, input_dir: &Path, output_dir: &Path, options: &RunOptions) -> ToolCommand {
        ToolCommand::predict(&self.tool, input_dir, output_dir, options)
    }

    /// Spawn the tool for a prepared input directory.
    pub fn start(&self, input_dir: &Path, output_dir: &Path, options: &RunOptions) -> Result<RunHandle> {
        self.spawn(&self.command(input_dir, output_dir, options))
    }

    /// Spawn an arbitrary command under this runner's timeout policy.
    pub fn spawn(&self, command: &ToolCommand) -> Result<RunHandle> {
        info!("Launching: {}", command.display());

        let mut child = command
            .to_command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => FoldyxError::ToolNotFound {
                    program: command.program().to_string(),
                },
                _ => FoldyxError::Io(e),
            })?;

        let (line_tx, line_rx) = mpsc::channel(LINE_BUFFER);
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, line_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, line_tx.clone()));
        }
        drop(line_tx);

        let cancel = CancelToken::new();
        let (exit_tx, exit_rx) = oneshot::channel();
        tokio::spawn(supervise(child, cancel.clone(), self.timeout, exit_tx));

        Ok(RunHandle {
            program: command.program().to_string(),
            lines: ReceiverStream::new(line_rx),
            exit: exit_rx,
            exited: None,
            closed: false,
            cancel,
            log: String::new(),
            line_count: 0,
        })
    }
}

/// Read `reader` line by line into `tx`. Invalid UTF-8 is replaced, not fatal.
async fn forward_lines<R>(reader: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(['\r', '\n'])
                    .to_string();
                if tx.send(line).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!("Stopped reading tool output: {}", e);
                break;
            }
        }
    }
}

enum Interrupt {
    Cancelled,
    TimedOut(u64),
}

async fn supervise(
    mut child: Child,
    cancel: CancelToken,
    timeout: Option<Duration>,
    exit_tx: oneshot::Sender<Exit>,
) {
    let deadline = async move {
        match timeout {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending::<()>().await,
        }
    };

    let interrupt = tokio::select! {
        status = child.wait() => {
            let exit = match status {
                Ok(status) => Exit::Exited(status.code()),
                Err(e) => Exit::WaitFailed(e),
            };
            let _ = exit_tx.send(exit);
            return;
        }
        _ = cancel.cancelled() => Interrupt::Cancelled,
        _ = deadline => Interrupt::TimedOut(timeout.map(|t| t.as_secs()).unwrap_or_default()),
    };

    if let Err(e) = child.kill().await {
        warn!("Failed to kill tool process: {}", e);
    }
    let exit = match interrupt {
        Interrupt::Cancelled => {
            info!("Run cancelled, tool process killed");
            Exit::Cancelled
        }
        Interrupt::TimedOut(secs) => {
            warn!("Run exceeded {}s, tool process killed", secs);
            Exit::TimedOut(secs)
        }
    };
    debug!("Supervisor done");
    let _ = exit_tx.send(exit);
}
