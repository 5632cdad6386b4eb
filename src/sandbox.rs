use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use crate::channel::{
    ChannelEvent, ExecutionChannel, InboundMessage, OutboundMessage, drain_limited,
};
use crate::language::Language;

pub const SUCCESS_TRAILER: &str = "\n[Execution Successful]";
pub const FAILURE_TRAILER: &str = "\n[Execution Failed]";

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const READ_CHUNK: usize = 4096;

/// Runs programs on this machine and reports them through the same events
/// a remote execution server would send.
pub struct LocalSandbox {
    scratch_dir: PathBuf,
    generation: Arc<Mutex<u64>>,
    stdin: Arc<Mutex<Option<ChildStdin>>>,
    run_slot: Arc<Mutex<()>>,
    event_tx: Sender<ChannelEvent>,
    event_rx: Receiver<ChannelEvent>,
}

impl LocalSandbox {
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        let (event_tx, event_rx) = mpsc::channel();
        let _ = event_tx.send(ChannelEvent::Connected);
        Self {
            scratch_dir: scratch_dir.into(),
            generation: Arc::new(Mutex::new(0)),
            stdin: Arc::new(Mutex::new(None)),
            run_slot: Arc::new(Mutex::new(())),
            event_tx,
            event_rx,
        }
    }

    fn start_run(&self, code: String, language: Language) {
        let generation = {
            let mut current = self
                .generation
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            *current += 1;
            if let Ok(mut guard) = self.stdin.lock() {
                *guard = None;
            }
            self.discard_queued_run_events();
            *current
        };
        let ctx = RunContext {
            generation,
            current: self.generation.clone(),
            stdin: self.stdin.clone(),
            tx: self.event_tx.clone(),
        };
        let scratch_dir = self.scratch_dir.clone();
        let run_slot = self.run_slot.clone();
        thread::spawn(move || {
            // Runs share the scratch files, so one run owns them at a time.
            let _slot = run_slot.lock().unwrap_or_else(PoisonError::into_inner);
            if !ctx.is_current() {
                tracing::info!(generation, "run superseded before it started");
                return;
            }
            tracing::info!(generation, %language, "local run started");
            match prepare(&scratch_dir, &code, language) {
                Ok(Prepared::Ready(command)) => execute(command, language, ctx),
                Ok(Prepared::CompileFailed(message)) => {
                    ctx.output(message);
                    ctx.stop(FAILURE_TRAILER, false);
                }
                Ok(Prepared::ToolMissing) => {
                    ctx.output(missing_tool_message(language));
                    ctx.stop("", false);
                }
                Err(err) => {
                    tracing::warn!("failed to prepare {language} run: {err}");
                    ctx.output(format!("Execution Error: {err}"));
                    ctx.stop("", false);
                }
            }
        });
    }

    /// Drops output and stop events the previous run queued before it was
    /// superseded. Connection events stay in order.
    fn discard_queued_run_events(&self) {
        let kept: Vec<ChannelEvent> = self
            .event_rx
            .try_iter()
            .filter(|event| !matches!(event, ChannelEvent::Message(_)))
            .collect();
        for event in kept {
            let _ = self.event_tx.send(event);
        }
    }

    fn forward_input(&self, input: &str) -> io::Result<()> {
        let mut guard = self
            .stdin
            .lock()
            .map_err(|_| io::Error::other("sandbox stdin lock poisoned"))?;
        let Some(stdin) = guard.as_mut() else {
            tracing::debug!("dropping input: no process is running");
            return Ok(());
        };
        stdin.write_all(input.as_bytes())?;
        stdin.write_all(b"\n")?;
        stdin.flush()
    }
}

impl ExecutionChannel for LocalSandbox {
    fn emit(&mut self, message: OutboundMessage) -> io::Result<()> {
        match message {
            OutboundMessage::RunCode { code, language } => {
                self.start_run(code, language);
                Ok(())
            }
            OutboundMessage::SendInput { input } => self.forward_input(&input),
        }
    }

    fn drain_events_limited(&mut self, max_events: usize) -> Vec<ChannelEvent> {
        drain_limited(&self.event_rx, max_events)
    }
}

#[derive(Debug)]
enum Prepared {
    Ready(Command),
    CompileFailed(String),
    ToolMissing,
}

struct RunContext {
    generation: u64,
    current: Arc<Mutex<u64>>,
    stdin: Arc<Mutex<Option<ChildStdin>>>,
    tx: Sender<ChannelEvent>,
}

impl RunContext {
    /// A newer run supersedes this one; its events are dropped.
    fn is_current(&self) -> bool {
        self.current
            .lock()
            .is_ok_and(|current| *current == self.generation)
    }

    /// Runs `f` while holding the generation lock, so a newer run cannot
    /// start between the check and whatever `f` sends.
    fn while_current(&self, f: impl FnOnce()) {
        let current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if *current == self.generation {
            f();
        }
    }

    fn output(&self, data: impl Into<String>) {
        self.while_current(|| {
            let _ = self.tx.send(ChannelEvent::Message(InboundMessage::TermOutput {
                data: data.into(),
            }));
        });
    }

    fn stop(&self, data: &str, success: bool) {
        self.while_current(|| {
            if let Ok(mut guard) = self.stdin.lock() {
                *guard = None;
            }
            let _ = self.tx.send(ChannelEvent::Message(InboundMessage::TermStop {
                data: data.to_string(),
                success,
            }));
        });
    }
}

pub fn missing_tool_message(language: Language) -> String {
    format!("Error: Compiler/interpreter for '{language}' not found in PATH.")
}

fn binary_name(stem: &str) -> String {
    if cfg!(windows) {
        format!("{stem}.exe")
    } else {
        stem.to_string()
    }
}

fn python_program() -> &'static str {
    if cfg!(windows) { "python" } else { "python3" }
}

fn interpreter(program: &str, args: &[&str], source: &Path) -> Prepared {
    let mut command = Command::new(program);
    command.args(args).arg(source);
    Prepared::Ready(command)
}

/// Writes the source file and compiles it when the language needs a build
/// step.
fn prepare(dir: &Path, code: &str, language: Language) -> io::Result<Prepared> {
    fs::create_dir_all(dir)?;
    let source = dir.join(language.source_file_name());
    fs::write(&source, code)?;

    let prepared = match language {
        Language::Python => interpreter(python_program(), &["-u"], &source),
        Language::Javascript => interpreter("node", &[], &source),
        Language::Lua => interpreter("lua", &[], &source),
        Language::Bash => interpreter("bash", &[], &source),
        Language::Go => interpreter("go", &["run"], &source),
        Language::Zig => interpreter("zig", &["run"], &source),
        Language::Scala => interpreter("scala", &[], &source),
        Language::Sql => {
            let mut command = Command::new("sqlite3");
            command
                .args(["-bail", ":memory:"])
                .arg(format!(".read {}", source.display()));
            Prepared::Ready(command)
        }
        Language::Cpp | Language::Rust => {
            let exe = dir.join(binary_name("main"));
            let compiler = if language == Language::Cpp { "g++" } else { "rustc" };
            let mut build = Command::new(compiler);
            build.arg(&source).arg("-o").arg(&exe);
            compile(build, CompilerStream::Stderr, Command::new(&exe))?
        }
        Language::Csharp => {
            let exe = dir.join("Program.exe");
            let mut build = Command::new("csc");
            build.arg(format!("/out:{}", exe.display())).arg(&source);
            compile(build, CompilerStream::Stdout, Command::new(&exe))?
        }
        Language::Java => {
            let mut build = Command::new("javac");
            build.arg(&source);
            let mut run = Command::new("java");
            run.arg("-cp").arg(dir).arg("Main");
            compile(build, CompilerStream::Stderr, run)?
        }
    };
    Ok(prepared)
}

#[derive(Debug, Clone, Copy)]
enum CompilerStream {
    Stdout,
    Stderr,
}

fn compile(mut compiler: Command, report: CompilerStream, run: Command) -> io::Result<Prepared> {
    let output = match compiler.output() {
        Ok(output) => output,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Prepared::ToolMissing),
        Err(err) => return Err(err),
    };
    if output.status.success() {
        return Ok(Prepared::Ready(run));
    }
    let diagnostics = match report {
        CompilerStream::Stdout => output.stdout,
        CompilerStream::Stderr => output.stderr,
    };
    Ok(Prepared::CompileFailed(format!(
        "Compilation Error:\n{}",
        String::from_utf8_lossy(&diagnostics)
    )))
}

fn execute(mut command: Command, language: Language, ctx: RunContext) {
    command
        .env("PYTHONIOENCODING", "utf-8")
        .env("PYTHONUNBUFFERED", "1")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            ctx.output(missing_tool_message(language));
            ctx.stop("", false);
            return;
        }
        Err(err) => {
            ctx.output(format!("Execution Error: {err}"));
            ctx.stop("", false);
            return;
        }
    };

    if let Some(stdin) = child.stdin.take() {
        ctx.while_current(|| {
            if let Ok(mut guard) = ctx.stdin.lock() {
                *guard = Some(stdin);
            }
        });
    }

    let ctx = Arc::new(ctx);
    let wrote_stderr = Arc::new(AtomicBool::new(false));
    let mut readers = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        readers.push(spawn_reader(stdout, ctx.clone(), None));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(spawn_reader(stderr, ctx.clone(), Some(wrote_stderr.clone())));
    }

    let status = wait_while_current(&mut child, &ctx);
    for reader in readers {
        let _ = reader.join();
    }
    match status {
        Some(Ok(status)) => {
            let success = status.success() && !wrote_stderr.load(Ordering::SeqCst);
            tracing::info!(generation = ctx.generation, code = ?status.code(), success, "local run finished");
            ctx.stop(if success { SUCCESS_TRAILER } else { FAILURE_TRAILER }, success);
        }
        Some(Err(err)) => {
            tracing::warn!("waiting for {language} process failed: {err}");
            ctx.output(format!("Execution Error: {err}"));
            ctx.stop(FAILURE_TRAILER, false);
        }
        None => tracing::info!(generation = ctx.generation, "superseded run killed"),
    }
}

/// Polls the child until it exits, killing it if a newer run starts first.
fn wait_while_current(
    child: &mut Child,
    ctx: &RunContext,
) -> Option<io::Result<std::process::ExitStatus>> {
    loop {
        if !ctx.is_current() {
            let _ = child.kill();
            let _ = child.wait();
            return None;
        }
        match child.try_wait() {
            Ok(Some(status)) => return Some(Ok(status)),
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(err) => return Some(Err(err)),
        }
    }
}

fn spawn_reader<R: Read + Send + 'static>(
    mut reader: R,
    ctx: Arc<RunContext>,
    saw_output: Option<Arc<AtomicBool>>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut buf = [0u8; READ_CHUNK];
        let mut carry = Vec::new();
        loop {
            let read = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(read) => read,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            };
            if let Some(flag) = &saw_output {
                flag.store(true, Ordering::SeqCst);
            }
            let text = decode_chunk(&mut carry, &buf[..read]);
            if !text.is_empty() {
                ctx.output(text);
            }
        }
        if !carry.is_empty() {
            ctx.output(String::from_utf8_lossy(&carry).into_owned());
        }
    })
}

/// Decodes as much of `carry + bytes` as forms complete UTF-8, keeping an
/// unfinished trailing sequence for the next read.
fn decode_chunk(carry: &mut Vec<u8>, bytes: &[u8]) -> String {
    carry.extend_from_slice(bytes);
    match std::str::from_utf8(carry) {
        Ok(text) => {
            let text = text.to_string();
            carry.clear();
            text
        }
        Err(err) if err.error_len().is_none() => {
            let rest = carry.split_off(err.valid_up_to());
            let text = String::from_utf8_lossy(carry).into_owned();
            *carry = rest;
            text
        }
        Err(_) => {
            let text = String::from_utf8_lossy(carry).into_owned();
            carry.clear();
            text
        }
    }
}

#[cfg(test)]
#[path = "../tests/unit/sandbox_tests.rs"]
mod tests;
