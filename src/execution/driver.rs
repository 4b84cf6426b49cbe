// Driver - owns the `go test -json` subprocess and pumps its stdout through the aggregator

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::exit::{ExitKind, ExitReport, ProcessExit, classify};
use crate::aggregator::{Aggregator, RunSummary};
use crate::error::GotallyError;
use crate::event;
use crate::report::Reporter;

/// Reporters shared between the reader loop and the CI ticker
pub type Reporters = Arc<Vec<Box<dyn Reporter>>>;

/// How to launch the event source
#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub program: String,
    pub args: Vec<String>,
    /// Side-channel transcript of every raw stdout line
    pub log_file: PathBuf,
    /// Emit periodic heartbeats and flushes
    pub ci: bool,
    pub flush_interval: Duration,
}

impl DriverConfig {
    /// `go test -json <extra args> <packages>`
    pub fn go_test(packages: &[String], extra_args: &[String], log_file: PathBuf) -> Self {
        let mut args = vec!["test".to_string()];
        if !extra_args.iter().any(|a| a == "-json") {
            args.push("-json".to_string());
        }
        args.extend(extra_args.iter().cloned());
        if packages.is_empty() {
            args.push("./...".to_string());
        } else {
            args.extend(packages.iter().cloned());
        }

        Self {
            program: "go".to_string(),
            args,
            log_file,
            ci: false,
            flush_interval: Duration::from_millis(crate::config::default_flush_interval_ms()),
        }
    }

    /// `-run` pattern among the arguments, if any
    pub fn test_filter(&self) -> Option<String> {
        test_filter(&self.args)
    }
}

/// Counters from one pass over an event stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpStats {
    pub lines: usize,
    pub decoded: usize,
}

/// Everything known once the run is over
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub exit: ProcessExit,
    pub summary: RunSummary,
    pub report: ExitReport,
    pub stats: PumpStats,
}

/// Extract the pattern from `-run X`, `-run=X` or `-test.run=X`
pub fn test_filter(args: &[String]) -> Option<String> {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let flag = arg.trim_start_matches('-');
        if !arg.starts_with('-') {
            continue;
        }
        match flag.split_once('=') {
            Some(("run" | "test.run", pattern)) => return Some(pattern.to_string()),
            None if flag == "run" || flag == "test.run" => return iter.next().cloned(),
            _ => {}
        }
    }
    None
}

/// Read lines until EOF. Each raw line is teed to `log` before decoding;
/// finished packages are handed to the reporters after the aggregator lock
/// is released.
pub async fn pump_lines<R, W>(
    mut reader: R,
    log: &mut W,
    aggregator: &Aggregator,
    reporters: &[Box<dyn Reporter>],
) -> Result<PumpStats>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut stats = PumpStats::default();
    let mut buf = Vec::with_capacity(4096);

    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .await
            .map_err(GotallyError::Stream)?;
        if read == 0 {
            break;
        }

        let line = buf.strip_suffix(b"\n").unwrap_or(&buf);
        log.write_all(line).await.map_err(GotallyError::Stream)?;
        log.write_all(b"\n").await.map_err(GotallyError::Stream)?;
        stats.lines += 1;

        let Some(event) = event::decode(line) else {
            continue;
        };
        stats.decoded += 1;

        if let Some(finished) = aggregator.process_event(&event) {
            for reporter in reporters {
                reporter.on_package_complete(&finished)?;
            }
        }
    }

    log.flush().await.map_err(GotallyError::Stream)?;
    debug!("Stream closed after {} lines ({} events)", stats.lines, stats.decoded);
    Ok(stats)
}

/// Spawn the subprocess and drive it to completion
pub async fn run(
    config: &DriverConfig,
    aggregator: Arc<Aggregator>,
    reporters: Reporters,
) -> Result<RunOutcome> {
    let log = File::create(&config.log_file)
        .await
        .map_err(|source| GotallyError::LogFile {
            path: config.log_file.clone(),
            source,
        })?;
    let mut log = BufWriter::new(log);

    info!("Running {} {}", config.program, config.args.join(" "));
    let mut child = Command::new(&config.program)
        .args(&config.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| GotallyError::Spawn {
            program: config.program.clone(),
            source,
        })?;

    let stdout = child.stdout.take().ok_or(GotallyError::MissingStdout)?;
    let stderr_task = child
        .stderr
        .take()
        .map(|stderr| tokio::spawn(drain_stderr(BufReader::new(stderr), tokio::io::stderr())));

    let ticker = config
        .ci
        .then(|| spawn_ticker(aggregator.clone(), reporters.clone(), config.flush_interval));

    let pumped = tokio::select! {
        res = pump_lines(BufReader::new(stdout), &mut log, &aggregator, &reporters) => Some(res),
        () = interrupt_requested(tokio::signal::ctrl_c()) => None,
    };

    let (exit, stats) = match pumped {
        Some(stats) => {
            let stats = match stats {
                Ok(stats) => stats,
                Err(e) => {
                    stop_ticker(ticker);
                    return Err(e);
                }
            };
            let status = child
                .wait()
                .await
                .context("Failed to wait for test process")?;
            let exit = match status.code() {
                Some(code) => ProcessExit::Code(code),
                None => ProcessExit::Signaled,
            };
            (exit, stats)
        }
        None => {
            warn!("Interrupted; stopping test process");
            if let Err(e) = child.kill().await {
                warn!("Failed to kill test process: {}", e);
            }
            if let Err(e) = log.flush().await {
                warn!("Failed to flush {}: {}", config.log_file.display(), e);
            }
            (ProcessExit::Interrupted, PumpStats::default())
        }
    };
    stop_ticker(ticker);
    info!("Test process finished: {:?}", exit);

    let stderr_text = match stderr_task {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    };

    finish(exit, &aggregator, &reporters, &stderr_text, stats)
}

/// Echo the subprocess's stderr to `echo` and capture it as evidence. Bytes
/// are read raw so non-UTF-8 output never closes the pipe before EOF.
pub async fn drain_stderr<R, W>(mut reader: R, mut echo: W) -> String
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut captured = String::new();
    let mut buf = Vec::with_capacity(1024);
    let mut echo_ok = true;

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("Failed to read test process stderr: {}", e);
                break;
            }
        }

        if echo_ok {
            if let Err(e) = echo.write_all(&buf).await {
                debug!("Stopped echoing stderr: {}", e);
                echo_ok = false;
            }
        }
        captured.push_str(&String::from_utf8_lossy(&buf));
    }

    if echo_ok {
        let _ = echo.flush().await;
    }
    captured
}

/// Resolves once `signal` reports an interrupt. A signal source that fails
/// to install never resolves, so the run keeps pumping.
async fn interrupt_requested<F>(signal: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal.await {
        warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Feed a previously written transcript through the same pipeline
pub async fn replay(
    path: &Path,
    aggregator: Arc<Aggregator>,
    reporters: Reporters,
) -> Result<RunOutcome> {
    let file = File::open(path)
        .await
        .with_context(|| format!("Failed to open event log: {}", path.display()))?;

    let mut sink = tokio::io::sink();
    let stats = pump_lines(BufReader::new(file), &mut sink, &aggregator, &reporters).await?;
    finish(ProcessExit::Replayed, &aggregator, &reporters, "", stats)
}

/// End-of-stream reconciliation, exit classification and the final block
fn finish(
    exit: ProcessExit,
    aggregator: &Aggregator,
    reporters: &[Box<dyn Reporter>],
    stderr_text: &str,
    stats: PumpStats,
) -> Result<RunOutcome> {
    for package in aggregator.finalize() {
        for reporter in reporters {
            reporter.on_package_complete(&package)?;
        }
    }

    let summary = aggregator.snapshot();
    let mut evidence = stderr_text.to_string();
    evidence.push_str(&aggregator.failure_evidence());
    let report = classify(exit, &summary, &evidence);

    match report.kind {
        ExitKind::ProcessFailure => warn!("{}", report.reason),
        ExitKind::TestFailures => info!("{}", report.reason),
        _ => debug!("{}", report.reason),
    }

    for reporter in reporters {
        reporter.on_run_end(&summary, &report)?;
    }

    Ok(RunOutcome {
        exit,
        summary,
        report,
        stats,
    })
}

/// Periodic heartbeat for CI logs. Takes the lock only inside `progress()`;
/// writes happen after it is released.
fn spawn_ticker(aggregator: Arc<Aggregator>, reporters: Reporters, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let progress = aggregator.progress();
            for reporter in reporters.iter() {
                if let Err(e) = reporter.on_heartbeat(&progress) {
                    debug!("Heartbeat failed: {:#}", e);
                }
            }
        }
    })
}

fn stop_ticker(ticker: Option<JoinHandle<()>>) {
    if let Some(handle) = ticker {
        handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_go_test_command_defaults() {
        let cfg = DriverConfig::go_test(&[], &[], PathBuf::from("out.json"));
        assert_eq!(cfg.program, "go");
        assert_eq!(cfg.args, strings(&["test", "-json", "./..."]));
        assert!(!cfg.ci);
    }

    #[test]
    fn test_go_test_command_keeps_user_args() {
        let cfg = DriverConfig::go_test(
            &strings(&["./pkg/..."]),
            &strings(&["-json", "-run", "TestA", "-count=1"]),
            PathBuf::from("out.json"),
        );
        assert_eq!(
            cfg.args,
            strings(&["test", "-json", "-run", "TestA", "-count=1", "./pkg/..."])
        );
        assert_eq!(cfg.test_filter().as_deref(), Some("TestA"));
    }

    #[tokio::test]
    async fn test_interrupt_fires_on_signal() {
        let fired = time::timeout(
            Duration::from_millis(200),
            interrupt_requested(async { Ok(()) }),
        )
        .await;
        assert!(fired.is_ok());
    }

    #[tokio::test]
    async fn test_failed_signal_handler_is_not_an_interrupt() {
        // Arrange
        let broken = async { Err(std::io::Error::other("no signal driver")) };

        // Act
        let fired = time::timeout(Duration::from_millis(50), interrupt_requested(broken)).await;

        // Assert
        assert!(fired.is_err());
    }

    #[tokio::test]
    async fn test_drain_stderr_survives_invalid_utf8() {
        // Arrange
        let input: &[u8] = b"\xff\xfe binary\npanic: boom\nlast line without newline";
        let mut echo: Vec<u8> = Vec::new();

        // Act
        let captured = drain_stderr(BufReader::new(input), &mut echo).await;

        // Assert
        assert_eq!(echo, input);
        assert!(captured.contains("panic: boom"));
        assert!(captured.ends_with("last line without newline"));
        assert!(captured.starts_with('\u{FFFD}'));
    }

    #[test]
    fn test_filter_forms() {
        assert_eq!(test_filter(&strings(&["-run=TestX"])).as_deref(), Some("TestX"));
        assert_eq!(test_filter(&strings(&["--run", "TestY"])).as_deref(), Some("TestY"));
        assert_eq!(test_filter(&strings(&["-test.run=TestZ"])).as_deref(), Some("TestZ"));
        assert_eq!(test_filter(&strings(&["-v", "./..."])), None);
        assert_eq!(test_filter(&strings(&["-run"])), None);
    }
}
