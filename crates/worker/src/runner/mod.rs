//! # 外部进程执行
//!
//! [`ShellRunner`] 把作业脚本写入临时文件，交给解释器执行，边执行边收集输出。
//!
//! ```text
//! NotStart → Running → Success / Failed / Killed
//! ```
//!
//! 状态只会单向流转，终态之间先到先得。

pub mod path;

pub use path::{NativePath, PathAdapter, WslPath};

use std::io::Write;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use orchestra_core::config::models::RunnerConfig;
use orchestra_core::{Entity, JobStatus, SchedulerError, SchedulerResult};
use tempfile::NamedTempFile;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};

/// 执行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunnerStatus {
    NotStart,
    Running,
    Success,
    Failed,
    Killed,
}

impl RunnerStatus {
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            RunnerStatus::Success | RunnerStatus::Failed | RunnerStatus::Killed
        )
    }

    /// 对应的作业状态
    pub fn job_status(&self) -> JobStatus {
        match self {
            RunnerStatus::NotStart => JobStatus::Init,
            RunnerStatus::Running => JobStatus::Running,
            RunnerStatus::Success => JobStatus::Success,
            RunnerStatus::Failed => JobStatus::Failed,
            RunnerStatus::Killed => JobStatus::Killed,
        }
    }
}

/// 进程退出后等待管道读尽的最长时间
const DRAIN_GRACE: Duration = Duration::from_millis(300);

#[derive(Debug)]
struct RunnerState {
    status: RunnerStatus,
    output: String,
    /// 是否继续追加输出，被 kill 或收集结束后关闭
    accepting: bool,
}

type SharedState = Arc<Mutex<RunnerState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, RunnerState> {
    // 锁内只有赋值与追加，被毒化时沿用其中的数据
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Shell 脚本执行器
///
/// 调用形式为 `<interpreter> <script> <args...> <k1> <v1> <k2> <v2>...`，
/// stdout 与 stderr 边产生边合并到同一份输出中。
pub struct ShellRunner {
    code: String,
    args: Vec<String>,
    kv_args: Vec<(String, String)>,
    interpreter: String,
    path_adapter: Arc<dyn PathAdapter>,
    state: SharedState,
    kill_signal: Arc<Notify>,
    done_tx: Arc<watch::Sender<bool>>,
}

impl ShellRunner {
    pub fn new<S: Into<String>>(code: S) -> Self {
        let (done_tx, _) = watch::channel(false);
        Self {
            code: code.into(),
            args: Vec::new(),
            kv_args: Vec::new(),
            interpreter: "bash".to_string(),
            path_adapter: Arc::new(NativePath),
            state: Arc::new(Mutex::new(RunnerState {
                status: RunnerStatus::NotStart,
                output: String::new(),
                accepting: false,
            })),
            kill_signal: Arc::new(Notify::new()),
            done_tx: Arc::new(done_tx),
        }
    }

    /// 按配置选择解释器与路径转换
    pub fn from_config<S: Into<String>>(code: S, config: &RunnerConfig) -> Self {
        let runner = Self::new(code).interpreter(config.shell.clone());
        if config.translate_windows_paths {
            runner.path_adapter(Arc::new(WslPath))
        } else {
            runner
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// 追加一个键值参数，按追加顺序传给脚本
    pub fn kv_arg<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.kv_args.push((key.into(), value.into()));
        self
    }

    pub fn interpreter<S: Into<String>>(mut self, interpreter: S) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    pub fn path_adapter(mut self, adapter: Arc<dyn PathAdapter>) -> Self {
        self.path_adapter = adapter;
        self
    }

    pub fn status(&self) -> RunnerStatus {
        lock(&self.state).status
    }

    /// 当前已收集的输出
    pub fn output(&self) -> String {
        lock(&self.state).output.clone()
    }

    /// 启动进程后立即返回，必须在 tokio 运行时中调用
    ///
    /// 重复启动返回 `OperationNotAllowed`。进程无法启动时状态为 Failed，错误信息写入输出。
    pub fn start(&self) -> SchedulerResult<()> {
        {
            let mut state = lock(&self.state);
            if state.status != RunnerStatus::NotStart {
                return Err(SchedulerError::not_allowed(
                    Entity::Instance,
                    None,
                    format!("runner 已经启动过，当前状态 {:?}", state.status),
                ));
            }
            state.status = RunnerStatus::Running;
            state.accepting = true;
        }

        match self.spawn() {
            Ok((child, script)) => {
                info!(pid = ?child.id(), interpreter = %self.interpreter, "脚本开始执行");
                tokio::spawn(supervise(
                    child,
                    script,
                    Arc::clone(&self.state),
                    Arc::clone(&self.kill_signal),
                    Arc::clone(&self.done_tx),
                ));
            }
            Err(e) => {
                warn!(interpreter = %self.interpreter, error = %e, "脚本启动失败");
                let mut state = lock(&self.state);
                if state.status == RunnerStatus::Running {
                    state.status = RunnerStatus::Failed;
                }
                state.accepting = false;
                state.output.push_str(&e.to_string());
                state.output.push('\n');
                drop(state);
                self.done_tx.send_replace(true);
            }
        }
        Ok(())
    }

    /// 等待执行结束，未启动时立即返回
    pub async fn join(&self) {
        if self.status() == RunnerStatus::NotStart {
            return;
        }
        let mut done_rx = self.done_tx.subscribe();
        let _ = done_rx.wait_for(|done| *done).await;
    }

    pub async fn start_and_join(&self) -> SchedulerResult<RunnerStatus> {
        self.start()?;
        self.join().await;
        Ok(self.status())
    }

    /// 强制结束进程，此后的输出会被丢弃
    pub fn kill(&self) {
        let mut state = lock(&self.state);
        match state.status {
            RunnerStatus::NotStart => {
                warn!("runner 尚未启动，忽略 kill");
            }
            RunnerStatus::Running => {
                state.status = RunnerStatus::Killed;
                state.accepting = false;
                drop(state);
                self.kill_signal.notify_one();
                info!("runner 已标记为 Killed");
            }
            status => {
                debug!(?status, "runner 已结束，忽略 kill");
            }
        }
    }

    fn spawn(&self) -> std::io::Result<(Child, NamedTempFile)> {
        let mut script = tempfile::Builder::new()
            .prefix("orchestra-")
            .suffix(".sh")
            .tempfile()?;
        script.write_all(self.code.as_bytes())?;
        script.flush()?;

        let mut command = Command::new(&self.interpreter);
        command.arg(self.path_adapter.adapt(script.path()));
        command.args(&self.args);
        for (key, value) in &self.kv_args {
            command.arg(key).arg(value);
        }
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command.spawn()?;
        Ok((child, script))
    }
}

async fn supervise(
    mut child: Child,
    script: NamedTempFile,
    state: SharedState,
    kill_signal: Arc<Notify>,
    done_tx: Arc<watch::Sender<bool>>,
) {
    let mut stdout_reader = tokio::spawn(collect(child.stdout.take(), Arc::clone(&state)));
    let mut stderr_reader = tokio::spawn(collect(child.stderr.take(), Arc::clone(&state)));

    tokio::select! {
        exit = child.wait() => {
            {
                let mut state = lock(&state);
                if state.status == RunnerStatus::Running {
                    let status = match exit {
                        Ok(exit) if exit.success() => RunnerStatus::Success,
                        Ok(exit) => {
                            debug!(code = ?exit.code(), "脚本以非零状态退出");
                            RunnerStatus::Failed
                        }
                        Err(e) => {
                            state.output.push_str(&format!("{e}\n"));
                            RunnerStatus::Failed
                        }
                    };
                    state.status = status;
                }
                info!(status = ?state.status, "脚本执行结束");
            }

            // 后台进程可能继续持有管道，剩余输出最多再等待 DRAIN_GRACE
            let drained = tokio::time::timeout(DRAIN_GRACE, async {
                let _ = (&mut stdout_reader).await;
                let _ = (&mut stderr_reader).await;
            })
            .await;
            if drained.is_err() {
                debug!("输出管道仍被后台进程占用，停止收集");
            }
        }
        _ = kill_signal.notified() => {
            if let Err(e) = child.kill().await {
                warn!(error = %e, "结束进程失败");
            }
            info!("脚本已被强制结束");
        }
    }

    stdout_reader.abort();
    stderr_reader.abort();
    lock(&state).accepting = false;
    drop(script);
    done_tx.send_replace(true);
}

/// 按块读取输出，不完整的 UTF-8 序列留到下一块再解码
async fn collect<R: AsyncRead + Unpin>(reader: Option<R>, state: SharedState) {
    let Some(mut reader) = reader else {
        return;
    };
    let mut chunk = [0u8; 4096];
    let mut pending = Vec::new();
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                pending.extend_from_slice(&chunk[..n]);
                let text = take_decoded(&mut pending);
                let mut state = lock(&state);
                if state.accepting {
                    state.output.push_str(&text);
                }
            }
            Err(e) => {
                warn!(error = %e, "读取脚本输出失败");
                break;
            }
        }
    }
    if !pending.is_empty() {
        let mut state = lock(&state);
        if state.accepting {
            state.output.push_str(&String::from_utf8_lossy(&pending));
        }
    }
}

fn take_decoded(pending: &mut Vec<u8>) -> String {
    let valid = match std::str::from_utf8(pending) {
        Ok(_) => pending.len(),
        // 末尾是被截断的多字节字符
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        Err(_) => {
            let text = String::from_utf8_lossy(pending).into_owned();
            pending.clear();
            return text;
        }
    };
    let rest = pending.split_off(valid);
    let text = String::from_utf8_lossy(pending).into_owned();
    *pending = rest;
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    async fn wait_for_output(runner: &ShellRunner, expected: &str) {
        for _ in 0..200 {
            if runner.output() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("output never became {expected:?}, got {:?}", runner.output());
    }

    #[tokio::test]
    async fn test_streams_output_until_success() {
        let runner = ShellRunner::new("echo hello\nsleep 2\necho world\n");
        assert_eq!(runner.status(), RunnerStatus::NotStart);

        runner.start().unwrap();
        wait_for_output(&runner, "hello\n").await;
        assert_eq!(runner.status(), RunnerStatus::Running);

        runner.join().await;
        assert_eq!(runner.status(), RunnerStatus::Success);
        assert_eq!(runner.output(), "hello\nworld\n");
    }

    #[tokio::test]
    async fn test_unknown_command_fails() {
        let runner = ShellRunner::new("command_not_exists");
        let status = runner.start_and_join().await.unwrap();
        assert_eq!(status, RunnerStatus::Failed);
        assert!(runner
            .output()
            .contains("command_not_exists: command not found"));
    }

    #[tokio::test]
    async fn test_kill_discards_later_output() {
        let runner = ShellRunner::new("echo hello\nsleep 2\necho world\n");
        runner.start().unwrap();
        wait_for_output(&runner, "hello\n").await;

        runner.kill();
        assert_eq!(runner.status(), RunnerStatus::Killed);
        runner.join().await;

        assert_eq!(runner.status(), RunnerStatus::Killed);
        assert!(runner.output().contains("hello\n"));
        assert!(!runner.output().contains("world"));

        // 终态之后的 kill 不改变状态
        runner.kill();
        assert_eq!(runner.status(), RunnerStatus::Killed);
    }

    #[tokio::test]
    async fn test_background_process_does_not_hold_join() {
        let runner = ShellRunner::new("sleep 4 &\necho hi\n");
        let started = Instant::now();
        assert_eq!(
            runner.start_and_join().await.unwrap(),
            RunnerStatus::Success
        );
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(runner.output(), "hi\n");

        // 进程已经结束，kill 不再改变终态
        runner.kill();
        assert_eq!(runner.status(), RunnerStatus::Success);
    }

    #[tokio::test]
    async fn test_partial_line_visible_and_kept_on_kill() {
        let runner = ShellRunner::new("printf hello\nsleep 2\nprintf world\n");
        runner.start().unwrap();
        wait_for_output(&runner, "hello").await;
        assert_eq!(runner.status(), RunnerStatus::Running);

        runner.kill();
        runner.join().await;
        assert_eq!(runner.status(), RunnerStatus::Killed);
        assert_eq!(runner.output(), "hello");
    }

    #[tokio::test]
    async fn test_from_config_uses_configured_shell() {
        let config = RunnerConfig {
            shell: "sh".to_string(),
            translate_windows_paths: false,
        };
        let runner = ShellRunner::from_config("echo \"$1\"\n", &config).arg("via-sh");
        assert_eq!(runner.interpreter, "sh");
        assert_eq!(
            runner.start_and_join().await.unwrap(),
            RunnerStatus::Success
        );
        assert_eq!(runner.output(), "via-sh\n");

        let wsl = ShellRunner::from_config(
            "true",
            &RunnerConfig {
                translate_windows_paths: true,
                ..RunnerConfig::default()
            },
        );
        assert_eq!(wsl.interpreter, "bash");
        assert_eq!(
            wsl.path_adapter.adapt(std::path::Path::new("C:\\tmp\\a.sh")),
            "/mnt/c/tmp/a.sh"
        );
    }

    #[test]
    fn test_decoding_keeps_split_utf8_for_next_chunk() {
        let bytes = "作业".as_bytes();
        let mut pending = bytes[..4].to_vec();
        assert_eq!(take_decoded(&mut pending), "作");
        assert_eq!(pending, bytes[3..4].to_vec());
        pending.extend_from_slice(&bytes[4..]);
        assert_eq!(take_decoded(&mut pending), "业");
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_positional_args() {
        let runner = ShellRunner::new("echo $1\necho $2\n").args(["first", "second"]);
        assert_eq!(
            runner.start_and_join().await.unwrap(),
            RunnerStatus::Success
        );
        assert_eq!(runner.output(), "first\nsecond\n");
    }

    #[tokio::test]
    async fn test_kv_args_keep_order() {
        let runner = ShellRunner::new("echo \"$1 = $2\"\necho \"$3 = $4\"\n")
            .kv_arg("first", "1")
            .kv_arg("second", "2");
        assert_eq!(
            runner.start_and_join().await.unwrap(),
            RunnerStatus::Success
        );
        assert_eq!(runner.output(), "first = 1\nsecond = 2\n");
    }

    #[tokio::test]
    async fn test_start_twice_not_allowed() {
        let runner = ShellRunner::new("exit 3");
        runner.start().unwrap();
        let err = runner.start().unwrap_err();
        assert_eq!(err.kind(), orchestra_core::ErrorKind::OperationNotAllowed);

        runner.join().await;
        assert_eq!(runner.status(), RunnerStatus::Failed);
    }

    #[tokio::test]
    async fn test_missing_interpreter_fails() {
        let runner = ShellRunner::new("echo hi").interpreter("/nonexistent/orchestra-shell");
        assert_eq!(
            runner.start_and_join().await.unwrap(),
            RunnerStatus::Failed
        );
        assert!(!runner.output().is_empty());
    }

    #[tokio::test]
    async fn test_kill_and_join_before_start() {
        let runner = ShellRunner::new("echo hi");
        runner.kill();
        runner.join().await;
        assert_eq!(runner.status(), RunnerStatus::NotStart);
        assert_eq!(runner.output(), "");
    }

    #[test]
    fn test_job_status_mapping() {
        assert_eq!(RunnerStatus::Success.job_status(), JobStatus::Success);
        assert_eq!(RunnerStatus::Killed.job_status(), JobStatus::Killed);
        assert_eq!(RunnerStatus::NotStart.job_status(), JobStatus::Init);
        assert!(!RunnerStatus::Running.is_finished());
        assert!(RunnerStatus::Failed.is_finished());
    }
}
