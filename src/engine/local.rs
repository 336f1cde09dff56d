//! engine::local
//!
//! Engines that drive an OCI runtime binary on this host.
//!
//! # Design
//!
//! The container engine shells out to the configured runtime (`crun` by
//! default) with `--root <state root>`:
//!
//! - `state <id>` checks that a container exists before exec
//! - `list --format json` finds the newest running container for `--latest`
//! - `exec [flags] <id> <cmd>...` runs the command with inherited stdio
//!
//! The runtime's exit status is the command's exit status. A runtime that
//! cannot be spawned is an OCI runtime failure whose kind picks the exit
//! code (127 when missing, 126 when not executable).
//!
//! # Locking
//!
//! Each container engine holds a shared lock on `<state root>/berth.lock`
//! from creation until shutdown, so maintenance tools can take the lock
//! exclusively to wait for running commands.

use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::Deserialize;
use tokio::process::Command;

use super::{
    ContainerEngine, EngineError, EngineInfo, EngineMode, EngineOptions, ExecOptions, ExecReport,
    ImageEngine, OciFailure,
};
use crate::core::parallel;

/// Lock file name inside the state root.
pub const LOCK_FILE: &str = "berth.lock";

/// How long to wait for the state lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Capabilities granted by `--privileged`.
pub const ALL_CAPABILITIES: &[&str] = &[
    "CAP_AUDIT_CONTROL",
    "CAP_AUDIT_READ",
    "CAP_AUDIT_WRITE",
    "CAP_BLOCK_SUSPEND",
    "CAP_BPF",
    "CAP_CHECKPOINT_RESTORE",
    "CAP_CHOWN",
    "CAP_DAC_OVERRIDE",
    "CAP_DAC_READ_SEARCH",
    "CAP_FOWNER",
    "CAP_FSETID",
    "CAP_IPC_LOCK",
    "CAP_IPC_OWNER",
    "CAP_KILL",
    "CAP_LEASE",
    "CAP_LINUX_IMMUTABLE",
    "CAP_MAC_ADMIN",
    "CAP_MAC_OVERRIDE",
    "CAP_MKNOD",
    "CAP_NET_ADMIN",
    "CAP_NET_BIND_SERVICE",
    "CAP_NET_BROADCAST",
    "CAP_NET_RAW",
    "CAP_PERFMON",
    "CAP_SETFCAP",
    "CAP_SETGID",
    "CAP_SETPCAP",
    "CAP_SETUID",
    "CAP_SYSLOG",
    "CAP_SYS_ADMIN",
    "CAP_SYS_BOOT",
    "CAP_SYS_CHROOT",
    "CAP_SYS_MODULE",
    "CAP_SYS_NICE",
    "CAP_SYS_PACCT",
    "CAP_SYS_PTRACE",
    "CAP_SYS_RAWIO",
    "CAP_SYS_RESOURCE",
    "CAP_SYS_TIME",
    "CAP_SYS_TTY_CONFIG",
    "CAP_WAKE_ALARM",
];

/// A shared lock on the state root, released on drop.
#[derive(Debug)]
pub struct StateLock {
    path: PathBuf,
    file: Option<File>,
}

impl StateLock {
    /// Take a shared lock, waiting up to `timeout` for an exclusive holder.
    pub async fn acquire_shared(state_root: &Path, timeout: Duration) -> Result<Self, EngineError> {
        fs::create_dir_all(state_root).map_err(|e| EngineError::Io {
            context: format!("cannot create state root {}", state_root.display()),
            source: e,
        })?;

        let path = state_root.join(LOCK_FILE);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| EngineError::Io {
                context: format!("cannot open {}", path.display()),
                source: e,
            })?;

        let deadline = Instant::now() + timeout;
        loop {
            match FileExt::try_lock_shared(&file) {
                Ok(()) => {
                    return Ok(Self {
                        path,
                        file: Some(file),
                    })
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Err(EngineError::Setup(format!(
                            "timed out waiting for {}",
                            path.display()
                        )));
                    }
                    tokio::time::sleep(LOCK_POLL_INTERVAL).await;
                }
                Err(e) => {
                    return Err(EngineError::Io {
                        context: format!("cannot lock {}", path.display()),
                        source: e,
                    })
                }
            }
        }
    }

    /// Whether the lock is still held.
    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock early.
    pub fn release(&mut self) -> Result<(), EngineError> {
        if let Some(file) = self.file.take() {
            FileExt::unlock(&file).map_err(|e| EngineError::Io {
                context: format!("cannot unlock {}", self.path.display()),
                source: e,
            })?;
        }
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = FileExt::unlock(&file);
        }
    }
}

/// A container as reported by `<runtime> list --format json`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RuntimeContainer {
    pub id: String,
    pub status: String,
    pub created: DateTime<Utc>,
}

/// The newest running container, if any.
pub fn pick_latest(containers: Vec<RuntimeContainer>) -> Option<RuntimeContainer> {
    containers
        .into_iter()
        .filter(|c| c.status == "running")
        .max_by_key(|c| c.created)
}

/// Runtime arguments for one exec, after the global `--root` flag.
pub fn exec_args(id: &str, options: &ExecOptions) -> Vec<String> {
    let mut args = vec!["exec".to_string()];

    if options.tty {
        args.push("--tty".to_string());
    }
    for entry in &options.env {
        args.push("--env".to_string());
        args.push(entry.clone());
    }
    if let Some(dir) = &options.workdir {
        args.push("--cwd".to_string());
        args.push(dir.clone());
    }
    if let Some(user) = &options.user {
        args.push("--user".to_string());
        args.push(user.clone());
    }
    if options.preserve_fds > 0 {
        args.push(format!("--preserve-fds={}", options.preserve_fds));
    }
    if options.privileged {
        for cap in ALL_CAPABILITIES {
            args.push("--cap".to_string());
            args.push((*cap).to_string());
        }
    }

    args.push(id.to_string());
    args.extend(options.cmd.iter().cloned());
    args
}

/// Descriptors open in this process.
///
/// Call this before the process opens files of its own, so the result
/// reflects what the caller passed in.
pub fn open_fds() -> Result<BTreeSet<u32>, EngineError> {
    let mut listed = BTreeSet::new();
    let entries = fs::read_dir("/proc/self/fd").map_err(|e| EngineError::Io {
        context: "unable to read /proc/self/fd".to_string(),
        source: e,
    })?;
    for entry in entries {
        let entry = entry.map_err(|e| EngineError::Io {
            context: "unable to read /proc/self/fd".to_string(),
            source: e,
        })?;
        let name = entry.file_name();
        let fd = name
            .to_str()
            .and_then(|n| n.parse::<u32>().ok())
            .ok_or_else(|| {
                EngineError::Setup(format!(
                    "cannot parse {} in /proc/self/fd",
                    name.to_string_lossy()
                ))
            })?;
        listed.insert(fd);
    }

    // The listing includes the descriptor that read it, closed by now.
    Ok(listed.into_iter().filter(|fd| fd_is_open(*fd)).collect())
}

#[cfg(unix)]
fn fd_is_open(fd: u32) -> bool {
    use nix::fcntl::{fcntl, FcntlArg};

    i32::try_from(fd)
        .map(|fd| fcntl(fd, FcntlArg::F_GETFD).is_ok())
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn fd_is_open(_fd: u32) -> bool {
    true
}

/// Check that every descriptor in 3..3+n is in `open`.
pub fn check_preserve_fds(open: &BTreeSet<u32>, n: u32) -> Result<(), EngineError> {
    match (3..n.saturating_add(3)).find(|fd| !open.contains(fd)) {
        Some(fd) => {
            tracing::debug!("--preserve-fds={}: descriptor {} is not open", n, fd);
            Err(EngineError::InvalidPreserveFds(n))
        }
        None => Ok(()),
    }
}

fn spawn_error(runtime: &str, e: io::Error) -> EngineError {
    let kind = match e.kind() {
        io::ErrorKind::NotFound => OciFailure::NotFound,
        io::ErrorKind::PermissionDenied => OciFailure::PermissionDenied,
        _ => OciFailure::Generic,
    };
    EngineError::oci(kind, format!("{}: {}", runtime, e))
}

fn stderr_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

/// Container engine backed by an OCI runtime binary.
#[derive(Debug)]
pub struct LocalContainerEngine {
    runtime: String,
    state_root: PathBuf,
    inherited_fds: BTreeSet<u32>,
    lock: Mutex<Option<StateLock>>,
}

impl LocalContainerEngine {
    /// Create the engine and take the state lock.
    pub async fn new(options: &EngineOptions) -> Result<Self, EngineError> {
        let lock = StateLock::acquire_shared(&options.state_root, DEFAULT_LOCK_TIMEOUT).await?;
        tracing::debug!(
            "local container engine using {} at {}",
            options.runtime,
            options.state_root.display()
        );
        Ok(Self {
            runtime: options.runtime.clone(),
            state_root: options.state_root.clone(),
            inherited_fds: options.inherited_fds.clone(),
            lock: Mutex::new(Some(lock)),
        })
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.runtime);
        cmd.arg("--root").arg(&self.state_root);
        cmd
    }

    async fn query(&self, args: &[&str]) -> Result<Output, EngineError> {
        tracing::debug!("running {} {}", self.runtime, args.join(" "));
        self.command()
            .args(args)
            .output()
            .await
            .map_err(|e| spawn_error(&self.runtime, e))
    }

    /// Fail with `NoSuchContainer` unless the runtime knows `id`.
    async fn ensure_exists(&self, id: &str) -> Result<(), EngineError> {
        let output = self.query(&["state", id]).await?;
        if output.status.success() {
            Ok(())
        } else {
            tracing::debug!("{} state {}: {}", self.runtime, id, stderr_text(&output));
            Err(EngineError::NoSuchContainer(id.to_string()))
        }
    }

    /// ID of the newest running container.
    async fn latest(&self) -> Result<String, EngineError> {
        let output = self.query(&["list", "--format", "json"]).await?;
        if !output.status.success() {
            return Err(EngineError::oci(OciFailure::Generic, stderr_text(&output)));
        }

        // An empty state root prints nothing rather than `[]`.
        let containers: Vec<RuntimeContainer> = if output.stdout.iter().all(u8::is_ascii_whitespace) {
            Vec::new()
        } else {
            serde_json::from_slice(&output.stdout).map_err(|e| {
                EngineError::oci(
                    OciFailure::Generic,
                    format!("parsing {} list output: {}", self.runtime, e),
                )
            })?
        };

        pick_latest(containers)
            .map(|c| c.id)
            .ok_or(EngineError::NoLatestContainer)
    }
}

#[async_trait]
impl ContainerEngine for LocalContainerEngine {
    fn info(&self) -> EngineInfo {
        EngineInfo {
            mode: EngineMode::Local,
            endpoint: format!("{} (root {})", self.runtime, self.state_root.display()),
        }
    }

    async fn exec(
        &self,
        name_or_id: Option<&str>,
        options: &ExecOptions,
    ) -> Result<ExecReport, EngineError> {
        if options.preserve_fds > 0 {
            check_preserve_fds(&self.inherited_fds, options.preserve_fds)?;
        }

        let id = match name_or_id {
            Some(id) if !options.latest => {
                self.ensure_exists(id).await?;
                id.to_string()
            }
            _ => self.latest().await?,
        };

        let _permit = match parallel::global() {
            Some(pool) => Some(
                pool.acquire()
                    .await
                    .map_err(|e| EngineError::Setup(e.to_string()))?,
            ),
            None => None,
        };

        let args = exec_args(&id, options);
        tracing::debug!("running {} {}", self.runtime, args.join(" "));
        let status = self
            .command()
            .args(&args)
            .status()
            .await
            .map_err(|e| spawn_error(&self.runtime, e))?;

        match status.code() {
            Some(exit_code) => Ok(ExecReport { exit_code }),
            None => Err(EngineError::oci(
                OciFailure::Generic,
                format!("{} exec in {} terminated by signal", self.runtime, id),
            )),
        }
    }

    async fn setup_rootless(&self, no_move_process: bool) -> Result<(), EngineError> {
        fs::create_dir_all(&self.state_root).map_err(|e| EngineError::Io {
            context: format!("cannot create state root {}", self.state_root.display()),
            source: e,
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.state_root, fs::Permissions::from_mode(0o700)).map_err(
                |e| EngineError::Io {
                    context: format!("cannot restrict {}", self.state_root.display()),
                    source: e,
                },
            )?;
        }

        if no_move_process {
            tracing::debug!("rootless setup: staying in the current scope");
        }
        Ok(())
    }

    async fn shutdown(&self, force: bool) -> Result<(), EngineError> {
        tracing::debug!("shutting down local container engine (force={})", force);
        let lock = self
            .lock
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        match lock {
            Some(mut lock) => lock.release(),
            None => Ok(()),
        }
    }
}

/// Image engine for local mode.
///
/// Holds no resources of its own; it exists so that the lifecycle treats
/// both modes the same way.
#[derive(Debug, Clone)]
pub struct LocalImageEngine {
    runtime: String,
    state_root: PathBuf,
}

impl LocalImageEngine {
    /// Create the engine.
    pub fn new(options: &EngineOptions) -> Result<Self, EngineError> {
        Ok(Self {
            runtime: options.runtime.clone(),
            state_root: options.state_root.clone(),
        })
    }
}

#[async_trait]
impl ImageEngine for LocalImageEngine {
    fn info(&self) -> EngineInfo {
        EngineInfo {
            mode: EngineMode::Local,
            endpoint: format!("{} (root {})", self.runtime, self.state_root.display()),
        }
    }

    async fn shutdown(&self, force: bool) -> Result<(), EngineError> {
        tracing::debug!("shutting down local image engine (force={})", force);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn options(root: &Path, runtime: &str) -> EngineOptions {
        EngineOptions {
            command: "exec".to_string(),
            args: vec![],
            mode: EngineMode::Local,
            uri: String::new(),
            identity: String::new(),
            runtime: runtime.to_string(),
            state_root: root.to_path_buf(),
            inherited_fds: BTreeSet::new(),
        }
    }

    fn container(id: &str, status: &str, created: &str) -> RuntimeContainer {
        RuntimeContainer {
            id: id.to_string(),
            status: status.to_string(),
            created: created.parse().unwrap(),
        }
    }

    #[test]
    fn exec_args_carry_every_option() {
        let options = ExecOptions {
            cmd: vec!["ls".into(), "-l".into()],
            env: vec!["A=1".into()],
            tty: true,
            user: Some("1000".into()),
            workdir: Some("/srv".into()),
            preserve_fds: 2,
            ..ExecOptions::default()
        };

        let args = exec_args("web", &options);
        assert_eq!(
            args,
            vec![
                "exec", "--tty", "--env", "A=1", "--cwd", "/srv", "--user", "1000",
                "--preserve-fds=2", "web", "ls", "-l"
            ]
        );
    }

    #[test]
    fn privileged_grants_all_capabilities() {
        let options = ExecOptions {
            cmd: vec!["true".into()],
            privileged: true,
            ..ExecOptions::default()
        };
        let args = exec_args("web", &options);
        let caps = args.iter().filter(|a| *a == "--cap").count();
        assert_eq!(caps, ALL_CAPABILITIES.len());
        assert!(args.contains(&"CAP_SYS_ADMIN".to_string()));
    }

    #[test]
    fn latest_is_newest_running() {
        let picked = pick_latest(vec![
            container("old", "running", "2024-01-01T00:00:00Z"),
            container("stopped", "stopped", "2024-06-01T00:00:00Z"),
            container("new", "running", "2024-03-01T00:00:00.5Z"),
        ]);
        assert_eq!(picked.map(|c| c.id).as_deref(), Some("new"));
        assert!(pick_latest(vec![container("x", "created", "2024-01-01T00:00:00Z")]).is_none());
    }

    #[test]
    fn runtime_list_output_parses() {
        let json = r#"[{"id":"abc","pid":42,"status":"running","bundle":"/b","created":"2024-02-03T04:05:06.123456789Z","owner":"root"}]"#;
        let parsed: Vec<RuntimeContainer> = serde_json::from_str(json).unwrap();
        assert_eq!(parsed[0].id, "abc");
    }

    #[test]
    fn preserved_fds_must_all_be_open() {
        let open: BTreeSet<u32> = [0, 1, 2, 3, 4, 5].into_iter().collect();
        check_preserve_fds(&open, 3).unwrap();
        check_preserve_fds(&BTreeSet::new(), 0).unwrap();

        let gap: BTreeSet<u32> = [0, 1, 2, 3, 5, 6, 7].into_iter().collect();
        let err = check_preserve_fds(&gap, 3).unwrap_err();
        assert!(matches!(err, EngineError::InvalidPreserveFds(3)));
        assert!(err.to_string().contains("Not enough FDs available"));

        // Only the standard streams: nothing to preserve.
        let stdio: BTreeSet<u32> = [0, 1, 2].into_iter().collect();
        assert!(check_preserve_fds(&stdio, 1).is_err());
        assert!(check_preserve_fds(&stdio, u32::MAX).is_err());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn open_fds_sees_open_files() {
        use std::os::unix::io::AsRawFd;

        let dir = TempDir::new().unwrap();
        let file = File::create(dir.path().join("held")).unwrap();
        let fd = u32::try_from(file.as_raw_fd()).unwrap();

        let open = open_fds().unwrap();
        assert!(open.contains(&fd));
        assert!(open.contains(&0));
    }

    #[tokio::test]
    async fn exec_rejects_unopened_preserved_fds() {
        let dir = TempDir::new().unwrap();
        let mut opts = options(dir.path(), "/nonexistent/berth-runtime");
        opts.inherited_fds = [0, 1, 2].into_iter().collect();
        let engine = LocalContainerEngine::new(&opts).await.unwrap();

        let err = engine
            .exec(
                Some("web"),
                &ExecOptions {
                    cmd: vec!["ls".into()],
                    preserve_fds: 3,
                    ..ExecOptions::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidPreserveFds(3)));
    }

    #[tokio::test]
    async fn state_lock_is_shared() {
        let dir = TempDir::new().unwrap();
        let mut a = StateLock::acquire_shared(dir.path(), Duration::from_millis(200))
            .await
            .unwrap();
        let b = StateLock::acquire_shared(dir.path(), Duration::from_millis(200))
            .await
            .unwrap();
        assert!(a.is_held() && b.is_held());
        assert!(a.path().ends_with(LOCK_FILE));

        a.release().unwrap();
        assert!(!a.is_held());
    }

    #[tokio::test]
    async fn exclusive_holder_blocks_engine_creation() {
        let dir = TempDir::new().unwrap();
        let holder = File::create(dir.path().join(LOCK_FILE)).unwrap();
        FileExt::lock_exclusive(&holder).unwrap();

        let result = StateLock::acquire_shared(dir.path(), Duration::from_millis(150)).await;
        assert!(matches!(result, Err(EngineError::Setup(_))));
    }

    #[tokio::test]
    async fn missing_runtime_is_not_found() {
        let dir = TempDir::new().unwrap();
        let engine =
            LocalContainerEngine::new(&options(dir.path(), "/nonexistent/berth-runtime"))
                .await
                .unwrap();

        let err = engine
            .exec(Some("web"), &ExecOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), crate::engine::EXEC_ERROR_NOT_FOUND);

        engine.shutdown(false).await.unwrap();
        engine.shutdown(false).await.unwrap();
    }

    #[tokio::test]
    async fn rootless_setup_restricts_state_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("state");
        let engine = LocalContainerEngine::new(&options(&root, "crun")).await.unwrap();

        engine.setup_rootless(true).await.unwrap();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&root).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o700);
        }
    }
}
