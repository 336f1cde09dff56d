//! engine::lifecycle
//!
//! The pre-run / post-run state machine wrapped around every command.
//!
//! # States
//!
//! - **Idle**: no command has started, or the last one finished cleanup
//! - **Armed**: setup began; post-run must release what was acquired
//! - **Skipped**: the command never touches an engine (help, completion,
//!   parent commands); post-run is a no-op
//!
//! # Pre-run
//!
//! For commands that do not skip, in order: connection/context checks,
//! `--max-workers` validation, resource-limit diagnostics, image engine,
//! container engine, engine environment propagation, `TMPDIR` default,
//! worker pool, CPU profiling (local mode only), rootless setup (local,
//! unprivileged, and not annotated `parent_ns_required`).
//!
//! Invalid user input is rejected before any engine is created.
//!
//! # Post-run
//!
//! Stops CPU profiling if it was started, then shuts down the image engine
//! and then the container engine. Shutdown failures are logged and never
//! replace the command's own result.
//!
//! # Example
//!
//! ```ignore
//! let mut controller = LifecycleController::new(registry, Box::new(SystemEnv));
//! controller
//!     .run_command(&mut ctx, &EXEC, &args, |ctx, registry| {
//!         Box::pin(exec::exec(ctx, registry, exec_args))
//!     })
//!     .await?;
//! ```

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::LocalBoxFuture;
use futures::FutureExt;
use thiserror::Error;

use super::command::CommandDescriptor;
use super::registry::EngineRegistry;
use super::EngineError;
use crate::core::config::ConfigError;
use crate::core::context::InvocationContext;
use crate::core::env::Environment;
use crate::core::parallel::{self, PoolError};
use crate::core::profile::{PprofProfiler, ProfileError, ProfileSession, Profiler};
use crate::core::rlimit;

/// The only `--context` value accepted.
pub const DEFAULT_CONTEXT: &str = "default";

/// Lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Armed,
    Skipped,
}

/// Errors raised by pre-run.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("use of --connection and --context at the same time is not allowed")]
    ConnectionAndContext,

    #[error("failed to resolve active destination")]
    Destination(#[source] ConfigError),

    #[error("unsupported --context {0:?}: only {DEFAULT_CONTEXT:?} is supported")]
    UnsupportedContext(String),

    #[error(transparent)]
    Workers(#[from] PoolError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Profile(#[from] ProfileError),

    #[error("setting up rootless environment")]
    Rootless(#[source] EngineError),

    #[error("lifecycle already in use (state {0:?})")]
    NotIdle(LifecycleState),
}

/// Drives pre-run and post-run for one command.
pub struct LifecycleController {
    state: LifecycleState,
    registry: Arc<EngineRegistry>,
    env: Box<dyn Environment>,
    profiler: Box<dyn Profiler>,
    profile: Option<Box<dyn ProfileSession>>,
}

impl std::fmt::Debug for LifecycleController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleController")
            .field("state", &self.state)
            .field("registry", &self.registry)
            .field("profiling", &self.profile.is_some())
            .finish()
    }
}

impl LifecycleController {
    /// Create an idle controller using the `pprof` profiler.
    pub fn new(registry: Arc<EngineRegistry>, env: Box<dyn Environment>) -> Self {
        Self::with_profiler(registry, env, Box::new(PprofProfiler::default()))
    }

    /// Create an idle controller with a custom profiler.
    pub fn with_profiler(
        registry: Arc<EngineRegistry>,
        env: Box<dyn Environment>,
        profiler: Box<dyn Profiler>,
    ) -> Self {
        Self {
            state: LifecycleState::Idle,
            registry,
            env,
            profiler,
            profile: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// The environment pre-run writes into.
    pub fn env(&self) -> &dyn Environment {
        self.env.as_ref()
    }

    /// The engine registry.
    pub fn registry(&self) -> &Arc<EngineRegistry> {
        &self.registry
    }

    /// Whether a CPU profile is running.
    pub fn is_profiling(&self) -> bool {
        self.profile.is_some()
    }

    /// Run `body` between pre-run and post-run.
    ///
    /// Post-run runs after a pre-run failure, a body error and a body
    /// panic; the panic is resumed once cleanup is done.
    pub async fn run_command<F>(
        &mut self,
        ctx: &mut InvocationContext,
        cmd: &CommandDescriptor,
        args: &[String],
        body: F,
    ) -> anyhow::Result<()>
    where
        F: for<'c> FnOnce(
            &'c InvocationContext,
            &'c EngineRegistry,
        ) -> LocalBoxFuture<'c, anyhow::Result<()>>,
    {
        if let Err(e) = self.pre_run(ctx, cmd, args).await {
            self.post_run(cmd, true).await;
            return Err(e.into());
        }

        let registry = Arc::clone(&self.registry);
        let outcome = AssertUnwindSafe(body(ctx, &registry)).catch_unwind().await;

        let failed = !matches!(outcome, Ok(Ok(())));
        self.post_run(cmd, failed).await;

        match outcome {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    /// Idle → Armed | Skipped.
    ///
    /// On failure the controller stays Armed so that post-run releases
    /// whatever was acquired before the failure.
    pub async fn pre_run(
        &mut self,
        ctx: &mut InvocationContext,
        cmd: &CommandDescriptor,
        args: &[String],
    ) -> Result<(), LifecycleError> {
        tracing::debug!("called {}.pre_run({})", cmd.name, args.join(" "));

        if self.state != LifecycleState::Idle {
            return Err(LifecycleError::NotIdle(self.state));
        }

        if cmd.skips_lifecycle() {
            self.state = LifecycleState::Skipped;
            return Ok(());
        }
        self.state = LifecycleState::Armed;

        self.apply_connection(ctx)?;
        parallel::validate_max_workers(ctx.flags.max_workers)?;

        match rlimit::open_file_limits() {
            Some(limits) => tracing::debug!("open file limits: {}", limits),
            None => tracing::debug!("open file limits unavailable"),
        }

        let options = ctx.engine_options(cmd.name, args);
        self.registry.image_engine(&options).await?;
        let container = self.registry.container_engine(&options).await?;

        self.propagate_engine_env(ctx)?;
        if !self.env.contains("TMPDIR") {
            self.env.set("TMPDIR", ctx.config.image_copy_tmp_dir());
        }

        parallel::set_max_workers(ctx.flags.max_workers)?;

        if !ctx.is_remote() {
            if let Some(path) = &ctx.flags.cpu_profile {
                self.profile = Some(self.profiler.start(path)?);
                tracing::debug!("cpu profiling to {}", path.display());
            }
        }

        if ctx.rootless && !ctx.is_remote() && !cmd.annotations.parent_ns_required {
            container
                .setup_rootless(cmd.annotations.no_move_process)
                .await
                .map_err(LifecycleError::Rootless)?;
        }

        Ok(())
    }

    /// Armed → Idle (cleanup); Skipped → Idle (no-op).
    ///
    /// Engines are shut down forcefully only when the command itself
    /// failed; a non-zero exit status from the container does not count.
    pub async fn post_run(&mut self, cmd: &CommandDescriptor, failed: bool) {
        tracing::debug!("called {}.post_run()", cmd.name);

        // Profiling is stopped whenever it was started, even if pre-run
        // failed right after starting it.
        if let Some(session) = self.profile.take() {
            if let Err(e) = session.stop() {
                tracing::warn!("failed to stop cpu profile: {:#}", anyhow::Error::new(e));
            }
        }

        if self.state == LifecycleState::Armed {
            for e in self.registry.shutdown(failed).await {
                tracing::warn!("engine shutdown failed: {:#}", anyhow::Error::new(e));
            }
        }

        self.state = LifecycleState::Idle;
    }

    /// Apply `--connection` and validate `--context`.
    fn apply_connection(&mut self, ctx: &mut InvocationContext) -> Result<(), LifecycleError> {
        let context = ctx.flags.context.clone();

        if let Some(conn) = ctx.flags.connection.clone() {
            if context.is_some() {
                return Err(LifecycleError::ConnectionAndContext);
            }
            ctx.config.set_active_service(&conn);
            let (uri, identity) = ctx
                .config
                .active_destination()
                .map_err(LifecycleError::Destination)?;
            tracing::debug!("connection {} resolved to {}", conn, uri);
            ctx.destination.service = conn;
            ctx.destination.uri = uri;
            ctx.destination.identity = identity;
        }

        match context {
            Some(value) if value != DEFAULT_CONTEXT => {
                Err(LifecycleError::UnsupportedContext(value))
            }
            _ => Ok(()),
        }
    }

    /// Inject configured `KEY=value` pairs unless already set.
    fn propagate_engine_env(&mut self, ctx: &InvocationContext) -> Result<(), ConfigError> {
        for (key, value) in ctx.config.engine_env()? {
            if self.env.contains(&key) {
                tracing::debug!("skipping {} from configuration, already set", key);
                continue;
            }
            self.env.set(&key, &value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{BerthConfig, Config, ServiceDestination};
    use crate::core::context::GlobalFlags;
    use crate::core::destination::Destination;
    use crate::core::env::MapEnv;
    use crate::engine::command::{CommandDescriptor, HELP};
    use crate::engine::mock::{MockEngineFactory, MockEvent};
    use std::cell::Cell;
    use std::path::{Path, PathBuf};
    use std::rc::Rc;

    const EXEC: CommandDescriptor = CommandDescriptor::leaf("exec");

    fn context(flags: GlobalFlags, config: Config, rootless: bool) -> InvocationContext {
        let flags = GlobalFlags {
            runroot: Some(PathBuf::from("/tmp/berth-lifecycle-test")),
            ..flags
        };
        InvocationContext::new(Destination::default(), flags, config, rootless)
    }

    fn controller(factory: &MockEngineFactory, env: MapEnv) -> LifecycleController {
        let registry = Arc::new(EngineRegistry::new(Arc::new(factory.clone())));
        LifecycleController::with_profiler(registry, Box::new(env), Box::new(CountingProfiler::default()))
    }

    /// Profiler that only counts starts and stops.
    #[derive(Default)]
    struct CountingProfiler {
        started: Rc<Cell<u32>>,
        stopped: Rc<Cell<u32>>,
    }

    struct CountingSession {
        stopped: Rc<Cell<u32>>,
    }

    impl Profiler for CountingProfiler {
        fn start(&self, _path: &Path) -> Result<Box<dyn ProfileSession>, ProfileError> {
            self.started.set(self.started.get() + 1);
            Ok(Box::new(CountingSession {
                stopped: Rc::clone(&self.stopped),
            }))
        }
    }

    impl ProfileSession for CountingSession {
        fn stop(self: Box<Self>) -> Result<(), ProfileError> {
            self.stopped.set(self.stopped.get() + 1);
            Ok(())
        }
    }

    #[tokio::test]
    async fn help_is_skipped_without_engines() {
        let factory = MockEngineFactory::new();
        let mut lc = controller(&factory, MapEnv::new());
        let mut ctx = context(GlobalFlags::default(), Config::default(), false);

        lc.pre_run(&mut ctx, &CommandDescriptor::leaf(HELP), &[])
            .await
            .unwrap();
        assert_eq!(lc.state(), LifecycleState::Skipped);

        lc.post_run(&CommandDescriptor::leaf(HELP), false).await;
        assert_eq!(lc.state(), LifecycleState::Idle);
        assert!(factory.events().is_empty());
        assert!(!lc.env().contains("TMPDIR"));
    }

    #[tokio::test]
    async fn armed_command_creates_then_shuts_down_in_order() {
        let factory = MockEngineFactory::new();
        let mut lc = controller(&factory, MapEnv::new());
        let mut ctx = context(GlobalFlags::default(), Config::default(), false);

        lc.pre_run(&mut ctx, &EXEC, &[]).await.unwrap();
        assert_eq!(lc.state(), LifecycleState::Armed);
        assert_eq!(lc.env().get("TMPDIR").as_deref(), Some("/var/tmp"));

        lc.post_run(&EXEC, false).await;
        assert_eq!(
            factory.events(),
            vec![
                MockEvent::ImageCreated,
                MockEvent::ContainerCreated,
                MockEvent::ImageShutdown,
                MockEvent::ContainerShutdown,
            ]
        );
    }

    #[tokio::test]
    async fn bad_context_fails_before_engines() {
        let factory = MockEngineFactory::new();
        let mut lc = controller(&factory, MapEnv::new());
        let flags = GlobalFlags {
            context: Some("prod".to_string()),
            ..GlobalFlags::default()
        };
        let mut ctx = context(flags, Config::default(), false);

        let result = lc.run_command(&mut ctx, &EXEC, &[], |_, _| Box::pin(async { Ok(()) })).await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("unsupported --context"));
        assert!(factory.events().is_empty());
    }

    #[tokio::test]
    async fn default_context_is_accepted() {
        let factory = MockEngineFactory::new();
        let mut lc = controller(&factory, MapEnv::new());
        let flags = GlobalFlags {
            context: Some(DEFAULT_CONTEXT.to_string()),
            ..GlobalFlags::default()
        };
        let mut ctx = context(flags, Config::default(), false);

        lc.pre_run(&mut ctx, &EXEC, &[]).await.unwrap();
        lc.post_run(&EXEC, false).await;
    }

    #[tokio::test]
    async fn connection_and_context_conflict() {
        let factory = MockEngineFactory::new();
        let mut lc = controller(&factory, MapEnv::new());
        let flags = GlobalFlags {
            connection: Some("prod".to_string()),
            context: Some(DEFAULT_CONTEXT.to_string()),
            ..GlobalFlags::default()
        };
        let mut ctx = context(flags, Config::default(), false);

        let err = lc.pre_run(&mut ctx, &EXEC, &[]).await.unwrap_err();
        assert!(matches!(err, LifecycleError::ConnectionAndContext));
    }

    #[tokio::test]
    async fn connection_overrides_destination() {
        let mut file = BerthConfig::default();
        file.engine.service_destinations.insert(
            "prod".to_string(),
            ServiceDestination {
                uri: "tcp://prod:8080".to_string(),
                identity: Some("/keys/prod".to_string()),
            },
        );
        let factory = MockEngineFactory::new();
        let mut lc = controller(&factory, MapEnv::new());
        let flags = GlobalFlags {
            connection: Some("prod".to_string()),
            ..GlobalFlags::default()
        };
        let mut ctx = context(flags, Config::from_file(file), false);

        lc.pre_run(&mut ctx, &EXEC, &[]).await.unwrap();
        assert_eq!(ctx.destination.service, "prod");
        assert_eq!(ctx.destination.uri, "tcp://prod:8080");
        assert_eq!(ctx.destination.identity, "/keys/prod");
        lc.post_run(&EXEC, false).await;
    }

    #[tokio::test]
    async fn unknown_connection_fails() {
        let factory = MockEngineFactory::new();
        let mut lc = controller(&factory, MapEnv::new());
        let flags = GlobalFlags {
            connection: Some("nowhere".to_string()),
            ..GlobalFlags::default()
        };
        let mut ctx = context(flags, Config::default(), false);

        let err = lc.pre_run(&mut ctx, &EXEC, &[]).await.unwrap_err();
        assert!(err
            .to_string()
            .starts_with("failed to resolve active destination"));
        assert!(factory.events().is_empty());
    }

    #[tokio::test]
    async fn non_positive_workers_fail_before_engines() {
        let factory = MockEngineFactory::new();
        let mut lc = controller(&factory, MapEnv::new());
        let flags = GlobalFlags {
            max_workers: 0,
            ..GlobalFlags::default()
        };
        let mut ctx = context(flags, Config::default(), false);

        let err = lc.pre_run(&mut ctx, &EXEC, &[]).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Workers(PoolError::NonPositive(0))));
        assert!(factory.events().is_empty());
    }

    #[tokio::test]
    async fn engine_env_respects_existing_vars() {
        let mut file = BerthConfig::default();
        file.engine.env = vec!["HTTP_PROXY=http://proxy:3128".into(), "LANG=C".into()];
        let factory = MockEngineFactory::new();
        let env = MapEnv::new().with("LANG", "en_US.UTF-8").with("TMPDIR", "/scratch");
        let mut lc = controller(&factory, env);
        let mut ctx = context(GlobalFlags::default(), Config::from_file(file), false);

        lc.pre_run(&mut ctx, &EXEC, &[]).await.unwrap();

        assert_eq!(lc.env().get("HTTP_PROXY").as_deref(), Some("http://proxy:3128"));
        assert_eq!(lc.env().get("LANG").as_deref(), Some("en_US.UTF-8"));
        assert_eq!(lc.env().get("TMPDIR").as_deref(), Some("/scratch"));
        lc.post_run(&EXEC, false).await;
    }

    #[tokio::test]
    async fn rootless_setup_respects_annotations() {
        let factory = MockEngineFactory::new();
        let mut lc = controller(&factory, MapEnv::new());
        let mut ctx = context(GlobalFlags::default(), Config::default(), true);

        let mut cmd = EXEC;
        cmd.annotations.no_move_process = true;
        lc.pre_run(&mut ctx, &cmd, &[]).await.unwrap();
        lc.post_run(&cmd, false).await;
        assert_eq!(
            factory.count(&MockEvent::RootlessSetup {
                no_move_process: true
            }),
            1
        );

        let factory = MockEngineFactory::new();
        let mut lc = controller(&factory, MapEnv::new());
        let mut cmd = EXEC;
        cmd.annotations.parent_ns_required = true;
        lc.pre_run(&mut ctx, &cmd, &[]).await.unwrap();
        lc.post_run(&cmd, false).await;
        assert!(factory
            .events()
            .iter()
            .all(|e| !matches!(e, MockEvent::RootlessSetup { .. })));
    }

    #[tokio::test]
    async fn profiling_stopped_after_late_pre_run_failure() {
        let factory = MockEngineFactory::new().fail_rootless();
        let registry = Arc::new(EngineRegistry::new(Arc::new(factory.clone())));
        let profiler = CountingProfiler::default();
        let (started, stopped) = (Rc::clone(&profiler.started), Rc::clone(&profiler.stopped));
        let mut lc = LifecycleController::with_profiler(registry, Box::new(MapEnv::new()), Box::new(profiler));
        let flags = GlobalFlags {
            cpu_profile: Some(PathBuf::from("/tmp/cpu.svg")),
            ..GlobalFlags::default()
        };
        let mut ctx = context(flags, Config::default(), true);

        let result = lc.run_command(&mut ctx, &EXEC, &[], |_, _| Box::pin(async { Ok(()) })).await;

        assert!(result.is_err());
        assert_eq!(started.get(), 1);
        assert_eq!(stopped.get(), 1);
        assert_eq!(factory.count(&MockEvent::ImageShutdown), 1);
        assert_eq!(factory.count(&MockEvent::ContainerShutdown), 1);
        assert_eq!(lc.state(), LifecycleState::Idle);
    }

    #[tokio::test]
    async fn profiling_skipped_in_remote_mode() {
        let factory = MockEngineFactory::new();
        let mut lc = controller(&factory, MapEnv::new());
        let flags = GlobalFlags {
            remote: true,
            cpu_profile: Some(PathBuf::from("/tmp/cpu.svg")),
            ..GlobalFlags::default()
        };
        let mut ctx = context(flags, Config::default(), true);

        lc.pre_run(&mut ctx, &EXEC, &[]).await.unwrap();
        assert!(!lc.is_profiling());
        lc.post_run(&EXEC, false).await;
        // Remote mode never sets up rootless either.
        assert!(factory
            .events()
            .iter()
            .all(|e| !matches!(e, MockEvent::RootlessSetup { .. })));
    }

    #[tokio::test]
    async fn body_error_still_cleans_up() {
        let factory = MockEngineFactory::new();
        let mut lc = controller(&factory, MapEnv::new());
        let mut ctx = context(GlobalFlags::default(), Config::default(), false);

        let result = lc
            .run_command(&mut ctx, &EXEC, &[], |_, _| {
                Box::pin(async { Err(anyhow::anyhow!("boom")) })
            })
            .await;

        assert_eq!(result.unwrap_err().to_string(), "boom");
        assert_eq!(factory.shutdown_order().len(), 2);
    }

    #[tokio::test]
    async fn body_panic_still_cleans_up() {
        let factory = MockEngineFactory::new();
        let mut lc = controller(&factory, MapEnv::new());
        let mut ctx = context(GlobalFlags::default(), Config::default(), false);

        let run = AssertUnwindSafe(lc.run_command(&mut ctx, &EXEC, &[], |_, _| {
            Box::pin(async {
                if true {
                    panic!("body panicked");
                }
                Ok(())
            })
        }))
        .catch_unwind()
        .await;

        assert!(run.is_err());
        assert_eq!(
            factory.shutdown_order(),
            vec![MockEvent::ImageShutdown, MockEvent::ContainerShutdown]
        );
    }

    #[tokio::test]
    async fn engine_setup_failure_shuts_down_what_exists() {
        let factory = MockEngineFactory::new().fail_container_create();
        let mut lc = controller(&factory, MapEnv::new());
        let mut ctx = context(GlobalFlags::default(), Config::default(), false);

        let result = lc.run_command(&mut ctx, &EXEC, &[], |_, _| Box::pin(async { Ok(()) })).await;

        assert!(result.is_err());
        assert_eq!(
            factory.events(),
            vec![MockEvent::ImageCreated, MockEvent::ImageShutdown]
        );
    }

    #[tokio::test]
    async fn container_exit_status_does_not_force_shutdown() {
        let factory = MockEngineFactory::new();
        let mut lc = controller(&factory, MapEnv::new());
        let mut ctx = context(GlobalFlags::default(), Config::default(), false);

        let result = lc
            .run_command(&mut ctx, &EXEC, &[], |ctx, _| {
                Box::pin(async move {
                    ctx.exit.set(3);
                    Ok(())
                })
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(factory.shutdown_order().len(), 2);
        assert_eq!(factory.forced_shutdowns(), 0);
    }

    #[tokio::test]
    async fn failed_command_forces_shutdown() {
        let factory = MockEngineFactory::new();
        let mut lc = controller(&factory, MapEnv::new());
        let mut ctx = context(GlobalFlags::default(), Config::default(), false);

        let result = lc
            .run_command(&mut ctx, &EXEC, &[], |_, _| {
                Box::pin(async { Err(anyhow::anyhow!("boom")) })
            })
            .await;

        assert!(result.is_err());
        assert_eq!(factory.forced_shutdowns(), 2);
    }

    #[tokio::test]
    async fn unknown_connection_is_one_line() {
        let factory = MockEngineFactory::new();
        let mut lc = controller(&factory, MapEnv::new());
        let flags = GlobalFlags {
            connection: Some("nowhere".to_string()),
            ..GlobalFlags::default()
        };
        let mut ctx = context(flags, Config::default(), false);

        let err = lc
            .run_command(&mut ctx, &EXEC, &[], |_, _| Box::pin(async { Ok(()) }))
            .await
            .unwrap_err();

        let text = crate::ui::errors::format_error(&err, false);
        assert!(text.starts_with("Error: failed to resolve active destination: "));
        assert_eq!(text.matches("nowhere").count(), 1, "{text}");
    }

    #[tokio::test]
    async fn shutdown_failure_does_not_replace_result() {
        let factory = MockEngineFactory::new().fail_container_shutdown();
        let mut lc = controller(&factory, MapEnv::new());
        let mut ctx = context(GlobalFlags::default(), Config::default(), false);

        let result = lc.run_command(&mut ctx, &EXEC, &[], |_, _| Box::pin(async { Ok(()) })).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn reentry_rejected() {
        let factory = MockEngineFactory::new();
        let mut lc = controller(&factory, MapEnv::new());
        let mut ctx = context(GlobalFlags::default(), Config::default(), false);

        lc.pre_run(&mut ctx, &EXEC, &[]).await.unwrap();
        let err = lc.pre_run(&mut ctx, &EXEC, &[]).await.unwrap_err();
        assert!(matches!(err, LifecycleError::NotIdle(LifecycleState::Armed)));
        lc.post_run(&EXEC, false).await;
    }
}
