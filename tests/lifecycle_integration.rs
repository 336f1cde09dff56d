//! Integration tests for commands running inside the lifecycle.
//!
//! These drive parsed commands through `commands::run` with recording
//! engines, the same path the binary takes, without spawning a process.

use std::sync::Arc;

use clap::Parser;

use berth::cli::{commands, Cli};
use berth::core::config::Config;
use berth::core::context::InvocationContext;
use berth::core::destination::Destination;
use berth::core::env::{Environment, MapEnv};
use berth::engine::mock::{MockEngineFactory, MockEvent};
use berth::engine::{EngineRegistry, LifecycleController, LifecycleState};

// =============================================================================
// Test Fixtures
// =============================================================================

/// Everything one simulated invocation needs.
struct Harness {
    factory: MockEngineFactory,
    controller: LifecycleController,
    rootless: bool,
}

impl Harness {
    fn new(factory: MockEngineFactory) -> Self {
        let registry = Arc::new(EngineRegistry::new(Arc::new(factory.clone())));
        let controller = LifecycleController::new(registry, Box::new(MapEnv::new()));
        Self {
            factory,
            controller,
            rootless: false,
        }
    }

    fn rootless(mut self) -> Self {
        self.rootless = true;
        self
    }

    /// Parse `argv` and run it; returns the result and the context.
    async fn run(&mut self, argv: &[&str]) -> (anyhow::Result<()>, InvocationContext) {
        let cli = Cli::try_parse_from(std::iter::once("berth").chain(argv.iter().copied()))
            .expect("arguments parse");
        let env = MapEnv::new();
        let flags = cli.global_flags(&env).expect("valid global flags");
        let destination = cli.destination(Destination {
            service: String::new(),
            uri: "unix:///run/berth/berth.sock".to_string(),
            identity: String::new(),
        });
        let mut ctx = InvocationContext::new(destination, flags, Config::default(), self.rootless);

        let result = commands::run(&mut self.controller, &mut ctx, cli.command).await;
        (result, ctx)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn exec_runs_between_setup_and_shutdown() {
    let mut harness = Harness::new(MockEngineFactory::new().with_exit_code(4));

    let (result, ctx) = harness.run(&["exec", "-it", "ctr1", "ls"]).await;

    result.unwrap();
    assert_eq!(ctx.exit.get(), 4);
    assert_eq!(harness.controller.state(), LifecycleState::Idle);

    let events = harness.factory.events();
    assert_eq!(events[0], MockEvent::ImageCreated);
    assert_eq!(events[1], MockEvent::ContainerCreated);
    assert!(matches!(&events[2], MockEvent::Exec { container, options }
        if container.as_deref() == Some("ctr1")
            && options.cmd == vec!["ls".to_string()]
            && options.tty
            && options.interactive));
    assert_eq!(
        &events[3..],
        &[MockEvent::ImageShutdown, MockEvent::ContainerShutdown]
    );
}

#[tokio::test]
async fn help_and_completion_never_touch_engines() {
    let mut harness = Harness::new(MockEngineFactory::new());

    for argv in [&["help"][..], &["completion", "zsh"], &["__complete", "ex"], &["system"]] {
        let (result, _) = harness.run(argv).await;
        result.unwrap();
    }

    assert!(harness.factory.events().is_empty());
}

#[tokio::test]
async fn arity_failure_never_touches_engines() {
    let cases: &[(&[&str], &str)] = &[
        (&["exec"], "must provide one container name or id"),
        (&["exec", "ctr1"], "must provide a command to exec"),
        (&["exec", "--latest"], "must provide a command to exec"),
    ];

    for (argv, message) in cases {
        let mut harness = Harness::new(MockEngineFactory::new());

        let (result, ctx) = harness.run(argv).await;

        assert_eq!(result.unwrap_err().to_string(), *message);
        assert_eq!(ctx.exit.get(), 0);
        assert!(harness.factory.events().is_empty(), "{argv:?}");
        assert_eq!(harness.controller.state(), LifecycleState::Idle);
    }
}

#[tokio::test]
async fn nonzero_container_status_is_not_a_forced_shutdown() {
    let mut harness = Harness::new(MockEngineFactory::new().with_exit_code(1));

    let (result, ctx) = harness.run(&["exec", "ctr1", "false"]).await;

    result.unwrap();
    assert_eq!(ctx.exit.get(), 1);
    assert_eq!(harness.factory.shutdown_order().len(), 2);
    assert_eq!(harness.factory.forced_shutdowns(), 0);
}

#[tokio::test]
async fn version_skips_rootless_setup() {
    let mut harness = Harness::new(MockEngineFactory::new()).rootless();

    let (result, _) = harness.run(&["version"]).await;
    result.unwrap();
    assert!(harness
        .factory
        .events()
        .iter()
        .all(|e| !matches!(e, MockEvent::RootlessSetup { .. })));

    // Engines live for one invocation, so the next command gets a fresh
    // registry.
    let mut harness = Harness::new(MockEngineFactory::new()).rootless();
    let (result, _) = harness.run(&["system", "info"]).await;
    result.unwrap();
    assert_eq!(
        harness.factory.count(&MockEvent::RootlessSetup {
            no_move_process: false
        }),
        1
    );
}

#[tokio::test]
async fn controller_is_reusable_after_cleanup() {
    let mut harness = Harness::new(MockEngineFactory::new());

    let (first, _) = harness.run(&["help"]).await;
    first.unwrap();
    let (second, _) = harness.run(&["exec", "ctr1", "true"]).await;
    second.unwrap();

    assert_eq!(harness.factory.count(&MockEvent::ContainerShutdown), 1);
    assert_eq!(
        harness.controller.env().get("TMPDIR").as_deref(),
        Some("/var/tmp")
    );
}
