mod support;

use multiserver_common::{Config, Error, FailurePolicy, ServiceUpdate};
use multiserver_controller::system::RecordingSystem;
use multiserver_controller::{Capabilities, Cascade, Panel};
use std::time::Duration;
use support::{fixture, fixture_with, new_service};

#[tokio::test]
async fn initialize_runs_setup_steps_in_order() {
    let fx = fixture();
    let service = fx.panel.registry().create(new_service(1)).await.unwrap();

    let outcome = fx.panel.controller().initialize(service.id).await.unwrap();
    assert!(outcome.changed);
    assert!(outcome.service.state.is_initialized());
    assert!(!outcome.service.state.is_systemd_applied());
    assert!(!outcome.service.state.is_nginx_applied());
    assert!(!outcome.service.state.is_enabled());

    let checkout = fx.artifacts.workspace_path("blog1");
    let unit = fx.artifacts.unit_path("blog1");
    let site = fx.artifacts.nginx_path("blog1.example.com");
    assert_eq!(
        fx.system.calls(),
        vec![
            format!("clone https://github.com/example/blog.git {}", checkout.display()),
            format!("enable-and-start {}", unit.display()),
            format!("link-available {} blog1.example.com.conf", site.display()),
            "reload-proxy".to_string(),
        ]
    );

    let stored = fx.panel.registry().get(service.id).unwrap();
    assert!(stored.state.is_initialized());
    assert_eq!(stored.applied_at, None);
}

#[tokio::test]
async fn initialize_twice_does_nothing_the_second_time() {
    let fx = fixture();
    let service = fx.panel.registry().create(new_service(1)).await.unwrap();

    fx.panel.controller().initialize(service.id).await.unwrap();
    let calls = fx.system.calls().len();

    let outcome = fx.panel.controller().initialize(service.id).await.unwrap();
    assert!(!outcome.changed);
    assert_eq!(fx.system.calls().len(), calls);
}

#[tokio::test]
async fn apply_systemd_cascades_into_initialize_once() {
    let fx = fixture();
    let service = fx.panel.registry().create(new_service(1)).await.unwrap();

    let outcome = fx
        .panel
        .controller()
        .apply_systemd(service.id, Cascade::Initialize)
        .await
        .unwrap();
    assert!(outcome.changed);
    assert!(outcome.cascaded);
    assert!(outcome.service.state.is_initialized());
    assert!(outcome.service.state.is_systemd_applied());
    assert!(outcome.service.applied_at.is_some());

    assert_eq!(fx.system.count("clone"), 1);
    assert_eq!(fx.system.count("enable-and-start"), 1);
    assert_eq!(fx.system.count("daemon-reload"), 1);
    assert_eq!(
        fx.system.calls().last().map(String::as_str),
        Some("restart blog1.service")
    );

    // Second call: nothing pending
    let again = fx
        .panel
        .controller()
        .apply_systemd(service.id, Cascade::Initialize)
        .await
        .unwrap();
    assert!(!again.changed);
    assert!(!again.cascaded);
    assert_eq!(fx.system.count("restart"), 1);
}

#[tokio::test]
async fn require_fails_without_side_effects() {
    let fx = fixture();
    let service = fx.panel.registry().create(new_service(1)).await.unwrap();

    let err = fx
        .panel
        .controller()
        .apply_nginx(service.id, Cascade::Require)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotInitialized { ref name } if name == "Blog 1"));
    assert!(fx.system.calls().is_empty());

    let stored = fx.panel.registry().get(service.id).unwrap();
    assert!(!stored.state.is_initialized());
    assert!(!stored.state.is_nginx_applied());
}

#[tokio::test]
async fn apply_changes_applies_both_configs() {
    let fx = fixture();
    let service = fx.panel.registry().create(new_service(1)).await.unwrap();

    let report = fx
        .panel
        .controller()
        .apply_changes(service.id, Cascade::Initialize)
        .await
        .unwrap();
    assert!(report.cascaded);
    assert!(report.systemd);
    assert!(report.nginx);
    assert!(report.changed());
    assert!(report.service.state.is_systemd_applied());
    assert!(report.service.state.is_nginx_applied());

    assert_eq!(fx.system.count("restart"), 1);
    // One reload from initialize, one from applying nginx
    assert_eq!(fx.system.count("reload-proxy"), 2);

    let stored = fx.panel.registry().get(service.id).unwrap();
    assert!(stored.state.is_systemd_applied());
    assert!(stored.state.is_nginx_applied());

    fx.system.reset();
    let again = fx
        .panel
        .controller()
        .apply_changes(service.id, Cascade::Initialize)
        .await
        .unwrap();
    assert!(!again.changed());
    assert!(fx.system.calls().is_empty());
}

#[tokio::test]
async fn apply_changes_applies_nginx_when_only_nginx_is_pending() {
    let fx = fixture();
    let service = fx.panel.registry().create(new_service(1)).await.unwrap();
    let controller = fx.panel.controller();

    controller
        .apply_systemd(service.id, Cascade::Initialize)
        .await
        .unwrap();
    fx.system.reset();

    let report = controller
        .apply_changes(service.id, Cascade::Initialize)
        .await
        .unwrap();
    assert!(!report.systemd);
    assert!(report.nginx);
    assert_eq!(fx.system.calls(), vec!["reload-proxy"]);
}

#[tokio::test]
async fn enable_and_disable_toggle_the_site() {
    let fx = fixture();
    let service = fx.panel.registry().create(new_service(1)).await.unwrap();
    let controller = fx.panel.controller();
    controller.initialize(service.id).await.unwrap();
    fx.system.reset();

    let enabled = controller.enable(service.id, Cascade::Initialize).await.unwrap();
    assert!(enabled.changed);
    assert!(enabled.service.state.is_enabled());
    assert_eq!(
        fx.system.calls(),
        vec!["enable-site blog1.example.com.conf", "reload-proxy"]
    );

    let again = controller.enable(service.id, Cascade::Initialize).await.unwrap();
    assert!(!again.changed);
    assert_eq!(fx.system.count("enable-site"), 1);

    fx.system.reset();
    let disabled = controller.disable(service.id, Cascade::Initialize).await.unwrap();
    assert!(disabled.changed);
    assert!(!disabled.service.state.is_enabled());
    assert_eq!(
        fx.system.calls(),
        vec!["disable-site blog1.example.com.conf", "reload-proxy"]
    );

    let again = controller.disable(service.id, Cascade::Initialize).await.unwrap();
    assert!(!again.changed);
    assert_eq!(fx.system.count("disable-site"), 1);
}

#[tokio::test]
async fn disable_on_fresh_service_only_initializes() {
    let fx = fixture();
    let service = fx.panel.registry().create(new_service(1)).await.unwrap();

    let outcome = fx
        .panel
        .controller()
        .disable(service.id, Cascade::Initialize)
        .await
        .unwrap();
    assert!(outcome.cascaded);
    assert!(!outcome.changed);
    assert!(outcome.service.state.is_initialized());
    assert_eq!(fx.system.count("disable-site"), 0);
}

#[tokio::test]
async fn strict_failure_leaves_flag_unset() {
    let fx = fixture();
    let service = fx.panel.registry().create(new_service(1)).await.unwrap();
    let controller = fx.panel.controller();
    controller.initialize(service.id).await.unwrap();

    fx.system.fail_on("restart");
    let err = controller
        .apply_systemd(service.id, Cascade::Initialize)
        .await
        .unwrap_err();
    assert!(err.is_command_failure());

    let stored = fx.panel.registry().get(service.id).unwrap();
    assert!(!stored.state.is_systemd_applied());
    assert_eq!(stored.applied_at, None);

    // Retrying after the host is fixed succeeds
    fx.system.clear_failures();
    let outcome = controller
        .apply_systemd(service.id, Cascade::Initialize)
        .await
        .unwrap();
    assert!(outcome.changed);
    assert!(outcome.service.state.is_systemd_applied());
}

#[tokio::test]
async fn strict_initialize_failure_stops_at_failed_step() {
    let fx = fixture();
    let service = fx.panel.registry().create(new_service(1)).await.unwrap();
    fx.system.fail_on("clone");

    let err = fx
        .panel
        .controller()
        .apply_changes(service.id, Cascade::Initialize)
        .await
        .unwrap_err();
    assert!(err.is_command_failure());
    assert_eq!(fx.system.calls().len(), 1);

    let stored = fx.panel.registry().get(service.id).unwrap();
    assert!(!stored.state.is_initialized());
}

#[tokio::test]
async fn fire_and_forget_sets_flags_despite_failures() {
    let system = RecordingSystem::new();
    let fx = fixture_with(FailurePolicy::FireAndForget, system);
    let service = fx.panel.registry().create(new_service(1)).await.unwrap();
    fx.system.fail_on("clone");
    fx.system.fail_on("restart");

    let outcome = fx
        .panel
        .controller()
        .apply_systemd(service.id, Cascade::Initialize)
        .await
        .unwrap();
    assert!(outcome.changed);
    assert!(outcome.service.state.is_initialized());
    assert!(outcome.service.state.is_systemd_applied());

    // Every step was still attempted
    assert_eq!(fx.system.count("clone"), 1);
    assert_eq!(fx.system.count("enable-and-start"), 1);
    assert_eq!(fx.system.count("restart"), 1);
}

#[tokio::test]
async fn concurrent_apply_restarts_once() {
    let system = RecordingSystem::new().with_delay(Duration::from_millis(25));
    let fx = fixture_with(FailurePolicy::Strict, system);
    let service = fx.panel.registry().create(new_service(1)).await.unwrap();
    let controller = fx.panel.controller();
    controller.initialize(service.id).await.unwrap();

    let (first, second) = tokio::join!(
        controller.apply_systemd(service.id, Cascade::Initialize),
        controller.apply_systemd(service.id, Cascade::Initialize),
    );
    let first = first.unwrap();
    let second = second.unwrap();

    assert!(first.changed ^ second.changed);
    assert_eq!(fx.system.count("restart"), 1);
    assert_eq!(fx.system.count("daemon-reload"), 1);
}

#[tokio::test]
async fn panels_sharing_a_store_restart_once() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        store_path: dir.path().join("store"),
        media_root: dir.path().join("media"),
        ..Config::default()
    };
    // Two panels stand in for the CLI and the web server on one store
    let system = RecordingSystem::new().with_delay(Duration::from_millis(25));
    let cli = Panel::open_with(&config, Capabilities::recording(system.clone())).unwrap();
    let web = Panel::open_with(&config, Capabilities::recording(system.clone())).unwrap();

    let service = cli.registry().create(new_service(1)).await.unwrap();
    cli.controller().initialize(service.id).await.unwrap();

    let (first, second) = tokio::join!(
        cli.controller().apply_systemd(service.id, Cascade::Initialize),
        web.controller().apply_systemd(service.id, Cascade::Initialize),
    );
    let first = first.unwrap();
    let second = second.unwrap();

    assert!(first.changed ^ second.changed);
    assert_eq!(system.count("restart"), 1);
    assert_eq!(system.count("daemon-reload"), 1);
    assert!(web.registry().get(service.id).unwrap().state.is_systemd_applied());
}

#[tokio::test]
async fn concurrent_cascades_clone_once() {
    let system = RecordingSystem::new().with_delay(Duration::from_millis(10));
    let fx = fixture_with(FailurePolicy::Strict, system);
    let service = fx.panel.registry().create(new_service(1)).await.unwrap();
    let controller = fx.panel.controller();

    let (systemd, nginx) = tokio::join!(
        controller.apply_systemd(service.id, Cascade::Initialize),
        controller.apply_nginx(service.id, Cascade::Initialize),
    );
    systemd.unwrap();
    nginx.unwrap();

    assert_eq!(fx.system.count("clone"), 1);
    let stored = fx.panel.registry().get(service.id).unwrap();
    assert!(stored.state.is_systemd_applied());
    assert!(stored.state.is_nginx_applied());
}

#[tokio::test]
async fn applied_at_never_moves_backwards() {
    let fx = fixture();
    let service = fx.panel.registry().create(new_service(1)).await.unwrap();
    let controller = fx.panel.controller();

    let first = controller
        .apply_systemd(service.id, Cascade::Initialize)
        .await
        .unwrap();
    let stamped = first.service.applied_at.unwrap();

    // New unit content puts systemd back to pending
    let update = ServiceUpdate {
        systemd_unit: Some("[Service]\nExecStart=/srv/blog1/run-v2\n".to_string()),
        ..ServiceUpdate::default()
    };
    let updated = fx.panel.registry().update(service.id, update).await.unwrap();
    assert!(!updated.state.is_systemd_applied());
    assert_eq!(updated.applied_at, Some(stamped));

    let second = controller
        .apply_systemd(service.id, Cascade::Initialize)
        .await
        .unwrap();
    assert!(second.changed);
    assert!(second.service.applied_at.unwrap() >= stamped);
    assert_eq!(fx.system.count("restart"), 2);
}

#[tokio::test]
async fn unknown_service_is_not_found() {
    let fx = fixture();
    let err = fx
        .panel
        .controller()
        .enable(404, Cascade::Initialize)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
    assert!(fx.system.calls().is_empty());
}
