#![allow(dead_code)]

use multiserver_common::{ArtifactStore, Database, FailurePolicy, NewService};
use multiserver_controller::system::RecordingSystem;
use multiserver_controller::{Capabilities, Panel};
use tempfile::TempDir;

pub struct Fixture {
    pub dir: TempDir,
    pub panel: Panel,
    pub system: RecordingSystem,
    pub artifacts: ArtifactStore,
}

pub fn fixture() -> Fixture {
    fixture_with(FailurePolicy::Strict, RecordingSystem::new())
}

pub fn fixture_with(policy: FailurePolicy, system: RecordingSystem) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open_memory().unwrap();
    let artifacts = ArtifactStore::new(dir.path().join("media"));
    let panel = Panel::new(
        db,
        artifacts.clone(),
        Capabilities::recording(system.clone()),
        policy,
    );
    Fixture {
        dir,
        panel,
        system,
        artifacts,
    }
}

pub fn new_service(n: u16) -> NewService {
    NewService {
        name: format!("Blog {}", n),
        service_name: format!("blog{}", n),
        domain_name: format!("blog{}.example.com", n),
        description: String::new(),
        repo_url: "https://github.com/example/blog.git".to_string(),
        port: 8000 + n,
        systemd_unit: format!(
            "[Unit]\nDescription=Blog {n}\n\n[Service]\nExecStart=/srv/blog{n}/run --port {}\n",
            8000 + n
        ),
        nginx_config: format!(
            "server {{\n    server_name blog{n}.example.com;\n    location / {{ proxy_pass http://127.0.0.1:{}; }}\n}}\n",
            8000 + n
        ),
    }
}
