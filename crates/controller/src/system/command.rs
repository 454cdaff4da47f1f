//! Command-line backed capabilities

use super::{ReverseProxy, ServiceManager, SourceControl};
use crate::runner::CommandRunner;
use async_trait::async_trait;
use multiserver_common::config::{CommandConfig, NginxConfig};
use multiserver_common::Result;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// `git clone` as the panel's own user
pub struct GitCli {
    runner: CommandRunner,
    git: String,
}

impl GitCli {
    pub fn new(runner: CommandRunner, commands: &CommandConfig) -> Self {
        Self {
            runner,
            git: commands.git.clone(),
        }
    }
}

#[async_trait]
impl SourceControl for GitCli {
    async fn clone_repo(&self, url: &str, destination: &Path) -> Result<()> {
        if tokio::fs::try_exists(destination).await? {
            if self.is_checkout_of(url, destination).await? {
                info!("Repository already cloned at {:?}, skipping", destination);
                return Ok(());
            }
            // Interrupted clone, or the checkout of an earlier service with this name
            warn!("Replacing stale checkout at {:?} with {}", destination, url);
            tokio::fs::remove_dir_all(destination).await?;
        }
        let destination = destination.to_string_lossy();
        self.runner
            .run(&self.git, &["clone", url, &*destination])
            .await
    }
}

impl GitCli {
    /// True when `destination` has a resolvable HEAD and its origin is `url`
    async fn is_checkout_of(&self, url: &str, destination: &Path) -> Result<bool> {
        let dir = destination.to_string_lossy();
        let head = self
            .runner
            .read(&self.git, &["-C", &*dir, "rev-parse", "--verify", "HEAD"])
            .await;
        match head {
            Ok(_) => {}
            Err(e) if e.is_command_failure() => return Ok(false),
            Err(e) => return Err(e),
        }

        match self
            .runner
            .read(&self.git, &["-C", &*dir, "remote", "get-url", "origin"])
            .await
        {
            Ok(origin) => Ok(origin == url),
            Err(e) if e.is_command_failure() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// `systemctl` through sudo
pub struct Systemctl {
    runner: CommandRunner,
    systemctl: String,
}

impl Systemctl {
    pub fn new(runner: CommandRunner, commands: &CommandConfig) -> Self {
        Self {
            runner,
            systemctl: commands.systemctl.clone(),
        }
    }
}

#[async_trait]
impl ServiceManager for Systemctl {
    async fn enable_and_start(&self, unit_path: &Path) -> Result<()> {
        let unit_path = unit_path.to_string_lossy();
        self.runner
            .run_privileged(&self.systemctl, &["enable", "--now", &*unit_path])
            .await
    }

    async fn daemon_reload(&self) -> Result<()> {
        self.runner
            .run_privileged(&self.systemctl, &["daemon-reload"])
            .await
    }

    async fn restart(&self, unit: &str) -> Result<()> {
        self.runner
            .run_privileged(&self.systemctl, &["restart", unit])
            .await
    }
}

/// nginx sites-available / sites-enabled layout
pub struct NginxSites {
    runner: CommandRunner,
    systemctl: String,
    ln: String,
    rm: String,
    available_dir: PathBuf,
    enabled_dir: PathBuf,
    service: String,
}

impl NginxSites {
    pub fn new(runner: CommandRunner, commands: &CommandConfig, nginx: &NginxConfig) -> Self {
        Self {
            runner,
            systemctl: commands.systemctl.clone(),
            ln: commands.ln.clone(),
            rm: commands.rm.clone(),
            available_dir: nginx.available_dir.clone(),
            enabled_dir: nginx.enabled_dir.clone(),
            service: nginx.service.clone(),
        }
    }

    pub fn available_path(&self, site: &str) -> PathBuf {
        self.available_dir.join(site)
    }

    pub fn enabled_path(&self, site: &str) -> PathBuf {
        self.enabled_dir.join(site)
    }

    async fn symlink(&self, target: &Path, link: &Path) -> Result<()> {
        let target = target.to_string_lossy();
        let link = link.to_string_lossy();
        self.runner
            .run_privileged(&self.ln, &["-sfn", &*target, &*link])
            .await
    }
}

#[async_trait]
impl ReverseProxy for NginxSites {
    async fn link_available(&self, config_path: &Path, site: &str) -> Result<()> {
        self.symlink(config_path, &self.available_path(site)).await
    }

    async fn enable_site(&self, site: &str) -> Result<()> {
        self.symlink(&self.available_path(site), &self.enabled_path(site))
            .await
    }

    async fn disable_site(&self, site: &str) -> Result<()> {
        let link = self.enabled_path(site);
        let link = link.to_string_lossy();
        self.runner
            .run_privileged(&self.rm, &["-f", &*link])
            .await
    }

    async fn reload(&self) -> Result<()> {
        self.runner
            .run_privileged(&self.systemctl, &["reload", self.service.as_str()])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Sites layout in a scratch directory, run without sudo
    fn local_sites(root: &Path) -> NginxSites {
        let commands = CommandConfig {
            use_sudo: false,
            // `true` stands in for systemctl so reload succeeds without nginx
            systemctl: "true".to_string(),
            ..CommandConfig::default()
        };
        let nginx = NginxConfig {
            available_dir: root.join("sites-available"),
            enabled_dir: root.join("sites-enabled"),
            service: "nginx".to_string(),
        };
        std::fs::create_dir_all(&nginx.available_dir).unwrap();
        std::fs::create_dir_all(&nginx.enabled_dir).unwrap();
        let runner = CommandRunner::new(None, Some(Duration::from_secs(5)));
        NginxSites::new(runner, &commands, &nginx)
    }

    #[tokio::test]
    async fn test_site_links() {
        let dir = tempfile::tempdir().unwrap();
        let sites = local_sites(dir.path());
        let stored = dir.path().join("blog.example.com.conf");
        std::fs::write(&stored, "server {}\n").unwrap();

        sites.link_available(&stored, "blog.example.com.conf").await.unwrap();
        // Re-linking over an existing link succeeds
        sites.link_available(&stored, "blog.example.com.conf").await.unwrap();
        let available = sites.available_path("blog.example.com.conf");
        assert_eq!(std::fs::read_link(&available).unwrap(), stored);

        sites.enable_site("blog.example.com.conf").await.unwrap();
        let enabled = sites.enabled_path("blog.example.com.conf");
        assert_eq!(std::fs::read_to_string(&enabled).unwrap(), "server {}\n");

        sites.reload().await.unwrap();

        sites.disable_site("blog.example.com.conf").await.unwrap();
        assert!(std::fs::symlink_metadata(&enabled).is_err());
        // Disabling twice is harmless
        sites.disable_site("blog.example.com.conf").await.unwrap();
    }

    /// A `git` stand-in that fakes `clone`, `rev-parse` and `remote get-url`
    /// and appends every cloned url to `clones.log` next to itself.
    const FAKE_GIT: &str = r#"#!/bin/sh
if [ "$1" = "-C" ]; then
    dir="$2"
    shift 2
    case "$1" in
        rev-parse) test -f "$dir/.git/HEAD" ;;
        remote) cat "$dir/.git/origin" ;;
        *) exit 2 ;;
    esac
    exit $?
fi
[ "$1" = "clone" ] || exit 2
mkdir -p "$3/.git" || exit 1
echo "$2" > "$3/.git/origin"
echo "ref: refs/heads/main" > "$3/.git/HEAD"
echo "$2" >> "$(dirname "$0")/clones.log"
"#;

    fn fake_git(dir: &Path) -> GitCli {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join("git");
        std::fs::write(&script, FAKE_GIT).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let commands = CommandConfig {
            git: script.to_string_lossy().into_owned(),
            ..CommandConfig::default()
        };
        GitCli::new(CommandRunner::new(None, Some(Duration::from_secs(5))), &commands)
    }

    fn clones(dir: &Path) -> Vec<String> {
        std::fs::read_to_string(dir.join("clones.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn test_clone_skips_existing_checkout() {
        let dir = tempfile::tempdir().unwrap();
        let checkout = dir.path().join("code/blog");
        let git = fake_git(dir.path());

        git.clone_repo("https://example.com/blog.git", &checkout).await.unwrap();
        git.clone_repo("https://example.com/blog.git", &checkout).await.unwrap();

        assert_eq!(clones(dir.path()), vec!["https://example.com/blog.git"]);
    }

    #[tokio::test]
    async fn test_clone_replaces_interrupted_checkout() {
        let dir = tempfile::tempdir().unwrap();
        let checkout = dir.path().join("code/blog");
        // What a clone killed by the timeout leaves behind
        std::fs::create_dir_all(checkout.join(".git/objects")).unwrap();
        let git = fake_git(dir.path());

        git.clone_repo("https://example.com/blog.git", &checkout).await.unwrap();

        assert_eq!(clones(dir.path()), vec!["https://example.com/blog.git"]);
        assert!(checkout.join(".git/HEAD").exists());
        assert!(!checkout.join(".git/objects").exists());
    }

    #[tokio::test]
    async fn test_clone_replaces_checkout_of_other_repo() {
        let dir = tempfile::tempdir().unwrap();
        let checkout = dir.path().join("code/blog");
        let git = fake_git(dir.path());

        git.clone_repo("https://example.com/old-blog.git", &checkout).await.unwrap();
        git.clone_repo("https://example.com/blog.git", &checkout).await.unwrap();

        assert_eq!(
            clones(dir.path()),
            vec!["https://example.com/old-blog.git", "https://example.com/blog.git"]
        );
        assert_eq!(
            std::fs::read_to_string(checkout.join(".git/origin")).unwrap().trim(),
            "https://example.com/blog.git"
        );
    }

    #[tokio::test]
    async fn test_timed_out_clone_is_redone() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let checkout = dir.path().join("code/blog");

        let slow = dir.path().join("slow-git");
        std::fs::write(&slow, "#!/bin/sh\nmkdir -p \"$3/.git\"\nsleep 5\n").unwrap();
        std::fs::set_permissions(&slow, std::fs::Permissions::from_mode(0o755)).unwrap();
        let commands = CommandConfig {
            git: slow.to_string_lossy().into_owned(),
            ..CommandConfig::default()
        };
        let runner = CommandRunner::new(None, Some(Duration::from_millis(300)));
        let err = GitCli::new(runner, &commands)
            .clone_repo("https://example.com/blog.git", &checkout)
            .await
            .unwrap_err();
        assert!(err.is_command_failure());
        assert!(checkout.join(".git").exists());

        fake_git(dir.path())
            .clone_repo("https://example.com/blog.git", &checkout)
            .await
            .unwrap();
        assert_eq!(clones(dir.path()), vec!["https://example.com/blog.git"]);
    }

    #[tokio::test]
    async fn test_clone_failure_surfaces() {
        let dir = tempfile::tempdir().unwrap();
        let commands = CommandConfig {
            git: "false".to_string(),
            ..CommandConfig::default()
        };
        let git = GitCli::new(CommandRunner::new(None, None), &commands);
        let err = git
            .clone_repo("https://example.com/blog.git", &dir.path().join("code/blog"))
            .await
            .unwrap_err();
        assert!(err.is_command_failure());
    }
}
