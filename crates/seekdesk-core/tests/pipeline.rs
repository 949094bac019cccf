use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use seekdesk_core::{
    AppControl, InstallLock, InstallState, Installer, MAX_RETRIES, UpdateError, UpdateOutcome,
    UpdateProgress, UpdateSession, UpdaterConfig,
};
use seekdesk_platform::{AppPaths, CloseOutcome, ProcessError};
use sha2::{Digest, Sha256};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const RELEASE_PATH: &str = "/repos/deepseek/releases/latest";
const ASSET_PATH: &str = "/download/DeepSeekChat-windows.zip";
const EXE: &str = "DeepSeekChat.exe";
const TRACKED: [&str; 4] = [EXE, "version.txt", "deepseek.ico", "injection"];

#[derive(Default)]
struct FakeApp {
    closes: AtomicUsize,
    launches: Mutex<Vec<PathBuf>>,
}

impl FakeApp {
    fn launches(&self) -> Vec<PathBuf> {
        self.launches
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl AppControl for FakeApp {
    async fn close(&self) -> Result<CloseOutcome, ProcessError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(CloseOutcome::Closed)
    }

    fn launch(&self, executable: &Path) -> Result<(), ProcessError> {
        self.launches
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(executable.to_path_buf());
        Ok(())
    }
}

struct Fixture {
    install: TempDir,
    _cache: TempDir,
    server: MockServer,
    app: Arc<FakeApp>,
    installer: Installer,
}

impl Fixture {
    async fn new(local_version: Option<&str>) -> Self {
        Self::with_config(local_version, |_| {}).await
    }

    async fn with_config(
        local_version: Option<&str>,
        tweak: impl FnOnce(&mut UpdaterConfig),
    ) -> Self {
        let install = tempfile::tempdir().expect("install dir should be created");
        let cache = tempfile::tempdir().expect("cache dir should be created");
        let server = MockServer::start().await;
        seed_install(install.path(), local_version);

        let mut config = UpdaterConfig {
            release_url: format!("{}{RELEASE_PATH}", server.uri()),
            executable_name: EXE.to_string(),
            version_file: "version.txt".to_string(),
            extra_tracked_items: vec!["deepseek.ico".to_string(), "injection".to_string()],
            asset_marker: "windows.zip".to_string(),
            retry_delays_secs: vec![0, 0, 0],
            request_timeout_secs: 10,
            connect_timeout_secs: 5,
            close_grace_secs: 0,
            ..UpdaterConfig::default()
        };
        tweak(&mut config);

        let app = Arc::new(FakeApp::default());
        let paths = AppPaths::for_install_dir(install.path()).with_cache_dir(cache.path());
        let installer = Installer::new(paths, config, app.clone())
            .expect("installer should be constructed");

        Self {
            install,
            _cache: cache,
            server,
            app,
            installer,
        }
    }

    fn root(&self) -> &Path {
        self.install.path()
    }

    async fn serve_release(&self, tag: &str, asset_names: &[&str]) {
        let assets: Vec<_> = asset_names
            .iter()
            .map(|name| {
                serde_json::json!({
                    "name": name,
                    "browser_download_url": format!("{}{ASSET_PATH}", self.server.uri()),
                })
            })
            .collect();
        Mock::given(method("GET"))
            .and(path(RELEASE_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "tag_name": tag, "assets": assets })),
            )
            .mount(&self.server)
            .await;
    }

    async fn serve_asset(&self, bytes: Vec<u8>, expected_hits: u64) {
        Mock::given(method("GET"))
            .and(path(ASSET_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(bytes))
            .expect(expected_hits)
            .mount(&self.server)
            .await;
    }

    async fn run(&self) -> (UpdateSession, Result<UpdateOutcome, UpdateError>) {
        let mut session = UpdateSession::default();
        let result = self.installer.run_session(&mut session).await;
        (session, result)
    }

    fn backup_count(&self) -> usize {
        self.installer
            .backups()
            .list()
            .expect("backups should be listable")
            .len()
    }
}

fn seed_install(root: &Path, version: Option<&str>) {
    std::fs::write(root.join(EXE), b"old-binary").expect("exe should be written");
    if let Some(version) = version {
        std::fs::write(root.join("version.txt"), version).expect("version should be written");
    }
    std::fs::write(root.join("deepseek.ico"), b"old-icon").expect("icon should be written");
    std::fs::create_dir_all(root.join("injection/modules")).expect("injection should be created");
    std::fs::write(root.join("injection/inject.js"), b"old-inject").expect("inject");
    std::fs::write(root.join("injection/modules/footer.js"), b"old-footer").expect("footer");
}

/// Relative path -> SHA-256 for every file under the tracked items.
fn snapshot(root: &Path) -> BTreeMap<String, String> {
    fn walk(base: &Path, path: &Path, out: &mut BTreeMap<String, String>) {
        if path.is_dir() {
            for entry in std::fs::read_dir(path).expect("dir should be readable").flatten() {
                walk(base, &entry.path(), out);
            }
        } else if path.is_file() {
            let bytes = std::fs::read(path).expect("file should be readable");
            let relative = path
                .strip_prefix(base)
                .expect("path should be under base")
                .to_string_lossy()
                .replace('\\', "/");
            out.insert(relative, format!("{:x}", Sha256::digest(&bytes)));
        }
    }

    let mut out = BTreeMap::new();
    for item in TRACKED {
        walk(root, &root.join(item), &mut out);
    }
    out
}

fn build_zip(dirs: &[&str], files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default().unix_permissions(0o755);
    for dir in dirs {
        writer
            .add_directory(*dir, options)
            .expect("directory entry should be written");
    }
    for (name, contents) in files {
        writer
            .start_file(*name, options)
            .expect("file entry should be started");
        writer
            .write_all(contents)
            .expect("file entry should be written");
    }
    writer
        .finish()
        .expect("zip archive should be finalized")
        .into_inner()
}

fn release_zip() -> Vec<u8> {
    build_zip(
        &["injection/", "injection/modules/"],
        &[
            (EXE, b"new-binary"),
            ("deepseek.ico", b"new-icon"),
            ("injection/inject.js", b"new-inject"),
            ("injection/modules/greeting.js", b"new-greeting"),
        ],
    )
}

#[tokio::test]
async fn newer_release_is_installed_and_relaunched() {
    let fixture = Fixture::new(Some("1.0.0")).await;
    fixture
        .serve_release("v1.0.1", &["DeepSeekChat-v1.0.1-windows.zip"])
        .await;
    fixture.serve_asset(release_zip(), 1).await;
    let before = snapshot(fixture.root());

    let (session, result) = fixture.run().await;

    let outcome = result.expect("update should succeed");
    let UpdateOutcome::Updated { from, to, backup } = outcome else {
        panic!("expected an installed update, got {outcome:?}");
    };
    assert_eq!((from.as_str(), to.as_str()), ("1.0.0", "1.0.1"));

    let root = fixture.root();
    assert_eq!(
        std::fs::read_to_string(root.join("version.txt")).expect("version"),
        "1.0.1"
    );
    assert_eq!(std::fs::read(root.join(EXE)).expect("exe"), b"new-binary");
    assert_eq!(
        std::fs::read(root.join("injection/modules/greeting.js")).expect("greeting"),
        b"new-greeting"
    );
    assert!(
        !root.join("injection/modules/footer.js").exists(),
        "directories are replaced wholesale"
    );

    assert!(backup.is_dir());
    assert_eq!(snapshot(&backup), before);
    assert_eq!(fixture.backup_count(), 1);

    assert_eq!(fixture.app.closes.load(Ordering::SeqCst), 1);
    assert_eq!(fixture.app.launches(), vec![root.join(EXE)]);
    assert_eq!(
        session.history,
        vec![
            InstallState::Checking,
            InstallState::Downloading,
            InstallState::BackingUp,
            InstallState::Installing,
            InstallState::Finalizing,
            InstallState::Done,
        ]
    );
}

#[tokio::test]
async fn older_remote_release_leaves_install_untouched() {
    let fixture = Fixture::new(Some("1.0.1")).await;
    fixture
        .serve_release("v1.0.0", &["DeepSeekChat-windows.zip"])
        .await;
    fixture.serve_asset(release_zip(), 0).await;
    let before = snapshot(fixture.root());

    let (session, result) = fixture.run().await;

    assert_eq!(
        result.expect("check should succeed"),
        UpdateOutcome::UpToDate {
            current: "1.0.1".to_string(),
            latest: "1.0.0".to_string(),
        }
    );
    assert_eq!(session.state, InstallState::UpToDate);
    assert_eq!(fixture.backup_count(), 0);
    assert_eq!(snapshot(fixture.root()), before);
    assert_eq!(fixture.app.closes.load(Ordering::SeqCst), 0);
    assert_eq!(fixture.app.launches(), vec![fixture.root().join(EXE)]);
}

#[tokio::test]
async fn missing_platform_asset_fails_before_backup() {
    let fixture = Fixture::new(Some("1.0.0")).await;
    fixture
        .serve_release("v1.0.1", &["DeepSeekChat-linux.zip", "source.tar.gz"])
        .await;
    fixture.serve_asset(release_zip(), 0).await;
    let before = snapshot(fixture.root());

    let (session, result) = fixture.run().await;

    assert!(matches!(result, Err(UpdateError::AssetNotFound { .. })));
    assert_eq!(session.state, InstallState::Failed);
    assert!(!session.history.contains(&InstallState::BackingUp));
    assert_eq!(fixture.backup_count(), 0);
    assert_eq!(snapshot(fixture.root()), before);
    assert_eq!(fixture.app.closes.load(Ordering::SeqCst), 0);
    assert!(fixture.app.launches().is_empty());
}

#[tokio::test]
async fn corrupt_archive_is_rolled_back() {
    let fixture = Fixture::new(Some("1.0.0")).await;
    fixture
        .serve_release("v1.0.1", &["DeepSeekChat-windows.zip"])
        .await;
    fixture
        .serve_asset(b"PK\x03\x04 definitely not a zip".to_vec(), 1)
        .await;
    let before = snapshot(fixture.root());

    let (session, result) = fixture.run().await;

    let error = result.expect_err("corrupt archive should fail the update");
    assert!(matches!(error.root_cause(), UpdateError::CorruptArchive(_)));
    assert!(matches!(error, UpdateError::RolledBack { .. }));
    assert!(error.restored_backup().is_some_and(Path::is_dir));
    assert_eq!(fixture.backup_count(), 1);
    assert_eq!(snapshot(fixture.root()), before);
    assert_eq!(
        session.history[session.history.len() - 2..],
        [InstallState::Restoring, InstallState::Failed]
    );
    assert!(fixture.app.launches().is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn failed_version_write_restores_previous_files() {
    let fixture = Fixture::new(Some("1.0.0")).await;
    fixture
        .serve_release("v1.0.1", &["DeepSeekChat-windows.zip"])
        .await;
    // A directory named like the version file makes the final rename fail.
    let archive = build_zip(
        &["version.txt/"],
        &[(EXE, b"new-binary"), ("version.txt/stray", b"oops")],
    );
    fixture.serve_asset(archive, 1).await;
    let before = snapshot(fixture.root());

    let (session, result) = fixture.run().await;

    let error = result.expect_err("finalize failure should fail the update");
    assert!(matches!(error.root_cause(), UpdateError::Finalize { .. }));
    assert!(session.history.contains(&InstallState::Finalizing));
    assert_eq!(session.state, InstallState::Failed);
    assert_eq!(snapshot(fixture.root()), before);
    assert!(fixture.root().join("version.txt").is_file());
}

#[cfg(unix)]
#[tokio::test]
async fn failed_item_copy_restores_previous_files() {
    let fixture = Fixture::new(Some("1.0.0")).await;
    fixture
        .serve_release("v1.0.1", &["DeepSeekChat-windows.zip"])
        .await;
    // Writing through a dangling link fails, so one item cannot be installed.
    std::os::unix::fs::symlink("/nonexistent/seekdesk/extra.dll", fixture.root().join("extra.dll"))
        .expect("dangling link should be created");
    let archive = build_zip(&[], &[(EXE, b"new-binary"), ("extra.dll", b"new-library")]);
    fixture.serve_asset(archive, 1).await;
    let before = snapshot(fixture.root());

    let (session, result) = fixture.run().await;

    let error = result.expect_err("item failure should fail the update");
    assert!(matches!(error, UpdateError::RolledBack { .. }));
    let UpdateError::Install { failures } = error.root_cause() else {
        panic!("expected an install failure, got {error:?}");
    };
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].item, "extra.dll");
    assert_eq!(
        session.history[session.history.len() - 3..],
        [
            InstallState::Installing,
            InstallState::Restoring,
            InstallState::Failed,
        ]
    );
    assert_eq!(snapshot(fixture.root()), before);
    assert!(fixture.app.launches().is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn unrestorable_item_is_reported_alongside_install_failure() {
    let fixture = Fixture::new(Some("1.0.0")).await;
    fixture
        .serve_release("v1.0.1", &["DeepSeekChat-windows.zip"])
        .await;
    std::os::unix::fs::symlink("/nonexistent/seekdesk/extra.dll", fixture.root().join("extra.dll"))
        .expect("dangling link should be created");
    let archive = build_zip(&[], &[(EXE, b"new-binary"), ("extra.dll", b"new-library")]);
    fixture.serve_asset(archive, 1).await;

    // With room for a single event, `Restoring` cannot be sent until the
    // `Extracting` handler below has finished breaking the backup.
    let root = fixture.root().to_path_buf();
    let (tx, mut rx) = tokio::sync::mpsc::channel(1);
    let saboteur = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if matches!(event, UpdateProgress::Extracting) {
                break_backed_up_injection(&root);
            }
        }
    });

    let Fixture {
        installer,
        install,
        _cache,
        server: _server,
        app: _app,
    } = fixture;
    let installer = installer.with_progress(tx);
    let mut session = UpdateSession::default();
    let result = installer.run_session(&mut session).await;
    drop(installer);
    saboteur.await.expect("progress consumer should finish");

    let error = result.expect_err("update should fail");
    let UpdateError::Restore { failures, .. } = &error else {
        panic!("expected a partial restore, got {error:?}");
    };
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].item, "injection");
    assert!(matches!(error.root_cause(), UpdateError::Install { .. }));
    assert!(error.to_string().contains("extra.dll"));
    assert_eq!(session.state, InstallState::Failed);

    let root = install.path();
    assert_eq!(std::fs::read(root.join(EXE)).expect("exe"), b"old-binary");
    assert_eq!(
        std::fs::read_to_string(root.join("version.txt")).expect("version"),
        "1.0.0"
    );
}

/// Swap the snapshot copy of `injection` for a link to nowhere.
#[cfg(unix)]
fn break_backed_up_injection(root: &Path) {
    let backup = std::fs::read_dir(root)
        .expect("install dir should be readable")
        .flatten()
        .map(|entry| entry.path())
        .find(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with("backup_"))
        })
        .expect("backup should exist before extraction");
    let injection = backup.join("injection");
    std::fs::remove_dir_all(&injection).expect("backed up injection should be removed");
    std::os::unix::fs::symlink("/nonexistent/seekdesk/injection", &injection)
        .expect("dangling link should be created");
}

#[tokio::test]
async fn missing_executable_after_install_is_rolled_back() {
    let fixture = Fixture::new(Some("1.0.0")).await;
    fixture
        .serve_release("v1.0.1", &["DeepSeekChat-windows.zip"])
        .await;
    let archive = build_zip(&["DeepSeekChat.exe/"], &[("DeepSeekChat.exe/readme.txt", b"x")]);
    fixture.serve_asset(archive, 1).await;
    let before = snapshot(fixture.root());

    let (_session, result) = fixture.run().await;

    let error = result.expect_err("missing executable should fail the update");
    assert!(matches!(
        error.root_cause(),
        UpdateError::ExecutableMissing(_)
    ));
    assert_eq!(snapshot(fixture.root()), before);
    assert!(fixture.app.launches().is_empty());
}

#[tokio::test]
async fn fresh_install_without_version_file_is_updated() {
    let fixture = Fixture::new(None).await;
    fixture
        .serve_release("v0.1.0", &["DeepSeekChat-windows.zip"])
        .await;
    fixture.serve_asset(release_zip(), 1).await;

    let (_session, result) = fixture.run().await;

    assert!(matches!(
        result.expect("update should succeed"),
        UpdateOutcome::Updated { ref from, .. } if from == "0.0.0"
    ));
    assert_eq!(
        std::fs::read_to_string(fixture.root().join("version.txt")).expect("version"),
        "0.1.0"
    );
}

#[tokio::test]
async fn unreachable_release_endpoint_uses_exact_retry_budget() {
    let fixture = Fixture::with_config(Some("1.0.0"), |config| {
        config.retry_delays_secs = vec![0; MAX_RETRIES];
    })
    .await;
    Mock::given(method("GET"))
        .and(path(RELEASE_PATH))
        .respond_with(ResponseTemplate::new(500))
        .expect(MAX_RETRIES as u64)
        .mount(&fixture.server)
        .await;
    let before = snapshot(fixture.root());

    let (_session, result) = fixture.run().await;

    assert!(matches!(
        result,
        Err(UpdateError::Network { attempts, .. }) if attempts == MAX_RETRIES
    ));
    let requests = fixture
        .server
        .received_requests()
        .await
        .expect("request recording should be enabled");
    assert_eq!(requests.len(), MAX_RETRIES);
    assert_eq!(snapshot(fixture.root()), before);
}

#[tokio::test]
async fn failed_download_aborts_without_backup() {
    let fixture = Fixture::new(Some("1.0.0")).await;
    fixture
        .serve_release("v1.0.1", &["DeepSeekChat-windows.zip"])
        .await;
    Mock::given(method("GET"))
        .and(path(ASSET_PATH))
        .respond_with(ResponseTemplate::new(404))
        .expect(3)
        .mount(&fixture.server)
        .await;
    let before = snapshot(fixture.root());

    let (session, result) = fixture.run().await;

    assert!(matches!(
        result,
        Err(UpdateError::Download { attempts: 3, .. })
    ));
    assert!(!session.history.contains(&InstallState::Restoring));
    assert_eq!(fixture.backup_count(), 0);
    assert_eq!(snapshot(fixture.root()), before);
}

#[tokio::test]
async fn concurrent_run_is_rejected_by_install_lock() {
    let fixture = Fixture::new(Some("1.0.0")).await;
    let lock_path = AppPaths::for_install_dir(fixture.root()).lock_file();
    let _held = InstallLock::acquire(&lock_path).expect("lock should be free");

    let (_session, result) = fixture.run().await;

    assert!(matches!(result, Err(UpdateError::Locked(_))));
    let requests = fixture
        .server
        .received_requests()
        .await
        .expect("request recording should be enabled");
    assert!(requests.is_empty());
}

#[tokio::test]
async fn progress_channel_ends_with_completion() {
    let install = Fixture::new(Some("1.0.0")).await;
    install
        .serve_release("v1.0.1", &["DeepSeekChat-windows.zip"])
        .await;
    install.serve_asset(release_zip(), 1).await;
    let (tx, mut rx) = tokio::sync::mpsc::channel(256);
    let collector = tokio::spawn(async move {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    });

    let Fixture {
        installer,
        install: _install,
        _cache,
        server: _server,
        app: _app,
    } = install;
    let installer = installer.with_progress(tx);
    installer.run().await.expect("update should succeed");
    drop(installer);

    let events = collector.await.expect("collector should finish");
    assert!(matches!(events.first(), Some(UpdateProgress::Checking)));
    assert!(
        events
            .iter()
            .any(|event| matches!(event, UpdateProgress::Downloading { .. }))
    );
    assert!(matches!(
        events.last(),
        Some(UpdateProgress::Complete(UpdateOutcome::Updated { .. }))
    ));
}
