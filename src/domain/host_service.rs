//! Host service — the catalog of host operations.
//!
//! Each operation is a fixed pipeline template, run through
//! [`crate::pipeline::run`], whose last-stage output goes to one parser.
//! Spawn, wait and timeout errors propagate; failed stages and malformed
//! output degrade to a sentinel (`None`, `false`, `0`).

use std::path::Path;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::config::Config;
use crate::domain::parsers::{self, MalformedOutputError};
use crate::domain::types::{ContainerList, ContainerStats, DiskUsage, UpdateEntry};
use crate::pipeline::{
    self, Credential, FailurePolicy, PipelineError, PipelineOutcome, PipelineSpec, StageSpec,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContainerAction {
    Start,
    Stop,
    Restart,
}

impl ContainerAction {
    fn verb(self) -> &'static str {
        match self {
            ContainerAction::Start => "start",
            ContainerAction::Stop => "stop",
            ContainerAction::Restart => "restart",
        }
    }
}

pub struct HostService {
    escalation_program: String,
    escalation_args: Vec<String>,
    container_engine: String,
    public_ip_url: String,
    timeout: Option<Duration>,
}

impl HostService {
    pub fn new(config: &Config) -> Self {
        Self {
            escalation_program: config.escalation.program.clone(),
            escalation_args: config.escalation.args.clone(),
            container_engine: config.container_engine.clone(),
            public_ip_url: config.public_ip_url.clone(),
            timeout: config.timeout(),
        }
    }

    // ── Pipeline helpers ───────────────────────────────────

    /// `<escalation> <program> <args...>`, e.g. `sudo -S apt update`.
    fn privileged(&self, program: &str, args: &[&str]) -> StageSpec {
        let mut full_args = self.escalation_args.clone();
        full_args.push(program.to_string());
        full_args.extend(args.iter().map(|a| a.to_string()));
        StageSpec::new(self.escalation_program.clone(), full_args)
    }

    async fn run(
        &self,
        spec: &PipelineSpec,
        credential: Option<&Credential>,
    ) -> Result<PipelineOutcome, PipelineError> {
        debug!(pipeline = %spec, "running");
        pipeline::run(spec, credential, self.timeout).await
    }

    /// Run and return the last stage's stdout, or `None` if the pipeline failed.
    async fn run_for_output(
        &self,
        spec: &PipelineSpec,
        credential: Option<&Credential>,
    ) -> Result<Option<String>, PipelineError> {
        let outcome = self.run(spec, credential).await?;
        if !outcome.succeeded() {
            error!(pipeline = %spec, failed_stage = ?outcome.failed_stage, "command not ended successfully");
            return Ok(None);
        }
        debug!(pipeline = %spec, "command ended with success");
        Ok(Some(outcome.final_stage.stdout_text()))
    }

    // ── Packages ───────────────────────────────────────────

    /// Refresh the package index, then list upgradable packages.
    pub async fn check_updates(
        &self,
        credential: &Credential,
    ) -> Result<Option<Vec<UpdateEntry>>, PipelineError> {
        let refresh = PipelineSpec::new(self.privileged("apt", &["update"]));
        if self.run_for_output(&refresh, Some(credential)).await?.is_none() {
            return Ok(None);
        }

        let list = PipelineSpec::new(self.privileged("apt", &["list", "--upgradable"]));
        let Some(raw) = self.run_for_output(&list, Some(credential)).await? else {
            return Ok(None);
        };

        let updates = degrade(parsers::parse_update_list(&raw));
        if let Some(updates) = &updates {
            debug!(count = updates.len(), "update list generated");
        }
        Ok(updates)
    }

    /// Upgrade every package; returns how many were upgraded (0 on failure).
    pub async fn apply_updates(&self, credential: &Credential) -> Result<u32, PipelineError> {
        let spec = PipelineSpec::new(self.privileged("apt", &["upgrade", "-y"]));
        let Some(raw) = self.run_for_output(&spec, Some(credential)).await? else {
            return Ok(0);
        };

        let count = degrade(parsers::parse_upgrade_count(&raw)).unwrap_or(0);
        debug!(count, "packages updated");
        Ok(count)
    }

    /// Installed package count from `dpkg -l | grep -c ^ii`.
    ///
    /// `grep -c` exits 1 when it counts zero lines, so the exit status is
    /// ignored and only the printed number matters.
    pub async fn installed_package_count(&self) -> Result<u64, PipelineError> {
        let spec = PipelineSpec::new(StageSpec::new("dpkg", ["-l"]))
            .pipe(StageSpec::new("grep", ["-c", "^ii"]))
            .with_policy(FailurePolicy::FinalStage);

        let outcome = self.run(&spec, None).await?;
        Ok(parsers::parse_count(&outcome.final_stage.stdout_text()).unwrap_or(0))
    }

    // ── Power ──────────────────────────────────────────────

    pub async fn reboot(&self, credential: &Credential) -> Result<bool, PipelineError> {
        let spec = PipelineSpec::new(self.privileged("reboot", &["now"]));
        Ok(self.run_for_output(&spec, Some(credential)).await?.is_some())
    }

    pub async fn shutdown(&self, credential: &Credential) -> Result<bool, PipelineError> {
        let spec = PipelineSpec::new(self.privileged("shutdown", &["now"]));
        Ok(self.run_for_output(&spec, Some(credential)).await?.is_some())
    }

    // ── Containers ─────────────────────────────────────────

    pub async fn list_containers(
        &self,
        credential: &Credential,
    ) -> Result<Option<ContainerList>, PipelineError> {
        let spec = PipelineSpec::new(self.privileged(
            &self.container_engine,
            &["ps", "-a", "--format", "{{.Names}} {{.State}} {{.RunningFor}}"],
        ));
        let Some(raw) = self.run_for_output(&spec, Some(credential)).await? else {
            return Ok(None);
        };
        Ok(degrade(parsers::parse_container_list(&raw)))
    }

    pub async fn start_container(
        &self,
        credential: &Credential,
        name: &str,
    ) -> Result<bool, PipelineError> {
        self.container_action(credential, name, ContainerAction::Start)
            .await
    }

    pub async fn stop_container(
        &self,
        credential: &Credential,
        name: &str,
    ) -> Result<bool, PipelineError> {
        self.container_action(credential, name, ContainerAction::Stop)
            .await
    }

    pub async fn restart_container(
        &self,
        credential: &Credential,
        name: &str,
    ) -> Result<bool, PipelineError> {
        self.container_action(credential, name, ContainerAction::Restart)
            .await
    }

    /// The engine echoes the container name on success.
    async fn container_action(
        &self,
        credential: &Credential,
        name: &str,
        action: ContainerAction,
    ) -> Result<bool, PipelineError> {
        if !is_valid_container_name(name) {
            warn!(container = %name, "refusing container name");
            return Ok(false);
        }

        let spec = PipelineSpec::new(self.privileged(&self.container_engine, &[action.verb(), name]));
        let Some(raw) = self.run_for_output(&spec, Some(credential)).await? else {
            return Ok(false);
        };

        let echoed = parsers::first_line(&raw).unwrap_or_default();
        Ok(echoed.to_lowercase() == name.to_lowercase())
    }

    pub async fn container_stats(
        &self,
        credential: &Credential,
        name: &str,
    ) -> Result<Option<ContainerStats>, PipelineError> {
        if !is_valid_container_name(name) {
            warn!(container = %name, "refusing container name");
            return Ok(None);
        }

        let spec = PipelineSpec::new(self.privileged(
            &self.container_engine,
            &[
                "stats",
                "--no-stream",
                "--format",
                "{{.Name}}|{{.CPUPerc}}|{{.MemUsage}}|{{.NetIO}}|{{.BlockIO}}",
            ],
        ));
        let Some(raw) = self.run_for_output(&spec, Some(credential)).await? else {
            return Ok(None);
        };

        let stats = degrade(parsers::parse_container_stats(&raw, name)).flatten();
        if stats.is_none() {
            warn!(container = %name, "no stats for container");
        }
        Ok(stats)
    }

    // ── Disks ──────────────────────────────────────────────

    /// Zeroed usage when `path` does not exist or `df` fails.
    pub async fn disk_usage(&self, path: &Path) -> Result<DiskUsage, PipelineError> {
        if !path.exists() {
            warn!(path = %path.display(), "path does not exist");
            return Ok(DiskUsage::default());
        }

        let target = path.to_string_lossy();
        let spec = PipelineSpec::new(StageSpec::new("df", ["-kP", &*target]));
        let Some(raw) = self.run_for_output(&spec, None).await? else {
            return Ok(DiskUsage::default());
        };
        Ok(degrade(parsers::parse_disk_usage(&raw)).unwrap_or_default())
    }

    /// Model (or device name) of the disk mounted at `mountpoint`.
    pub async fn disk_label(&self, mountpoint: &str) -> Result<Option<String>, PipelineError> {
        let spec = PipelineSpec::new(StageSpec::new(
            "lsblk",
            ["-J", "-o", "NAME,MOUNTPOINT,MODEL"],
        ));
        let Some(raw) = self.run_for_output(&spec, None).await? else {
            return Ok(None);
        };
        Ok(Some(
            degrade(parsers::parse_disk_label(&raw, mountpoint)).unwrap_or_default(),
        ))
    }

    // ── Processes ──────────────────────────────────────────

    /// Command name of the busiest process in a `top` snapshot.
    ///
    /// `head` closing early can kill `top` with SIGPIPE, so only the last
    /// stage's status counts.
    pub async fn hottest_process(&self) -> Result<Option<String>, PipelineError> {
        let spec = PipelineSpec::new(StageSpec::new("top", ["-b", "-n", "1"]))
            .pipe(StageSpec::new("head", ["-n", "8"]))
            .pipe(StageSpec::new("tail", ["-n", "1"]))
            .with_policy(FailurePolicy::FinalStage);

        let Some(raw) = self.run_for_output(&spec, None).await? else {
            return Ok(None);
        };
        Ok(degrade(parsers::parse_hot_process(&raw)))
    }

    // ── Identity ───────────────────────────────────────────

    pub async fn kernel_version(&self) -> Result<Option<String>, PipelineError> {
        let spec = PipelineSpec::new(StageSpec::new("uname", ["-r"]));
        Ok(self
            .run_for_output(&spec, None)
            .await?
            .and_then(|raw| parsers::first_line(&raw)))
    }

    pub async fn hostname(&self) -> Result<Option<String>, PipelineError> {
        let spec = PipelineSpec::new(StageSpec::new("hostname", Vec::<String>::new()));
        Ok(self
            .run_for_output(&spec, None)
            .await?
            .and_then(|raw| parsers::first_line(&raw)))
    }

    pub async fn public_ip(&self) -> Result<Option<String>, PipelineError> {
        let spec = PipelineSpec::new(StageSpec::new(
            "curl",
            ["-s", self.public_ip_url.as_str()],
        ));
        Ok(self
            .run_for_output(&spec, None)
            .await?
            .and_then(|raw| parsers::first_line(&raw)))
    }

    pub async fn local_ip(&self) -> Result<Option<String>, PipelineError> {
        let spec = PipelineSpec::new(StageSpec::new("hostname", ["-I"]));
        Ok(self
            .run_for_output(&spec, None)
            .await?
            .and_then(|raw| parsers::first_token(&raw)))
    }
}

/// Malformed output becomes `None` after a warning.
fn degrade<T>(parsed: Result<T, MalformedOutputError>) -> Option<T> {
    parsed
        .map_err(|e| warn!(error = %e, "unexpected command output"))
        .ok()
}

/// Names are passed as one argv element; a leading `-` would still be read
/// as an option by the engine.
fn is_valid_container_name(name: &str) -> bool {
    !name.is_empty() && !name.starts_with('-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EscalationConfig;

    /// Stands in for `sudo -S <engine> ...`: checks the relayed credential,
    /// then prints `output` instead of running the engine.
    fn fake_escalation(output: &str) -> Config {
        let script = format!(
            "read -r secret; [ \"$secret\" = hunter2 ] || exit 1; printf '%s' '{}'",
            output
        );
        Config {
            escalation: EscalationConfig {
                program: "sh".into(),
                args: vec!["-c".into(), script, "escalate".into()],
            },
            timeout_secs: 10,
            ..Config::default()
        }
    }

    fn password() -> Credential {
        Credential::new("hunter2")
    }

    #[tokio::test]
    async fn test_start_container_confirms_echoed_name() {
        let service = HostService::new(&fake_escalation("web\n"));

        assert!(service.start_container(&password(), "web").await.unwrap());
        assert!(service.restart_container(&password(), "WEB").await.unwrap());
        assert!(!service.stop_container(&password(), "api").await.unwrap());
    }

    #[tokio::test]
    async fn test_wrong_credential_returns_sentinel() {
        let service = HostService::new(&fake_escalation("web\n"));
        let wrong = Credential::new("letmein");

        assert!(!service.start_container(&wrong, "web").await.unwrap());
        assert!(!service.reboot(&wrong).await.unwrap());
        assert_eq!(service.list_containers(&wrong).await.unwrap(), None);
        assert_eq!(service.apply_updates(&wrong).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_option_like_container_name_is_refused() {
        let service = HostService::new(&fake_escalation("--help\n"));

        assert!(!service.start_container(&password(), "--help").await.unwrap());
        assert_eq!(service.container_stats(&password(), "").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_list_containers_parses_engine_output() {
        let service = HostService::new(&fake_escalation("web running 3 hours\napi exited 2 days\n"));

        let list = service.list_containers(&password()).await.unwrap().unwrap();

        assert_eq!(list.items, 2);
        assert_eq!(list.containers[0].name, "api");
        assert_eq!(list.containers[1].name, "web");
    }

    #[tokio::test]
    async fn test_container_stats_not_found() {
        let service = HostService::new(&fake_escalation("redis|2.3%|10MiB/1GiB|1kB/2kB|0B/0B\n"));

        let found = service.container_stats(&password(), "redis").await.unwrap();
        let missing = service.container_stats(&password(), "missing").await.unwrap();

        assert_eq!(found.unwrap().ram, "10MiB/1GiB");
        assert_eq!(missing, None);
    }

    #[tokio::test]
    async fn test_check_updates_runs_both_pipelines() {
        let service = HostService::new(&fake_escalation(
            "Listing...\ncurl/jammy 8.0 amd64 [upgradable from: 7.9]\n",
        ));

        let updates = service.check_updates(&password()).await.unwrap().unwrap();

        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].package, "curl/jammy");
        assert_eq!(updates[0].from_version, "7.9");
        assert_eq!(updates[0].to_version, "8.0");
    }

    #[tokio::test]
    async fn test_check_updates_header_only_is_empty() {
        let service = HostService::new(&fake_escalation("Listing...\n"));

        let updates = service.check_updates(&password()).await.unwrap();

        assert_eq!(updates, Some(Vec::new()));
    }

    #[tokio::test]
    async fn test_failed_second_stage_degrades_to_sentinel() {
        let service = HostService::new(&Config::default());
        let spec = PipelineSpec::new(StageSpec::new("printf", ["web\\n"]))
            .pipe(StageSpec::new("sh", ["-c", "cat >/dev/null; exit 1"]));

        let outcome = service.run(&spec, None).await.unwrap();
        assert_eq!(outcome.failed_stage, Some(1));

        let output = service.run_for_output(&spec, None).await.unwrap();
        assert_eq!(output, None);
    }

    #[tokio::test]
    async fn test_missing_escalation_program_is_fatal() {
        let config = Config {
            escalation: EscalationConfig {
                program: "servpilot-no-such-sudo".into(),
                args: vec![],
            },
            ..Config::default()
        };
        let service = HostService::new(&config);

        let err = service.reboot(&password()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_missing_disk_path_is_zeroed() {
        let service = HostService::new(&Config::default());

        let usage = service
            .disk_usage(Path::new("/servpilot/does/not/exist"))
            .await
            .unwrap();

        assert_eq!(usage, DiskUsage::default());
        assert_eq!(usage.total, parsers::bytes_to_human(0));
        assert_eq!(usage.free, "0.0B");
    }
}
