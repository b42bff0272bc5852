//! Executor backed by the helm binary
//!
//! Status is read with `helm status --output json`, falling back to the
//! `KEY: value` table older binaries print. Diffs use the helm-diff plugin
//! with `--detailed-exitcode` (exit 2 means changes). Inline values are
//! staged as temporary files so every `--values` flag keeps its position.

use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tempfile::NamedTempFile;

use super::{DiffOutcome, Executor, OutputDialect, ReleaseStatus, ReleaseTarget, ValuesSource, identity_flags};
use crate::error::{KubeError, Result};

/// Exit code helm-diff uses for "changes present"
const DIFF_CHANGES_EXIT_CODE: i32 = 2;

/// Runs helm commands for each release
#[derive(Debug, Clone)]
pub struct HelmExecutor {
    binary: String,
}

/// `--values` paths for one invocation, in declaration order
///
/// Staged files are removed when this is dropped.
struct StagedValues {
    paths: Vec<PathBuf>,
    _staged: Vec<NamedTempFile>,
}

impl StagedValues {
    fn stage(target: &ReleaseTarget) -> Result<Self> {
        let mut paths = Vec::new();
        let mut staged = Vec::new();

        for source in target.values_sources() {
            match source {
                ValuesSource::File(path) => paths.push(path),
                ValuesSource::Inline(values) => {
                    let mut file = tempfile::Builder::new()
                        .prefix("sherpfile-values-")
                        .suffix(".yaml")
                        .tempfile()?;
                    file.write_all(serde_yaml::to_string(values.inner())?.as_bytes())?;
                    file.flush()?;
                    paths.push(file.path().to_path_buf());
                    staged.push(file);
                }
            }
        }

        Ok(Self { paths, _staged: staged })
    }
}

/// Captured output of one helm invocation
struct CommandOutput {
    code: Option<i32>,
    stdout: String,
    stderr: String,
}

impl HelmExecutor {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Arguments for `status`
    pub fn status_args(target: &ReleaseTarget) -> Vec<String> {
        let mut args = vec!["status".to_string(), target.release.name.clone()];
        args.extend(identity_flags(&target.id()));
        args.extend(["--output".to_string(), "json".to_string()]);
        args
    }

    /// Arguments for `diff upgrade`
    pub fn diff_args(target: &ReleaseTarget, values: &[PathBuf]) -> Vec<String> {
        let mut args = vec![
            "diff".to_string(),
            "upgrade".to_string(),
            target.release.name.clone(),
            target.release.chart.clone(),
            "--detailed-exitcode".to_string(),
            "--allow-unreleased".to_string(),
        ];
        args.extend(Self::chart_flags(target, values));
        args
    }

    /// Arguments for `upgrade --install`
    pub fn upgrade_args(target: &ReleaseTarget, values: &[PathBuf]) -> Vec<String> {
        let mut args = vec![
            "upgrade".to_string(),
            "--install".to_string(),
            target.release.name.clone(),
            target.release.chart.clone(),
        ];
        args.extend(Self::chart_flags(target, values));

        let release = &target.release;
        if release.wait.unwrap_or(false) {
            args.push("--wait".to_string());
        }
        if let Some(timeout) = release.timeout {
            args.push("--timeout".to_string());
            args.push(format!("{}s", timeout));
        }
        if release.create_namespace.unwrap_or(false) {
            args.push("--create-namespace".to_string());
        }
        args.extend(target.args.iter().cloned());
        args
    }

    /// Arguments for removing a release
    ///
    /// Tiller-managed releases are purged with `delete --purge`.
    pub fn delete_args(target: &ReleaseTarget) -> Vec<String> {
        let mut args = if target.release.tiller_namespace.is_empty() {
            vec!["uninstall".to_string(), target.release.name.clone()]
        } else {
            vec![
                "delete".to_string(),
                "--purge".to_string(),
                target.release.name.clone(),
            ]
        };
        args.extend(identity_flags(&target.id()));
        args
    }

    /// Version, identity, values and `--set` flags shared by diff and upgrade
    fn chart_flags(target: &ReleaseTarget, values: &[PathBuf]) -> Vec<String> {
        let release = &target.release;
        let mut flags = Vec::new();

        if let Some(version) = &release.version {
            flags.push("--version".to_string());
            flags.push(version.clone());
        }
        flags.extend(identity_flags(&target.id()));

        for file in values {
            flags.push("--values".to_string());
            flags.push(file.display().to_string());
        }
        for set in &release.set {
            flags.push("--set".to_string());
            flags.push(set.to_arg());
        }
        flags
    }

    async fn run(&self, target: &ReleaseTarget, args: &[String]) -> Result<CommandOutput> {
        tracing::debug!(release = %target.id(), "{} {}", self.binary, args.join(" "));

        let child = tokio::process::Command::new(&self.binary)
            .args(args)
            .current_dir(&target.base_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| KubeError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        let output = child.wait_with_output().await?;
        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    fn failure(target: &ReleaseTarget, args: &[String], output: &CommandOutput) -> KubeError {
        let message = match output.stderr.trim() {
            "" => format!("exit code {}", output.code.map_or("none".to_string(), |c| c.to_string())),
            stderr => stderr.to_string(),
        };
        KubeError::Command {
            release: target.id().to_string(),
            command: args.iter().take(2).cloned().collect::<Vec<_>>().join(" "),
            message,
        }
    }
}

/// Read `helm status` output in either dialect
pub fn parse_status(release: &str, stdout: &str) -> Result<ReleaseStatus> {
    if let Ok(json) = serde_json::from_str::<JsonValue>(stdout) {
        let revision = json.get("version").and_then(JsonValue::as_u64);
        let status = json
            .pointer("/info/status")
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
            .to_string();
        return Ok(ReleaseStatus {
            exists: true,
            revision,
            status,
            dialect: OutputDialect::Json,
        });
    }

    let mut revision = None;
    let mut status = None;
    for line in stdout.lines() {
        if let Some((key, value)) = line.split_once(':') {
            match key.trim() {
                "REVISION" => revision = value.trim().parse().ok(),
                "STATUS" => status = Some(value.trim().to_lowercase()),
                _ => {}
            }
        }
    }

    match status {
        Some(status) => Ok(ReleaseStatus {
            exists: true,
            revision,
            status,
            dialect: OutputDialect::Table,
        }),
        None => Err(KubeError::Status {
            release: release.to_string(),
            message: "no STATUS in helm output".to_string(),
        }),
    }
}

fn is_not_found(stderr: &str) -> bool {
    stderr.to_lowercase().contains("not found")
}

#[async_trait]
impl Executor for HelmExecutor {
    async fn status(&self, target: &ReleaseTarget) -> Result<ReleaseStatus> {
        let args = Self::status_args(target);
        let output = self.run(target, &args).await?;
        match output.code {
            Some(0) => parse_status(&target.release.name, &output.stdout),
            _ if is_not_found(&output.stderr) => Ok(ReleaseStatus::absent()),
            _ => Err(Self::failure(target, &args, &output)),
        }
    }

    async fn diff(&self, target: &ReleaseTarget) -> Result<DiffOutcome> {
        let values = StagedValues::stage(target)?;
        let args = Self::diff_args(target, &values.paths);
        let output = self.run(target, &args).await?;
        match output.code {
            Some(0) => Ok(DiffOutcome::NoChanges),
            Some(DIFF_CHANGES_EXIT_CODE) => Ok(DiffOutcome::Changes(output.stdout)),
            _ => Err(Self::failure(target, &args, &output)),
        }
    }

    async fn apply(&self, target: &ReleaseTarget) -> Result<()> {
        let values = StagedValues::stage(target)?;
        let args = Self::upgrade_args(target, &values.paths);
        let output = self.run(target, &args).await?;
        match output.code {
            Some(0) => Ok(()),
            _ => Err(Self::failure(target, &args, &output)),
        }
    }

    async fn delete(&self, target: &ReleaseTarget) -> Result<()> {
        let args = Self::delete_args(target);
        let output = self.run(target, &args).await?;
        match output.code {
            Some(0) => Ok(()),
            _ => Err(Self::failure(target, &args, &output)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sherpfile_core::ReleaseSpec;

    fn target(yaml: &str) -> ReleaseTarget {
        let release: ReleaseSpec = serde_yaml::from_str(yaml).unwrap();
        ReleaseTarget::new(release, "/work")
    }

    #[test]
    fn test_upgrade_args() {
        let t = target(
            r#"
name: api
chart: ./charts/api
version: 1.2.3
namespace: backend
values: [api.yaml]
set: [{name: image.tag, value: v2}]
wait: true
timeout: 600
createNamespace: true
"#,
        )
        .with_args(vec!["--atomic".to_string()]);

        let values = StagedValues::stage(&t).unwrap();
        assert_eq!(
            HelmExecutor::upgrade_args(&t, &values.paths).join(" "),
            "upgrade --install api ./charts/api --version 1.2.3 --namespace backend \
             --values /work/api.yaml --set image.tag=v2 \
             --wait --timeout 600s --create-namespace --atomic"
        );
    }

    #[test]
    fn test_inline_values_keep_their_position() {
        let t = target("name: api\nchart: c\nvalues: [{replicas: 1}, override.yaml, {replicas: 5}]\n");
        let values = StagedValues::stage(&t).unwrap();

        assert_eq!(values.paths.len(), 3);
        assert_eq!(values.paths[1], PathBuf::from("/work/override.yaml"));
        assert_eq!(std::fs::read_to_string(&values.paths[0]).unwrap(), "replicas: 1\n");
        assert_eq!(std::fs::read_to_string(&values.paths[2]).unwrap(), "replicas: 5\n");
        assert_eq!(
            HelmExecutor::upgrade_args(&t, &values.paths).join(" "),
            format!(
                "upgrade --install api c --values {} --values /work/override.yaml --values {}",
                values.paths[0].display(),
                values.paths[2].display()
            )
        );

        let staged = values.paths.clone();
        drop(values);
        assert!(!staged[0].exists());
        assert!(!staged[2].exists());
    }

    #[test]
    fn test_diff_args_skip_mutating_flags() {
        let t = target("name: web\nchart: charts/web\nwait: true\n");
        assert_eq!(
            HelmExecutor::diff_args(&t, &[]).join(" "),
            "diff upgrade web charts/web --detailed-exitcode --allow-unreleased"
        );
    }

    #[test]
    fn test_status_and_delete_args() {
        let t = target("name: web\nchart: c\nnamespace: front\nkubeContext: dev\n");
        assert_eq!(
            HelmExecutor::status_args(&t).join(" "),
            "status web --kube-context dev --namespace front --output json"
        );
        assert_eq!(
            HelmExecutor::delete_args(&t).join(" "),
            "uninstall web --kube-context dev --namespace front"
        );

        let tiller = target("name: old\nchart: c\ntillerNamespace: kube-system\n");
        assert_eq!(
            HelmExecutor::delete_args(&tiller).join(" "),
            "delete --purge old --tiller-namespace kube-system"
        );
    }

    #[test]
    fn test_parse_status_json() {
        let status = parse_status("api", r#"{"name":"api","version":4,"info":{"status":"deployed"}}"#).unwrap();
        assert!(status.exists);
        assert_eq!(status.revision, Some(4));
        assert_eq!(status.status, "deployed");
        assert_eq!(status.dialect, OutputDialect::Json);
    }

    #[test]
    fn test_parse_status_table() {
        let stdout = "LAST DEPLOYED: Mon Jan  1 00:00:00 2024\nNAMESPACE: apps\nSTATUS: DEPLOYED\nREVISION: 7\n";
        let status = parse_status("api", stdout).unwrap();
        assert_eq!(status.revision, Some(7));
        assert_eq!(status.status, "deployed");
        assert_eq!(status.dialect, OutputDialect::Table);

        assert!(parse_status("api", "garbage").is_err());
    }

    #[test]
    fn test_not_found_detection() {
        assert!(is_not_found("Error: release: not found"));
        assert!(!is_not_found("Error: Kubernetes cluster unreachable"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_large_output_does_not_block_apply() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let helm = dir.path().join("helm");
        std::fs::write(
            &helm,
            "#!/bin/sh\nhead -c 300000 /dev/zero | tr '\\0' x\nhead -c 300000 /dev/zero | tr '\\0' y >&2\nexit 0\n",
        )
        .unwrap();
        std::fs::set_permissions(&helm, std::fs::Permissions::from_mode(0o755)).unwrap();

        let release: ReleaseSpec = serde_yaml::from_str("name: api\nchart: c\nvalues: [{replicas: 1}]\n").unwrap();
        let t = ReleaseTarget::new(release, dir.path());
        let executor = HelmExecutor::new(helm.display().to_string());

        let applied = tokio::time::timeout(std::time::Duration::from_secs(30), executor.apply(&t)).await;
        assert!(matches!(applied, Ok(Ok(()))));
    }
}
