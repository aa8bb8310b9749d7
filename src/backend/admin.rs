//! Pool and realm administration through the storage command-line tools.
//!
//! `ceph` manages pools and `radosgw-admin` manages the realm, zone group and
//! zone. Both are run through a [`CommandExecutor`] so tests can script their
//! output. Every operation reads the current state first and only issues a
//! mutating command when something differs.

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info};

use crate::controller::error::{Error, Result};
use crate::crd::PoolSpec;

/// Exit code the admin tools use for a missing entity (ENOENT).
const NOT_FOUND_EXIT_CODE: i32 = 2;
/// Placement groups for newly created pools. The autoscaler adjusts them later.
const DEFAULT_PG_COUNT: &str = "8";
/// Application tag for gateway pools.
pub const RGW_APPLICATION: &str = "rgw";

/// Locations of the admin tools and their configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdminConfig {
    pub ceph_bin: String,
    pub rgw_admin_bin: String,
    /// Directory holding `<namespace>/<namespace>.config` and the admin keyring.
    pub config_dir: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            ceph_bin: "ceph".to_string(),
            rgw_admin_bin: "radosgw-admin".to_string(),
            config_dir: "/var/lib/rook".to_string(),
        }
    }
}

/// Captured result of a finished command.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn is_not_found(&self) -> bool {
        self.code == Some(NOT_FOUND_EXIT_CODE)
    }
}

/// Runs an external program to completion.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, program: &str, args: &[String]) -> Result<CommandOutput>;
}

/// Executes commands as child processes.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessExecutor;

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn execute(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        debug!(program = %program, args = ?args, "Running command");
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::Command {
                program: program.to_string(),
                message: format!("failed to run: {}", e),
            })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Realm, zone group and zone for one store, all sharing its name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RealmConfig {
    pub name: String,
    /// Endpoint URL advertised by the zone group and zone.
    pub endpoint: String,
}

/// Storage-side administration used by the provisioner.
#[async_trait]
pub trait StorageAdmin: Send + Sync {
    /// Create the pool if missing, or converge its crush rule, size and
    /// application tag if they drifted.
    async fn ensure_pool(&self, namespace: &str, name: &str, spec: &PoolSpec) -> Result<()>;

    /// Delete the pool if it exists.
    async fn delete_pool(&self, namespace: &str, name: &str) -> Result<()>;

    /// Create or update the realm, committing a period whenever the zone
    /// config changed or the committed period does not match it yet.
    /// Returns whether a period was committed.
    async fn ensure_realm(&self, namespace: &str, realm: &RealmConfig) -> Result<bool>;

    /// Delete the zone, zone group and realm if they exist.
    async fn delete_realm(&self, namespace: &str, name: &str) -> Result<()>;
}

#[derive(Deserialize)]
struct PoolSize {
    size: u32,
}

#[derive(Deserialize)]
struct PoolCrushRule {
    crush_rule: String,
}

/// Output of `osd pool application get`, keyed by application name.
type PoolApplications = std::collections::BTreeMap<String, serde_json::Value>;

#[derive(Default, Deserialize)]
struct Period {
    #[serde(default)]
    period_map: PeriodMap,
}

#[derive(Default, Deserialize)]
struct PeriodMap {
    #[serde(default)]
    zonegroups: Vec<PeriodZoneGroup>,
}

#[derive(Deserialize)]
struct PeriodZoneGroup {
    name: String,
    #[serde(default)]
    endpoints: Vec<String>,
    #[serde(default)]
    zones: Vec<PeriodZone>,
}

#[derive(Deserialize)]
struct PeriodZone {
    name: String,
    #[serde(default)]
    endpoints: Vec<String>,
}

impl Period {
    /// Whether the committed period already carries the zone group and zone
    /// named `name` at `endpoint`.
    fn advertises(&self, name: &str, endpoint: &str) -> bool {
        self.period_map.zonegroups.iter().any(|zg| {
            zg.name == name
                && zg.endpoints == [endpoint]
                && zg
                    .zones
                    .iter()
                    .any(|z| z.name == name && z.endpoints == [endpoint])
        })
    }
}

#[derive(Deserialize)]
struct EndpointList {
    #[serde(default)]
    endpoints: Vec<String>,
}

/// [`StorageAdmin`] backed by `ceph` and `radosgw-admin`.
pub struct CliStorageAdmin {
    config: AdminConfig,
    executor: Arc<dyn CommandExecutor>,
}

impl CliStorageAdmin {
    pub fn new(config: AdminConfig, executor: Arc<dyn CommandExecutor>) -> Self {
        Self { config, executor }
    }

    /// Connection arguments for the cluster in `namespace`.
    fn connection_args(&self, namespace: &str) -> Vec<String> {
        let dir = self.config.config_dir.trim_end_matches('/');
        vec![
            format!("--cluster={}", namespace),
            format!("--conf={}/{}/{}.config", dir, namespace, namespace),
            format!("--keyring={}/{}/client.admin.keyring", dir, namespace),
        ]
    }

    async fn run(&self, program: &str, namespace: &str, args: &[&str]) -> Result<CommandOutput> {
        let mut full_args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        full_args.extend(self.connection_args(namespace));
        full_args.push("--format=json".to_string());
        self.executor.execute(program, &full_args).await
    }

    /// Run and fail on a non-zero exit.
    async fn run_checked(&self, program: &str, namespace: &str, args: &[&str]) -> Result<String> {
        let output = self.run(program, namespace, args).await?;
        if !output.is_success() {
            return Err(command_error(program, args, &output));
        }
        Ok(output.stdout)
    }

    /// Run a query, mapping "not found" to `None`.
    async fn run_query(
        &self,
        program: &str,
        namespace: &str,
        args: &[&str],
    ) -> Result<Option<String>> {
        let output = self.run(program, namespace, args).await?;
        if output.is_not_found() {
            return Ok(None);
        }
        if !output.is_success() {
            return Err(command_error(program, args, &output));
        }
        Ok(Some(output.stdout))
    }

    async fn ceph(&self, namespace: &str, args: &[&str]) -> Result<String> {
        self.run_checked(&self.config.ceph_bin, namespace, args).await
    }

    async fn rgw_admin(&self, namespace: &str, args: &[&str]) -> Result<String> {
        self.run_checked(&self.config.rgw_admin_bin, namespace, args)
            .await
    }

    async fn rgw_admin_query(&self, namespace: &str, args: &[&str]) -> Result<Option<String>> {
        self.run_query(&self.config.rgw_admin_bin, namespace, args)
            .await
    }

    async fn list_pools(&self, namespace: &str) -> Result<Vec<String>> {
        let stdout = self.ceph(namespace, &["osd", "pool", "ls"]).await?;
        parse_json_or_empty(&stdout)
    }

    async fn create_pool(&self, namespace: &str, name: &str, spec: &PoolSpec) -> Result<()> {
        if let Some(ec) = &spec.erasure_coded {
            let profile = format!("{}_ecprofile", name);
            let k = format!("k={}", ec.data_chunks);
            let m = format!("m={}", ec.coding_chunks);
            let domain = format!("crush-failure-domain={}", spec.failure_domain);
            self.ceph(
                namespace,
                &["osd", "erasure-code-profile", "set", &profile, &k, &m, &domain],
            )
            .await?;
            self.ceph(
                namespace,
                &[
                    "osd",
                    "pool",
                    "create",
                    name,
                    DEFAULT_PG_COUNT,
                    DEFAULT_PG_COUNT,
                    "erasure",
                    &profile,
                ],
            )
            .await?;
        } else {
            let rule = self.ensure_crush_rule(namespace, name, spec).await?;
            self.ceph(
                namespace,
                &[
                    "osd",
                    "pool",
                    "create",
                    name,
                    DEFAULT_PG_COUNT,
                    DEFAULT_PG_COUNT,
                    "replicated",
                    &rule,
                ],
            )
            .await?;
            if let Some(replicated) = &spec.replicated {
                self.set_pool_size(namespace, name, replicated.size).await?;
            }
        }
        info!(pool = %name, namespace = %namespace, "Created pool");
        Ok(())
    }

    /// Create the replicated rule for `name` in its failure domain.
    ///
    /// The rule name carries the failure domain, so a changed domain yields a
    /// new rule. Creating an identical rule again succeeds.
    async fn ensure_crush_rule(
        &self,
        namespace: &str,
        name: &str,
        spec: &PoolSpec,
    ) -> Result<String> {
        let rule = format!("{}_{}", name, spec.failure_domain);
        self.ceph(
            namespace,
            &[
                "osd",
                "crush",
                "rule",
                "create-replicated",
                &rule,
                "default",
                &spec.failure_domain,
            ],
        )
        .await?;
        Ok(rule)
    }

    /// Move an existing replicated pool to the rule for its failure domain.
    async fn converge_crush_rule(
        &self,
        namespace: &str,
        name: &str,
        spec: &PoolSpec,
    ) -> Result<()> {
        let stdout = self
            .ceph(namespace, &["osd", "pool", "get", name, "crush_rule"])
            .await?;
        let current: PoolCrushRule = serde_json::from_str(&stdout)?;
        let desired = format!("{}_{}", name, spec.failure_domain);
        if current.crush_rule == desired {
            return Ok(());
        }

        let rule = self.ensure_crush_rule(namespace, name, spec).await?;
        self.ceph(namespace, &["osd", "pool", "set", name, "crush_rule", &rule])
            .await?;
        info!(
            pool = %name,
            from = %current.crush_rule,
            to = %rule,
            "Moved pool to new crush rule"
        );
        Ok(())
    }

    /// Tag the pool for the gateway unless it already is.
    async fn ensure_application(&self, namespace: &str, name: &str) -> Result<()> {
        let stdout = self
            .ceph(namespace, &["osd", "pool", "application", "get", name])
            .await?;
        let applications: PoolApplications = parse_json_or_empty(&stdout)?;
        if applications.contains_key(RGW_APPLICATION) {
            return Ok(());
        }

        self.ceph(
            namespace,
            &[
                "osd",
                "pool",
                "application",
                "enable",
                name,
                RGW_APPLICATION,
                "--yes-i-really-mean-it",
            ],
        )
        .await?;
        debug!(pool = %name, "Enabled gateway application");
        Ok(())
    }

    async fn set_pool_size(&self, namespace: &str, name: &str, size: u32) -> Result<()> {
        let size = size.to_string();
        self.ceph(
            namespace,
            &[
                "osd",
                "pool",
                "set",
                name,
                "size",
                &size,
                "--yes-i-really-mean-it",
            ],
        )
        .await?;
        Ok(())
    }

    /// Create or update an entity that carries an endpoint list.
    ///
    /// Returns whether anything changed.
    async fn ensure_endpoints(
        &self,
        namespace: &str,
        entity: &str,
        scope: &[String],
        endpoint: &str,
    ) -> Result<bool> {
        let scope: Vec<&str> = scope.iter().map(String::as_str).collect();
        let endpoints_arg = format!("--endpoints={}", endpoint);

        let mut get_args = vec![entity, "get"];
        get_args.extend(&scope);
        let Some(stdout) = self.rgw_admin_query(namespace, &get_args).await? else {
            let mut create_args = vec![entity, "create"];
            create_args.extend(&scope);
            create_args.extend([endpoints_arg.as_str(), "--master", "--default"]);
            self.rgw_admin(namespace, &create_args).await?;
            info!(entity = %entity, endpoint = %endpoint, "Created {}", entity);
            return Ok(true);
        };

        let current: EndpointList = serde_json::from_str(&stdout)?;
        if current.endpoints == [endpoint] {
            return Ok(false);
        }

        let mut modify_args = vec![entity, "modify"];
        modify_args.extend(&scope);
        modify_args.push(&endpoints_arg);
        self.rgw_admin(namespace, &modify_args).await?;
        info!(
            entity = %entity,
            from = ?current.endpoints,
            to = %endpoint,
            "Updated {} endpoints",
            entity
        );
        Ok(true)
    }

    /// Delete an entity, treating a missing one as already deleted.
    async fn delete_if_exists(&self, namespace: &str, args: &[&str]) -> Result<()> {
        if self.rgw_admin_query(namespace, args).await?.is_none() {
            debug!(args = ?args, "Already deleted");
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdmin for CliStorageAdmin {
    async fn ensure_pool(&self, namespace: &str, name: &str, spec: &PoolSpec) -> Result<()> {
        let pools = self.list_pools(namespace).await?;
        if !pools.iter().any(|p| p == name) {
            self.create_pool(namespace, name, spec).await?;
        } else if let Some(replicated) = &spec.replicated {
            // Erasure-coded pools cannot change their layout after creation
            self.converge_crush_rule(namespace, name, spec).await?;

            let stdout = self
                .ceph(namespace, &["osd", "pool", "get", name, "size"])
                .await?;
            let current: PoolSize = serde_json::from_str(&stdout)?;
            if current.size != replicated.size {
                info!(
                    pool = %name,
                    from = current.size,
                    to = replicated.size,
                    "Correcting pool size"
                );
                self.set_pool_size(namespace, name, replicated.size).await?;
            }
        }

        self.ensure_application(namespace, name).await
    }

    async fn delete_pool(&self, namespace: &str, name: &str) -> Result<()> {
        let pools = self.list_pools(namespace).await?;
        if !pools.iter().any(|p| p == name) {
            return Ok(());
        }
        self.ceph(
            namespace,
            &[
                "osd",
                "pool",
                "delete",
                name,
                name,
                "--yes-i-really-really-mean-it",
            ],
        )
        .await?;
        info!(pool = %name, namespace = %namespace, "Deleted pool");
        Ok(())
    }

    async fn ensure_realm(&self, namespace: &str, realm: &RealmConfig) -> Result<bool> {
        let realm_arg = format!("--rgw-realm={}", realm.name);
        let zonegroup_arg = format!("--rgw-zonegroup={}", realm.name);
        let zone_arg = format!("--rgw-zone={}", realm.name);

        let mut changed = false;
        if self
            .rgw_admin_query(namespace, &["realm", "get", &realm_arg])
            .await?
            .is_none()
        {
            self.rgw_admin(namespace, &["realm", "create", &realm_arg])
                .await?;
            info!(realm = %realm.name, "Created realm");
            changed = true;
        }

        changed |= self
            .ensure_endpoints(
                namespace,
                "zonegroup",
                &[realm_arg.clone(), zonegroup_arg.clone()],
                &realm.endpoint,
            )
            .await?;
        changed |= self
            .ensure_endpoints(
                namespace,
                "zone",
                &[realm_arg.clone(), zonegroup_arg.clone(), zone_arg.clone()],
                &realm.endpoint,
            )
            .await?;

        // A period that failed to commit earlier still lags behind the zone
        // config even though nothing changed this time.
        let committed = match self
            .rgw_admin_query(namespace, &["period", "get", &realm_arg])
            .await?
        {
            Some(stdout) => {
                let period: Period = parse_json_or_empty(&stdout)?;
                period.advertises(&realm.name, &realm.endpoint)
            }
            None => false,
        };

        let commit = changed || !committed;
        if commit {
            self.rgw_admin(
                namespace,
                &[
                    "period",
                    "update",
                    "--commit",
                    &realm_arg,
                    &zonegroup_arg,
                    &zone_arg,
                ],
            )
            .await?;
            info!(realm = %realm.name, "Committed period");
        }
        Ok(commit)
    }

    async fn delete_realm(&self, namespace: &str, name: &str) -> Result<()> {
        let realm_arg = format!("--rgw-realm={}", name);
        let zonegroup_arg = format!("--rgw-zonegroup={}", name);
        let zone_arg = format!("--rgw-zone={}", name);

        self.delete_if_exists(
            namespace,
            &["zone", "delete", &realm_arg, &zonegroup_arg, &zone_arg],
        )
        .await?;
        self.delete_if_exists(namespace, &["zonegroup", "delete", &realm_arg, &zonegroup_arg])
            .await?;
        self.delete_if_exists(namespace, &["realm", "delete", &realm_arg])
            .await?;
        info!(realm = %name, "Deleted realm");
        Ok(())
    }
}

fn command_error(program: &str, args: &[&str], output: &CommandOutput) -> Error {
    let detail = if output.stderr.trim().is_empty() {
        format!("exit code {:?}", output.code)
    } else {
        output.stderr.trim().to_string()
    };
    Error::Command {
        program: program.to_string(),
        message: format!("{}: {}", args.join(" "), detail),
    }
}

fn parse_json_or_empty<T: serde::de::DeserializeOwned + Default>(stdout: &str) -> Result<T> {
    if stdout.trim().is_empty() {
        return Ok(T::default());
    }
    Ok(serde_json::from_str(stdout)?)
}
