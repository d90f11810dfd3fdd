//! Project loading shared by every command

use crate::cli::GlobalArgs;
use anyhow::{bail, Context as _};
use cascade_core::{
    compile_all, DependencyGraph, ModelRegistry, ProjectConfig, SourceCatalog, StateStore,
};
use cascade_db::{
    ConnectionConfig, DriverPool, MockDriver, PoolConfig, RetryPolicy, SnowflakeDriver,
    WarehouseClient,
};
use cascade_exec::ExecutorOptions;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// A fully loaded and compiled project
pub struct ProjectContext {
    pub root: PathBuf,
    pub config: ProjectConfig,
    pub registry: ModelRegistry,
    pub catalog: SourceCatalog,
    pub graph: DependencyGraph,
    pub warnings: Vec<String>,
    pub environment: String,
}

impl ProjectContext {
    /// Load cascade.yml, the sources catalogue, and every model; compile the
    /// registry and build the graph.
    pub fn load(global: &GlobalArgs) -> anyhow::Result<Self> {
        let root = global.project_dir.clone();
        let config = ProjectConfig::load(&root).context("loading cascade.yml")?;

        let catalog = SourceCatalog::load(&config.sources_file(&root))
            .context("loading sources catalogue")?;

        let mut registry = ModelRegistry::new();
        let mut found_any = false;
        for dir in config.model_dirs(&root) {
            if !dir.exists() {
                continue;
            }
            found_any = true;
            let loaded = ModelRegistry::load_dir(&dir)
                .with_context(|| format!("loading models from {}", dir.display()))?;
            for model in loaded.list() {
                registry.register_with_schema(&model.path, &model.raw_sql, model.schema.clone())?;
            }
        }
        if !found_any {
            bail!(
                "no model directory found under {} (looked for: {})",
                root.display(),
                config.model_paths.join(", ")
            );
        }

        let report = compile_all(&mut registry, &catalog).context("compiling models")?;
        for warning in &report.warnings {
            log::warn!("{}", warning);
        }

        let environment = global
            .target
            .clone()
            .unwrap_or_else(|| config.environment.clone());

        Ok(Self {
            root,
            config,
            registry,
            catalog,
            graph: report.graph,
            warnings: report.warnings,
            environment,
        })
    }

    /// Open the state store for the active environment.
    pub fn state_store(&self) -> anyhow::Result<StateStore> {
        Ok(StateStore::open(
            &self.config.state_dir(&self.root),
            &self.environment,
        )?)
    }

    /// Build the warehouse client from the configured backend.
    pub fn client(&self) -> anyhow::Result<WarehouseClient> {
        let driver: Arc<dyn cascade_db::Driver> = match self.config.backend.as_str() {
            "snowflake" => Arc::new(SnowflakeDriver::new()),
            "mock" => Arc::new(MockDriver::new()),
            other => bail!("unknown backend '{}' (expected snowflake or mock)", other),
        };

        let profile = &self.config.connection;
        let connection = ConnectionConfig {
            account: profile.account.clone(),
            user: profile.user.clone(),
            password: profile.password.clone(),
            warehouse: profile.warehouse.clone(),
            database: profile.database.clone(),
            schema: profile.schema.clone(),
            role: profile.role.clone(),
        };

        let pool = DriverPool::new(
            driver,
            connection,
            PoolConfig {
                size: self.config.pool.size,
                acquire_timeout: Duration::from_secs(self.config.pool.acquire_timeout_secs),
                session_variables: self.config.pool.session_variables.clone(),
            },
        );

        let retry = RetryPolicy {
            max_attempts: self.config.retry.max_attempts,
            initial_backoff: Duration::from_millis(self.config.retry.initial_backoff_ms),
            factor: self.config.retry.backoff_factor,
            jitter: self.config.retry.jitter,
        };

        Ok(WarehouseClient::new(pool, retry))
    }

    /// Executor options from project config plus CLI variable overrides.
    pub fn executor_options(
        &self,
        cli_vars: &[String],
        fail_fast: bool,
    ) -> anyhow::Result<ExecutorOptions> {
        let mut variables: BTreeMap<String, serde_json::Value> = BTreeMap::new();
        for (name, value) in &self.config.vars {
            variables.insert(name.clone(), serde_json::to_value(value)?);
        }
        for binding in cli_vars {
            let Some((name, value)) = binding.split_once('=') else {
                bail!("invalid --var '{}': expected name=value", binding);
            };
            let parsed = serde_json::from_str(value)
                .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
            variables.insert(name.to_string(), parsed);
        }

        Ok(ExecutorOptions {
            fail_fast: fail_fast || self.config.fail_fast,
            variables,
            database: self.config.connection.database.clone(),
            schema: self.config.connection.schema.clone(),
            max_parallel: None,
        })
    }
}
