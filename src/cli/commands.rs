use crate::{
    cli::args::{ListArgs, RecoverArgs, RunArgs, ShowArgs, ValidateArgs},
    core::{
        config::{ConductorConfig, ConfigLoader},
        error::EngineError,
        workflow::{schema, DependencyGraph, Engine, FunctionRegistry},
    },
    Result,
};
use anyhow::{anyhow, bail};
use conductor_types::{InstanceFilter, InstanceStatus};
use serde_json::{Map, Value};
use std::env;
use std::path::Path;
use std::time::Duration;
use tokio::time::{sleep, Instant};

const RECOVER_POLL: Duration = Duration::from_millis(100);

fn load_config(path: Option<&Path>) -> Result<ConductorConfig> {
    ConfigLoader::load(path)
}

async fn open_engine(config: &ConductorConfig) -> Engine {
    Engine::from_config(config, FunctionRegistry::with_builtins()).await
}

fn coded(err: EngineError) -> anyhow::Error {
    anyhow!("{} [{}]", err, err.code())
}

pub async fn run(args: RunArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let definitions = schema::load_definitions(&args.file)?;
    let engine = open_engine(&config).await;
    for definition in definitions {
        engine.register_definition(definition).map_err(coded)?;
    }

    let parameters: Map<String, Value> = args.params.into_iter().collect();
    let user = args
        .user
        .or_else(|| env::var("USER").ok())
        .unwrap_or_else(|| "local".to_string());
    let instance_id = engine
        .start(&args.workflow, &args.tenant, &user, parameters)
        .await
        .map_err(coded)?;

    let waited = engine.wait_for_terminal(&instance_id, args.timeout).await;
    engine.shutdown().await;
    let instance = waited.map_err(coded)?;

    println!("{}", serde_json::to_string_pretty(&instance)?);
    if instance.status != InstanceStatus::Completed {
        bail!(
            "instance {} finished {}: {}",
            instance.instance_id,
            instance.status,
            instance.error.as_deref().unwrap_or("no error recorded")
        );
    }
    Ok(())
}

pub async fn validate(args: ValidateArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let definitions = schema::load_definitions(&args.file)?;
    // Validation only registers definitions; no store is needed.
    let engine = Engine::builder().config(&config).build();

    let mut problems = Vec::new();
    for definition in definitions {
        let name = definition.name.clone();
        let task_count = definition.tasks.len();
        let graph = DependencyGraph::build(
            definition
                .tasks
                .iter()
                .map(|task| (task.name.as_str(), task.dependencies.as_slice())),
        );
        let checked = graph
            .check()
            .and_then(|()| engine.register_definition(definition));
        match checked {
            Ok(()) => println!("ok    {} ({} tasks)", name, task_count),
            Err(err) => {
                println!("error {}: {}", name, err);
                problems.push(err.code());
            }
        }
    }

    if !problems.is_empty() {
        bail!("{} workflow(s) failed validation", problems.len());
    }
    Ok(())
}

pub async fn show(args: ShowArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let engine = open_engine(&config).await;
    let instance = engine
        .get_instance(&args.instance_id)
        .await
        .ok_or_else(|| coded(EngineError::InstanceNotFound(args.instance_id)))?;
    println!("{}", serde_json::to_string_pretty(&instance)?);
    Ok(())
}

pub async fn list(args: ListArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let engine = open_engine(&config).await;

    let mut filter = InstanceFilter::default().page(args.limit, args.offset);
    filter.tenant_id = args.tenant;
    filter.status = args.status;

    for instance in engine.list_instances(&filter).await {
        println!(
            "{}  {:<10} {:<16} {:<12} {}",
            instance.instance_id,
            instance.status,
            instance.workflow_name,
            instance.tenant_id,
            instance.created_at.to_rfc3339()
        );
    }
    Ok(())
}

pub async fn recover(args: RecoverArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let engine = open_engine(&config).await;

    let recovered = engine.recover().await;
    tracing::info!(recovered, backend = engine.backend_name(), "recovery started");

    let deadline = Instant::now() + args.timeout;
    while engine.live_instances() > 0 {
        if Instant::now() >= deadline {
            let remaining = engine.live_instances();
            engine.shutdown().await;
            bail!(
                "{} recovered instance(s) still running after {}",
                remaining,
                humantime::format_duration(args.timeout)
            );
        }
        sleep(RECOVER_POLL).await;
    }
    tracing::info!(recovered, "recovered instances finished");
    Ok(())
}
