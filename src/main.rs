//! Kuery - interactive Kubernetes agent on the terminal
//!
//! The transcript goes to stdout; structured logs go to stderr.

use kuery::config::KueryConfig;
use kuery::console::{ConsoleObserver, StdinInput};
use kuery::flows::{ConversationalFlow, HistoryPolicy, InputProvider};
use kuery::llm::{build_model, LlmConfig, Model};
use kuery::store::{FlowStore, SqliteFlowStore};
use kuery::system_prompt::load_system_prompt;
use kuery::tools::{
    AddStepTool, CommandRunner, ExportFlowTool, HelmTool, ImportFlowTool, K8sDiscoveryTool,
    K8sReadTool, K8sWriteTool, RequestApprovalTool, ToolManager,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kuery=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = KueryConfig::from_env();
    let model = build_model(&LlmConfig::from_env())?;
    tracing::info!(model = %model.model_id(), namespace = %config.namespace, "Model ready");

    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    tracing::info!(path = %config.db_path.display(), "Opening flow store");
    let store: Arc<dyn FlowStore> = Arc::new(SqliteFlowStore::open(&config.db_path)?);

    let input: Arc<dyn InputProvider> = Arc::new(StdinInput::new());
    let kubectl = Arc::new(CommandRunner::new(config.kubectl.clone()));
    let helm = Arc::new(CommandRunner::new(config.helm.clone()));
    tracing::info!(kubectl = %kubectl.binary(), helm = %helm.binary(), "Cluster CLIs configured");
    let namespace = config.namespace.as_str();
    let retries = config.max_tool_retries;

    let tools = ToolManager::new()
        .with_tool(Arc::new(AddStepTool::new(Arc::clone(&model))), 1)
        .with_tool(
            Arc::new(RequestApprovalTool::new(Arc::clone(&model), Arc::clone(&input))),
            retries,
        )
        .with_tool(
            Arc::new(ExportFlowTool::new(Arc::clone(&store), namespace)),
            retries,
        )
        .with_tool(
            Arc::new(ImportFlowTool::new(
                Arc::clone(&store),
                Arc::clone(&model),
                Arc::clone(&input),
                namespace,
            )),
            retries,
        )
        .with_tool(Arc::new(K8sDiscoveryTool::new(Arc::clone(&kubectl))), retries)
        .with_tool(Arc::new(K8sReadTool::new(Arc::clone(&kubectl), namespace)), retries)
        .with_tool(Arc::new(K8sWriteTool::new(kubectl, namespace)), retries)
        .with_tool(Arc::new(HelmTool::new(helm, namespace)), retries);
    tracing::info!(tools = ?tools.tool_names(), "Tools registered");

    let working_dir = std::env::current_dir()?;
    let system_prompt = load_system_prompt(
        config.system_prompt_file.as_deref(),
        namespace,
        &working_dir,
    )?;

    let mut flow = ConversationalFlow::new(system_prompt, model, tools)
        .with_observer(Arc::new(ConsoleObserver))
        .with_history_policy(HistoryPolicy::new(config.history_limit));
    flow.human_step(input);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, shutting down");
            on_signal.cancel();
        }
    });

    let history = flow.run_loop(&cancel).await?;
    tracing::info!(messages = history.len(), "Session ended");
    Ok(())
}
