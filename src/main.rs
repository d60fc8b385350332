use anyhow::{anyhow, bail, Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, warn};
use tracing_subscriber::EnvFilter;
use uiflow::cli::commands::{
    ClickCommand, DeviceArgs, DevicesCommand, DoubleClickCommand, HistoryCommand, KeyCommand,
    ListCommand, OcrCommand, RunCommand, SaveCommand, ScreencapCommand, ScrollCommand,
    SwipeCommand, TextCommand, ValidateCommand,
};
use uiflow::cli::output::*;
use uiflow::cli::{Cli, Command};
use uiflow::controller::{AdbController, ControllerId, ControllerRegistry};
use uiflow::core::{
    Action, EngineSettings, ExecutionStatus, PipelineGraph, PipelineNode, Point, Recognition,
    RunResult, Target,
};
use uiflow::execution::{PipelineEngine, RunRequest};
use uiflow::persistence::{
    create_summary, DocumentStore, InMemoryPersistence, PersistenceBackend, RunSummary,
    SaveTarget,
};
use uiflow::recognition::RecognizerAdapter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("Failed to set logging subscriber: {}", e))?;

    let settings = EngineSettings::load_or_default(cli.config.as_deref())
        .context("Failed to load engine settings")?;
    debug!("Engine settings: {:?}", settings);

    match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd, settings, cli.no_history).await?,
        Command::Validate(cmd) => validate_pipeline(cmd)?,
        Command::Save(cmd) => save_pipeline(cmd)?,
        Command::Devices(cmd) => list_devices(cmd, &settings).await?,
        Command::Screencap(cmd) => screencap(cmd, settings).await?,
        Command::Ocr(cmd) => read_screen_text(cmd, settings).await?,
        Command::Click(cmd) => click(cmd, settings).await?,
        Command::DoubleClick(cmd) => double_click(cmd, settings).await?,
        Command::Swipe(cmd) => swipe(cmd, settings).await?,
        Command::Scroll(cmd) => scroll(cmd, settings).await?,
        Command::Text(cmd) => input_text(cmd, settings).await?,
        Command::Key(cmd) => press_key(cmd, settings).await?,
        Command::History(cmd) => show_history(cmd, cli.no_history).await?,
        Command::List(cmd) => list_pipelines(cmd, cli.no_history).await?,
    }

    Ok(())
}

/// A connected device wired into an engine
struct Session {
    engine: PipelineEngine,
    recognizer: Arc<RecognizerAdapter>,
    controller_id: ControllerId,
}

async fn connect_device(settings: &EngineSettings, device: &DeviceArgs) -> Result<AdbController> {
    let adb_path = settings.adb.adb_path.as_path();
    if let Some(serial) = &device.device {
        return AdbController::connect(adb_path, serial)
            .await
            .with_context(|| format!("Failed to connect to {}", serial));
    }

    let online: Vec<_> = AdbController::devices(adb_path)
        .await
        .context("Failed to list ADB devices")?
        .into_iter()
        .filter(|d| d.is_online())
        .collect();
    match online.as_slice() {
        [] => bail!("No online ADB device; connect one or pass --device"),
        [only] => Ok(AdbController::connect(adb_path, &only.serial).await?),
        many => bail!(
            "{} devices online ({}); pick one with --device",
            many.len(),
            many.iter().map(|d| d.serial.as_str()).collect::<Vec<_>>().join(", ")
        ),
    }
}

async fn open_session(settings: EngineSettings, device: &DeviceArgs) -> Result<Session> {
    let controller = connect_device(&settings, device).await?;
    let registry = Arc::new(ControllerRegistry::new(settings.controller_call_timeout()));
    let handle = registry.register(Arc::new(controller));
    println!("{} Connected to {}", INFO, style(&handle.id).cyan());

    let recognizer = Arc::new(RecognizerAdapter::from_settings(&settings));
    let engine = PipelineEngine::new(registry, recognizer.clone(), settings);

    Ok(Session {
        engine,
        recognizer,
        controller_id: handle.id,
    })
}

async fn open_history(no_history: bool) -> Result<Box<dyn PersistenceBackend>> {
    if no_history {
        return Ok(Box::new(InMemoryPersistence::new()));
    }

    #[cfg(feature = "sqlite")]
    {
        let store = uiflow::persistence::SqliteRunStore::with_default_path()
            .await
            .context("Failed to open run history")?;
        Ok(Box::new(store))
    }

    #[cfg(not(feature = "sqlite"))]
    {
        warn!("Built without the sqlite feature; run history is not kept");
        Ok(Box::new(InMemoryPersistence::new()))
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "pipeline".to_string())
}

async fn run_pipeline(cmd: &RunCommand, mut settings: EngineSettings, no_history: bool) -> Result<()> {
    let graph = PipelineGraph::from_file(&cmd.file)
        .with_context(|| format!("Failed to load pipeline {}", cmd.file.display()))?;

    let entry = match &cmd.entry {
        Some(entry) => entry.clone(),
        None => graph
            .default_entry()
            .map(str::to_string)
            .context("Pipeline has no unique start node; pass --entry")?,
    };
    let name = cmd.name.clone().unwrap_or_else(|| file_stem(&cmd.file));

    println!(
        "{} Loaded pipeline: {} ({} nodes)",
        INFO,
        style(&name).bold(),
        style(graph.len()).cyan()
    );

    // Templates resolve next to the pipeline unless configured otherwise
    if settings.template_dir.is_none() {
        settings.template_dir = cmd
            .file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf);
    }

    let history = open_history(no_history).await?;
    let session = open_session(settings, &cmd.device).await?;

    let spinner = create_spinner(&format!("Running {}", name));
    let printer = spinner.clone();
    session
        .engine
        .add_event_handler(move |event| printer.println(format_event(&event)));

    let request = RunRequest::new(session.controller_id.clone(), Arc::new(graph), entry).with_name(name);
    let handle = session.engine.start(request)?;

    let token = handle.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run");
            token.cancel();
        }
    });

    let result = handle.wait().await;
    spinner.finish_and_clear();
    let result = result?;

    let summary = create_summary(&result);
    history.save_run(&summary).await?;
    if !no_history {
        println!(
            "\n{} Run saved to history (ID: {})",
            INFO,
            style(&summary.run_id.to_string()[..8]).dim()
        );
    }

    report(&result, cmd.json)
}

/// Print a run result; exits non-zero unless the run succeeded
fn report(result: &RunResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else {
        println!("\n{}", format_run_result(result));
    }

    if !result.is_success() {
        if let Some(kind) = result.final_state.error_kind() {
            error!("Run {} failed: {}", result.run_id, kind);
        }
        std::process::exit(1);
    }
    Ok(())
}

fn validate_pipeline(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating pipeline...", INFO);

    match PipelineGraph::from_file(&cmd.file) {
        Ok(graph) => {
            println!("{} Pipeline document is valid!", CHECK);
            println!("  Nodes: {}", style(graph.len()).cyan());
            match graph.default_entry() {
                Some(entry) => println!("  Start node: {}", style(entry).bold()),
                None => println!("  Start node: {}", style("ambiguous, pass --entry to run").yellow()),
            }

            if cmd.json {
                println!("\n{}", graph.to_json());
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(e).red());
            std::process::exit(1);
        }
    }
}

fn save_pipeline(cmd: &SaveCommand) -> Result<()> {
    let json = std::fs::read_to_string(&cmd.file)
        .with_context(|| format!("Failed to read {}", cmd.file.display()))?;

    if !cmd.skip_validation {
        PipelineGraph::from_json(&json).context("Pipeline document is invalid")?;
    }

    let store = DocumentStore::with_default_dir()?;
    let target = match &cmd.output {
        Some(path) => SaveTarget::Path(path.clone()),
        None => SaveTarget::Default,
    };
    let path = store.save(&json, &target, cmd.name.as_deref(), !cmd.no_overwrite)?;

    println!("{} Saved pipeline to {}", CHECK, style(path.display()).bold());
    Ok(())
}

async fn list_devices(cmd: &DevicesCommand, settings: &EngineSettings) -> Result<()> {
    let devices = AdbController::devices(&settings.adb.adb_path)
        .await
        .context("Failed to list ADB devices")?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    if devices.is_empty() {
        println!("{} No devices found", INFO);
        return Ok(());
    }

    println!("{} ADB devices:", INFO);
    for device in &devices {
        let state = if device.is_online() {
            style(&device.state).green()
        } else {
            style(&device.state).yellow()
        };
        println!("  {} {}", style(&device.serial).bold(), state);
    }
    Ok(())
}

async fn screencap(cmd: &ScreencapCommand, settings: EngineSettings) -> Result<()> {
    let session = open_session(settings, &cmd.device).await?;
    let lease = session.engine.registry().acquire(&session.controller_id)?;
    let capture = lease.controller().capture().await?;

    capture
        .save(&cmd.output)
        .with_context(|| format!("Failed to write {}", cmd.output.display()))?;
    println!(
        "{} Saved {}x{} screenshot to {}",
        CHECK,
        capture.width(),
        capture.height(),
        style(cmd.output.display()).bold()
    );
    Ok(())
}

async fn read_screen_text(cmd: &OcrCommand, settings: EngineSettings) -> Result<()> {
    let session = open_session(settings, &cmd.device).await?;
    let lease = session.engine.registry().acquire(&session.controller_id)?;
    let capture = lease.controller().capture().await?;
    drop(lease);

    let spinner = create_spinner("Reading text");
    let boxes = session.recognizer.read_text(&capture, cmd.roi).await;
    spinner.finish_and_clear();
    let boxes = boxes?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&boxes)?);
    } else {
        println!("{}", format_text_boxes(&boxes));
    }
    Ok(())
}

/// Run one DirectHit node on the device
async fn run_primitive(device: &DeviceArgs, settings: EngineSettings, name: &str, action: Action) -> Result<()> {
    let session = open_session(settings, device).await?;
    let node = PipelineNode::new(Recognition::DirectHit, action);
    let result = session
        .engine
        .run_node(session.controller_id.clone(), name, node)
        .await?;

    if result.is_success() {
        println!("{} {}", CHECK, style(name).green());
        Ok(())
    } else {
        report(&result, false)
    }
}

async fn click(cmd: &ClickCommand, settings: EngineSettings) -> Result<()> {
    let target = Target::Point(Point::new(cmd.x, cmd.y));
    let action = match cmd.hold {
        Some(hold) if hold > settings.click_hold_ms => Action::LongPress {
            target,
            button: 0,
            duration: Some(hold),
        },
        _ => Action::Click { target, button: 0 },
    };
    run_primitive(&cmd.device, settings, "Click", action).await
}

async fn double_click(cmd: &DoubleClickCommand, settings: EngineSettings) -> Result<()> {
    let action = Action::DoubleClick {
        target: Target::Point(Point::new(cmd.x, cmd.y)),
        button: 0,
    };
    run_primitive(&cmd.device, settings, "DoubleClick", action).await
}

async fn swipe(cmd: &SwipeCommand, settings: EngineSettings) -> Result<()> {
    let action = Action::Swipe {
        begin: Target::Point(Point::new(cmd.x1, cmd.y1)),
        end: Target::Point(Point::new(cmd.x2, cmd.y2)),
        duration: cmd.duration,
    };
    run_primitive(&cmd.device, settings, "Swipe", action).await
}

// ADB devices have no wheel; the node fails with UnsupportedOnPlatform
async fn scroll(cmd: &ScrollCommand, settings: EngineSettings) -> Result<()> {
    let action = Action::Scroll {
        dx: cmd.dx,
        dy: cmd.dy,
    };
    run_primitive(&cmd.device, settings, "Scroll", action).await
}

async fn input_text(cmd: &TextCommand, settings: EngineSettings) -> Result<()> {
    let action = Action::InputText {
        text: cmd.text.clone(),
    };
    run_primitive(&cmd.device, settings, "InputText", action).await
}

async fn press_key(cmd: &KeyCommand, settings: EngineSettings) -> Result<()> {
    let action = Action::PressKey {
        key: cmd.code,
        long: cmd.long,
    };
    run_primitive(&cmd.device, settings, "PressKey", action).await
}

async fn show_history(cmd: &HistoryCommand, no_history: bool) -> Result<()> {
    let store = open_history(no_history).await?;

    if let Some(run_id) = &cmd.run_id {
        let run_id = uuid::Uuid::parse_str(run_id).context("Invalid run ID format")?;
        match store.load_run(run_id).await? {
            Some(summary) => print_run_details(&summary, cmd.verbose)?,
            None => println!("{} Run not found", WARN),
        }
        return Ok(());
    }

    let runs = match &cmd.pipeline {
        Some(pipeline_name) => {
            let mut runs = store.list_runs(pipeline_name).await?;
            runs.truncate(cmd.limit);
            runs
        }
        None => store.recent_runs(cmd.limit).await?,
    };

    if runs.is_empty() {
        println!("{} No runs found", INFO);
        return Ok(());
    }

    if cmd.json {
        let data = serde_json::json!({ "runs": runs });
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else {
        println!("{} Run history (showing latest {}):", INFO, runs.len());
        for summary in &runs {
            println!("  {}", format_summary(summary));
        }
    }

    Ok(())
}

fn print_run_details(summary: &RunSummary, verbose: bool) -> Result<()> {
    println!("{} Run Details", INFO);
    println!("  ID: {}", style(summary.run_id).cyan());
    println!("  Pipeline: {}", style(&summary.pipeline_name).bold());
    println!("  Device: {}", style(&summary.controller_id).cyan());
    println!("  Entry: {}", summary.entry);
    println!("  Status: {}", format_status(summary.status));
    if let (Some(node), Some(kind)) = (&summary.failed_node, summary.error_kind) {
        println!("  Failure: {} at {}", style(kind).red(), style(node).bold());
    }
    println!("  Steps: {}", summary.steps);
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    if let Ok(duration) = (summary.finished_at - summary.started_at).to_std() {
        println!("  Duration: {}", style(format_duration(duration)).dim());
    }

    if verbose {
        println!("\n  {}", style("Full details:").bold());
        let json = serde_json::to_string_pretty(summary)?;
        for line in json.lines() {
            println!("    {}", line);
        }
    }

    Ok(())
}

async fn list_pipelines(cmd: &ListCommand, no_history: bool) -> Result<()> {
    if cmd.saved {
        let store = DocumentStore::with_default_dir()?;
        let paths = store.list()?;
        if cmd.json {
            println!("{}", serde_json::to_string_pretty(&paths)?);
        } else if paths.is_empty() {
            println!("{} No saved pipelines in {}", INFO, store.root().display());
        } else {
            println!("{} Saved pipelines:", INFO);
            for path in &paths {
                println!("  {}", style(path.display()).bold());
            }
        }
        return Ok(());
    }

    let store = open_history(no_history).await?;
    let pipelines = store.list_pipelines().await?;

    if pipelines.is_empty() {
        println!("{} No pipelines found in history", INFO);
        return Ok(());
    }

    let mut json_data = Vec::new();
    if !cmd.json {
        println!("{} Pipelines in history:", INFO);
    }
    for pipeline_name in &pipelines {
        let runs = store.list_runs(pipeline_name).await?;
        let completed = runs.iter().filter(|r| r.status == ExecutionStatus::Completed).count();
        let failed = runs.iter().filter(|r| r.status == ExecutionStatus::Failed).count();

        if cmd.json {
            json_data.push(serde_json::json!({
                "name": pipeline_name,
                "run_count": runs.len(),
                "completed": completed,
                "failed": failed,
            }));
        } else if cmd.with_counts {
            println!(
                "  {} ({} runs: {} succeeded, {} failed)",
                style(pipeline_name).bold(),
                style(runs.len()).cyan(),
                style(completed).green(),
                style(failed).red()
            );
        } else {
            println!("  {}", style(pipeline_name).bold());
        }
    }

    if cmd.json {
        let data = serde_json::json!({ "pipelines": json_data });
        println!("{}", serde_json::to_string_pretty(&data)?);
    }

    Ok(())
}
