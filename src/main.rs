// Import modules
mod app_bootstrap;
mod console_ui;
mod settings;
mod settings_io;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};

use capture_sample::capture_deps::CaptureDeps;
use capture_sample::config;
use capture_sample::dispatcher::{owner_queue, run_on_owner, OwnerDispatcher, OwnerPump};
use capture_sample::monitors::MonitorHandle;
use capture_sample::platform::{self, PlatformServices};
use capture_sample::{CaptureApp, PixelFormat, WindowHandle, WindowList};

use console_ui::{
    ConsoleListObserver, ConsoleMessageDialog, ConsoleSaveFilePicker, ConsoleTargetPicker,
    SurfaceStatsTarget,
};
use settings::Settings;

#[derive(Parser, Debug)]
#[command(name = "capture-sample", version, about = "Capture a window or monitor and save snapshots")]
struct Cli {
    /// Override the configured log level (Off, Error, Warn, Info, Debug, Trace)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the capturable windows and the monitors
    List,
    /// Follow window list changes
    Watch {
        #[arg(long, default_value_t = 30)]
        seconds: u64,
    },
    /// Capture a window, a monitor or a picked target
    Capture(CaptureArgs),
}

#[derive(Args, Debug)]
struct CaptureArgs {
    /// Window handle, decimal or 0x-prefixed hex
    #[arg(long, value_parser = parse_handle, conflicts_with_all = ["monitor", "pick"])]
    window: Option<isize>,

    /// Monitor index as printed by `list`
    #[arg(long, conflicts_with = "pick")]
    monitor: Option<usize>,

    /// Choose the target interactively
    #[arg(long)]
    pick: bool,

    /// How long to keep capturing
    #[arg(long, default_value_t = 5)]
    seconds: u64,

    /// Save a snapshot before stopping; without a path the location is prompted
    #[arg(long, num_args = 0..=1)]
    snapshot: Option<Option<PathBuf>>,

    #[arg(long)]
    no_cursor: bool,

    #[arg(long)]
    no_border: bool,

    /// Capture in 16-bit float (HDR) instead of 8-bit BGRA
    #[arg(long)]
    hdr: bool,
}

fn parse_handle(text: &str) -> Result<isize, String> {
    let text = text.trim();
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => isize::from_str_radix(hex, 16),
        None => text.parse::<isize>(),
    };
    parsed.map_err(|e| format!("invalid window handle {:?}: {}", text, e))
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();

    let settings = app_bootstrap::load_initial_settings();
    app_bootstrap::init_logging(&settings, cli.log_level.as_deref());
    app_bootstrap::install_panic_hook();
    app_bootstrap::log_active_settings(&settings);

    let result = match cli.command {
        Command::List => run_list(),
        Command::Watch { seconds } => run_watch(Duration::from_secs(seconds)),
        Command::Capture(args) => run_capture(args, &settings),
    };

    if let Err(e) = result {
        tracing::error!(error = %format!("{:#}", e), "Command failed");
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run_list() -> Result<()> {
    let services = platform::create_services()?;
    let windows = WindowList::new(Arc::clone(&services.probe), services.events.as_ref())?;

    println!("Windows:");
    for window in windows.windows() {
        println!("  {:>12}  {}", window.handle.to_string(), window.title);
    }

    println!("Monitors:");
    for (index, monitor) in services.monitors.monitors()?.iter().enumerate() {
        println!("  [{}] {}", index, monitor.label());
    }
    Ok(())
}

fn run_watch(duration: Duration) -> Result<()> {
    let services = platform::create_services()?;
    let windows = WindowList::new(Arc::clone(&services.probe), services.events.as_ref())?;
    let observer = Arc::new(ConsoleListObserver::new());
    windows.attach_observer(observer.clone())?;

    tracing::info!(seconds = duration.as_secs(), "Watching window list");
    let deadline = Instant::now() + duration;
    while Instant::now() < deadline {
        platform::pump_messages();
        std::thread::sleep(Duration::from_millis(config::timing::OWNER_POLL_INTERVAL_MS));
    }
    println!("{} capturable windows", observer.rows().len());
    Ok(())
}

enum StartRequest {
    Window(WindowHandle),
    Monitor(MonitorHandle),
    Picker,
}

fn start_request(args: &CaptureArgs, services: &PlatformServices) -> Result<StartRequest> {
    if let Some(handle) = args.window {
        return Ok(StartRequest::Window(WindowHandle(handle)));
    }
    if let Some(index) = args.monitor {
        let monitors = services.monitors.monitors()?;
        let monitor = monitors
            .get(index)
            .ok_or_else(|| anyhow!("No monitor at index {} ({} found)", index, monitors.len()))?;
        return Ok(StartRequest::Monitor(monitor.handle));
    }
    Ok(StartRequest::Picker)
}

/// Thread-owned pieces the capture run needs after setup.
struct CaptureRun {
    app: CaptureApp,
    owner: Arc<dyn OwnerDispatcher>,
    pump: OwnerPump,
    stats: Arc<SurfaceStatsTarget>,
    // Keeps the event hook alive for the picker.
    _windows: WindowList,
}

fn build_capture_run(args: &CaptureArgs, settings: &Settings, services: &PlatformServices) -> Result<CaptureRun> {
    let windows = WindowList::new(Arc::clone(&services.probe), services.events.as_ref())?;
    let (queue, pump) = owner_queue();
    let owner: Arc<dyn OwnerDispatcher> = Arc::new(queue);
    let stats = Arc::new(SurfaceStatsTarget::new());
    let input = console_ui::stdin_input();

    let preset = args.snapshot.clone().flatten();
    let deps = CaptureDeps {
        resolver: Arc::clone(&services.resolver),
        sessions: Arc::clone(&services.sessions),
        grabber: Arc::clone(&services.grabber),
        encoder: Arc::clone(&services.encoder),
        render_target: stats.clone(),
        target_picker: Arc::new(ConsoleTargetPicker::new(
            windows.reader(),
            Arc::clone(&services.monitors),
            Arc::clone(&services.resolver),
            Arc::clone(&input),
        )),
        save_picker: Arc::new(ConsoleSaveFilePicker::new(preset, input)),
        dialogs: Arc::new(ConsoleMessageDialog),
        owner: Arc::clone(&owner),
    };

    let pixel_format = if args.hdr {
        PixelFormat::Rgba16Float
    } else {
        settings.pixel_format
    };
    let app = CaptureApp::with_options(deps, pixel_format, settings.snapshot_dir.clone());

    Ok(CaptureRun {
        app,
        owner,
        pump,
        stats,
        _windows: windows,
    })
}

/// Start, wait, optionally snapshot, stop. Runs on the tokio runtime.
async fn capture_workflow(
    app: CaptureApp,
    owner: Arc<dyn OwnerDispatcher>,
    request: StartRequest,
    cursor_enabled: bool,
    border_required: bool,
    duration: Duration,
    snapshot: bool,
) -> Result<()> {
    let started = match request {
        StartRequest::Window(handle) => {
            let app = app.clone();
            Some(run_on_owner(owner.as_ref(), move || app.start_from_window(handle)).await?)
        }
        StartRequest::Monitor(handle) => {
            let app = app.clone();
            Some(run_on_owner(owner.as_ref(), move || app.start_from_monitor(handle)).await?)
        }
        StartRequest::Picker => app.start_from_picker().await?,
    };

    let Some(item) = started else {
        println!("No target picked");
        return Ok(());
    };
    println!("Capturing {} ({}x{})", item.display_name(), item.size().0, item.size().1);

    {
        let app = app.clone();
        run_on_owner(owner.as_ref(), move || {
            app.set_cursor_enabled(cursor_enabled)?;
            app.set_border_required(border_required)
        })
        .await?;
    }

    tokio::time::sleep(duration).await;

    if snapshot {
        match app.take_snapshot().await? {
            Some(file) => println!("Snapshot saved to {}", file.path().display()),
            None => println!("No snapshot saved"),
        }
    }

    let app = app.clone();
    run_on_owner(owner.as_ref(), move || app.stop_session()).await
}

fn run_capture(args: CaptureArgs, settings: &Settings) -> Result<()> {
    let services = platform::create_services()?;
    let request = start_request(&args, &services)?;
    let CaptureRun {
        app,
        owner,
        mut pump,
        stats,
        _windows,
    } = build_capture_run(&args, settings, &services)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build async runtime")?;

    let workflow = runtime.spawn(capture_workflow(
        app.clone(),
        owner,
        request,
        settings.cursor_enabled && !args.no_cursor,
        settings.border_required && !args.no_border,
        Duration::from_secs(args.seconds),
        args.snapshot.is_some(),
    ));

    // This thread owns the sessions: run posted jobs and OS messages until done.
    let report_every = Duration::from_millis(config::timing::SURFACE_REPORT_INTERVAL_MS);
    let mut last_report = Instant::now();
    while !workflow.is_finished() {
        pump.run_pending();
        platform::pump_messages();

        if last_report.elapsed() >= report_every {
            if let Some(line) = stats.report() {
                tracing::debug!(stats = %line, "Surface");
                eprintln!("{}", line);
            }
            last_report = Instant::now();
        }
        std::thread::sleep(Duration::from_millis(config::timing::OWNER_POLL_INTERVAL_MS));
    }
    pump.run_pending();

    let outcome = runtime
        .block_on(workflow)
        .map_err(|e| anyhow!("Capture workflow panicked: {}", e))?;

    // Covers the error paths where the workflow returned before stopping.
    app.stop_session()?;
    outcome
}
