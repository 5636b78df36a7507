//! tabsense: simulate co-open contexts on an in-process bus, or classify a
//! user agent.

use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use parking_lot::Mutex;

use tabsense::bus::{Bus, LocalBus};
use tabsense::config::{DEFAULT_CHANNEL, TabConfig};
use tabsense::device::{DeviceInfo, StaticMedia, SystemInfoProvider, UserAgentProvider};
use tabsense::host::{
    ChannelEventProvider, HostEvent, HostEvents, MemorySessionStore, NoopOpener, OpenedWindow,
    WindowOpener,
};
use tabsense::{Platform, Snapshot, TabError, TabHandle, mount};

#[derive(Debug, Parser)]
#[command(name = "tabsense", version, about = "Serverless tab presence and focus accounting")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Mount several contexts on one bus and log what each one observes.
    Simulate(SimulateOpts),
    /// Classify a user-agent string and print the composed device report for
    /// a lone context.
    Inspect(InspectOpts),
}

#[derive(Debug, Args)]
struct SimulateOpts {
    /// Independently opened contexts.
    #[arg(long, default_value_t = 2)]
    tabs: usize,
    /// Have the first context spawn one more through its spawn capability.
    #[arg(long)]
    spawn: bool,
    /// Take focus away from the first context for this many milliseconds.
    #[arg(long, default_value_t = 0)]
    blur_ms: u64,
    #[arg(long, env = "TABSENSE_DISCOVERY_MS", default_value_t = 500)]
    discovery_ms: u64,
    /// Delay before the opener announces a spawned context.
    #[arg(long, env = "TABSENSE_SPAWN_DELAY_MS", default_value_t = 100)]
    spawn_delay_ms: u64,
    #[arg(long, env = "TABSENSE_CHANNEL", default_value = DEFAULT_CHANNEL)]
    channel: String,
}

impl Default for SimulateOpts {
    fn default() -> Self {
        Self {
            tabs: 2,
            spawn: false,
            blur_ms: 0,
            discovery_ms: 500,
            spawn_delay_ms: 100,
            channel: DEFAULT_CHANNEL.to_string(),
        }
    }
}

#[derive(Debug, Args)]
struct InspectOpts {
    #[arg(long)]
    user_agent: String,
    #[arg(long, default_value = "")]
    platform: String,
}

type Spawned = Arc<Mutex<Vec<(TabHandle, HostEvents)>>>;

#[tokio::main]
async fn main() -> Result<(), TabError> {
    let filter = std::env::var("TABSENSE_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .init();

    let args = Cli::parse();
    match args.command {
        Some(Command::Inspect(opts)) => inspect(opts).await?,
        Some(Command::Simulate(opts)) => simulate(opts).await?,
        None => simulate(SimulateOpts::default()).await?,
    }
    Ok(())
}

async fn inspect(opts: InspectOpts) -> Result<(), TabError> {
    let provider = UserAgentProvider {
        user_agent: opts.user_agent,
        platform: opts.platform,
    };
    let system = provider.system_info();
    tracing::info!(
        os = %system.os_name,
        os_version = %system.os_version,
        browser = %system.browser,
        browser_version = %system.browser_version,
        device = %system.device_type,
        "user agent classified"
    );

    // Device queries run while the context is still discovering; the
    // report is then brought up to date with the frozen snapshot.
    let bus: Arc<dyn Bus> = Arc::new(LocalBus::new());
    let (tab, _host) = open_tab(&TabConfig::default(), &bus, Arc::new(NoopOpener))?;
    let report = DeviceInfo::collect(&provider, &StaticMedia::default(), tab.snapshot()).await;
    let report = report.with_tab(tab.discovered().await);
    println!("{report:#?}");
    tab.unmount().await
}

fn open_tab(
    config: &TabConfig,
    bus: &Arc<dyn Bus>,
    opener: Arc<dyn WindowOpener>,
) -> Result<(TabHandle, HostEvents), TabError> {
    let (events, host) = ChannelEventProvider::new();
    let tab = mount(
        config.clone(),
        Platform {
            bus: Arc::clone(bus),
            session: Arc::new(MemorySessionStore::new()),
            events: Box::new(events),
            opener,
        },
    )?;
    Ok((tab, host))
}

/// An opener that mounts the new context on the same bus.
fn spawning_opener(config: TabConfig, bus: Arc<dyn Bus>, spawned: Spawned) -> Arc<dyn WindowOpener> {
    Arc::new(move |url: &str| match open_tab(&config, &bus, Arc::new(NoopOpener)) {
        Ok(child) => {
            spawned.lock().push(child);
            Some(OpenedWindow {
                url: url.to_string(),
            })
        }
        Err(e) => {
            tracing::warn!(error = %e, "spawned context failed to mount");
            None
        }
    })
}

async fn simulate(opts: SimulateOpts) -> Result<(), TabError> {
    let config = TabConfig::default()
        .with_channel(opts.channel)
        .with_discovery_window(Duration::from_millis(opts.discovery_ms))
        .with_spawn_announce_delay(Duration::from_millis(opts.spawn_delay_ms));
    let bus: Arc<dyn Bus> = Arc::new(LocalBus::new());
    let spawned: Spawned = Arc::default();

    let mut tabs = Vec::with_capacity(opts.tabs);
    for _ in 0..opts.tabs.max(1) {
        let opener = spawning_opener(config.clone(), Arc::clone(&bus), Arc::clone(&spawned));
        tabs.push(open_tab(&config, &bus, opener)?);
    }

    for (tab, _) in &tabs {
        log_snapshot("discovered", tab, &tab.discovered().await);
    }

    if opts.blur_ms > 0 {
        let (first, host) = &tabs[0];
        host.emit(HostEvent::WindowBlur);
        tokio::time::sleep(Duration::from_millis(opts.blur_ms)).await;
        host.emit(HostEvent::WindowFocus);
        tokio::task::yield_now().await;
        log_snapshot("refocused", first, &first.snapshot());
    }

    if opts.spawn {
        let (first, _) = &tabs[0];
        first.spawner().open("/");
        tokio::time::sleep(config.spawn_announce_delay + config.discovery_window).await;
        log_snapshot("after spawn", first, &first.snapshot());
    }

    let children: Vec<(TabHandle, HostEvents)> = std::mem::take(&mut *spawned.lock());
    for (tab, _) in children.into_iter().rev().chain(tabs.into_iter().rev()) {
        tab.unmount().await?;
    }
    Ok(())
}

fn log_snapshot(stage: &str, tab: &TabHandle, snap: &Snapshot) {
    tracing::info!(
        stage,
        tab = %tab.peer_id(),
        total_tabs = snap.total_tabs,
        multiple = snap.has_multiple_instances,
        new_tabs = snap.new_tabs_count,
        focused = snap.is_currently_focused,
        focus_lost = snap.focus_lost_count,
        focus_loss_ms = snap.total_focus_loss_time.as_millis() as u64,
        "snapshot"
    );
}
