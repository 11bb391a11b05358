//! Top-level CLI definition and daemon dispatch.

use std::path::PathBuf;

use clap::Parser;

/// drivewatch — removable storage monitor daemon.
#[derive(Debug, Parser)]
#[command(
    name = "drivewatchd",
    author,
    version,
    about = "Removable storage monitor - tracks USB drives and their free space",
    long_about = None
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
    /// Run the blocking polling loop instead of the observer thread.
    #[arg(long, conflicts_with = "observe")]
    pub poll: bool,
    /// Run the observer thread (the default mode).
    #[arg(long)]
    pub observe: bool,
    /// Track devices on every bus, not just USB.
    #[arg(long)]
    pub all_buses: bool,
    /// Override the poll cycle interval in seconds.
    #[arg(long, value_name = "SECS")]
    pub interval: Option<u64>,
}

#[cfg(target_os = "linux")]
pub use linux::run;

#[cfg(not(target_os = "linux"))]
pub fn run(_args: &Cli) -> drivewatch::core::errors::Result<()> {
    Err(drivewatch::core::errors::DwError::UnsupportedPlatform {
        details: "the hotplug monitor requires Linux udev".to_string(),
    })
}

#[cfg(target_os = "linux")]
mod linux {
    use std::io::{self, BufRead};
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use drivewatch::core::config::{Config, MonitorMode};
    use drivewatch::core::errors::{DwError, Result};
    use drivewatch::daemon::notifications::{NotificationEvent, NotificationManager};
    use drivewatch::daemon::poller::Poller;
    use drivewatch::daemon::signals::SignalHandler;
    use drivewatch::hotplug::funnel::EventFunnel;
    use drivewatch::hotplug::monitor::{DeviceMonitor, ObserverHandle};
    use drivewatch::hotplug::queue::EventQueue;
    use drivewatch::hotplug::source::UdevSource;
    use drivewatch::platform::pal::detect_platform;

    use super::Cli;

    const SHUTDOWN_POLL: Duration = Duration::from_millis(200);

    /// Whichever monitor mode is active, reduced to what shutdown needs.
    enum MonitorTask {
        Observer(ObserverHandle),
        Polling(thread::JoinHandle<()>),
    }

    pub fn run(args: &Cli) -> Result<()> {
        let config = effective_config(args)?;
        let started = Instant::now();

        let platform = detect_platform()?;
        let notifier = Arc::new(NotificationManager::from_config(&config.notifications));
        let queue = EventQueue::with_capacity(config.poller.queue_capacity);
        let funnel = EventFunnel::new(
            queue.clone(),
            Arc::clone(&notifier),
            config.monitor.only_removable,
        );
        let signals = SignalHandler::new();

        let poller = Poller::new(
            queue,
            platform,
            Arc::clone(&notifier),
            Duration::from_secs(config.poller.interval_secs),
        )
        .with_stop(signals.shutdown_flag());
        let mut poller_handle = poller.spawn()?;

        let source = UdevSource::new()?;
        let mut monitor = DeviceMonitor::new(
            source,
            funnel,
            Arc::clone(&notifier),
            Duration::from_millis(config.monitor.poll_timeout_ms),
        )
        .with_stop(signals.shutdown_flag());

        let seeded = monitor.seed_existing()?;
        notifier.notify(&NotificationEvent::MonitorStarted {
            version: env!("CARGO_PKG_VERSION").to_string(),
            mode: config.monitor.mode.to_string(),
            seeded_devices: seeded,
        });

        let task = match config.monitor.mode {
            MonitorMode::Observe => MonitorTask::Observer(monitor.spawn_observer()?),
            MonitorMode::Poll => {
                let join = thread::Builder::new()
                    .name("dw-monitor".to_string())
                    .spawn(move || {
                        let _ = monitor.run_polling();
                    })
                    .map_err(|error| DwError::Runtime {
                        details: format!("failed to spawn polling thread: {error}"),
                    })?;
                MonitorTask::Polling(join)
            }
        };

        spawn_stdin_watcher(signals.clone());
        eprintln!("drivewatchd: monitoring started ({} mode), press q to quit", config.monitor.mode);

        while !signals.should_shutdown() {
            thread::sleep(SHUTDOWN_POLL);
        }

        notifier.notify(&NotificationEvent::MonitorStopped {
            reason: "stop requested".to_string(),
            uptime_secs: started.elapsed().as_secs(),
        });

        match task {
            MonitorTask::Observer(mut handle) => handle.destroy(),
            // The polling thread shares the shutdown flag, so it is already
            // on its way out; just wait for it.
            MonitorTask::Polling(join) => {
                let _ = join.join();
            }
        }
        poller_handle.destroy();
        Ok(())
    }

    /// Load the config file and fold the command-line overrides in on top.
    fn effective_config(args: &Cli) -> Result<Config> {
        let mut config = Config::load(args.config.as_deref())?;
        if args.poll {
            config.monitor.mode = MonitorMode::Poll;
        }
        if args.observe {
            config.monitor.mode = MonitorMode::Observe;
        }
        if args.all_buses {
            config.monitor.only_removable = false;
        }
        if let Some(secs) = args.interval {
            config.poller.interval_secs = secs;
        }
        config.validate()?;
        Ok(config)
    }

    /// Watch stdin for an interactive quit command. The thread parks on the
    /// blocking read and is intentionally left detached; it exits on EOF or
    /// once `q` flips the shared shutdown flag.
    fn spawn_stdin_watcher(signals: SignalHandler) {
        let _ = thread::Builder::new()
            .name("dw-stdin".to_string())
            .spawn(move || {
                let stdin = io::stdin();
                for line in stdin.lock().lines() {
                    match line {
                        Ok(text) if text.trim().eq_ignore_ascii_case("q") => {
                            signals.request_shutdown();
                            break;
                        }
                        Ok(_) => {}
                        Err(_) => break,
                    }
                }
            });
    }
}
