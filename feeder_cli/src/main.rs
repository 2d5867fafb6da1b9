#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![allow(clippy::module_name_repetitions)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Feeder daemon: wires the hardware (or its simulation) to the engine and
//! runs the 50 ms main loop until Ctrl-C.

mod cli;
mod inbox;
mod pad;
mod statefile;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::Local;
use clap::Parser;
use eyre::{Result, WrapErr};
use tracing::{info, warn};

use feeder_core::buttons::ButtonSource;
use feeder_core::{Engine, FeedScheduler, Geometry, MotionLink, ScheduleMode};
use feeder_traits::{ButtonId, ButtonPad};

use crate::cli::Cli;
use crate::inbox::{CommandInbox, InboxCommand};
use crate::pad::{PadAction, PadContext};
use crate::statefile::JsonStateFile;

const LOOP_INTERVAL: Duration = Duration::from_millis(50);

fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Cli::parse();

    let config = load_config(&args)?;
    let level = config
        .logging
        .level
        .clone()
        .unwrap_or_else(|| args.log_level.clone());
    cli::init_logging(&level, args.json, config.logging.file.as_deref());

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::SeqCst);
        })
        .wrap_err("failed to install signal handler")?;
    }

    run(&args, &config, &shutdown)
}

fn load_config(args: &Cli) -> Result<feeder_config::Config> {
    let config = if args.config.exists() {
        let text = std::fs::read_to_string(&args.config)
            .wrap_err_with(|| format!("failed to read {}", args.config.display()))?;
        feeder_config::Config::from_toml_str(&text)
            .wrap_err_with(|| format!("invalid config {}", args.config.display()))?
    } else {
        feeder_config::Config::default()
    };
    config.validate()?;
    Ok(config)
}

fn connect_link(args: &Cli, config: &feeder_config::Config) -> Result<MotionLink> {
    if args.simulate {
        info!("using simulated controller");
        let (w, r) = feeder_hardware::SimulatedFirmware::transport();
        return Ok(MotionLink::connect(w, r));
    }
    let (w, r) = feeder_hardware::serial::open(
        &config.serial.port,
        config.serial.baud,
        Duration::from_millis(config.serial.read_timeout_ms),
    )
    .wrap_err_with(|| format!("failed to open serial port {}", config.serial.port))?;
    Ok(MotionLink::connect(w, r))
}

fn open_pad(args: &Cli, config: &feeder_config::Config) -> Box<dyn ButtonPad> {
    if args.simulate {
        return Box::new(feeder_hardware::SimulatedPad);
    }
    #[cfg(all(feature = "hardware", target_os = "linux"))]
    {
        let pins = [
            config.pins.button_up,
            config.pins.button_down,
            config.pins.button_left,
            config.pins.button_right,
            config.pins.button_ok,
        ];
        match feeder_hardware::gpio::GpioPad::new(pins) {
            Ok(pad) => return Box::new(pad),
            Err(e) => warn!(error = %e, "gpio pad unavailable, buttons disabled"),
        }
    }
    let _ = config;
    Box::new(feeder_hardware::SimulatedPad)
}

fn build_scheduler(config: &feeder_config::Config) -> FeedScheduler {
    // Validation already rejected unknown modes.
    let mode = config
        .schedule
        .mode
        .parse()
        .unwrap_or(ScheduleMode::Interval);
    FeedScheduler::new(
        mode,
        config.schedule.interval_hours,
        config.schedule.daily_hour,
        config.schedule.daily_minute,
    )
}

fn run(args: &Cli, config: &feeder_config::Config, shutdown: &AtomicBool) -> Result<()> {
    let link = connect_link(args, config)?;

    let state_file = JsonStateFile::new(&args.state_file);
    let restored = state_file.load();

    let mut engine = Engine::new(
        link,
        Geometry::from_config(&config.geometry),
        config.limits.max_cans,
        build_scheduler(config),
        JsonStateFile::new(&args.state_file),
    );
    if let Some(snap) = &restored {
        engine.restore(snap);
    }
    engine.begin_startup(Local::now());

    let mut buttons = ButtonSource::new(open_pad(args, config));
    let mut context = PadContext::Run;
    let mut inbox = args.inbox.as_ref().map(CommandInbox::new);

    info!("feeder running");
    while !shutdown.load(Ordering::SeqCst) {
        let loop_start = Instant::now();
        let now = Local::now();

        let mut pressed: Vec<ButtonId> = Vec::new();
        buttons.poll(loop_start, |ev| pressed.push(ev.id));
        for id in pressed {
            context = dispatch(&mut engine, context, context.action(id));
        }

        if let Some(inbox) = inbox.as_mut() {
            for cmd in inbox.poll(loop_start) {
                apply_inbox(&mut engine, cmd);
            }
        }

        engine.tick(now);

        if let Some(remaining) = LOOP_INTERVAL.checked_sub(loop_start.elapsed()) {
            std::thread::sleep(remaining);
        }
    }

    info!("shutting down");
    engine.shutdown(Local::now().timestamp());
    Ok(())
}

fn dispatch(engine: &mut Engine<JsonStateFile>, context: PadContext, action: PadAction) -> PadContext {
    let ts = Local::now().timestamp();
    match action {
        PadAction::Feed => engine.manual_feed(ts),
        PadAction::Eject => {
            if let Err(e) = engine.start_eject(ts) {
                warn!(error = %e, "eject rejected");
            }
        }
        PadAction::Abort => engine.abort(ts),
        PadAction::CanLoadBegin => {
            if let Err(e) = engine.can_load_begin() {
                warn!(error = %e, "can load rejected");
            }
        }
        PadAction::CanLoadConfirm => {
            if let Err(e) = engine.can_load_confirm() {
                warn!(error = %e, "can load confirm rejected");
            }
        }
        PadAction::HomeX => {
            if let Err(e) = engine.home_x() {
                warn!(error = %e, "home x rejected");
            }
        }
        PadAction::HomeZ => {
            if let Err(e) = engine.home_z() {
                warn!(error = %e, "home z rejected");
            }
        }
        PadAction::RequestPosition => {
            if let Err(e) = engine.request_position() {
                warn!(error = %e, "position request rejected");
            }
        }
        PadAction::NextContext => {
            let next = context.next();
            info!(from = ?context, to = ?next, "pad context switched");
            return next;
        }
    }
    context
}

fn apply_inbox(engine: &mut Engine<JsonStateFile>, cmd: InboxCommand) {
    let ts = Local::now().timestamp();
    match cmd {
        InboxCommand::ManualFeed => engine.manual_feed(ts),
        InboxCommand::Eject => {
            if let Err(e) = engine.start_eject(ts) {
                warn!(error = %e, "inbox eject rejected");
            }
        }
        InboxCommand::Abort => engine.abort(ts),
        InboxCommand::ResetSchedule => engine.reset_schedule(Local::now()),
        InboxCommand::SetCans { cans } => engine.set_cans_loaded(cans, ts),
    }
}
