//! Application runner - wires the pieces together and runs the control loop.
//!
//! `run_app` builds everything from settings and the command line, then hands
//! off to `Runner`. Per iteration the runner:
//!
//! 1. Drains the input channel (stdin keys, API commands, status queries)
//! 2. Takes at most one newly ingested pathname
//! 3. Ticks the slideshow and renders the frame
//! 4. Sleeps out the rest of the frame budget
//!
//! Everything except the worker threads runs here, on one thread.

use std::path::PathBuf;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, unbounded};
use log::{debug, info, trace, warn};

use crate::cli::Args;
use crate::config::Settings;
use crate::core::clock::{Clock, SystemClock};
use crate::core::loader::LoadWorker;
use crate::core::slide_cache::SlideCache;
use crate::core::slideshow::Slideshow;
use crate::email::LogEmailSender;
use crate::entities::ImageCrateDecoder;
use crate::ingest::IngestPoller;
use crate::input::{Command, Input, spawn_stdin_reader};
use crate::library;
use crate::paths::{self, DATABASE_FILE, PathConfig, SETTINGS_FILE};
use crate::render::{LogRenderer, Renderer};
use crate::server::ApiServer;
use crate::store::SqlitePhotoStore;

/// Control loop state.
pub struct Runner<R: Renderer> {
    slideshow: Slideshow,
    renderer: R,
    inputs: Receiver<Input>,
    ingest: Option<IngestPoller>,
    clock: Rc<dyn Clock>,
    frame_interval: Duration,
    quit: bool,
}

impl<R: Renderer> Runner<R> {
    pub fn new(
        slideshow: Slideshow,
        renderer: R,
        inputs: Receiver<Input>,
        ingest: Option<IngestPoller>,
        clock: Rc<dyn Clock>,
        fps: f32,
    ) -> Self {
        Self {
            slideshow,
            renderer,
            inputs,
            ingest,
            clock,
            frame_interval: Duration::from_secs_f32(1.0 / fps),
            quit: false,
        }
    }

    /// Loop until quit, then shut the workers down.
    pub fn run(&mut self) {
        info!("Running at {:.0} fps", 1.0 / self.frame_interval.as_secs_f32());
        loop {
            let start = Instant::now();
            if !self.step() {
                break;
            }
            // A slow tick just runs late; no catching up
            let remaining = self.frame_interval.saturating_sub(start.elapsed());
            if !remaining.is_zero() {
                thread::sleep(remaining);
            }
        }
        self.shutdown();
    }

    /// One iteration. Returns false once quit was requested.
    pub fn step(&mut self) -> bool {
        self.drain_inputs();
        if self.quit {
            return false;
        }

        let pathname = self.ingest.as_ref().and_then(IngestPoller::next_pathname);
        if let Some(pathname) = pathname {
            match self.slideshow.ingest(&pathname) {
                Ok(Some(position)) => info!("Ingested {} at {}", pathname, position),
                Ok(None) => debug!("Ingested {} was already showing", pathname),
                Err(e) => warn!("Failed to ingest {}: {}", pathname, e),
            }
        }

        let frame = self.slideshow.tick(self.clock.now());
        self.renderer.render(&frame);
        true
    }

    fn drain_inputs(&mut self) {
        while let Ok(input) = self.inputs.try_recv() {
            trace!("Input: {:?}", input);
            match input {
                Input::Key(key) => {
                    if let Some(command) = self.slideshow.handle_key(key) {
                        self.handle_runner_command(command);
                    }
                }
                Input::Command(command) => {
                    self.slideshow.apply(command);
                    self.handle_runner_command(command);
                }
                Input::Status(reply) => {
                    let mut status = self.slideshow.status();
                    status.ingesting = self.ingest.as_ref().is_some_and(IngestPoller::is_fetching);
                    // The asker may have given up
                    let _ = reply.send(status);
                }
            }
        }
    }

    /// Commands that act on the loop itself rather than the show.
    fn handle_runner_command(&mut self, command: Command) {
        match command {
            Command::Quit => {
                info!("Quit requested");
                self.quit = true;
            }
            Command::ToggleIngest => match &mut self.ingest {
                Some(poller) => poller.toggle_fetching(),
                None => warn!("No ingest directory configured"),
            },
            _ => {}
        }
    }

    pub fn slideshow(&self) -> &Slideshow {
        &self.slideshow
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn is_quitting(&self) -> bool {
        self.quit
    }

    /// Stop every worker thread (bounded joins).
    pub fn shutdown(&mut self) {
        info!("Shutting down");
        if let Some(poller) = &mut self.ingest {
            poller.shutdown();
        }
        self.slideshow.shutdown();
    }
}

/// Build the show from `args` and run it until quit.
///
/// Expects the config and data directories to exist (`paths::ensure_dirs`).
pub fn run_app(args: Args) -> Result<()> {
    let path_config = PathConfig::from_env_and_cli(args.config_dir.clone());

    let settings_path = paths::config_file(SETTINGS_FILE, &path_config);
    info!("Config path: {}", settings_path.display());
    let mut settings = Settings::load(&settings_path)?;
    args.apply_to(&mut settings);
    settings.validate()?;

    let db_path: PathBuf = settings
        .database
        .clone()
        .unwrap_or_else(|| paths::data_file(DATABASE_FILE, &path_config));
    info!("Database: {}", db_path.display());
    let store = SqlitePhotoStore::open(&db_path)
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    info!("Photo root: {}", settings.root_dir.display());
    let photos = library::build_library(&store, &settings)?;
    info!("Final photos to be shown: {}", photos.len());

    let clock: Rc<dyn Clock> = Rc::new(SystemClock::default());
    let loader = LoadWorker::spawn(ImageCrateDecoder::default()).context("Failed to start loader")?;
    let screen = (settings.screen_width, settings.screen_height);
    let cache = SlideCache::new(settings.cache_capacity, screen, loader, Rc::clone(&clock))?;
    let slideshow = Slideshow::new(
        photos,
        &settings,
        cache,
        Box::new(store),
        Box::new(LogEmailSender),
        Rc::clone(&clock),
    )?;

    let (input_tx, input_rx) = unbounded();
    if !args.no_stdin {
        spawn_stdin_reader(input_tx.clone()).context("Failed to start stdin reader")?;
    }
    if settings.api_server_enabled {
        ApiServer::start(settings.api_server_port, input_tx.clone())
            .context("Failed to start API server")?;
    }
    drop(input_tx);

    let ingest = match settings.resolved_ingest_dir() {
        Some(dir) => {
            info!("Ingest directory: {}", dir.display());
            let mut poller = IngestPoller::spawn(
                &dir,
                &settings.root_dir,
                Duration::from_secs_f64(settings.ingest_poll_s),
                Duration::from_secs_f64(settings.max_ingest_s),
            )
            .context("Failed to start ingest poller")?;
            if args.ingest {
                poller.set_fetching(true);
            }
            Some(poller)
        }
        None => None,
    };

    let mut runner = Runner::new(slideshow, LogRenderer::new(), input_rx, ingest, clock, settings.fps);
    runner.run();
    info!("Application exiting");
    Ok(())
}
