//! Console control surface.
//!
//! Any key toggles impairment between off and the configured factor; `q` quits.
//! Runs on its own OS thread because console reads block.

use std::sync::Arc;
use std::thread::JoinHandle;

use console::Term;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::goo::GooControl;
use crate::record::Recorder;

/// Key that terminates the process.
pub const QUIT_KEY: char = 'q';

/// What a key press did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    /// Impairment toggled; carries the new effective factor.
    Toggled(u32),
    /// Shutdown requested.
    Quit,
}

/// Keyboard listener driving the shared [`GooControl`].
pub struct ControlSurface {
    control: Arc<GooControl>,
    recorder: Option<Arc<Recorder>>,
    shutdown: broadcast::Sender<()>,
}

impl ControlSurface {
    pub fn new(
        control: Arc<GooControl>,
        recorder: Option<Arc<Recorder>>,
        shutdown: broadcast::Sender<()>,
    ) -> Self {
        Self {
            control,
            recorder,
            shutdown,
        }
    }

    /// Apply one key press.
    pub fn handle_key(&self, key: char) -> ControlAction {
        if key == QUIT_KEY {
            self.note("Terminating StreamGoo");
            let _ = self.shutdown.send(());
            return ControlAction::Quit;
        }

        let factor = self.control.toggle();
        if factor == 0 {
            self.note("Pausing all goo - hit q to quit, any other key to start goo again");
        } else {
            self.note(&format!("Setting goo factor back to original value ({factor})..."));
        }
        ControlAction::Toggled(factor)
    }

    /// Start listening on the terminal. Returns `None` when stdin is not a terminal.
    pub fn spawn(self) -> Option<JoinHandle<()>> {
        let term = Term::stdout();
        if !term.is_term() {
            warn!("No terminal attached, keyboard control disabled");
            return None;
        }

        info!("Hit any key to stop gooeyness, then again to restart; '{QUIT_KEY}' quits");

        let handle = std::thread::Builder::new()
            .name("goo-control".into())
            .spawn(move || loop {
                match term.read_char() {
                    Ok(key) => {
                        if self.handle_key(key) == ControlAction::Quit {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Keyboard control stopped: {}", e);
                        break;
                    }
                }
            });

        match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("Failed to start keyboard control: {}", e);
                None
            }
        }
    }

    fn note(&self, message: &str) {
        info!("{}", message);
        if let Some(ref recorder) = self.recorder {
            if let Err(e) = recorder.log(message) {
                warn!("{}", e);
            }
        }
    }
}
