use crate::capture::input::types::MouseButton;
use crate::capture::traits::{MouseHook, PressCallback};
use crate::recorder::channel::{CaptureError, CaptureResult};
use parking_lot::Mutex as ParkingMutex;
use rdev::{listen, Button, Event, EventType};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, OnceLock};

/// Process-wide `rdev` listener.
///
/// `rdev::listen` blocks its thread for the life of the process and cannot be
/// cancelled, so one listener thread is started lazily and shared. The
/// mouse hook swaps the press callback in and out; the screen source reads
/// the last pointer position.
pub struct PointerHub {
    x: AtomicI32,
    y: AtomicI32,
    seen: AtomicBool,
    listening: AtomicBool,
    on_press: ParkingMutex<Option<PressCallback>>,
}

static HUB: OnceLock<Arc<PointerHub>> = OnceLock::new();

impl PointerHub {
    pub fn shared() -> Arc<PointerHub> {
        HUB.get_or_init(|| {
            Arc::new(PointerHub {
                x: AtomicI32::new(0),
                y: AtomicI32::new(0),
                seen: AtomicBool::new(false),
                listening: AtomicBool::new(false),
                on_press: ParkingMutex::new(None),
            })
        })
        .clone()
    }

    /// Start the listener thread if it is not running yet
    pub fn ensure_listening(self: &Arc<Self>) -> CaptureResult<()> {
        if self.listening.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let hub = self.clone();
        let spawned = std::thread::Builder::new()
            .name("rdev-listener".to_string())
            .spawn(move || {
                #[cfg(target_os = "macos")]
                rdev::set_is_main_thread(false);

                tracing::info!("Global input listener started");
                let handler = hub.clone();
                if let Err(e) = listen(move |event: Event| handler.handle(event)) {
                    tracing::error!("Global input listener failed: {:?}", e);
                }
                hub.listening.store(false, Ordering::SeqCst);
            });

        if let Err(e) = spawned {
            self.listening.store(false, Ordering::SeqCst);
            return Err(CaptureError::Io(e));
        }
        Ok(())
    }

    fn handle(&self, event: Event) {
        match event.event_type {
            EventType::MouseMove { x, y } => {
                self.x.store(x.round() as i32, Ordering::Relaxed);
                self.y.store(y.round() as i32, Ordering::Relaxed);
                self.seen.store(true, Ordering::Relaxed);
            }
            EventType::ButtonPress(button) => {
                let callback = self.on_press.lock().clone();
                if let Some(callback) = callback {
                    let (x, y) = (self.x.load(Ordering::Relaxed), self.y.load(Ordering::Relaxed));
                    callback(x, y, map_button(button));
                }
            }
            _ => {}
        }
    }

    /// Last pointer position reported by the listener
    pub fn position(&self) -> Option<(i32, i32)> {
        if !self.seen.load(Ordering::Relaxed) {
            return None;
        }
        Some((self.x.load(Ordering::Relaxed), self.y.load(Ordering::Relaxed)))
    }
}

fn map_button(button: Button) -> MouseButton {
    match button {
        Button::Left => MouseButton::Left,
        Button::Right => MouseButton::Right,
        Button::Middle => MouseButton::Middle,
        Button::Unknown(_) => MouseButton::Other,
    }
}

/// Global mouse hook on top of the shared `rdev` listener
pub struct RdevHook {
    hub: Arc<PointerHub>,
}

impl RdevHook {
    pub fn new(hub: Arc<PointerHub>) -> Self {
        Self { hub }
    }
}

impl MouseHook for RdevHook {
    fn install(&self, on_press: PressCallback) -> CaptureResult<()> {
        *self.hub.on_press.lock() = Some(on_press);
        self.hub.ensure_listening()
    }

    fn uninstall(&self) {
        self.hub.on_press.lock().take();
    }
}
