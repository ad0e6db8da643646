//! Frame dispatch: fetch, hand each frame to the sinks, re-enqueue.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::device::{FrameGuard, Session};
use crate::error::{Result, TyError, TyStatus};
use crate::frame::Frame;
use crate::input::{Key, KeySource, NoKeys};

/// How long the capture thread waits for a frame before re-checking the stop flag.
const CALLBACK_POLL: Duration = Duration::from_millis(100);
/// Main-thread sleep step while the capture thread runs.
const WAIT_STEP: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Quit,
}

/// Per-frame information shared with every sink.
pub struct SinkContext<'a> {
    pub session: &'a Session,
    /// 1-based count of dispatched frames
    pub frame_index: u64,
    /// Key pressed since the previous frame
    pub key: Option<Key>,
}

pub trait FrameSink: Send {
    fn on_start(&mut self, _session: &Session) -> Result<()> {
        Ok(())
    }

    fn on_frame(&mut self, ctx: &SinkContext<'_>, frame: &Frame) -> Result<Control>;

    fn on_stop(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Shared stop flag.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Raise the flag on Ctrl-C. Only one handler can be installed per process.
    pub fn install_ctrlc(&self) -> Result<()> {
        let flag = self.clone();
        ctrlc::set_handler(move || {
            info!("interrupted, stopping");
            flag.stop();
        })
        .map_err(|e| TyError::Other(format!("failed to install Ctrl-C handler: {}", e)))
    }
}

/// Hands every fetched frame to its sinks and always returns the buffer.
pub struct Dispatcher {
    sinks: Vec<Box<dyn FrameSink>>,
    keys: Box<dyn KeySource>,
    frames: u64,
    max_frames: Option<u64>,
    soft_trigger: bool,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(Box::new(NoKeys))
    }
}

impl Dispatcher {
    pub fn new(keys: Box<dyn KeySource>) -> Self {
        Self {
            sinks: Vec::new(),
            keys,
            frames: 0,
            max_frames: None,
            soft_trigger: false,
        }
    }

    pub fn add_sink(&mut self, sink: impl FrameSink + 'static) -> &mut Self {
        self.sinks.push(Box::new(sink));
        self
    }

    /// Stop after `limit` frames.
    pub fn set_frame_limit(&mut self, limit: Option<u64>) -> &mut Self {
        self.max_frames = limit;
        self
    }

    /// Send a software trigger before every fetch, for devices in trigger mode.
    pub fn set_soft_trigger(&mut self, enabled: bool) -> &mut Self {
        self.soft_trigger = enabled;
        self
    }

    /// Frames dispatched so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Run every sink on one frame, then re-enqueue it.
    pub fn dispatch(&mut self, session: &Session, frame: FrameGuard<'_>, stop: &StopSignal) -> Result<()> {
        self.frames += 1;
        debug!("=== Get frame {}", self.frames);

        let key = self.keys.poll();
        match key {
            Some(Key::Quit) => stop.stop(),
            Some(Key::Other(c)) => debug!("Pressed key {}", c),
            _ => {}
        }

        let ctx = SinkContext {
            session,
            frame_index: self.frames,
            key,
        };
        let mut result = Ok(());
        for sink in &mut self.sinks {
            match sink.on_frame(&ctx, &frame) {
                Ok(Control::Continue) => {}
                Ok(Control::Quit) => stop.stop(),
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }

        let released = frame.release();
        if self.max_frames.is_some_and(|max| self.frames >= max) {
            debug!("frame limit reached");
            stop.stop();
        }
        result.and(released)
    }

    /// Fetch and dispatch on the calling thread until `stop` is raised.
    ///
    /// A failed fetch drops that frame and the loop goes on; only errors
    /// that mean the session is gone end it.
    pub fn run_polling(&mut self, session: &Session, stop: &StopSignal, timeout: Option<Duration>) -> Result<u64> {
        for sink in &mut self.sinks {
            sink.on_start(session)?;
        }
        let result = self.pump(session, stop, timeout);
        let stopped = self.stop_sinks();
        result.and(stopped).map(|_| self.frames)
    }

    /// Move the session to a capture thread that dispatches frames while
    /// this thread sleeps in 100 ms steps until `stop` is raised. The session
    /// is closed before returning.
    pub fn run_callback(mut self, session: Session, stop: StopSignal) -> Result<u64> {
        for sink in &mut self.sinks {
            sink.on_start(&session)?;
        }

        let capture_stop = stop.clone();
        let capture = thread::Builder::new()
            .name("capture".into())
            .spawn(move || {
                let result = catch_unwind(AssertUnwindSafe(|| {
                    self.pump(&session, &capture_stop, Some(CALLBACK_POLL))
                }))
                .unwrap_or_else(|_| Err(TyError::Other("frame sink panicked".into())));
                capture_stop.stop();
                let stopped = self.stop_sinks();
                (session, result.and(stopped).map(|_| self.frames))
            })?;

        debug!("=== Wait for callback");
        while !stop.is_stopped() {
            thread::sleep(WAIT_STEP);
        }

        let (session, result) = capture
            .join()
            .map_err(|_| TyError::Other("capture thread panicked".into()))?;
        let closed = session.close();
        let frames = result?;
        closed?;
        Ok(frames)
    }

    fn pump(&mut self, session: &Session, stop: &StopSignal, timeout: Option<Duration>) -> Result<()> {
        while !stop.is_stopped() {
            if self.soft_trigger {
                if let Err(e) = session.send_soft_trigger() {
                    warn!("soft trigger failed: {}", e);
                }
            }
            match session.fetch(timeout) {
                Ok(Some(frame)) => self.dispatch(session, frame, stop)?,
                Ok(None) => {}
                Err(e) if is_fatal(&e) => return Err(e),
                Err(e) => warn!("Fetch frame error {}. Drop one frame", e),
            }
        }
        Ok(())
    }

    fn stop_sinks(&mut self) -> Result<()> {
        let mut result = Ok(());
        for sink in &mut self.sinks {
            if let Err(e) = sink.on_stop() {
                warn!("sink failed to stop: {}", e);
                result = result.and(Err(e));
            }
        }
        result
    }
}

fn is_fatal(err: &TyError) -> bool {
    matches!(
        err.status(),
        Some(TyStatus::Idle | TyStatus::InvalidHandle | TyStatus::NotInited)
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::common::ComponentId;
    use crate::device::{DeviceSelector, Library};
    use crate::input::ScriptedKeys;
    use crate::sim::{SimBackend, SimConfig};

    fn session() -> Session {
        let backend = SimBackend::new(SimConfig {
            frame_interval_ms: 0,
            ..SimConfig::default()
        });
        let session = Library::init(Box::new(backend))
            .unwrap()
            .open(&DeviceSelector::First)
            .unwrap();
        session.enable(ComponentId::DEPTH).unwrap();
        session.prepare_buffers(2, 0).unwrap();
        session.start().unwrap();
        session
    }

    struct Recorder {
        seen: Arc<Mutex<Vec<(u64, Option<Key>, bool)>>>,
        quit_at: Option<u64>,
    }

    impl FrameSink for Recorder {
        fn on_frame(&mut self, ctx: &SinkContext<'_>, frame: &Frame) -> Result<Control> {
            self.seen
                .lock()
                .unwrap()
                .push((ctx.frame_index, ctx.key, frame.depth().is_some()));
            if self.quit_at == Some(ctx.frame_index) {
                Ok(Control::Quit)
            } else {
                Ok(Control::Continue)
            }
        }
    }

    struct Failing;

    impl FrameSink for Failing {
        fn on_frame(&mut self, _: &SinkContext<'_>, _: &Frame) -> Result<Control> {
            Err(TyError::Other("boom".into()))
        }
    }

    #[test]
    fn polling_stops_at_frame_limit() {
        let session = session();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::default();
        dispatcher
            .add_sink(Recorder {
                seen: seen.clone(),
                quit_at: None,
            })
            .set_frame_limit(Some(5));
        let frames = dispatcher.run_polling(&session, &StopSignal::new(), None).unwrap();
        assert_eq!(frames, 5);
        assert!(seen.lock().unwrap().iter().all(|(_, _, depth)| *depth));
    }

    #[test]
    fn quit_key_and_sink_quit_stop_the_loop() {
        let session = session();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let keys = ScriptedKeys::new([None, Some(Key::Save), Some(Key::Quit)]);
        let mut dispatcher = Dispatcher::new(Box::new(keys));
        dispatcher.add_sink(Recorder {
            seen: seen.clone(),
            quit_at: None,
        });
        assert_eq!(dispatcher.run_polling(&session, &StopSignal::new(), None).unwrap(), 3);
        assert_eq!(seen.lock().unwrap()[1].1, Some(Key::Save));

        let mut dispatcher = Dispatcher::default();
        dispatcher.add_sink(Recorder {
            seen,
            quit_at: Some(2),
        });
        assert_eq!(dispatcher.run_polling(&session, &StopSignal::new(), None).unwrap(), 2);
    }

    #[test]
    fn buffers_return_even_when_a_sink_fails() {
        let session = session();
        let mut dispatcher = Dispatcher::default();
        dispatcher.add_sink(Failing);
        assert!(dispatcher.run_polling(&session, &StopSignal::new(), None).is_err());
        // both buffers are still usable
        let a = session.fetch(None).unwrap().unwrap();
        let b = session.fetch(None).unwrap().unwrap();
        drop((a, b));
    }

    #[test]
    fn soft_triggers_drive_trigger_mode() {
        let backend = SimBackend::new(SimConfig {
            frame_interval_ms: 0,
            ..SimConfig::default()
        });
        let session = Library::init(Box::new(backend))
            .unwrap()
            .open(&DeviceSelector::First)
            .unwrap();
        session.enable(ComponentId::DEPTH).unwrap();
        session.set_trigger_mode(true).unwrap();
        session.prepare_buffers(2, 0).unwrap();
        session.start().unwrap();

        let mut dispatcher = Dispatcher::default();
        dispatcher.set_soft_trigger(true).set_frame_limit(Some(3));
        let timeout = Some(Duration::from_millis(5));
        assert_eq!(dispatcher.run_polling(&session, &StopSignal::new(), timeout).unwrap(), 3);
    }

    #[test]
    fn callback_mode_runs_on_a_capture_thread() {
        let session = session();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::default();
        dispatcher
            .add_sink(Recorder {
                seen: seen.clone(),
                quit_at: None,
            })
            .set_frame_limit(Some(4));
        let frames = dispatcher.run_callback(session, StopSignal::new()).unwrap();
        assert_eq!(frames, 4);
        assert_eq!(seen.lock().unwrap().len(), 4);
    }
}
