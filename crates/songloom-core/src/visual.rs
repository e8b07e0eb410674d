//! Visualization hooks.
//!
//! A hook observes every trigger a track sends to its instrument. It is
//! called after the instrument accepted the trigger, with the same payload
//! and the same scheduled time.

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::pitch::PitchSet;
use crate::timing::BarsBeatsSixteenths;

/// What a hook sees for one trigger.
#[derive(Clone, Debug, PartialEq)]
pub struct VisualPayload {
    /// Name of the track that fired.
    pub track: String,
    pub pitches: Option<PitchSet>,
    pub duration: Option<BarsBeatsSixteenths>,
    /// Scheduled time in seconds, identical to the instrument's.
    pub time: f64,
}

/// Observer fired alongside an instrument trigger.
///
/// Hooks run on the transport's thread and must return quickly.
pub trait VisualizationHook: Send {
    fn on_trigger(&mut self, payload: &VisualPayload);
}

impl<F> VisualizationHook for F
where
    F: FnMut(&VisualPayload) + Send,
{
    fn on_trigger(&mut self, payload: &VisualPayload) {
        self(payload)
    }
}

/// Hook that forwards payloads to another thread.
///
/// Uses `try_send`, so a full or disconnected channel drops the payload
/// instead of stalling playback.
pub struct ChannelHook {
    sender: Sender<VisualPayload>,
    dropped: u64,
}

impl ChannelHook {
    pub fn new(sender: Sender<VisualPayload>) -> Self {
        Self { sender, dropped: 0 }
    }

    /// Hook plus receiver over a channel holding at most `capacity` payloads.
    pub fn bounded(capacity: usize) -> (Self, Receiver<VisualPayload>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (Self::new(tx), rx)
    }

    pub fn unbounded() -> (Self, Receiver<VisualPayload>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self::new(tx), rx)
    }

    /// Payloads that could not be delivered.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl VisualizationHook for ChannelHook {
    fn on_trigger(&mut self, payload: &VisualPayload) {
        match self.sender.try_send(payload.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                log::trace!("visual channel full, dropped payload for {}", payload.track);
            }
            Err(TrySendError::Disconnected(_)) => {
                if self.dropped == 0 {
                    log::debug!("visual channel disconnected");
                }
                self.dropped += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(time: f64) -> VisualPayload {
        VisualPayload {
            track: "bass".to_string(),
            pitches: Some(PitchSet::parse(&["A2"]).unwrap()),
            duration: Some(BarsBeatsSixteenths::from_sixteenths(2)),
            time,
        }
    }

    #[test]
    fn test_closure_hook() {
        let mut seen = Vec::new();
        {
            let mut hook = |p: &VisualPayload| seen.push(p.time);
            hook.on_trigger(&payload(0.5));
            hook.on_trigger(&payload(1.0));
        }
        assert_eq!(seen, vec![0.5, 1.0]);
    }

    #[test]
    fn test_channel_hook_forwards() {
        let (mut hook, rx) = ChannelHook::unbounded();
        hook.on_trigger(&payload(0.25));
        assert_eq!(rx.try_recv().unwrap(), payload(0.25));
    }

    #[test]
    fn test_channel_hook_never_blocks() {
        let (mut hook, rx) = ChannelHook::bounded(1);
        hook.on_trigger(&payload(0.0));
        hook.on_trigger(&payload(0.1));
        assert_eq!(hook.dropped(), 1);
        drop(rx);
        hook.on_trigger(&payload(0.2));
        assert_eq!(hook.dropped(), 2);
    }
}
