//! Shared fixtures for unit tests.

use std::sync::Mutex;

use bacstack_core::Apdu;

use crate::stack::LowerLayer;

/// Lower layer that keeps everything sent through it.
#[derive(Default)]
pub(crate) struct Recorder {
    pub(crate) sent: Mutex<Vec<Apdu>>,
}

impl Recorder {
    /// Drain what has been sent so far.
    pub(crate) fn take(&self) -> Vec<Apdu> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }
}

impl LowerLayer for Recorder {
    fn request(&self, apdu: Apdu) {
        self.sent.lock().unwrap().push(apdu);
    }
}
