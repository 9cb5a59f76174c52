use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// One-way shutdown flag shared between the public handles and the io
/// loop. Once killed, the loop drops the transport and exits; a pending
/// reconnection attempt is superseded.
#[derive(Clone, Debug, Default)]
pub(crate) struct KillSwitch(Arc<AtomicBool>);

impl KillSwitch {
    pub(crate) fn kill(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub(crate) fn killed(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
