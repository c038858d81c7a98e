use std::sync::atomic::{AtomicBool, Ordering};

use blockloc_experiment::AbortSignal;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigint(_: libc::c_int) {
    // A second Ctrl-C leaves at once, e.g. while blocked on the trigger.
    if INTERRUPTED.swap(true, Ordering::SeqCst) {
        unsafe { libc::_exit(130) };
    }
}

/// Ctrl-C requests an abort, observed at the engine's next checkpoint.
#[derive(Debug)]
pub struct SigintAbort(());

impl SigintAbort {
    pub fn install() -> anyhow::Result<Self> {
        let handler = on_sigint as extern "C" fn(libc::c_int) as libc::sighandler_t;
        if unsafe { libc::signal(libc::SIGINT, handler) } == libc::SIG_ERR {
            anyhow::bail!("cannot install SIGINT handler: {}", std::io::Error::last_os_error());
        }
        Ok(Self(()))
    }
}

impl AbortSignal for SigintAbort {
    fn poll(&mut self) -> bool {
        INTERRUPTED.load(Ordering::SeqCst)
    }

    fn poll_pre_roll(&mut self) -> bool {
        self.poll()
    }
}
