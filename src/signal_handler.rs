use std::{
    fmt::{self, Display, Formatter},
    sync::atomic::{AtomicUsize, Ordering},
};

static PENDING: AtomicUsize = AtomicUsize::new(0);

#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Signal {
    Interrupt = 1,
    Hangup = 2,
    Terminate = 3,
}

impl Display for Signal {
    fn fmt(&self, fmt: &mut Formatter) -> fmt::Result {
        let string = match *self {
            Signal::Interrupt => "interrupt",
            Signal::Hangup => "hangup",
            Signal::Terminate => "terminate",
        };

        fmt.write_str(string)
    }
}

/// Records termination signals rather than letting them kill the process
/// mid-upgrade, so the orchestrator can route them through its rollback path.
pub fn init() {
    extern "C" fn handler(signal: i32) {
        let signal = match signal {
            libc::SIGINT => Signal::Interrupt,
            libc::SIGHUP => Signal::Hangup,
            libc::SIGTERM => Signal::Terminate,
            _ => return,
        };

        PENDING.store(signal as usize, Ordering::SeqCst);
    }

    unsafe {
        let _ = libc::signal(libc::SIGHUP, handler as libc::sighandler_t);
        let _ = libc::signal(libc::SIGINT, handler as libc::sighandler_t);
        let _ = libc::signal(libc::SIGTERM, handler as libc::sighandler_t);
    }
}

/// The most recent signal received, if any.
pub fn pending() -> Option<Signal> {
    match PENDING.load(Ordering::SeqCst) {
        1 => Some(Signal::Interrupt),
        2 => Some(Signal::Hangup),
        3 => Some(Signal::Terminate),
        _ => None,
    }
}
