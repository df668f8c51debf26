//! Process signals: SIGHUP reopens logs, SIGUSR1 requests a GC pass

use crate::logging::LogHandle;
use crate::service::trigger::GcTrigger;
use log::{error, info};
use std::io;

#[cfg(unix)]
pub fn spawn_handlers(log_handle: Option<LogHandle>, gc_trigger: GcTrigger) -> io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup())?;
    let mut user1 = signal(SignalKind::user_defined1())?;

    tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(()) = hangup.recv() => match &log_handle {
                    Some(handle) => {
                        if let Err(e) = handle.reopen() {
                            error!("Failed to reopen logs: {}", e);
                        }
                    }
                    None => info!("SIGHUP ignored; log4rs is not active"),
                },
                Some(()) = user1.recv() => {
                    info!("GC requested by SIGUSR1");
                    gc_trigger.request_run();
                }
                else => break,
            }
        }
    });
    Ok(())
}

#[cfg(not(unix))]
pub fn spawn_handlers(_log_handle: Option<LogHandle>, _gc_trigger: GcTrigger) -> io::Result<()> {
    info!("Signal handlers are only installed on unix");
    Ok(())
}
