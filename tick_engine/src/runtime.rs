use comms::{Fabric, Packet};
use log::{debug, info};
use tokio::{
    sync::mpsc::UnboundedReceiver,
    time::{self, MissedTickBehavior},
};

use crate::{
    engine::Engine,
    error::{ExitCode, Result},
};

/// Runs one core until it terminates or fails.
///
/// Every packet taken from the mailbox is handled on the arrival path and
/// the work it triggers runs right after; a timer at the configured
/// watchdog period aborts the run when the core stops making progress.
///
/// # Arguments
/// * `engine` - The core to run.
/// * `mailbox` - The packets routed to this core.
///
/// # Returns
/// The exit code of the stage.
pub async fn run_core<F: Fabric>(
    mut engine: Engine<F>,
    mut mailbox: UnboundedReceiver<Packet>,
) -> ExitCode {
    let res = drive(&mut engine, &mut mailbox).await;
    engine.finish(&res)
}

async fn drive<F: Fabric>(
    engine: &mut Engine<F>,
    mailbox: &mut UnboundedReceiver<Packet>,
) -> Result<()> {
    engine.start()?;
    engine.run_tasks()?;

    let mut watchdog = time::interval(engine.config().watchdog);
    watchdog.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    watchdog.tick().await;

    let mut open = true;
    while !engine.is_terminated() {
        tokio::select! {
            packet = mailbox.recv(), if open => match packet {
                Some(packet) => engine.handle(packet)?,
                None => {
                    debug!(core = engine.name(); "mailbox closed");
                    open = false;
                }
            },
            _ = watchdog.tick() => engine.check_watchdog()?,
        }
    }

    info!(core = engine.name(), ticks = engine.counters().total_ticks; "core done");
    Ok(())
}
