//! Cross-thread mutation path: any number of producers submit
//! [`Command`]s, the simulation thread drains them at the top of each
//! frame so every mutation lands on a frame boundary.

use crossfire::mpmc;
use crossfire::{MAsyncTx, MRx, TrySendError, detect_backoff_cfg};
use plife_core::{Command, WorldState};
use tracing::{debug, warn};

/// Producer half of the bus; cheap to clone, one per controller.
#[derive(Clone)]
pub struct CommandBus {
    sender: MAsyncTx<Command>,
}

/// Consumer half, owned by the simulation loop.
pub struct CommandDrain {
    receiver: MRx<Command>,
}

/// Open a bounded bus. The capacity backpressures bursty producers;
/// overflow drops the command rather than blocking the producer.
pub fn open(capacity: usize) -> (CommandBus, CommandDrain) {
    detect_backoff_cfg();
    let (sender, receiver) = mpmc::bounded_tx_async_rx_blocking(capacity);
    (CommandBus { sender }, CommandDrain { receiver })
}

impl CommandBus {
    /// Fire-and-forget submission; returns whether the command was queued.
    pub fn submit(&self, command: Command) -> bool {
        match self.sender.try_send(command) {
            Ok(()) => true,
            Err(TrySendError::Full(cmd)) => {
                warn!(?cmd, "command queue full; dropping");
                false
            }
            Err(TrySendError::Disconnected(cmd)) => {
                debug!(?cmd, "command queue closed");
                false
            }
        }
    }
}

impl CommandDrain {
    /// Apply everything queued, in submission order. Returns how many
    /// commands were applied. Empty and disconnected both end the drain.
    pub fn apply_to(&self, world: &mut WorldState) -> usize {
        let mut applied = 0;
        while let Ok(command) = self.receiver.try_recv() {
            debug!(?command, "applying command");
            world.apply_command(command);
            applied += 1;
        }
        applied
    }
}
