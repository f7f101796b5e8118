//! Checkpoint flush ordering across workers.
//!
//! Under the sharded discipline each worker owns its chain stream and
//! flushes independently. Under the shared discipline all workers append to
//! one stream, serialized by a ring token: worker 0 writes first and
//! signals worker 1, which writes and signals worker 2, and so on; the last
//! worker signals worker 0 to close the round. Rank 0 drains the closing
//! token before opening its next round and again at finalization, and the
//! final barrier guarantees no worker exits with signals still in flight.
//!
//! Shared-discipline rounds are collective: callers agree up front on the
//! round count (derivable from the shared assignment table and completion
//! state) and every worker participates in every round, passing the token
//! even when its buffer is empty.

use mgrid_core::GridError;
use serde::{Deserialize, Serialize};

use crate::comm::GroupChannel;
use crate::store::{ChainRecord, OutputStore};

/// Write discipline for checkpoint flushes, fixed for the sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WriteDiscipline {
    /// Each worker appends to its own chain stream.
    Sharded,
    /// All workers append to one shared stream under the token ring.
    Shared,
}

impl Default for WriteDiscipline {
    fn default() -> Self {
        WriteDiscipline::Sharded
    }
}

/// Orders and executes flushes of buffered results for one worker.
pub struct CheckpointCoordinator<'a> {
    store: &'a OutputStore,
    channel: &'a dyn GroupChannel,
    discipline: WriteDiscipline,
    /// Rounds rank 0 has opened whose closing token is still in flight.
    rounds_open: usize,
}

impl<'a> CheckpointCoordinator<'a> {
    /// Creates a coordinator bound to this worker's store and channel.
    pub fn new(
        store: &'a OutputStore,
        channel: &'a dyn GroupChannel,
        discipline: WriteDiscipline,
    ) -> Self {
        Self {
            store,
            channel,
            discipline,
            rounds_open: 0,
        }
    }

    /// Flushes one batch to durable storage.
    ///
    /// Sharded: an independent append (no-op for an empty batch). Shared:
    /// one collective ring round; the batch may be empty but the token is
    /// always passed.
    pub fn flush(&mut self, batch: &[ChainRecord]) -> Result<(), GridError> {
        match self.discipline {
            WriteDiscipline::Sharded => {
                if batch.is_empty() {
                    return Ok(());
                }
                self.store.append_chain(batch)
            }
            WriteDiscipline::Shared => self.flush_shared(batch),
        }
    }

    fn flush_shared(&mut self, batch: &[ChainRecord]) -> Result<(), GridError> {
        let world = self.channel.world_size();
        if world == 1 {
            if !batch.is_empty() {
                self.store.append_chain(batch)?;
            }
            return Ok(());
        }
        let rank = self.channel.rank();
        if rank == 0 {
            if self.rounds_open > 0 {
                self.channel.recv_from(world - 1)?;
                self.rounds_open -= 1;
            }
            if !batch.is_empty() {
                self.store.append_chain(batch)?;
            }
            self.channel.send_to(1, Vec::new())?;
            self.rounds_open += 1;
        } else {
            self.channel.recv_from(rank - 1)?;
            if !batch.is_empty() {
                self.store.append_chain(batch)?;
            }
            self.channel.send_to((rank + 1) % world, Vec::new())?;
        }
        Ok(())
    }

    /// Drains outstanding tokens and holds every worker at the final
    /// barrier until all pending flushes are durable.
    pub fn finalize(&mut self) -> Result<(), GridError> {
        let world = self.channel.world_size();
        if self.discipline == WriteDiscipline::Shared
            && world > 1
            && self.channel.rank() == 0
            && self.rounds_open > 0
        {
            self.channel.recv_from(world - 1)?;
            self.rounds_open -= 1;
        }
        self.channel.barrier()
    }
}
