//! Collective-communication capability between workers.
//!
//! The engine never talks to a transport directly: load-balance agreement,
//! completion-state merging, checkpoint token passing, and the end-of-sweep
//! barrier all go through [`GroupChannel`]. Any message-passing substrate
//! can implement it; [`ThreadGroup`] is the in-process implementation used
//! by the runner, with one `std::sync::mpsc` channel per ordered rank pair.
//! The barrier rides the same mesh (gather to rank 0, then release), so a
//! worker that died early surfaces as a comm error instead of a hang.

use std::sync::mpsc::{channel, Receiver, Sender};

use mgrid_core::{ErrorInfo, GridError};

/// Element-wise combination applied by [`GroupChannel::all_reduce`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    /// Element-wise sum.
    Sum,
    /// Element-wise maximum.
    Max,
}

fn comm_error(code: &str, message: impl ToString) -> GridError {
    GridError::Comm(ErrorInfo::new(code, message.to_string()))
}

fn encode_u64s(values: &[u64]) -> Result<Vec<u8>, GridError> {
    bincode::serialize(values).map_err(|err| comm_error("reduce-encode", err))
}

fn decode_u64s(bytes: &[u8]) -> Result<Vec<u64>, GridError> {
    bincode::deserialize(bytes).map_err(|err| comm_error("reduce-decode", err))
}

/// Group communication primitives shared by every worker of a sweep.
///
/// Implementations must guarantee that `send_to`/`recv_from` preserve the
/// per-pair message order and that `barrier` releases only once every rank
/// has arrived.
pub trait GroupChannel: Send {
    /// This worker's rank in `[0, world_size)`.
    fn rank(&self) -> usize;

    /// Fixed number of workers in the group.
    fn world_size(&self) -> usize;

    /// Distributes `payload` from `root` to every rank.
    ///
    /// The root must pass `Some(payload)`; every rank (root included)
    /// returns the root's bytes.
    fn broadcast(&self, root: usize, payload: Option<Vec<u8>>) -> Result<Vec<u8>, GridError>;

    /// Sends a message to a specific rank.
    fn send_to(&self, dest: usize, payload: Vec<u8>) -> Result<(), GridError>;

    /// Blocks until a message from `src` arrives.
    fn recv_from(&self, src: usize) -> Result<Vec<u8>, GridError>;

    /// Blocks until every rank has arrived.
    fn barrier(&self) -> Result<(), GridError>;

    /// Combines `local` across all ranks; every rank returns the result.
    ///
    /// Rank 0 gathers, combines, and broadcasts; vectors must agree on
    /// length across ranks.
    fn all_reduce(&self, local: &[u64], op: ReduceOp) -> Result<Vec<u64>, GridError> {
        if self.world_size() == 1 {
            return Ok(local.to_vec());
        }
        if self.rank() == 0 {
            let mut acc = local.to_vec();
            for src in 1..self.world_size() {
                let other = decode_u64s(&self.recv_from(src)?)?;
                if other.len() != acc.len() {
                    return Err(comm_error(
                        "reduce-shape",
                        format!("rank {src} contributed {} values, expected {}", other.len(), acc.len()),
                    ));
                }
                for (slot, value) in acc.iter_mut().zip(other) {
                    match op {
                        ReduceOp::Sum => *slot += value,
                        ReduceOp::Max => *slot = (*slot).max(value),
                    }
                }
            }
            self.broadcast(0, Some(encode_u64s(&acc)?))?;
            Ok(acc)
        } else {
            self.send_to(0, encode_u64s(local)?)?;
            decode_u64s(&self.broadcast(0, None)?)
        }
    }
}

/// Trivial channel for a worker pool of one.
///
/// Point-to-point sends have no peer and are reported as comm errors so
/// misuse stays loud in unit tests.
#[derive(Debug, Default)]
pub struct SoloChannel;

impl GroupChannel for SoloChannel {
    fn rank(&self) -> usize {
        0
    }

    fn world_size(&self) -> usize {
        1
    }

    fn broadcast(&self, root: usize, payload: Option<Vec<u8>>) -> Result<Vec<u8>, GridError> {
        if root != 0 {
            return Err(comm_error("bcast-root", format!("no rank {root} in a solo group")));
        }
        payload.ok_or_else(|| comm_error("bcast-empty", "root must supply a payload"))
    }

    fn send_to(&self, dest: usize, _payload: Vec<u8>) -> Result<(), GridError> {
        Err(comm_error("solo-send", format!("no peer rank {dest} in a solo group")))
    }

    fn recv_from(&self, src: usize) -> Result<Vec<u8>, GridError> {
        Err(comm_error("solo-recv", format!("no peer rank {src} in a solo group")))
    }

    fn barrier(&self) -> Result<(), GridError> {
        Ok(())
    }
}

/// In-process group over a full mesh of `mpsc` channels.
pub struct ThreadGroup {
    rank: usize,
    world: usize,
    senders: Vec<Sender<Vec<u8>>>,
    receivers: Vec<Receiver<Vec<u8>>>,
}

impl std::fmt::Debug for ThreadGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadGroup")
            .field("rank", &self.rank)
            .field("world", &self.world)
            .finish_non_exhaustive()
    }
}

impl ThreadGroup {
    /// Creates one connected handle per rank.
    ///
    /// Handle `i` of the returned vector belongs to rank `i`; each handle
    /// is moved onto its worker thread.
    pub fn create(world: usize) -> Vec<ThreadGroup> {
        assert!(world >= 1, "a worker group needs at least one rank");
        let mut senders: Vec<Vec<Option<Sender<Vec<u8>>>>> = Vec::with_capacity(world);
        let mut receivers: Vec<Vec<Option<Receiver<Vec<u8>>>>> =
            (0..world).map(|_| (0..world).map(|_| None).collect()).collect();
        for src in 0..world {
            let mut row = Vec::with_capacity(world);
            for dest in 0..world {
                let (tx, rx) = channel();
                row.push(Some(tx));
                receivers[dest][src] = Some(rx);
            }
            senders.push(row);
        }
        senders
            .into_iter()
            .zip(receivers)
            .enumerate()
            .map(|(rank, (tx_row, rx_row))| ThreadGroup {
                rank,
                world,
                senders: tx_row.into_iter().flatten().collect(),
                receivers: rx_row.into_iter().flatten().collect(),
            })
            .collect()
    }
}

impl GroupChannel for ThreadGroup {
    fn rank(&self) -> usize {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.world
    }

    fn broadcast(&self, root: usize, payload: Option<Vec<u8>>) -> Result<Vec<u8>, GridError> {
        if root >= self.world {
            return Err(comm_error("bcast-root", format!("rank {root} outside world {}", self.world)));
        }
        if self.rank == root {
            let payload =
                payload.ok_or_else(|| comm_error("bcast-empty", "root must supply a payload"))?;
            for dest in 0..self.world {
                if dest != root {
                    self.send_to(dest, payload.clone())?;
                }
            }
            Ok(payload)
        } else {
            self.recv_from(root)
        }
    }

    fn send_to(&self, dest: usize, payload: Vec<u8>) -> Result<(), GridError> {
        let sender = self.senders.get(dest).ok_or_else(|| {
            comm_error("send-rank", format!("rank {dest} outside world {}", self.world))
        })?;
        sender
            .send(payload)
            .map_err(|_| comm_error("send-closed", format!("rank {dest} is gone")))
    }

    fn recv_from(&self, src: usize) -> Result<Vec<u8>, GridError> {
        let receiver = self.receivers.get(src).ok_or_else(|| {
            comm_error("recv-rank", format!("rank {src} outside world {}", self.world))
        })?;
        receiver
            .recv()
            .map_err(|_| comm_error("recv-closed", format!("rank {src} is gone")))
    }

    fn barrier(&self) -> Result<(), GridError> {
        if self.world == 1 {
            return Ok(());
        }
        if self.rank == 0 {
            for src in 1..self.world {
                self.recv_from(src)?;
            }
            for dest in 1..self.world {
                self.send_to(dest, Vec::new())?;
            }
        } else {
            self.send_to(0, Vec::new())?;
            self.recv_from(0)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn on_group<F, T>(world: usize, body: F) -> Vec<T>
    where
        F: Fn(ThreadGroup) -> T + Send + Sync + Copy,
        T: Send,
    {
        let handles = ThreadGroup::create(world);
        thread::scope(|scope| {
            let joins: Vec<_> = handles
                .into_iter()
                .map(|handle| scope.spawn(move || body(handle)))
                .collect();
            joins.into_iter().map(|join| join.join().unwrap()).collect()
        })
    }

    #[test]
    fn broadcast_reaches_every_rank() {
        let results = on_group(3, |group| {
            let payload = if group.rank() == 0 {
                Some(vec![7u8, 7, 7])
            } else {
                None
            };
            group.broadcast(0, payload).unwrap()
        });
        for bytes in results {
            assert_eq!(bytes, vec![7u8, 7, 7]);
        }
    }

    #[test]
    fn all_reduce_sums_and_maxes() {
        let sums = on_group(4, |group| {
            let local = vec![group.rank() as u64, 1];
            group.all_reduce(&local, ReduceOp::Sum).unwrap()
        });
        for result in sums {
            assert_eq!(result, vec![6, 4]);
        }
        let maxes = on_group(4, |group| {
            let local = vec![group.rank() as u64];
            group.all_reduce(&local, ReduceOp::Max).unwrap()
        });
        for result in maxes {
            assert_eq!(result, vec![3]);
        }
    }

    #[test]
    fn ring_send_preserves_order() {
        let results = on_group(3, |group| {
            let next = (group.rank() + 1) % group.world_size();
            let prev = (group.rank() + group.world_size() - 1) % group.world_size();
            group.send_to(next, vec![group.rank() as u8]).unwrap();
            group.send_to(next, vec![group.rank() as u8 + 10]).unwrap();
            let first = group.recv_from(prev).unwrap();
            let second = group.recv_from(prev).unwrap();
            (first[0], second[0])
        });
        for (rank, (first, second)) in results.into_iter().enumerate() {
            let prev = (rank + 2) % 3;
            assert_eq!(first as usize, prev);
            assert_eq!(second as usize, prev + 10);
        }
    }

    #[test]
    fn solo_channel_round_trips_broadcast() {
        let solo = SoloChannel;
        assert_eq!(solo.broadcast(0, Some(vec![1])).unwrap(), vec![1]);
        assert!(solo.send_to(1, vec![]).is_err());
        assert!(solo.barrier().is_ok());
        assert_eq!(solo.all_reduce(&[5], ReduceOp::Sum).unwrap(), vec![5]);
    }
}
