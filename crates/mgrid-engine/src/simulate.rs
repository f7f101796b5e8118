//! Simulator contract and deadline-bound invocation.
//!
//! The engine treats the simulator as an opaque, possibly-slow black box.
//! Implementations are `Send + Sync` so a deadline-bound attempt can run on
//! a helper thread; implementations that want to reuse expensive
//! intermediates across colocated points (see
//! [`BalanceStrategy::GroupedByAxis`](crate::balance::BalanceStrategy))
//! keep their cache behind interior mutability; the engine only
//! guarantees colocation.

use std::sync::mpsc::{channel, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use mgrid_core::{ErrorInfo, GridError, ParamSet, Payload};

/// Errors a simulator may report for one grid point.
#[derive(Debug, Clone, PartialEq)]
pub enum SimulatorError {
    /// Recoverable per-point failure; the sweep continues.
    Failure {
        /// Coarse error kind (exception type, solver stage, etc.).
        kind: String,
        /// Diagnostic message retained in the failure log.
        message: String,
    },
    /// Memory exhaustion. Always fatal: the process's invariants can no
    /// longer be trusted, so the whole sweep aborts immediately.
    OutOfMemory {
        /// Diagnostic message.
        message: String,
    },
}

/// One expensive, potentially-failing simulation per grid point.
pub trait Simulator: Send + Sync {
    /// Fixed width of the payload vector for every successful attempt.
    /// A successful payload of any other width is classified as a failure,
    /// keeping the persisted result stream rectangular.
    fn payload_len(&self) -> usize;

    /// Runs the simulation for one resolved parameter assignment.
    ///
    /// Must be side-effect-free with respect to the scheduler's state; may
    /// be slow, may fail.
    fn simulate(&self, params: &ParamSet) -> Result<Payload, SimulatorError>;
}

/// Terminal classification of one attempt, before persistence.
#[derive(Debug)]
pub enum Attempt {
    /// The simulator returned a payload in time.
    Success(Payload),
    /// The configured deadline expired; the attempt was abandoned.
    TimedOut,
    /// The simulator failed (or panicked); the sweep continues.
    Failed {
        /// Coarse failure kind.
        kind: String,
        /// Diagnostic message.
        message: String,
    },
    /// Unrecoverable condition; the sweep must abort.
    Fatal(GridError),
}

/// Invokes the simulator for one point under the optional deadline.
///
/// With no deadline the call runs inline and blocks the worker. With a
/// deadline the attempt runs on a helper thread; on expiry the helper is
/// abandoned (only the attempt dies, never the worker) and the caller
/// records a timeout.
pub fn run_attempt(
    simulator: &Arc<dyn Simulator>,
    params: &ParamSet,
    deadline: Option<Duration>,
) -> Attempt {
    let expected = simulator.payload_len();
    match deadline {
        None => {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                simulator.simulate(params)
            }));
            match outcome {
                Ok(result) => classify(result, expected),
                Err(_) => Attempt::Failed {
                    kind: "panic".to_string(),
                    message: "simulator panicked before producing a result".to_string(),
                },
            }
        }
        Some(limit) => {
            let (tx, rx) = channel();
            let sim = Arc::clone(simulator);
            let params = params.clone();
            thread::spawn(move || {
                // The receiver may be gone if the deadline already fired.
                let _ = tx.send(sim.simulate(&params));
            });
            match rx.recv_timeout(limit) {
                Ok(result) => classify(result, expected),
                Err(RecvTimeoutError::Timeout) => Attempt::TimedOut,
                Err(RecvTimeoutError::Disconnected) => Attempt::Failed {
                    kind: "panic".to_string(),
                    message: "simulator panicked before producing a result".to_string(),
                },
            }
        }
    }
}

fn classify(result: Result<Payload, SimulatorError>, expected: usize) -> Attempt {
    match result {
        Ok(payload) if payload.len() != expected => Attempt::Failed {
            kind: "payload-width".to_string(),
            message: format!(
                "simulator produced {} payload fields but declared {expected}",
                payload.len()
            ),
        },
        Ok(payload) => Attempt::Success(payload),
        Err(SimulatorError::Failure { kind, message }) => Attempt::Failed { kind, message },
        Err(SimulatorError::OutOfMemory { message }) => Attempt::Fatal(GridError::Resource(
            ErrorInfo::new("simulator-oom", message)
                .with_hint("already-flushed checkpoints remain valid for a restart"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SleepySimulator {
        sleep: Duration,
    }

    impl Simulator for SleepySimulator {
        fn payload_len(&self) -> usize {
            1
        }

        fn simulate(&self, params: &ParamSet) -> Result<Payload, SimulatorError> {
            thread::sleep(self.sleep);
            Ok(Payload::new(vec![params.values().sum()]))
        }
    }

    fn params() -> ParamSet {
        let mut params = ParamSet::new();
        params.insert("a".to_string(), 2.0);
        params
    }

    #[test]
    fn fast_attempts_succeed_under_deadline() {
        let sim: Arc<dyn Simulator> = Arc::new(SleepySimulator {
            sleep: Duration::from_millis(1),
        });
        let attempt = run_attempt(&sim, &params(), Some(Duration::from_secs(5)));
        assert!(matches!(attempt, Attempt::Success(_)));
    }

    #[test]
    fn slow_attempts_time_out() {
        let sim: Arc<dyn Simulator> = Arc::new(SleepySimulator {
            sleep: Duration::from_millis(250),
        });
        let attempt = run_attempt(&sim, &params(), Some(Duration::from_millis(20)));
        assert!(matches!(attempt, Attempt::TimedOut));
    }

    struct PanickySimulator;

    impl Simulator for PanickySimulator {
        fn payload_len(&self) -> usize {
            1
        }

        fn simulate(&self, _params: &ParamSet) -> Result<Payload, SimulatorError> {
            panic!("solver blew up");
        }
    }

    #[test]
    fn panics_classify_as_failures_under_deadline() {
        let sim: Arc<dyn Simulator> = Arc::new(PanickySimulator);
        let attempt = run_attempt(&sim, &params(), Some(Duration::from_secs(5)));
        match attempt {
            Attempt::Failed { kind, .. } => assert_eq!(kind, "panic"),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    struct NarrowSimulator;

    impl Simulator for NarrowSimulator {
        fn payload_len(&self) -> usize {
            2
        }

        fn simulate(&self, params: &ParamSet) -> Result<Payload, SimulatorError> {
            Ok(Payload::new(vec![params.values().sum()]))
        }
    }

    #[test]
    fn payload_width_mismatch_classifies_as_failure() {
        let sim: Arc<dyn Simulator> = Arc::new(NarrowSimulator);
        let attempt = run_attempt(&sim, &params(), None);
        match attempt {
            Attempt::Failed { kind, .. } => assert_eq!(kind, "payload-width"),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    struct OomSimulator;

    impl Simulator for OomSimulator {
        fn payload_len(&self) -> usize {
            1
        }

        fn simulate(&self, _params: &ParamSet) -> Result<Payload, SimulatorError> {
            Err(SimulatorError::OutOfMemory {
                message: "allocation failed".to_string(),
            })
        }
    }

    #[test]
    fn oom_is_fatal() {
        let sim: Arc<dyn Simulator> = Arc::new(OomSimulator);
        let attempt = run_attempt(&sim, &params(), None);
        assert!(matches!(attempt, Attempt::Fatal(GridError::Resource(_))));
    }
}
