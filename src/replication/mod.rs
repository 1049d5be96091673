//! Replication bookkeeping: master-side replica bookkeeping and replica-side
//! master-link state. No locking and no background threads: both roles
//! are driven entirely from the single event-loop thread.

pub mod handshake;

pub use handshake::{perform_handshake, resolve_master_host, HandshakeOutcome};

/// Whether this instance is serving as a write master or a read-only
/// replica of another instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Master,
    Replica { master_host: String, master_port: u16 },
}

/// A connected replica, tracked only by the connection id the event loop
/// already uses to address its socket, plus the offset it last acknowledged.
#[derive(Debug, Clone)]
pub struct ReplicaHandle {
    pub conn_id: u64,
    pub ack_offset: u64,
}

/// All replication bookkeeping for this instance, whichever role it plays.
pub struct ReplicationState {
    pub role: Role,

    /// 40-character alphanumeric id minted at startup.
    pub master_replid: String,

    /// Master side: total raw bytes of propagated commands sent to
    /// replicas so far. Replica side: bytes of commands successfully
    /// applied from the master link so far. The two meanings never both
    /// apply to the same instance.
    pub master_repl_offset: u64,

    pub replicas: Vec<ReplicaHandle>,
}

impl ReplicationState {
    pub fn new_master() -> Self {
        ReplicationState {
            role: Role::Master,
            master_replid: generate_repl_id(),
            master_repl_offset: 0,
            replicas: Vec::new(),
        }
    }

    pub fn new_replica(master_host: String, master_port: u16) -> Self {
        ReplicationState {
            role: Role::Replica {
                master_host,
                master_port,
            },
            master_replid: generate_repl_id(),
            master_repl_offset: 0,
            replicas: Vec::new(),
        }
    }

    pub fn is_master(&self) -> bool {
        matches!(self.role, Role::Master)
    }

    pub fn is_replica(&self) -> bool {
        !self.is_master()
    }

    pub fn register_replica(&mut self, conn_id: u64) {
        self.replicas.push(ReplicaHandle {
            conn_id,
            ack_offset: 0,
        });
    }

    pub fn remove_replica(&mut self, conn_id: u64) {
        self.replicas.retain(|r| r.conn_id != conn_id);
    }

    pub fn update_ack(&mut self, conn_id: u64, offset: u64) {
        if let Some(r) = self.replicas.iter_mut().find(|r| r.conn_id == conn_id) {
            r.ack_offset = offset;
        }
    }

    pub fn replica_count(&self) -> usize {
        self.replicas.len()
    }

    /// Master side only: the offset advances by the exact number of raw
    /// bytes written to replicas, matching `propagate`'s write.
    pub fn record_propagated(&mut self, bytes: usize) {
        self.master_repl_offset += bytes as u64;
    }

    /// Replica side only: the offset advances by the parsed byte length of
    /// each command successfully applied from the master link, not a flat
    /// per-command increment.
    pub fn advance_applied_offset(&mut self, bytes: usize) {
        self.master_repl_offset += bytes as u64;
    }
}

/// Generates a 40-character alphanumeric replication id.
pub fn generate_repl_id() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let bytes: Vec<u8> = (0..40)
        .map(|_| {
            let n = rng.gen_range(0..62);
            match n {
                0..=9 => b'0' + n,
                10..=35 => b'a' + n - 10,
                36..=61 => b'A' + n - 36,
                _ => unreachable!(),
            }
        })
        .collect();

    String::from_utf8(bytes).unwrap()
}
