//! The cooperative single-threaded event loop and process bootstrap.
//!
//! Everything here runs on one thread: the listening socket, every client
//! socket, and (on a replica) the master link are all driven from the same
//! readiness sweep. There is no locking anywhere in this module because
//! there is nothing else running concurrently to lock against.

use crate::config::Config;
use crate::error::{Result, ServerError};
use crate::network::connection::Connection;
use crate::network::dispatcher::{self, DispatchResult, ServerSettings};
use crate::network::listener::Listener;
use crate::network::NetworkConfig;
use crate::protocol::{parse_message, serialize_command, ReplyFrame};
use crate::replication::{self, ReplicationState};
use crate::storage::{load_snapshot, Store};
use std::collections::{HashMap, HashSet};
use std::net::TcpStream;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

static CONN_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// The single-threaded engine: socket registry, store, and replication
/// state, all owned in one place with no synchronization needed.
pub struct EventLoop {
    listener: Listener,
    connections: HashMap<u64, Connection>,
    store: Store,
    repl: ReplicationState,
    settings: ServerSettings,
    /// Set only on a replica: the connection id of the link to its master.
    master_link_id: Option<u64>,
}

impl EventLoop {
    /// Runs forever. The only two suspension points in the whole engine
    /// are the readiness sweep below and `WAIT`'s own nested poll.
    pub fn run(&mut self) -> Result<()> {
        tracing::info!("event loop started");
        let mut idle_cycles: u32 = 0;

        loop {
            let mut did_work = false;

            if self.accept_new()? {
                did_work = true;
            }

            let ids: Vec<u64> = self.connections.keys().copied().collect();
            for id in ids {
                if !self.connections.contains_key(&id) {
                    continue;
                }

                let read = match self.connections.get_mut(&id) {
                    Some(conn) => conn.read_available(),
                    None => continue,
                };

                match read {
                    Ok(Some(bytes)) => {
                        did_work = true;
                        self.process_buffer(id, &bytes);
                    }
                    Ok(None) => {}
                    Err(_) => {
                        did_work = true;
                        self.close_connection(id);
                    }
                }
            }

            if did_work {
                idle_cycles = 0;
                thread::yield_now();
            } else {
                idle_cycles = idle_cycles.saturating_add(1);
                let sleep = match idle_cycles {
                    0..=10 => Duration::from_micros(10),
                    11..=100 => Duration::from_micros(100),
                    _ => Duration::from_millis(1),
                };
                thread::sleep(sleep);
            }
        }
    }

    fn accept_new(&mut self) -> Result<bool> {
        let mut accepted = false;
        for _ in 0..10 {
            match self.listener.accept()? {
                Some((stream, addr)) => {
                    let id = CONN_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
                    match Connection::new(id, stream, addr) {
                        Ok(conn) => {
                            tracing::info!(id, %addr, "client connected");
                            self.connections.insert(id, conn);
                            accepted = true;
                        }
                        Err(e) => tracing::warn!(error = %e, "failed to set up new connection"),
                    }
                }
                None => break,
            }
        }
        Ok(accepted)
    }

    /// Parses every complete frame out of `data` and dispatches each in
    /// order. A codec-level parse failure is reported to the originating
    /// socket and the rest of this read is dropped; it never closes the
    /// connection or touches other connections.
    fn process_buffer(&mut self, id: u64, data: &[u8]) {
        let is_master_link = self.master_link_id == Some(id);

        match parse_message(data) {
            Ok(commands) => {
                let mut offset = 0;
                for (message, len) in commands {
                    let raw = data[offset..offset + len].to_vec();
                    offset += len;
                    self.apply_command(id, &message, &raw, is_master_link);
                }
            }
            Err(e) => {
                self.send(id, &ReplyFrame::error(format!("ERR {}", e)));
            }
        }
    }

    fn apply_command(
        &mut self,
        id: u64,
        message: &crate::protocol::DecodedMessage,
        raw: &[u8],
        is_master_link: bool,
    ) {
        let result = dispatcher::dispatch(
            message,
            &mut self.store,
            &mut self.repl,
            &self.settings,
            is_master_link,
        );

        let applied = match result {
            Ok(DispatchResult::Reply(frame)) => {
                self.send(id, &frame);
                true
            }
            Ok(DispatchResult::Suppressed) => true,
            Ok(DispatchResult::ReplyAndPropagate(frame)) => {
                self.send(id, &frame);
                self.propagate(raw);
                true
            }
            Ok(DispatchResult::BeginFullResync { reply, snapshot }) => {
                self.send(id, &reply);
                if let Some(conn) = self.connections.get_mut(&id) {
                    let _ = conn.send_frame(&ReplyFrame::RawSnapshot(snapshot));
                }
                self.repl.register_replica(id);
                tracing::info!(id, "promoted connection to replica");
                true
            }
            Ok(DispatchResult::Wait {
                numreplicas,
                timeout_ms,
            }) => {
                self.handle_wait(id, numreplicas, timeout_ms);
                true
            }
            Err(e) => {
                self.send(id, &ReplyFrame::error(e.to_string()));
                false
            }
        };

        if is_master_link && applied {
            self.repl.advance_applied_offset(raw.len());
        }
    }

    /// Sends the raw bytes of one already-applied command to every
    /// attached replica and advances `master_repl_offset` by that many
    /// bytes. Master role only: a replica never calls this.
    fn propagate(&mut self, raw: &[u8]) {
        let ids: Vec<u64> = self.repl.replicas.iter().map(|r| r.conn_id).collect();
        for id in ids {
            if let Some(conn) = self.connections.get_mut(&id) {
                let _ = conn.send_raw(raw);
            }
        }
        self.repl.record_propagated(raw.len());
    }

    /// `WAIT`'s own nested readiness poll. Sends `REPLCONF GETACK *`
    /// directly to every replica socket (bypassing the generic dispatcher,
    /// which is not involved in this exchange), then reads each replica
    /// socket in a short-duration busy loop until either the requested
    /// number has responded or the timeout elapses.
    fn handle_wait(&mut self, requester_id: u64, numreplicas: i64, timeout_ms: i64) {
        let numreplicas = numreplicas.max(0) as usize;
        let timeout = Duration::from_millis(timeout_ms.max(0) as u64);

        let replica_ids: Vec<u64> = self.repl.replicas.iter().map(|r| r.conn_id).collect();
        let getack = serialize_command(&[b"REPLCONF", b"GETACK", b"*"]);
        for id in &replica_ids {
            if let Some(conn) = self.connections.get_mut(id) {
                let _ = conn.send_raw(&getack);
            }
        }

        let deadline = Instant::now() + timeout;
        let mut acked: HashSet<u64> = HashSet::new();
        let mut dead: HashSet<u64> = HashSet::new();

        loop {
            for id in &replica_ids {
                if acked.contains(id) || dead.contains(id) {
                    continue;
                }
                match self.connections.get_mut(id) {
                    Some(conn) => match conn.read_available() {
                        Ok(Some(bytes)) if !bytes.is_empty() => {
                            acked.insert(*id);
                        }
                        Ok(_) => {}
                        Err(_) => {
                            dead.insert(*id);
                        }
                    },
                    None => {
                        dead.insert(*id);
                    }
                }
            }

            if acked.len() >= numreplicas || Instant::now() >= deadline {
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }

        self.send(requester_id, &ReplyFrame::Integer(acked.len() as i64));
    }

    fn send(&mut self, id: u64, frame: &ReplyFrame) {
        if let Some(conn) = self.connections.get_mut(&id) {
            let _ = conn.send_frame(frame);
        }
    }

    fn close_connection(&mut self, id: u64) {
        if let Some(mut conn) = self.connections.remove(&id) {
            let _ = conn.close();
        }
        self.repl.remove_replica(id);
        if self.master_link_id == Some(id) {
            tracing::warn!("master link dropped; continuing as an orphaned replica");
            self.master_link_id = None;
        }
    }
}

/// Binds/listens, optionally hydrates from a snapshot, optionally performs
/// the replica handshake, then hands off to the event loop. Failures here
/// are fatal to the process; nothing past this point ever is.
pub struct ServerBootstrap;

impl ServerBootstrap {
    pub fn run(config: Config) -> Result<()> {
        let store = Self::hydrate_store(&config);

        let network_config = NetworkConfig {
            bind_addr: config.bind.clone(),
            port: config.port,
        };
        let listener = Listener::bind(&network_config)?;

        let settings = ServerSettings {
            dir: config.dir.clone(),
            dbfilename: config.dbfilename.clone(),
        };

        let mut event_loop = EventLoop {
            listener,
            connections: HashMap::new(),
            store,
            repl: ReplicationState::new_master(),
            settings,
            master_link_id: None,
        };

        if let Some((host, port)) = config.replicaof.clone() {
            Self::become_replica(&mut event_loop, host, port, config.port)?;
        }

        event_loop.run()
    }

    fn hydrate_store(config: &Config) -> Store {
        let (dir, filename) = match (&config.dir, &config.dbfilename) {
            (dir, Some(filename)) => (dir.clone(), filename.clone()),
            _ => return Store::new(),
        };

        let path = dir.map(PathBuf::from).unwrap_or_default().join(filename);
        match load_snapshot(&path) {
            Ok(store) => {
                tracing::info!(keys = store.len(), path = %path.display(), "snapshot loaded");
                store
            }
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "snapshot load failed, starting empty");
                Store::new()
            }
        }
    }

    fn become_replica(
        event_loop: &mut EventLoop,
        host: String,
        port: u16,
        listening_port: u16,
    ) -> Result<()> {
        let resolved = replication::resolve_master_host(&host);
        let addr = format!("{}:{}", resolved, port);

        let mut stream = TcpStream::connect(&addr).map_err(|e| {
            ServerError::Connection(format!("failed to connect to master {}: {}", addr, e))
        })?;

        let outcome = replication::perform_handshake(&mut stream, listening_port)?;

        let mut repl = ReplicationState::new_replica(host, port);
        repl.master_replid = outcome.master_replid;
        repl.master_repl_offset = outcome.master_initial_offset;
        event_loop.repl = repl;

        let id = CONN_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        let peer_addr = stream.peer_addr()?;
        let conn = Connection::new(id, stream, peer_addr)?;
        event_loop.connections.insert(id, conn);
        event_loop.master_link_id = Some(id);

        tracing::info!(master = %addr, "replica handshake complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::dispatcher::ServerSettings;
    use std::io::Read;
    use std::net::{TcpListener, TcpStream};

    /// Builds a connected loopback pair and wraps the server-side end in a
    /// `Connection`, returning it alongside the client-side `TcpStream` the
    /// test drives directly.
    fn connected_pair(id: u64) -> (Connection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server_stream, peer_addr) = listener.accept().unwrap();
        (
            Connection::new(id, server_stream, peer_addr).unwrap(),
            client,
        )
    }

    fn test_event_loop() -> EventLoop {
        let listener = Listener::bind(&NetworkConfig {
            bind_addr: "127.0.0.1".to_string(),
            port: 0,
        })
        .unwrap();
        EventLoop {
            listener,
            connections: HashMap::new(),
            store: Store::new(),
            repl: ReplicationState::new_master(),
            settings: ServerSettings::default(),
            master_link_id: None,
        }
    }

    #[test]
    fn test_propagate_writes_to_replica_and_advances_offset() {
        let mut event_loop = test_event_loop();
        let (conn, mut client) = connected_pair(1);
        event_loop.connections.insert(1, conn);
        event_loop.repl.register_replica(1);

        let raw = b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n";
        event_loop.propagate(raw);

        assert_eq!(event_loop.repl.master_repl_offset, raw.len() as u64);

        let mut buf = vec![0u8; raw.len()];
        client.read_exact(&mut buf).unwrap();
        assert_eq!(buf, raw);
    }

    #[test]
    fn test_psync_promotes_connection_to_replica() {
        let mut event_loop = test_event_loop();
        let (conn, mut client) = connected_pair(1);
        event_loop.connections.insert(1, conn);

        let message: crate::protocol::DecodedMessage = vec![
            crate::protocol::bytes_from(b"PSYNC".to_vec()),
            crate::protocol::bytes_from(b"?".to_vec()),
            crate::protocol::bytes_from(b"-1".to_vec()),
        ];
        event_loop.apply_command(
            1,
            &message,
            b"*3\r\n$5\r\nPSYNC\r\n$1\r\n?\r\n$2\r\n-1\r\n",
            false,
        );

        assert_eq!(event_loop.repl.replica_count(), 1);

        let mut buf = [0u8; 512];
        let n = client.read(&mut buf).unwrap();
        let reply = String::from_utf8_lossy(&buf[..n]);
        assert!(reply.starts_with("+FULLRESYNC"));
    }

    #[test]
    fn test_close_connection_removes_replica_registration() {
        let mut event_loop = test_event_loop();
        let (conn, _client) = connected_pair(1);
        event_loop.connections.insert(1, conn);
        event_loop.repl.register_replica(1);

        event_loop.close_connection(1);

        assert_eq!(event_loop.repl.replica_count(), 0);
        assert!(!event_loop.connections.contains_key(&1));
    }
}
