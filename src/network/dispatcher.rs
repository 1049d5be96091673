//! Command dispatch: maps a decoded request to its handler.
//!
//! A handler only ever touches `Store` and `ReplicationState` directly. It
//! never writes to a socket itself: anything that requires live socket
//! I/O beyond the reply to the originating connection (propagation to
//! replicas, the snapshot transfer, `WAIT`'s nested poll) is expressed as a
//! `DispatchResult` variant and carried out by the event loop instead.

use crate::error::{CommandError, Result};
use crate::protocol::{DecodedMessage, ReplyFrame};
use crate::replication::ReplicationState;
use crate::storage::{Lookup, Store, StorageValue};
use std::time::{Duration, Instant};

/// The hardcoded empty snapshot blob sent during a full resync. Its byte
/// content is an opaque implementation detail (§1 of the spec this engine
/// implements treats it that way); an empty payload is the simplest value
/// that satisfies "a snapshot was sent".
const EMPTY_SNAPSHOT: &[u8] = b"";

/// Static settings a handful of commands answer questions about
/// (`CONFIG GET`). Set once at bootstrap, never mutated afterward.
#[derive(Debug, Clone, Default)]
pub struct ServerSettings {
    pub dir: Option<String>,
    pub dbfilename: Option<String>,
}

/// What the event loop must do after a command has been dispatched.
pub enum DispatchResult {
    /// Send this reply back to the originating socket only.
    Reply(ReplyFrame),
    /// No reply at all: a propagated `PING`/`SET` applied from the master
    /// link.
    Suppressed,
    /// Send this reply to the client, then propagate the raw command
    /// bytes that produced it to every attached replica. Master role only.
    ReplyAndPropagate(ReplyFrame),
    /// `PSYNC`: send `reply` (the `+FULLRESYNC ...` line) immediately
    /// followed by `snapshot` as a raw, unterminated frame, then promote
    /// this connection to a replica connection.
    BeginFullResync { reply: ReplyFrame, snapshot: Vec<u8> },
    /// `WAIT`: the event loop must run its own nested readiness poll over
    /// replica sockets. This can't be a plain reply, since it depends on live
    /// I/O the dispatcher has no access to.
    Wait { numreplicas: i64, timeout_ms: i64 },
}

/// Dispatches one decoded command. `is_master_link` is true only when this
/// command arrived on the replica's connection to its master; it silences
/// replies for `PING`/`SET` and lets `SET` bypass the read-only check.
pub fn dispatch(
    message: &DecodedMessage,
    store: &mut Store,
    repl: &mut ReplicationState,
    settings: &ServerSettings,
    is_master_link: bool,
) -> Result<DispatchResult> {
    if message.is_empty() {
        return Ok(DispatchResult::Reply(ReplyFrame::null_bulk()));
    }

    let cmd = String::from_utf8_lossy(&message[0]).to_ascii_uppercase();

    match cmd.as_str() {
        "PING" => {
            if is_master_link {
                Ok(DispatchResult::Suppressed)
            } else {
                Ok(DispatchResult::Reply(ReplyFrame::simple_string("PONG")))
            }
        }

        "ECHO" => {
            if message.len() < 2 {
                return Err(CommandError::WrongNumberOfArgs("echo".into()).into());
            }
            let mut out = Vec::new();
            for arg in &message[1..] {
                out.extend_from_slice(arg);
            }
            Ok(DispatchResult::Reply(ReplyFrame::bulk_string(out)))
        }

        "SET" => {
            if message.len() < 3 {
                return Err(CommandError::WrongNumberOfArgs("set".into()).into());
            }
            if !is_master_link && repl.is_replica() {
                return Ok(DispatchResult::Reply(ReplyFrame::error(
                    CommandError::ReadOnlyReplica.to_string(),
                )));
            }

            let key = message[1].to_vec();
            let value = message[2].to_vec();
            let expires_at = if message.len() > 3 {
                let ms = parse_i64(&message[message.len() - 1])?;
                let ms: u64 = ms
                    .try_into()
                    .map_err(|_| CommandError::Generic("negative expiry".into()))?;
                Some(Instant::now() + Duration::from_millis(ms))
            } else {
                None
            };
            store.set_string(key, value, expires_at);

            if is_master_link {
                Ok(DispatchResult::Suppressed)
            } else {
                Ok(DispatchResult::ReplyAndPropagate(ReplyFrame::ok()))
            }
        }

        "GET" => {
            if message.len() != 2 {
                return Err(CommandError::WrongNumberOfArgs("get".into()).into());
            }
            let frame = match store.get(&message[1]) {
                Lookup::Found(StorageValue::String(v)) => ReplyFrame::bulk_string(v.clone()),
                Lookup::Found(StorageValue::Stream(pairs)) => {
                    // GET on a stream has no canonical wire form in this
                    // core (see DESIGN.md); an array of field/value pairs
                    // is the most inspectable reply that still satisfies
                    // "TYPE reports the key as kind stream".
                    let entries = pairs
                        .iter()
                        .map(|(f, v)| {
                            ReplyFrame::array(vec![
                                ReplyFrame::bulk_string(f.clone()),
                                ReplyFrame::bulk_string(v.clone()),
                            ])
                        })
                        .collect();
                    ReplyFrame::array(entries)
                }
                Lookup::NotFound => ReplyFrame::null_bulk(),
            };
            Ok(DispatchResult::Reply(frame))
        }

        "INFO" => {
            let role = if repl.is_master() { "master" } else { "slave" };
            let body = format!(
                "role:{}\nmaster_replid:{}\nmaster_repl_offset:{}\n",
                role, repl.master_replid, repl.master_repl_offset
            );
            Ok(DispatchResult::Reply(ReplyFrame::bulk_string(body)))
        }

        "REPLCONF" => {
            if repl.is_master() {
                Ok(DispatchResult::Reply(ReplyFrame::ok()))
            } else {
                Ok(DispatchResult::Reply(ReplyFrame::array(vec![
                    ReplyFrame::bulk_string("REPLCONF"),
                    ReplyFrame::bulk_string("ACK"),
                    ReplyFrame::bulk_string(repl.master_repl_offset.to_string()),
                ])))
            }
        }

        "PSYNC" => {
            let reply = ReplyFrame::simple_string(format!(
                "FULLRESYNC {} {}",
                repl.master_replid, repl.master_repl_offset
            ));
            Ok(DispatchResult::BeginFullResync {
                reply,
                snapshot: EMPTY_SNAPSHOT.to_vec(),
            })
        }

        "WAIT" => {
            if message.len() != 3 {
                return Err(CommandError::WrongNumberOfArgs("wait".into()).into());
            }
            let numreplicas = parse_i64(&message[1])?;
            let timeout_ms = parse_i64(&message[2])?;

            if repl.master_repl_offset == 0 {
                Ok(DispatchResult::Reply(ReplyFrame::Integer(
                    repl.replica_count() as i64,
                )))
            } else {
                Ok(DispatchResult::Wait {
                    numreplicas,
                    timeout_ms,
                })
            }
        }

        "CONFIG" => {
            if message.len() < 2 {
                return Err(CommandError::WrongNumberOfArgs("config".into()).into());
            }
            let sub = String::from_utf8_lossy(&message[1]).to_ascii_uppercase();
            if sub != "GET" {
                return Err(
                    CommandError::Generic(format!("unsupported CONFIG subcommand '{}'", sub))
                        .into(),
                );
            }

            let mut out = Vec::new();
            for param in &message[2..] {
                let name = String::from_utf8_lossy(param).to_ascii_lowercase();
                let value = match name.as_str() {
                    "dir" => Some(settings.dir.clone().unwrap_or_default()),
                    "dbfilename" => Some(settings.dbfilename.clone().unwrap_or_default()),
                    _ => None,
                };
                if let Some(value) = value {
                    out.push(ReplyFrame::bulk_string(name));
                    out.push(ReplyFrame::bulk_string(value));
                }
            }
            Ok(DispatchResult::Reply(ReplyFrame::array(out)))
        }

        "KEYS" => {
            if message.len() != 2 {
                return Err(CommandError::WrongNumberOfArgs("keys".into()).into());
            }
            let keys = store.keys_matching(&message[1]);
            let frames = keys.into_iter().map(ReplyFrame::bulk_string).collect();
            Ok(DispatchResult::Reply(ReplyFrame::array(frames)))
        }

        "TYPE" => {
            if message.len() != 2 {
                return Err(CommandError::WrongNumberOfArgs("type".into()).into());
            }
            Ok(DispatchResult::Reply(ReplyFrame::simple_string(
                store.type_of(&message[1]),
            )))
        }

        "XADD" => {
            if message.len() < 5 || (message.len() - 3) % 2 != 0 {
                return Err(CommandError::WrongNumberOfArgs("xadd".into()).into());
            }
            let key = &message[1];
            let id = message[2].to_vec();
            for chunk in message[3..].chunks(2) {
                store.xadd(key, chunk[0].to_vec(), chunk[1].to_vec())?;
            }
            Ok(DispatchResult::Reply(ReplyFrame::bulk_string(id)))
        }

        _ => Ok(DispatchResult::Reply(ReplyFrame::null_bulk())),
    }
}

fn parse_i64(bytes: &[u8]) -> std::result::Result<i64, CommandError> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or(CommandError::NotInteger)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::bytes_from;
    use crate::replication::ReplicationState;

    fn msg(parts: &[&str]) -> DecodedMessage {
        parts.iter().map(|p| bytes_from(p.as_bytes().to_vec())).collect()
    }

    #[test]
    fn test_ping_from_client() {
        let mut store = Store::new();
        let mut repl = ReplicationState::new_master();
        let settings = ServerSettings::default();
        let result = dispatch(&msg(&["PING"]), &mut store, &mut repl, &settings, false).unwrap();
        assert!(matches!(result, DispatchResult::Reply(ReplyFrame::SimpleString(_))));
    }

    #[test]
    fn test_ping_from_master_link_is_suppressed() {
        let mut store = Store::new();
        let mut repl = ReplicationState::new_replica("h".into(), 1);
        let settings = ServerSettings::default();
        let result = dispatch(&msg(&["PING"]), &mut store, &mut repl, &settings, true).unwrap();
        assert!(matches!(result, DispatchResult::Suppressed));
    }

    #[test]
    fn test_echo_concatenates_without_separator() {
        let mut store = Store::new();
        let mut repl = ReplicationState::new_master();
        let settings = ServerSettings::default();
        let result = dispatch(&msg(&["ECHO", "foo", "bar"]), &mut store, &mut repl, &settings, false).unwrap();
        match result {
            DispatchResult::Reply(ReplyFrame::BulkString(Some(b))) => {
                assert_eq!(b.as_slice(), b"foobar");
            }
            _ => panic!("expected bulk string reply"),
        }
    }

    #[test]
    fn test_set_then_get_on_master() {
        let mut store = Store::new();
        let mut repl = ReplicationState::new_master();
        let settings = ServerSettings::default();

        let result = dispatch(&msg(&["SET", "foo", "bar"]), &mut store, &mut repl, &settings, false).unwrap();
        assert!(matches!(result, DispatchResult::ReplyAndPropagate(ReplyFrame::SimpleString(_))));

        let result = dispatch(&msg(&["GET", "foo"]), &mut store, &mut repl, &settings, false).unwrap();
        match result {
            DispatchResult::Reply(ReplyFrame::BulkString(Some(b))) => assert_eq!(b.as_slice(), b"bar"),
            _ => panic!("expected bulk string"),
        }
    }

    #[test]
    fn test_get_missing_key_is_null_bulk() {
        let mut store = Store::new();
        let mut repl = ReplicationState::new_master();
        let settings = ServerSettings::default();
        let result = dispatch(&msg(&["GET", "missing"]), &mut store, &mut repl, &settings, false).unwrap();
        assert!(matches!(result, DispatchResult::Reply(ReplyFrame::BulkString(None))));
    }

    #[test]
    fn test_set_rejected_on_replica_from_ordinary_client() {
        let mut store = Store::new();
        let mut repl = ReplicationState::new_replica("h".into(), 1);
        let settings = ServerSettings::default();
        let result = dispatch(&msg(&["SET", "foo", "bar"]), &mut store, &mut repl, &settings, false).unwrap();
        assert!(matches!(result, DispatchResult::Reply(ReplyFrame::Error(_))));
    }

    #[test]
    fn test_set_applied_silently_from_master_link() {
        let mut store = Store::new();
        let mut repl = ReplicationState::new_replica("h".into(), 1);
        let settings = ServerSettings::default();
        let result = dispatch(&msg(&["SET", "foo", "bar"]), &mut store, &mut repl, &settings, true).unwrap();
        assert!(matches!(result, DispatchResult::Suppressed));

        match store.get(b"foo") {
            Lookup::Found(StorageValue::String(v)) => assert_eq!(v, b"bar"),
            _ => panic!("expected value to be applied"),
        }
    }

    #[test]
    fn test_info_contains_role_and_offset() {
        let mut store = Store::new();
        let mut repl = ReplicationState::new_master();
        let settings = ServerSettings::default();
        let result = dispatch(&msg(&["INFO"]), &mut store, &mut repl, &settings, false).unwrap();
        match result {
            DispatchResult::Reply(ReplyFrame::BulkString(Some(body))) => {
                let text = String::from_utf8(body.to_vec()).unwrap();
                assert!(text.contains("role:master\n"));
                assert!(text.contains("master_repl_offset:0\n"));
                assert!(text.contains(&repl.master_replid));
            }
            _ => panic!("expected bulk string"),
        }
    }

    #[test]
    fn test_replconf_on_master_replies_ok() {
        let mut store = Store::new();
        let mut repl = ReplicationState::new_master();
        let settings = ServerSettings::default();
        let result = dispatch(&msg(&["REPLCONF", "listening-port", "6380"]), &mut store, &mut repl, &settings, false).unwrap();
        assert!(matches!(result, DispatchResult::Reply(ReplyFrame::SimpleString(_))));
    }

    #[test]
    fn test_replconf_on_replica_replies_ack() {
        let mut store = Store::new();
        let mut repl = ReplicationState::new_replica("h".into(), 1);
        let settings = ServerSettings::default();
        let result = dispatch(&msg(&["REPLCONF", "GETACK", "*"]), &mut store, &mut repl, &settings, true).unwrap();
        match result {
            DispatchResult::Reply(ReplyFrame::Array(Some(frames))) => {
                assert_eq!(frames.len(), 3);
            }
            _ => panic!("expected array reply"),
        }
    }

    #[test]
    fn test_psync_begins_full_resync() {
        let mut store = Store::new();
        let mut repl = ReplicationState::new_master();
        let settings = ServerSettings::default();
        let result = dispatch(&msg(&["PSYNC", "?", "-1"]), &mut store, &mut repl, &settings, false).unwrap();
        assert!(matches!(result, DispatchResult::BeginFullResync { .. }));
    }

    #[test]
    fn test_wait_with_no_writes_replies_immediately() {
        let mut store = Store::new();
        let mut repl = ReplicationState::new_master();
        repl.register_replica(1);
        repl.register_replica(2);
        let settings = ServerSettings::default();
        let result = dispatch(&msg(&["WAIT", "2", "100"]), &mut store, &mut repl, &settings, false).unwrap();
        match result {
            DispatchResult::Reply(ReplyFrame::Integer(n)) => assert_eq!(n, 2),
            _ => panic!("expected immediate integer reply"),
        }
    }

    #[test]
    fn test_wait_after_writes_defers_to_event_loop() {
        let mut store = Store::new();
        let mut repl = ReplicationState::new_master();
        repl.record_propagated(10);
        let settings = ServerSettings::default();
        let result = dispatch(&msg(&["WAIT", "1", "100"]), &mut store, &mut repl, &settings, false).unwrap();
        assert!(matches!(result, DispatchResult::Wait { numreplicas: 1, timeout_ms: 100 }));
    }

    #[test]
    fn test_config_get_recognized_params() {
        let mut store = Store::new();
        let mut repl = ReplicationState::new_master();
        let settings = ServerSettings {
            dir: Some("/data".to_string()),
            dbfilename: Some("dump.rdb".to_string()),
        };
        let result = dispatch(&msg(&["CONFIG", "GET", "dir", "dbfilename", "maxmemory"]), &mut store, &mut repl, &settings, false).unwrap();
        match result {
            DispatchResult::Reply(ReplyFrame::Array(Some(frames))) => {
                assert_eq!(frames.len(), 4);
            }
            _ => panic!("expected array reply"),
        }
    }

    #[test]
    fn test_keys_prefix_pattern() {
        let mut store = Store::new();
        store.set_string(b"foo".to_vec(), b"1".to_vec(), None);
        store.set_string(b"foobar".to_vec(), b"2".to_vec(), None);
        store.set_string(b"bar".to_vec(), b"3".to_vec(), None);
        let mut repl = ReplicationState::new_master();
        let settings = ServerSettings::default();
        let result = dispatch(&msg(&["KEYS", "foo*"]), &mut store, &mut repl, &settings, false).unwrap();
        match result {
            DispatchResult::Reply(ReplyFrame::Array(Some(frames))) => assert_eq!(frames.len(), 2),
            _ => panic!("expected array reply"),
        }
    }

    #[test]
    fn test_type_reports_kind() {
        let mut store = Store::new();
        store.set_string(b"s".to_vec(), b"v".to_vec(), None);
        let mut repl = ReplicationState::new_master();
        let settings = ServerSettings::default();
        let result = dispatch(&msg(&["TYPE", "s"]), &mut store, &mut repl, &settings, false).unwrap();
        match result {
            DispatchResult::Reply(ReplyFrame::SimpleString(name)) => assert_eq!(name.as_slice(), b"string"),
            _ => panic!("expected simple string"),
        }
    }

    #[test]
    fn test_xadd_then_type_reports_stream() {
        let mut store = Store::new();
        let mut repl = ReplicationState::new_master();
        let settings = ServerSettings::default();
        let result = dispatch(&msg(&["XADD", "s", "1-1", "field", "value"]), &mut store, &mut repl, &settings, false).unwrap();
        match result {
            DispatchResult::Reply(ReplyFrame::BulkString(Some(id))) => assert_eq!(id.as_slice(), b"1-1"),
            _ => panic!("expected bulk string id"),
        }
        assert_eq!(store.type_of(b"s"), "stream");
    }

    #[test]
    fn test_xadd_against_string_key_is_wrongtype_error() {
        let mut store = Store::new();
        store.set_string(b"k".to_vec(), b"v".to_vec(), None);
        let mut repl = ReplicationState::new_master();
        let settings = ServerSettings::default();
        let err = dispatch(&msg(&["XADD", "k", "1-1", "field", "value"]), &mut store, &mut repl, &settings, false)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "WRONGTYPE Operation against a key holding the wrong kind of value"
        );
    }

    #[test]
    fn test_unknown_command_is_null_bulk() {
        let mut store = Store::new();
        let mut repl = ReplicationState::new_master();
        let settings = ServerSettings::default();
        let result = dispatch(&msg(&["FROBNICATE"]), &mut store, &mut repl, &settings, false).unwrap();
        assert!(matches!(result, DispatchResult::Reply(ReplyFrame::BulkString(None))));
    }
}
