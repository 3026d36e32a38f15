//! Line-delimited JSON messages between a worker process and its supervisor.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use std::path::PathBuf;

use super::command_queue::Pop;
use super::Coordinator;
use crate::indexer::command::IndexerCommand;
use crate::storage::intermediate::IntermediateStorage;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Hello { worker_id: usize, run_id: String },
    Poll,
    Finish { path: PathBuf },
    Result { storage: Box<IntermediateStorage> },
    Done,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplyBody {
    Ack,
    Command { command: IndexerCommand },
    Wait,
    Drained,
    Rejected { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub interrupted: bool,
    pub body: ReplyBody,
}

pub fn write_message<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<()> {
    serde_json::to_writer(&mut *writer, message).context("Failed to encode message")?;
    writer.write_all(b"\n").context("Failed to write message")?;
    writer.flush().context("Failed to flush message")?;
    Ok(())
}

/// Reads the next message. `Ok(None)` on end of stream.
pub fn read_message<R: BufRead, T: DeserializeOwned>(reader: &mut R) -> Result<Option<T>> {
    let mut line = String::new();
    loop {
        line.clear();
        let n = reader.read_line(&mut line).context("Failed to read message")?;
        if n == 0 {
            return Ok(None);
        }
        if !line.trim().is_empty() {
            break;
        }
    }
    let message = serde_json::from_str(line.trim_end()).context("Failed to decode message")?;
    Ok(Some(message))
}

/// Answers one worker request against the coordinator.
pub fn serve_request(coordinator: &Coordinator, worker_id: usize, request: Request) -> Reply {
    let body = match request {
        Request::Hello {
            worker_id: claimed,
            run_id,
        } => {
            if run_id != coordinator.run_id() {
                ReplyBody::Rejected {
                    reason: format!("unknown run {run_id}"),
                }
            } else if claimed != worker_id {
                ReplyBody::Rejected {
                    reason: format!("worker id {claimed} does not match slot {worker_id}"),
                }
            } else {
                ReplyBody::Ack
            }
        }
        Request::Poll => match coordinator.dispatch(worker_id) {
            Pop::Command(command) => ReplyBody::Command { command },
            Pop::Wait => ReplyBody::Wait,
            Pop::Drained => ReplyBody::Drained,
        },
        Request::Finish { path } => {
            coordinator.status().finish_file(worker_id, &path);
            ReplyBody::Ack
        }
        Request::Result { storage } => {
            coordinator.results_for(worker_id).push(*storage);
            ReplyBody::Ack
        }
        Request::Done => ReplyBody::Ack,
    };
    Reply {
        interrupted: coordinator.status().is_interrupted(),
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn messages_are_one_json_object_per_line() {
        let mut buf = Vec::new();
        write_message(&mut buf, &Request::Poll).unwrap();
        write_message(
            &mut buf,
            &Request::Finish {
                path: PathBuf::from("src/a.rs"),
            },
        )
        .unwrap();
        let text = String::from_utf8(buf.clone()).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.starts_with(r#"{"op":"poll"}"#));

        let mut reader = Cursor::new(buf);
        let first: Request = read_message(&mut reader).unwrap().unwrap();
        assert!(matches!(first, Request::Poll));
        let _: Request = read_message(&mut reader).unwrap().unwrap();
        assert!(read_message::<_, Request>(&mut reader).unwrap().is_none());
    }

    #[test]
    fn hello_with_foreign_run_is_rejected() {
        let coordinator = Coordinator::new("run-a", 4);
        coordinator.status().register(1);
        let reply = serve_request(
            &coordinator,
            1,
            Request::Hello {
                worker_id: 1,
                run_id: "run-b".into(),
            },
        );
        assert!(matches!(reply.body, ReplyBody::Rejected { .. }));

        let reply = serve_request(
            &coordinator,
            1,
            Request::Hello {
                worker_id: 1,
                run_id: "run-a".into(),
            },
        );
        assert_eq!(reply.body, ReplyBody::Ack);
    }

    #[test]
    fn replies_carry_interrupt_flag() {
        let coordinator = Coordinator::new("run", 4);
        coordinator.status().register(1);
        coordinator.queue().push(IndexerCommand::new("a.rs", "/")).unwrap();
        let reply = serve_request(&coordinator, 1, Request::Poll);
        assert!(!reply.interrupted);
        assert!(matches!(reply.body, ReplyBody::Command { .. }));
        assert_eq!(coordinator.status().current_files().len(), 1);

        coordinator.status().set_interrupted(true);
        let reply = serve_request(&coordinator, 1, Request::Poll);
        assert!(reply.interrupted);
        assert_eq!(reply.body, ReplyBody::Wait);
    }
}
