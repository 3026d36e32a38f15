//! Worker-side view of the coordinator.

use anyhow::{bail, Result};
use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;

use super::protocol::{read_message, write_message, Reply, ReplyBody, Request};
use super::{Coordinator, Pop};
use crate::storage::intermediate::IntermediateStorage;

pub trait WorkerLink {
    fn worker_id(&self) -> usize;

    /// Claims the next command. A claimed file counts as in flight for
    /// this worker until it is finished.
    fn poll_command(&mut self) -> Result<Pop>;

    fn finish_file(&mut self, path: &Path) -> Result<()>;

    /// Hands a completed result to the orchestrator.
    fn push_result(&mut self, storage: IntermediateStorage) -> Result<()>;

    fn is_interrupted(&mut self) -> Result<bool>;

    fn finish(&mut self) -> Result<()>;
}

/// Link for worker threads living in the orchestrator's process.
pub struct LocalLink {
    coordinator: Arc<Coordinator>,
    worker_id: usize,
}

impl LocalLink {
    pub fn new(coordinator: Arc<Coordinator>, worker_id: usize) -> Self {
        Self {
            coordinator,
            worker_id,
        }
    }
}

impl WorkerLink for LocalLink {
    fn worker_id(&self) -> usize {
        self.worker_id
    }

    fn poll_command(&mut self) -> Result<Pop> {
        Ok(self.coordinator.dispatch(self.worker_id))
    }

    fn finish_file(&mut self, path: &Path) -> Result<()> {
        self.coordinator.status().finish_file(self.worker_id, path);
        Ok(())
    }

    fn push_result(&mut self, storage: IntermediateStorage) -> Result<()> {
        self.coordinator.results_for(self.worker_id).push(storage);
        Ok(())
    }

    fn is_interrupted(&mut self) -> Result<bool> {
        Ok(self.coordinator.status().is_interrupted())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Link for worker processes, talking to the supervisor over a pipe pair.
pub struct PipeLink<R, W> {
    reader: R,
    writer: W,
    worker_id: usize,
    interrupted: bool,
}

impl<R: BufRead, W: Write> PipeLink<R, W> {
    /// Opens the link and announces the worker. Fails when the supervisor
    /// does not know the run.
    pub fn connect(reader: R, writer: W, worker_id: usize, run_id: &str) -> Result<Self> {
        let mut link = Self {
            reader,
            writer,
            worker_id,
            interrupted: false,
        };
        match link.exchange(Request::Hello {
            worker_id,
            run_id: run_id.to_string(),
        })? {
            ReplyBody::Ack => Ok(link),
            ReplyBody::Rejected { reason } => bail!("supervisor rejected worker: {reason}"),
            other => bail!("unexpected handshake reply: {other:?}"),
        }
    }

    fn exchange(&mut self, request: Request) -> Result<ReplyBody> {
        write_message(&mut self.writer, &request)?;
        let Some(reply) = read_message::<_, Reply>(&mut self.reader)? else {
            bail!("supervisor closed the channel");
        };
        self.interrupted = reply.interrupted;
        Ok(reply.body)
    }

    fn expect_ack(&mut self, request: Request) -> Result<()> {
        match self.exchange(request)? {
            ReplyBody::Ack => Ok(()),
            other => bail!("unexpected reply: {other:?}"),
        }
    }
}

impl<R: BufRead, W: Write> WorkerLink for PipeLink<R, W> {
    fn worker_id(&self) -> usize {
        self.worker_id
    }

    fn poll_command(&mut self) -> Result<Pop> {
        match self.exchange(Request::Poll)? {
            ReplyBody::Command { command } => Ok(Pop::Command(command)),
            ReplyBody::Wait => Ok(Pop::Wait),
            ReplyBody::Drained => Ok(Pop::Drained),
            other => bail!("unexpected poll reply: {other:?}"),
        }
    }

    fn finish_file(&mut self, path: &Path) -> Result<()> {
        self.expect_ack(Request::Finish {
            path: path.to_path_buf(),
        })
    }

    fn push_result(&mut self, storage: IntermediateStorage) -> Result<()> {
        self.expect_ack(Request::Result {
            storage: Box::new(storage),
        })
    }

    /// Reflects the flag carried by the most recent reply.
    fn is_interrupted(&mut self) -> Result<bool> {
        Ok(self.interrupted)
    }

    fn finish(&mut self) -> Result<()> {
        self.expect_ack(Request::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::command::IndexerCommand;
    use crate::ipc::protocol::serve_request;
    use std::io::{BufReader, Cursor};

    #[test]
    fn local_link_reports_progress_to_coordinator() {
        let coordinator = Coordinator::new("run", 4);
        coordinator.status().register(1);
        coordinator.queue().push(IndexerCommand::new("a.rs", "/")).unwrap();
        let mut link = LocalLink::new(coordinator.clone(), 1);

        let Pop::Command(cmd) = link.poll_command().unwrap() else {
            panic!("expected a command");
        };
        assert_eq!(coordinator.status().current_files().len(), 1);
        link.push_result(IntermediateStorage::new()).unwrap();
        link.finish_file(&cmd.source_file_path).unwrap();
        assert_eq!(coordinator.pending_results(), 1);
        assert_eq!(coordinator.status().finished_file_count(), 1);
        assert!(!link.is_interrupted().unwrap());
    }

    /// Replays the replies a supervisor would give to a scripted request list.
    fn scripted_replies(coordinator: &Coordinator, requests: Vec<Request>) -> Vec<u8> {
        let mut out = Vec::new();
        for request in requests {
            write_message(&mut out, &serve_request(coordinator, 1, request)).unwrap();
        }
        out
    }

    #[test]
    fn pipe_link_speaks_the_protocol() {
        let coordinator = Coordinator::new("run-7", 4);
        coordinator.status().register(1);
        coordinator.queue().push(IndexerCommand::new("a.rs", "/")).unwrap();
        coordinator.queue().set_stopped();

        let replies = scripted_replies(
            &coordinator,
            vec![
                Request::Hello {
                    worker_id: 1,
                    run_id: "run-7".into(),
                },
                Request::Poll,
                Request::Poll,
            ],
        );
        let mut sent = Vec::new();
        let mut link =
            PipeLink::connect(BufReader::new(Cursor::new(replies)), &mut sent, 1, "run-7").unwrap();
        assert!(matches!(link.poll_command().unwrap(), Pop::Command(_)));
        assert_eq!(link.poll_command().unwrap(), Pop::Drained);
        assert!(link.poll_command().is_err());
        drop(link);

        let text = String::from_utf8(sent).unwrap();
        assert!(text.lines().next().unwrap().contains(r#""op":"hello""#));
    }

    #[test]
    fn pipe_link_fails_for_unknown_run() {
        let coordinator = Coordinator::new("run-7", 4);
        coordinator.status().register(1);
        let replies = scripted_replies(
            &coordinator,
            vec![Request::Hello {
                worker_id: 1,
                run_id: "other".into(),
            }],
        );
        let result = PipeLink::connect(
            BufReader::new(Cursor::new(replies)),
            Vec::new(),
            1,
            "other",
        );
        assert!(result.is_err());
    }
}
