//! Line-oriented validation session.
//!
//! The session owns its queue outright and processes one command at a time,
//! so each store call finishes before the next action is read.

use crate::error::QueueError;
use crate::explore::{format_money, format_thousands};
use crate::models::{PropertyRecord, RecordFilter};
use crate::queue::{LoadOutcome, ValidationQueue};
use crate::store::RecordStore;
use anyhow::Result;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::info;

const HELP: &str = "\
Commands:
  list                 show queued ids in work order
  show [id]            show record details
  select <id>          make <id> the current record
  validate [id]        mark as validated
  skip [id]            move to the back of the queue
  delete [id]          delete from the table (cannot be undone)
  progress             validated / loaded
  reload               refetch unvalidated records
  help                 this text
  quit                 end the session
Commands without an id act on the selected record, or the head of the queue.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    List,
    Show(Option<String>),
    Select(String),
    Validate(Option<String>),
    Skip(Option<String>),
    Delete(Option<String>),
    Progress,
    Reload,
    Help,
    Quit,
}

impl SessionCommand {
    /// Parse one input line; `Ok(None)` for a blank line
    pub fn parse(line: &str) -> std::result::Result<Option<Self>, String> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let arg = words.next().map(str::to_string);
        if words.next().is_some() {
            return Err(format!("too many arguments for '{}'", verb));
        }

        let no_arg = |cmd: SessionCommand| match &arg {
            Some(_) => Err(format!("'{}' takes no arguments", verb)),
            None => Ok(cmd),
        };

        let cmd = match verb.to_ascii_lowercase().as_str() {
            "list" | "ls" => no_arg(SessionCommand::List)?,
            "show" => SessionCommand::Show(arg),
            "select" => SessionCommand::Select(arg.ok_or("usage: select <id>")?),
            "validate" | "v" => SessionCommand::Validate(arg),
            "skip" | "s" => SessionCommand::Skip(arg),
            "delete" => SessionCommand::Delete(arg),
            "progress" => no_arg(SessionCommand::Progress)?,
            "reload" => no_arg(SessionCommand::Reload)?,
            "help" | "?" => no_arg(SessionCommand::Help)?,
            "quit" | "exit" | "q" => no_arg(SessionCommand::Quit)?,
            other => return Err(format!("unknown command '{}' (try 'help')", other)),
        };
        Ok(Some(cmd))
    }
}

/// What the session loop should do after a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Continue(String),
    Quit,
}

pub struct ValidationSession {
    store: Arc<dyn RecordStore>,
    queue: ValidationQueue,
    filter: RecordFilter,
    validator: String,
}

impl ValidationSession {
    pub fn new(
        store: Arc<dyn RecordStore>,
        queue: ValidationQueue,
        filter: RecordFilter,
        validator: &str,
    ) -> Self {
        Self {
            store,
            queue,
            filter,
            validator: validator.trim().to_string(),
        }
    }

    pub fn queue(&self) -> &ValidationQueue {
        &self.queue
    }

    /// Load the queue (reusing a fresh snapshot) and describe the result
    pub async fn start(&mut self) -> Result<String, QueueError> {
        let outcome = self.queue.load(self.store.as_ref(), self.filter).await?;
        Ok(match outcome {
            LoadOutcome::Cached => format!("Resuming session with {} queued records", self.queue.len()),
            LoadOutcome::Fetched(0) => "🎉 No properties left to validate!".to_string(),
            LoadOutcome::Fetched(n) => format!("Loaded {} properties to validate", n),
        })
    }

    pub async fn execute(&mut self, command: SessionCommand) -> Result<Step, QueueError> {
        let reply = match command {
            SessionCommand::List => self.render_list(),
            SessionCommand::Show(id) => {
                let id = self.target(id)?;
                match self.queue.record(&id) {
                    Some(record) => render_record(record),
                    None => format!("{} has no details in this session", id),
                }
            }
            SessionCommand::Select(id) => {
                self.queue.select(&id)?;
                format!("Selected {}", id)
            }
            SessionCommand::Validate(id) => {
                let id = self.target(id)?;
                self.queue
                    .validate(self.store.as_ref(), &id, &self.validator)
                    .await?;
                format!("✓ {} validated. {}", id, self.render_progress())
            }
            SessionCommand::Skip(id) => {
                let id = self.target(id)?;
                self.queue.skip(&id)?;
                format!("{} skipped", id)
            }
            SessionCommand::Delete(id) => {
                let id = self.target(id)?;
                self.queue.delete(self.store.as_ref(), &id).await?;
                format!("{} deleted. {}", id, self.render_progress())
            }
            SessionCommand::Progress => self.render_progress(),
            SessionCommand::Reload => {
                let outcome = self.queue.reload(self.store.as_ref(), self.filter).await?;
                match outcome {
                    LoadOutcome::Fetched(n) => format!("Reloaded {} properties", n),
                    LoadOutcome::Cached => "Queue unchanged".to_string(),
                }
            }
            SessionCommand::Help => HELP.to_string(),
            SessionCommand::Quit => return Ok(Step::Quit),
        };
        Ok(Step::Continue(reply))
    }

    /// Read commands until `quit` or end of input
    pub async fn run<R, W>(&mut self, input: R, out: &mut W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        match self.start().await {
            Ok(message) => writeln!(out, "{}", message)?,
            Err(err) => {
                writeln!(out, "❌ {}", err)?;
                return Err(err.into());
            }
        }

        let mut lines = input.lines();
        loop {
            write!(out, "{}> ", self.queue.current().unwrap_or("(empty)"))?;
            out.flush()?;

            let Some(line) = lines.next_line().await? else {
                writeln!(out)?;
                break;
            };
            let command = match SessionCommand::parse(&line) {
                Ok(Some(command)) => command,
                Ok(None) => continue,
                Err(message) => {
                    writeln!(out, "{}", message)?;
                    continue;
                }
            };

            match self.execute(command).await {
                Ok(Step::Continue(reply)) => writeln!(out, "{}", reply)?,
                Ok(Step::Quit) => break,
                Err(err) => writeln!(out, "{}", failure_message(&err))?,
            }
        }

        let progress = self.queue.progress();
        info!(
            "Session for {} ended at {}/{}",
            self.validator, progress.validated, progress.total
        );
        Ok(())
    }

    fn target(&self, id: Option<String>) -> Result<String, QueueError> {
        match id {
            Some(id) => Ok(id),
            None => self.queue.current().map(str::to_string).ok_or_else(|| {
                QueueError::PreconditionViolation("the validation queue is empty".to_string())
            }),
        }
    }

    fn render_list(&self) -> String {
        if self.queue.is_empty() {
            return "🎉 No properties left to validate!".to_string();
        }
        let selected = self.queue.selection();
        self.queue
            .ids()
            .enumerate()
            .map(|(i, id)| {
                let marker = if Some(id) == selected { "*" } else { " " };
                let summary = self
                    .queue
                    .record(id)
                    .map(|r| {
                        format!(
                            "{} {}",
                            r.property_type.as_deref().unwrap_or("-"),
                            r.price.map(format_money).unwrap_or_else(|| "-".to_string())
                        )
                    })
                    .unwrap_or_default();
                format!("{}{:>3}. {}  {}", marker, i + 1, id, summary)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn render_progress(&self) -> String {
        let p = self.queue.progress();
        format!(
            "{}/{} properties validated ({:.0}%)",
            p.validated,
            p.total,
            p.fraction() * 100.0
        )
    }
}

fn render_record(record: &PropertyRecord) -> String {
    fn opt<T: ToString>(v: &Option<T>) -> String {
        v.as_ref().map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
    }

    let mut lines = vec![
        format!("Property:      {}", record.property_id),
        format!("Type:          {}", opt(&record.property_type)),
        format!(
            "Price:         {}",
            record.price.map(format_money).unwrap_or_else(|| "-".to_string())
        ),
        format!(
            "Square feet:   {}",
            record
                .sqft
                .map(|s| format_thousands(s.round() as i64))
                .unwrap_or_else(|| "-".to_string())
        ),
        format!("Rooms:         {}", opt(&record.rooms)),
        format!("Bathrooms:     {}", opt(&record.bathroom)),
        format!("Community:     {}", opt(&record.community)),
        format!("Aes score:     {}", opt(&record.aes_score)),
    ];
    match record.coordinates() {
        Some((lat, lon)) => lines.push(format!("Location:      {:.6}, {:.6}", lat, lon)),
        None => lines.push("Location:      -".to_string()),
    }
    lines.push(format!("Listing:       {}", opt(&record.listing_urls)));
    lines.join("\n")
}

fn failure_message(err: &QueueError) -> String {
    match err {
        _ if !err.is_store_failure() => format!("⚠️ {}", err),
        QueueError::StoreUnavailable(_) => {
            format!("❌ {}. The queue was left as it was; retry when ready.", err)
        }
        _ => format!("❌ {}. The record is still queued; retry when ready.", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{records, FlakyStore};

    fn session(ids: &[&str]) -> (ValidationSession, Arc<FlakyStore>) {
        let store = Arc::new(FlakyStore::new(records(ids)));
        let session = ValidationSession::new(
            store.clone(),
            ValidationQueue::new(),
            RecordFilter::default(),
            "alice",
        );
        (session, store)
    }

    #[test]
    fn parses_commands() {
        assert_eq!(SessionCommand::parse("  "), Ok(None));
        assert_eq!(
            SessionCommand::parse("validate B"),
            Ok(Some(SessionCommand::Validate(Some("B".into()))))
        );
        assert_eq!(SessionCommand::parse("SKIP"), Ok(Some(SessionCommand::Skip(None))));
        assert!(SessionCommand::parse("select").is_err());
        assert!(SessionCommand::parse("list extra").is_err());
        assert!(SessionCommand::parse("validate a b").is_err());
        assert!(SessionCommand::parse("frobnicate").is_err());
    }

    #[tokio::test]
    async fn commands_default_to_selection_then_head() {
        let (mut session, store) = session(&["A", "B", "C"]);
        session.start().await.unwrap();

        session.execute(SessionCommand::Skip(None)).await.unwrap();
        assert_eq!(session.queue().ids().collect::<Vec<_>>(), vec!["B", "C", "A"]);

        session.execute(SessionCommand::Select("C".into())).await.unwrap();
        session.execute(SessionCommand::Validate(None)).await.unwrap();
        assert_eq!(store.validated_by("C").as_deref(), Some("alice"));
        assert_eq!(session.queue().ids().collect::<Vec<_>>(), vec!["B", "A"]);
    }

    #[tokio::test]
    async fn empty_queue_reports_precondition() {
        let (mut session, _) = session(&[]);
        assert_eq!(session.start().await.unwrap(), "🎉 No properties left to validate!");
        let err = session.execute(SessionCommand::Skip(None)).await.unwrap_err();
        assert!(matches!(err, QueueError::PreconditionViolation(_)));
    }

    #[tokio::test]
    async fn scripted_run_survives_store_failure() {
        let (mut session, store) = session(&["A", "B"]);
        store.fail_delete(true);

        let input: &[u8] = b"delete A\nnonsense\nvalidate A\nprogress\nquit\nvalidate B\n";
        let mut out = Vec::new();
        session.run(input, &mut out).await.unwrap();
        let out = String::from_utf8(out).unwrap();

        assert!(out.contains("Loaded 2 properties to validate"));
        assert!(out.contains("Failed to delete A"));
        assert!(out.contains("still queued"));
        assert!(out.contains("unknown command 'nonsense'"));
        assert!(out.contains("1/2 properties validated (50%)"));
        // nothing after quit runs
        assert_eq!(store.validated_by("B"), None);
        assert_eq!(store.delete_calls(), 1);
    }

    #[tokio::test]
    async fn failed_reload_does_not_mention_a_record() {
        let (mut session, store) = session(&["A", "B"]);
        session.start().await.unwrap();
        store.fail_fetch(true);

        // run resumes from the fresh snapshot, so only the reload hits the store
        let input: &[u8] = b"reload\nquit\n";
        let mut out = Vec::new();
        session.run(input, &mut out).await.unwrap();
        let out = String::from_utf8(out).unwrap();

        assert!(out.contains("queue was left as it was"), "{}", out);
        assert!(!out.contains("still queued"), "{}", out);
        assert_eq!(session.queue().ids().collect::<Vec<_>>(), vec!["A", "B"]);
    }

    #[test]
    fn record_rendering_shows_missing_fields_as_dash() {
        let mut record = PropertyRecord::new("kgn-9");
        record.price = Some(1_500_000.0);
        record.latitude = Some(18.0);
        record.longitude = Some(-76.8);
        let text = render_record(&record);
        assert!(text.contains("Price:         $1,500,000.00"));
        assert!(text.contains("Rooms:         -"));
        assert!(text.contains("Location:      18.000000, -76.800000"));
    }
}
