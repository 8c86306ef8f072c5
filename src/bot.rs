use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::platform::telegram::{Messenger, TelegramMessenger};
use crate::platform::{IncomingMessage, Update};
use crate::rows::parse_log_rows;
use crate::sheets::{SheetsClient, TableStore};
use crate::snapshot::{PngRenderer, SnapshotRenderer, StatusTable};

/// Fixed texts and tab names the handler works with
#[derive(Debug, Clone)]
pub struct HandlerSettings {
    pub log_tab: String,
    pub status_tab: String,
    pub max_rows: usize,
    pub confirmation_text: String,
    pub photo_caption: String,
}

impl HandlerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            log_tab: config.sheets.log_tab.clone(),
            status_tab: config.sheets.status_tab.clone(),
            max_rows: config.snapshot.max_rows,
            confirmation_text: config.telegram.confirmation_text.clone(),
            photo_caption: config.telegram.photo_caption.clone(),
        }
    }
}

/// Shared application state, built once at startup
pub struct AppState {
    messenger: Arc<dyn Messenger>,
    tables: Arc<dyn TableStore>,
    renderer: Arc<dyn SnapshotRenderer>,
    settings: HandlerSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    WriteLog,
    ReadStatus,
    Render,
    SendPhoto,
    SendConfirmation,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::WriteLog => write!(f, "write_log"),
            Step::ReadStatus => write!(f, "read_status"),
            Step::Render => write!(f, "render"),
            Step::SendPhoto => write!(f, "send_photo"),
            Step::SendConfirmation => write!(f, "send_confirmation"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Succeeded,
    Skipped(String),
    Failed(String),
}

impl StepOutcome {
    fn failed(err: &anyhow::Error) -> Self {
        StepOutcome::Failed(format!("{:#}", err))
    }
}

impl From<Result<()>> for StepOutcome {
    fn from(result: Result<()>) -> Self {
        match result {
            Ok(()) => StepOutcome::Succeeded,
            Err(e) => StepOutcome::failed(&e),
        }
    }
}

/// What happened to one update. Never turned into an error for the caller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandlerReport {
    pub chat_id: Option<i64>,
    pub steps: Vec<(Step, StepOutcome)>,
}

impl HandlerReport {
    fn record(&mut self, step: Step, outcome: StepOutcome) {
        match &outcome {
            StepOutcome::Succeeded => debug!("{} succeeded", step),
            StepOutcome::Skipped(reason) => info!("{} skipped: {}", step, reason),
            StepOutcome::Failed(reason) => warn!("{} failed: {}", step, reason),
        }
        self.steps.push((step, outcome));
    }

    #[cfg(test)]
    pub fn outcome(&self, step: Step) -> Option<&StepOutcome> {
        self.steps.iter().find(|(s, _)| *s == step).map(|(_, o)| o)
    }

    pub fn failures(&self) -> usize {
        self.steps
            .iter()
            .filter(|(_, o)| matches!(o, StepOutcome::Failed(_)))
            .count()
    }
}

impl AppState {
    pub fn new(
        messenger: Arc<dyn Messenger>,
        tables: Arc<dyn TableStore>,
        renderer: Arc<dyn SnapshotRenderer>,
        settings: HandlerSettings,
    ) -> Self {
        Self {
            messenger,
            tables,
            renderer,
            settings,
        }
    }

    /// Build the production clients from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let messenger = TelegramMessenger::new(config).context("Failed to create Telegram client")?;
        let tables = SheetsClient::new(config).context("Failed to create Sheets client")?;
        let renderer =
            PngRenderer::new(&config.snapshot).context("Failed to create snapshot renderer")?;
        Ok(Self::new(
            Arc::new(messenger),
            Arc::new(tables),
            Arc::new(renderer),
            HandlerSettings::from_config(config),
        ))
    }

    /// Process one webhook update. Every step runs even if an earlier one
    /// failed; the confirmation text is always attempted.
    pub async fn handle_update(&self, update: &Update) -> HandlerReport {
        let incoming = match update.incoming() {
            Some(incoming) => incoming,
            None => {
                debug!("Update {:?} has no message, ignoring", update.update_id);
                return HandlerReport::default();
            }
        };

        info!(
            "Message from chat {}: {} line(s)",
            incoming.chat_id,
            incoming.text.split('\n').count()
        );

        let mut report = HandlerReport {
            chat_id: Some(incoming.chat_id),
            steps: Vec::new(),
        };

        report.record(Step::WriteLog, self.write_log(&incoming.text).await.into());

        match self.build_snapshot(&mut report).await {
            Some(png) => {
                report.record(Step::SendPhoto, self.send_photo(&incoming, png).await.into());
            }
            None => report.record(
                Step::SendPhoto,
                StepOutcome::Skipped("no snapshot image".to_string()),
            ),
        }

        let confirmation = self
            .messenger
            .send_text(incoming.chat_id, &self.settings.confirmation_text)
            .await;
        report.record(Step::SendConfirmation, confirmation.into());

        info!(
            "Handled update for chat {} ({} failed step(s))",
            incoming.chat_id,
            report.failures()
        );
        report
    }

    /// Replace the log tab with the rows parsed from `text`.
    async fn write_log(&self, text: &str) -> Result<()> {
        let tab = &self.settings.log_tab;
        self.tables.clear(tab).await?;
        for row in parse_log_rows(text) {
            self.tables.append_row(tab, &row).await?;
        }
        Ok(())
    }

    /// Read the status tab and render it, recording the read and the render
    /// as separate steps. `None` when either one failed.
    async fn build_snapshot(&self, report: &mut HandlerReport) -> Option<Vec<u8>> {
        let records = match self.tables.read_records(&self.settings.status_tab).await {
            Ok(records) => {
                report.record(Step::ReadStatus, StepOutcome::Succeeded);
                records
            }
            Err(e) => {
                report.record(Step::ReadStatus, StepOutcome::failed(&e));
                report.record(
                    Step::Render,
                    StepOutcome::Skipped("status table unavailable".to_string()),
                );
                return None;
            }
        };

        let table = StatusTable::from_records(records, self.settings.max_rows);
        debug!("Rendering status snapshot with {} row(s)", table.rows.len());

        match self.renderer.render(&table).await {
            Ok(png) => {
                report.record(Step::Render, StepOutcome::Succeeded);
                Some(png)
            }
            Err(e) => {
                report.record(Step::Render, StepOutcome::failed(&e));
                None
            }
        }
    }

    async fn send_photo(&self, incoming: &IncomingMessage, png: Vec<u8>) -> Result<()> {
        self.messenger
            .send_photo(incoming.chat_id, png, &self.settings.photo_caption)
            .await
    }
}
