//! A running dispatch system driven from the command line.

use std::io::Write;
use std::path::PathBuf;

use dispatch_agent::Dispatcher;
use dispatch_core::{DeliveryData, DispatchConfig, EntityRef};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{info, warn};

use crate::command::Command;
use crate::error::{CliError, Result};
use crate::scenario::{Scenario, ScheduleExport};

/// Whether the interactive loop keeps reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Read the next command.
    Continue,
    /// Stop reading.
    Quit,
}

/// Owns the dispatcher and knows where results go.
pub struct Session {
    dispatcher: Dispatcher,
    out: Option<PathBuf>,
}

impl Session {
    /// Creates an empty session. Exports go to `out` when set, otherwise to
    /// the command writer.
    #[must_use]
    pub fn new(config: DispatchConfig, out: Option<PathBuf>) -> Self {
        Self {
            dispatcher: Dispatcher::new(config),
            out,
        }
    }

    /// The underlying dispatcher.
    #[must_use]
    pub const fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Spawns every scenario entity, couriers first, and waits for the
    /// negotiation to settle.
    pub async fn load(&self, scenario: &Scenario) -> Result<()> {
        for courier in scenario.couriers()? {
            self.dispatcher.add_courier(courier)?;
        }
        for order in scenario.orders()? {
            self.dispatcher.add_order(order)?;
        }
        self.dispatcher.settle().await;
        info!(
            couriers = scenario.couriers.len(),
            orders = scenario.orders.len(),
            "scenario settled"
        );
        Ok(())
    }

    /// Snapshots the system and writes the export.
    pub async fn export<W: Write>(&self, writer: &mut W) -> Result<ScheduleExport> {
        let export = ScheduleExport::collect(&self.dispatcher).await;
        if let Some(path) = &self.out {
            export.write_to(path)?;
            writeln!(
                writer,
                "exported {} records to {}: {} of {} orders placed",
                export.records.len(),
                path.display(),
                export.placed(),
                export.orders.len()
            )?;
        } else {
            serde_json::to_writer_pretty(&mut *writer, &export)?;
            writeln!(writer)?;
        }
        Ok(export)
    }

    /// Executes one command.
    pub async fn execute<W: Write>(&self, command: Command, writer: &mut W) -> Result<Flow> {
        match command {
            Command::AddCourier(record) => {
                let entity = self.dispatcher.add_courier(record.to_courier()?)?;
                self.settle_and_export(&entity, "added", writer).await?;
            }
            Command::AddOrder(record) => {
                let entity = self.dispatcher.add_order(record.to_order()?)?;
                self.settle_and_export(&entity, "added", writer).await?;
            }
            Command::Remove(id) => {
                let entity = self.resolve(&id)?;
                self.dispatcher.remove_agent(&entity)?;
                self.settle_and_export(&entity, "removed", writer).await?;
            }
            Command::List => self.list(writer).await?,
            Command::Export => {
                self.export(writer).await?;
            }
            Command::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    /// Reads commands line by line until `quit` or end of input. Failed
    /// commands are reported and the loop goes on.
    pub async fn run_interactive<R, W>(&self, input: R, writer: &mut W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: Write,
    {
        let mut lines = BufReader::new(input).lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let outcome = match line.parse::<Command>() {
                Ok(command) => self.execute(command, writer).await,
                Err(err) => Err(err),
            };
            match outcome {
                Ok(Flow::Continue) => {}
                Ok(Flow::Quit) => break,
                Err(err) => {
                    warn!(command = %line.trim(), error = %err, "command failed");
                    writeln!(writer, "error: {err}")?;
                }
            }
        }
        Ok(())
    }

    /// Stops every agent.
    pub async fn shutdown(self) {
        self.dispatcher.shutdown().await;
    }

    async fn settle_and_export<W: Write>(
        &self,
        entity: &EntityRef,
        verb: &str,
        writer: &mut W,
    ) -> Result<()> {
        self.dispatcher.settle().await;
        writeln!(writer, "{verb} {entity}")?;
        self.export(writer).await?;
        Ok(())
    }

    async fn list<W: Write>(&self, writer: &mut W) -> Result<()> {
        for (entity, label) in self.dispatcher.agents() {
            match &entity {
                EntityRef::Courier(_) => writeln!(writer, "{entity}\t{label}")?,
                EntityRef::Order(id) => {
                    let status = self.dispatcher.order_status(id).await?;
                    let delivery = match status.delivery {
                        DeliveryData::Unassigned => "unassigned".to_string(),
                        DeliveryData::Assigned {
                            courier,
                            price,
                            window,
                        } => format!("courier:{courier} {window} price {price}"),
                    };
                    writeln!(writer, "{entity}\t{label}\t{}\t{delivery}", status.phase)?;
                }
            }
        }
        Ok(())
    }

    /// Accepts `courier:<id>`, `order:<id>`, or a bare id that names exactly
    /// one live agent.
    fn resolve(&self, id: &str) -> Result<EntityRef> {
        if let Some(entity) = EntityRef::parse(id) {
            return Ok(entity);
        }
        let matches: Vec<EntityRef> = self
            .dispatcher
            .agents()
            .into_iter()
            .map(|(entity, _)| entity)
            .filter(|entity| match entity {
                EntityRef::Courier(c) => c.as_str() == id,
                EntityRef::Order(o) => o.as_str() == id,
            })
            .collect();
        match matches.as_slice() {
            [] => Err(CliError::UnknownEntity(id.to_string())),
            [entity] => Ok(entity.clone()),
            _ => Err(CliError::AmbiguousEntity(id.to_string())),
        }
    }
}
