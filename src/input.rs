//! Line commands accepted by `watch` mode.

use chrono::NaiveDate;

use crate::config::{validate_clusters, validate_region};
use crate::dataset::Dataset;
use crate::models::FilterChange;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchCommand {
    Change(FilterChange),
    Show,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  dates START END     set the inclusive date range (YYYY-MM-DD)
  clusters [ID ...]   select clusters; no ids selects every cluster
  region NAME         require a region flag, or \"all\"
  show                print the current dashboard
  quit                exit";

pub fn parse_command(line: &str, dataset: &Dataset) -> anyhow::Result<WatchCommand> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Ok(WatchCommand::Show);
    };
    let rest: Vec<&str> = words.collect();

    match command {
        "dates" => {
            let [start, end] = rest.as_slice() else {
                anyhow::bail!("usage: dates START END");
            };
            let start: NaiveDate = start.parse()?;
            let end: NaiveDate = end.parse()?;
            Ok(WatchCommand::Change(FilterChange::DateRange(start, end)))
        }
        "clusters" => {
            let ids = rest
                .iter()
                .map(|id| id.parse::<i64>())
                .collect::<Result<Vec<_>, _>>()?;
            Ok(WatchCommand::Change(FilterChange::Clusters(
                validate_clusters(dataset, ids)?,
            )))
        }
        "region" => {
            let [name] = rest.as_slice() else {
                anyhow::bail!("usage: region NAME");
            };
            Ok(WatchCommand::Change(FilterChange::Region(validate_region(
                dataset, name,
            )?)))
        }
        "show" => Ok(WatchCommand::Show),
        "help" => Ok(WatchCommand::Help),
        "quit" | "exit" => Ok(WatchCommand::Quit),
        other => anyhow::bail!("unknown command `{other}`; type `help`"),
    }
}
