use crate::config::DatabaseConfig;
use crate::core::db::{ChangesResult, RowMap, SetStatement, SqlValue, StatementType};
use crate::core::{Result, SyncqlError};
use crate::database::Database;
use crate::json::{JsonMode, JsonSqlite};
use serde::de::DeserializeOwned;
use std::fs;
use std::io::{BufRead, Write};
use tracing::debug;

/// Represents a parsed REPL command.
#[derive(Debug, PartialEq)]
pub enum Command {
    Open(Option<String>),
    Close,
    Delete,
    Run { sql: String, values: Vec<SqlValue> },
    Set(Vec<SetStatement>),
    Select { sql: String, values: Vec<String> },
    SyncTable,
    SyncDate,
    GetSyncDate,
    Import(String),
    Export { mode: JsonMode, path: Option<String> },
    Help,
    Quit,
    Sql(String),
    /// A known command with unusable arguments
    Invalid(String),
    Unknown(String),
}

const HELP: &str = "Available commands:
  :open [name]                 Open the configured database, or another one by name
  :close                       Close the database
  :delete                      Delete the database file
  :run [values] <sql>          Run one write statement in a transaction
  :set <json batch>            Run [{\"statement\": ..., \"values\": [...]}, ...] atomically
  :select [values] <sql>       Run a read with text parameters
  :synctable                   Create the sync table
  :syncdate                    Stamp the sync table with the current time
  :getsyncdate                 Show the recorded sync date
  :import <file>               Import a JSON database file
  :export <full|partial> [file] Export the database as JSON
  :help                        Show this list
  :quit                        Leave the shell

Bare SQL runs as a read when it returns rows and as a script otherwise.";

/// Parses a user input string into a corresponding `Command`.
///
/// If the input starts with a colon (`:`), it is interpreted as a command.
/// Otherwise, it is treated as SQL.
pub fn parse_command(input: &str) -> Command {
    let input = input.trim();
    if !input.starts_with(':') {
        return Command::Sql(input.to_string());
    }
    let trimmed = &input[1..];
    let (name, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (trimmed, ""),
    };

    match name {
        "open" => Command::Open((!rest.is_empty()).then(|| rest.to_string())),
        "close" => Command::Close,
        "delete" => Command::Delete,
        "run" => match split_values::<Vec<SqlValue>>(rest) {
            Ok((values, sql)) if !sql.is_empty() => Command::Run { sql, values },
            Ok(_) => Command::Invalid("usage: :run [values] <sql>".to_string()),
            Err(e) => Command::Invalid(e),
        },
        "set" => match serde_json::from_str::<Vec<SetStatement>>(rest) {
            Ok(set) => Command::Set(set),
            Err(e) => Command::Invalid(format!("usage: :set <json batch> ({})", e)),
        },
        "select" => match split_values::<Vec<String>>(rest) {
            Ok((values, sql)) if !sql.is_empty() => Command::Select { sql, values },
            Ok(_) => Command::Invalid("usage: :select [values] <sql>".to_string()),
            Err(e) => Command::Invalid(e),
        },
        "synctable" => Command::SyncTable,
        "syncdate" => Command::SyncDate,
        "getsyncdate" => Command::GetSyncDate,
        "import" if !rest.is_empty() => Command::Import(rest.to_string()),
        "import" => Command::Invalid("usage: :import <file>".to_string()),
        "export" => {
            let mut parts = rest.split_whitespace();
            match parts.next().map(str::parse::<JsonMode>) {
                Some(Ok(mode)) => Command::Export {
                    mode,
                    path: parts.next().map(String::from),
                },
                Some(Err(e)) => Command::Invalid(e.to_string()),
                None => Command::Invalid("usage: :export <full|partial> [file]".to_string()),
            }
        }
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        _ => Command::Unknown(input.to_string()),
    }
}

/// Splits an optional leading JSON array of values off `rest`.
fn split_values<T: DeserializeOwned + Default>(rest: &str) -> std::result::Result<(T, String), String> {
    if !rest.starts_with('[') {
        return Ok((T::default(), rest.to_string()));
    }
    let mut stream = serde_json::Deserializer::from_str(rest).into_iter::<T>();
    match stream.next() {
        Some(Ok(values)) => {
            let sql = rest[stream.byte_offset()..].trim().to_string();
            Ok((values, sql))
        }
        Some(Err(e)) => Err(format!("invalid values: {}", e)),
        None => Err("invalid values".to_string()),
    }
}

/// What a command produced, ready to print.
#[derive(Debug, PartialEq)]
pub enum Output {
    Message(String),
    Changes(i64),
    Result(ChangesResult),
    Rows(Vec<RowMap>),
    Quit,
}

/// One shell session bound to a database.
pub struct Session {
    config: DatabaseConfig,
    db: Database,
}

impl Session {
    pub fn new(config: DatabaseConfig) -> Result<Self> {
        let db = Database::from_config(&config)?;
        Ok(Session { config, db })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Runs one command against the session's database.
    pub fn handle(&mut self, command: Command) -> Result<Output> {
        debug!("Handling {:?}", command);
        match command {
            Command::Open(name) => {
                if let Some(name) = name {
                    if self.db.is_open() {
                        self.db.close()?;
                    }
                    let config = DatabaseConfig {
                        name,
                        ..self.config.clone()
                    };
                    self.db = Database::from_config(&config)?;
                }
                self.db.open()?;
                Ok(Output::Message(format!("opened {}", self.db.path().display())))
            }
            Command::Close => {
                self.db.close()?;
                Ok(Output::Message(format!("closed {}", self.db.name())))
            }
            Command::Delete => {
                let removed = self.db.delete()?;
                Ok(Output::Message(if removed {
                    format!("deleted {}", self.db.path().display())
                } else {
                    format!("nothing to delete at {}", self.db.path().display())
                }))
            }
            Command::Run { sql, values } => self.db.run_sql(&sql, &values).map(Output::Result),
            Command::Set(set) => self.db.exec_set(&set).map(Output::Changes),
            Command::Select { sql, values } => self.db.select_sql(&sql, &values).map(Output::Rows),
            Command::SyncTable => self.db.create_sync_table().map(Output::Changes),
            Command::SyncDate => self
                .db
                .set_sync_date()
                .map(|done| Output::Message(format!("sync date set: {}", done))),
            Command::GetSyncDate => self
                .db
                .get_sync_date()
                .map(|date| Output::Message(format!("sync date: {}", date))),
            Command::Import(path) => {
                let text = fs::read_to_string(&path)?;
                let json = JsonSqlite::from_json_str(&text)
                    .map_err(|e| SyncqlError::Import(Box::new(e)))?;
                self.db.import_from_json(&json).map(Output::Changes)
            }
            Command::Export { mode, path } => {
                let json = self.db.export_to_json(mode)?.to_json_string()?;
                match path {
                    Some(path) => {
                        fs::write(&path, json)?;
                        Ok(Output::Message(format!("exported to {}", path)))
                    }
                    None => Ok(Output::Message(json)),
                }
            }
            Command::Sql(sql) => {
                if StatementType::from_sql(&sql).returns_rows() {
                    self.db.select_sql(&sql, &[]).map(Output::Rows)
                } else {
                    self.db.exec_sql(&sql).map(Output::Changes)
                }
            }
            Command::Help => Ok(Output::Message(HELP.to_string())),
            Command::Quit => Ok(Output::Quit),
            Command::Invalid(msg) => Err(SyncqlError::InvalidInput(msg)),
            Command::Unknown(input) => Err(SyncqlError::InvalidInput(format!(
                "unknown command {} (try :help)",
                input
            ))),
        }
    }
}

/// Renders an output for the terminal.
pub fn render(output: &Output) -> Result<String> {
    Ok(match output {
        Output::Message(msg) => msg.clone(),
        Output::Changes(changes) => format!("changes: {}", changes),
        Output::Result(result) => serde_json::to_string(result)?,
        Output::Rows(rows) => {
            let mut lines = rows
                .iter()
                .map(serde_json::to_string)
                .collect::<std::result::Result<Vec<_>, _>>()?;
            lines.push(format!("({} rows)", rows.len()));
            lines.join("\n")
        }
        Output::Quit => String::new(),
    })
}

/// Runs the shell over `input` until `:quit` or end of input.
///
/// Results go to `out`. Errors go to standard error; a failed `:run` also
/// prints the failure result so scripted callers see `-1` values.
pub fn run_repl<R: BufRead, W: Write>(config: DatabaseConfig, input: R, mut out: W) -> Result<()> {
    let mut session = Session::new(config)?;
    writeln!(out, "syncql shell for {}. Type :help for commands.", session.database().name())?;

    for line in input.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let command = parse_command(trimmed);
        let is_write = matches!(command, Command::Run { .. } | Command::Set(_));
        match session.handle(command) {
            Ok(Output::Quit) => break,
            Ok(output) => writeln!(out, "{}", render(&output)?)?,
            Err(e) => {
                if is_write {
                    writeln!(out, "{}", render(&Output::Result(ChangesResult::failure()))?)?;
                }
                eprintln!("Error: {}", e);
            }
        }
        out.flush()?;
    }
    Ok(())
}
