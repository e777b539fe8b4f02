use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::config::Config;
use crate::summary::DaySummaryAgent;
use crate::tools::{
    CalendarReader, EventWriter, ExpenseAnalyzer, SnippetRunner, TodoManager, TodoRequest, Tool,
    WeatherClient,
};

#[derive(Debug, Error)]
pub enum ToolCallError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {source}")]
    InvalidArguments {
        tool: String,
        source: serde_json::Error,
    },
}

/// What a tool call produced. `is_error` is only set when the tool itself
/// failed; error shapes returned by a tool are ordinary results.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub value: Value,
    pub is_error: bool,
}

#[derive(Debug, Default, Deserialize)]
struct CalendarArgs {
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AddEventArgs {
    date: String,
    event: String,
    time: Option<String>,
    location: Option<String>,
}

impl AddEventArgs {
    /// The record handed to the event writer; optional fields only when set.
    fn into_record(self) -> Value {
        let mut record = Map::new();
        record.insert("date".to_string(), Value::String(self.date));
        record.insert("event".to_string(), Value::String(self.event));
        if let Some(time) = self.time.filter(|t| !t.is_empty()) {
            record.insert("time".to_string(), Value::String(time));
        }
        if let Some(location) = self.location.filter(|l| !l.is_empty()) {
            record.insert("location".to_string(), Value::String(location));
        }
        Value::Object(record)
    }
}

#[derive(Debug, Default, Deserialize)]
struct WeatherArgs {
    city: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PythonExecArgs {
    code: String,
}

/// Owns one instance of every tool and routes named calls to them.
pub struct Dashboard {
    calendar: CalendarReader,
    event_writer: EventWriter,
    weather: WeatherClient,
    expenses: ExpenseAnalyzer,
    todos: TodoManager,
    summary: DaySummaryAgent,
    snippets: SnippetRunner,
    default_city: String,
}

impl Dashboard {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            calendar: CalendarReader::new(config.events_path()),
            event_writer: EventWriter::new(config.events_path()),
            weather: WeatherClient::new(&config.weather)?,
            expenses: ExpenseAnalyzer::new(config.expenses_path()),
            todos: TodoManager::new(config.todo_path()),
            summary: DaySummaryAgent::new(config)?,
            snippets: SnippetRunner::new(&config.snippet),
            default_city: config.weather.default_city.clone(),
        })
    }

    /// Dispatch `name` with JSON `arguments` (absent or `null` means no arguments).
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolOutput, ToolCallError> {
        log::info!("Tool call: {}", name);

        let outcome = match name {
            "calendar" => {
                let args: CalendarArgs = parse_args(name, arguments)?;
                invoke(&self.calendar, args.date).await
            }
            "add-event" => {
                let args: AddEventArgs = parse_args(name, arguments)?;
                invoke(&self.event_writer, args.into_record()).await
            }
            "weather" => {
                let args: WeatherArgs = parse_args(name, arguments)?;
                let city = args
                    .city
                    .filter(|c| !c.is_empty())
                    .unwrap_or_else(|| self.default_city.clone());
                invoke(&self.weather, city).await
            }
            "expenses" => invoke(&self.expenses, ()).await,
            "todo" => {
                let args: TodoRequest = parse_args(name, arguments)?;
                invoke(&self.todos, args).await
            }
            "summary" => invoke(&self.summary, ()).await,
            "python_exec" => {
                let args: PythonExecArgs = parse_args(name, arguments)?;
                invoke(&self.snippets, args.code).await
            }
            other => return Err(ToolCallError::UnknownTool(other.to_string())),
        };

        Ok(match outcome {
            Ok(value) => ToolOutput {
                value,
                is_error: false,
            },
            Err(e) => {
                log::error!("Tool {} failed: {:#}", name, e);
                ToolOutput {
                    value: json!({ "error": format!("{:#}", e) }),
                    is_error: true,
                }
            }
        })
    }
}

fn parse_args<T: DeserializeOwned>(tool: &str, arguments: Value) -> Result<T, ToolCallError> {
    let arguments = match arguments {
        Value::Null => Value::Object(Map::new()),
        other => other,
    };
    serde_json::from_value(arguments).map_err(|source| ToolCallError::InvalidArguments {
        tool: tool.to_string(),
        source,
    })
}

async fn invoke<T>(tool: &T, input: T::Input) -> Result<Value>
where
    T: Tool,
    T::Output: Serialize,
{
    log::debug!("Running {}", tool.name());
    let output = tool.run(input).await?;
    Ok(serde_json::to_value(output)?)
}

/// Tool descriptions advertised by `tools/list`.
pub fn tool_definitions() -> Value {
    json!([
        {
            "name": "calendar",
            "description": "Get calendar events for a given date (defaults to today).",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "date": {"type": "string", "description": "Date in YYYY-MM-DD format"}
                }
            }
        },
        {
            "name": "add-event",
            "description": "Add a calendar event to the local dataset.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "date": {"type": "string", "description": "Date in YYYY-MM-DD format"},
                    "event": {"type": "string"},
                    "time": {"type": "string"},
                    "location": {"type": "string"}
                },
                "required": ["date", "event"]
            }
        },
        {
            "name": "weather",
            "description": "Fetch the current weather for a city (OpenWeather).",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "city": {"type": "string", "default": "Bengaluru"}
                }
            }
        },
        {
            "name": "expenses",
            "description": "Analyze monthly expenses from CSV data.",
            "inputSchema": {"type": "object", "properties": {}}
        },
        {
            "name": "todo",
            "description": "Manage the to-do list (actions: list, add, done).",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "action": {"type": "string", "enum": ["list", "add", "done"], "default": "list"},
                    "task": {"type": "string"}
                }
            }
        },
        {
            "name": "summary",
            "description": "Summarize the day using calendar, weather, expenses, and todos.",
            "inputSchema": {"type": "object", "properties": {}}
        },
        {
            "name": "python_exec",
            "description": "Execute small Python snippets in a restricted environment.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "code": {"type": "string"}
                },
                "required": ["code"]
            }
        }
    ])
}
