use anyhow::Result;
use futures_util::FutureExt;
use serde::Serialize;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use thiserror::Error;

use crate::config::{Config, SummaryConfig, SummaryProvider};
use crate::llm::{ChatRequest, LlmClient, LlmError};
use crate::tools::{
    CalendarReader, ErrorShape, EventsResult, ExpenseAnalyzer, ExpensesResult, TodoManager,
    TodoRequest, TodoResult, Tool, WeatherClient, WeatherResult,
};

const SUMMARY_HEADER: &str = "Smart Life Daily Snapshot:";

/// Everything the producers returned for one summary request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayContext {
    pub events: EventsResult,
    pub expenses: ExpensesResult,
    pub weather: WeatherResult,
    pub todos: TodoResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryResult {
    pub summary: String,
    pub model: Option<String>,
    pub context: DayContext,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("failed to serialize day context: {0}")]
    Context(#[from] serde_json::Error),

    #[error("summary backend returned no text")]
    Empty,
}

/// A generative-text service that can turn the day context into prose.
#[async_trait::async_trait]
pub trait SummaryBackend: Send + Sync {
    fn model(&self) -> &str;
    async fn generate_summary(&self, context: &DayContext) -> Result<String, BackendError>;
}

/// Summary backend backed by an OpenAI-compatible or Ollama chat API.
pub struct LlmSummaryBackend {
    llm: LlmClient,
}

impl LlmSummaryBackend {
    /// Build the configured backend, or `None` when it cannot be used
    /// (OpenAI without an API key).
    pub fn from_config(config: &SummaryConfig) -> Option<Self> {
        let api_key = config.api_key.clone().filter(|k| !k.is_empty());
        if config.provider == SummaryProvider::OpenAi && api_key.is_none() {
            log::warn!("DaySummary: OPENAI_API_KEY is not set; using fallback summary");
            return None;
        }

        Some(Self {
            llm: LlmClient::new(
                config.provider,
                config.endpoint.clone(),
                config.model.clone(),
                api_key,
            ),
        })
    }

    fn system_prompt() -> &'static str {
        "You are a helpful lifestyle assistant."
    }

    fn user_prompt(context_json: &str) -> String {
        format!(
            "Create a concise daily summary combining the calendar, weather, expenses, and to-do data.\n\
             Highlight significant items and provide an encouraging close.\n\n\
             Context:\n{}",
            context_json
        )
    }
}

#[async_trait::async_trait]
impl SummaryBackend for LlmSummaryBackend {
    fn model(&self) -> &str {
        &self.llm.model
    }

    async fn generate_summary(&self, context: &DayContext) -> Result<String, BackendError> {
        let context_json = serde_json::to_string_pretty(context)?;

        let text = self
            .llm
            .chat(ChatRequest {
                system_prompt: Self::system_prompt().to_string(),
                user_prompt: Self::user_prompt(&context_json),
            })
            .await?;

        let text = text.trim();
        if text.is_empty() {
            return Err(BackendError::Empty);
        }
        Ok(text.to_string())
    }
}

/// Agent that gathers the other tools' results and summarizes the day.
pub struct DaySummaryAgent {
    calendar: CalendarReader,
    expenses: ExpenseAnalyzer,
    weather: WeatherClient,
    todos: TodoManager,
    default_city: String,
    backend: Option<Box<dyn SummaryBackend>>,
}

impl DaySummaryAgent {
    pub fn new(config: &Config) -> Result<Self> {
        let backend = LlmSummaryBackend::from_config(&config.summary)
            .map(|b| Box::new(b) as Box<dyn SummaryBackend>);

        Ok(Self {
            calendar: CalendarReader::new(config.events_path()),
            expenses: ExpenseAnalyzer::new(config.expenses_path()),
            weather: WeatherClient::new(&config.weather)?,
            todos: TodoManager::new(config.todo_path()),
            default_city: config.weather.default_city.clone(),
            backend,
        })
    }

    /// Replace the generative backend; `None` forces the fallback summary.
    pub fn with_backend(mut self, backend: Option<Box<dyn SummaryBackend>>) -> Self {
        self.backend = backend;
        self
    }

    /// Run every producer in turn. A failing or panicking producer only
    /// turns its own slot into `{"error": ...}`.
    pub async fn collect_context(&self) -> DayContext {
        log::info!("DaySummary: Step 1 - Collecting events");
        let events = collect("events", self.calendar.run(None)).await;

        log::info!("DaySummary: Step 2 - Collecting expenses");
        let expenses = collect("expenses", self.expenses.run(())).await;

        log::info!("DaySummary: Step 3 - Collecting weather for {}", self.default_city);
        let weather = collect("weather", self.weather.run(self.default_city.clone())).await;

        log::info!("DaySummary: Step 4 - Collecting todos");
        let todos = collect("todos", self.todos.run(TodoRequest::list())).await;

        DayContext {
            events,
            expenses,
            weather,
            todos,
        }
    }

    pub async fn summarize_day(&self) -> SummaryResult {
        let context = self.collect_context().await;

        let Some(backend) = &self.backend else {
            return SummaryResult {
                summary: Self::format_fallback_summary(&context),
                model: None,
                context,
                error: None,
            };
        };

        log::info!("DaySummary: Step 5 - Generating summary with {}", backend.model());
        match backend.generate_summary(&context).await {
            Ok(summary) => SummaryResult {
                summary,
                model: Some(backend.model().to_string()),
                context,
                error: None,
            },
            Err(e) => {
                log::error!("DaySummary: summary generation failed, using fallback: {}", e);
                SummaryResult {
                    summary: Self::format_fallback_summary(&context),
                    model: None,
                    context,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Build the templated summary used when no backend is available.
    fn format_fallback_summary(context: &DayContext) -> String {
        let mut lines = vec![SUMMARY_HEADER.to_string()];

        if let WeatherResult::Current {
            city,
            temp,
            description,
        } = &context.weather
        {
            let description = if description.is_empty() {
                "n/a"
            } else {
                description
            };
            // `{:?}` keeps the decimal on whole numbers: 28.0 stays "28.0".
            lines.push(format!("- Weather in {}: {:?}°C, {}", city, temp, description));
        }

        match &context.events {
            EventsResult::Found { date, events } if !events.is_empty() => {
                lines.push(format!("- {} event(s) scheduled for {}.", events.len(), date));
            }
            EventsResult::Empty { message } if !message.is_empty() => {
                lines.push(format!("- Events: {}", message));
            }
            _ => {}
        }

        if let ExpensesResult::Summary { total, by_category } = &context.expenses {
            lines.push(format!(
                "- Expenses total: INR {:.2} across {} category(ies).",
                total,
                by_category.len()
            ));
        }

        match &context.todos {
            TodoResult::List { todos } if !todos.is_empty() => {
                let pending = todos.iter().filter(|t| !t.done).count();
                lines.push(format!("- Todos pending: {}/{}", pending, todos.len()));
            }
            TodoResult::Message { message } if !message.is_empty() => {
                lines.push(format!("- Todos: {}", message));
            }
            _ => {}
        }

        lines.join("\n")
    }
}

/// Await one producer, turning an error or a panic into that slot's error shape.
async fn collect<T, F>(label: &str, producer: F) -> T
where
    T: ErrorShape,
    F: Future<Output = Result<T>>,
{
    match AssertUnwindSafe(producer).catch_unwind().await {
        Ok(Ok(value)) => value,
        Ok(Err(e)) => {
            log::error!("DaySummary: failed to collect {} data: {:#}", label, e);
            T::from_error(format!("{:#}", e))
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| format!("{} producer panicked", label));
            log::error!("DaySummary: {} producer panicked: {}", label, message);
            T::from_error(message)
        }
    }
}

#[async_trait::async_trait]
impl Tool for DaySummaryAgent {
    type Input = ();
    type Output = SummaryResult;

    fn name(&self) -> &str {
        "summary"
    }

    async fn run(&self, _input: ()) -> Result<SummaryResult> {
        Ok(self.summarize_day().await)
    }
}
