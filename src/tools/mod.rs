pub mod calendar;
pub mod expenses;
pub mod snippet;
pub mod todo;
pub mod weather;

pub use calendar::{CalendarReader, EventWriter, EventsResult};
pub use expenses::{ExpenseAnalyzer, ExpensesResult};
pub use snippet::SnippetRunner;
pub use todo::{TodoManager, TodoRequest, TodoResult};
pub use weather::{WeatherClient, WeatherResult};

use anyhow::Result;

/// Tool trait for dashboard operations.
///
/// Not object-safe (associated types).
/// The router calls tools by concrete type, not `dyn Tool`.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    type Input: Send;
    type Output: Send;

    fn name(&self) -> &str;
    async fn run(&self, input: Self::Input) -> Result<Self::Output>;
}

/// Result shapes that can carry a failure as `{"error": "..."}`.
pub trait ErrorShape {
    fn from_error(message: impl Into<String>) -> Self;
}
