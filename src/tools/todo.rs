use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

use super::{ErrorShape, Tool};
use crate::store::{JsonStore, StoreError};

/// A task in `todo.json`. Keys other than `task` and `done` are written back as found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodoItem {
    #[serde(default, deserialize_with = "lenient_text")]
    pub task: String,
    #[serde(default, deserialize_with = "truthy")]
    pub done: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TodoItem {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            done: false,
            extra: Map::new(),
        }
    }
}

/// Strings as-is, `null` as empty, anything else as its JSON text.
fn lenient_text<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Empty, zero, `false` and `null` are not done; everything else is.
fn truthy<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => false,
        Value::Bool(flag) => flag,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TodoAction {
    List,
    Add,
    Done,
}

impl TodoAction {
    pub fn parse(action: &str) -> Option<Self> {
        match action {
            "list" => Some(Self::List),
            "add" => Some(Self::Add),
            "done" => Some(Self::Done),
            _ => None,
        }
    }
}

/// A todo call as received from the caller: the action is kept as raw text
/// so unknown actions can be reported in the result instead of failing decode.
#[derive(Debug, Clone, Deserialize)]
pub struct TodoRequest {
    #[serde(default = "TodoRequest::default_action")]
    pub action: String,
    #[serde(default)]
    pub task: Option<String>,
}

impl TodoRequest {
    fn default_action() -> String {
        "list".to_string()
    }

    pub fn list() -> Self {
        Self {
            action: Self::default_action(),
            task: None,
        }
    }

    pub fn new(action: &str, task: Option<&str>) -> Self {
        Self {
            action: action.to_string(),
            task: task.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TodoResult {
    List { todos: Vec<TodoItem> },
    Message { message: String },
    Error { error: String },
}

impl ErrorShape for TodoResult {
    fn from_error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }
}

/// Lists, adds and completes tasks in the todo file.
pub struct TodoManager {
    store: JsonStore<TodoItem>,
}

impl TodoManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            store: JsonStore::new(path),
        }
    }

    /// Load the list, creating the file if missing and resetting it if it is
    /// not valid JSON. Valid JSON in an unexpected layout is left alone.
    fn load(&self) -> Result<Vec<TodoItem>> {
        if self.store.ensure_exists()? {
            log::warn!(
                "TodoManager: todo file missing at {}; created a new file",
                self.store.path().display()
            );
        }

        match self.store.load() {
            Ok(todos) => Ok(todos),
            Err(StoreError::InvalidJson { path, source }) => {
                log::error!(
                    "TodoManager: unable to parse {} ({}); resetting file",
                    path.display(),
                    source
                );
                self.store.save(&[])?;
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, todos: &[TodoItem]) -> Result<()> {
        self.store
            .save(todos)
            .context("TodoManager: failed to save todo list")
    }
}

#[async_trait::async_trait]
impl Tool for TodoManager {
    type Input = TodoRequest;
    type Output = TodoResult;

    fn name(&self) -> &str {
        "todo"
    }

    async fn run(&self, request: TodoRequest) -> Result<TodoResult> {
        let mut todos = self.load()?;
        log::debug!(
            "TodoManager: action={} task={:?}",
            request.action,
            request.task
        );

        let task = request.task.filter(|t| !t.is_empty());

        match (TodoAction::parse(&request.action), task) {
            (Some(TodoAction::List), _) => {
                if todos.is_empty() {
                    log::info!("TodoManager: todo list is empty");
                    return Ok(TodoResult::Message {
                        message: "No tasks found".to_string(),
                    });
                }
                Ok(TodoResult::List { todos })
            }
            (Some(TodoAction::Add), Some(task)) => {
                todos.push(TodoItem::new(task.clone()));
                self.save(&todos)?;
                log::info!("TodoManager: added task '{}'", task);
                Ok(TodoResult::Message {
                    message: format!("Task '{}' added successfully.", task),
                })
            }
            (Some(TodoAction::Done), Some(task)) => {
                let wanted = task.to_lowercase();
                let Some(item) = todos.iter_mut().find(|t| t.task.to_lowercase() == wanted) else {
                    log::warn!("TodoManager: task '{}' not found", task);
                    return Ok(TodoResult::from_error(format!("Task '{}' not found.", task)));
                };

                item.done = true;
                self.save(&todos)?;
                log::info!("TodoManager: marked task '{}' as done", task);
                Ok(TodoResult::Message {
                    message: format!("Task '{}' marked as done.", task),
                })
            }
            _ => {
                log::error!(
                    "TodoManager: invalid action '{}' or missing task",
                    request.action
                );
                Ok(TodoResult::from_error("Invalid action or missing task name."))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn setup() -> (tempfile::TempDir, TodoManager, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("todo.json");
        let manager = TodoManager::new(&path);
        (dir, manager, path)
    }

    fn read(path: &std::path::Path) -> serde_json::Value {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_list_creates_missing_file() {
        let (_dir, manager, path) = setup();
        let result = manager.run(TodoRequest::list()).await.unwrap();
        assert_eq!(
            result,
            TodoResult::Message {
                message: "No tasks found".to_string()
            }
        );
        assert_eq!(read(&path), json!([]));
    }

    #[tokio::test]
    async fn test_add_then_list() {
        let (_dir, manager, path) = setup();
        let result = manager
            .run(TodoRequest::new("add", Some("Buy milk")))
            .await
            .unwrap();
        assert_eq!(
            serde_json::to_value(result).unwrap(),
            json!({"message": "Task 'Buy milk' added successfully."})
        );

        let result = manager.run(TodoRequest::list()).await.unwrap();
        assert_eq!(
            serde_json::to_value(result).unwrap(),
            json!({"todos": [{"task": "Buy milk", "done": false}]})
        );
        assert_eq!(read(&path), json!([{"task": "Buy milk", "done": false}]));
    }

    #[tokio::test]
    async fn test_done_marks_first_case_insensitive_match_only() {
        let (_dir, manager, path) = setup();
        std::fs::write(
            &path,
            r#"[{"task": "Water plants", "done": false}, {"task": "water PLANTS", "done": false}]"#,
        )
        .unwrap();

        let result = manager
            .run(TodoRequest::new("done", Some("WATER plants")))
            .await
            .unwrap();
        assert_eq!(
            result,
            TodoResult::Message {
                message: "Task 'WATER plants' marked as done.".to_string()
            }
        );
        assert_eq!(
            read(&path),
            json!([
                {"task": "Water plants", "done": true},
                {"task": "water PLANTS", "done": false}
            ])
        );
    }

    #[tokio::test]
    async fn test_done_unknown_task_leaves_file_alone() {
        let (_dir, manager, path) = setup();
        let original = r#"[{"task":"Read","done":false}]"#;
        std::fs::write(&path, original).unwrap();

        let result = manager
            .run(TodoRequest::new("done", Some("Write")))
            .await
            .unwrap();
        assert_eq!(result, TodoResult::from_error("Task 'Write' not found."));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), original);
    }

    #[tokio::test]
    async fn test_invalid_action_or_missing_task() {
        let (_dir, manager, path) = setup();
        let expected = TodoResult::from_error("Invalid action or missing task name.");

        assert_eq!(manager.run(TodoRequest::new("remove", Some("x"))).await.unwrap(), expected);
        assert_eq!(manager.run(TodoRequest::new("add", None)).await.unwrap(), expected);
        assert_eq!(manager.run(TodoRequest::new("done", Some(""))).await.unwrap(), expected);
        assert_eq!(read(&path), json!([]));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_reset() {
        let (_dir, manager, path) = setup();
        std::fs::write(&path, "{{{").unwrap();

        let result = manager.run(TodoRequest::list()).await.unwrap();
        assert!(matches!(result, TodoResult::Message { .. }));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[]");
    }

    #[test]
    fn test_request_defaults_to_list() {
        let request: TodoRequest = serde_json::from_value(json!({})).unwrap();
        assert_eq!(request.action, "list");
        assert!(request.task.is_none());
    }

    #[tokio::test]
    async fn test_loosely_typed_items_are_kept() {
        let (_dir, manager, path) = setup();
        std::fs::write(
            &path,
            r#"[{"task": "Pay rent", "done": null}, {"task": "Call bank", "done": 1}]"#,
        )
        .unwrap();

        let result = manager.run(TodoRequest::list()).await.unwrap();
        assert_eq!(
            serde_json::to_value(result).unwrap(),
            json!({"todos": [
                {"task": "Pay rent", "done": false},
                {"task": "Call bank", "done": true}
            ]})
        );
        assert_eq!(read(&path)[0]["task"], "Pay rent");
        assert_eq!(read(&path).as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unexpected_layout_is_not_reset() {
        let (_dir, manager, path) = setup();
        let original = r#"{"task": "Pay rent", "done": false}"#;
        std::fs::write(&path, original).unwrap();

        assert!(manager.run(TodoRequest::list()).await.is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), original);
    }

    #[tokio::test]
    async fn test_extra_keys_survive_rewrite() {
        let (_dir, manager, path) = setup();
        std::fs::write(
            &path,
            r#"[{"task": "Pay rent", "done": false, "due": "2024-06-30"}]"#,
        )
        .unwrap();

        manager.run(TodoRequest::new("add", Some("Walk"))).await.unwrap();
        manager
            .run(TodoRequest::new("done", Some("pay rent")))
            .await
            .unwrap();

        assert_eq!(
            read(&path),
            json!([
                {"task": "Pay rent", "done": true, "due": "2024-06-30"},
                {"task": "Walk", "done": false}
            ])
        );
    }
}
