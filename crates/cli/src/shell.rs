//! Line-oriented console session over the tables and dialogs.

use std::sync::Arc;

use corral_console::{render_view, Console, EntityDialog, EntityTable, PageFetch, Submission, TableRow, TableView, ToastBuffer, ToastLevel};
use corral_core::{Entity, Project, QueryError, ResourceKind, Task, User};
use serde_json::json;
use tracing::debug;

use crate::Output;

pub const HELP: &str = "\
commands:
  ls <kind> [page]              show a page of users|projects|tasks
  page <kind> <n>               same as ls with a page number
  next | prev                   move through the current table
  add <kind> field=value ...    create an entity
  edit <kind> <id|row#> f=v     update an entity on the current page
  rm <kind> <id|row#> [--yes]   delete an entity (asks for confirmation)
  toasts                        show active notifications
  help | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ls { kind: ResourceKind, page: Option<u32> },
    Next,
    Prev,
    Add { kind: ResourceKind, fields: Vec<(String, String)> },
    Edit { kind: ResourceKind, id: String, fields: Vec<(String, String)> },
    Rm { kind: ResourceKind, id: String, yes: bool },
    Toasts,
    Help,
    Quit,
}

fn parse_fields(words: &[&str]) -> Result<Vec<(String, String)>, String> {
    words
        .iter()
        .map(|w| match w.split_once('=') {
            Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
            _ => Err(format!("expected field=value, got {:?}", w)),
        })
        .collect()
}

fn parse_kind(word: Option<&&str>) -> Result<ResourceKind, String> {
    let word = word.ok_or("missing resource kind")?;
    word.parse().map_err(|e: corral_core::CoreError| e.to_string())
}

/// Parse one input line. Blank lines yield `None`.
///
/// Values cannot contain spaces; use `_` placeholders or the JSON seed for
/// richer data.
pub fn parse(line: &str) -> Result<Option<Command>, String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((head, rest)) = words.split_first() else {
        return Ok(None);
    };
    let cmd = match *head {
        "ls" | "list" => {
            let kind = parse_kind(rest.first())?;
            let page = match rest.get(1) {
                Some(p) => Some(p.parse::<u32>().map_err(|_| format!("bad page number {:?}", p))?),
                None => None,
            };
            Command::Ls { kind, page }
        }
        "page" => {
            let kind = parse_kind(rest.first())?;
            let n = rest.get(1).ok_or("missing page number")?;
            Command::Ls { kind, page: Some(n.parse::<u32>().map_err(|_| format!("bad page number {:?}", n))?) }
        }
        "next" | "n" => Command::Next,
        "prev" | "p" => Command::Prev,
        "add" => Command::Add { kind: parse_kind(rest.first())?, fields: parse_fields(rest.get(1..).unwrap_or_default())? },
        "edit" => {
            let kind = parse_kind(rest.first())?;
            let id = rest.get(1).ok_or("missing id")?.to_string();
            Command::Edit { kind, id, fields: parse_fields(rest.get(2..).unwrap_or_default())? }
        }
        "rm" | "delete" => {
            let kind = parse_kind(rest.first())?;
            let id = rest.get(1).ok_or("missing id")?.to_string();
            let yes = rest.get(2).map(|w| *w == "--yes" || *w == "-y").unwrap_or(false);
            Command::Rm { kind, id, yes }
        }
        "toasts" => Command::Toasts,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => return Err(format!("unknown command {:?}; try help", other)),
    };
    Ok(Some(cmd))
}

enum PendingDelete {
    Users(EntityDialog<User>),
    Projects(EntityDialog<Project>),
    Tasks(EntityDialog<Task>),
}

pub enum Step {
    Print(String),
    Quit,
}

pub struct Shell {
    console: Console,
    toasts: Arc<ToastBuffer>,
    output: Output,
    current: ResourceKind,
    pending: Option<PendingDelete>,
}

impl Shell {
    pub fn new(console: Console, toasts: Arc<ToastBuffer>, output: Output) -> Self {
        Self { console, toasts, output, current: ResourceKind::Users, pending: None }
    }

    pub fn awaiting_confirmation(&self) -> bool {
        self.pending.is_some()
    }

    pub async fn handle_line(&mut self, line: &str) -> Step {
        if let Some(pending) = self.pending.take() {
            let yes = matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes");
            return Step::Print(self.finish_delete(pending, yes).await);
        }
        match parse(line) {
            Ok(None) => Step::Print(String::new()),
            Ok(Some(Command::Quit)) => Step::Quit,
            Ok(Some(cmd)) => Step::Print(self.exec(cmd).await),
            Err(e) => Step::Print(format!("error: {}", e)),
        }
    }

    pub async fn exec(&mut self, cmd: Command) -> String {
        debug!(?cmd, "shell: exec");
        match cmd {
            Command::Ls { kind, page } => {
                self.current = kind;
                match kind {
                    ResourceKind::Users => list(&self.console.users, page, self.output).await,
                    ResourceKind::Projects => list(&self.console.projects, page, self.output).await,
                    ResourceKind::Tasks => list(&self.console.tasks, page, self.output).await,
                }
            }
            Command::Next => self.step(true).await,
            Command::Prev => self.step(false).await,
            Command::Add { kind, fields } => {
                let out = match kind {
                    ResourceKind::Users => add(&self.console, &self.console.users, &fields).await,
                    ResourceKind::Projects => add(&self.console, &self.console.projects, &fields).await,
                    ResourceKind::Tasks => add(&self.console, &self.console.tasks, &fields).await,
                };
                self.after_mutation(kind, out).await
            }
            Command::Edit { kind, id, fields } => {
                let out = match kind {
                    ResourceKind::Users => edit(&self.console, &self.console.users, &id, &fields).await,
                    ResourceKind::Projects => edit(&self.console, &self.console.projects, &id, &fields).await,
                    ResourceKind::Tasks => edit(&self.console, &self.console.tasks, &id, &fields).await,
                };
                self.after_mutation(kind, out).await
            }
            Command::Rm { kind, id, yes } => {
                let pending = match kind {
                    ResourceKind::Users => delete_dialog(&self.console.users, &id).map(PendingDelete::Users),
                    ResourceKind::Projects => delete_dialog(&self.console.projects, &id).map(PendingDelete::Projects),
                    ResourceKind::Tasks => delete_dialog(&self.console.tasks, &id).map(PendingDelete::Tasks),
                };
                match pending {
                    Err(e) => format!("error: {}", e),
                    Ok(p) if yes => self.finish_delete(p, true).await,
                    Ok(p) => {
                        let prompt = match &p {
                            PendingDelete::Users(d) => d.prompt(),
                            PendingDelete::Projects(d) => d.prompt(),
                            PendingDelete::Tasks(d) => d.prompt(),
                        };
                        self.pending = Some(p);
                        format!("{} [y/N]", prompt.unwrap_or_default())
                    }
                }
            }
            Command::Toasts => self.render_toasts(),
            Command::Help => HELP.to_string(),
            Command::Quit => String::new(),
        }
    }

    async fn step(&self, forward: bool) -> String {
        match self.current {
            ResourceKind::Users => step(&self.console.users, forward, self.output).await,
            ResourceKind::Projects => step(&self.console.projects, forward, self.output).await,
            ResourceKind::Tasks => step(&self.console.tasks, forward, self.output).await,
        }
    }

    async fn finish_delete(&mut self, pending: PendingDelete, yes: bool) -> String {
        let (kind, out) = match pending {
            PendingDelete::Users(d) => (ResourceKind::Users, confirm(&self.console, d, yes).await),
            PendingDelete::Projects(d) => (ResourceKind::Projects, confirm(&self.console, d, yes).await),
            PendingDelete::Tasks(d) => (ResourceKind::Tasks, confirm(&self.console, d, yes).await),
        };
        self.after_mutation(kind, out).await
    }

    async fn after_mutation(&mut self, kind: ResourceKind, out: String) -> String {
        let refreshed = self.console.sync().await;
        let toasts = self.render_toasts();
        let mut text = out;
        if !toasts.is_empty() {
            text = if text.is_empty() { toasts } else { format!("{}\n{}", text, toasts) };
        }
        if refreshed.contains(&kind) && self.output == Output::Human {
            let table = match kind {
                ResourceKind::Users => render_view(&self.console.users.view()),
                ResourceKind::Projects => render_view(&self.console.projects.view()),
                ResourceKind::Tasks => render_view(&self.console.tasks.view()),
            };
            text = format!("{}\n{}", text, table.trim_end());
        }
        text
    }

    fn render_toasts(&self) -> String {
        self.toasts
            .drain()
            .into_iter()
            .map(|t| match t.level {
                ToastLevel::Success => format!("✔ {}", t.message),
                ToastLevel::Error => format!("✘ {}", t.message),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn render<E: Entity>(view: &TableView<E>, output: Output) -> String {
    match output {
        Output::Human => render_view(view).trim_end().to_string(),
        Output::Json => {
            let body = match view {
                TableView::Skeleton { .. } => json!({ "kind": E::KIND, "loading": true }),
                TableView::Failed(e) => json!({ "kind": E::KIND, "error": e }),
                TableView::Rows { rows, placeholder, pagination, error } => {
                    let items: Vec<serde_json::Value> = rows.iter().filter_map(|r| r.entity.clone().into_record().to_value().ok()).collect();
                    json!({ "kind": E::KIND, "items": items, "placeholder": placeholder, "pagination": pagination, "error": error })
                }
            };
            serde_json::to_string_pretty(&body).unwrap_or_default()
        }
    }
}

async fn list<E: Entity>(table: &EntityTable<E>, page: Option<u32>, output: Output) -> String {
    let page = page.unwrap_or_else(|| table.page());
    match table.go_to(page).await {
        PageFetch::Failed(QueryError::Invalid(msg)) => return format!("error: {}", msg),
        PageFetch::Failed(e) => debug!(kind = %E::KIND, error = %e, "shell: list failed"),
        _ => {}
    }
    render(&table.view(), output)
}

async fn step<E: Entity>(table: &EntityTable<E>, forward: bool, output: Output) -> String {
    if forward { table.next_page().await } else { table.prev_page().await };
    render(&table.view(), output)
}

/// Match by id first, then by 1-based row number on the page. Row numbers
/// are refused while the rows on screen belong to another page.
fn find_row<'a, E: Entity>(rows: &'a [TableRow<E>], placeholder: bool, key: &str) -> Result<&'a TableRow<E>, String> {
    if let Some(row) = rows.iter().find(|r| r.entity.id() == key) {
        return Ok(row);
    }
    if placeholder {
        return Err(format!("{} page not loaded; use an id instead of {:?}", E::KIND, key));
    }
    key.trim_start_matches('#')
        .parse::<usize>()
        .ok()
        .and_then(|n| rows.get(n.checked_sub(1)?))
        .ok_or_else(|| format!("no {} {:?} on the current page", E::KIND.noun().to_lowercase(), key))
}

fn fill<E: Entity>(dialog: &mut EntityDialog<E>, fields: &[(String, String)]) -> Result<(), String> {
    for (k, v) in fields {
        dialog.set_field(k, v).map_err(|e| e.to_string())?;
    }
    Ok(())
}

fn describe(sub: Submission) -> String {
    match sub {
        // The success toast carries the message.
        Submission::Committed(_) => String::new(),
        Submission::Invalid(errs) => errs.fields.iter().map(|f| format!("  {}: {}", f.field, f.message)).collect::<Vec<_>>().join("\n"),
        Submission::Failed(e) => format!("error: {}", e.user_message()),
        Submission::Skipped => "nothing to submit".to_string(),
    }
}

async fn add<E: Entity>(console: &Console, table: &EntityTable<E>, fields: &[(String, String)]) -> String {
    let mut dialog = table.add_dialog();
    if let Err(e) = fill(&mut dialog, fields) {
        return format!("error: {}", e);
    }
    describe(dialog.submit(&console.mutation_unit()).await)
}

async fn edit<E: Entity>(console: &Console, table: &EntityTable<E>, id: &str, fields: &[(String, String)]) -> String {
    let TableView::Rows { rows, placeholder, .. } = table.view() else {
        return format!("error: list {} first", E::KIND);
    };
    let row = match find_row(&rows, placeholder, id) {
        Ok(row) => row,
        Err(e) => return format!("error: {}", e),
    };
    let Some(mut dialog) = table.edit_dialog(row) else {
        return "error: you cannot edit your own account here".to_string();
    };
    if let Err(e) = fill(&mut dialog, fields) {
        return format!("error: {}", e);
    }
    describe(dialog.submit(&console.mutation_unit()).await)
}

fn delete_dialog<E: Entity>(table: &EntityTable<E>, id: &str) -> Result<EntityDialog<E>, String> {
    let TableView::Rows { rows, placeholder, .. } = table.view() else {
        return Err(format!("list {} first", E::KIND));
    };
    let row = find_row(&rows, placeholder, id)?;
    table.delete_dialog(row).ok_or_else(|| "you cannot delete your own account".to_string())
}

async fn confirm<E: Entity>(console: &Console, mut dialog: EntityDialog<E>, yes: bool) -> String {
    if !yes {
        dialog.cancel();
        return "Cancelled.".to_string();
    }
    describe(dialog.confirm_with(&console.mutation_unit()).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_api::{ApiError, InProcService, MockService, Seed};

    fn shell_with(output: Output) -> Shell {
        let seed: Seed = serde_json::from_value(json!({
            "users": [{ "id": "u1", "email": "admin@corral.dev", "is_superuser": true }],
            "projects": [{ "id": "p1", "name": "Alpha" }],
        }))
        .unwrap();
        let toasts = Arc::new(ToastBuffer::new());
        let service = Arc::new(InProcService::from_seed(seed));
        let console = Console::new(service, toasts.clone()).signed_in_as(Some("u1".into()));
        Shell::new(console, toasts, output)
    }

    fn shell() -> Shell {
        shell_with(Output::Human)
    }

    #[test]
    fn parses_commands() {
        assert_eq!(parse("  ").unwrap(), None);
        assert_eq!(parse("ls task 2").unwrap(), Some(Command::Ls { kind: ResourceKind::Tasks, page: Some(2) }));
        assert_eq!(
            parse("add tasks title=Write project_id=p1").unwrap(),
            Some(Command::Add {
                kind: ResourceKind::Tasks,
                fields: vec![("title".into(), "Write".into()), ("project_id".into(), "p1".into())],
            })
        );
        assert_eq!(parse("page users 2").unwrap(), Some(Command::Ls { kind: ResourceKind::Users, page: Some(2) }));
        assert_eq!(parse("rm projects p1 --yes").unwrap(), Some(Command::Rm { kind: ResourceKind::Projects, id: "p1".into(), yes: true }));
        assert!(parse("add widgets name=x").is_err());
        assert!(parse("edit projects p1 name").is_err());
    }

    #[tokio::test]
    async fn add_then_list_shows_the_task() {
        let mut sh = shell();
        sh.exec(Command::Ls { kind: ResourceKind::Tasks, page: None }).await;
        let Step::Print(out) = sh.handle_line("add tasks title=Write project_id=p1").await else { panic!("quit") };
        assert!(out.contains("Task created successfully."));
        assert!(out.contains("Write"));
    }

    #[tokio::test]
    async fn delete_asks_first() {
        let mut sh = shell();
        sh.handle_line("ls projects").await;
        let Step::Print(out) = sh.handle_line("rm projects 1").await else { panic!("quit") };
        assert!(out.contains("cannot be undone"));
        assert!(sh.awaiting_confirmation());
        let Step::Print(out) = sh.handle_line("no").await else { panic!("quit") };
        assert_eq!(out, "Cancelled.");
        let Step::Print(out) = sh.handle_line("ls projects").await else { panic!("quit") };
        assert!(out.contains("Alpha"));

        let Step::Print(out) = sh.handle_line("ls projects 0").await else { panic!("quit") };
        assert!(out.starts_with("error:"), "{}", out);
    }

    #[tokio::test]
    async fn json_listing_carries_entity_fields() {
        let mut sh = shell_with(Output::Json);
        let out = sh.exec(Command::Ls { kind: ResourceKind::Projects, page: Some(1) }).await;
        let body: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(body["kind"], json!("projects"));
        assert_eq!(body["items"][0]["name"], json!("Alpha"));
        assert_eq!(body["items"][0]["id"], json!("p1"));
        assert_eq!(body["pagination"]["total_count"], json!(1));
    }

    #[tokio::test]
    async fn row_numbers_are_refused_while_page_is_not_loaded() {
        let tasks = (1..=7).map(|i| json!({ "id": format!("t{}", i), "projectId": "p1", "title": format!("Task {}", i), "status": "pending" }));
        let mock = Arc::new(MockService::new().with_rows(ResourceKind::Tasks, tasks.collect()));
        let toasts = Arc::new(ToastBuffer::new());
        let mut sh = Shell::new(Console::new(mock.clone(), toasts.clone()), toasts, Output::Human);

        sh.handle_line("ls tasks 1").await;
        mock.fail_next_list(ApiError::internal("boom"));
        sh.handle_line("next").await;

        let Step::Print(out) = sh.handle_line("rm tasks 1").await else { panic!("quit") };
        assert!(out.starts_with("error:"), "{}", out);
        assert!(!sh.awaiting_confirmation());
        let Step::Print(out) = sh.handle_line("edit tasks 2 title=Renamed").await else { panic!("quit") };
        assert!(out.starts_with("error:"), "{}", out);
        assert_eq!(mock.mutation_calls(), 0);

        let Step::Print(out) = sh.handle_line("rm tasks t1").await else { panic!("quit") };
        assert!(out.contains("cannot be undone"));
        assert!(sh.awaiting_confirmation());
    }
}
