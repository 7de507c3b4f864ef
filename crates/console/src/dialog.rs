//! Add/Edit/Delete dialog state machine.
//!
//! `Closed -> Open -> Submitting -> Closed | Open(failure)`. The dialog only
//! produces [`MutationIntent`]s; running them is the caller's job (or the
//! `submit`/`confirm_with` drivers below).

use corral_core::{Draft, DraftMode, Entity, EntityId, FieldError, MutationError, Record, ValidationError};
use corral_store::{MutationIntent, MutationOutcome, MutationUnit};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogMode {
    Add,
    Edit(EntityId),
    Delete(EntityId),
}

impl DialogMode {
    fn draft_mode(&self) -> Option<DraftMode> {
        match self {
            DialogMode::Add => Some(DraftMode::Create),
            DialogMode::Edit(_) => Some(DraftMode::Update),
            DialogMode::Delete(_) => None,
        }
    }
}

/// Form of an open dialog. Delete dialogs carry a default draft that is never
/// sent.
#[derive(Debug, Clone, PartialEq)]
pub struct DialogForm<D> {
    pub mode: DialogMode,
    pub draft: D,
    pub field_errors: ValidationError,
    /// Server or transport failure of the last submission.
    pub failure: Option<MutationError>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DialogState<D> {
    Closed,
    Open(DialogForm<D>),
    Submitting(DialogForm<D>),
}

/// Result of driving a dialog through one submission.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    Committed(Option<Record>),
    /// Local validation failed; nothing was sent.
    Invalid(ValidationError),
    Failed(MutationError),
    /// The dialog was not in a state that can submit.
    Skipped,
}

pub struct EntityDialog<E: Entity> {
    state: DialogState<E::Draft>,
}

impl<E: Entity> Default for EntityDialog<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> EntityDialog<E> {
    pub fn new() -> Self {
        Self { state: DialogState::Closed }
    }

    pub fn state(&self) -> &DialogState<E::Draft> {
        &self.state
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, DialogState::Open(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, DialogState::Closed)
    }

    pub fn is_submitting(&self) -> bool {
        matches!(self.state, DialogState::Submitting(_))
    }

    pub fn form(&self) -> Option<&DialogForm<E::Draft>> {
        match &self.state {
            DialogState::Open(form) | DialogState::Submitting(form) => Some(form),
            DialogState::Closed => None,
        }
    }

    pub fn title(&self) -> Option<String> {
        let noun = E::KIND.noun();
        self.form().map(|f| match f.mode {
            DialogMode::Add => format!("Add {}", noun),
            DialogMode::Edit(_) => format!("Edit {}", noun),
            DialogMode::Delete(_) => format!("Delete {}", noun),
        })
    }

    /// Confirmation text of a delete dialog.
    pub fn prompt(&self) -> Option<String> {
        match self.form()?.mode {
            DialogMode::Delete(_) => Some(format!(
                "This {} will be permanently deleted. Are you sure? This action cannot be undone.",
                E::KIND.noun().to_lowercase()
            )),
            _ => None,
        }
    }

    fn open(&mut self, mode: DialogMode, draft: E::Draft) {
        if self.is_submitting() {
            debug!(kind = %E::KIND, "dialog: open ignored while submitting");
            return;
        }
        self.state = DialogState::Open(DialogForm { mode, draft, field_errors: ValidationError::default(), failure: None });
    }

    pub fn open_add(&mut self) {
        self.open(DialogMode::Add, E::Draft::default());
    }

    /// Pre-populate from a copy of `entity`; the cached entity is untouched.
    pub fn open_edit(&mut self, entity: &E) {
        self.open(DialogMode::Edit(entity.id().to_string()), E::Draft::from_entity(entity));
    }

    pub fn open_delete(&mut self, id: &str) {
        self.open(DialogMode::Delete(id.to_string()), E::Draft::default());
    }

    /// Edit one form field. Only add/edit dialogs in the open state accept edits.
    pub fn set_field(&mut self, field: &str, value: &str) -> Result<(), FieldError> {
        let form = match &mut self.state {
            DialogState::Open(form) if form.mode.draft_mode().is_some() => form,
            _ => return Err(FieldError::new("field", "dialog is not editable")),
        };
        form.draft.set(field, value)?;
        form.field_errors.fields.retain(|f| f.field != field);
        Ok(())
    }

    /// Validate and move to `Submitting`, returning the intent to run. Delete
    /// dialogs never produce an intent here; see [`EntityDialog::confirm`].
    pub fn begin_submit(&mut self) -> Option<MutationIntent> {
        let DialogState::Open(form) = &mut self.state else {
            return None;
        };
        let mode = form.mode.draft_mode()?;
        if let Err(errs) = form.draft.validate(mode) {
            debug!(kind = %E::KIND, errors = %errs, "dialog: validation failed");
            form.field_errors = errs;
            return None;
        }
        form.field_errors = ValidationError::default();
        let body = match form.draft.body(mode) {
            Ok(body) => body,
            Err(e) => {
                form.failure = Some(MutationError::Encode(e.to_string()));
                return None;
            }
        };
        let intent = match &form.mode {
            DialogMode::Edit(id) => MutationIntent::update(E::KIND, id.clone(), body),
            _ => MutationIntent::create(E::KIND, body),
        };
        self.to_submitting();
        Some(intent)
    }

    /// Explicit confirmation of a delete dialog.
    pub fn confirm(&mut self) -> Option<MutationIntent> {
        let DialogState::Open(form) = &self.state else {
            return None;
        };
        let DialogMode::Delete(id) = &form.mode else {
            return None;
        };
        let intent = MutationIntent::delete(E::KIND, id.clone());
        self.to_submitting();
        Some(intent)
    }

    fn to_submitting(&mut self) {
        if let DialogState::Open(mut form) = std::mem::replace(&mut self.state, DialogState::Closed) {
            form.failure = None;
            self.state = DialogState::Submitting(form);
        }
    }

    /// Apply the result of the submitted intent.
    pub fn resolve(&mut self, result: &Result<MutationOutcome, MutationError>) {
        let DialogState::Submitting(mut form) = std::mem::replace(&mut self.state, DialogState::Closed) else {
            return;
        };
        match result {
            Ok(MutationOutcome::Committed(_)) => {}
            Ok(MutationOutcome::Ignored) => self.state = DialogState::Open(form),
            Err(e) => {
                form.failure = Some(e.clone());
                self.state = DialogState::Open(form);
            }
        }
    }

    /// Close an open dialog, discarding edits. No effect while submitting.
    pub fn cancel(&mut self) {
        if self.is_open() {
            self.state = DialogState::Closed;
        }
    }

    /// Validate, run the intent through `unit` and resolve.
    pub async fn submit(&mut self, unit: &MutationUnit) -> Submission {
        match self.begin_submit() {
            Some(intent) => self.run(unit, intent).await,
            None => match self.form() {
                Some(form) if self.is_open() && !form.field_errors.is_empty() => Submission::Invalid(form.field_errors.clone()),
                Some(DialogForm { failure: Some(e @ MutationError::Encode(_)), .. }) => Submission::Failed(e.clone()),
                _ => Submission::Skipped,
            },
        }
    }

    /// Confirm a delete dialog and run it through `unit`.
    pub async fn confirm_with(&mut self, unit: &MutationUnit) -> Submission {
        match self.confirm() {
            Some(intent) => self.run(unit, intent).await,
            None => Submission::Skipped,
        }
    }

    async fn run(&mut self, unit: &MutationUnit, intent: MutationIntent) -> Submission {
        let result = unit.submit(intent).await;
        self.resolve(&result);
        match result {
            Ok(MutationOutcome::Committed(record)) => Submission::Committed(record),
            Ok(MutationOutcome::Ignored) => Submission::Skipped,
            Err(e) => Submission::Failed(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_core::{Project, Task};

    fn alpha() -> Project {
        Project { id: "p1".into(), name: "Alpha".into(), description: None, owner_id: None }
    }

    #[test]
    fn clearing_required_name_keeps_dialog_open() {
        let mut d = EntityDialog::<Project>::new();
        d.open_edit(&alpha());
        d.set_field("name", "").unwrap();
        assert!(d.begin_submit().is_none());
        assert!(d.is_open());
        let form = d.form().unwrap();
        assert_eq!(form.field_errors.for_field("name").unwrap().message, "Project name is required");
        assert_eq!(form.draft.name, "");
    }

    #[test]
    fn second_submit_while_submitting_is_a_no_op() {
        let mut d = EntityDialog::<Project>::new();
        d.open_edit(&alpha());
        d.set_field("description", "first").unwrap();
        let intent = d.begin_submit().unwrap();
        assert_eq!(intent.kind, corral_core::ResourceKind::Projects);
        assert!(d.is_submitting());
        assert!(d.begin_submit().is_none());
        assert!(d.set_field("name", "x").is_err());
    }

    #[test]
    fn delete_needs_confirmation() {
        let mut d = EntityDialog::<Task>::new();
        d.open_delete("t1");
        assert!(d.begin_submit().is_none());
        assert!(d.is_open());
        assert_eq!(d.title().as_deref(), Some("Delete Task"));
        let intent = d.confirm().unwrap();
        assert_eq!(intent, MutationIntent::delete(corral_core::ResourceKind::Tasks, "t1"));
    }

    #[test]
    fn failure_reopens_with_values_preserved() {
        let mut d = EntityDialog::<Project>::new();
        d.open_add();
        d.set_field("name", "Beta").unwrap();
        d.begin_submit().unwrap();
        let err = MutationError::Rejected { status: 409, message: "Project name already exists".into() };
        d.resolve(&Err(err.clone()));
        let form = d.form().unwrap();
        assert!(d.is_open());
        assert_eq!(form.draft.name, "Beta");
        assert_eq!(form.failure.as_ref(), Some(&err));

        d.begin_submit().unwrap();
        d.resolve(&Ok(MutationOutcome::Committed(None)));
        assert!(d.is_closed());
    }

    #[test]
    fn cancel_discards_edits() {
        let mut d = EntityDialog::<Project>::new();
        d.open_edit(&alpha());
        d.set_field("name", "Gamma").unwrap();
        d.cancel();
        assert!(d.is_closed());
        d.open_edit(&alpha());
        assert_eq!(d.form().unwrap().draft.name, "Alpha");
    }
}
