use crate::backend::DocumentId;
use crate::diary_entry::DiaryEntry;

/// Free-text fields of an entry as the user types them.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EntryForm {
    pub content: String,
    /// Comma-separated; split into a tag list on submit.
    pub tags: String,
}

impl EntryForm {
    pub fn clear(&mut self) {
        self.content.clear();
        self.tags.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty() && self.tags.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditDraft {
    pub id: DocumentId,
    pub form: EntryForm,
}

/// Compose form plus at most one entry being edited.
#[derive(Debug, Default)]
pub struct EntryEditor {
    compose: EntryForm,
    editing: Option<EditDraft>,
}

impl EntryEditor {
    pub fn compose(&self) -> &EntryForm {
        &self.compose
    }

    pub fn compose_mut(&mut self) -> &mut EntryForm {
        &mut self.compose
    }

    pub fn editing(&self) -> Option<&EditDraft> {
        self.editing.as_ref()
    }

    pub fn editing_mut(&mut self) -> Option<&mut EditDraft> {
        self.editing.as_mut()
    }

    pub fn is_editing(&self) -> bool {
        self.editing.is_some()
    }

    /// The edit form while editing, otherwise the compose form.
    pub fn active_form(&self) -> &EntryForm {
        match &self.editing {
            Some(draft) => &draft.form,
            None => &self.compose,
        }
    }

    pub fn active_form_mut(&mut self) -> &mut EntryForm {
        match &mut self.editing {
            Some(draft) => &mut draft.form,
            None => &mut self.compose,
        }
    }

    /// Loads an entry into the edit fields. Any unsaved edit is discarded.
    pub fn begin_edit(&mut self, entry: &DiaryEntry) {
        if let Some(previous) = &self.editing {
            if previous.id != entry.id {
                tracing::debug!(discarded = %previous.id, "unsaved edit replaced");
            }
        }
        self.editing = Some(EditDraft {
            id: entry.id.clone(),
            form: EntryForm {
                content: entry.content.clone(),
                tags: entry.joined_tags(),
            },
        });
    }

    pub fn cancel_edit(&mut self) {
        self.editing = None;
    }

    pub(crate) fn clear_compose(&mut self) {
        self.compose.clear();
    }
}
