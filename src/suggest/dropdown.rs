/// Where a rendered candidate came from. History rows carry a delete
/// affordance in the shell; suggestion rows do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
    History,
    Suggestion,
}

/// One row of the combined dropdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub text: String,
    pub kind: CandidateKind,
}

impl Candidate {
    pub fn history(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: CandidateKind::History,
        }
    }

    pub fn suggestion(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: CandidateKind::Suggestion,
        }
    }
}

/// View-model of the dropdown: the rendered candidate set and the keyboard
/// selection. The shell renders from this and feeds key events back in; it
/// never reads state back out of rendered rows.
#[derive(Debug, Default)]
pub struct DropdownState {
    items: Vec<Candidate>,
    selected: Option<usize>,
    visible: bool,
}

impl DropdownState {
    /// Replace the rendered candidate set. Showing an empty set hides the
    /// dropdown; any previous selection is cleared.
    pub fn show(&mut self, items: Vec<Candidate>) {
        self.visible = !items.is_empty();
        self.items = items;
        self.selected = None;
    }

    /// Hide the dropdown and clear the selection.
    pub fn hide(&mut self) {
        self.visible = false;
        self.selected = None;
        self.items.clear();
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn items(&self) -> &[Candidate] {
        &self.items
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.selected
    }

    /// Currently highlighted candidate, if any.
    pub fn selected(&self) -> Option<&Candidate> {
        self.selected.and_then(|i| self.items.get(i))
    }

    /// Arrow-Down: advance circularly, echoing the selected text so the
    /// shell can mirror it into the input field.
    pub fn select_next(&mut self) -> Option<&str> {
        if self.items.is_empty() {
            return None;
        }

        let next = match self.selected {
            Some(i) => (i + 1) % self.items.len(),
            None => 0,
        };
        self.selected = Some(next);
        Some(&self.items[next].text)
    }

    /// Arrow-Up: retreat circularly, wrapping to the last row from the top.
    pub fn select_previous(&mut self) -> Option<&str> {
        if self.items.is_empty() {
            return None;
        }

        let previous = match self.selected {
            Some(i) if i > 0 => i - 1,
            _ => self.items.len() - 1,
        };
        self.selected = Some(previous);
        Some(&self.items[previous].text)
    }

    /// Any other keystroke clears the highlight without closing the
    /// dropdown.
    pub fn clear_selection(&mut self) {
        self.selected = None;
    }
}
