#![forbid(unsafe_code)]

//! Property tests for content-type editor selection.
//!
//! Validates:
//! - The chosen editor is registered under the longest `/`-segment prefix of
//!   the content type.
//! - With no matching prefix the default editor is chosen.
//! - A prefix that is not on a segment boundary never matches.

use std::cell::RefCell;
use std::rc::Rc;

use knote_app::{AppConfig, ContentEditor, Editor, EditorError, EditorRef};
use knote_tree::{NodeId, Notebook};
use proptest::prelude::*;

/// Editor that only knows its name.
struct Named(String);

impl Editor for Named {
    fn name(&self) -> &str {
        &self.0
    }
    fn set_notebook(&mut self, _: Option<&Notebook>) {}
    fn view_nodes(&mut self, _: &Notebook, _: &[NodeId]) -> Result<(), EditorError> {
        Ok(())
    }
    fn clear_view(&mut self) {}
    fn save(&mut self) -> Result<(), EditorError> {
        Ok(())
    }
    fn save_needed(&self) -> bool {
        false
    }
    fn undo(&mut self) -> Result<bool, EditorError> {
        Ok(false)
    }
    fn redo(&mut self) -> Result<bool, EditorError> {
        Ok(false)
    }
}

fn named(name: &str) -> EditorRef {
    Rc::new(RefCell::new(Named(name.to_string())))
}

fn segment() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("text".to_string()),
        Just("te".to_string()),
        Just("xhtml+xml".to_string()),
        Just("plain".to_string()),
        Just("application".to_string()),
        Just("x-notebook-dir".to_string()),
    ]
}

fn content_type() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(segment(), 1..4)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn longest_segment_prefix_wins(
        registered in prop::collection::vec(content_type(), 0..6),
        wanted in content_type(),
    ) {
        let mut editors = ContentEditor::new(AppConfig::default());
        for segments in &registered {
            let prefix = segments.join("/");
            editors.add_editor(prefix.clone(), named(&prefix));
        }
        editors.set_default_editor(Some(named("<default>")));

        let expected = (1..=wanted.len())
            .rev()
            .map(|n| wanted[..n].join("/"))
            .find(|prefix| registered.iter().any(|r| r.join("/") == *prefix))
            .unwrap_or_else(|| "<default>".to_string());

        let chosen = editors.editor_for(&wanted.join("/")).map(|e| e.borrow().name().to_string());
        prop_assert_eq!(chosen, Some(expected));
    }
}

#[test]
fn partial_segment_does_not_match() {
    let mut editors = ContentEditor::new(AppConfig::default());
    editors.add_editor("te", named("te"));
    assert!(editors.editor_for("text/plain").is_none());
    assert!(editors.editor_for("te/plain").is_some());
}
