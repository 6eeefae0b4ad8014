//! The `datastar-patch-elements` and `datastar-patch-signals` events.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::defaults::{
    self, ELEMENTS_DATALINE, MODE_DATALINE, ONLY_IF_MISSING_DATALINE, SELECTOR_DATALINE,
    SIGNALS_DATALINE, USE_VIEW_TRANSITION_DATALINE,
};
use crate::encoder::{encode, split_lines, EventOptions, EventType, Frame};
use crate::Error;

/// The mode in which elements are patched into the DOM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchMode {
    /// Morph the entire element, preserving state.
    #[default]
    Outer,
    /// Morph the inner HTML only, preserving state.
    Inner,
    /// Replace the entire element, resetting state.
    Replace,
    /// Insert at the end inside the target.
    Append,
    /// Insert at the beginning inside the target.
    Prepend,
    /// Insert before the target element.
    Before,
    /// Insert after the target element.
    After,
    /// Remove the target element from the DOM.
    Remove,
}

impl PatchMode {
    pub const ALL: [PatchMode; 8] = [
        PatchMode::Outer,
        PatchMode::Inner,
        PatchMode::Replace,
        PatchMode::Append,
        PatchMode::Prepend,
        PatchMode::Before,
        PatchMode::After,
        PatchMode::Remove,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PatchMode::Outer => "outer",
            PatchMode::Inner => "inner",
            PatchMode::Replace => "replace",
            PatchMode::Append => "append",
            PatchMode::Prepend => "prepend",
            PatchMode::Before => "before",
            PatchMode::After => "after",
            PatchMode::Remove => "remove",
        }
    }
}

impl fmt::Display for PatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PatchMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PatchMode::ALL
            .iter()
            .copied()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| Error::InvalidPatchMode(s.to_string()))
    }
}

/// Options of a `datastar-patch-elements` event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchElementsOptions {
    /// CSS selector of the patch target. Without it, elements are matched by id.
    pub selector: Option<String>,
    pub mode: PatchMode,
    pub use_view_transition: bool,
    pub event: EventOptions,
}

impl PatchElementsOptions {
    /// Options removing whatever matches `selector`.
    pub fn remove(selector: impl Into<String>) -> Self {
        Self::default()
            .with_mode(PatchMode::Remove)
            .with_selector(selector)
    }

    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    pub fn with_mode(mut self, mode: PatchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the mode from its wire name, e.g. as received from a client.
    pub fn try_with_mode(self, mode: &str) -> Result<Self, Error> {
        Ok(self.with_mode(mode.parse()?))
    }

    pub fn with_view_transition(mut self, use_view_transition: bool) -> Self {
        self.use_view_transition = use_view_transition;
        self
    }

    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event = self.event.with_event_id(event_id);
        self
    }

    pub fn with_retry_duration(mut self, millis: u64) -> Self {
        self.event = self.event.with_retry_duration(millis);
        self
    }

    fn selector(&self) -> Option<&str> {
        self.selector.as_deref().filter(|s| !s.is_empty())
    }

    fn option_lines(&self) -> Vec<(&'static str, String)> {
        let mut options = Vec::with_capacity(3);
        if let Some(selector) = self.selector() {
            options.push((SELECTOR_DATALINE, selector.to_string()));
        }
        options.push((MODE_DATALINE, self.mode.to_string()));
        options.push((
            USE_VIEW_TRANSITION_DATALINE,
            self.use_view_transition.to_string(),
        ));
        defaults::normalize(options)
    }
}

/// Options of a `datastar-patch-signals` event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchSignalsOptions {
    /// Only set signals the client does not have yet.
    pub only_if_missing: bool,
    pub event: EventOptions,
}

impl PatchSignalsOptions {
    pub fn with_only_if_missing(mut self, only_if_missing: bool) -> Self {
        self.only_if_missing = only_if_missing;
        self
    }

    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event = self.event.with_event_id(event_id);
        self
    }

    pub fn with_retry_duration(mut self, millis: u64) -> Self {
        self.event = self.event.with_retry_duration(millis);
        self
    }

    fn option_lines(&self) -> Vec<(&'static str, String)> {
        defaults::normalize(vec![(
            ONLY_IF_MISSING_DATALINE,
            self.only_if_missing.to_string(),
        )])
    }
}

fn option_data<'a>(options: &'a [(&'static str, String)]) -> impl Iterator<Item = String> + 'a {
    options
        .iter()
        .flat_map(|(keyword, value)| split_lines(keyword, value))
}

/// Build a `datastar-patch-elements` frame.
///
/// `elements` may only be blank when removing by selector.
pub fn patch_elements(elements: &str, options: &PatchElementsOptions) -> Result<Frame, Error> {
    let remove_by_selector = options.mode == PatchMode::Remove && options.selector().is_some();
    let blank = elements.trim().is_empty();
    if blank && !remove_by_selector {
        return Err(Error::MissingRequiredField(ELEMENTS_DATALINE));
    }

    let opts = options.option_lines();
    let mut data: Vec<String> = option_data(&opts).collect();
    if !blank {
        data.extend(split_lines(ELEMENTS_DATALINE, elements));
    }

    Ok(encode(EventType::PatchElements, data, &options.event))
}

/// Build a `datastar-patch-signals` frame from JSON text.
pub fn patch_signals(signals: &str, options: &PatchSignalsOptions) -> Result<Frame, Error> {
    if signals.trim().is_empty() {
        return Err(Error::MissingRequiredField(SIGNALS_DATALINE));
    }

    let opts = options.option_lines();
    let data = option_data(&opts).chain(split_lines(SIGNALS_DATALINE, signals));

    Ok(encode(EventType::PatchSignals, data, &options.event))
}

/// Build a `datastar-patch-signals` frame from any serializable value.
pub fn patch_signals_value<T>(signals: &T, options: &PatchSignalsOptions) -> Result<Frame, Error>
where
    T: Serialize + ?Sized,
{
    let json = serde_json::to_string(signals)?;
    patch_signals(&json, options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_every_mode() {
        for mode in PatchMode::ALL.iter() {
            assert_eq!(mode.as_str().parse::<PatchMode>().unwrap(), *mode);
        }
    }

    #[test]
    fn default_mode_matches_defaults_table() {
        assert_eq!(
            defaults::default_for(MODE_DATALINE),
            Some(PatchMode::default().as_str())
        );
    }

    #[test]
    fn option_order() {
        let frame = patch_elements(
            "<li>x</li>",
            &PatchElementsOptions::default()
                .with_selector("#chat")
                .with_mode(PatchMode::Append)
                .with_view_transition(true),
        )
        .unwrap();
        let data: Vec<_> = frame.data_values().collect();
        assert_eq!(
            data,
            vec![
                "selector #chat",
                "mode append",
                "useViewTransition true",
                "elements <li>x</li>"
            ]
        );
    }

    #[test]
    fn empty_selector_does_not_allow_blank_remove() {
        let opts = PatchElementsOptions::remove("");
        assert!(matches!(
            patch_elements("", &opts),
            Err(Error::MissingRequiredField("elements"))
        ));
    }
}
