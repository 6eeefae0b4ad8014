//! Protocol constants and the option normalizer.
//!
//! The Datastar client assumes a default value for every option that is not
//! present in an event. Options equal to that default are therefore never
//! written to the wire, and a reader must treat a missing option as its
//! default.

/// Retry duration (in milliseconds) the browser uses when none is sent.
pub const DEFAULT_RETRY_DURATION_MS: u64 = 1000;

/// Name of the query parameter (or form field) carrying client signals.
pub const SIGNALS_PARAM: &str = "datastar";

pub const SELECTOR_DATALINE: &str = "selector";
pub const MODE_DATALINE: &str = "mode";
pub const USE_VIEW_TRANSITION_DATALINE: &str = "useViewTransition";
pub const ELEMENTS_DATALINE: &str = "elements";
pub const SIGNALS_DATALINE: &str = "signals";
pub const ONLY_IF_MISSING_DATALINE: &str = "onlyIfMissing";

/// Option keyword and the wire value the client assumes when it is absent.
pub static OPTION_DEFAULTS: &[(&str, &str)] = &[
    (MODE_DATALINE, "outer"),
    (USE_VIEW_TRANSITION_DATALINE, "false"),
    (ONLY_IF_MISSING_DATALINE, "false"),
];

/// The default wire value of an option, if the protocol defines one.
pub fn default_for(keyword: &str) -> Option<&'static str> {
    OPTION_DEFAULTS
        .iter()
        .find(|(key, _)| *key == keyword)
        .map(|(_, value)| *value)
}

/// Returns true if `value` is what the client would assume anyway.
pub fn is_default(keyword: &str, value: &str) -> bool {
    default_for(keyword).map_or(false, |default| default == value)
}

/// Drop every option whose value equals its protocol default.
///
/// Order of the remaining options is preserved.
pub fn normalize<I>(options: I) -> Vec<(&'static str, String)>
where
    I: IntoIterator<Item = (&'static str, String)>,
{
    options
        .into_iter()
        .filter(|(keyword, value)| {
            let keep = !is_default(keyword, value);
            if !keep {
                trace!("omitting default option {} {}", keyword, value);
            }
            keep
        })
        .collect()
}
