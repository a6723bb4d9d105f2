use shared::domain::{GenerationResult, FULL_TEXT_TAB, TAB_LABELS};

pub const TAB_COUNT: usize = TAB_LABELS.len();

const ACTIVE_TAB_CLASS: &str =
    "border-blue-500 text-blue-600 dark:border-blue-400 dark:text-blue-400";
const INACTIVE_TAB_CLASS: &str =
    "border-transparent text-white hover:text-gray-700 dark:hover:text-gray-300";

/// Text shown under `tab_index`. Sections the server did not emit, and
/// indices past the last tab, resolve to an empty string.
pub fn resolve(tab_index: usize, result: &GenerationResult) -> &str {
    if tab_index == FULL_TEXT_TAB {
        return &result.output_summary;
    }
    label(tab_index)
        .and_then(|label| result.section(label))
        .unwrap_or("")
}

pub fn label(tab_index: usize) -> Option<&'static str> {
    TAB_LABELS.get(tab_index).copied()
}

pub fn index_of(label: &str) -> Option<usize> {
    TAB_LABELS.iter().position(|candidate| *candidate == label)
}

pub fn style_class(tab_index: usize, active_tab: usize) -> &'static str {
    if tab_index == active_tab {
        ACTIVE_TAB_CLASS
    } else {
        INACTIVE_TAB_CLASS
    }
}

#[cfg(test)]
#[path = "tests/tabs_tests.rs"]
mod tests;
