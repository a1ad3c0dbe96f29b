use crate::pipeline::SearchState;
use crate::wikipedia::ResultItem;

/// Line printed in place of the dropdown while it is hidden.
pub const HIDDEN_DROPDOWN: &str = "(no results)";

pub fn render_dropdown(state: &SearchState) -> String {
    if !state.has_results {
        return format!("{HIDDEN_DROPDOWN}\n");
    }
    let mut output = match &state.term {
        Some(term) => format!("Results for [{}]:\n", single_line(term)),
        None => String::new(),
    };
    output.push_str(&render_results(&state.results));
    output
}

pub fn render_results(results: &[ResultItem]) -> String {
    if results.is_empty() {
        return format!("{HIDDEN_DROPDOWN}\n");
    }
    results
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{:>2}. {} ({})\n", i + 1, single_line(&item.title), item.url))
        .collect()
}

/// Titles and terms come from the network and the user; keep each entry on one line.
fn single_line(s: &str) -> String {
    s.chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect()
}
