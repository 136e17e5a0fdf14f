use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

const BAR_CHARS: &str = "█▓░";
const TICK: Duration = Duration::from_millis(75);

fn styled(pb: ProgressBar, template: &str, label: String) -> ProgressBar {
    if let Ok(style) = ProgressStyle::with_template(template) {
        pb.set_style(style.progress_chars(BAR_CHARS));
    }
    pb.set_prefix(label);
    pb.enable_steady_tick(TICK);
    pb
}

/// Bar over a known number of items (FRs, paths, rows). Unknown totals get a
/// counting spinner; `visible = false` gives a bar that draws nothing.
pub fn count_progress_bar(
    label: impl Into<String>,
    unit_label: &str,
    total_items: Option<u64>,
    visible: bool,
) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    match total_items {
        Some(total) => styled(
            ProgressBar::new(total),
            &format!(
                "{{prefix:.bold.dim}} {{spinner:.green}} [{{elapsed_precise}}] {{wide_bar:.cyan/blue}} {{pos}}/{{len}} {unit_label} ({{eta}}) {{msg}}"
            ),
            label.into(),
        ),
        None => styled(
            ProgressBar::new_spinner(),
            &format!(
                "{{prefix:.bold.dim}} {{spinner:.green}} [{{elapsed_precise}}] {{pos}} {unit_label} {{msg}}"
            ),
            label.into(),
        ),
    }
}

pub fn spinner_progress(label: impl Into<String>, message: impl Into<String>) -> ProgressBar {
    let pb = styled(
        ProgressBar::new_spinner(),
        "{prefix:.bold.dim} {spinner:.green} {msg} [{elapsed_precise}]",
        label.into(),
    );
    pb.set_message(message.into());
    pb
}
