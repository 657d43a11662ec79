use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar in the house style; `unit` names what is being counted.
pub fn progress_bar(len: u64, unit: &str, message: &'static str) -> ProgressBar {
    let template = format!(
        "[{{bar:40.green/blue}}] {{pos}}/{{len}} {} ({{percent}}%) {{msg}}",
        unit
    );
    let style = ProgressStyle::default_bar()
        .template(&template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("▉▊▋▌▍▎▏ ");

    let pb = ProgressBar::new(len);
    pb.set_style(style);
    pb.set_message(message);
    pb
}
