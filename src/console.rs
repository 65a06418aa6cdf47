use crate::controller::View;
use crate::models::Metadata;
use crate::progress::ProgressView;

const BAR_WIDTH: usize = 30;

/// Terminal rendering of the progress panel. Only prints on change.
#[derive(Default)]
pub struct ConsoleView {
    last_line: String,
}

impl ConsoleView {
    fn print_line(&mut self, line: String) {
        if line != self.last_line {
            println!("{line}");
            self.last_line = line;
        }
    }
}

fn bar(percent: f32) -> String {
    let filled = ((percent.clamp(0.0, 100.0) / 100.0) * BAR_WIDTH as f32).round() as usize;
    format!("[{}{}]", "#".repeat(filled), "-".repeat(BAR_WIDTH - filled))
}

impl View for ConsoleView {
    fn set_input(&mut self, url: &str) {
        println!("URL: {url}");
    }

    fn show_metadata(&mut self, metadata: &Metadata) {
        let title = metadata.title.as_deref().unwrap_or("(untitled)");
        match &metadata.uploader {
            Some(uploader) => println!("{title} ({uploader})"),
            None => println!("{title}"),
        }
        if let Some(thumbnail) = &metadata.thumbnail {
            println!("thumbnail: {thumbnail}");
        }
    }

    fn set_progress_visible(&mut self, _visible: bool) {}

    fn render_progress(&mut self, progress: &ProgressView) {
        let mut line = progress.label.clone();

        if let Some(percent) = progress.bar_percent {
            line = format!("{line} {}", bar(percent));
        }

        if let Some(detail) = &progress.detail {
            line = format!("{line} {detail}");
        }

        self.print_line(line);
    }

    fn reset_progress(&mut self) {
        self.last_line.clear();
    }

    fn set_submit_enabled(&mut self, _enabled: bool) {}

    fn set_retrieval(&mut self, url: Option<&str>) {
        if let Some(url) = url {
            println!("ready: {url}");
        }
    }

    fn show_message(&mut self, message: &str) {
        eprintln!("{message}");
    }
}
