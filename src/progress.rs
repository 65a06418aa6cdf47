use regex::Regex;
use std::sync::OnceLock;

use crate::models::ProgressSnapshot;

const MISSING: &str = "--";

/// What one snapshot changes on the progress panel. `None` leaves the
/// current value on screen.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressView {
    pub label: String,
    pub detail: Option<String>,
    pub bar_percent: Option<f32>,
}

pub fn status_label(snapshot: &ProgressSnapshot) -> String {
    match snapshot {
        ProgressSnapshot::Preparing => "準備中...".to_owned(),
        ProgressSnapshot::Downloading { .. } => "下載中...".to_owned(),
        ProgressSnapshot::Processing => "處理中...".to_owned(),
        ProgressSnapshot::Completed { .. } => "完成！".to_owned(),
        ProgressSnapshot::Error { .. } => "錯誤".to_owned(),
        ProgressSnapshot::Other(status) => status.clone(),
    }
}

/// Leading decimal number of `text`, ignoring any trailing unit such as `%`.
/// Anything unparsable counts as zero.
pub fn parse_percent(text: &str) -> f32 {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?").expect("static regex")
    });

    re.find(text.trim_start())
        .and_then(|m| m.as_str().parse::<f32>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

pub fn render(snapshot: &ProgressSnapshot) -> ProgressView {
    let label = status_label(snapshot);

    match snapshot {
        ProgressSnapshot::Downloading {
            progress,
            speed,
            eta,
        } => {
            let progress = progress.as_deref().unwrap_or(MISSING);
            ProgressView {
                label,
                detail: Some(format!(
                    "{} | 速度: {} | 剩餘: {}",
                    progress,
                    speed.as_deref().unwrap_or(MISSING),
                    eta.as_deref().unwrap_or(MISSING),
                )),
                bar_percent: Some(parse_percent(progress)),
            }
        }
        ProgressSnapshot::Processing => ProgressView {
            label,
            detail: Some("正在轉換格式...".to_owned()),
            bar_percent: Some(100.0),
        },
        ProgressSnapshot::Completed { title } => ProgressView {
            label,
            detail: Some(title.clone().unwrap_or_default()),
            bar_percent: Some(100.0),
        },
        ProgressSnapshot::Preparing | ProgressSnapshot::Error { .. } | ProgressSnapshot::Other(_) => {
            ProgressView {
                label,
                detail: None,
                bar_percent: None,
            }
        }
    }
}
