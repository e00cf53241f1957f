//! Date-plan renderers.

use std::fmt::Write;

use chrono::{DateTime, Local};

use super::request::DatePlanRequest;

const UNSPECIFIED: &str = "未指定";
const GIFT_STATUS_PENDING: &str = "待购买";

/// Turns a decoded request into document bytes.
pub trait DocumentRenderer: Send + Sync {
    /// File extension without the dot.
    fn extension(&self) -> &'static str;

    /// MIME type served on download.
    fn content_type(&self) -> &'static str;

    fn render(&self, request: &DatePlanRequest, generated_at: DateTime<Local>) -> Vec<u8>;
}

/// Renders plans as Markdown with one table per section.
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkdownRenderer;

impl DocumentRenderer for MarkdownRenderer {
    fn extension(&self) -> &'static str {
        "md"
    }

    fn content_type(&self) -> &'static str {
        "text/markdown; charset=utf-8"
    }

    fn render(&self, request: &DatePlanRequest, generated_at: DateTime<Local>) -> Vec<u8> {
        let mut out = String::new();
        let r = &request.restaurant;

        // Writing to a String cannot fail.
        let _ = writeln!(out, "# {}\n", request.title);
        let _ = writeln!(
            out,
            "生成时间: {}\n",
            generated_at.format("%Y年%m月%d日 %H:%M")
        );

        out.push_str("## 🍽️ 餐厅预订信息\n\n| 项目 | 内容 |\n| --- | --- |\n");
        for (label, value) in [
            ("餐厅名称", &r.name),
            ("预订时间", &r.time),
            ("餐厅地址", &r.address),
            ("联系电话", &r.phone),
        ] {
            let _ = writeln!(out, "| {label} | {} |", cell(or_default(value, UNSPECIFIED)));
        }

        out.push_str("\n## 📅 活动流程安排\n\n| 时间 | 活动内容 | 地点 |\n| --- | --- | --- |\n");
        for entry in &request.schedule {
            let _ = writeln!(
                out,
                "| {} | {} | {} |",
                cell(&entry.time),
                cell(&entry.activity),
                cell(&entry.location)
            );
        }

        out.push_str("\n## 🎁 礼物清单\n\n| 礼物名称 | 预算/价格 | 状态 |\n| --- | --- | --- |\n");
        for gift in &request.gifts {
            let _ = writeln!(
                out,
                "| {} | {} | {} |",
                cell(&gift.name),
                cell(&gift.price),
                cell(or_default(&gift.status, GIFT_STATUS_PENDING))
            );
        }

        if !request.notes.trim().is_empty() {
            let _ = write!(out, "\n## 📝 温馨提示\n\n{}\n", request.notes.trim());
        }

        out.into_bytes()
    }
}

fn or_default<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.trim().is_empty() { default } else { value }
}

/// Keep table cells on one line and out of the column syntax.
fn cell(value: &str) -> String {
    value.replace('|', "\\|").replace(['\r', '\n'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::request::{GiftEntry, Restaurant, ScheduleEntry};

    fn render(request: &DatePlanRequest) -> String {
        String::from_utf8(MarkdownRenderer.render(request, Local::now())).unwrap()
    }

    #[test]
    fn fills_placeholders_for_missing_fields() {
        let out = render(&DatePlanRequest {
            title: "周末约会".to_string(),
            gifts: vec![GiftEntry {
                name: "香水".to_string(),
                price: "300元".to_string(),
                status: String::new(),
            }],
            ..Default::default()
        });

        assert!(out.starts_with("# 周末约会\n"));
        assert!(out.contains("| 餐厅名称 | 未指定 |"));
        assert!(out.contains("| 香水 | 300元 | 待购买 |"));
        assert!(!out.contains("温馨提示"));
    }

    #[test]
    fn renders_all_sections() {
        let out = render(&DatePlanRequest {
            title: "七夕".to_string(),
            restaurant: Restaurant {
                name: "花园餐厅".to_string(),
                ..Default::default()
            },
            schedule: vec![ScheduleEntry {
                time: "14:00".to_string(),
                activity: "看电影 | IMAX".to_string(),
                location: "万达".to_string(),
            }],
            gifts: Vec::new(),
            notes: "别迟到".to_string(),
        });

        assert!(out.contains("| 餐厅名称 | 花园餐厅 |"));
        assert!(out.contains("| 14:00 | 看电影 \\| IMAX | 万达 |"));
        assert!(out.contains("## 📝 温馨提示\n\n别迟到"));
    }
}
