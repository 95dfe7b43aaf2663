//! PDF rendering of an [`IntelligenceReport`] with its conversation history.
//!
//! Uses the PDF standard Type1 fonts with WinAnsi encoding, so no font files
//! are embedded. Text is wrapped on an estimated glyph width and flows onto
//! new A4 pages as needed.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use tracing::debug;

use crate::models::{AgentMessage, IntelligenceReport};
use crate::types::{AppError, AppResult};

const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 50.0;
/// Average Helvetica glyph width as a fraction of the font size.
const GLYPH_WIDTH: f32 = 0.55;
const LINE_SPACING: f32 = 1.35;

const TITLE_SIZE: f32 = 20.0;
const HEADING_SIZE: f32 = 14.0;
const BODY_SIZE: f32 = 11.0;
const SMALL_SIZE: f32 = 10.0;

#[derive(Debug, Clone, Copy)]
enum Font {
    Regular,
    Bold,
    Italic,
}

impl Font {
    fn resource(self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
            Font::Italic => "F3",
        }
    }
}

/// Maps text onto the WinAnsi subset shared with Latin-1. Typographic
/// punctuation is folded to ASCII; anything else outside the set becomes `?`.
fn to_win_ansi(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{2032}' => out.push(b'\''),
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{2033}' => out.push(b'"'),
            '\u{2013}' | '\u{2014}' | '\u{2212}' => out.push(b'-'),
            '\u{2022}' | '\u{00B7}' => out.push(b'*'),
            '\u{2026}' => out.extend_from_slice(b"..."),
            '\t' => out.push(b' '),
            c if (c as u32) < 0x20 => {}
            c if (0x80..=0x9F).contains(&(c as u32)) => out.push(b'?'),
            c if (c as u32) <= 0xFF => out.push(c as u32 as u8),
            _ => out.push(b'?'),
        }
    }
    out
}

/// Greedy word wrap to `max_chars`; words longer than a line are split.
fn wrap(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut line = String::new();
        let mut line_len = 0;
        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > max_chars {
                if line_len > 0 {
                    lines.push(std::mem::take(&mut line));
                    line_len = 0;
                }
                let rest = word.split_off(max_chars);
                lines.push(word.into_iter().collect());
                word = rest;
            }
            let needed = if line_len == 0 { word.len() } else { line_len + 1 + word.len() };
            if needed > max_chars {
                lines.push(std::mem::take(&mut line));
                line_len = 0;
            }
            if line_len > 0 {
                line.push(' ');
                line_len += 1;
            }
            line.extend(word.iter());
            line_len += word.len();
        }
        lines.push(line);
    }
    lines
}

struct Layout {
    pages: Vec<Vec<Operation>>,
    current: Vec<Operation>,
    y: f32,
}

impl Layout {
    fn new() -> Self {
        Self {
            pages: Vec::new(),
            current: Vec::new(),
            y: PAGE_HEIGHT - MARGIN,
        }
    }

    fn break_page(&mut self) {
        self.pages.push(std::mem::take(&mut self.current));
        self.y = PAGE_HEIGHT - MARGIN;
    }

    fn ensure_room(&mut self, height: f32) {
        if self.y - height < MARGIN && !self.current.is_empty() {
            self.break_page();
        }
    }

    fn line(&mut self, text: &str, font: Font, size: f32, indent: f32) {
        let leading = size * LINE_SPACING;
        self.ensure_room(leading);
        self.y -= leading;
        self.current.extend([
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![font.resource().into(), size.into()]),
            Operation::new("Td", vec![(MARGIN + indent).into(), self.y.into()]),
            Operation::new("Tj", vec![Object::string_literal(to_win_ansi(text))]),
            Operation::new("ET", vec![]),
        ]);
    }

    fn paragraph(&mut self, text: &str, font: Font, size: f32, indent: f32) {
        let usable = PAGE_WIDTH - 2.0 * MARGIN - indent;
        let max_chars = (usable / (size * GLYPH_WIDTH)) as usize;
        for line in wrap(text, max_chars) {
            self.line(&line, font, size, indent);
        }
    }

    fn heading(&mut self, text: &str) {
        self.space(10.0);
        // keep a heading on the same page as its first body line
        self.ensure_room(HEADING_SIZE * LINE_SPACING + BODY_SIZE * LINE_SPACING);
        self.line(text, Font::Bold, HEADING_SIZE, 0.0);
        self.space(4.0);
    }

    fn space(&mut self, height: f32) {
        self.y -= height;
    }

    fn finish(mut self) -> Vec<Vec<Operation>> {
        if !self.current.is_empty() || self.pages.is_empty() {
            self.pages.push(self.current);
        }
        self.pages
    }
}

fn percent(score: f64) -> String {
    format!("{:.0}%", score.clamp(0.0, 1.0) * 100.0)
}

fn lay_out(report: &IntelligenceReport, history: &[AgentMessage]) -> Vec<Vec<Operation>> {
    let mut layout = Layout::new();
    let meta = &report.metadata;

    layout.line("Intelligence Report", Font::Bold, TITLE_SIZE, 0.0);
    layout.line(
        &format!("Session ID: {}", report.session_id),
        Font::Regular,
        SMALL_SIZE,
        0.0,
    );

    layout.heading("Executive Summary");
    layout.paragraph(&report.executive_summary, Font::Regular, BODY_SIZE, 0.0);

    layout.heading("Key Findings");
    if report.key_findings.is_empty() {
        layout.paragraph("No key findings recorded.", Font::Italic, BODY_SIZE, 0.0);
    }
    for (i, finding) in report.key_findings.iter().enumerate() {
        layout.paragraph(
            &format!("{}. {}", i + 1, finding.finding),
            Font::Regular,
            BODY_SIZE,
            0.0,
        );
        let mut details = format!("Confidence: {}", percent(finding.confidence_score));
        if !finding.significance.is_empty() {
            details.push_str(&format!(" | Significance: {}", finding.significance));
        }
        if !finding.supporting_evidence.is_empty() {
            details.push_str(&format!(" | Sources: {}", finding.supporting_evidence.join(", ")));
        }
        layout.paragraph(&details, Font::Italic, SMALL_SIZE, 14.0);
    }

    if !meta.entity_profiles.is_empty() {
        layout.heading("Target Entity Profiles");
        for profile in &meta.entity_profiles {
            let title = if profile.entity_type.is_empty() {
                profile.entity_name.clone()
            } else {
                format!("{} ({})", profile.entity_name, profile.entity_type)
            };
            layout.paragraph(&title, Font::Bold, BODY_SIZE, 0.0);
            if !profile.profile_summary.is_empty() {
                layout.paragraph(&profile.profile_summary, Font::Regular, BODY_SIZE, 14.0);
            }
            if !profile.relationships.is_empty() {
                layout.paragraph(
                    &format!("Relationships: {}", profile.relationships.join("; ")),
                    Font::Regular,
                    SMALL_SIZE,
                    14.0,
                );
            }
        }
    }

    layout.heading("Identified Intelligence Gaps");
    if meta.remaining_gaps.is_empty() {
        layout.paragraph("No outstanding gaps recorded.", Font::Italic, BODY_SIZE, 0.0);
    }
    for gap in &meta.remaining_gaps {
        let mut text = format!("- {}", gap.gap_description);
        if !gap.priority.is_empty() {
            text.push_str(&format!(" [{}]", gap.priority));
        }
        layout.paragraph(&text, Font::Regular, BODY_SIZE, 0.0);
        if !gap.recommended_approach.is_empty() {
            layout.paragraph(&gap.recommended_approach, Font::Italic, SMALL_SIZE, 14.0);
        }
    }

    if !meta.strategic_recommendations.is_empty() {
        layout.heading("Recommendations");
        for rec in &meta.strategic_recommendations {
            let mut text = format!("- {}", rec.recommendation);
            if !rec.priority.is_empty() {
                text.push_str(&format!(" [{}]", rec.priority));
            }
            layout.paragraph(&text, Font::Regular, BODY_SIZE, 0.0);
            if !rec.rationale.is_empty() {
                layout.paragraph(&rec.rationale, Font::Italic, SMALL_SIZE, 14.0);
            }
        }
    }

    layout.heading("Assessment & Metadata");
    layout.line(
        &format!("Overall Confidence Score: {}", percent(report.confidence_score)),
        Font::Regular,
        BODY_SIZE,
        0.0,
    );
    layout.line(
        &format!("Total Evidence Items: {}", report.evidence_count),
        Font::Regular,
        BODY_SIZE,
        0.0,
    );
    if let Some(quality) = &meta.intelligence_assessment.information_quality {
        layout.line(&format!("Information Quality: {}", quality), Font::Regular, BODY_SIZE, 0.0);
    }
    layout.line(
        &format!(
            "Report Generated At: {}",
            report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        Font::Regular,
        BODY_SIZE,
        0.0,
    );
    if let Some(limitations) = &meta.limitations {
        layout.paragraph(limitations, Font::Italic, SMALL_SIZE, 0.0);
    }

    layout.heading("Conversation History");
    if history.is_empty() {
        layout.paragraph(
            "(Conversation history not available in this report extract)",
            Font::Italic,
            SMALL_SIZE,
            0.0,
        );
    }
    for message in history {
        layout.space(4.0);
        layout.paragraph(
            &format!(
                "{} ({})",
                message.agent_name,
                message.timestamp.format("%Y-%m-%d %H:%M:%S")
            ),
            Font::Bold,
            SMALL_SIZE,
            0.0,
        );
        layout.paragraph(&message.message, Font::Regular, SMALL_SIZE, 0.0);
    }

    layout.finish()
}

fn font(doc: &mut Document, base: &str) -> ObjectId {
    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => base,
        "Encoding" => "WinAnsiEncoding",
    })
}

/// Renders the report and transcript to PDF bytes.
pub fn render_report_pdf(report: &IntelligenceReport, history: &[AgentMessage]) -> AppResult<Vec<u8>> {
    let pages = lay_out(report, history);

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let regular = font(&mut doc, "Helvetica");
    let bold = font(&mut doc, "Helvetica-Bold");
    let italic = font(&mut doc, "Helvetica-Oblique");
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular,
            "F2" => bold,
            "F3" => italic,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for operations in pages {
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let page_count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| AppError::Internal(format!("Failed to write PDF: {}", e)))?;

    debug!(
        session_id = %report.session_id,
        pages = page_count,
        size = bytes.len(),
        "Rendered report PDF"
    );
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{KeyFinding, MessageType, RemainingGap, ReportMetadata};
    use chrono::Utc;
    use uuid::Uuid;

    fn report() -> IntelligenceReport {
        IntelligenceReport {
            session_id: Uuid::new_v4(),
            executive_summary: "Acme Corp is controlled by Globex \u{2014} via a \u{201C}holding\u{201D} company.".to_string(),
            key_findings: vec![KeyFinding {
                finding: "Globex owns 60% of Acme Corp".to_string(),
                confidence_score: 0.85,
                supporting_evidence: vec!["user_interview".to_string()],
                significance: "high".to_string(),
            }],
            confidence_score: 0.72,
            evidence_count: 3,
            generated_at: Utc::now(),
            metadata: ReportMetadata {
                remaining_gaps: vec![RemainingGap {
                    gap_description: "Identity of second shareholder".to_string(),
                    priority: "high".to_string(),
                    recommended_approach: String::new(),
                }],
                generation_method: "llm".to_string(),
                ..ReportMetadata::default()
            },
        }
    }

    #[test]
    fn test_win_ansi_folding() {
        assert_eq!(to_win_ansi("\u{201C}caf\u{e9}\u{201D} \u{2014} ok\u{2026}"), b"\"caf\xe9\" - ok...".to_vec());
        assert_eq!(to_win_ansi("\u{4e2d}"), b"?".to_vec());
        assert_eq!(to_win_ansi("\u{0085}"), b"?".to_vec());
    }

    #[test]
    fn test_wrap_respects_width() {
        let lines = wrap("the quick brown fox jumps over the lazy dog", 10);
        assert!(lines.iter().all(|l| l.chars().count() <= 10));
        assert_eq!(lines.join(" "), "the quick brown fox jumps over the lazy dog");

        let lines = wrap("abcdefghijklmnopqrstuvwxyz", 10);
        assert_eq!(lines, vec!["abcdefghij", "klmnopqrst", "uvwxyz"]);
    }

    #[test]
    fn test_renders_single_page_report() {
        let bytes = render_report_pdf(&report(), &[]).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));

        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn test_long_history_paginates() {
        let history: Vec<AgentMessage> = (0..120)
            .map(|i| {
                AgentMessage::new(
                    "Retrieval Agent",
                    format!("Question {} about the ownership structure of Acme Corp and its subsidiaries?", i),
                    MessageType::Question,
                )
            })
            .collect();

        let bytes = render_report_pdf(&report(), &history).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        assert!(doc.get_pages().len() > 1);
    }
}
