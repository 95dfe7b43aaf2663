// Report export

pub mod pdf;

pub use pdf::render_report_pdf;

/// Attachment file name used by both the API and the frontend download.
pub fn report_file_name(session_id: uuid::Uuid) -> String {
    format!("report_{}.pdf", session_id)
}
