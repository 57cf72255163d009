//! Durable sanitize-report artifacts: a one-page PDF and a CSV row.
//!
//! The PDF is emitted by hand, object by object. One page, one base font,
//! one content stream; no codec crate needed for a fixed layout this small.

use diskforge_core::{ForgeError, ReportPaths, SanitizeReport};
use std::fs;
use std::path::Path;

fn pdf_escape(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('(', "\\(")
        .replace(')', "\\)")
}

fn csv_quote(text: &str) -> String {
    format!("\"{}\"", text.replace('"', "\"\""))
}

/// Builds a minimal single-page PDF with one text line per entry.
fn render_pdf(lines: &[String]) -> Vec<u8> {
    let mut content = String::from("BT\n/F1 11 Tf\n72 740 Td\n16 TL\n");
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            content.push_str("T*\n");
        }
        content.push_str(&format!("({}) Tj\n", pdf_escape(line)));
    }
    content.push_str("ET");

    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
         /Resources << /Font << /F1 4 0 R >> >> /Contents 5 0 R >>"
            .to_string(),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
        format!(
            "<< /Length {} >>\nstream\n{}\nendstream",
            content.len(),
            content
        ),
    ];

    let mut pdf = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.push_str(&format!("{} 0 obj\n{}\nendobj\n", i + 1, body));
    }
    let xref_offset = pdf.len();
    pdf.push_str(&format!("xref\n0 {}\n", objects.len() + 1));
    pdf.push_str("0000000000 65535 f \n");
    for offset in offsets {
        pdf.push_str(&format!("{:010} 00000 n \n", offset));
    }
    pdf.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref_offset
    ));
    pdf.into_bytes()
}

/// Writes the PDF and CSV record for one sanitize operation. One pair of
/// files per operation; nothing is ever appended to or rewritten.
pub fn write_report(report: &SanitizeReport, out_dir: &Path) -> Result<ReportPaths, ForgeError> {
    fs::create_dir_all(out_dir)?;
    let base = format!(
        "sanitize-{}-{}",
        report.mode.as_str(),
        report.timestamp.format("%Y%m%dT%H%M%S%3f")
    );

    let lines = vec![
        "Sanitize Operation Report".to_string(),
        String::new(),
        format!("Timestamp: {}", report.timestamp.to_rfc3339()),
        format!("Machine:   {}", report.machine),
        format!("User:      {}", report.user),
        format!("Mode:      {}", report.mode),
        format!("Verified:  {}", if report.verify_ok { "PASS" } else { "FAIL" }),
        format!("Hash:      {}", report.verification_hash),
        format!("Details:   {}", report.details),
    ];
    let pdf_path = out_dir.join(format!("{base}.pdf"));
    fs::write(&pdf_path, render_pdf(&lines))?;

    let csv_path = out_dir.join(format!("{base}.csv"));
    let csv = format!(
        "timestamp,machine,user,mode,verification_hash,verify_ok,details\n{},{},{},{},{},{},{}\n",
        report.timestamp.to_rfc3339(),
        csv_quote(&report.machine),
        csv_quote(&report.user),
        report.mode,
        report.verification_hash,
        report.verify_ok,
        csv_quote(&report.details),
    );
    fs::write(&csv_path, csv)?;

    Ok(ReportPaths {
        pdf: pdf_path,
        csv: csv_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use diskforge_core::SanitizeMode;

    fn sample_report() -> SanitizeReport {
        SanitizeReport {
            timestamp: Utc::now(),
            machine: "test-host".to_string(),
            user: "tester".to_string(),
            mode: SanitizeMode::Nist,
            verification_hash: "abc123".to_string(),
            verify_ok: true,
            details: "sampled 4096 bytes, 0 nonzero".to_string(),
        }
    }

    #[test]
    fn report_writes_pdf_and_csv_with_the_hash() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_report(&sample_report(), dir.path()).unwrap();
        assert!(paths.pdf.exists());
        assert!(paths.csv.exists());

        let csv = fs::read_to_string(&paths.csv).unwrap();
        assert!(csv.contains("abc123"));
        assert!(csv.contains("nist-clear"));

        let pdf = fs::read(&paths.pdf).unwrap();
        assert!(pdf.starts_with(b"%PDF-1.4"));
        assert!(pdf.ends_with(b"%%EOF\n"));
    }

    #[test]
    fn pdf_text_escapes_reserved_characters() {
        let bytes = render_pdf(&["value (raw) \\ test".to_string()]);
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("value \\(raw\\) \\\\ test"));
    }
}
