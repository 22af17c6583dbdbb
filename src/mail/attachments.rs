//! PDF attachment extraction from raw messages.

use mail_parser::{MessageParser, MessagePart, MimeHeaders, PartType};
use tracing::debug;

use crate::error::MailError;
use crate::mail::imap::FetchedMessage;

/// A PDF body part ready to be staged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfAttachment {
    /// Declared file name, unsanitized.
    pub name: String,
    /// Decoded payload.
    pub content: Vec<u8>,
}

/// Whether a part is declared as exactly `application/pdf`.
///
/// Parts without a `Content-Type` are `text/plain` and never match.
pub fn is_pdf(part: &MessagePart<'_>) -> bool {
    part.content_type().is_some_and(|ct| {
        ct.ctype().eq_ignore_ascii_case("application")
            && ct.subtype().is_some_and(|s| s.eq_ignore_ascii_case("pdf"))
    })
}

/// Declared name of a part: the `name` Content-Type parameter, falling back
/// to the Content-Disposition `filename`.
fn declared_name(part: &MessagePart<'_>) -> Option<String> {
    part.content_type()
        .and_then(|ct| ct.attribute("name"))
        .or_else(|| {
            part.content_disposition()
                .and_then(|cd| cd.attribute("filename"))
        })
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

/// Extract every PDF part among the direct children of the message's root
/// multipart. Single-part messages carry no attachments.
pub fn extract_pdf_parts(message: &FetchedMessage) -> Result<Vec<PdfAttachment>, MailError> {
    let parsed = MessageParser::default()
        .parse(&message.raw)
        .ok_or(MailError::Parse { seq: message.seq })?;

    let PartType::Multipart(children) = &parsed.root_part().body else {
        debug!(seq = message.seq, "Message is not multipart");
        return Ok(Vec::new());
    };

    let mut attachments = Vec::new();
    for &id in children {
        let Some(part) = parsed.part(id) else {
            continue;
        };
        if !is_pdf(part) {
            continue;
        }
        let name = declared_name(part)
            .ok_or(MailError::MissingAttachmentName { seq: message.seq })?;
        attachments.push(PdfAttachment {
            name,
            content: part.contents().to_vec(),
        });
    }

    Ok(attachments)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(raw: &str) -> FetchedMessage {
        FetchedMessage {
            seq: 7,
            raw: raw.replace('\n', "\r\n").into_bytes(),
        }
    }

    const MIXED: &str = "From: scanner@example.com
To: inbox@example.com
Subject: Scans
MIME-Version: 1.0
Content-Type: multipart/mixed; boundary=\"XYZ\"

--XYZ
Content-Type: text/plain; charset=utf-8

Two scans attached.
--XYZ
Content-Type: application/pdf; name=\"invoice.pdf\"
Content-Transfer-Encoding: base64

JVBERi0xLjQK
--XYZ
Content-Type: image/png; name=\"logo.png\"
Content-Transfer-Encoding: base64

iVBORw0KGgo=
--XYZ
Content-Type: APPLICATION/PDF; name=\"note.pdf\"
Content-Transfer-Encoding: base64

JVBERi0xLjcK
--XYZ--
";

    #[test]
    fn extracts_only_pdf_parts() {
        let parts = extract_pdf_parts(&message(MIXED)).unwrap();
        let names: Vec<_> = parts.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["invoice.pdf", "note.pdf"]);
        assert_eq!(parts[0].content, b"%PDF-1.4\n");
        assert_eq!(parts[1].content, b"%PDF-1.7\n");
    }

    #[test]
    fn unparseable_message_is_error() {
        let empty = FetchedMessage {
            seq: 3,
            raw: Vec::new(),
        };
        assert!(matches!(
            extract_pdf_parts(&empty),
            Err(MailError::Parse { seq: 3 })
        ));
    }

    #[test]
    fn single_part_message_has_no_attachments() {
        let raw = "From: a@example.com
Subject: hi
Content-Type: text/plain

just text
";
        assert!(extract_pdf_parts(&message(raw)).unwrap().is_empty());
    }

    #[test]
    fn multipart_without_pdf_has_no_attachments() {
        let raw = "Subject: pics
Content-Type: multipart/mixed; boundary=\"B\"

--B
Content-Type: text/plain

see attached
--B
Content-Type: application/octet-stream; name=\"scan.pdf\"

binary
--B--
";
        assert!(extract_pdf_parts(&message(raw)).unwrap().is_empty());
    }

    #[test]
    fn nested_multipart_is_not_descended() {
        let raw = "Subject: fwd
Content-Type: multipart/mixed; boundary=\"OUT\"

--OUT
Content-Type: multipart/mixed; boundary=\"IN\"

--IN
Content-Type: application/pdf; name=\"inner.pdf\"

%PDF-inner
--IN--
--OUT
Content-Type: application/pdf; name=\"outer.pdf\"

%PDF-outer
--OUT--
";
        let parts = extract_pdf_parts(&message(raw)).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].name, "outer.pdf");
    }

    #[test]
    fn disposition_filename_fallback() {
        let raw = "Subject: scan
Content-Type: multipart/mixed; boundary=\"B\"

--B
Content-Type: application/pdf
Content-Disposition: attachment; filename=\"receipt.pdf\"

%PDF-1.5
--B--
";
        let parts = extract_pdf_parts(&message(raw)).unwrap();
        assert_eq!(parts[0].name, "receipt.pdf");
    }

    #[test]
    fn pdf_without_name_is_error() {
        let raw = "Subject: scan
Content-Type: multipart/mixed; boundary=\"B\"

--B
Content-Type: application/pdf

%PDF-1.5
--B--
";
        let err = extract_pdf_parts(&message(raw)).unwrap_err();
        assert!(matches!(err, MailError::MissingAttachmentName { seq: 7 }));
    }
}
