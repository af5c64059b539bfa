//! Outbound message representation and RFC 2822 rendering.

/// One ready-to-send email: tracking rewrites already applied, addressed to a
/// single recipient.
#[derive(Debug, Clone)]
pub struct OutboundEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html_body: String,
    /// Optional plain-text alternative; when present the message renders as
    /// multipart/alternative.
    pub text_body: Option<String>,
    pub reply_to: Option<String>,
    /// Extra headers (e.g. `List-Unsubscribe`).
    pub headers: Vec<(String, String)>,
}

impl OutboundEmail {
    #[must_use]
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        subject: impl Into<String>,
        html_body: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            subject: subject.into(),
            html_body: html_body.into(),
            text_body: None,
            reply_to: None,
            headers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// A locally generated `Message-ID` value for this send, also used as the
    /// provider reference when the backend does not return one of its own.
    #[must_use]
    pub fn local_message_id(&self) -> String {
        let domain = self.from.rsplit('@').next().unwrap_or("localhost");
        format!("<{}@{domain}>", ulid::Ulid::new())
    }

    /// Render the full RFC 2822 message, CRLF line endings throughout.
    #[must_use]
    pub fn to_rfc2822(&self, message_id: &str) -> String {
        let mut out = String::with_capacity(self.html_body.len() + 512);

        let date = chrono::Utc::now().to_rfc2822();
        push_header(&mut out, "From", &self.from);
        push_header(&mut out, "To", &self.to);
        if let Some(reply_to) = &self.reply_to {
            push_header(&mut out, "Reply-To", reply_to);
        }
        push_header(&mut out, "Subject", &self.subject);
        push_header(&mut out, "Date", &date);
        push_header(&mut out, "Message-ID", message_id);
        push_header(&mut out, "MIME-Version", "1.0");
        for (name, value) in &self.headers {
            push_header(&mut out, name, value);
        }

        match &self.text_body {
            Some(text) => {
                // Derive the boundary from the message id so it cannot occur
                // in either body by accident.
                let boundary = format!(
                    "=_courier_{}",
                    message_id
                        .trim_matches(['<', '>'])
                        .split('@')
                        .next()
                        .unwrap_or("part")
                );
                push_header(
                    &mut out,
                    "Content-Type",
                    &format!("multipart/alternative; boundary=\"{boundary}\""),
                );
                out.push_str("\r\n");

                out.push_str(&format!("--{boundary}\r\n"));
                push_header(&mut out, "Content-Type", "text/plain; charset=\"UTF-8\"");
                out.push_str("\r\n");
                push_body(&mut out, text);

                out.push_str(&format!("--{boundary}\r\n"));
                push_header(&mut out, "Content-Type", "text/html; charset=\"UTF-8\"");
                out.push_str("\r\n");
                push_body(&mut out, &self.html_body);

                out.push_str(&format!("--{boundary}--\r\n"));
            }
            None => {
                push_header(&mut out, "Content-Type", "text/html; charset=\"UTF-8\"");
                out.push_str("\r\n");
                push_body(&mut out, &self.html_body);
            }
        }

        out
    }
}

fn push_header(out: &mut String, name: &str, value: &str) {
    out.push_str(name);
    out.push_str(": ");
    out.push_str(value);
    out.push_str("\r\n");
}

/// Append a body with normalized CRLF line endings.
fn push_body(out: &mut String, body: &str) {
    for line in body.split('\n') {
        out.push_str(line.trim_end_matches('\r'));
        out.push_str("\r\n");
    }
}
