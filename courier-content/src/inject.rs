//! Footer and pixel injection.

use courier_common::message::TrackingToken;

/// Insert a fragment as the last child of `<body>`, or append it to the raw
/// HTML when no closing body tag is present.
fn insert_before_body_close(html: &str, fragment: &str) -> String {
    let close = html
        .rfind("</body>")
        .or_else(|| html.rfind("</BODY>"))
        .or_else(|| html.rfind("</Body>"));

    close.map_or_else(
        || format!("{html}{fragment}"),
        |idx| {
            let mut out = String::with_capacity(html.len() + fragment.len());
            out.push_str(&html[..idx]);
            out.push_str(fragment);
            out.push_str(&html[idx..]);
            out
        },
    )
}

/// Append the unsubscribe footer block, linking to
/// `{base}/track/unsubscribe/{token}`.
#[must_use]
pub fn append_unsubscribe_footer(html: &str, token: &TrackingToken, base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let footer = format!(
        concat!(
            r#"<div style="margin-top:24px;padding-top:12px;border-top:1px solid #ddd;"#,
            r#"font-size:12px;color:#888;text-align:center;">"#,
            r#"<p>If you no longer wish to receive these emails, you can "#,
            r#"<a href="{base}/track/unsubscribe/{token}">unsubscribe here</a>.</p>"#,
            r#"</div>"#,
        ),
        base = base,
        token = token,
    );

    insert_before_body_close(html, &footer)
}

/// Append the 1x1 open-tracking pixel pointing at `{base}/track/open/{token}`.
///
/// Always the final transform so the pixel lands after every other injected
/// element.
#[must_use]
pub fn inject_tracking_pixel(html: &str, token: &TrackingToken, base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let pixel = format!(
        r#"<img src="{base}/track/open/{token}" width="1" height="1" style="display:none;max-height:1px;max-width:1px;" alt="" />"#,
    );

    insert_before_body_close(html, &pixel)
}
