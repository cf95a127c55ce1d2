use std::fmt::Write as _;

use crate::digest::walker::Walk;
use crate::util::escape_html;

/// Header of the trailing error section. Always present, even with no failures.
pub const ERRORS_HEADER: &str = "<hr><h1>Errors</h1>";

/// Concatenates the walk's fragments and appends the error section.
///
/// Each failed source becomes `<a href='URL'>TITLE</a>`. The result is the
/// complete HTML body of the digest email.
pub fn build_report(walk: &Walk) -> String {
    let mut report: String = walk.fragments.concat();

    report.push_str(ERRORS_HEADER);
    for failure in &walk.failures {
        // href, not src: an anchor with only `src` is not a clickable link
        let _ = write!(
            report,
            "<a href='{}'>{}</a>",
            escape_html(&failure.url),
            escape_html(&failure.title)
        );
    }

    report
}
