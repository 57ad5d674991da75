//! HTML whitespace collapsing for release builds.

use std::sync::LazyLock;

use regex::Regex;

use crate::step::{map_each, Asset, Step, StepError};

static PRESERVED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<pre\b.*?</pre>|<textarea\b.*?</textarea>|<script\b.*?</script>|<style\b.*?</style>")
        .expect("valid regex")
});
static AROUND_BLOCKS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)\s*(<(?:!doctype|/?(?:html|head|body|title|meta|link|base|header|footer|main|nav|",
        r"section|article|aside|div|p|h[1-6]|ul|ol|li|dl|dt|dd|table|thead|tbody|tfoot|tr|th|td|",
        r"form|fieldset|figure|figcaption|blockquote|hr|br|pre|textarea|script|style)\b)[^>]*>)\s*",
    ))
    .expect("valid regex")
});
static RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Collapses whitespace in rendered HTML.
#[derive(Debug, Default)]
pub struct MinifyHtml;

impl Step for MinifyHtml {
    fn name(&self) -> &str {
        "minify-html"
    }

    fn apply(&self, assets: Vec<Asset>) -> Result<Vec<Asset>, StepError> {
        map_each(assets, |mut asset| {
            asset.contents = collapse_whitespace(asset.text()?).into_bytes();
            Ok(asset)
        })
    }
}

/// Squeeze whitespace runs to a single space and drop it entirely next to
/// block-level tags, where it never renders. Whitespace between inline
/// elements is kept as one space. `<pre>`, `<textarea>`, `<script>` and
/// `<style>` bodies are copied verbatim.
pub fn collapse_whitespace(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut last = 0;

    for block in PRESERVED.find_iter(html) {
        out.push_str(&collapse_segment(&html[last..block.start()]));
        out.push_str(block.as_str());
        last = block.end();
    }
    out.push_str(&collapse_segment(&html[last..]));

    out.trim().to_string()
}

fn collapse_segment(segment: &str) -> String {
    let squeezed = RUNS.replace_all(segment, " ");
    AROUND_BLOCKS.replace_all(&squeezed, "$1").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_layout_whitespace() {
        let html = "<html>\n  <body>\n    <p>Hello    world</p>\n  </body>\n</html>\n";

        assert_eq!(
            collapse_whitespace(html),
            "<html><body><p>Hello world</p></body></html>"
        );
    }

    #[test]
    fn keeps_inline_spacing() {
        assert_eq!(
            collapse_whitespace("<b>a</b> <i>b</i>"),
            "<b>a</b> <i>b</i>"
        );
    }

    #[test]
    fn keeps_space_between_inline_elements_on_separate_lines() {
        let html = "<p>\n  <span>Hello</span>\n  <span>world</span>\n</p>";

        assert_eq!(
            collapse_whitespace(html),
            "<p><span>Hello</span> <span>world</span></p>"
        );
    }

    #[test]
    fn keeps_space_between_text_and_inline_tags() {
        assert_eq!(
            collapse_whitespace("<li>Read\n  <a href=\"/docs\">the docs</a>\n  now</li>"),
            "<li>Read <a href=\"/docs\">the docs</a> now</li>"
        );
    }

    #[test]
    fn drops_space_around_block_tags_with_attributes() {
        assert_eq!(
            collapse_whitespace("<!DOCTYPE html>\n<div class=\"a\">\n  text\n</div>\n<br/>\n"),
            "<!DOCTYPE html><div class=\"a\">text</div><br/>"
        );
    }

    #[test]
    fn preserves_pre_and_script_bodies() {
        let html = "<div>\n<pre>  keep\n   this</pre>\n<script>\nlet  a = 1;\n</script>\n</div>";
        let out = collapse_whitespace(html);

        assert!(out.contains("<pre>  keep\n   this</pre>"));
        assert!(out.contains("<script>\nlet  a = 1;\n</script>"));
        assert!(out.starts_with("<div><pre>"));
    }
}
